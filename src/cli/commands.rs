// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `train`, `predict`, `status`
// and their flags. Running the binary with no subcommand is
// the same as `train` with default flags.
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// The top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train, evaluate, register and promote a new model
    Train(TrainArgs),

    /// Score a JSON dataset with a saved or registered model
    Predict(PredictArgs),

    /// Show the model version currently serving
    Status(StatusArgs),
}

/// Where settings come from; shared by every command.
#[derive(Args, Debug, Default, Clone)]
pub struct SettingsArgs {
    /// TOML settings file (connection and model parameters)
    #[arg(long, env = "LAUNDERING_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Env file with connection keys; `.env` is used when present
    #[arg(long)]
    pub env_file: Option<PathBuf>,
}

/// All arguments for the `train` command.
#[derive(Args, Debug, Default)]
pub struct TrainArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,
}

/// All arguments for the `predict` command
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// JSON dataset to score (records or column map)
    #[arg(long)]
    pub input: PathBuf,

    /// Saved model file; the registry's serving model when omitted
    #[arg(long)]
    pub model: Option<PathBuf>,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

/// All arguments for the `status` command
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,
}
