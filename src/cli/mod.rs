// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`   — the full tracked training run (default)
//   2. `predict` — scores a dataset, one probability per line
//   3. `status`  — prints the serving model version
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, PredictArgs, SettingsArgs, StatusArgs, TrainArgs};

use crate::application::services::Services;
use crate::infra::config::Settings;

#[derive(Parser, Debug)]
#[command(
    name = "laundering-model",
    version,
    about = "Train, register and serve a money-laundering transaction classifier."
)]
pub struct Cli {
    /// The subcommand to run; `train` when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

fn load_settings(args: &SettingsArgs) -> Result<Settings> {
    Settings::load(args.settings.as_deref(), args.env_file.as_deref())
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command.unwrap_or_else(|| Commands::Train(TrainArgs::default())) {
            Commands::Train(args)   => run_train(args),
            Commands::Predict(args) => run_predict(args),
            Commands::Status(args)  => run_status(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let settings = load_settings(&args.settings)?;
    let services = Services::from_settings(&settings)?;
    tracing::info!("Training '{}'", settings.connection.experiment_name);

    let outcome = TrainUseCase::new(settings, services).execute()?;

    println!("Run:          {}", outcome.run_id);
    println!("AUC ROC train {:.2}", outcome.metrics.train_auc);
    println!("AUC ROC test  {:.2}", outcome.metrics.test_auc);
    println!(
        "Registered {} version {} ({})",
        outcome.model_version.name, outcome.model_version.version, outcome.model_version.stage
    );
    let drifted = outcome.quality.drifted_columns();
    if !drifted.is_empty() {
        println!("Drift detected in: {}", drifted.join(", "));
    }
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let settings = load_settings(&args.settings)?;
    let services = Services::from_settings(&settings)?;
    let use_case = PredictUseCase::new(settings.tracking_config(), services);

    for p in use_case.execute(&args.input, args.model.as_deref())? {
        println!("{p:.6}");
    }
    Ok(())
}

fn run_status(args: StatusArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let settings = load_settings(&args.settings)?;
    let services = Services::from_settings(&settings)?;
    let use_case = PredictUseCase::new(settings.tracking_config(), services);

    match use_case.serving_version()? {
        Some(v) => println!("{} version {} ({}) from {}", v.name, v.version, v.stage, v.source),
        None    => println!("No version of '{}' is registered", settings.connection.experiment_name),
    }
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_train() {
        let cli = Cli::try_parse_from(["laundering-model"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_predict_requires_input() {
        assert!(Cli::try_parse_from(["laundering-model", "predict"]).is_err());
        let cli = Cli::try_parse_from([
            "laundering-model", "predict", "--input", "tx.json", "--model", "models/model.json",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Predict(args)) => {
                assert_eq!(args.input, std::path::PathBuf::from("tx.json"));
                assert!(args.model.is_some());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_train_accepts_settings_files() {
        let cli = Cli::try_parse_from([
            "laundering-model", "train", "--settings", "settings.toml", "--env-file", "prod.env",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Train(args)) => {
                assert_eq!(args.settings.settings, Some("settings.toml".into()));
                assert_eq!(args.settings.env_file, Some("prod.env".into()));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
