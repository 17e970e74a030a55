// ============================================================
// Layer 6 — Grid Search Results Logger
// ============================================================
// Writes one CSV row per grid-search candidate so the search
// can be inspected after the run (it is also logged to the
// tracking run as `grid_search/cv_results.csv`).
//
// Columns:
//   rank, n_estimators, max_depth, learning_rate,
//   min_child_weight, reg_lambda, gamma, subsample,
//   colsample_bytree, random_state, mean_test_score, std_test_score, n_scored_folds
//
// Example CSV output:
//   rank,n_estimators,max_depth,learning_rate,...
//   1,100,3,0.100000,1.000000,1.000000,0.000000,0.800000,1.000000,0,0.981200,0.004100,5
//   2,50,3,0.100000,1.000000,1.000000,0.000000,0.800000,1.000000,0,0.975300,0.006800,5
//
// A candidate with no scorable fold gets empty score cells.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{fmt::Write as _, fs, path::Path};

use crate::ml::grid_search::CandidateScore;

pub const CV_RESULTS_HEADER: &str =
    "rank,n_estimators,max_depth,learning_rate,min_child_weight,reg_lambda,gamma,subsample,colsample_bytree,random_state,mean_test_score,std_test_score,n_scored_folds";

fn score_cell(score: Option<f64>) -> String {
    score.map(|s| format!("{s:.6}")).unwrap_or_default()
}

/// Render candidates as CSV, best rank first.
pub fn cv_results_csv(results: &[CandidateScore]) -> String {
    let mut sorted: Vec<&CandidateScore> = results.iter().collect();
    sorted.sort_by_key(|c| c.rank);

    let mut csv = String::new();
    let _ = writeln!(csv, "{CV_RESULTS_HEADER}");
    for c in sorted {
        let p = &c.params;
        let _ = writeln!(
            csv,
            "{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{},{},{},{}",
            c.rank,
            p.n_estimators,
            p.max_depth,
            p.learning_rate,
            p.min_child_weight,
            p.reg_lambda,
            p.gamma,
            p.subsample,
            p.colsample_bytree,
            p.random_state,
            score_cell(c.mean_score),
            score_cell(c.std_score),
            c.fold_scores.len(),
        );
    }
    csv
}

/// Write the CSV to `path`, creating parent directories.
pub fn write_cv_results(path: &Path, results: &[CandidateScore]) -> Result<String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let csv = cv_results_csv(results);
    fs::write(path, &csv)
        .with_context(|| format!("Cannot write CV results to '{}'", path.display()))?;
    tracing::debug!("Wrote {} CV results to '{}'", results.len(), path.display());
    Ok(csv)
}
