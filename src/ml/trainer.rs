// ============================================================
// Layer 5 — Model Builder
// ============================================================
// Grid search, then refit the winner on every training row:
//
//   1. read the 0/1 label column
//   2. grid search with stratified k-fold CV (ROC-AUC)
//   3. refit feature union + classifier with the best params
//
// Fit failures propagate to the caller unchanged.

use anyhow::{Context, Result};

use crate::domain::record::Dataset;
use crate::ml::features::FeatureSpec;
use crate::ml::grid_search::{GridSearch, HyperparameterGrid};
use crate::ml::model::{FittedModel, FittedPipeline};

/// Default number of cross-validation folds.
pub const DEFAULT_CV_FOLDS: usize = 5;

/// Build, search and fit the full pipeline on `dataset`.
pub fn create_model(
    dataset:         &Dataset,
    spec:            &FeatureSpec,
    hyperparameters: &HyperparameterGrid,
    output_column:   &str,
    cv_folds:        usize,
) -> Result<FittedModel> {
    let labels = dataset
        .labels(output_column)
        .with_context(|| format!("Cannot read label column '{output_column}'"))?;

    let outcome = GridSearch::new(hyperparameters.clone(), cv_folds)
        .search(spec, dataset, &labels)
        .context("Grid search failed")?;

    let pipeline = FittedPipeline::fit(spec, dataset, &labels, outcome.best_params)
        .context("Refitting the best candidate failed")?;

    tracing::info!(
        "Refitted best pipeline on {} rows ({} features)",
        dataset.len(),
        pipeline.feature_names().len()
    );

    Ok(FittedModel::new(
        spec.clone(),
        outcome.best_params,
        outcome.best_score,
        outcome.cv_results,
        pipeline,
    ))
}
