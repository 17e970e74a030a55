// ============================================================
// Layer 5 — Fitted Pipeline and Model
// ============================================================
// A FittedPipeline is the feature union plus the classifier,
// both fitted on the same rows. A FittedModel wraps the
// pipeline refitted with the winning hyperparameters, together
// with what the grid search learned along the way.
//
// Both serialize to JSON; that JSON is the artifact logged under
// `models/` and later fetched back by the `predict` command.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::record::Dataset;
use crate::ml::booster::{BoosterParams, GradientBoostedClassifier};
use crate::ml::features::{FeatureSpec, FeatureUnion};
use crate::ml::grid_search::CandidateScore;

/// Feature union + classifier, fitted together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    features:   FeatureUnion,
    classifier: GradientBoostedClassifier,
}

impl FittedPipeline {
    pub fn fit(spec: &FeatureSpec, data: &Dataset, labels: &[u8], params: BoosterParams) -> Result<Self> {
        let features   = FeatureUnion::fit(spec, data)?;
        let x          = features.transform(data);
        let classifier = GradientBoostedClassifier::fit(&x, labels, params)?;
        Ok(Self { features, classifier })
    }

    /// Positive-class probability per row.
    pub fn predict_proba(&self, data: &Dataset) -> Result<Vec<f64>> {
        let x = self.features.transform(data);
        self.classifier.predict_proba(&x)
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features.feature_names()
    }
}

/// The result of a training run: the best pipeline found by the
/// grid search, refitted on the full training set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub feature_spec: FeatureSpec,
    pub best_params:  BoosterParams,
    /// Mean cross-validated ROC-AUC of `best_params`
    pub best_score:   f64,
    pub cv_results:   Vec<CandidateScore>,
    pub trained_at:   DateTime<Utc>,
    pipeline:         FittedPipeline,
}

impl FittedModel {
    pub fn new(
        feature_spec: FeatureSpec,
        best_params:  BoosterParams,
        best_score:   f64,
        cv_results:   Vec<CandidateScore>,
        pipeline:     FittedPipeline,
    ) -> Self {
        Self {
            feature_spec,
            best_params,
            best_score,
            cv_results,
            trained_at: Utc::now(),
            pipeline,
        }
    }

    pub fn predict_proba(&self, data: &Dataset) -> Result<Vec<f64>> {
        self.pipeline.predict_proba(data)
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.pipeline.feature_names()
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).context("Cannot serialize fitted model")
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("Cannot deserialize fitted model")
    }
}

// ─── Prediction ───────────────────────────────────────────────────────────────

/// What `predict` accepts: a table, or a mapping of column → values.
pub enum PredictionInput<'a> {
    Table(&'a Dataset),
    Columns(BTreeMap<String, Vec<Value>>),
}

impl<'a> From<&'a Dataset> for PredictionInput<'a> {
    fn from(data: &'a Dataset) -> Self {
        PredictionInput::Table(data)
    }
}

impl From<BTreeMap<String, Vec<Value>>> for PredictionInput<'_> {
    fn from(columns: BTreeMap<String, Vec<Value>>) -> Self {
        PredictionInput::Columns(columns)
    }
}

/// Probability of the positive class (laundering) for each row.
pub fn predict<'a>(model: &FittedModel, input: impl Into<PredictionInput<'a>>) -> Result<Vec<f64>> {
    match input.into() {
        PredictionInput::Table(data) => {
            tracing::debug!("Predicting: {} rows", data.len());
            model.predict_proba(data)
        }
        PredictionInput::Columns(columns) => {
            let data = Dataset::from_columns(columns)?;
            tracing::debug!("Predicting: {} rows (column input)", data.len());
            model.predict_proba(&data)
        }
    }
}
