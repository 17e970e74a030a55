// ============================================================
// Layer 5 — Evaluator
// ============================================================
// Scores a fitted model on both partitions and publishes the
// AUC table as the `laundering-model-report` artifact.
//
// Only the configured feature columns are passed to the model,
// so the label column can never leak into a prediction.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::record::Dataset;
use crate::infra::reports::ReportPublisher;
use crate::ml::features::FeatureSpec;
use crate::ml::model::{predict, FittedModel};
use crate::ml::scoring::roc_auc;

pub const AUC_REPORT_KEY: &str = "laundering-model-report";

/// ROC-AUC on the two partitions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    #[serde(rename = "roc_auc_score_training")]
    pub train_auc: f64,
    #[serde(rename = "roc_auc_score_test")]
    pub test_auc:  f64,
}

/// Fixed-format markdown table with both AUCs to 2 decimals.
pub fn render_auc_report(date: NaiveDate, metrics: &ModelMetrics) -> String {
    format!(
        "# AUC ROC Report\n\
         \n\
         ## Summary\n\
         \n\
         Laundering money Prediction\n\
         \n\
         ## ROC AUC Gradient Boosted Trees Model\n\
         \n\
         | Region    | AUC ROC Train | AUC ROC Test |\n\
         |:----------|---------------|-------------:|\n\
         | {date} |     {train:.2}     |     {test:.2}     |\n",
        train = metrics.train_auc,
        test  = metrics.test_auc,
    )
}

fn partition_auc(model: &FittedModel, data: &Dataset, spec: &FeatureSpec, output_column: &str, name: &str) -> Result<f64> {
    let features = data.select(&spec.all_columns());
    let scores   = predict(model, &features)?;
    let labels   = data.labels(output_column)?;
    roc_auc(&labels, &scores).with_context(|| format!("Cannot score the {name} dataset"))
}

/// ROC-AUC on train and test, published as a markdown artifact.
pub fn calculate_metrics(
    model:         &FittedModel,
    train_set:     &Dataset,
    test_set:      &Dataset,
    spec:          &FeatureSpec,
    output_column: &str,
    publisher:     &ReportPublisher,
) -> Result<ModelMetrics> {
    let metrics = ModelMetrics {
        train_auc: partition_auc(model, train_set, spec, output_column, "training")?,
        test_auc:  partition_auc(model, test_set, spec, output_column, "test")?,
    };

    let report = render_auc_report(Local::now().date_naive(), &metrics);
    publisher.publish_markdown(AUC_REPORT_KEY, &report)?;

    Ok(metrics)
}
