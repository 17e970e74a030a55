// ============================================================
// Layer 5 — ML / Model Layer
// ============================================================
// Everything that learns from data or scores a model lives
// here. Nothing in this layer talks to the tracking server or
// object storage; it only sees Datasets and returns values.
//
// What's in this layer:
//
//   features.rs    — The feature union
//                    • numeric branch: coerce, fill 0, standardize
//                    • categorical branch: most-frequent fill,
//                      then dictionary one-hot encoding
//
//   booster.rs     — Gradient boosted decision trees for binary
//                    classification (logistic loss, second-order
//                    split gain with λ / γ regularisation)
//
//   scoring.rs     — ROC-AUC via the rank-sum formulation
//
//   grid_search.rs — Exhaustive hyperparameter search with
//                    stratified k-fold cross-validation
//
//   model.rs       — Fitted pipeline + model, prediction entry
//                    point, JSON persistence
//
//   trainer.rs     — create_model: search, then refit the best
//
//   evaluator.rs   — calculate_metrics: train/test ROC-AUC and
//                    the markdown AUC report
//
// Reference: Chen & Guestrin (2016) XGBoost: A Scalable Tree
//            Boosting System
//            Hanley & McNeil (1982) The Meaning and Use of the
//            Area under a ROC Curve

/// Feature union: numeric and categorical preprocessing
pub mod features;

/// Gradient boosted tree classifier
pub mod booster;

/// ROC-AUC scoring
pub mod scoring;

/// Grid search with stratified cross-validation
pub mod grid_search;

/// Fitted pipeline, model persistence and prediction
pub mod model;

/// Model builder
pub mod trainer;

/// Train/test metrics and the AUC report
pub mod evaluator;
