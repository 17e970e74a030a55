// ============================================================
// Layer 5 — Hyperparameter Grid Search
// ============================================================
// Exhaustive search over every combination in the grid.
// Each candidate is scored with stratified k-fold
// cross-validation: the whole pipeline (features included) is
// refitted on k-1 folds and scored by ROC-AUC on the held-out
// fold. The candidate with the best mean score wins; ties keep
// the earlier candidate in grid order.
//
// Stratification keeps the positive rate of every fold close
// to the overall rate. Laundering labels are usually rare, so
// a plain k-fold can produce validation folds with no
// positives at all, where ROC-AUC is undefined.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::domain::record::Dataset;
use crate::ml::booster::BoosterParams;
use crate::ml::features::FeatureSpec;
use crate::ml::model::FittedPipeline;
use crate::ml::scoring::{roc_auc, AucError};

/// Candidate values per hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperparameterGrid {
    pub n_estimators:     Vec<usize>,
    pub max_depth:        Vec<usize>,
    pub learning_rate:    Vec<f64>,
    pub min_child_weight: Vec<f64>,
    pub reg_lambda:       Vec<f64>,
    pub gamma:            Vec<f64>,
    pub subsample:        Vec<f64>,
    pub colsample_bytree: Vec<f64>,
    pub random_state:     Vec<u64>,
}

impl Default for HyperparameterGrid {
    fn default() -> Self {
        Self {
            n_estimators:     vec![50, 100],
            max_depth:        vec![3, 5],
            learning_rate:    vec![0.1],
            min_child_weight: vec![1.0],
            reg_lambda:       vec![1.0],
            gamma:            vec![0.0],
            subsample:        vec![1.0],
            colsample_bytree: vec![1.0],
            random_state:     vec![0],
        }
    }
}

/// Every `base` candidate once per value, the value set by `set`.
fn expand<T: Copy>(
    base:   Vec<BoosterParams>,
    values: &[T],
    set:    impl Fn(&mut BoosterParams, T),
) -> Vec<BoosterParams> {
    let mut out = Vec::with_capacity(base.len() * values.len());
    for params in &base {
        for &value in values {
            let mut next = *params;
            set(&mut next, value);
            out.push(next);
        }
    }
    out
}

impl HyperparameterGrid {
    /// Cartesian product of all value lists, in declaration order
    /// (the last field varies fastest).
    pub fn candidates(&self) -> Result<Vec<BoosterParams>> {
        let lists = [
            ("n_estimators", self.n_estimators.len()),
            ("max_depth", self.max_depth.len()),
            ("learning_rate", self.learning_rate.len()),
            ("min_child_weight", self.min_child_weight.len()),
            ("reg_lambda", self.reg_lambda.len()),
            ("gamma", self.gamma.len()),
            ("subsample", self.subsample.len()),
            ("colsample_bytree", self.colsample_bytree.len()),
            ("random_state", self.random_state.len()),
        ];
        if let Some((name, _)) = lists.iter().find(|(_, len)| *len == 0) {
            bail!("Hyperparameter grid has no values for '{name}'");
        }

        let mut out = vec![BoosterParams::default()];
        out = expand(out, &self.n_estimators, |p, v| p.n_estimators = v);
        out = expand(out, &self.max_depth, |p, v| p.max_depth = v);
        out = expand(out, &self.learning_rate, |p, v| p.learning_rate = v);
        out = expand(out, &self.min_child_weight, |p, v| p.min_child_weight = v);
        out = expand(out, &self.reg_lambda, |p, v| p.reg_lambda = v);
        out = expand(out, &self.gamma, |p, v| p.gamma = v);
        out = expand(out, &self.subsample, |p, v| p.subsample = v);
        out = expand(out, &self.colsample_bytree, |p, v| p.colsample_bytree = v);
        out = expand(out, &self.random_state, |p, v| p.random_state = v);

        for params in &out {
            params.validate()?;
        }
        Ok(out)
    }
}

/// Cross-validation outcome of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub params:      BoosterParams,
    /// ROC-AUC of every fold where it is defined
    pub fold_scores: Vec<f64>,
    /// `None` when no fold had both classes
    pub mean_score:  Option<f64>,
    pub std_score:   Option<f64>,
    /// 1 = best
    pub rank:        usize,
}

/// Held-out row indices of each of `k` stratified folds.
///
/// Rows of each class are dealt round-robin, in their original
/// order, so every fold gets ⌊n_c / k⌋ or ⌈n_c / k⌉ rows of class c.
pub fn stratified_folds(labels: &[u8], k: usize) -> Vec<Vec<usize>> {
    let mut folds = vec![Vec::new(); k];
    for class in [0u8, 1u8] {
        let rows = labels.iter().enumerate().filter(|&(_, &y)| y == class).map(|(i, _)| i);
        for (n, row) in rows.enumerate() {
            folds[n % k].push(row);
        }
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    folds
}

pub struct GridSearch {
    grid:  HyperparameterGrid,
    folds: usize,
}

/// Winning candidate plus every candidate's score.
pub struct SearchOutcome {
    pub best_params: BoosterParams,
    pub best_score:  f64,
    pub cv_results:  Vec<CandidateScore>,
}

impl GridSearch {
    pub fn new(grid: HyperparameterGrid, folds: usize) -> Self {
        Self { grid, folds }
    }

    pub fn search(&self, spec: &FeatureSpec, data: &Dataset, labels: &[u8]) -> Result<SearchOutcome> {
        if self.folds < 2 {
            bail!("Cross-validation needs at least 2 folds, got {}", self.folds);
        }
        if labels.len() < self.folds {
            bail!(
                "Cannot have number of splits n_splits={} greater than the number of samples: n_samples={}",
                self.folds,
                labels.len()
            );
        }
        let positives = labels.iter().filter(|&&y| y == 1).count();
        let minority  = positives.min(labels.len() - positives);
        if minority < self.folds {
            tracing::warn!(
                "The least populated class has only {} members, which is less than n_splits={}",
                minority,
                self.folds
            );
        }

        let candidates = self.grid.candidates()?;
        let folds      = stratified_folds(labels, self.folds);
        tracing::info!(
            "Fitting {} folds for each of {} candidates, totalling {} fits",
            self.folds,
            candidates.len(),
            self.folds * candidates.len()
        );

        let mut results = Vec::with_capacity(candidates.len());
        for params in candidates {
            let fold_scores = self.cross_validate(spec, data, labels, &folds, params)?;
            let (mean_score, std_score) = match mean_std(&fold_scores) {
                Some((mean, std)) => (Some(mean), Some(std)),
                None => (None, None),
            };
            tracing::debug!("{:?} → mean ROC-AUC {:?} (±{:?})", params, mean_score, std_score);
            results.push(CandidateScore { params, fold_scores, mean_score, std_score, rank: 0 });
        }

        // Stable sort: equal means keep grid order
        let mut order: Vec<usize> = (0..results.len()).collect();
        let key = |i: usize| results[i].mean_score.unwrap_or(f64::NEG_INFINITY);
        order.sort_by(|&a, &b| key(b).total_cmp(&key(a)));
        for (rank, &i) in order.iter().enumerate() {
            results[i].rank = rank + 1;
        }

        let best = &results[order[0]];
        let Some(best_score) = best.mean_score else {
            bail!("ROC-AUC is undefined on every validation fold; each fold holds a single class");
        };
        tracing::info!("Best parameters {:?} with mean ROC-AUC {:.4}", best.params, best_score);

        Ok(SearchOutcome {
            best_params: best.params,
            best_score,
            cv_results:  results,
        })
    }

    fn cross_validate(
        &self,
        spec:   &FeatureSpec,
        data:   &Dataset,
        labels: &[u8],
        folds:  &[Vec<usize>],
        params: BoosterParams,
    ) -> Result<Vec<f64>> {
        let mut scores = Vec::with_capacity(folds.len());
        for held_out in folds {
            let train_idx: Vec<usize> = (0..labels.len())
                .filter(|i| held_out.binary_search(i).is_err())
                .collect();

            let train_labels: Vec<u8> = train_idx.iter().map(|&i| labels[i]).collect();
            let val_labels:   Vec<u8> = held_out.iter().map(|&i| labels[i]).collect();

            let pipeline = FittedPipeline::fit(spec, &data.subset(&train_idx), &train_labels, params)?;
            let probs    = pipeline.predict_proba(&data.subset(held_out))?;

            match roc_auc(&val_labels, &probs) {
                Ok(score) => scores.push(score),
                Err(AucError::SingleClass) => {
                    tracing::debug!("Skipping fold with a single class")
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(scores)
    }
}

/// Mean and population standard deviation.
fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n    = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var  = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, var.sqrt()))
}
