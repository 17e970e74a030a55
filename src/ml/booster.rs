// ============================================================
// Layer 5 — Gradient-Boosted Tree Classifier
// ============================================================
// Second-order gradient boosting with logistic loss, in the
// style of XGBoost's exact greedy tree method.
//
// For each boosting round t:
//   p_i = sigmoid(margin_i)
//   g_i = p_i - y_i                 (gradient of log loss)
//   h_i = p_i * (1 - p_i)           (hessian of log loss)
//   grow one regression tree on (g, h), then
//   margin_i += tree(x_i)
//
// Tree growing (depth-first, exact greedy):
//   leaf weight  w    = -G / (H + λ)          (times learning rate)
//   split gain        = ½ [G_L²/(H_L+λ) + G_R²/(H_R+λ) - G²/(H+λ)] - γ
//   a split is taken when gain > 0 and both children carry at
//   least `min_child_weight` hessian
//
// Each tree sees a random `subsample` share of the rows and a
// random `colsample_bytree` share of the features, drawn from
// one StdRng seeded with `random_state`.
//
// Reference: Chen & Guestrin (2016) XGBoost: A Scalable Tree
//            Boosting System, §2.2 and Algorithm 1
//            Friedman (2001) Greedy Function Approximation

use anyhow::{bail, Result};
use ndarray::{Array2, ArrayView1};
use rand::{rngs::StdRng, seq::index, SeedableRng};
use serde::{Deserialize, Serialize};

/// Hyperparameters of one boosted ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoosterParams {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,

    /// Maximum depth of each tree; 1 means a single split
    pub max_depth: usize,

    /// Shrinkage applied to every leaf weight
    pub learning_rate: f64,

    /// Minimum hessian sum each child of a split must carry
    pub min_child_weight: f64,

    /// L2 regularization on leaf weights (λ)
    pub reg_lambda: f64,

    /// Minimum gain required to make a split (γ)
    pub gamma: f64,

    /// Share of rows drawn (without replacement) for each tree
    pub subsample: f64,

    /// Share of features drawn for each tree
    pub colsample_bytree: f64,

    /// Seed of the row and feature draws
    pub random_state: u64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            n_estimators:     100,
            max_depth:        3,
            learning_rate:    0.1,
            min_child_weight: 1.0,
            reg_lambda:       1.0,
            gamma:            0.0,
            subsample:        1.0,
            colsample_bytree: 1.0,
            random_state:     0,
        }
    }
}

impl BoosterParams {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            bail!("n_estimators must be at least 1");
        }
        if self.max_depth == 0 {
            bail!("max_depth must be at least 1");
        }
        if !(self.learning_rate > 0.0) {
            bail!("learning_rate must be positive, got {}", self.learning_rate);
        }
        if self.min_child_weight < 0.0 || self.reg_lambda < 0.0 || self.gamma < 0.0 {
            bail!("min_child_weight, reg_lambda and gamma must be non-negative");
        }
        for (name, share) in [("subsample", self.subsample), ("colsample_bytree", self.colsample_bytree)] {
            if !(share > 0.0 && share <= 1.0) {
                bail!("{name} must lie in (0, 1], got {share}");
            }
        }
        Ok(())
    }
}

// ─── Regression Tree ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf { weight: f64 },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

/// One tree of the ensemble, stored as a flat node arena.
/// Node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn fit(
        x:        &Array2<f64>,
        grad:     &[f64],
        hess:     &[f64],
        params:   &BoosterParams,
        rows:     Vec<usize>,
        features: Vec<usize>,
    ) -> Self {
        let mut builder = TreeBuilder { x, grad, hess, params, features, nodes: Vec::new() };
        builder.grow(rows, 0);
        Self { nodes: builder.nodes }
    }

    /// Rows with `x[feature] < threshold` go left.
    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { weight } => return weight,
                Node::Split { feature, threshold, left, right } => {
                    idx = if row[feature] < threshold { left } else { right };
                }
            }
        }
    }

    #[cfg(test)]
    fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Sorted draw of `ceil(share * n)` indices out of `0..n`
/// (at least one). The full range when `share` is 1.
fn draw(rng: &mut StdRng, n: usize, share: f64) -> Vec<usize> {
    if share >= 1.0 || n == 0 {
        return (0..n).collect();
    }
    let amount    = ((share * n as f64).ceil() as usize).clamp(1, n);
    let mut picks = index::sample(rng, n, amount).into_vec();
    picks.sort_unstable();
    picks
}

struct SplitCandidate {
    feature:   usize,
    threshold: f64,
    gain:      f64,
}

struct TreeBuilder<'a> {
    x:        &'a Array2<f64>,
    grad:     &'a [f64],
    hess:     &'a [f64],
    params:   &'a BoosterParams,
    /// Feature columns this tree may split on
    features: Vec<usize>,
    nodes:    Vec<Node>,
}

impl TreeBuilder<'_> {
    /// Grow the subtree for `rows` and return its node index.
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let g: f64 = rows.iter().map(|&r| self.grad[r]).sum();
        let h: f64 = rows.iter().map(|&r| self.hess[r]).sum();

        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { weight: self.leaf_weight(g, h) });

        if depth >= self.params.max_depth {
            return idx;
        }
        let Some(split) = self.best_split(&rows, g, h) else {
            return idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| self.x[[r, split.feature]] < split.threshold);

        let left  = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature:   split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }

    fn leaf_weight(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.params.reg_lambda) * self.params.learning_rate
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.reg_lambda)
    }

    /// Exact greedy search over every sampled feature and every
    /// boundary between distinct sorted values.
    fn best_split(&self, rows: &[usize], g_total: f64, h_total: f64) -> Option<SplitCandidate> {
        let parent = self.score(g_total, h_total);
        let mut best: Option<SplitCandidate> = None;
        let mut order = rows.to_vec();

        for &feature in &self.features {
            order.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let (mut g_left, mut h_left) = (0.0, 0.0);
            for pair in order.windows(2) {
                let (r, next) = (pair[0], pair[1]);
                g_left += self.grad[r];
                h_left += self.hess[r];

                let (v, v_next) = (self.x[[r, feature]], self.x[[next, feature]]);
                if v == v_next {
                    continue;
                }

                let (g_right, h_right) = (g_total - g_left, h_total - h_left);
                if h_left < self.params.min_child_weight || h_right < self.params.min_child_weight {
                    continue;
                }

                let gain = 0.5 * (self.score(g_left, h_left) + self.score(g_right, h_right) - parent)
                    - self.params.gamma;
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: v + (v_next - v) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}

// ─── Ensemble ─────────────────────────────────────────────────────────────────

fn sigmoid(m: f64) -> f64 {
    1.0 / (1.0 + (-m).exp())
}

/// A fitted binary classifier over a dense feature matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedClassifier {
    params:      BoosterParams,
    n_features:  usize,
    /// Starting margin for every row (logit of 0.5)
    base_margin: f64,
    trees:       Vec<RegressionTree>,
}

impl GradientBoostedClassifier {
    /// Fit on features `x` and 0/1 labels `y`.
    pub fn fit(x: &Array2<f64>, y: &[u8], params: BoosterParams) -> Result<Self> {
        params.validate()?;
        if x.nrows() != y.len() {
            bail!("Feature matrix has {} rows but {} labels were given", x.nrows(), y.len());
        }
        if y.is_empty() {
            bail!("Cannot fit a classifier on zero rows");
        }

        let targets: Vec<f64> = y.iter().map(|&v| f64::from(v)).collect();
        let base_margin       = 0.0;
        let mut margins       = vec![base_margin; y.len()];
        let mut trees         = Vec::with_capacity(params.n_estimators);
        let mut rng           = StdRng::seed_from_u64(params.random_state);

        for _ in 0..params.n_estimators {
            let probs: Vec<f64> = margins.iter().map(|&m| sigmoid(m)).collect();
            let grad:  Vec<f64> = probs.iter().zip(&targets).map(|(p, t)| p - t).collect();
            // Floor the hessian so saturated rows never divide by zero
            let hess:  Vec<f64> = probs.iter().map(|p| (p * (1.0 - p)).max(1e-16)).collect();

            let rows     = draw(&mut rng, x.nrows(), params.subsample);
            let features = draw(&mut rng, x.ncols(), params.colsample_bytree);
            let tree     = RegressionTree::fit(x, &grad, &hess, &params, rows, features);
            for (i, row) in x.rows().into_iter().enumerate() {
                margins[i] += tree.predict_row(row);
            }
            trees.push(tree);
        }

        tracing::debug!(
            "Boosted {} trees (max_depth={}, lr={}) on {} rows x {} features",
            trees.len(),
            params.max_depth,
            params.learning_rate,
            x.nrows(),
            x.ncols()
        );

        Ok(Self { params, n_features: x.ncols(), base_margin, trees })
    }

    /// Probability of the positive class for every row.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        if x.ncols() != self.n_features {
            bail!(
                "Model was trained on {} features but input has {}",
                self.n_features,
                x.ncols()
            );
        }
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let margin = self.base_margin
                    + self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>();
                sigmoid(margin)
            })
            .collect())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Vec<u8>) {
        let x = array![[-3.0], [-2.0], [-1.5], [-1.0], [-0.5], [0.5], [1.0], [1.5], [2.0], [3.0]];
        let y = vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1];
        (x, y)
    }

    fn small_params() -> BoosterParams {
        BoosterParams { n_estimators: 20, max_depth: 2, min_child_weight: 0.1, ..Default::default() }
    }

    #[test]
    fn test_separable_data_is_ranked_perfectly() {
        let (x, y) = separable();
        let model  = GradientBoostedClassifier::fit(&x, &y, small_params()).unwrap();
        let probs  = model.predict_proba(&x).unwrap();

        let max_neg = probs[..5].iter().cloned().fold(f64::MIN, f64::max);
        let min_pos = probs[5..].iter().cloned().fold(f64::MAX, f64::min);
        assert!(max_neg < 0.5 && min_pos > 0.5);
    }

    #[test]
    fn test_probabilities_are_bounded() {
        let (x, y) = separable();
        let model  = GradientBoostedClassifier::fit(&x, &y, small_params()).unwrap();
        let extreme = array![[-100.0], [0.0], [100.0]];
        for p in model.predict_proba(&extreme).unwrap() {
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn test_splits_at_midpoint_between_classes() {
        let (x, y) = separable();
        let params = BoosterParams { n_estimators: 1, max_depth: 1, min_child_weight: 0.0, ..Default::default() };
        let model  = GradientBoostedClassifier::fit(&x, &y, params).unwrap();
        assert_eq!(
            model.trees[0].nodes[0],
            Node::Split { feature: 0, threshold: 0.0, left: 1, right: 2 }
        );
    }

    #[test]
    fn test_min_child_weight_blocks_tiny_leaves() {
        // Initial hessian is 0.25 per row; 10 rows carry 2.5 in total,
        // so no split can leave ≥ 2.0 on both sides
        let (x, y) = separable();
        let params = BoosterParams { n_estimators: 1, min_child_weight: 2.0, ..Default::default() };
        let model  = GradientBoostedClassifier::fit(&x, &y, params).unwrap();
        assert_eq!(model.trees[0].node_count(), 1);
    }

    #[test]
    fn test_rejects_feature_width_mismatch() {
        let (x, y) = separable();
        let model  = GradientBoostedClassifier::fit(&x, &y, small_params()).unwrap();
        assert!(model.predict_proba(&Array2::zeros((1, 2))).is_err());
    }

    #[test]
    fn test_rejects_invalid_params() {
        let (x, y) = separable();
        let params = BoosterParams { learning_rate: 0.0, ..Default::default() };
        assert!(GradientBoostedClassifier::fit(&x, &y, params).is_err());

        let params = BoosterParams { subsample: 0.0, ..Default::default() };
        assert!(GradientBoostedClassifier::fit(&x, &y, params).is_err());

        let params = BoosterParams { colsample_bytree: 1.5, ..Default::default() };
        assert!(GradientBoostedClassifier::fit(&x, &y, params).is_err());
    }

    fn wide() -> (Array2<f64>, Vec<u8>) {
        let x = Array2::from_shape_fn((40, 4), |(r, c)| ((r * 7 + c * 13) % 17) as f64 + if r % 2 == 0 { c as f64 } else { 0.0 });
        let y = (0..40).map(|r| u8::from(r % 2 == 0)).collect();
        (x, y)
    }

    fn sampled(random_state: u64) -> BoosterParams {
        BoosterParams {
            n_estimators: 10,
            subsample: 0.5,
            colsample_bytree: 0.5,
            min_child_weight: 0.1,
            random_state,
            ..Default::default()
        }
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let (x, y) = wide();
        let a = GradientBoostedClassifier::fit(&x, &y, sampled(7)).unwrap();
        let b = GradientBoostedClassifier::fit(&x, &y, sampled(7)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_column_sampling_restricts_split_features() {
        let (x, y) = wide();
        let model  = GradientBoostedClassifier::fit(&x, &y, sampled(3)).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for tree in &model.trees {
            let _rows    = draw(&mut rng, 40, 0.5);
            let features = draw(&mut rng, 4, 0.5);
            assert_eq!(features.len(), 2);
            for node in &tree.nodes {
                if let Node::Split { feature, .. } = node {
                    assert!(features.contains(feature));
                }
            }
        }
    }

    #[test]
    fn test_draw_takes_ceiling_share_sorted() {
        let mut rng = StdRng::seed_from_u64(1);
        let picks   = draw(&mut rng, 10, 0.25);
        assert_eq!(picks.len(), 3);
        assert!(picks.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(draw(&mut rng, 5, 1.0), vec![0, 1, 2, 3, 4]);
    }
}
