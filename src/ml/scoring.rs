// ============================================================
// Layer 5 — ROC-AUC
// ============================================================
// Area under the ROC curve, computed through its rank-sum
// identity (Mann-Whitney U):
//
//   AUC = (R_pos - n_pos (n_pos + 1) / 2) / (n_pos * n_neg)
//
// where R_pos is the sum of the (1-based) ranks of the positive
// rows when all rows are sorted by score. Tied scores share the
// average of their ranks, which counts a tied pos/neg pair as
// one half, matching the trapezoidal ROC curve.
//
// Reference: Hanley & McNeil (1982) The meaning and use of the
//            area under a ROC curve

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AucError {
    #[error("Got {labels} labels but {scores} scores")]
    LengthMismatch { labels: usize, scores: usize },

    #[error("Only one class present in the labels. ROC AUC score is not defined in that case.")]
    SingleClass,
}

/// ROC-AUC of `scores` against 0/1 `labels`.
pub fn roc_auc(labels: &[u8], scores: &[f64]) -> Result<f64, AucError> {
    if labels.len() != scores.len() {
        return Err(AucError::LengthMismatch { labels: labels.len(), scores: scores.len() });
    }

    let n_pos = labels.iter().filter(|&&y| y == 1).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(AucError::SingleClass);
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // Walk runs of equal scores, giving each the average rank
    let mut rank_sum_pos = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        let avg_rank  = (start + 1 + end) as f64 / 2.0;
        let positives = order[start..end].iter().filter(|&&i| labels[i] == 1).count();
        rank_sum_pos += avg_rank * positives as f64;
        start = end;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Ok((rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}
