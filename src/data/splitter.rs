// ============================================================
// Layer 4 — Train/Test Splitter
// ============================================================
// Randomly shuffles samples and splits them into two sets:
//   - Training set: used for the grid search and the final fit
//   - Test set:     held out, only scored once at the end
//
// Why shuffle before splitting?
//   Transaction dumps are usually ordered by time or by
//   account. Without shuffling the test set would only hold
//   the most recent slice of activity.
//
// Split sizes:
//   test  = ceil(test_fraction * n)
//   train = n - test
// Either side can come out empty on tiny inputs; catching that
// is the validator's job, not the splitter's.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.
// Passing a seed makes the split reproducible.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::domain::record::Dataset;

/// Randomly shuffle `samples` and split into (train, test).
///
/// # Arguments
/// * `samples`       - All available samples (consumed by this function)
/// * `test_fraction` - Proportion held out for testing, e.g. 0.2 = 20%
/// * `seed`          - Fixed shuffle seed, or `None` for a fresh one
pub fn split_train_test<T>(
    mut samples:   Vec<T>,
    test_fraction: f64,
    seed:          Option<u64>,
) -> (Vec<T>, Vec<T>) {
    match seed {
        Some(seed) => samples.shuffle(&mut StdRng::seed_from_u64(seed)),
        None       => samples.shuffle(&mut rand::thread_rng()),
    }

    let total     = samples.len();
    let test_size = test_count(total, test_fraction);

    // split_off(n) leaves [0..n) in `samples` and returns [n..)
    let test = samples.split_off(total - test_size);

    tracing::debug!(
        "Dataset split: {} training, {} test ({}% / {}%)",
        samples.len(),
        test.len(),
        (samples.len() * 100) / total.max(1),
        (test.len()    * 100) / total.max(1),
    );

    (samples, test)
}

/// Split a Dataset's rows; see [`split_train_test`].
pub fn split_dataset(dataset: Dataset, test_fraction: f64, seed: Option<u64>) -> (Dataset, Dataset) {
    let (train, test) = split_train_test(dataset.into_rows(), test_fraction, seed);
    (Dataset::new(train), Dataset::new(test))
}

/// Number of rows held out for `total` rows.
/// The small epsilon keeps 0.2 * 100 from rounding up to 21.
fn test_count(total: usize, test_fraction: f64) -> usize {
    let raw = (total as f64 * test_fraction - 1e-9).ceil();
    (raw.max(0.0) as usize).min(total)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_split_sizes() {
        let items: Vec<usize> = (0..100).collect();
        let (train, test)     = split_train_test(items, 0.2, None);
        assert_eq!(train.len(), 80);
        assert_eq!(test.len(),  20);
    }

    #[test]
    fn test_test_size_rounds_up() {
        // 0.25 * 10 = 2.5 → 3 test rows
        let items: Vec<usize> = (0..10).collect();
        let (train, test)     = split_train_test(items, 0.25, Some(7));
        assert_eq!(test.len(),  3);
        assert_eq!(train.len(), 7);
    }

    #[test]
    fn test_all_items_preserved() {
        // No items should be lost or duplicated in the split
        let items: Vec<usize> = (0..50).collect();
        let (train, test)     = split_train_test(items, 0.3, None);
        let mut all: Vec<usize> = train.into_iter().chain(test).collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_seed_makes_split_reproducible() {
        let a = split_train_test((0..40).collect::<Vec<usize>>(), 0.2, Some(42));
        let b = split_train_test((0..40).collect::<Vec<usize>>(), 0.2, Some(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_dataset() {
        let items: Vec<usize> = Vec::new();
        let (train, test)     = split_train_test(items, 0.2, None);
        assert!(train.is_empty());
        assert!(test.is_empty());
    }

    #[test]
    fn test_single_row_leaves_train_empty() {
        // ceil(0.2 * 1) = 1 → the only row goes to test
        let (train, test) = split_train_test(vec![1usize], 0.2, None);
        assert!(train.is_empty());
        assert_eq!(test.len(), 1);
    }
}
