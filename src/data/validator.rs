// ============================================================
// Layer 4 — Dataset Validation
// ============================================================
// A partition with zero rows cannot be trained or scored on,
// so the flow stops before fitting anything.
//
// Both partitions are checked concurrently on scoped threads.
// The caller waits for both and gets back every failure at
// once, so an empty test set is reported even when the train
// set is also broken.

use std::any::Any;
use std::thread;

use crate::domain::{error::DataError, record::Dataset};

/// Fail if `data` holds no rows.
pub fn validate(data: &Dataset, name: &str) -> Result<(), DataError> {
    if data.is_empty() {
        return Err(DataError::EmptyDataset(name.to_string()));
    }
    tracing::debug!("{} validation passed ({} rows)", name, data.len());
    Ok(())
}

/// Validate the train and test partitions in parallel.
/// Each partition is checked against its own rows.
pub fn validate_splits(train: &Dataset, test: &Dataset) -> Result<(), DataError> {
    check_partitions(
        [("Train Dataset Validation", train), ("Test Dataset Validation", test)],
        validate,
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run `check` on every partition in its own scoped thread and
/// collect all failures, panics included.
fn check_partitions<const N: usize, F>(partitions: [(&str, &Dataset); N], check: F) -> Result<(), DataError>
where
    F: Fn(&Dataset, &str) -> Result<(), DataError> + Sync,
{
    let check   = &check;
    let results = thread::scope(|s| {
        let handles = partitions.map(|(name, data)| (name, s.spawn(move || check(data, name))));

        handles.map(|(name, handle)| match handle.join() {
            Ok(result) => result,
            Err(payload) => Err(DataError::ValidationPanicked {
                partition: name.to_string(),
                message:   panic_message(payload.as_ref()),
            }),
        })
    });

    let failures: Vec<String> = results
        .into_iter()
        .filter_map(Result::err)
        .map(|e| e.to_string())
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(DataError::InvalidPartitions(failures))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::Record;
    use serde_json::json;

    fn rows(n: usize) -> Dataset {
        Dataset::new(
            (0..n)
                .map(|i| Record::from([("x".to_string(), json!(i))]))
                .collect(),
        )
    }

    #[test]
    fn test_empty_dataset_fails() {
        let err = validate(&rows(0), "train").unwrap_err();
        assert_eq!(err, DataError::EmptyDataset("train".to_string()));
    }

    #[test]
    fn test_non_empty_dataset_passes() {
        assert!(validate(&rows(1), "train").is_ok());
    }

    #[test]
    fn test_both_partitions_valid() {
        assert!(validate_splits(&rows(8), &rows(2)).is_ok());
    }

    #[test]
    fn test_empty_test_partition_fails_even_with_rows_in_train() {
        // The test split must be checked on the test rows themselves
        let err = validate_splits(&rows(8), &rows(0)).unwrap_err();
        match err {
            DataError::InvalidPartitions(failures) => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].contains("Test Dataset Validation"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_panicking_check_is_reported_as_a_panic() {
        let err = check_partitions([("Train", &rows(3)), ("Test", &rows(1))], |data, name| {
            if name == "Test" {
                panic!("column store unavailable");
            }
            validate(data, name)
        })
        .unwrap_err();

        match err {
            DataError::InvalidPartitions(failures) => {
                assert_eq!(failures, vec!["Test panicked: column store unavailable".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_failures_from_both_partitions_are_aggregated() {
        let err = validate_splits(&rows(0), &rows(0)).unwrap_err();
        assert!(matches!(err, DataError::InvalidPartitions(ref f) if f.len() == 2));
    }
}
