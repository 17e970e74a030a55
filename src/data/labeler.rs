// ============================================================
// Layer 4 — Output Column Labeler
// ============================================================
// Derives the binary training label from a source column:
//
//   output = 1  if row[target_column] != condition_value
//   output = 0  otherwise
//
// Comparison rules:
//   - Two numbers compare numerically, so 1 == 1.0
//   - Anything else compares as JSON values
//   - A row without the target column counts as "different"
//     (a missing value never equals the condition)

use serde_json::Value;

use crate::domain::record::Dataset;

/// Add `output_column` to every row of `dataset`.
pub fn derive_output_column(
    dataset:       &mut Dataset,
    target_column: &str,
    condition:     &Value,
    output_column: &str,
) {
    dataset.set_column(output_column, |row| {
        let differs = match row.get(target_column) {
            Some(value) => !values_equal(value, condition),
            None        => true,
        };
        Value::from(i64::from(differs))
    });

    tracing::debug!(
        "Derived '{}' from '{}' != {}",
        output_column,
        target_column,
        condition
    );
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        // Null never equals anything, including another null
        (Value::Null, _) | (_, Value::Null) => false,
        _ => a == b,
    }
}
