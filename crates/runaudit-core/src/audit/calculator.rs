//! Failure-rate calculation over a window of runs

use crate::models::{AuditResult, RunRecord};

/// Counts runs carrying a failure marker
#[derive(Debug, Clone)]
pub struct FailureRateCalculator {
    marker_field: String,
    marker_value: String,
}

impl FailureRateCalculator {
    /// Create a calculator that treats `field == value` as a failed run
    pub fn new(marker_field: impl Into<String>, marker_value: impl Into<String>) -> Self {
        Self {
            marker_field: marker_field.into(),
            marker_value: marker_value.into(),
        }
    }

    /// Whether a single run is a failure
    pub fn is_failed(&self, run: &RunRecord) -> bool {
        run.field_str(&self.marker_field) == Some(self.marker_value.as_str())
    }

    /// Compute counts and ratio; `None` when there are no runs to evaluate
    pub fn compute(&self, runs: &[RunRecord]) -> Option<AuditResult> {
        if runs.is_empty() {
            return None;
        }

        let total = runs.len();
        let failed = runs.iter().filter(|run| self.is_failed(run)).count();

        Some(AuditResult {
            total,
            failed,
            ratio: failed as f64 / total as f64,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    pub(crate) fn runs(total: usize, failed: usize) -> Vec<RunRecord> {
        (0..total)
            .map(|i| {
                let marker = if i < failed { "did_not_find_load" } else { "found_load" };
                serde_json::from_value(json!({
                    "id": format!("run_{i}"),
                    "status": "completed",
                    "could_not_find_load_id": marker,
                }))
                .unwrap()
            })
            .collect()
    }

    fn calculator() -> FailureRateCalculator {
        FailureRateCalculator::new("could_not_find_load_id", "did_not_find_load")
    }

    #[test]
    fn test_empty_window_has_no_result() {
        assert_eq!(calculator().compute(&[]), None);
    }

    #[test]
    fn test_counts_only_exact_marker() {
        let mut records = runs(4, 1);
        records.push(
            serde_json::from_value(json!({"id": "x", "status": "completed"})).unwrap(),
        );
        records.push(
            serde_json::from_value(json!({
                "id": "y",
                "status": "completed",
                "could_not_find_load_id": "DID_NOT_FIND_LOAD"
            }))
            .unwrap(),
        );

        let result = calculator().compute(&records).unwrap();

        assert_eq!(result.total, 6);
        assert_eq!(result.failed, 1);
    }

    #[test]
    fn test_thirty_of_hundred() {
        let result = calculator().compute(&runs(100, 30)).unwrap();

        assert_eq!(result.total, 100);
        assert_eq!(result.failed, 30);
        assert!((result.ratio - 0.30).abs() < f64::EPSILON);
    }

    proptest! {
        #[test]
        fn ratio_is_bounded_and_exact(total in 1usize..200, failed_seed in 0usize..200) {
            let failed = failed_seed % (total + 1);
            let result = calculator().compute(&runs(total, failed)).unwrap();

            prop_assert_eq!(result.total, total);
            prop_assert_eq!(result.failed, failed);
            prop_assert!((0.0..=1.0).contains(&result.ratio));
            prop_assert_eq!(result.ratio, failed as f64 / total as f64);
        }
    }
}
