//! Outcome of a batch run.

use serde::Serialize;

/// Where a per-record failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// The record could not be evaluated (e.g. unparseable date).
    Evaluate,
    /// An action call to the provider failed.
    Action,
}

/// One failure recorded against a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub record_id: String,
    pub stage: FailureStage,
    /// The action that failed, for [`FailureStage::Action`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub reason: String,
}

/// Aggregated counters for one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Records looked at.
    pub processed: usize,
    /// Records whose rules matched.
    pub matched: usize,
    /// Records that could not be evaluated.
    pub skipped: usize,
    pub errors: Vec<RecordFailure>,
    /// Provider calls that succeeded.
    pub actions_applied: usize,
    /// Actions skipped without a provider call (e.g. unknown folder).
    pub actions_skipped: usize,
    /// Ids of matched records, in processing order.
    pub matched_ids: Vec<String>,
}

impl RunReport {
    /// Number of action calls that failed.
    pub fn actions_failed(&self) -> usize {
        self.errors
            .iter()
            .filter(|e| e.stage == FailureStage::Action)
            .count()
    }

    /// No record was skipped and no action failed.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let report = RunReport {
            processed: 2,
            matched: 1,
            skipped: 1,
            errors: vec![RecordFailure {
                record_id: "m2".into(),
                stage: FailureStage::Evaluate,
                action: None,
                reason: "bad date".into(),
            }],
            actions_applied: 1,
            actions_skipped: 0,
            matched_ids: vec!["m1".into()],
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["processed"], 2);
        assert_eq!(value["errors"][0]["stage"], "evaluate");
        assert!(value["errors"][0].get("action").is_none());
        assert_eq!(report.actions_failed(), 0);
        assert!(!report.is_clean());
    }
}
