//! Single-pass batch evaluation of stored records.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::dispatch::Dispatcher;
use super::report::{FailureStage, RecordFailure, RunReport};
use crate::model::Record;
use crate::provider::MailProvider;
use crate::rules::{matches, RuleDocument};

/// Evaluate every record and dispatch the document's actions on matches.
///
/// Records are processed in the order given. A record that cannot be
/// evaluated is skipped and reported; the batch always runs to the end.
pub fn run<P: MailProvider>(
    records: &[Record],
    document: &RuleDocument,
    dispatcher: &mut Dispatcher<'_, P>,
    now: DateTime<Utc>,
) -> RunReport {
    let mut report = RunReport::default();
    info!(records = records.len(), "Processing emails");

    for record in records {
        if !evaluate_into(record, document, now, &mut report) {
            continue;
        }

        let outcome = dispatcher.apply(record, &document.actions);
        report.actions_applied += outcome.applied.len();
        report.actions_skipped += outcome.skipped;
        report
            .errors
            .extend(outcome.failed.into_iter().map(|(action, reason)| RecordFailure {
                record_id: record.id.clone(),
                stage: FailureStage::Action,
                action: Some(action),
                reason,
            }));
    }

    info!(
        processed = report.processed,
        matched = report.matched,
        skipped = report.skipped,
        actions_applied = report.actions_applied,
        errors = report.errors.len(),
        "Batch finished"
    );
    report
}

/// Evaluate every record without running any action.
pub fn preview(records: &[Record], document: &RuleDocument, now: DateTime<Utc>) -> RunReport {
    let mut report = RunReport::default();
    for record in records {
        evaluate_into(record, document, now, &mut report);
    }
    report
}

/// Returns whether the record matched; updates counters either way.
fn evaluate_into(
    record: &Record,
    document: &RuleDocument,
    now: DateTime<Utc>,
    report: &mut RunReport,
) -> bool {
    report.processed += 1;
    match matches(record, document, now) {
        Ok(true) => {
            debug!(id = %record.id, subject = %record.subject, "Rules matched");
            report.matched += 1;
            report.matched_ids.push(record.id.clone());
            true
        }
        Ok(false) => false,
        Err(e) => {
            warn!(id = %record.id, error = %e, "Cannot evaluate record, skipping");
            report.skipped += 1;
            report.errors.push(RecordFailure {
                record_id: record.id.clone(),
                stage: FailureStage::Evaluate,
                action: None,
                reason: e.to_string(),
            });
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageFields;
    use crate::provider::MemoryProvider;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn record(id: &str, from: &str, date: &str) -> Record {
        Record::new(
            id,
            MessageFields {
                from: from.into(),
                date: date.into(),
                ..Default::default()
            },
        )
    }

    const DOC: &str = r#"{
        "predicate": "any",
        "rules": [{"field": "from_mail", "predicate": "contains", "value": "news"}],
        "actions": [{"name": "mark_as_read"}]
    }"#;

    #[test]
    fn test_preview_makes_no_calls() {
        let document = RuleDocument::from_json(DOC).unwrap();
        let records = vec![
            record("m1", "news@site.com", ""),
            record("m2", "boss@work.com", ""),
        ];
        let report = preview(&records, &document, now());
        assert_eq!(report.processed, 2);
        assert_eq!(report.matched_ids, vec!["m1"]);
        assert_eq!(report.actions_applied, 0);
    }

    #[test]
    fn test_date_failure_is_isolated() {
        let document = RuleDocument::from_json(
            r#"{"predicate": "all",
                "rules": [{"field": "date", "predicate": "less_than", "value": "2 days"}],
                "actions": [{"name": "mark_as_read"}]}"#,
        )
        .unwrap();
        let records = vec![
            record("bad", "a@x.com", "yesterday-ish"),
            record("good", "b@x.com", "Wed, 01 May 2024 06:00:00 +0000"),
        ];
        let provider = MemoryProvider::new();
        let mut dispatcher = Dispatcher::new(&provider);
        let report = run(&records, &document, &mut dispatcher, now());

        assert_eq!(report.processed, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.matched, 1);
        assert_eq!(report.errors[0].record_id, "bad");
        assert_eq!(report.errors[0].stage, FailureStage::Evaluate);
        assert_eq!(provider.label_changes().len(), 1);
    }

    #[test]
    fn test_action_failures_reported_per_record() {
        let document = RuleDocument::from_json(DOC).unwrap();
        let records = vec![
            record("m1", "news@site.com", ""),
            record("m2", "news@other.com", ""),
        ];
        let provider = MemoryProvider::new().failing_on("m1");
        let mut dispatcher = Dispatcher::new(&provider);
        let report = run(&records, &document, &mut dispatcher, now());

        assert_eq!(report.matched, 2);
        assert_eq!(report.actions_applied, 1);
        assert_eq!(report.actions_failed(), 1);
        assert_eq!(report.errors[0].record_id, "m1");
        assert_eq!(report.errors[0].action.as_deref(), Some("mark_as_read"));
    }
}
