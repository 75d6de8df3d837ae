//! Rule evaluation against stored records.
//!
//! Evaluation is pure: it reads the record and the clock value passed in,
//! and never touches the store or the mail provider.

use chrono::{DateTime, Utc};

use super::document::{Combinator, Predicate, RuleClause, RuleDocument};
use super::interval::Interval;
use crate::error::Result;
use crate::model::Record;

/// Evaluate one clause against one record.
///
/// Text predicates compare case-insensitively. Date predicates parse the
/// record date and fail if it cannot be parsed.
pub fn evaluate(record: &Record, clause: &RuleClause, now: DateTime<Utc>) -> Result<bool> {
    let field_value = clause.field.value(record);

    let matched = match &clause.predicate {
        Predicate::Contains(needle) => field_value.to_lowercase().contains(needle.as_str()),
        Predicate::NotContains(needle) => !field_value.to_lowercase().contains(needle.as_str()),
        Predicate::Equals(expected) => field_value.to_lowercase() == *expected,
        Predicate::NotEquals(expected) => field_value.to_lowercase() != *expected,
        // Note the naming: `less_than N days` means "received less than N days ago".
        Predicate::LessThan(interval) => {
            matches_date(record, interval, now, |date, cutoff| date > cutoff)?
        }
        Predicate::GreaterThan(interval) => {
            matches_date(record, interval, now, |date, cutoff| date < cutoff)?
        }
        Predicate::Unsupported { .. } => false,
    };

    Ok(matched)
}

/// Combine all clauses of a document for one record.
///
/// `all` over no clauses is true; `any` over no clauses is false.
/// Evaluation short-circuits, so a clause after the deciding one is not
/// evaluated (and cannot fail).
pub fn matches(record: &Record, document: &RuleDocument, now: DateTime<Utc>) -> Result<bool> {
    match document.combinator {
        Combinator::All => {
            for clause in &document.rules {
                if !evaluate(record, clause, now)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Combinator::Any => {
            for clause in &document.rules {
                if evaluate(record, clause, now)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

fn matches_date(
    record: &Record,
    interval: &Interval,
    now: DateTime<Utc>,
    compare: impl Fn(DateTime<Utc>, DateTime<Utc>) -> bool,
) -> Result<bool> {
    let Some(cutoff) = interval.cutoff(now) else {
        return Ok(false);
    };
    let date = record.parsed_date()?.with_timezone(&Utc);
    Ok(compare(date, cutoff))
}
