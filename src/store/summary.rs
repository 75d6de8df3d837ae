//! Summary statistics over stored records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::Record;

/// Return the date range (oldest, newest) across records with a parseable date.
pub fn date_range(records: &[Record]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let mut dates = records
        .iter()
        .filter_map(|r| r.parsed_date().ok())
        .map(|d| d.with_timezone(&Utc));
    let first = dates.next()?;
    Some(dates.fold((first, first), |(min, max), d| (min.min(d), max.max(d))))
}

/// Count records whose date cannot be parsed.
pub fn count_unparseable_dates(records: &[Record]) -> usize {
    records.iter().filter(|r| r.parsed_date().is_err()).count()
}

/// Return the top N senders by record count.
///
/// Ties are ordered alphabetically so the output is stable.
pub fn top_senders(records: &[Record], n: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        let key = if record.from_mail.is_empty() {
            "(unknown)"
        } else {
            record.from_mail.as_str()
        };
        *counts.entry(key).or_default() += 1;
    }
    let mut sorted: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(sender, count)| (sender.to_string(), count))
        .collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted.truncate(n);
    sorted
}
