//! Record store: where fetched messages live between runs.
//!
//! The store is append-only from the engine's point of view: a record is
//! inserted the first time its id is seen and then left alone. The only way
//! to remove records is [`RecordStore::clear`], used by a full reload.

pub mod file;
pub mod format;
pub mod memory;
pub mod summary;

use chrono::{DateTime, FixedOffset};
use tracing::warn;

use crate::error::Result;
use crate::model::Record;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Result of an insert-or-skip upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// A record with this id already exists; the stored one was kept.
    Duplicate,
}

/// Storage for [`Record`]s.
pub trait RecordStore {
    /// Insert `record` unless a record with the same id already exists.
    fn upsert_if_absent(&mut self, record: Record) -> Result<UpsertOutcome>;

    /// Whether a record with this id is stored.
    fn contains(&self, id: &str) -> bool;

    /// All records, in insertion order.
    fn all(&self) -> Vec<Record>;

    /// Number of stored records.
    fn len(&self) -> usize;

    /// Whether the store holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every record.
    fn clear(&mut self) -> Result<()>;

    /// Whether the store has been initialised (written at least once).
    fn exists(&self) -> bool;

    /// Persist pending changes.
    fn flush(&mut self) -> Result<()>;

    /// The latest record date, ignoring records whose date does not parse.
    fn most_recent_date(&self) -> Option<DateTime<FixedOffset>> {
        latest_date(&self.all())
    }
}

/// Maximum parsed date over `records`, skipping unparseable dates.
pub(crate) fn latest_date(records: &[Record]) -> Option<DateTime<FixedOffset>> {
    records
        .iter()
        .filter_map(|record| match record.parsed_date() {
            Ok(date) => Some(date),
            Err(e) => {
                warn!(id = %record.id, error = %e, "Ignoring record with unparseable date");
                None
            }
        })
        .max()
}
