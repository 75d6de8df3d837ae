//! In-memory record store.

use std::collections::HashSet;

use tracing::debug;

use super::{RecordStore, UpsertOutcome};
use crate::error::Result;
use crate::model::Record;

/// A [`RecordStore`] that keeps everything in memory.
///
/// Used for tests and one-off runs where nothing needs to survive the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Vec<Record>,
    ids: HashSet<String>,
    initialised: bool,
}

impl MemoryStore {
    /// An empty store that reports `exists() == false` until first written.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with `records` (first occurrence of an id wins).
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut store = Self::new();
        for record in records {
            if store.ids.insert(record.id.clone()) {
                store.records.push(record);
            }
        }
        store.initialised = true;
        store
    }
}

impl RecordStore for MemoryStore {
    fn upsert_if_absent(&mut self, record: Record) -> Result<UpsertOutcome> {
        self.initialised = true;
        if !self.ids.insert(record.id.clone()) {
            debug!(id = %record.id, "Duplicate record, skipping");
            return Ok(UpsertOutcome::Duplicate);
        }
        self.records.push(record);
        Ok(UpsertOutcome::Inserted)
    }

    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn all(&self) -> Vec<Record> {
        self.records.clone()
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn clear(&mut self) -> Result<()> {
        self.records.clear();
        self.ids.clear();
        self.initialised = true;
        Ok(())
    }

    fn exists(&self) -> bool {
        self.initialised
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
