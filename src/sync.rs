//! Ingestion of provider messages into the record store.
//!
//! Two modes:
//! - **Load**: clear the store and insert the newest `limit` messages.
//! - **Update**: insert only messages newer than the newest stored record.
//!
//! Load is chosen automatically when the store has never been written.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::Record;
use crate::provider::MailProvider;
use crate::store::{RecordStore, UpsertOutcome};

/// What a sync run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Load,
    Update,
    Skip,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Load => "load",
            Self::Update => "update",
            Self::Skip => "skip",
        })
    }
}

/// Options controlling mode selection and volume.
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Force a full reload.
    pub reload: bool,
    /// Allow incremental update when no reload happens.
    pub update: bool,
    /// Maximum number of message ids to list.
    pub limit: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            reload: false,
            update: true,
            limit: 10,
        }
    }
}

/// Counters for one sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub mode: SyncMode,
    /// Ids returned by the provider.
    pub listed: usize,
    /// Messages actually fetched.
    pub fetched: usize,
    pub inserted: usize,
    /// Already stored (skipped without fetching in update mode).
    pub duplicates: usize,
    /// Fetched but not newer than the newest stored record.
    pub older: usize,
    /// Fetch, extraction or date failures.
    pub failed: usize,
}

impl SyncReport {
    fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            listed: 0,
            fetched: 0,
            inserted: 0,
            duplicates: 0,
            older: 0,
            failed: 0,
        }
    }
}

/// Decide the mode for a store in its current state.
pub fn select_mode(store_exists: bool, options: &SyncOptions) -> SyncMode {
    if !store_exists || options.reload {
        SyncMode::Load
    } else if options.update {
        SyncMode::Update
    } else {
        SyncMode::Skip
    }
}

/// Bring `store` up to date with `provider`.
///
/// Per-message failures are logged and counted; failure to list messages
/// aborts the sync before the store is touched. The store is flushed before
/// returning.
pub fn sync<P, S>(
    provider: &P,
    store: &mut S,
    options: &SyncOptions,
    progress: Option<&dyn Fn(u64, u64)>,
) -> Result<SyncReport>
where
    P: MailProvider,
    S: RecordStore + ?Sized,
{
    let mode = select_mode(store.exists(), options);
    let mut report = SyncReport::new(mode);
    info!(%mode, limit = options.limit, "Starting sync");

    if mode == SyncMode::Skip {
        info!("Store exists and updates are disabled, nothing to sync");
        return Ok(report);
    }

    // A failed listing must leave the existing store untouched.
    let ids = provider.list_message_ids(options.limit)?;

    let latest = if mode == SyncMode::Load {
        store.clear()?;
        None
    } else {
        let latest = store.most_recent_date();
        debug!(latest = ?latest, "Newest stored record");
        latest
    };
    report.listed = ids.len();
    let total = ids.len() as u64;

    for (i, id) in ids.iter().enumerate() {
        if let Some(cb) = progress {
            cb(i as u64, total);
        }

        if mode == SyncMode::Update && store.contains(id) {
            report.duplicates += 1;
            continue;
        }

        let fields = match provider.fetch_fields(id) {
            Ok(fields) => fields,
            Err(e) => {
                warn!(id = %id, error = %e, "Failed to fetch message, skipping");
                report.failed += 1;
                continue;
            }
        };
        report.fetched += 1;
        let record = Record::new(id.as_str(), fields);

        if let Some(latest) = latest {
            match is_newer(&record, latest) {
                Ok(true) => {}
                Ok(false) => {
                    report.older += 1;
                    continue;
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "Cannot compare message date, skipping");
                    report.failed += 1;
                    continue;
                }
            }
        }

        match store.upsert_if_absent(record)? {
            UpsertOutcome::Inserted => report.inserted += 1,
            UpsertOutcome::Duplicate => report.duplicates += 1,
        }
    }

    if let Some(cb) = progress {
        cb(total, total);
    }
    store.flush()?;

    info!(
        %mode,
        listed = report.listed,
        inserted = report.inserted,
        duplicates = report.duplicates,
        older = report.older,
        failed = report.failed,
        "Sync finished"
    );
    Ok(report)
}

fn is_newer(record: &Record, latest: DateTime<FixedOffset>) -> Result<bool> {
    Ok(record.parsed_date()? > latest)
}
