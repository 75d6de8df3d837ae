//! File-backed record store.
//!
//! The whole store is a single binary file (see [`super::format`]). It is
//! read fully into memory on open and rewritten atomically on
//! [`RecordStore::flush`].

use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::format::{StoreHeader, HEADER_SIZE, MAGIC, VERSION};
use super::{RecordStore, UpsertOutcome};
use crate::error::{Result, TriageError};
use crate::model::Record;

/// A [`RecordStore`] persisted to a single file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    records: Vec<Record>,
    ids: HashSet<String>,
    on_disk: bool,
    dirty: bool,
}

impl FileStore {
    /// Open the store at `path`, loading its records if the file exists.
    ///
    /// A missing file yields an empty store with `exists() == false`.
    /// A file that fails validation is an error, never silently discarded.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (records, on_disk) = if path.exists() {
            (read_store_file(&path)?, true)
        } else {
            debug!(path = %path.display(), "No store file yet");
            (Vec::new(), false)
        };

        let ids = records.iter().map(|r| r.id.clone()).collect();
        debug!(path = %path.display(), count = records.len(), "Opened record store");

        Ok(Self {
            path,
            records,
            ids,
            on_disk,
            dirty: false,
        })
    }

    /// Location of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for FileStore {
    fn upsert_if_absent(&mut self, record: Record) -> Result<UpsertOutcome> {
        if !self.ids.insert(record.id.clone()) {
            debug!(id = %record.id, "Duplicate record, skipping");
            return Ok(UpsertOutcome::Duplicate);
        }
        self.records.push(record);
        self.dirty = true;
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
        self.dirty = true;
        self.flush()
    }

    fn exists(&self) -> bool {
        self.on_disk
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty && self.on_disk {
            return Ok(());
        }
        write_store_file(&self.path, &self.records)?;
        self.on_disk = true;
        self.dirty = false;
        info!(path = %self.path.display(), count = self.records.len(), "Record store written");
        Ok(())
    }
}

/// Read and validate a store file.
fn read_store_file(path: &Path) -> Result<Vec<Record>> {
    let data = std::fs::read(path).map_err(|e| TriageError::io(path, e))?;
    let invalid = |reason: String| TriageError::InvalidStore {
        path: path.to_path_buf(),
        reason,
    };

    if data.len() < HEADER_SIZE {
        return Err(invalid("file too small".into()));
    }

    let header: StoreHeader = bincode::deserialize(&data[..HEADER_SIZE])
        .map_err(|e| invalid(format!("header deserialization failed: {e}")))?;
    header.validate().map_err(invalid)?;

    let payload = &data[HEADER_SIZE..];
    if sha256(payload) != header.sha256_payload {
        return Err(invalid("payload checksum mismatch".into()));
    }

    let records: Vec<Record> = bincode::deserialize(payload)
        .map_err(|e| invalid(format!("record deserialization failed: {e}")))?;

    if records.len() as u64 != header.record_count {
        return Err(invalid(format!(
            "record count mismatch: header says {}, payload has {}",
            header.record_count,
            records.len()
        )));
    }

    Ok(records)
}

/// Write header + payload to a temporary sibling file, then rename over `path`.
fn write_store_file(path: &Path, records: &[Record]) -> Result<()> {
    let invalid = |reason: String| TriageError::InvalidStore {
        path: path.to_path_buf(),
        reason,
    };

    let payload = bincode::serialize(records)
        .map_err(|e| invalid(format!("record serialization failed: {e}")))?;

    let header = StoreHeader {
        magic: *MAGIC,
        version: VERSION,
        flags: 0,
        record_count: records.len() as u64,
        sha256_payload: sha256(&payload),
    };
    let header_bytes = bincode::serialize(&header)
        .map_err(|e| invalid(format!("header serialization failed: {e}")))?;

    // Pad header to HEADER_SIZE
    let mut padded_header = vec![0u8; HEADER_SIZE];
    let copy_len = header_bytes.len().min(HEADER_SIZE);
    padded_header[..copy_len].copy_from_slice(&header_bytes[..copy_len]);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| TriageError::io(parent, e))?;
    }

    let tmp_path = temp_path_for(path);
    let written = write_temp_file(&tmp_path, &padded_header, &payload)
        .and_then(|()| std::fs::rename(&tmp_path, path).map_err(|e| TriageError::io(path, e)));
    if written.is_err() {
        if let Err(e) = std::fs::remove_file(&tmp_path) {
            debug!(path = %tmp_path.display(), error = %e, "Could not remove temporary store file");
        }
    }
    written
}

fn write_temp_file(tmp_path: &Path, header: &[u8], payload: &[u8]) -> Result<()> {
    let mut file = File::create(tmp_path).map_err(|e| TriageError::io(tmp_path, e))?;
    file.write_all(header)
        .map_err(|e| TriageError::io(tmp_path, e))?;
    file.write_all(payload)
        .map_err(|e| TriageError::io(tmp_path, e))?;
    file.sync_all().map_err(|e| TriageError::io(tmp_path, e))
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// `/data/emails.db` → `/data/.emails.db.tmp`
fn temp_path_for(path: &Path) -> PathBuf {
    let filename = path.file_name().unwrap_or_default().to_string_lossy();
    path.with_file_name(format!(".{filename}.tmp"))
}
