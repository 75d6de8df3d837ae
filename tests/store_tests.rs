//! Integration tests for the record store and provider-to-store sync.

use assert_fs::prelude::*;
use chrono::DateTime;
use predicates::prelude::*;

use mailtriage::model::{MessageFields, Record};
use mailtriage::provider::{MemoryProvider, ProviderCall};
use mailtriage::store::{FileStore, MemoryStore, RecordStore, UpsertOutcome};
use mailtriage::sync::{sync, SyncMode, SyncOptions};

fn fields(from: &str, subject: &str, date: &str) -> MessageFields {
    MessageFields {
        from: from.into(),
        to: "me@example.com".into(),
        subject: subject.into(),
        date: date.into(),
        message: "body".into(),
    }
}

fn options(reload: bool, update: bool) -> SyncOptions {
    SyncOptions {
        reload,
        update,
        limit: 10,
    }
}

fn fetched_ids(provider: &MemoryProvider) -> Vec<String> {
    provider
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            ProviderCall::GetMessage { id } => Some(id),
            _ => None,
        })
        .collect()
}

// ─── File store ─────────────────────────────────────────────────────

#[test]
fn test_file_store_survives_reopen() {
    let temp = assert_fs::TempDir::new().unwrap();
    let db = temp.child("data").child("emails.db");

    let mut store = FileStore::open(db.path()).unwrap();
    assert!(!store.exists());
    let outcome = store
        .upsert_if_absent(Record::new(
            "m1",
            fields("a@x.com", "First", "Sat, 01 Jan 2022 12:00:00 +0000"),
        ))
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Inserted);
    store.flush().unwrap();

    db.assert(predicate::path::is_file());
    temp.child("data")
        .child(".emails.db.tmp")
        .assert(predicate::path::missing());

    let mut reopened = FileStore::open(db.path()).unwrap();
    assert!(reopened.exists());
    assert_eq!(reopened.len(), 1);
    assert_eq!(
        reopened
            .upsert_if_absent(Record::new("m1", fields("b@x.com", "Second", "")))
            .unwrap(),
        UpsertOutcome::Duplicate
    );
    assert_eq!(reopened.all()[0].subject, "First");

    temp.close().unwrap();
}

#[test]
fn test_file_store_rejects_truncated_file() {
    let temp = assert_fs::TempDir::new().unwrap();
    let db = temp.child("emails.db");

    let mut store = FileStore::open(db.path()).unwrap();
    store
        .upsert_if_absent(Record::new("m1", fields("a@x.com", "s", "")))
        .unwrap();
    store.flush().unwrap();

    let bytes = std::fs::read(db.path()).unwrap();
    db.write_binary(&bytes[..bytes.len() - 3]).unwrap();

    let err = FileStore::open(db.path()).unwrap_err().to_string();
    assert!(predicate::str::contains("emails.db").eval(&err));
}

#[test]
fn test_most_recent_date_uses_instants() {
    let store = MemoryStore::with_records(vec![
        Record::new("a", fields("", "", "Wed, 02 Jun 2021 06:00:00 +0000 (UTC)")),
        // Later instant, lexically smaller string.
        Record::new("b", fields("", "", "Thu, 03 Jun 2021 01:00:00 -0800")),
        Record::new("c", fields("", "", "garbage")),
    ]);
    assert_eq!(
        store.most_recent_date().unwrap(),
        DateTime::parse_from_rfc2822("Thu, 03 Jun 2021 01:00:00 -0800").unwrap()
    );
}

// ─── Sync ───────────────────────────────────────────────────────────

#[test]
fn test_first_sync_loads_everything() {
    let provider = MemoryProvider::new()
        .with_message("m1", fields("a@x.com", "One", "Sat, 01 Jan 2022 12:00:00 +0000"))
        .with_message("m2", fields("b@x.com", "Two", "Sun, 02 Jan 2022 12:00:00 +0000"));
    let mut store = MemoryStore::new();

    let report = sync(&provider, &mut store, &options(false, false), None).unwrap();

    assert_eq!(report.mode, SyncMode::Load);
    assert_eq!(report.listed, 2);
    assert_eq!(report.inserted, 2);
    assert_eq!(store.len(), 2);
    assert!(store.exists());
}

#[test]
fn test_update_inserts_only_newer_messages() {
    let provider = MemoryProvider::new()
        .with_message("new", fields("a@x.com", "New", "Mon, 03 Jan 2022 12:00:00 +0000"))
        .with_message("known", fields("b@x.com", "Known", "Sat, 01 Jan 2022 12:00:00 +0000"))
        .with_message("old", fields("c@x.com", "Old", "Fri, 31 Dec 2021 12:00:00 +0000"));
    let mut store = MemoryStore::with_records(vec![Record::new(
        "known",
        fields("b@x.com", "Known", "Sat, 01 Jan 2022 12:00:00 +0000"),
    )]);

    let report = sync(&provider, &mut store, &options(false, true), None).unwrap();

    assert_eq!(report.mode, SyncMode::Update);
    assert_eq!(report.inserted, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.older, 1);
    assert!(store.contains("new"));
    assert!(!store.contains("old"));
    // Already-stored ids are not fetched again.
    assert_eq!(fetched_ids(&provider), vec!["new", "old"]);
}

#[test]
fn test_reload_clears_previous_records() {
    let provider = MemoryProvider::new()
        .with_message("fresh", fields("a@x.com", "Fresh", "Mon, 03 Jan 2022 12:00:00 +0000"));
    let mut store = MemoryStore::with_records(vec![Record::new(
        "stale",
        fields("z@x.com", "Stale", "Sat, 01 Jan 2022 12:00:00 +0000"),
    )]);

    let report = sync(&provider, &mut store, &options(true, true), None).unwrap();

    assert_eq!(report.mode, SyncMode::Load);
    let ids: Vec<String> = store.all().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["fresh"]);
}

#[test]
fn test_failed_listing_keeps_stored_records_on_reload() {
    let temp = assert_fs::TempDir::new().unwrap();
    let db = temp.child("emails.db");
    let mut store = FileStore::open(db.path()).unwrap();
    store
        .upsert_if_absent(Record::new(
            "kept",
            fields("a@x.com", "Kept", "Sat, 01 Jan 2022 12:00:00 +0000"),
        ))
        .unwrap();
    store.flush().unwrap();

    let provider = MemoryProvider::new()
        .with_message("new", fields("b@x.com", "New", "Sun, 02 Jan 2022 12:00:00 +0000"))
        .failing_listing();
    assert!(sync(&provider, &mut store, &options(true, true), None).is_err());

    assert_eq!(store.len(), 1);
    let reopened = FileStore::open(db.path()).unwrap();
    assert_eq!(reopened.len(), 1);
    assert!(reopened.contains("kept"));
}

#[test]
fn test_skip_mode_touches_nothing() {
    let provider = MemoryProvider::new().with_message("m1", fields("", "", ""));
    let mut store = MemoryStore::with_records(Vec::new());

    let report = sync(&provider, &mut store, &options(false, false), None).unwrap();

    assert_eq!(report.mode, SyncMode::Skip);
    assert!(provider.calls().is_empty());
    assert!(store.is_empty());
}

#[test]
fn test_failed_fetch_is_counted_and_sync_continues() {
    let provider = MemoryProvider::new()
        .with_message("bad", fields("", "", ""))
        .with_message("good", fields("a@x.com", "Ok", "Sat, 01 Jan 2022 12:00:00 +0000"))
        .failing_on("bad");
    let mut store = MemoryStore::new();

    let report = sync(&provider, &mut store, &options(false, true), None).unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.inserted, 1);
    assert!(store.contains("good"));
}

#[test]
fn test_sync_into_file_store_reports_progress() {
    let temp = assert_fs::TempDir::new().unwrap();
    let db = temp.child("emails.db");
    let provider = MemoryProvider::new()
        .with_message("m1", fields("a@x.com", "One", "Sat, 01 Jan 2022 12:00:00 +0000"))
        .with_message("m2", fields("b@x.com", "Two", "Sun, 02 Jan 2022 12:00:00 +0000"));
    let mut store = FileStore::open(db.path()).unwrap();

    let seen = std::cell::RefCell::new(Vec::new());
    let progress = |current: u64, total: u64| seen.borrow_mut().push((current, total));
    sync(&provider, &mut store, &options(false, true), Some(&progress)).unwrap();

    db.assert(predicate::path::is_file());
    assert_eq!(FileStore::open(db.path()).unwrap().len(), 2);
    assert_eq!(seen.borrow().last(), Some(&(2, 2)));
}
