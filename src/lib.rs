//! `mailtriage`: rule-driven email triage.
//!
//! Messages are pulled from a mail provider into a local record store, then
//! matched against a declarative rule document. Matching records get the
//! document's actions applied (mark read, mark unread, move to a label).

pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod rules;
pub mod store;
pub mod sync;
pub mod triage;
