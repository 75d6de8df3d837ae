//! Core data model: stored records and the fields extracted from provider messages.

pub mod date;
pub mod record;

pub use record::{MessageFields, Record};
