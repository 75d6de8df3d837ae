//! Stored email records.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::date::parse_header_date;
use crate::error::Result;

/// Normalized fields extracted from a provider message.
///
/// Every field is a plain string; anything the message did not carry is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFields {
    pub from: String,
    pub to: String,
    pub subject: String,
    /// Raw `Date:` header value.
    pub date: String,
    /// Plain-text body.
    pub message: String,
}

/// One email as kept in the record store.
///
/// Records are created the first time a message id is seen and never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Provider message id (primary key).
    pub id: String,
    pub from_mail: String,
    pub to_mail: String,
    pub subject: String,
    /// Raw `Date:` header, e.g. `"Wed, 02 Jun 2021 06:00:00 +0000 (UTC)"`.
    pub date: String,
    pub message: String,
}

impl Record {
    /// Build a record from a message id and its extracted fields.
    pub fn new(id: impl Into<String>, fields: MessageFields) -> Self {
        Self {
            id: id.into(),
            from_mail: fields.from,
            to_mail: fields.to,
            subject: fields.subject,
            date: fields.date,
            message: fields.message,
        }
    }

    /// The record date as an offset-aware timestamp.
    pub fn parsed_date(&self) -> Result<DateTime<FixedOffset>> {
        parse_header_date(&self.date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_fields() {
        let fields = MessageFields {
            from: "test@example.com".into(),
            to: "recipient@example.com".into(),
            subject: "Test Subject".into(),
            date: "Sat, 01 Jan 2022 12:00:00 +0000".into(),
            message: "This is a test message".into(),
        };
        let record = Record::new("test-id-1", fields);
        assert_eq!(record.id, "test-id-1");
        assert_eq!(record.from_mail, "test@example.com");
        assert_eq!(record.to_mail, "recipient@example.com");
        assert_eq!(record.message, "This is a test message");
        assert!(record.parsed_date().is_ok());
    }

    #[test]
    fn test_missing_fields_are_empty() {
        let record = Record::new("x", MessageFields::default());
        assert!(record.subject.is_empty());
        assert!(record.parsed_date().is_err());
    }
}
