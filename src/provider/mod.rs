//! Mail provider abstraction and implementations.
//!
//! The engine only needs a handful of capabilities from a mail service:
//! list message ids, fetch a message, turn it into [`MessageFields`], list
//! labels, and add or remove a label on a message. Marking read/unread is
//! expressed through the `UNREAD` system label, as Gmail does.

pub mod gmail;
pub mod memory;

use crate::error::Result;
use crate::model::MessageFields;

pub use memory::{MemoryProvider, ProviderCall};

/// System label whose presence means "unread".
pub const UNREAD_LABEL: &str = "UNREAD";

/// A folder/label as the provider knows it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
}

/// Capabilities the engine consumes from a mail service.
pub trait MailProvider {
    /// Provider-specific message payload.
    type Message;

    /// Ids of up to `limit` messages, newest first as the provider orders them.
    fn list_message_ids(&self, limit: usize) -> Result<Vec<String>>;

    /// Fetch one message.
    fn get_message(&self, id: &str) -> Result<Self::Message>;

    /// Extract the normalized fields of a fetched message.
    fn extract_fields(&self, message: &Self::Message) -> Result<MessageFields>;

    /// All labels visible to the account.
    fn list_labels(&self) -> Result<Vec<Label>>;

    /// Add (`add == true`) or remove a label on a message.
    fn set_label(&self, message_id: &str, label_id: &str, add: bool) -> Result<()>;

    /// Fetch a message and extract its fields in one step.
    fn fetch_fields(&self, id: &str) -> Result<MessageFields> {
        let message = self.get_message(id)?;
        self.extract_fields(&message)
    }
}

/// Find a label by name, case-insensitively.
pub fn find_label<'a>(labels: &'a [Label], name: &str) -> Option<&'a Label> {
    let wanted = name.to_lowercase();
    labels.iter().find(|l| l.name.to_lowercase() == wanted)
}
