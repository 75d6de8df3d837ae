//! In-memory mail provider that records every call.
//!
//! Useful for tests and for exercising rule documents without a network.

use std::cell::RefCell;
use std::collections::HashSet;

use super::{Label, MailProvider, UNREAD_LABEL};
use crate::error::{Result, TriageError};
use crate::model::MessageFields;

/// A call observed by [`MemoryProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    ListMessageIds { limit: usize },
    GetMessage { id: String },
    ListLabels,
    SetLabel {
        message_id: String,
        label_id: String,
        add: bool,
    },
}

/// A [`MailProvider`] backed by a fixed list of messages and labels.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    messages: Vec<(String, MessageFields)>,
    labels: Vec<Label>,
    failing_messages: HashSet<String>,
    failing_listing: bool,
    calls: RefCell<Vec<ProviderCall>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message returned by `list_message_ids` / `get_message`.
    pub fn with_message(mut self, id: impl Into<String>, fields: MessageFields) -> Self {
        self.messages.push((id.into(), fields));
        self
    }

    /// Add a label returned by `list_labels`.
    pub fn with_label(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.labels.push(Label {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    /// Make every call touching this message id fail.
    pub fn failing_on(mut self, id: impl Into<String>) -> Self {
        self.failing_messages.insert(id.into());
        self
    }

    /// Make `list_message_ids` fail.
    pub fn failing_listing(mut self) -> Self {
        self.failing_listing = true;
        self
    }

    /// Calls observed so far, in order.
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.borrow().clone()
    }

    /// Only the label changes observed so far.
    pub fn label_changes(&self) -> Vec<ProviderCall> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, ProviderCall::SetLabel { .. }))
            .cloned()
            .collect()
    }

    /// Forget recorded calls.
    pub fn reset_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Whether the message is currently unread, replaying recorded label changes.
    pub fn is_unread(&self, message_id: &str) -> Option<bool> {
        self.calls.borrow().iter().rev().find_map(|c| match c {
            ProviderCall::SetLabel {
                message_id: id,
                label_id,
                add,
            } if id == message_id && label_id == UNREAD_LABEL => Some(*add),
            _ => None,
        })
    }

    fn record(&self, call: ProviderCall) {
        self.calls.borrow_mut().push(call);
    }

    fn check_failing(&self, operation: &str, id: &str) -> Result<()> {
        if self.failing_messages.contains(id) {
            return Err(TriageError::provider(
                operation,
                format!("simulated failure for message {id}"),
            ));
        }
        Ok(())
    }
}

impl MailProvider for MemoryProvider {
    type Message = MessageFields;

    fn list_message_ids(&self, limit: usize) -> Result<Vec<String>> {
        self.record(ProviderCall::ListMessageIds { limit });
        if self.failing_listing {
            return Err(TriageError::provider(
                "list_message_ids",
                "simulated listing failure",
            ));
        }
        Ok(self
            .messages
            .iter()
            .take(limit)
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn get_message(&self, id: &str) -> Result<MessageFields> {
        self.record(ProviderCall::GetMessage { id: id.to_string() });
        self.check_failing("get_message", id)?;
        self.messages
            .iter()
            .find(|(mid, _)| mid == id)
            .map(|(_, fields)| fields.clone())
            .ok_or_else(|| TriageError::provider("get_message", format!("message {id} not found")))
    }

    fn extract_fields(&self, message: &MessageFields) -> Result<MessageFields> {
        Ok(message.clone())
    }

    fn list_labels(&self) -> Result<Vec<Label>> {
        self.record(ProviderCall::ListLabels);
        Ok(self.labels.clone())
    }

    fn set_label(&self, message_id: &str, label_id: &str, add: bool) -> Result<()> {
        self.record(ProviderCall::SetLabel {
            message_id: message_id.to_string(),
            label_id: label_id.to_string(),
            add,
        });
        self.check_failing("set_label", message_id)
    }
}
