//! Running a matched record's actions against the mail provider.

use tracing::{info, warn};

use crate::error::Result;
use crate::model::Record;
use crate::provider::{find_label, Label, MailProvider, UNREAD_LABEL};
use crate::rules::Action;

/// Result of dispatching one record's actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Actions whose provider call succeeded, in the order they ran.
    pub applied: Vec<Action>,
    /// Actions skipped without a provider call.
    pub skipped: usize,
    /// `(action, reason)` for each failed action.
    pub failed: Vec<(String, String)>,
}

/// Executes actions against a provider, caching the label list for the run.
pub struct Dispatcher<'a, P: MailProvider> {
    provider: &'a P,
    labels: Option<Vec<Label>>,
}

impl<'a, P: MailProvider> Dispatcher<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self {
            provider,
            labels: None,
        }
    }

    /// Run `actions` in order for `record`.
    ///
    /// A failing action is recorded and the remaining actions still run.
    pub fn apply(&mut self, record: &Record, actions: &[Action]) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        for action in actions {
            match self.apply_one(&record.id, action) {
                Ok(true) => outcome.applied.push(action.clone()),
                Ok(false) => outcome.skipped += 1,
                Err(e) => {
                    warn!(id = %record.id, %action, error = %e, "Action failed");
                    outcome.failed.push((action.to_string(), e.to_string()));
                }
            }
        }
        outcome
    }

    /// Returns `Ok(false)` when the action was skipped.
    fn apply_one(&mut self, id: &str, action: &Action) -> Result<bool> {
        match action {
            Action::MarkAsRead => {
                self.provider.set_label(id, UNREAD_LABEL, false)?;
                info!(id, "Marked as read");
            }
            Action::MarkAsUnread => {
                self.provider.set_label(id, UNREAD_LABEL, true)?;
                info!(id, "Marked as unread");
            }
            Action::Move { folder_name } => {
                let Some(label_id) = self.resolve_label(folder_name)? else {
                    warn!(id, folder = %folder_name, "Folder not found, skipping");
                    return Ok(false);
                };
                self.provider.set_label(id, &label_id, true)?;
                info!(id, folder = %folder_name, "Moved to folder");
            }
        }
        Ok(true)
    }

    fn resolve_label(&mut self, folder_name: &str) -> Result<Option<String>> {
        if self.labels.is_none() {
            self.labels = Some(self.provider.list_labels()?);
        }
        Ok(self
            .labels
            .as_deref()
            .and_then(|labels| find_label(labels, folder_name))
            .map(|label| label.id.clone()))
    }
}
