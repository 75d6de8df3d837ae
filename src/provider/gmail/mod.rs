//! Gmail REST API provider.

pub mod auth;
pub mod model;
#[cfg(test)]
mod test_server;

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use self::auth::excerpt;
use self::model::{FullMessage, LabelList, MessageList, ModifyRequest};
use super::{Label, MailProvider};
use crate::config::GmailConfig;
use crate::error::{Result, TriageError};
use crate::model::MessageFields;

/// Gmail caps `maxResults` on `messages.list` at 500.
const MAX_PAGE_SIZE: usize = 500;

/// A [`MailProvider`] talking to the Gmail REST API as `users/me`.
#[derive(Debug)]
pub struct GmailClient {
    http: Client,
    api_base: String,
    query: String,
    access_token: String,
}

impl GmailClient {
    /// Build an HTTP client with the configured timeout.
    pub fn http_client(config: &GmailConfig) -> Result<Client> {
        Ok(Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("mailtriage/", env!("CARGO_PKG_VERSION")))
            .build()?)
    }

    /// Authenticate with the configured credential files and build a client.
    pub fn connect(config: &GmailConfig) -> Result<Self> {
        let http = Self::http_client(config)?;
        let access_token = auth::access_token(&config.credentials_file, &config.token_file)?;
        Ok(Self::with_token(http, config, access_token))
    }

    pub fn with_token(http: Client, config: &GmailConfig, access_token: String) -> Self {
        Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            query: config.query.clone(),
            access_token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/gmail/v1/users/me/{path}", self.api_base)
    }

    fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response> {
        let response = request.bearer_auth(&self.access_token).send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(TriageError::provider(
            operation,
            format!("HTTP {status}: {}", excerpt(&body)),
        ))
    }

    fn get_json<T: DeserializeOwned>(&self, operation: &str, request: RequestBuilder) -> Result<T> {
        let response = self.send(operation, request)?;
        let body = response.text()?;
        serde_json::from_str(&body).map_err(|e| {
            TriageError::provider(operation, format!("unexpected response shape: {e}"))
        })
    }
}

impl MailProvider for GmailClient {
    type Message = FullMessage;

    fn list_message_ids(&self, limit: usize) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        while ids.len() < limit {
            let page_size = (limit - ids.len()).min(MAX_PAGE_SIZE).to_string();
            let mut query = vec![("maxResults", page_size), ("q", self.query.clone())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let request = self.http.get(self.url("messages")).query(&query);
            let page: MessageList = self.get_json("messages.list", request)?;
            debug!(count = page.messages.len(), "Fetched message page");

            ids.extend(page.messages.into_iter().map(|m| m.id));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        ids.truncate(limit);
        info!(count = ids.len(), query = %self.query, "Listed messages");
        Ok(ids)
    }

    fn get_message(&self, id: &str) -> Result<FullMessage> {
        let request = self
            .http
            .get(self.url(&format!("messages/{id}")))
            .query(&[("format", "full")]);
        self.get_json("messages.get", request)
    }

    fn extract_fields(&self, message: &FullMessage) -> Result<MessageFields> {
        message.fields()
    }

    fn list_labels(&self) -> Result<Vec<Label>> {
        let request = self.http.get(self.url("labels"));
        let list: LabelList = self.get_json("labels.list", request)?;
        Ok(list.labels.into_iter().map(Label::from).collect())
    }

    fn set_label(&self, message_id: &str, label_id: &str, add: bool) -> Result<()> {
        let request = self
            .http
            .post(self.url(&format!("messages/{message_id}/modify")))
            .json(&ModifyRequest::new(label_id, add));
        self.send("messages.modify", request)?;
        debug!(message_id, label_id, add, "Label changed");
        Ok(())
    }
}
