//! Gmail REST API response models and field extraction.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TriageError};
use crate::model::MessageFields;
use crate::provider::Label;

/// URL-safe alphabet that accepts bodies with or without `=` padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessageIndex {
    pub id: String,
    #[serde(rename = "threadId", default)]
    pub thread_id: String,
}

/// One page of `users.messages.list`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageIndex>,
    #[serde(rename = "nextPageToken", default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    #[serde(rename = "resultSizeEstimate", default, skip_serializing_if = "Option::is_none")]
    pub result_size_estimate: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartBody {
    #[serde(rename = "attachmentId", default, skip_serializing_if = "Option::is_none")]
    pub attachment_id: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessagePart {
    #[serde(default)]
    pub body: PartBody,
    #[serde(default)]
    pub filename: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(rename = "partId", default)]
    pub part_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<MessagePart>,
}

/// `users.messages.get` with `format=full`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FullMessage {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "threadId", default)]
    pub thread_id: String,
    #[serde(rename = "labelIds", default, skip_serializing_if = "Vec::is_empty")]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub payload: MessagePart,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GmailLabel {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub label_type: Option<String>,
}

impl From<GmailLabel> for Label {
    fn from(label: GmailLabel) -> Self {
        Self {
            id: label.id,
            name: label.name,
        }
    }
}

/// `users.labels.list`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LabelList {
    #[serde(default)]
    pub labels: Vec<GmailLabel>,
}

/// Body of `users.messages.modify`.
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct ModifyRequest {
    #[serde(rename = "addLabelIds", skip_serializing_if = "Vec::is_empty")]
    pub add_label_ids: Vec<String>,
    #[serde(rename = "removeLabelIds", skip_serializing_if = "Vec::is_empty")]
    pub remove_label_ids: Vec<String>,
}

impl ModifyRequest {
    pub fn new(label_id: &str, add: bool) -> Self {
        let ids = vec![label_id.to_string()];
        if add {
            Self {
                add_label_ids: ids,
                ..Default::default()
            }
        } else {
            Self {
                remove_label_ids: ids,
                ..Default::default()
            }
        }
    }
}

impl FullMessage {
    /// Extract `From`/`To`/`Subject`/`Date` and the plain-text body.
    pub fn fields(&self) -> Result<MessageFields> {
        let mut fields = MessageFields::default();
        for header in &self.payload.headers {
            match header.name.as_str() {
                "From" => fields.from = header.value.clone(),
                "To" => fields.to = header.value.clone(),
                "Subject" => fields.subject = header.value.clone(),
                "Date" => fields.date = header.value.clone(),
                _ => {}
            }
        }

        let data = if self.payload.parts.is_empty() {
            self.payload.body.data.as_deref()
        } else {
            find_plain_text(&self.payload)
        };
        if let Some(data) = data {
            fields.message = decode_body(data)?;
        }
        Ok(fields)
    }
}

/// Depth-first search for the first `text/plain` part carrying inline data.
fn find_plain_text(part: &MessagePart) -> Option<&str> {
    if part.mime_type == "text/plain" {
        if let Some(data) = part.body.data.as_deref() {
            return Some(data);
        }
    }
    part.parts.iter().find_map(find_plain_text)
}

/// Decode a base64url body into text, replacing invalid UTF-8.
pub fn decode_body(data: &str) -> Result<String> {
    let bytes = URL_SAFE_LENIENT
        .decode(data.trim())
        .map_err(|e| TriageError::provider("extract_fields", format!("invalid base64 body: {e}")))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
