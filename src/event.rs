//! Queue event decoding.
//!
//! Work-queue messages carry a base64-encoded JSON body of the shape
//! `{"eventType": "...", "data": {"url": "..."}}`. A deletion notification
//! (an `eventType` ending in `BlobDeleted`) maps to [`DocumentAction::Remove`];
//! any other event maps to [`DocumentAction::Add`]. `RemoveAll` exists only
//! for manual triggers and is never derived from a queue event.

use base64::prelude::*;
use serde::Deserialize;

use crate::error::{RelayError, Result};

/// What to do with the file a message or manual trigger refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentAction {
    Add,
    Remove,
    RemoveAll,
}

impl DocumentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentAction::Add => "add",
            DocumentAction::Remove => "remove",
            DocumentAction::RemoveAll => "removeall",
        }
    }

    /// Parse a manual-trigger action string (`add`/`remove`/`removeall`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "add" => Some(DocumentAction::Add),
            "remove" => Some(DocumentAction::Remove),
            "removeall" => Some(DocumentAction::RemoveAll),
            _ => None,
        }
    }
}

/// A decoded unit of work from the queue.
#[derive(Debug, Clone)]
pub struct QueueEvent {
    pub blob_url: String,
    pub event_type: String,
    pub category: Option<String>,
    pub action: DocumentAction,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "eventType")]
    event_type: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    url: String,
}

/// Decode a base64 message body into a [`QueueEvent`].
///
/// Any base64 or JSON failure maps to [`RelayError::Decode`], which the
/// consumer treats the same as a dispatch failure (dead-lettered).
pub fn decode_event(body: &str) -> Result<QueueEvent> {
    let bytes = BASE64_STANDARD
        .decode(body.trim())
        .map_err(|e| RelayError::Decode(format!("invalid base64: {}", e)))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| RelayError::Decode(format!("invalid utf-8: {}", e)))?;
    let raw: RawEvent = serde_json::from_str(&text)
        .map_err(|e| RelayError::Decode(format!("invalid event JSON: {}", e)))?;

    let action = if raw.event_type.ends_with("BlobDeleted") {
        DocumentAction::Remove
    } else {
        DocumentAction::Add
    };

    Ok(QueueEvent {
        blob_url: raw.data.url,
        event_type: raw.event_type,
        category: None,
        action,
    })
}

/// Encode an event body the way the storage account's event subscription
/// does. Used by tests and the local tooling.
pub fn encode_event(event_type: &str, url: &str) -> String {
    let json = serde_json::json!({ "eventType": event_type, "data": { "url": url } });
    BASE64_STANDARD.encode(json.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_event_maps_to_add() {
        let body = encode_event(
            "Microsoft.Storage.BlobCreated",
            "https://acct.blob.core.windows.net/content/report.pdf",
        );
        let event = decode_event(&body).unwrap();
        assert_eq!(event.action, DocumentAction::Add);
        assert_eq!(
            event.blob_url,
            "https://acct.blob.core.windows.net/content/report.pdf"
        );
        assert!(event.category.is_none());
    }

    #[test]
    fn deleted_event_maps_to_remove() {
        let body = encode_event(
            "Microsoft.Storage.BlobDeleted",
            "https://acct.blob.core.windows.net/content/report.pdf",
        );
        let event = decode_event(&body).unwrap();
        assert_eq!(event.action, DocumentAction::Remove);
        assert_eq!(event.event_type, "Microsoft.Storage.BlobDeleted");
    }

    #[test]
    fn garbage_base64_is_a_decode_failure() {
        let err = decode_event("not base64 at all!!!").unwrap_err();
        assert!(matches!(err, RelayError::Decode(_)));
    }

    #[test]
    fn valid_base64_invalid_json_is_a_decode_failure() {
        let body = BASE64_STANDARD.encode("{\"eventType\": \"x\"");
        let err = decode_event(&body).unwrap_err();
        assert!(matches!(err, RelayError::Decode(_)));
    }

    #[test]
    fn manual_action_parse() {
        assert_eq!(DocumentAction::parse("ADD"), Some(DocumentAction::Add));
        assert_eq!(
            DocumentAction::parse("removeall"),
            Some(DocumentAction::RemoveAll)
        );
        assert_eq!(DocumentAction::parse("purge"), None);
    }
}
