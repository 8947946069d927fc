//! Work and dead-letter queue access.
//!
//! The relay consumes from exactly one work queue and writes to exactly one
//! dead-letter queue; [`MessageQueue`] is the narrow contract both share.
//! A received message stays invisible to other consumers for the requested
//! visibility timeout and becomes redeliverable afterwards unless deleted —
//! at-least-once delivery, never exactly-once.
//!
//! [`RestQueueClient`] talks to the queue-storage REST endpoint (XML
//! bodies, parsed with plain string scanning — no XML dependency needed for
//! three fixed tags). [`MemoryQueue`] implements the same visibility
//! semantics in process for tests and local runs.

use async_trait::async_trait;
use base64::prelude::*;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::{RelayError, Result};

/// A message leased from a queue. Deleting requires both the id and the
/// pop receipt issued by the receive that leased it.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub id: String,
    pub pop_receipt: String,
    pub body: String,
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Lease up to `max_messages`, hiding them for `visibility_timeout`.
    async fn receive(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>>;

    /// Permanently delete a leased message.
    async fn delete(&self, message: &ReceivedMessage) -> Result<()>;

    /// Append a new message body to the queue.
    async fn send(&self, body: &str) -> Result<()>;
}

// ============ REST queue client ============

pub struct RestQueueClient {
    base_url: String,
    queue_name: String,
    sas_token: Option<String>,
    client: reqwest::Client,
}

impl RestQueueClient {
    pub fn new(base_url: String, queue_name: String, sas_token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            queue_name,
            sas_token,
            client: reqwest::Client::new(),
        }
    }

    /// Build the work-queue and dead-letter-queue clients from the config.
    pub fn pair_from_config(config: &QueueConfig) -> (Self, Self) {
        let base = match config.endpoint_url {
            Some(ref url) => url.clone(),
            None => format!("https://{}.queue.core.windows.net", config.account),
        };
        (
            Self::new(base.clone(), config.work_queue.clone(), config.sas_token.clone()),
            Self::new(base, config.deadletter_queue.clone(), config.sas_token.clone()),
        )
    }

    fn url(&self, suffix: &str, params: &str) -> String {
        let mut url = format!("{}/{}{}", self.base_url, self.queue_name, suffix);
        let mut sep = '?';
        if !params.is_empty() {
            url.push(sep);
            url.push_str(params);
            sep = '&';
        }
        if let Some(ref sas) = self.sas_token {
            url.push(sep);
            url.push_str(sas);
        }
        url
    }
}

#[async_trait]
impl MessageQueue for RestQueueClient {
    async fn receive(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>> {
        let url = self.url(
            "/messages",
            &format!(
                "numofmessages={}&visibilitytimeout={}",
                max_messages,
                visibility_timeout.as_secs()
            ),
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RelayError::Queue(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(RelayError::Queue(format!(
                "receive from '{}' failed: HTTP {}",
                self.queue_name,
                resp.status()
            )));
        }
        let xml = resp
            .text()
            .await
            .map_err(|e| RelayError::Queue(e.to_string()))?;
        parse_message_list(&xml)
    }

    async fn delete(&self, message: &ReceivedMessage) -> Result<()> {
        let url = self.url(
            &format!("/messages/{}", message.id),
            &format!("popreceipt={}", message.pop_receipt),
        );
        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| RelayError::Queue(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(RelayError::Queue(format!(
                "delete of message '{}' failed: HTTP {}",
                message.id,
                resp.status()
            )));
        }
        Ok(())
    }

    async fn send(&self, body: &str) -> Result<()> {
        let url = self.url("/messages", "");
        let payload = format!(
            "<QueueMessage><MessageText>{}</MessageText></QueueMessage>",
            body
        );
        let resp = self
            .client
            .post(&url)
            .body(payload)
            .send()
            .await
            .map_err(|e| RelayError::Queue(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(RelayError::Queue(format!(
                "send to '{}' failed: HTTP {}",
                self.queue_name,
                resp.status()
            )));
        }
        Ok(())
    }
}

/// Parse a `<QueueMessagesList>` response into received messages.
fn parse_message_list(xml: &str) -> Result<Vec<ReceivedMessage>> {
    let mut messages = Vec::new();
    let mut remaining = xml;
    while let Some(start) = remaining.find("<QueueMessage>") {
        let block_start = start + "<QueueMessage>".len();
        let Some(end) = remaining[block_start..].find("</QueueMessage>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];

        let id = extract_xml_value(block, "MessageId");
        let pop_receipt = extract_xml_value(block, "PopReceipt");
        let body = extract_xml_value(block, "MessageText");
        match (id, pop_receipt, body) {
            (Some(id), Some(pop_receipt), Some(body)) => messages.push(ReceivedMessage {
                id,
                pop_receipt,
                body,
            }),
            _ => {
                return Err(RelayError::Queue(
                    "malformed QueueMessage block in receive response".to_string(),
                ))
            }
        }

        remaining = &remaining[block_start + end + "</QueueMessage>".len()..];
    }
    Ok(messages)
}

/// Extract the text content of a simple, non-nested XML tag.
fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)?;
    Some(xml[start..start + end].to_string())
}

// ============ In-memory queue ============

struct StoredMessage {
    id: String,
    body: String,
    pop_receipt: Option<String>,
    visible_at: Instant,
}

/// In-process queue with the same lease semantics as the REST client.
#[derive(Default)]
pub struct MemoryQueue {
    messages: Mutex<Vec<StoredMessage>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages currently in the queue, visible or leased.
    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Message bodies in queue order, regardless of lease state.
    pub fn bodies(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.body.clone())
            .collect()
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn receive(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>> {
        let now = Instant::now();
        let mut messages = self.messages.lock().unwrap();
        let mut leased = Vec::new();
        for stored in messages.iter_mut() {
            if leased.len() == max_messages {
                break;
            }
            if stored.visible_at > now {
                continue;
            }
            let pop_receipt = Uuid::new_v4().to_string();
            stored.pop_receipt = Some(pop_receipt.clone());
            stored.visible_at = now + visibility_timeout;
            leased.push(ReceivedMessage {
                id: stored.id.clone(),
                pop_receipt,
                body: stored.body.clone(),
            });
        }
        Ok(leased)
    }

    async fn delete(&self, message: &ReceivedMessage) -> Result<()> {
        let mut messages = self.messages.lock().unwrap();
        let before = messages.len();
        messages.retain(|m| {
            !(m.id == message.id && m.pop_receipt.as_deref() == Some(&message.pop_receipt))
        });
        if messages.len() == before {
            return Err(RelayError::Queue(format!(
                "no leased message '{}' with matching pop receipt",
                message.id
            )));
        }
        Ok(())
    }

    async fn send(&self, body: &str) -> Result<()> {
        self.messages.lock().unwrap().push(StoredMessage {
            id: Uuid::new_v4().to_string(),
            body: body.to_string(),
            pop_receipt: None,
            visible_at: Instant::now(),
        });
        Ok(())
    }
}

/// Decode a dead-letter body back into its JSON record. Test helper for
/// inspecting dead-letter queues.
pub fn decode_deadletter_body(body: &str) -> Result<serde_json::Value> {
    let bytes = BASE64_STANDARD
        .decode(body.trim())
        .map_err(|e| RelayError::Decode(format!("invalid base64: {}", e)))?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_message_list() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<QueueMessagesList>
  <QueueMessage>
    <MessageId>msg-1</MessageId>
    <InsertionTime>Fri, 09 Oct 2026 21:04:30 GMT</InsertionTime>
    <PopReceipt>rcpt-1</PopReceipt>
    <MessageText>aGVsbG8=</MessageText>
  </QueueMessage>
  <QueueMessage>
    <MessageId>msg-2</MessageId>
    <PopReceipt>rcpt-2</PopReceipt>
    <MessageText>d29ybGQ=</MessageText>
  </QueueMessage>
</QueueMessagesList>"#;
        let messages = parse_message_list(xml).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "msg-1");
        assert_eq!(messages[0].pop_receipt, "rcpt-1");
        assert_eq!(messages[1].body, "d29ybGQ=");
    }

    #[test]
    fn empty_list_parses_to_no_messages() {
        let xml = "<?xml version=\"1.0\"?><QueueMessagesList></QueueMessagesList>";
        assert!(parse_message_list(xml).unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_queue_leases_and_deletes() {
        let queue = MemoryQueue::new();
        queue.send("one").await.unwrap();
        queue.send("two").await.unwrap();

        let leased = queue.receive(10, Duration::from_secs(300)).await.unwrap();
        assert_eq!(leased.len(), 2);

        // Leased messages are invisible to a second receive.
        let again = queue.receive(10, Duration::from_secs(300)).await.unwrap();
        assert!(again.is_empty());

        queue.delete(&leased[0]).await.unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn expired_lease_becomes_redeliverable() {
        let queue = MemoryQueue::new();
        queue.send("msg").await.unwrap();

        let leased = queue.receive(1, Duration::from_millis(0)).await.unwrap();
        assert_eq!(leased.len(), 1);

        // Zero visibility timeout: immediately redeliverable.
        let again = queue.receive(1, Duration::from_secs(300)).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].id, leased[0].id);
    }
}
