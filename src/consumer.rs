//! Batch queue consumer with dead-letter routing.
//!
//! One [`QueueConsumer::run_cycle`] call drains one batch from the work
//! queue. Every message gets exactly one attempt: on success it is deleted;
//! on any decode or dispatch failure a dead-letter record is published,
//! the original is deleted anyway, and a best-effort failure note is
//! written to the ledger. A message is never left in place for in-queue
//! retry — failures are terminal from the work queue's perspective, and
//! the dead-letter queue is where they go for inspection or replay.
//!
//! After the batch is drained the cycle logs both outcome lists and, if
//! anything failed, surfaces [`RelayError::CycleFailed`] so the invoking
//! scheduler can alert — the individual messages were still all handled.

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::{RelayError, Result};
use crate::event::decode_event;
use crate::ledger::Ledger;
use crate::queue::{MessageQueue, ReceivedMessage};
use crate::worker::{IngestRequest, IngestionWorker};

/// Record published to the dead-letter queue, base64-encoded JSON. The
/// `content` field carries the original base64 body untouched so the
/// message can be replayed as-is.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub original_id: String,
    pub content: String,
    pub bloburl: String,
}

/// Per-cycle outcome lists, by blob URL.
#[derive(Debug, Default)]
pub struct CycleSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

pub struct QueueConsumer {
    work_queue: Arc<dyn MessageQueue>,
    deadletter_queue: Arc<dyn MessageQueue>,
    worker: IngestionWorker,
    /// Status store for best-effort failure notes; notes are skipped when
    /// absent and their own write failures are only logged.
    ledger: Option<Ledger>,
    batch_size: usize,
    visibility_timeout: Duration,
}

impl QueueConsumer {
    pub fn new(
        work_queue: Arc<dyn MessageQueue>,
        deadletter_queue: Arc<dyn MessageQueue>,
        worker: IngestionWorker,
        ledger: Option<Ledger>,
        batch_size: usize,
        visibility_timeout: Duration,
    ) -> Self {
        Self {
            work_queue,
            deadletter_queue,
            worker,
            ledger,
            batch_size,
            visibility_timeout,
        }
    }

    /// Poll one batch and terminally handle every message in it.
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        info!("Fetching messages from the queue");
        let messages = self
            .work_queue
            .receive(self.batch_size, self.visibility_timeout)
            .await?;

        let total = messages.len();
        let mut summary = CycleSummary::default();

        for message in &messages {
            info!(id = %message.id, "Processing message");
            match self.process_message(message).await {
                Ok(blob_url) => {
                    self.work_queue.delete(message).await?;
                    info!(id = %message.id, "Message processed and deleted");
                    summary.succeeded.push(blob_url);
                }
                Err((blob_url, e)) => {
                    error!(id = %message.id, error = %e, "Failed to process message");
                    self.deadletter(message, &blob_url).await?;
                    self.work_queue.delete(message).await?;
                    self.note_failure(&blob_url, &e).await;
                    summary.failed.push((blob_url, e.to_string()));
                }
            }
        }

        if !summary.succeeded.is_empty() {
            info!(bloburls = ?summary.succeeded, "Successfully processed blob URLs");
        }
        if !summary.failed.is_empty() {
            error!(failures = ?summary.failed, "Failed to process blob URLs");
            return Err(RelayError::CycleFailed {
                failed: summary.failed.len(),
                total,
            });
        }

        info!("All messages processed successfully");
        Ok(summary)
    }

    /// Decode and dispatch one message. The error side carries the blob URL
    /// when decoding got far enough to learn it.
    async fn process_message(
        &self,
        message: &ReceivedMessage,
    ) -> std::result::Result<String, (String, RelayError)> {
        let event = decode_event(&message.body).map_err(|e| (String::new(), e))?;
        info!(blob_url = %event.blob_url, event_type = %event.event_type, "Decoded event");

        let request = IngestRequest {
            action: event.action,
            blob_url: event.blob_url.clone(),
            category: event.category.clone(),
        };
        self.worker
            .handle(&request)
            .await
            .map_err(|e| (event.blob_url.clone(), e))?;
        Ok(event.blob_url)
    }

    async fn deadletter(&self, message: &ReceivedMessage, blob_url: &str) -> Result<()> {
        let record = DeadLetterRecord {
            original_id: message.id.clone(),
            content: message.body.clone(),
            bloburl: blob_url.to_string(),
        };
        let body = BASE64_STANDARD.encode(serde_json::to_string(&record)?);
        self.deadletter_queue.send(&body).await?;
        error!(id = %message.id, "Message sent to dead-letter queue");
        Ok(())
    }

    /// Best-effort ledger note. A dead-lettered message is already
    /// terminally handled, so a failure here must never escalate.
    async fn note_failure(&self, blob_url: &str, e: &RelayError) {
        let Some(ref ledger) = self.ledger else {
            return;
        };
        let note = format!("Failure: {}", e);
        if let Err(note_err) = ledger.record_failure_note(blob_url, &note).await {
            warn!(blob_url, error = %note_err, "Failed to record failure note");
        }
    }
}
