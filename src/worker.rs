//! Per-event ingestion worker.
//!
//! Given one decoded event or manual request, the worker resolves the
//! relevant file(s) through a storage source, invokes the external indexing
//! routine, and records the outcome in the ledger. The ledger write is
//! deliberately the *last* step of every action: the queue gives no
//! cross-message ordering guarantee, so the ledger must only ever reflect
//! work that actually completed.
//!
//! The worker swallows nothing — any error from file resolution or the
//! indexing call propagates to the consumer, which owns failure routing.

use std::sync::Arc;
use tracing::info;

use crate::config::{BlobStorageConfig, Config};
use crate::error::{RelayError, Result};
use crate::event::DocumentAction;
use crate::indexer::DocumentIndexer;
use crate::ledger::{Ledger, RemoveOutcome};
use crate::models::FileHandle;
use crate::source::FileSource;
use crate::source_blob::BlobSource;

/// One unit of work: a decoded queue event or a manual trigger.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub action: DocumentAction,
    pub blob_url: String,
    pub category: Option<String>,
}

pub struct IngestionWorker {
    config: Arc<Config>,
    ledger: Ledger,
    indexer: Box<dyn DocumentIndexer>,
}

impl IngestionWorker {
    pub fn new(config: Arc<Config>, ledger: Ledger, indexer: Box<dyn DocumentIndexer>) -> Self {
        Self {
            config,
            ledger,
            indexer,
        }
    }

    pub async fn handle(&self, request: &IngestRequest) -> Result<()> {
        info!(
            blob_url = %request.blob_url,
            action = request.action.as_str(),
            "Handling ingest request"
        );
        match request.action {
            DocumentAction::Add => self.add(request).await,
            DocumentAction::Remove => self.remove(request, false).await,
            DocumentAction::RemoveAll => self.remove(request, true).await,
        }
    }

    async fn add(&self, request: &IngestRequest) -> Result<()> {
        let source = BlobSource::new(
            request.blob_url.clone(),
            self.blob_config()?.clone(),
            self.config.scratch.dir.clone(),
        );
        for file in source.list().await? {
            self.index_one(file, request.category.as_deref()).await?;
        }
        Ok(())
    }

    async fn remove(&self, request: &IngestRequest, all: bool) -> Result<()> {
        let key = BlobSource::extract_blob_key(&request.blob_url, self.blob_config()?)?;
        if all {
            self.indexer.remove_all().await?;
        } else {
            self.indexer.remove_file(&key).await?;
        }
        // A missing or ambiguous row is reported by the ledger and is not a
        // failure of the event itself: the index side already converged.
        match self.ledger.record_removed(&key).await? {
            RemoveOutcome::Removed | RemoveOutcome::NotFoundOrAmbiguous(_) => Ok(()),
        }
    }

    /// Bulk ingestion from an enumerating source (local filesystem or data
    /// lake): index every yielded file and record each in the ledger.
    pub async fn ingest_source(
        &self,
        source: &dyn FileSource,
        category: Option<&str>,
    ) -> Result<usize> {
        let mut processed = 0;
        for file in source.list().await? {
            self.index_one(file, category).await?;
            processed += 1;
        }
        Ok(processed)
    }

    async fn index_one(&self, file: FileHandle, category: Option<&str>) -> Result<()> {
        let receipt = match self.indexer.index_file(&file, category).await {
            Ok(receipt) => receipt,
            Err(e) => {
                file.release();
                return Err(e);
            }
        };
        let recorded = self
            .ledger
            .record_indexed(
                &file.stable_id(),
                &receipt.chunk_ids,
                file.filename(),
                &file.name,
                category,
                receipt.pages,
            )
            .await;
        file.release();
        recorded
    }

    fn blob_config(&self) -> Result<&BlobStorageConfig> {
        self.config
            .storage
            .blob
            .as_ref()
            .ok_or(RelayError::SourceNotConfigured("blob"))
    }
}
