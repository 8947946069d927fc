//! External indexing routine abstraction.
//!
//! The chunking/embedding/indexing of document content happens outside this
//! crate. [`DocumentIndexer`] captures the call contract the relay needs:
//! index one resolved file (returning the chunk ids and page count for the
//! ledger), de-index one file, or de-index everything.
//!
//! Two implementations ship here:
//! - **[`HttpIndexer`]** — posts to the document-processing service.
//! - **[`DisabledIndexer`]** — returns errors; used when no indexer is
//!   configured so that misconfiguration surfaces loudly instead of
//!   silently committing ledger rows for unindexed files.
//!
//! The indexing routine must tolerate duplicate invocation: delivery is
//! at-least-once, and a message re-appearing after a visibility timeout
//! replays the same call.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use crate::config::IndexerConfig;
use crate::error::{RelayError, Result};
use crate::models::{FileHandle, IndexReceipt};

#[async_trait]
pub trait DocumentIndexer: Send + Sync {
    /// Index one resolved file, returning the produced chunk ids and pages.
    async fn index_file(&self, file: &FileHandle, category: Option<&str>) -> Result<IndexReceipt>;

    /// De-index every chunk belonging to `sourcefile`.
    async fn remove_file(&self, sourcefile: &str) -> Result<()>;

    /// De-index all content.
    async fn remove_all(&self) -> Result<()>;
}

/// Instantiate the indexer implementation selected by the config.
pub fn create_indexer(config: &IndexerConfig) -> Result<Box<dyn DocumentIndexer>> {
    match config.provider.as_str() {
        "http" => {
            let endpoint = config.endpoint.clone().ok_or_else(|| {
                RelayError::Processing("http indexer requires an endpoint".to_string())
            })?;
            Ok(Box::new(HttpIndexer::new(
                endpoint,
                Duration::from_secs(config.timeout_secs),
            )))
        }
        "disabled" => Ok(Box::new(DisabledIndexer)),
        other => Err(RelayError::Processing(format!(
            "unknown indexer provider: '{}'",
            other
        ))),
    }
}

// ============ Disabled Indexer ============

/// A no-op indexer that always returns errors.
pub struct DisabledIndexer;

#[async_trait]
impl DocumentIndexer for DisabledIndexer {
    async fn index_file(&self, _file: &FileHandle, _category: Option<&str>) -> Result<IndexReceipt> {
        Err(RelayError::Processing("indexer is disabled".to_string()))
    }

    async fn remove_file(&self, _sourcefile: &str) -> Result<()> {
        Err(RelayError::Processing("indexer is disabled".to_string()))
    }

    async fn remove_all(&self) -> Result<()> {
        Err(RelayError::Processing("indexer is disabled".to_string()))
    }
}

// ============ HTTP Indexer ============

/// Calls the document-processing service over HTTP.
pub struct HttpIndexer {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpIndexer {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { endpoint, client }
    }

    async fn post(&self, body: serde_json::Value) -> Result<reqwest::Response> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Processing(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(RelayError::Processing(format!(
                "indexing service returned HTTP {}",
                resp.status()
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl DocumentIndexer for HttpIndexer {
    async fn index_file(&self, file: &FileHandle, category: Option<&str>) -> Result<IndexReceipt> {
        let resp = self
            .post(json!({
                "action": "add",
                "name": file.name,
                "path": file.path.to_string_lossy(),
                "bloburl": file.source_url,
                "category": category,
                "acl_users": file.acl.users,
                "acl_groups": file.acl.groups,
            }))
            .await?;
        resp.json::<IndexReceipt>()
            .await
            .map_err(|e| RelayError::Processing(format!("invalid indexer response: {}", e)))
    }

    async fn remove_file(&self, sourcefile: &str) -> Result<()> {
        self.post(json!({ "action": "remove", "sourcefile": sourcefile }))
            .await?;
        Ok(())
    }

    async fn remove_all(&self) -> Result<()> {
        self.post(json!({ "action": "removeall" })).await?;
        Ok(())
    }
}
