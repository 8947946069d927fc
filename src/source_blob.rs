//! Single-blob storage source.
//!
//! Resolves one blob URL against the configured `{account, container}` pair,
//! downloads the blob into the scratch directory, and yields exactly one
//! [`FileHandle`] with `is_remote = true`.
//!
//! # Reference validation
//!
//! The blob key is obtained by stripping the configured prefix
//! `https://{account}.blob.core.windows.net/{container}/` from the URL. A
//! URL that does not start with that prefix fails with
//! [`RelayError::InvalidReference`] — the event refers to a container this
//! relay does not own, so it is fatal for that item and never retried.
//!
//! # Failure behavior
//!
//! Unlike the data-lake source, any download failure here aborts and
//! propagates: the caller asked for one specific file, so there is nothing
//! to skip past. A partially written scratch file is removed before the
//! error surfaces.
//!
//! # Configuration
//!
//! ```toml
//! [storage.blob]
//! account = "acmedocs"
//! container = "content"
//! # sas_token = "sv=2024-..."              # appended to download requests
//! # endpoint_url = "http://localhost:10000/acmedocs"   # Azurite
//! ```

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use crate::config::BlobStorageConfig;
use crate::error::{RelayError, Result};
use crate::models::{FileAcl, FileHandle};
use crate::source::FileSource;

pub struct BlobSource {
    blob_url: String,
    config: BlobStorageConfig,
    scratch_dir: PathBuf,
    client: reqwest::Client,
}

impl BlobSource {
    pub fn new(blob_url: String, config: BlobStorageConfig, scratch_dir: PathBuf) -> Self {
        Self {
            blob_url,
            config,
            scratch_dir,
            client: reqwest::Client::new(),
        }
    }

    /// The URL prefix every resolvable blob must carry.
    pub fn container_prefix(config: &BlobStorageConfig) -> String {
        format!("{}/{}/", endpoint(config), config.container)
    }

    /// Extract the blob key by prefix-stripping the configured
    /// account/container prefix from the URL.
    pub fn extract_blob_key(blob_url: &str, config: &BlobStorageConfig) -> Result<String> {
        let prefix = Self::container_prefix(config);
        match blob_url.strip_prefix(&prefix) {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ => Err(RelayError::InvalidReference {
                url: blob_url.to_string(),
                expected_prefix: prefix,
            }),
        }
    }

    async fn download_to(&self, key: &str, dest: &std::path::Path) -> Result<()> {
        let mut url = format!("{}/{}/{}", endpoint(&self.config), self.config.container, key);
        if let Some(ref sas) = self.config.sas_token {
            url = format!("{}?{}", url, sas);
        }

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| retrieval(key, e.to_string()))?;

        if !resp.status().is_success() {
            return Err(retrieval(key, format!("HTTP {}", resp.status())));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| retrieval(key, e.to_string()))?;
        std::fs::write(dest, &bytes).map_err(|e| retrieval(key, e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl FileSource for BlobSource {
    async fn list_paths(&self) -> Result<Vec<String>> {
        Ok(vec![Self::extract_blob_key(&self.blob_url, &self.config)?])
    }

    async fn list(&self) -> Result<Vec<FileHandle>> {
        let key = Self::extract_blob_key(&self.blob_url, &self.config)?;

        let dest = self.scratch_dir.join(&key);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!(blob = %key, dest = %dest.display(), "Downloading blob");
        if let Err(e) = self.download_to(&key, &dest).await {
            // No silent skip: clean up the partial scratch file and propagate.
            if dest.exists() {
                if let Err(cleanup) = std::fs::remove_file(&dest) {
                    tracing::warn!(path = %dest.display(), error = %cleanup, "Failed to delete partial download");
                }
            }
            return Err(e);
        }

        Ok(vec![FileHandle {
            name: key,
            path: dest,
            source_url: Some(self.blob_url.clone()),
            is_remote: true,
            acl: FileAcl::default(),
        }])
    }
}

fn endpoint(config: &BlobStorageConfig) -> String {
    match config.endpoint_url {
        Some(ref url) => url.trim_end_matches('/').to_string(),
        None => format!("https://{}.blob.core.windows.net", config.account),
    }
}

fn retrieval(name: &str, reason: String) -> RelayError {
    RelayError::Retrieval {
        name: name.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BlobStorageConfig {
        BlobStorageConfig {
            account: "acct".to_string(),
            container: "content".to_string(),
            sas_token: None,
            endpoint_url: None,
        }
    }

    #[test]
    fn extracts_key_from_matching_url() {
        let key = BlobSource::extract_blob_key(
            "https://acct.blob.core.windows.net/content/docs/report.pdf",
            &config(),
        )
        .unwrap();
        assert_eq!(key, "docs/report.pdf");
    }

    #[test]
    fn prefix_round_trip() {
        let cfg = config();
        let prefix = BlobSource::container_prefix(&cfg);
        for key in ["a.pdf", "nested/deep/file.txt"] {
            let url = format!("{}{}", prefix, key);
            assert_eq!(BlobSource::extract_blob_key(&url, &cfg).unwrap(), key);
        }
    }

    #[test]
    fn wrong_container_is_invalid_reference() {
        let err = BlobSource::extract_blob_key(
            "https://acct.blob.core.windows.net/other/report.pdf",
            &config(),
        )
        .unwrap_err();
        assert!(matches!(err, RelayError::InvalidReference { .. }));
    }

    #[test]
    fn wrong_account_is_invalid_reference() {
        let err = BlobSource::extract_blob_key(
            "https://intruder.blob.core.windows.net/content/report.pdf",
            &config(),
        )
        .unwrap_err();
        assert!(matches!(err, RelayError::InvalidReference { .. }));
    }

    #[test]
    fn bare_prefix_is_invalid_reference() {
        let err = BlobSource::extract_blob_key(
            "https://acct.blob.core.windows.net/content/",
            &config(),
        )
        .unwrap_err();
        assert!(matches!(err, RelayError::InvalidReference { .. }));
    }

    #[test]
    fn endpoint_override_changes_prefix() {
        let cfg = BlobStorageConfig {
            endpoint_url: Some("http://localhost:10000/acct".to_string()),
            ..config()
        };
        assert_eq!(
            BlobSource::container_prefix(&cfg),
            "http://localhost:10000/acct/content/"
        );
    }
}
