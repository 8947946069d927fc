use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub scratch: ScratchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub queue: Option<QueueConfig>,
    #[serde(default)]
    pub indexer: IndexerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    pub path: PathBuf,
}

/// Scratch directory for downloaded remote files.
#[derive(Debug, Deserialize, Clone)]
pub struct ScratchConfig {
    #[serde(default = "default_scratch_dir")]
    pub dir: PathBuf,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            dir: default_scratch_dir(),
        }
    }
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("doc-relay")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    pub local: Option<LocalSourceConfig>,
    pub blob: Option<BlobStorageConfig>,
    pub datalake: Option<DataLakeConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalSourceConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct BlobStorageConfig {
    pub account: String,
    pub container: String,
    /// SAS token appended to download requests, without the leading `?`.
    #[serde(default)]
    pub sas_token: Option<String>,
    /// Endpoint override for emulators and tests. When unset the endpoint
    /// is `https://{account}.blob.core.windows.net`.
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataLakeConfig {
    pub account: String,
    pub filesystem: String,
    /// Directory prefix to enumerate; empty means the filesystem root.
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub sas_token: Option<String>,
    /// Endpoint override; defaults to `https://{account}.dfs.core.windows.net`.
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    pub account: String,
    pub work_queue: String,
    pub deadletter_queue: String,
    #[serde(default)]
    pub sas_token: Option<String>,
    /// Endpoint override; defaults to `https://{account}.queue.core.windows.net`.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Must exceed the indexing routine's worst-case latency, otherwise a
    /// message becomes visible to a second consumer mid-processing.
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
}

fn default_batch_size() -> usize {
    10
}
fn default_visibility_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexerConfig {
    #[serde(default = "default_indexer_provider")]
    pub provider: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_indexer_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            endpoint: None,
            timeout_secs: default_indexer_timeout_secs(),
        }
    }
}

fn default_indexer_provider() -> String {
    "disabled".to_string()
}
fn default_indexer_timeout_secs() -> u64 {
    60
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if let Some(ref queue) = config.queue {
        if queue.batch_size == 0 || queue.batch_size > 32 {
            anyhow::bail!("queue.batch_size must be between 1 and 32");
        }
        if queue.visibility_timeout_secs == 0 {
            anyhow::bail!("queue.visibility_timeout_secs must be > 0");
        }
    }

    match config.indexer.provider.as_str() {
        "disabled" => {}
        "http" => {
            if config.indexer.endpoint.is_none() {
                anyhow::bail!("indexer.endpoint must be set when provider is 'http'");
            }
        }
        other => anyhow::bail!(
            "Unknown indexer provider: '{}'. Must be disabled or http.",
            other
        ),
    }

    Ok(config)
}
