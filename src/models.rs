//! Core data models used throughout Doc Relay.
//!
//! These types represent the file handles produced by storage sources, the
//! ledger rows that track per-file indexing status, and the receipt returned
//! by the external indexing routine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{info, warn};

/// Principals granted read access to a file, as reported by the storage
/// backend. Empty when the backend has no access-control model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAcl {
    pub users: Vec<String>,
    pub groups: Vec<String>,
}

impl FileAcl {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty()
    }
}

/// A unit of ingestible content produced by a storage source.
///
/// The handle owns its backing content: for remote sources the content is a
/// download in the scratch directory, deleted by [`FileHandle::release`].
#[derive(Debug, Clone)]
pub struct FileHandle {
    /// Storage-relative path or blob key.
    pub name: String,
    /// Local filesystem location of the content.
    pub path: PathBuf,
    pub source_url: Option<String>,
    pub is_remote: bool,
    pub acl: FileAcl,
}

impl FileHandle {
    /// Stable identifier derived purely from `name`: two handles with the
    /// same name produce the same id regardless of backend.
    pub fn stable_id(&self) -> String {
        file_id(&self.name)
    }

    /// Final path component of `name`.
    pub fn filename(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Delete the backing scratch copy of a remote download. Cleanup
    /// failures are logged, never propagated.
    pub fn release(self) {
        if !self.is_remote {
            return;
        }
        if self.path.exists() {
            info!(path = %self.path.display(), "Deleting scratch copy");
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "Failed to delete scratch copy");
            }
        }
    }
}

/// Compute the stable file identifier for a storage-relative name.
pub fn file_id(name: &str) -> String {
    format!("file-{}", hex::encode(Sha256::digest(name.as_bytes())))
}

/// Current indexing state of a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Indexed,
    Removed,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Indexed => "INDEXED",
            IndexStatus::Removed => "REMOVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INDEXED" => Some(IndexStatus::Indexed),
            "REMOVED" => Some(IndexStatus::Removed),
            _ => None,
        }
    }
}

/// One append-only history entry on a ledger row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

/// One ledger row per logical source file. Rows are never deleted; removal
/// from the index is a status transition.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub id: String,
    pub current_status: IndexStatus,
    pub filename: String,
    pub sourcefile: String,
    pub category: Option<String>,
    pub pages: i64,
    /// Authoritative only while `current_status` is `INDEXED`; empty after
    /// a removal.
    pub chunk_ids: Vec<String>,
    pub last_modified: DateTime<Utc>,
    pub history: Vec<HistoryEntry>,
}

/// Result of a successful call to the external indexing routine.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexReceipt {
    pub chunk_ids: Vec<String>,
    pub pages: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_is_pure_in_name() {
        let a = file_id("docs/report.pdf");
        let b = file_id("docs/report.pdf");
        assert_eq!(a, b);
        assert!(a.starts_with("file-"));
        // hex sha256 is 64 chars
        assert_eq!(a.len(), "file-".len() + 64);
    }

    #[test]
    fn file_id_distinguishes_names() {
        assert_ne!(file_id("a.pdf"), file_id("b.pdf"));
    }

    #[test]
    fn stable_id_ignores_backend() {
        let local = FileHandle {
            name: "docs/report.pdf".to_string(),
            path: PathBuf::from("/data/docs/report.pdf"),
            source_url: None,
            is_remote: false,
            acl: FileAcl::default(),
        };
        let remote = FileHandle {
            name: "docs/report.pdf".to_string(),
            path: PathBuf::from("/tmp/doc-relay/docs/report.pdf"),
            source_url: Some("https://acct.blob.core.windows.net/c/docs/report.pdf".to_string()),
            is_remote: true,
            acl: FileAcl::default(),
        };
        assert_eq!(local.stable_id(), remote.stable_id());
    }

    #[test]
    fn filename_is_last_component() {
        let handle = FileHandle {
            name: "nested/dir/report.pdf".to_string(),
            path: PathBuf::from("/x"),
            source_url: None,
            is_remote: false,
            acl: FileAcl::default(),
        };
        assert_eq!(handle.filename(), "report.pdf");
    }
}
