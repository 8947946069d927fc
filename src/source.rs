//! Storage source abstraction.
//!
//! A [`FileSource`] normalizes enumeration and retrieval of documents across
//! storage backends. Three implementations exist:
//!
//! - [`crate::source_local::LocalSource`] — recursive filesystem walk with
//!   sidecar-digest change detection.
//! - [`crate::source_blob::BlobSource`] — single-blob retrieval from a blob
//!   container; fails fast on any download error.
//! - [`crate::source_datalake::DataLakeSource`] — recursive data-lake
//!   enumeration with per-file ACLs; skips individual bad files so one
//!   failure cannot abort the batch.
//!
//! The worker and consumer only ever see the trait, keeping them
//! backend-agnostic.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::FileHandle;

#[async_trait]
pub trait FileSource: Send + Sync {
    /// Cheap enumeration: path or key identifiers only, no content.
    async fn list_paths(&self) -> Result<Vec<String>>;

    /// Full retrieval: downloads (where remote) and wraps each file in a
    /// [`FileHandle`]. Callers own the returned handles and must
    /// [`FileHandle::release`] remote ones when done.
    async fn list(&self) -> Result<Vec<FileHandle>>;
}
