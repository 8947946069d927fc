//! Error taxonomy for the relay.
//!
//! Library modules return [`RelayError`]; the binary wraps these in
//! `anyhow` at its edges. Two conditions are deliberately *not* errors:
//! a malformed ACL entry (silently skipped during parsing) and a
//! remove-by-sourcefile lookup that matches zero or several ledger rows
//! (reported as [`crate::ledger::RemoveOutcome::NotFoundOrAmbiguous`]).

use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Error, Debug)]
pub enum RelayError {
    /// A blob URL does not match the configured account/container prefix.
    /// Fatal for that single item, never retried.
    #[error("invalid blob reference: '{url}' does not start with '{expected_prefix}'")]
    InvalidReference { url: String, expected_prefix: String },

    /// A download or storage listing failed.
    #[error("retrieval failed for '{name}': {reason}")]
    Retrieval { name: String, reason: String },

    /// A queue message body could not be base64-decoded or JSON-parsed.
    #[error("failed to decode queue message: {0}")]
    Decode(String),

    /// The external indexing routine reported a failure.
    #[error("indexing routine failed: {0}")]
    Processing(String),

    /// A work or dead-letter queue operation failed.
    #[error("queue operation failed: {0}")]
    Queue(String),

    /// An operation needed a storage source that is absent from the config.
    #[error("storage source '{0}' is not configured")]
    SourceNotConfigured(&'static str),

    /// One or more messages in a consumer cycle failed terminally. Raised
    /// after the batch is fully drained; every failed message has already
    /// been dead-lettered and deleted from the work queue.
    #[error("{failed} of {total} messages in the cycle failed")]
    CycleFailed { failed: usize, total: usize },

    #[error("ledger error: {0}")]
    Ledger(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
