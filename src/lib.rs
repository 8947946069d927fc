//! # Doc Relay
//!
//! A queue-driven document ingestion relay.
//!
//! Doc Relay watches a storage work queue for change-notification events,
//! resolves the referenced files through pluggable storage sources
//! (local filesystem, blob container, data-lake filesystem), hands them to
//! an external indexing routine, and records every status transition in a
//! durable SQLite ledger. Messages that cannot be processed are routed to a
//! dead-letter queue and never retried in place.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌─────────────┐   ┌──────────┐
//! │ Work queue │──▶│  Consumer  │──▶│   Worker    │──▶│  Ledger  │
//! │  (events)  │   │ poll/route │   │ resolve +   │   │  SQLite  │
//! └────────────┘   └─────┬──────┘   │ index call  │   └──────────┘
//!                        │          └──────┬──────┘
//!                        ▼                 ▼
//!                  ┌────────────┐   ┌─────────────┐
//!                  │ Dead-letter│   │ FileSources │
//!                  │   queue    │   │ local/blob/ │
//!                  └────────────┘   │  data lake  │
//!                                   └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types (file handles, ledger rows) |
//! | [`event`] | Queue event decoding |
//! | [`source`] | Storage source trait |
//! | [`source_local`] | Local filesystem source with change detection |
//! | [`source_blob`] | Single-blob source |
//! | [`source_datalake`] | Recursive data-lake source with ACL parsing |
//! | [`ledger`] | Durable per-file status ledger |
//! | [`indexer`] | External indexing routine abstraction |
//! | [`queue`] | Message queue trait and implementations |
//! | [`worker`] | Per-event ingestion worker |
//! | [`consumer`] | Batch queue consumer with dead-letter routing |
//! | [`migrate`] | Ledger schema migrations |

pub mod config;
pub mod consumer;
pub mod error;
pub mod event;
pub mod indexer;
pub mod ledger;
pub mod migrate;
pub mod models;
pub mod queue;
pub mod source;
pub mod source_blob;
pub mod source_datalake;
pub mod source_local;
pub mod worker;
