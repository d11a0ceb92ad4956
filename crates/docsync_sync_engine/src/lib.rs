//! # docsync Sync Engine
//!
//! Streaming bulk synchronization of document collections.
//!
//! This crate provides:
//! - Incremental decoding of a JSON array from an async byte stream
//! - Bounded-concurrency upserts with backpressure on the decoder
//! - Reconciliation (deletion of documents the input did not mention)
//! - Bulk sync state machine and statistics
//! - A query-string driven [`Collection`] facade for reads and
//!   single-document writes
//!
//! ## Architecture
//!
//! A bulk sync runs in three phases:
//! 1. Decode the array one element at a time and dispatch each element as
//!    its own storage task, suspending decoding while the concurrency
//!    limit is reached
//! 2. Drain: wait for every dispatched task
//! 3. Reconcile: delete documents in scope whose identity was not written
//!
//! ## Key Invariants
//!
//! - A processed item lands in exactly one of inserted, modified,
//!   unchanged or failed
//! - In-flight work never exceeds `max_concurrency`
//! - Nothing is deleted unless the whole input was read successfully
//! - Per-item failures never abort the run
//!
//! ## Example
//!
//! ```rust
//! use docsync_storage::InMemoryStore;
//! use docsync_sync_engine::{BulkSyncEngine, SyncConfig};
//! use std::sync::Arc;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let engine = BulkSyncEngine::new(Arc::new(InMemoryStore::new()), SyncConfig::default());
//! let body = br#"[{"_id": "a", "v": 1}, {"v": 2}]"#;
//! let result = engine.synchronize(None, &body[..]).await.unwrap();
//! assert_eq!(result.inserted.len(), 2);
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod config;
mod engine;
mod error;
mod reconcile;
mod result;
mod state;
mod stream;

pub use collection::{Collection, ItemsPage};
pub use config::{
    SyncConfig, DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_ITEM_BYTES, DEFAULT_READ_BUFFER_SIZE,
};
pub use engine::BulkSyncEngine;
pub use error::{SyncError, SyncResult};
pub use reconcile::ReconciliationPlanner;
pub use result::{BulkSyncResult, ItemOutcome, ResultAggregator};
pub use state::{SyncState, SyncStats};
pub use stream::JsonArrayReader;
