//! # docsync Storage
//!
//! Document store trait and reference implementations for docsync.
//!
//! The sync engine and collection facade never talk to a database
//! directly; they go through [`DocumentStore`], a small set of async
//! operations over JSON documents keyed by an identity field.
//!
//! ## Design Principles
//!
//! - Stores receive compiled [`PredicateTree`](docsync_query::PredicateTree)
//!   filters, never raw query strings
//! - Identities are normalised to strings
//! - Must be `Send + Sync` for concurrent access
//! - No indexing, transactions, or retries
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and the command-line tool, with
//!   optional JSON-file persistence
//!
//! ## Example
//!
//! ```rust
//! use docsync_storage::{DocumentStore, FindOptions, InMemoryStore};
//! use docsync_query::compile;
//! use serde_json::json;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let store = InMemoryStore::new();
//! store.insert(json!({ "kind": "a" }).as_object().cloned().unwrap()).await.unwrap();
//! store.insert(json!({ "kind": "b" }).as_object().cloned().unwrap()).await.unwrap();
//!
//! let query = compile("kind=b").unwrap();
//! let found = store.find_matching(&FindOptions::from_descriptor(&query)).await.unwrap();
//! assert_eq!(found.len(), 1);
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{Document, DocumentStore, FindOptions, Identity, PatchCounts, UpsertOutcome};
pub use error::{StorageError, StorageResult};
pub use file::read_documents;
pub use memory::InMemoryStore;
