//! Query-string driven reads and single-document writes.

use crate::error::{SyncError, SyncResult};
use docsync_query::QueryCompiler;
use docsync_storage::{Document, DocumentStore, FindOptions, Identity, PatchCounts, UpsertOutcome};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// One page of a collection read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemsPage {
    /// Total number of documents matching the filter, ignoring skip and
    /// limit. Present only when the query asked for `$count`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// The documents on this page.
    pub items: Vec<Document>,
}

/// A named view over a document store that accepts query strings.
pub struct Collection<S: DocumentStore> {
    store: Arc<S>,
    compiler: QueryCompiler,
}

impl<S: DocumentStore> Collection<S> {
    /// Creates a collection over `store`.
    pub fn new(store: Arc<S>) -> Self {
        let compiler = QueryCompiler::new().with_identity_field(store.identity_field());
        Self { store, compiler }
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Reads the documents selected by `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query is invalid or the store fails.
    pub async fn get_items(&self, query: &str) -> SyncResult<ItemsPage> {
        let descriptor = self.compiler.compile(query)?;
        let count = if descriptor.wants_count() {
            Some(self.store.count_matching(&descriptor.filter).await?)
        } else {
            None
        };
        let items = self
            .store
            .find_matching(&FindOptions::from_descriptor(&descriptor))
            .await?;
        debug!("query {:?} returned {} documents", query, items.len());
        Ok(ItemsPage { count, items })
    }

    /// Deletes every document matching the filter of `query`.
    ///
    /// Meta directives such as `$limit` are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the query is invalid or the store fails.
    pub async fn delete_items(&self, query: &str) -> SyncResult<u64> {
        let descriptor = self.compiler.compile(query)?;
        Ok(self.store.delete_matching(&descriptor.filter).await?)
    }

    /// Sets the fields of `patch` on every document matching the filter
    /// of `query`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::BadRequest`] if `patch` is not a JSON object,
    /// otherwise an error if the query is invalid or the store fails.
    pub async fn patch_items(&self, query: &str, patch: Value) -> SyncResult<PatchCounts> {
        let patch = patch_body(patch)?;
        let descriptor = self.compiler.compile(query)?;
        let counts = self.store.patch_matching(&descriptor.filter, &patch).await?;
        debug!(
            "patch {:?} matched {} and modified {} documents",
            query, counts.matched_count, counts.modified_count
        );
        Ok(counts)
    }

    /// Reads one document.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn get_item(&self, id: &Identity) -> SyncResult<Option<Document>> {
        Ok(self.store.find_by_identity(id).await?)
    }

    /// Inserts a document under a fresh identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn post_item(&self, mut document: Document) -> SyncResult<Identity> {
        document.remove(self.store.identity_field());
        Ok(self.store.insert(document).await?)
    }

    /// Creates or replaces the document with identity `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn put_item(&self, id: &Identity, document: Document) -> SyncResult<UpsertOutcome> {
        Ok(self.store.upsert_replace(id, document).await?)
    }

    /// Replaces the document only if it exists; never creates one.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn put_item_if_exists(
        &self,
        id: &Identity,
        document: Document,
    ) -> SyncResult<Option<UpsertOutcome>> {
        Ok(self.store.replace_existing(id, document).await?)
    }

    /// Creates the document only if the identity is unused; never
    /// modifies an existing one. Returns `true` if it was created.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn put_item_if_absent(&self, id: &Identity, document: Document) -> SyncResult<bool> {
        Ok(self.store.insert_if_absent(id, document).await?)
    }

    /// Sets the fields of `patch` on one document.
    ///
    /// Returns `None` if the document does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::BadRequest`] if `patch` is not a JSON object,
    /// otherwise an error if the store fails.
    pub async fn patch_item(&self, id: &Identity, patch: Value) -> SyncResult<Option<UpsertOutcome>> {
        let patch = patch_body(patch)?;
        Ok(self.store.patch_by_identity(id, &patch).await?)
    }

    /// Deletes one document. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn delete_item(&self, id: &Identity) -> SyncResult<bool> {
        let deleted = self.store.delete_by_identities(std::slice::from_ref(id)).await?;
        Ok(deleted > 0)
    }
}

fn patch_body(patch: Value) -> SyncResult<Document> {
    match patch {
        Value::Object(fields) => Ok(fields),
        _ => Err(SyncError::bad_request("patch body must be a JSON object")),
    }
}
