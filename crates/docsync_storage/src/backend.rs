//! Document store trait definition.

use crate::error::StorageResult;
use async_trait::async_trait;
use docsync_query::{PredicateTree, Projection, QueryDescriptor, SortSpec};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A stored document: a JSON object.
pub type Document = Map<String, Value>;

/// The unique key of a document within a collection.
///
/// Identities arrive as JSON strings or integers and are normalised to
/// their string form, so `5` and `"5"` name the same document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Creates an identity from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Reads an identity from a JSON value.
    ///
    /// Returns `None` unless the value is a string or an integer.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the identity as a JSON string value.
    pub fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }

    /// Consumes the identity, returning its string form.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Identity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for Identity {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Result of writing a document under a known identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    /// No document existed; one was created.
    Created,
    /// A different document was replaced.
    Modified,
    /// The stored document already had identical content.
    Unchanged,
}

/// Counts reported by a multi-document patch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchCounts {
    /// Documents matching the filter.
    pub matched_count: u64,
    /// Matching documents whose content changed.
    pub modified_count: u64,
}

/// Parameters of a find operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Documents must match this filter.
    pub filter: PredicateTree,
    /// Sort order applied before skip and limit.
    pub sort: Option<SortSpec>,
    /// Number of matching documents to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
    /// Field projection.
    pub projection: Option<BTreeMap<String, Projection>>,
}

impl FindOptions {
    /// Creates options that only filter.
    pub fn new(filter: PredicateTree) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Builds options from a compiled query.
    pub fn from_descriptor(descriptor: &QueryDescriptor) -> Self {
        Self {
            filter: descriptor.filter.clone(),
            sort: descriptor.sort.clone(),
            skip: descriptor.skip,
            limit: descriptor.limit,
            projection: descriptor.fields.clone(),
        }
    }

    /// Restricts returned documents to the identity field.
    #[must_use]
    pub fn identity_only(mut self, identity_field: &str) -> Self {
        let mut projection = BTreeMap::new();
        projection.insert(identity_field.to_string(), Projection::Include);
        self.projection = Some(projection);
        self
    }
}

/// A collection of JSON documents keyed by an identity field.
///
/// This is the storage collaborator of the sync engine and the
/// collection facade. Implementations must be `Send + Sync`; every
/// operation may be called concurrently from many tasks.
///
/// # Invariants
///
/// - Documents written through the store carry their identity, as a
///   string, under [`DocumentStore::identity_field`]
/// - `upsert_replace` replaces the whole document, never merges
/// - Patches set top-level fields and never change a document's identity
/// - No operation retries on failure
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Name of the identity field.
    fn identity_field(&self) -> &str;

    /// Returns documents matching `options`.
    async fn find_matching(&self, options: &FindOptions) -> StorageResult<Vec<Document>>;

    /// Counts documents matching `filter`.
    async fn count_matching(&self, filter: &PredicateTree) -> StorageResult<u64>;

    /// Returns the document with the given identity.
    async fn find_by_identity(&self, id: &Identity) -> StorageResult<Option<Document>>;

    /// Replaces (or creates) the document with the given identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn upsert_replace(&self, id: &Identity, document: Document) -> StorageResult<UpsertOutcome>;

    /// Replaces the document only if one already exists.
    ///
    /// Returns `None` when no document has the identity.
    async fn replace_existing(
        &self,
        id: &Identity,
        document: Document,
    ) -> StorageResult<Option<UpsertOutcome>>;

    /// Creates the document only if the identity is unused.
    ///
    /// Returns `true` if the document was created.
    async fn insert_if_absent(&self, id: &Identity, document: Document) -> StorageResult<bool>;

    /// Sets the top-level fields of `patch` on every document matching
    /// `filter`. The identity field of `patch` is ignored.
    async fn patch_matching(
        &self,
        filter: &PredicateTree,
        patch: &Document,
    ) -> StorageResult<PatchCounts>;

    /// Sets the top-level fields of `patch` on one document.
    ///
    /// Returns `None` when no document has the identity, otherwise
    /// [`UpsertOutcome::Modified`] or [`UpsertOutcome::Unchanged`].
    async fn patch_by_identity(
        &self,
        id: &Identity,
        patch: &Document,
    ) -> StorageResult<Option<UpsertOutcome>>;

    /// Inserts a document, assigning a fresh identity.
    async fn insert(&self, document: Document) -> StorageResult<Identity>;

    /// Deletes every document matching `filter`, returning how many.
    async fn delete_matching(&self, filter: &PredicateTree) -> StorageResult<u64>;

    /// Deletes the listed documents, returning how many existed.
    async fn delete_by_identities(&self, ids: &[Identity]) -> StorageResult<u64>;
}
