//! In-memory document store.

use crate::backend::{Document, DocumentStore, FindOptions, Identity, PatchCounts, UpsertOutcome};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use docsync_query::{lookup_field, sort_order, PredicateTree, Projection, SortDirection, SortSpec};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use uuid::Uuid;

/// A document store held entirely in memory.
///
/// Filters are evaluated with [`PredicateTree::prepare`]. Documents are
/// kept in identity order, which is also the result order when a find
/// has no sort. Projections apply to top-level fields.
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across tasks.
///
/// # Example
///
/// ```rust
/// use docsync_storage::{DocumentStore, Identity, InMemoryStore, UpsertOutcome};
/// use serde_json::json;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let store = InMemoryStore::new();
/// let doc = json!({ "name": "a" }).as_object().cloned().unwrap();
/// let id = Identity::from("1");
/// assert_eq!(store.upsert_replace(&id, doc.clone()).await.unwrap(), UpsertOutcome::Created);
/// assert_eq!(store.upsert_replace(&id, doc).await.unwrap(), UpsertOutcome::Unchanged);
/// # });
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    identity_field: String,
    documents: RwLock<BTreeMap<Identity, Document>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::with_identity_field(docsync_query::DEFAULT_IDENTITY_FIELD)
    }
}

impl InMemoryStore {
    /// Creates an empty store keyed by `_id`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store keyed by `field`.
    #[must_use]
    pub fn with_identity_field(field: impl Into<String>) -> Self {
        Self {
            identity_field: field.into(),
            documents: RwLock::new(BTreeMap::new()),
        }
    }

    /// Creates a store pre-loaded with `documents`.
    ///
    /// Documents without an identity are assigned one.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidDocument`] if a document carries an
    /// identity that is neither a string nor an integer.
    pub fn with_documents(
        field: impl Into<String>,
        documents: impl IntoIterator<Item = Document>,
    ) -> StorageResult<Self> {
        let store = Self::with_identity_field(field);
        {
            let mut stored = store.documents.write();
            for document in documents {
                let id = match document.get(&store.identity_field) {
                    Some(value) => Identity::from_value(value).ok_or_else(|| {
                        StorageError::invalid_document(format!(
                            "identity field '{}' must be a string or integer",
                            store.identity_field
                        ))
                    })?,
                    None => fresh_identity(),
                };
                let document = store.normalise(&id, document);
                stored.insert(id, document);
            }
        }
        Ok(store)
    }

    /// Returns the number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns true if the store holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Returns a copy of every document, in identity order.
    #[must_use]
    pub fn documents(&self) -> Vec<Document> {
        self.documents.read().values().cloned().collect()
    }

    /// Returns the stored identities, in order.
    #[must_use]
    pub fn identities(&self) -> Vec<Identity> {
        self.documents.read().keys().cloned().collect()
    }

    fn normalise(&self, id: &Identity, mut document: Document) -> Document {
        document.insert(self.identity_field.clone(), id.to_value());
        document
    }

    fn matching(&self, filter: &PredicateTree) -> Vec<Document> {
        let filter = filter.prepare();
        self.documents
            .read()
            .values()
            .filter(|doc| filter.matches_document(doc))
            .cloned()
            .collect()
    }

    fn matching_identities(&self, filter: &PredicateTree) -> Vec<Identity> {
        let filter = filter.prepare();
        self.documents
            .read()
            .iter()
            .filter(|(_, doc)| filter.matches_document(doc))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Sets the top-level fields of `patch`, returning true on change.
    fn apply_patch(&self, document: &mut Document, patch: &Document) -> bool {
        let mut changed = false;
        for (key, value) in patch {
            if *key == self.identity_field || document.get(key) == Some(value) {
                continue;
            }
            document.insert(key.clone(), value.clone());
            changed = true;
        }
        changed
    }

    fn project(&self, document: Document, projection: &BTreeMap<String, Projection>) -> Document {
        let includes: Vec<&String> = projection
            .iter()
            .filter(|(_, p)| **p == Projection::Include)
            .map(|(field, _)| field)
            .collect();

        let mut document = if includes.is_empty() {
            document
        } else {
            let keep_identity = projection.get(&self.identity_field) != Some(&Projection::Exclude);
            document
                .into_iter()
                .filter(|(key, _)| {
                    includes.contains(&key) || (keep_identity && *key == self.identity_field)
                })
                .collect()
        };

        for (field, p) in projection {
            if *p == Projection::Exclude {
                document.remove(field);
            }
        }
        document
    }
}

fn fresh_identity() -> Identity {
    Identity::new(Uuid::new_v4().simple().to_string())
}

fn compare_documents(a: &Document, b: &Document, sort: &SortSpec) -> Ordering {
    for key in sort.keys() {
        let ordering = sort_order(lookup_field(a, &key.field), lookup_field(b, &key.field));
        let ordering = match key.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    fn identity_field(&self) -> &str {
        &self.identity_field
    }

    async fn find_matching(&self, options: &FindOptions) -> StorageResult<Vec<Document>> {
        let mut found = self.matching(&options.filter);

        if let Some(sort) = &options.sort {
            found.sort_by(|a, b| compare_documents(a, b, sort));
        }

        let skip = usize::try_from(options.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = options
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        let page = found.into_iter().skip(skip).take(limit);

        Ok(match &options.projection {
            Some(projection) => page.map(|doc| self.project(doc, projection)).collect(),
            None => page.collect(),
        })
    }

    async fn count_matching(&self, filter: &PredicateTree) -> StorageResult<u64> {
        let filter = filter.prepare();
        let documents = self.documents.read();
        Ok(documents.values().filter(|doc| filter.matches_document(doc)).count() as u64)
    }

    async fn find_by_identity(&self, id: &Identity) -> StorageResult<Option<Document>> {
        Ok(self.documents.read().get(id).cloned())
    }

    async fn upsert_replace(&self, id: &Identity, document: Document) -> StorageResult<UpsertOutcome> {
        let document = self.normalise(id, document);
        let mut documents = self.documents.write();
        Ok(match documents.insert(id.clone(), document.clone()) {
            None => UpsertOutcome::Created,
            Some(previous) if previous == document => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Modified,
        })
    }

    async fn replace_existing(
        &self,
        id: &Identity,
        document: Document,
    ) -> StorageResult<Option<UpsertOutcome>> {
        let document = self.normalise(id, document);
        let mut documents = self.documents.write();
        Ok(documents.get_mut(id).map(|existing| {
            if *existing == document {
                UpsertOutcome::Unchanged
            } else {
                *existing = document;
                UpsertOutcome::Modified
            }
        }))
    }

    async fn insert_if_absent(&self, id: &Identity, document: Document) -> StorageResult<bool> {
        let document = self.normalise(id, document);
        let mut documents = self.documents.write();
        if documents.contains_key(id) {
            return Ok(false);
        }
        documents.insert(id.clone(), document);
        Ok(true)
    }

    async fn patch_matching(
        &self,
        filter: &PredicateTree,
        patch: &Document,
    ) -> StorageResult<PatchCounts> {
        let filter = filter.prepare();
        let mut documents = self.documents.write();
        let mut counts = PatchCounts::default();
        for document in documents.values_mut() {
            if !filter.matches_document(document) {
                continue;
            }
            counts.matched_count += 1;
            if self.apply_patch(document, patch) {
                counts.modified_count += 1;
            }
        }
        Ok(counts)
    }

    async fn patch_by_identity(
        &self,
        id: &Identity,
        patch: &Document,
    ) -> StorageResult<Option<UpsertOutcome>> {
        let mut documents = self.documents.write();
        Ok(documents.get_mut(id).map(|document| {
            if self.apply_patch(document, patch) {
                UpsertOutcome::Modified
            } else {
                UpsertOutcome::Unchanged
            }
        }))
    }

    async fn insert(&self, document: Document) -> StorageResult<Identity> {
        let id = fresh_identity();
        let document = self.normalise(&id, document);
        self.documents.write().insert(id.clone(), document);
        Ok(id)
    }

    async fn delete_matching(&self, filter: &PredicateTree) -> StorageResult<u64> {
        let doomed = self.matching_identities(filter);
        let mut documents = self.documents.write();
        let deleted = doomed.iter().filter(|id| documents.remove(*id).is_some()).count();
        Ok(deleted as u64)
    }

    async fn delete_by_identities(&self, ids: &[Identity]) -> StorageResult<u64> {
        let mut documents = self.documents.write();
        let deleted = ids.iter().filter(|id| documents.remove(*id).is_some()).count();
        Ok(deleted as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_query::compile;
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn seeded() -> InMemoryStore {
        InMemoryStore::with_documents(
            "_id",
            vec![
                doc(json!({ "_id": "a", "name": "Ann", "age": 31 })),
                doc(json!({ "_id": "b", "name": "bob", "age": 25 })),
                doc(json!({ "_id": "c", "name": "Cid", "age": 40, "tag": "x" })),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn memory_new_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.identity_field(), "_id");
        assert_eq!(store.count_matching(&PredicateTree::match_all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn memory_upsert_outcomes() {
        let store = InMemoryStore::new();
        let id = Identity::from("x");

        let outcome = store.upsert_replace(&id, doc(json!({ "v": 1 }))).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);
        let outcome = store.upsert_replace(&id, doc(json!({ "v": 1 }))).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);
        let outcome = store.upsert_replace(&id, doc(json!({ "v": 2 }))).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Modified);

        let stored = store.find_by_identity(&id).await.unwrap().unwrap();
        assert_eq!(Value::Object(stored), json!({ "_id": "x", "v": 2 }));
    }

    #[tokio::test]
    async fn memory_upsert_replaces_whole_document() {
        let store = seeded();
        let id = Identity::from("c");
        store
            .upsert_replace(&id, doc(json!({ "_id": "c", "name": "Cid" })))
            .await
            .unwrap();
        let stored = store.find_by_identity(&id).await.unwrap().unwrap();
        assert!(!stored.contains_key("tag"));
    }

    #[tokio::test]
    async fn memory_integer_identity_is_normalised() {
        let store = InMemoryStore::new();
        let id = Identity::from_value(&json!(5)).unwrap();
        store.upsert_replace(&id, doc(json!({ "_id": 5 }))).await.unwrap();
        let stored = store.find_by_identity(&Identity::from("5")).await.unwrap().unwrap();
        assert_eq!(stored.get("_id"), Some(&json!("5")));
    }

    #[tokio::test]
    async fn memory_insert_assigns_identity() {
        let store = InMemoryStore::new();
        let id = store.insert(doc(json!({ "v": 1 }))).await.unwrap();
        assert_eq!(id.as_str().len(), 32);
        let stored = store.find_by_identity(&id).await.unwrap().unwrap();
        assert_eq!(stored.get("_id"), Some(&id.to_value()));
    }

    #[tokio::test]
    async fn memory_conditional_writes() {
        let store = seeded();
        let a = Identity::from("a");
        let z = Identity::from("z");

        assert_eq!(store.replace_existing(&z, doc(json!({}))).await.unwrap(), None);
        assert!(store.find_by_identity(&z).await.unwrap().is_none());
        assert_eq!(
            store.replace_existing(&a, doc(json!({ "name": "Ann", "age": 32 }))).await.unwrap(),
            Some(UpsertOutcome::Modified)
        );

        assert!(!store.insert_if_absent(&a, doc(json!({ "age": 1 }))).await.unwrap());
        assert_eq!(
            store.find_by_identity(&a).await.unwrap().unwrap().get("age"),
            Some(&json!(32))
        );
        assert!(store.insert_if_absent(&z, doc(json!({}))).await.unwrap());
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn memory_find_sort_skip_limit() {
        let store = seeded();
        let descriptor = compile("age>=25&$sort=-age&$skip=1&$limit=1").unwrap();
        let found = store
            .find_matching(&FindOptions::from_descriptor(&descriptor))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("_id"), Some(&json!("a")));
    }

    #[tokio::test]
    async fn memory_find_projection() {
        let store = seeded();
        let include = compile("$fields=name").unwrap();
        let found = store
            .find_matching(&FindOptions::from_descriptor(&include))
            .await
            .unwrap();
        assert_eq!(Value::Object(found[0].clone()), json!({ "_id": "a", "name": "Ann" }));

        let exclude = compile("$fields=-age,-_id").unwrap();
        let found = store
            .find_matching(&FindOptions::from_descriptor(&exclude))
            .await
            .unwrap();
        assert_eq!(Value::Object(found[2].clone()), json!({ "name": "Cid", "tag": "x" }));

        let identities = store
            .find_matching(&FindOptions::default().identity_only("_id"))
            .await
            .unwrap();
        assert!(identities.iter().all(|d| d.len() == 1));
    }

    #[tokio::test]
    async fn memory_delete() {
        let store = seeded();
        let filter = compile("name^=b|tag").unwrap().filter;
        assert_eq!(store.count_matching(&filter).await.unwrap(), 2);
        assert_eq!(store.delete_matching(&filter).await.unwrap(), 2);
        assert_eq!(store.identities(), vec![Identity::from("a")]);

        let deleted = store
            .delete_by_identities(&[Identity::from("a"), Identity::from("missing")])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.is_empty());
    }

    #[test]
    fn memory_rejects_bad_identity() {
        let result = InMemoryStore::with_documents("_id", vec![doc(json!({ "_id": [1] }))]);
        assert!(matches!(result, Err(StorageError::InvalidDocument(_))));
    }

    #[test]
    fn memory_custom_identity_field() {
        let store =
            InMemoryStore::with_documents("uuid", vec![doc(json!({ "uuid": 9, "v": true }))]).unwrap();
        assert_eq!(store.identities(), vec![Identity::from("9")]);
        assert_eq!(store.documents()[0].get("uuid"), Some(&json!("9")));
    }

    #[tokio::test]
    async fn memory_patch_matching() {
        let store = seeded();
        let filter = compile("age>=30").unwrap().filter;
        let patch = doc(json!({ "_id": "zzz", "senior": true, "age": 40 }));

        let counts = store.patch_matching(&filter, &patch).await.unwrap();
        assert_eq!(counts, PatchCounts { matched_count: 2, modified_count: 2 });
        let counts = store.patch_matching(&filter, &patch).await.unwrap();
        assert_eq!(counts, PatchCounts { matched_count: 2, modified_count: 0 });

        let a = store.find_by_identity(&Identity::from("a")).await.unwrap().unwrap();
        assert_eq!(
            Value::Object(a),
            json!({ "_id": "a", "name": "Ann", "age": 40, "senior": true })
        );
        assert!(store.find_by_identity(&Identity::from("zzz")).await.unwrap().is_none());
        let b = store.find_by_identity(&Identity::from("b")).await.unwrap().unwrap();
        assert!(!b.contains_key("senior"));
    }

    #[tokio::test]
    async fn memory_patch_by_identity() {
        let store = seeded();
        let c = Identity::from("c");
        let patch = doc(json!({ "tag": "y" }));

        assert_eq!(store.patch_by_identity(&c, &patch).await.unwrap(), Some(UpsertOutcome::Modified));
        assert_eq!(store.patch_by_identity(&c, &patch).await.unwrap(), Some(UpsertOutcome::Unchanged));
        assert_eq!(
            store.patch_by_identity(&Identity::from("q"), &patch).await.unwrap(),
            None
        );
        let stored = store.find_by_identity(&c).await.unwrap().unwrap();
        assert_eq!(stored.get("name"), Some(&json!("Cid")));
        assert_eq!(stored.get("tag"), Some(&json!("y")));
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn memory_large_exclusion_filter() {
        let documents = (0..5_000).map(|i| doc(json!({ "_id": format!("d{i}"), "n": i })));
        let store = InMemoryStore::with_documents("_id", documents).unwrap();
        let kept: Vec<Value> = (1..5_000).map(|i| json!(format!("d{i}"))).collect();
        let filter = PredicateTree::field("_id", docsync_query::Condition::NotIn(kept));

        assert_eq!(store.count_matching(&filter).await.unwrap(), 1);
        assert_eq!(store.delete_matching(&filter).await.unwrap(), 1);
        assert!(store.find_by_identity(&Identity::from("d0")).await.unwrap().is_none());
        assert_eq!(store.len(), 4_999);
    }
}
