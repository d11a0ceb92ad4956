//! Deletion of documents that a bulk sync did not mention.

use crate::error::SyncResult;
use docsync_query::{Condition, PredicateTree};
use docsync_storage::{DocumentStore, FindOptions, Identity};
use tracing::debug;

/// Plans and executes the reconciliation step of a bulk sync.
///
/// Every document that matches the scope filter and whose identity is
/// not in the processed set is deleted.
pub struct ReconciliationPlanner<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: DocumentStore + ?Sized> ReconciliationPlanner<'a, S> {
    /// Creates a planner over `store`.
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Builds the delete filter: `scope AND identity NOT IN processed`.
    ///
    /// An absent or empty scope leaves just the identity clause.
    pub fn delete_filter(&self, scope: Option<&PredicateTree>, processed: &[Identity]) -> PredicateTree {
        let exclusion = PredicateTree::field(
            self.store.identity_field(),
            Condition::NotIn(processed.iter().map(Identity::to_value).collect()),
        );
        match scope {
            Some(scope) => scope.clone().and(exclusion),
            None => exclusion,
        }
    }

    /// Finds and deletes documents outside the processed set, returning
    /// their identities.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn reconcile(
        &self,
        scope: Option<&PredicateTree>,
        processed: &[Identity],
    ) -> SyncResult<Vec<Identity>> {
        let filter = self.delete_filter(scope, processed);
        debug!("reconciliation filter {}", filter.to_native());
        let identity_field = self.store.identity_field();
        let options = FindOptions::new(filter).identity_only(identity_field);

        let doomed: Vec<Identity> = self
            .store
            .find_matching(&options)
            .await?
            .iter()
            .filter_map(|doc| doc.get(identity_field).and_then(Identity::from_value))
            .collect();

        if !doomed.is_empty() {
            let deleted = self.store.delete_by_identities(&doomed).await?;
            debug!("reconciliation deleted {} of {} documents", deleted, doomed.len());
        }
        Ok(doomed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_query::compile;
    use docsync_storage::InMemoryStore;
    use serde_json::json;

    #[test]
    fn filter_without_scope() {
        let store = InMemoryStore::new();
        let planner = ReconciliationPlanner::new(&store);
        let filter = planner.delete_filter(None, &["a".into(), "b".into()]);
        assert_eq!(filter.to_native(), json!({ "_id": { "$nin": ["a", "b"] } }));
    }

    #[test]
    fn filter_with_scope() {
        let store = InMemoryStore::with_identity_field("key");
        let planner = ReconciliationPlanner::new(&store);
        let scope = compile("group=1").unwrap().filter;
        let filter = planner.delete_filter(Some(&scope), &["a".into()]);
        assert_eq!(
            filter.to_native(),
            json!({ "$and": [{ "group": { "$eq": 1 } }, { "key": { "$nin": ["a"] } }] })
        );

        let empty = PredicateTree::match_all();
        let filter = planner.delete_filter(Some(&empty), &[]);
        assert_eq!(filter.to_native(), json!({ "key": { "$nin": [] } }));
    }

    #[tokio::test]
    async fn reconcile_deletes_unmentioned() {
        let store = InMemoryStore::with_documents(
            "_id",
            vec![
                json!({ "_id": "a", "g": 1 }).as_object().cloned().unwrap(),
                json!({ "_id": "b", "g": 1 }).as_object().cloned().unwrap(),
                json!({ "_id": "c", "g": 2 }).as_object().cloned().unwrap(),
            ],
        )
        .unwrap();
        let planner = ReconciliationPlanner::new(&store);
        let scope = compile("g=1").unwrap().filter;

        let deleted = planner.reconcile(Some(&scope), &["a".into()]).await.unwrap();
        assert_eq!(deleted, vec![Identity::from("b")]);
        assert_eq!(store.identities(), vec![Identity::from("a"), Identity::from("c")]);
    }
}
