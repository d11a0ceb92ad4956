//! Concurrent access to the in-memory store.

use docsync_query::compile;
use docsync_storage::{DocumentStore, FindOptions, Identity, InMemoryStore, UpsertOutcome};
use serde_json::json;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_upserts_and_inserts() {
    let store = Arc::new(InMemoryStore::new());
    let mut handles = Vec::new();

    for i in 0..64 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let document = json!({ "n": i, "even": i % 2 == 0 }).as_object().cloned().unwrap();
            if i % 4 == 0 {
                store.insert(document).await.map(|_| UpsertOutcome::Created)
            } else {
                store.upsert_replace(&Identity::new(format!("id-{i}")), document).await
            }
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), UpsertOutcome::Created);
    }

    assert_eq!(store.len(), 64);
    let evens = compile("even=true").unwrap().filter;
    assert_eq!(store.count_matching(&evens).await.unwrap(), 32);
}

#[tokio::test]
async fn find_sorts_mixed_types() {
    let store = InMemoryStore::new();
    for (id, value) in [("1", json!("b")), ("2", json!(3)), ("3", json!(null)), ("4", json!("a"))] {
        store
            .upsert_replace(&Identity::from(id), json!({ "v": value }).as_object().cloned().unwrap())
            .await
            .unwrap();
    }

    let descriptor = compile("$sort=v").unwrap();
    let found = store
        .find_matching(&FindOptions::from_descriptor(&descriptor))
        .await
        .unwrap();
    let order: Vec<&str> = found
        .iter()
        .map(|d| d.get("_id").and_then(|v| v.as_str()).unwrap())
        .collect();
    assert_eq!(order, vec!["3", "2", "4", "1"]);
}
