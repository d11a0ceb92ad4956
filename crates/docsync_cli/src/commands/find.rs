//! Collection read command.

use docsync_storage::InMemoryStore;
use docsync_sync_engine::{Collection, ItemsPage};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Prints the page of documents selected by `query`.
pub async fn run(
    store_path: &Path,
    identity_field: &str,
    query: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let page = find(store_path, identity_field, query).await?;
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}

async fn find(
    store_path: &Path,
    identity_field: &str,
    query: &str,
) -> Result<ItemsPage, Box<dyn std::error::Error>> {
    info!("Reading {:?}", store_path);
    let store = InMemoryStore::open(store_path, identity_field)?;
    let collection = Collection::new(Arc::new(store));
    Ok(collection.get_items(query).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    #[tokio::test]
    async fn finds_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        fs::write(&path, r#"[{"_id": "1", "n": 1}, {"_id": "2", "n": 2}]"#).unwrap();

        let page = find(&path, "_id", "n>1&$count").await.unwrap();
        assert_eq!(page.count, Some(1));
        assert_eq!(page.items[0].get("_id"), Some(&json!("2")));
    }

    #[tokio::test]
    async fn missing_file_is_empty_collection() {
        let dir = tempfile::tempdir().unwrap();
        let page = find(&dir.path().join("none.json"), "_id", "").await.unwrap();
        assert!(page.items.is_empty());
    }
}
