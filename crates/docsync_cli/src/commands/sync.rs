//! Bulk sync command.

use docsync_storage::InMemoryStore;
use docsync_sync_engine::{BulkSyncEngine, BulkSyncResult, SyncConfig};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Replaces the collection in `store_path` with the array in `input`,
/// writes the collection back, and prints the result.
pub async fn run(
    store_path: &Path,
    identity_field: &str,
    input: &Path,
    scope: &str,
    concurrency: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = sync(store_path, identity_field, input, scope, concurrency).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn sync(
    store_path: &Path,
    identity_field: &str,
    input: &Path,
    scope: &str,
    concurrency: usize,
) -> Result<BulkSyncResult, Box<dyn std::error::Error>> {
    info!("Syncing {:?} into {:?}", input, store_path);

    let store = InMemoryStore::open(store_path, identity_field)?;
    let config = SyncConfig::new().with_max_concurrency(concurrency);
    let engine = BulkSyncEngine::new(Arc::new(store), config);

    let source = tokio::fs::File::open(input).await?;
    let result = engine.synchronize_query(scope, source).await?;

    engine.store().save(store_path)?;
    info!("Wrote {} documents to {:?}", engine.store().len(), store_path);
    Ok(result)
}
