//! Bulk synchronization engine.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::reconcile::ReconciliationPlanner;
use crate::result::{BulkSyncResult, ItemOutcome, ResultAggregator};
use crate::state::{InFlight, SyncState, SyncStats};
use crate::stream::JsonArrayReader;
use docsync_query::{PredicateTree, QueryCompiler};
use docsync_storage::{Document, DocumentStore, Identity};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncRead;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

/// Replaces the contents of a collection with a streamed JSON array.
///
/// Each element is written with a whole-document upsert (or an insert
/// when it carries no identity) as its own task. At most
/// [`SyncConfig::max_concurrency`] tasks run at once; while that many are
/// in flight, decoding of the input stops. Once the input is exhausted
/// and every task has finished, documents in scope that the input did not
/// mention are deleted.
///
/// Two elements with the same identity race at the store; which one
/// wins is not defined.
pub struct BulkSyncEngine<S: DocumentStore> {
    store: Arc<S>,
    config: SyncConfig,
    compiler: QueryCompiler,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<S: DocumentStore + 'static> BulkSyncEngine<S> {
    /// Creates an engine writing to `store`.
    pub fn new(store: Arc<S>, config: SyncConfig) -> Self {
        let compiler = QueryCompiler::new().with_identity_field(store.identity_field());
        Self {
            store,
            config,
            compiler,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Compiles `raw_query` and synchronizes within its filter.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Grammar`] for an invalid query, otherwise as
    /// [`BulkSyncEngine::synchronize`].
    pub async fn synchronize_query<R>(&self, raw_query: &str, source: R) -> SyncResult<BulkSyncResult>
    where
        R: AsyncRead + Unpin + Send,
    {
        let descriptor = self.compiler.compile(raw_query)?;
        self.synchronize(Some(&descriptor.filter), source).await
    }

    /// Synchronizes an in-memory list of items.
    ///
    /// # Errors
    ///
    /// As [`BulkSyncEngine::synchronize`].
    pub async fn synchronize_items(
        &self,
        scope: Option<&PredicateTree>,
        items: Vec<Value>,
    ) -> SyncResult<BulkSyncResult> {
        let body = serde_json::to_vec(&Value::Array(items))
            .map_err(|e| SyncError::bad_request(e.to_string()))?;
        self.synchronize(scope, body.as_slice()).await
    }

    /// Makes the documents matching `scope` equal to the array read from
    /// `source`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::BadRequest`] if the stream is not a JSON array
    /// of objects; work already dispatched is awaited and its results are
    /// discarded. Returns [`SyncError::Storage`] if reconciliation fails
    /// and [`SyncError::Worker`] if an item task panics. Failures of
    /// individual item writes are reported in [`BulkSyncResult::failed`].
    pub async fn synchronize<R>(&self, scope: Option<&PredicateTree>, source: R) -> SyncResult<BulkSyncResult>
    where
        R: AsyncRead + Unpin + Send,
    {
        let start = Instant::now();
        self.set_state(SyncState::Decoding);

        let tracker = Arc::new(InFlight::default());
        let outcome = self.run(scope, source, &tracker).await;

        let mut stats = self.stats.write();
        stats.peak_in_flight = stats.peak_in_flight.max(tracker.peak());
        match &outcome {
            Ok(result) => {
                self.set_state(SyncState::Done);
                stats.runs_completed += 1;
                stats.items_processed += result.items_processed() as u64;
                stats.documents_deleted += result.deleted.len() as u64;
                stats.last_duration = Some(start.elapsed());
                info!(
                    "bulk sync finished in {:?}: {} inserted, {} modified, {} unchanged, {} deleted, {} failed",
                    start.elapsed(),
                    result.inserted.len(),
                    result.modified.len(),
                    result.unchanged.len(),
                    result.deleted.len(),
                    result.failed.len()
                );
            }
            Err(e) => {
                self.set_state(SyncState::Aborted);
                stats.runs_aborted += 1;
                stats.last_error = Some(e.to_string());
                warn!("bulk sync aborted: {}", e);
            }
        }
        outcome
    }

    async fn run<R>(
        &self,
        scope: Option<&PredicateTree>,
        source: R,
        tracker: &Arc<InFlight>,
    ) -> SyncResult<BulkSyncResult>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut reader = JsonArrayReader::new(source, &self.config);
        let permits = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut aggregator = ResultAggregator::new();
        let mut failure: Option<SyncError> = None;

        loop {
            while let Some(joined) = tasks.try_join_next() {
                collect(joined, &mut aggregator, &mut failure);
            }
            if failure.is_some() {
                break;
            }
            if permits.available_permits() == 0 {
                self.set_state(SyncState::Suspended);
                debug!("{} items in flight, decoding suspended", tracker.current());
            }
            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    failure = Some(SyncError::Worker(e.to_string()));
                    break;
                }
            };
            if self.state() == SyncState::Suspended {
                self.set_state(SyncState::Decoding);
                debug!("decoding resumed");
            }

            let item = match reader.next_item().await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };
            let position = reader.position() - 1;
            let document = match item {
                Value::Object(document) => document,
                other => {
                    failure = Some(SyncError::bad_request(format!(
                        "element {position} is {}, expected an object",
                        kind(&other)
                    )));
                    break;
                }
            };

            let store = Arc::clone(&self.store);
            let guard = InFlight::enter(tracker);
            debug!("dispatching element {}", position);
            tasks.spawn(async move {
                let outcome = apply_item(store.as_ref(), position, document).await;
                drop(guard);
                drop(permit);
                outcome
            });
        }

        self.set_state(SyncState::Draining);
        while let Some(joined) = tasks.join_next().await {
            collect(joined, &mut aggregator, &mut failure);
        }
        if let Some(e) = failure {
            if aggregator.recorded() > 0 {
                debug!("discarding {} completed item results", aggregator.recorded());
            }
            return Err(e);
        }

        debug_assert_eq!(tracker.current(), 0);
        self.set_state(SyncState::Reconciling);
        let deleted = ReconciliationPlanner::new(self.store.as_ref())
            .reconcile(scope, &aggregator.processed())
            .await?;
        Ok(aggregator.finish(deleted))
    }
}

/// Records a finished item task; a panicked task fails the run.
fn collect(
    joined: Result<ItemOutcome, JoinError>,
    aggregator: &mut ResultAggregator,
    failure: &mut Option<SyncError>,
) {
    match joined {
        Ok(outcome) => aggregator.record(outcome),
        Err(e) => {
            warn!("item task failed: {}", e);
            failure.get_or_insert(SyncError::Worker(e.to_string()));
        }
    }
}

/// Writes one item and classifies the result.
async fn apply_item<S: DocumentStore + ?Sized>(
    store: &S,
    position: usize,
    document: Document,
) -> ItemOutcome {
    let identity = match document.get(store.identity_field()) {
        None | Some(Value::Null) => None,
        Some(value) => Some(Identity::from_value(value).ok_or_else(|| value.to_string())),
    };

    match identity {
        None => match store.insert(document).await {
            Ok(id) => ItemOutcome::Inserted(id),
            Err(e) => {
                warn!("insert of element {} failed: {}", position, e);
                ItemOutcome::Failed(Identity::new(format!("#{position}")))
            }
        },
        Some(Err(raw)) => {
            warn!("element {} has an unusable identity {}", position, raw);
            ItemOutcome::Failed(Identity::new(raw))
        }
        Some(Ok(id)) => match store.upsert_replace(&id, document).await {
            Ok(outcome) => ItemOutcome::from_upsert(id, outcome),
            Err(e) => {
                warn!("upsert of {} failed: {}", id, e);
                ItemOutcome::Failed(id)
            }
        },
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
