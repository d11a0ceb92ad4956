//! Per-item outcomes and their aggregation into a bulk sync result.

use docsync_storage::{Identity, UpsertOutcome};
use serde::{Deserialize, Serialize};

/// What happened to one streamed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// A new document was created (with a fresh identity if none was given).
    Inserted(Identity),
    /// An existing document was replaced with different content.
    Modified(Identity),
    /// An existing document already had identical content.
    Unchanged(Identity),
    /// The item could not be written.
    Failed(Identity),
}

impl ItemOutcome {
    /// Maps an upsert result to an item outcome.
    pub fn from_upsert(id: Identity, outcome: UpsertOutcome) -> Self {
        match outcome {
            UpsertOutcome::Created => ItemOutcome::Inserted(id),
            UpsertOutcome::Modified => ItemOutcome::Modified(id),
            UpsertOutcome::Unchanged => ItemOutcome::Unchanged(id),
        }
    }

    /// The identity the outcome refers to.
    pub fn identity(&self) -> &Identity {
        match self {
            ItemOutcome::Inserted(id)
            | ItemOutcome::Modified(id)
            | ItemOutcome::Unchanged(id)
            | ItemOutcome::Failed(id) => id,
        }
    }
}

/// Summary of a bulk synchronization.
///
/// Serializes with exactly the keys `inserted`, `modified`, `unchanged`,
/// `deleted` and `failed`, each a list of identity strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSyncResult {
    /// Items that created a document.
    pub inserted: Vec<Identity>,
    /// Items that replaced a different document.
    pub modified: Vec<Identity>,
    /// Items identical to the stored document.
    pub unchanged: Vec<Identity>,
    /// Pre-existing documents in scope that were not in the input.
    pub deleted: Vec<Identity>,
    /// Items that could not be written.
    pub failed: Vec<Identity>,
}

impl BulkSyncResult {
    /// Number of streamed items reported (every bucket except `deleted`).
    pub fn items_processed(&self) -> usize {
        self.inserted.len() + self.modified.len() + self.unchanged.len() + self.failed.len()
    }
}

/// Folds item outcomes into result buckets.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    result: BulkSyncResult,
}

impl ResultAggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one item outcome.
    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Inserted(id) => self.result.inserted.push(id),
            ItemOutcome::Modified(id) => self.result.modified.push(id),
            ItemOutcome::Unchanged(id) => self.result.unchanged.push(id),
            ItemOutcome::Failed(id) => self.result.failed.push(id),
        }
    }

    /// Identities that now exist in the store because of this run.
    pub fn processed(&self) -> Vec<Identity> {
        self.result
            .inserted
            .iter()
            .chain(&self.result.modified)
            .chain(&self.result.unchanged)
            .cloned()
            .collect()
    }

    /// Number of outcomes recorded so far.
    pub fn recorded(&self) -> usize {
        self.result.items_processed()
    }

    /// Completes the result with the reconciliation deletions.
    pub fn finish(mut self, deleted: Vec<Identity>) -> BulkSyncResult {
        self.result.deleted = deleted;
        self.result
    }
}
