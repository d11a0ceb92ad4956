//! Bulk sync state machine and statistics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The phase of the most recent bulk sync.
///
/// A run moves `Idle → Decoding → (Suspended ⇄ Decoding)* → Draining →
/// Reconciling → Done`. A malformed stream or a failed worker ends it in
/// `Aborted` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No run has started.
    Idle,
    /// Elements are being decoded and dispatched.
    Decoding,
    /// Decoding is paused until an in-flight item completes.
    Suspended,
    /// The input is exhausted; waiting for in-flight items.
    Draining,
    /// Deleting documents the input did not mention.
    Reconciling,
    /// The last run completed.
    Done,
    /// The last run failed.
    Aborted,
}

impl SyncState {
    /// Returns true while a run is in progress.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Decoding | SyncState::Suspended | SyncState::Draining | SyncState::Reconciling
        )
    }

    /// Returns true if the state ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Done | SyncState::Aborted)
    }
}

/// Statistics about bulk sync runs.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Runs that completed.
    pub runs_completed: u64,
    /// Runs that ended with an error.
    pub runs_aborted: u64,
    /// Items reported by completed runs.
    pub items_processed: u64,
    /// Documents deleted by reconciliation.
    pub documents_deleted: u64,
    /// Highest number of items in flight at once, across all runs.
    pub peak_in_flight: usize,
    /// Duration of the last completed run.
    pub last_duration: Option<Duration>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Counts per-item operations in flight and remembers the peak.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    /// Marks one operation as started; it ends when the guard drops.
    pub(crate) fn enter(tracker: &Arc<Self>) -> InFlightGuard {
        let now = tracker.current.fetch_add(1, Ordering::SeqCst) + 1;
        tracker.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard {
            tracker: Arc::clone(tracker),
        }
    }

    pub(crate) fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight count on drop, including when a task panics.
#[derive(Debug)]
pub(crate) struct InFlightGuard {
    tracker: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tracker.current.fetch_sub(1, Ordering::SeqCst);
    }
}
