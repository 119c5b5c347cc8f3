//! What a flush or a teardown did.

use keel_ecs::entity::EntityId;

use crate::dependency::DependencyReport;
use crate::ledger::LedgerEntry;

/// A storage operation that failed during replay.
///
/// Replay does not retry or hide these; it records them here and moves on to
/// the next operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayFailure {
    /// The log the failing operation came from.
    pub entry: LedgerEntry,
    /// The entity the operation targeted, if it targeted one.
    pub entity: Option<EntityId>,
    /// The storage engine's error, rendered.
    pub error: String,
}

/// Summary of one [`SyncPoint::flush`](crate::barrier::SyncPoint::flush).
#[derive(Debug, Clone, Default)]
pub struct FlushReport {
    /// Cycle number of the flush, starting at 0.
    pub cycle: u64,
    /// Producer jobs waited on before replay.
    pub dependencies: DependencyReport,
    /// Logs replayed, in ledger order.
    pub logs_replayed: usize,
    /// Recorded operations applied without any storage failure.
    pub ops_applied: usize,
    /// Roots created by spawn logs, in replay order.
    pub spawned: Vec<EntityId>,
    /// Storage failures, in replay order.
    pub failures: Vec<ReplayFailure>,
}

impl FlushReport {
    /// No storage failures and no panicked producer jobs.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.dependencies.failed == 0
    }
}

/// Summary of [`SyncPoint::shutdown`](crate::barrier::SyncPoint::shutdown).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Producer jobs waited on before discarding.
    pub dependencies: DependencyReport,
    /// Logs released without replay.
    pub logs_discarded: usize,
    /// Recorded operations dropped with them.
    pub ops_discarded: usize,
}
