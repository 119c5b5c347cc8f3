//! The sync point: one place per frame where deferred structural mutations
//! are applied.
//!
//! # Cycle
//!
//! 1. Producers call `create_*_log` to get a [`LogHandle`] and record into it,
//!    possibly from jobs on other threads. Every creation appends an entry to
//!    the [`IssuanceLedger`]. Jobs that write into a log contribute their
//!    [`JobHandle`] via [`contribute_dependency`](SyncPoint::contribute_dependency).
//! 2. [`flush`](SyncPoint::flush) waits for every contributed job, walks the
//!    ledger in order, replays each log against storage, releases it, and
//!    clears all bookkeeping.
//!
//! [`shutdown`](SyncPoint::shutdown) (also run on drop) waits for producers
//! the same way but discards pending logs instead of replaying them.
//!
//! Creation and contribution take `&self` and may race with each other;
//! flush and shutdown take `&mut self`, so they can never overlap with
//! recording or with each other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use keel_ecs::entity::EntityId;
use keel_ecs::system::SystemId;
use parking_lot::Mutex;
use tracing::{debug, debug_span, info};

use crate::dependency::{DependencyAggregate, DependencyReport};
use crate::job::JobHandle;
use crate::ledger::{IssuanceLedger, LedgerEntry, LogKind};
use crate::log::{
    DestroyLog, DisableLog, EnableLog, Kind, LogHandle, MutationLog, SpawnLog, SpawnOp,
};
use crate::replay::{replay_destroy, replay_set_enabled, replay_spawn};
use crate::report::{FlushReport, TeardownReport};
use crate::store::StructuralStore;

type Logs<Op> = Vec<Arc<MutationLog<Op>>>;

/// Bookkeeping for the current cycle. The ledger and the per-kind lists are
/// always updated under the same lock, so the n-th ledger entry of a kind
/// always matches the n-th log of that kind.
#[derive(Default)]
struct Pending {
    ledger: IssuanceLedger,
    spawn: Logs<SpawnOp>,
    enable: Logs<EntityId>,
    disable: Logs<EntityId>,
    destroy: Logs<EntityId>,
}

impl Pending {
    fn log_count(&self) -> usize {
        self.spawn.len() + self.enable.len() + self.disable.len() + self.destroy.len()
    }
}

/// Pops the next log of one kind. Running dry means the ledger and the
/// per-kind lists disagree, which only a bug in this module can cause.
fn next_log<Op>(
    logs: &mut std::vec::IntoIter<Arc<MutationLog<Op>>>,
    entry: LedgerEntry,
) -> Arc<MutationLog<Op>> {
    logs.next()
        .unwrap_or_else(|| panic!("sync point bookkeeping corrupted: no log stored for {entry}"))
}

// ---------------------------------------------------------------------------
// SyncPoint
// ---------------------------------------------------------------------------

/// Collects mutation logs from concurrent producers and replays them, in
/// creation order, at a single point per frame.
///
/// ```
/// use keel_ecs::prelude::*;
/// use keel_sync::prelude::*;
///
/// #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
/// struct Hp(u32);
///
/// let mut world = World::new();
/// world.register_component::<Hp>("hp");
/// let doomed = world.spawn_with(Hp(1)).unwrap();
///
/// let mut sync_point = SyncPoint::new();
/// let mut destroy = sync_point.create_destroy_log(SystemId(1));
/// destroy.destroy(doomed);
///
/// let report = sync_point.flush(&mut world);
/// assert_eq!(report.ops_applied, 1);
/// assert!(!world.is_alive(doomed));
/// assert!(destroy.is_released());
/// ```
pub struct SyncPoint {
    pending: Mutex<Pending>,
    dependencies: DependencyAggregate,
    cycle: u64,
    shut_down: AtomicBool,
}

impl SyncPoint {
    /// A sync point with nothing pending.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Pending::default()),
            dependencies: DependencyAggregate::new(),
            cycle: 0,
            shut_down: AtomicBool::new(false),
        }
    }

    // -- producer API -------------------------------------------------------

    /// Issue a new spawn log to `requested_by`.
    pub fn create_spawn_log(&self, requested_by: SystemId) -> SpawnLog {
        self.create(requested_by, |p| &mut p.spawn)
    }

    /// Issue a new enable log to `requested_by`.
    pub fn create_enable_log(&self, requested_by: SystemId) -> EnableLog {
        self.create(requested_by, |p| &mut p.enable)
    }

    /// Issue a new disable log to `requested_by`.
    pub fn create_disable_log(&self, requested_by: SystemId) -> DisableLog {
        self.create(requested_by, |p| &mut p.disable)
    }

    /// Issue a new destroy log to `requested_by`.
    pub fn create_destroy_log(&self, requested_by: SystemId) -> DestroyLog {
        self.create(requested_by, |p| &mut p.destroy)
    }

    /// Register asynchronous work that must finish before any log is read.
    ///
    /// # Panics
    ///
    /// Panics after [`shutdown`](Self::shutdown).
    pub fn contribute_dependency(&self, handle: JobHandle) {
        self.assert_live("contribute a dependency to");
        self.dependencies.contribute(handle);
    }

    // -- inspection ---------------------------------------------------------

    /// Whether any log was issued this cycle. When `false`, calling
    /// [`flush`](Self::flush) would only wait on dependencies.
    pub fn has_pending_work(&self) -> bool {
        !self.pending.lock().ledger.is_empty()
    }

    /// Number of logs issued this cycle.
    pub fn pending_logs(&self) -> usize {
        self.pending.lock().log_count()
    }

    /// Number of dependencies contributed this cycle.
    pub fn pending_dependencies(&self) -> usize {
        self.dependencies.len()
    }

    /// Snapshot of this cycle's ledger, in issuance order.
    pub fn ledger(&self) -> Vec<LedgerEntry> {
        self.pending.lock().ledger.entries().to_vec()
    }

    /// Number of completed flushes.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Drop contributed dependencies whose jobs have already finished,
    /// leaving running ones for the next [`flush`](Self::flush). For cycles
    /// that end without a flush. Never blocks.
    pub fn prune_completed_dependencies(&mut self) -> DependencyReport {
        self.dependencies.prune_completed()
    }

    // -- barrier point ------------------------------------------------------

    /// Wait for every contributed dependency, then replay every log issued
    /// this cycle in ledger order and release it.
    ///
    /// Storage failures are reported, not retried. On an empty ledger this
    /// only drains the dependencies and touches no storage.
    ///
    /// # Panics
    ///
    /// Panics after [`shutdown`](Self::shutdown).
    pub fn flush<S: StructuralStore>(&mut self, store: &mut S) -> FlushReport {
        self.assert_live("flush");
        let _flush_span = debug_span!("sync_point_flush", cycle = self.cycle).entered();

        let dependencies = self.dependencies.wait_all_and_clear();
        let Pending {
            ledger,
            spawn,
            enable,
            disable,
            destroy,
        } = std::mem::take(self.pending.get_mut());

        let mut report = FlushReport {
            cycle: self.cycle,
            dependencies,
            ..FlushReport::default()
        };

        let mut spawn = spawn.into_iter();
        let mut enable = enable.into_iter();
        let mut disable = disable.into_iter();
        let mut destroy = destroy.into_iter();

        for entry in ledger {
            let _replay_span = debug_span!(
                "replay",
                position = entry.position,
                kind = %entry.kind,
                system = entry.requested_by.0
            )
            .entered();

            match entry.kind {
                LogKind::Spawn => {
                    let log = next_log(&mut spawn, entry);
                    replay_spawn(store, log.take(), entry, &mut report);
                }
                LogKind::Enable => {
                    let log = next_log(&mut enable, entry);
                    replay_set_enabled(store, log.take(), true, entry, &mut report);
                }
                LogKind::Disable => {
                    let log = next_log(&mut disable, entry);
                    replay_set_enabled(store, log.take(), false, entry, &mut report);
                }
                LogKind::Destroy => {
                    let log = next_log(&mut destroy, entry);
                    replay_destroy(store, log.take(), entry, &mut report);
                }
            }
            report.logs_replayed += 1;
        }

        debug!(
            cycle = self.cycle,
            logs = report.logs_replayed,
            ops = report.ops_applied,
            failures = report.failures.len(),
            dependencies = report.dependencies.awaited,
            "sync point flushed"
        );
        self.cycle += 1;
        report
    }

    /// Wait for every contributed dependency, then release every pending log
    /// without replaying it. Idempotent; later calls return an empty report.
    pub fn shutdown(&mut self) -> TeardownReport {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return TeardownReport::default();
        }

        let dependencies = self.dependencies.wait_all_and_clear();
        let pending = std::mem::take(self.pending.get_mut());

        let mut report = TeardownReport {
            dependencies,
            logs_discarded: pending.log_count(),
            ops_discarded: 0,
        };
        report.ops_discarded += pending.spawn.iter().map(|l| l.discard()).sum::<usize>();
        report.ops_discarded += pending.enable.iter().map(|l| l.discard()).sum::<usize>();
        report.ops_discarded += pending.disable.iter().map(|l| l.discard()).sum::<usize>();
        report.ops_discarded += pending.destroy.iter().map(|l| l.discard()).sum::<usize>();

        if report.logs_discarded > 0 {
            info!(
                logs = report.logs_discarded,
                ops = report.ops_discarded,
                "sync point shut down with pending logs; discarded without replay"
            );
        }
        report
    }

    // -- internal helpers ---------------------------------------------------

    fn create<K: Kind>(
        &self,
        requested_by: SystemId,
        logs: impl FnOnce(&mut Pending) -> &mut Logs<K::Op>,
    ) -> LogHandle<K> {
        self.assert_live("create a log on");
        let mut pending = self.pending.lock();
        let entry = pending.ledger.issue(K::KIND, requested_by);
        let log = MutationLog::<K::Op>::new();
        let handle = LogHandle::<K>::new(&log, entry);
        logs(&mut *pending).push(log);
        debug!(position = entry.position, kind = %entry.kind, system = requested_by.0, "log issued");
        handle
    }

    #[track_caller]
    fn assert_live(&self, action: &str) {
        assert!(
            !self.is_shut_down(),
            "attempted to {action} a sync point that has been shut down"
        );
    }
}

impl Default for SyncPoint {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SyncPoint {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SyncPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncPoint")
            .field("cycle", &self.cycle)
            .field("pending_logs", &self.pending_logs())
            .field("pending_dependencies", &self.pending_dependencies())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
