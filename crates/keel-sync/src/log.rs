//! Mutation logs and the producer-facing handles that append to them.
//!
//! A mutation log is owned by the [`SyncPoint`](crate::barrier::SyncPoint)
//! from creation until it is replayed or discarded. Producers get a
//! [`LogHandle`], which holds only a weak reference: once the sync point
//! releases the log, any further append through the handle panics with the
//! ledger entry that issued it.
//!
//! Handles are neither `Clone` nor shareable for writing (appends take
//! `&mut self`), so each log has exactly one writer. They are `Send`, so the
//! writer may be a job on another thread.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use keel_ecs::entity::EntityId;
use keel_ecs::template::TemplateId;
use parking_lot::Mutex;

use crate::ledger::{LedgerEntry, LogKind};

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

mod sealed {
    pub trait Sealed {}
}

/// Type-level tag for a log kind. Sealed; the four kinds below are all there
/// is.
pub trait Kind: sealed::Sealed + 'static {
    /// The runtime tag written into the ledger.
    const KIND: LogKind;
    /// One recorded operation.
    type Op: fmt::Debug + Send + 'static;
}

/// Marker for spawn logs.
#[derive(Debug)]
pub enum Spawn {}
/// Marker for enable logs.
#[derive(Debug)]
pub enum Enable {}
/// Marker for disable logs.
#[derive(Debug)]
pub enum Disable {}
/// Marker for destroy logs.
#[derive(Debug)]
pub enum Destroy {}

impl sealed::Sealed for Spawn {}
impl sealed::Sealed for Enable {}
impl sealed::Sealed for Disable {}
impl sealed::Sealed for Destroy {}

impl Kind for Spawn {
    const KIND: LogKind = LogKind::Spawn;
    type Op = SpawnOp;
}

impl Kind for Enable {
    const KIND: LogKind = LogKind::Enable;
    type Op = EntityId;
}

impl Kind for Disable {
    const KIND: LogKind = LogKind::Disable;
    type Op = EntityId;
}

impl Kind for Destroy {
    const KIND: LogKind = LogKind::Destroy;
    type Op = EntityId;
}

/// A recorded instantiation.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnOp {
    /// Template to instantiate.
    pub template: TemplateId,
    /// Component values applied to the root after the template's own.
    pub overrides: Vec<(String, serde_json::Value)>,
}

// ---------------------------------------------------------------------------
// MutationLog
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum LogState<Op> {
    Recording(Vec<Op>),
    Released,
}

/// Append-only storage for one log. Only the sync point holds strong
/// references.
#[derive(Debug)]
pub(crate) struct MutationLog<Op> {
    state: Mutex<LogState<Op>>,
}

impl<Op> MutationLog<Op> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LogState::Recording(Vec::new())),
        })
    }

    /// Hand the recorded operations to replay and mark the log released.
    pub(crate) fn take(&self) -> Vec<Op> {
        match std::mem::replace(&mut *self.state.lock(), LogState::Released) {
            LogState::Recording(ops) => ops,
            LogState::Released => Vec::new(),
        }
    }

    /// Drop the recorded operations unreplayed. Returns how many there were.
    pub(crate) fn discard(&self) -> usize {
        self.take().len()
    }
}

// ---------------------------------------------------------------------------
// LogHandle
// ---------------------------------------------------------------------------

/// Producer-side handle to a mutation log of kind `K`.
pub struct LogHandle<K: Kind> {
    log: Weak<MutationLog<K::Op>>,
    entry: LedgerEntry,
    _kind: PhantomData<fn() -> K>,
}

/// Handle to a spawn log.
pub type SpawnLog = LogHandle<Spawn>;
/// Handle to an enable log.
pub type EnableLog = LogHandle<Enable>;
/// Handle to a disable log.
pub type DisableLog = LogHandle<Disable>;
/// Handle to a destroy log.
pub type DestroyLog = LogHandle<Destroy>;

impl<K: Kind> LogHandle<K> {
    pub(crate) fn new(log: &Arc<MutationLog<K::Op>>, entry: LedgerEntry) -> Self {
        debug_assert_eq!(entry.kind, K::KIND);
        Self {
            log: Arc::downgrade(log),
            entry,
            _kind: PhantomData,
        }
    }

    /// The ledger entry issued for this log.
    pub fn entry(&self) -> LedgerEntry {
        self.entry
    }

    /// Whether the sync point has already replayed or discarded this log.
    pub fn is_released(&self) -> bool {
        self.log
            .upgrade()
            .map_or(true, |log| matches!(*log.state.lock(), LogState::Released))
    }

    /// Number of operations recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if the log was released.
    pub fn len(&self) -> usize {
        self.with_ops(|ops| ops.len())
    }

    /// Whether nothing has been recorded yet.
    ///
    /// # Panics
    ///
    /// Panics if the log was released.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn append(&mut self, op: K::Op) {
        self.with_ops(|ops| ops.push(op));
    }

    fn with_ops<R>(&self, f: impl FnOnce(&mut Vec<K::Op>) -> R) -> R {
        let Some(log) = self.log.upgrade() else {
            self.used_after_release()
        };
        let mut state = log.state.lock();
        if let LogState::Recording(ops) = &mut *state {
            return f(ops);
        }
        drop(state);
        self.used_after_release()
    }

    #[cold]
    #[track_caller]
    fn used_after_release(&self) -> ! {
        panic!(
            "{} was used after release: logs are replayed once and never reused",
            self.entry
        )
    }
}

impl<K: Kind> fmt::Debug for LogHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogHandle")
            .field("entry", &self.entry)
            .field("released", &self.is_released())
            .finish()
    }
}

impl SpawnLog {
    /// Record an instantiation of `template`.
    pub fn instantiate(&mut self, template: TemplateId) {
        self.instantiate_with(template, Vec::new());
    }

    /// Record an instantiation of `template` with component overrides for
    /// the root entity.
    pub fn instantiate_with(
        &mut self,
        template: TemplateId,
        overrides: Vec<(String, serde_json::Value)>,
    ) {
        self.append(SpawnOp {
            template,
            overrides,
        });
    }
}

impl EnableLog {
    /// Record that `entity` and its linked group become active.
    pub fn enable(&mut self, entity: EntityId) {
        self.append(entity);
    }
}

impl DisableLog {
    /// Record that `entity` and its linked group become inactive.
    pub fn disable(&mut self, entity: EntityId) {
        self.append(entity);
    }
}

impl DestroyLog {
    /// Record that `entity` is destroyed.
    pub fn destroy(&mut self, entity: EntityId) {
        self.append(entity);
    }

    /// Record several destructions, in iteration order.
    pub fn destroy_all(&mut self, entities: impl IntoIterator<Item = EntityId>) {
        self.with_ops(|ops| ops.extend(entities));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
