//! Per-kind replay of recorded operations against a [`StructuralStore`].
//!
//! Operations are applied in the order they were appended. A storage failure
//! is recorded in the [`FlushReport`] and replay continues with the next
//! operation.

use keel_ecs::entity::EntityId;
use tracing::warn;

use crate::ledger::LedgerEntry;
use crate::log::SpawnOp;
use crate::report::{FlushReport, ReplayFailure};
use crate::store::StructuralStore;

fn record_failure(
    report: &mut FlushReport,
    entry: LedgerEntry,
    entity: Option<EntityId>,
    error: &dyn std::error::Error,
) {
    warn!(
        position = entry.position,
        kind = %entry.kind,
        system = entry.requested_by.0,
        entity = ?entity,
        error = %error,
        "replayed operation rejected by storage"
    );
    report.failures.push(ReplayFailure {
        entry,
        entity,
        error: error.to_string(),
    });
}

pub(crate) fn replay_spawn<S: StructuralStore>(
    store: &mut S,
    ops: Vec<SpawnOp>,
    entry: LedgerEntry,
    report: &mut FlushReport,
) {
    for op in ops {
        match store.instantiate(op.template, &op.overrides) {
            Ok(root) => {
                report.spawned.push(root);
                report.ops_applied += 1;
            }
            Err(e) => record_failure(report, entry, None, &e),
        }
    }
}

/// Enable and disable share one path: expand through the linked group, then
/// toggle every member.
pub(crate) fn replay_set_enabled<S: StructuralStore>(
    store: &mut S,
    ops: Vec<EntityId>,
    enabled: bool,
    entry: LedgerEntry,
    report: &mut FlushReport,
) {
    for entity in ops {
        let mut members = store.linked_group(entity).unwrap_or_default();
        if !members.contains(&entity) {
            members.insert(0, entity);
        }

        let mut clean = true;
        for member in members {
            if let Err(e) = store.set_enabled(member, enabled) {
                clean = false;
                record_failure(report, entry, Some(member), &e);
            }
        }
        if clean {
            report.ops_applied += 1;
        }
    }
}

pub(crate) fn replay_destroy<S: StructuralStore>(
    store: &mut S,
    ops: Vec<EntityId>,
    entry: LedgerEntry,
    report: &mut FlushReport,
) {
    for entity in ops {
        match store.destroy(entity) {
            Ok(()) => report.ops_applied += 1,
            Err(e) => record_failure(report, entry, Some(entity), &e),
        }
    }
}
