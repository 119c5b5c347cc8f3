//! The issuance ledger: which logs were created this cycle, by whom, and in
//! what order.
//!
//! The ledger's order is the only ordering between logs of different kinds.
//! Replay walks it front to back; entries are never reordered or removed
//! individually, only cleared in bulk at the end of a cycle.

use std::fmt;

use keel_ecs::system::SystemId;
use serde::{Deserialize, Serialize};

/// The kind of a mutation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogKind {
    /// Instantiate entities from templates.
    Spawn,
    /// Activate entities and their linked groups.
    Enable,
    /// Deactivate entities and their linked groups.
    Disable,
    /// Destroy entities (and their linked groups, per storage contract).
    Destroy,
}

impl LogKind {
    /// Every kind, in declaration order.
    pub const ALL: [LogKind; 4] = [
        LogKind::Spawn,
        LogKind::Enable,
        LogKind::Disable,
        LogKind::Destroy,
    ];

    /// Lower-case name used in logs and panics.
    pub fn as_str(self) -> &'static str {
        match self {
            LogKind::Spawn => "spawn",
            LogKind::Enable => "enable",
            LogKind::Disable => "disable",
            LogKind::Destroy => "destroy",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One issued log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Index in the ledger, which is also the global replay position.
    pub position: u32,
    /// Kind of the issued log.
    pub kind: LogKind,
    /// The system that asked for the log.
    pub requested_by: SystemId,
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} log #{} requested by {}",
            self.kind, self.position, self.requested_by
        )
    }
}

fn next_position(len: usize, kind: LogKind, requested_by: SystemId) -> u32 {
    u32::try_from(len).unwrap_or_else(|_| {
        panic!("{kind} log requested by {requested_by} overflows the issuance ledger")
    })
}

/// Insertion-ordered record of issued logs for the current cycle.
#[derive(Debug, Clone, Default)]
pub struct IssuanceLedger {
    entries: Vec<LedgerEntry>,
}

impl IssuanceLedger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry for a freshly created log and return it.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` logs are issued in one cycle.
    pub fn issue(&mut self, kind: LogKind, requested_by: SystemId) -> LedgerEntry {
        let position = next_position(self.entries.len(), kind, requested_by);
        let entry = LedgerEntry {
            position,
            kind,
            requested_by,
        };
        self.entries.push(entry);
        entry
    }

    /// All entries in issuance order.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Number of entries issued this cycle.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no log has been issued this cycle.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries of one kind.
    pub fn count_of(&self, kind: LogKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    /// Forget every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl IntoIterator for IssuanceLedger {
    type Item = LedgerEntry;
    type IntoIter = std::vec::IntoIter<LedgerEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
