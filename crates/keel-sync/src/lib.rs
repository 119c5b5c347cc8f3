//! Keel Sync -- deferred structural mutations replayed at a frame sync point.
//!
//! Systems running in parallel cannot create, destroy, enable, or disable
//! entities directly without racing on shared storage. Instead they ask a
//! [`SyncPoint`](barrier::SyncPoint) for a mutation log of the kind they need,
//! record intents into it (from any thread), and contribute the
//! [`JobHandle`](job::JobHandle) of any background work still writing. Once
//! per frame the sync point waits for that work, replays every log in the
//! order the logs were issued, and releases them.
//!
//! Ordering is two-level: operations inside one log replay in append order;
//! logs replay in issuance-ledger order regardless of kind.
//!
//! # Quick Start
//!
//! ```
//! use keel_ecs::prelude::*;
//! use keel_sync::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Hp(u32);
//!
//! let mut world = World::new();
//! world.register_component::<Hp>("hp");
//! let squad = world
//!     .register_template(
//!         Template::new("squad")
//!             .with_component("hp", serde_json::json!(10))
//!             .with_linked(Template::new("medic").with_component("hp", serde_json::json!(5))),
//!     )
//!     .unwrap();
//!
//! let mut sync_point = SyncPoint::new();
//! let mut spawns = sync_point.create_spawn_log(SystemId(1));
//!
//! let (handle, signal) = JobHandle::pending();
//! sync_point.contribute_dependency(handle);
//! std::thread::spawn(move || {
//!     spawns.instantiate(squad);
//!     signal.complete();
//! });
//!
//! let report = sync_point.flush(&mut world);
//! assert_eq!(report.spawned.len(), 1);
//! assert_eq!(world.entity_count(), 2);
//! ```

#![deny(unsafe_code)]

pub mod barrier;
pub mod dependency;
pub mod job;
pub mod ledger;
pub mod log;
mod replay;
pub mod report;
pub mod store;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::barrier::SyncPoint;
    pub use crate::dependency::{DependencyAggregate, DependencyReport};
    pub use crate::job::{JobHandle, JobOutcome, JobSignal};
    pub use crate::ledger::{IssuanceLedger, LedgerEntry, LogKind};
    pub use crate::log::{DestroyLog, DisableLog, EnableLog, LogHandle, SpawnLog, SpawnOp};
    pub use crate::report::{FlushReport, ReplayFailure, TeardownReport};
    pub use crate::store::StructuralStore;
}
