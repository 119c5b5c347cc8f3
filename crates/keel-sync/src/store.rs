//! The storage-engine interface replay is written against.
//!
//! A sync point only touches storage inside
//! [`SyncPoint::flush`](crate::barrier::SyncPoint::flush), and only through
//! these four operations.

use keel_ecs::entity::EntityId;
use keel_ecs::template::TemplateId;
use keel_ecs::world::World;
use keel_ecs::EcsError;

/// Structural operations a storage engine must expose to be replayed into.
pub trait StructuralStore {
    /// Storage-defined failure for a single operation.
    type Error: std::error::Error;

    /// Create the entities described by `template`, returning the root.
    fn instantiate(
        &mut self,
        template: TemplateId,
        overrides: &[(String, serde_json::Value)],
    ) -> Result<EntityId, Self::Error>;

    /// Destroy `entity` and whatever the storage contract says depends on it.
    fn destroy(&mut self, entity: EntityId) -> Result<(), Self::Error>;

    /// Set the active flag of exactly one entity.
    fn set_enabled(&mut self, entity: EntityId, enabled: bool) -> Result<(), Self::Error>;

    /// Resolve the group-membership relation: every entity linked to
    /// `entity`, itself included. `None` when `entity` heads no group.
    fn linked_group(&self, entity: EntityId) -> Option<Vec<EntityId>>;
}

impl StructuralStore for World {
    type Error = EcsError;

    fn instantiate(
        &mut self,
        template: TemplateId,
        overrides: &[(String, serde_json::Value)],
    ) -> Result<EntityId, EcsError> {
        World::instantiate(self, template, overrides)
    }

    fn destroy(&mut self, entity: EntityId) -> Result<(), EcsError> {
        self.despawn(entity)
    }

    fn set_enabled(&mut self, entity: EntityId, enabled: bool) -> Result<(), EcsError> {
        World::set_enabled(self, entity, enabled)
    }

    fn linked_group(&self, entity: EntityId) -> Option<Vec<EntityId>> {
        World::linked_group(self, entity)
    }
}
