//! Keel ECS -- entity storage engine for the Keel frame driver.
//!
//! Entities carry generational IDs, JSON component values keyed by registered
//! name, an active flag, and optionally a linked group of dependent entities.
//! Templates (prefabs) describe whole linked groups that are created in one
//! call. Every structural operation here takes `&mut World`; parallel
//! producers record their intents elsewhere and have them replayed here at a
//! single sync point.
//!
//! # Quick Start
//!
//! ```
//! use keel_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Hull(u32);
//!
//! let mut world = World::new();
//! world.register_component::<Hull>("hull");
//!
//! let ship = world
//!     .register_template(
//!         Template::new("ship")
//!             .with_component("hull", serde_json::json!(100))
//!             .with_linked(Template::new("turret").with_component("hull", serde_json::json!(20))),
//!     )
//!     .unwrap();
//!
//! let root = world.instantiate(ship, &[]).unwrap();
//! assert_eq!(world.linked_group(root).map(|g| g.len()), Some(2));
//! assert_eq!(world.get_component::<Hull>(root), Some(Hull(100)));
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod entity;
pub mod system;
pub mod template;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity does not exist (stale generation or never allocated).
    #[error("entity {entity:?} does not exist (stale or never allocated)")]
    StaleEntity {
        entity: entity::EntityId,
    },

    /// A component name was referenced that has not been registered.
    #[error("component type '{name}' not registered. Registered components: [{registered}]")]
    UnknownComponent {
        name: String,
        registered: String,
    },

    /// A component value does not match the registered type.
    #[error("failed to deserialize component '{component}': {details}")]
    ComponentDeserializationError {
        component: String,
        details: String,
    },

    /// A template id that was never registered with this world.
    #[error("template {template:?} is not registered")]
    UnknownTemplate {
        template: template::TemplateId,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{ComponentInfo, ComponentRegistry, ComponentTypeId};
    pub use crate::entity::EntityId;
    pub use crate::system::SystemId;
    pub use crate::template::{Template, TemplateId};
    pub use crate::world::{ComponentValues, World};
    pub use crate::EcsError;
}
