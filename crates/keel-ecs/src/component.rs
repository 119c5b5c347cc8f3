//! Component type registration and value validation.
//!
//! Component values are stored as [`serde_json::Value`] keyed by the name they
//! were registered under. Registering a Rust type captures a validator built
//! from its `Deserialize` impl, so a value recorded by name (for example in a
//! spawn log's overrides) is checked against the real schema before it lands
//! in storage.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use crate::EcsError;

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Opaque, lightweight identifier for a registered component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub(crate) u32);

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Metadata about a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// Unique ID assigned at registration time.
    pub id: ComponentTypeId,
    /// Name values are stored under.
    pub name: String,
    /// Rust `TypeId` for typed access.
    pub type_id: TypeId,
}

/// Checks that a JSON value deserializes into the registered Rust type.
type ValidateFn = Box<dyn Fn(&serde_json::Value) -> Result<(), String> + Send + Sync>;

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Registry mapping component names and Rust types to [`ComponentTypeId`]s.
///
/// A type can only be registered once; subsequent registrations of the same
/// Rust `TypeId` return the existing [`ComponentTypeId`]. A name can only be
/// bound to one type.
#[derive(Default)]
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentTypeId>,
    by_name: HashMap<String, ComponentTypeId>,
    /// Indexed by ComponentTypeId.0.
    infos: Vec<ComponentInfo>,
    /// Indexed by ComponentTypeId.0.
    validators: Vec<ValidateFn>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type under the given `name`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already bound to a different Rust type.
    pub fn register<T>(&mut self, name: &str) -> ComponentTypeId
    where
        T: serde::Serialize + for<'de> serde::Deserialize<'de> + 'static,
    {
        let rust_type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&rust_type_id) {
            return existing;
        }
        assert!(
            !self.by_name.contains_key(name),
            "component name '{name}' is already registered for a different type"
        );

        let id = ComponentTypeId(self.infos.len() as u32);
        self.infos.push(ComponentInfo {
            id,
            name: name.to_owned(),
            type_id: rust_type_id,
        });
        self.validators.push(Box::new(|value: &serde_json::Value| {
            T::deserialize(value).map(drop).map_err(|e| e.to_string())
        }));
        self.by_type.insert(rust_type_id, id);
        self.by_name.insert(name.to_owned(), id);
        id
    }

    /// Look up a component type by its Rust type.
    pub fn lookup<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Look up a component type by its registered name.
    pub fn lookup_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.by_name.get(name).copied()
    }

    /// Get the [`ComponentInfo`] for a registered component type ID.
    pub fn get_info(&self, id: ComponentTypeId) -> Option<&ComponentInfo> {
        self.infos.get(id.0 as usize)
    }

    /// Registered name of the Rust type `T`, if any.
    pub fn name_of<T: 'static>(&self) -> Option<&str> {
        self.lookup::<T>()
            .and_then(|id| self.get_info(id))
            .map(|info| info.name.as_str())
    }

    /// Check that `value` is a valid instance of the component registered as
    /// `name`.
    pub fn validate(&self, name: &str, value: &serde_json::Value) -> Result<(), EcsError> {
        let id = self
            .lookup_by_name(name)
            .ok_or_else(|| EcsError::UnknownComponent {
                name: name.to_owned(),
                registered: self.registered_names().join(", "),
            })?;
        (self.validators[id.0 as usize])(value).map_err(|details| {
            EcsError::ComponentDeserializationError {
                component: name.to_owned(),
                details,
            }
        })
    }

    /// Total number of registered component types.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether any component types have been registered.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Returns the names of all registered component types, sorted.
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("infos", &self.infos)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
