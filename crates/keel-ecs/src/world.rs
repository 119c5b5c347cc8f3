//! The [`World`] is the top-level container for the ECS. It owns the entity
//! allocator, the component registry, the template table, and per-entity
//! records (component values, active flag, linked group).

use std::collections::BTreeMap;

use tracing::debug;

use crate::component::ComponentRegistry;
use crate::entity::{EntityAllocator, EntityId};
use crate::template::{Template, TemplateId};
use crate::EcsError;

/// Component values of one entity, keyed by registered name.
pub type ComponentValues = BTreeMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// EntityRecord
// ---------------------------------------------------------------------------

/// Everything the world stores about one live entity.
#[derive(Debug, Clone, Default)]
struct EntityRecord {
    components: ComponentValues,
    enabled: bool,
    /// Root first. `None` when the entity heads no group.
    linked: Option<Vec<EntityId>>,
}

type Records = Vec<Option<EntityRecord>>;

fn insert_record(
    allocator: &mut EntityAllocator,
    records: &mut Records,
    components: ComponentValues,
) -> EntityId {
    let entity = allocator.allocate();
    let idx = entity.index() as usize;
    if idx >= records.len() {
        records.resize_with(idx + 1, || None);
    }
    records[idx] = Some(EntityRecord {
        components,
        enabled: true,
        linked: None,
    });
    entity
}

/// Depth-first: the template's own entity first, then each linked subtree.
fn spawn_tree(
    template: &Template,
    allocator: &mut EntityAllocator,
    records: &mut Records,
    out: &mut Vec<EntityId>,
) {
    let components = template.components.iter().cloned().collect();
    out.push(insert_record(allocator, records, components));
    for linked in &template.linked {
        spawn_tree(linked, allocator, records, out);
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The ECS world: entity allocator, component registry, templates, and
/// per-entity storage.
///
/// Structural operations ([`instantiate`](Self::instantiate),
/// [`despawn`](Self::despawn), [`set_enabled`](Self::set_enabled)) take
/// `&mut self`. Concurrent producers never call them directly; they record
/// intents that a sync point replays here.
#[derive(Debug, Default)]
pub struct World {
    allocator: EntityAllocator,
    registry: ComponentRegistry,
    templates: Vec<Template>,
    records: Records,
}

impl World {
    /// Create an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// The component registry.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Register a component type under `name`.
    pub fn register_component<T>(&mut self, name: &str)
    where
        T: serde::Serialize + for<'de> serde::Deserialize<'de> + 'static,
    {
        self.registry.register::<T>(name);
    }

    // -- templates ----------------------------------------------------------

    /// Register a template. Every component value in the template tree is
    /// validated against the registry up front, so instantiation can only
    /// fail on overrides.
    pub fn register_template(&mut self, template: Template) -> Result<TemplateId, EcsError> {
        fn check(registry: &ComponentRegistry, t: &Template) -> Result<(), EcsError> {
            for (name, value) in &t.components {
                registry.validate(name, value)?;
            }
            t.linked.iter().try_for_each(|linked| check(registry, linked))
        }
        check(&self.registry, &template)?;

        let id = TemplateId(self.templates.len() as u32);
        debug!(template = %template.name, id = id.0, "template registered");
        self.templates.push(template);
        Ok(id)
    }

    /// Look up a registered template.
    pub fn template(&self, id: TemplateId) -> Option<&Template> {
        self.templates.get(id.0 as usize)
    }

    /// Create the entities described by `template` and return the root.
    ///
    /// `overrides` are applied to the root after the template's own values.
    /// When the template has linked templates, the root's linked group is
    /// `[root, linked...]` in depth-first order.
    pub fn instantiate(
        &mut self,
        template: TemplateId,
        overrides: &[(String, serde_json::Value)],
    ) -> Result<EntityId, EcsError> {
        let tpl = self
            .templates
            .get(template.0 as usize)
            .ok_or(EcsError::UnknownTemplate { template })?;
        for (name, value) in overrides {
            self.registry.validate(name, value)?;
        }

        let mut created = Vec::with_capacity(tpl.entity_count());
        spawn_tree(tpl, &mut self.allocator, &mut self.records, &mut created);
        let root = created[0];

        let record = self.record_mut(root)?;
        record
            .components
            .extend(overrides.iter().map(|(n, v)| (n.clone(), v.clone())));
        if created.len() > 1 {
            record.linked = Some(created);
        }
        Ok(root)
    }

    // -- entities -----------------------------------------------------------

    /// Spawn a single entity from `(name, value)` component pairs.
    pub fn spawn(
        &mut self,
        components: Vec<(String, serde_json::Value)>,
    ) -> Result<EntityId, EcsError> {
        for (name, value) in &components {
            self.registry.validate(name, value)?;
        }
        Ok(insert_record(
            &mut self.allocator,
            &mut self.records,
            components.into_iter().collect(),
        ))
    }

    /// Spawn a single entity holding one typed component.
    pub fn spawn_with<T>(&mut self, component: T) -> Result<EntityId, EcsError>
    where
        T: serde::Serialize + 'static,
    {
        let (name, value) = self.encode(&component)?;
        self.spawn(vec![(name, value)])
    }

    /// Destroy `entity` together with every live member of its linked group.
    pub fn despawn(&mut self, entity: EntityId) -> Result<(), EcsError> {
        let targets = self
            .linked_group(entity)
            .unwrap_or_else(|| vec![entity]);
        self.record(entity)?;

        for target in targets {
            if self.allocator.deallocate(target) {
                self.records[target.index() as usize] = None;
            }
        }
        Ok(())
    }

    /// Whether `entity` is alive.
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.allocator.is_alive(entity)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.allocator.alive_count()
    }

    /// Number of live entities that are enabled.
    pub fn enabled_count(&self) -> usize {
        self.entities()
            .filter(|&e| self.is_enabled(e))
            .count()
    }

    /// Every live entity, in index order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.allocator.iter_alive()
    }

    // -- active state -------------------------------------------------------

    /// Set the active flag of a single entity. Linked members are untouched.
    pub fn set_enabled(&mut self, entity: EntityId, enabled: bool) -> Result<(), EcsError> {
        self.record_mut(entity)?.enabled = enabled;
        Ok(())
    }

    /// Whether `entity` is alive and enabled.
    pub fn is_enabled(&self, entity: EntityId) -> bool {
        self.record(entity).is_ok_and(|r| r.enabled)
    }

    // -- linked groups ------------------------------------------------------

    /// Make `root` the head of a linked group containing `members`.
    ///
    /// Replaces any existing group on `root`. `root` is always the first
    /// member and is not duplicated if it also appears in `members`.
    pub fn link(&mut self, root: EntityId, members: &[EntityId]) -> Result<(), EcsError> {
        for &member in members {
            self.record(member)?;
        }
        let mut group = Vec::with_capacity(members.len() + 1);
        group.push(root);
        group.extend(members.iter().copied().filter(|&m| m != root));
        self.record_mut(root)?.linked = Some(group);
        Ok(())
    }

    /// The live members of `entity`'s linked group, root first.
    ///
    /// `None` if `entity` is dead or heads no group.
    pub fn linked_group(&self, entity: EntityId) -> Option<Vec<EntityId>> {
        let group = self.record(entity).ok()?.linked.as_ref()?;
        Some(
            group
                .iter()
                .copied()
                .filter(|&m| self.allocator.is_alive(m))
                .collect(),
        )
    }

    // -- components ---------------------------------------------------------

    /// Insert or overwrite a component by registered name.
    pub fn set_component_by_name(
        &mut self,
        entity: EntityId,
        name: &str,
        value: serde_json::Value,
    ) -> Result<(), EcsError> {
        self.registry.validate(name, &value)?;
        self.record_mut(entity)?
            .components
            .insert(name.to_owned(), value);
        Ok(())
    }

    /// Insert or overwrite a typed component.
    pub fn insert_component<T>(&mut self, entity: EntityId, component: T) -> Result<(), EcsError>
    where
        T: serde::Serialize + 'static,
    {
        let (name, value) = self.encode(&component)?;
        self.record_mut(entity)?.components.insert(name, value);
        Ok(())
    }

    /// Read a typed component. `None` if the entity is dead, the type is not
    /// registered, or the entity lacks the component.
    pub fn get_component<T>(&self, entity: EntityId) -> Option<T>
    where
        T: for<'de> serde::Deserialize<'de> + 'static,
    {
        let name = self.registry.name_of::<T>()?;
        let value = self.record(entity).ok()?.components.get(name)?;
        T::deserialize(value).ok()
    }

    /// Read a component value by registered name.
    pub fn component_value(&self, entity: EntityId, name: &str) -> Option<&serde_json::Value> {
        self.record(entity).ok()?.components.get(name)
    }

    /// Whether `entity` carries the typed component `T`.
    pub fn has_component<T: 'static>(&self, entity: EntityId) -> bool {
        self.registry
            .name_of::<T>()
            .is_some_and(|name| self.component_value(entity, name).is_some())
    }

    // -- hashing ------------------------------------------------------------

    /// Hash of every live entity's id, active flag, and component values.
    ///
    /// Two worlds that went through the same structural history hash equal.
    pub fn state_hash(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        for entity in self.entities() {
            let Ok(record) = self.record(entity) else {
                continue;
            };
            hasher.update(&entity.to_raw().to_le_bytes());
            hasher.update(&[record.enabled as u8]);
            for (name, value) in &record.components {
                hasher.update(name.as_bytes());
                hasher.update(value.to_string().as_bytes());
            }
        }
        hasher.finalize()
    }

    // -- internal helpers ---------------------------------------------------

    fn record(&self, entity: EntityId) -> Result<&EntityRecord, EcsError> {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::StaleEntity { entity });
        }
        self.records[entity.index() as usize]
            .as_ref()
            .ok_or(EcsError::StaleEntity { entity })
    }

    fn record_mut(&mut self, entity: EntityId) -> Result<&mut EntityRecord, EcsError> {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::StaleEntity { entity });
        }
        self.records[entity.index() as usize]
            .as_mut()
            .ok_or(EcsError::StaleEntity { entity })
    }

    fn encode<T: serde::Serialize + 'static>(
        &self,
        component: &T,
    ) -> Result<(String, serde_json::Value), EcsError> {
        let name = self
            .registry
            .name_of::<T>()
            .ok_or_else(|| EcsError::UnknownComponent {
                name: std::any::type_name::<T>().to_owned(),
                registered: self.registry.registered_names().join(", "),
            })?;
        let value = serde_json::to_value(component).map_err(|e| {
            EcsError::ComponentDeserializationError {
                component: name.to_owned(),
                details: e.to_string(),
            }
        })?;
        Ok((name.to_owned(), value))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Health(u32);

    fn setup_world() -> World {
        let mut world = World::new();
        world.register_component::<Position>("position");
        world.register_component::<Health>("health");
        world
    }

    fn turret_ship() -> Template {
        Template::new("ship")
            .with_component("health", json!(100))
            .with_linked(Template::new("turret").with_component("health", json!(10)))
            .with_linked(Template::new("engine").with_component("health", json!(25)))
    }

    #[test]
    fn spawn_and_read_typed_component() {
        let mut world = setup_world();
        let e = world.spawn_with(Position { x: 1.0, y: 2.0 }).unwrap();
        assert_eq!(
            world.get_component::<Position>(e),
            Some(Position { x: 1.0, y: 2.0 })
        );
        assert!(world.is_enabled(e));
        assert!(!world.has_component::<Health>(e));
    }

    #[test]
    fn spawn_rejects_unregistered_component() {
        let mut world = setup_world();
        let err = world.spawn(vec![("mana".to_owned(), json!(1))]).unwrap_err();
        assert!(matches!(err, EcsError::UnknownComponent { .. }));
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn instantiate_builds_linked_group() {
        let mut world = setup_world();
        let ship = world.register_template(turret_ship()).unwrap();
        let root = world.instantiate(ship, &[]).unwrap();

        let group = world.linked_group(root).unwrap();
        assert_eq!(group.len(), 3);
        assert_eq!(group[0], root);
        assert_eq!(world.entity_count(), 3);
        assert_eq!(world.get_component::<Health>(group[1]), Some(Health(10)));
        assert_eq!(world.get_component::<Health>(group[2]), Some(Health(25)));
    }

    #[test]
    fn instantiate_applies_overrides_to_root_only() {
        let mut world = setup_world();
        let ship = world.register_template(turret_ship()).unwrap();
        let root = world
            .instantiate(ship, &[("health".to_owned(), json!(7))])
            .unwrap();
        assert_eq!(world.get_component::<Health>(root), Some(Health(7)));
        let turret = world.linked_group(root).unwrap()[1];
        assert_eq!(world.get_component::<Health>(turret), Some(Health(10)));
    }

    #[test]
    fn instantiate_single_entity_template_has_no_group() {
        let mut world = setup_world();
        let t = world
            .register_template(Template::new("rock").with_component("health", json!(1)))
            .unwrap();
        let e = world.instantiate(t, &[]).unwrap();
        assert!(world.linked_group(e).is_none());
    }

    #[test]
    fn register_template_validates_tree() {
        let mut world = setup_world();
        let bad = Template::new("bad")
            .with_linked(Template::new("child").with_component("health", json!("full")));
        assert!(world.register_template(bad).is_err());
    }

    #[test]
    fn unknown_template_is_an_error() {
        let mut world = setup_world();
        let err = world.instantiate(TemplateId(9), &[]).unwrap_err();
        assert!(matches!(err, EcsError::UnknownTemplate { .. }));
    }

    #[test]
    fn despawn_removes_whole_linked_group() {
        let mut world = setup_world();
        let ship = world.register_template(turret_ship()).unwrap();
        let root = world.instantiate(ship, &[]).unwrap();
        let bystander = world.spawn_with(Health(1)).unwrap();

        world.despawn(root).unwrap();
        assert_eq!(world.entity_count(), 1);
        assert!(world.is_alive(bystander));
        assert!(world.despawn(root).is_err());
    }

    #[test]
    fn set_enabled_touches_one_entity() {
        let mut world = setup_world();
        let ship = world.register_template(turret_ship()).unwrap();
        let root = world.instantiate(ship, &[]).unwrap();

        world.set_enabled(root, false).unwrap();
        assert!(!world.is_enabled(root));
        assert_eq!(world.enabled_count(), 2);
    }

    #[test]
    fn link_puts_root_first_without_duplicates() {
        let mut world = setup_world();
        let a = world.spawn_with(Health(1)).unwrap();
        let b = world.spawn_with(Health(2)).unwrap();
        let c = world.spawn_with(Health(3)).unwrap();
        world.link(a, &[b, a, c]).unwrap();
        assert_eq!(world.linked_group(a), Some(vec![a, b, c]));
    }

    #[test]
    fn linked_group_skips_dead_members() {
        let mut world = setup_world();
        let a = world.spawn_with(Health(1)).unwrap();
        let b = world.spawn_with(Health(2)).unwrap();
        world.link(a, &[b]).unwrap();
        world.despawn(b).unwrap();
        assert_eq!(world.linked_group(a), Some(vec![a]));
    }

    #[test]
    fn state_hash_tracks_structure() {
        let mut w1 = setup_world();
        let mut w2 = setup_world();
        let e1 = w1.spawn_with(Health(5)).unwrap();
        let _e2 = w2.spawn_with(Health(5)).unwrap();
        assert_eq!(w1.state_hash(), w2.state_hash());

        w1.set_enabled(e1, false).unwrap();
        assert_ne!(w1.state_hash(), w2.state_hash());
    }
}
