//! Entity templates (prefabs).
//!
//! A [`Template`] describes an entity to create: its component values plus any
//! number of linked templates. Instantiating a template creates the root and
//! every linked entity (flattened depth-first) and records them as the root's
//! linked group, so enabling, disabling, or destroying the root reaches the
//! whole group.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to a template registered with a [`World`](crate::world::World).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TemplateId(pub(crate) u32);

impl TemplateId {
    /// Wrap a raw template index. Only ids returned by
    /// [`World::register_template`](crate::world::World::register_template)
    /// resolve to a template.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Raw index of the template in its world's template table.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TemplateId({})", self.0)
    }
}

/// A named entity blueprint.
///
/// ```
/// use keel_ecs::template::Template;
///
/// let ship = Template::new("ship")
///     .with_component("hull", serde_json::json!(100))
///     .with_linked(Template::new("turret").with_component("hull", serde_json::json!(20)));
///
/// assert_eq!(ship.entity_count(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Human-readable name, used in diagnostics.
    pub name: String,
    /// Component values as `(registered name, value)` pairs.
    #[serde(default)]
    pub components: Vec<(String, serde_json::Value)>,
    /// Templates instantiated alongside this one and linked to its root.
    #[serde(default)]
    pub linked: Vec<Template>,
}

impl Template {
    /// An empty template with no components and no linked entities.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: Vec::new(),
            linked: Vec::new(),
        }
    }

    /// Add a component value.
    pub fn with_component(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.components.push((name.into(), value));
        self
    }

    /// Add a linked template.
    pub fn with_linked(mut self, linked: Template) -> Self {
        self.linked.push(linked);
        self
    }

    /// Number of entities one instantiation creates, root included.
    pub fn entity_count(&self) -> usize {
        1 + self.linked.iter().map(Template::entity_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_entity_count() {
        let t = Template::new("root")
            .with_linked(Template::new("a").with_linked(Template::new("a1")))
            .with_linked(Template::new("b"));
        assert_eq!(t.entity_count(), 4);
    }

    #[test]
    fn deserializes_with_defaults() {
        let t: Template = serde_json::from_str(r#"{"name": "bare"}"#).unwrap();
        assert_eq!(t, Template::new("bare"));

        let t: Template = serde_json::from_value(serde_json::json!({
            "name": "crate",
            "components": [["hp", 5]],
            "linked": [{"name": "lid"}]
        }))
        .unwrap();
        assert_eq!(t.components, vec![("hp".to_owned(), serde_json::json!(5))]);
        assert_eq!(t.linked.len(), 1);
    }
}
