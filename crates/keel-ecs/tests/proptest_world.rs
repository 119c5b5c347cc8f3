//! Property tests for world structural operations.
//!
//! Random sequences of spawn / instantiate / despawn / enable / disable are
//! run against both the world and a tiny shadow model, and the two are
//! compared after every step.

use std::collections::{HashMap, HashSet};

use keel_ecs::prelude::*;
use proptest::prelude::*;
use serde_json::json;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Hp(u32);

#[derive(Debug, Clone)]
enum WorldOp {
    Spawn(u32),
    InstantiateSquad,
    Despawn(usize),
    SetEnabled(usize, bool),
}

fn world_op_strategy() -> impl Strategy<Value = WorldOp> {
    prop_oneof![
        any::<u32>().prop_map(WorldOp::Spawn),
        Just(WorldOp::InstantiateSquad),
        (0..64usize).prop_map(WorldOp::Despawn),
        (0..64usize, any::<bool>()).prop_map(|(i, on)| WorldOp::SetEnabled(i, on)),
    ]
}

#[derive(Default)]
struct Shadow {
    alive: Vec<EntityId>,
    disabled: HashSet<EntityId>,
    groups: HashMap<EntityId, Vec<EntityId>>,
}

impl Shadow {
    fn remove(&mut self, e: EntityId) {
        let targets = self.groups.remove(&e).unwrap_or_else(|| vec![e]);
        let targets: HashSet<EntityId> = targets.into_iter().collect();
        self.alive.retain(|x| !targets.contains(x));
        self.disabled.retain(|x| !targets.contains(x));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn world_matches_shadow_model(ops in prop::collection::vec(world_op_strategy(), 1..60)) {
        let mut world = World::new();
        world.register_component::<Hp>("hp");
        let squad = world
            .register_template(
                Template::new("squad")
                    .with_component("hp", json!(30))
                    .with_linked(Template::new("a").with_component("hp", json!(10)))
                    .with_linked(Template::new("b").with_component("hp", json!(10))),
            )
            .unwrap();

        let mut shadow = Shadow::default();

        for op in ops {
            match op {
                WorldOp::Spawn(hp) => {
                    let e = world.spawn_with(Hp(hp)).unwrap();
                    shadow.alive.push(e);
                }
                WorldOp::InstantiateSquad => {
                    let root = world.instantiate(squad, &[]).unwrap();
                    let group = world.linked_group(root).unwrap();
                    prop_assert_eq!(group.len(), 3);
                    prop_assert_eq!(group[0], root);
                    shadow.alive.extend(group.iter().copied());
                    shadow.groups.insert(root, group);
                }
                WorldOp::Despawn(idx) => {
                    if !shadow.alive.is_empty() {
                        let e = shadow.alive[idx % shadow.alive.len()];
                        prop_assert!(world.despawn(e).is_ok());
                        shadow.remove(e);
                        prop_assert!(!world.is_alive(e));
                        prop_assert!(world.despawn(e).is_err());
                    }
                }
                WorldOp::SetEnabled(idx, on) => {
                    if !shadow.alive.is_empty() {
                        let e = shadow.alive[idx % shadow.alive.len()];
                        world.set_enabled(e, on).unwrap();
                        if on {
                            shadow.disabled.remove(&e);
                        } else {
                            shadow.disabled.insert(e);
                        }
                    }
                }
            }

            prop_assert_eq!(world.entity_count(), shadow.alive.len());
            prop_assert_eq!(
                world.enabled_count(),
                shadow.alive.len() - shadow.disabled.len()
            );
            for &e in &shadow.alive {
                prop_assert!(world.is_alive(e));
                prop_assert_eq!(world.is_enabled(e), !shadow.disabled.contains(&e));
            }
        }
    }

    /// Stale handles never alias a newer entity that reused their index.
    #[test]
    fn stale_ids_stay_stale(rounds in 1..40usize) {
        let mut world = World::new();
        world.register_component::<Hp>("hp");
        let mut dead = Vec::new();
        for i in 0..rounds {
            let e = world.spawn_with(Hp(i as u32)).unwrap();
            world.despawn(e).unwrap();
            dead.push(e);
        }
        let live = world.spawn_with(Hp(0)).unwrap();
        for e in dead {
            prop_assert!(!world.is_alive(e));
            prop_assert!(world.get_component::<Hp>(e).is_none());
            prop_assert!(world.set_enabled(e, false).is_err());
        }
        prop_assert!(world.is_enabled(live));
    }
}
