//! Frame-level tests: systems, jobs and the sync point driven together by
//! the tick loop.

use std::sync::atomic::{AtomicUsize, Ordering};

use keel_engine::prelude::*;
use proptest::prelude::*;
use serde_json::json;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Hp(u32);

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Squad(u32);

/// The squad template is always the first one registered.
fn squad_template() -> TemplateId {
    TemplateId::new(0)
}

fn setup_world() -> World {
    let mut world = World::new();
    world.register_component::<Hp>("hp");
    world.register_component::<Squad>("squad");
    world
        .register_template(
            Template::new("leader")
                .with_component("hp", json!(10))
                .with_component("squad", json!(0))
                .with_linked(Template::new("grunt").with_component("hp", json!(3)))
                .with_linked(Template::new("grunt").with_component("hp", json!(3))),
        )
        .unwrap();
    world
}

fn tick_loop() -> TickLoop {
    let config = EngineConfig {
        worker_threads: 3,
        ..EngineConfig::default()
    };
    TickLoop::new(setup_world(), config).unwrap()
}

fn squad_leaders(world: &World) -> Vec<EntityId> {
    world
        .entities()
        .filter(|&e| world.get_component::<Squad>(e).is_some())
        .collect()
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// Spawns one squad per tick from a job.
fn recruiter(ctx: &SystemContext<'_>) {
    let mut log = ctx.spawn_log();
    let squad = ctx.world().entity_count() as u32 / 3;
    ctx.schedule("recruit", move || {
        log.instantiate_with(squad_template(), vec![("squad".to_owned(), json!(squad))]);
    });
}

/// Disables every enabled squad.
fn sleeper(ctx: &SystemContext<'_>) {
    let world = ctx.world();
    let awake: Vec<EntityId> = squad_leaders(world)
        .into_iter()
        .filter(|&e| world.is_enabled(e))
        .collect();
    if awake.is_empty() {
        return;
    }
    let mut log = ctx.disable_log();
    for leader in awake {
        log.disable(leader);
    }
}

/// Destroys every disabled squad.
fn reaper(ctx: &SystemContext<'_>) {
    let world = ctx.world();
    let asleep: Vec<EntityId> = squad_leaders(world)
        .into_iter()
        .filter(|&e| !world.is_enabled(e))
        .collect();
    if asleep.is_empty() {
        return;
    }
    let mut log = ctx.destroy_log();
    ctx.schedule("reap", move || log.destroy_all(asleep));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn squads_move_through_spawn_disable_destroy() {
    let mut tl = tick_loop();
    tl.add_system("recruiter", recruiter);
    tl.add_system("sleeper", sleeper);
    tl.add_system("reaper", reaper);

    // Tick 0: one squad spawned, nothing else to do yet.
    let diag = tl.tick();
    let report = diag.flush.as_ref().unwrap();
    assert_eq!(report.spawned.len(), 1);
    assert_eq!(report.dependencies.awaited, 1);
    assert_eq!(tl.world().entity_count(), 3);
    assert_eq!(tl.world().enabled_count(), 3);

    // Tick 1: squad 0 put to sleep (whole group), squad 1 spawned.
    tl.tick();
    assert_eq!(tl.world().entity_count(), 6);
    assert_eq!(tl.world().enabled_count(), 3);

    // Tick 2: squad 0 destroyed with its grunts, squad 1 asleep, squad 2 spawned.
    let report = tl.tick().flush.clone().unwrap();
    assert!(report.is_clean());
    assert_eq!(report.logs_replayed, 3);
    assert_eq!(tl.world().entity_count(), 6);
    assert_eq!(tl.world().enabled_count(), 3);
}

#[test]
fn same_frame_spawns_are_not_seen_by_later_systems() {
    let mut tl = tick_loop();
    tl.add_system("recruiter", recruiter);
    tl.add_system("sleeper", sleeper);
    tl.add_system("reaper", reaper);
    tl.run_ticks(2);

    // Ledger for this tick: spawn (recruiter), disable (sleeper), destroy (reaper).
    let report = tl.tick().flush.clone().unwrap();
    assert_eq!(report.logs_replayed, 3);
    assert!(report.failures.is_empty());

    // The squad spawned this tick was replayed before the disable, but the
    // sleeper only saw the pre-tick world, so it stays enabled.
    let newest = *report.spawned.last().unwrap();
    assert!(tl.world().is_enabled(newest));
    assert_eq!(tl.last_diagnostics().system_times.len(), 3);
}

static PANICS: AtomicUsize = AtomicUsize::new(0);

fn fragile(ctx: &SystemContext<'_>) {
    let mut log = ctx.destroy_log();
    let first = ctx.world().entities().next();
    ctx.schedule("fragile", move || {
        if let Some(e) = first {
            log.destroy(e);
        }
        PANICS.fetch_add(1, Ordering::SeqCst);
        panic!("fragile job failed after recording");
    });
}

#[test]
fn panicking_job_is_reported_and_its_log_still_replays() {
    let mut tl = tick_loop();
    let leader = tl.world_mut().instantiate(squad_template(), &[]).unwrap();
    tl.add_system("fragile", fragile);

    let report = tl.tick().flush.clone().unwrap();
    assert_eq!(PANICS.load(Ordering::SeqCst), 1);
    assert_eq!(report.dependencies.failed, 1);
    assert!(!report.is_clean());
    assert!(!tl.world().is_alive(leader));

    // The worker survived and the next frame proceeds normally.
    let next = tl.tick().flush.clone().unwrap();
    assert_eq!(next.dependencies.awaited, 1);
}

#[test]
fn shutdown_mid_frame_discards_outstanding_logs() {
    let mut tl = tick_loop();
    let leader = tl.world_mut().instantiate(squad_template(), &[]).unwrap();

    let mut log = tl.sync_point().create_disable_log(SystemId::ENGINE_INTERNAL);
    let (handle, signal) = JobHandle::pending();
    tl.sync_point().contribute_dependency(handle);
    let producer = std::thread::spawn(move || {
        log.disable(leader);
        signal.complete();
    });

    let report = tl.shutdown();
    producer.join().unwrap();
    assert_eq!(report.dependencies.awaited, 1);
    assert_eq!(report.logs_discarded, 1);
    assert_eq!(report.ops_discarded, 1);
    assert!(tl.world().is_enabled(leader));
}

#[test]
fn config_file_drives_the_tick_loop() {
    let path = std::env::temp_dir().join(format!("keel-frame-{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "fixed_dt": 0.05, "worker_threads": 1 }"#).unwrap();
    let config = EngineConfig::from_path(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let mut tl = TickLoop::new(setup_world(), config).unwrap();
    tl.add_system("recruiter", recruiter);
    let applied = tl.run_ticks(4);

    assert_eq!(applied, 4);
    assert_eq!(tl.jobs().worker_count(), 1);
    assert!((tl.sim_time() - 0.2).abs() < 1e-12);
    assert_eq!(squad_leaders(tl.world()).len(), 4);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// However ticks are interleaved with squads spawned directly between
    /// frames, every surviving squad is intact: the leader plus both grunts,
    /// sharing the leader's active state.
    #[test]
    fn squads_stay_intact(plan in prop::collection::vec(any::<bool>(), 1..12)) {
        let mut tl = tick_loop();
        tl.add_system("recruiter", recruiter);
        tl.add_system("sleeper", sleeper);
        tl.add_system("reaper", reaper);

        for tick in plan {
            if tick {
                tl.tick();
            } else {
                tl.world_mut().instantiate(squad_template(), &[]).unwrap();
            }
        }

        let world = tl.world();
        for leader in squad_leaders(world) {
            let group = world.linked_group(leader).unwrap();
            prop_assert_eq!(group.len(), 3);
            for member in group {
                prop_assert!(world.is_alive(member));
                prop_assert_eq!(world.is_enabled(member), world.is_enabled(leader));
            }
        }
        prop_assert_eq!(world.entity_count() % 3, 0);
    }
}
