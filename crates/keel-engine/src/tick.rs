//! Fixed-timestep tick loop with a structural sync point at the end of each
//! frame.
//!
//! Each tick:
//!
//! 1. All registered systems run in registration order. A system sees the
//!    [`World`] read-only; structural changes go into mutation logs it
//!    requests from the [`SyncPoint`], optionally filled by jobs it schedules
//!    on the [`JobScheduler`].
//! 2. If any log was issued, the sync point waits for the contributed jobs and
//!    replays every log into the world. Otherwise storage is left alone.
//! 3. The tick counter and simulation time advance.
//!
//! # Example
//!
//! ```
//! use keel_engine::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Hp(u32);
//!
//! let mut world = World::new();
//! world.register_component::<Hp>("hp");
//! world.spawn_with(Hp(0)).unwrap();
//!
//! let mut tick_loop = TickLoop::new(world, EngineConfig::default()).unwrap();
//! tick_loop.add_system("reaper", |ctx| {
//!     let dead: Vec<EntityId> = ctx
//!         .world()
//!         .entities()
//!         .filter(|&e| ctx.world().get_component::<Hp>(e) == Some(Hp(0)))
//!         .collect();
//!     if !dead.is_empty() {
//!         let mut log = ctx.destroy_log();
//!         ctx.schedule("reap", move || log.destroy_all(dead));
//!     }
//! });
//!
//! tick_loop.tick();
//! assert_eq!(tick_loop.world().entity_count(), 0);
//! assert!(tick_loop.last_diagnostics().flushed());
//! ```

use std::time::{Duration, Instant};

use anyhow::Context;
use keel_ecs::system::SystemId;
use keel_ecs::world::World;
use keel_sync::barrier::SyncPoint;
use keel_sync::job::JobHandle;
use keel_sync::log::{DestroyLog, DisableLog, EnableLog, SpawnLog};
use keel_sync::report::{FlushReport, TeardownReport};
use tracing::{debug, debug_span};

use crate::config::EngineConfig;
use crate::jobs::JobScheduler;

// ---------------------------------------------------------------------------
// TickDiagnostics
// ---------------------------------------------------------------------------

/// Timing and sync point results for the last tick.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    /// Wall-clock time per system (in order of execution).
    pub system_times: Vec<(String, Duration)>,
    /// Total time for the tick (systems + flush).
    pub total_time: Duration,
    /// Time spent in the sync point, zero when it was skipped.
    pub flush_time: Duration,
    /// What the sync point did, if it ran.
    pub flush: Option<FlushReport>,
}

impl TickDiagnostics {
    /// Whether the sync point ran this tick.
    pub fn flushed(&self) -> bool {
        self.flush.is_some()
    }
}

// ---------------------------------------------------------------------------
// SystemContext
// ---------------------------------------------------------------------------

/// What a system can reach while it runs.
///
/// Logs created through the context are attributed to the running system.
pub struct SystemContext<'a> {
    world: &'a World,
    sync_point: &'a SyncPoint,
    jobs: &'a JobScheduler,
    system_id: SystemId,
    name: &'a str,
}

impl<'a> SystemContext<'a> {
    /// Read-only view of the world as of the last sync point.
    pub fn world(&self) -> &'a World {
        self.world
    }

    /// The frame's sync point.
    pub fn sync_point(&self) -> &'a SyncPoint {
        self.sync_point
    }

    /// The shared job pool.
    pub fn jobs(&self) -> &'a JobScheduler {
        self.jobs
    }

    /// Identifier of the running system.
    pub fn system_id(&self) -> SystemId {
        self.system_id
    }

    /// Name of the running system.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Schedule `job` and register it as a dependency of this frame's sync
    /// point, so replay waits for it.
    pub fn schedule<F>(&self, name: &str, job: F) -> JobHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = self.jobs.schedule(name, job);
        self.sync_point.contribute_dependency(handle.clone());
        handle
    }

    /// A spawn log attributed to this system.
    pub fn spawn_log(&self) -> SpawnLog {
        self.sync_point.create_spawn_log(self.system_id)
    }

    /// An enable log attributed to this system.
    pub fn enable_log(&self) -> EnableLog {
        self.sync_point.create_enable_log(self.system_id)
    }

    /// A disable log attributed to this system.
    pub fn disable_log(&self) -> DisableLog {
        self.sync_point.create_disable_log(self.system_id)
    }

    /// A destroy log attributed to this system.
    pub fn destroy_log(&self) -> DestroyLog {
        self.sync_point.create_destroy_log(self.system_id)
    }
}

/// A system function run once per tick.
pub type SystemFn = fn(&SystemContext<'_>);

#[derive(Debug)]
struct RegisteredSystem {
    name: String,
    id: SystemId,
    func: SystemFn,
}

// ---------------------------------------------------------------------------
// TickLoop
// ---------------------------------------------------------------------------

/// The fixed-timestep frame driver.
///
/// Owns the world, the sync point and the job pool. Shutting down (explicitly
/// or on drop) tears down the sync point first, waiting for in-flight jobs
/// and discarding their logs, and only then joins the workers.
pub struct TickLoop {
    world: World,
    systems: Vec<RegisteredSystem>,
    sync_point: SyncPoint,
    jobs: JobScheduler,
    tick_counter: u64,
    fixed_dt: f64,
    last_diagnostics: TickDiagnostics,
    shut_down: bool,
}

impl TickLoop {
    /// Create a tick loop over `world`, starting the job pool described by
    /// `config`.
    pub fn new(world: World, config: EngineConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let jobs = JobScheduler::new(config.worker_threads)
            .context("failed to start job worker threads")?;
        Ok(Self {
            world,
            systems: Vec::new(),
            sync_point: SyncPoint::new(),
            jobs,
            tick_counter: 0,
            fixed_dt: config.fixed_dt,
            last_diagnostics: TickDiagnostics::default(),
            shut_down: false,
        })
    }

    /// Register a system to be run each tick, after every system registered
    /// before it. Returns the [`SystemId`] its logs are attributed to; ids
    /// start at 1.
    ///
    /// # Panics
    ///
    /// Panics if a system with the same name is already registered.
    pub fn add_system(&mut self, name: &str, func: SystemFn) -> SystemId {
        assert!(
            !self.systems.iter().any(|s| s.name == name),
            "duplicate system name: {name:?}"
        );
        let id = SystemId(self.systems.len() as u32 + 1);
        self.systems.push(RegisteredSystem {
            name: name.to_owned(),
            id,
            func,
        });
        id
    }

    /// Execute one tick: run every system, then the sync point if any log is
    /// pending.
    ///
    /// # Panics
    ///
    /// Panics after [`shutdown`](Self::shutdown).
    pub fn tick(&mut self) -> &TickDiagnostics {
        assert!(!self.shut_down, "tick called on a tick loop that has been shut down");
        let _tick_span = debug_span!("tick", tick = self.tick_counter).entered();
        let tick_start = Instant::now();
        let mut system_times = Vec::with_capacity(self.systems.len());

        for system in &self.systems {
            let ctx = SystemContext {
                world: &self.world,
                sync_point: &self.sync_point,
                jobs: &self.jobs,
                system_id: system.id,
                name: &system.name,
            };
            let sys_start = Instant::now();
            (system.func)(&ctx);
            system_times.push((system.name.clone(), sys_start.elapsed()));
        }

        let flush_start = Instant::now();
        let flush = if self.sync_point.has_pending_work() {
            Some(self.sync_point.flush(&mut self.world))
        } else {
            let pruned = self.sync_point.prune_completed_dependencies();
            debug!(
                tick = self.tick_counter,
                pruned = pruned.awaited,
                "no pending logs; sync point skipped"
            );
            None
        };
        let flush_time = if flush.is_some() {
            flush_start.elapsed()
        } else {
            Duration::ZERO
        };

        self.tick_counter += 1;
        self.last_diagnostics = TickDiagnostics {
            system_times,
            total_time: tick_start.elapsed(),
            flush_time,
            flush,
        };
        &self.last_diagnostics
    }

    /// Run `count` ticks. Returns the total number of operations the sync
    /// point applied across them.
    pub fn run_ticks(&mut self, count: u64) -> usize {
        let mut applied = 0;
        for _ in 0..count {
            applied += self.tick().flush.as_ref().map_or(0, |r| r.ops_applied);
        }
        applied
    }

    /// Tear down the sync point, discarding pending logs without replay, then
    /// stop the job pool. Idempotent; later calls return an empty report.
    pub fn shutdown(&mut self) -> TeardownReport {
        if self.shut_down {
            return TeardownReport::default();
        }
        self.shut_down = true;
        let report = self.sync_point.shutdown();
        self.jobs.shutdown();
        debug!(
            ticks = self.tick_counter,
            logs_discarded = report.logs_discarded,
            "tick loop shut down"
        );
        report
    }

    // -- accessors ----------------------------------------------------------

    /// The number of ticks executed so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    /// The current simulation time in seconds.
    ///
    /// Computed as `tick_count * fixed_dt` to avoid floating-point drift from
    /// repeated addition.
    pub fn sim_time(&self) -> f64 {
        self.tick_counter as f64 * self.fixed_dt
    }

    /// The fixed time step in seconds per tick.
    pub fn fixed_dt(&self) -> f64 {
        self.fixed_dt
    }

    /// Read-only access to the ECS world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access to the ECS world, for setup between ticks.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The sync point, for producers outside the system list.
    pub fn sync_point(&self) -> &SyncPoint {
        &self.sync_point
    }

    /// The job pool.
    pub fn jobs(&self) -> &JobScheduler {
        &self.jobs
    }

    /// The number of registered systems.
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// The names of all registered systems, in execution order.
    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name.as_str()).collect()
    }

    /// The id assigned to the system called `name`.
    pub fn system_id(&self, name: &str) -> Option<SystemId> {
        self.systems.iter().find(|s| s.name == name).map(|s| s.id)
    }

    /// Diagnostics from the last tick.
    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl Drop for TickLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
