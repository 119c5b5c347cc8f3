//! Keel Engine -- frame driver that runs systems, producer jobs and the
//! structural sync point.
//!
//! This crate ties [`keel_ecs`] storage to the [`keel_sync`] barrier: a
//! fixed-timestep [`TickLoop`](tick::TickLoop) runs systems in registration
//! order, lets them schedule jobs that fill mutation logs, and replays those
//! logs once per tick.
//!
//! # Quick Start
//!
//! ```
//! use keel_engine::prelude::*;
//!
//! let config = EngineConfig::from_json_str(r#"{ "worker_threads": 2 }"#).unwrap();
//! init_tracing(&config.log_filter);
//!
//! let mut tick_loop = TickLoop::new(World::new(), config).unwrap();
//! tick_loop.add_system("example", |_ctx| {
//!     // game logic here
//! });
//!
//! tick_loop.run_ticks(100);
//! assert_eq!(tick_loop.tick_count(), 100);
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod jobs;
pub mod logging;
pub mod tick;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the ECS crate for convenience.
pub use keel_ecs;

/// Re-export the sync crate for convenience.
pub use keel_sync;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use keel_ecs::prelude::*;
    pub use keel_sync::prelude::*;

    pub use crate::config::EngineConfig;
    pub use crate::jobs::JobScheduler;
    pub use crate::logging::init_tracing;
    pub use crate::tick::{SystemContext, SystemFn, TickDiagnostics, TickLoop};
}
