//! The set of outstanding producer jobs a sync point must wait for.

use parking_lot::Mutex;
use tracing::error;

use crate::job::{JobHandle, JobOutcome};

/// Outcome of draining a [`DependencyAggregate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DependencyReport {
    /// Number of contributed handles that were waited on.
    pub awaited: usize,
    /// How many of them finished as [`JobOutcome::Panicked`].
    pub failed: usize,
}

/// Completion handles contributed by producers during one cycle.
///
/// [`contribute`](Self::contribute) takes `&self` and may be called from any
/// thread. Draining takes `&mut self`, which only the owning sync point has.
#[derive(Debug, Default)]
pub struct DependencyAggregate {
    handles: Mutex<Vec<JobHandle>>,
}

impl DependencyAggregate {
    /// An empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle. Never blocks on the handle itself.
    pub fn contribute(&self, handle: JobHandle) {
        self.handles.lock().push(handle);
    }

    /// Number of handles contributed since the last drain.
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    /// Whether nothing has been contributed since the last drain.
    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    /// Block until every contributed handle has finished, then forget them.
    ///
    /// Returns immediately when nothing was contributed.
    pub fn wait_all_and_clear(&mut self) -> DependencyReport {
        let handles = std::mem::take(self.handles.get_mut());
        let mut report = DependencyReport {
            awaited: handles.len(),
            failed: 0,
        };
        for (index, handle) in handles.iter().enumerate() {
            if handle.wait() == JobOutcome::Panicked {
                report.failed += 1;
                error!(dependency = index, "producer job panicked before the sync point");
            }
        }
        report
    }

    /// Forget handles whose jobs have already finished, without blocking on
    /// the rest. Returns what was dropped.
    ///
    /// Used when a cycle ends without a flush, so finished work does not pile
    /// up until the next one.
    pub fn prune_completed(&mut self) -> DependencyReport {
        let handles = self.handles.get_mut();
        let mut report = DependencyReport::default();
        handles.retain(|handle| {
            if !handle.is_complete() {
                return true;
            }
            report.awaited += 1;
            if handle.wait() == JobOutcome::Panicked {
                report.failed += 1;
                error!("producer job panicked with no sync point pending");
            }
            false
        });
        report
    }
}
