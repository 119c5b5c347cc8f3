//! Completion handles for asynchronous producer work.
//!
//! A [`JobHandle`] is what a task scheduler hands back for work it runs on
//! another thread. Producers contribute handles to a
//! [`SyncPoint`](crate::barrier::SyncPoint) so that the barrier does not read
//! a mutation log until the work appending to it has finished.
//!
//! The producing side holds a [`JobSignal`]. Dropping a signal without
//! completing it (for example while a panicking job unwinds) completes the
//! handle as [`JobOutcome::Panicked`], so waiters never hang on dead work.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job ran to completion.
    Completed,
    /// The job panicked or its signal was dropped without completing.
    Panicked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Pending,
    Done(JobOutcome),
}

struct Completion {
    state: Mutex<State>,
    condvar: Condvar,
}

impl Completion {
    fn new() -> Self {
        Self {
            state: Mutex::new(State::Pending),
            condvar: Condvar::new(),
        }
    }

    /// First signal wins.
    fn signal(&self, outcome: JobOutcome) {
        let mut state = self.state.lock();
        if *state == State::Pending {
            *state = State::Done(outcome);
            self.condvar.notify_all();
        }
    }

    fn wait(&self) -> JobOutcome {
        let mut state = self.state.lock();
        loop {
            match *state {
                State::Done(outcome) => return outcome,
                State::Pending => self.condvar.wait(&mut state),
            }
        }
    }

    fn poll(&self) -> Option<JobOutcome> {
        match *self.state.lock() {
            State::Done(outcome) => Some(outcome),
            State::Pending => None,
        }
    }
}

// ---------------------------------------------------------------------------
// JobHandle
// ---------------------------------------------------------------------------

/// A cloneable handle that reports when one or more jobs have finished.
///
/// A handle may stand for several jobs at once (see [`combine`](Self::combine));
/// it is complete when all of them are.
#[derive(Clone, Default)]
pub struct JobHandle {
    completions: Vec<Arc<Completion>>,
}

impl JobHandle {
    /// A handle for work that has already finished.
    pub fn completed() -> Self {
        Self::default()
    }

    /// A new pending handle together with the signal that completes it.
    pub fn pending() -> (JobHandle, JobSignal) {
        let completion = Arc::new(Completion::new());
        (
            JobHandle {
                completions: vec![Arc::clone(&completion)],
            },
            JobSignal {
                completion: Some(completion),
            },
        )
    }

    /// A handle that completes once every handle in `handles` has.
    pub fn combine(handles: impl IntoIterator<Item = JobHandle>) -> Self {
        Self {
            completions: handles
                .into_iter()
                .flat_map(|h| h.completions)
                .collect(),
        }
    }

    /// Block until every job behind this handle has finished.
    ///
    /// Returns [`JobOutcome::Panicked`] if any of them panicked.
    pub fn wait(&self) -> JobOutcome {
        self.completions
            .iter()
            .map(|c| c.wait())
            .fold(JobOutcome::Completed, |acc, o| match o {
                JobOutcome::Panicked => JobOutcome::Panicked,
                JobOutcome::Completed => acc,
            })
    }

    /// Whether every job behind this handle has finished, without blocking.
    pub fn is_complete(&self) -> bool {
        self.completions.iter().all(|c| c.poll().is_some())
    }

    /// Number of individual jobs this handle stands for.
    pub fn job_count(&self) -> usize {
        self.completions.len()
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("jobs", &self.completions.len())
            .field("complete", &self.is_complete())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// JobSignal
// ---------------------------------------------------------------------------

/// The producing side of a pending [`JobHandle`].
pub struct JobSignal {
    completion: Option<Arc<Completion>>,
}

impl JobSignal {
    /// Mark the job as finished successfully.
    pub fn complete(mut self) {
        if let Some(c) = self.completion.take() {
            c.signal(JobOutcome::Completed);
        }
    }

    /// Mark the job as failed.
    pub fn fail(mut self) {
        if let Some(c) = self.completion.take() {
            c.signal(JobOutcome::Panicked);
        }
    }
}

impl Drop for JobSignal {
    fn drop(&mut self) {
        if let Some(c) = self.completion.take() {
            c.signal(JobOutcome::Panicked);
        }
    }
}

impl fmt::Debug for JobSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSignal")
            .field("signalled", &self.completion.is_none())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn completed_handle_never_blocks() {
        let h = JobHandle::completed();
        assert!(h.is_complete());
        assert_eq!(h.wait(), JobOutcome::Completed);
        assert_eq!(h.job_count(), 0);
    }

    #[test]
    fn pending_until_signalled() {
        let (h, signal) = JobHandle::pending();
        assert!(!h.is_complete());
        signal.complete();
        assert!(h.is_complete());
        assert_eq!(h.wait(), JobOutcome::Completed);
    }

    #[test]
    fn dropped_signal_reports_panicked() {
        let (h, signal) = JobHandle::pending();
        drop(signal);
        assert_eq!(h.wait(), JobOutcome::Panicked);
    }

    #[test]
    fn wait_blocks_across_threads() {
        let (h, signal) = JobHandle::pending();
        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            signal.complete();
        });
        assert_eq!(h.wait(), JobOutcome::Completed);
        worker.join().unwrap();
    }

    #[test]
    fn combined_handle_waits_for_all_and_reports_worst() {
        let (a, sa) = JobHandle::pending();
        let (b, sb) = JobHandle::pending();
        let both = JobHandle::combine([a, b, JobHandle::completed()]);
        assert_eq!(both.job_count(), 2);

        sa.complete();
        assert!(!both.is_complete());
        sb.fail();
        assert!(both.is_complete());
        assert_eq!(both.wait(), JobOutcome::Panicked);
    }
}
