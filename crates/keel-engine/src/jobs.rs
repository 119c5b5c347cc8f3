//! Fixed-size worker pool for producer jobs.
//!
//! Systems hand work to the pool with [`JobScheduler::schedule`] and get back
//! a [`JobHandle`] they can contribute to the sync point. Every job signals
//! its handle exactly once: completed when the closure returns, failed when
//! it panics. A panicking job never takes its worker down with it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use keel_sync::job::{JobHandle, JobSignal};
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Task {
    name: String,
    job: Job,
    signal: JobSignal,
}

fn worker_loop(index: usize, tasks: Receiver<Task>) {
    while let Ok(Task { name, job, signal }) = tasks.recv() {
        match catch_unwind(AssertUnwindSafe(job)) {
            Ok(()) => signal.complete(),
            Err(_) => {
                error!(worker = index, job = %name, "job panicked; handle signalled as failed");
                signal.fail();
            }
        }
    }
    debug!(worker = index, "job worker exiting");
}

// ---------------------------------------------------------------------------
// JobScheduler
// ---------------------------------------------------------------------------

/// A pool of named worker threads fed from one queue.
pub struct JobScheduler {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl JobScheduler {
    /// Start `worker_threads` workers.
    ///
    /// # Panics
    ///
    /// Panics if `worker_threads` is zero.
    pub fn new(worker_threads: usize) -> std::io::Result<Self> {
        assert!(worker_threads > 0, "a job scheduler needs at least one worker");

        let (sender, receiver) = unbounded::<Task>();
        let mut workers = Vec::with_capacity(worker_threads);
        for index in 0..worker_threads {
            let tasks = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("keel-job-{index}"))
                .spawn(move || worker_loop(index, tasks))?;
            workers.push(handle);
        }
        debug!(workers = worker_threads, "job scheduler started");

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Queue `job` on the pool and return a handle that completes when it
    /// has run.
    ///
    /// # Panics
    ///
    /// Panics after [`shutdown`](Self::shutdown).
    pub fn schedule<F>(&self, name: &str, job: F) -> JobHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(sender) = &self.sender else {
            panic!("job {name:?} scheduled on a job scheduler that has been shut down");
        };

        let (handle, signal) = JobHandle::pending();
        let task = Task {
            name: name.to_owned(),
            job: Box::new(job),
            signal,
        };
        // Fails only if every worker is gone; dropping the task then drops
        // its signal, which reads as a failed job.
        if sender.send(task).is_err() {
            error!(job = %name, "no job workers left; job dropped");
        }
        handle
    }

    /// Number of worker threads still attached.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.sender.is_none()
    }

    /// Let the workers drain the queue, then join them. Idempotent.
    pub fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("job worker panicked outside a job");
            }
        }
        debug!("job scheduler shut down");
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for JobScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobScheduler")
            .field("workers", &self.workers.len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
