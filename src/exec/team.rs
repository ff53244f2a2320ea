//! # Teams: worker pools that execute scheduled jobs.
//!
//! Functions execute on pooled worker threads assigned **per function**, not
//! per flow; there is no one-thread-per-logical-flow mapping. A job that
//! cannot proceed returns after registering interest in a monitor — it never
//! holds a worker while waiting.
//!
//! ## Implementations
//! - [`WorkerTeam`]: fixed pool of dedicated OS threads draining a shared
//!   queue. The production team.
//! - [`DirectTeam`]: executes the job inline on the assigning thread. For
//!   tests and single-threaded embeddings; safe because activate sets are
//!   applied only after all locks are released.
//!
//! ## Rules
//! - `assign` never blocks (unbounded queue / inline execution).
//! - After shutdown, assignments are silently dropped.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::util::lock;

use super::job::Job;

/// Shared handle to a team.
pub type TeamRef = Arc<dyn Team>;

/// Executor of scheduled jobs.
pub trait Team: Send + Sync {
    /// Queues a job for execution. Never blocks.
    fn assign(&self, job: Job);

    /// Stable team name for diagnostics.
    fn name(&self) -> &str;
}

/// Fixed pool of dedicated OS worker threads.
pub struct WorkerTeam {
    name: String,
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerTeam {
    /// Creates a team named `name` with `workers` threads (minimum 1).
    pub fn new(name: impl Into<String>, workers: usize) -> Arc<Self> {
        let name = name.into();
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        let mut handles = Vec::new();
        for index in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            let builder = std::thread::Builder::new().name(format!("{name}-{index}"));
            if let Ok(handle) = builder.spawn(move || loop {
                let job = {
                    let rx = lock(&rx);
                    rx.recv()
                };
                match job {
                    Ok(job) => job.execute(),
                    Err(_) => break,
                }
            }) {
                handles.push(handle);
            }
        }

        Arc::new(Self {
            name,
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
        })
    }

    /// Stops accepting jobs, drains the queue, and joins the workers.
    pub fn shutdown(&self) {
        lock(&self.tx).take();
        let handles: Vec<JoinHandle<()>> = lock(&self.workers).drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl Team for WorkerTeam {
    fn assign(&self, job: Job) {
        if let Some(tx) = lock(&self.tx).as_ref() {
            let _ = tx.send(job);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for WorkerTeam {
    fn drop(&mut self) {
        lock(&self.tx).take();
    }
}

/// Executes each assigned job inline on the assigning thread.
pub struct DirectTeam {
    name: String,
}

impl DirectTeam {
    /// Creates an inline team.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { name: name.into() })
    }
}

impl Team for DirectTeam {
    fn assign(&self, job: Job) {
        job.execute();
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::test_support::counting_job;
    use std::time::Duration;

    #[test]
    fn test_worker_team_executes_off_caller_thread() {
        let team = WorkerTeam::new("pool", 2);
        let (job, observed) = counting_job(team.clone());
        team.assign(job);

        let caller = std::thread::current().id();
        for _ in 0..100 {
            if let Some(executed_on) = observed.thread() {
                assert_ne!(executed_on, caller);
                team.shutdown();
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("job never executed");
    }

    #[test]
    fn test_direct_team_executes_inline() {
        let team = DirectTeam::new("inline");
        let (job, observed) = counting_job(team.clone());
        team.assign(job);
        assert_eq!(observed.runs(), 1);
        assert_eq!(observed.thread(), Some(std::thread::current().id()));
    }

    #[test]
    fn test_shutdown_drops_later_assignments() {
        let team = WorkerTeam::new("pool", 1);
        team.shutdown();
        let (job, observed) = counting_job(team.clone());
        team.assign(job);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(observed.runs(), 0);
    }
}
