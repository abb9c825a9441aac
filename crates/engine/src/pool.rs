// SPDX-License-Identifier: Apache-2.0

//! The worker pool.
//!
//! A fixed population of OS threads created at startup, fed through a
//! bounded channel. A job counts as active from the moment `dispatch`
//! accepts it until its routine returns, so [`WorkerPool::wait_idle`] is a
//! true drain barrier (completion counter plus condition variable, not a
//! busy-wait).

use crate::error::Error;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Default)]
struct PoolState {
    active: Mutex<usize>,
    idle_cv: Condvar,
}

/// Fixed-size worker pool with a bounded dispatch channel.
pub struct WorkerPool {
    sender: Mutex<Option<flume::Sender<Job>>>,
    state: Arc<PoolState>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawns `workers` threads behind a channel of depth `depth`.
    #[must_use]
    pub fn new(workers: usize, depth: usize) -> Self {
        let (sender, receiver) = flume::bounded::<Job>(depth);
        let state = Arc::new(PoolState::default());

        let workers = (0..workers)
            .map(|index| {
                let receiver = receiver.clone();
                let state = Arc::clone(&state);
                std::thread::Builder::new()
                    .name(format!("awm-worker-{index}"))
                    .spawn(move || worker_loop(index, &receiver, &state))
                    .expect("spawning a pool worker")
            })
            .collect();

        Self {
            sender: Mutex::new(Some(sender)),
            state,
            workers: Mutex::new(workers),
        }
    }

    /// Hands a routine to one worker.
    ///
    /// `task` only labels the error on a full channel; the pool is sized to
    /// the service population, so a full channel is a fatal sizing bug.
    pub fn dispatch(
        &self,
        task: u64,
        job: impl FnOnce() + Send + 'static,
    ) -> Result<(), Error> {
        {
            let mut active = self.state.active.lock();
            *active += 1;
        }
        let sent = self
            .sender
            .lock()
            .as_ref()
            .map(|sender| sender.try_send(Box::new(job)));
        match sent {
            Some(Ok(())) => Ok(()),
            Some(Err(_)) | None => {
                let mut active = self.state.active.lock();
                *active -= 1;
                Err(Error::DispatchFull { task })
            }
        }
    }

    /// Whether every accepted job has finished.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        *self.state.active.lock() == 0
    }

    /// Blocks until every accepted job has finished.
    pub fn wait_idle(&self) {
        let mut active = self.state.active.lock();
        while *active > 0 {
            self.state.idle_cv.wait(&mut active);
        }
    }

    /// Wakes all workers to exit and joins them. Idempotent.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            let _ = handle.join();
        }
    }
}

fn worker_loop(index: usize, receiver: &flume::Receiver<Job>, state: &PoolState) {
    debug!(worker = index, "pool worker up");
    let mut executed: u64 = 0;
    while let Ok(job) = receiver.recv() {
        job();
        executed += 1;
        let mut active = state.active.lock();
        *active -= 1;
        if *active == 0 {
            state.idle_cv.notify_all();
        }
    }
    debug!(worker = index, executed, "pool worker down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn executes_dispatched_jobs() {
        let pool = WorkerPool::new(3, 8);
        let counter = Arc::new(AtomicUsize::new(0));
        for task in 0..8 {
            let counter = Arc::clone(&counter);
            pool.dispatch(task, move || {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("dispatch");
        }
        pool.wait_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
        pool.shutdown();
    }

    #[test]
    fn wait_idle_blocks_until_jobs_finish() {
        let pool = WorkerPool::new(1, 4);
        let done = Arc::new(AtomicUsize::new(0));
        let done_in_job = Arc::clone(&done);
        pool.dispatch(0, move || {
            std::thread::sleep(Duration::from_millis(80));
            let _ = done_in_job.fetch_add(1, Ordering::SeqCst);
        })
        .expect("dispatch");
        assert!(!pool.is_idle());
        pool.wait_idle();
        assert_eq!(done.load(Ordering::SeqCst), 1);
        pool.shutdown();
    }

    #[test]
    fn full_channel_reports_dispatch_full() {
        let pool = WorkerPool::new(1, 1);
        let gate = Arc::new((Mutex::new(false), Condvar::new()));

        // Block the only worker, then fill the single channel slot.
        let worker_gate = Arc::clone(&gate);
        pool.dispatch(0, move || {
            let mut open = worker_gate.0.lock();
            while !*open {
                worker_gate.1.wait(&mut open);
            }
        })
        .expect("dispatch");
        // Give the worker a moment to pull the first job off the channel.
        std::thread::sleep(Duration::from_millis(20));
        pool.dispatch(1, || {}).expect("queued in channel");

        let overflow = pool.dispatch(2, || {});
        assert!(matches!(overflow, Err(Error::DispatchFull { task: 2 })));

        *gate.0.lock() = true;
        gate.1.notify_all();
        pool.wait_idle();
        pool.shutdown();
    }
}
