// SPDX-License-Identifier: Apache-2.0

//! Service state: the one mutex held across a condition-variable wait.
//!
//! It guards the pending count, the dispatch hint, the free-slot budget, the
//! phase and the workload-finished flag. `dispatch_possible` is a monotone
//! hint: it may be raised spuriously, and the queue manager re-validates the
//! real constraints before reserving anything.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};

/// System-wide operating phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Kernels are being dispatched.
    Execute,
    /// The oracle is training; dispatch is paused.
    Train,
}

#[derive(Debug)]
struct ServiceInner {
    pending: usize,
    dispatch_possible: bool,
    free_slots: u32,
    phase: Phase,
    workload_finished: bool,
}

/// Shared dispatch-coordination state.
#[derive(Debug)]
pub struct ServiceState {
    inner: Mutex<ServiceInner>,
    service_cv: Condvar,
    workload_cv: Condvar,
    train_epoch: AtomicU64,
}

impl ServiceState {
    /// A fresh state with `slots` free slots and the execute phase.
    #[must_use]
    pub fn new(slots: u32) -> Self {
        Self {
            inner: Mutex::new(ServiceInner {
                pending: 0,
                dispatch_possible: true,
                free_slots: slots,
                phase: Phase::Execute,
                workload_finished: false,
            }),
            service_cv: Condvar::new(),
            workload_cv: Condvar::new(),
            train_epoch: AtomicU64::new(0),
        }
    }

    /// Registers a newly enqueued arrival and wakes the queue manager when
    /// slots are available.
    pub fn notify_arrival(&self) {
        let mut inner = self.inner.lock();
        inner.pending += 1;
        inner.dispatch_possible = true;
        if inner.free_slots > 0 {
            self.service_cv.notify_one();
        }
    }

    /// Blocks until dispatch may be possible and returns the free-slot count.
    ///
    /// Clears the dispatch hint on the way out; completions and new arrivals
    /// re-raise it.
    pub fn wait_dispatchable(&self) -> u32 {
        let mut inner = self.inner.lock();
        while inner.pending == 0
            || !inner.dispatch_possible
            || inner.free_slots == 0
            || inner.phase == Phase::Train
        {
            self.service_cv.wait(&mut inner);
        }
        inner.dispatch_possible = false;
        inner.free_slots
    }

    /// Re-raises the dispatch hint after a successful selection: the queue
    /// was not scanned to exhaustion, so more work may be eligible.
    pub fn mark_more_work(&self) {
        self.inner.lock().dispatch_possible = true;
    }

    /// Takes `cu` slots out of the budget for a reservation.
    pub fn consume_slots(&self, cu: u32) {
        let mut inner = self.inner.lock();
        debug_assert!(inner.free_slots >= cu);
        inner.free_slots -= cu;
    }

    /// Returns `cu` slots after a reservation that could not complete.
    pub fn unconsume_slots(&self, cu: u32) {
        self.inner.lock().free_slots += cu;
    }

    /// Records a dispatched task leaving the pending population.
    pub fn task_submitted(&self) {
        let mut inner = self.inner.lock();
        debug_assert!(inner.pending > 0);
        inner.pending -= 1;
    }

    /// Records a completed task: returns its slots, raises the hint and
    /// wakes the queue manager.
    pub fn task_completed(&self, cu: u32) {
        let mut inner = self.inner.lock();
        inner.free_slots += cu;
        inner.dispatch_possible = true;
        self.service_cv.notify_one();
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.lock().phase
    }

    /// Enters the training phase. Dispatch blocks until [`Self::resume`].
    pub fn enter_training(&self) {
        let mut inner = self.inner.lock();
        inner.phase = Phase::Train;
        let _ = self.train_epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns to the execute phase and wakes the queue manager.
    pub fn resume(&self) {
        let mut inner = self.inner.lock();
        inner.phase = Phase::Execute;
        self.service_cv.notify_all();
    }

    /// Number of training phases entered so far. Scheduling caches compare
    /// this to notice phase crossings.
    #[must_use]
    pub fn train_epoch(&self) -> u64 {
        self.train_epoch.load(Ordering::Acquire)
    }

    /// Current free-slot budget.
    #[must_use]
    pub fn free_slots(&self) -> u32 {
        self.inner.lock().free_slots
    }

    /// Current pending count.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.lock().pending
    }

    /// Signals that the current workload has fully drained.
    pub fn signal_workload_finished(&self) {
        let mut inner = self.inner.lock();
        inner.workload_finished = true;
        self.workload_cv.notify_all();
    }

    /// Blocks until the current workload drains, then rearms the flag.
    pub fn wait_workload_finished(&self) {
        let mut inner = self.inner.lock();
        while !inner.workload_finished {
            self.workload_cv.wait(&mut inner);
        }
        inner.workload_finished = false;
    }
}
