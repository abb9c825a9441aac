// SPDX-License-Identifier: Apache-2.0

//! Task records and slot bitmaps.
//!
//! A task lives in two shapes. While pending it is a plain [`Task`] owned by
//! the queue. At dispatch the queue manager fixes its slot bitmap and freezes
//! it into a shared [`TaskRecord`], owned by the historical log; the worker
//! and the per-slot online-event queues only hold handles. The measured
//! timestamps are the only fields written after freezing, which is why they
//! are atomic cells rather than locked fields.

use crate::time::TimePoint;
use awm_config::KernelId;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Bitmap of occupied slots, one bit per slot, LSB = slot 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotMask(u32);

impl SlotMask {
    /// The empty bitmap.
    pub const EMPTY: SlotMask = SlotMask(0);

    /// Builds a mask from raw bits.
    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits of the mask.
    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Marks `slot` as occupied.
    pub fn set(&mut self, slot: usize) {
        self.0 |= 1 << slot;
    }

    /// Whether `slot` is occupied.
    #[must_use]
    pub fn contains(self, slot: usize) -> bool {
        self.0 & (1 << slot) != 0
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Iterates the occupied slot indices, lowest first.
    pub fn slots(self) -> impl Iterator<Item = usize> {
        (0..u32::BITS as usize).filter(move |&slot| self.contains(slot))
    }
}

/// A pending task, owned by the pending queue.
#[derive(Debug, Clone)]
pub struct Task {
    /// Base epoch the arrival series was computed from.
    pub epoch: TimePoint,
    /// Ordinal id, monotonic within a workload.
    pub id: u64,
    /// Kernel to run.
    pub kernel: KernelId,
    /// Requested compute units; occupies this many slots when dispatched.
    pub cu: u32,
    /// Planned delay after the previous arrival, in milliseconds.
    pub inter_arrival_ms: i64,
    /// Absolute instant the plan commanded this arrival for.
    pub commanded_arrival: TimePoint,
    /// Repeated executions the accelerator performs per dispatch.
    pub num_executions: u32,
}

/// A timestamp cell written once by the worker and read by the monitor.
#[derive(Debug)]
pub struct TimeCell(AtomicU64);

impl Default for TimeCell {
    fn default() -> Self {
        Self(AtomicU64::new(TimePoint::INFINITE.as_nanos()))
    }
}

impl TimeCell {
    /// Reads the cell.
    #[must_use]
    pub fn get(&self) -> TimePoint {
        TimePoint::from_nanos(self.0.load(Ordering::Acquire))
    }

    /// Stores a measurement.
    pub fn set(&self, point: TimePoint) {
        self.0.store(point.as_nanos(), Ordering::Release);
    }
}

/// A dispatched task, owned by the historical log.
#[derive(Debug)]
pub struct TaskRecord {
    /// Base epoch the arrival series was computed from.
    pub epoch: TimePoint,
    /// Ordinal id, monotonic within a workload.
    pub id: u64,
    /// Kernel that ran.
    pub kernel: KernelId,
    /// Compute units actually granted (the policy may have overwritten the
    /// requested count).
    pub cu: u32,
    /// Planned delay after the previous arrival, in milliseconds.
    pub inter_arrival_ms: i64,
    /// Absolute instant the plan commanded this arrival for.
    pub commanded_arrival: TimePoint,
    /// Repeated executions performed per dispatch.
    pub num_executions: u32,
    /// Slots occupied for the duration of execution.
    pub slot_mask: SlotMask,
    /// Instant the worker started driving the accelerator.
    pub measured_arrival: TimeCell,
    /// Instant the accelerator signalled completion.
    pub measured_finish: TimeCell,
    /// Instant the worker picked the task up.
    pub pre_execution: TimeCell,
    /// Instant the worker finished demarshalling and cleanup.
    pub post_execution: TimeCell,
    /// Whether the output matched the reference.
    pub passed: AtomicBool,
}

impl TaskRecord {
    /// Freezes a pending task with its granted slot bitmap.
    ///
    /// The bitmap population must equal the compute-unit count; the slot
    /// registry guarantees this at reservation time.
    #[must_use]
    pub fn new(task: Task, slot_mask: SlotMask) -> Self {
        debug_assert_eq!(slot_mask.count(), task.cu);
        Self {
            epoch: task.epoch,
            id: task.id,
            kernel: task.kernel,
            cu: task.cu,
            inter_arrival_ms: task.inter_arrival_ms,
            commanded_arrival: task.commanded_arrival,
            num_executions: task.num_executions,
            slot_mask,
            measured_arrival: TimeCell::default(),
            measured_finish: TimeCell::default(),
            pre_execution: TimeCell::default(),
            post_execution: TimeCell::default(),
            passed: AtomicBool::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_mask_population() {
        let mut mask = SlotMask::EMPTY;
        mask.set(0);
        mask.set(2);
        assert_eq!(mask.count(), 2);
        assert!(mask.contains(0));
        assert!(!mask.contains(1));
        assert_eq!(mask.slots().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn time_cells_start_unset() {
        let task = Task {
            epoch: TimePoint::ZERO,
            id: 0,
            kernel: KernelId::Aes,
            cu: 1,
            inter_arrival_ms: 0,
            commanded_arrival: TimePoint::ZERO,
            num_executions: 1,
        };
        let mut mask = SlotMask::EMPTY;
        mask.set(3);
        let record = TaskRecord::new(task, mask);
        assert!(!record.measured_arrival.get().is_set());
        assert!(!record.measured_finish.get().is_set());
        record.measured_arrival.set(TimePoint::from_millis(100));
        assert_eq!(record.measured_arrival.get(), TimePoint::from_millis(100));
    }
}
