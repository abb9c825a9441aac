// SPDX-License-Identifier: Apache-2.0

//! Per-slot online-event queues.
//!
//! Each slot has a FIFO of weak handles to the tasks currently (or recently)
//! executing on it. A task with more than one compute unit appears in every
//! slot it occupies. The monitor drains each queue once per window,
//! classifies the referenced tasks against the window bounds and re-enqueues
//! the survivors in their original order. Ownership stays with the
//! historical log; a dangling handle is simply skipped.

use crate::task::TaskRecord;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

/// One weak FIFO per reconfigurable slot.
#[derive(Debug)]
pub struct OnlineEventQueues {
    queues: Vec<Mutex<VecDeque<Weak<TaskRecord>>>>,
}

impl OnlineEventQueues {
    /// Queues for `slots` slots.
    #[must_use]
    pub fn new(slots: usize) -> Self {
        Self {
            queues: (0..slots).map(|_| Mutex::new(VecDeque::new())).collect(),
        }
    }

    /// Number of slot queues.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.queues.len()
    }

    /// Registers a dispatched task in the queue of every slot it occupies.
    pub fn enqueue(&self, record: &Arc<TaskRecord>) {
        for slot in record.slot_mask.slots() {
            self.queues[slot].lock().push_back(Arc::downgrade(record));
        }
    }

    /// Takes the whole queue of `slot` for classification.
    #[must_use]
    pub fn drain(&self, slot: usize) -> Vec<Weak<TaskRecord>> {
        self.queues[slot].lock().drain(..).collect()
    }

    /// Puts the kept handles back, preserving their original order.
    pub fn requeue(&self, slot: usize, kept: Vec<Weak<TaskRecord>>) {
        let mut queue = self.queues[slot].lock();
        for handle in kept {
            queue.push_back(handle);
        }
    }

    /// Number of handles currently queued for `slot`.
    #[must_use]
    pub fn len(&self, slot: usize) -> usize {
        self.queues[slot].lock().len()
    }

    /// Whether the queue of `slot` is empty.
    #[must_use]
    pub fn is_empty(&self, slot: usize) -> bool {
        self.queues[slot].lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{SlotMask, Task};
    use crate::time::TimePoint;
    use awm_config::KernelId;

    fn record(cu: u32, mask_bits: u32) -> Arc<TaskRecord> {
        let task = Task {
            epoch: TimePoint::ZERO,
            id: 0,
            kernel: KernelId::Merge,
            cu,
            inter_arrival_ms: 0,
            commanded_arrival: TimePoint::ZERO,
            num_executions: 1,
        };
        Arc::new(TaskRecord::new(task, SlotMask::from_bits(mask_bits)))
    }

    #[test]
    fn multi_cu_task_lands_in_every_occupied_slot() {
        let queues = OnlineEventQueues::new(4);
        let record = record(2, 0b0101);
        queues.enqueue(&record);
        assert_eq!(queues.len(0), 1);
        assert_eq!(queues.len(1), 0);
        assert_eq!(queues.len(2), 1);
    }

    #[test]
    fn drain_and_requeue_preserve_order() {
        let queues = OnlineEventQueues::new(1);
        let first = record(1, 0b1);
        let second = record(1, 0b1);
        queues.enqueue(&first);
        queues.enqueue(&second);

        let drained = queues.drain(0);
        assert!(queues.is_empty(0));
        assert_eq!(drained.len(), 2);
        queues.requeue(0, drained);

        let drained = queues.drain(0);
        let ids: Vec<_> = drained
            .iter()
            .filter_map(Weak::upgrade)
            .map(|r| Arc::as_ptr(&r))
            .collect();
        assert_eq!(ids, vec![Arc::as_ptr(&first), Arc::as_ptr(&second)]);
    }

    #[test]
    fn dropped_records_dangle_harmlessly() {
        let queues = OnlineEventQueues::new(1);
        let record = record(1, 0b1);
        queues.enqueue(&record);
        drop(record);
        let drained = queues.drain(0);
        assert_eq!(drained.iter().filter_map(Weak::upgrade).count(), 0);
    }
}
