// SPDX-License-Identifier: Apache-2.0

//! The pending queue.
//!
//! Strict arrival-order FIFO with `O(1)` enqueue and `O(size)` selective
//! scans. Policies reorder only at dispatch, never by reinsertion, so queue
//! positions always reflect arrival order. The queue is not internally
//! locked; the owning `Core` wraps it in the pending-queue mutex.

use crate::registry::DupSnapshot;
use crate::task::Task;
use std::collections::VecDeque;

/// FIFO of pending tasks.
#[derive(Debug, Default)]
pub struct PendingQueue {
    tasks: VecDeque<Task>,
}

impl PendingQueue {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a task at the tail.
    pub fn enqueue(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    /// Puts a task back at the head.
    ///
    /// Only used to undo a selection whose reservation could not complete;
    /// the task keeps its arrival-order position.
    pub fn push_front(&mut self, task: Task) {
        self.tasks.push_front(task);
    }

    /// Whether a task is dispatchable under the given constraints.
    #[must_use]
    pub fn is_executable(task: &Task, free_slots: u32, dup: &DupSnapshot) -> bool {
        task.cu <= free_slots && dup.is_free(task.kernel)
    }

    /// Removes and returns the first task whose compute-unit demand fits the
    /// free slots and whose kernel is not already in flight.
    ///
    /// Scans to the tail; `None` means no pending task is eligible.
    pub fn dequeue_first_executable(
        &mut self,
        free_slots: u32,
        dup: &DupSnapshot,
    ) -> Option<Task> {
        let pos = self
            .tasks
            .iter()
            .position(|task| Self::is_executable(task, free_slots, dup))?;
        self.tasks.remove(pos)
    }

    /// Non-destructive read of position `pos` (head is 0).
    #[must_use]
    pub fn peek_at(&self, pos: usize) -> Option<&Task> {
        self.tasks.get(pos)
    }

    /// Removes the task at position `pos` (head is 0).
    pub fn dequeue_at(&mut self, pos: usize) -> Option<Task> {
        self.tasks.remove(pos)
    }

    /// Positions of the first `limit` executable tasks, in queue order.
    #[must_use]
    pub fn executable_positions(
        &self,
        free_slots: u32,
        dup: &DupSnapshot,
        limit: usize,
    ) -> Vec<usize> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| Self::is_executable(task, free_slots, dup))
            .map(|(pos, _)| pos)
            .take(limit)
            .collect()
    }

    /// Position of the first pending task of `kernel`, executable or not.
    #[must_use]
    pub fn first_position_of(&self, kernel: awm_config::KernelId) -> Option<usize> {
        self.tasks.iter().position(|task| task.kernel == kernel)
    }

    /// Number of pending tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drops every pending task.
    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}
