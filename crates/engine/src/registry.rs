// SPDX-License-Identifier: Apache-2.0

//! Slot and duplication registries.
//!
//! Both are small counters behind their own mutexes. They are never held
//! together and never held while sleeping; the queue manager takes a
//! snapshot of the duplication state before scanning the pending queue and
//! re-validates nothing afterwards because counts only move in its favor
//! (workers release, arrivals never acquire).

use crate::task::SlotMask;
use awm_config::{KERNEL_KINDS, KernelId};
use parking_lot::Mutex;

/// Occupancy of the reconfigurable slots.
#[derive(Debug)]
pub struct SlotRegistry {
    in_use: Mutex<Vec<bool>>,
}

impl SlotRegistry {
    /// A registry with `slots` free slots.
    #[must_use]
    pub fn new(slots: usize) -> Self {
        Self {
            in_use: Mutex::new(vec![false; slots]),
        }
    }

    /// Number of slots in the fabric.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.in_use.lock().len()
    }

    /// Marks the first `cu` free slots busy, lowest index first.
    ///
    /// Returns `None` without reserving anything when fewer than `cu` slots
    /// are free; no partial reservation is ever exposed.
    pub fn reserve(&self, cu: u32) -> Option<SlotMask> {
        let mut in_use = self.in_use.lock();
        let free = in_use.iter().filter(|&&busy| !busy).count();
        if (free as u32) < cu {
            return None;
        }
        let mut mask = SlotMask::EMPTY;
        let mut granted = 0;
        for (slot, busy) in in_use.iter_mut().enumerate() {
            if !*busy {
                *busy = true;
                mask.set(slot);
                granted += 1;
                if granted == cu {
                    break;
                }
            }
        }
        Some(mask)
    }

    /// Clears every bit of `mask` from the registry.
    pub fn release(&self, mask: SlotMask) {
        let mut in_use = self.in_use.lock();
        for slot in mask.slots() {
            debug_assert!(in_use[slot]);
            in_use[slot] = false;
        }
    }

    /// Number of currently free slots.
    #[must_use]
    pub fn free_count(&self) -> u32 {
        self.in_use.lock().iter().filter(|&&busy| !busy).count() as u32
    }
}

/// Point-in-time copy of the duplication state.
#[derive(Debug, Clone, Copy)]
pub struct DupSnapshot {
    in_flight: [u32; KERNEL_KINDS],
    cus: [u8; KERNEL_KINDS],
}

impl DupSnapshot {
    /// Whether no task of `kernel` is in flight.
    #[must_use]
    pub fn is_free(&self, kernel: KernelId) -> bool {
        self.in_flight[kernel.index()] == 0
    }

    /// In-flight task count for `kernel`.
    #[must_use]
    pub fn in_flight(&self, kernel: KernelId) -> u32 {
        self.in_flight[kernel.index()]
    }

    /// Per-kernel compute-unit occupancy, as fed to the oracle.
    #[must_use]
    pub fn occupancy(&self) -> [u8; KERNEL_KINDS] {
        self.cus
    }
}

/// In-flight task accounting per kernel identifier.
///
/// The accelerator ABI forbids two concurrent tasks of the same kernel; the
/// count is incremented strictly before dispatch and decremented strictly
/// after unload. The registry also remembers the compute-unit width of the
/// in-flight task because the oracle features report occupancy in CUs.
#[derive(Debug, Default)]
pub struct DuplicationRegistry {
    inner: Mutex<DupInner>,
}

#[derive(Debug, Default)]
struct DupInner {
    in_flight: [u32; KERNEL_KINDS],
    cus: [u8; KERNEL_KINDS],
}

impl DuplicationRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the current state.
    #[must_use]
    pub fn snapshot(&self) -> DupSnapshot {
        let inner = self.inner.lock();
        DupSnapshot {
            in_flight: inner.in_flight,
            cus: inner.cus,
        }
    }

    /// Records a task of `kernel` entering flight with `cu` compute units.
    pub fn acquire(&self, kernel: KernelId, cu: u32) {
        let mut inner = self.inner.lock();
        inner.in_flight[kernel.index()] += 1;
        inner.cus[kernel.index()] = cu.min(u8::MAX as u32) as u8;
    }

    /// Records a task of `kernel` leaving flight.
    pub fn release(&self, kernel: KernelId) {
        let mut inner = self.inner.lock();
        debug_assert!(inner.in_flight[kernel.index()] > 0);
        inner.in_flight[kernel.index()] = inner.in_flight[kernel.index()].saturating_sub(1);
        if inner.in_flight[kernel.index()] == 0 {
            inner.cus[kernel.index()] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_takes_lowest_slots_first() {
        let registry = SlotRegistry::new(4);
        let first = registry.reserve(2).expect("fits");
        assert_eq!(first.bits(), 0b0011);
        let second = registry.reserve(1).expect("fits");
        assert_eq!(second.bits(), 0b0100);
        assert_eq!(registry.free_count(), 1);
    }

    #[test]
    fn reserve_refuses_partial_grants() {
        let registry = SlotRegistry::new(4);
        let _held = registry.reserve(3).expect("fits");
        assert!(registry.reserve(2).is_none());
        // Nothing was taken by the failed attempt.
        assert_eq!(registry.free_count(), 1);
    }

    #[test]
    fn release_reopens_exactly_the_mask() {
        let registry = SlotRegistry::new(4);
        let first = registry.reserve(2).expect("fits");
        let second = registry.reserve(2).expect("fits");
        registry.release(first);
        assert_eq!(registry.free_count(), 2);
        let third = registry.reserve(2).expect("fits");
        assert_eq!(third.bits(), first.bits());
        registry.release(second);
        registry.release(third);
        assert_eq!(registry.free_count(), 4);
    }

    #[test]
    fn duplication_counts_and_occupancy() {
        let registry = DuplicationRegistry::new();
        registry.acquire(KernelId::Knn, 4);
        let snapshot = registry.snapshot();
        assert!(!snapshot.is_free(KernelId::Knn));
        assert!(snapshot.is_free(KernelId::Aes));
        assert_eq!(snapshot.occupancy()[KernelId::Knn.index()], 4);

        registry.release(KernelId::Knn);
        let snapshot = registry.snapshot();
        assert!(snapshot.is_free(KernelId::Knn));
        assert_eq!(snapshot.occupancy()[KernelId::Knn.index()], 0);
    }
}
