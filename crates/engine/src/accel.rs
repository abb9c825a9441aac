// SPDX-License-Identifier: Apache-2.0

//! Accelerator control contract.
//!
//! The real control library (program loading, DMA buffers, execution and
//! reconfiguration) is an external collaborator; the engine only depends on
//! this trait. [`SimAccelerator`] is an in-process stand-in that reproduces
//! the timing shape (cost scales with executions, divides across compute
//! units) and applies the kernels' golden transform so output validation is
//! meaningful.

use crate::error::Error;
use crate::kernels::{self, PortSpec};
use awm_config::KernelId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Handle to a device buffer.
pub type BufferHandle = u64;

/// Contract of the low-level accelerator control library.
///
/// Calls for one task follow the fixed sequence load → allocate/write →
/// execute → wait → read → free → unload; concurrent tasks drive disjoint
/// kernels and slot subsets.
pub trait AcceleratorControl: Send + Sync {
    /// Loads the kernel program into `slot`.
    fn load(&self, kernel: KernelId, slot: usize) -> Result<(), Error>;

    /// Allocates a device buffer for one argument port.
    fn allocate(
        &self,
        kernel: KernelId,
        port: &'static PortSpec,
        bytes: usize,
    ) -> Result<BufferHandle, Error>;

    /// Copies marshalled input bytes into a device buffer.
    fn write(&self, kernel: KernelId, handle: BufferHandle, bytes: &[u8]) -> Result<(), Error>;

    /// Starts `executions` back-to-back runs across the loaded slots.
    fn execute(&self, kernel: KernelId, executions: u32) -> Result<(), Error>;

    /// Blocks until `kernel` signals completion.
    fn wait(&self, kernel: KernelId) -> Result<(), Error>;

    /// Reads output bytes back from a device buffer.
    fn read(&self, kernel: KernelId, handle: BufferHandle, bytes: &mut [u8]) -> Result<(), Error>;

    /// Releases a device buffer.
    fn free(&self, kernel: KernelId, handle: BufferHandle) -> Result<(), Error>;

    /// Unloads whatever program occupies `slot`.
    fn unload(&self, slot: usize) -> Result<(), Error>;
}

#[derive(Debug)]
struct SimBuffer {
    kernel: KernelId,
    port: &'static PortSpec,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct SimState {
    buffers: HashMap<BufferHandle, SimBuffer>,
    slot_programs: HashMap<usize, KernelId>,
    deadlines: HashMap<KernelId, Instant>,
}

impl SimState {
    fn loaded_units(&self, kernel: KernelId) -> u32 {
        self.slot_programs.values().filter(|&&k| k == kernel).count() as u32
    }
}

/// Software stand-in for the accelerator fabric.
#[derive(Debug)]
pub struct SimAccelerator {
    state: Mutex<SimState>,
    next_handle: AtomicU64,
    /// Multiplier over the descriptors' baseline costs; tests shrink it.
    time_scale: f64,
}

impl Default for SimAccelerator {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl SimAccelerator {
    /// A simulator whose execution times are the descriptor baselines
    /// multiplied by `time_scale`.
    #[must_use]
    pub fn new(time_scale: f64) -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            next_handle: AtomicU64::new(1),
            time_scale,
        }
    }
}

impl AcceleratorControl for SimAccelerator {
    fn load(&self, kernel: KernelId, slot: usize) -> Result<(), Error> {
        let mut state = self.state.lock();
        if let Some(occupant) = state.slot_programs.insert(slot, kernel) {
            return Err(Error::Accelerator {
                kernel,
                op: "load",
                detail: format!("slot {slot} still holds {occupant}"),
            });
        }
        Ok(())
    }

    fn allocate(
        &self,
        kernel: KernelId,
        port: &'static PortSpec,
        bytes: usize,
    ) -> Result<BufferHandle, Error> {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let previous = self.state.lock().buffers.insert(
            handle,
            SimBuffer {
                kernel,
                port,
                data: vec![0; bytes],
            },
        );
        debug_assert!(previous.is_none());
        Ok(handle)
    }

    fn write(&self, kernel: KernelId, handle: BufferHandle, bytes: &[u8]) -> Result<(), Error> {
        let mut state = self.state.lock();
        let buffer = state.buffers.get_mut(&handle).ok_or(Error::Accelerator {
            kernel,
            op: "write",
            detail: format!("unknown buffer handle {handle}"),
        })?;
        buffer.data[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn execute(&self, kernel: KernelId, executions: u32) -> Result<(), Error> {
        let mut state = self.state.lock();
        let cus = state.loaded_units(kernel);
        if cus == 0 {
            return Err(Error::Accelerator {
                kernel,
                op: "execute",
                detail: "no compute unit loaded".into(),
            });
        }

        // Transform every output-bearing buffer of this kernel, all
        // executions at once.
        for buffer in state.buffers.values_mut() {
            if buffer.kernel == kernel && buffer.port.direction.yields_output() {
                for byte in &mut buffer.data {
                    *byte = kernels::golden(kernel, *byte);
                }
            }
        }

        let cost_us = kernels::descriptor(kernel).base_cost_us as f64 * self.time_scale
            * executions as f64
            / cus as f64;
        let deadline = Instant::now() + Duration::from_micros(cost_us as u64);
        let _ = state.deadlines.insert(kernel, deadline);
        Ok(())
    }

    fn wait(&self, kernel: KernelId) -> Result<(), Error> {
        let deadline = {
            let state = self.state.lock();
            state.deadlines.get(&kernel).copied()
        };
        let deadline = deadline.ok_or(Error::Accelerator {
            kernel,
            op: "wait",
            detail: "wait without a pending execution".into(),
        })?;
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        let _ = self.state.lock().deadlines.remove(&kernel);
        Ok(())
    }

    fn read(&self, kernel: KernelId, handle: BufferHandle, bytes: &mut [u8]) -> Result<(), Error> {
        let state = self.state.lock();
        let buffer = state.buffers.get(&handle).ok_or(Error::Accelerator {
            kernel,
            op: "read",
            detail: format!("unknown buffer handle {handle}"),
        })?;
        bytes.copy_from_slice(&buffer.data[..bytes.len()]);
        Ok(())
    }

    fn free(&self, kernel: KernelId, handle: BufferHandle) -> Result<(), Error> {
        self.state
            .lock()
            .buffers
            .remove(&handle)
            .map(|_| ())
            .ok_or(Error::Accelerator {
                kernel,
                op: "free",
                detail: format!("unknown buffer handle {handle}"),
            })
    }

    fn unload(&self, slot: usize) -> Result<(), Error> {
        let _ = self.state.lock().slot_programs.remove(&slot);
        Ok(())
    }
}
