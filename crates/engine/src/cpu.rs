// SPDX-License-Identifier: Apache-2.0

//! Shared CPU-usage gauge.
//!
//! The sampler thread (owned by the telemetry crate) writes the latest
//! user/kernel/idle percentages here; the monitor and the model-assisted
//! policies read them. A plain locked triple is enough at the involved
//! sampling rates.

use parking_lot::Mutex;

/// Latest CPU usage shares, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CpuUsage {
    /// Time spent in user space.
    pub user: f32,
    /// Time spent in the kernel.
    pub kernel: f32,
    /// Idle time.
    pub idle: f32,
}

impl CpuUsage {
    /// The `(user, kernel, idle)` triple, as fed to oracle features.
    #[must_use]
    pub fn as_triple(self) -> (f32, f32, f32) {
        (self.user, self.kernel, self.idle)
    }
}

/// Shared holder of the latest [`CpuUsage`] sample.
#[derive(Debug, Default)]
pub struct CpuGauge {
    current: Mutex<CpuUsage>,
}

impl CpuGauge {
    /// A gauge reading all zeroes until the first sample lands.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a new sample.
    pub fn store(&self, usage: CpuUsage) {
        *self.current.lock() = usage;
    }

    /// Reads the latest sample.
    #[must_use]
    pub fn load(&self) -> CpuUsage {
        *self.current.lock()
    }
}
