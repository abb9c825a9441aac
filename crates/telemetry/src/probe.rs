// SPDX-License-Identifier: Apache-2.0

//! Telemetry probe contract.
//!
//! The monitoring hardware (power ADC plus trace event capture) is an
//! external collaborator; the monitor only depends on this trait.
//! [`SyntheticProbe`] stands in for it off-board.

use crate::error::Error;

/// Samples captured over one monitoring window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryCapture {
    /// Power ADC samples.
    pub power: Vec<u32>,
    /// Opaque 64-bit trace events.
    pub traces: Vec<u64>,
    /// Number of erroneous power samples in the window.
    pub power_errors: u32,
    /// Hardware cycle count covered by the window.
    pub elapsed_cycles: u32,
}

/// Contract of the monitoring hardware driver.
pub trait TelemetryProbe: Send {
    /// Arms the capture hardware for one window.
    fn arm(&mut self) -> Result<(), Error>;

    /// Blocks on the capture-complete interrupt.
    fn wait_done(&mut self) -> Result<(), Error>;

    /// Reads sample counts and copies the sample buffers, then clears the
    /// hardware counters for the next window.
    fn collect(&mut self) -> Result<TelemetryCapture, Error>;

    /// Switches the ADC reference voltage after repeated sample errors.
    fn reconfigure_vref(&mut self) -> Result<(), Error>;
}

/// Deterministic software probe used off-board and in tests.
#[derive(Debug)]
pub struct SyntheticProbe {
    power_samples: usize,
    traces_samples: usize,
    window: u32,
    /// Windows that report every power sample as erroneous before the probe
    /// behaves again; exercises the reference-voltage fallback.
    degraded_windows: u32,
    /// Number of reference-voltage reconfigurations performed.
    pub vref_reconfigs: u32,
}

impl SyntheticProbe {
    /// A probe producing `power_samples`/`traces_samples` per window.
    #[must_use]
    pub fn new(power_samples: usize, traces_samples: usize) -> Self {
        Self {
            power_samples,
            traces_samples,
            window: 0,
            degraded_windows: 0,
            vref_reconfigs: 0,
        }
    }

    /// Makes the first `windows` captures fully erroneous.
    #[must_use]
    pub fn with_degraded_windows(mut self, windows: u32) -> Self {
        self.degraded_windows = windows;
        self
    }
}

impl TelemetryProbe for SyntheticProbe {
    fn arm(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn wait_done(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn collect(&mut self) -> Result<TelemetryCapture, Error> {
        let window = self.window;
        self.window += 1;

        // Sawtooth power ramp and counter-style traces, both keyed by the
        // window index so consecutive captures differ.
        let power = (0..self.power_samples)
            .map(|i| (window.wrapping_mul(7) + i as u32) & 0x0FFF)
            .collect();
        let traces = (0..self.traces_samples)
            .map(|i| ((u64::from(window)) << 32) | i as u64)
            .collect();
        let power_errors = if window < self.degraded_windows {
            self.power_samples as u32
        } else {
            0
        };
        Ok(TelemetryCapture {
            power,
            traces,
            power_errors,
            elapsed_cycles: (window + 1) * 1000,
        })
    }

    fn reconfigure_vref(&mut self) -> Result<(), Error> {
        self.vref_reconfigs += 1;
        Ok(())
    }
}
