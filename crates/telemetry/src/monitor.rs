// SPDX-License-Identifier: Apache-2.0

//! The monitor thread and the phase machine.
//!
//! Runs on a monotonic absolute-time schedule with the first tick at the
//! application epoch. Each tick captures telemetry, classifies the window
//! against the per-slot online-event queues and streams the observation.
//! Every `measurements_per_training` windows the system swings through the
//! TRAIN phase: dispatch pauses, the oracle digests the batch and may advise
//! an idle interval, after which the tick schedule is resynchronized.

use crate::error::Error;
use crate::observation::{Observation, classify_window};
use crate::probe::TelemetryProbe;
use crate::sink::{SinkSet, WindowSamples};
use awm_engine::Core;
use awm_engine::time::TimePoint;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The periodic telemetry/training thread.
pub struct Monitor {
    core: Arc<Core>,
    probe: Box<dyn TelemetryProbe>,
    sinks: SinkSet,
}

impl Monitor {
    /// A monitor over the given probe and sinks.
    #[must_use]
    pub fn new(core: Arc<Core>, probe: Box<dyn TelemetryProbe>, sinks: SinkSet) -> Self {
        Self { core, probe, sinks }
    }

    /// Runs windows until shutdown is requested, then flushes.
    ///
    /// The stop flag is only honored between windows: a window in progress
    /// is always completed and emitted.
    pub fn run(mut self) -> Result<(), Error> {
        let core = Arc::clone(&self.core);
        let settings = core.config.monitor.clone();
        info!(
            period_ms = settings.period_ms,
            measurements_per_training = settings.measurements_per_training,
            "monitor up"
        );

        let mut window_log: Vec<(TimePoint, TimePoint)> = Vec::new();
        let mut count: u64 = 0;
        let mut tick = core.epoch;

        while !core.monitor_stop_requested() {
            core.timebase.sleep_until(tick);

            let start = core.timebase.now();
            let cpu = core.cpu.load();

            self.probe.arm()?;
            self.probe.wait_done()?;
            let capture = self.probe.collect()?;

            let end = core.timebase.now();

            if !capture.power.is_empty() && capture.power_errors >= capture.power.len() as u32 {
                // The window stays valid; the reference voltage swap only
                // protects the ones that follow.
                warn!(
                    errors = capture.power_errors,
                    samples = capture.power.len(),
                    "power sampling degraded, reconfiguring reference voltage"
                );
                self.probe.reconfigure_vref()?;
            }

            let slots = classify_window(&core.online, start, end);
            let observation = Observation {
                cpu,
                start,
                end,
                slots,
            };
            let bytes = observation.encode();
            self.sinks.emit(&WindowSamples {
                index: count,
                observation: &bytes,
                power: &capture.power,
                elapsed_cycles: capture.elapsed_cycles,
                traces: &capture.traces,
            })?;
            window_log.push((start, end));
            count += 1;
            debug!(
                window = count,
                n_power = capture.power.len(),
                n_traces = capture.traces.len(),
                elapsed_cycles = capture.elapsed_cycles,
                "monitoring window complete"
            );

            if count % u64::from(settings.measurements_per_training) == 0 {
                core.service.enter_training();
                info!(window = count, "phase: EXECUTE -> TRAIN");

                let idle_obs = match &core.oracle {
                    Some(oracle) => oracle.lock().operate(settings.measurements_per_training)?,
                    None => 0,
                };

                core.service.resume();
                info!(idle_obs, "phase: TRAIN -> EXECUTE");

                if idle_obs > 0 {
                    let windows_to_wait = idle_obs as f32 / settings.idle_obs_per_window;
                    let wait_ms = (windows_to_wait * settings.period_ms as f32) as u64;
                    info!(idle_obs, wait_ms, "idling through advised observations");
                    let deadline = core.timebase.now().add_millis(wait_ms);
                    core.timebase.sleep_until(deadline);
                }
                // Resynchronize the schedule after the excursion.
                tick = core.timebase.now();
            }

            tick = tick.add_millis(settings.period_ms);
        }

        self.sinks.flush()?;
        if core.config.sinks.file {
            dump_window_log(&core.config.sinks.output_dir.join("monitor_info.bin"), &window_log)?;
        }
        info!(windows = count, "monitor down");
        Ok(())
    }
}

/// Writes the window bounds log as fixed `{timespec start, timespec end}`
/// records.
fn dump_window_log(path: &Path, windows: &[(TimePoint, TimePoint)]) -> Result<(), Error> {
    let mut bytes = Vec::with_capacity(windows.len() * 32);
    for (start, end) in windows {
        bytes.extend_from_slice(&start.encode_timespec());
        bytes.extend_from_slice(&end.encode_timespec());
    }
    std::fs::write(path, bytes).map_err(|source| Error::SinkIo {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::SyntheticProbe;
    use crate::sink::ObservationSink;
    use awm_config::settings::{MonitorSettings, SetupConfig};
    use awm_engine::accel::SimAccelerator;
    use parking_lot::Mutex;
    use std::time::Instant;

    struct CaptureSink {
        emissions: Arc<Mutex<Vec<Instant>>>,
    }

    impl ObservationSink for CaptureSink {
        fn emit(&mut self, _window: &WindowSamples<'_>) -> Result<(), Error> {
            self.emissions.lock().push(Instant::now());
            Ok(())
        }
    }

    fn test_config() -> SetupConfig {
        let mut config = SetupConfig {
            monitor: MonitorSettings {
                period_ms: 50,
                measurements_per_training: 2,
                idle_obs_per_window: 1.72,
                power_samples: 32,
                traces_samples: 8,
                cpu_usage_period_ms: 25,
            },
            ..SetupConfig::default()
        };
        config.sinks.ram = false;
        config.sinks.file = false;
        config
    }

    fn spawn_monitor(
        core: &Arc<Core>,
        probe: SyntheticProbe,
        emissions: &Arc<Mutex<Vec<Instant>>>,
    ) -> std::thread::JoinHandle<()> {
        let sinks = SinkSet::new(vec![Box::new(CaptureSink {
            emissions: Arc::clone(emissions),
        })]);
        let monitor = Monitor::new(Arc::clone(core), Box::new(probe), sinks);
        std::thread::spawn(move || monitor.run().expect("monitor run"))
    }

    #[test]
    fn training_transition_pauses_the_schedule() {
        let oracle: awm_engine::SharedOracle = Arc::new(Mutex::new(Box::new(
            awm_oracle::testing::ScriptedOracle::new().with_idle_obs(3),
        )));
        let core = Core::with_start_delay(
            test_config(),
            Arc::new(SimAccelerator::new(0.0)),
            Some(oracle),
            20,
        );

        let emissions = Arc::new(Mutex::new(Vec::new()));
        let handle = spawn_monitor(&core, SyntheticProbe::new(32, 8), &emissions);

        // Give it time for four windows plus one idle excursion:
        // w0 (20ms) w1 (70ms) idle (~87ms) w2 w3 ...
        std::thread::sleep(std::time::Duration::from_millis(400));
        core.request_monitor_stop();
        handle.join().expect("join");
        core.pool.shutdown();

        let emissions = emissions.lock();
        assert!(emissions.len() >= 3, "only {} windows ran", emissions.len());

        // One full training period passed.
        assert!(core.service.train_epoch() >= 1);
        // The system came back to EXECUTE.
        assert_eq!(core.service.phase(), awm_engine::service::Phase::Execute);

        // The post-training gap carries the advised idle time
        // (3 / 1.72 windows ≈ 87 ms) on top of the 50 ms period, while the
        // pre-training gap is just the period.
        let regular = emissions[1].duration_since(emissions[0]).as_millis();
        let idled = emissions[2].duration_since(emissions[1]).as_millis();
        assert!(regular < 110, "regular gap was {regular} ms");
        assert!(idled > 110, "idle gap was only {idled} ms");
    }

    #[test]
    fn degraded_power_sampling_keeps_the_window() {
        let core = Core::with_start_delay(
            test_config(),
            Arc::new(SimAccelerator::new(0.0)),
            None,
            20,
        );
        let emissions = Arc::new(Mutex::new(Vec::new()));
        let probe = SyntheticProbe::new(32, 8).with_degraded_windows(1);
        let handle = spawn_monitor(&core, probe, &emissions);

        std::thread::sleep(std::time::Duration::from_millis(150));
        core.request_monitor_stop();
        handle.join().expect("join");
        core.pool.shutdown();

        // The degraded first window was emitted regardless.
        assert!(emissions.lock().len() >= 2);
    }
}
