// SPDX-License-Identifier: Apache-2.0

//! CPU usage sampling.
//!
//! A small periodic thread parses `/proc/stat` and publishes the
//! user/kernel/idle shares of the last sampling window into the engine's
//! [`awm_engine::cpu::CpuGauge`]. The first window has no previous sample
//! and reports the shares since boot.

use crate::error::Error;
use awm_engine::Core;
use awm_engine::cpu::CpuUsage;
use std::sync::Arc;
use tracing::debug;

/// Aggregate jiffy counters: user, kernel, idle.
pub type CpuCounters = [u64; 3];

/// Parses the aggregate `cpu` line of `/proc/stat`.
///
/// The line reads `cpu user nice system idle ...`; nice time is skipped.
pub fn parse_proc_stat(contents: &str) -> Result<CpuCounters, Error> {
    let line = contents
        .lines()
        .find(|line| line.starts_with("cpu "))
        .ok_or_else(|| Error::CpuSample {
            reason: "no aggregate cpu line in /proc/stat".into(),
        })?;
    let mut fields = line.split_whitespace().skip(1).map(str::parse::<u64>);
    let mut next = |name: &str| {
        fields
            .next()
            .and_then(Result::ok)
            .ok_or_else(|| Error::CpuSample {
                reason: format!("missing {name} column in /proc/stat"),
            })
    };
    let user = next("user")?;
    let _nice = next("nice")?;
    let system = next("system")?;
    let idle = next("idle")?;
    Ok([user, system, idle])
}

/// Percentual shares of the deltas between two counter snapshots.
#[must_use]
pub fn usage_from_counters(current: CpuCounters, previous: CpuCounters) -> CpuUsage {
    let deltas: Vec<u64> = current
        .iter()
        .zip(previous.iter())
        .map(|(c, p)| c.saturating_sub(*p))
        .collect();
    let total: u64 = deltas.iter().sum();
    if total == 0 {
        return CpuUsage::default();
    }
    let share = |i: usize| (deltas[i] as f32 * 100.0) / total as f32;
    CpuUsage {
        user: share(0),
        kernel: share(1),
        idle: share(2),
    }
}

fn sample() -> Result<CpuCounters, Error> {
    let contents = std::fs::read_to_string("/proc/stat").map_err(|source| Error::CpuSample {
        reason: source.to_string(),
    })?;
    parse_proc_stat(&contents)
}

/// Periodically samples CPU usage into the core's gauge until monitor
/// shutdown is requested.
pub fn run_sampler(core: &Arc<Core>) -> Result<(), Error> {
    let period_ms = core.config.monitor.cpu_usage_period_ms;
    let mut previous = CpuCounters::default();
    let mut tick = core.timebase.now();

    while !core.monitor_stop_requested() {
        core.timebase.sleep_until(tick);
        let current = sample()?;
        core.cpu.store(usage_from_counters(current, previous));
        previous = current;
        tick = tick.add_millis(period_ms);
    }
    debug!("cpu sampler down");
    Ok(())
}
