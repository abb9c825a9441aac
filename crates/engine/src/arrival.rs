// SPDX-License-Identifier: Apache-2.0

//! The arrival generator.
//!
//! Replays workload plans into the pending queue at the commanded absolute
//! instants. Arrival slips (the wall clock running past a commanded arrival)
//! are logged, never an error. Between workloads it waits for the queue
//! manager to drain and marks the boundary towards the oracle.

use crate::task::Task;
use crate::{Core, error::Error};
use awm_config::workload::WorkloadPlan;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand::RngExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Replays plans into the pending queue.
pub struct ArrivalGenerator {
    core: Arc<Core>,
    plans: Vec<WorkloadPlan>,
}

impl ArrivalGenerator {
    /// A generator for the given plan sequence.
    #[must_use]
    pub fn new(core: Arc<Core>, plans: Vec<WorkloadPlan>) -> Self {
        Self { core, plans }
    }

    /// Replays every plan, honoring the planned inter-arrival timing.
    pub fn run(self) -> Result<(), Error> {
        let core = &self.core;
        let mut rng = StdRng::seed_from_u64(core.config.cu_seed);
        let cu_choices = &core.config.cu_choices;
        // Arrival series start from the base epoch, two seconds after start,
        // and keep accumulating across workloads.
        let mut schedule = core.epoch;

        for (workload, plan) in self.plans.iter().enumerate() {
            if workload > 0 {
                if let Some(oracle) = &core.oracle {
                    oracle.lock().workload_boundary()?;
                }
            }
            info!(workload, arrivals = plan.len(), "arrival generator: workload start");

            for (ordinal, entry) in plan.entries().iter().enumerate() {
                let inter_arrival_ms = entry.inter_arrival_ms.max(0.0) as i64;
                schedule = schedule.add_millis(inter_arrival_ms as u64);

                let cu = cu_choices[rng.random_range(0..cu_choices.len())];
                let task = Task {
                    epoch: core.epoch,
                    id: ordinal as u64,
                    kernel: entry.kernel,
                    cu,
                    inter_arrival_ms,
                    commanded_arrival: schedule,
                    num_executions: entry.num_executions,
                };

                core.timebase.sleep_until(schedule);
                let slip_ns = core.timebase.now().since(schedule);
                if slip_ns > 1_000_000 {
                    warn!(
                        task = task.id,
                        kernel = %task.kernel,
                        slip_ms = slip_ns / 1_000_000,
                        "arrival slipped past its commanded instant"
                    );
                }

                core.pending.lock().enqueue(task);
                core.service.notify_arrival();
                debug!(task = ordinal, kernel = %entry.kernel, "arrival enqueued");
            }

            core.service.wait_workload_finished();
            info!(workload, "arrival generator: workload finished");
        }
        Ok(())
    }
}
