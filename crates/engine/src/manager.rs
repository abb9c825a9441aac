// SPDX-License-Identifier: Apache-2.0

//! The queue manager: the dispatch loop.
//!
//! Per workload it dispatches exactly as many tasks as the plan holds,
//! honoring slot and duplication constraints, the phase and the configured
//! policy. It is the only consumer of the pending queue and the only thread
//! that reserves slots.

use crate::policy::{ScheduleContext, make_policy};
use crate::task::TaskRecord;
use crate::{Core, error::Error, worker};
use std::sync::Arc;
use tracing::{debug, info};

/// Drives dispatch for a sequence of workloads.
pub struct QueueManager {
    core: Arc<Core>,
    policy: Box<dyn crate::policy::Policy>,
}

impl QueueManager {
    /// A manager using the policy selected by the core's configuration.
    #[must_use]
    pub fn new(core: Arc<Core>) -> Self {
        let policy = make_policy(core.config.policy, core.config.policy_scan_depth);
        Self { core, policy }
    }

    /// Runs dispatch to completion for `plan_lengths.len()` workloads.
    pub fn run(mut self, plan_lengths: &[usize]) -> Result<(), Error> {
        let core = Arc::clone(&self.core);
        for (workload, &plan_len) in plan_lengths.iter().enumerate() {
            info!(workload, tasks = plan_len, "queue manager: workload start");
            let mut dispatched: u64 = 0;

            while (dispatched as usize) < plan_len {
                // Idle: wait until dispatch may be possible. The hint is
                // cleared here and re-raised by arrivals and completions.
                let free_slots = core.service.wait_dispatchable();
                let dup = core.duplication.snapshot();
                let ctx = ScheduleContext {
                    free_slots,
                    dup,
                    cpu: core.cpu.load(),
                    oracle: core.oracle.as_ref(),
                    train_epoch: core.service.train_epoch(),
                    max_cu: core.config.slots as u32,
                };

                // Selecting.
                let selection = {
                    let mut queue = core.pending.lock();
                    self.policy.pick(&mut queue, &ctx)?
                };
                let Some(task) = selection else {
                    // Scanned to the end without an eligible task; leave the
                    // hint to whatever other threads have raised meanwhile.
                    continue;
                };
                // The queue was not exhausted, so more work may be eligible.
                core.service.mark_more_work();

                // Reserving.
                core.service.consume_slots(task.cu);
                let Some(slot_mask) = core.slots.reserve(task.cu) else {
                    // Cannot happen while the budget holds, but stay safe:
                    // undo and retry on the next signal.
                    core.service.unconsume_slots(task.cu);
                    core.pending.lock().push_front(task);
                    continue;
                };
                core.duplication.acquire(task.kernel, task.cu);
                debug!(
                    task = task.id,
                    kernel = %task.kernel,
                    cu = task.cu,
                    slots = format_args!("{:#06b}", slot_mask.bits()),
                    "reserved"
                );

                // Submitting.
                let record = core.history.append(TaskRecord::new(task, slot_mask));
                let core_for_job = Arc::clone(&core);
                let record_for_job = Arc::clone(&record);
                core.pool.dispatch(record.id, move || {
                    worker::execute_task(&core_for_job, &record_for_job);
                })?;
                core.service.task_submitted();

                dispatched += 1;
                if core.config.progress_stride > 0
                    && dispatched % core.config.progress_stride == 0
                {
                    info!(workload, dispatched, "dispatch progress");
                }
            }

            // Terminal: drain the in-flight set, then hand the baton back to
            // the arrival generator.
            core.pool.wait_idle();
            core.pending.lock().clear();
            core.service.signal_workload_finished();
            info!(workload, "queue manager: workload drained");
        }
        Ok(())
    }
}
