// SPDX-License-Identifier: Apache-2.0

//! The per-task routine run by pool workers.
//!
//! Accelerator failures are fatal: the worker logs them with the task's
//! ordinal id and exits the process. Validation mismatches are only
//! counted; the run continues.

use crate::Core;
use crate::error::Error;
use crate::kernels;
use crate::task::TaskRecord;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{error, info};

/// Executes one dispatched task and releases its resources.
pub fn execute_task(core: &Arc<Core>, record: &Arc<TaskRecord>) {
    if let Err(err) = drive_accelerator(core, record) {
        error!(task = record.id, kernel = %record.kernel, %err, "fatal accelerator failure");
        std::process::exit(1);
    }

    // Release order matters: slots first, then the duplication count, then
    // the service budget with its wake-up. The three locks are never held
    // together.
    core.slots.release(record.slot_mask);
    core.duplication.release(record.kernel);
    core.service.task_completed(record.cu);
}

fn drive_accelerator(core: &Arc<Core>, record: &Arc<TaskRecord>) -> Result<(), Error> {
    let kernel = record.kernel;
    let desc = kernels::descriptor(kernel);
    let accel = &core.accelerator;
    let executions = record.num_executions as usize;

    // Deep copy of the preloaded reference input.
    let input = core.dataset.clone_input(kernel);

    record.pre_execution.set(core.timebase.now());

    for slot in record.slot_mask.slots() {
        accel.load(kernel, slot)?;
    }

    // One device buffer per argument port; input ports carry the fixed-size
    // input struct repeated once per commanded execution.
    let mut handles = Vec::with_capacity(desc.ports.len());
    let mut input_at = 0;
    for port in desc.ports {
        let total = port.bytes() * executions;
        let handle = accel.allocate(kernel, port, total)?;
        if port.direction.takes_input() {
            let struct_bytes = &input[input_at..input_at + port.bytes()];
            let mut marshalled = Vec::with_capacity(total);
            for _ in 0..executions {
                marshalled.extend_from_slice(struct_bytes);
            }
            accel.write(kernel, handle, &marshalled)?;
            input_at += port.bytes();
        }
        handles.push((port, handle));
    }

    record.measured_arrival.set(core.timebase.now());
    core.online.enqueue(record);

    accel.execute(kernel, record.num_executions)?;
    accel.wait(kernel)?;

    record.measured_finish.set(core.timebase.now());

    let mut output = Vec::with_capacity(desc.output_bytes());
    for (port, handle) in &handles {
        if port.direction.yields_output() {
            let start = output.len();
            output.resize(start + port.bytes(), 0);
            accel.read(kernel, *handle, &mut output[start..])?;
        }
    }
    for (_, handle) in &handles {
        accel.free(kernel, *handle)?;
    }
    for slot in record.slot_mask.slots() {
        accel.unload(slot)?;
    }

    record.post_execution.set(core.timebase.now());

    let passed = core.dataset.validate(kernel, &output);
    record.passed.store(passed, Ordering::Release);
    info!(
        task = record.id,
        kernel = %kernel,
        cu = record.cu,
        result = if passed { "PASS" } else { "FAIL" },
        "task finished"
    );
    Ok(())
}
