// SPDX-License-Identifier: Apache-2.0

//! End-to-end dispatch scenarios against the simulated accelerator.

use awm_config::settings::SetupConfig;
use awm_config::{BoardClass, KernelId};
use awm_engine::accel::SimAccelerator;
use awm_engine::arrival::ArrivalGenerator;
use awm_engine::manager::QueueManager;
use awm_engine::task::TaskRecord;
use awm_engine::time::TimePoint;
use awm_engine::Core;
use awm_config::workload::{PlanEntry, WorkloadPlan};
use std::sync::Arc;

fn config(slots: usize, cu_choices: Vec<u32>) -> SetupConfig {
    let mut config = SetupConfig {
        board: BoardClass::Pynq,
        slots,
        cu_choices,
        ..SetupConfig::default()
    };
    config.oracle.enabled = false;
    config.validate().expect("test config");
    config
}

fn plan(entries: &[(f32, KernelId, u32)]) -> WorkloadPlan {
    WorkloadPlan::from_entries(
        entries
            .iter()
            .map(|&(inter_arrival_ms, kernel, num_executions)| PlanEntry {
                inter_arrival_ms,
                kernel,
                num_executions,
            })
            .collect(),
    )
}

/// Runs the full arrival → dispatch → execute pipeline for one workload and
/// returns the historical records.
fn run_workload(config: SetupConfig, plan: WorkloadPlan) -> Vec<Arc<TaskRecord>> {
    let core = Core::with_start_delay(config, Arc::new(SimAccelerator::new(0.05)), None, 50);

    let lengths = vec![plan.len()];
    let manager = QueueManager::new(Arc::clone(&core));
    let manager_thread = std::thread::spawn(move || manager.run(&lengths).expect("manager run"));

    ArrivalGenerator::new(Arc::clone(&core), vec![plan])
        .run()
        .expect("arrival run");
    manager_thread.join().expect("manager join");
    core.pool.shutdown();
    core.history.snapshot()
}

fn interval(record: &TaskRecord) -> (TimePoint, TimePoint) {
    let arrival = record.measured_arrival.get();
    let finish = record.measured_finish.get();
    assert!(arrival.is_set(), "task #{} never started", record.id);
    assert!(finish.is_set(), "task #{} never finished", record.id);
    assert!(arrival <= finish);
    (arrival, finish)
}

fn overlaps(a: (TimePoint, TimePoint), b: (TimePoint, TimePoint)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

#[test]
fn single_kernel_arrivals_serialize_on_duplication() {
    // Three AES tasks with no inter-arrival gap on a four-slot fabric: the
    // duplication rule admits at most one at a time.
    let records = run_workload(
        config(4, vec![1]),
        plan(&[
            (0.0, KernelId::Aes, 1),
            (0.0, KernelId::Aes, 1),
            (0.0, KernelId::Aes, 1),
        ]),
    );
    assert_eq!(records.len(), 3);

    // Dispatch happened in strict arrival order.
    let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![0, 1, 2]);

    // Execution intervals never overlap.
    for pair in records.windows(2) {
        let earlier = interval(&pair[0]);
        let later = interval(&pair[1]);
        assert!(
            earlier.1 <= later.0,
            "tasks #{} and #{} overlapped",
            pair[0].id,
            pair[1].id
        );
    }
}

#[test]
fn slot_pressure_bounds_concurrency() {
    // Five two-unit tasks on four slots: at most two run concurrently, and
    // concurrent tasks never share a slot bit.
    let records = run_workload(
        config(4, vec![2]),
        plan(&[
            (0.0, KernelId::Bulk, 1),
            (1.0, KernelId::Crs, 1),
            (1.0, KernelId::Kmp, 1),
            (1.0, KernelId::Knn, 1),
            (1.0, KernelId::Nw, 1),
        ]),
    );
    assert_eq!(records.len(), 5);

    for record in &records {
        assert_eq!(record.slot_mask.count(), record.cu);
        assert_eq!(record.cu, 2);
    }

    for (i, a) in records.iter().enumerate() {
        for b in records.iter().skip(i + 1) {
            if overlaps(interval(a), interval(b)) {
                assert_eq!(
                    a.slot_mask.bits() & b.slot_mask.bits(),
                    0,
                    "tasks #{} and #{} shared slots while overlapping",
                    a.id,
                    b.id
                );
            }
        }
    }

    // The slot budget never went negative: no instant has more than four
    // occupied slots.
    for probe in &records {
        let (start, _) = interval(probe);
        let occupied: u32 = records
            .iter()
            .filter(|other| {
                let (a, f) = interval(other);
                a <= start && start < f
            })
            .map(|other| other.cu)
            .sum();
        assert!(occupied <= 4, "{occupied} slots occupied at one instant");
    }
}

#[test]
fn wide_task_waits_for_an_idle_fabric() {
    // A full-width task between two narrow ones: it must not start while
    // anything else holds a slot, and no partial reservation may leak.
    let records = run_workload(
        config(4, vec![4]),
        plan(&[(0.0, KernelId::Merge, 1), (0.0, KernelId::Strided, 1)]),
    );
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.slot_mask.count(), 4);
    }
    assert!(
        !overlaps(interval(&records[0]), interval(&records[1])),
        "full-width tasks overlapped"
    );
}

#[test]
fn historical_records_preserve_commanded_spacing() {
    let records = run_workload(
        config(4, vec![1]),
        plan(&[(0.0, KernelId::Aes, 1), (30.0, KernelId::Bulk, 1)]),
    );
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].inter_arrival_ms, 30);
    assert_eq!(
        records[1]
            .commanded_arrival
            .since(records[0].commanded_arrival),
        30_000_000
    );
    // Measured execution respects the commanded arrival.
    for record in &records {
        assert!(record.measured_arrival.get() >= record.commanded_arrival);
    }
}
