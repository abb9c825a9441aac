// SPDX-License-Identifier: Apache-2.0

//! Scheduling policies.
//!
//! A policy is a strategy over the pending queue: given the free-slot
//! budget, a duplication snapshot and the CPU usage, it either removes one
//! task for dispatch or reports that nothing is eligible. Policies reorder
//! only at dispatch; the queue keeps strict arrival order.
//!
//! Numeric semantics: oracle times are `f32`; negative predictions are
//! clamped to zero before comparison and ties go to the lowest queue index.

use crate::SharedOracle;
use crate::cpu::CpuUsage;
use crate::error::Error;
use crate::pending::PendingQueue;
use crate::registry::DupSnapshot;
use crate::task::Task;
use awm_config::settings::PolicyKind;
use awm_config::{KERNEL_KINDS, KernelId};
use awm_oracle::wire::Features;
use std::collections::VecDeque;
use tracing::debug;

/// Inputs a policy may consult for one selection.
pub struct ScheduleContext<'a> {
    /// Slots currently free.
    pub free_slots: u32,
    /// Duplication snapshot taken before the scan.
    pub dup: DupSnapshot,
    /// Latest CPU usage sample.
    pub cpu: CpuUsage,
    /// The oracle, when attached. Policies fall back to FIFO without it.
    pub oracle: Option<&'a SharedOracle>,
    /// Training-phase counter used to invalidate cached advice.
    pub train_epoch: u64,
    /// Largest compute-unit count the fabric supports.
    pub max_cu: u32,
}

/// Strategy over the pending queue.
pub trait Policy: Send {
    /// Removes the next task to dispatch, or `None` when nothing is eligible.
    fn pick(
        &mut self,
        queue: &mut PendingQueue,
        ctx: &ScheduleContext<'_>,
    ) -> Result<Option<Task>, Error>;
}

/// Builds the configured policy.
#[must_use]
pub fn make_policy(kind: PolicyKind, scan_depth: usize) -> Box<dyn Policy> {
    match kind {
        PolicyKind::Fifo => Box::new(Fifo),
        PolicyKind::Sjf => Box::new(Sjf { scan_depth }),
        PolicyKind::Lif => Box::new(Lif { scan_depth }),
        PolicyKind::Csa => Box::new(Csa::new(scan_depth)),
    }
}

/// First-in first-out over the executable subset.
pub struct Fifo;

impl Policy for Fifo {
    fn pick(
        &mut self,
        queue: &mut PendingQueue,
        ctx: &ScheduleContext<'_>,
    ) -> Result<Option<Task>, Error> {
        Ok(queue.dequeue_first_executable(ctx.free_slots, &ctx.dup))
    }
}

/// Shortest job first over the first `scan_depth` executable tasks, ranked
/// by predicted wall time times the commanded execution count.
pub struct Sjf {
    scan_depth: usize,
}

impl Policy for Sjf {
    fn pick(
        &mut self,
        queue: &mut PendingQueue,
        ctx: &ScheduleContext<'_>,
    ) -> Result<Option<Task>, Error> {
        let positions = queue.executable_positions(ctx.free_slots, &ctx.dup, self.scan_depth);
        if positions.is_empty() {
            return Ok(None);
        }
        let Some(oracle) = ctx.oracle else {
            return Ok(queue.dequeue_first_executable(ctx.free_slots, &ctx.dup));
        };

        let mut best: Option<(usize, f32)> = None;
        {
            let mut oracle = oracle.lock();
            for &pos in &positions {
                let Some(task) = queue.peek_at(pos) else {
                    continue;
                };
                let features = Features::prediction(
                    ctx.cpu.as_triple(),
                    task.kernel,
                    ctx.dup.occupancy(),
                );
                let prediction = oracle.predict(&features)?;
                let cost = prediction.time.max(0.0) * task.num_executions as f32;
                if best.is_none_or(|(_, incumbent)| cost < incumbent) {
                    best = Some((pos, cost));
                }
            }
        }
        Ok(best.and_then(|(pos, _)| queue.dequeue_at(pos)))
    }
}

/// Least interaction first: ranks candidates by the relative slowdown the
/// currently running mix inflicts on them.
pub struct Lif {
    scan_depth: usize,
}

impl Policy for Lif {
    fn pick(
        &mut self,
        queue: &mut PendingQueue,
        ctx: &ScheduleContext<'_>,
    ) -> Result<Option<Task>, Error> {
        let positions = queue.executable_positions(ctx.free_slots, &ctx.dup, self.scan_depth);
        if positions.is_empty() {
            return Ok(None);
        }
        let Some(oracle) = ctx.oracle else {
            return Ok(queue.dequeue_first_executable(ctx.free_slots, &ctx.dup));
        };

        let mut best: Option<(usize, f32)> = None;
        {
            let mut oracle = oracle.lock();
            for &pos in &positions {
                let Some(task) = queue.peek_at(pos) else {
                    continue;
                };
                let own_cu = task.cu.min(u8::MAX as u32) as u8;

                let mut alone = [0u8; KERNEL_KINDS];
                alone[task.kernel.index()] = own_cu;
                let t_alone = oracle
                    .predict(&Features::prediction(
                        ctx.cpu.as_triple(),
                        task.kernel,
                        alone,
                    ))?
                    .time
                    .max(0.0);

                let mut mixed = ctx.dup.occupancy();
                mixed[task.kernel.index()] =
                    mixed[task.kernel.index()].saturating_add(own_cu);
                let t_mixed = oracle
                    .predict(&Features::prediction(
                        ctx.cpu.as_triple(),
                        task.kernel,
                        mixed,
                    ))?
                    .time
                    .max(0.0);

                // A degenerate alone-time gives no usable ratio; such a
                // candidate is only picked if every other one degenerates.
                let interaction = if t_alone > 0.0 {
                    (t_mixed - t_alone) / t_alone
                } else {
                    f32::INFINITY
                };
                if best.is_none_or(|(_, incumbent)| interaction < incumbent) {
                    best = Some((pos, interaction));
                }
            }
        }
        Ok(best.and_then(|(pos, _)| queue.dequeue_at(pos)))
    }
}

/// Crow-search batch scheduling: one oracle query yields a per-kernel
/// compute-unit recommendation that is drained one dispatch at a time.
pub struct Csa {
    scan_depth: usize,
    cached: VecDeque<(KernelId, u32)>,
    epoch: Option<u64>,
}

impl Csa {
    fn new(scan_depth: usize) -> Self {
        Self {
            scan_depth,
            cached: VecDeque::new(),
            epoch: None,
        }
    }

    /// Drops any prior advice. Called on phase crossings and mix changes.
    pub fn reset_prior_decisions(&mut self) {
        self.cached.clear();
    }
}

impl Policy for Csa {
    fn pick(
        &mut self,
        queue: &mut PendingQueue,
        ctx: &ScheduleContext<'_>,
    ) -> Result<Option<Task>, Error> {
        if self.epoch != Some(ctx.train_epoch) {
            self.reset_prior_decisions();
            self.epoch = Some(ctx.train_epoch);
        }

        // A cache referring to kernels that all left the queue means the mix
        // has changed under us.
        if !self.cached.is_empty()
            && self
                .cached
                .iter()
                .all(|&(kernel, _)| queue.first_position_of(kernel).is_none())
        {
            debug!("pending mix changed, dropping cached scheduling advice");
            self.reset_prior_decisions();
        }

        if self.cached.is_empty() {
            let Some(oracle) = ctx.oracle else {
                return Ok(queue.dequeue_first_executable(ctx.free_slots, &ctx.dup));
            };

            // Up to `scan_depth` executable tasks of distinct kernels.
            let mut seen = [false; KERNEL_KINDS];
            let mut candidates = Vec::new();
            let mut pos = 0;
            while candidates.len() < self.scan_depth {
                let Some(task) = queue.peek_at(pos) else {
                    break;
                };
                if PendingQueue::is_executable(task, ctx.free_slots, &ctx.dup)
                    && !seen[task.kernel.index()]
                {
                    seen[task.kernel.index()] = true;
                    candidates.push(task.kernel);
                }
                pos += 1;
            }
            if candidates.is_empty() {
                return Ok(None);
            }

            let mut request = Features::schedule(ctx.cpu.as_triple(), ctx.dup.occupancy());
            for &kernel in &candidates {
                request.mark_candidate(kernel);
            }
            let decision = oracle.lock().schedule(&request)?;
            self.cached = candidates
                .into_iter()
                .filter_map(|kernel| {
                    let cu = u32::from(decision.cu_for(kernel));
                    (cu > 0).then_some((kernel, cu))
                })
                .collect();
            debug!(pending = self.cached.len(), "fresh scheduling advice cached");
        }

        while let Some(&(kernel, advised_cu)) = self.cached.front() {
            let Some(pos) = queue.first_position_of(kernel) else {
                // The recommended kernel is gone; move on to the next one.
                let _ = self.cached.pop_front();
                continue;
            };
            let cu = advised_cu.clamp(1, ctx.max_cu);
            if !ctx.dup.is_free(kernel) || cu > ctx.free_slots {
                // Blocked right now; keep the advice and retry on the next
                // wake-up.
                return Ok(None);
            }
            let _ = self.cached.pop_front();
            let Some(mut task) = queue.dequeue_at(pos) else {
                continue;
            };
            task.cu = cu;
            return Ok(Some(task));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DuplicationRegistry;
    use crate::time::TimePoint;
    use awm_oracle::testing::ScriptedOracle;
    use awm_oracle::wire::{Prediction, ScheduleDecision};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn task(id: u64, kernel: KernelId, cu: u32, executions: u32) -> Task {
        Task {
            epoch: TimePoint::ZERO,
            id,
            kernel,
            cu,
            inter_arrival_ms: 0,
            commanded_arrival: TimePoint::ZERO,
            num_executions: executions,
        }
    }

    fn ctx<'a>(oracle: Option<&'a SharedOracle>, free_slots: u32) -> ScheduleContext<'a> {
        ScheduleContext {
            free_slots,
            dup: DuplicationRegistry::new().snapshot(),
            cpu: CpuUsage::default(),
            oracle,
            train_epoch: 0,
            max_cu: 4,
        }
    }

    fn shared(oracle: ScriptedOracle) -> SharedOracle {
        Arc::new(Mutex::new(Box::new(oracle)))
    }

    #[test]
    fn fifo_returns_head_without_pressure() {
        let mut queue = PendingQueue::new();
        queue.enqueue(task(0, KernelId::Aes, 1, 1));
        queue.enqueue(task(1, KernelId::Bulk, 1, 1));
        let mut policy = Fifo;
        let picked = policy
            .pick(&mut queue, &ctx(None, 4))
            .expect("fifo")
            .expect("eligible");
        assert_eq!(picked.id, 0);
    }

    #[test]
    fn sjf_picks_minimum_predicted_cost() {
        // Kmp is slow, Knn fast; Knn should win despite arriving later.
        let oracle = shared(ScriptedOracle::new().with_predict(|features| Prediction {
            power: vec![1.0],
            time: if features.main == KernelId::Kmp.index() as u8 {
                9.0
            } else {
                2.0
            },
        }));
        let mut queue = PendingQueue::new();
        queue.enqueue(task(0, KernelId::Kmp, 1, 1));
        queue.enqueue(task(1, KernelId::Knn, 1, 1));

        let mut policy = Sjf { scan_depth: 4 };
        let picked = policy
            .pick(&mut queue, &ctx(Some(&oracle), 4))
            .expect("sjf")
            .expect("eligible");
        assert_eq!(picked.kernel, KernelId::Knn);
    }

    #[test]
    fn sjf_weighs_execution_count() {
        // Equal per-run times; the task commanding fewer executions wins.
        let oracle = shared(ScriptedOracle::new().with_predict(|_| Prediction {
            power: vec![1.0],
            time: 3.0,
        }));
        let mut queue = PendingQueue::new();
        queue.enqueue(task(0, KernelId::Kmp, 1, 10));
        queue.enqueue(task(1, KernelId::Knn, 1, 2));

        let mut policy = Sjf { scan_depth: 4 };
        let picked = policy
            .pick(&mut queue, &ctx(Some(&oracle), 4))
            .expect("sjf")
            .expect("eligible");
        assert_eq!(picked.kernel, KernelId::Knn);
    }

    #[test]
    fn sjf_is_idempotent_for_fixed_oracle() {
        let fresh_queue = || {
            let mut queue = PendingQueue::new();
            queue.enqueue(task(0, KernelId::Kmp, 1, 4));
            queue.enqueue(task(1, KernelId::Knn, 1, 4));
            queue.enqueue(task(2, KernelId::Nw, 1, 4));
            queue
        };
        let oracle = shared(ScriptedOracle::new().with_predict(|features| Prediction {
            power: vec![1.0],
            time: (features.main as f32 + 1.0) * 0.5,
        }));
        let mut policy = Sjf { scan_depth: 4 };

        let mut queue = fresh_queue();
        let first = policy
            .pick(&mut queue, &ctx(Some(&oracle), 4))
            .expect("sjf")
            .expect("eligible");
        let mut queue = fresh_queue();
        let second = policy
            .pick(&mut queue, &ctx(Some(&oracle), 4))
            .expect("sjf")
            .expect("eligible");
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn sjf_ties_break_to_lowest_index() {
        let oracle = shared(ScriptedOracle::new().with_predict(|_| Prediction {
            power: vec![1.0],
            time: -2.0, // clamps to zero for every candidate
        }));
        let mut queue = PendingQueue::new();
        queue.enqueue(task(0, KernelId::Kmp, 1, 1));
        queue.enqueue(task(1, KernelId::Knn, 1, 1));
        let mut policy = Sjf { scan_depth: 4 };
        let picked = policy
            .pick(&mut queue, &ctx(Some(&oracle), 4))
            .expect("sjf")
            .expect("eligible");
        assert_eq!(picked.id, 0);
    }

    #[test]
    fn lif_prefers_least_relative_slowdown() {
        // Kmp doubles under the mix, Knn is barely disturbed.
        let oracle = shared(ScriptedOracle::new().with_predict(|features: &Features| {
            let alone = features
                .occupancy
                .iter()
                .enumerate()
                .filter(|&(i, &cu)| cu > 0 && i != features.main as usize)
                .count()
                == 0;
            let time = match (features.main == KernelId::Kmp.index() as u8, alone) {
                (true, true) => 2.0,
                (true, false) => 4.0,
                (false, true) => 3.0,
                (false, false) => 3.3,
            };
            Prediction {
                power: vec![1.0],
                time,
            }
        }));

        let registry = DuplicationRegistry::new();
        registry.acquire(KernelId::Merge, 2);
        let mut context = ctx(Some(&oracle), 4);
        context.dup = registry.snapshot();

        let mut queue = PendingQueue::new();
        queue.enqueue(task(0, KernelId::Kmp, 1, 1));
        queue.enqueue(task(1, KernelId::Knn, 1, 1));

        let mut policy = Lif { scan_depth: 4 };
        let picked = policy
            .pick(&mut queue, &context)
            .expect("lif")
            .expect("eligible");
        assert_eq!(picked.kernel, KernelId::Knn);
    }

    #[test]
    fn csa_caches_the_decision_and_overwrites_cu() {
        let calls = Arc::new(Mutex::new(0u32));
        let calls_in_oracle = Arc::clone(&calls);
        let oracle = shared(ScriptedOracle::new().with_schedule(move |_| {
            *calls_in_oracle.lock() += 1;
            let mut decision = ScheduleDecision::default();
            decision.cu[KernelId::Kmp.index()] = 2;
            decision.cu[KernelId::Knn.index()] = 1;
            decision
        }));
        let mut queue = PendingQueue::new();
        queue.enqueue(task(0, KernelId::Kmp, 1, 1));
        queue.enqueue(task(1, KernelId::Knn, 4, 1));

        let mut policy = Csa::new(4);
        let context = ctx(Some(&oracle), 4);

        let first = policy
            .pick(&mut queue, &context)
            .expect("csa")
            .expect("eligible");
        assert_eq!(first.kernel, KernelId::Kmp);
        assert_eq!(first.cu, 2);

        let second = policy
            .pick(&mut queue, &context)
            .expect("csa")
            .expect("eligible");
        assert_eq!(second.kernel, KernelId::Knn);
        assert_eq!(second.cu, 1);

        // Both dispatches came from one oracle round-trip.
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn csa_phase_crossing_invalidates_the_cache() {
        let calls = Arc::new(Mutex::new(0u32));
        let calls_in_oracle = Arc::clone(&calls);
        let oracle = shared(ScriptedOracle::new().with_schedule(move |_| {
            *calls_in_oracle.lock() += 1;
            let mut decision = ScheduleDecision::default();
            decision.cu[KernelId::Kmp.index()] = 1;
            decision.cu[KernelId::Knn.index()] = 1;
            decision
        }));
        let mut queue = PendingQueue::new();
        queue.enqueue(task(0, KernelId::Kmp, 1, 1));
        queue.enqueue(task(1, KernelId::Knn, 1, 1));

        let mut policy = Csa::new(4);
        let context = ctx(Some(&oracle), 4);
        let _ = policy.pick(&mut queue, &context).expect("csa");
        assert_eq!(*calls.lock(), 1);

        // A training phase passed: the cached Knn advice must be dropped and
        // a fresh query issued.
        let mut crossed = ctx(Some(&oracle), 4);
        crossed.train_epoch = 1;
        let picked = policy
            .pick(&mut queue, &crossed)
            .expect("csa")
            .expect("eligible");
        assert_eq!(picked.kernel, KernelId::Knn);
        assert_eq!(*calls.lock(), 2);
    }

    #[test]
    fn csa_without_candidates_returns_none() {
        let oracle = shared(ScriptedOracle::new());
        let mut queue = PendingQueue::new();
        let mut policy = Csa::new(4);
        assert!(policy
            .pick(&mut queue, &ctx(Some(&oracle), 4))
            .expect("csa")
            .is_none());
    }
}
