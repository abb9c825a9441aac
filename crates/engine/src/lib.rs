// SPDX-License-Identifier: Apache-2.0

//! Dispatch engine for the self-adaptive workload manager.
//!
//! The engine owns the shared state the concurrent roles coordinate
//! through: the pending queue fed by the arrival generator, the slot and
//! duplication registries consulted by the queue manager, the worker pool
//! that drives the accelerator, the historical log of dispatched tasks and
//! the per-slot online-event queues read by the monitor.
//!
//! Everything is reachable from one [`Core`] value constructed at startup
//! and threaded explicitly into each thread; there are no process-wide
//! singletons.

use awm_oracle::ModelOracle;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub mod accel;
pub mod arrival;
pub mod cpu;
pub mod error;
pub mod history;
pub mod kernels;
pub mod manager;
pub mod online;
pub mod pending;
pub mod policy;
pub mod pool;
pub mod registry;
pub mod service;
pub mod task;
pub mod time;
pub mod worker;

/// Shared handle to the oracle, serialising its request/response channels.
pub type SharedOracle = Arc<Mutex<Box<dyn ModelOracle>>>;

/// Shared state of one manager run.
pub struct Core {
    /// Runtime configuration.
    pub config: awm_config::settings::SetupConfig,
    /// Process-wide monotonic origin.
    pub timebase: time::Timebase,
    /// Base epoch of the arrival series, two seconds after start.
    pub epoch: time::TimePoint,
    /// Tasks waiting for dispatch.
    pub pending: Mutex<pending::PendingQueue>,
    /// Slot occupancy bitmap.
    pub slots: registry::SlotRegistry,
    /// In-flight tasks per kernel identifier.
    pub duplication: registry::DuplicationRegistry,
    /// Dispatch-coordination state and phase.
    pub service: service::ServiceState,
    /// Append-only log of dispatched tasks.
    pub history: history::HistoricalLog,
    /// Per-slot queues feeding the monitor's window classification.
    pub online: online::OnlineEventQueues,
    /// The worker pool.
    pub pool: pool::WorkerPool,
    /// Accelerator control library.
    pub accelerator: Arc<dyn accel::AcceleratorControl>,
    /// Preloaded kernel inputs and references.
    pub dataset: kernels::KernelDataset,
    /// Latest CPU usage sample.
    pub cpu: cpu::CpuGauge,
    /// The external learner, when attached.
    pub oracle: Option<SharedOracle>,
    /// Set after the last workload; the monitor finishes its window and exits.
    monitor_stop: AtomicBool,
}

impl Core {
    /// Builds the shared state for one run. The arrival epoch lands two
    /// seconds after start, leaving room for preprocessing.
    #[must_use]
    pub fn new(
        config: awm_config::settings::SetupConfig,
        accelerator: Arc<dyn accel::AcceleratorControl>,
        oracle: Option<SharedOracle>,
    ) -> Arc<Self> {
        Self::with_start_delay(config, accelerator, oracle, 2000)
    }

    /// [`Core::new`] with an explicit start delay; tests shrink it.
    #[must_use]
    pub fn with_start_delay(
        config: awm_config::settings::SetupConfig,
        accelerator: Arc<dyn accel::AcceleratorControl>,
        oracle: Option<SharedOracle>,
        start_delay_ms: u64,
    ) -> Arc<Self> {
        let slots = config.slots;
        let timebase = time::Timebase::new();
        let epoch = timebase.now().add_millis(start_delay_ms);
        Arc::new(Self {
            timebase,
            epoch,
            pending: Mutex::new(pending::PendingQueue::new()),
            slots: registry::SlotRegistry::new(slots),
            duplication: registry::DuplicationRegistry::new(),
            service: service::ServiceState::new(slots as u32),
            history: history::HistoricalLog::new(),
            online: online::OnlineEventQueues::new(slots),
            pool: pool::WorkerPool::new(slots + 1, slots + 1),
            accelerator,
            dataset: kernels::KernelDataset::generate(),
            cpu: cpu::CpuGauge::new(),
            oracle,
            monitor_stop: AtomicBool::new(false),
            config,
        })
    }

    /// Asks the monitor (and the CPU sampler) to wind down.
    pub fn request_monitor_stop(&self) {
        self.monitor_stop.store(true, Ordering::Release);
    }

    /// Whether monitor shutdown was requested.
    #[must_use]
    pub fn monitor_stop_requested(&self) -> bool {
        self.monitor_stop.load(Ordering::Acquire)
    }
}
