// SPDX-License-Identifier: Apache-2.0

//! Self-adaptive workload manager.
//!
//! Wires the roles together: the arrival generator replaying workload
//! plans, the queue manager dispatching onto the slot fabric through the
//! worker pool, the monitor collecting telemetry and driving the
//! EXECUTE/TRAIN phase machine, and the CPU usage sampler. Exits 0 on
//! normal completion and 1 on any fatal error.

use awm_config::settings::SetupConfig;
use awm_engine::accel::SimAccelerator;
use awm_engine::arrival::ArrivalGenerator;
use awm_engine::manager::QueueManager;
use awm_engine::{Core, SharedOracle};
use awm_oracle::ModelOracle;
use awm_oracle::client::OracleClient;
use awm_config::workload::WorkloadPlan;
use awm_telemetry::monitor::Monitor;
use awm_telemetry::probe::SyntheticProbe;
use awm_telemetry::sink::SinkSet;
use clap::Parser;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{error, info};

/// Directory the RAM-backed trace maps are created in.
const SHM_DIR: &str = "/dev/shm";

#[derive(Debug, Parser)]
#[command(name = "awm", about = "Self-adaptive workload manager for reconfigurable accelerators")]
struct Cli {
    /// Number of workloads to run, or `info` to print the configured
    /// parameters and exit.
    workloads: String,

    /// Path of a JSON configuration overlaying the defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match cli.config.as_deref().map_or_else(
        || Ok(SetupConfig::default()),
        SetupConfig::from_json_file,
    ) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    print_parameters(&config);

    if cli.workloads == "info" {
        return ExitCode::SUCCESS;
    }
    let num_workloads: usize = match cli.workloads.parse() {
        Ok(n) if n > 0 => n,
        _ => {
            error!(argument = %cli.workloads, "expected a positive workload count or `info`");
            return ExitCode::FAILURE;
        }
    };

    match run(config, num_workloads) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "fatal");
            ExitCode::FAILURE
        }
    }
}

/// Any error that aborts the run.
#[derive(thiserror::Error, Debug)]
enum FatalError {
    #[error(transparent)]
    Config(#[from] awm_config::error::Error),
    #[error(transparent)]
    Engine(#[from] awm_engine::error::Error),
    #[error(transparent)]
    Oracle(#[from] awm_oracle::error::Error),
    #[error(transparent)]
    Telemetry(#[from] awm_telemetry::error::Error),
    #[error("the {role} thread panicked")]
    ThreadPanic { role: &'static str },
}

fn run(config: SetupConfig, num_workloads: usize) -> Result<(), FatalError> {
    config.validate()?;

    // Load every plan up front; a missing file should abort before any
    // thread starts.
    let mut plans = Vec::with_capacity(num_workloads);
    for index in 0..num_workloads {
        let plan = WorkloadPlan::load(&config.workload_dir, index)?;
        info!(workload = index, arrivals = plan.len(), "workload plan loaded");
        plans.push(plan);
    }
    let plan_lengths: Vec<usize> = plans.iter().map(WorkloadPlan::len).collect();

    let oracle: Option<SharedOracle> = if config.oracle.enabled {
        let ram_measurements = config
            .sinks
            .ram
            .then_some(config.monitor.measurements_per_training);
        let client = OracleClient::connect(&config.oracle, config.board, ram_measurements)?;
        Some(Arc::new(Mutex::new(Box::new(client) as Box<dyn ModelOracle>)))
    } else {
        None
    };

    let sinks = SinkSet::from_settings(
        &config.sinks,
        config.monitor.measurements_per_training,
        Path::new(SHM_DIR),
    )?;
    let probe = SyntheticProbe::new(config.monitor.power_samples, config.monitor.traces_samples);
    let output_dir = config.sinks.output_dir.clone();
    std::fs::create_dir_all(&output_dir).map_err(|source| {
        FatalError::Config(awm_config::error::Error::Io {
            path: output_dir.clone(),
            source,
        })
    })?;

    let core = Core::new(config, Arc::new(SimAccelerator::new(1.0)), oracle);

    let monitor = Monitor::new(
        Arc::clone(&core),
        Box::new(probe),
        sinks,
    );
    let monitor_thread = std::thread::Builder::new()
        .name("awm-monitor".into())
        .spawn(move || monitor.run())
        .expect("spawning the monitor thread");

    let sampler_core = Arc::clone(&core);
    let sampler_thread = std::thread::Builder::new()
        .name("awm-cpu-usage".into())
        .spawn(move || awm_telemetry::cpu::run_sampler(&sampler_core))
        .expect("spawning the cpu sampler thread");

    let manager = QueueManager::new(Arc::clone(&core));
    let manager_thread = std::thread::Builder::new()
        .name("awm-queue-manager".into())
        .spawn(move || manager.run(&plan_lengths))
        .expect("spawning the queue manager thread");

    // The arrival generator runs on the main thread.
    ArrivalGenerator::new(Arc::clone(&core), plans).run()?;

    manager_thread
        .join()
        .map_err(|_| FatalError::ThreadPanic {
            role: "queue manager",
        })??;

    // All workloads drained: stop the telemetry side and notify the oracle.
    if let Some(oracle) = &core.oracle {
        oracle.lock().shutdown()?;
    }
    core.request_monitor_stop();
    monitor_thread
        .join()
        .map_err(|_| FatalError::ThreadPanic { role: "monitor" })??;
    sampler_thread
        .join()
        .map_err(|_| FatalError::ThreadPanic { role: "cpu sampler" })??;

    core.pool.shutdown();

    let dump_path = output_dir.join("kernels_info.bin");
    let written = core.history.dump_to_file(&dump_path)?;
    let records = core.history.snapshot();
    let passed = records
        .iter()
        .filter(|r| r.passed.load(Ordering::Acquire))
        .count();
    info!(
        tasks = records.len(),
        passed,
        failed = records.len() - passed,
        dump = %dump_path.display(),
        bytes = written,
        "run complete"
    );
    Ok(())
}

/// Prints the aligned parameter banner.
#[allow(clippy::print_stdout)]
fn print_parameters(config: &SetupConfig) {
    let rows: Vec<(&str, String)> = vec![
        ("Board class", format!("{:?}", config.board)),
        ("Number of slots", config.slots.to_string()),
        ("Types of kernels", awm_config::KERNEL_KINDS.to_string()),
        ("Scheduling policy", format!("{:?}", config.policy)),
        ("Policy scan depth", config.policy_scan_depth.to_string()),
        ("Online modeling", config.oracle.enabled.to_string()),
        ("Monitoring period in ms", config.monitor.period_ms.to_string()),
        (
            "Measurements per training",
            config.monitor.measurements_per_training.to_string(),
        ),
        (
            "Idle observations per window",
            format!("{:.2}", config.monitor.idle_obs_per_window),
        ),
        ("Power samples", config.monitor.power_samples.to_string()),
        ("Traces samples", config.monitor.traces_samples.to_string()),
        (
            "CPU usage period in ms",
            config.monitor.cpu_usage_period_ms.to_string(),
        ),
        ("Traces on RAM", config.sinks.ram.to_string()),
        ("Traces on ROM", config.sinks.file.to_string()),
        ("Traces over socket", config.sinks.socket.to_string()),
        ("Workload directory", config.workload_dir.display().to_string()),
    ];
    let width = rows.iter().map(|(name, _)| name.len()).max().unwrap_or(0);

    println!();
    println!("{}", "-".repeat(width + 13));
    for (name, value) in &rows {
        println!(" {name:<width$} : {value:>8}");
    }
    println!("{}", "-".repeat(width + 13));
    println!();
}
