// SPDX-License-Identifier: Apache-2.0

//! Telemetry side of the workload manager.
//!
//! A dedicated monitor thread runs on a periodic absolute-time schedule.
//! Each tick it arms the telemetry probe, captures power and trace samples,
//! resolves which kernels ran on which slot during the window, and streams
//! the packaged observation to the enabled sinks. Every
//! `measurements_per_training` windows it swings the system through the
//! TRAIN phase and pauses for the oracle-advised idle time.

pub mod cpu;
pub mod error;
pub mod monitor;
pub mod observation;
pub mod probe;
pub mod shm;
pub mod sink;
