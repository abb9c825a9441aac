// SPDX-License-Identifier: Apache-2.0

//! Client side of the external learning oracle.
//!
//! The oracle is an opaque external process reachable over two local stream
//! sockets: a *training* channel carrying observation-batch commands and a
//! *prediction* channel carrying one-shot inferences and scheduling queries.
//! Every request is followed by exactly one response of a known size; all
//! multibyte fields are little-endian and naturally aligned.
//!
//! The [`ModelOracle`] trait is the seam consumed by the scheduler and the
//! monitor; [`client::OracleClient`] implements it over sockets and
//! `testing::ScriptedOracle` implements it in memory for tests.

use crate::error::Error;
use crate::wire::{Features, Metrics, Prediction, ScheduleDecision};

pub mod client;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod wire;

/// Interface to the external learner.
///
/// Implementations are expected to be driven from behind a lock; methods take
/// `&mut self` because each call is a blocking request/response round-trip.
pub trait ModelOracle: Send {
    /// Signals that a training period's worth of observations is available
    /// and returns the advised number of observations to idle through.
    fn operate(&mut self, observations: u32) -> Result<i32, Error>;

    /// Commands an explicit training pass and returns the model error metrics.
    fn train(&mut self, observations: u32) -> Result<Metrics, Error>;

    /// Commands an explicit test pass and returns the model error metrics.
    fn test(&mut self, observations: u32) -> Result<Metrics, Error>;

    /// Marks the boundary between two workloads. No response is expected.
    fn workload_boundary(&mut self) -> Result<(), Error>;

    /// Requests a power/time prediction for one observation.
    fn predict(&mut self, features: &Features) -> Result<Prediction, Error>;

    /// Requests a per-kernel compute-unit recommendation.
    fn schedule(&mut self, features: &Features) -> Result<ScheduleDecision, Error>;

    /// Notifies both channels that the manager is shutting down.
    fn shutdown(&mut self) -> Result<(), Error>;
}
