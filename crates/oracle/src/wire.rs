// SPDX-License-Identifier: Apache-2.0

//! Fixed-width little-endian frames exchanged with the oracle.
//!
//! Training channel: one `u32` command per request.
//!   - `0` — shutdown, no reply.
//!   - `0xFFFF_FFFF` — workload boundary marker, no reply.
//!   - top bit set — train with the low 31 bits as observation count,
//!     replied with a [`Metrics`] frame.
//!   - anything else — operate/test with that observation count, replied
//!     with an `i32` idle-observation count (operate) or a [`Metrics`]
//!     frame (test); the caller knows which reply it awaits.
//!
//! Prediction channel: a [`Features`] frame per request. A `main` byte of
//! `0xFF` discriminates scheduling queries (replied with a
//! [`ScheduleDecision`]) from plain predictions (replied with a
//! [`Prediction`]). The channel shutdown message is a single zero byte.

use crate::error::Error;
use awm_config::{BoardClass, KERNEL_KINDS, KernelId};

/// Size in bytes of an encoded [`Features`] frame.
pub const FEATURES_LEN: usize = 12 + 1 + KERNEL_KINDS;

/// Size in bytes of an encoded [`ScheduleDecision`] frame.
pub const DECISION_LEN: usize = KERNEL_KINDS;

/// `main` byte marking a scheduling query.
pub const MAIN_SCHEDULE: u8 = 0xFF;

/// Training-channel command word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingRequest {
    /// Shut the training side down.
    Shutdown,
    /// A workload has ended and another follows.
    WorkloadBoundary,
    /// Process this many observations; top bit clear on the wire.
    Operate(u32),
    /// Train on this many observations; top bit set on the wire.
    Train(u32),
}

impl TrainingRequest {
    const TRAIN_BIT: u32 = 1 << 31;
    const BOUNDARY: u32 = 0xFFFF_FFFF;

    /// Encodes the command as its wire word.
    #[must_use]
    pub fn to_wire(self) -> u32 {
        match self {
            TrainingRequest::Shutdown => 0,
            TrainingRequest::WorkloadBoundary => Self::BOUNDARY,
            TrainingRequest::Operate(n) => n & !Self::TRAIN_BIT,
            TrainingRequest::Train(n) => n | Self::TRAIN_BIT,
        }
    }

    /// Decodes a wire word into a command.
    #[must_use]
    pub fn from_wire(word: u32) -> Self {
        match word {
            0 => TrainingRequest::Shutdown,
            Self::BOUNDARY => TrainingRequest::WorkloadBoundary,
            n if n & Self::TRAIN_BIT != 0 => TrainingRequest::Train(n & !Self::TRAIN_BIT),
            n => TrainingRequest::Operate(n),
        }
    }
}

/// Observation features submitted on the prediction channel.
///
/// The occupancy array carries the in-flight compute-unit count per kernel;
/// scheduling queries additionally mark candidate kernels with `0xFF`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Features {
    /// User CPU share over the last sampling window, in percent.
    pub user: f32,
    /// Kernel CPU share, in percent.
    pub kernel: f32,
    /// Idle CPU share, in percent.
    pub idle: f32,
    /// Wire value of the kernel the prediction is about, or
    /// [`MAIN_SCHEDULE`] for scheduling queries.
    pub main: u8,
    /// Per-kernel occupancy bytes, indexed by [`KernelId::index`].
    pub occupancy: [u8; KERNEL_KINDS],
}

impl Features {
    /// Builds a plain prediction request about `main`.
    #[must_use]
    pub fn prediction(
        cpu: (f32, f32, f32),
        main: KernelId,
        occupancy: [u8; KERNEL_KINDS],
    ) -> Self {
        Self {
            user: cpu.0,
            kernel: cpu.1,
            idle: cpu.2,
            main: main.index() as u8,
            occupancy,
        }
    }

    /// Builds a scheduling query carrying the current occupancy.
    #[must_use]
    pub fn schedule(cpu: (f32, f32, f32), occupancy: [u8; KERNEL_KINDS]) -> Self {
        Self {
            user: cpu.0,
            kernel: cpu.1,
            idle: cpu.2,
            main: MAIN_SCHEDULE,
            occupancy,
        }
    }

    /// Marks `kernel` as a scheduling candidate.
    pub fn mark_candidate(&mut self, kernel: KernelId) {
        self.occupancy[kernel.index()] = 0xFF;
    }

    /// Whether this frame is a scheduling query.
    #[must_use]
    pub fn is_schedule_request(&self) -> bool {
        self.main == MAIN_SCHEDULE
    }

    /// Encodes the frame.
    #[must_use]
    pub fn encode(&self) -> [u8; FEATURES_LEN] {
        let mut buf = [0u8; FEATURES_LEN];
        buf[0..4].copy_from_slice(&self.user.to_le_bytes());
        buf[4..8].copy_from_slice(&self.kernel.to_le_bytes());
        buf[8..12].copy_from_slice(&self.idle.to_le_bytes());
        buf[12] = self.main;
        buf[13..].copy_from_slice(&self.occupancy);
        buf
    }

    /// Decodes a frame.
    #[must_use]
    pub fn decode(buf: &[u8; FEATURES_LEN]) -> Self {
        let mut occupancy = [0u8; KERNEL_KINDS];
        occupancy.copy_from_slice(&buf[13..]);
        Self {
            user: f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            kernel: f32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            idle: f32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            main: buf[12],
            occupancy,
        }
    }
}

/// Power/time prediction returned for one observation.
///
/// The number of power figures depends on the board class: one per rail.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Predicted power per rail, in watts.
    pub power: Vec<f32>,
    /// Predicted wall time for one execution, in milliseconds.
    pub time: f32,
}

impl Prediction {
    /// Encoded size for `board`.
    #[must_use]
    pub fn wire_len(board: BoardClass) -> usize {
        (board.power_channels() + 1) * 4
    }

    /// Encodes the frame. The power vector must match the board width.
    pub fn encode(&self, board: BoardClass) -> Result<Vec<u8>, Error> {
        encode_f32_frame("prediction", &self.power, self.time, board)
    }

    /// Decodes a frame of the width implied by `board`.
    pub fn decode(buf: &[u8], board: BoardClass) -> Result<Self, Error> {
        let (power, tail) = decode_f32_frame("prediction", buf, board)?;
        Ok(Self { power, time: tail })
    }
}

/// Model error metrics returned by train/test commands.
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    /// Power-model error per rail.
    pub power_error: Vec<f32>,
    /// Time-model error.
    pub time_error: f32,
}

impl Metrics {
    /// Encoded size for `board`.
    #[must_use]
    pub fn wire_len(board: BoardClass) -> usize {
        (board.power_channels() + 1) * 4
    }

    /// Encodes the frame. The error vector must match the board width.
    pub fn encode(&self, board: BoardClass) -> Result<Vec<u8>, Error> {
        encode_f32_frame("metrics", &self.power_error, self.time_error, board)
    }

    /// Decodes a frame of the width implied by `board`.
    pub fn decode(buf: &[u8], board: BoardClass) -> Result<Self, Error> {
        let (power_error, time_error) = decode_f32_frame("metrics", buf, board)?;
        Ok(Self {
            power_error,
            time_error,
        })
    }
}

/// Per-kernel compute-unit recommendation returned for a scheduling query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScheduleDecision {
    /// Recommended compute units per kernel, zero meaning "do not run".
    pub cu: [u8; KERNEL_KINDS],
}

impl ScheduleDecision {
    /// The recommended compute-unit count for `kernel`.
    #[must_use]
    pub fn cu_for(&self, kernel: KernelId) -> u8 {
        self.cu[kernel.index()]
    }

    /// Encodes the frame.
    #[must_use]
    pub fn encode(&self) -> [u8; DECISION_LEN] {
        self.cu
    }

    /// Decodes a frame.
    #[must_use]
    pub fn decode(buf: &[u8; DECISION_LEN]) -> Self {
        Self { cu: *buf }
    }
}

fn encode_f32_frame(
    what: &'static str,
    power: &[f32],
    tail: f32,
    board: BoardClass,
) -> Result<Vec<u8>, Error> {
    if power.len() != board.power_channels() {
        return Err(Error::MalformedFrame {
            what,
            reason: format!(
                "{} power figures for a board with {} rails",
                power.len(),
                board.power_channels()
            ),
        });
    }
    let mut buf = Vec::with_capacity((power.len() + 1) * 4);
    for value in power {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf.extend_from_slice(&tail.to_le_bytes());
    Ok(buf)
}

fn decode_f32_frame(
    what: &'static str,
    buf: &[u8],
    board: BoardClass,
) -> Result<(Vec<f32>, f32), Error> {
    let expected = (board.power_channels() + 1) * 4;
    if buf.len() != expected {
        return Err(Error::MalformedFrame {
            what,
            reason: format!("{} bytes, expected {expected}", buf.len()),
        });
    }
    let mut values = buf
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]));
    let power = values.by_ref().take(board.power_channels()).collect();
    let tail = values.next().unwrap_or_default();
    Ok((power, tail))
}
