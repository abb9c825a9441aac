// SPDX-License-Identifier: Apache-2.0

//! Configuration model for the workload manager.
//!
//! Data model:
//! - a [`settings::SetupConfig`] describing the slot fabric, the monitor
//!   cadence, the scheduling policy, the oracle endpoints and the trace sinks;
//! - a [`workload::WorkloadPlan`] replayed by the arrival generator.
//!
//! Everything here is plain data: no threads, no sockets, no clocks.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod error;
pub mod settings;
pub mod workload;

/// Number of distinct kernel programs known to the accelerator fabric.
pub const KERNEL_KINDS: usize = 11;

/// Identifier of an accelerator kernel program.
///
/// The discriminants are the on-wire values used by workload plans, the
/// oracle protocol and the observation stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum KernelId {
    /// AES block cipher.
    Aes = 0,
    /// Bulk graph traversal (BFS).
    Bulk = 1,
    /// Sparse matrix-vector product over CRS storage.
    Crs = 2,
    /// Knuth-Morris-Pratt string matching.
    Kmp = 3,
    /// k-nearest-neighbours molecular dynamics kernel.
    Knn = 4,
    /// Merge sort.
    Merge = 5,
    /// Needleman-Wunsch sequence alignment.
    Nw = 6,
    /// Queue-based graph traversal.
    Queue = 7,
    /// 2-D stencil.
    Stencil2d = 8,
    /// 3-D stencil.
    Stencil3d = 9,
    /// Strided FFT.
    Strided = 10,
}

impl KernelId {
    /// All kernel identifiers, in wire order.
    pub const ALL: [KernelId; KERNEL_KINDS] = [
        KernelId::Aes,
        KernelId::Bulk,
        KernelId::Crs,
        KernelId::Kmp,
        KernelId::Knn,
        KernelId::Merge,
        KernelId::Nw,
        KernelId::Queue,
        KernelId::Stencil2d,
        KernelId::Stencil3d,
        KernelId::Strided,
    ];

    /// Decodes a wire value into a kernel identifier.
    pub fn from_wire(value: i32) -> Result<Self, error::Error> {
        usize::try_from(value)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
            .ok_or(error::Error::UnknownKernel { value })
    }

    /// The wire value of this kernel identifier.
    #[must_use]
    pub fn to_wire(self) -> i32 {
        self as i32
    }

    /// Index of this kernel in per-kernel arrays.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Short lowercase name, as used by the accelerator program registry.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            KernelId::Aes => "aes",
            KernelId::Bulk => "bulk",
            KernelId::Crs => "crs",
            KernelId::Kmp => "kmp",
            KernelId::Knn => "knn",
            KernelId::Merge => "merge",
            KernelId::Nw => "nw",
            KernelId::Queue => "queue",
            KernelId::Stencil2d => "stencil2d",
            KernelId::Stencil3d => "stencil3d",
            KernelId::Strided => "strided",
        }
    }
}

impl fmt::Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Board class hosting the slot fabric.
///
/// The class decides the width of the oracle metric/prediction frames (the
/// larger boards report processing-system and programmable-logic power
/// separately) and the default slot count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BoardClass {
    /// Large MPSoC board: two power rails, eight slots.
    Zcu,
    /// Small SoC board: one power rail, four slots.
    #[default]
    Pynq,
}

impl BoardClass {
    /// Number of power figures carried by oracle predictions and metrics.
    #[must_use]
    pub fn power_channels(self) -> usize {
        match self {
            BoardClass::Zcu => 2,
            BoardClass::Pynq => 1,
        }
    }

    /// Default number of reconfigurable slots for the board.
    #[must_use]
    pub fn default_slots(self) -> usize {
        match self {
            BoardClass::Zcu => 8,
            BoardClass::Pynq => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_wire_round_trip() {
        for kernel in KernelId::ALL {
            assert_eq!(KernelId::from_wire(kernel.to_wire()).ok(), Some(kernel));
        }
    }

    #[test]
    fn kernel_wire_rejects_out_of_range() {
        assert!(KernelId::from_wire(-1).is_err());
        assert!(KernelId::from_wire(KERNEL_KINDS as i32).is_err());
    }

    #[test]
    fn board_widths() {
        assert_eq!(BoardClass::Zcu.power_channels(), 2);
        assert_eq!(BoardClass::Pynq.power_channels(), 1);
        assert_eq!(BoardClass::Pynq.default_slots(), 4);
    }
}
