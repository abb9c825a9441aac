// SPDX-License-Identifier: Apache-2.0

//! Errors for the telemetry side.

use std::path::PathBuf;

/// All errors that can occur while monitoring.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The telemetry probe failed.
    #[error("telemetry probe {op} failed: {detail}")]
    Probe {
        /// The failing operation.
        op: &'static str,
        /// Driver-provided detail.
        detail: String,
    },

    /// A file-backed sink failed.
    #[error("trace sink I/O on `{path}`: {source}")]
    SinkIo {
        /// The file or map involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The TCP sink failed.
    #[error("trace sink socket `{addr}`: {source}")]
    SinkSocket {
        /// The remote endpoint.
        addr: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A window payload does not fit its shared-memory segment.
    #[error("window payload of {len} bytes exceeds the {capacity}-byte segment of `{path}`")]
    SegmentOverflow {
        /// The file backing the map.
        path: PathBuf,
        /// Bytes that were offered.
        len: usize,
        /// Usable bytes per segment.
        capacity: usize,
    },

    /// An observation byte stream had an impossible shape.
    #[error("malformed observation stream: {reason}")]
    MalformedObservation {
        /// Why decoding failed.
        reason: String,
    },

    /// Reading `/proc/stat` failed.
    #[error("could not sample CPU usage: {reason}")]
    CpuSample {
        /// Why sampling failed.
        reason: String,
    },

    /// An oracle round-trip failed during a phase transition.
    #[error(transparent)]
    Oracle(#[from] awm_oracle::error::Error),
}
