// SPDX-License-Identifier: Apache-2.0

//! Errors for the oracle client.
//!
//! Any socket failure during operation is fatal to the run; the top-level
//! loop converts these into a process-wide exit so the external behavior of
//! the manager is preserved.

use std::fmt;
use std::path::PathBuf;

/// The logical oracle channel on which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// The observation-batch / training channel.
    Training,
    /// The inference / scheduling channel.
    Prediction,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Channel::Training => "training",
            Channel::Prediction => "prediction",
        };
        write!(f, "{label}")
    }
}

/// All errors that can occur talking to the oracle.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Establishing a channel connection failed.
    #[error("could not connect the {channel} channel at `{path}`: {source}")]
    Connect {
        /// The channel being connected.
        channel: Channel,
        /// The socket path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A request could not be written in full.
    #[error("short write on the {channel} channel: {source}")]
    Send {
        /// The channel being written.
        channel: Channel,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A response could not be read in full.
    #[error("short read on the {channel} channel: {source}")]
    Recv {
        /// The channel being read.
        channel: Channel,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A decoded frame had an impossible shape.
    #[error("malformed {what} frame: {reason}")]
    MalformedFrame {
        /// The frame kind being decoded.
        what: &'static str,
        /// Why decoding failed.
        reason: String,
    },
}
