// SPDX-License-Identifier: Apache-2.0

//! Errors for configuration and workload-plan loading.

use std::path::PathBuf;

/// All errors that can occur while loading configuration or workload plans.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A configuration or plan file could not be read.
    #[error("could not read `{path}`: {source}")]
    Io {
        /// The file that failed to read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON or has the wrong shape.
    #[error("invalid configuration in `{path}`: {source}")]
    InvalidConfig {
        /// The offending configuration file.
        path: PathBuf,
        /// The deserialization error.
        source: serde_json::Error,
    },

    /// A configuration value is out of its accepted range.
    #[error("invalid setting `{setting}`: {reason}")]
    InvalidSetting {
        /// Name of the offending setting.
        setting: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A plan file holds a byte count that is not a multiple of its record size.
    #[error("plan file `{path}` is truncated: {len} bytes is not a multiple of {record}")]
    TruncatedPlanFile {
        /// The offending plan file.
        path: PathBuf,
        /// Observed file length.
        len: u64,
        /// Expected record size in bytes.
        record: u64,
    },

    /// The three parallel plan files disagree on entry count.
    #[error(
        "plan files disagree on length: {inter_arrival} inter-arrivals, \
         {kernels} kernel ids, {executions} execution counts"
    )]
    PlanLengthMismatch {
        /// Entries in the inter-arrival file.
        inter_arrival: usize,
        /// Entries in the kernel-identifier file.
        kernels: usize,
        /// Entries in the execution-count file.
        executions: usize,
    },

    /// A kernel identifier in a plan is outside the known range.
    #[error("unknown kernel identifier {value}")]
    UnknownKernel {
        /// The offending wire value.
        value: i32,
    },

    /// An execution count in a plan is not positive.
    #[error("plan entry #{index} has non-positive execution count {value}")]
    InvalidExecutionCount {
        /// Position of the offending entry.
        index: usize,
        /// The offending value.
        value: i32,
    },
}
