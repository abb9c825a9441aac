// SPDX-License-Identifier: Apache-2.0

//! Errors for the dispatch engine.

use awm_config::KernelId;
use std::path::PathBuf;

/// All errors that can occur in the dispatch engine.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The worker-pool dispatch channel was full.
    ///
    /// The pool is sized to the service population, so this indicates a
    /// sizing bug and is treated as fatal.
    #[error("worker pool dispatch channel full while submitting task #{task}")]
    DispatchFull {
        /// Ordinal id of the task that could not be submitted.
        task: u64,
    },

    /// An accelerator control operation failed.
    #[error("accelerator {op} failed for kernel {kernel}: {detail}")]
    Accelerator {
        /// The kernel being driven.
        kernel: KernelId,
        /// The failing operation (load, allocate, execute, wait, free, unload).
        op: &'static str,
        /// Driver-provided detail.
        detail: String,
    },

    /// An oracle round-trip failed.
    #[error(transparent)]
    Oracle(#[from] awm_oracle::error::Error),

    /// Writing the historical dump failed.
    #[error("could not write historical dump `{path}`: {source}")]
    Dump {
        /// The dump file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
