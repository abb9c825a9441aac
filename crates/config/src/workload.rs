// SPDX-License-Identifier: Apache-2.0

//! Workload plans.
//!
//! A plan is stored as three parallel binary files, positional and of equal
//! length: `inter_arrival_<i>.bin` (little-endian `f32` milliseconds),
//! `kernel_id_<i>.bin` (little-endian `i32`) and `num_executions_<i>.bin`
//! (little-endian `i32`).

use crate::{KernelId, error::Error};
use std::path::{Path, PathBuf};

/// One entry of a workload plan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanEntry {
    /// Delay after the previous arrival, in milliseconds.
    pub inter_arrival_ms: f32,
    /// Kernel to run.
    pub kernel: KernelId,
    /// Number of repeated executions the accelerator performs per dispatch.
    pub num_executions: u32,
}

/// An ordered, finite, non-restartable sequence of arrivals.
#[derive(Debug, Clone)]
pub struct WorkloadPlan {
    entries: Vec<PlanEntry>,
}

impl WorkloadPlan {
    /// Builds a plan from in-memory entries. Used by tests and synthetic runs.
    #[must_use]
    pub fn from_entries(entries: Vec<PlanEntry>) -> Self {
        Self { entries }
    }

    /// Loads workload `index` from the plan file triple under `dir`.
    pub fn load(dir: &Path, index: usize) -> Result<Self, Error> {
        let inter_arrival = read_f32_file(&dir.join(format!("inter_arrival_{index}.bin")))?;
        let kernel_ids = read_i32_file(&dir.join(format!("kernel_id_{index}.bin")))?;
        let executions = read_i32_file(&dir.join(format!("num_executions_{index}.bin")))?;

        if inter_arrival.len() != kernel_ids.len() || kernel_ids.len() != executions.len() {
            return Err(Error::PlanLengthMismatch {
                inter_arrival: inter_arrival.len(),
                kernels: kernel_ids.len(),
                executions: executions.len(),
            });
        }

        let mut entries = Vec::with_capacity(kernel_ids.len());
        for (i, ((&delay, &kernel), &count)) in inter_arrival
            .iter()
            .zip(&kernel_ids)
            .zip(&executions)
            .enumerate()
        {
            if count <= 0 {
                return Err(Error::InvalidExecutionCount {
                    index: i,
                    value: count,
                });
            }
            entries.push(PlanEntry {
                inter_arrival_ms: delay,
                kernel: KernelId::from_wire(kernel)?,
                num_executions: count as u32,
            });
        }
        Ok(Self { entries })
    }

    /// The plan entries, in arrival order.
    #[must_use]
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    /// Number of arrivals in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the plan holds no arrivals.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn read_raw(path: &Path, record: u64) -> Result<Vec<u8>, Error> {
    let bytes = std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.len() as u64 % record != 0 {
        return Err(Error::TruncatedPlanFile {
            path: path.to_path_buf(),
            len: bytes.len() as u64,
            record,
        });
    }
    Ok(bytes)
}

fn read_f32_file(path: &Path) -> Result<Vec<f32>, Error> {
    let bytes = read_raw(path, 4)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn read_i32_file(path: &Path) -> Result<Vec<i32>, Error> {
    let bytes = read_raw(path, 4)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Writes a plan back out as the three-file triple. Test and tooling helper.
pub fn write_plan_files(dir: &Path, index: usize, plan: &WorkloadPlan) -> Result<(), Error> {
    let write = |name: String, bytes: Vec<u8>| -> Result<(), Error> {
        let path: PathBuf = dir.join(name);
        std::fs::write(&path, bytes).map_err(|source| Error::Io { path, source })
    };
    write(
        format!("inter_arrival_{index}.bin"),
        plan.entries
            .iter()
            .flat_map(|e| e.inter_arrival_ms.to_le_bytes())
            .collect(),
    )?;
    write(
        format!("kernel_id_{index}.bin"),
        plan.entries
            .iter()
            .flat_map(|e| e.kernel.to_wire().to_le_bytes())
            .collect(),
    )?;
    write(
        format!("num_executions_{index}.bin"),
        plan.entries
            .iter()
            .flat_map(|e| (e.num_executions as i32).to_le_bytes())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> WorkloadPlan {
        WorkloadPlan::from_entries(vec![
            PlanEntry {
                inter_arrival_ms: 0.0,
                kernel: KernelId::Aes,
                num_executions: 1,
            },
            PlanEntry {
                inter_arrival_ms: 12.5,
                kernel: KernelId::Strided,
                num_executions: 64,
            },
        ])
    }

    #[test]
    fn plan_files_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let plan = sample_plan();
        write_plan_files(dir.path(), 0, &plan).expect("write");
        let loaded = WorkloadPlan::load(dir.path(), 0).expect("load");
        assert_eq!(loaded.entries(), plan.entries());
    }

    #[test]
    fn rejects_length_mismatch() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_plan_files(dir.path(), 0, &sample_plan()).expect("write");
        // Drop one record from the kernel-id file.
        let path = dir.path().join("kernel_id_0.bin");
        let bytes = std::fs::read(&path).expect("read");
        std::fs::write(&path, &bytes[..bytes.len() - 4]).expect("truncate");
        assert!(matches!(
            WorkloadPlan::load(dir.path(), 0),
            Err(Error::PlanLengthMismatch { .. })
        ));
    }

    #[test]
    fn rejects_unaligned_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_plan_files(dir.path(), 0, &sample_plan()).expect("write");
        let path = dir.path().join("inter_arrival_0.bin");
        let mut bytes = std::fs::read(&path).expect("read");
        bytes.push(0);
        std::fs::write(&path, bytes).expect("write");
        assert!(matches!(
            WorkloadPlan::load(dir.path(), 0),
            Err(Error::TruncatedPlanFile { .. })
        ));
    }

    #[test]
    fn rejects_unknown_kernel() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_plan_files(dir.path(), 0, &sample_plan()).expect("write");
        let path = dir.path().join("kernel_id_0.bin");
        let mut bytes = std::fs::read(&path).expect("read");
        bytes[..4].copy_from_slice(&99i32.to_le_bytes());
        std::fs::write(&path, bytes).expect("write");
        assert!(matches!(
            WorkloadPlan::load(dir.path(), 0),
            Err(Error::UnknownKernel { value: 99 })
        ));
    }

    #[test]
    fn rejects_non_positive_executions() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_plan_files(dir.path(), 0, &sample_plan()).expect("write");
        let path = dir.path().join("num_executions_0.bin");
        let mut bytes = std::fs::read(&path).expect("read");
        bytes[..4].copy_from_slice(&0i32.to_le_bytes());
        std::fs::write(&path, bytes).expect("write");
        assert!(matches!(
            WorkloadPlan::load(dir.path(), 0),
            Err(Error::InvalidExecutionCount { index: 0, value: 0 })
        ));
    }
}
