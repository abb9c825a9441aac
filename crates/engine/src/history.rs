// SPDX-License-Identifier: Apache-2.0

//! The historical log: append-only store of dispatched tasks.
//!
//! The log is the single owner of task records; the worker pool and the
//! per-slot online-event queues hold reference-counted handles into it. On
//! shutdown the records are dumped in arrival order as fixed little-endian
//! records.

use crate::error::Error;
use crate::task::{SlotMask, TaskRecord};
use crate::time::{TIMESPEC_LEN, TimePoint};
use awm_config::KernelId;
use parking_lot::Mutex;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Size in bytes of one dumped task record: six timespecs plus the id,
/// kernel, execution-count, inter-arrival, compute-unit and slot-mask words.
pub const RECORD_LEN: usize = 6 * TIMESPEC_LEN + 4 + 4 + 4 + 8 + 4 + 4;

/// Append-only log of dispatched tasks.
#[derive(Debug, Default)]
pub struct HistoricalLog {
    records: Mutex<Vec<Arc<TaskRecord>>>,
}

impl HistoricalLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a frozen record and returns the shared handle.
    pub fn append(&self, record: TaskRecord) -> Arc<TaskRecord> {
        let record = Arc::new(record);
        self.records.lock().push(Arc::clone(&record));
        record
    }

    /// Number of records logged so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether nothing has been dispatched yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Copies the current handles, in arrival order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<TaskRecord>> {
        self.records.lock().clone()
    }

    /// Writes all records to `path` as a concatenation of fixed records.
    pub fn dump_to_file(&self, path: &Path) -> Result<usize, Error> {
        let records = self.snapshot();
        let mut file = std::fs::File::create(path).map_err(|source| Error::Dump {
            path: path.to_path_buf(),
            source,
        })?;
        let mut written = 0;
        for record in &records {
            let bytes = encode_record(record);
            file.write_all(&bytes).map_err(|source| Error::Dump {
                path: path.to_path_buf(),
                source,
            })?;
            written += bytes.len();
        }
        Ok(written)
    }
}

/// Encodes one task record in the dump layout.
#[must_use]
pub fn encode_record(record: &TaskRecord) -> [u8; RECORD_LEN] {
    let mut buf = [0u8; RECORD_LEN];
    let mut at = 0;
    let mut put = |bytes: &[u8]| {
        buf[at..at + bytes.len()].copy_from_slice(bytes);
        at += bytes.len();
    };
    put(&record.epoch.encode_timespec());
    put(&(record.id as i32).to_le_bytes());
    put(&record.kernel.to_wire().to_le_bytes());
    put(&(record.num_executions as i32).to_le_bytes());
    put(&record.inter_arrival_ms.to_le_bytes());
    put(&record.commanded_arrival.encode_timespec());
    put(&record.measured_arrival.get().encode_timespec());
    put(&record.measured_finish.get().encode_timespec());
    put(&record.pre_execution.get().encode_timespec());
    put(&record.post_execution.get().encode_timespec());
    put(&(record.cu as i32).to_le_bytes());
    put(&(record.slot_mask.bits() as i32).to_le_bytes());
    debug_assert_eq!(at, RECORD_LEN);
    buf
}

/// A decoded dump record, used by offline tooling and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct DumpedRecord {
    /// Base epoch the arrival series was computed from.
    pub epoch: TimePoint,
    /// Ordinal id within the workload.
    pub id: i32,
    /// Kernel that ran.
    pub kernel: KernelId,
    /// Repeated executions per dispatch.
    pub num_executions: i32,
    /// Planned inter-arrival delay, in milliseconds.
    pub inter_arrival_ms: i64,
    /// Commanded arrival instant.
    pub commanded_arrival: TimePoint,
    /// Measured accelerator start.
    pub measured_arrival: TimePoint,
    /// Measured accelerator finish.
    pub measured_finish: TimePoint,
    /// Worker pick-up instant.
    pub pre_execution: TimePoint,
    /// Worker completion instant.
    pub post_execution: TimePoint,
    /// Granted compute units.
    pub cu: i32,
    /// Occupied slot bitmap.
    pub slot_mask: SlotMask,
}

/// Decodes one dump record.
pub fn decode_record(buf: &[u8; RECORD_LEN]) -> Result<DumpedRecord, awm_config::error::Error> {
    let i32_at = |at: usize| i32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
    let timespec_at = |at: usize| {
        let mut bytes = [0u8; TIMESPEC_LEN];
        bytes.copy_from_slice(&buf[at..at + TIMESPEC_LEN]);
        TimePoint::decode_timespec(&bytes)
    };
    let kernel = KernelId::from_wire(i32_at(20))?;
    let inter_arrival_ms = i64::from_le_bytes([
        buf[28], buf[29], buf[30], buf[31], buf[32], buf[33], buf[34], buf[35],
    ]);
    Ok(DumpedRecord {
        epoch: timespec_at(0),
        id: i32_at(16),
        kernel,
        num_executions: i32_at(24),
        inter_arrival_ms,
        commanded_arrival: timespec_at(36),
        measured_arrival: timespec_at(52),
        measured_finish: timespec_at(68),
        pre_execution: timespec_at(84),
        post_execution: timespec_at(100),
        cu: i32_at(116),
        slot_mask: SlotMask::from_bits(i32_at(120) as u32),
    })
}
