// SPDX-License-Identifier: Apache-2.0

//! Observation records and window classification.
//!
//! One observation is emitted per monitor window. Its wire layout, all
//! little-endian: CPU `f32 user, f32 kernel, f32 idle`; window
//! `timespec start, timespec end`; `i32 n_slots`; then per slot any number
//! of `{i32 1, i32 kernel_id, timespec arrival, timespec finish}` entries
//! terminated by `i32 0`.

use crate::error::Error;
use awm_config::KernelId;
use awm_engine::cpu::CpuUsage;
use awm_engine::online::OnlineEventQueues;
use awm_engine::time::{TIMESPEC_LEN, TimePoint};

/// One kernel's activity overlapping a window on one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelEvent {
    /// The kernel that ran.
    pub kernel: KernelId,
    /// Measured accelerator start (the sentinel when not yet started).
    pub arrival: TimePoint,
    /// Measured accelerator finish (the sentinel when still running).
    pub finish: TimePoint,
}

/// The packaged record emitted at the end of a window.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// CPU usage snapshot taken at window start.
    pub cpu: CpuUsage,
    /// Window start.
    pub start: TimePoint,
    /// Window end.
    pub end: TimePoint,
    /// Per-slot ordered kernel timelines.
    pub slots: Vec<Vec<KernelEvent>>,
}

impl Observation {
    /// Encodes the record.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&self.cpu.user.to_le_bytes());
        buf.extend_from_slice(&self.cpu.kernel.to_le_bytes());
        buf.extend_from_slice(&self.cpu.idle.to_le_bytes());
        buf.extend_from_slice(&self.start.encode_timespec());
        buf.extend_from_slice(&self.end.encode_timespec());
        buf.extend_from_slice(&(self.slots.len() as i32).to_le_bytes());
        for events in &self.slots {
            for event in events {
                buf.extend_from_slice(&1i32.to_le_bytes());
                buf.extend_from_slice(&event.kernel.to_wire().to_le_bytes());
                buf.extend_from_slice(&event.arrival.encode_timespec());
                buf.extend_from_slice(&event.finish.encode_timespec());
            }
            buf.extend_from_slice(&0i32.to_le_bytes());
        }
        buf
    }

    /// Decodes a record previously produced by [`Observation::encode`].
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let mut cursor = Cursor { buf, at: 0 };
        let user = cursor.f32()?;
        let kernel = cursor.f32()?;
        let idle = cursor.f32()?;
        let start = cursor.timespec()?;
        let end = cursor.timespec()?;
        let n_slots = cursor.i32()?;
        if n_slots < 0 {
            return Err(Error::MalformedObservation {
                reason: format!("negative slot count {n_slots}"),
            });
        }
        let mut slots = Vec::with_capacity(n_slots as usize);
        for _ in 0..n_slots {
            let mut events = Vec::new();
            loop {
                match cursor.i32()? {
                    0 => break,
                    1 => {
                        let kernel = KernelId::from_wire(cursor.i32()?).map_err(|err| {
                            Error::MalformedObservation {
                                reason: err.to_string(),
                            }
                        })?;
                        events.push(KernelEvent {
                            kernel,
                            arrival: cursor.timespec()?,
                            finish: cursor.timespec()?,
                        });
                    }
                    mark => {
                        return Err(Error::MalformedObservation {
                            reason: format!("unexpected record mark {mark}"),
                        });
                    }
                }
            }
            slots.push(events);
        }
        if cursor.at != buf.len() {
            return Err(Error::MalformedObservation {
                reason: format!("{} trailing bytes", buf.len() - cursor.at),
            });
        }
        Ok(Self {
            cpu: CpuUsage { user, kernel, idle },
            start,
            end,
            slots,
        })
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    at: usize,
}

impl Cursor<'_> {
    fn take(&mut self, len: usize) -> Result<&[u8], Error> {
        if self.at + len > self.buf.len() {
            return Err(Error::MalformedObservation {
                reason: "truncated record".into(),
            });
        }
        let slice = &self.buf[self.at..self.at + len];
        self.at += len;
        Ok(slice)
    }

    fn f32(&mut self) -> Result<f32, Error> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32, Error> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn timespec(&mut self) -> Result<TimePoint, Error> {
        let b = self.take(TIMESPEC_LEN)?;
        let mut bytes = [0u8; TIMESPEC_LEN];
        bytes.copy_from_slice(b);
        Ok(TimePoint::decode_timespec(&bytes))
    }
}

/// Builds the per-slot kernel timelines for one window and prunes the
/// online-event queues.
///
/// For every task referenced by a slot queue, with arrival `t0` and finish
/// `tf` (both the +∞ sentinel until measured):
/// - **emit** into the window when `tf > start` and `t0 < end` (overlap);
/// - **keep** in the queue when `tf > end` (still running at window end) or
///   `t0 == tf` (not yet started, both still the sentinel).
///
/// Kept tasks are re-enqueued in their original order. Handles whose record
/// was already dropped are skipped.
#[must_use]
pub fn classify_window(
    online: &OnlineEventQueues,
    start: TimePoint,
    end: TimePoint,
) -> Vec<Vec<KernelEvent>> {
    let mut slots = Vec::with_capacity(online.slot_count());
    for slot in 0..online.slot_count() {
        let drained = online.drain(slot);
        let mut events = Vec::new();
        let mut kept = Vec::new();
        for handle in drained {
            let Some(record) = handle.upgrade() else {
                continue;
            };
            let t0 = record.measured_arrival.get();
            let tf = record.measured_finish.get();
            if tf > start && t0 < end {
                events.push(KernelEvent {
                    kernel: record.kernel,
                    arrival: t0,
                    finish: tf,
                });
            }
            if tf > end || t0 == tf {
                kept.push(handle);
            }
        }
        online.requeue(slot, kept);
        slots.push(events);
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use awm_engine::task::{SlotMask, Task, TaskRecord};
    use std::sync::Arc;

    fn record(kernel: KernelId, mask_bits: u32, window: (u64, u64)) -> Arc<TaskRecord> {
        let task = Task {
            epoch: TimePoint::ZERO,
            id: 0,
            kernel,
            cu: mask_bits.count_ones(),
            inter_arrival_ms: 0,
            commanded_arrival: TimePoint::ZERO,
            num_executions: 1,
        };
        let record = Arc::new(TaskRecord::new(task, SlotMask::from_bits(mask_bits)));
        if window.0 > 0 {
            record.measured_arrival.set(TimePoint::from_millis(window.0));
        }
        if window.1 > 0 {
            record.measured_finish.set(TimePoint::from_millis(window.1));
        }
        record
    }

    #[test]
    fn observation_round_trip() {
        let observation = Observation {
            cpu: CpuUsage {
                user: 10.0,
                kernel: 5.0,
                idle: 85.0,
            },
            start: TimePoint::from_millis(150),
            end: TimePoint::from_millis(350),
            slots: vec![
                vec![
                    KernelEvent {
                        kernel: KernelId::Bulk,
                        arrival: TimePoint::from_millis(100),
                        finish: TimePoint::from_millis(500),
                    },
                    KernelEvent {
                        kernel: KernelId::Crs,
                        arrival: TimePoint::from_millis(200),
                        finish: TimePoint::INFINITE,
                    },
                ],
                vec![],
                vec![KernelEvent {
                    kernel: KernelId::Aes,
                    arrival: TimePoint::INFINITE,
                    finish: TimePoint::INFINITE,
                }],
            ],
        };
        let bytes = observation.encode();
        let decoded = Observation::decode(&bytes).expect("decode");
        assert_eq!(decoded, observation);
        // Byte-level idempotence, not just structural equality.
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Observation::decode(&[1, 2, 3]).is_err());
        let observation = Observation {
            cpu: CpuUsage::default(),
            start: TimePoint::ZERO,
            end: TimePoint::ZERO,
            slots: vec![vec![]],
        };
        let mut bytes = observation.encode();
        bytes.push(0);
        assert!(Observation::decode(&bytes).is_err());
    }

    #[test]
    fn overlapping_tasks_are_emitted() {
        // BULK runs [100, 500], CRS runs [200, 300]; window is [150, 350]:
        // both overlap and must be reported.
        let online = OnlineEventQueues::new(2);
        let bulk = record(KernelId::Bulk, 0b01, (100, 500));
        let crs = record(KernelId::Crs, 0b10, (200, 300));
        online.enqueue(&bulk);
        online.enqueue(&crs);

        let slots = classify_window(
            &online,
            TimePoint::from_millis(150),
            TimePoint::from_millis(350),
        );
        assert_eq!(slots[0].len(), 1);
        assert_eq!(slots[0][0].kernel, KernelId::Bulk);
        assert_eq!(slots[0][0].arrival, TimePoint::from_millis(100));
        assert_eq!(slots[0][0].finish, TimePoint::from_millis(500));
        assert_eq!(slots[1].len(), 1);
        assert_eq!(slots[1][0].kernel, KernelId::Crs);

        // CRS finished inside the window: dropped from its queue. BULK is
        // still running at window end: kept.
        assert_eq!(online.len(0), 1);
        assert_eq!(online.len(1), 0);
    }

    #[test]
    fn long_runner_spans_consecutive_windows() {
        // A task running [100, 900] with windows [150, 350] and [350, 550]
        // is emitted in both and stays queued after the first.
        let online = OnlineEventQueues::new(1);
        let task = record(KernelId::Knn, 0b1, (100, 900));
        online.enqueue(&task);

        let first = classify_window(
            &online,
            TimePoint::from_millis(150),
            TimePoint::from_millis(350),
        );
        assert_eq!(first[0].len(), 1);
        assert_eq!(online.len(0), 1);

        let second = classify_window(
            &online,
            TimePoint::from_millis(350),
            TimePoint::from_millis(550),
        );
        assert_eq!(second[0].len(), 1);
        assert_eq!(online.len(0), 1);
    }

    #[test]
    fn unstarted_task_is_kept_but_not_emitted() {
        // Both timestamps still the sentinel: outside every window's emit
        // rule (t0 < end fails) but kept for the future.
        let online = OnlineEventQueues::new(1);
        let task = record(KernelId::Nw, 0b1, (0, 0));
        online.enqueue(&task);

        let slots = classify_window(
            &online,
            TimePoint::from_millis(150),
            TimePoint::from_millis(350),
        );
        assert!(slots[0].is_empty());
        assert_eq!(online.len(0), 1);
    }

    #[test]
    fn started_unfinished_task_is_emitted_and_kept() {
        let online = OnlineEventQueues::new(1);
        let task = record(KernelId::Strided, 0b1, (200, 0));
        online.enqueue(&task);

        let slots = classify_window(
            &online,
            TimePoint::from_millis(150),
            TimePoint::from_millis(350),
        );
        assert_eq!(slots[0].len(), 1);
        assert_eq!(slots[0][0].finish, TimePoint::INFINITE);
        assert_eq!(online.len(0), 1);
    }

    #[test]
    fn multi_slot_task_is_emitted_once_per_occupied_slot() {
        let online = OnlineEventQueues::new(4);
        let task = record(KernelId::Merge, 0b0110, (100, 400));
        online.enqueue(&task);

        let slots = classify_window(
            &online,
            TimePoint::from_millis(150),
            TimePoint::from_millis(350),
        );
        assert!(slots[0].is_empty());
        assert_eq!(slots[1].len(), 1);
        assert_eq!(slots[2].len(), 1);
        assert!(slots[3].is_empty());
    }
}
