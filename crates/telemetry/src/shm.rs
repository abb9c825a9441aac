// SPDX-License-Identifier: Apache-2.0

//! RAM-backed segmented buffers.
//!
//! When the RAM sink is enabled, each training period's windows land in
//! per-window segments of a file-backed memory map that a downstream process
//! reads concurrently. The last four bytes of every segment carry the byte
//! count actually written. With one measurement per training the layout
//! degenerates to a classic two-segment ping-pong.

use crate::error::Error;
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Conventional segment size for power sample buffers.
pub const POWER_SEGMENT_SIZE: usize = 525 * 1024;
/// Conventional segment size for trace event buffers.
pub const TRACES_SEGMENT_SIZE: usize = 20 * 1024;
/// Conventional segment size for observation buffers.
pub const ONLINE_SEGMENT_SIZE: usize = 2 * 1024;

/// A file-backed map divided into equally sized segments.
#[derive(Debug)]
pub struct SegmentedBuffer {
    map: MmapMut,
    path: PathBuf,
    segment_size: usize,
    segments: usize,
    current: usize,
}

impl SegmentedBuffer {
    /// Creates (or truncates) the backing file and maps it shared.
    pub fn create(path: &Path, segment_size: usize, segments: usize) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| Error::SinkIo {
                path: path.to_path_buf(),
                source,
            })?;
        file.set_len((segment_size * segments) as u64)
            .map_err(|source| Error::SinkIo {
                path: path.to_path_buf(),
                source,
            })?;
        // SAFETY: the map is backed by a freshly truncated file of exactly
        // the mapped length, owned for the lifetime of this value, and the
        // downstream reader side only ever reads.
        #[allow(unsafe_code)]
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(|source| Error::SinkIo {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            map,
            path: path.to_path_buf(),
            segment_size,
            segments,
            current: 0,
        })
    }

    /// Usable bytes per segment (the trailing word holds the byte count).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.segment_size - 4
    }

    /// Index of the segment the next write lands in.
    #[must_use]
    pub fn current_segment(&self) -> usize {
        self.current
    }

    /// Writes `bytes` into the current segment and stamps the trailing
    /// byte-count word.
    pub fn write_segment(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if bytes.len() > self.capacity() {
            return Err(Error::SegmentOverflow {
                path: self.path.clone(),
                len: bytes.len(),
                capacity: self.capacity(),
            });
        }
        let base = self.current * self.segment_size;
        self.map[base..base + bytes.len()].copy_from_slice(bytes);
        let count_at = base + self.segment_size - 4;
        self.map[count_at..count_at + 4].copy_from_slice(&(bytes.len() as i32).to_le_bytes());
        Ok(())
    }

    /// Advances to the next segment, wrapping at the training-period length.
    pub fn toggle(&mut self) {
        self.current = (self.current + 1) % self.segments;
    }

    /// Flushes the map to its backing file.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.map.flush().map_err(|source| Error::SinkIo {
            path: self.path.clone(),
            source,
        })
    }

    /// Reads back a whole segment. Test and tooling helper.
    #[must_use]
    pub fn segment(&self, index: usize) -> &[u8] {
        let base = index * self.segment_size;
        &self.map[base..base + self.segment_size]
    }
}
