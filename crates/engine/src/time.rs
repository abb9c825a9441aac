// SPDX-License-Identifier: Apache-2.0

//! Monotonic time points and the application timebase.
//!
//! All scheduling and telemetry timestamps are nanosecond offsets from one
//! process-wide monotonic origin. The unset sentinel is "+∞": a freshly
//! created task has infinite arrival and finish times, which is what makes
//! the monitor's emit/keep window rule work without extra state.

use std::time::{Duration, Instant};

/// A nanosecond offset from the process timebase origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimePoint(u64);

/// Encoded size of a time point on the wire (`i64` seconds + `i64` nanos).
pub const TIMESPEC_LEN: usize = 16;

impl TimePoint {
    /// The "not yet measured" sentinel.
    pub const INFINITE: TimePoint = TimePoint(u64::MAX);

    /// Origin of the timebase.
    pub const ZERO: TimePoint = TimePoint(0);

    /// Builds a time point from raw nanoseconds.
    #[must_use]
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Builds a time point from milliseconds.
    #[must_use]
    pub fn from_millis(ms: u64) -> Self {
        Self(ms.saturating_mul(1_000_000))
    }

    /// Raw nanoseconds since the origin.
    #[must_use]
    pub fn as_nanos(self) -> u64 {
        self.0
    }

    /// Whether this point carries a real measurement.
    #[must_use]
    pub fn is_set(self) -> bool {
        self != Self::INFINITE
    }

    /// This point advanced by `ms` milliseconds, saturating at the sentinel.
    #[must_use]
    pub fn add_millis(self, ms: u64) -> Self {
        if self.is_set() {
            Self(self.0.saturating_add(ms.saturating_mul(1_000_000)))
        } else {
            self
        }
    }

    /// Signed distance `self − earlier` in nanoseconds.
    #[must_use]
    pub fn since(self, earlier: TimePoint) -> i64 {
        self.0 as i64 - earlier.0 as i64
    }

    /// Encodes the point as a little-endian `timespec` pair.
    ///
    /// The sentinel encodes as `{i64::MAX, i64::MAX}` so downstream readers
    /// see a "way in the future" timestamp, matching the emit/keep rule.
    #[must_use]
    pub fn encode_timespec(self) -> [u8; TIMESPEC_LEN] {
        let (sec, nsec) = if self.is_set() {
            ((self.0 / 1_000_000_000) as i64, (self.0 % 1_000_000_000) as i64)
        } else {
            (i64::MAX, i64::MAX)
        };
        let mut buf = [0u8; TIMESPEC_LEN];
        buf[..8].copy_from_slice(&sec.to_le_bytes());
        buf[8..].copy_from_slice(&nsec.to_le_bytes());
        buf
    }

    /// Decodes a little-endian `timespec` pair.
    #[must_use]
    pub fn decode_timespec(buf: &[u8; TIMESPEC_LEN]) -> Self {
        let sec = i64::from_le_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ]);
        let nsec = i64::from_le_bytes([
            buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
        ]);
        if sec == i64::MAX && nsec == i64::MAX {
            Self::INFINITE
        } else {
            Self((sec as u64).saturating_mul(1_000_000_000).saturating_add(nsec as u64))
        }
    }
}

/// The process-wide monotonic origin.
#[derive(Debug, Clone)]
pub struct Timebase {
    origin: Instant,
}

impl Default for Timebase {
    fn default() -> Self {
        Self::new()
    }
}

impl Timebase {
    /// Starts a timebase at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// The current time point.
    #[must_use]
    pub fn now(&self) -> TimePoint {
        TimePoint(self.origin.elapsed().as_nanos() as u64)
    }

    /// Sleeps until the absolute time point `deadline`.
    ///
    /// Returns immediately when the deadline already passed; the caller
    /// observes the slip through its own measured timestamps.
    pub fn sleep_until(&self, deadline: TimePoint) {
        loop {
            let now = self.now();
            if now >= deadline {
                return;
            }
            std::thread::sleep(Duration::from_nanos(deadline.0 - now.0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timespec_round_trip() {
        for point in [
            TimePoint::ZERO,
            TimePoint::from_millis(1500),
            TimePoint::from_nanos(2_000_000_001),
            TimePoint::INFINITE,
        ] {
            assert_eq!(TimePoint::decode_timespec(&point.encode_timespec()), point);
        }
    }

    #[test]
    fn sentinel_orders_after_everything() {
        assert!(TimePoint::INFINITE > TimePoint::from_millis(u64::MAX / 2_000_000));
        assert!(!TimePoint::INFINITE.is_set());
        assert_eq!(TimePoint::INFINITE.add_millis(10), TimePoint::INFINITE);
    }

    #[test]
    fn sleep_until_past_deadline_returns() {
        let timebase = Timebase::new();
        timebase.sleep_until(TimePoint::ZERO);
        let deadline = timebase.now().add_millis(5);
        timebase.sleep_until(deadline);
        assert!(timebase.now() >= deadline);
    }
}
