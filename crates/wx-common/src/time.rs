//! Time types for the column store.
//!
//! A [`Timestamp`] is a UTC epoch second. A [`TimerangeDt`] is a half-open,
//! `dtSeconds`-aligned range; the reader and mixer only ever operate on
//! aligned ranges, so alignment is checked once at construction rather than
//! re-validated on every access.

use serde::{Deserialize, Serialize};

/// UTC epoch second.
pub type Timestamp = i64;

/// A half-open, step-aligned time range: `[start, end)` at `dt_seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerangeDt {
    pub start: Timestamp,
    pub end: Timestamp,
    pub dt_seconds: u64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TimerangeError {
    #[error("start {start} is not aligned to dt {dt}")]
    StartNotAligned { start: Timestamp, dt: u64 },
    #[error("end {end} is not aligned to dt {dt}")]
    EndNotAligned { end: Timestamp, dt: u64 },
    #[error("end {end} must be greater than start {start}")]
    EndBeforeStart { start: Timestamp, end: Timestamp },
}

impl TimerangeDt {
    /// Construct a range, checking that both endpoints are aligned to `dt_seconds`.
    pub fn new(start: Timestamp, end: Timestamp, dt_seconds: u64) -> Result<Self, TimerangeError> {
        let dt = dt_seconds as i64;
        if start % dt != 0 {
            return Err(TimerangeError::StartNotAligned {
                start,
                dt: dt_seconds,
            });
        }
        if end % dt != 0 {
            return Err(TimerangeError::EndNotAligned { end, dt: dt_seconds });
        }
        if end <= start {
            return Err(TimerangeError::EndBeforeStart { start, end });
        }
        Ok(Self {
            start,
            end,
            dt_seconds,
        })
    }

    /// Number of timesteps covered (exclusive of `end`).
    pub fn count(&self) -> usize {
        ((self.end - self.start) / self.dt_seconds as i64) as usize
    }

    /// Timestamp of step `i`, 0-indexed from `start`.
    pub fn step(&self, i: usize) -> Timestamp {
        self.start + (i as i64) * self.dt_seconds as i64
    }

    /// Index of `t` within this range, if contained.
    pub fn index_of(&self, t: Timestamp) -> Option<usize> {
        if t < self.start || t >= self.end {
            return None;
        }
        let dt = self.dt_seconds as i64;
        if (t - self.start) % dt != 0 {
            return None;
        }
        Some(((t - self.start) / dt) as usize)
    }

    /// Widen this range by `pad` extra steps on each side (used by the
    /// interpolator to fetch stencil context around the query window).
    pub fn padded(&self, pad: usize) -> Self {
        let dt = self.dt_seconds as i64;
        Self {
            start: self.start - pad as i64 * dt,
            end: self.end + pad as i64 * dt,
            dt_seconds: self.dt_seconds,
        }
    }

    /// Intersection with another range sharing the same `dt_seconds`, if any.
    pub fn intersect(&self, other: &TimerangeDt) -> Option<TimerangeDt> {
        if self.dt_seconds != other.dt_seconds {
            return None;
        }
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if end <= start {
            return None;
        }
        Some(TimerangeDt {
            start,
            end,
            dt_seconds: self.dt_seconds,
        })
    }
}
