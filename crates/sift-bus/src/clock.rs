//! Monotonic and wall-clock timestamps and their wire formats.
//!
//! Packets carry both stamps as string headers: the monotonic stamp is a
//! decimal nanosecond count (`a0_time_mono`), the wall stamp an RFC3339
//! UTC instant with nanosecond precision (`a0_time_wall`). Both formats
//! must survive a round-trip through a topic file unchanged.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("invalid monotonic timestamp '{0}': expected decimal nanoseconds")]
    BadMono(String),
    #[error("invalid wall timestamp '{0}': expected RFC3339 UTC")]
    BadWall(String),
}

// ─── Monotonic Time ─────────────────────────────────────────────────────────

/// A monotonic instant as nanoseconds since the host clock's epoch.
///
/// The epoch is `CLOCK_MONOTONIC`'s, so stamps compare across processes on
/// the same host for the lifetime of a boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeMono(u64);

impl TimeMono {
    #[cfg(unix)]
    pub fn now() -> Self {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
        }
        TimeMono(ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64)
    }

    #[cfg(not(unix))]
    pub fn now() -> Self {
        use std::time::Instant;
        static EPOCH: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let epoch = EPOCH.get_or_init(Instant::now);
        TimeMono(epoch.elapsed().as_nanos() as u64)
    }

    pub fn from_nanos(ns: u64) -> Self {
        TimeMono(ns)
    }

    pub fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn parse(s: &str) -> Result<Self, ClockError> {
        s.trim()
            .parse::<u64>()
            .map(TimeMono)
            .map_err(|_| ClockError::BadMono(s.to_string()))
    }

    pub fn saturating_add(self, dur: Duration) -> Self {
        TimeMono(self.0.saturating_add(dur.as_nanos() as u64))
    }

    pub fn saturating_sub(self, dur: Duration) -> Self {
        TimeMono(self.0.saturating_sub(dur.as_nanos() as u64))
    }
}

impl fmt::Display for TimeMono {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── Wall Time ──────────────────────────────────────────────────────────────

/// A wall-clock instant in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeWall(DateTime<Utc>);

impl TimeWall {
    pub fn now() -> Self {
        TimeWall(Utc::now())
    }

    pub fn parse(s: &str) -> Result<Self, ClockError> {
        DateTime::parse_from_rfc3339(s.trim())
            .map(|t| TimeWall(t.with_timezone(&Utc)))
            .map_err(|_| ClockError::BadWall(s.to_string()))
    }

    /// `YYYY/MM/DD` directory prefix used for date-partitioned output.
    pub fn date_dirs(&self) -> String {
        self.0.format("%Y/%m/%d").to_string()
    }
}

impl fmt::Display for TimeWall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339_opts(SecondsFormat::Nanos, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_round_trips_through_string() {
        let t = TimeMono::from_nanos(1_234_567_890_123);
        assert_eq!(TimeMono::parse(&t.to_string()).unwrap(), t);
    }

    #[test]
    fn mono_rejects_garbage() {
        assert!(TimeMono::parse("not-a-number").is_err());
        assert!(TimeMono::parse("-5").is_err());
    }

    #[test]
    fn mono_saturating_arithmetic() {
        let t = TimeMono::from_nanos(100);
        assert_eq!(t.saturating_sub(Duration::from_nanos(500)).as_nanos(), 0);
        assert_eq!(t.saturating_add(Duration::from_nanos(50)).as_nanos(), 150);
    }

    #[test]
    fn mono_now_is_monotonic() {
        let a = TimeMono::now();
        let b = TimeMono::now();
        assert!(a <= b);
    }

    #[test]
    fn wall_round_trips_with_nanos() {
        let t = TimeWall::parse("2024-06-01T12:34:56.123456789Z").unwrap();
        assert_eq!(t.to_string(), "2024-06-01T12:34:56.123456789Z");
    }

    #[test]
    fn wall_date_dirs() {
        let t = TimeWall::parse("2024-06-01T23:59:59.000000000Z").unwrap();
        assert_eq!(t.date_dirs(), "2024/06/01");
    }

    #[test]
    fn wall_normalizes_offsets_to_utc() {
        let t = TimeWall::parse("2024-06-01T12:00:00.000000000+02:00").unwrap();
        assert_eq!(t.to_string(), "2024-06-01T10:00:00.000000000Z");
    }
}
