//! Time sources and the clock integrity guard.
//!
//! The guard compares two consecutive wall-clock observations and flags
//! implausible movement. It does not accumulate drift: many small backward
//! adjustments, each inside the tolerance, are not detected.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Mutex;
use tracing::warn;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Sets the clock to an absolute instant (may move backwards).
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = instant;
    }

    /// Moves the clock by `delta` (negative deltas move it backwards).
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Outcome of comparing two clock observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockVerdict {
    /// Movement is within the accepted window.
    Ok,
    /// Movement is implausible.
    Tampered,
}

/// Stateless check for suspicious wall-clock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockIntegrityGuard {
    backward_tolerance: TimeDelta,
    max_forward_jump: TimeDelta,
}

impl Default for ClockIntegrityGuard {
    fn default() -> Self {
        Self::new(TimeDelta::minutes(5), TimeDelta::days(366))
    }
}

impl ClockIntegrityGuard {
    #[must_use]
    pub fn new(backward_tolerance: TimeDelta, max_forward_jump: TimeDelta) -> Self {
        Self {
            backward_tolerance,
            max_forward_jump,
        }
    }

    /// Compares `now` against the previous observation.
    ///
    /// With no previous observation there is nothing to compare and the
    /// result is always [`ClockVerdict::Ok`]. Otherwise any movement inside
    /// `[-backward_tolerance, +max_forward_jump]` is accepted, including
    /// legitimate multi-day absences.
    #[must_use]
    pub fn evaluate(&self, now: DateTime<Utc>, last_observed: Option<DateTime<Utc>>) -> ClockVerdict {
        let Some(last) = last_observed else {
            return ClockVerdict::Ok;
        };

        if last - now > self.backward_tolerance {
            warn!(
                last_observed = %last,
                now = %now,
                "clock moved backwards beyond tolerance"
            );
            return ClockVerdict::Tampered;
        }

        if now - last > self.max_forward_jump {
            warn!(
                last_observed = %last,
                now = %now,
                "suspicious forward clock jump"
            );
            return ClockVerdict::Tampered;
        }

        ClockVerdict::Ok
    }
}
