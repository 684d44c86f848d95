//! Virtual time.
//!
//! The simulator never reads the wall clock. All timestamps are
//! [`SimTime`] values measured in simulated seconds from the start of
//! the run.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// A point on the simulated timeline, in seconds.
///
/// `SimTime` is totally ordered (via `f64::total_cmp`) so it can be used
/// as a priority-queue key. Values are expected to be finite and
/// non-negative; arithmetic that would go below zero saturates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimTime(f64);

impl SimTime {
    /// The start of the simulated timeline.
    pub const ZERO: SimTime = SimTime(0.0);

    /// Creates a time from a number of simulated seconds.
    ///
    /// # Panics
    ///
    /// Panics if `seconds` is not finite or is negative.
    pub fn from_secs(seconds: f64) -> Self {
        assert!(
            seconds.is_finite() && seconds >= 0.0,
            "simulated time must be finite and non-negative, got {seconds}"
        );
        SimTime(seconds)
    }

    /// Returns the time as fractional seconds.
    pub fn as_secs(self) -> f64 {
        self.0
    }

    /// The duration from `earlier` to `self`, zero if `earlier` is later.
    pub fn since(self, earlier: SimTime) -> SimTime {
        SimTime((self.0 - earlier.0).max(0.0))
    }

    /// Returns the larger of the two times.
    pub fn max(self, other: SimTime) -> SimTime {
        if self >= other { self } else { other }
    }
}

impl Eq for SimTime {}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 + rhs.0)
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: SimTime) {
        self.0 += rhs.0;
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: SimTime) -> SimTime {
        self.since(rhs)
    }
}

impl From<f64> for SimTime {
    fn from(seconds: f64) -> Self {
        SimTime::from_secs(seconds)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}
