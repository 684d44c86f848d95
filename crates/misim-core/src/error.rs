//! Kernel error types.

use crate::time::SimTime;

/// Errors raised by the event scheduler.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    /// An event was scheduled before the current virtual time. This is a
    /// programmer error; the run should abort.
    #[error("cannot schedule an event at {requested} before the current time {now}")]
    InvalidSchedule {
        /// The requested (past) event time.
        requested: SimTime,
        /// The clock value at schedule time.
        now: SimTime,
    },

    /// The run loop has no pending events and no stop condition, so
    /// virtual time can never advance again.
    #[error("simulation deadlock: no pending events and no stop time")]
    Deadlock,
}
