//! Core kernel for the misim discrete-event simulator.
//!
//! This crate holds the pieces everything else is built on:
//!
//! - [`SimTime`]: the virtual timeline, fractional seconds from run start
//! - [`Scheduler`]: the event queue and clock, with strict
//!   `(time, insertion)` ordering and tombstone cancellation
//! - [`SimRng`]: the single seeded random source of a run
//! - [`Reporter`]: the append-only datapoint sink
//! - [`listener`]: typed event listeners used by the resilience patterns
//!
//! The kernel is strictly single-threaded: simulated concurrency is
//! interleaving on the event queue, and the only way to wait is to
//! schedule a future event and return. Given identical inputs and seed,
//! two runs produce identical event orders and datapoint streams.

pub mod error;
pub mod listener;
pub mod reporter;
pub mod rng;
pub mod scheduler;
pub mod time;

pub use error::ScheduleError;
pub use listener::{EventListener, EventListeners, FnListener, PatternEvent};
pub use reporter::{Datapoint, Reporter, Value};
pub use rng::SimRng;
pub use scheduler::{EventId, Fired, Scheduler};
pub use time::SimTime;
