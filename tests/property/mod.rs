//! Property-based tests for the simulation kernel.
//!
//! Invariants covered:
//! - ordering.rs: strict `(time, seq)` dequeue order, tombstone safety
//! - determinism.rs: identical seeds replay identical datapoint streams
//! - patterns.rs: retry budgets, breaker thresholds, balancer bounds

pub mod determinism;
pub mod ordering;
pub mod patterns;
