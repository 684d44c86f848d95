//! End-to-end scenario tests.
//!
//! Test organization:
//! - pass_through.rs: minimal single-service round trips
//! - chain.rs: dependency chains and their timing
//! - faults.rs: kill/start/delay injections and failure propagation
//! - autoscaling.rs: watermark-driven scaling under load
//! - limbo.rs: arrival-profile boundary behavior
//! - scenario.rs: ATAM scenario expansion

pub mod common;

mod autoscaling;
mod chain;
mod faults;
mod limbo;
mod pass_through;
mod scenario;
