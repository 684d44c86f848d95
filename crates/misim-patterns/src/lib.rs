//! Resilience policies for the misim simulator.
//!
//! Each pattern is a pure state machine over virtual time: the engine
//! asks it for a decision (`try_acquire`, `next_delay`, `select`,
//! `evaluate`) and applies the outcome by scheduling events. Patterns
//! never touch the event queue or the service model themselves, which
//! keeps them independently testable and keeps the composition order
//! (circuit breaker outside retry, retry outside load balancing) in one
//! place: the engine's send path.

pub mod autoscaler;
pub mod circuitbreaker;
pub mod loadbalancer;
pub mod retry;

pub use autoscaler::{AutoscalerEvent, AutoscalingStrategy, ReactiveAutoscaler};
pub use circuitbreaker::{Admission, CircuitBreaker, CircuitBreakerEvent, CircuitState};
pub use loadbalancer::{BalancingKind, LeastUtilized, LoadBalancingStrategy, Random, RoundRobin};
pub use retry::{RetryEvent, RetryPolicy};
