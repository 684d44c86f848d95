//! Simulation engine for misim.
//!
//! Models a microservice architecture (services, instances, CPUs, the
//! network) and routes synthetic requests through it on a discrete
//! event queue. The design follows two rules throughout:
//!
//! - **Arenas and ids.** Requests, instances, services, and
//!   transmissions live in arenas on [`Simulation`]; every edge between
//!   them is an id. No `Rc` cycles, no weak references.
//! - **One handler table.** Every state change is the consequence of
//!   dispatching an [`EventKind`] popped from the queue. Handlers may
//!   mutate state and schedule future events; nothing ever blocks.
//!
//! Resilience patterns from `misim-patterns` compose around the request
//! lifecycle at fixed points: the circuit breaker and retry policy on
//! the sending instance, the load balancer at service arrival, the
//! autoscaler on a periodic tick.

pub mod cpu;
pub mod error;
pub mod event;
pub mod ids;
pub mod instance;
pub mod microservice;
pub mod network;
pub mod request;
mod routing;
mod simulation;

pub use cpu::{Cpu, CpuProcess, FifoScheduler, ProcessScheduler, SchedulingKind, ShortestProcessNext};
pub use error::{FailureReason, SimulationError};
pub use event::EventKind;
pub use ids::{InstanceId, OperationRef, RequestId, ServiceId, TransmissionId};
pub use instance::{Instance, InstanceLifecycle};
pub use microservice::{
    BreakerSettings, Microservice, MicroserviceBuilder, Operation, OperationDependency,
    RetrySettings,
};
pub use network::{Network, Transmission, TransmissionPayload, TransmissionTarget};
pub use request::{DependencyInstance, Request, Requester};
pub use simulation::{LoadDriver, NoLoad, RunSummary, Simulation, SimulationConfig};

// Pattern types that appear in this crate's public API.
pub use misim_patterns::{
    AutoscalingStrategy, BalancingKind, CircuitBreaker, CircuitState, LoadBalancingStrategy,
    ReactiveAutoscaler, RetryPolicy,
};
