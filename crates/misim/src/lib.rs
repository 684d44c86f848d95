//! Discrete-event simulator for microservice architectures.
//!
//! misim advances a virtual clock, routes synthetic requests through a
//! user-described service graph, models CPU contention and failure
//! modes, and records deterministic time-series datapoints. Each layer
//! is available as an individual crate and as a feature here:
//!
//! - [`core`]: virtual time, the event scheduler, seeded randomness,
//!   the datapoint reporter
//! - [`patterns`]: retry, circuit breaker, load balancing, autoscaling
//!   as pure state machines
//! - [`engine`]: the service model and the request-routing state
//!   machine
//! - [`experiment`]: architecture and scenario descriptions, load
//!   generators, fault injection, the runner
//!
//! # Quick start
//!
//! ```
//! use misim::experiment::{
//!     ArchitectureDescription, ExperimentDescription, ExperimentRunner,
//!     LoadGeneratorDescription, OperationDescription, OperationTarget, ReportType,
//!     ServiceDescription,
//! };
//!
//! let architecture = ArchitectureDescription {
//!     services: vec![ServiceDescription {
//!         name: "api".into(),
//!         capacity: 1.0,
//!         instances: 1,
//!         patterns: vec![],
//!         operations: vec![OperationDescription {
//!             name: "get".into(),
//!             demand: 0.5,
//!             dependencies: vec![],
//!         }],
//!     }],
//!     network: Default::default(),
//! };
//!
//! let experiment = ExperimentDescription {
//!     seed: 42,
//!     duration: 10.0,
//!     report_type: ReportType::Continuous,
//!     report_base_directory: None,
//!     generators: vec![LoadGeneratorDescription::Interval {
//!         target: OperationTarget {
//!             service: "api".into(),
//!             operation: "get".into(),
//!         },
//!         interval: 1.0,
//!         start_offset: 0.0,
//!         limit: None,
//!     }],
//!     faults: vec![],
//! };
//!
//! let outcome = ExperimentRunner::new().run(&architecture, &experiment).unwrap();
//! assert!(outcome.is_success());
//! assert!(!outcome.datapoints.is_empty());
//! ```

pub use misim_core as core;

#[cfg(feature = "patterns")]
pub use misim_patterns as patterns;

#[cfg(feature = "engine")]
pub use misim_engine as engine;

#[cfg(feature = "experiment")]
pub use misim_experiment as experiment;
