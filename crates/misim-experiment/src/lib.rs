//! Experiment layer for misim.
//!
//! Bridges user-facing descriptions (what the out-of-scope JSON parsers
//! produce) and the engine: builds the service graph, turns load
//! profiles into generator firings, schedules fault injections, and
//! runs the whole thing to a datapoint stream.

pub mod architecture;
pub mod error;
pub mod experiment;
pub mod load;
pub mod runner;
pub mod scenario;

pub use architecture::{
    ArchitectureDescription, DependencyDescription, LatencyDescription, NetworkDescription,
    OperationDescription, PatternDescription, ServiceDescription,
};
pub use error::ExperimentError;
pub use experiment::{
    ExperimentDescription, FaultDescription, LoadGeneratorDescription, OperationTarget, ReportType,
};
pub use load::{ArrivalDistribution, ExperimentDriver, LimboProfile, LoadGenerator};
pub use runner::{expand_scenario, ExperimentRunner, RunOutcome};
pub use scenario::{parse_stimulus, Faultload, ParsedStimulus, ScenarioDescription, StimulusLoad};
