//! The experiment description: workload and faults over simulated time.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::load::ArrivalDistribution;

/// How datapoints are meant to be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    /// Every datapoint of the run.
    #[default]
    Continuous,
    /// One aggregate per series at the end.
    Single,
}

/// A full experiment: seed, horizon, load, and faults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentDescription {
    #[serde(default)]
    pub seed: u64,
    /// Simulated duration in seconds.
    pub duration: f64,
    #[serde(default)]
    pub report_type: ReportType,
    #[serde(default)]
    pub report_base_directory: Option<PathBuf>,
    #[serde(default)]
    pub generators: Vec<LoadGeneratorDescription>,
    #[serde(default)]
    pub faults: Vec<FaultDescription>,
}

/// The operation a generator targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationTarget {
    pub service: String,
    pub operation: String,
}

/// A load generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoadGeneratorDescription {
    /// Replays a Limbo arrival profile. The profile file itself is read
    /// by the out-of-scope loader; here it is already a value sequence.
    Limbo {
        target: OperationTarget,
        /// `(offset_seconds, rate)` pairs, offsets ascending.
        profile: Vec<(f64, f64)>,
        #[serde(default)]
        repeating: bool,
        #[serde(default)]
        start_offset: f64,
        #[serde(default)]
        distribution: ArrivalDistribution,
    },
    /// Fixed inter-arrival interval.
    Interval {
        target: OperationTarget,
        interval: f64,
        #[serde(default)]
        start_offset: f64,
        /// Stop after this many requests; `None` runs to the horizon.
        #[serde(default)]
        limit: Option<u64>,
    },
}

/// A single-shot fault injection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FaultDescription {
    /// Kill running instances, no respawn.
    Kill {
        service: String,
        #[serde(default = "default_count")]
        count: usize,
        at: f64,
    },
    /// Start additional instances.
    Start {
        service: String,
        #[serde(default = "default_count")]
        count: usize,
        at: f64,
    },
    /// Kill and immediately respawn.
    Restart {
        service: String,
        #[serde(default = "default_count")]
        count: usize,
        at: f64,
    },
    /// Inject extra latency, normally distributed, for a while.
    Delay {
        /// Affected target service; `None` delays all traffic.
        #[serde(default)]
        service: Option<String>,
        baseline: f64,
        #[serde(default)]
        stddev: f64,
        duration: f64,
        at: f64,
    },
}

fn default_count() -> usize {
    1
}
