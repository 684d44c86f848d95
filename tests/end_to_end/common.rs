//! Shared fixtures for the end-to-end scenario tests.

use misim_core::Value;
use misim_experiment::{
    ArchitectureDescription, DependencyDescription, ExperimentDescription, LatencyDescription,
    NetworkDescription, OperationDescription, PatternDescription, ReportType, RunOutcome,
    ServiceDescription,
};

/// A service with one operation and no patterns.
pub fn simple_service(name: &str, demand: f64, instances: usize) -> ServiceDescription {
    ServiceDescription {
        name: name.to_string(),
        capacity: 1.0,
        instances,
        patterns: Vec::new(),
        operations: vec![OperationDescription {
            name: "op".to_string(),
            demand,
            dependencies: Vec::new(),
        }],
    }
}

pub fn depends_on(service: &str) -> Vec<DependencyDescription> {
    vec![DependencyDescription {
        service: service.to_string(),
        operation: "op".to_string(),
        probability: 1.0,
    }]
}

/// A.op -> B.op -> C.op, demand 1 everywhere, 0.5s latency between
/// services and none across the boundary.
pub fn chain_architecture() -> ArchitectureDescription {
    let mut a = simple_service("A", 1.0, 1);
    a.operations[0].dependencies = depends_on("B");
    let mut b = simple_service("B", 1.0, 1);
    b.operations[0].dependencies = depends_on("C");
    let c = simple_service("C", 1.0, 1);

    let pairs = [
        ("A", "B"),
        ("B", "A"),
        ("B", "C"),
        ("C", "B"),
    ];
    ArchitectureDescription {
        services: vec![a, b, c],
        network: NetworkDescription {
            default_latency: 0.0,
            default_timeout: None,
            latencies: pairs
                .iter()
                .map(|(from, to)| LatencyDescription {
                    from: from.to_string(),
                    to: to.to_string(),
                    latency: 0.5,
                })
                .collect(),
        },
    }
}

/// An experiment skeleton with no load and no faults.
pub fn experiment(seed: u64, duration: f64) -> ExperimentDescription {
    ExperimentDescription {
        seed,
        duration,
        report_type: ReportType::Continuous,
        report_base_directory: None,
        generators: Vec::new(),
        faults: Vec::new(),
    }
}

/// `(time, value)` pairs of a numeric series, in append order.
pub fn floats(outcome: &RunOutcome, series: &str) -> Vec<(f64, f64)> {
    outcome
        .datapoints
        .iter()
        .filter(|p| p.series == series)
        .filter_map(|p| match p.value {
            Value::Float(v) => Some((p.time.as_secs(), v)),
            Value::Label(_) => None,
        })
        .collect()
}

/// `(time, label)` pairs of a label series, in append order.
pub fn labels(outcome: &RunOutcome, series: &str) -> Vec<(f64, String)> {
    outcome
        .datapoints
        .iter()
        .filter(|p| p.series == series)
        .filter_map(|p| match &p.value {
            Value::Label(l) => Some((p.time.as_secs(), l.clone())),
            Value::Float(_) => None,
        })
        .collect()
}

/// Shorthand for an autoscaler pattern description.
pub fn autoscaler(period: f64, min: usize, max: usize, low: f64, high: f64) -> PatternDescription {
    PatternDescription::Autoscaler {
        period,
        min,
        max,
        low_watermark: low,
        high_watermark: high,
        cooldown: 0.0,
    }
}
