//! Arrival-profile boundary behavior.

use misim_experiment::{
    ArchitectureDescription, ArrivalDistribution, ExperimentRunner, LoadGeneratorDescription,
    OperationTarget,
};

use super::common::{experiment, floats, simple_service};

fn target() -> OperationTarget {
    OperationTarget {
        service: "A".into(),
        operation: "op".into(),
    }
}

/// Instant service: demand 0, so answer times equal arrival times.
fn instant_architecture() -> ArchitectureDescription {
    ArchitectureDescription {
        services: vec![simple_service("A", 0.0, 1)],
        network: Default::default(),
    }
}

#[test]
fn spike_profile_with_offset_fires_bursts_exactly_on_time() {
    let architecture = instant_architecture();
    let mut description = experiment(13, 40.0);
    description.generators.push(LoadGeneratorDescription::Limbo {
        target: target(),
        profile: (0..=5).map(|i| (i as f64, 2.0)).collect(),
        repeating: false,
        start_offset: 20.5,
        distribution: ArrivalDistribution::Spike,
    });

    let outcome = ExperimentRunner::new()
        .run(&architecture, &description)
        .unwrap();

    // Exactly two arrivals per integer offset 20.5 .. 25.5.
    let answer_times: Vec<f64> = floats(&outcome, "O[A.op]_ResponseTime")
        .iter()
        .map(|(t, _)| *t)
        .collect();
    let expected: Vec<f64> = (0..=5)
        .flat_map(|i| {
            let t = 20.5 + i as f64;
            [t, t]
        })
        .collect();
    assert_eq!(answer_times, expected);
}

#[test]
fn even_profile_spreads_arrivals_across_the_interval() {
    let architecture = instant_architecture();
    let mut description = experiment(13, 10.0);
    description.generators.push(LoadGeneratorDescription::Limbo {
        target: target(),
        profile: vec![(0.0, 2.0), (1.0, 2.0)],
        repeating: false,
        start_offset: 0.0,
        distribution: ArrivalDistribution::Even,
    });

    let outcome = ExperimentRunner::new()
        .run(&architecture, &description)
        .unwrap();

    let answer_times: Vec<f64> = floats(&outcome, "O[A.op]_ResponseTime")
        .iter()
        .map(|(t, _)| *t)
        .collect();
    assert_eq!(answer_times, vec![0.0, 0.5, 1.0, 1.5]);
}

#[test]
fn repeating_profile_wraps_with_the_last_timestamp_as_period() {
    let architecture = instant_architecture();
    let mut description = experiment(13, 7.5);
    description.generators.push(LoadGeneratorDescription::Limbo {
        target: target(),
        profile: vec![(0.0, 1.0), (2.0, 1.0)],
        repeating: true,
        start_offset: 0.0,
        distribution: ArrivalDistribution::Spike,
    });

    let outcome = ExperimentRunner::new()
        .run(&architecture, &description)
        .unwrap();

    let answer_times: Vec<f64> = floats(&outcome, "O[A.op]_ResponseTime")
        .iter()
        .map(|(t, _)| *t)
        .collect();
    // Cycle length 2: arrivals at 0, 2, then 2 (wrap), 4, 4, 6, 6...
    assert_eq!(answer_times, vec![0.0, 2.0, 2.0, 4.0, 4.0, 6.0, 6.0]);
}

#[test]
fn zero_rate_points_emit_nothing() {
    let architecture = instant_architecture();
    let mut description = experiment(13, 10.0);
    description.generators.push(LoadGeneratorDescription::Limbo {
        target: target(),
        profile: vec![(0.0, 0.0), (1.0, 1.0), (2.0, 0.0)],
        repeating: false,
        start_offset: 0.0,
        distribution: ArrivalDistribution::Spike,
    });

    let outcome = ExperimentRunner::new()
        .run(&architecture, &description)
        .unwrap();

    let answer_times: Vec<f64> = floats(&outcome, "O[A.op]_ResponseTime")
        .iter()
        .map(|(t, _)| *t)
        .collect();
    assert_eq!(answer_times, vec![1.0]);
}
