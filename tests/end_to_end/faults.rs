//! Fault injection: kills, restarts, and latency injection.

use misim_experiment::{
    ArchitectureDescription, ExperimentRunner, FaultDescription, LoadGeneratorDescription,
    OperationTarget, PatternDescription,
};

use super::common::{chain_architecture, experiment, floats, labels, simple_service};

fn one_request() -> LoadGeneratorDescription {
    LoadGeneratorDescription::Interval {
        target: OperationTarget {
            service: "A".into(),
            operation: "op".into(),
        },
        interval: 1.0,
        start_offset: 0.0,
        limit: Some(1),
    }
}

#[test]
fn kill_during_flight_resets_the_connection() {
    let architecture = chain_architecture();
    let mut description = experiment(3, 20.0);
    description.generators.push(one_request());
    description.faults.push(FaultDescription::Kill {
        service: "B".into(),
        count: 1,
        at: 1.0,
    });

    let outcome = ExperimentRunner::new()
        .run(&architecture, &description)
        .unwrap();

    assert!(outcome.is_success());
    // B dies while handling A's internal request; A has no retry, so
    // the root request fails and no answer ever reaches the requester.
    assert_eq!(
        labels(&outcome, "O[A.op]_Failed"),
        vec![(1.0, "DependencyNotAvailable".to_string())]
    );
    assert!(floats(&outcome, "O[A.op]_ResponseTime").is_empty());
    assert!(labels(&outcome, "I[B_0]_State")
        .iter()
        .any(|(_, s)| s == "KILLED"));
}

#[test]
fn restart_brings_a_fresh_instance_up() {
    let architecture = ArchitectureDescription {
        services: vec![simple_service("A", 1.0, 1)],
        network: Default::default(),
    };
    let mut description = experiment(3, 20.0);
    description.faults.push(FaultDescription::Restart {
        service: "A".into(),
        count: 1,
        at: 2.0,
    });

    let outcome = ExperimentRunner::new()
        .run(&architecture, &description)
        .unwrap();

    assert!(labels(&outcome, "I[A_0]_State")
        .iter()
        .any(|(t, s)| *t == 2.0 && s == "KILLED"));
    // The respawn gets a fresh ordinal.
    assert_eq!(
        labels(&outcome, "I[A_1]_State"),
        vec![
            (2.0, "CREATED".to_string()),
            (2.0, "STARTING".to_string()),
            (2.0, "RUNNING".to_string()),
        ]
    );
}

#[test]
fn injected_delay_stretches_round_trips() {
    let architecture = chain_architecture();
    let mut description = experiment(3, 40.0);
    description
        .generators
        .push(LoadGeneratorDescription::Interval {
            target: OperationTarget {
                service: "A".into(),
                operation: "op".into(),
            },
            interval: 10.0,
            start_offset: 0.0,
            limit: Some(2),
        });
    // Between t=8 and t=18 every send towards B takes 2s longer.
    description.faults.push(FaultDescription::Delay {
        service: Some("B".into()),
        baseline: 2.0,
        stddev: 0.0,
        duration: 10.0,
        at: 8.0,
    });

    let outcome = ExperimentRunner::new()
        .run(&architecture, &description)
        .unwrap();

    let times = floats(&outcome, "O[A.op]_ResponseTime");
    assert_eq!(times.len(), 2);
    // First request is untouched. The second pays the extra delay on
    // both legs towards B: A's request at t=10 and C's answer at t=14.
    assert_eq!(times[0], (5.0, 5.0));
    assert_eq!(times[1], (19.0, 9.0));
}

#[test]
fn killing_every_instance_leaves_no_route() {
    let architecture = ArchitectureDescription {
        services: vec![simple_service("A", 1.0, 2)],
        network: Default::default(),
    };
    let mut description = experiment(9, 20.0);
    description
        .generators
        .push(LoadGeneratorDescription::Interval {
            target: OperationTarget {
                service: "A".into(),
                operation: "op".into(),
            },
            interval: 1.0,
            start_offset: 5.0,
            limit: Some(1),
        });
    description.faults.push(FaultDescription::Kill {
        service: "A".into(),
        count: 2,
        at: 1.0,
    });

    let outcome = ExperimentRunner::new()
        .run(&architecture, &description)
        .unwrap();

    assert_eq!(
        labels(&outcome, "O[A.op]_Failed"),
        vec![(5.0, "NoInstance".to_string())]
    );
}

#[test]
fn retry_pattern_survives_a_restart() {
    let mut architecture = chain_architecture();
    architecture.services[0].patterns = vec![PatternDescription::Retry {
        max_attempts: 5,
        base_interval: 1.0,
        multiplier: 2.0,
        jitter: 0.0,
    }];
    let mut description = experiment(11, 40.0);
    description.generators.push(one_request());
    // B is gone between t=1 and t=2; retries bridge the gap.
    description.faults.push(FaultDescription::Kill {
        service: "B".into(),
        count: 1,
        at: 1.0,
    });
    description.faults.push(FaultDescription::Start {
        service: "B".into(),
        count: 1,
        at: 2.0,
    });

    let outcome = ExperimentRunner::new()
        .run(&architecture, &description)
        .unwrap();

    assert!(labels(&outcome, "O[A.op]_Failed").is_empty());
    let times = floats(&outcome, "O[A.op]_ResponseTime");
    assert_eq!(times.len(), 1);
    // The answer is late but arrives.
    assert!(times[0].1 > 5.0);
}
