//! Minimal pass-through: one service, one operation, one request.

use misim_experiment::{
    ArchitectureDescription, ExperimentRunner, LoadGeneratorDescription, OperationTarget,
};

use super::common::{experiment, floats, labels, simple_service};

fn one_request_at_zero() -> LoadGeneratorDescription {
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
fn one_arrival_one_completion_one_answer() {
    let architecture = ArchitectureDescription {
        services: vec![simple_service("A", 1.0, 1)],
        network: Default::default(),
    };
    let mut description = experiment(1, 10.0);
    description.generators.push(one_request_at_zero());

    let outcome = ExperimentRunner::new()
        .run(&architecture, &description)
        .unwrap();

    assert!(outcome.is_success());
    // CPU completion at 1.0 and the answer arrives at the requester at
    // the same instant (zero boundary latency).
    assert_eq!(floats(&outcome, "O[A.op]_ResponseTime"), vec![(1.0, 1.0)]);
    assert!(labels(&outcome, "O[A.op]_Failed").is_empty());

    let states = labels(&outcome, "I[A_0]_State");
    assert_eq!(
        states,
        vec![
            (0.0, "CREATED".to_string()),
            (0.0, "STARTING".to_string()),
            (0.0, "RUNNING".to_string()),
        ]
    );
}

#[test]
fn requests_queue_behind_each_other_on_one_cpu() {
    let architecture = ArchitectureDescription {
        services: vec![simple_service("A", 1.0, 1)],
        network: Default::default(),
    };
    let mut description = experiment(1, 20.0);
    description
        .generators
        .push(LoadGeneratorDescription::Interval {
            target: OperationTarget {
                service: "A".into(),
                operation: "op".into(),
            },
            interval: 0.5,
            start_offset: 0.0,
            limit: Some(3),
        });

    let outcome = ExperimentRunner::new()
        .run(&architecture, &description)
        .unwrap();

    // Arrivals at 0, 0.5, 1.0; FIFO service of unit demand finishes
    // them at 1, 2, 3 with growing sojourn times.
    assert_eq!(
        floats(&outcome, "O[A.op]_ResponseTime"),
        vec![(1.0, 1.0), (2.0, 1.5), (3.0, 2.0)]
    );
}

#[test]
fn report_directory_is_created_under_the_base() {
    let base = std::env::temp_dir().join("misim_report_dir_test");
    let _ = std::fs::remove_dir_all(&base);

    let architecture = ArchitectureDescription {
        services: vec![simple_service("A", 1.0, 1)],
        network: Default::default(),
    };
    let mut description = experiment(1, 5.0);
    description.report_base_directory = Some(base.clone());
    description.generators.push(one_request_at_zero());

    let outcome = ExperimentRunner::new()
        .run(&architecture, &description)
        .unwrap();

    assert!(outcome.is_success());
    assert!(base.join("run_1").is_dir());
    let _ = std::fs::remove_dir_all(&base);
}
