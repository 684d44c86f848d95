//! Dependency-chain timing: A.op -> B.op -> C.op.

use misim_experiment::{ExperimentRunner, LoadGeneratorDescription, OperationTarget};

use super::common::{chain_architecture, experiment, floats, labels};

fn chain_load() -> LoadGeneratorDescription {
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
fn answer_returns_after_the_full_round_trip() {
    let architecture = chain_architecture();
    let mut description = experiment(7, 20.0);
    description.generators.push(chain_load());

    let outcome = ExperimentRunner::new()
        .run(&architecture, &description)
        .unwrap();

    assert!(outcome.is_success());
    // 0.5 (A->B) + 0.5 (B->C) + 1 (C) + 0.5 (C->B) + 1 (B) + 0.5 (B->A)
    // + 1 (A) = 5.0
    assert_eq!(floats(&outcome, "O[A.op]_ResponseTime"), vec![(5.0, 5.0)]);
    assert!(labels(&outcome, "O[A.op]_Failed").is_empty());
}

#[test]
fn every_hop_sees_exactly_one_request() {
    let architecture = chain_architecture();
    let mut description = experiment(7, 20.0);
    description.generators.push(chain_load());

    let outcome = ExperimentRunner::new()
        .run(&architecture, &description)
        .unwrap();

    for instance in ["A_0", "B_0", "C_0"] {
        let series = format!("I[{instance}]_Requests_InSystem");
        let counts = floats(&outcome, &series);
        // One request entered, one left.
        assert_eq!(counts.iter().filter(|(_, v)| *v == 1.0).count(), 1);
        assert_eq!(counts.last().map(|(_, v)| *v), Some(0.0));
    }
}
