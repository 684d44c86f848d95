//! ATAM scenario descriptions, expanded and run end to end.

use std::collections::BTreeMap;

use misim_experiment::{
    ArrivalDistribution, ExperimentRunner, OperationDescription, ScenarioDescription,
};

use super::common::{chain_architecture, floats, labels, simple_service};

fn steady_profile() -> BTreeMap<String, Vec<(f64, f64)>> {
    let mut profiles = BTreeMap::new();
    profiles.insert("steady".to_string(), vec![(0.0, 1.0)]);
    profiles
}

#[test]
fn scenario_with_faultload_matches_explicit_experiment() {
    let architecture = chain_architecture();
    let scenario = ScenarioDescription {
        seed: 3,
        duration: 20.0,
        report_base_directory: None,
        artifact: "A".into(),
        component: "op".into(),
        stimulus: "LOAD steady\nKILL B 1 @1.0".into(),
        profiles: steady_profile(),
        distribution: ArrivalDistribution::Spike,
    };

    let outcome = ExperimentRunner::new()
        .run_scenario(&architecture, &scenario)
        .unwrap();

    assert!(outcome.is_success());
    // Identical to the explicit kill experiment: B dies mid-flight and
    // the root request fails without an answer.
    assert_eq!(
        labels(&outcome, "O[A.op]_Failed"),
        vec![(1.0, "DependencyNotAvailable".to_string())]
    );
    assert!(floats(&outcome, "O[A.op]_ResponseTime").is_empty());
}

#[test]
fn all_endpoints_expands_to_every_operation() {
    let mut service = simple_service("A", 0.5, 1);
    service.operations.push(OperationDescription {
        name: "other".into(),
        demand: 0.5,
        dependencies: Vec::new(),
    });
    let architecture = misim_experiment::ArchitectureDescription {
        services: vec![service],
        network: Default::default(),
    };
    let scenario = ScenarioDescription {
        seed: 3,
        duration: 10.0,
        report_base_directory: None,
        artifact: "A".into(),
        component: "ALL ENDPOINTS".into(),
        stimulus: "LOAD steady".into(),
        profiles: steady_profile(),
        distribution: ArrivalDistribution::Spike,
    };

    let outcome = ExperimentRunner::new()
        .run_scenario(&architecture, &scenario)
        .unwrap();

    // One generator per operation of the artifact.
    assert_eq!(floats(&outcome, "O[A.op]_ResponseTime").len(), 1);
    assert_eq!(floats(&outcome, "O[A.other]_ResponseTime").len(), 1);
}

#[test]
fn unknown_profile_is_rejected() {
    let architecture = chain_architecture();
    let scenario = ScenarioDescription {
        seed: 0,
        duration: 5.0,
        report_base_directory: None,
        artifact: "A".into(),
        component: "op".into(),
        stimulus: "LOAD missing".into(),
        profiles: BTreeMap::new(),
        distribution: ArrivalDistribution::Spike,
    };

    assert!(ExperimentRunner::new()
        .run_scenario(&architecture, &scenario)
        .is_err());
}
