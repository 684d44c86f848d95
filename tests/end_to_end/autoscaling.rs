//! Watermark-driven autoscaling under sustained load.

use misim_experiment::{
    ArchitectureDescription, ExperimentRunner, LoadGeneratorDescription, OperationTarget,
};

use super::common::{autoscaler, experiment, floats, simple_service};

fn flooded_service(max: usize) -> ArchitectureDescription {
    let mut service = simple_service("A", 1.0, 1);
    service.patterns = vec![autoscaler(1.0, 1, max, 0.2, 0.8)];
    ArchitectureDescription {
        services: vec![service],
        network: Default::default(),
    }
}

fn flood() -> LoadGeneratorDescription {
    // Four units of demand per second against one unit of capacity.
    LoadGeneratorDescription::Interval {
        target: OperationTarget {
            service: "A".into(),
            operation: "op".into(),
        },
        interval: 0.25,
        start_offset: 0.0,
        limit: None,
    }
}

#[test]
fn sustained_overload_scales_up_one_step_per_tick() {
    let architecture = flooded_service(3);
    let mut description = experiment(5, 6.0);
    description.generators.push(flood());

    let outcome = ExperimentRunner::new()
        .run(&architecture, &description)
        .unwrap();

    let counts = floats(&outcome, "S[A]_Instance_Count");
    // 1 at start, 2 after the first tick, 3 after the second, capped at
    // the configured maximum from then on.
    assert_eq!(counts[0], (0.0, 1.0));
    assert!(counts.contains(&(1.0, 2.0)));
    assert!(counts.contains(&(2.0, 3.0)));
    assert!(counts.iter().all(|(_, count)| *count <= 3.0));

    // The demand the scaler acted on was indeed above the watermark.
    let demands = floats(&outcome, "S[A]_Relative_Work_Demand");
    assert!(demands.iter().any(|(t, d)| *t == 1.0 && *d > 0.8));
}

#[test]
fn idle_service_scales_back_down_to_min() {
    let architecture = flooded_service(3);
    let mut description = experiment(5, 30.0);
    // Load only for the first few seconds.
    description
        .generators
        .push(LoadGeneratorDescription::Interval {
            target: OperationTarget {
                service: "A".into(),
                operation: "op".into(),
            },
            interval: 0.25,
            start_offset: 0.0,
            limit: Some(12),
        });

    let outcome = ExperimentRunner::new()
        .run(&architecture, &description)
        .unwrap();

    let counts = floats(&outcome, "S[A]_Instance_Count");
    // Scaled up under load, back to the minimum once drained.
    assert!(counts.iter().any(|(_, count)| *count > 1.0));
    assert_eq!(counts.last().map(|(_, count)| *count), Some(1.0));
}
