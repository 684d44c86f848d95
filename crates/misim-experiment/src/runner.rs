//! Assembling and running experiments.
//!
//! The runner translates descriptions into the engine's model, wires
//! up generators and fault events, prepares the report directory, and
//! runs the simulation. A failed run still yields every datapoint
//! collected up to the failure.

use std::collections::BTreeMap;
use std::path::Path;

use misim_core::{Datapoint, SimTime};
use misim_engine::{
    BreakerSettings, EventKind, Microservice, MicroserviceBuilder, OperationDependency,
    OperationRef, RetrySettings, RunSummary, ServiceId, Simulation, SimulationConfig,
    SimulationError,
};
use misim_patterns::{BalancingKind, ReactiveAutoscaler};
use tracing::info;

use crate::architecture::{ArchitectureDescription, PatternDescription};
use crate::error::ExperimentError;
use crate::experiment::{
    ExperimentDescription, FaultDescription, LoadGeneratorDescription, ReportType,
};
use crate::load::{ExperimentDriver, LimboProfile, LoadGenerator};
use crate::scenario::{Faultload, ParsedStimulus, ScenarioDescription, parse_stimulus};

/// What a run produced: the summary (or the aborting error) and every
/// datapoint collected before the run ended.
#[derive(Debug)]
pub struct RunOutcome {
    pub result: Result<RunSummary, SimulationError>,
    pub datapoints: Vec<Datapoint>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Builds and runs simulations from descriptions.
#[derive(Debug, Default)]
pub struct ExperimentRunner;

impl ExperimentRunner {
    pub fn new() -> Self {
        Self
    }

    /// Runs an explicit experiment against an architecture.
    pub fn run(
        &self,
        architecture: &ArchitectureDescription,
        experiment: &ExperimentDescription,
    ) -> Result<RunOutcome, ExperimentError> {
        if let Some(base) = &experiment.report_base_directory {
            prepare_report_directory(base, experiment.seed)?;
        }
        let (mut sim, mut driver) = self.assemble(architecture, experiment)?;
        info!(
            seed = experiment.seed,
            duration = experiment.duration,
            report = ?experiment.report_type,
            "starting run"
        );
        let result = sim.run(&mut driver);
        let mut datapoints = sim.into_reporter().datapoints().to_vec();
        if experiment.report_type == ReportType::Single {
            datapoints = reduce_to_final_values(datapoints);
        }
        Ok(RunOutcome { result, datapoints })
    }

    /// Expands a scenario into an experiment and runs it.
    pub fn run_scenario(
        &self,
        architecture: &ArchitectureDescription,
        scenario: &ScenarioDescription,
    ) -> Result<RunOutcome, ExperimentError> {
        let experiment = expand_scenario(architecture, scenario)?;
        self.run(architecture, &experiment)
    }

    /// Builds the simulation and driver without running, for callers
    /// that want to drive stepping themselves.
    pub fn assemble(
        &self,
        architecture: &ArchitectureDescription,
        experiment: &ExperimentDescription,
    ) -> Result<(Simulation, ExperimentDriver), ExperimentError> {
        let lookup = NameLookup::build(architecture)?;
        if !experiment.duration.is_finite() || experiment.duration < 0.0 {
            return Err(ExperimentError::InvalidDescription(format!(
                "duration {} is not a valid horizon",
                experiment.duration
            )));
        }

        let mut sim = Simulation::new(
            SimulationConfig::default()
                .with_seed(experiment.seed)
                .with_duration(SimTime::from_secs(experiment.duration)),
        );

        for service in &architecture.services {
            let builder = build_service(service, &lookup)?;
            sim.add_service(builder);
        }

        let default_latency = sim_time(architecture.network.default_latency, "default latency")?;
        let default_timeout = architecture
            .network
            .default_timeout
            .map(|t| sim_time(t, "default timeout"))
            .transpose()?;
        let network = sim.network_mut();
        network.set_default_latency(default_latency);
        network.set_default_timeout(default_timeout);
        for latency in &architecture.network.latencies {
            let from = lookup.service(&latency.from, "network latency table")?;
            let to = lookup.service(&latency.to, "network latency table")?;
            let value = sim_time(latency.latency, "pair latency")?;
            sim.network_mut().set_pair_latency(from, to, value);
        }

        for (index, service) in architecture.services.iter().enumerate() {
            sim.scale_service(ServiceId::from_index(index), service.instances)?;
        }

        for fault in &experiment.faults {
            schedule_fault(&mut sim, &lookup, fault)?;
        }

        let mut generators = Vec::new();
        for description in &experiment.generators {
            generators.push(build_generator(description, &lookup)?);
        }
        let driver = ExperimentDriver::new(generators);
        driver.install(&mut sim)?;

        Ok((sim, driver))
    }
}

/// Creates the report directory for a run under the configured base.
fn prepare_report_directory(base: &Path, seed: u64) -> Result<std::path::PathBuf, ExperimentError> {
    let dir = base.join(format!("run_{seed}"));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// `single` reporting: one final value per series, in first-appearance
/// order of the series.
fn reduce_to_final_values(datapoints: Vec<Datapoint>) -> Vec<Datapoint> {
    let mut order: Vec<String> = Vec::new();
    let mut last: BTreeMap<String, Datapoint> = BTreeMap::new();
    for point in datapoints {
        if !last.contains_key(&point.series) {
            order.push(point.series.clone());
        }
        last.insert(point.series.clone(), point);
    }
    order
        .into_iter()
        .filter_map(|series| last.remove(&series))
        .collect()
}

/// Name-to-id resolution, computed from the description before the
/// engine model exists.
struct NameLookup {
    services: BTreeMap<String, usize>,
    operations: BTreeMap<(usize, String), usize>,
}

impl NameLookup {
    fn build(architecture: &ArchitectureDescription) -> Result<Self, ExperimentError> {
        let mut services = BTreeMap::new();
        let mut operations = BTreeMap::new();
        for (si, service) in architecture.services.iter().enumerate() {
            if services.insert(service.name.clone(), si).is_some() {
                return Err(ExperimentError::InvalidDescription(format!(
                    "duplicate service name `{}`",
                    service.name
                )));
            }
            for (oi, operation) in service.operations.iter().enumerate() {
                if operations
                    .insert((si, operation.name.clone()), oi)
                    .is_some()
                {
                    return Err(ExperimentError::InvalidDescription(format!(
                        "duplicate operation `{}.{}`",
                        service.name, operation.name
                    )));
                }
            }
        }
        Ok(Self {
            services,
            operations,
        })
    }

    fn service(&self, name: &str, referrer: &str) -> Result<ServiceId, ExperimentError> {
        self.services
            .get(name)
            .map(|i| ServiceId::from_index(*i))
            .ok_or_else(|| ExperimentError::UnknownReference {
                kind: "service",
                name: name.to_string(),
                referrer: referrer.to_string(),
            })
    }

    fn operation(
        &self,
        service: &str,
        operation: &str,
        referrer: &str,
    ) -> Result<OperationRef, ExperimentError> {
        let service_id = self.service(service, referrer)?;
        let index = self
            .operations
            .get(&(service_id.index(), operation.to_string()))
            .copied()
            .ok_or_else(|| ExperimentError::UnknownReference {
                kind: "operation",
                name: format!("{service}.{operation}"),
                referrer: referrer.to_string(),
            })?;
        Ok(OperationRef {
            service: service_id,
            index,
        })
    }
}

fn build_service(
    description: &crate::architecture::ServiceDescription,
    lookup: &NameLookup,
) -> Result<MicroserviceBuilder, ExperimentError> {
    let mut builder = Microservice::builder(&description.name).capacity(description.capacity);

    for operation in &description.operations {
        let referrer = format!("{}.{}", description.name, operation.name);
        let mut dependencies = Vec::new();
        for dep in &operation.dependencies {
            if !(0.0..=1.0).contains(&dep.probability) {
                return Err(ExperimentError::InvalidDescription(format!(
                    "{referrer}: dependency probability {} out of range",
                    dep.probability
                )));
            }
            dependencies.push(OperationDependency {
                target: lookup.operation(&dep.service, &dep.operation, &referrer)?,
                probability: dep.probability,
            });
        }
        builder =
            builder.operation_with_dependencies(&operation.name, operation.demand, dependencies);
    }

    for pattern in &description.patterns {
        builder = apply_pattern(builder, pattern, &description.name)?;
    }
    Ok(builder)
}

fn apply_pattern(
    builder: MicroserviceBuilder,
    pattern: &PatternDescription,
    service: &str,
) -> Result<MicroserviceBuilder, ExperimentError> {
    Ok(match pattern {
        PatternDescription::Retry {
            max_attempts,
            base_interval,
            multiplier,
            jitter,
        } => builder.retry(RetrySettings {
            max_attempts: *max_attempts,
            base_interval: sim_time(*base_interval, "retry base interval")?,
            multiplier: *multiplier,
            jitter: sim_time(*jitter, "retry jitter")?,
        }),
        PatternDescription::CircuitBreaker {
            failure_rate_threshold,
            window_size,
            minimum_calls,
            open_duration,
        } => builder.circuit_breaker(BreakerSettings {
            failure_rate_threshold: *failure_rate_threshold,
            window_size: *window_size,
            minimum_calls: *minimum_calls,
            open_duration: sim_time(*open_duration, "breaker open duration")?,
        }),
        PatternDescription::LoadBalancer { strategy } => {
            builder.balancing(parse_balancing(strategy, service)?)
        }
        PatternDescription::Autoscaler {
            period,
            min,
            max,
            low_watermark,
            high_watermark,
            cooldown,
        } => builder.autoscaler(Box::new(
            ReactiveAutoscaler::builder()
                .period(sim_time(*period, "autoscaler period")?)
                .bounds(*min, *max)
                .watermarks(*low_watermark, *high_watermark)
                .cooldown(sim_time(*cooldown, "autoscaler cooldown")?)
                .name(format!("{service}/autoscaler"))
                .build(),
        )),
    })
}

fn parse_balancing(strategy: &str, service: &str) -> Result<BalancingKind, ExperimentError> {
    match strategy.to_ascii_lowercase().as_str() {
        "round_robin" | "round-robin" | "roundrobin" => Ok(BalancingKind::RoundRobin),
        "random" => Ok(BalancingKind::Random),
        "least_utilized" | "least-utilized" | "util" => Ok(BalancingKind::LeastUtilized),
        other => Err(ExperimentError::InvalidDescription(format!(
            "service `{service}`: unknown load balancer strategy `{other}`"
        ))),
    }
}

fn schedule_fault(
    sim: &mut Simulation,
    lookup: &NameLookup,
    fault: &FaultDescription,
) -> Result<(), ExperimentError> {
    match fault {
        FaultDescription::Kill { service, count, at } => {
            let service = lookup.service(service, "kill fault")?;
            sim.schedule_event(
                sim_time(*at, "kill fault time")?,
                EventKind::Kill {
                    service,
                    count: *count,
                },
            )?;
        }
        FaultDescription::Start { service, count, at } => {
            let service = lookup.service(service, "start fault")?;
            sim.schedule_event(
                sim_time(*at, "start fault time")?,
                EventKind::StartInstances {
                    service,
                    count: *count,
                },
            )?;
        }
        FaultDescription::Restart { service, count, at } => {
            // Kill first, then respawn; same instant, insertion order.
            let service = lookup.service(service, "restart fault")?;
            let at = sim_time(*at, "restart fault time")?;
            sim.schedule_event(
                at,
                EventKind::Kill {
                    service,
                    count: *count,
                },
            )?;
            sim.schedule_event(
                at,
                EventKind::StartInstances {
                    service,
                    count: *count,
                },
            )?;
        }
        FaultDescription::Delay {
            service,
            baseline,
            stddev,
            duration,
            at,
        } => {
            let service = service
                .as_deref()
                .map(|name| lookup.service(name, "delay fault"))
                .transpose()?;
            sim.schedule_event(
                sim_time(*at, "delay fault time")?,
                EventKind::InjectDelay {
                    service,
                    baseline: *baseline,
                    stddev: *stddev,
                    duration: sim_time(*duration, "delay fault duration")?,
                },
            )?;
        }
    }
    Ok(())
}

fn build_generator(
    description: &LoadGeneratorDescription,
    lookup: &NameLookup,
) -> Result<LoadGenerator, ExperimentError> {
    match description {
        LoadGeneratorDescription::Limbo {
            target,
            profile,
            repeating,
            start_offset,
            distribution,
        } => {
            check_start_offset(*start_offset, "limbo generator")?;
            let operation =
                lookup.operation(&target.service, &target.operation, "limbo generator")?;
            let profile = LimboProfile::new(profile.clone())?;
            Ok(LoadGenerator::limbo(
                operation,
                profile,
                *repeating,
                *start_offset,
                *distribution,
            ))
        }
        LoadGeneratorDescription::Interval {
            target,
            interval,
            start_offset,
            limit,
        } => {
            if !interval.is_finite() || *interval <= 0.0 {
                return Err(ExperimentError::InvalidDescription(format!(
                    "interval generator: non-positive interval {interval}"
                )));
            }
            check_start_offset(*start_offset, "interval generator")?;
            let operation =
                lookup.operation(&target.service, &target.operation, "interval generator")?;
            Ok(LoadGenerator::interval(
                operation,
                *interval,
                *start_offset,
                *limit,
            ))
        }
    }
}

fn check_start_offset(start_offset: f64, referrer: &str) -> Result<(), ExperimentError> {
    if !start_offset.is_finite() || start_offset < 0.0 {
        return Err(ExperimentError::InvalidDescription(format!(
            "{referrer}: start offset {start_offset} must be non-negative"
        )));
    }
    Ok(())
}

/// Converts a described time value, rejecting negatives before they can
/// abort the run.
fn sim_time(value: f64, what: &str) -> Result<SimTime, ExperimentError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ExperimentError::InvalidDescription(format!(
            "{what} {value} must be a non-negative time"
        )));
    }
    Ok(SimTime::from_secs(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::architecture::{OperationDescription, ServiceDescription};
    use misim_core::Value;

    fn arch_with(names: &[&str]) -> ArchitectureDescription {
        ArchitectureDescription {
            services: names
                .iter()
                .map(|name| ServiceDescription {
                    name: name.to_string(),
                    capacity: 1.0,
                    instances: 1,
                    patterns: Vec::new(),
                    operations: vec![OperationDescription {
                        name: "op".into(),
                        demand: 1.0,
                        dependencies: Vec::new(),
                    }],
                })
                .collect(),
            network: Default::default(),
        }
    }

    #[test]
    fn duplicate_service_names_are_rejected() {
        let architecture = arch_with(&["a", "a"]);
        assert!(NameLookup::build(&architecture).is_err());
    }

    #[test]
    fn unknown_balancer_strategy_is_rejected() {
        assert!(parse_balancing("round_robin", "svc").is_ok());
        assert!(parse_balancing("coin_flip", "svc").is_err());
    }

    #[test]
    fn single_report_keeps_one_final_value_per_series() {
        let point = |series: &str, t: f64, v: f64| Datapoint {
            series: series.to_string(),
            time: SimTime::from_secs(t),
            value: Value::Float(v),
        };
        let reduced = reduce_to_final_values(vec![
            point("a", 0.0, 1.0),
            point("b", 0.5, 9.0),
            point("a", 1.0, 2.0),
        ]);
        assert_eq!(reduced.len(), 2);
        assert_eq!(reduced[0].series, "a");
        assert_eq!(reduced[0].value, Value::Float(2.0));
        assert_eq!(reduced[1].series, "b");
    }
}

/// Expands a scenario into an explicit experiment: one generator per
/// targeted endpoint per `LOAD` clause, faultloads resolved against the
/// artifact.
pub fn expand_scenario(
    architecture: &ArchitectureDescription,
    scenario: &ScenarioDescription,
) -> Result<ExperimentDescription, ExperimentError> {
    let ParsedStimulus { loads, faults } = parse_stimulus(&scenario.stimulus)?;

    let artifact = architecture
        .services
        .iter()
        .find(|s| s.name == scenario.artifact)
        .ok_or_else(|| ExperimentError::UnknownReference {
            kind: "service",
            name: scenario.artifact.clone(),
            referrer: "scenario artifact".to_string(),
        })?;

    let components: Vec<String> = if scenario.targets_all_endpoints() {
        artifact.operations.iter().map(|o| o.name.clone()).collect()
    } else {
        vec![scenario.component.clone()]
    };

    let mut generators = Vec::new();
    for load in &loads {
        let points = scenario.profiles.get(&load.profile).ok_or_else(|| {
            ExperimentError::UnknownReference {
                kind: "profile",
                name: load.profile.clone(),
                referrer: "scenario stimulus".to_string(),
            }
        })?;
        for component in &components {
            generators.push(LoadGeneratorDescription::Limbo {
                target: crate::experiment::OperationTarget {
                    service: scenario.artifact.clone(),
                    operation: component.clone(),
                },
                profile: points.clone(),
                repeating: load.repeating,
                start_offset: 0.0,
                distribution: scenario.distribution,
            });
        }
    }

    let faults = faults
        .into_iter()
        .map(|fault| match fault {
            Faultload::Kill { service, count, at } => FaultDescription::Kill {
                service: service.unwrap_or_else(|| scenario.artifact.clone()),
                count,
                at,
            },
            Faultload::Start { service, count, at } => FaultDescription::Start {
                service: service.unwrap_or_else(|| scenario.artifact.clone()),
                count,
                at,
            },
            Faultload::Restart { service, count, at } => FaultDescription::Restart {
                service: service.unwrap_or_else(|| scenario.artifact.clone()),
                count,
                at,
            },
            Faultload::Delay {
                baseline,
                stddev,
                duration,
                at,
            } => FaultDescription::Delay {
                service: Some(scenario.artifact.clone()),
                baseline,
                stddev,
                duration,
                at,
            },
        })
        .collect();

    Ok(ExperimentDescription {
        seed: scenario.seed,
        duration: scenario.duration,
        report_type: ReportType::Continuous,
        report_base_directory: scenario.report_base_directory.clone(),
        generators,
        faults,
    })
}
