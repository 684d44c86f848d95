//! The simulation: arenas, the run loop, and the event handler table.
//!
//! All mutable state of a run lives here. Components never hold
//! references to each other; they name each other by arena id and every
//! interaction goes through `Simulation`, which also owns the one event
//! queue, the one RNG, and the one datapoint sink. The request-routing
//! state machine itself is in the `routing` module; this file covers
//! construction, the run loop, instance lifecycle, scaling, and chaos.

use misim_core::{EventId, Fired, Reporter, ScheduleError, Scheduler, SimRng, SimTime};
use tracing::debug;

use crate::cpu::Cpu;
use crate::error::{FailureReason, SimulationError};
use crate::event::EventKind;
use crate::ids::{InstanceId, OperationRef, RequestId, ServiceId};
use crate::instance::{Instance, InstanceLifecycle};
use crate::microservice::{Microservice, MicroserviceBuilder};
use crate::network::Network;
use crate::request::Request;

/// Static parameters of a run.
#[derive(Debug, Clone, Copy)]
pub struct SimulationConfig {
    /// Seed for every random choice of the run.
    pub seed: u64,
    /// Stop time; `None` runs until the queue drains.
    pub duration: Option<SimTime>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            duration: None,
        }
    }
}

impl SimulationConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_duration(mut self, duration: SimTime) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub events_processed: u64,
    pub final_time: SimTime,
    pub seed: u64,
}

/// Source of external load during a run.
///
/// The engine fires [`EventKind::GeneratorFire`] events; what a firing
/// means (which operation, how many requests, when to fire next) is the
/// driver's business. Implemented by the experiment layer.
pub trait LoadDriver {
    fn fire(&mut self, sim: &mut Simulation, generator: usize) -> Result<(), SimulationError>;
}

/// A driver with no load generators, for fault-only runs and tests.
pub struct NoLoad;

impl LoadDriver for NoLoad {
    fn fire(&mut self, _sim: &mut Simulation, _generator: usize) -> Result<(), SimulationError> {
        Ok(())
    }
}

/// A running simulation of one architecture.
pub struct Simulation {
    pub(crate) scheduler: Scheduler<EventKind>,
    pub(crate) rng: SimRng,
    pub(crate) reporter: Reporter,
    pub(crate) services: Vec<Microservice>,
    pub(crate) instances: Vec<Instance>,
    pub(crate) requests: Vec<Request>,
    pub(crate) network: Network,
    duration: Option<SimTime>,
    events_processed: u64,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        let mut scheduler = Scheduler::new();
        if let Some(duration) = config.duration {
            // Cannot fail: the clock starts at zero.
            let _ = scheduler.schedule(duration, EventKind::EndOfRun);
        }
        Self {
            scheduler,
            rng: SimRng::new(config.seed),
            reporter: Reporter::new(),
            services: Vec::new(),
            instances: Vec::new(),
            requests: Vec::new(),
            network: Network::new(),
            duration: config.duration,
            events_processed: 0,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Consumes the simulation, yielding the collected datapoints.
    pub fn into_reporter(self) -> Reporter {
        self.reporter
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn service(&self, id: ServiceId) -> &Microservice {
        &self.services[id.index()]
    }

    pub fn service_by_name(&self, name: &str) -> Result<ServiceId, SimulationError> {
        self.services
            .iter()
            .position(|s| s.name == name)
            .map(ServiceId)
            .ok_or_else(|| SimulationError::UnknownEntity {
                kind: "service",
                name: name.to_string(),
            })
    }

    /// Resolves `service.operation` names to a reference.
    pub fn operation_ref(
        &self,
        service: &str,
        operation: &str,
    ) -> Result<OperationRef, SimulationError> {
        let service_id = self.service_by_name(service)?;
        let index = self.services[service_id.index()]
            .operation_index(operation)
            .ok_or_else(|| SimulationError::UnknownEntity {
                kind: "operation",
                name: format!("{service}.{operation}"),
            })?;
        Ok(OperationRef {
            service: service_id,
            index,
        })
    }

    pub fn instance(&self, id: InstanceId) -> &Instance {
        &self.instances[id.index()]
    }

    /// Every instance ever spawned, terminal ones included.
    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances.iter()
    }

    pub fn request(&self, id: RequestId) -> &Request {
        &self.requests[id.index()]
    }

    /// Instances of a service currently in `RUNNING`.
    pub fn running_instances(&self, service: ServiceId) -> Vec<InstanceId> {
        self.services[service.index()]
            .instances
            .iter()
            .copied()
            .filter(|i| self.instances[i.index()].state() == InstanceLifecycle::Running)
            .collect()
    }

    // ------------------------------------------------------------------
    // Model assembly
    // ------------------------------------------------------------------

    /// Adds a service to the architecture. No instances are spawned
    /// until [`scale_service`](Simulation::scale_service) is called.
    pub fn add_service(&mut self, builder: MicroserviceBuilder) -> ServiceId {
        let id = ServiceId(self.services.len());
        let service = builder.build(id);
        if let Some(scaler) = &service.autoscaler {
            let period = scaler.period();
            self.scheduler
                .schedule_after(period, EventKind::ScalerTick(id));
        }
        self.services.push(service);
        id
    }

    /// Schedules an arbitrary event, for experiment assembly.
    pub fn schedule_event(
        &mut self,
        time: SimTime,
        kind: EventKind,
    ) -> Result<EventId, SimulationError> {
        Ok(self.scheduler.schedule(time, kind)?)
    }

    /// Schedules a load-generator firing.
    pub fn schedule_generator_fire(
        &mut self,
        generator: usize,
        time: SimTime,
    ) -> Result<EventId, SimulationError> {
        self.schedule_event(time, EventKind::GeneratorFire(generator))
    }

    // ------------------------------------------------------------------
    // Run loop
    // ------------------------------------------------------------------

    /// Runs to completion: until the queue drains, the configured
    /// duration elapses, or an invariant violation aborts the run.
    pub fn run(&mut self, driver: &mut dyn LoadDriver) -> Result<RunSummary, SimulationError> {
        self.run_until(driver, |_| false)
    }

    /// Like [`run`](Simulation::run), with an extra stop predicate
    /// checked after every event.
    pub fn run_until(
        &mut self,
        driver: &mut dyn LoadDriver,
        mut stop: impl FnMut(&Simulation) -> bool,
    ) -> Result<RunSummary, SimulationError> {
        if self.duration.is_none() && self.scheduler.is_empty() {
            return Err(ScheduleError::Deadlock.into());
        }

        while let Some(Fired { time, payload, .. }) = self.scheduler.pop() {
            self.events_processed += 1;
            match payload {
                EventKind::EndOfRun => break,
                EventKind::GeneratorFire(generator) => driver.fire(self, generator)?,
                kind => self.dispatch(time, kind)?,
            }
            if stop(self) {
                break;
            }
        }

        if let Some(duration) = self.duration {
            self.scheduler.advance_to(duration);
        }
        Ok(RunSummary {
            events_processed: self.events_processed,
            final_time: self.scheduler.now(),
            seed: self.rng.seed(),
        })
    }

    /// The single handler table: every event kind maps to one routine.
    fn dispatch(&mut self, time: SimTime, kind: EventKind) -> Result<(), SimulationError> {
        tracing::trace!(?kind, %time, "dispatch");
        match kind {
            EventKind::Arrival(transmission) => self.on_arrival(transmission),
            EventKind::RequestTimeout(request) => self.on_request_timeout(request),
            EventKind::ProcessCompletion(instance) => self.on_process_completion(instance),
            EventKind::ShutdownEnd(instance) => self.on_shutdown_end(instance),
            EventKind::RetryFire {
                instance,
                parent,
                dep_index,
            } => self.on_retry_fire(instance, parent, dep_index),
            EventKind::ScalerTick(service) => self.on_scaler_tick(service),
            EventKind::Kill { service, count } => self.kill_instances(service, count),
            EventKind::StartInstances { service, count } => {
                for _ in 0..count {
                    self.spawn_instance(service)?;
                }
                self.report_instance_count(service);
                Ok(())
            }
            EventKind::InjectDelay {
                service,
                baseline,
                stddev,
                duration,
            } => {
                let until = self.scheduler.now() + duration;
                self.network.inject_delay(service, baseline, stddev, until);
                Ok(())
            }
            EventKind::GeneratorFire(_) | EventKind::EndOfRun => {
                unreachable!("handled by the run loop")
            }
        }
    }

    // ------------------------------------------------------------------
    // Instance lifecycle
    // ------------------------------------------------------------------

    pub(crate) fn transition_instance(
        &mut self,
        id: InstanceId,
        to: InstanceLifecycle,
    ) -> Result<(), SimulationError> {
        self.instances[id.index()].transition(to)?;
        let name = self.instances[id.index()].name.clone();
        debug!(instance = %name, state = to.as_str(), "instance transition");
        self.reporter
            .record(format!("I[{name}]_State"), self.scheduler.now(), to.as_str());
        Ok(())
    }

    /// Spawns one instance and brings it to `RUNNING`.
    pub(crate) fn spawn_instance(
        &mut self,
        service: ServiceId,
    ) -> Result<InstanceId, SimulationError> {
        let id = InstanceId(self.instances.len());
        let svc = &mut self.services[service.index()];
        let ordinal = svc.next_ordinal;
        svc.next_ordinal += 1;
        let name = format!("{}_{}", svc.name, ordinal);
        let cpu = Cpu::new(svc.capacity, svc.scheduling.into_scheduler());
        let mut instance = Instance::new(id, service, name.clone(), cpu);
        instance.retry = svc
            .retry
            .map(|settings| settings.instantiate(format!("{name}/retry")));
        svc.instances.push(id);
        self.instances.push(instance);

        self.reporter.record(
            format!("I[{name}]_State"),
            self.scheduler.now(),
            InstanceLifecycle::Created.as_str(),
        );
        self.transition_instance(id, InstanceLifecycle::Starting)?;
        // STARTING is reported for the trace but advances immediately.
        self.transition_instance(id, InstanceLifecycle::Running)?;
        Ok(id)
    }

    /// Begins draining an instance. It stops accepting new requests and
    /// shuts down once the last owned request leaves.
    pub(crate) fn start_shutdown(&mut self, id: InstanceId) -> Result<(), SimulationError> {
        self.transition_instance(id, InstanceLifecycle::ShuttingDown)?;
        if self.instances[id.index()].is_drained() {
            self.scheduler
                .schedule_after(SimTime::ZERO, EventKind::ShutdownEnd(id));
        }
        Ok(())
    }

    fn on_shutdown_end(&mut self, id: InstanceId) -> Result<(), SimulationError> {
        // A kill may have beaten the drain; then there is nothing to do.
        if self.instances[id.index()].state() != InstanceLifecycle::ShuttingDown {
            return Ok(());
        }
        debug_assert!(self.instances[id.index()].is_drained());
        self.transition_instance(id, InstanceLifecycle::Shutdown)?;
        let service = self.instances[id.index()].service;
        self.services[service.index()]
            .instances
            .retain(|i| *i != id);
        self.report_instance_count(service);
        Ok(())
    }

    /// Kills an instance outright: no draining, owned requests fail
    /// with `ConnectionReset` at their senders.
    pub fn kill_instance(&mut self, id: InstanceId) -> Result<(), SimulationError> {
        self.transition_instance(id, InstanceLifecycle::Killed)?;
        let service = self.instances[id.index()].service;
        self.services[service.index()]
            .instances
            .retain(|i| *i != id);

        // Drop all computation. The owning requests are failed below.
        let (completion, _dropped) = self.instances[id.index()].cpu.clear();
        if let Some(event) = completion {
            self.scheduler.cancel(event);
        }

        // In-flight answers never arrive; requesters hit their timeouts.
        let answers: Vec<_> = std::mem::take(&mut self.instances[id.index()].outgoing_answers)
            .into_iter()
            .collect();
        for t in answers {
            let transmission = self.network.get_mut(t);
            transmission.canceled = true;
            let arrival = transmission.arrival;
            self.scheduler.cancel(arrival);
        }

        // Child requests this instance sent are torn down with it.
        let sends: Vec<_> = std::mem::take(&mut self.instances[id.index()].internal_sends)
            .into_iter()
            .collect();
        for t in sends {
            let transmission = self.network.get_mut(t);
            transmission.canceled = true;
            let arrival = transmission.arrival;
            self.scheduler.cancel(arrival);
            if let crate::network::TransmissionPayload::Request(child) =
                self.network.get(t).payload
            {
                self.cancel_request(child);
            }
        }

        // Every request this instance was handling fails back to its
        // sender with connection-reset semantics. Whether the sender
        // retries is its own patterns' business.
        let owned: Vec<_> = std::mem::take(&mut self.instances[id.index()].requests)
            .into_iter()
            .collect();
        self.instances[id.index()].open_dependencies.clear();
        for request in owned {
            if self.requests[request.index()].canceled {
                continue;
            }
            self.cancel_request(request);
            self.notify_requester_of_failure(request, FailureReason::ConnectionReset)?;
        }

        self.report_instance_count(service);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Scaling and chaos
    // ------------------------------------------------------------------

    /// The number of instances counted for scaling purposes: spawned
    /// and not yet draining or terminal.
    pub fn active_instance_count(&self, service: ServiceId) -> usize {
        self.services[service.index()]
            .instances
            .iter()
            .filter(|i| {
                matches!(
                    self.instances[i.index()].state(),
                    InstanceLifecycle::Created
                        | InstanceLifecycle::Starting
                        | InstanceLifecycle::Running
                )
            })
            .count()
    }

    /// Spawns or drains instances until the service has `target`
    /// active ones. Draining picks the oldest instances first.
    pub fn scale_service(
        &mut self,
        service: ServiceId,
        target: usize,
    ) -> Result<(), SimulationError> {
        let current = self.active_instance_count(service);
        if target > current {
            for _ in current..target {
                self.spawn_instance(service)?;
            }
        } else if target < current {
            let victims: Vec<InstanceId> = self.services[service.index()]
                .instances
                .iter()
                .copied()
                .filter(|i| {
                    matches!(
                        self.instances[i.index()].state(),
                        InstanceLifecycle::Created
                            | InstanceLifecycle::Starting
                            | InstanceLifecycle::Running
                    )
                })
                .take(current - target)
                .collect();
            for victim in victims {
                self.start_shutdown(victim)?;
            }
        }
        self.report_instance_count(service);
        Ok(())
    }

    /// Chaos entry point: kills up to `count` running instances, picked
    /// uniformly at random from the seeded run RNG.
    pub fn kill_instances(
        &mut self,
        service: ServiceId,
        count: usize,
    ) -> Result<(), SimulationError> {
        let mut candidates = self.running_instances(service);
        let kills = count.min(candidates.len());
        for _ in 0..kills {
            let victim = candidates.remove(self.rng.index(candidates.len()));
            self.kill_instance(victim)?;
        }
        Ok(())
    }

    fn on_scaler_tick(&mut self, service: ServiceId) -> Result<(), SimulationError> {
        let Some(mut scaler) = self.services[service.index()].autoscaler.take() else {
            return Ok(());
        };
        let now = self.scheduler.now();
        let running = self.running_instances(service);
        let demand = if running.is_empty() {
            0.0
        } else {
            running
                .iter()
                .map(|i| self.instances[i.index()].cpu.relative_work_demand(now))
                .sum::<f64>()
                / running.len() as f64
        };
        let decision = scaler.evaluate(now, demand, running.len());
        let period = scaler.period();
        self.services[service.index()].autoscaler = Some(scaler);

        self.reporter.record(
            format!("S[{}]_Relative_Work_Demand", self.services[service.index()].name),
            now,
            demand,
        );
        if let Some(target) = decision {
            self.scale_service(service, target)?;
        }
        self.scheduler
            .schedule_after(period, EventKind::ScalerTick(service));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reporting helpers
    // ------------------------------------------------------------------

    pub(crate) fn report_instance_count(&mut self, service: ServiceId) {
        let count = self.active_instance_count(service);
        let name = &self.services[service.index()].name;
        self.reporter.record(
            format!("S[{name}]_Instance_Count"),
            self.scheduler.now(),
            count as f64,
        );
    }

    pub(crate) fn report_requests_in_system(&mut self, instance: InstanceId) {
        let ins = &self.instances[instance.index()];
        let series = format!("I[{}]_Requests_InSystem", ins.name);
        let value = ins.requests.len() as f64;
        self.reporter.record(series, self.scheduler.now(), value);
    }

    pub(crate) fn report_cpu(&mut self, instance: InstanceId) {
        let now = self.scheduler.now();
        let ins = &self.instances[instance.index()];
        let usage = ins.cpu.current_usage(now);
        let demand = ins.cpu.relative_work_demand(now);
        let name = ins.name.clone();
        self.reporter
            .record(format!("I[{name}]_CPU_Utilization"), now, usage);
        self.reporter
            .record(format!("I[{name}]_Relative_Work_Demand"), now, demand);
    }
}
