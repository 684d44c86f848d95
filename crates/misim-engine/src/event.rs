//! The simulation's event vocabulary.
//!
//! Every state change in a run flows from dispatching one of these
//! payloads. The variants are data only; the handler table is
//! `Simulation::dispatch`.

use misim_core::SimTime;

use crate::ids::{InstanceId, RequestId, ServiceId, TransmissionId};

/// A scheduled simulation event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    /// A transmission reaches its target.
    Arrival(TransmissionId),
    /// A request's round-trip timeout expired before its answer.
    RequestTimeout(RequestId),
    /// The active CPU process of an instance finished its demand.
    ProcessCompletion(InstanceId),
    /// A draining instance confirmed it is empty and can stop.
    ShutdownEnd(InstanceId),
    /// A backed-off retry re-sends the child request of a dependency.
    RetryFire {
        instance: InstanceId,
        parent: RequestId,
        dep_index: usize,
    },
    /// Periodic autoscaler evaluation for a service.
    ScalerTick(ServiceId),
    /// Chaos: kill `count` running instances of a service.
    Kill { service: ServiceId, count: usize },
    /// Chaos: start `count` additional instances of a service.
    StartInstances { service: ServiceId, count: usize },
    /// Chaos: add normal-distributed latency for a while.
    InjectDelay {
        /// Restrict to traffic towards one service, or all when `None`.
        service: Option<ServiceId>,
        baseline: f64,
        stddev: f64,
        duration: SimTime,
    },
    /// A load generator fires; the experiment driver decides what that
    /// means.
    GeneratorFire(usize),
    /// The experiment duration is up; the run loop stops here.
    EndOfRun,
}
