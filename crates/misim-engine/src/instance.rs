//! One replica of a microservice and its lifecycle.
//!
//! The instance holds the request-routing bookkeeping (which requests
//! it handles, which dependency slots wait for answers, which sends are
//! in flight) plus the per-instance resilience state: a retry policy
//! and one circuit breaker per downstream service. The routing state
//! machine itself lives in the simulation's dispatch code; everything
//! here is state and the lifecycle transition rules.

use std::collections::{BTreeMap, BTreeSet};

use misim_patterns::{CircuitBreaker, RetryPolicy};

use crate::cpu::Cpu;
use crate::error::SimulationError;
use crate::ids::{InstanceId, RequestId, ServiceId, TransmissionId};

/// Instance lifecycle states.
///
/// ```text
/// CREATED ──start()──► STARTING ──(immediate)──► RUNNING
/// RUNNING ──start_shutdown()──► SHUTTING_DOWN ──(drained)──► SHUTDOWN
/// any state except KILLED ──die()──► KILLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceLifecycle {
    Created,
    Starting,
    Running,
    ShuttingDown,
    Shutdown,
    Killed,
}

impl InstanceLifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            InstanceLifecycle::Created => "CREATED",
            InstanceLifecycle::Starting => "STARTING",
            InstanceLifecycle::Running => "RUNNING",
            InstanceLifecycle::ShuttingDown => "SHUTTING_DOWN",
            InstanceLifecycle::Shutdown => "SHUTDOWN",
            InstanceLifecycle::Killed => "KILLED",
        }
    }

    fn allows(self, to: InstanceLifecycle) -> bool {
        use InstanceLifecycle::*;
        match (self, to) {
            (_, Killed) => self != Killed,
            (Created, Starting) => true,
            (Starting, Running) => true,
            (Running, ShuttingDown) => true,
            (ShuttingDown, Shutdown) => true,
            _ => false,
        }
    }
}

/// One running (or starting, or stopping) replica.
#[derive(Debug)]
pub struct Instance {
    pub id: InstanceId,
    pub service: ServiceId,
    /// Stable display name, `<service>_<ordinal>`.
    pub name: String,
    state: InstanceLifecycle,
    pub cpu: Cpu,
    /// Requests accepted and not yet answered or canceled.
    pub requests: BTreeSet<RequestId>,
    /// Dependency slots waiting for an answer, `(parent, slot index)`.
    pub open_dependencies: BTreeSet<(RequestId, usize)>,
    /// In-flight transmissions of child requests this instance sent.
    pub internal_sends: BTreeSet<TransmissionId>,
    /// In-flight answers this instance emitted.
    pub outgoing_answers: BTreeSet<TransmissionId>,
    /// Per-instance retry policy, from the service's pattern config.
    pub retry: Option<RetryPolicy>,
    /// One breaker per downstream service, created on first send.
    pub breakers: BTreeMap<ServiceId, CircuitBreaker>,
}

impl Instance {
    pub fn new(id: InstanceId, service: ServiceId, name: String, cpu: Cpu) -> Self {
        Self {
            id,
            service,
            name,
            state: InstanceLifecycle::Created,
            cpu,
            requests: BTreeSet::new(),
            open_dependencies: BTreeSet::new(),
            internal_sends: BTreeSet::new(),
            outgoing_answers: BTreeSet::new(),
            retry: None,
            breakers: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> InstanceLifecycle {
        self.state
    }

    /// Applies a lifecycle transition, rejecting illegal edges.
    pub(crate) fn transition(&mut self, to: InstanceLifecycle) -> Result<(), SimulationError> {
        if !self.state.allows(to) {
            return Err(SimulationError::IllegalInstanceTransition {
                instance: self.name.clone(),
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Whether this instance accepts `request` right now.
    ///
    /// `RUNNING` accepts everything; `SHUTTING_DOWN` only work it
    /// already owns (re-entrant handling of draining requests).
    pub fn accepts(&self, request: RequestId) -> bool {
        match self.state {
            InstanceLifecycle::Running => true,
            InstanceLifecycle::ShuttingDown => self.requests.contains(&request),
            _ => false,
        }
    }

    /// True once a draining instance holds no work at all.
    pub fn is_drained(&self) -> bool {
        self.requests.is_empty() && self.cpu.is_empty()
    }
}
