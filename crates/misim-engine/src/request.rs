//! Request identity and progress.
//!
//! A request's identity (operation, requester, parentage, creation
//! time) is fixed at creation; its progress (handler, dependency
//! slots, computation) mutates as it moves through the system. A
//! request is complete when its CPU computation finished and every
//! materialized dependency was answered.

use misim_core::{EventId, SimTime};

use crate::ids::{InstanceId, OperationRef, RequestId, TransmissionId};

/// Who sent a request and expects its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requester {
    /// A load generator outside the architecture.
    External { generator: usize },
    /// Another instance, satisfying one of its dependencies.
    Instance(InstanceId),
}

/// The per-request concretization of one declared operation dependency.
///
/// At most one child request is live per slot at any time; a new child
/// may only be created after the previous one failed and is being
/// retried.
#[derive(Debug, Clone)]
pub struct DependencyInstance {
    /// The operation this slot must call.
    pub target: OperationRef,
    /// The currently or last associated child request.
    pub child: Option<RequestId>,
    /// Set when the child's answer arrived.
    pub satisfied: bool,
    /// Number of sends so far (initial send included).
    pub attempts: u32,
}

impl DependencyInstance {
    pub fn new(target: OperationRef) -> Self {
        Self {
            target,
            child: None,
            satisfied: false,
            attempts: 0,
        }
    }
}

/// A unit of work flowing through the service graph.
#[derive(Debug)]
pub struct Request {
    pub id: RequestId,
    pub operation: OperationRef,
    pub requester: Requester,
    /// For internal requests: the parent request and the dependency
    /// slot this request was created to satisfy.
    pub parent: Option<(RequestId, usize)>,
    pub created_at: SimTime,
    /// The instance that accepted this request, set on arrival.
    pub handler: Option<InstanceId>,
    /// Dependency slots, materialized when the request first arrives at
    /// its handler.
    pub dependencies: Vec<DependencyInstance>,
    /// Whether the slots were materialized yet.
    pub materialized: bool,
    /// The CPU finished this request's own demand.
    pub computed: bool,
    /// A `RequestAnswer` was emitted for this request.
    pub completed: bool,
    pub canceled: bool,
    /// In-flight transmission carrying this request, if any.
    pub transmission: Option<TransmissionId>,
    /// The round-trip timeout event, canceled on answer or failure.
    pub timeout: Option<EventId>,
}

impl Request {
    pub fn new(
        id: RequestId,
        operation: OperationRef,
        requester: Requester,
        parent: Option<(RequestId, usize)>,
        created_at: SimTime,
    ) -> Self {
        Self {
            id,
            operation,
            requester,
            parent,
            created_at,
            handler: None,
            dependencies: Vec::new(),
            materialized: false,
            computed: false,
            completed: false,
            canceled: false,
            transmission: None,
            timeout: None,
        }
    }

    /// True for requests created to satisfy a dependency.
    pub fn is_internal(&self) -> bool {
        self.parent.is_some()
    }

    /// All materialized dependency slots answered.
    pub fn dependencies_completed(&self) -> bool {
        self.dependencies.iter().all(|dep| dep.satisfied)
    }

    /// The request is ready to be answered.
    pub fn is_complete(&self) -> bool {
        self.computed && self.dependencies_completed()
    }

    /// Marks one dependency slot satisfied; returns true when it was
    /// the last outstanding one.
    pub fn notify_dependency_finished(&mut self, dep_index: usize) -> bool {
        self.dependencies[dep_index].satisfied = true;
        self.dependencies_completed()
    }

    /// Indices of slots still waiting for an answer.
    pub fn open_dependency_indices(&self) -> Vec<usize> {
        self.dependencies
            .iter()
            .enumerate()
            .filter(|(_, dep)| !dep.satisfied)
            .map(|(i, _)| i)
            .collect()
    }
}
