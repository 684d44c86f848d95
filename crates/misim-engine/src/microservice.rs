//! The microservice model: operations, the instance pool, and the
//! service-scoped pattern configuration.

use misim_core::SimTime;
use misim_patterns::{
    AutoscalingStrategy, BalancingKind, CircuitBreaker, LoadBalancingStrategy, RetryPolicy,
};

use crate::cpu::SchedulingKind;
use crate::ids::{InstanceId, OperationRef, ServiceId};

/// A declared call from one operation to another, taken with the given
/// probability per request.
#[derive(Debug, Clone, Copy)]
pub struct OperationDependency {
    pub target: OperationRef,
    pub probability: f64,
}

/// An endpoint of a microservice.
#[derive(Debug, Clone)]
pub struct Operation {
    pub name: String,
    /// CPU work units one request of this operation costs.
    pub demand: f64,
    pub dependencies: Vec<OperationDependency>,
}

/// Per-dependency retry configuration, instantiated per instance.
#[derive(Debug, Clone, Copy)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_interval: SimTime,
    pub multiplier: f64,
    pub jitter: SimTime,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_interval: SimTime::from_secs(1.0),
            multiplier: 2.0,
            jitter: SimTime::ZERO,
        }
    }
}

impl RetrySettings {
    pub(crate) fn instantiate(&self, name: String) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(self.max_attempts)
            .base_interval(self.base_interval)
            .multiplier(self.multiplier)
            .jitter(self.jitter)
            .name(name)
            .build()
    }
}

/// Per-target circuit-breaker configuration, instantiated per
/// (instance, downstream service) edge on first use.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    pub failure_rate_threshold: f64,
    pub window_size: usize,
    pub minimum_calls: Option<usize>,
    pub open_duration: SimTime,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            window_size: 10,
            minimum_calls: None,
            open_duration: SimTime::from_secs(5.0),
        }
    }
}

impl BreakerSettings {
    pub(crate) fn instantiate(&self, name: String) -> CircuitBreaker {
        let mut builder = CircuitBreaker::builder()
            .failure_rate_threshold(self.failure_rate_threshold)
            .window_size(self.window_size)
            .open_duration(self.open_duration)
            .name(name);
        if let Some(minimum) = self.minimum_calls {
            builder = builder.minimum_calls(minimum);
        }
        builder.build()
    }
}

/// A microservice: static shape plus its mutable instance pool.
pub struct Microservice {
    pub id: ServiceId,
    pub name: String,
    /// CPU work units per second, per instance.
    pub capacity: f64,
    pub operations: Vec<Operation>,
    /// Non-terminal instances, oldest first.
    pub(crate) instances: Vec<InstanceId>,
    pub(crate) next_ordinal: usize,
    pub(crate) balancer: Box<dyn LoadBalancingStrategy>,
    pub(crate) autoscaler: Option<Box<dyn AutoscalingStrategy>>,
    pub retry: Option<RetrySettings>,
    pub breaker: Option<BreakerSettings>,
    pub scheduling: SchedulingKind,
}

impl Microservice {
    pub fn builder(name: impl Into<String>) -> MicroserviceBuilder {
        MicroserviceBuilder::new(name)
    }

    pub fn operation(&self, index: usize) -> &Operation {
        &self.operations[index]
    }

    /// Looks an operation up by name.
    pub fn operation_index(&self, name: &str) -> Option<usize> {
        self.operations.iter().position(|op| op.name == name)
    }

    /// `service.operation`, as used in datapoint series names.
    pub fn qualified_name(&self, index: usize) -> String {
        format!("{}.{}", self.name, self.operations[index].name)
    }

    /// The current non-terminal pool, oldest first.
    pub fn instances(&self) -> &[InstanceId] {
        &self.instances
    }
}

impl std::fmt::Debug for Microservice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Microservice")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("operations", &self.operations.len())
            .field("instances", &self.instances)
            .finish()
    }
}

/// Builder for [`Microservice`].
///
/// Defaults: capacity 1, round-robin balancing, FIFO CPU scheduling,
/// no retry, no breaker, no autoscaler.
pub struct MicroserviceBuilder {
    name: String,
    capacity: f64,
    operations: Vec<Operation>,
    balancing: BalancingKind,
    autoscaler: Option<Box<dyn AutoscalingStrategy>>,
    retry: Option<RetrySettings>,
    breaker: Option<BreakerSettings>,
    scheduling: SchedulingKind,
}

impl MicroserviceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: 1.0,
            operations: Vec::new(),
            balancing: BalancingKind::RoundRobin,
            autoscaler: None,
            retry: None,
            breaker: None,
            scheduling: SchedulingKind::Fifo,
        }
    }

    pub fn capacity(mut self, capacity: f64) -> Self {
        assert!(
            capacity.is_finite() && capacity > 0.0,
            "capacity must be positive"
        );
        self.capacity = capacity;
        self
    }

    /// Adds an operation without dependencies.
    pub fn operation(self, name: impl Into<String>, demand: f64) -> Self {
        self.operation_with_dependencies(name, demand, Vec::new())
    }

    /// Adds an operation calling other operations.
    pub fn operation_with_dependencies(
        mut self,
        name: impl Into<String>,
        demand: f64,
        dependencies: Vec<OperationDependency>,
    ) -> Self {
        self.operations.push(Operation {
            name: name.into(),
            demand,
            dependencies,
        });
        self
    }

    pub fn balancing(mut self, kind: BalancingKind) -> Self {
        self.balancing = kind;
        self
    }

    pub fn scheduling(mut self, kind: SchedulingKind) -> Self {
        self.scheduling = kind;
        self
    }

    pub fn autoscaler(mut self, strategy: Box<dyn AutoscalingStrategy>) -> Self {
        self.autoscaler = Some(strategy);
        self
    }

    pub fn retry(mut self, settings: RetrySettings) -> Self {
        self.retry = Some(settings);
        self
    }

    pub fn circuit_breaker(mut self, settings: BreakerSettings) -> Self {
        self.breaker = Some(settings);
        self
    }

    /// Finalizes the service under the id the simulation assigns.
    pub(crate) fn build(self, id: ServiceId) -> Microservice {
        Microservice {
            id,
            name: self.name,
            capacity: self.capacity,
            operations: self.operations,
            instances: Vec::new(),
            next_ordinal: 0,
            balancer: self.balancing.into_strategy(),
            autoscaler: self.autoscaler,
            retry: self.retry,
            breaker: self.breaker,
            scheduling: self.scheduling,
        }
    }
}
