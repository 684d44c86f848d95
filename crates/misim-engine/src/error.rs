//! Engine error types and the user-visible request failure taxonomy.

use misim_core::ScheduleError;

use crate::instance::InstanceLifecycle;

/// Why a request failed, as visible to its sender and in datapoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The round trip did not complete within the timeout.
    Timeout,
    /// The handling instance died mid-flight.
    ConnectionReset,
    /// The sender's circuit breaker for the target is open.
    CircuitIsOpen,
    /// The breaker's half-open probe slot was already taken.
    RequestVolumeReached,
    /// The retry budget for the dependency ran out.
    MaxRetriesReached,
    /// A child dependency failed and could not be recovered.
    DependencyNotAvailable,
    /// The target instance refused the request because of its state.
    HandlerUnavailable,
    /// The load balancer found no running instance.
    NoInstance,
}

impl FailureReason {
    /// Terminal reasons are never retried.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FailureReason::CircuitIsOpen
                | FailureReason::RequestVolumeReached
                | FailureReason::MaxRetriesReached
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::Timeout => "Timeout",
            FailureReason::ConnectionReset => "ConnectionReset",
            FailureReason::CircuitIsOpen => "CircuitIsOpen",
            FailureReason::RequestVolumeReached => "RequestVolumeReached",
            FailureReason::MaxRetriesReached => "MaxRetriesReached",
            FailureReason::DependencyNotAvailable => "DependencyNotAvailable",
            FailureReason::HandlerUnavailable => "HandlerUnavailable",
            FailureReason::NoInstance => "NoInstance",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort a simulation run.
///
/// These are programmer or model errors, not simulated failures:
/// simulated failures are [`FailureReason`] values that flow through
/// the listener chain instead.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    /// A lifecycle transition from a state that does not allow it.
    #[error("illegal transition for instance {instance}: {from:?} -> {to:?}")]
    IllegalInstanceTransition {
        instance: String,
        from: InstanceLifecycle,
        to: InstanceLifecycle,
    },

    /// An instance refused a request because of its lifecycle state.
    #[error("instance {instance} cannot handle requests while {state:?}")]
    CannotHandle {
        instance: String,
        state: InstanceLifecycle,
    },

    /// An answer arrived for a dependency that is no longer open.
    /// Tolerated (logged and dropped) on the delivery path.
    #[error("stale answer for request {request}")]
    StaleAnswer { request: usize },

    /// A named entity was not found while wiring the model.
    #[error("unknown {kind} `{name}`")]
    UnknownEntity { kind: &'static str, name: String },
}
