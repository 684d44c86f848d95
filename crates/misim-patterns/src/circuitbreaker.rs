//! Circuit breaker over a rolling window of call outcomes.
//!
//! One breaker guards one (caller instance, target service) edge. The
//! engine asks [`CircuitBreaker::try_acquire`] before sending and feeds
//! the outcome back with `record_success`/`record_failure`. All timing
//! is virtual: "open" expiry is evaluated lazily against the clock
//! value the engine passes in.

use std::collections::VecDeque;

use misim_core::listener::{EventListeners, PatternEvent};
use misim_core::SimTime;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected without network traversal.
    Open,
    /// One probe call is admitted to test recovery.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

/// Outcome of asking the breaker for permission to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed.
    Permitted,
    /// The circuit is open; fail immediately.
    CircuitOpen,
    /// Half-open and the probe slot is taken; fail immediately.
    ProbePending,
}

/// Events emitted by a circuit breaker.
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    StateTransition {
        pattern_name: String,
        time: SimTime,
        from: CircuitState,
        to: CircuitState,
    },
    CallRejected {
        pattern_name: String,
        time: SimTime,
        state: CircuitState,
    },
}

impl PatternEvent for CircuitBreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::StateTransition { .. } => "StateTransition",
            CircuitBreakerEvent::CallRejected { .. } => "CallRejected",
        }
    }

    fn time(&self) -> SimTime {
        match self {
            CircuitBreakerEvent::StateTransition { time, .. }
            | CircuitBreakerEvent::CallRejected { time, .. } => *time,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            CircuitBreakerEvent::StateTransition { pattern_name, .. }
            | CircuitBreakerEvent::CallRejected { pattern_name, .. } => pattern_name,
        }
    }
}

/// Circuit breaker state machine.
pub struct CircuitBreaker {
    state: CircuitState,
    opened_at: SimTime,
    /// Rolling window of outcomes, `true` = failure.
    window: VecDeque<bool>,
    probe_in_flight: bool,
    // config
    failure_rate_threshold: f64,
    window_size: usize,
    minimum_calls: usize,
    open_duration: SimTime,
    name: String,
    listeners: EventListeners<CircuitBreakerEvent>,
}

impl CircuitBreaker {
    pub fn builder() -> CircuitBreakerBuilder {
        CircuitBreakerBuilder::new()
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Asks for permission to send at virtual time `now`.
    pub fn try_acquire(&mut self, now: SimTime) -> Admission {
        match self.state {
            CircuitState::Closed => Admission::Permitted,
            CircuitState::Open => {
                if now.since(self.opened_at) >= self.open_duration {
                    self.transition(CircuitState::HalfOpen, now);
                    self.probe_in_flight = true;
                    Admission::Permitted
                } else {
                    self.reject(now);
                    Admission::CircuitOpen
                }
            }
            CircuitState::HalfOpen => {
                if self.probe_in_flight {
                    self.reject(now);
                    Admission::ProbePending
                } else {
                    self.probe_in_flight = true;
                    Admission::Permitted
                }
            }
        }
    }

    /// Records a successful call outcome.
    pub fn record_success(&mut self, now: SimTime) {
        match self.state {
            CircuitState::HalfOpen => {
                self.probe_in_flight = false;
                self.transition(CircuitState::Closed, now);
            }
            _ => {
                self.push_outcome(false);
                self.evaluate(now);
            }
        }
    }

    /// Records a failed call outcome.
    pub fn record_failure(&mut self, now: SimTime) {
        match self.state {
            CircuitState::HalfOpen => {
                self.probe_in_flight = false;
                self.transition(CircuitState::Open, now);
            }
            _ => {
                self.push_outcome(true);
                self.evaluate(now);
            }
        }
    }

    /// Current failure rate over the window, 0 when below the call floor.
    pub fn failure_rate(&self) -> f64 {
        if self.window.len() < self.minimum_calls {
            return 0.0;
        }
        let failures = self.window.iter().filter(|f| **f).count();
        failures as f64 / self.window.len() as f64
    }

    fn push_outcome(&mut self, failure: bool) {
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(failure);
    }

    fn evaluate(&mut self, now: SimTime) {
        if self.state == CircuitState::Open {
            return;
        }
        if self.window.len() < self.minimum_calls {
            return;
        }
        if self.failure_rate() >= self.failure_rate_threshold {
            self.transition(CircuitState::Open, now);
        }
    }

    fn reject(&mut self, now: SimTime) {
        let event = CircuitBreakerEvent::CallRejected {
            pattern_name: self.name.clone(),
            time: now,
            state: self.state,
        };
        self.listeners.emit(&event);
    }

    fn transition(&mut self, to: CircuitState, now: SimTime) {
        if self.state == to {
            return;
        }
        let from = self.state;

        #[cfg(feature = "tracing")]
        tracing::debug!(breaker = %self.name, from = ?from, to = ?to, "circuit state transition");

        self.state = to;
        if to == CircuitState::Open {
            self.opened_at = now;
        }
        self.window.clear();
        let event = CircuitBreakerEvent::StateTransition {
            pattern_name: self.name.clone(),
            time: now,
            from,
            to,
        };
        self.listeners.emit(&event);
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("window", &self.window.len())
            .finish()
    }
}

/// Builder for [`CircuitBreaker`].
///
/// Defaults: 50% failure threshold over a 10-call window, 10-call floor,
/// 5s open duration.
pub struct CircuitBreakerBuilder {
    failure_rate_threshold: f64,
    window_size: usize,
    minimum_calls: Option<usize>,
    open_duration: SimTime,
    name: String,
    listeners: EventListeners<CircuitBreakerEvent>,
}

impl CircuitBreakerBuilder {
    pub fn new() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            window_size: 10,
            minimum_calls: None,
            open_duration: SimTime::from_secs(5.0),
            name: String::from("<unnamed>"),
            listeners: EventListeners::new(),
        }
    }

    /// Failure rate in `[0, 1]` at which the circuit opens.
    pub fn failure_rate_threshold(mut self, rate: f64) -> Self {
        assert!((0.0..=1.0).contains(&rate), "threshold must be in [0, 1]");
        self.failure_rate_threshold = rate;
        self
    }

    /// Number of most recent call outcomes considered.
    pub fn window_size(mut self, size: usize) -> Self {
        assert!(size > 0, "window size must be positive");
        self.window_size = size;
        self
    }

    /// Minimum recorded calls before the rate is evaluated.
    /// Defaults to the window size.
    pub fn minimum_calls(mut self, calls: usize) -> Self {
        self.minimum_calls = Some(calls);
        self
    }

    /// How long the circuit stays open before admitting a probe.
    pub fn open_duration(mut self, duration: SimTime) -> Self {
        self.open_duration = duration;
        self
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback on every state transition.
    pub fn on_transition<F>(mut self, mut f: F) -> Self
    where
        F: FnMut(CircuitState, CircuitState) + 'static,
    {
        self.listeners.add(misim_core::FnListener::new(
            move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::StateTransition { from, to, .. } = event {
                    f(*from, *to);
                }
            },
        ));
        self
    }

    pub fn build(self) -> CircuitBreaker {
        let minimum_calls = self.minimum_calls.unwrap_or(self.window_size);
        CircuitBreaker {
            state: CircuitState::Closed,
            opened_at: SimTime::ZERO,
            window: VecDeque::with_capacity(self.window_size),
            probe_in_flight: false,
            failure_rate_threshold: self.failure_rate_threshold,
            window_size: self.window_size,
            minimum_calls,
            open_duration: self.open_duration,
            name: self.name,
            listeners: self.listeners,
        }
    }
}

impl Default for CircuitBreakerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
