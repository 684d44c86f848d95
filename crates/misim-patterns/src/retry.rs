//! Retry with exponential backoff, capped attempts, and optional jitter.
//!
//! The policy only computes delays; the attempt counter lives with the
//! dependency slot it protects, and the engine schedules the actual
//! resend event.

use misim_core::listener::{EventListeners, PatternEvent};
use misim_core::{SimRng, SimTime};

/// Events emitted by a retry policy.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A retry is about to be scheduled.
    Attempt {
        pattern_name: String,
        time: SimTime,
        attempt: u32,
        delay: SimTime,
    },
    /// All attempts are used up; the failure becomes terminal.
    Exhausted {
        pattern_name: String,
        time: SimTime,
        attempts: u32,
    },
}

impl PatternEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Attempt { .. } => "Attempt",
            RetryEvent::Exhausted { .. } => "Exhausted",
        }
    }

    fn time(&self) -> SimTime {
        match self {
            RetryEvent::Attempt { time, .. } | RetryEvent::Exhausted { time, .. } => *time,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            RetryEvent::Attempt { pattern_name, .. }
            | RetryEvent::Exhausted { pattern_name, .. } => pattern_name,
        }
    }
}

/// Exponential-backoff retry policy.
///
/// `max_attempts` counts every send of a dependency's child request,
/// the initial one included: `max_attempts = 3` means one initial send
/// plus two retries.
pub struct RetryPolicy {
    max_attempts: u32,
    base_interval: SimTime,
    multiplier: f64,
    jitter: SimTime,
    name: String,
    listeners: EventListeners<RetryEvent>,
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Computes the backoff delay before the next attempt, or `None`
    /// when the budget is exhausted.
    ///
    /// `failed_attempts` is the number of sends that have already
    /// failed (1 after the initial send failed). The delay is
    /// `base * multiplier^(failed_attempts - 1)` plus a uniform jitter
    /// in `[0, jitter]`.
    pub fn next_delay(
        &mut self,
        now: SimTime,
        failed_attempts: u32,
        rng: &mut SimRng,
    ) -> Option<SimTime> {
        debug_assert!(failed_attempts >= 1, "no failure recorded yet");
        if failed_attempts >= self.max_attempts {
            self.listeners.emit(&RetryEvent::Exhausted {
                pattern_name: self.name.clone(),
                time: now,
                attempts: failed_attempts,
            });
            return None;
        }
        let exponent = (failed_attempts - 1).min(30);
        let backoff = self.base_interval.as_secs() * self.multiplier.powi(exponent as i32);
        let jitter = self.jitter.as_secs() * rng.f64();
        let delay = SimTime::from_secs(backoff + jitter);
        self.listeners.emit(&RetryEvent::Attempt {
            pattern_name: self.name.clone(),
            time: now,
            attempt: failed_attempts,
            delay,
        });
        Some(delay)
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("name", &self.name)
            .field("max_attempts", &self.max_attempts)
            .field("base_interval", &self.base_interval)
            .field("multiplier", &self.multiplier)
            .field("jitter", &self.jitter)
            .finish()
    }
}

/// Builder for [`RetryPolicy`].
///
/// Defaults: 3 attempts, 1s base interval, multiplier 2, no jitter.
pub struct RetryPolicyBuilder {
    max_attempts: u32,
    base_interval: SimTime,
    multiplier: f64,
    jitter: SimTime,
    name: String,
    listeners: EventListeners<RetryEvent>,
}

impl RetryPolicyBuilder {
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            base_interval: SimTime::from_secs(1.0),
            multiplier: 2.0,
            jitter: SimTime::ZERO,
            name: String::from("<unnamed>"),
            listeners: EventListeners::new(),
        }
    }

    /// Total attempt budget, the initial send included. Must be >= 1.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        assert!(max_attempts >= 1, "max_attempts must be at least 1");
        self.max_attempts = max_attempts;
        self
    }

    /// Delay before the first retry.
    pub fn base_interval(mut self, interval: SimTime) -> Self {
        self.base_interval = interval;
        self
    }

    /// Backoff growth factor per failed attempt.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        assert!(multiplier >= 1.0, "multiplier must be >= 1");
        self.multiplier = multiplier;
        self
    }

    /// Upper bound of the uniform jitter added to each delay.
    pub fn jitter(mut self, jitter: SimTime) -> Self {
        self.jitter = jitter;
        self
    }

    /// Name used in emitted events.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked when a retry is scheduled.
    pub fn on_retry<F>(mut self, mut f: F) -> Self
    where
        F: FnMut(u32, SimTime) + 'static,
    {
        self.listeners
            .add(misim_core::FnListener::new(move |event: &RetryEvent| {
                if let RetryEvent::Attempt { attempt, delay, .. } = event {
                    f(*attempt, *delay);
                }
            }));
        self
    }

    /// Registers a callback invoked when the attempt budget runs out.
    pub fn on_exhausted<F>(mut self, mut f: F) -> Self
    where
        F: FnMut(u32) + 'static,
    {
        self.listeners
            .add(misim_core::FnListener::new(move |event: &RetryEvent| {
                if let RetryEvent::Exhausted { attempts, .. } = event {
                    f(*attempts);
                }
            }));
        self
    }

    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_interval: self.base_interval,
            multiplier: self.multiplier,
            jitter: self.jitter,
            name: self.name,
            listeners: self.listeners,
        }
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
