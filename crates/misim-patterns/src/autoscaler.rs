//! Periodic autoscaling driven by relative work demand.
//!
//! The engine ticks the strategy every `period` with the average
//! relative work demand across the service's running instances; the
//! strategy answers with a new target count or `None` to hold.

use misim_core::listener::{EventListeners, PatternEvent};
use misim_core::SimTime;

/// Events emitted by an autoscaling strategy.
#[derive(Debug, Clone)]
pub enum AutoscalerEvent {
    /// A new target instance count was decided.
    ScalingDecision {
        pattern_name: String,
        time: SimTime,
        from: usize,
        to: usize,
        demand: f64,
    },
}

impl PatternEvent for AutoscalerEvent {
    fn event_type(&self) -> &'static str {
        "ScalingDecision"
    }

    fn time(&self) -> SimTime {
        match self {
            AutoscalerEvent::ScalingDecision { time, .. } => *time,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            AutoscalerEvent::ScalingDecision { pattern_name, .. } => pattern_name,
        }
    }
}

/// A periodic scaling policy.
pub trait AutoscalingStrategy: std::fmt::Debug {
    /// The tick interval.
    fn period(&self) -> SimTime;

    /// Decides a new instance count given the average relative work
    /// demand per running instance. `None` means no change.
    fn evaluate(&mut self, now: SimTime, average_demand: f64, current_count: usize)
        -> Option<usize>;
}

/// Watermark-based reactive autoscaler.
///
/// Scales one step at a time: up when demand exceeds the high
/// watermark, down when it falls below the low one, always within
/// `[min, max]` and never twice within the cooldown window.
pub struct ReactiveAutoscaler {
    period: SimTime,
    min_instances: usize,
    max_instances: usize,
    low_watermark: f64,
    high_watermark: f64,
    cooldown: SimTime,
    last_adjustment: Option<SimTime>,
    name: String,
    listeners: EventListeners<AutoscalerEvent>,
}

impl ReactiveAutoscaler {
    pub fn builder() -> ReactiveAutoscalerBuilder {
        ReactiveAutoscalerBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ReactiveAutoscaler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveAutoscaler")
            .field("name", &self.name)
            .field("period", &self.period)
            .field("bounds", &(self.min_instances, self.max_instances))
            .field("watermarks", &(self.low_watermark, self.high_watermark))
            .finish()
    }
}

impl AutoscalingStrategy for ReactiveAutoscaler {
    fn period(&self) -> SimTime {
        self.period
    }

    fn evaluate(
        &mut self,
        now: SimTime,
        average_demand: f64,
        current_count: usize,
    ) -> Option<usize> {
        if let Some(last) = self.last_adjustment {
            if now.since(last) < self.cooldown {
                return None;
            }
        }

        let target = if average_demand > self.high_watermark {
            (current_count + 1).min(self.max_instances)
        } else if average_demand < self.low_watermark {
            current_count.saturating_sub(1).max(self.min_instances)
        } else {
            current_count
        };

        if target == current_count {
            return None;
        }
        self.last_adjustment = Some(now);
        self.listeners.emit(&AutoscalerEvent::ScalingDecision {
            pattern_name: self.name.clone(),
            time: now,
            from: current_count,
            to: target,
            demand: average_demand,
        });

        #[cfg(feature = "tracing")]
        tracing::debug!(
            autoscaler = %self.name,
            from = current_count,
            to = target,
            demand = average_demand,
            "scaling decision"
        );

        Some(target)
    }
}

/// Builder for [`ReactiveAutoscaler`].
///
/// Defaults: 1s period, bounds `[1, 10]`, watermarks 0.25/0.75, no
/// cooldown.
pub struct ReactiveAutoscalerBuilder {
    period: SimTime,
    min_instances: usize,
    max_instances: usize,
    low_watermark: f64,
    high_watermark: f64,
    cooldown: SimTime,
    name: String,
    listeners: EventListeners<AutoscalerEvent>,
}

impl ReactiveAutoscalerBuilder {
    pub fn new() -> Self {
        Self {
            period: SimTime::from_secs(1.0),
            min_instances: 1,
            max_instances: 10,
            low_watermark: 0.25,
            high_watermark: 0.75,
            cooldown: SimTime::ZERO,
            name: String::from("<unnamed>"),
            listeners: EventListeners::new(),
        }
    }

    pub fn period(mut self, period: SimTime) -> Self {
        assert!(period > SimTime::ZERO, "period must be positive");
        self.period = period;
        self
    }

    pub fn bounds(mut self, min: usize, max: usize) -> Self {
        assert!(min <= max, "min bound must not exceed max");
        self.min_instances = min;
        self.max_instances = max;
        self
    }

    pub fn watermarks(mut self, low: f64, high: f64) -> Self {
        assert!(low <= high, "low watermark must not exceed high");
        self.low_watermark = low;
        self.high_watermark = high;
        self
    }

    /// Minimum spacing between two adjustments.
    pub fn cooldown(mut self, cooldown: SimTime) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback on every scaling decision.
    pub fn on_decision<F>(mut self, mut f: F) -> Self
    where
        F: FnMut(usize, usize) + 'static,
    {
        self.listeners
            .add(misim_core::FnListener::new(move |event: &AutoscalerEvent| {
                let AutoscalerEvent::ScalingDecision { from, to, .. } = event;
                f(*from, *to);
            }));
        self
    }

    pub fn build(self) -> ReactiveAutoscaler {
        ReactiveAutoscaler {
            period: self.period,
            min_instances: self.min_instances,
            max_instances: self.max_instances,
            low_watermark: self.low_watermark,
            high_watermark: self.high_watermark,
            cooldown: self.cooldown,
            last_adjustment: None,
            name: self.name,
            listeners: self.listeners,
        }
    }
}

impl Default for ReactiveAutoscalerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scaler() -> ReactiveAutoscaler {
        ReactiveAutoscaler::builder()
            .period(SimTime::from_secs(1.0))
            .bounds(1, 3)
            .watermarks(0.2, 0.8)
            .name("test")
            .build()
    }

    fn at(secs: f64) -> SimTime {
        SimTime::from_secs(secs)
    }

    #[test]
    fn scales_up_one_step_above_high_watermark() {
        let mut scaler = scaler();
        assert_eq!(scaler.evaluate(at(1.0), 0.9, 1), Some(2));
        assert_eq!(scaler.evaluate(at(2.0), 0.9, 2), Some(3));
        // Capped at max.
        assert_eq!(scaler.evaluate(at(3.0), 0.9, 3), None);
    }

    #[test]
    fn scales_down_below_low_watermark() {
        let mut scaler = scaler();
        assert_eq!(scaler.evaluate(at(1.0), 0.1, 3), Some(2));
        assert_eq!(scaler.evaluate(at(2.0), 0.1, 2), Some(1));
        // Floored at min.
        assert_eq!(scaler.evaluate(at(3.0), 0.1, 1), None);
    }

    #[test]
    fn holds_between_watermarks() {
        let mut scaler = scaler();
        assert_eq!(scaler.evaluate(at(1.0), 0.5, 2), None);
    }

    #[test]
    fn respects_cooldown() {
        let mut scaler = ReactiveAutoscaler::builder()
            .bounds(1, 5)
            .watermarks(0.2, 0.8)
            .cooldown(SimTime::from_secs(3.0))
            .build();
        assert_eq!(scaler.evaluate(at(1.0), 0.9, 1), Some(2));
        // Still cooling down.
        assert_eq!(scaler.evaluate(at(2.0), 0.9, 2), None);
        assert_eq!(scaler.evaluate(at(3.9), 0.9, 2), None);
        assert_eq!(scaler.evaluate(at(4.0), 0.9, 2), Some(3));
    }
}
