//! Load generation.
//!
//! A load generator is a scheduled entity: each firing injects one or
//! more external requests and schedules the next firing from its
//! arrival profile. Profiles are in-memory value sequences; reading
//! Limbo model files happens outside this crate.

use misim_core::SimTime;
use misim_engine::{LoadDriver, OperationRef, Simulation, SimulationError};
use serde::{Deserialize, Serialize};

use crate::error::ExperimentError;

/// How a profile point's rate is spread over its interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrivalDistribution {
    /// `r` arrivals spread evenly across `[t, t + 1)`.
    #[default]
    Even,
    /// All `r` arrivals at exactly `t`.
    Spike,
}

/// An arrival-rate profile: `(offset_seconds, rate)` pairs with
/// ascending offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct LimboProfile {
    points: Vec<(f64, f64)>,
}

impl LimboProfile {
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self, ExperimentError> {
        for window in points.windows(2) {
            if window[1].0 < window[0].0 {
                return Err(ExperimentError::InvalidDescription(
                    "profile offsets must be ascending".into(),
                ));
            }
        }
        if points
            .iter()
            .any(|(offset, rate)| !offset.is_finite() || *offset < 0.0 || !rate.is_finite())
        {
            return Err(ExperimentError::InvalidDescription(
                "profile values must be finite and offsets non-negative".into(),
            ));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// The last offset; the wrap period when repeating.
    pub fn last_offset(&self) -> f64 {
        self.points.last().map(|(offset, _)| *offset).unwrap_or(0.0)
    }
}

#[derive(Debug)]
enum GeneratorKind {
    Limbo {
        profile: LimboProfile,
        repeating: bool,
        start_offset: f64,
        distribution: ArrivalDistribution,
        /// Current profile index.
        point: usize,
        /// Arrivals already emitted for the current point (even mode).
        emitted: usize,
        /// Completed wraps of a repeating profile.
        cycle: u64,
    },
    Interval {
        interval: f64,
        start_offset: f64,
        remaining: Option<u64>,
    },
}

/// One runtime load generator.
#[derive(Debug)]
pub struct LoadGenerator {
    operation: OperationRef,
    kind: GeneratorKind,
}

impl LoadGenerator {
    pub fn limbo(
        operation: OperationRef,
        profile: LimboProfile,
        repeating: bool,
        start_offset: f64,
        distribution: ArrivalDistribution,
    ) -> Self {
        Self {
            operation,
            kind: GeneratorKind::Limbo {
                profile,
                repeating,
                start_offset,
                distribution,
                point: 0,
                emitted: 0,
                cycle: 0,
            },
        }
    }

    pub fn interval(
        operation: OperationRef,
        interval: f64,
        start_offset: f64,
        limit: Option<u64>,
    ) -> Self {
        Self {
            operation,
            kind: GeneratorKind::Interval {
                interval,
                start_offset,
                remaining: limit,
            },
        }
    }

    /// When this generator first fires, or `None` if it never will.
    pub fn first_fire(&self) -> Option<SimTime> {
        match &self.kind {
            GeneratorKind::Limbo {
                profile,
                start_offset,
                ..
            } => profile
                .points()
                .first()
                .map(|(offset, _)| SimTime::from_secs(start_offset + offset)),
            GeneratorKind::Interval {
                start_offset,
                remaining,
                ..
            } => match remaining {
                Some(0) => None,
                _ => Some(SimTime::from_secs(*start_offset)),
            },
        }
    }

    /// Handles one firing: injects arrivals due now and schedules the
    /// next firing, if any.
    pub fn fire(&mut self, sim: &mut Simulation, index: usize) -> Result<(), SimulationError> {
        let operation = self.operation;
        match &mut self.kind {
            GeneratorKind::Limbo {
                profile,
                repeating,
                start_offset,
                distribution,
                point,
                emitted,
                cycle,
            } => {
                let Some(&(_, rate)) = profile.points().get(*point) else {
                    return Ok(());
                };
                let rate = rate.round().max(0.0) as usize;

                match distribution {
                    ArrivalDistribution::Spike => {
                        for _ in 0..rate {
                            sim.inject_request(operation, index)?;
                        }
                        *emitted = rate;
                    }
                    ArrivalDistribution::Even => {
                        if *emitted < rate {
                            sim.inject_request(operation, index)?;
                            *emitted += 1;
                        }
                    }
                }

                let period = profile.last_offset();
                let next = if *emitted < rate {
                    // More arrivals of this point, evenly spaced.
                    let (offset, _) = profile.points()[*point];
                    Some(*start_offset + *cycle as f64 * period + offset
                        + *emitted as f64 / rate as f64)
                } else {
                    *point += 1;
                    *emitted = 0;
                    if *point >= profile.points().len() {
                        // Wrap with the last timestamp as period.
                        if *repeating && period > 0.0 {
                            *point = 0;
                            *cycle += 1;
                        } else {
                            return Ok(());
                        }
                    }
                    let (offset, _) = profile.points()[*point];
                    Some(*start_offset + *cycle as f64 * period + offset)
                };

                if let Some(time) = next {
                    sim.schedule_generator_fire(index, SimTime::from_secs(time))?;
                }
                Ok(())
            }
            GeneratorKind::Interval {
                interval,
                remaining,
                ..
            } => {
                if let Some(left) = remaining {
                    if *left == 0 {
                        return Ok(());
                    }
                    *left -= 1;
                }
                sim.inject_request(operation, index)?;
                let reschedule = remaining.map(|left| left > 0).unwrap_or(true);
                if reschedule {
                    let next = sim.now() + SimTime::from_secs(*interval);
                    sim.schedule_generator_fire(index, next)?;
                }
                Ok(())
            }
        }
    }
}

/// The [`LoadDriver`] the runner hands to the engine: a vector of
/// generators addressed by index.
#[derive(Debug, Default)]
pub struct ExperimentDriver {
    generators: Vec<LoadGenerator>,
}

impl ExperimentDriver {
    pub fn new(generators: Vec<LoadGenerator>) -> Self {
        Self { generators }
    }

    /// Schedules every generator's first firing.
    pub fn install(&self, sim: &mut Simulation) -> Result<(), SimulationError> {
        for (index, generator) in self.generators.iter().enumerate() {
            if let Some(time) = generator.first_fire() {
                sim.schedule_generator_fire(index, time)?;
            }
        }
        Ok(())
    }
}

impl LoadDriver for ExperimentDriver {
    fn fire(&mut self, sim: &mut Simulation, generator: usize) -> Result<(), SimulationError> {
        self.generators[generator].fire(sim, generator)
    }
}
