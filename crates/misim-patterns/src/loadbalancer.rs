//! Load-balancing strategies.
//!
//! A strategy picks one candidate index given the candidates' current
//! CPU usages. The engine builds the candidate list (only `RUNNING`
//! instances qualify) and owns the refusal path when it comes back
//! empty.

use misim_core::SimRng;

/// Picks a target among candidate instances.
///
/// `usages` holds one `cpu.current_usage()` value per candidate, in a
/// stable order chosen by the caller. Returns the selected index, or
/// `None` when there are no candidates.
pub trait LoadBalancingStrategy: std::fmt::Debug {
    fn select(&mut self, usages: &[f64], rng: &mut SimRng) -> Option<usize>;
}

/// Strategy selector, as named in architecture descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalancingKind {
    #[default]
    RoundRobin,
    Random,
    LeastUtilized,
}

impl BalancingKind {
    /// Instantiates the strategy this kind names.
    pub fn into_strategy(self) -> Box<dyn LoadBalancingStrategy> {
        match self {
            BalancingKind::RoundRobin => Box::new(RoundRobin::new()),
            BalancingKind::Random => Box::new(Random),
            BalancingKind::LeastUtilized => Box::new(LeastUtilized),
        }
    }
}

/// Cycles through candidates in order.
///
/// The cursor survives pool resizes; it is reduced modulo the current
/// candidate count on every pick.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancingStrategy for RoundRobin {
    fn select(&mut self, usages: &[f64], _rng: &mut SimRng) -> Option<usize> {
        if usages.is_empty() {
            return None;
        }
        let picked = self.next % usages.len();
        self.next = picked + 1;
        Some(picked)
    }
}

/// Picks uniformly at random from the seeded run RNG.
#[derive(Debug, Default)]
pub struct Random;

impl LoadBalancingStrategy for Random {
    fn select(&mut self, usages: &[f64], rng: &mut SimRng) -> Option<usize> {
        if usages.is_empty() {
            return None;
        }
        Some(rng.index(usages.len()))
    }
}

/// Picks the candidate with the lowest CPU usage; first wins ties.
#[derive(Debug, Default)]
pub struct LeastUtilized;

impl LoadBalancingStrategy for LeastUtilized {
    fn select(&mut self, usages: &[f64], _rng: &mut SimRng) -> Option<usize> {
        usages
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i)
    }
}
