//! Property tests for the resilience pattern state machines.
//!
//! Invariants tested:
//! - Retry never grants more sends than its attempt budget
//! - Backoff delays are monotonically non-decreasing without jitter
//! - The breaker opens exactly when the windowed rate crosses the
//!   threshold, and only with enough calls recorded
//! - Balancer picks are always in bounds

use misim_core::{SimRng, SimTime};
use misim_patterns::{
    Admission, CircuitBreaker, CircuitState, LeastUtilized, LoadBalancingStrategy, Random,
    RetryPolicy, RoundRobin,
};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Property: the number of granted retries is exactly
    /// `max_attempts - 1`, whatever the backoff shape.
    #[test]
    fn retry_budget_is_exact(
        max_attempts in 1u32..20,
        base in 0.01f64..5.0,
        multiplier in 1.0f64..4.0,
    ) {
        let mut policy = RetryPolicy::builder()
            .max_attempts(max_attempts)
            .base_interval(SimTime::from_secs(base))
            .multiplier(multiplier)
            .build();
        let mut rng = SimRng::new(0);

        let mut granted = 0;
        for failed in 1..=max_attempts + 5 {
            if policy.next_delay(SimTime::ZERO, failed, &mut rng).is_some() {
                granted += 1;
            }
        }
        prop_assert_eq!(granted, max_attempts - 1);
    }

    /// Property: without jitter, each successive delay is at least as
    /// long as the previous one.
    #[test]
    fn backoff_is_monotone(
        max_attempts in 3u32..16,
        base in 0.01f64..2.0,
        multiplier in 1.0f64..3.0,
    ) {
        let mut policy = RetryPolicy::builder()
            .max_attempts(max_attempts)
            .base_interval(SimTime::from_secs(base))
            .multiplier(multiplier)
            .build();
        let mut rng = SimRng::new(0);

        let mut last = SimTime::ZERO;
        for failed in 1..max_attempts {
            let delay = policy
                .next_delay(SimTime::ZERO, failed, &mut rng)
                .expect("within budget");
            prop_assert!(delay >= last);
            last = delay;
        }
    }

    /// Property: the breaker opens iff the windowed failure rate
    /// reaches the threshold once the call floor is met.
    #[test]
    fn breaker_threshold_is_sharp(
        window in 2usize..40,
        failures in 0usize..40,
        threshold in 0.1f64..1.0,
    ) {
        let failures = failures.min(window);
        let mut breaker = CircuitBreaker::builder()
            .window_size(window)
            .minimum_calls(window)
            .failure_rate_threshold(threshold)
            .build();

        // Fill exactly one window: failures first, then successes. The
        // rate is only evaluated once the call floor is met, which is
        // the final record.
        for _ in 0..failures {
            breaker.record_failure(SimTime::ZERO);
        }
        for _ in 0..window - failures {
            breaker.record_success(SimTime::ZERO);
        }

        let rate = failures as f64 / window as f64;
        if rate >= threshold {
            prop_assert_eq!(breaker.state(), CircuitState::Open);
        } else {
            prop_assert_eq!(breaker.state(), CircuitState::Closed);
        }
    }

    /// Property: every strategy picks in bounds for any usage vector.
    #[test]
    fn balancer_picks_are_in_bounds(
        usages in proptest::collection::vec(0.0f64..2.0, 0..16),
        seed in any::<u64>(),
    ) {
        let mut rng = SimRng::new(seed);
        let strategies: Vec<Box<dyn LoadBalancingStrategy>> = vec![
            Box::new(RoundRobin::new()),
            Box::new(Random),
            Box::new(LeastUtilized),
        ];
        for mut strategy in strategies {
            match strategy.select(&usages, &mut rng) {
                Some(picked) => prop_assert!(picked < usages.len()),
                None => prop_assert!(usages.is_empty()),
            }
        }
    }
}

#[test]
fn half_open_admits_exactly_one_probe() {
    let mut breaker = CircuitBreaker::builder()
        .window_size(4)
        .open_duration(SimTime::from_secs(1.0))
        .build();
    for _ in 0..4 {
        breaker.record_failure(SimTime::ZERO);
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let later = SimTime::from_secs(1.0);
    assert_eq!(breaker.try_acquire(later), Admission::Permitted);
    assert_eq!(breaker.try_acquire(later), Admission::ProbePending);
    assert_eq!(breaker.try_acquire(later), Admission::ProbePending);
}
