//! Property tests for the event scheduler.
//!
//! Invariants tested:
//! - Dequeue order is `(time asc, seq asc)` for any schedule sequence
//! - The clock never decreases
//! - Canceled events are never delivered
//! - Same-time events preserve insertion order

use misim_core::{ScheduleError, Scheduler, SimTime};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: for all schedules, dequeued events come out in strict
    /// (time, seq) order and the clock never moves backwards.
    #[test]
    fn dequeue_order_is_time_then_seq(
        times in proptest::collection::vec(0.0f64..1000.0, 1..100),
    ) {
        let mut scheduler = Scheduler::new();
        for (i, t) in times.iter().enumerate() {
            scheduler.schedule(SimTime::from_secs(*t), i).unwrap();
        }

        let mut previous: Option<(SimTime, u64)> = None;
        while let Some(fired) = scheduler.pop() {
            prop_assert_eq!(fired.time, scheduler.now());
            if let Some((prev_time, prev_seq)) = previous {
                prop_assert!(fired.time >= prev_time, "clock went backwards");
                if fired.time == prev_time {
                    prop_assert!(fired.id.seq() > prev_seq, "same-time events out of order");
                }
            }
            previous = Some((fired.time, fired.id.seq()));
        }
    }

    /// Property: canceled events never reach the caller, everything
    /// else does, exactly once.
    #[test]
    fn cancellation_is_exact(
        times in proptest::collection::vec(0.0f64..100.0, 1..60),
        cancel_mask in proptest::collection::vec(any::<bool>(), 60),
    ) {
        let mut scheduler = Scheduler::new();
        let mut canceled = Vec::new();
        let mut kept = Vec::new();
        for (i, t) in times.iter().enumerate() {
            let id = scheduler.schedule(SimTime::from_secs(*t), i).unwrap();
            if cancel_mask[i] {
                scheduler.cancel(id);
                canceled.push(i);
            } else {
                kept.push(i);
            }
        }

        let mut delivered = Vec::new();
        while let Some(fired) = scheduler.pop() {
            delivered.push(fired.payload);
        }

        for i in &canceled {
            prop_assert!(!delivered.contains(i), "canceled event {} was delivered", i);
        }
        delivered.sort_unstable();
        kept.sort_unstable();
        prop_assert_eq!(delivered, kept);
    }

    /// Property: scheduling strictly before the clock always fails, at
    /// or after it always succeeds.
    #[test]
    fn past_schedules_are_rejected(
        advance_to in 1.0f64..100.0,
        offset in -50.0f64..50.0,
    ) {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(SimTime::from_secs(advance_to), ()).unwrap();
        scheduler.pop();

        let target = advance_to + offset;
        if target < 0.0 {
            return Ok(());
        }
        let result = scheduler.schedule(SimTime::from_secs(target), ());
        if offset < 0.0 {
            let is_invalid_schedule_err = matches!(result, Err(ScheduleError::InvalidSchedule { .. }));
            prop_assert!(is_invalid_schedule_err);
        } else {
            prop_assert!(result.is_ok());
        }
    }
}

#[test]
fn same_time_events_fire_in_insertion_order() {
    let mut scheduler = Scheduler::new();
    let t = SimTime::from_secs(3.0);
    for i in 0..100 {
        scheduler.schedule(t, i).unwrap();
    }
    let fired: Vec<i32> = std::iter::from_fn(|| scheduler.pop().map(|f| f.payload)).collect();
    assert_eq!(fired, (0..100).collect::<Vec<_>>());
}
