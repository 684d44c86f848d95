use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use misim_core::{Scheduler, SimTime};

/// Raw scheduler throughput: schedule a batch of events with scattered
/// timestamps, then drain the queue.
fn schedule_and_drain(c: &mut Criterion) {
    c.bench_function("scheduler/schedule_drain_10k", |b| {
        b.iter(|| {
            let mut scheduler = Scheduler::new();
            for i in 0..10_000u64 {
                let t = (i.wrapping_mul(7919) % 1000) as f64;
                scheduler.schedule(SimTime::from_secs(t), i).unwrap();
            }
            let mut delivered = 0u64;
            while let Some(fired) = scheduler.pop() {
                delivered += black_box(fired.payload) & 1;
            }
            delivered
        })
    });
}

/// Cancellation cost: half the scheduled events are tombstoned before
/// the drain.
fn cancel_heavy_drain(c: &mut Criterion) {
    c.bench_function("scheduler/cancel_half_10k", |b| {
        b.iter(|| {
            let mut scheduler = Scheduler::new();
            let mut ids = Vec::with_capacity(10_000);
            for i in 0..10_000u64 {
                let t = (i.wrapping_mul(104_729) % 997) as f64;
                ids.push(scheduler.schedule(SimTime::from_secs(t), i).unwrap());
            }
            for id in ids.iter().step_by(2) {
                scheduler.cancel(*id);
            }
            let mut delivered = 0u64;
            while scheduler.pop().is_some() {
                delivered += 1;
            }
            black_box(delivered)
        })
    });
}

criterion_group!(benches, schedule_and_drain, cancel_heavy_drain);
criterion_main!(benches);
