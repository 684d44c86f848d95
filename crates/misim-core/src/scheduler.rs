//! The event scheduler: a virtual clock plus a priority queue of
//! time-stamped payloads.
//!
//! Events fire in `(time, seq)` order, where `seq` is a monotonically
//! increasing counter assigned at schedule time. Two events scheduled at
//! the same instant therefore fire in insertion order, which is what
//! makes runs reproducible. Cancellation leaves a tombstone; a canceled
//! event is skipped on dequeue without advancing the clock.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use crate::error::ScheduleError;
use crate::time::SimTime;

/// Handle to a scheduled event, usable to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    /// The raw sequence number, unique per scheduler.
    pub fn seq(self) -> u64 {
        self.0
    }
}

/// A dequeued event: when it fired, its handle, and its payload.
#[derive(Debug)]
pub struct Fired<E> {
    pub time: SimTime,
    pub id: EventId,
    pub payload: E,
}

struct Entry<E> {
    time: SimTime,
    seq: u64,
    payload: E,
}

impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl<E> Eq for Entry<E> {}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Entry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Virtual clock and event queue.
///
/// `E` is the event payload; the owner dispatches it after [`pop`] and
/// all simulation state changes flow from that dispatch.
///
/// [`pop`]: Scheduler::pop
pub struct Scheduler<E> {
    heap: BinaryHeap<Reverse<Entry<E>>>,
    /// Seqs scheduled but not yet fired or canceled.
    live: HashSet<u64>,
    now: SimTime,
    next_seq: u64,
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashSet::new(),
            now: SimTime::ZERO,
            next_seq: 0,
        }
    }

    /// The current virtual time. Never decreases.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedules `payload` to fire at the absolute time `time`.
    ///
    /// Fails with [`ScheduleError::InvalidSchedule`] if `time` lies in
    /// the past. Scheduling at exactly `now` is allowed and fires after
    /// every event already queued for `now`.
    pub fn schedule(&mut self, time: SimTime, payload: E) -> Result<EventId, ScheduleError> {
        if time < self.now {
            return Err(ScheduleError::InvalidSchedule {
                requested: time,
                now: self.now,
            });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.live.insert(seq);
        self.heap.push(Reverse(Entry { time, seq, payload }));
        Ok(EventId(seq))
    }

    /// Schedules `payload` to fire `delta` after the current time.
    pub fn schedule_after(&mut self, delta: SimTime, payload: E) -> EventId {
        // now + delta can never be in the past, so this cannot fail.
        match self.schedule(self.now + delta, payload) {
            Ok(id) => id,
            Err(_) => unreachable!("schedule_after produced a past time"),
        }
    }

    /// Cancels a scheduled event. Idempotent; canceling an event that
    /// already fired has no effect. A canceled event never reaches the
    /// caller through [`pop`](Scheduler::pop).
    pub fn cancel(&mut self, id: EventId) {
        self.live.remove(&id.0);
    }

    /// Removes and returns the next live event, advancing the clock to
    /// its timestamp. Tombstoned entries are dropped without touching
    /// the clock. Returns `None` when the queue is empty.
    pub fn pop(&mut self) -> Option<Fired<E>> {
        while let Some(Reverse(entry)) = self.heap.pop() {
            if !self.live.remove(&entry.seq) {
                continue;
            }
            debug_assert!(entry.time >= self.now, "event queue went backwards");
            self.now = entry.time;
            return Some(Fired {
                time: entry.time,
                id: EventId(entry.seq),
                payload: entry.payload,
            });
        }
        None
    }

    /// The timestamp of the next live event, if any.
    pub fn peek_time(&mut self) -> Option<SimTime> {
        while let Some(Reverse(entry)) = self.heap.peek() {
            if !self.live.contains(&entry.seq) {
                self.heap.pop();
                continue;
            }
            return Some(entry.time);
        }
        None
    }

    /// Number of events scheduled and not yet fired or canceled.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Advances the clock with no event, used when a run ends at a stop
    /// time later than the final event.
    pub fn advance_to(&mut self, time: SimTime) {
        if time > self.now {
            self.now = time;
        }
    }
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}
