//! The per-instance CPU model.
//!
//! A CPU has a fixed capacity in work-units per simulated second and a
//! pluggable queue of pending processes. One process is active at a
//! time; its completion is a scheduled event owned by the simulation.
//! The CPU itself is pure state: it computes finish times and usage
//! figures, the engine schedules and cancels the events.

use misim_core::{EventId, SimTime};

use crate::ids::RequestId;

/// A request's computation, waiting for or holding the CPU.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuProcess {
    pub request: RequestId,
    /// Remaining work units.
    pub demand: f64,
}

/// The process currently consuming capacity.
#[derive(Debug, Clone, Copy)]
pub struct ActiveProcess {
    pub request: RequestId,
    pub demand: f64,
    pub started_at: SimTime,
    pub finish_at: SimTime,
    /// The scheduled `ProcessCompletion` event.
    pub completion: EventId,
}

impl ActiveProcess {
    /// Work units left at `now`, assuming linear progress.
    fn remaining(&self, now: SimTime, capacity: f64) -> f64 {
        self.finish_at.since(now).as_secs() * capacity
    }
}

/// Queue discipline for pending processes.
///
/// Implementations must hand processes out deterministically; ties are
/// broken by submission order.
pub trait ProcessScheduler: std::fmt::Debug {
    fn enqueue(&mut self, process: CpuProcess);
    fn next(&mut self) -> Option<CpuProcess>;
    /// Removes the process computing `request`, if queued.
    fn remove(&mut self, request: RequestId) -> Option<CpuProcess>;
    fn drain(&mut self) -> Vec<CpuProcess>;
    fn queued_demand(&self) -> f64;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Work-conserving first-in-first-out queue, the default discipline.
#[derive(Debug, Default)]
pub struct FifoScheduler {
    queue: std::collections::VecDeque<CpuProcess>,
}

impl FifoScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessScheduler for FifoScheduler {
    fn enqueue(&mut self, process: CpuProcess) {
        self.queue.push_back(process);
    }

    fn next(&mut self) -> Option<CpuProcess> {
        self.queue.pop_front()
    }

    fn remove(&mut self, request: RequestId) -> Option<CpuProcess> {
        let pos = self.queue.iter().position(|p| p.request == request)?;
        self.queue.remove(pos)
    }

    fn drain(&mut self) -> Vec<CpuProcess> {
        self.queue.drain(..).collect()
    }

    fn queued_demand(&self) -> f64 {
        self.queue.iter().map(|p| p.demand).sum()
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

/// Picks the queued process with the smallest remaining demand next;
/// submission order breaks ties.
#[derive(Debug, Default)]
pub struct ShortestProcessNext {
    queue: Vec<CpuProcess>,
}

impl ShortestProcessNext {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessScheduler for ShortestProcessNext {
    fn enqueue(&mut self, process: CpuProcess) {
        self.queue.push(process);
    }

    fn next(&mut self) -> Option<CpuProcess> {
        if self.queue.is_empty() {
            return None;
        }
        let mut best = 0;
        for (i, p) in self.queue.iter().enumerate().skip(1) {
            if p.demand < self.queue[best].demand {
                best = i;
            }
        }
        Some(self.queue.remove(best))
    }

    fn remove(&mut self, request: RequestId) -> Option<CpuProcess> {
        let pos = self.queue.iter().position(|p| p.request == request)?;
        Some(self.queue.remove(pos))
    }

    fn drain(&mut self) -> Vec<CpuProcess> {
        std::mem::take(&mut self.queue)
    }

    fn queued_demand(&self) -> f64 {
        self.queue.iter().map(|p| p.demand).sum()
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

/// Discipline selector, as named in architecture descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingKind {
    #[default]
    Fifo,
    ShortestProcessNext,
}

impl SchedulingKind {
    pub fn into_scheduler(self) -> Box<dyn ProcessScheduler> {
        match self {
            SchedulingKind::Fifo => Box::new(FifoScheduler::new()),
            SchedulingKind::ShortestProcessNext => Box::new(ShortestProcessNext::new()),
        }
    }
}

/// Outcome of removing a request's process from the CPU.
#[derive(Debug)]
pub enum RemovedProcess {
    /// It was the active process; the caller must cancel this
    /// completion event and start the next queued process.
    Active(EventId),
    Queued,
    NotFound,
}

/// One instance's CPU.
#[derive(Debug)]
pub struct Cpu {
    capacity: f64,
    scheduler: Box<dyn ProcessScheduler>,
    active: Option<ActiveProcess>,
}

impl Cpu {
    pub fn new(capacity: f64, scheduler: Box<dyn ProcessScheduler>) -> Self {
        assert!(
            capacity.is_finite() && capacity > 0.0,
            "CPU capacity must be positive"
        );
        Self {
            capacity,
            scheduler,
            active: None,
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    pub fn active(&self) -> Option<&ActiveProcess> {
        self.active.as_ref()
    }

    /// When a process of `demand` started now would finish.
    pub fn finish_time(&self, demand: f64, now: SimTime) -> SimTime {
        now + SimTime::from_secs(demand.max(0.0) / self.capacity)
    }

    /// Installs the active process. The caller has already scheduled
    /// its completion event.
    pub fn activate(&mut self, process: CpuProcess, now: SimTime, completion: EventId) {
        debug_assert!(self.active.is_none(), "CPU already has an active process");
        self.active = Some(ActiveProcess {
            request: process.request,
            demand: process.demand,
            started_at: now,
            finish_at: self.finish_time(process.demand, now),
            completion,
        });
    }

    /// Appends a process behind the active one.
    pub fn enqueue(&mut self, process: CpuProcess) {
        self.scheduler.enqueue(process);
    }

    /// Takes the active process off the CPU after its completion fired.
    pub fn complete_active(&mut self) -> Option<ActiveProcess> {
        self.active.take()
    }

    /// The next queued process, in discipline order.
    pub fn take_next(&mut self) -> Option<CpuProcess> {
        self.scheduler.next()
    }

    /// Removes the process computing `request`, wherever it is.
    pub fn remove(&mut self, request: RequestId) -> RemovedProcess {
        if let Some(active) = &self.active {
            if active.request == request {
                let active = self.active.take().expect("checked above");
                return RemovedProcess::Active(active.completion);
            }
        }
        match self.scheduler.remove(request) {
            Some(_) => RemovedProcess::Queued,
            None => RemovedProcess::NotFound,
        }
    }

    /// Drops everything. Returns the active completion event (for the
    /// caller to cancel) and the abandoned processes. Called on `die`.
    pub fn clear(&mut self) -> (Option<EventId>, Vec<CpuProcess>) {
        let mut dropped = Vec::new();
        let completion = self.active.take().map(|active| {
            dropped.push(CpuProcess {
                request: active.request,
                demand: active.demand,
            });
            active.completion
        });
        dropped.extend(self.scheduler.drain());
        (completion, dropped)
    }

    /// Busy fraction in `[0, 1]`.
    pub fn current_usage(&self, now: SimTime) -> f64 {
        self.relative_work_demand(now).min(1.0)
    }

    /// Outstanding work units divided by capacity; exceeds 1 when work
    /// is queued behind the active process.
    pub fn relative_work_demand(&self, now: SimTime) -> f64 {
        let active = self
            .active
            .as_ref()
            .map(|a| a.remaining(now, self.capacity))
            .unwrap_or(0.0);
        (active + self.scheduler.queued_demand()) / self.capacity
    }

    pub fn queue_len(&self) -> usize {
        self.scheduler.len()
    }

    /// No active process and nothing queued.
    pub fn is_empty(&self) -> bool {
        self.active.is_none() && self.scheduler.is_empty()
    }
}
