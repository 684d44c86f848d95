//! The simulated network.
//!
//! Sending is scheduling: a transmission's arrival is an event at
//! `now + latency(from, to)`. Latency is configured per service pair
//! with a global default, and chaos experiments can layer
//! normal-distributed extra delay on top for a while. The network owns
//! no routing decisions; it moves payloads and remembers which events
//! belong to which transmission so cancellation can reach them.

use std::collections::BTreeMap;

use misim_core::{EventId, SimRng, SimTime};

use crate::ids::{InstanceId, RequestId, ServiceId, TransmissionId};
use crate::request::Requester;

/// What a transmission carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionPayload {
    /// A request on its way to a service.
    Request(RequestId),
    /// The answer to a completed request, on its way back.
    Answer(RequestId),
}

/// Where a transmission is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionTarget {
    /// A service; the load balancer picks the instance on arrival.
    Service(ServiceId),
    /// A specific instance (answers to internal requesters).
    Instance(InstanceId),
    /// Back out of the architecture (answers to load generators).
    External { generator: usize },
}

/// One in-flight send.
#[derive(Debug)]
pub struct Transmission {
    pub id: TransmissionId,
    pub payload: TransmissionPayload,
    pub source: Requester,
    pub target: TransmissionTarget,
    pub send_time: SimTime,
    /// The scheduled arrival event.
    pub arrival: EventId,
    pub canceled: bool,
}

/// A temporary latency injection from a chaos experiment.
#[derive(Debug, Clone, Copy)]
struct ActiveDelay {
    /// Only traffic towards this service, or all traffic when `None`.
    service: Option<ServiceId>,
    baseline: f64,
    stddev: f64,
    until: SimTime,
}

/// Latency configuration plus the arena of in-flight transmissions.
#[derive(Debug)]
pub struct Network {
    default_latency: SimTime,
    pair_latency: BTreeMap<(ServiceId, ServiceId), SimTime>,
    default_timeout: Option<SimTime>,
    delays: Vec<ActiveDelay>,
    transmissions: Vec<Transmission>,
}

impl Network {
    pub fn new() -> Self {
        Self {
            default_latency: SimTime::ZERO,
            pair_latency: BTreeMap::new(),
            default_timeout: None,
            delays: Vec::new(),
            transmissions: Vec::new(),
        }
    }

    /// Sets the latency used when no pair override matches.
    pub fn set_default_latency(&mut self, latency: SimTime) {
        self.default_latency = latency;
    }

    /// Sets the latency for traffic from one service to another.
    pub fn set_pair_latency(&mut self, from: ServiceId, to: ServiceId, latency: SimTime) {
        self.pair_latency.insert((from, to), latency);
    }

    /// Round-trip timeout applied to every request send unless the
    /// sender overrides it. `None` disables timeouts.
    pub fn set_default_timeout(&mut self, timeout: Option<SimTime>) {
        self.default_timeout = timeout;
    }

    pub fn default_timeout(&self) -> Option<SimTime> {
        self.default_timeout
    }

    /// Adds a latency injection active until `until`.
    pub fn inject_delay(
        &mut self,
        service: Option<ServiceId>,
        baseline: f64,
        stddev: f64,
        until: SimTime,
    ) {
        self.delays.push(ActiveDelay {
            service,
            baseline,
            stddev,
            until,
        });
    }

    /// The latency a send experiences right now.
    ///
    /// `from`/`to` are the endpoint services; `None` stands for the
    /// world outside the architecture. Expired injections are pruned as
    /// a side effect.
    pub fn latency(
        &mut self,
        from: Option<ServiceId>,
        to: Option<ServiceId>,
        now: SimTime,
        rng: &mut SimRng,
    ) -> SimTime {
        let base = match (from, to) {
            (Some(f), Some(t)) => self
                .pair_latency
                .get(&(f, t))
                .copied()
                .unwrap_or(self.default_latency),
            _ => self.default_latency,
        };

        self.delays.retain(|delay| delay.until > now);
        let mut extra = 0.0;
        for delay in &self.delays {
            let applies = match delay.service {
                None => true,
                Some(s) => to == Some(s),
            };
            if applies {
                extra += rng.normal(delay.baseline, delay.stddev);
            }
        }
        base + SimTime::from_secs(extra)
    }

    /// Registers an in-flight transmission, returning its id.
    ///
    /// Two-phase because the arrival event must be scheduled first: the
    /// caller reserves the id with [`next_id`](Network::next_id),
    /// schedules the arrival, then pushes.
    pub fn push(&mut self, transmission: Transmission) -> TransmissionId {
        debug_assert_eq!(transmission.id.index(), self.transmissions.len());
        let id = transmission.id;
        self.transmissions.push(transmission);
        id
    }

    /// The id the next [`push`](Network::push) will get.
    pub fn next_id(&self) -> TransmissionId {
        TransmissionId(self.transmissions.len())
    }

    pub fn get(&self, id: TransmissionId) -> &Transmission {
        &self.transmissions[id.index()]
    }

    pub fn get_mut(&mut self, id: TransmissionId) -> &mut Transmission {
        &mut self.transmissions[id.index()]
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}
