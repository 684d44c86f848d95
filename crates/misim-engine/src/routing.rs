//! The request-routing state machine.
//!
//! This module is the heart of the simulator: how a request travels
//! from its sender through the load balancer to an instance, fans out
//! into child requests per dependency, queues for CPU, and comes back
//! as an answer, and how every failure mode (timeout, dead handler,
//! open circuit, exhausted retries) travels the same paths in reverse.
//!
//! On the send side the resilience patterns compose in a fixed order:
//! circuit breaker first (a rejection is terminal), then retry, then
//! the load balancer at arrival, then the network.

use misim_core::SimTime;
use misim_patterns::Admission;
use tracing::{debug, warn};

use crate::cpu::{CpuProcess, RemovedProcess};
use crate::error::{FailureReason, SimulationError};
use crate::event::EventKind;
use crate::ids::{InstanceId, OperationRef, RequestId, ServiceId, TransmissionId};
use crate::instance::InstanceLifecycle;
use crate::network::{Transmission, TransmissionPayload, TransmissionTarget};
use crate::request::{DependencyInstance, Request, Requester};
use crate::simulation::Simulation;

impl Simulation {
    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Injects an external request targeted at an operation, on behalf
    /// of a load generator.
    pub fn inject_request(
        &mut self,
        operation: OperationRef,
        generator: usize,
    ) -> Result<RequestId, SimulationError> {
        let id = RequestId(self.requests.len());
        let request = Request::new(
            id,
            operation,
            Requester::External { generator },
            None,
            self.scheduler.now(),
        );
        self.requests.push(request);
        self.transmit_request(id, None, operation.service)?;
        Ok(id)
    }

    /// Puts a request on the wire towards its target service and arms
    /// its round-trip timeout.
    fn transmit_request(
        &mut self,
        request: RequestId,
        from_service: Option<ServiceId>,
        target: ServiceId,
    ) -> Result<TransmissionId, SimulationError> {
        let now = self.scheduler.now();
        let latency = self
            .network
            .latency(from_service, Some(target), now, &mut self.rng);
        let id = self.network.next_id();
        let arrival = self
            .scheduler
            .schedule(now + latency, EventKind::Arrival(id))?;
        let source = self.requests[request.index()].requester;
        self.network.push(Transmission {
            id,
            payload: TransmissionPayload::Request(request),
            source,
            target: TransmissionTarget::Service(target),
            send_time: now,
            arrival,
            canceled: false,
        });
        self.requests[request.index()].transmission = Some(id);

        if let Some(timeout) = self.network.default_timeout() {
            let event = self
                .scheduler
                .schedule(now + timeout, EventKind::RequestTimeout(request))?;
            self.requests[request.index()].timeout = Some(event);
        }
        Ok(id)
    }

    /// Sends the child request for one dependency slot of `parent`.
    ///
    /// This is the pattern composition point: the circuit breaker for
    /// the target service is consulted before anything touches the
    /// network, and its rejections go straight into the failure chain.
    pub(crate) fn send_dependency_request(
        &mut self,
        sender: InstanceId,
        parent: RequestId,
        dep_index: usize,
    ) -> Result<(), SimulationError> {
        // A breaker rejection for a sibling slot may have failed the
        // whole parent while we were still fanning out.
        if self.requests[parent.index()].canceled {
            return Ok(());
        }
        let now = self.scheduler.now();
        let target = self.requests[parent.index()].dependencies[dep_index].target;
        self.requests[parent.index()].dependencies[dep_index].attempts += 1;

        let sender_service = self.instances[sender.index()].service;
        if let Some(settings) = self.services[sender_service.index()].breaker {
            let breaker_name = format!(
                "{}->{}",
                self.instances[sender.index()].name,
                self.services[target.service.index()].name
            );
            let breaker = self.instances[sender.index()]
                .breakers
                .entry(target.service)
                .or_insert_with(|| settings.instantiate(breaker_name));
            match breaker.try_acquire(now) {
                Admission::Permitted => {}
                Admission::CircuitOpen => {
                    return self.dependency_failed(
                        sender,
                        parent,
                        dep_index,
                        FailureReason::CircuitIsOpen,
                    );
                }
                Admission::ProbePending => {
                    return self.dependency_failed(
                        sender,
                        parent,
                        dep_index,
                        FailureReason::RequestVolumeReached,
                    );
                }
            }
        }

        let child = RequestId(self.requests.len());
        self.requests.push(Request::new(
            child,
            target,
            Requester::Instance(sender),
            Some((parent, dep_index)),
            now,
        ));
        let slot = &mut self.requests[parent.index()].dependencies[dep_index];
        slot.child = Some(child);
        slot.satisfied = false;
        self.instances[sender.index()]
            .open_dependencies
            .insert((parent, dep_index));

        let transmission = self.transmit_request(child, Some(sender_service), target.service)?;
        self.instances[sender.index()]
            .internal_sends
            .insert(transmission);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Arrival
    // ------------------------------------------------------------------

    pub(crate) fn on_arrival(
        &mut self,
        transmission: TransmissionId,
    ) -> Result<(), SimulationError> {
        let (payload, source, target, canceled) = {
            let t = self.network.get(transmission);
            (t.payload, t.source, t.target, t.canceled)
        };
        if canceled {
            return Ok(());
        }

        match payload {
            TransmissionPayload::Request(request) => {
                if let Requester::Instance(sender) = source {
                    self.instances[sender.index()]
                        .internal_sends
                        .remove(&transmission);
                }
                if self.requests[request.index()].canceled {
                    return Ok(());
                }
                self.requests[request.index()].transmission = None;
                let TransmissionTarget::Service(service) = target else {
                    unreachable!("requests are addressed to services");
                };
                self.arrive_at_service(service, request)
            }
            TransmissionPayload::Answer(request) => {
                if let Requester::Instance(handler) = source {
                    self.instances[handler.index()]
                        .outgoing_answers
                        .remove(&transmission);
                }
                self.requests[request.index()].transmission = None;
                match target {
                    TransmissionTarget::External { .. } => {
                        self.answer_reached_external(request);
                        Ok(())
                    }
                    TransmissionTarget::Instance(requester) => {
                        self.deliver_answer(requester, request)
                    }
                    TransmissionTarget::Service(_) => {
                        unreachable!("answers are addressed to requesters")
                    }
                }
            }
        }
    }

    /// A request reaches its target service: the load balancer picks a
    /// running instance, which then handles it.
    fn arrive_at_service(
        &mut self,
        service: ServiceId,
        request: RequestId,
    ) -> Result<(), SimulationError> {
        let now = self.scheduler.now();
        let candidates = self.running_instances(service);
        if candidates.is_empty() {
            debug!(
                service = %self.services[service.index()].name,
                request = %request,
                "no running instance to route to"
            );
            return self.request_failed_in_flight(request, FailureReason::NoInstance);
        }
        let usages: Vec<f64> = candidates
            .iter()
            .map(|i| self.instances[i.index()].cpu.current_usage(now))
            .collect();
        let picked = self.services[service.index()]
            .balancer
            .select(&usages, &mut self.rng)
            .expect("candidate list is non-empty");
        let handler = candidates[picked];

        match self.handle_request(handler, request) {
            Err(SimulationError::CannotHandle { .. }) => {
                self.request_failed_in_flight(request, FailureReason::HandlerUnavailable)
            }
            other => other,
        }
    }

    // ------------------------------------------------------------------
    // The per-instance request state machine
    // ------------------------------------------------------------------

    /// Routes one request at one instance.
    ///
    /// Called when a fresh request arrives, and again whenever its
    /// progress changes (last dependency answered, CPU finished). Each
    /// call lands in exactly one branch:
    ///
    /// 1. complete → answer the requester
    /// 2. dependencies satisfied, not yet computed → queue on the CPU
    /// 3. unsatisfied dependencies → fan out child requests
    pub(crate) fn handle_request(
        &mut self,
        handler: InstanceId,
        request: RequestId,
    ) -> Result<(), SimulationError> {
        if !self.instances[handler.index()].accepts(request) {
            return Err(SimulationError::CannotHandle {
                instance: self.instances[handler.index()].name.clone(),
                state: self.instances[handler.index()].state(),
            });
        }

        if self.instances[handler.index()].requests.insert(request) {
            self.requests[request.index()].handler = Some(handler);
            self.report_requests_in_system(handler);
        }

        if !self.requests[request.index()].materialized {
            self.materialize_dependencies(request);
        }

        if self.requests[request.index()].is_complete() {
            self.emit_answer(handler, request)
        } else if self.requests[request.index()].dependencies_completed() {
            self.submit_to_cpu(handler, request)
        } else {
            let open: Vec<usize> = self.requests[request.index()]
                .dependencies
                .iter()
                .enumerate()
                .filter(|(_, dep)| !dep.satisfied && dep.child.is_none())
                .map(|(i, _)| i)
                .collect();
            for dep_index in open {
                self.send_dependency_request(handler, request, dep_index)?;
            }
            Ok(())
        }
    }

    /// Concretizes the operation's declared dependencies into this
    /// request's slots, sampling each probability once.
    fn materialize_dependencies(&mut self, request: RequestId) {
        let operation = self.requests[request.index()].operation;
        let declared = self.services[operation.service.index()].operations[operation.index]
            .dependencies
            .clone();
        let mut slots = Vec::new();
        for dep in declared {
            if dep.probability >= 1.0 || self.rng.f64() < dep.probability {
                slots.push(DependencyInstance::new(dep.target));
            }
        }
        let req = &mut self.requests[request.index()];
        req.dependencies = slots;
        req.materialized = true;
    }

    // ------------------------------------------------------------------
    // CPU
    // ------------------------------------------------------------------

    fn submit_to_cpu(
        &mut self,
        handler: InstanceId,
        request: RequestId,
    ) -> Result<(), SimulationError> {
        let now = self.scheduler.now();
        let operation = self.requests[request.index()].operation;
        let demand = self.services[operation.service.index()].operations[operation.index].demand;
        let process = CpuProcess { request, demand };

        if self.instances[handler.index()].cpu.is_idle() {
            let finish = self.instances[handler.index()].cpu.finish_time(demand, now);
            let completion = self
                .scheduler
                .schedule(finish, EventKind::ProcessCompletion(handler))?;
            self.instances[handler.index()]
                .cpu
                .activate(process, now, completion);
        } else {
            self.instances[handler.index()].cpu.enqueue(process);
        }
        self.report_cpu(handler);
        Ok(())
    }

    pub(crate) fn on_process_completion(
        &mut self,
        handler: InstanceId,
    ) -> Result<(), SimulationError> {
        let Some(active) = self.instances[handler.index()].cpu.complete_active() else {
            // The completion event outlived a die(); nothing to do.
            return Ok(());
        };
        let request = active.request;
        if !self.requests[request.index()].canceled {
            self.requests[request.index()].computed = true;
            self.handle_request(handler, request)?;
        }
        self.start_next_process(handler)?;
        self.report_cpu(handler);
        Ok(())
    }

    pub(crate) fn start_next_process(
        &mut self,
        handler: InstanceId,
    ) -> Result<(), SimulationError> {
        if !self.instances[handler.index()].cpu.is_idle() {
            return Ok(());
        }
        let now = self.scheduler.now();
        if let Some(process) = self.instances[handler.index()].cpu.take_next() {
            let finish = self.instances[handler.index()]
                .cpu
                .finish_time(process.demand, now);
            let completion = self
                .scheduler
                .schedule(finish, EventKind::ProcessCompletion(handler))?;
            self.instances[handler.index()]
                .cpu
                .activate(process, now, completion);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Answers
    // ------------------------------------------------------------------

    /// Branch 1: the request is complete, send its answer home.
    fn emit_answer(
        &mut self,
        handler: InstanceId,
        request: RequestId,
    ) -> Result<(), SimulationError> {
        let now = self.scheduler.now();
        self.requests[request.index()].completed = true;
        self.instances[handler.index()].requests.remove(&request);
        self.report_requests_in_system(handler);

        let handler_service = Some(self.instances[handler.index()].service);
        let (target, to_service) = match self.requests[request.index()].requester {
            Requester::Instance(requester) => (
                TransmissionTarget::Instance(requester),
                Some(self.instances[requester.index()].service),
            ),
            Requester::External { generator } => (TransmissionTarget::External { generator }, None),
        };
        let latency = self
            .network
            .latency(handler_service, to_service, now, &mut self.rng);
        let id = self.network.next_id();
        let arrival = self
            .scheduler
            .schedule(now + latency, EventKind::Arrival(id))?;
        self.network.push(Transmission {
            id,
            payload: TransmissionPayload::Answer(request),
            source: Requester::Instance(handler),
            target,
            send_time: now,
            arrival,
            canceled: false,
        });
        self.instances[handler.index()].outgoing_answers.insert(id);
        // An outstanding timeout now races this answer; cancellation of
        // either must reach the other.
        self.requests[request.index()].transmission = Some(id);

        self.check_drained(handler);
        Ok(())
    }

    /// An answer for an internal request reaches the instance that sent
    /// it. Stale answers (dependency resolved or canceled in the
    /// meantime) are logged and dropped.
    fn deliver_answer(
        &mut self,
        requester: InstanceId,
        request: RequestId,
    ) -> Result<(), SimulationError> {
        match self.try_deliver_answer(requester, request) {
            Err(SimulationError::StaleAnswer { request }) => {
                warn!(request, "dropping stale answer");
                Ok(())
            }
            other => other,
        }
    }

    fn try_deliver_answer(
        &mut self,
        requester: InstanceId,
        request: RequestId,
    ) -> Result<(), SimulationError> {
        let now = self.scheduler.now();
        let stale = SimulationError::StaleAnswer {
            request: request.index(),
        };
        let Some((parent, dep_index)) = self.requests[request.index()].parent else {
            return Err(stale);
        };
        let live_child = self.requests[parent.index()]
            .dependencies
            .get(dep_index)
            .and_then(|dep| dep.child);
        let consistent = self.instances[requester.index()].requests.contains(&parent)
            && self.instances[requester.index()]
                .open_dependencies
                .contains(&(parent, dep_index))
            && live_child == Some(request)
            && !self.requests[parent.index()].canceled
            && !self.requests[request.index()].canceled;
        if !consistent {
            return Err(stale);
        }

        self.instances[requester.index()]
            .open_dependencies
            .remove(&(parent, dep_index));
        if let Some(timeout) = self.requests[request.index()].timeout.take() {
            self.scheduler.cancel(timeout);
        }

        let target_service = self.requests[request.index()].operation.service;
        if let Some(breaker) = self.instances[requester.index()]
            .breakers
            .get_mut(&target_service)
        {
            breaker.record_success(now);
        }

        if self.requests[parent.index()].notify_dependency_finished(dep_index) {
            self.handle_request(requester, parent)?;
        }
        Ok(())
    }

    /// An answer crosses back out of the architecture.
    fn answer_reached_external(&mut self, request: RequestId) {
        let now = self.scheduler.now();
        if let Some(timeout) = self.requests[request.index()].timeout.take() {
            self.scheduler.cancel(timeout);
        }
        let operation = self.requests[request.index()].operation;
        let series = format!(
            "O[{}]_ResponseTime",
            self.services[operation.service.index()].qualified_name(operation.index)
        );
        let elapsed = now.since(self.requests[request.index()].created_at);
        self.reporter.record(series, now, elapsed.as_secs());
    }

    // ------------------------------------------------------------------
    // Failure chain
    // ------------------------------------------------------------------

    pub(crate) fn on_request_timeout(&mut self, request: RequestId) -> Result<(), SimulationError> {
        self.requests[request.index()].timeout = None;
        // The event is canceled when the answer is delivered, so firing
        // means the round trip did not finish, even if the answer is
        // already on the wire. The timeout wins; the answer is torn
        // down with the request.
        if self.requests[request.index()].canceled {
            return Ok(());
        }
        debug!(request = %request, "request timed out");
        self.request_failed_in_flight(request, FailureReason::Timeout)
    }

    /// A request failed somewhere between its sender and its answer:
    /// routing refused it, the wire dropped it, or the round trip timed
    /// out. Tears the request down and runs the sender's failure chain.
    pub(crate) fn request_failed_in_flight(
        &mut self,
        request: RequestId,
        reason: FailureReason,
    ) -> Result<(), SimulationError> {
        let parent = self.requests[request.index()].parent;
        let requester = self.requests[request.index()].requester;
        self.cancel_request(request);
        match (requester, parent) {
            (Requester::External { .. }, _) => {
                self.report_external_failure(request, reason);
                Ok(())
            }
            (Requester::Instance(sender), Some((parent, dep_index))) => {
                self.dependency_failed(sender, parent, dep_index, reason)
            }
            (Requester::Instance(_), None) => unreachable!("internal requests have parents"),
        }
    }

    /// The sender-side listener chain for a failed dependency:
    /// circuit breaker bookkeeping, then retry, then parent failure.
    pub(crate) fn dependency_failed(
        &mut self,
        sender: InstanceId,
        parent: RequestId,
        dep_index: usize,
        reason: FailureReason,
    ) -> Result<(), SimulationError> {
        if self.requests[parent.index()].canceled {
            return Ok(());
        }
        let now = self.scheduler.now();
        debug!(
            sender = %self.instances[sender.index()].name,
            parent = %parent,
            dep_index,
            reason = %reason,
            "dependency failed"
        );
        self.instances[sender.index()]
            .open_dependencies
            .remove(&(parent, dep_index));

        // Breaker rejections are its own verdicts, not new evidence.
        let target_service = self.requests[parent.index()].dependencies[dep_index]
            .target
            .service;
        if !matches!(
            reason,
            FailureReason::CircuitIsOpen
                | FailureReason::RequestVolumeReached
                | FailureReason::MaxRetriesReached
        ) {
            if let Some(breaker) = self.instances[sender.index()]
                .breakers
                .get_mut(&target_service)
            {
                breaker.record_failure(now);
            }
        }

        if !reason.is_terminal() {
            let attempts = self.requests[parent.index()].dependencies[dep_index].attempts;
            if let Some(retry) = self.instances[sender.index()].retry.as_mut() {
                if let Some(delay) = retry.next_delay(now, attempts, &mut self.rng) {
                    self.scheduler.schedule_after(
                        delay,
                        EventKind::RetryFire {
                            instance: sender,
                            parent,
                            dep_index,
                        },
                    );
                    return Ok(());
                }
                // Budget exhausted: the failure becomes MaxRetriesReached,
                // which is terminal by definition.
            }
        }

        self.fail_handled_request(parent, FailureReason::DependencyNotAvailable)
    }

    /// A request is beyond recovery: cancel it (and its children) and
    /// tell its own requester.
    pub(crate) fn fail_handled_request(
        &mut self,
        request: RequestId,
        reason: FailureReason,
    ) -> Result<(), SimulationError> {
        if self.requests[request.index()].canceled {
            return Ok(());
        }
        self.cancel_request(request);
        self.notify_requester_of_failure(request, reason)
    }

    /// Routes a failure notification to whoever sent `request`.
    pub(crate) fn notify_requester_of_failure(
        &mut self,
        request: RequestId,
        reason: FailureReason,
    ) -> Result<(), SimulationError> {
        match (
            self.requests[request.index()].requester,
            self.requests[request.index()].parent,
        ) {
            (Requester::External { .. }, _) => {
                self.report_external_failure(request, reason);
                Ok(())
            }
            (Requester::Instance(sender), Some((parent, dep_index))) => {
                self.dependency_failed(sender, parent, dep_index, reason)
            }
            (Requester::Instance(_), None) => unreachable!("internal requests have parents"),
        }
    }

    fn report_external_failure(&mut self, request: RequestId, reason: FailureReason) {
        let operation = self.requests[request.index()].operation;
        let series = format!(
            "O[{}]_Failed",
            self.services[operation.service.index()].qualified_name(operation.index)
        );
        self.reporter
            .record(series, self.scheduler.now(), reason.as_str());
    }

    // ------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------

    /// Cancels a request and everything scheduled on its behalf: its
    /// round-trip timeout, its in-flight transmission, its CPU process,
    /// its handler bookkeeping, and recursively every live child.
    pub(crate) fn cancel_request(&mut self, request: RequestId) {
        if self.requests[request.index()].canceled {
            return;
        }
        self.requests[request.index()].canceled = true;

        if let Some(timeout) = self.requests[request.index()].timeout.take() {
            self.scheduler.cancel(timeout);
        }
        if let Some(transmission) = self.requests[request.index()].transmission.take() {
            let t = self.network.get_mut(transmission);
            t.canceled = true;
            let arrival = t.arrival;
            self.scheduler.cancel(arrival);
            if let Requester::Instance(sender) = self.requests[request.index()].requester {
                self.instances[sender.index()]
                    .internal_sends
                    .remove(&transmission);
            }
            // The transmission slot may hold the outgoing answer.
            if let Some(handler) = self.requests[request.index()].handler {
                self.instances[handler.index()]
                    .outgoing_answers
                    .remove(&transmission);
            }
        }

        if let Some(handler) = self.requests[request.index()].handler {
            if self.instances[handler.index()].requests.remove(&request) {
                self.report_requests_in_system(handler);
            }
            let slots = self.requests[request.index()].dependencies.len();
            for dep_index in 0..slots {
                self.instances[handler.index()]
                    .open_dependencies
                    .remove(&(request, dep_index));
            }
            match self.instances[handler.index()].cpu.remove(request) {
                RemovedProcess::Active(completion) => {
                    self.scheduler.cancel(completion);
                    // Infallible here: the next process finishes at or
                    // after the current time.
                    let _ = self.start_next_process(handler);
                }
                RemovedProcess::Queued | RemovedProcess::NotFound => {}
            }
            self.check_drained(handler);
        }

        let children: Vec<RequestId> = self.requests[request.index()]
            .dependencies
            .iter()
            .filter_map(|dep| dep.child)
            .collect();
        for child in children {
            if !self.requests[child.index()].completed {
                self.cancel_request(child);
            }
        }
    }

    // ------------------------------------------------------------------
    // Retry firing and drain bookkeeping
    // ------------------------------------------------------------------

    pub(crate) fn on_retry_fire(
        &mut self,
        instance: InstanceId,
        parent: RequestId,
        dep_index: usize,
    ) -> Result<(), SimulationError> {
        if self.requests[parent.index()].canceled {
            return Ok(());
        }
        if self.requests[parent.index()].dependencies[dep_index].satisfied {
            return Ok(());
        }
        if !matches!(
            self.instances[instance.index()].state(),
            InstanceLifecycle::Running | InstanceLifecycle::ShuttingDown
        ) {
            return Ok(());
        }
        self.send_dependency_request(instance, parent, dep_index)
    }

    /// Schedules the shutdown completion once a draining instance runs
    /// empty.
    pub(crate) fn check_drained(&mut self, instance: InstanceId) {
        let ins = &self.instances[instance.index()];
        if ins.state() == InstanceLifecycle::ShuttingDown && ins.is_drained() {
            self.scheduler
                .schedule_after(SimTime::ZERO, EventKind::ShutdownEnd(instance));
        }
    }
}
