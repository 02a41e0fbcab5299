use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dispatch_component::{MessageBus, RoutingOracle, TripRecorder};
use dispatch_protocol::{AgentIdentity, Message, Position, RequestId, Role};

use crate::error::DispatchError;
use crate::events::{AgentEvent, EventQueue};
use crate::responder::ProviderResponder;
use crate::session::{NegotiationSession, SessionOutcome};

/// Random delay before Requester starts first negotiation. Spreads broadcasts
/// of Requesters started at the same moment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JitterConfig {
    #[serde(with = "humantime_serde")]
    pub min: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

impl Default for JitterConfig {
    fn default() -> Self {
        JitterConfig {
            min: Duration::from_secs(1),
            max: Duration::from_secs(3),
        }
    }
}

impl JitterConfig {
    pub fn none() -> JitterConfig {
        JitterConfig {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        thread_rng().gen_range(self.min..=self.max)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NegotiationConfig {
    /// How long Requester collects Offers before choosing.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub jitter: JitterConfig,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        NegotiationConfig {
            window: Duration::from_secs(5),
            jitter: JitterConfig::default(),
        }
    }
}

pub struct Requester {
    providers: Vec<AgentIdentity>,
    config: NegotiationConfig,
    sessions: HashMap<RequestId, NegotiationSession>,
}

impl Requester {
    pub fn new(providers: Vec<AgentIdentity>, config: NegotiationConfig) -> Requester {
        Requester {
            providers,
            config,
            sessions: HashMap::new(),
        }
    }

    pub fn providers(&self) -> &[AgentIdentity] {
        &self.providers
    }
}

/// Role specific part of Agent.
pub enum Behavior {
    Requester(Requester),
    Provider(ProviderResponder),
    Passive,
}

impl Behavior {
    pub fn role(&self) -> Role {
        match self {
            Behavior::Requester(_) => Role::Requester,
            Behavior::Provider(_) => Role::Provider,
            Behavior::Passive => Role::Passive,
        }
    }
}

/// Everything needed to build an Agent, except for bus connection, which
/// can be established only when the Agent gets its mailbox.
pub struct AgentSpec {
    pub identity: AgentIdentity,
    pub position: Position,
    pub behavior: Behavior,
    pub oracle: Arc<dyn RoutingOracle>,
    pub recorder: Arc<dyn TripRecorder>,
}

/// Single agent of dispatch system. All state changes happen while processing
/// events from agent's queue, one event at a time, so Agent needs no internal
/// synchronization.
pub struct Agent {
    identity: AgentIdentity,
    position: Position,
    behavior: Behavior,
    bus: Box<dyn MessageBus>,
    oracle: Arc<dyn RoutingOracle>,
    recorder: Arc<dyn TripRecorder>,
    queue: EventQueue,
}

impl Agent {
    pub fn new(spec: AgentSpec, bus: Box<dyn MessageBus>) -> Agent {
        Agent {
            identity: spec.identity,
            position: spec.position,
            behavior: spec.behavior,
            bus,
            oracle: spec.oracle,
            recorder: spec.recorder,
            queue: EventQueue::new(),
        }
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn role(&self) -> Role {
        self.behavior.role()
    }

    pub fn behavior(&self) -> &Behavior {
        &self.behavior
    }

    pub fn open_sessions(&self) -> usize {
        match &self.behavior {
            Behavior::Requester(requester) => requester.sessions.len(),
            _ => 0,
        }
    }

    pub fn start(&mut self, now: Instant) {
        log::info!(
            "[{}] Online at node {} ({}).",
            self.identity.name,
            self.position,
            self.role()
        );

        if let Behavior::Requester(requester) = &self.behavior {
            let jitter = requester.config.jitter.sample();
            log::debug!(
                "[{}] Will look for Provider in {:?}.",
                self.identity.name,
                jitter
            );
            self.queue.schedule(now + jitter, AgentEvent::StartNegotiation);
        }
    }

    /// Schedules new negotiation session. Can be called many times, sessions
    /// are independent of each other.
    pub fn request_service(&mut self, now: Instant) -> Result<(), DispatchError> {
        match &self.behavior {
            Behavior::Requester(_) => {
                self.queue.schedule(now, AgentEvent::StartNegotiation);
                Ok(())
            }
            behavior => Err(DispatchError::NotRequester(behavior.role())),
        }
    }

    /// Queues message received from the bus.
    pub fn deliver(&mut self, from: AgentIdentity, body: String, now: Instant) {
        self.queue.schedule(now, AgentEvent::Inbound { from, body });
    }

    /// Time, at which `advance` should be called next.
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.queue.next_due()
    }

    /// Processes all events due at `now`. Returns outcomes of sessions, that
    /// finished in the meantime.
    pub fn advance(&mut self, now: Instant) -> Vec<SessionOutcome> {
        let mut outcomes = vec![];
        while let Some((at, event)) = self.queue.pop_due(now) {
            match self.handle_event(event, at) {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) => (),
                Err(e) => self.report(e),
            }
        }
        outcomes
    }

    fn handle_event(
        &mut self,
        event: AgentEvent,
        at: Instant,
    ) -> Result<Option<SessionOutcome>, DispatchError> {
        match event {
            AgentEvent::StartNegotiation => self.start_negotiation(at).map(|_| None),
            AgentEvent::CloseWindow(request_id) => self.close_window(&request_id).map(Some),
            AgentEvent::Inbound { from, body } => self.dispatch(from, &body, at).map(|_| None),
        }
    }

    fn start_negotiation(&mut self, now: Instant) -> Result<RequestId, DispatchError> {
        let requester = match &mut self.behavior {
            Behavior::Requester(requester) => requester,
            behavior => return Err(DispatchError::NotRequester(behavior.role())),
        };

        let request_id = RequestId::generate();
        let mut session = NegotiationSession::new(request_id.clone(), self.position);
        let deadline = session.broadcast(
            &self.identity,
            &requester.providers,
            self.bus.as_ref(),
            requester.config.window,
            now,
        )?;

        requester.sessions.insert(request_id.clone(), session);
        self.queue
            .schedule(deadline, AgentEvent::CloseWindow(request_id.clone()));
        Ok(request_id)
    }

    fn close_window(&mut self, request_id: &RequestId) -> Result<SessionOutcome, DispatchError> {
        let requester = match &mut self.behavior {
            Behavior::Requester(requester) => requester,
            behavior => return Err(DispatchError::NotRequester(behavior.role())),
        };

        // Session is destroyed after reaching terminal state.
        let mut session = requester
            .sessions
            .remove(request_id)
            .ok_or_else(|| DispatchError::UnknownSession(request_id.clone()))?;

        Ok(session.decide(
            &self.identity,
            self.oracle.as_ref(),
            self.bus.as_ref(),
            self.recorder.as_ref(),
        )?)
    }

    fn dispatch(
        &mut self,
        from: AgentIdentity,
        body: &str,
        now: Instant,
    ) -> Result<(), DispatchError> {
        let message = Message::decode(body).map_err(|e| DispatchError::Malformed {
            from: from.address.clone(),
            source: e,
        })?;

        match (&mut self.behavior, message) {
            (Behavior::Provider(responder), Message::CallForProposals(request)) => {
                responder.respond(
                    &self.identity,
                    self.position,
                    &request,
                    &from,
                    self.oracle.as_ref(),
                    self.bus.as_ref(),
                )?;
            }
            (Behavior::Provider(responder), Message::Accept(commit)) => {
                responder.on_commit(&self.identity, &commit, &from)
            }
            (Behavior::Requester(requester), Message::Propose(mut offer)) => {
                let session = requester
                    .sessions
                    .get_mut(&offer.request_id)
                    .ok_or_else(|| DispatchError::UnknownSession(offer.request_id.clone()))?;

                // Commit must reach the agent, that really sent the Offer.
                if offer.provider.address != from.address {
                    log::debug!(
                        "[{}] Offer claims to come from [{}], but was sent by [{}].",
                        self.identity.name,
                        offer.provider,
                        from
                    );
                    offer.provider = from;
                }
                session.collect(offer, now)?;
            }
            (behavior, message) => {
                return Err(DispatchError::UnexpectedMessage {
                    role: behavior.role(),
                    kind: message.to_string(),
                })
            }
        }
        Ok(())
    }

    fn report(&self, error: DispatchError) {
        match &error {
            DispatchError::UnknownSession(_) | DispatchError::Session(_) => {
                log::debug!("[{}] Dropping offer. {}", self.identity.name, error)
            }
            DispatchError::Malformed { .. } | DispatchError::UnexpectedMessage { .. } => {
                log::warn!("[{}] Dropping message. {}", self.identity.name, error)
            }
            DispatchError::Transport(_) => log::error!("[{}] {}", self.identity.name, error),
            DispatchError::NotRequester(_) => log::warn!("[{}] {}", self.identity.name, error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_builtin::{AnswerAll, CityGraph, MemoryTripRecorder, RecordingBus};
    use dispatch_protocol::{CallForProposals, Commit, Offer};

    use crate::session::FailReason;

    const WINDOW: Duration = Duration::from_secs(5);

    struct TestAgent {
        agent: Agent,
        bus: RecordingBus,
        recorder: Arc<MemoryTripRecorder>,
    }

    fn hospital(name: &str) -> AgentIdentity {
        AgentIdentity::new(Role::Provider, name, format!("{}@localhost", name))
    }

    fn ambulance() -> AgentIdentity {
        AgentIdentity::new(Role::Requester, "ambulance_1", "ambulance_1@localhost")
    }

    fn spawn(identity: AgentIdentity, position: usize, behavior: Behavior) -> TestAgent {
        let bus = RecordingBus::new();
        let recorder = Arc::new(MemoryTripRecorder::new());
        let spec = AgentSpec {
            identity,
            position: Position(position),
            behavior,
            oracle: Arc::new(CityGraph::grid(10, 10)),
            recorder: recorder.clone(),
        };

        TestAgent {
            agent: Agent::new(spec, Box::new(bus.clone())),
            bus,
            recorder,
        }
    }

    fn requester_agent() -> TestAgent {
        let config = NegotiationConfig {
            window: WINDOW,
            jitter: JitterConfig::none(),
        };
        let providers = vec![hospital("hospital_a"), hospital("hospital_b")];
        spawn(
            ambulance(),
            44,
            Behavior::Requester(Requester::new(providers, config)),
        )
    }

    fn provider_agent(name: &str, position: usize) -> TestAgent {
        spawn(
            hospital(name),
            position,
            Behavior::Provider(ProviderResponder::new(Box::new(AnswerAll {}))),
        )
    }

    fn offer_body(request_id: &RequestId, name: &str, position: usize) -> String {
        Message::Propose(Offer {
            request_id: request_id.clone(),
            position: Position(position),
            provider: hospital(name),
        })
        .encode()
        .unwrap()
    }

    /// Request ids of all broadcasts sent so far.
    fn broadcasted(bus: &RecordingBus) -> Vec<RequestId> {
        let mut ids: Vec<RequestId> = vec![];
        for (_, msg) in bus.sent() {
            if let Message::CallForProposals(cfp) = msg {
                if !ids.contains(&cfp.request_id) {
                    ids.push(cfp.request_id);
                }
            }
        }
        ids
    }

    #[test]
    fn test_requester_negotiation_flow() {
        let t0 = Instant::now();
        let mut test = requester_agent();

        test.agent.start(t0);
        assert!(test.agent.advance(t0).is_empty());
        assert_eq!(test.agent.open_sessions(), 1);
        assert_eq!(test.agent.next_wakeup(), Some(t0 + WINDOW));

        let request_id = broadcasted(&test.bus).remove(0);
        assert_eq!(test.bus.take().len(), 2);

        let at = t0 + Duration::from_secs(1);
        test.agent
            .deliver(hospital("hospital_a"), offer_body(&request_id, "hospital_a", 99), at);
        test.agent
            .deliver(hospital("hospital_b"), offer_body(&request_id, "hospital_b", 46), at);
        assert!(test.agent.advance(at).is_empty());

        let outcomes = test.agent.advance(t0 + WINDOW);
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            SessionOutcome::Committed { winner, distance, .. } => {
                assert_eq!(winner.provider, hospital("hospital_b"));
                assert_eq!(*distance, 2);
            }
            outcome => panic!("Expected commit, got {:?}", outcome),
        }

        assert_eq!(
            test.bus.sent(),
            vec![(
                hospital("hospital_b"),
                Message::Accept(Commit { request_id })
            )]
        );
        assert_eq!(test.agent.open_sessions(), 0);
        let trip = test.recorder.get("ambulance_1").unwrap();
        assert_eq!(trip.path, vec![Position(44), Position(45), Position(46)]);
        assert_eq!(trip.intermediate_nodes, vec![Position(45)]);
    }

    #[test]
    fn test_jitter_delays_first_broadcast() {
        let t0 = Instant::now();
        let config = NegotiationConfig {
            window: WINDOW,
            jitter: JitterConfig {
                min: Duration::from_secs(1),
                max: Duration::from_secs(3),
            },
        };
        let mut test = spawn(
            ambulance(),
            0,
            Behavior::Requester(Requester::new(vec![hospital("hospital_a")], config)),
        );

        test.agent.start(t0);
        let wakeup = test.agent.next_wakeup().unwrap();
        assert!(wakeup >= t0 + Duration::from_secs(1));
        assert!(wakeup <= t0 + Duration::from_secs(3));

        test.agent.advance(t0);
        assert!(test.bus.sent().is_empty());

        test.agent.advance(wakeup);
        assert_eq!(test.bus.sent().len(), 1);
    }

    #[test]
    fn test_no_offers_fails_without_commit() {
        let t0 = Instant::now();
        let mut test = requester_agent();

        test.agent.start(t0);
        test.agent.advance(t0);
        test.bus.take();

        let outcomes = test.agent.advance(t0 + WINDOW);
        assert!(matches!(
            outcomes.as_slice(),
            [SessionOutcome::Failed {
                reason: FailReason::NoOffers,
                ..
            }]
        ));
        assert!(test.bus.sent().is_empty());
        assert!(test.recorder.is_empty());
    }

    #[test]
    fn test_concurrent_sessions_are_isolated() {
        let t0 = Instant::now();
        let mut test = requester_agent();

        test.agent.request_service(t0).unwrap();
        test.agent.advance(t0);
        let t1 = t0 + Duration::from_secs(2);
        test.agent.request_service(t1).unwrap();
        test.agent.advance(t1);

        let ids = broadcasted(&test.bus);
        assert_eq!(ids.len(), 2);
        assert_eq!(test.agent.open_sessions(), 2);
        test.bus.take();

        // Offer for the second session arrives while first one is collecting.
        let at = t0 + Duration::from_secs(3);
        test.agent
            .deliver(hospital("hospital_a"), offer_body(&ids[1], "hospital_a", 45), at);
        test.agent
            .deliver(hospital("hospital_b"), offer_body(&RequestId::from("stray"), "hospital_b", 44), at);
        test.agent.advance(at);

        let first = test.agent.advance(t0 + WINDOW);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].request_id(), &ids[0]);
        assert!(!first[0].is_committed());

        let second = test.agent.advance(t1 + WINDOW);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].request_id(), &ids[1]);
        assert!(second[0].is_committed());
        assert_eq!(test.bus.sent().len(), 1);
    }

    #[test]
    fn test_offer_after_deadline_ignored() {
        let t0 = Instant::now();
        let mut test = requester_agent();

        test.agent.start(t0);
        test.agent.advance(t0);
        let request_id = broadcasted(&test.bus).remove(0);
        test.bus.take();

        // Delivered after deadline, but before agent processed the deadline.
        let late = t0 + WINDOW + Duration::from_millis(10);
        test.agent
            .deliver(hospital("hospital_a"), offer_body(&request_id, "hospital_a", 45), late);

        let outcomes = test.agent.advance(late);
        assert!(matches!(
            outcomes.as_slice(),
            [SessionOutcome::Failed {
                reason: FailReason::NoOffers,
                ..
            }]
        ));
        assert!(test.bus.sent().is_empty());
    }

    #[test]
    fn test_redelivered_offer_counted_once() {
        let t0 = Instant::now();
        let mut test = requester_agent();

        test.agent.start(t0);
        test.agent.advance(t0);
        let request_id = broadcasted(&test.bus).remove(0);

        for _ in 0..2 {
            test.agent
                .deliver(hospital("hospital_a"), offer_body(&request_id, "hospital_a", 45), t0);
        }
        test.agent.advance(t0 + WINDOW);

        let trip = test.recorder.get("ambulance_1").unwrap();
        assert_eq!(trip.all_candidate_nodes, vec![Position(45)]);
    }

    #[test]
    fn test_commit_goes_to_actual_sender() {
        let t0 = Instant::now();
        let mut test = requester_agent();

        test.agent.start(t0);
        test.agent.advance(t0);
        let request_id = broadcasted(&test.bus).remove(0);
        test.bus.take();

        // Offer claims to be from hospital_b, but hospital_a sent it.
        test.agent
            .deliver(hospital("hospital_a"), offer_body(&request_id, "hospital_b", 45), t0);
        test.agent.advance(t0 + WINDOW);

        assert_eq!(test.bus.sent()[0].0, hospital("hospital_a"));
    }

    #[test]
    fn test_provider_responds_to_request() {
        let t0 = Instant::now();
        let mut test = provider_agent("hospital_a", 17);

        test.agent.start(t0);
        let request = Message::CallForProposals(CallForProposals {
            request_id: RequestId::from("req"),
            origin: Position(3),
            requester: ambulance(),
        });
        test.agent.deliver(ambulance(), request.encode().unwrap(), t0);
        test.agent.advance(t0);

        assert_eq!(
            test.bus.sent(),
            vec![(
                ambulance(),
                Message::Propose(Offer {
                    request_id: RequestId::from("req"),
                    position: Position(17),
                    provider: hospital("hospital_a"),
                })
            )]
        );

        let commit = Message::Accept(Commit {
            request_id: RequestId::from("req"),
        });
        test.agent.deliver(ambulance(), commit.encode().unwrap(), t0);
        test.agent.advance(t0);

        match test.agent.behavior() {
            Behavior::Provider(responder) => assert_eq!(responder.commitments(), 1),
            _ => panic!("Expected Provider"),
        }
    }

    #[test]
    fn test_malformed_and_unexpected_messages_dropped() {
        let t0 = Instant::now();
        let mut provider = provider_agent("hospital_a", 17);
        let mut passive = spawn(
            AgentIdentity::new(Role::Passive, "traffic_light_1", "traffic_light_1@localhost"),
            12,
            Behavior::Passive,
        );

        let request = Message::CallForProposals(CallForProposals {
            request_id: RequestId::from("req"),
            origin: Position(3),
            requester: ambulance(),
        })
        .encode()
        .unwrap();

        provider
            .agent
            .deliver(ambulance(), "{\"type\": \"CFP\", \"node\": 3}".to_string(), t0);
        provider
            .agent
            .deliver(ambulance(), offer_body(&RequestId::from("req"), "hospital_b", 4), t0);
        passive.agent.deliver(ambulance(), request, t0);

        assert!(provider.agent.advance(t0).is_empty());
        assert!(passive.agent.advance(t0).is_empty());
        assert!(provider.bus.sent().is_empty());
        assert!(passive.bus.sent().is_empty());
    }

    #[test]
    fn test_only_requester_requests_service() {
        let mut provider = provider_agent("hospital_a", 17);
        assert!(matches!(
            provider.agent.request_service(Instant::now()),
            Err(DispatchError::NotRequester(Role::Provider))
        ));
    }
}
