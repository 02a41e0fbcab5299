use derive_more::Display;
use std::time::{Duration, Instant};

use dispatch_component::{Cost, MessageBus, RoutingOracle, TripRecorder};
use dispatch_protocol::{
    AgentIdentity, CallForProposals, Commit, Message, Offer, Position, RequestId, TripRecord,
};

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Broadcasting,
    Collecting,
    Deciding,
    Committed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Committed | SessionState::Failed)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Offer for request [{offer}] doesn't belong to session [{session}]")]
    ForeignRequest { session: RequestId, offer: RequestId },
    #[error("Offer from [{provider}] arrived after session [{request_id}] deadline")]
    WindowClosed {
        request_id: RequestId,
        provider: String,
    },
    #[error("[{provider}] already made an offer for request [{request_id}]")]
    DuplicateOffer {
        request_id: RequestId,
        provider: String,
    },
    #[error("Session [{request_id}] can't {action} in state {state}")]
    InvalidState {
        request_id: RequestId,
        action: &'static str,
        state: SessionState,
    },
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum FailReason {
    #[display(fmt = "No Provider replied")]
    NoOffers,
    #[display(fmt = "No Provider is reachable")]
    NoReachableOffer,
}

/// Result of single negotiation, reported after session reaches terminal state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    Committed {
        request_id: RequestId,
        winner: Offer,
        distance: Cost,
        trip: TripRecord,
        /// False if Commit couldn't be handed to the bus. Winner doesn't know,
        /// that he was chosen in this case.
        commit_sent: bool,
        recorded: bool,
    },
    Failed {
        request_id: RequestId,
        reason: FailReason,
    },
}

impl SessionOutcome {
    pub fn request_id(&self) -> &RequestId {
        match self {
            SessionOutcome::Committed { request_id, .. } => request_id,
            SessionOutcome::Failed { request_id, .. } => request_id,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, SessionOutcome::Committed { .. })
    }
}

/// Requester side of single negotiation. Broadcasts request, collects Offers
/// until deadline and chooses the closest Provider.
pub struct NegotiationSession {
    request_id: RequestId,
    origin: Position,
    deadline: Option<Instant>,
    offers: Vec<Offer>,
    state: SessionState,
}

impl NegotiationSession {
    pub fn new(request_id: RequestId, origin: Position) -> NegotiationSession {
        NegotiationSession {
            request_id,
            origin,
            deadline: None,
            offers: vec![],
            state: SessionState::Init,
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn origin(&self) -> Position {
        self.origin
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Offers in order of arrival.
    pub fn offers(&self) -> &[Offer] {
        &self.offers
    }

    fn expect_state(&self, expected: SessionState, action: &'static str) -> Result<(), SessionError> {
        if self.state != expected {
            return Err(SessionError::InvalidState {
                request_id: self.request_id.clone(),
                action,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Sends request to all Providers and opens collection window.
    /// Returns deadline, after which `decide` should be called.
    pub fn broadcast(
        &mut self,
        requester: &AgentIdentity,
        providers: &[AgentIdentity],
        bus: &dyn MessageBus,
        window: Duration,
        now: Instant,
    ) -> Result<Instant, SessionError> {
        self.expect_state(SessionState::Init, "broadcast")?;
        self.state = SessionState::Broadcasting;

        log::info!(
            "[{}] Emergency! Broadcasting request [{}] from node {} to {} Provider(s).",
            requester.name,
            self.request_id,
            self.origin,
            providers.len()
        );

        let request = Message::CallForProposals(CallForProposals {
            request_id: self.request_id.clone(),
            origin: self.origin,
            requester: requester.clone(),
        });

        for provider in providers {
            if let Err(e) = bus.send(provider, &request) {
                log::warn!(
                    "[{}] Failed to send request [{}] to [{}]. {}",
                    requester.name,
                    self.request_id,
                    provider,
                    e
                );
            }
        }

        let deadline = now + window;
        self.deadline = Some(deadline);
        self.state = SessionState::Collecting;
        Ok(deadline)
    }

    /// Adds Offer to be considered during decision.
    pub fn collect(&mut self, offer: Offer, now: Instant) -> Result<(), SessionError> {
        if offer.request_id != self.request_id {
            return Err(SessionError::ForeignRequest {
                session: self.request_id.clone(),
                offer: offer.request_id,
            });
        }

        self.expect_state(SessionState::Collecting, "collect offers")?;

        if self.is_expired(now) {
            return Err(SessionError::WindowClosed {
                request_id: self.request_id.clone(),
                provider: offer.provider.address,
            });
        }

        // Bus may deliver the same Offer more than once.
        if self
            .offers
            .iter()
            .any(|known| known.provider.address == offer.provider.address)
        {
            return Err(SessionError::DuplicateOffer {
                request_id: self.request_id.clone(),
                provider: offer.provider.address,
            });
        }

        log::debug!(
            "Request [{}]: collected offer from [{}] at node {}.",
            self.request_id,
            offer.provider,
            offer.position
        );
        self.offers.push(offer);
        Ok(())
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }

    /// Index of the closest reachable Offer and its distance. The earliest
    /// received Offer wins ties.
    pub fn select_winner(&self, oracle: &dyn RoutingOracle) -> Option<(usize, Cost)> {
        let mut best: Option<(usize, Cost)> = None;
        for (idx, offer) in self.offers.iter().enumerate() {
            let distance = match oracle.distance(self.origin, offer.position) {
                Some(distance) => distance,
                None => {
                    log::debug!(
                        "Request [{}]: Provider [{}] at node {} is unreachable.",
                        self.request_id,
                        offer.provider,
                        offer.position
                    );
                    continue;
                }
            };

            if best.map_or(true, |(_, best_distance)| distance < best_distance) {
                best = Some((idx, distance));
            }
        }
        best
    }

    /// Closes collection window and chooses winner. Commit is sent to winner
    /// and trip is recorded. Failures of these side effects are reported in
    /// outcome, but don't change decision.
    pub fn decide(
        &mut self,
        requester: &AgentIdentity,
        oracle: &dyn RoutingOracle,
        bus: &dyn MessageBus,
        recorder: &dyn TripRecorder,
    ) -> Result<SessionOutcome, SessionError> {
        self.expect_state(SessionState::Collecting, "decide")?;
        self.state = SessionState::Deciding;

        if self.offers.is_empty() {
            return Ok(self.fail(requester, FailReason::NoOffers));
        }

        let (idx, distance) = match self.select_winner(oracle) {
            Some(winner) => winner,
            None => return Ok(self.fail(requester, FailReason::NoReachableOffer)),
        };
        let winner = self.offers[idx].clone();

        log::info!(
            "[{}] Destination set: [{}] at node {} (distance: {}).",
            requester.name,
            winner.provider,
            winner.position,
            distance
        );

        let commit = Message::Accept(Commit {
            request_id: self.request_id.clone(),
        });
        let commit_sent = match bus.send(&winner.provider, &commit) {
            Ok(_) => true,
            Err(e) => {
                log::error!(
                    "[{}] Failed to send Commit for request [{}] to [{}]. {}",
                    requester.name,
                    self.request_id,
                    winner.provider,
                    e
                );
                false
            }
        };

        let path = oracle.path(self.origin, winner.position);
        let candidates = self.offers.iter().map(|offer| offer.position).collect();
        let trip = TripRecord::new(
            &requester.name,
            path,
            self.origin,
            winner.position,
            candidates,
        );

        // Negotiation outcome stands, even if we can't store it.
        let recorded = match recorder.record(&trip) {
            Ok(_) => true,
            Err(e) => {
                log::error!("[{}] Failed to save trip data. {}", requester.name, e);
                false
            }
        };

        self.state = SessionState::Committed;
        Ok(SessionOutcome::Committed {
            request_id: self.request_id.clone(),
            winner,
            distance,
            trip,
            commit_sent,
            recorded,
        })
    }

    fn fail(&mut self, requester: &AgentIdentity, reason: FailReason) -> SessionOutcome {
        log::warn!(
            "[{}] Request [{}] failed: {}.",
            requester.name,
            self.request_id,
            reason
        );

        self.state = SessionState::Failed;
        SessionOutcome::Failed {
            request_id: self.request_id.clone(),
            reason,
        }
    }
}
