use dispatch_component::{MessageBus, OfferPolicy, PolicyDecision, RoutingOracle, TransportError};
use dispatch_protocol::{AgentIdentity, CallForProposals, Commit, Message, Offer, Position};

/// Provider side of negotiations. Answers each request with single Offer
/// containing Provider's position, unless policy declines the request.
pub struct ProviderResponder {
    policy: Box<dyn OfferPolicy>,
    commitments: usize,
}

impl ProviderResponder {
    pub fn new(policy: Box<dyn OfferPolicy>) -> ProviderResponder {
        ProviderResponder {
            policy,
            commitments: 0,
        }
    }

    /// Returns Offer that was sent or `None` if policy declined request.
    pub fn respond(
        &self,
        provider: &AgentIdentity,
        position: Position,
        request: &CallForProposals,
        from: &AgentIdentity,
        oracle: &dyn RoutingOracle,
        bus: &dyn MessageBus,
    ) -> Result<Option<Offer>, TransportError> {
        if let PolicyDecision::Decline { reason } = self.policy.review(request, position, oracle) {
            log::info!(
                "[{}] Ignoring request [{}] from [{}]. {}",
                provider.name,
                request.request_id,
                from,
                reason
            );
            return Ok(None);
        }

        let offer = Offer {
            request_id: request.request_id.clone(),
            position,
            provider: provider.clone(),
        };

        bus.send(from, &Message::Propose(offer.clone()))?;

        log::info!(
            "[{}] Proposed node {} for request [{}] from [{}].",
            provider.name,
            position,
            request.request_id,
            from
        );
        Ok(Some(offer))
    }

    pub fn on_commit(&mut self, provider: &AgentIdentity, commit: &Commit, from: &AgentIdentity) {
        self.commitments += 1;
        log::info!(
            "[{}] Chosen by [{}] for request [{}]. Total commitments: {}.",
            provider.name,
            from,
            commit.request_id,
            self.commitments
        );
    }

    pub fn commitments(&self) -> usize {
        self.commitments
    }
}
