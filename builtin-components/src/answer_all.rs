use dispatch_component::{OfferPolicy, PolicyDecision, RoutingOracle};
use dispatch_protocol::{CallForProposals, Position};

/// Policy that answers every incoming request.
pub struct AnswerAll {}

impl AnswerAll {
    pub fn new(_config: serde_yaml::Value) -> anyhow::Result<AnswerAll> {
        Ok(AnswerAll {})
    }
}

impl OfferPolicy for AnswerAll {
    fn review(
        &self,
        _request: &CallForProposals,
        _own_position: Position,
        _oracle: &dyn RoutingOracle,
    ) -> PolicyDecision {
        PolicyDecision::Offer
    }
}
