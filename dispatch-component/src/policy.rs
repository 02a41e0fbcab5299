use derive_more::Display;

use dispatch_protocol::{CallForProposals, Position};

use crate::oracle::RoutingOracle;

#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum PolicyDecision {
    #[display(fmt = "Offer")]
    Offer,
    #[display(fmt = "Decline (reason: '{}')", reason)]
    Decline { reason: String },
}

/// Decides, if Provider should answer incoming request at all.
pub trait OfferPolicy: Send + Sync {
    fn review(
        &self,
        request: &CallForProposals,
        own_position: Position,
        oracle: &dyn RoutingOracle,
    ) -> PolicyDecision;
}
