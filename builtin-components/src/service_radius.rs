use serde::{Deserialize, Serialize};

use dispatch_component::{Cost, OfferPolicy, PolicyDecision, RoutingOracle};
use dispatch_protocol::{CallForProposals, Position};

/// Policy that ignores requests coming from too far.
pub struct ServiceRadius {
    max_cost: Cost,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub max_cost: Cost,
}

impl ServiceRadius {
    pub fn new(config: serde_yaml::Value) -> anyhow::Result<ServiceRadius> {
        let config: Config = serde_yaml::from_value(config)?;
        Ok(ServiceRadius {
            max_cost: config.max_cost,
        })
    }
}

impl OfferPolicy for ServiceRadius {
    fn review(
        &self,
        request: &CallForProposals,
        own_position: Position,
        oracle: &dyn RoutingOracle,
    ) -> PolicyDecision {
        match oracle.distance(request.origin, own_position) {
            Some(cost) if cost <= self.max_cost => PolicyDecision::Offer,
            Some(cost) => PolicyDecision::Decline {
                reason: format!(
                    "Origin {} is {} away, service radius is {}",
                    request.origin, cost, self.max_cost
                ),
            },
            None => PolicyDecision::Decline {
                reason: format!("Origin {} is unreachable", request.origin),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CityGraph;
    use dispatch_protocol::{AgentIdentity, RequestId, Role};

    fn request_from(origin: usize) -> CallForProposals {
        CallForProposals {
            request_id: RequestId::generate(),
            origin: Position(origin),
            requester: AgentIdentity::new(Role::Requester, "ambulance", "ambulance@localhost"),
        }
    }

    #[test]
    fn test_service_radius() {
        let params = serde_yaml::to_value(Config { max_cost: 3 }).unwrap();
        let policy = ServiceRadius::new(params).unwrap();

        // Straight street 0 - 1 - 2 - 3 - 4.
        let graph = CityGraph::grid(5, 1);

        assert_eq!(
            policy.review(&request_from(1), Position(4), &graph),
            PolicyDecision::Offer
        );
        assert!(matches!(
            policy.review(&request_from(0), Position(4), &graph),
            PolicyDecision::Decline { .. }
        ));
        assert!(matches!(
            policy.review(&request_from(99), Position(4), &graph),
            PolicyDecision::Decline { .. }
        ));
    }

    #[test]
    fn test_invalid_config() {
        assert!(ServiceRadius::new(serde_yaml::Value::Null).is_err());
    }
}
