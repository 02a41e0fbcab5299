use derive_more::Display;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};

/// Role of an agent in dispatch negotiations.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Needs service and initiates negotiations.
    Requester,
    /// Offers service from fixed location.
    Provider,
    /// Doesn't negotiate. Exists only as map landmark.
    Passive,
}

impl Role {
    /// Guesses role from agent name, the way deployment scripts name agents:
    /// `hospital_a` is Provider, `traffic_light_3` is Passive, everything else
    /// is Requester.
    pub fn infer_from_name(name: &str) -> Role {
        let name = name.to_lowercase();
        if name.contains("hospital") {
            Role::Provider
        } else if name.contains("traffic") {
            Role::Passive
        } else {
            Role::Requester
        }
    }
}

/// Stable address of an agent on the message bus.
#[derive(Clone, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[display(fmt = "{}", address)]
pub struct AgentIdentity {
    pub role: Role,
    pub name: String,
    pub address: String,
}

impl AgentIdentity {
    pub fn new(role: Role, name: impl ToString, address: impl ToString) -> AgentIdentity {
        AgentIdentity {
            role,
            name: name.to_string(),
            address: address.to_string(),
        }
    }
}

/// Node of the routing graph.
#[derive(
    Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Position(pub usize);

impl Position {
    pub fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for Position {
    fn from(node: usize) -> Self {
        Position(node)
    }
}

/// Correlates all messages belonging to single negotiation session.
#[derive(Clone, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate() -> RequestId {
        RequestId(
            thread_rng()
                .sample_iter(&Alphanumeric)
                .take(64)
                .map(char::from)
                .collect(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_inference() {
        assert_eq!(Role::infer_from_name("Hospital_A"), Role::Provider);
        assert_eq!(Role::infer_from_name("traffic_light_7"), Role::Passive);
        assert_eq!(Role::infer_from_name("ambulance_1"), Role::Requester);
    }

    #[test]
    fn test_generated_request_ids_differ() {
        let id1 = RequestId::generate();
        let id2 = RequestId::generate();

        assert_eq!(id1.as_str().len(), 64);
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_identity_displays_address() {
        let identity = AgentIdentity::new(Role::Provider, "hospital_a", "hospital_a@localhost");
        assert_eq!(identity.to_string(), "hospital_a@localhost");
    }
}
