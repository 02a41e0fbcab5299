use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::identity::{AgentIdentity, Position, RequestId};

#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Request for service broadcasted by Requester to all known Providers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallForProposals {
    pub request_id: RequestId,
    pub origin: Position,
    pub requester: AgentIdentity,
}

/// Provider's answer to `CallForProposals`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub request_id: RequestId,
    pub position: Position,
    pub provider: AgentIdentity,
}

/// Sent only to the Provider which won negotiations. Losers get nothing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub request_id: RequestId,
}

/// Negotiation payload as it travels through the bus. Serialized as JSON map
/// with `type` field discriminating message kind.
#[derive(Clone, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "CFP")]
    #[display(fmt = "CFP")]
    CallForProposals(CallForProposals),
    #[serde(rename = "PROPOSE")]
    #[display(fmt = "PROPOSE")]
    Propose(Offer),
    #[serde(rename = "ACCEPT")]
    #[display(fmt = "ACCEPT")]
    Accept(Commit),
}

impl Message {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(body: &str) -> Result<Message, ProtocolError> {
        Ok(serde_json::from_str(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;

    #[test]
    fn test_wire_format_has_type_discriminant() {
        let msg = Message::Propose(Offer {
            request_id: RequestId::from("req-1"),
            position: Position(20),
            provider: AgentIdentity::new(Role::Provider, "hospital_b", "hospital_b@localhost"),
        });

        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "PROPOSE");
        assert_eq!(value["request_id"], "req-1");
        assert_eq!(value["position"], 20);
        assert_eq!(value["provider"]["role"], "provider");
    }

    #[test]
    fn test_decode_accept() {
        let msg = Message::decode(r#"{"type": "ACCEPT", "request_id": "abc"}"#).unwrap();
        assert_eq!(
            msg,
            Message::Accept(Commit {
                request_id: RequestId::from("abc")
            })
        );
        assert_eq!(msg.to_string(), "ACCEPT");
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(Message::decode(r#"{"type": "INFORM", "request_id": "abc"}"#).is_err());
        assert!(Message::decode("not even json").is_err());
        // Old payloads without correlation id can't be routed to any session.
        assert!(Message::decode(r#"{"type": "PROPOSE", "node": 4}"#).is_err());
    }
}
