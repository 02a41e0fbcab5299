use dispatch_component::TransportError;
use dispatch_protocol::{ProtocolError, RequestId, Role};

use crate::session::SessionError;

/// Reasons why agent couldn't process event. None of them is fatal for agent.
#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("Malformed message from [{from}]. {source}")]
    Malformed { from: String, source: ProtocolError },
    #[error("No open session for request [{0}]")]
    UnknownSession(RequestId),
    #[error("{role} agent doesn't handle {kind} messages")]
    UnexpectedMessage { role: Role, kind: String },
    #[error("Only Requester can request service, not {0}")]
    NotRequester(Role),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
