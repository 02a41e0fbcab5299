pub mod identity;
pub mod message;
pub mod trip;

pub use identity::{AgentIdentity, Position, RequestId, Role};
pub use message::{CallForProposals, Commit, Message, Offer, ProtocolError};
pub use trip::TripRecord;
