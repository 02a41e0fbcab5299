mod actor;
mod agent;
mod bus;
mod error;
mod events;
pub mod factory;
mod responder;
mod session;

pub use actor::{AgentActor, AgentAddr, AgentCallbacks, Deliver, RequestService, Shutdown};
pub use agent::{Agent, AgentSpec, Behavior, JitterConfig, NegotiationConfig, Requester};
pub use bus::{BusConnection, LocalBus};
pub use error::DispatchError;
pub use events::{AgentEvent, EventQueue};
pub use responder::ProviderResponder;
pub use session::{FailReason, NegotiationSession, SessionError, SessionOutcome, SessionState};

pub use dispatch_component::{
    Cost, MessageBus, OfferPolicy, PolicyDecision, RecordError, RoutingOracle, TransportError,
    TripRecorder,
};
pub use dispatch_protocol::{
    AgentIdentity, CallForProposals, Commit, Message, Offer, Position, RequestId, Role, TripRecord,
};

pub mod builtin {
    pub use dispatch_builtin::{
        AnswerAll, CityGraph, EdgeRecord, FileTripRecorder, GraphDocument, GraphError,
        MemoryTripRecorder, NodeRecord, RecordingBus, ServiceRadius,
    };
}
