pub mod bus;
pub mod oracle;
pub mod policy;
pub mod recorder;

pub use bus::{MessageBus, TransportError};
pub use oracle::{Cost, RoutingOracle};
pub use policy::{OfferPolicy, PolicyDecision};
pub use recorder::{RecordError, TripRecorder};
