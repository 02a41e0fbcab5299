pub mod answer_all;
pub mod graph;
pub mod recorder;
pub mod recording_bus;
pub mod service_radius;

pub use answer_all::AnswerAll;
pub use graph::{CityGraph, EdgeRecord, GraphDocument, GraphError, NodeRecord};
pub use recorder::{FileTripRecorder, MemoryTripRecorder};
pub use recording_bus::RecordingBus;
pub use service_radius::ServiceRadius;
