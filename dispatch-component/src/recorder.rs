use std::path::PathBuf;

use dispatch_protocol::TripRecord;

#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    #[error("Failed to write trip record to {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to serialize trip record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Trip storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable storage of committed negotiation outcomes.
///
/// Records are keyed by requester name. Recording the same key again
/// overwrites previous entry.
pub trait TripRecorder: Send + Sync {
    fn record(&self, trip: &TripRecord) -> Result<(), RecordError>;
}
