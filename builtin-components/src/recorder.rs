use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dispatch_component::{RecordError, TripRecorder};
use dispatch_protocol::TripRecord;

/// Stores each trip as `trip_<requester>.json` in output directory.
pub struct FileTripRecorder {
    output_dir: PathBuf,
}

impl FileTripRecorder {
    pub fn new(output_dir: impl Into<PathBuf>) -> FileTripRecorder {
        FileTripRecorder {
            output_dir: output_dir.into(),
        }
    }

    pub fn trip_path(&self, requester_name: &str) -> PathBuf {
        self.output_dir
            .join(format!("trip_{}.json", escape_name(requester_name)))
    }

    pub fn load(&self, requester_name: &str) -> Result<TripRecord, RecordError> {
        let path = self.trip_path(requester_name);
        let content = fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn escape_name(name: &str) -> String {
    name.replace(|c: char| c == '/' || c == '\\' || c == ':', "_")
}

fn io_error(path: &Path, source: std::io::Error) -> RecordError {
    RecordError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl TripRecorder for FileTripRecorder {
    fn record(&self, trip: &TripRecord) -> Result<(), RecordError> {
        let content = serde_json::to_string_pretty(trip)?;

        fs::create_dir_all(&self.output_dir).map_err(|e| io_error(&self.output_dir, e))?;

        // Rename replaces previous record atomically, so reader never sees
        // partially written file, even if the same requester is recorded twice.
        let path = self.trip_path(&trip.requester_name);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, content).map_err(|e| io_error(&tmp_path, e))?;
        fs::rename(&tmp_path, &path).map_err(|e| io_error(&path, e))?;

        log::info!(
            "[{}] Trip data saved: {}",
            trip.requester_name,
            path.display()
        );
        Ok(())
    }
}

/// Keeps trips in memory. Useful in tests.
#[derive(Default)]
pub struct MemoryTripRecorder {
    trips: Mutex<HashMap<String, TripRecord>>,
}

impl MemoryTripRecorder {
    pub fn new() -> MemoryTripRecorder {
        MemoryTripRecorder::default()
    }

    pub fn get(&self, requester_name: &str) -> Option<TripRecord> {
        self.trips
            .lock()
            .ok()
            .and_then(|trips| trips.get(requester_name).cloned())
    }

    pub fn len(&self) -> usize {
        self.trips.lock().map(|trips| trips.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TripRecorder for MemoryTripRecorder {
    fn record(&self, trip: &TripRecord) -> Result<(), RecordError> {
        self.trips
            .lock()
            .map_err(|e| RecordError::Unavailable(e.to_string()))?
            .insert(trip.requester_name.clone(), trip.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_protocol::Position;
    use tempdir::TempDir;

    fn trip(end: usize) -> TripRecord {
        TripRecord::new(
            "ambulance_1",
            vec![Position(5), Position(6), Position(end)],
            Position(5),
            Position(end),
            vec![Position(12), Position(end)],
        )
    }

    #[test]
    fn test_file_recorder_overwrites() {
        let dir = TempDir::new("trip-recorder").unwrap();
        let recorder = FileTripRecorder::new(dir.path().join("output"));

        recorder.record(&trip(20)).unwrap();
        recorder.record(&trip(21)).unwrap();

        assert_eq!(recorder.load("ambulance_1").unwrap(), trip(21));
        assert!(recorder.trip_path("ambulance_1").ends_with("trip_ambulance_1.json"));

        // No temporary files left behind.
        let files = fs::read_dir(dir.path().join("output")).unwrap().count();
        assert_eq!(files, 1);
    }

    #[test]
    fn test_file_recorder_unwritable_dir() {
        let dir = TempDir::new("trip-recorder").unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let recorder = FileTripRecorder::new(&blocker);
        match recorder.record(&trip(20)) {
            Err(RecordError::Io { .. }) => (),
            result => panic!("Expected Io error, got {:?}", result),
        }
    }

    #[test]
    fn test_memory_recorder() {
        let recorder = MemoryTripRecorder::new();
        assert!(recorder.is_empty());

        recorder.record(&trip(20)).unwrap();
        recorder.record(&trip(20)).unwrap();

        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.get("ambulance_1"), Some(trip(20)));
    }
}
