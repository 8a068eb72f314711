//! Durable per-run artifacts
//!
//! Layout under the artifacts directory:
//!
//! ```text
//! artifacts/<run_id>/status                          terminal status, one line
//! artifacts/<run_id>/job_events/<counter>-<uuid>.json one file per event
//! ```
//!
//! Writers create `<name>-partial.json.tmp` and rename it into place, so
//! readers only ever skip files carrying a partial marker.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use super::record::EventRecord;
use super::EventStoreError;
use crate::types::RunStatus;

const STATUS_FILE: &str = "status";
const EVENTS_DIR: &str = "job_events";
const PARTIAL_MARKERS: &[&str] = &["-partial", "-partial.json.tmp"];

/// Read/write access to `artifacts/`
#[derive(Debug, Clone)]
pub struct EventStore {
    artifacts_dir: PathBuf,
}

impl EventStore {
    pub fn new(artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
        }
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.artifacts_dir.join(run_id)
    }

    pub fn events_dir(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(EVENTS_DIR)
    }

    pub fn status_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(STATUS_FILE)
    }

    pub fn run_exists(&self, run_id: &str) -> bool {
        self.run_dir(run_id).is_dir()
    }

    /// Literal content of the terminal status marker, if written
    pub fn read_status(&self, run_id: &str) -> Result<Option<String>, EventStoreError> {
        let path = self.status_path(run_id);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw.trim().to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(EventStoreError::Io { path, source }),
        }
    }

    /// Write the terminal status marker
    pub fn write_status(&self, run_id: &str, status: RunStatus) -> Result<(), EventStoreError> {
        let path = self.status_path(run_id);
        write_atomically(&path, status.to_string().as_bytes())
    }

    /// Persist one event as `<counter>-<uuid>.json`
    pub fn append(&self, run_id: &str, record: &EventRecord) -> Result<PathBuf, EventStoreError> {
        let path = self
            .events_dir(run_id)
            .join(format!("{}.json", record.key()));
        let body = serde_json::to_vec(record).map_err(|source| EventStoreError::Malformed {
            path: path.clone(),
            source,
        })?;
        write_atomically(&path, &body)?;
        Ok(path)
    }

    /// Complete event files of a run, in no particular order
    pub fn event_files(&self, run_id: &str) -> Result<Vec<PathBuf>, EventStoreError> {
        if !self.run_exists(run_id) {
            return Err(EventStoreError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        let dir = self.events_dir(run_id);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(EventStoreError::Io { path: dir, source }),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| EventStoreError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if is_complete_event_file(&path) {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Parse one event file
    pub fn read_event_file(path: &Path) -> Result<EventRecord, EventStoreError> {
        let raw = fs::read(path).map_err(|source| EventStoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| EventStoreError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Single event by `<counter>-<uuid>` key
    pub fn read_event(&self, run_id: &str, key: &str) -> Result<EventRecord, EventStoreError> {
        let path = self.events_dir(run_id).join(format!("{key}.json"));
        if key.contains('/') || !path.is_file() {
            return Err(EventStoreError::EventNotFound {
                run_id: run_id.to_string(),
                key: key.to_string(),
            });
        }
        Self::read_event_file(&path)
    }

    /// Highest-counter readable event; unreadable files are skipped
    pub fn latest_event(&self, run_id: &str) -> Result<Option<EventRecord>, EventStoreError> {
        let mut files: Vec<(u64, PathBuf)> = self
            .event_files(run_id)?
            .into_iter()
            .filter_map(|path| {
                let counter = counter_of(path.file_stem()?.to_str()?)?;
                Some((counter, path))
            })
            .collect();
        files.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, path) in files {
            match Self::read_event_file(&path) {
                Ok(record) => return Ok(Some(record)),
                Err(err) => warn!("Skipping unreadable event file: {}", err),
            }
        }
        Ok(None)
    }

    /// Delete run directories last modified at least `max_age` ago.
    ///
    /// A zero age disables removal. Returns the number of runs removed.
    pub fn remove_older_than(&self, max_age: Duration) -> Result<usize, EventStoreError> {
        if max_age.is_zero() {
            return Ok(0);
        }
        let entries = match fs::read_dir(&self.artifacts_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(EventStoreError::Io {
                    path: self.artifacts_dir.clone(),
                    source,
                });
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(modified) = entry.metadata().and_then(|meta| meta.modified()) else {
                continue;
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if path.is_dir() && age >= max_age {
                fs::remove_dir_all(&path).map_err(|source| EventStoreError::Io {
                    path: path.clone(),
                    source,
                })?;
                debug!("Removed artifacts {}", path.display());
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Removed {} expired artifact directories", removed);
        }
        Ok(removed)
    }
}

/// Leading counter of an event key
pub fn counter_of(key: &str) -> Option<u64> {
    key.split_once('-')
        .map_or(key, |(counter, _)| counter)
        .parse()
        .ok()
}

/// `.json` files without a partial marker
pub fn is_complete_event_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    if PARTIAL_MARKERS.iter().any(|marker| name.contains(marker)) {
        return false;
    }
    name.ends_with(".json")
}

fn write_atomically(path: &Path, body: &[u8]) -> Result<(), EventStoreError> {
    let io_err = |source: std::io::Error| EventStoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("artifact");
    let tmp = path.with_file_name(format!("{stem}-partial.json.tmp"));

    let mut file = fs::File::create(&tmp).map_err(io_err)?;
    file.write_all(body).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(counter: u64) -> EventRecord {
        EventRecord::new(counter, format!("uuid{counter}"), "runner_on_ok").with_data("host", "h1")
    }

    #[test]
    fn test_partial_markers_are_skipped() {
        assert!(is_complete_event_file(Path::new("/x/3-abc.json")));
        assert!(!is_complete_event_file(Path::new("/x/3-abc-partial.json")));
        assert!(!is_complete_event_file(Path::new("/x/3-abc-partial.json.tmp")));
        assert!(!is_complete_event_file(Path::new("/x/stdout")));
    }

    #[test]
    fn test_counter_of_key() {
        assert_eq!(counter_of("12-aced5c65-2dd1"), Some(12));
        assert_eq!(counter_of("7"), Some(7));
        assert_eq!(counter_of("x-1"), None);
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path());
        store.append("r1", &record(2)).unwrap();
        store.append("r1", &record(10)).unwrap();

        assert_eq!(store.read_event("r1", "2-uuid2").unwrap(), record(2));
        assert_eq!(store.read_event("r1", "10-uuid10").unwrap(), record(10));
        assert_eq!(store.latest_event("r1").unwrap().unwrap().counter, 10);
        // no temp files linger
        assert_eq!(store.event_files("r1").unwrap().len(), 2);
    }

    #[test]
    fn test_latest_event_skips_corrupt_newest() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path());
        store.append("r1", &record(1)).unwrap();
        fs::write(store.events_dir("r1").join("2-broken.json"), "{not json").unwrap();
        assert_eq!(store.latest_event("r1").unwrap().unwrap().counter, 1);
    }

    #[test]
    fn test_status_marker() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path());
        assert_eq!(store.read_status("r1").unwrap(), None);
        store.write_status("r1", RunStatus::Successful).unwrap();
        assert_eq!(store.read_status("r1").unwrap().as_deref(), Some("successful"));
    }

    #[test]
    fn test_unknown_run_and_event() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path());
        assert!(matches!(
            store.event_files("ghost"),
            Err(EventStoreError::RunNotFound { .. })
        ));
        fs::create_dir_all(store.run_dir("r1")).unwrap();
        assert!(store.event_files("r1").unwrap().is_empty());
        assert!(matches!(
            store.read_event("r1", "1-nope"),
            Err(EventStoreError::EventNotFound { .. })
        ));
    }

    #[test]
    fn test_remove_older_than() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path());
        store.write_status("old", RunStatus::Failed).unwrap();
        assert_eq!(store.remove_older_than(Duration::ZERO).unwrap(), 0);
        assert_eq!(store.remove_older_than(Duration::from_secs(3600)).unwrap(), 0);
        assert!(store.run_exists("old"));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(store.remove_older_than(Duration::from_millis(5)).unwrap(), 1);
        assert!(!store.run_exists("old"));
    }
}
