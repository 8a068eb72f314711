//! Run events: durable store, bounded in-memory cache and parallel scanner

pub mod cache;
pub mod record;
pub mod scanner;
pub mod store;

use std::path::PathBuf;
use thiserror::Error;

pub use cache::EventCache;
pub use record::{
    EventFilter, EventListing, EventRecord, EventSummary, IGNORED_EVENT_KINDS, OUTCOME_PREFIX,
    TASK_START_EVENT,
};
pub use scanner::EventScanner;
pub use store::EventStore;

/// Errors raised while reading or writing run artifacts
#[derive(Error, Debug)]
pub enum EventStoreError {
    #[error("No artifacts found for run {run_id}")]
    RunNotFound { run_id: String },

    #[error("Event {key} not found for run {run_id}")]
    EventNotFound { run_id: String, key: String },

    /// A single unreadable event file; scans log and skip these
    #[error("Malformed event file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Artifact I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EventStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RunNotFound { .. } | Self::EventNotFound { .. })
    }
}
