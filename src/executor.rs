//! Boundary to the execution collaborator.
//!
//! The service never runs automation itself. It hands a [`LaunchRequest`] and
//! a set of [`RunCallbacks`] to an [`Executor`]; the executor drives the run on
//! its own threads and reports back through the callbacks:
//!
//! 1. `on_start` once the run is actually executing,
//! 2. `on_event` for every emitted event, in counter order,
//! 3. `on_finish` exactly once, after which no further events arrive.
//!
//! Cancellation is cooperative: the executor polls [`RunCallbacks::is_canceled`].

use anyhow::Result;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::events::{EventCache, EventRecord, EventStore, EventStoreError};
use crate::registry::{CancelToken, RunRegistry};
use crate::types::RunStatus;

/// Everything an executor needs to start one run
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest {
    pub run_id: String,
    /// Playbook file name relative to the project directory
    pub playbook: String,
    /// Root holding `inventory/`, `project/` and `artifacts/`
    pub private_data_dir: PathBuf,
    pub extravars: Option<Map<String, Value>>,
    /// Host pattern restricting the run
    pub limit: Option<String>,
    pub tags: Option<String>,
    /// Dry run
    pub check: bool,
}

impl LaunchRequest {
    pub fn new(
        run_id: impl Into<String>,
        playbook: impl Into<String>,
        private_data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            playbook: playbook.into(),
            private_data_dir: private_data_dir.into(),
            extravars: None,
            limit: None,
            tags: None,
            check: false,
        }
    }

    /// Command-line overrides in the collaborator's flag syntax
    pub fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.check {
            args.push("--check".to_string());
        }
        if let Some(tags) = &self.tags {
            args.push("--tags".to_string());
            args.push(tags.clone());
        }
        if let Some(limit) = &self.limit {
            args.push("--limit".to_string());
            args.push(limit.clone());
        }
        args
    }
}

/// Hooks an executor calls while a run progresses
#[derive(Debug, Clone)]
pub struct RunCallbacks {
    run_id: String,
    registry: Arc<RunRegistry>,
    cache: Arc<EventCache>,
    store: EventStore,
    cancel: CancelToken,
}

impl RunCallbacks {
    pub(crate) fn new(
        run_id: &str,
        registry: Arc<RunRegistry>,
        cache: Arc<EventCache>,
        store: EventStore,
        cancel: CancelToken,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            registry,
            cache,
            store,
            cancel,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    pub fn on_start(&self) {
        if self.registry.mark_running(&self.run_id) {
            debug!("Run {} is executing", self.run_id);
        }
    }

    /// Update in-memory state for an event already written to disk
    pub fn on_event(&self, event: &EventRecord) {
        self.registry.on_event(&self.run_id, event);
        self.cache.record(&self.run_id, event);
    }

    pub fn on_finish(&self, status: RunStatus) {
        self.registry.finish(&self.run_id, status);
    }

    /// Persist an event, then apply it
    pub fn emit(&self, event: &EventRecord) -> Result<(), EventStoreError> {
        self.store.append(&self.run_id, event)?;
        self.on_event(event);
        Ok(())
    }

    /// Write the terminal status marker, then finish the run.
    ///
    /// The run is finished even when the marker cannot be written.
    pub fn complete(&self, status: RunStatus) -> Result<(), EventStoreError> {
        let written = self.store.write_status(&self.run_id, status);
        if let Err(err) = &written {
            warn!("Status marker for run {} not written: {}", self.run_id, err);
        }
        self.on_finish(status);
        written
    }
}

/// Execution collaborator
pub trait Executor: Send + Sync {
    /// Begin the run and return without waiting for it to finish
    fn launch(&self, request: LaunchRequest, callbacks: RunCallbacks) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::LifetimeCounters;
    use crate::registry::RunState;

    fn callbacks(dir: &tempfile::TempDir) -> (Arc<RunRegistry>, Arc<EventCache>, RunCallbacks) {
        let store = EventStore::new(dir.path());
        let registry = Arc::new(RunRegistry::new(
            5,
            store.clone(),
            Arc::new(LifetimeCounters::new()),
        ));
        let cache = Arc::new(EventCache::new(3));
        let cancel = registry.register("r1", RunStatus::Starting).unwrap();
        cache.cache_events("r1");
        let callbacks = RunCallbacks::new(
            "r1",
            Arc::clone(&registry),
            Arc::clone(&cache),
            store,
            cancel,
        );
        (registry, cache, callbacks)
    }

    #[test]
    fn test_cli_args() {
        let mut request = LaunchRequest::new("r1", "site.yml", "/srv");
        assert!(request.to_cli_args().is_empty());
        request.check = true;
        request.tags = Some("setup".into());
        request.limit = Some("web".into());
        assert_eq!(
            request.to_cli_args(),
            vec!["--check", "--tags", "setup", "--limit", "web"]
        );
    }

    #[test]
    fn test_emit_persists_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, cache, callbacks) = callbacks(&dir);
        callbacks.on_start();
        let event = EventRecord::new(1, "u1", "runner_on_ok").with_data("host", "h1");
        callbacks.emit(&event).unwrap();

        assert!(dir.path().join("r1/job_events/1-u1.json").is_file());
        assert!(cache.get("r1", "1-u1").is_some());
        let RunState::Active(run) = registry.status("r1").unwrap() else {
            panic!("expected resident run");
        };
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.outcome_count("ok"), 1);
    }

    #[test]
    fn test_complete_writes_marker() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _cache, callbacks) = callbacks(&dir);
        callbacks.complete(RunStatus::Successful).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("r1/status")).unwrap(),
            "successful"
        );
        let RunState::Active(run) = registry.status("r1").unwrap() else {
            panic!("expected resident run");
        };
        assert_eq!(run.status, RunStatus::Successful);
    }

    #[test]
    fn test_cancel_visible_to_executor() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _cache, callbacks) = callbacks(&dir);
        assert!(!callbacks.is_canceled());
        registry.cancel("r1").unwrap();
        assert!(callbacks.is_canceled());
    }
}
