//! In-memory table of active runs with fallback to durable artifacts
//!
//! The table sits behind one coarse mutex: starts, event callbacks from the
//! collaborator's threads and status queries all go through it, and readers
//! receive cloned snapshots. Once a run has been pruned, `status` answers
//! from the artifacts directory instead.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{EventRecord, EventStore, EventStoreError, EventSummary};
use crate::metrics::LifetimeCounters;
use crate::types::RunStatus;

/// Per-run counters present from registration on
const SEEDED_OUTCOMES: &[&str] = &["ok", "failed", "skipped"];

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Run {run_id} is already registered")]
    AlreadyRegistered { run_id: String },

    #[error("Run {run_id} is not active")]
    NotActive { run_id: String },

    #[error("Run {run_id} not found")]
    NotFound { run_id: String },

    #[error(transparent)]
    Store(#[from] EventStoreError),
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Store(err) => err.is_not_found(),
            _ => false,
        }
    }
}

/// Cooperative cancellation flag shared with the executor
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Details of the task currently executing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskMetadata {
    pub created: String,
    pub play_pattern: String,
    pub task_path: String,
    pub task_action: String,
}

impl TaskMetadata {
    fn from_event(event: &EventRecord) -> Self {
        let field = |key: &str| {
            event
                .event_data
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            created: event.created.clone().unwrap_or_default(),
            play_pattern: field("play_pattern"),
            task_path: field("task_path"),
            task_action: field("task_action"),
        }
    }
}

/// Live state of a resident run
#[derive(Debug, Clone, Serialize)]
pub struct ActiveRun {
    pub run_id: String,
    pub status: RunStatus,
    pub current_task: Option<String>,
    pub task_metadata: TaskMetadata,
    pub role: String,
    pub last_event_counter: Option<u64>,
    /// Per-outcome counts (`ok`, `failed`, `skipped`, ...)
    pub outcomes: BTreeMap<String, u64>,
    /// Last unignored failure per host
    pub failures: BTreeMap<String, EventRecord>,
    pub started_at: DateTime<Utc>,
    #[serde(skip)]
    cancel: CancelToken,
}

impl ActiveRun {
    fn new(run_id: &str, status: RunStatus) -> Self {
        Self {
            run_id: run_id.to_string(),
            status,
            current_task: None,
            task_metadata: TaskMetadata::default(),
            role: String::new(),
            last_event_counter: None,
            outcomes: SEEDED_OUTCOMES
                .iter()
                .map(|outcome| (outcome.to_string(), 0))
                .collect(),
            failures: BTreeMap::new(),
            started_at: Utc::now(),
            cancel: CancelToken::new(),
        }
    }

    pub fn outcome_count(&self, outcome: &str) -> u64 {
        self.outcomes.get(outcome).copied().unwrap_or(0)
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    /// Payload of a status response
    pub fn status_data(&self) -> Value {
        json!({
            "task": self.current_task,
            "task_metadata": self.task_metadata,
            "role": self.role,
            "last_task_num": self.last_event_counter,
            "skipped": self.outcome_count("skipped"),
            "failed": self.outcome_count("failed"),
            "ok": self.outcome_count("ok"),
            "failures": self.failures,
        })
    }
}

/// Answer to a status query
#[derive(Debug, Clone)]
pub enum RunState {
    /// Resident in the registry
    Active(ActiveRun),
    /// Pruned; literal content of the terminal status marker
    Finished(String),
    /// Pruned without a marker; synthesized from the newest event on disk
    InProgress {
        last_event_counter: u64,
        latest: EventSummary,
    },
    /// Artifacts exist but hold neither a marker nor events
    Unknown,
}

#[derive(Debug)]
pub struct RunRegistry {
    capacity: usize,
    table: Mutex<HashMap<String, ActiveRun>>,
    /// Signalled whenever a run leaves the `starting` state
    started: Condvar,
    store: EventStore,
    counters: Arc<LifetimeCounters>,
}

impl RunRegistry {
    pub fn new(capacity: usize, store: EventStore, counters: Arc<LifetimeCounters>) -> Self {
        Self {
            capacity: capacity.max(1),
            table: Mutex::new(HashMap::new()),
            started: Condvar::new(),
            store,
            counters,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, ActiveRun>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_resident(&self, run_id: &str) -> bool {
        self.table().contains_key(run_id)
    }

    /// Resident runs that have not reached a terminal status
    pub fn active_count(&self) -> usize {
        self.table()
            .values()
            .filter(|run| !run.status.is_terminal())
            .count()
    }

    /// Create the record for a new run; returns its cancellation token
    pub fn register(&self, run_id: &str, status: RunStatus) -> Result<CancelToken, RegistryError> {
        let mut table = self.table();
        if table.contains_key(run_id) {
            return Err(RegistryError::AlreadyRegistered {
                run_id: run_id.to_string(),
            });
        }
        let run = ActiveRun::new(run_id, status);
        let token = run.cancel.clone();
        table.insert(run_id.to_string(), run);
        debug!("Registered run {} ({} resident)", run_id, table.len());
        Ok(token)
    }

    /// Move a starting run to `running`; no-op otherwise
    pub fn mark_running(&self, run_id: &str) -> bool {
        let mut table = self.table();
        let Some(run) = table.get_mut(run_id) else {
            return false;
        };
        if run.status != RunStatus::Starting {
            return false;
        }
        run.status = RunStatus::Running;
        self.started.notify_all();
        true
    }

    /// Apply one collaborator event; returns whether the run was resident
    pub fn on_event(&self, run_id: &str, event: &EventRecord) -> bool {
        self.counters.record_event(&event.kind);

        let mut table = self.table();
        let Some(run) = table.get_mut(run_id) else {
            debug!(
                "Event {} for run {} that is no longer resident",
                event.key(),
                run_id
            );
            return false;
        };

        if run.status == RunStatus::Starting {
            run.status = RunStatus::Running;
            self.started.notify_all();
        }
        if event.is_task_start() {
            run.current_task = Some(event.task().unwrap_or("Unknown task").to_string());
            run.task_metadata = TaskMetadata::from_event(event);
        }
        run.last_event_counter = Some(event.counter);
        run.role = event.role().unwrap_or_default().to_string();

        if let Some(outcome) = event.outcome() {
            if outcome == "failed" && event.ignores_errors() {
                debug!("Ignoring tolerated failure in run {}", run_id);
            } else {
                *run.outcomes.entry(outcome.to_string()).or_insert(0) += 1;
                if outcome == "failed" {
                    let host = event.host().unwrap_or_default().to_string();
                    run.failures.insert(host, event.clone());
                }
            }
        }
        true
    }

    /// Record the terminal status; prunes the run when the table is full.
    ///
    /// Returns whether the run was pruned.
    pub fn finish(&self, run_id: &str, status: RunStatus) -> bool {
        self.counters.record_completion(status);

        let mut table = self.table();
        match table.get_mut(run_id) {
            Some(run) => run.status = status,
            None => {
                warn!("Finish for run {} that is not resident", run_id);
                return false;
            }
        }
        self.started.notify_all();
        info!("Run {} ended, status={}", run_id, status);

        if table.len() >= self.capacity {
            table.remove(run_id);
            debug!("Pruned run {} from the registry", run_id);
            return true;
        }
        false
    }

    /// Block until the run leaves `starting`, at most `timeout`.
    ///
    /// `None` means the run was still starting when the wait expired.
    pub fn wait_until_started(&self, run_id: &str, timeout: Duration) -> Option<RunStatus> {
        let table = self.table();
        let (table, _) = self
            .started
            .wait_timeout_while(table, timeout, |table| {
                table
                    .get(run_id)
                    .is_some_and(|run| run.status == RunStatus::Starting)
            })
            .unwrap_or_else(PoisonError::into_inner);

        match table.get(run_id) {
            Some(run) if run.status == RunStatus::Starting => None,
            Some(run) => Some(run.status),
            None => {
                drop(table);
                Some(self.durable_status(run_id))
            }
        }
    }

    fn durable_status(&self, run_id: &str) -> RunStatus {
        match self.store.read_status(run_id) {
            Ok(Some(marker)) => marker.parse().unwrap_or(RunStatus::Unknown),
            _ => RunStatus::Unknown,
        }
    }

    /// Live record if resident, otherwise what the artifacts say
    pub fn status(&self, run_id: &str) -> Result<RunState, RegistryError> {
        if let Some(run) = self.table().get(run_id) {
            debug!("Registry hit for run {}", run_id);
            return Ok(RunState::Active(run.clone()));
        }
        debug!("Registry miss for run {}", run_id);

        if !self.store.run_exists(run_id) {
            return Err(RegistryError::NotFound {
                run_id: run_id.to_string(),
            });
        }
        match self.store.read_status(run_id) {
            Ok(Some(marker)) => return Ok(RunState::Finished(marker)),
            Ok(None) => {}
            Err(err) => warn!("Unreadable status marker for run {}: {}", run_id, err),
        }
        match self.store.latest_event(run_id) {
            Ok(Some(event)) => Ok(RunState::InProgress {
                last_event_counter: event.counter,
                latest: event.summary(),
            }),
            Ok(None) => {
                warn!("Run {} has an incomplete artifacts directory", run_id);
                Ok(RunState::Unknown)
            }
            Err(err) => {
                warn!("Could not read events of run {}: {}", run_id, err);
                Ok(RunState::Unknown)
            }
        }
    }

    /// Raise the cancellation flag of a resident, unfinished run
    pub fn cancel(&self, run_id: &str) -> Result<(), RegistryError> {
        let table = self.table();
        match table.get(run_id) {
            Some(run) if !run.status.is_terminal() => {
                run.cancel.cancel();
                info!("Cancel requested for run {}", run_id);
                Ok(())
            }
            _ => Err(RegistryError::NotActive {
                run_id: run_id.to_string(),
            }),
        }
    }
}
