//! Playrun Library
//!
//! Run tracking and a lock-protected host inventory for scripted host
//! configuration. The execution engine is a collaborator behind the
//! [`Executor`] trait; this crate owns the state around it.

pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod inventory;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod service;
pub mod types;
pub mod vars;

// Re-export main types for convenience
pub use config::{ConfigError, ServiceConfig};
pub use error::{ErrorKind, Result, ServiceError};
pub use events::{
    EventCache, EventFilter, EventListing, EventRecord, EventScanner, EventStore, EventStoreError,
    EventSummary,
};
pub use executor::{Executor, LaunchRequest, RunCallbacks};
pub use inventory::{Inventory, InventoryDocument, InventoryError, InventoryStore, LockPolicy};
pub use metrics::{CounterSnapshot, LifetimeCounters};
pub use registry::{ActiveRun, CancelToken, RegistryError, RunRegistry, RunState, TaskMetadata};
pub use service::{ApiResponse, RunnerService, StartOptions};
pub use types::{ApiStatus, RunStatus, StoreType};
pub use vars::{VarsError, VarsStore};
