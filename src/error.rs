//! Error handling module
//!
//! Each subsystem has its own error enum; `ServiceError` aggregates them for
//! the service facade and classifies every failure so callers can tell a
//! retryable condition (lock contention, start timeout) from a terminal one.

use strum::Display;
use thiserror::Error;

use crate::config::ConfigError;
use crate::events::EventStoreError;
use crate::inventory::InventoryError;
use crate::registry::RegistryError;
use crate::types::ApiStatus;
use crate::vars::VarsError;

/// Coarse classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed caller input
    Validation,
    /// Unknown run, group, host or event
    NotFound,
    /// Inventory lock contention; retry after a delay
    LockTimeout,
    /// A run did not begin executing in time; retry after a delay
    Timeout,
    /// On-disk state cannot be parsed
    CorruptState,
    Io,
    /// Target already exists
    Conflict,
    /// The collaborator could not launch the run
    Execution,
    Unsupported,
}

impl ErrorKind {
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::LockTimeout | Self::Timeout)
    }

    /// Response status reported for this kind of failure
    pub const fn api_status(self) -> ApiStatus {
        match self {
            Self::Validation | Self::Conflict => ApiStatus::Invalid,
            Self::NotFound => ApiStatus::NotFound,
            Self::LockTimeout => ApiStatus::Locked,
            Self::Timeout => ApiStatus::Timeout,
            Self::CorruptState | Self::Io | Self::Execution => ApiStatus::Failed,
            Self::Unsupported => ApiStatus::Unsupported,
        }
    }
}

/// Main error type of the service
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Events(#[from] EventStoreError),

    #[error(transparent)]
    Vars(#[from] VarsError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Timeout hit while waiting for run {run_id} to start")]
    StartTimeout { run_id: String },

    #[error("Launch failed: {0}")]
    Execution(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Inventory(err) => inventory_kind(err),
            Self::Registry(err) => registry_kind(err),
            Self::Events(err) => events_kind(err),
            Self::Vars(err) => match err {
                VarsError::InvalidName { .. } => ErrorKind::Validation,
                VarsError::Parse { .. } => ErrorKind::CorruptState,
                VarsError::Io { .. } => ErrorKind::Io,
            },
            Self::Config(err) => match err {
                ConfigError::Read { .. } => ErrorKind::Io,
                _ => ErrorKind::Validation,
            },
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::StartTimeout { .. } => ErrorKind::Timeout,
            Self::Execution(_) => ErrorKind::Execution,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    pub fn api_status(&self) -> ApiStatus {
        self.kind().api_status()
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        Self::Execution(format!("{err:#}"))
    }
}

fn inventory_kind(err: &InventoryError) -> ErrorKind {
    match err {
        InventoryError::LockTimeout { .. } => ErrorKind::LockTimeout,
        InventoryError::Corrupt { .. } => ErrorKind::CorruptState,
        InventoryError::GroupExists { .. } => ErrorKind::Conflict,
        InventoryError::Read { .. } | InventoryError::Write { .. } => ErrorKind::Io,
        InventoryError::OperationNotAllowed => ErrorKind::Unsupported,
        InventoryError::GroupMissing { .. }
        | InventoryError::HostMissing { .. }
        | InventoryError::GroupEmpty { .. } => ErrorKind::NotFound,
    }
}

fn registry_kind(err: &RegistryError) -> ErrorKind {
    match err {
        RegistryError::AlreadyRegistered { .. } => ErrorKind::Conflict,
        RegistryError::NotActive { .. } | RegistryError::NotFound { .. } => ErrorKind::NotFound,
        RegistryError::Store(err) => events_kind(err),
    }
}

fn events_kind(err: &EventStoreError) -> ErrorKind {
    match err {
        EventStoreError::RunNotFound { .. } | EventStoreError::EventNotFound { .. } => {
            ErrorKind::NotFound
        }
        EventStoreError::Malformed { .. } => ErrorKind::CorruptState,
        EventStoreError::Io { .. } => ErrorKind::Io,
    }
}
