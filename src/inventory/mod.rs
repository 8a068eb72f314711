//! Lock-protected host inventory
//!
//! A YAML document at `<root>/inventory/hosts` describing groups and their
//! hosts. Any number of snapshot readers may open it; writers take an
//! exclusive advisory lock, mutate once and persist, which releases the lock.

pub mod document;
pub mod lock;
pub mod store;

use std::path::PathBuf;
use thiserror::Error;

pub use document::{GroupNode, HostMap, InventoryDocument, RootNode, VarMap};
pub use lock::{InventoryLock, LockGate, LockPolicy};
pub use store::{Inventory, InventoryStore};

/// Errors raised by inventory operations
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Group '{group}' already exists")]
    GroupExists { group: String },

    #[error("Group '{group}' not found in the inventory")]
    GroupMissing { group: String },

    #[error("Host '{host}' not in group '{group}'")]
    HostMissing { group: String, host: String },

    /// Host removal against a group with no hosts structure
    #[error("Group '{group}' is empty")]
    GroupEmpty { group: String },

    #[error("Unable to write the inventory at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to read the inventory at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document exists but cannot be understood; never retried
    #[error("Unable to understand the inventory at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Inventory modification requires an exclusive handle")]
    OperationNotAllowed,

    #[error("Unable to lock the inventory at {path} after {attempts} attempts")]
    LockTimeout { path: PathBuf, attempts: u32 },
}

impl InventoryError {
    /// Lock contention: the caller should re-issue after a delay
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }

    /// The on-disk document is unusable
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }

    /// Unknown group or host
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::GroupMissing { .. } | Self::HostMissing { .. } | Self::GroupEmpty { .. }
        )
    }
}
