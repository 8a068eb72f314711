//! Shared status vocabulary for runs and API responses
//!
//! String forms are fixed: run statuses are written verbatim into the
//! `artifacts/<run_id>/status` marker and API statuses are what the transport
//! layer maps onto its own codes.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Lifecycle status of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RunStatus {
    /// Accepted, collaborator not yet emitting
    #[default]
    Starting,
    Running,
    Successful,
    Failed,
    Canceled,
    Timeout,
    /// Durable artifacts exist but say nothing conclusive
    Unknown,
}

impl RunStatus {
    /// Returns true once the collaborator has reported an end state
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Successful | Self::Failed | Self::Canceled | Self::Timeout
        )
    }

    /// Terminal statuses tracked by the lifetime completion counters
    pub const fn terminal_statuses() -> &'static [Self] {
        &[Self::Successful, Self::Failed, Self::Canceled, Self::Timeout]
    }
}

/// Closed response vocabulary handed to the transport layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ApiStatus {
    Ok,
    Started,
    Invalid,
    #[strum(serialize = "NOTFOUND")]
    #[serde(rename = "NOTFOUND")]
    NotFound,
    Locked,
    Failed,
    Timeout,
    Unsupported,
}

impl ApiStatus {
    /// Conditions the caller may simply re-issue after a delay
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Locked | Self::Timeout)
    }

    /// Whether the request was carried out
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::Started)
    }
}

/// Where variable overrides are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StoreType {
    /// `project/host_vars/<host>` or `project/group_vars/<group>.yml`
    #[default]
    File,
    /// Directly inside the inventory document
    Inventory,
}
