//! File-backed variable overrides
//!
//! `project/host_vars/<host>` and `project/group_vars/<group>.yml` hold YAML
//! mappings that take precedence over variables stored in the inventory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::inventory::VarMap;

#[derive(Error, Debug)]
pub enum VarsError {
    #[error("'{name}' is not a valid host or group name")]
    InvalidName { name: String },

    #[error("Variables at {path} are not a YAML mapping: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Unable to access variables at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct VarsStore {
    host_vars_dir: PathBuf,
    group_vars_dir: PathBuf,
}

impl VarsStore {
    pub fn new(host_vars_dir: impl Into<PathBuf>, group_vars_dir: impl Into<PathBuf>) -> Self {
        Self {
            host_vars_dir: host_vars_dir.into(),
            group_vars_dir: group_vars_dir.into(),
        }
    }

    pub fn host_vars_path(&self, host: &str) -> Result<PathBuf, VarsError> {
        validate_name(host)?;
        Ok(self.host_vars_dir.join(host))
    }

    pub fn group_vars_path(&self, group: &str) -> Result<PathBuf, VarsError> {
        validate_name(group)?;
        Ok(self.group_vars_dir.join(format!("{group}.yml")))
    }

    pub fn read_host_vars(&self, host: &str) -> Result<Option<VarMap>, VarsError> {
        read_vars(&self.host_vars_path(host)?)
    }

    pub fn write_host_vars(&self, host: &str, vars: &VarMap) -> Result<PathBuf, VarsError> {
        let path = self.host_vars_path(host)?;
        write_vars(&path, vars)?;
        Ok(path)
    }

    /// Returns whether a file was removed
    pub fn remove_host_vars(&self, host: &str) -> Result<bool, VarsError> {
        remove_vars(&self.host_vars_path(host)?)
    }

    pub fn read_group_vars(&self, group: &str) -> Result<Option<VarMap>, VarsError> {
        read_vars(&self.group_vars_path(group)?)
    }

    pub fn write_group_vars(&self, group: &str, vars: &VarMap) -> Result<PathBuf, VarsError> {
        let path = self.group_vars_path(group)?;
        write_vars(&path, vars)?;
        Ok(path)
    }

    pub fn remove_group_vars(&self, group: &str) -> Result<bool, VarsError> {
        remove_vars(&self.group_vars_path(group)?)
    }
}

/// Names become file names; no separators or traversal
pub fn validate_name(name: &str) -> Result<(), VarsError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(VarsError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn read_vars(path: &Path) -> Result<Option<VarMap>, VarsError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(VarsError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if raw.trim().is_empty() {
        return Ok(Some(VarMap::new()));
    }
    debug!("Variables served from {}", path.display());
    serde_yaml::from_str(&raw)
        .map(Some)
        .map_err(|source| VarsError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn write_vars(path: &Path, vars: &VarMap) -> Result<(), VarsError> {
    let io_err = |source: std::io::Error| VarsError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        // concurrent creators race here harmlessly
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let body = serde_yaml::to_string(vars).map_err(|source| VarsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, body).map_err(io_err)?;
    debug!("Variables written to {}", path.display());
    Ok(())
}

fn remove_vars(path: &Path) -> Result<bool, VarsError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(VarsError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
