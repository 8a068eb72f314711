//! Opening, mutating and persisting the inventory
//!
//! Every mutating call follows the same shape: check the handle may write,
//! check the precondition, mutate, then [`Inventory::save`]. A failed check
//! releases the exclusive lock before the error is returned, and a successful
//! save releases it as well, so a handle is good for exactly one mutation.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::document::{InventoryDocument, VarMap};
use super::lock::{InventoryLock, LockGate, LockPolicy};
use super::InventoryError;

/// Default SSH port; other ports are recorded as `ansible_port`
const DEFAULT_SSH_PORT: u16 = 22;

/// Factory for inventory handles on one file
#[derive(Debug, Clone)]
pub struct InventoryStore {
    path: PathBuf,
    policy: LockPolicy,
    gate: Arc<LockGate>,
}

impl InventoryStore {
    pub fn new(path: impl Into<PathBuf>, policy: LockPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
            gate: Arc::new(LockGate::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a handle, seeding the file first if it does not exist.
    ///
    /// With `exclusive` the handle holds the advisory lock until it saves,
    /// fails a precondition, or is dropped. Without it the handle is an
    /// unlocked snapshot that may already be stale.
    pub fn open(&self, exclusive: bool) -> Result<Inventory, InventoryError> {
        self.ensure_seeded()?;

        let (raw, lock) = if exclusive {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&self.path)
                .map_err(|source| self.read_error(source))?;
            let mut lock =
                InventoryLock::acquire(&self.path, file, self.policy, Arc::clone(&self.gate))?;
            let mut raw = String::new();
            if let Some(file) = lock.file_mut() {
                file.read_to_string(&mut raw)
                    .map_err(|source| self.read_error(source))?;
            }
            (raw, Some(lock))
        } else {
            let raw = fs::read_to_string(&self.path).map_err(|source| self.read_error(source))?;
            (raw, None)
        };

        let document =
            InventoryDocument::from_yaml(&raw).map_err(|err| InventoryError::Corrupt {
                path: self.path.clone(),
                reason: err.to_string(),
            })?;

        Ok(Inventory {
            path: self.path.clone(),
            document,
            lock,
        })
    }

    /// Unlocked snapshot
    pub fn read(&self) -> Result<Inventory, InventoryError> {
        self.open(false)
    }

    /// Locked handle for a single mutation
    pub fn lock(&self) -> Result<Inventory, InventoryError> {
        self.open(true)
    }

    fn ensure_seeded(&self) -> Result<(), InventoryError> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| self.write_error(source))?;
        }

        let seed = InventoryDocument::seed()
            .to_yaml()
            .map_err(|err| self.write_error(std::io::Error::other(err)))?;

        match OpenOptions::new().write(true).create_new(true).open(&self.path) {
            Ok(mut file) => {
                file.write_all(seed.as_bytes())
                    .and_then(|()| file.sync_all())
                    .map_err(|source| self.write_error(source))?;
                info!("Seed inventory written to {}", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                debug!("Inventory file '{}' already created", self.path.display());
                Ok(())
            }
            Err(source) => Err(self.write_error(source)),
        }
    }

    fn read_error(&self, source: std::io::Error) -> InventoryError {
        InventoryError::Read {
            path: self.path.clone(),
            source,
        }
    }

    fn write_error(&self, source: std::io::Error) -> InventoryError {
        InventoryError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

/// A loaded inventory, optionally holding the exclusive lock
#[derive(Debug)]
pub struct Inventory {
    path: PathBuf,
    document: InventoryDocument,
    lock: Option<InventoryLock>,
}

impl Inventory {
    pub fn document(&self) -> &InventoryDocument {
        &self.document
    }

    /// Whether this handle still holds the exclusive lock
    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    pub fn groups(&self) -> Vec<String> {
        self.document.groups()
    }

    pub fn hosts(&self) -> Vec<String> {
        self.document.hosts()
    }

    /// Groups the host belongs to
    pub fn host_show(&self, host: &str) -> Vec<String> {
        self.document.host_groups(host)
    }

    /// Members of a group
    pub fn group_show(&mut self, group: &str) -> Result<Vec<String>, InventoryError> {
        self.require_group(group)?;
        Ok(self.document.members(group))
    }

    pub fn group_add(&mut self, group: &str) -> Result<(), InventoryError> {
        self.require_writable()?;
        if self.document.has_group(group) {
            debug!("Group add request for '{}' failed - it already exists", group);
            return Err(self.reject(InventoryError::GroupExists {
                group: group.to_string(),
            }));
        }
        self.document.insert_group(group);
        info!("Group '{}' added to the inventory", group);
        self.save()
    }

    pub fn group_remove(&mut self, group: &str) -> Result<(), InventoryError> {
        self.require_writable()?;
        self.require_group(group)?;
        self.document.remove_group(group);
        info!("Group '{}' removed from the inventory", group);
        self.save()
    }

    /// Add a host to a group; adding an existing member keeps one entry
    pub fn host_add(
        &mut self,
        group: &str,
        host: &str,
        port: Option<u16>,
    ) -> Result<(), InventoryError> {
        self.require_writable()?;
        self.require_group(group)?;

        let vars = port.filter(|port| *port != DEFAULT_SSH_PORT).map(|port| {
            let mut vars = VarMap::new();
            vars.insert("ansible_port".into(), u64::from(port).into());
            vars
        });
        if self.document.has_host(group, host) {
            debug!("Host '{}' already a member of '{}'", host, group);
        }
        self.document.insert_host(group, host, vars);
        info!("Host '{}' added to the inventory group '{}'", host, group);
        self.save()
    }

    pub fn host_remove(&mut self, group: &str, host: &str) -> Result<(), InventoryError> {
        self.require_writable()?;
        self.require_group(group)?;
        if !self.document.group_has_hosts(group) {
            debug!("Host removal attempted against the empty group '{}'", group);
            return Err(self.reject(InventoryError::GroupEmpty {
                group: group.to_string(),
            }));
        }
        self.require_host(group, host)?;
        self.document.remove_host(group, host);
        info!("Host '{}' removed from inventory group '{}'", host, group);
        self.save()
    }

    pub fn host_vars_show(&mut self, group: &str, host: &str) -> Result<VarMap, InventoryError> {
        self.require_group(group)?;
        self.require_host(group, host)?;
        Ok(self.document.host_vars(group, host))
    }

    /// Replace the host's inventory variables
    pub fn host_vars_add(
        &mut self,
        group: &str,
        host: &str,
        vars: VarMap,
    ) -> Result<(), InventoryError> {
        self.require_writable()?;
        self.require_group(group)?;
        self.require_host(group, host)?;
        self.document.set_host_vars(group, host, Some(vars));
        info!("Variables stored for host '{}' in group '{}'", host, group);
        self.save()
    }

    pub fn host_vars_remove(&mut self, group: &str, host: &str) -> Result<(), InventoryError> {
        self.require_writable()?;
        self.require_group(group)?;
        self.require_host(group, host)?;
        self.document.set_host_vars(group, host, None);
        info!("Variables removed for host '{}' in group '{}'", host, group);
        self.save()
    }

    pub fn group_vars_show(&mut self, group: &str) -> Result<VarMap, InventoryError> {
        self.require_group(group)?;
        Ok(self.document.group_vars(group))
    }

    /// Replace the group's inventory variables
    pub fn group_vars_add(&mut self, group: &str, vars: VarMap) -> Result<(), InventoryError> {
        self.require_writable()?;
        self.require_group(group)?;
        self.document.set_group_vars(group, Some(vars));
        info!("Variables stored for group '{}'", group);
        self.save()
    }

    pub fn group_vars_remove(&mut self, group: &str) -> Result<(), InventoryError> {
        self.require_writable()?;
        self.require_group(group)?;
        self.document.set_group_vars(group, None);
        info!("Variables removed for group '{}'", group);
        self.save()
    }

    /// Rewrite the whole file in place and release the lock
    pub fn save(&mut self) -> Result<(), InventoryError> {
        let Some(mut lock) = self.lock.take() else {
            return Err(InventoryError::OperationNotAllowed);
        };
        let body = self
            .document
            .to_yaml()
            .map_err(|err| self.write_error(std::io::Error::other(err)))?;

        let Some(file) = lock.file_mut() else {
            return Err(InventoryError::OperationNotAllowed);
        };
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(body.as_bytes()))
            .and_then(|()| file.set_len(body.len() as u64))
            .and_then(|()| file.sync_all())
            .map_err(|source| self.write_error(source))?;

        lock.release();
        debug!("Inventory saved to {}", self.path.display());
        Ok(())
    }

    /// Drop the exclusive lock without writing
    pub fn release(&mut self) {
        if let Some(lock) = self.lock.take() {
            lock.release();
        }
    }

    fn require_writable(&self) -> Result<(), InventoryError> {
        if self.lock.is_none() {
            return Err(InventoryError::OperationNotAllowed);
        }
        Ok(())
    }

    fn require_group(&mut self, group: &str) -> Result<(), InventoryError> {
        if self.document.has_group(group) {
            return Ok(());
        }
        debug!("Group request for '{}' failed - it's not in the inventory", group);
        Err(self.reject(InventoryError::GroupMissing {
            group: group.to_string(),
        }))
    }

    fn require_host(&mut self, group: &str, host: &str) -> Result<(), InventoryError> {
        if self.document.has_host(group, host) {
            return Ok(());
        }
        Err(self.reject(InventoryError::HostMissing {
            group: group.to_string(),
            host: host.to_string(),
        }))
    }

    /// Precondition failure: let go of the lock, hand back the error
    fn reject(&mut self, err: InventoryError) -> InventoryError {
        self.release();
        err
    }

    fn write_error(&self, source: std::io::Error) -> InventoryError {
        InventoryError::Write {
            path: self.path.clone(),
            source,
        }
    }
}
