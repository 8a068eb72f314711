//! In-memory model of the inventory document
//!
//! The document is a YAML tree rooted at `all`:
//!
//! ```yaml
//! all:
//!   children:
//!     web:
//!       hosts:
//!         web-01:
//!         web-02:
//!           ansible_port: 2222
//!       vars:
//!         http_port: 8080
//!     empty_group:
//!       hosts:
//! ```
//!
//! Empty containers are written as explicit `null` markers instead of being
//! dropped, so a group with no hosts keeps its `hosts:` key and an inventory
//! with no groups keeps its `children:` key.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Free-form variable bag attached to a host or group
pub type VarMap = serde_yaml::Mapping;

/// Host name → optional variables
pub type HostMap = BTreeMap<String, Option<VarMap>>;

/// Whole inventory file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryDocument {
    #[serde(default)]
    pub all: RootNode,
}

/// The mandatory `all` group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootNode {
    #[serde(default)]
    pub children: Option<BTreeMap<String, Option<GroupNode>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vars: Option<VarMap>,
}

/// A named group of hosts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupNode {
    #[serde(default)]
    pub hosts: Option<HostMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vars: Option<VarMap>,
}

impl InventoryDocument {
    /// Document written when no inventory file exists yet
    pub fn seed() -> Self {
        Self::default()
    }

    /// Parse YAML text; blank input or a null document is an empty inventory
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::seed());
        }
        let value: serde_yaml::Value = serde_yaml::from_str(raw)?;
        if value.is_null() {
            return Ok(Self::seed());
        }
        serde_yaml::from_value(value)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Names of all groups under `all`
    pub fn groups(&self) -> Vec<String> {
        self.all
            .children
            .as_ref()
            .map(|children| children.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every host in any group, each listed once
    pub fn hosts(&self) -> Vec<String> {
        let mut hosts = BTreeSet::new();
        if let Some(children) = &self.all.children {
            for group in children.values().flatten() {
                if let Some(members) = &group.hosts {
                    hosts.extend(members.keys().cloned());
                }
            }
        }
        hosts.into_iter().collect()
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.all
            .children
            .as_ref()
            .is_some_and(|children| children.contains_key(group))
    }

    /// Group node, `None` for missing groups and for bare `group:` entries
    pub fn group(&self, group: &str) -> Option<&GroupNode> {
        self.all.children.as_ref()?.get(group)?.as_ref()
    }

    fn group_mut(&mut self, group: &str) -> Option<&mut GroupNode> {
        let slot = self.all.children.as_mut()?.get_mut(group)?;
        Some(slot.get_or_insert_with(GroupNode::default))
    }

    /// Host names in a group; empty for groups without hosts
    pub fn members(&self, group: &str) -> Vec<String> {
        self.group(group)
            .and_then(|node| node.hosts.as_ref())
            .map(|hosts| hosts.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether the group carries a hosts structure at all
    pub fn group_has_hosts(&self, group: &str) -> bool {
        self.group(group).is_some_and(|node| node.hosts.is_some())
    }

    pub fn has_host(&self, group: &str, host: &str) -> bool {
        self.group(group)
            .and_then(|node| node.hosts.as_ref())
            .is_some_and(|hosts| hosts.contains_key(host))
    }

    /// Groups the host is a member of
    pub fn host_groups(&self, host: &str) -> Vec<String> {
        self.groups()
            .into_iter()
            .filter(|group| self.has_host(group, host))
            .collect()
    }

    pub(crate) fn insert_group(&mut self, group: &str) {
        self.all
            .children
            .get_or_insert_with(BTreeMap::new)
            .insert(group.to_string(), Some(GroupNode::default()));
    }

    pub(crate) fn remove_group(&mut self, group: &str) {
        if let Some(children) = self.all.children.as_mut() {
            children.remove(group);
            if children.is_empty() {
                self.all.children = None;
            }
        }
    }

    /// Adds the host, keeping existing variables; `vars` are merged on top
    pub(crate) fn insert_host(&mut self, group: &str, host: &str, vars: Option<VarMap>) {
        let Some(node) = self.group_mut(group) else {
            return;
        };
        let entry = node
            .hosts
            .get_or_insert_with(BTreeMap::new)
            .entry(host.to_string())
            .or_insert(None);
        if let Some(vars) = vars {
            let existing = entry.get_or_insert_with(VarMap::new);
            for (key, value) in vars {
                existing.insert(key, value);
            }
        }
    }

    pub(crate) fn remove_host(&mut self, group: &str, host: &str) {
        let Some(node) = self.group_mut(group) else {
            return;
        };
        if let Some(hosts) = node.hosts.as_mut() {
            hosts.remove(host);
            if hosts.is_empty() {
                node.hosts = None;
            }
        }
    }

    pub fn host_vars(&self, group: &str, host: &str) -> VarMap {
        self.group(group)
            .and_then(|node| node.hosts.as_ref())
            .and_then(|hosts| hosts.get(host).cloned().flatten())
            .unwrap_or_default()
    }

    pub(crate) fn set_host_vars(&mut self, group: &str, host: &str, vars: Option<VarMap>) {
        if let Some(hosts) = self.group_mut(group).and_then(|node| node.hosts.as_mut()) {
            if let Some(entry) = hosts.get_mut(host) {
                *entry = vars.filter(|vars| !vars.is_empty());
            }
        }
    }

    pub fn group_vars(&self, group: &str) -> VarMap {
        self.group(group)
            .and_then(|node| node.vars.clone())
            .unwrap_or_default()
    }

    pub(crate) fn set_group_vars(&mut self, group: &str, vars: Option<VarMap>) {
        if let Some(node) = self.group_mut(group) {
            node.vars = vars.filter(|vars| !vars.is_empty());
        }
    }
}
