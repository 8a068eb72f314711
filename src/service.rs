//! Service facade
//!
//! `RunnerService` owns every store and cache and exposes typed operations
//! that answer with an [`ApiResponse`]. The transport layer on top maps
//! [`ApiStatus`] onto its own codes; nothing here knows about requests.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::error::{ErrorKind, Result, ServiceError};
use crate::events::{EventCache, EventFilter, EventListing, EventScanner, EventStore};
use crate::executor::{Executor, LaunchRequest, RunCallbacks};
use crate::inventory::{Inventory, InventoryError, InventoryStore, VarMap};
use crate::metrics::{self, LifetimeCounters};
use crate::registry::{RegistryError, RunRegistry, RunState};
use crate::types::{ApiStatus, RunStatus, StoreType};
use crate::vars::{self, VarsStore};

/// Group every host implicitly belongs to
pub const RESERVED_GROUPS: &[&str] = &["all"];

const PLAYBOOK_SUFFIX: &str = ".yml";

/// Uniform answer of every service operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: ApiStatus,
    pub msg: String,
    pub data: Value,
}

impl ApiResponse {
    pub fn new(status: ApiStatus, msg: impl Into<String>) -> Self {
        Self {
            status,
            msg: msg.into(),
            data: Value::Object(Map::new()),
        }
    }

    pub fn ok(msg: impl Into<String>) -> Self {
        Self::new(ApiStatus::Ok, msg)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl From<ServiceError> for ApiResponse {
    fn from(err: ServiceError) -> Self {
        let status = err.api_status();
        if err.is_retryable() {
            warn!("Retryable failure: {}", err);
        } else {
            debug!("Request failed: {}", err);
        }
        Self::new(status, err.to_string())
    }
}

/// Optional parameters of a run start
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartOptions {
    pub extravars: Option<Map<String, Value>>,
    pub limit: Option<String>,
    pub tags: Option<String>,
    pub check: bool,
}

pub struct RunnerService {
    config: ServiceConfig,
    inventory: InventoryStore,
    vars: VarsStore,
    store: EventStore,
    registry: Arc<RunRegistry>,
    cache: Arc<EventCache>,
    scanner: EventScanner,
    counters: Arc<LifetimeCounters>,
    executor: Arc<dyn Executor>,
    hostname: String,
}

impl std::fmt::Debug for RunnerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerService")
            .field("root_dir", &self.config.root_dir)
            .field("resident_runs", &self.registry.len())
            .field("cached_runs", &self.cache.len())
            .finish()
    }
}

impl RunnerService {
    pub fn new(config: ServiceConfig, executor: Arc<dyn Executor>) -> Result<Self> {
        config.validate()?;
        let store = EventStore::new(config.artifacts_dir());
        let counters = Arc::new(LifetimeCounters::new());
        let registry = Arc::new(RunRegistry::new(
            config.runner_cache_size,
            store.clone(),
            Arc::clone(&counters),
        ));
        info!(
            "Service rooted at {} (runner cache {}, event cache {}, {} scan threads)",
            config.root_dir.display(),
            config.runner_cache_size,
            config.event_cache_size,
            config.event_threads
        );
        Ok(Self {
            inventory: InventoryStore::new(config.inventory_path(), config.lock_policy()),
            vars: VarsStore::new(config.host_vars_dir(), config.group_vars_dir()),
            scanner: EventScanner::new(store.clone(), config.event_threads),
            cache: Arc::new(EventCache::new(config.event_cache_size)),
            hostname: metrics::hostname(),
            store,
            registry,
            counters,
            executor,
            config,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn event_cache(&self) -> &EventCache {
        &self.cache
    }

    pub fn counters(&self) -> &LifetimeCounters {
        &self.counters
    }

    // ---- runs ----

    fn playbook_names(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.config.project_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(PLAYBOOK_SUFFIX))
            .collect();
        names.sort();
        names
    }

    pub fn list_playbooks(&self) -> ApiResponse {
        let names = self.playbook_names();
        ApiResponse::ok(format!("{} playbook found", names.len()))
            .with_data(json!({ "playbooks": names }))
    }

    fn playbook_path(&self, playbook: &str) -> Result<PathBuf> {
        vars::validate_name(playbook)?;
        let path = self.config.project_dir().join(playbook);
        if !path.is_file() {
            return Err(ServiceError::not_found(format!(
                "playbook {playbook} not found"
            )));
        }
        Ok(path)
    }

    /// Launch a playbook and wait, bounded, for it to begin executing
    pub fn start_run(&self, playbook: &str, options: StartOptions) -> ApiResponse {
        match self.try_start_run(playbook, options) {
            Ok((run_id, status)) => ApiResponse::new(ApiStatus::Started, "starting")
                .with_data(json!({ "status": status, "play_uuid": run_id })),
            Err(err) => err.into(),
        }
    }

    fn try_start_run(&self, playbook: &str, options: StartOptions) -> Result<(String, RunStatus)> {
        self.playbook_path(playbook)?;

        let run_id = Uuid::now_v7().to_string();
        let cancel = self.registry.register(&run_id, RunStatus::Starting)?;
        self.cache.cache_events(&run_id);

        let request = LaunchRequest {
            run_id: run_id.clone(),
            playbook: playbook.to_string(),
            private_data_dir: self.config.root_dir.clone(),
            extravars: options.extravars,
            limit: options.limit,
            tags: options.tags,
            check: options.check,
        };
        debug!("Launching {} with overrides {:?}", playbook, request.to_cli_args());
        let callbacks = RunCallbacks::new(
            &run_id,
            Arc::clone(&self.registry),
            Arc::clone(&self.cache),
            self.store.clone(),
            cancel,
        );
        if let Err(err) = self.executor.launch(request, callbacks) {
            warn!("Launch of {} as run {} failed: {:#}", playbook, run_id, err);
            self.registry.finish(&run_id, RunStatus::Failed);
            return Err(err.into());
        }

        match self
            .registry
            .wait_until_started(&run_id, self.config.start_timeout())
        {
            Some(status) => {
                info!("Playbook {} started as run {}", playbook, run_id);
                Ok((run_id, status))
            }
            None => Err(ServiceError::StartTimeout { run_id }),
        }
    }

    pub fn run_status(&self, run_id: &str) -> ApiResponse {
        if let Err(err) = checked_run_id(run_id) {
            return err.into();
        }
        match self.registry.status(run_id) {
            Ok(RunState::Active(run)) => {
                ApiResponse::ok(run.status.to_string()).with_data(run.status_data())
            }
            Ok(RunState::Finished(marker)) => ApiResponse::ok(marker),
            Ok(RunState::InProgress {
                last_event_counter,
                latest,
            }) => ApiResponse::ok(RunStatus::Running.to_string()).with_data(json!({
                "last_task_num": last_event_counter,
                "task": latest.task,
                "role": latest.role,
                "event": latest.event,
            })),
            Ok(RunState::Unknown) => ApiResponse::ok(RunStatus::Unknown.to_string())
                .with_data(json!({ "detail": "The artifacts directory is incomplete" })),
            Err(RegistryError::NotFound { .. }) => ApiResponse::new(
                ApiStatus::NotFound,
                format!("Playbook with UUID {run_id} not found"),
            ),
            Err(err) => ServiceError::from(err).into(),
        }
    }

    pub fn cancel_run(&self, run_id: &str) -> ApiResponse {
        if let Err(err) = checked_run_id(run_id) {
            return err.into();
        }
        match self.registry.cancel(run_id) {
            Ok(()) => ApiResponse::ok(format!("Cancel request issued for {run_id}")),
            Err(err) => ServiceError::from(err).into(),
        }
    }

    fn query_events(&self, run_id: &str, filter: &EventFilter) -> Result<EventListing> {
        checked_run_id(run_id)?;
        if let Some(listing) = self.cache.query(run_id, filter) {
            debug!("Event cache hit for run {}", run_id);
            return Ok(listing);
        }
        debug!("Event cache miss for run {}, scanning artifacts", run_id);
        Ok(self.scanner.scan(run_id, filter)?)
    }

    /// Event summaries of a run matching `filter`
    pub fn list_events(&self, run_id: &str, filter: &EventFilter) -> ApiResponse {
        match self.query_events(run_id, filter) {
            Ok(listing) => ApiResponse::ok(format!("{} events found", listing.total_events))
                .with_data(listing.to_json()),
            Err(err) => err.into(),
        }
    }

    /// Full record of one event
    pub fn get_event(&self, run_id: &str, event_key: &str) -> ApiResponse {
        if let Err(err) = checked_run_id(run_id).and_then(|()| checked_event_key(event_key)) {
            return err.into();
        }
        let record = match self.cache.get(run_id, event_key) {
            Some(record) => Ok(record),
            None => self.store.read_event(run_id, event_key),
        };
        match record.map_err(ServiceError::from).and_then(|record| {
            serde_json::to_value(record)
                .map_err(|err| ServiceError::execution(err.to_string()))
        }) {
            Ok(data) => ApiResponse::ok("").with_data(data),
            Err(err) => err.into(),
        }
    }

    /// Remove artifact directories past the configured age
    pub fn cleanup_artifacts(&self) -> Result<usize> {
        Ok(self
            .store
            .remove_older_than(self.config.artifacts_max_age())?)
    }

    pub fn metrics_text(&self) -> String {
        metrics::render(
            &self.counters.snapshot(),
            &self.hostname,
            self.registry.len(),
            self.playbook_names().len(),
        )
    }

    // ---- inventory ----

    fn locked_inventory(&self) -> Result<Inventory> {
        Ok(self.inventory.lock()?)
    }

    fn snapshot_inventory(&self) -> Result<Inventory> {
        Ok(self.inventory.read()?)
    }

    pub fn list_groups(&self) -> ApiResponse {
        match self.snapshot_inventory() {
            Ok(inventory) => ApiResponse::ok("").with_data(json!({ "groups": inventory.groups() })),
            Err(err) => err.into(),
        }
    }

    pub fn add_group(&self, group: &str) -> ApiResponse {
        if RESERVED_GROUPS.contains(&group) {
            return ApiResponse::new(
                ApiStatus::Invalid,
                format!("Group name '{group}' is a reserved/system group name"),
            );
        }
        let result = self
            .locked_inventory()
            .and_then(|mut inventory| Ok(inventory.group_add(group)?));
        match result {
            Ok(()) => ApiResponse::ok(format!("Group {group} added")),
            Err(ServiceError::Inventory(InventoryError::GroupExists { .. })) => {
                ApiResponse::ok("Group already exists")
            }
            Err(err) => err.into(),
        }
    }

    pub fn remove_group(&self, group: &str) -> ApiResponse {
        let result = self
            .locked_inventory()
            .and_then(|mut inventory| Ok(inventory.group_remove(group)?));
        match result {
            Ok(()) => ApiResponse::ok(format!("Group {group} removed")),
            Err(ServiceError::Inventory(InventoryError::GroupMissing { .. })) => {
                ApiResponse::new(ApiStatus::Invalid, "Group doesn't exist")
            }
            Err(err) => err.into(),
        }
    }

    pub fn group_members(&self, group: &str) -> ApiResponse {
        let result = self
            .snapshot_inventory()
            .and_then(|mut inventory| Ok(inventory.group_show(group)?));
        match result {
            Ok(members) => ApiResponse::ok("").with_data(json!({ "members": members })),
            Err(ServiceError::Inventory(InventoryError::GroupMissing { .. })) => {
                ApiResponse::new(ApiStatus::NotFound, "Group doesn't exist")
            }
            Err(err) => err.into(),
        }
    }

    pub fn list_hosts(&self) -> ApiResponse {
        match self.snapshot_inventory() {
            Ok(inventory) => ApiResponse::ok("").with_data(json!({ "hosts": inventory.hosts() })),
            Err(err) => err.into(),
        }
    }

    /// Groups a host belongs to
    pub fn host_membership(&self, host: &str) -> ApiResponse {
        match self.snapshot_inventory() {
            Ok(inventory) => {
                ApiResponse::ok("").with_data(json!({ "groups": inventory.host_show(host) }))
            }
            Err(err) => err.into(),
        }
    }

    pub fn add_host(&self, host: &str, group: &str, port: Option<u16>) -> ApiResponse {
        if RESERVED_GROUPS.contains(&group) {
            return ApiResponse::new(
                ApiStatus::Invalid,
                format!("Hosts cannot be added to the '{group}' group"),
            );
        }
        let result = self
            .locked_inventory()
            .and_then(|mut inventory| Ok(inventory.host_add(group, host, port)?));
        match result {
            Ok(()) => ApiResponse::ok(format!("Host {host} added to {group}")),
            Err(err) => err.into(),
        }
    }

    pub fn remove_host(&self, host: &str, group: &str) -> ApiResponse {
        let result = self
            .locked_inventory()
            .and_then(|mut inventory| Ok(inventory.host_remove(group, host)?));
        match result {
            Ok(()) => ApiResponse::ok(format!("Host {host} removed from {group}")),
            Err(err) => err.into(),
        }
    }

    // ---- variables ----

    pub fn get_host_vars(&self, host: &str, group: &str) -> ApiResponse {
        let result = self.vars.read_host_vars(host).map_err(ServiceError::from).and_then(
            |from_file| match from_file {
                Some(vars) => Ok(vars),
                None => {
                    let mut inventory = self.snapshot_inventory()?;
                    Ok(inventory.host_vars_show(group, host)?)
                }
            },
        );
        vars_response(result)
    }

    pub fn add_host_vars(
        &self,
        host: &str,
        group: &str,
        vars: &Value,
        store_type: StoreType,
    ) -> ApiResponse {
        let result = to_var_map(vars).and_then(|vars| match store_type {
            StoreType::File => {
                let path = self.vars.write_host_vars(host, &vars)?;
                Ok(format!("Variables written successfully to {}", path.display()))
            }
            StoreType::Inventory => {
                self.locked_inventory()?.host_vars_add(group, host, vars)?;
                Ok(format!("Vars added to {host}"))
            }
        });
        match result {
            Ok(msg) => ApiResponse::ok(msg).with_data(json!({ "hostname": host })),
            Err(err) => err.into(),
        }
    }

    /// Delete the override file, then clear the inventory entry
    pub fn remove_host_vars(&self, host: &str, group: &str) -> ApiResponse {
        let result = self
            .vars
            .remove_host_vars(host)
            .map_err(ServiceError::from)
            .and_then(|_| Ok(self.locked_inventory()?.host_vars_remove(group, host)?));
        match result {
            Ok(()) => ApiResponse::ok(format!("Vars removed for '{host}' in group '{group}'"))
                .with_data(json!({ "hostname": host })),
            Err(err) => err.into(),
        }
    }

    pub fn get_group_vars(&self, group: &str) -> ApiResponse {
        let result = self.vars.read_group_vars(group).map_err(ServiceError::from).and_then(
            |from_file| match from_file {
                Some(vars) => Ok(vars),
                None => {
                    let mut inventory = self.snapshot_inventory()?;
                    Ok(inventory.group_vars_show(group)?)
                }
            },
        );
        vars_response(result)
    }

    pub fn add_group_vars(&self, group: &str, vars: &Value, store_type: StoreType) -> ApiResponse {
        let result = to_var_map(vars).and_then(|vars| match store_type {
            StoreType::File => {
                let path = self.vars.write_group_vars(group, &vars)?;
                Ok(format!("Variables written successfully to {}", path.display()))
            }
            StoreType::Inventory => {
                self.locked_inventory()?.group_vars_add(group, vars)?;
                Ok(format!("Vars added to {group}"))
            }
        });
        match result {
            Ok(msg) => ApiResponse::ok(msg),
            Err(err) => err.into(),
        }
    }

    pub fn remove_group_vars(&self, group: &str) -> ApiResponse {
        let result = self
            .vars
            .remove_group_vars(group)
            .map_err(ServiceError::from)
            .and_then(|_| Ok(self.locked_inventory()?.group_vars_remove(group)?));
        match result {
            Ok(()) => ApiResponse::ok(format!("group vars removed for '{group}'")),
            Err(err) => err.into(),
        }
    }
}

/// Request variables must be an object
/// Run ids name directories under the artifacts root
fn checked_run_id(run_id: &str) -> Result<()> {
    vars::validate_name(run_id)
        .map_err(|_| ServiceError::validation(format!("Invalid run id {run_id:?}")))
}

fn checked_event_key(event_key: &str) -> Result<()> {
    vars::validate_name(event_key)
        .map_err(|_| ServiceError::validation(format!("Invalid event id {event_key:?}")))
}

fn to_var_map(vars: &Value) -> Result<VarMap> {
    if !vars.is_object() {
        return Err(ServiceError::validation("Vars must be a JSON object"));
    }
    serde_yaml::to_value(vars)
        .ok()
        .and_then(|value| value.as_mapping().cloned())
        .ok_or_else(|| ServiceError::validation("Vars must be a JSON object"))
}

fn vars_response(result: Result<VarMap>) -> ApiResponse {
    let vars = result.and_then(|vars| {
        serde_json::to_value(&vars).map_err(|err| ServiceError::validation(err.to_string()))
    });
    match vars {
        Ok(vars) => ApiResponse::ok("").with_data(json!({ "vars": vars })),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            ApiResponse::new(ApiStatus::NotFound, "Host/group not found")
        }
        Err(err) => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverStarts;

    impl Executor for NeverStarts {
        fn launch(&self, _request: LaunchRequest, _callbacks: RunCallbacks) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct Refuses;

    impl Executor for Refuses {
        fn launch(&self, _request: LaunchRequest, _callbacks: RunCallbacks) -> anyhow::Result<()> {
            anyhow::bail!("no runner available")
        }
    }

    fn service(executor: Arc<dyn Executor>) -> (tempfile::TempDir, RunnerService) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServiceConfig::with_root(dir.path());
        config.start_timeout_secs = 1;
        fs::create_dir_all(config.project_dir()).unwrap();
        fs::write(config.project_dir().join("site.yml"), "- hosts: all\n").unwrap();
        let service = RunnerService::new(config, executor).unwrap();
        (dir, service)
    }

    #[test]
    fn test_list_playbooks_only_yml() {
        let (dir, service) = service(Arc::new(NeverStarts));
        fs::write(dir.path().join("project/readme.md"), "").unwrap();
        fs::write(dir.path().join("project/deploy.yml"), "").unwrap();
        let response = service.list_playbooks();
        assert_eq!(response.msg, "2 playbook found");
        assert_eq!(response.data["playbooks"], json!(["deploy.yml", "site.yml"]));
    }

    #[test]
    fn test_start_unknown_playbook() {
        let (_dir, service) = service(Arc::new(NeverStarts));
        let response = service.start_run("missing.yml", StartOptions::default());
        assert_eq!(response.status, ApiStatus::NotFound);
        assert!(service.registry().is_empty());
    }

    #[test]
    fn test_start_times_out() {
        let (_dir, service) = service(Arc::new(NeverStarts));
        let response = service.start_run("site.yml", StartOptions::default());
        assert_eq!(response.status, ApiStatus::Timeout);
        assert!(response.status.is_retryable());
    }

    #[test]
    fn test_launch_failure_marks_run_failed() {
        let (_dir, service) = service(Arc::new(Refuses));
        let response = service.start_run("site.yml", StartOptions::default());
        assert_eq!(response.status, ApiStatus::Failed);
        assert!(response.msg.contains("no runner available"));
        assert_eq!(service.counters().snapshot().completions["failed"], 1);
    }

    #[test]
    fn test_path_like_run_ids_are_invalid() {
        let (dir, service) = service(Arc::new(NeverStarts));
        let outside = dir.path().join("outside");
        fs::create_dir_all(outside.join("job_events")).unwrap();
        fs::write(outside.join("status"), "successful").unwrap();

        for run_id in ["..", "../outside", "a/b", ""] {
            let status = service.run_status(run_id);
            assert_eq!(status.status, ApiStatus::Invalid, "{run_id}");
            assert_ne!(status.msg, "successful");
            assert_eq!(service.cancel_run(run_id).status, ApiStatus::Invalid);
            assert_eq!(
                service.list_events(run_id, &EventFilter::new()).status,
                ApiStatus::Invalid
            );
            assert_eq!(service.get_event(run_id, "1-e1").status, ApiStatus::Invalid);
        }
        assert_eq!(
            service.get_event("r1", "../../outside/status").status,
            ApiStatus::Invalid
        );
    }

    #[test]
    fn test_group_responses() {
        let (_dir, service) = service(Arc::new(NeverStarts));
        assert_eq!(service.add_group("all").status, ApiStatus::Invalid);
        assert_eq!(service.add_group("web").msg, "Group web added");

        let again = service.add_group("web");
        assert_eq!(again.status, ApiStatus::Ok);
        assert_eq!(again.msg, "Group already exists");

        assert_eq!(service.list_groups().data["groups"], json!(["web"]));
        assert_eq!(service.remove_group("db").status, ApiStatus::Invalid);
        assert_eq!(service.group_members("db").status, ApiStatus::NotFound);
        assert_eq!(service.remove_group("web").status, ApiStatus::Ok);
    }

    #[test]
    fn test_host_responses() {
        let (_dir, service) = service(Arc::new(NeverStarts));
        assert_eq!(service.add_host("h1", "web", None).status, ApiStatus::NotFound);
        service.add_group("web");
        assert_eq!(service.add_host("h1", "web", Some(2222)).status, ApiStatus::Ok);
        assert_eq!(service.add_host("h1", "web", None).status, ApiStatus::Ok);
        assert_eq!(service.group_members("web").data["members"], json!(["h1"]));
        assert_eq!(service.host_membership("h1").data["groups"], json!(["web"]));
        assert_eq!(service.list_hosts().data["hosts"], json!(["h1"]));
        assert_eq!(
            service.get_host_vars("h1", "web").data["vars"],
            json!({ "ansible_port": 2222 })
        );
        assert_eq!(service.remove_host("h2", "web").status, ApiStatus::NotFound);
        assert_eq!(service.remove_host("h1", "web").status, ApiStatus::Ok);
    }

    #[test]
    fn test_vars_file_then_inventory() {
        let (_dir, service) = service(Arc::new(NeverStarts));
        service.add_group("web");
        service.add_host("h1", "web", None);

        let stored = service.add_host_vars("h1", "web", &json!({"a": 1}), StoreType::Inventory);
        assert_eq!(stored.status, ApiStatus::Ok);
        assert_eq!(service.get_host_vars("h1", "web").data["vars"], json!({"a": 1}));

        service.add_host_vars("h1", "web", &json!({"b": 2}), StoreType::File);
        assert_eq!(service.get_host_vars("h1", "web").data["vars"], json!({"b": 2}));

        assert_eq!(service.remove_host_vars("h1", "web").status, ApiStatus::Ok);
        assert_eq!(service.get_host_vars("h1", "web").data["vars"], json!({}));

        let invalid = service.add_group_vars("web", &json!(["x"]), StoreType::File);
        assert_eq!(invalid.status, ApiStatus::Invalid);

        service.add_group_vars("web", &json!({"tier": "front"}), StoreType::Inventory);
        assert_eq!(
            service.get_group_vars("web").data["vars"],
            json!({"tier": "front"})
        );
        assert_eq!(service.get_group_vars("db").status, ApiStatus::NotFound);
        assert_eq!(service.remove_group_vars("web").status, ApiStatus::Ok);
    }

    #[test]
    fn test_unknown_run_queries() {
        let (_dir, service) = service(Arc::new(NeverStarts));
        assert_eq!(service.run_status("ghost").status, ApiStatus::NotFound);
        assert_eq!(service.cancel_run("ghost").status, ApiStatus::NotFound);
        assert_eq!(
            service.list_events("ghost", &EventFilter::new()).status,
            ApiStatus::NotFound
        );
        assert_eq!(service.get_event("ghost", "1-x").status, ApiStatus::NotFound);
    }

    #[test]
    fn test_metrics_text_counts_playbooks() {
        let (_dir, service) = service(Arc::new(NeverStarts));
        let text = service.metrics_text();
        let expected = format!(
            "runner_service_playbook_count{{hostname=\"{}\"}} 1",
            metrics::hostname()
        );
        assert!(text.contains(&expected));
    }
}
