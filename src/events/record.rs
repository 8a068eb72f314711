//! Event records and the filter applied to them

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Event kinds that never appear in query results
pub const IGNORED_EVENT_KINDS: &[&str] = &[
    "playbook_on_start",
    "playbook_on_stats",
    "playbook_on_task_start",
];

/// Prefix of per-host outcome events (`runner_on_ok`, `runner_on_failed`, ...)
pub const OUTCOME_PREFIX: &str = "runner_on_";

pub const TASK_START_EVENT: &str = "playbook_on_task_start";

/// One structured event emitted during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Per-run ordering key
    pub counter: u64,
    pub uuid: String,
    #[serde(rename = "event")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_ident: Option<String>,
    /// Detail payload; host/task/role and the `res` result live here
    #[serde(default)]
    pub event_data: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventRecord {
    pub fn new(counter: u64, uuid: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            counter,
            uuid: uuid.into(),
            kind: kind.into(),
            created: None,
            runner_ident: None,
            event_data: Map::new(),
            extra: Map::new(),
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.event_data.insert(key.to_string(), value.into());
        self
    }

    /// `<counter>-<uuid>`, also the event file stem
    pub fn key(&self) -> String {
        format!("{}-{}", self.counter, self.uuid)
    }

    fn data_str(&self, key: &str) -> Option<&str> {
        self.event_data.get(key).and_then(Value::as_str)
    }

    pub fn host(&self) -> Option<&str> {
        self.data_str("host")
    }

    pub fn task(&self) -> Option<&str> {
        self.data_str("task")
    }

    pub fn role(&self) -> Option<&str> {
        self.data_str("role")
    }

    /// Nested module result (`event_data.res`)
    pub fn result(&self) -> Option<&Map<String, Value>> {
        self.event_data.get("res").and_then(Value::as_object)
    }

    /// Outcome name for `runner_on_*` events (`ok`, `failed`, `skipped`, ...)
    pub fn outcome(&self) -> Option<&str> {
        self.kind.strip_prefix(OUTCOME_PREFIX)
    }

    pub fn is_task_start(&self) -> bool {
        self.kind == TASK_START_EVENT
    }

    pub fn is_ignored(&self) -> bool {
        IGNORED_EVENT_KINDS.contains(&self.kind.as_str())
    }

    /// Failure the play asked to ignore
    pub fn ignores_errors(&self) -> bool {
        self.event_data
            .get("ignore_errors")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Top-level field by name, including the typed ones
    fn top_level(&self, key: &str) -> Option<Value> {
        match key {
            "counter" => Some(Value::from(self.counter)),
            "uuid" => Some(Value::from(self.uuid.as_str())),
            "event" => Some(Value::from(self.kind.as_str())),
            "created" => self.created.as_deref().map(Value::from),
            "runner_ident" => self.runner_ident.as_deref().map(Value::from),
            _ => self.extra.get(key).cloned(),
        }
    }

    /// First value for `key` at top level, then in `event_data`, then in `res`
    pub fn lookup(&self, key: &str) -> Option<Value> {
        self.top_level(key)
            .or_else(|| self.event_data.get(key).cloned())
            .or_else(|| self.result().and_then(|res| res.get(key).cloned()))
    }

    pub fn summary(&self) -> EventSummary {
        EventSummary {
            event: self.kind.clone(),
            host: self.host().map(str::to_string),
            task: self.task().map(str::to_string),
            role: self.role().map(str::to_string),
        }
    }
}

/// Compact view returned by event queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Key → expected value pairs; every pair must match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    criteria: BTreeMap<String, String>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, expected: impl Into<String>) -> Self {
        self.criteria.insert(key.into(), expected.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Ignored kinds never match; otherwise all criteria must hold
    pub fn matches(&self, record: &EventRecord) -> bool {
        if record.is_ignored() {
            return false;
        }
        self.criteria.iter().all(|(key, expected)| {
            record
                .lookup(key)
                .is_some_and(|found| value_equals(&found, expected))
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EventFilter {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            criteria: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// Filter values arrive as text; compare scalars by their text form
fn value_equals(found: &Value, expected: &str) -> bool {
    match found {
        Value::String(text) => text == expected,
        Value::Null => false,
        other => other.to_string() == expected,
    }
}

/// Ordered query result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventListing {
    /// `(event key, summary)` ascending by counter
    pub events: Vec<(String, EventSummary)>,
    pub total_events: usize,
}

impl EventListing {
    /// Sort matches by counter and summarise them
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a EventRecord>) -> Self {
        let mut matched: Vec<&EventRecord> = records.into_iter().collect();
        matched.sort_by_key(|record| record.counter);
        Self::from_sorted(
            matched
                .into_iter()
                .map(|record| (record.counter, record.key(), record.summary())),
        )
    }

    pub(crate) fn from_sorted(entries: impl IntoIterator<Item = (u64, String, EventSummary)>) -> Self {
        let events: Vec<(String, EventSummary)> = entries
            .into_iter()
            .map(|(_, key, summary)| (key, summary))
            .collect();
        Self {
            total_events: events.len(),
            events,
        }
    }

    pub fn keys(&self) -> Vec<&str> {
        self.events.iter().map(|(key, _)| key.as_str()).collect()
    }

    /// Events as a JSON object keyed by event key
    pub fn to_json(&self) -> Value {
        let mut events = Map::new();
        for (key, summary) in &self.events {
            events.insert(
                key.clone(),
                serde_json::to_value(summary).unwrap_or(Value::Null),
            );
        }
        serde_json::json!({
            "events": events,
            "total_events": self.total_events,
        })
    }
}
