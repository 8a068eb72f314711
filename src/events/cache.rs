//! Bounded in-memory cache of recent runs' events
//!
//! Slots are created when a run starts. Once more than `capacity` runs are
//! resident the slot with the oldest insertion time is evicted; the decision
//! and the eviction happen under the same table lock as inserts, so a slot
//! being filled is never dropped by a concurrent eviction.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::record::{EventFilter, EventListing, EventRecord};

#[derive(Debug)]
struct CacheSlot {
    inserted_at: DateTime<Utc>,
    /// Tie-breaker for slots inserted within the same clock tick
    sequence: u64,
    events: BTreeMap<String, EventRecord>,
}

#[derive(Debug, Default)]
struct CacheTable {
    slots: HashMap<String, CacheSlot>,
    next_sequence: u64,
}

/// Event cache shared by the event callbacks and the query path
#[derive(Debug)]
pub struct EventCache {
    capacity: usize,
    table: Mutex<CacheTable>,
}

impl EventCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            table: Mutex::new(CacheTable::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn table(&self) -> MutexGuard<'_, CacheTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a slot for a starting run, evicting the oldest if over capacity.
    /// A run that already has a slot keeps it unchanged.
    ///
    /// Returns the evicted run id, if any.
    pub fn cache_events(&self, run_id: &str) -> Option<String> {
        let mut table = self.table();
        if table.slots.contains_key(run_id) {
            debug!("Run {} already has an event cache slot", run_id);
            return None;
        }
        let sequence = table.next_sequence;
        table.next_sequence += 1;
        table.slots.insert(
            run_id.to_string(),
            CacheSlot {
                inserted_at: Utc::now(),
                sequence,
                events: BTreeMap::new(),
            },
        );

        if table.slots.len() <= self.capacity {
            return None;
        }
        let oldest = table
            .slots
            .iter()
            .filter(|(ident, _)| ident.as_str() != run_id)
            .min_by_key(|(_, slot)| (slot.inserted_at, slot.sequence))
            .map(|(ident, _)| ident.clone())?;
        table.slots.remove(&oldest);
        debug!("Evicted run {} from the event cache", oldest);
        Some(oldest)
    }

    /// Store an event if its run has a slot; returns whether it was cached
    pub fn record(&self, run_id: &str, event: &EventRecord) -> bool {
        let mut table = self.table();
        match table.slots.get_mut(run_id) {
            Some(slot) => {
                slot.events.insert(event.key(), event.clone());
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, run_id: &str) -> bool {
        self.table().slots.contains_key(run_id)
    }

    pub fn len(&self) -> usize {
        self.table().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resident run ids, oldest insertion first
    pub fn resident_runs(&self) -> Vec<String> {
        let table = self.table();
        let mut runs: Vec<(&String, &CacheSlot)> = table.slots.iter().collect();
        runs.sort_by_key(|(_, slot)| (slot.inserted_at, slot.sequence));
        runs.into_iter().map(|(ident, _)| ident.clone()).collect()
    }

    /// Filter a resident run's events; `None` when the run has no slot
    pub fn query(&self, run_id: &str, filter: &EventFilter) -> Option<EventListing> {
        let table = self.table();
        let slot = table.slots.get(run_id)?;
        Some(EventListing::from_records(
            slot.events.values().filter(|event| filter.matches(event)),
        ))
    }

    /// Cached event by key
    pub fn get(&self, run_id: &str, key: &str) -> Option<EventRecord> {
        self.table()
            .slots
            .get(run_id)
            .and_then(|slot| slot.events.get(key).cloned())
    }
}
