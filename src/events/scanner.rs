//! Parallel filter over a run's on-disk events
//!
//! Event files are pushed onto one shared queue and a fixed number of scoped
//! workers compete for them. Matches land in a concurrent map keyed by event
//! key; the caller sorts them by counter once every worker has drained the
//! queue. A file that cannot be parsed is logged and skipped.

use crossbeam_channel::Receiver;
use dashmap::DashMap;
use std::path::PathBuf;
use std::thread;
use tracing::{debug, warn};

use super::record::{EventFilter, EventListing, EventSummary};
use super::store::EventStore;
use super::EventStoreError;

type Matches = DashMap<String, (u64, EventSummary)>;

#[derive(Debug, Clone)]
pub struct EventScanner {
    store: EventStore,
    threads: usize,
}

impl EventScanner {
    pub fn new(store: EventStore, threads: usize) -> Self {
        Self {
            store,
            threads: threads.max(1),
        }
    }

    /// Matching events of `run_id`, ascending by counter
    pub fn scan(&self, run_id: &str, filter: &EventFilter) -> Result<EventListing, EventStoreError> {
        let files = self.store.event_files(run_id)?;
        if files.is_empty() {
            return Ok(EventListing::default());
        }

        let (sender, receiver) = crossbeam_channel::unbounded::<PathBuf>();
        for path in files {
            // receiver is alive in this scope, send cannot fail
            let _ = sender.send(path);
        }
        drop(sender);

        let matches: Matches = DashMap::new();
        let workers = self.threads.min(receiver.len()).max(1);
        debug!(
            "Scanning {} event files of run {} with {} workers",
            receiver.len(),
            run_id,
            workers
        );

        thread::scope(|scope| {
            for worker in 0..workers {
                let queue = receiver.clone();
                let matches = &matches;
                let spawned = thread::Builder::new()
                    .name(format!("event-scan-{worker}"))
                    .spawn_scoped(scope, move || scan_worker(queue, filter, matches));
                if let Err(err) = spawned {
                    warn!("Could not spawn event scan worker {}: {}", worker, err);
                }
            }
            // drains whatever no worker picked up, e.g. when every spawn failed
            scan_worker(receiver, filter, &matches);
        });

        let mut entries: Vec<(u64, String, EventSummary)> = matches
            .into_iter()
            .map(|(key, (counter, summary))| (counter, key, summary))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        Ok(EventListing::from_sorted(entries))
    }
}

fn scan_worker(queue: Receiver<PathBuf>, filter: &EventFilter, matches: &Matches) {
    for path in queue.iter() {
        match EventStore::read_event_file(&path) {
            Ok(record) if filter.matches(&record) => {
                matches.insert(record.key(), (record.counter, record.summary()));
            }
            Ok(_) => {}
            Err(err) => warn!("Skipping event file: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::record::EventRecord;
    use std::fs;

    fn seeded_store() -> (tempfile::TempDir, EventStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path());
        for counter in [1u64, 2, 3, 10, 11, 12, 20] {
            let kind = if counter == 2 {
                "playbook_on_task_start"
            } else {
                "runner_on_ok"
            };
            let task = if counter % 2 == 0 { "X" } else { "Y" };
            let record = EventRecord::new(counter, format!("u{counter}"), kind)
                .with_data("host", "h1")
                .with_data("task", task);
            store.append("r1", &record).unwrap();
        }
        (dir, store)
    }

    #[test]
    fn test_scan_sorted_by_numeric_counter() {
        let (_dir, store) = seeded_store();
        let scanner = EventScanner::new(store, 4);
        let listing = scanner.scan("r1", &EventFilter::new()).unwrap();
        assert_eq!(
            listing.keys(),
            vec!["1-u1", "3-u3", "10-u10", "11-u11", "12-u12", "20-u20"]
        );
        assert_eq!(listing.total_events, 6);
    }

    #[test]
    fn test_scan_applies_filter_and_ignore_list() {
        let (_dir, store) = seeded_store();
        let scanner = EventScanner::new(store, 3);
        let listing = scanner
            .scan("r1", &EventFilter::new().with("task", "X"))
            .unwrap();
        assert_eq!(listing.keys(), vec!["10-u10", "12-u12", "20-u20"]);
    }

    #[test]
    fn test_scan_skips_partial_and_malformed() {
        let (_dir, store) = seeded_store();
        let events = store.events_dir("r1");
        fs::write(events.join("4-bad.json"), "{oops").unwrap();
        fs::write(events.join("5-x-partial.json"), "{}").unwrap();
        fs::write(events.join("6-y-partial.json.tmp"), "{}").unwrap();

        let listing = EventScanner::new(store, 2)
            .scan("r1", &EventFilter::new())
            .unwrap();
        assert_eq!(listing.total_events, 6);
        assert!(!listing.keys().iter().any(|key| key.starts_with("4-")));
    }

    #[test]
    fn test_scan_unknown_run() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = EventScanner::new(EventStore::new(dir.path()), 2);
        assert!(matches!(
            scanner.scan("ghost", &EventFilter::new()),
            Err(EventStoreError::RunNotFound { .. })
        ));
    }

    #[test]
    fn test_single_thread_pool() {
        let (_dir, store) = seeded_store();
        let listing = EventScanner::new(store, 1)
            .scan("r1", &EventFilter::new())
            .unwrap();
        assert_eq!(listing.total_events, 6);
    }
}
