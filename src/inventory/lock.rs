//! Exclusive inventory lock
//!
//! The inventory file is serialized across processes with an advisory
//! `flock(LOCK_EX | LOCK_NB)`. Acquisition is bounded: a fixed number of
//! attempts separated by a wait on a [`LockGate`]. Handles created from the
//! same store share one gate, so a release inside this process wakes waiters
//! at once; a release by another process is seen on the next attempt.

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use super::InventoryError;

/// Retry bounds for exclusive acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    pub attempts: u32,
    pub retry_delay: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            retry_delay: Duration::from_millis(50),
        }
    }
}

/// Release notifications between handles of the same store
#[derive(Debug, Default)]
pub struct LockGate {
    releases: Mutex<u64>,
    released: Condvar,
}

impl LockGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake every thread blocked in [`LockGate::wait_for_release`]
    pub fn notify_released(&self) {
        let mut releases = self.releases.lock().unwrap_or_else(PoisonError::into_inner);
        *releases = releases.wrapping_add(1);
        self.released.notify_all();
    }

    /// Block until a release is announced or `timeout` passes.
    ///
    /// Returns `true` if a release was observed, `false` on timeout.
    pub fn wait_for_release(&self, timeout: Duration) -> bool {
        let releases = self.releases.lock().unwrap_or_else(PoisonError::into_inner);
        let seen = *releases;
        let (_releases, result) = self
            .released
            .wait_timeout_while(releases, timeout, |current| *current == seen)
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out()
    }
}

/// Held `flock` on the inventory file; unlocked on drop
pub struct InventoryLock {
    file: Option<Flock<File>>,
    gate: Arc<LockGate>,
}

impl std::fmt::Debug for InventoryLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryLock")
            .field("held", &self.file.is_some())
            .finish()
    }
}

impl InventoryLock {
    /// Try to lock `file`, waiting on `gate` between attempts
    pub fn acquire(
        path: &Path,
        file: File,
        policy: LockPolicy,
        gate: Arc<LockGate>,
    ) -> Result<Self, InventoryError> {
        let attempts = policy.attempts.max(1);
        let mut file = file;

        for attempt in 1..=attempts {
            match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                Ok(locked) => {
                    debug!("Inventory lock acquired on attempt {}", attempt);
                    return Ok(Self {
                        file: Some(locked),
                        gate,
                    });
                }
                Err((unlocked, errno)) if errno == Errno::EWOULDBLOCK => {
                    file = unlocked;
                    if attempt < attempts {
                        gate.wait_for_release(policy.retry_delay);
                    }
                }
                Err((_, errno)) => {
                    return Err(InventoryError::Read {
                        path: path.to_path_buf(),
                        source: std::io::Error::from(errno),
                    });
                }
            }
        }

        warn!(
            "Unable to lock the inventory at {} after {} attempts",
            path.display(),
            attempts
        );
        // `file` drops here, closing the descriptor without holding anything
        Err(InventoryError::LockTimeout {
            path: path.to_path_buf(),
            attempts,
        })
    }

    /// The locked file, for rewriting in place
    pub fn file_mut(&mut self) -> Option<&mut File> {
        self.file.as_deref_mut()
    }

    /// Unlock, close and wake waiters
    pub fn release(mut self) {
        self.unlock();
    }

    fn unlock(&mut self) {
        if let Some(locked) = self.file.take() {
            if let Err((locked, errno)) = locked.unlock() {
                warn!("Explicit inventory unlock failed ({}), closing descriptor", errno);
                drop(locked);
            }
            self.gate.notify_released();
        }
    }
}

impl Drop for InventoryLock {
    fn drop(&mut self) {
        self.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::thread;
    use std::time::Instant;

    fn open_rw(path: &Path) -> File {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .unwrap()
    }

    #[test]
    fn test_wait_times_out_without_release() {
        let gate = LockGate::new();
        let start = Instant::now();
        assert!(!gate.wait_for_release(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wait_observes_release_from_other_thread() {
        let gate = Arc::new(LockGate::new());
        let notifier = Arc::clone(&gate);
        let handle = thread::spawn(move || {
            for _ in 0..50 {
                thread::sleep(Duration::from_millis(10));
                notifier.notify_released();
            }
        });
        assert!(gate.wait_for_release(Duration::from_secs(5)));
        handle.join().unwrap();
    }

    #[test]
    fn test_second_lock_times_out_then_succeeds_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        let gate = Arc::new(LockGate::new());
        let policy = LockPolicy {
            attempts: 3,
            retry_delay: Duration::from_millis(10),
        };

        let first = InventoryLock::acquire(&path, open_rw(&path), policy, Arc::clone(&gate)).unwrap();
        let second = InventoryLock::acquire(&path, open_rw(&path), policy, Arc::clone(&gate));
        assert!(matches!(
            second,
            Err(InventoryError::LockTimeout { attempts: 3, .. })
        ));

        first.release();
        let third = InventoryLock::acquire(&path, open_rw(&path), policy, gate);
        assert!(third.is_ok());
    }
}
