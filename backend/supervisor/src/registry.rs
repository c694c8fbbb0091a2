//! Subprocess registry: the processes the supervisor launched itself.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

/// A subprocess launched by the supervisor. `start_time` is the OS start time
/// observed right after spawn; `None` if the process was already gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedProcess {
    pub pid: u32,
    pub start_time: Option<u64>,
    pub label: String,
    pub tracked_at: DateTime<Utc>,
}

impl TrackedProcess {
    pub fn new(pid: u32, start_time: Option<u64>, label: impl Into<String>) -> Self {
        Self {
            pid,
            start_time,
            label: label.into(),
            tracked_at: Utc::now(),
        }
    }

    fn same_process(&self, other: &TrackedProcess) -> bool {
        self.pid == other.pid && self.start_time == other.start_time
    }
}

/// Thread-safe list of tracked subprocesses. The lock is only held for the
/// in-memory list operation, never across a signal or a wait.
#[derive(Debug, Default)]
pub struct SubprocessRegistry {
    entries: Mutex<Vec<TrackedProcess>>,
}

impl SubprocessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, process: TrackedProcess) {
        let mut entries = self.entries.lock();
        debug!(pid = process.pid, label = %process.label, "Tracking subprocess");
        entries.push(process);
    }

    /// Copy of the current entries, for iteration outside the lock.
    pub fn snapshot(&self) -> Vec<TrackedProcess> {
        self.entries.lock().clone()
    }

    /// Drop every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let removed = entries.len();
        entries.clear();
        removed
    }

    /// Remove the entry for a process that exited on its own.
    pub fn untrack(&self, process: &TrackedProcess) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| !entry.same_process(process));
        before != entries.len()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.entries.lock().iter().any(|entry| entry.pid == pid)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_track_and_snapshot() {
        let registry = SubprocessRegistry::new();
        assert!(registry.is_empty());

        registry.track(TrackedProcess::new(100, Some(1), "wildfire"));
        registry.track(TrackedProcess::new(200, None, "screenshots"));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].pid, 100);
        assert_eq!(snapshot[1].label, "screenshots");
        assert!(registry.contains(200));
    }

    #[test]
    fn test_snapshot_is_detached_from_registry() {
        let registry = SubprocessRegistry::new();
        registry.track(TrackedProcess::new(100, Some(1), "wildfire"));
        let snapshot = registry.snapshot();
        registry.clear();
        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_clear_reports_removed_count() {
        let registry = SubprocessRegistry::new();
        registry.track(TrackedProcess::new(1, None, "a"));
        registry.track(TrackedProcess::new(2, None, "b"));
        assert_eq!(registry.clear(), 2);
        assert_eq!(registry.clear(), 0);
    }

    #[test]
    fn test_untrack_matches_pid_and_start_time() {
        let registry = SubprocessRegistry::new();
        let job = TrackedProcess::new(100, Some(7), "wildfire");
        registry.track(job.clone());

        let recycled = TrackedProcess::new(100, Some(8), "wildfire");
        assert!(!registry.untrack(&recycled));
        assert_eq!(registry.len(), 1);

        assert!(registry.untrack(&job));
        assert!(registry.is_empty());
        assert!(!registry.untrack(&job));
    }

    #[test]
    fn test_concurrent_tracking() {
        let registry = Arc::new(SubprocessRegistry::new());
        let handles: Vec<_> = (0..8u32)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for j in 0..50u32 {
                        registry.track(TrackedProcess::new(i * 1000 + j, None, "job"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 400);
    }
}
