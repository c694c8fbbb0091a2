//! Process Tree Killer
//!
//! Terminates a given PID and all of its descendants. Descendants go first,
//! then the root. The supervisor's own process is never signalled.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::process_table::{ProcessIdentity, ProcessTable};
use crate::registry::TrackedProcess;
use crate::timeout_kill::{TimeoutKill, DEFAULT_POLL_INTERVAL};

/// What happened to one process during a tree termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Exited within the grace period after SIGTERM.
    ExitedGracefully,
    /// Still alive after the grace period and received SIGKILL.
    ForceKilled,
    /// Already gone before it could be signalled.
    AlreadyGone,
    /// Could not be signalled (permission denied).
    SignalFailed,
    /// The supervisor's own process; left running.
    SelfProtected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub pid: u32,
    pub disposition: Disposition,
}

impl ProcessOutcome {
    pub fn new(pid: u32, disposition: Disposition) -> Self {
        Self { pid, disposition }
    }
}

/// Per-process results of one [`KillTree::kill_tree`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillReport {
    pub root: u32,
    pub outcomes: Vec<ProcessOutcome>,
}

impl KillReport {
    pub fn count(&self, disposition: Disposition) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.disposition == disposition)
            .count()
    }

    pub fn disposition_of(&self, pid: u32) -> Option<Disposition> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.pid == pid)
            .map(|outcome| outcome.disposition)
    }

    /// True when no process refused its signals.
    pub fn is_complete(&self) -> bool {
        self.count(Disposition::SignalFailed) == 0
    }
}

#[derive(Debug, Clone)]
pub struct KillTree {
    timeout: TimeoutKill,
    own_pid: u32,
}

impl KillTree {
    pub fn new(grace_period: Duration) -> Self {
        Self::with_poll_interval(grace_period, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(grace_period: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout: TimeoutKill::new(grace_period, poll_interval),
            own_pid: std::process::id(),
        }
    }

    /// The pid this killer refuses to signal.
    pub fn own_pid(&self) -> u32 {
        self.own_pid
    }

    /// Terminate `pid` and every descendant. Best effort: failures are
    /// logged and recorded in the report, never returned.
    pub async fn kill_tree(&self, pid: u32) -> KillReport {
        info!(pid, "Terminating process tree");

        let mut table = ProcessTable::capture();
        let descendants = table.descendants_of(pid);
        debug!(pid, descendants = descendants.len(), "Enumerated descendants");

        let mut outcomes = self.timeout.escalate(&mut table, &descendants).await;

        if pid == self.own_pid {
            warn!(pid, "Refusing to terminate the supervisor's own process");
            outcomes.push(ProcessOutcome::new(pid, Disposition::SelfProtected));
        } else {
            table.refresh(&[pid]);
            match table.identity(pid) {
                Some(root) => outcomes.extend(self.timeout.escalate(&mut table, &[root]).await),
                None => {
                    debug!(pid, "Root process already exited");
                    outcomes.push(ProcessOutcome::new(pid, Disposition::AlreadyGone));
                }
            }
        }

        let report = KillReport {
            root: pid,
            outcomes,
        };
        info!(
            pid,
            graceful = report.count(Disposition::ExitedGracefully),
            killed = report.count(Disposition::ForceKilled),
            gone = report.count(Disposition::AlreadyGone),
            failed = report.count(Disposition::SignalFailed),
            "Process tree terminated"
        );
        report
    }

    /// Terminate a registry entry's tree, skipping entries whose process has
    /// already exited or whose pid now belongs to someone else.
    pub async fn kill_tracked(&self, tracked: &TrackedProcess) -> Option<KillReport> {
        let table = ProcessTable::observe(&[tracked.pid]);
        let alive = match tracked.start_time {
            Some(start_time) => table.is_alive(&ProcessIdentity {
                pid: tracked.pid,
                start_time,
            }),
            None => table.identity(tracked.pid).is_some(),
        };
        if !alive {
            debug!(pid = tracked.pid, label = %tracked.label, "Tracked process no longer alive");
            return None;
        }

        info!(pid = tracked.pid, label = %tracked.label, "Terminating tracked process");
        Some(self.kill_tree(tracked.pid).await)
    }
}

impl Default for KillTree {
    fn default() -> Self {
        Self::new(crate::timeout_kill::DEFAULT_GRACE_PERIOD)
    }
}
