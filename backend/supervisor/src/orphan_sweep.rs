//! Orphan Sweeper
//!
//! Second line of defense for cancellation: any live direct child of the
//! supervisor that the registry does not know about gets its tree terminated.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::kill_tree::{KillReport, KillTree};
use crate::process_table::ProcessTable;
use crate::registry::TrackedProcess;

/// Terminate every untracked child of `current_pid`. Costs a full process
/// table scan, so it only runs as part of a cancellation.
pub async fn sweep_orphans(
    killer: &KillTree,
    current_pid: u32,
    tracked: &[TrackedProcess],
) -> Vec<KillReport> {
    let tracked_pids: HashSet<u32> = tracked.iter().map(|process| process.pid).collect();
    let orphans: Vec<u32> = ProcessTable::capture()
        .children_of(current_pid)
        .into_iter()
        .map(|child| child.pid)
        .filter(|pid| *pid != current_pid && !tracked_pids.contains(pid))
        .collect();

    if orphans.is_empty() {
        debug!(current_pid, "No untracked subprocesses found");
        return Vec::new();
    }

    let mut reports = Vec::with_capacity(orphans.len());
    for pid in orphans {
        warn!(pid, "Terminating untracked subprocess");
        reports.push(killer.kill_tree(pid).await);
    }
    reports
}
