//! Cancellation Orchestrator
//!
//! Tracked trees first, then the orphan sweep, then the registry is cleared.
//! Always runs to completion; per-process failures live in the reports.

use tracing::info;

use crate::kill_tree::{Disposition, KillReport, KillTree};
use crate::orphan_sweep::sweep_orphans;
use crate::registry::SubprocessRegistry;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CancelReport {
    /// Trees rooted at registry entries that were still alive.
    pub tracked: Vec<KillReport>,
    /// Trees rooted at untracked children found by the sweep.
    pub orphans: Vec<KillReport>,
    /// Registry entries removed at the end.
    pub cleared: usize,
}

impl CancelReport {
    pub fn trees_terminated(&self) -> usize {
        self.tracked.len() + self.orphans.len()
    }

    pub fn count(&self, disposition: Disposition) -> usize {
        self.tracked
            .iter()
            .chain(&self.orphans)
            .map(|report| report.count(disposition))
            .sum()
    }

    pub fn is_complete(&self) -> bool {
        self.tracked
            .iter()
            .chain(&self.orphans)
            .all(KillReport::is_complete)
    }
}

pub async fn cancel_all(registry: &SubprocessRegistry, killer: &KillTree) -> CancelReport {
    let tracked = registry.snapshot();
    info!(tracked = tracked.len(), "Cancelling all subprocesses");

    let mut report = CancelReport::default();
    for process in &tracked {
        if let Some(tree) = killer.kill_tracked(process).await {
            report.tracked.push(tree);
        }
    }

    report.orphans = sweep_orphans(killer, killer.own_pid(), &tracked).await;
    report.cleared = registry.clear();

    info!(
        tracked_trees = report.tracked.len(),
        orphan_trees = report.orphans.len(),
        force_killed = report.count(Disposition::ForceKilled),
        complete = report.is_complete(),
        "Cancellation finished"
    );
    report
}
