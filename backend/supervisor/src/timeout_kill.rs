//! Timeout Killer
//!
//! Escalates signals on a set of processes: SIGTERM -> bounded wait -> SIGKILL.
//! `escalate` returns only once every killed target is observed gone (or the
//! settle bound runs out).

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::kill_tree::{Disposition, ProcessOutcome};
use crate::process_table::{ProcessIdentity, ProcessTable, SignalOutcome};

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Upper bound on how long a SIGKILLed process may take to disappear.
pub const KILL_SETTLE_PERIOD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
pub struct TimeoutKill {
    grace_period: Duration,
    poll_interval: Duration,
}

impl TimeoutKill {
    pub fn new(grace_period: Duration, poll_interval: Duration) -> Self {
        Self {
            grace_period,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Terminate every target, give them `grace_period` to exit, then force-kill
    /// the survivors. Never fails; each target gets a disposition.
    pub async fn escalate(
        &self,
        table: &mut ProcessTable,
        targets: &[ProcessIdentity],
    ) -> Vec<ProcessOutcome> {
        let mut outcomes = Vec::with_capacity(targets.len());
        let mut pending = Vec::with_capacity(targets.len());

        for target in targets {
            match table.terminate(target) {
                SignalOutcome::Delivered => pending.push(*target),
                SignalOutcome::Gone => {
                    debug!(pid = target.pid, "Process already exited");
                    outcomes.push(ProcessOutcome::new(target.pid, Disposition::AlreadyGone));
                }
                SignalOutcome::Refused => {
                    // May still go away on its own; the force-kill below decides.
                    warn!(pid = target.pid, "SIGTERM refused");
                    pending.push(*target);
                }
            }
        }

        let survivors = self
            .wait_for_exit(table, &pending, self.grace_period)
            .await;
        for target in &pending {
            if !survivors.contains(target) {
                outcomes.push(ProcessOutcome::new(target.pid, Disposition::ExitedGracefully));
            }
        }

        let mut killed = Vec::with_capacity(survivors.len());
        for target in &survivors {
            warn!(
                pid = target.pid,
                grace_ms = self.grace_period.as_millis() as u64,
                "Process ignored SIGTERM, escalating to SIGKILL"
            );
            let disposition = match table.force_kill(target) {
                SignalOutcome::Delivered => {
                    killed.push(*target);
                    Disposition::ForceKilled
                }
                SignalOutcome::Gone => Disposition::ExitedGracefully,
                SignalOutcome::Refused => {
                    warn!(pid = target.pid, "SIGKILL refused, giving up on process");
                    Disposition::SignalFailed
                }
            };
            outcomes.push(ProcessOutcome::new(target.pid, disposition));
        }

        // SIGKILL is asynchronous; wait for the kernel to tear the processes down.
        for target in self
            .wait_for_exit(table, &killed, KILL_SETTLE_PERIOD)
            .await
        {
            warn!(pid = target.pid, "Process still present after SIGKILL");
        }

        outcomes
    }

    /// Poll until every target has exited or `timeout` runs out.
    /// Returns the targets still alive.
    async fn wait_for_exit(
        &self,
        table: &mut ProcessTable,
        targets: &[ProcessIdentity],
        timeout: Duration,
    ) -> Vec<ProcessIdentity> {
        let deadline = Instant::now() + timeout;
        let mut alive = targets.to_vec();

        loop {
            let pids: Vec<u32> = alive.iter().map(|target| target.pid).collect();
            table.refresh(&pids);
            alive.retain(|target| table.is_alive(target));

            let now = Instant::now();
            if alive.is_empty() || now >= deadline {
                return alive;
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

impl Default for TimeoutKill {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD, DEFAULT_POLL_INTERVAL)
    }
}
