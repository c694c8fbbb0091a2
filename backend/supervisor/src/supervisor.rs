//! Scan Supervisor
//!
//! Owns the scan state, the subprocess registry and the tree killer, and runs
//! the scan lifecycle on top of them.

use std::time::Duration;

use tracing::{error, info};
use uuid::Uuid;

use toolkit_core::{ScanError, ScanRequest, ScanSnapshot, ScanState};

use crate::cancel::{cancel_all, CancelReport};
use crate::error::SupervisorError;
use crate::kill_tree::KillTree;
use crate::launcher::{JobConfig, JobExit, JobInvocation, JobLauncher};
use crate::registry::SubprocessRegistry;
use crate::timeout_kill::{DEFAULT_GRACE_PERIOD, DEFAULT_POLL_INTERVAL};

/// Module name reported while a wildfire scan is running.
pub const WILDFIRE_MODULE: &str = "Wildfire.py";

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub job: JobConfig,
    /// How long a process gets between SIGTERM and SIGKILL.
    pub kill_grace: Duration,
    pub poll_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            job: JobConfig::default(),
            kill_grace: DEFAULT_GRACE_PERIOD,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub run_id: Uuid,
    pub total_steps: u32,
    pub exit: JobExit,
}

/// The ScanSupervisor owns the scan state, the subprocess registry and the
/// process-tree killer, and runs the scan lifecycle on top of them.
#[derive(Debug)]
pub struct ScanSupervisor {
    state: ScanState,
    registry: SubprocessRegistry,
    killer: KillTree,
    launcher: JobLauncher,
}

impl ScanSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            state: ScanState::new(),
            registry: SubprocessRegistry::new(),
            killer: KillTree::with_poll_interval(config.kill_grace, config.poll_interval),
            launcher: JobLauncher::new(config.job),
        }
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn registry(&self) -> &SubprocessRegistry {
        &self.registry
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        self.state.snapshot()
    }

    /// Progress report from the running job.
    pub fn advance(&self, step_name: &str, target: &str) -> Result<ScanSnapshot, ScanError> {
        self.state.advance_step(step_name, target)
    }

    /// Start a scan, run the job to completion and return to idle.
    ///
    /// Rejected with [`ScanError::AlreadyRunning`] while another scan is
    /// active. A cancellation kills the job, which ends the wait here; the
    /// state is then only reset if this scan is still the active one.
    pub async fn run_scan(&self, request: ScanRequest) -> Result<ScanOutcome, SupervisorError> {
        let ticket =
            self.state
                .start_scan(request.flags, request.domain_count, WILDFIRE_MODULE)?;

        let invocation = JobInvocation::Wildfire {
            flags: request.flags,
            single_domain: request.single_domain,
        };
        let job = match self.launcher.launch(&invocation, &self.registry) {
            Ok(job) => job,
            Err(e) => {
                error!(run_id = %ticket.run_id, error = %e, "Failed to launch scan job");
                self.state.finish_scan(&ticket);
                return Err(e);
            }
        };

        let tracked = job.tracked().clone();
        let result = job.wait().await;
        self.registry.untrack(&tracked);
        self.state.finish_scan(&ticket);

        let exit = result?;
        info!(
            run_id = %ticket.run_id,
            success = exit.success(),
            "Scan job completed"
        );
        Ok(ScanOutcome {
            run_id: ticket.run_id,
            total_steps: ticket.total_steps,
            exit,
        })
    }

    /// Run the screenshot collection job. Independent of the scan state.
    pub async fn collect_screenshots(&self) -> Result<JobExit, SupervisorError> {
        let job = self
            .launcher
            .launch(&JobInvocation::Screenshots, &self.registry)?;
        let tracked = job.tracked().clone();
        let result = job.wait().await;
        self.registry.untrack(&tracked);
        result
    }

    /// Terminate every tracked tree and every untracked child.
    pub async fn cancel_all(&self) -> CancelReport {
        cancel_all(&self.registry, &self.killer).await
    }

    /// Stop everything, then reset the scan state. The state stays frozen
    /// until every tracked tree and every orphan is gone, so `running` never
    /// reads false while a subprocess is still alive and no scan can start in
    /// between.
    pub async fn cancel(&self) -> CancelReport {
        let freeze = self.state.begin_cancel();
        let report = self.cancel_all().await;
        drop(freeze);
        report
    }
}

impl Default for ScanSupervisor {
    fn default() -> Self {
        Self::new(SupervisorConfig::default())
    }
}
