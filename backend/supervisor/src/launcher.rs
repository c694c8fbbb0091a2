//! Job Launcher
//!
//! Builds the external scan job's command line and spawns it. The new process
//! is tracked in the registry before `launch` returns, so a cancellation can
//! never race an untracked job.

use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tracing::{info, warn};

use toolkit_core::ScanFlags;

use crate::error::SupervisorError;
use crate::process_table::ProcessTable;
use crate::registry::{SubprocessRegistry, TrackedProcess};

/// How to invoke the external job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    /// Executable, e.g. `python3`.
    pub program: String,
    /// Arguments placed before the job flags, e.g. the script path.
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["wildfire.py".to_string()],
            working_dir: None,
        }
    }
}

/// The two things the external job can be asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobInvocation {
    Wildfire {
        flags: ScanFlags,
        single_domain: Option<String>,
    },
    Screenshots,
}

impl JobInvocation {
    /// Job flags, without the program or configured prefix arguments.
    pub fn args(&self) -> Vec<String> {
        match self {
            JobInvocation::Wildfire {
                flags,
                single_domain,
            } => {
                let mut args: Vec<String> =
                    flags.features().map(|f| f.job_flag().to_string()).collect();
                if let Some(fqdn) = single_domain {
                    args.push("--fqdn".to_string());
                    args.push(fqdn.clone());
                    args.push("--scanSingle".to_string());
                }
                args
            }
            JobInvocation::Screenshots => vec!["--screenshots".to_string()],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobInvocation::Wildfire { .. } => "wildfire",
            JobInvocation::Screenshots => "screenshots",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobLauncher {
    config: JobConfig,
}

impl JobLauncher {
    pub fn new(config: JobConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Full argument vector passed to the program.
    pub fn argv(&self, invocation: &JobInvocation) -> Vec<String> {
        let mut argv = self.config.args.clone();
        argv.extend(invocation.args());
        argv
    }

    /// Spawn the job and track it.
    pub fn launch(
        &self,
        invocation: &JobInvocation,
        registry: &SubprocessRegistry,
    ) -> Result<RunningJob, SupervisorError> {
        let argv = self.argv(invocation);
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&argv).stdin(Stdio::null());
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| SupervisorError::Launch {
            program: self.config.program.clone(),
            source,
        })?;
        let pid = child.id().ok_or_else(|| SupervisorError::Launch {
            program: self.config.program.clone(),
            source: io::Error::other("spawned job has no pid"),
        })?;

        let start_time = ProcessTable::observe(&[pid])
            .identity(pid)
            .map(|identity| identity.start_time);
        let tracked = TrackedProcess::new(pid, start_time, invocation.label());
        registry.track(tracked.clone());

        info!(
            pid,
            job = invocation.label(),
            program = %self.config.program,
            args = ?argv,
            "Job launched"
        );
        Ok(RunningJob { child, tracked })
    }
}

/// A launched job. Dropping it does not kill the process.
#[derive(Debug)]
pub struct RunningJob {
    child: Child,
    tracked: TrackedProcess,
}

impl RunningJob {
    pub fn pid(&self) -> u32 {
        self.tracked.pid
    }

    pub fn tracked(&self) -> &TrackedProcess {
        &self.tracked
    }

    /// Wait for the job to exit. Does not hold any lock while waiting.
    pub async fn wait(mut self) -> Result<JobExit, SupervisorError> {
        let pid = self.tracked.pid;
        let status = self
            .child
            .wait()
            .await
            .map_err(|source| SupervisorError::Wait { pid, source })?;

        let exit = JobExit {
            pid,
            label: self.tracked.label.clone(),
            status,
        };
        if status.success() {
            info!(pid, job = %exit.label, "Job exited");
        } else {
            warn!(pid, job = %exit.label, status = %status, "Job exited unsuccessfully");
        }
        Ok(exit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobExit {
    pub pid: u32,
    pub label: String,
    pub status: ExitStatus,
}

impl JobExit {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}
