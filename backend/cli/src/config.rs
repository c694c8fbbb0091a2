use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use toolkit_supervisor::{JobConfig, SupervisorConfig};

/// Toolkit runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// HTTP server bind address
    pub bind_address: String,
    /// HTTP server port
    pub port: u16,
    /// Program the scan job runs under
    pub job_program: String,
    /// Script handed to `job_program`
    pub job_script: String,
    pub job_dir: Option<PathBuf>,
    /// Seconds between SIGTERM and SIGKILL
    pub kill_grace_secs: u64,
    pub log_dir: Option<PathBuf>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5000,
            job_program: "python3".to_string(),
            job_script: "wildfire.py".to_string(),
            job_dir: None,
            kill_grace_secs: 3,
            log_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        Self {
            bind_address: non_empty("TOOLKIT_BIND").unwrap_or(defaults.bind_address),
            port: non_empty("TOOLKIT_PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(defaults.port),
            job_program: non_empty("TOOLKIT_JOB_PROGRAM").unwrap_or(defaults.job_program),
            job_script: non_empty("TOOLKIT_JOB_SCRIPT").unwrap_or(defaults.job_script),
            job_dir: non_empty("TOOLKIT_JOB_DIR").map(PathBuf::from),
            kill_grace_secs: non_empty("TOOLKIT_KILL_GRACE_SECS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.kill_grace_secs),
            log_dir: non_empty("TOOLKIT_LOG_DIR").map(PathBuf::from),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            job: JobConfig {
                program: self.job_program.clone(),
                args: vec![self.job_script.clone()],
                working_dir: self.job_dir.clone(),
            },
            kill_grace: Duration::from_secs(self.kill_grace_secs),
            ..SupervisorConfig::default()
        }
    }

    /// Base URL for talking to a running server. A wildcard bind address is
    /// reached over loopback.
    pub fn base_url(&self) -> String {
        let host = match self.bind_address.as_str() {
            "0.0.0.0" | "::" | "[::]" => "127.0.0.1",
            other => other,
        };
        format!("http://{}:{}", host, self.port)
    }
}
