//! Scan request, feature flag and progress snapshot types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

pub const IDLE_STEP_NAME: &str = "Not Running";
pub const IDLE_TARGET: &str = "N/a";
pub const IDLE_MODULE_NAME: &str = "N/a";
pub const STARTING_STEP_NAME: &str = "Starting...";
pub const STARTING_TARGET: &str = "Sorting...";

/// One phase of work the external scan job can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanFeature {
    /// Initial enumeration pass (`--start`).
    Primary,
    /// Cloud asset discovery (`--cloud`).
    Cloud,
    /// Port and service scanning (`--scan`).
    Scanner,
}

impl ScanFeature {
    pub const ALL: [ScanFeature; 3] = [ScanFeature::Primary, ScanFeature::Cloud, ScanFeature::Scanner];

    /// Number of progress steps this feature reports per domain.
    pub fn weight(self) -> u32 {
        match self {
            ScanFeature::Primary => 14,
            ScanFeature::Cloud => 8,
            ScanFeature::Scanner => 12,
        }
    }

    /// Command-line switch understood by the external job.
    pub fn job_flag(self) -> &'static str {
        match self {
            ScanFeature::Primary => "--start",
            ScanFeature::Cloud => "--cloud",
            ScanFeature::Scanner => "--scan",
        }
    }
}

impl fmt::Display for ScanFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScanFeature::Primary => "primary",
            ScanFeature::Cloud => "cloud",
            ScanFeature::Scanner => "scanner",
        };
        write!(f, "{}", s)
    }
}

/// The set of features enabled for a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFlags {
    pub primary: bool,
    pub cloud: bool,
    pub scanner: bool,
}

impl ScanFlags {
    pub fn new(primary: bool, cloud: bool, scanner: bool) -> Self {
        Self {
            primary,
            cloud,
            scanner,
        }
    }

    pub fn contains(&self, feature: ScanFeature) -> bool {
        match feature {
            ScanFeature::Primary => self.primary,
            ScanFeature::Cloud => self.cloud,
            ScanFeature::Scanner => self.scanner,
        }
    }

    /// Enabled features in job-argument order.
    pub fn features(&self) -> impl Iterator<Item = ScanFeature> + '_ {
        ScanFeature::ALL.into_iter().filter(|f| self.contains(*f))
    }

    /// Steps reported for a single domain.
    pub fn weight(&self) -> u32 {
        self.features().map(ScanFeature::weight).sum()
    }

    /// Expected total steps for a scan over `domain_count` domains.
    pub fn total_steps(&self, domain_count: u32) -> u32 {
        domain_count.saturating_mul(self.weight())
    }
}

/// A validated request to start a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub flags: ScanFlags,
    pub domain_count: u32,
    /// Restricts the scan to one fully-qualified domain name.
    pub single_domain: Option<String>,
}

impl ScanRequest {
    /// Build a request, rejecting a zero domain count and an empty
    /// single-domain target.
    pub fn new(
        flags: ScanFlags,
        domain_count: u32,
        single_domain: Option<String>,
    ) -> Result<Self, ScanError> {
        if domain_count == 0 {
            return Err(ScanError::InvalidRequest(
                "domainCount must be at least 1".to_string(),
            ));
        }
        let single_domain = match single_domain {
            Some(fqdn) => {
                let fqdn = fqdn.trim().to_string();
                if fqdn.is_empty() {
                    return Err(ScanError::InvalidRequest(
                        "scanSingleDomain requires a non-empty fqdn".to_string(),
                    ));
                }
                Some(fqdn)
            }
            None => None,
        };
        Ok(Self {
            flags,
            domain_count,
            single_domain,
        })
    }

    pub fn total_steps(&self) -> u32 {
        self.flags.total_steps(self.domain_count)
    }
}

/// Point-in-time copy of the scan progress fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    pub running: bool,
    pub current_step: u32,
    pub total_steps: u32,
    pub step_name: String,
    pub target: String,
    pub module_name: String,
}

impl ScanSnapshot {
    pub fn idle() -> Self {
        Self {
            running: false,
            current_step: 0,
            total_steps: 0,
            step_name: IDLE_STEP_NAME.to_string(),
            target: IDLE_TARGET.to_string(),
            module_name: IDLE_MODULE_NAME.to_string(),
        }
    }

    /// True when every field holds its idle default.
    pub fn is_idle_default(&self) -> bool {
        *self == Self::idle()
    }
}

impl Default for ScanSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}
