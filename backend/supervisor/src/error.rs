//! Supervisor error types.

use std::io;

use thiserror::Error;

use toolkit_core::ScanError;

/// Errors surfaced by the scan supervisor. Termination failures are never
/// errors; they are reported per process in a [`crate::KillReport`].
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed waiting for job {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },
}
