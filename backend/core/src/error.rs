use thiserror::Error;

/// Errors raised by the scan state machine and scan request validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("no scan is currently running")]
    NotRunning,

    #[error("a scan is already running")]
    AlreadyRunning,

    #[error("invalid scan request: {0}")]
    InvalidRequest(String),
}
