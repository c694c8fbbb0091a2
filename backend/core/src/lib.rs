//! Core scan model for the Wildfire toolkit.
//!
//! Holds the process-wide scan state machine, the feature flags that drive
//! step accounting, and the error taxonomy shared by the supervisor and the
//! HTTP gateway.

pub mod error;
pub mod state;
pub mod types;

pub use error::ScanError;
pub use state::{CancelGuard, ScanState, ScanTicket};
pub use types::{
    ScanFeature, ScanFlags, ScanRequest, ScanSnapshot, IDLE_MODULE_NAME, IDLE_STEP_NAME,
    IDLE_TARGET, STARTING_STEP_NAME, STARTING_TARGET,
};
