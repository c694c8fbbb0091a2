//! Wildfire Toolkit HTTP control surface.
//!
//! Maps the ping, status, progress-update, scan, screenshot and termination
//! endpoints onto a shared [`toolkit_supervisor::ScanSupervisor`].

pub mod health_api;
pub mod process_api;
pub mod scan_api;
pub mod server;

pub use server::{build_router, start_server, GatewayState};
