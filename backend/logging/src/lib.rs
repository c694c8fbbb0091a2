//! Structured logging for the toolkit binaries.
//!
//! Console output always, plus an optional daily-rolling JSON file.

pub mod logger;

pub use logger::{env_filter, init_logger, LOG_FILE_PREFIX};
