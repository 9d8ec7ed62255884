//! # Seglog
//!
//! A structured log sink writing newline-delimited JSON into rotating segment files.
//!
//! ## Features
//!
//! - One background worker per logger; producers only enqueue
//! - Rotation when a segment would exceed its size limit and at local midnight
//! - Age-based retention with optional gzip compression of rotated segments
//! - Caller location on debug/fatal events, full stack trace on fatal events
//! - Optional bridge from the `tracing` ecosystem (`layer` feature)
//!
//! ## Example
//!
//! ```rust,no_run
//! use seglog::{Field, Logger, RotationConfig};
//!
//! let logger = Logger::new("logs", "app", RotationConfig::new(1024 * 1024, 7))?;
//! logger.info("user signed in", [Field::new("user_id", 42)]);
//! logger.debug("cache warmed", []);
//! logger.close()?;
//! # Ok::<(), seglog::Error>(())
//! ```

pub mod builder;
pub mod config;
pub mod encoder;
pub mod error;
pub mod event;
pub mod logger;
pub mod retention;
pub mod rotation;
pub mod segment;
mod worker;

#[cfg(feature = "layer")]
pub mod layer;

use std::path::PathBuf;

pub use builder::LoggerBuilder;
pub use config::{LoggerConfig, MIN_AGE_DAYS, RotationConfig};
pub use error::{Error, Result};
pub use event::{Caller, Diagnostics, Field, Level, LogEvent, StdDiagnostics, Value};
pub use logger::Logger;
pub use rotation::{Clock, SystemClock};

#[cfg(feature = "layer")]
pub use layer::SinkLayer;

/// Start configuring a logger writing `{prefix}_*.log` segments into `directory`.
pub fn builder(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> LoggerBuilder {
    LoggerBuilder::new(directory, prefix)
}
