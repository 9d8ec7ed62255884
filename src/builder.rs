//! Builder pattern for configuring and starting a logger.
//!
//! # Example
//!
//! ```rust,no_run
//! use seglog::Field;
//!
//! let logger = seglog::builder("/var/log/app", "app")
//!     .with_max_size(10 * 1024 * 1024)
//!     .with_max_age_days(14)
//!     .with_compression(true)
//!     .build()
//!     .expect("Failed to start logger");
//!
//! logger.info("service started", [Field::new("port", 8080)]);
//! logger.close().expect("Failed to flush logs");
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{LoggerConfig, RotationConfig};
use crate::event::{Diagnostics, StdDiagnostics};
use crate::rotation::{Clock, SystemClock};
use crate::{Logger, Result};

/// A builder for configuring and starting a [`Logger`].
#[derive(Clone)]
pub struct LoggerBuilder {
    config: LoggerConfig,
    clock: Option<Arc<dyn Clock>>,
    diagnostics: Option<Arc<dyn Diagnostics>>,
}

impl LoggerBuilder {
    /// Create a new LoggerBuilder with default rotation settings.
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self::from_config(LoggerConfig::new(directory, prefix))
    }

    /// Create a LoggerBuilder from an existing configuration.
    pub fn from_config(config: LoggerConfig) -> Self {
        Self {
            config,
            clock: None,
            diagnostics: None,
        }
    }

    /// Set the size limit of the active segment, in bytes.
    pub fn with_max_size(mut self, max_size_bytes: u64) -> Self {
        self.config.rotation.max_size_bytes = max_size_bytes;
        self
    }

    /// Set how many days finalized segments are kept.
    pub fn with_max_age_days(mut self, days: u32) -> Self {
        self.config.rotation.max_age_days = days;
        self
    }

    /// Gzip segments after rotation.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.config.rotation.compress_on_rotate = compress;
        self
    }

    /// Replace all rotation settings at once.
    pub fn with_rotation(mut self, rotation: RotationConfig) -> Self {
        self.config.rotation = rotation;
        self
    }

    /// Set the capacity of the dispatch queue.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Use a custom clock for timestamps, segment dates and the midnight timer.
    ///
    /// The default [`SystemClock`] falls back to UTC when the local offset is
    /// unavailable (typical for multi-threaded Unix processes); use
    /// [`SystemClock::with_offset`] to get midnight in a known offset.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use a custom source for caller locations and stack traces.
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Get the current configuration without starting a logger.
    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Start the logger.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - The directory cannot be created
    /// - The initial segment cannot be opened
    pub fn build(self) -> Result<Logger> {
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock::new()),
        };
        let diagnostics: Arc<dyn Diagnostics> = match self.diagnostics {
            Some(diagnostics) => diagnostics,
            None => Arc::new(StdDiagnostics),
        };
        Logger::start(&self.config, clock, diagnostics)
    }
}

impl std::fmt::Debug for LoggerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerBuilder")
            .field("config", &self.config)
            .field("custom_clock", &self.clock.is_some())
            .field("custom_diagnostics", &self.diagnostics.is_some())
            .finish()
    }
}
