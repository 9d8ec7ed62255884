use thiserror::Error as ThisError;

/// Errors that can occur in the log sink
#[derive(ThisError, Debug)]
pub enum Error {
    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
    /// Initialization failed.
    #[error("Initialization error: {0}")]
    Init(String),
    /// The logger has been closed and no longer accepts events.
    #[error("logger is closed")]
    Closed,
    /// The background worker panicked.
    #[error("log worker panicked")]
    WorkerPanicked,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
