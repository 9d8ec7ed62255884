//! The producer-facing handle of one log stream.

use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, bounded};
use time::OffsetDateTime;

use crate::config::{LoggerConfig, RotationConfig};
use crate::event::{Diagnostics, Field, Level, LogEvent, StdDiagnostics};
use crate::rotation::{Clock, SystemClock};
use crate::segment::{SegmentNames, SegmentWriter};
use crate::worker::{Message, Worker, lock};
use crate::{Error, Result};

/// A log stream writing newline-delimited JSON into rotating segments.
///
/// Logging calls encode nothing themselves: they build an event and hand it
/// to a bounded queue served by one background worker, blocking only while
/// the queue is full. Events are written in the order they were enqueued.
///
/// `close` (or dropping the logger) drains the queue before returning.
pub struct Logger {
    names: SegmentNames,
    /// Taken by `close`; producers send while holding the read lock.
    sender: RwLock<Option<Sender<Message>>>,
    shutdown: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
    closed: AtomicBool,
    segment: Arc<Mutex<SegmentWriter>>,
    clock: Arc<dyn Clock>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl Logger {
    /// Open (or create) today's segment in `directory` and start the worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the directory cannot
    /// be created or the initial segment cannot be opened for append.
    ///
    /// Segment dates and the midnight trigger use [`SystemClock`]. On Unix the
    /// local offset usually cannot be read once the process has several
    /// threads, in which case dates and midnight are in UTC. Pass
    /// `SystemClock::with_offset` to [`crate::LoggerBuilder::with_clock`] to
    /// pin the offset.
    pub fn new(
        directory: impl Into<PathBuf>,
        prefix: impl Into<String>,
        rotation: RotationConfig,
    ) -> Result<Self> {
        Self::from_config(&LoggerConfig::new(directory, prefix).with_rotation(rotation))
    }

    /// Start a logger from a complete configuration.
    pub fn from_config(config: &LoggerConfig) -> Result<Self> {
        Self::start(
            config,
            Arc::new(SystemClock::new()),
            Arc::new(StdDiagnostics),
        )
    }

    pub(crate) fn start(
        config: &LoggerConfig,
        clock: Arc<dyn Clock>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.directory)?;

        let names = SegmentNames::new(&config.directory, &config.prefix);
        let mut segment = SegmentWriter::new();
        segment.open_new(&names.active_path(clock.now().date()))?;
        let segment = Arc::new(Mutex::new(segment));

        let (sender, events) = bounded(config.queue_capacity);
        let (shutdown_tx, shutdown) = bounded(1);

        let worker = Worker::new(
            names.clone(),
            config.rotation.clone(),
            Arc::clone(&clock),
            Arc::clone(&segment),
            events,
            shutdown,
        );
        let handle = thread::Builder::new()
            .name(format!("seglog-{}", config.prefix))
            .spawn(move || worker.run())
            .map_err(|e| Error::Init(format!("failed to spawn log worker: {}", e)))?;

        Ok(Self {
            names,
            sender: RwLock::new(Some(sender)),
            shutdown: Mutex::new(Some(shutdown_tx)),
            worker: Mutex::new(Some(handle)),
            closed: AtomicBool::new(false),
            segment,
            clock,
            diagnostics,
        })
    }

    /// Log a debug event; records the caller's file and line.
    #[track_caller]
    pub fn debug(&self, message: impl Into<String>, fields: impl IntoIterator<Item = Field>) {
        self.log(Level::Debug, message, fields);
    }

    /// Log an info event.
    #[track_caller]
    pub fn info(&self, message: impl Into<String>, fields: impl IntoIterator<Item = Field>) {
        self.log(Level::Info, message, fields);
    }

    /// Log an error event.
    #[track_caller]
    pub fn error(&self, message: impl Into<String>, fields: impl IntoIterator<Item = Field>) {
        self.log(Level::Error, message, fields);
    }

    /// Log a fatal event; records the caller and the full stack trace.
    ///
    /// This only logs. Terminating the process is up to the caller.
    #[track_caller]
    pub fn fatal(&self, message: impl Into<String>, fields: impl IntoIterator<Item = Field>) {
        self.log(Level::Fatal, message, fields);
    }

    /// Log at `level`. Fire-and-forget: an event rejected because the logger
    /// is closed is reported through `tracing`.
    #[track_caller]
    pub fn log(
        &self,
        level: Level,
        message: impl Into<String>,
        fields: impl IntoIterator<Item = Field>,
    ) {
        if let Err(err) = self.try_log(level, message, fields) {
            tracing::error!(error = %err, event_level = %level, "log event rejected");
        }
    }

    /// Log at `level`, failing fast with [`Error::Closed`] once the logger is closed.
    #[track_caller]
    pub fn try_log(
        &self,
        level: Level,
        message: impl Into<String>,
        fields: impl IntoIterator<Item = Field>,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let event = LogEvent::capture(
            level,
            self.clock.now(),
            message,
            fields,
            Location::caller(),
            self.diagnostics.as_ref(),
        );
        self.enqueue(event)
    }

    /// Enqueue a pre-built event.
    pub fn log_event(&self, event: LogEvent) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        self.enqueue(event)
    }

    fn enqueue(&self, event: LogEvent) -> Result<()> {
        self.send(Message::Event(event))
    }

    /// Send under the read lock so `close` cannot drop the sender mid-send.
    fn send(&self, msg: Message) -> Result<()> {
        let sender = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => sender.send(msg).map_err(|_| Error::Closed),
            None => Err(Error::Closed),
        }
    }

    /// Rotate the active segment now.
    ///
    /// Events enqueued before this call end up in the segment being
    /// finalized. Blocks until the worker has performed the rotation.
    pub fn rotate(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let (reply, done) = bounded(1);
        self.send(Message::Rotate(reply))?;
        done.recv().map_err(|_| Error::Closed)??;
        Ok(())
    }

    /// Path of the segment currently open for append.
    pub fn active_path(&self) -> Option<PathBuf> {
        lock(&self.segment).path().map(Path::to_path_buf)
    }

    /// Directory holding this stream's segments.
    pub fn directory(&self) -> &Path {
        self.names.directory()
    }

    /// File name prefix of this stream's segments.
    pub fn prefix(&self) -> &str {
        self.names.prefix()
    }

    /// Current time as seen by this logger's clock.
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop accepting events, write everything already queued, wait for
    /// background compression and close the active segment.
    ///
    /// Only the first call does any work; later calls return `Ok(())`.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // Waits for in-flight sends; the worker keeps draining meanwhile.
        drop(
            self.sender
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        drop(lock(&self.shutdown).take());
        let handle = lock(&self.worker).take();
        match handle {
            Some(handle) => {
                handle.join().map_err(|_| Error::WorkerPanicked)??;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::error!(error = %err, "failed to close logger");
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("directory", &self.names.directory())
            .field("prefix", &self.names.prefix())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
