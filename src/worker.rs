//! The background worker: sole writer of a logger's segments.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::SystemTime;

use crossbeam_channel::{Receiver, Sender, after, select, unbounded};
use time::OffsetDateTime;

use crate::config::RotationConfig;
use crate::encoder::encode;
use crate::event::{Field, Level, LogEvent};
use crate::retention::{spawn_compression, sweep};
use crate::rotation::{Clock, RotationPolicy, RotationReason};
use crate::segment::{SegmentNames, SegmentWriter};

/// A request travelling through the dispatch queue.
pub(crate) enum Message {
    /// Encode and append an event.
    Event(LogEvent),
    /// Rotate now and report the outcome on the given channel.
    Rotate(Sender<io::Result<()>>),
}

/// Lock the shared segment, recovering the state if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct Worker {
    names: SegmentNames,
    rotation: RotationConfig,
    policy: RotationPolicy,
    clock: Arc<dyn Clock>,
    segment: Arc<Mutex<SegmentWriter>>,
    events: Receiver<Message>,
    shutdown: Receiver<()>,
    /// Failures reported by compression threads.
    failures: Receiver<LogEvent>,
    failures_tx: Sender<LogEvent>,
    /// Error events raised by the worker itself, written before the next message.
    backlog: VecDeque<LogEvent>,
    compressions: Vec<JoinHandle<()>>,
    /// Generation whose segment could not be rotated away; the size trigger
    /// stays off for it until another rotation replaces the segment.
    size_rotation_held: Option<u64>,
}

impl Worker {
    pub(crate) fn new(
        names: SegmentNames,
        rotation: RotationConfig,
        clock: Arc<dyn Clock>,
        segment: Arc<Mutex<SegmentWriter>>,
        events: Receiver<Message>,
        shutdown: Receiver<()>,
    ) -> Self {
        let policy = RotationPolicy::new(rotation.max_size_bytes, clock.now());
        let (failures_tx, failures) = unbounded();
        Self {
            names,
            rotation,
            policy,
            clock,
            segment,
            events,
            shutdown,
            failures,
            failures_tx,
            backlog: VecDeque::new(),
            compressions: Vec::new(),
            size_rotation_held: None,
        }
    }

    /// Serve the queue until shutdown, then drain it and close the segment.
    pub(crate) fn run(mut self) -> io::Result<()> {
        tracing::debug!(
            directory = %self.names.directory().display(),
            prefix = self.names.prefix(),
            "log worker started"
        );

        // Local handles keep the select borrows off `self`.
        let events = self.events.clone();
        let failures = self.failures.clone();
        let shutdown = self.shutdown.clone();

        loop {
            self.flush_backlog();
            self.reap_compressions();

            let timer = after(self.policy.until_deadline(self.clock.now()));
            let running = select! {
                recv(events) -> msg => self.on_message(msg.ok()),
                recv(failures) -> event => self.on_failure(event.ok()),
                recv(timer) -> _ => self.on_timer(),
                recv(shutdown) -> _ => false,
            };
            if !running {
                break;
            }
        }

        self.finish()
    }

    /// Returns false once every producer handle is gone.
    fn on_message(&mut self, msg: Option<Message>) -> bool {
        match msg {
            Some(msg) => {
                self.handle(msg);
                true
            }
            None => false,
        }
    }

    fn on_failure(&mut self, event: Option<LogEvent>) -> bool {
        if let Some(event) = event {
            self.backlog.push_back(event);
        }
        true
    }

    fn handle(&mut self, msg: Message) {
        match msg {
            Message::Event(event) => {
                let line = encode(&event);
                if let Err(err) = self.write_line(&line) {
                    tracing::error!(error = %err, "failed to append log event");
                    self.report(
                        "failed to append log event",
                        [Field::new("error", err.to_string())],
                    );
                }
            }
            Message::Rotate(reply) => {
                let at = self.clock.now();
                let segment = Arc::clone(&self.segment);
                let mut seg = lock(&segment);
                let generation = seg.generation();
                let result = self.rotate_locked(&mut seg, RotationReason::Manual, generation, at);
                drop(seg);
                // The requester may have given up waiting.
                let _ = reply.send(result);
            }
        }
    }

    /// Append one encoded line, rotating first if it would overflow the segment.
    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        let segment = Arc::clone(&self.segment);
        let mut seg = lock(&segment);

        if self.size_rotation_held != Some(seg.generation())
            && self.policy.exceeds_size(seg.current_size(), line.len() as u64)
        {
            let generation = seg.generation();
            let at = self.clock.now();
            if let Err(err) = self.rotate_locked(&mut seg, RotationReason::Size, generation, at) {
                tracing::error!(error = %err, "size rotation failed");
                self.size_rotation_held = Some(seg.generation());
                self.report("log rotation failed", [Field::new("error", err.to_string())]);
            }
        }

        seg.append(line).map(|_| ())
    }

    fn on_timer(&mut self) -> bool {
        let Some(at) = self.policy.on_timer(self.clock.now()) else {
            return true;
        };

        let segment = Arc::clone(&self.segment);
        let mut seg = lock(&segment);
        let generation = seg.generation();
        if let Err(err) = self.rotate_locked(&mut seg, RotationReason::Midnight, generation, at) {
            tracing::error!(error = %err, "midnight rotation failed");
            self.report("log rotation failed", [Field::new("error", err.to_string())]);
        }
        true
    }

    /// Finalize the active segment and open the canonical one for `at`.
    ///
    /// A request computed against an older generation is a no-op that only
    /// makes sure the current handle is open.
    pub(crate) fn rotate_locked(
        &mut self,
        seg: &mut SegmentWriter,
        reason: RotationReason,
        expected_generation: u64,
        at: OffsetDateTime,
    ) -> io::Result<()> {
        if seg.generation() != expected_generation {
            if !seg.is_open()
                && let Some(path) = seg.path().map(Path::to_path_buf)
            {
                seg.open_new(&path)?;
            }
            return Ok(());
        }

        let next = self.names.active_path(at.date());
        let Some(active) = seg.path().map(Path::to_path_buf) else {
            return seg.open_new(&next);
        };

        if let Err(err) = seg.close_active() {
            tracing::warn!(error = %err, path = %active.display(), "failed to close segment before rotation");
            self.report(
                "failed to close segment before rotation",
                [
                    Field::new("path", active.display().to_string()),
                    Field::new("error", err.to_string()),
                ],
            );
        }

        let finalized = self.names.finalized_path(&active, at);
        let finalized = match fs::rename(&active, &finalized) {
            Ok(()) => Some(finalized),
            Err(err) => {
                tracing::warn!(error = %err, path = %active.display(), "failed to finalize segment");
                self.report(
                    "failed to finalize segment",
                    [
                        Field::new("path", active.display().to_string()),
                        Field::new("error", err.to_string()),
                    ],
                );
                None
            }
        };

        seg.open_new(&next)?;
        if finalized.is_none() && next == active {
            // Same file reopened: retrying on every write would never succeed.
            self.size_rotation_held = Some(seg.generation());
        }

        tracing::debug!(
            reason = reason.as_str(),
            finalized = ?finalized,
            active = %next.display(),
            "rotated log segment"
        );

        if let Some(finalized) = finalized
            && self.rotation.compress_on_rotate
        {
            self.compress(finalized);
        }

        self.sweep(&next);
        Ok(())
    }

    fn compress(&mut self, path: PathBuf) {
        let failures = self.failures_tx.clone();
        let clock = Arc::clone(&self.clock);
        let spawned = spawn_compression(path.clone(), move |path, err| {
            tracing::warn!(error = %err, path = %path.display(), "failed to compress segment");
            let event = LogEvent::new(
                Level::Error,
                clock.now(),
                "failed to compress segment",
                [
                    Field::new("path", path.display().to_string()),
                    Field::new("error", err.to_string()),
                ],
            );
            let _ = failures.send(event);
        });

        match spawned {
            Ok(handle) => self.compressions.push(handle),
            Err(err) => {
                tracing::warn!(error = %err, "failed to start compression");
                self.report(
                    "failed to start compression",
                    [
                        Field::new("path", path.display().to_string()),
                        Field::new("error", err.to_string()),
                    ],
                );
            }
        }
    }

    fn sweep(&mut self, active: &Path) {
        let report = match sweep(
            &self.names,
            Some(active),
            self.rotation.max_age(),
            SystemTime::now(),
        ) {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!(error = %err, "retention sweep failed");
                self.report(
                    "retention sweep failed",
                    [
                        Field::new("directory", self.names.directory().display().to_string()),
                        Field::new("error", err.to_string()),
                    ],
                );
                return;
            }
        };

        for (path, err) in report.errors {
            tracing::warn!(error = %err, path = %path.display(), "failed to remove expired segment");
            self.report(
                "failed to remove expired segment",
                [
                    Field::new("path", path.display().to_string()),
                    Field::new("error", err.to_string()),
                ],
            );
        }
    }

    /// Queue an error event describing a failure inside the pipeline.
    fn report<const N: usize>(&mut self, message: &str, fields: [Field; N]) {
        self.backlog
            .push_back(LogEvent::new(Level::Error, self.clock.now(), message, fields));
    }

    /// Write pending error events. Failures here are only traced, so a broken
    /// disk cannot feed errors back into itself.
    fn flush_backlog(&mut self) {
        // Events reported while flushing wait for the next round.
        let pending = std::mem::take(&mut self.backlog);
        for event in pending {
            let line = encode(&event);
            if let Err(err) = self.write_line(&line) {
                tracing::error!(
                    error = %err,
                    event_message = event.message(),
                    "dropping internal error event"
                );
            }
        }
    }

    fn reap_compressions(&mut self) {
        self.compressions.retain(|handle| !handle.is_finished());
    }

    /// Drain queued messages, wait for compressions, then close the segment.
    ///
    /// Blocks until every producer handle is gone, so nothing accepted
    /// before `close` is left behind in the queue.
    fn finish(mut self) -> io::Result<()> {
        while let Ok(msg) = self.events.recv() {
            self.handle(msg);
            self.flush_backlog();
        }

        for handle in self.compressions.drain(..) {
            if handle.join().is_err() {
                tracing::error!("compression thread panicked");
            }
        }
        while let Ok(event) = self.failures.try_recv() {
            self.backlog.push_back(event);
        }
        self.flush_backlog();

        let closed = lock(&self.segment).close_active();
        tracing::debug!(prefix = self.names.prefix(), "log worker stopped");
        closed
    }
}
