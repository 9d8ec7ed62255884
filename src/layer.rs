//! Forward `tracing` events into a [`Logger`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tracing_subscriber::layer::SubscriberExt;
//! use tracing_subscriber::util::SubscriberInitExt;
//!
//! let logger = Arc::new(seglog::builder("logs", "app").build()?);
//! tracing_subscriber::registry()
//!     .with(seglog::SinkLayer::new(Arc::clone(&logger)))
//!     .init();
//!
//! tracing::info!(port = 8080, "listening");
//! logger.close()?;
//! # Ok::<(), seglog::Error>(())
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::field::{Field as TracingField, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::Logger;
use crate::event::{Caller, Field, Level, LogEvent, Value};

/// Events whose target starts with this are the sink's own diagnostics.
const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

/// A [`Layer`] that writes every `tracing` event to a [`Logger`].
///
/// TRACE and DEBUG map to [`Level::Debug`], INFO and WARN to [`Level::Info`],
/// ERROR to [`Level::Error`].
pub struct SinkLayer {
    logger: Arc<Logger>,
    dropped: AtomicU64,
}

impl SinkLayer {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self {
            logger,
            dropped: AtomicU64::new(0),
        }
    }

    /// Number of events discarded because the logger was closed.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn map_level(level: &tracing::Level) -> Level {
    match *level {
        tracing::Level::TRACE | tracing::Level::DEBUG => Level::Debug,
        tracing::Level::INFO | tracing::Level::WARN => Level::Info,
        _ => Level::Error,
    }
}

impl<S: Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with(OWN_TARGET) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut log_event = LogEvent::new(
            map_level(meta.level()),
            self.logger.now(),
            visitor.message,
            visitor.fields,
        );
        if let (Some(file), Some(line)) = (meta.file(), meta.line()) {
            log_event = log_event.with_caller(Caller {
                file: file.to_string(),
                line,
            });
        }

        if self.logger.log_event(log_event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Vec<Field>,
}

impl FieldVisitor {
    fn push(&mut self, field: &TracingField, value: Value) {
        self.fields.push(Field::new(field.name(), value));
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &TracingField, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push(field, Value::from(value));
        }
    }

    fn record_i64(&mut self, field: &TracingField, value: i64) {
        self.push(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &TracingField, value: u64) {
        self.push(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &TracingField, value: f64) {
        self.push(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &TracingField, value: bool) {
        self.push(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &TracingField, value: &dyn fmt::Debug) {
        let text = format!("{:?}", value);
        if field.name() == "message" {
            self.message = text;
        } else {
            self.push(field, Value::from(text));
        }
    }
}
