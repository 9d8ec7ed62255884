//! Log events and the values they carry.

use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::Location;

use serde::Serialize;
use time::OffsetDateTime;

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    /// Developer diagnostics; records the caller location.
    Debug,
    /// Normal operation.
    Info,
    /// A failure the application recovered from.
    Error,
    /// A failure the application cannot recover from; records caller and stack trace.
    Fatal,
}

impl Level {
    /// Tag used in the encoded output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }

    /// Whether events of this level record the caller's file and line.
    pub fn records_caller(&self) -> bool {
        matches!(self, Self::Debug | Self::Fatal)
    }

    /// Whether events of this level record a stack trace.
    pub fn records_stack_trace(&self) -> bool {
        matches!(self, Self::Fatal)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A property value attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Whether the value is an empty string, array or object.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::String(s) => s.is_empty(),
            Self::Array(a) => a.is_empty(),
            Self::Object(o) => o.is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

macro_rules! value_from_int {
    ($variant:ident, $target:ty: $($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Self::$variant(v as $target)
                }
            }
        )*
    };
}

value_from_int!(Int, i64: i8, i16, i32, i64, isize);
value_from_int!(UInt, u64: u8, u16, u32, u64, usize);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Self::Object(v)
    }
}

/// A named property passed alongside a message.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: String,
    pub value: Value,
}

impl Field {
    /// Create a new field.
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Source location of the code that emitted an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Caller {
    pub file: String,
    pub line: u32,
}

impl From<&Location<'_>> for Caller {
    fn from(location: &Location<'_>) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
        }
    }
}

/// Captures the diagnostic context recorded on Debug and Fatal events.
pub trait Diagnostics: Send + Sync {
    /// Resolve the location of the application code that called the logger.
    fn caller(&self, location: &'static Location<'static>) -> Caller {
        Caller::from(location)
    }

    /// Full stack trace at the point of logging.
    fn stack_trace(&self) -> String;
}

/// [`Diagnostics`] backed by `std::backtrace`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDiagnostics;

impl Diagnostics for StdDiagnostics {
    fn stack_trace(&self) -> String {
        let trace = Backtrace::force_capture().to_string();
        if trace.trim().is_empty() {
            "<stack trace unavailable>".to_string()
        } else {
            trace
        }
    }
}

/// One structured log event. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    level: Level,
    #[serde(rename = "time", with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<String>,
}

impl LogEvent {
    /// Create an event without caller or stack information.
    ///
    /// On duplicate keys the last one wins.
    pub fn new(
        level: Level,
        timestamp: OffsetDateTime,
        message: impl Into<String>,
        fields: impl IntoIterator<Item = Field>,
    ) -> Self {
        let properties = fields
            .into_iter()
            .map(|f| (f.key, f.value))
            .collect();

        Self {
            level,
            timestamp,
            message: message.into(),
            properties,
            file: None,
            line: None,
            trace: None,
        }
    }

    /// Build an event from a public logging call, recording the diagnostic
    /// context its level requires.
    pub fn capture(
        level: Level,
        timestamp: OffsetDateTime,
        message: impl Into<String>,
        fields: impl IntoIterator<Item = Field>,
        location: &'static Location<'static>,
        diagnostics: &dyn Diagnostics,
    ) -> Self {
        let mut event = Self::new(level, timestamp, message, fields);
        if level.records_caller() {
            event = event.with_caller(diagnostics.caller(location));
        }
        if level.records_stack_trace() {
            event.trace = Some(diagnostics.stack_trace());
        }
        event
    }

    /// Attach a caller location. Ignored for levels that do not record one.
    pub fn with_caller(mut self, caller: Caller) -> Self {
        if self.level.records_caller() {
            self.file = Some(caller.file);
            self.line = Some(caller.line);
        }
        self
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    pub fn caller(&self) -> Option<Caller> {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => Some(Caller {
                file: file.clone(),
                line,
            }),
            _ => None,
        }
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDiagnostics;

    impl Diagnostics for FixedDiagnostics {
        fn stack_trace(&self) -> String {
            "frame 0\nframe 1".to_string()
        }
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    #[test]
    fn test_level_tags() {
        assert_eq!(Level::Debug.to_string(), "DEBUG");
        assert_eq!(Level::Info.as_str(), "INFO");
        assert_eq!(Level::Error.as_str(), "ERROR");
        assert_eq!(Level::Fatal.as_str(), "FATAL");
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from("a"), Value::String("a".to_string()));
        assert_eq!(Value::from(-3i32), Value::Int(-3));
        assert_eq!(Value::from(7usize), Value::UInt(7));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(1.5f64), Value::Float(1.5));
        assert_eq!(
            Value::from(vec![1u8, 2u8]),
            Value::Array(vec![Value::UInt(1), Value::UInt(2)])
        );
    }

    #[test]
    fn test_value_serializes_untagged() {
        let mut inner = BTreeMap::new();
        inner.insert("ok".to_string(), Value::from(true));
        let value = Value::from(vec![Value::from("x"), Value::Object(inner)]);
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#"["x",{"ok":true}]"#
        );
    }

    #[test]
    fn test_new_keeps_last_duplicate() {
        let event = LogEvent::new(
            Level::Info,
            now(),
            "hello",
            [
                Field::new("a", 1),
                Field::new("empty", ""),
                Field::new("a", 2),
            ],
        );
        assert_eq!(event.properties().len(), 2);
        assert_eq!(event.properties()["a"], Value::Int(2));
        assert!(event.properties()["empty"].is_empty());
    }

    #[test]
    fn test_capture_info_and_error_have_no_diagnostics() {
        for level in [Level::Info, Level::Error] {
            let event = LogEvent::capture(
                level,
                now(),
                "msg",
                [],
                Location::caller(),
                &FixedDiagnostics,
            );
            assert!(event.caller().is_none());
            assert!(event.stack_trace().is_none());
        }
    }

    #[test]
    fn test_capture_debug_records_caller_only() {
        let location = Location::caller();
        let event = LogEvent::capture(Level::Debug, now(), "msg", [], location, &FixedDiagnostics);
        let caller = event.caller().unwrap();
        assert_eq!(caller.file, location.file());
        assert_eq!(caller.line, location.line());
        assert!(event.stack_trace().is_none());
    }

    #[test]
    fn test_capture_fatal_records_caller_and_trace() {
        let event = LogEvent::capture(
            Level::Fatal,
            now(),
            "boom",
            [],
            Location::caller(),
            &FixedDiagnostics,
        );
        assert!(event.caller().is_some());
        assert_eq!(event.stack_trace(), Some("frame 0\nframe 1"));
    }

    #[test]
    fn test_std_diagnostics_trace_not_empty() {
        assert!(!StdDiagnostics.stack_trace().is_empty());
    }

    #[test]
    fn test_with_caller_ignored_for_info() {
        let event = LogEvent::new(Level::Info, now(), "msg", []).with_caller(Caller {
            file: "main.rs".to_string(),
            line: 3,
        });
        assert!(event.caller().is_none());
    }
}
