//! Newline-delimited JSON rendering of events.

use time::format_description::well_known::Rfc3339;

use crate::event::{Level, LogEvent};

/// Render one event as a JSON object followed by a newline.
///
/// Never fails: if serialization errors, a plain-text line tagged `ERROR`
/// describing the failure is returned instead.
pub fn encode(event: &LogEvent) -> Vec<u8> {
    match serde_json::to_vec(event) {
        Ok(mut line) => {
            line.push(b'\n');
            line
        }
        Err(err) => {
            tracing::warn!(error = %err, "falling back to plain-text log line");
            fallback_line(event, &err)
        }
    }
}

/// Plain-text replacement for an event that could not be encoded.
pub(crate) fn fallback_line(event: &LogEvent, err: &serde_json::Error) -> Vec<u8> {
    let time = event
        .timestamp()
        .format(&Rfc3339)
        .unwrap_or_else(|_| event.timestamp().unix_timestamp().to_string());
    format!(
        "{} {} log encoding failed: {}; message: {:?}\n",
        Level::Error,
        time,
        err,
        event.message()
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Caller, Diagnostics, Field, Value};
    use std::collections::BTreeMap;
    use std::panic::Location;
    use time::macros::datetime;

    struct FixedDiagnostics;

    impl Diagnostics for FixedDiagnostics {
        fn stack_trace(&self) -> String {
            "main\n  at src/main.rs:10".to_string()
        }
    }

    fn parse(line: &[u8]) -> serde_json::Value {
        assert_eq!(line.last(), Some(&b'\n'));
        assert_eq!(line.iter().filter(|b| **b == b'\n').count(), 1);
        serde_json::from_slice(line).unwrap()
    }

    #[test]
    fn test_encode_info_minimal() {
        let event = LogEvent::new(
            Level::Info,
            datetime!(2026-01-09 10:30:00 UTC),
            "service started",
            [],
        );
        let line = encode(&event);
        assert_eq!(
            String::from_utf8(line).unwrap(),
            "{\"level\":\"INFO\",\"time\":\"2026-01-09T10:30:00Z\",\"message\":\"service started\"}\n"
        );
    }

    #[test]
    fn test_encode_properties() {
        let mut nested = BTreeMap::new();
        nested.insert("region".to_string(), Value::from("eu"));
        let event = LogEvent::new(
            Level::Error,
            datetime!(2026-01-09 10:30:00 +02:00),
            "request failed",
            [
                Field::new("status", 503),
                Field::new("retry", true),
                Field::new("ratio", 0.5),
                Field::new("ctx", Value::Object(nested)),
            ],
        );
        let json = parse(&encode(&event));
        assert_eq!(json["level"], "ERROR");
        assert_eq!(json["time"], "2026-01-09T10:30:00+02:00");
        assert_eq!(json["properties"]["status"], 503);
        assert_eq!(json["properties"]["retry"], true);
        assert_eq!(json["properties"]["ratio"], 0.5);
        assert_eq!(json["properties"]["ctx"]["region"], "eu");
        assert!(json.get("file").is_none());
        assert!(json.get("line").is_none());
        assert!(json.get("trace").is_none());
    }

    #[test]
    fn test_encode_debug_has_caller() {
        let event = LogEvent::new(Level::Debug, datetime!(2026-01-09 0:00 UTC), "x", [])
            .with_caller(Caller {
                file: "src/app.rs".to_string(),
                line: 42,
            });
        let json = parse(&encode(&event));
        assert_eq!(json["file"], "src/app.rs");
        assert_eq!(json["line"], 42);
        assert!(json.get("trace").is_none());
    }

    #[test]
    fn test_encode_fatal_has_full_trace() {
        let event = LogEvent::capture(
            Level::Fatal,
            datetime!(2026-01-09 0:00 UTC),
            "out of memory",
            [],
            Location::caller(),
            &FixedDiagnostics,
        );
        let json = parse(&encode(&event));
        assert_eq!(json["level"], "FATAL");
        assert_eq!(json["trace"], "main\n  at src/main.rs:10");
        assert!(json["line"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_encode_escapes_newlines_in_message() {
        let event = LogEvent::new(Level::Info, datetime!(2026-01-09 0:00 UTC), "a\nb", []);
        let json = parse(&encode(&event));
        assert_eq!(json["message"], "a\nb");
    }

    #[test]
    fn test_fallback_line() {
        let event = LogEvent::new(
            Level::Info,
            datetime!(2026-01-09 10:30:00 UTC),
            "lost?",
            [],
        );
        let err = serde_json::from_str::<u8>("not json").unwrap_err();
        let line = String::from_utf8(fallback_line(&event, &err)).unwrap();
        assert!(line.starts_with("ERROR 2026-01-09T10:30:00Z log encoding failed: "));
        assert!(line.ends_with("; message: \"lost?\"\n"));
    }
}
