use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A normalized device log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    /// The log message content
    pub message: String,
    /// Whether the line was produced by the device supervisor rather than a service
    pub is_system: bool,
    /// Device-side timestamp in milliseconds since the epoch, when known
    pub timestamp: Option<i64>,
}

impl LogLine {
    pub fn new(message: impl Into<String>, is_system: bool, timestamp: Option<i64>) -> Self {
        Self {
            message: message.into(),
            is_system,
            timestamp,
        }
    }

    fn from_object(object: &Map<String, Value>) -> Self {
        // Compact form: { m, s, t }
        if object.contains_key("m") {
            return Self {
                message: text_of(object.get("m")),
                is_system: flag_of(object.get("s")),
                timestamp: object.get("t").and_then(timestamp_of),
            };
        }

        Self {
            message: text_of(object.get("message")),
            is_system: flag_of(object.get("isSystem")),
            timestamp: object.get("timestamp").and_then(timestamp_of),
        }
    }
}

/// Turn a raw provider payload into zero or more log lines
///
/// Arrays are flattened in order, `null` yields nothing, objects may use either
/// the compact `{m, s, t}` or the long `{message, isSystem, timestamp}` layout.
pub fn extract_messages(payload: &Value) -> Vec<LogLine> {
    let mut lines = Vec::new();
    collect(payload, &mut lines);
    lines
}

fn collect(payload: &Value, lines: &mut Vec<LogLine>) {
    match payload {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                collect(item, lines);
            }
        }
        Value::Object(object) => lines.push(LogLine::from_object(object)),
        Value::String(text) => lines.push(LogLine::new(text.clone(), false, None)),
        other => lines.push(LogLine::new(other.to_string(), false, None)),
    }
}

fn text_of(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn flag_of(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(n)) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
        _ => false,
    }
}

fn timestamp_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
