//! Typed values produced by literal coercion.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A literal after it has been coerced to its field's type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Uuid(Uuid),
    Time(DateTime<Utc>),
    Json(serde_json::Value),
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight))
}

/// Canonical wire form of a timestamp.
pub fn format_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Uuid(_) => "uuid",
            Value::Time(_) => "time",
            Value::Json(_) => "json",
        }
    }

    /// Render for the wire and for row storage.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Uuid(u) => serde_json::Value::String(u.to_string()),
            Value::Time(t) => serde_json::Value::String(format_time(t)),
            Value::Json(v) => v.clone(),
        }
    }

    /// Compare a stored JSON cell against this value, interpreting the cell
    /// as this value's type. `None` when the two cannot be compared.
    pub fn compare_json(&self, stored: &serde_json::Value) -> Option<Ordering> {
        match self {
            Value::Null => stored.is_null().then_some(Ordering::Equal),
            Value::Bool(b) => stored.as_bool().map(|s| s.cmp(b)),
            Value::Int(i) => match stored.as_i64() {
                Some(s) => Some(s.cmp(i)),
                None => stored.as_f64()?.partial_cmp(&(*i as f64)),
            },
            Value::Float(f) => stored.as_f64()?.partial_cmp(f),
            Value::String(s) => stored.as_str().map(|st| st.cmp(s.as_str())),
            Value::Uuid(u) => {
                let parsed = Uuid::parse_str(stored.as_str()?).ok()?;
                Some(parsed.cmp(u))
            }
            Value::Time(t) => {
                let parsed = parse_time(stored.as_str()?)?;
                Some(parsed.cmp(t))
            }
            Value::Json(v) => (stored == v).then_some(Ordering::Equal),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Uuid(u) => write!(f, "\"{u}\""),
            Value::Time(t) => write!(f, "\"{}\"", format_time(t)),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_time_accepts_rfc3339_and_dates() {
        let ts = parse_time("2024-03-01T12:30:00+02:00").unwrap();
        assert_eq!(format_time(&ts), "2024-03-01T10:30:00Z");

        let day = parse_time("2024-03-01").unwrap();
        assert_eq!(format_time(&day), "2024-03-01T00:00:00Z");

        assert!(parse_time("March 1st").is_none());
        assert!(parse_time("2024-13-01").is_none());
    }

    #[test]
    fn test_to_json() {
        assert_eq!(Value::Int(5).to_json(), json!(5));
        assert_eq!(Value::Null.to_json(), json!(null));
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            Value::Uuid(id).to_json(),
            json!("550e8400-e29b-41d4-a716-446655440000")
        );
    }

    #[test]
    fn test_compare_json() {
        assert_eq!(Value::Int(10).compare_json(&json!(12)), Some(Ordering::Greater));
        assert_eq!(Value::Float(1.5).compare_json(&json!(1)), Some(Ordering::Less));
        assert_eq!(
            Value::String("active".into()).compare_json(&json!("active")),
            Some(Ordering::Equal)
        );
        assert_eq!(Value::Int(1).compare_json(&json!("1")), None);
        assert_eq!(Value::Null.compare_json(&json!(null)), Some(Ordering::Equal));

        let t = parse_time("2024-01-01").unwrap();
        assert_eq!(
            Value::Time(t).compare_json(&json!("2024-06-01T00:00:00Z")),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn test_display_quotes_text() {
        assert_eq!(Value::String("x".into()).to_string(), "\"x\"");
        assert_eq!(Value::Bool(true).to_string(), "true");
    }
}
