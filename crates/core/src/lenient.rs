//! Lenient field decoders for backend payloads.
//!
//! The backend is a loosely-typed service: counts arrive as integers, floats
//! or strings, flags as booleans or 0/1, timestamps with or without an offset.
//! A single odd field must never cause a whole message to be dropped, so each
//! decoder maps anything it does not understand to the field's zero value.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Non-negative count. Missing, null, negative or unparseable → 0.
pub fn count<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(Option::<Value>::deserialize(d)?
        .as_ref()
        .and_then(value_to_count)
        .unwrap_or(0))
}

/// Like [`count`] but keeps "absent" distinct from zero.
pub fn opt_count<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?
        .as_ref()
        .and_then(value_to_count))
}

/// Truthiness flag. `true`, non-zero numbers and `"true"`/`"1"` are set.
pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(Option::<Value>::deserialize(d)?
        .as_ref()
        .is_some_and(value_to_flag))
}

/// Optional float (pre-computed statistics, frame rates, averages).
pub fn float<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }))
}

/// Optional timestamp. RFC 3339, or naive ISO 8601 read as UTC.
pub fn timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?
        .as_ref()
        .and_then(Value::as_str)
        .and_then(parse_timestamp))
}

/// Optional nested value. Null, or anything that does not decode as `T` → `None`.
pub fn lossy<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(Option::<Value>::deserialize(d)?.and_then(|v| serde_json::from_value(v).ok()))
}

/// List of `T`. Null or a non-array reads as empty; entries that do not
/// decode are skipped.
pub fn list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect(),
        _ => Vec::new(),
    })
}

pub(crate) fn value_to_count(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(float_to_count)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(float_to_count))
        }
        _ => None,
    }
}

fn float_to_count(f: f64) -> Option<u64> {
    (f.is_finite() && f >= 0.0).then(|| f.trunc() as u64)
}

pub(crate) fn value_to_flag(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim(), "true" | "True" | "1"),
        _ => false,
    }
}

pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_count_accepts_numeric_shapes() {
        assert_eq!(value_to_count(&json!(5)), Some(5));
        assert_eq!(value_to_count(&json!(5.9)), Some(5));
        assert_eq!(value_to_count(&json!(" 12 ")), Some(12));
        assert_eq!(value_to_count(&json!("3.0")), Some(3));
    }

    #[test]
    fn test_count_rejects_nonsense() {
        assert_eq!(value_to_count(&json!(-4)), None);
        assert_eq!(value_to_count(&json!("many")), None);
        assert_eq!(value_to_count(&json!(true)), None);
        assert_eq!(value_to_count(&json!(null)), None);
    }

    #[test]
    fn test_flag_truthiness() {
        assert!(value_to_flag(&json!(true)));
        assert!(value_to_flag(&json!(1)));
        assert!(value_to_flag(&json!("1")));
        assert!(!value_to_flag(&json!(0)));
        assert!(!value_to_flag(&json!(false)));
        assert!(!value_to_flag(&json!("no")));
        assert!(!value_to_flag(&json!(null)));
    }

    #[test]
    fn test_timestamp_with_offset() {
        let ts = parse_timestamp("2025-03-01T10:00:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-03-01T08:00:00+00:00");
    }

    #[test]
    fn test_naive_timestamp_is_utc() {
        let ts = parse_timestamp("2025-03-01T10:00:00.123456").unwrap();
        assert_eq!(ts.format("%H:%M:%S").to_string(), "10:00:00");
        assert!(parse_timestamp("2025-03-01 10:00:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "count")]
        n: u64,
        #[serde(default, deserialize_with = "flag")]
        b: bool,
    }

    #[derive(Deserialize)]
    struct Nested {
        #[serde(default, deserialize_with = "lossy")]
        name: Option<String>,
        #[serde(default, deserialize_with = "list")]
        counts: Vec<u64>,
    }

    #[test]
    fn test_lossy_and_list_tolerate_wrong_shapes() {
        let n: Nested = serde_json::from_value(json!({"name": 7, "counts": null})).unwrap();
        assert_eq!((n.name, n.counts), (None, vec![]));
        let n: Nested = serde_json::from_value(json!({"name": "a", "counts": "x"})).unwrap();
        assert_eq!((n.name.as_deref(), n.counts), (Some("a"), vec![]));
        let n: Nested = serde_json::from_value(json!({"counts": [1, "two", 3]})).unwrap();
        assert_eq!(n.counts, vec![1, 3]);
    }

    #[test]
    fn test_missing_and_null_fields_default() {
        let p: Probe = serde_json::from_value(json!({})).unwrap();
        assert_eq!((p.n, p.b), (0, false));
        let p: Probe = serde_json::from_value(json!({"n": null, "b": null})).unwrap();
        assert_eq!((p.n, p.b), (0, false));
    }
}
