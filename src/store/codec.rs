//! Encode/decode step for list-valued columns.
//!
//! Address lists, labels and attendees are stored as JSON arrays in TEXT
//! columns. This is the only place that converts between the typed Rust lists
//! and their stored text, so a list is never written as a string that merely
//! looks like a list.
//!
//! Decoding is lenient about legacy shapes:
//! - a JSON array (`["a@x.com"]`) is the canonical form
//! - a JSON string wrapping an array (`"[\"a@x.com\"]"`) is unwrapped once
//! - a bare comma-separated string (`a@x.com, b@x.com`) is split
//! - empty / NULL decodes to an empty list

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::types::Attendee;

/// Encode a typed list for storage.
pub fn encode_list<T: Serialize>(items: &[T]) -> String {
    // Serializing a slice of plain structs/strings cannot fail.
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Decode a stored list of strings.
pub fn decode_strings(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Vec::new();
    };

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items.into_iter().filter_map(value_to_string).collect(),
        // Double-encoded: a JSON string whose content is itself a list
        Ok(Value::String(inner)) => decode_strings_once(&inner),
        Ok(Value::Null) => Vec::new(),
        Ok(other) => value_to_string(other).into_iter().collect(),
        Err(_) => split_plain(raw),
    }
}

/// Decode a stored list of structs, tolerating one level of double encoding.
pub fn decode_structs<T: DeserializeOwned>(raw: Option<&str>) -> Vec<T> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Vec::new();
    };

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect(),
        Ok(Value::String(inner)) => serde_json::from_str::<Vec<T>>(&inner).unwrap_or_default(),
        _ => Vec::new(),
    }
}

pub fn decode_attendees(raw: Option<&str>) -> Vec<Attendee> {
    decode_structs(raw)
}

fn decode_strings_once(inner: &str) -> Vec<String> {
    match serde_json::from_str::<Value>(inner.trim()) {
        Ok(Value::Array(items)) => items.into_iter().filter_map(value_to_string).collect(),
        _ => split_plain(inner),
    }
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::String(_) | Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn split_plain(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_list() {
        let encoded = encode_list(&["a@x.com".to_string(), "b@x.com".to_string()]);
        assert_eq!(encoded, r#"["a@x.com","b@x.com"]"#);
        assert_eq!(decode_strings(Some(&encoded)), vec!["a@x.com", "b@x.com"]);
    }

    #[test]
    fn test_double_encoded_list_is_unwrapped() {
        let double = serde_json::to_string(r#"["a@x.com"]"#).unwrap();
        assert_eq!(decode_strings(Some(&double)), vec!["a@x.com"]);
    }

    #[test]
    fn test_plain_comma_string() {
        assert_eq!(
            decode_strings(Some("a@x.com, b@x.com,")),
            vec!["a@x.com", "b@x.com"]
        );
    }

    #[test]
    fn test_empty_and_null() {
        assert!(decode_strings(None).is_empty());
        assert!(decode_strings(Some("")).is_empty());
        assert!(decode_strings(Some("null")).is_empty());
        assert!(decode_strings(Some("[]")).is_empty());
    }

    #[test]
    fn test_attendees() {
        let attendees = vec![Attendee {
            email: "guest@example.com".to_string(),
            response_status: Some("accepted".to_string()),
        }];
        let encoded = encode_list(&attendees);
        assert_eq!(decode_attendees(Some(&encoded)), attendees);

        let double = serde_json::to_string(&encoded).unwrap();
        assert_eq!(decode_attendees(Some(&double)), attendees);
        assert!(decode_attendees(Some("not json")).is_empty());
    }
}
