//! Tier-boundary decoding for list and object fields.
//!
//! Older rows store list fields as JSON-encoded text and some carry malformed payloads. Every
//! decoder here degrades to an empty default instead of failing the whole record.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

pub(crate) fn list_from_value(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text),
                Value::Number(number) => Some(number.to_string()),
                _ => None,
            })
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .collect(),
        Value::String(text) => decode_list(&text),
        _ => Vec::new(),
    }
}

/// Decodes a list column stored as JSON text.
pub(crate) fn decode_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ Value::Array(_)) => list_from_value(value),
        Ok(_) | Err(_) => {
            warn!(raw = trimmed, "discarding undecodable list field");
            Vec::new()
        }
    }
}

pub(crate) fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

pub(crate) fn object_from_value<T: DeserializeOwned>(value: Value) -> Option<T> {
    let value = match value {
        Value::Null => return None,
        Value::String(text) => match serde_json::from_str::<Value>(text.trim()) {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(raw = %text, "discarding undecodable object field");
                return None;
            }
        },
        other => other,
    };

    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            warn!(error = %err, "discarding object field with unexpected shape");
            None
        }
    }
}

pub(crate) fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.map(list_from_value).unwrap_or_default())
}

pub(crate) fn lenient_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(object_from_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_json_text_lists() {
        assert_eq!(
            decode_list(r#"["Executive Search", " ", "Tech"]"#),
            vec!["Executive Search".to_string(), "Tech".to_string()]
        );
    }

    #[test]
    fn malformed_lists_become_empty() {
        assert!(decode_list("[\"unterminated").is_empty());
        assert!(decode_list("{\"not\":\"a list\"}").is_empty());
        assert!(list_from_value(json!(42)).is_empty());
    }

    #[test]
    fn objects_accept_encoded_text_and_reject_bad_shapes() {
        #[derive(Debug, serde::Deserialize, PartialEq)]
        struct Sample {
            count: u32,
        }

        let decoded: Option<Sample> = object_from_value(json!("{\"count\": 3}"));
        assert_eq!(decoded, Some(Sample { count: 3 }));

        let rejected: Option<Sample> = object_from_value(json!({"count": "many"}));
        assert!(rejected.is_none());

        let garbage: Option<Sample> = object_from_value(json!("{count"));
        assert!(garbage.is_none());
    }
}
