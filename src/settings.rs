//! Settings maps: open-ended JSON objects forwarded opaquely to the remote API.
//!
//! In plan and state a settings map is carried as canonical JSON text, so the
//! engine compares it textually. Before a remote call it is decoded to an
//! object map, and responses are encoded back to text.
//!
//! The remote update endpoints only upsert keys. Removing a key from the
//! declared map therefore has to be spelled out as an explicit `null`
//! ([`removal_patch`]), computed against the settings the remote object holds
//! right before the update.

use serde_json::{Map, Value};

/// A decoded settings object.
pub type Settings = Map<String, Value>;

/// Errors decoding settings text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    /// The text is not JSON.
    #[error("settings are not valid JSON: {0}")]
    InvalidJson(String),

    /// The text is JSON but not an object.
    #[error("settings must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Decode settings text into an object map.
pub fn decode(text: &str) -> Result<Settings, SettingsError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| SettingsError::InvalidJson(e.to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(SettingsError::NotAnObject(json_type_name(&other))),
    }
}

/// Decode optional settings text, treating an absent value as an empty map.
pub fn decode_optional(text: Option<&str>) -> Result<Settings, SettingsError> {
    text.map(decode).transpose().map(Option::unwrap_or_default)
}

/// Encode a value as canonical JSON text.
///
/// `serde_json` maps are ordered by key, so equal values always encode to
/// identical text.
pub fn encode(value: &Value) -> String {
    value.to_string()
}

/// Whether a remote settings value carries no information.
pub fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Build the update payload that turns `current` into `desired` on an upsert-only API.
///
/// Keys in `desired` are upserted as-is; keys present in `current` but absent
/// from `desired` are set to `null`, which the remote treats as delete.
pub fn removal_patch(current: &Settings, desired: &Settings) -> Settings {
    let mut patch = desired.clone();
    for key in current.keys() {
        if !desired.contains_key(key) {
            patch.insert(key.clone(), Value::Null);
        }
    }
    patch
}

/// Choose the encoded settings to store after a read.
///
/// Keeps the prior text when the remote value is unset (the remote filled
/// nothing in) or semantically equal to it, so state only changes when the
/// remote settings really differ.
pub fn reconcile(prior: Option<&str>, remote: &Value) -> Option<String> {
    if is_unset(remote) {
        return prior.map(str::to_string);
    }
    if let Some(prior_text) = prior {
        if let Ok(prior_value) = serde_json::from_str::<Value>(prior_text) {
            if &prior_value == remote {
                return Some(prior_text.to_string());
            }
        }
    }
    Some(encode(remote))
}

/// Keep a remote value only if the operator declared the field.
///
/// Undeclared optional fields stay unset in state even when the remote system
/// returns a default for them.
pub fn keep_if_declared<D, T>(declared: Option<&D>, remote: Option<T>) -> Option<T> {
    declared.and(remote)
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Settings {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_decode() {
        let settings = decode(r#"{"apiKey":"abc","region":"eu"}"#).unwrap();
        assert_eq!(settings["apiKey"], "abc");

        assert!(matches!(decode("not json"), Err(SettingsError::InvalidJson(_))));
        assert_eq!(decode("[1,2]"), Err(SettingsError::NotAnObject("array")));
        assert_eq!(decode_optional(None).unwrap(), Settings::new());
    }

    #[test]
    fn test_encode_is_canonical() {
        let a = decode(r#"{"b":1,"a":{"y":2,"x":1}}"#).unwrap();
        let b = decode(r#"{"a":{"x":1,"y":2},"b":1}"#).unwrap();
        assert_eq!(encode(&Value::Object(a)), encode(&Value::Object(b)));
        assert_eq!(encode(&json!({"b": 1, "a": 2})), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn test_removal_patch_nulls_removed_keys() {
        let current = map(json!({"apiKey": "abc", "region": "eu", "legacy": true}));
        let desired = map(json!({"apiKey": "xyz", "region": "eu"}));

        let patch = removal_patch(&current, &desired);

        assert_eq!(
            Value::Object(patch),
            json!({"apiKey": "xyz", "region": "eu", "legacy": null})
        );
    }

    #[test]
    fn test_removal_patch_adds_new_keys() {
        let current = map(json!({}));
        let desired = map(json!({"apiKey": "abc"}));
        assert_eq!(Value::Object(removal_patch(&current, &desired)), json!({"apiKey": "abc"}));

        let current = map(json!({"apiKey": "abc"}));
        let desired = Settings::new();
        assert_eq!(Value::Object(removal_patch(&current, &desired)), json!({"apiKey": null}));
    }

    #[test]
    fn test_reconcile_keeps_prior_when_unset() {
        let prior = r#"{"apiKey":"abc"}"#;
        assert_eq!(reconcile(Some(prior), &Value::Null).as_deref(), Some(prior));
        assert_eq!(reconcile(Some(prior), &json!({})).as_deref(), Some(prior));
        assert_eq!(reconcile(None, &json!({})), None);
    }

    #[test]
    fn test_reconcile_keeps_prior_text_when_equal() {
        let prior = r#"{ "region": "eu", "apiKey": "abc" }"#;
        let remote = json!({"apiKey": "abc", "region": "eu"});
        assert_eq!(reconcile(Some(prior), &remote).as_deref(), Some(prior));
    }

    #[test]
    fn test_reconcile_takes_remote_when_different() {
        let remote = json!({"apiKey": "new"});
        assert_eq!(
            reconcile(Some(r#"{"apiKey":"old"}"#), &remote).as_deref(),
            Some(r#"{"apiKey":"new"}"#)
        );
        assert_eq!(reconcile(None, &remote).as_deref(), Some(r#"{"apiKey":"new"}"#));
    }

    #[test]
    fn test_keep_if_declared() {
        assert_eq!(keep_if_declared(Some(&0.5), Some(0.25)), Some(0.25));
        assert_eq!(keep_if_declared::<f64, f64>(None, Some(0.25)), None);
        assert_eq!(keep_if_declared::<String, String>(Some(&"a".to_string()), None), None);
    }
}
