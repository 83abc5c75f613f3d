//! The uniform JSON response envelope and its null-free serialization.
//!
//! Handlers may write any serializable value, but every response produced by
//! the dispatcher itself uses [`Envelope`]:
//!
//! ```text
//! { "status": 404, "message": "Not Found" }
//! { "status": 500, "message": "Internal server error", "error": "...", "stack": "..." }
//! ```
//!
//! Whatever the payload, object keys whose value is `null` are dropped before
//! it reaches the wire (see [`to_json_bytes`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{ status, message, data?, error?, stack? }`
///
/// `status` is an application-level code. It is never copied onto the HTTP
/// status line, which is always `200` for JSON responses.
///
/// # Examples
///
/// ```
/// use jsonroute::envelope::{Envelope, to_json_bytes};
///
/// let body = to_json_bytes(&Envelope::new(405, "Method Not Allowed")).unwrap();
/// assert_eq!(body, br#"{"status":405,"message":"Method Not Allowed"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl Envelope {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
            error: None,
            stack: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attaches an error detail and, when given, a stack rendering.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>, stack: Option<String>) -> Self {
        self.error = Some(error.into());
        self.stack = stack;
        self
    }
}

/// Serializes `value` to JSON with every `null`-valued object key removed, at any depth.
///
/// Array elements are kept in place; a `null` inside an array stays `null`.
///
/// # Errors
///
/// Fails when `value` cannot be represented as JSON (for instance a map with
/// non-string keys, or a `Serialize` impl that reports an error).
pub fn to_json_bytes<T>(value: &T) -> Result<Vec<u8>, serde_json::Error>
where
    T: Serialize + ?Sized,
{
    serde_json::to_vec(&to_json_tree(value)?)
}

/// Converts `value` into a JSON tree with [`strip_nulls`] already applied.
///
/// # Errors
///
/// Same as [`to_json_bytes`].
pub fn to_json_tree<T>(value: &T) -> Result<Value, serde_json::Error>
where
    T: Serialize + ?Sized,
{
    let mut tree = serde_json::to_value(value)?;
    strip_nulls(&mut tree);
    Ok(tree)
}

/// Removes `null`-valued keys from every object in `value`, in place.
pub fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    fn render<T: Serialize + ?Sized>(value: &T) -> String {
        String::from_utf8(to_json_bytes(value).unwrap()).unwrap()
    }

    #[test]
    fn null_data_is_omitted() {
        let payload = json!({ "status": 200, "message": "ok", "data": null });
        let text = render(&payload);
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, json!({ "status": 200, "message": "ok" }));
        assert!(!text.contains("data"));
    }

    #[test]
    fn nested_nulls_are_omitted_but_array_slots_kept() {
        let payload = json!({ "a": { "b": null, "c": 1 }, "list": [null, { "d": null }] });
        let parsed: Value = serde_json::from_str(&render(&payload)).unwrap();
        assert_eq!(parsed, json!({ "a": { "c": 1 }, "list": [null, {}] }));
    }

    #[test]
    fn envelope_skips_absent_fields() {
        let text = render(&Envelope::new(404, "Not Found"));
        assert_eq!(text, r#"{"status":404,"message":"Not Found"}"#);
    }

    #[test]
    fn envelope_with_null_data_drops_it() {
        let env = Envelope::new(200, "ok").with_data(Value::Null);
        assert_eq!(render(&env), r#"{"status":200,"message":"ok"}"#);
    }

    #[test]
    fn envelope_error_fields() {
        let env = Envelope::new(500, "Internal server error").with_error("boom", None);
        let parsed: Envelope = serde_json::from_slice(&to_json_bytes(&env).unwrap()).unwrap();
        assert_eq!(parsed.error.as_deref(), Some("boom"));
        assert_eq!(parsed.stack, None);
    }

    #[test]
    fn non_string_map_keys_fail_to_serialize() {
        let mut weird: HashMap<(u8, u8), u8> = HashMap::new();
        weird.insert((1, 2), 3);
        assert!(to_json_bytes(&weird).is_err());
    }
}
