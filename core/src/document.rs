//! Decoded API responses and API-level error/warning detection.
//!
//! # Design
//! `decode` performs syntactic JSON parsing only. Structure is looked up
//! lazily by path; a missing path is an `Option::None` or a
//! `ClientError::Protocol`, never a panic.
//!
//! `error_check` is the coarse gate used by the checked calls: `error` and
//! `warnings` both collapse into `ok == false`. `Document::status` exposes
//! the distinction for callers who need it.

use serde_json::Value;

use crate::error::ClientError;

/// Parse a raw response body.
pub fn decode(body: &[u8]) -> Result<Document, ClientError> {
    Ok(Document(serde_json::from_slice(body)?))
}

/// A decoded API response.
#[derive(Debug, Clone, PartialEq)]
pub struct Document(Value);

impl Document {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Whether the document has a top-level `key`.
    pub fn has(&self, key: &str) -> bool {
        self.0.get(key).is_some()
    }

    /// Navigate object keys, or array indices for numeric segments.
    pub fn path(&self, segments: &[&str]) -> Option<&Value> {
        segments.iter().try_fold(&self.0, |node, segment| match node {
            Value::Object(map) => map.get(*segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// String at `segments`, or a `Protocol` error naming the path.
    pub fn str_at(&self, segments: &[&str]) -> Result<&str, ClientError> {
        match self.path(segments) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(ClientError::Protocol(format!(
                "expected string at {}, found {}",
                segments.join("."),
                kind_of(other)
            ))),
            None => Err(ClientError::Protocol(format!(
                "missing {}",
                segments.join(".")
            ))),
        }
    }

    /// API-level outcome carried by the document.
    pub fn status(&self) -> ApiStatus {
        if let Some(error) = self.0.get("error") {
            let field = |name: &str| {
                error
                    .get(name)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            let code = field("code");
            let mut info = field("info");
            if code.is_empty() && info.is_empty() {
                info = match error {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
            }
            return ApiStatus::Error { code, info };
        }
        if let Some(warnings) = self.0.get("warnings") {
            return ApiStatus::Warnings(warnings.clone());
        }
        ApiStatus::Ok
    }

    /// `true` unless the document has a top-level `error` or `warnings` key.
    pub fn is_ok(&self) -> bool {
        !self.has("error") && !self.has("warnings")
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Detailed API-level outcome of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiStatus {
    Ok,
    /// Top-level `error` object. Missing fields are empty strings.
    Error { code: String, info: String },
    /// Top-level `warnings` object, keyed by module name.
    Warnings(Value),
}

/// Pass a call result through unchanged alongside an API success flag.
///
/// The flag is `false` when the document has a top-level `error` or
/// `warnings` key, and also when there is no document at all.
pub fn error_check(
    result: Result<Document, ClientError>,
) -> (Result<Document, ClientError>, bool) {
    let ok = match &result {
        Ok(doc) => doc.is_ok(),
        Err(_) => false,
    };
    (result, ok)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
