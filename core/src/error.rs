//! Error types for the wiki API client.
//!
//! # Design
//! Transport and decode failures mean no usable document was obtained.
//! `Api` and `Warning` are raised only where a caller escalates the
//! document's own `error`/`warnings` markers (the token fetch does); plain
//! `get`/`post` hand the document back untouched. `LoginFailed` displays
//! the server's login result verbatim so callers can match on it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The API endpoint given at construction is not a valid absolute URL.
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// No response was obtained: connection, TLS or I/O failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body is not valid JSON.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The document carries a top-level `error` object. `code` is empty when
    /// the server sent no code.
    #[error("{}", api_message(.code, .info))]
    Api { code: String, info: String },

    /// The document carries `warnings` and the caller treats them as fatal.
    #[error("{0}")]
    Warning(String),

    /// A well-formed document lacks an expected value.
    #[error("unexpected API response: {0}")]
    Protocol(String),

    /// The login handshake ended with a result other than `Success`.
    #[error("{0}")]
    LoginFailed(String),
}

fn api_message(code: &str, info: &str) -> String {
    if code.is_empty() {
        info.to_string()
    } else {
        format!("{code}: {info}")
    }
}

impl ClientError {
    /// Server-side login result for `LoginFailed`, e.g. `WrongPass`.
    pub fn login_result(&self) -> Option<&str> {
        match self {
            ClientError::LoginFailed(result) => Some(result),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_failure_displays_result_verbatim() {
        let err = ClientError::LoginFailed("WrongPass".to_string());
        assert_eq!(err.to_string(), "WrongPass");
        assert_eq!(err.login_result(), Some("WrongPass"));
    }

    #[test]
    fn api_error_combines_code_and_info() {
        let err = ClientError::Api {
            code: "badtoken".to_string(),
            info: "Invalid token".to_string(),
        };
        assert_eq!(err.to_string(), "badtoken: Invalid token");
        assert_eq!(err.login_result(), None);
    }

    #[test]
    fn api_error_without_code_shows_info_only() {
        let err = ClientError::Api {
            code: String::new(),
            info: "readonly".to_string(),
        };
        assert_eq!(err.to_string(), "readonly");
    }
}
