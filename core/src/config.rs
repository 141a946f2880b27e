//! Client configuration.

use serde::Deserialize;

/// Identifies this library to the wiki, as API etiquette asks of clients.
/// Applications should override it with their own name and contact.
pub const DEFAULT_USER_AGENT: &str = concat!("wiki-core/", env!("CARGO_PKG_VERSION"), " (Rust)");

/// Response format requested on every call. Not configurable.
pub const FORMAT: &str = "json";

/// Settings for constructing a `WikiClient`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Absolute URL of `api.php`.
    pub endpoint: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
