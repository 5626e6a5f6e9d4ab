//! Authentication configuration

use serde::{Deserialize, Serialize};

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// API key header name
    pub api_key_header: String,

    /// Accepted API keys; empty disables API-key gating
    pub api_keys: Vec<String>,

    /// Reject requests carrying no credentials at all. The default is
    /// permissive: anonymous requests pass through and are rate limited
    /// under the `anonymous` client key.
    pub strict: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key_header: "X-API-Key".to_string(),
            api_keys: vec![],
            strict: false,
        }
    }
}

impl AuthConfig {
    /// Whether API-key gating is active.
    pub fn api_keys_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }
}
