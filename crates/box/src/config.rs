//! Event source client configuration.

use serde::{Deserialize, Serialize};

/// Enterprise API client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxConfig {
    /// API root, e.g. "https://api.box.com/2.0"
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Enterprise admin access token. Absent until the OAuth flow installs one.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.box.com/2.0".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for BoxConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            access_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}
