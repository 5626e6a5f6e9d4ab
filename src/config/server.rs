//! Server configuration

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Request timeout in seconds
    pub request_timeout: u64,

    /// CORS allowed origins; `*` allows any
    pub cors_origins: Vec<String>,

    /// CORS preflight cache lifetime in seconds
    pub cors_max_age: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".parse().expect("valid literal address"),
            request_timeout: 30,
            cors_origins: vec!["*".to_string()],
            cors_max_age: 86_400,
        }
    }
}
