//! API response types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Response for the health endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// Service status
    pub status: String,

    /// Service name
    pub service: String,

    /// Gateway version
    pub version: String,

    /// ISO 8601 timestamp
    pub timestamp: String,
}

/// Response for the service descriptor endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub service: String,
    pub version: String,
    pub description: String,
    pub endpoints: Vec<String>,
}

/// Response for the version endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct VersionResponse {
    pub gateway: String,
    pub environment: String,
    pub runtime: String,
}

/// One entry of the service catalogue response
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub url: String,
    /// From the health map; upstreams never probed default to healthy
    pub healthy: bool,
}

/// Reflection payload returned by the echo endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct EchoResponse {
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: String,
    /// ISO 8601 timestamp
    pub timestamp: String,
}
