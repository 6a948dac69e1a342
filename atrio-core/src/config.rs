use config::{Config, File};
use serde::Deserialize;

use crate::error::AtrioError;

#[derive(Debug, Deserialize, Clone)]
pub struct AtrioConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    pub relay: RelayConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RealtimeConfig {
    pub channel: String,
    pub reconnect_delay_seconds: u64,
    pub coalesce_window_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel: "atrio_changes".to_string(),
            reconnect_delay_seconds: 5,
            coalesce_window_ms: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    pub max_attempts: usize,
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub endpoints: Vec<RelayEndpointConfig>,
}

/// One relay destination. Secrets live here (server-side only) and are never
/// echoed back through the HTTP layer.
#[derive(Debug, Deserialize, Clone)]
pub struct RelayEndpointConfig {
    pub key: String,
    pub url: String,
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Bearer token required by POST /relay. None disables the check
    /// (local development).
    pub auth_token: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8780,
            auth_token: None,
        }
    }
}

impl AtrioConfig {
    pub fn load(path: &str) -> Result<Self, AtrioError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        Ok(s.try_deserialize()?)
    }
}
