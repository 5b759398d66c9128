//! Configuration for the Groundwork plugin host.

pub mod logging;

use serde::{Deserialize, Serialize};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub plugins: PluginConfig,
    pub logging: LoggingConfig,
}

/// Plugin lifecycle and RPC settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Host the RPC servers bind to and plugins are expected on.
    pub bind_host: String,
    /// How long a freshly spawned plugin has to print its handshake line.
    pub handshake_timeout_secs: u64,
    /// How long a plugin has to exit gracefully before it is killed.
    pub shutdown_timeout_secs: u64,
    /// Default deadline for a single outbound RPC.
    pub rpc_timeout_secs: u64,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            handshake_timeout_secs: 60,
            shutdown_timeout_secs: 30,
            rpc_timeout_secs: 60,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Output format for logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}
