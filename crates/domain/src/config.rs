use std::fmt;

use serde::{Deserialize, Serialize};

/// Shared HTTP server binding config, used by both the control-plane and
/// worker binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default)]
    pub cors: CorsConfig,
}

fn d_host() -> String {
    "127.0.0.1".to_string()
}

fn d_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "d_origins")]
    pub allowed_origins: Vec<String>,
}

fn d_origins() -> Vec<String> {
    vec![
        "http://localhost:*".to_string(),
        "http://127.0.0.1:*".to_string(),
    ]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_origins(),
        }
    }
}

/// Severity of a single config validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARNING",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

/// Validate the parts of [`ServerConfig`] shared by both binaries.
/// Callers append their own fields' findings to the returned vec.
pub fn validate_server(server: &ServerConfig) -> Vec<ConfigError> {
    let mut errors = Vec::new();
    if server.port == 0 {
        errors.push(ConfigError {
            severity: ConfigSeverity::Error,
            field: "server.port".into(),
            message: "port must be nonzero".into(),
        });
    }
    if server.host.is_empty() {
        errors.push(ConfigError {
            severity: ConfigSeverity::Error,
            field: "server.host".into(),
            message: "host must not be empty".into(),
        });
    }
    errors
}
