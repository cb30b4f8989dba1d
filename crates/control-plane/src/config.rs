//! Control-plane configuration: bind host/port, CORS, the Conversation
//! Store's database connection, Liveness Reaper timings, and the
//! Credential Broker's allow-list — loaded TOML-first with
//! `fn d_xxx() -> T` defaults, validated once at bootstrap (§1.1).

use am_domain::config::{validate_server, ConfigError, ConfigSeverity, ServerConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub reaper: ReaperConfig,
    #[serde(default)]
    pub credentials: CredentialConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            reaper: ReaperConfig::default(),
            credentials: CredentialConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = validate_server(&self.server);
        if self.database.url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "database.url".into(),
                message: "database.url must not be empty".into(),
            });
        }
        if self.reaper.stale_threshold_sec == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "reaper.stale_threshold_sec".into(),
                message: "stale_threshold_sec is zero; every worker will appear stale immediately".into(),
            });
        }
        if self.credentials.allowed_keys.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "credentials.allowed_keys".into(),
                message: "no credential keys allow-listed; broker will reject all requests".into(),
            });
        }
        errors
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "d_database_url")]
    pub url: String,
}

fn d_database_url() -> String {
    "sqlite://agentmesh.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: d_database_url() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    #[serde(default = "d_sweep_interval_sec")]
    pub sweep_interval_sec: u64,
    #[serde(default = "d_stale_threshold_sec")]
    pub stale_threshold_sec: i64,
    #[serde(default = "d_ping_timeout_sec")]
    pub ping_timeout_sec: u64,
}

fn d_sweep_interval_sec() -> u64 {
    30
}

fn d_stale_threshold_sec() -> i64 {
    90
}

fn d_ping_timeout_sec() -> u64 {
    5
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            sweep_interval_sec: d_sweep_interval_sec(),
            stale_threshold_sec: d_stale_threshold_sec(),
            ping_timeout_sec: d_ping_timeout_sec(),
        }
    }
}

/// The Credential Broker's allow-list and the env-var fallback used when
/// the configured secret store has no entry for a key (§4.3/§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    #[serde(default = "d_allowed_keys")]
    pub allowed_keys: Vec<String>,
}

fn d_allowed_keys() -> Vec<String> {
    vec![
        "ANTHROPIC_API_KEY".to_string(),
        "OPENAI_API_KEY".to_string(),
        "GOOGLE_API_KEY".to_string(),
        "GEMINI_API_KEY".to_string(),
    ]
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            allowed_keys: d_allowed_keys(),
        }
    }
}
