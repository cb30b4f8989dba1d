//! Worker configuration (§6): CLI flags falling back to environment
//! variables falling back to the documented defaults.

use am_domain::config::{validate_server, ConfigError, ConfigSeverity, ServerConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "d_control_plane_url")]
    pub control_plane_url: String,
    #[serde(default)]
    pub worker_name: Option<String>,
    #[serde(default)]
    pub worker_address: Option<String>,
    #[serde(default = "d_max_concurrent_agents")]
    pub max_concurrent_agents: u32,
    #[serde(default = "d_capabilities")]
    pub capabilities: Vec<String>,
    #[serde(default = "d_heartbeat_interval_sec")]
    pub heartbeat_interval_sec: u64,
    #[serde(default = "d_llm_base_url")]
    pub llm_base_url: String,
    #[serde(default = "d_llm_model")]
    pub llm_model: String,
    #[serde(default = "d_credential_key_name")]
    pub credential_key_name: String,
    #[serde(default = "d_max_turns")]
    pub max_turns: u32,
    #[serde(default = "d_max_iterations")]
    pub max_iterations: u32,
}

fn d_control_plane_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn d_max_concurrent_agents() -> u32 {
    1024
}

fn d_capabilities() -> Vec<String> {
    vec!["git".to_string(), "claude-code".to_string()]
}

fn d_heartbeat_interval_sec() -> u64 {
    30
}

fn d_llm_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn d_llm_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn d_credential_key_name() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn d_max_turns() -> u32 {
    10
}

fn d_max_iterations() -> u32 {
    200
}

fn d_local_port() -> u16 {
    8100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: d_local_port(),
                ..ServerConfig::default()
            },
            control_plane_url: d_control_plane_url(),
            worker_name: None,
            worker_address: None,
            max_concurrent_agents: d_max_concurrent_agents(),
            capabilities: d_capabilities(),
            heartbeat_interval_sec: d_heartbeat_interval_sec(),
            llm_base_url: d_llm_base_url(),
            llm_model: d_llm_model(),
            credential_key_name: d_credential_key_name(),
            max_turns: d_max_turns(),
            max_iterations: d_max_iterations(),
        }
    }
}

impl Config {
    /// Overlay `AM_WORKER_*` environment variables on top of whatever
    /// was loaded from a config file, per §6's "CLI flags with
    /// fallbacks to environment variables" rule.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("AM_WORKER_CONTROL_PLANE_URL") {
            self.control_plane_url = v;
        }
        if let Ok(v) = std::env::var("AM_WORKER_NAME") {
            self.worker_name = Some(v);
        }
        if let Ok(v) = std::env::var("AM_WORKER_ADDRESS") {
            self.worker_address = Some(v);
        }
        if let Ok(v) = std::env::var("AM_WORKER_MAX_CONCURRENT_AGENTS").ok().and_then(|s| s.parse().ok()) {
            self.max_concurrent_agents = v;
        }
        if let Ok(v) = std::env::var("AM_WORKER_PORT").ok().and_then(|s| s.parse().ok()) {
            self.server.port = v;
        }
        if let Ok(v) = std::env::var("AM_WORKER_HEARTBEAT_INTERVAL_SEC")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.heartbeat_interval_sec = v;
        }
        if let Ok(v) = std::env::var("AM_WORKER_LLM_BASE_URL") {
            self.llm_base_url = v;
        }
        if let Ok(v) = std::env::var("AM_WORKER_LLM_MODEL") {
            self.llm_model = v;
        }
    }

    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = validate_server(&self.server);
        if self.control_plane_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "control_plane_url".into(),
                message: "control_plane_url must not be empty".into(),
            });
        }
        if self.max_concurrent_agents == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "max_concurrent_agents".into(),
                message: "max_concurrent_agents is zero; this worker will never accept a launch".into(),
            });
        }
        errors
    }

    pub fn hostname() -> String {
        hostname_or_fallback()
    }
}

fn hostname_or_fallback() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "worker".to_string())
}
