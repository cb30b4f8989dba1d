//! Command-line surface: `serve` (default), `doctor`, `version`.

use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "am-worker", version, about = "agentmesh worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register with the control plane and start serving agents (default).
    Serve,
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Print version information.
    Version,
}

/// Load config from `AM_WORKER_CONFIG` (default `worker.toml`), then
/// overlay `AM_WORKER_*` environment variables.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("AM_WORKER_CONFIG").unwrap_or_else(|_| "worker.toml".into());

    let mut config: Config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path).map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        Config::default()
    };
    config.apply_env_overrides();

    Ok((config, config_path))
}

pub mod doctor {
    use super::Config;
    use am_domain::config::ConfigSeverity;

    pub async fn run(config: &Config, config_path: &str) -> anyhow::Result<bool> {
        println!("am-worker doctor");
        println!("=================\n");

        let mut all_passed = true;

        let exists = std::path::Path::new(config_path).exists();
        print_check(
            "Config file exists",
            exists,
            if exists {
                config_path.to_owned()
            } else {
                format!("{config_path} not found (using defaults)")
            },
        );

        let issues = config.validate();
        let error_count = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).count();
        if issues.is_empty() {
            print_check("Config validation", true, "no issues".into());
        } else {
            print_check(
                "Config validation",
                error_count == 0,
                format!("{} issue(s) ({} error(s))", issues.len(), error_count),
            );
            for issue in &issues {
                println!("      {issue}");
            }
            if error_count > 0 {
                all_passed = false;
            }
        }

        let client = reqwest::Client::new();
        let url = format!("{}/health", config.control_plane_url.trim_end_matches('/'));
        let reachable = match client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                println!("      {e}");
                false
            }
        };
        print_check("Control plane reachable", reachable, config.control_plane_url.clone());
        if !reachable {
            all_passed = false;
        }

        println!();
        if all_passed {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. Review the output above.");
        }

        Ok(all_passed)
    }

    fn print_check(name: &str, passed: bool, detail: String) {
        let mark = if passed { "ok" } else { "FAIL" };
        println!("  [{mark}] {name}: {detail}");
    }
}
