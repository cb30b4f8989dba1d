//! Command-line surface: `serve` (default), `doctor`, `version`.

use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "am-control-plane", version, about = "agentmesh control plane")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the control plane server (default when no subcommand is given).
    Serve,
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Print version information.
    Version,
}

/// Load config from `AM_CONTROL_PLANE_CONFIG` (default `config.toml`), or
/// built-in defaults if the file doesn't exist.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("AM_CONTROL_PLANE_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path).map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        Config::default()
    };

    Ok((config, config_path))
}

pub mod doctor {
    use super::Config;
    use am_domain::config::ConfigSeverity;

    pub async fn run(config: &Config, config_path: &str) -> anyhow::Result<bool> {
        println!("am-control-plane doctor");
        println!("========================\n");

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

        sqlx::any::install_default_drivers();
        let reachable = match sqlx::any::AnyPoolOptions::new()
            .max_connections(1)
            .connect(&config.database.url)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                println!("      {e}");
                false
            }
        };
        print_check("Database reachable", reachable, config.database.url.clone());
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
