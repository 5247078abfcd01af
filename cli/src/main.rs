// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Machine API CLI
//!
//! The `machine-api` binary serves the machine management API and
//! administers its configuration and database.
//!
//! ## Commands
//!
//! - `machine-api serve` - Run the HTTP API
//! - `machine-api config show|validate|generate` - Configuration management
//! - `machine-api update` - Apply database migrations

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;

use machine_api::commands::{self, ConfigCommand, ServeCommand, UpdateCommand};
use machine_api_core::domain::service_config::{ServiceConfig, CONFIG_PATH_ENV};

/// Machine API - policy-gated management of client machines and token bindings
#[derive(Parser)]
#[command(name = "machine-api")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = CONFIG_PATH_ENV, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true, env = "MACHINE_API_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true, env = "MACHINE_API_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    #[command(name = "serve")]
    Serve {
        #[command(flatten)]
        command: ServeCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Apply pending database migrations
    #[command(name = "update")]
    Update {
        #[command(flatten)]
        command: UpdateCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is not an error
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Loaded once, before logging, so its observability section can
    // configure the subscriber. Errors are reported after init.
    let loaded = ServiceConfig::load_or_default(cli.config.clone());

    let (level, format) = logging_settings(&cli, loaded.as_ref().ok());
    init_logging(&level, &format)?;

    match cli.command {
        Commands::Serve { command } => {
            let config = loaded.context("Failed to load configuration")?;
            commands::serve::execute(command, config).await
        }
        Commands::Config { command } => {
            // config show/validate reload and report the error themselves
            if let Err(e) = &loaded {
                warn!("Configuration could not be loaded: {:#}", e);
            }
            commands::config::handle_command(command, cli.config).await
        }
        Commands::Update { command } => {
            let config = loaded.context("Failed to load configuration")?;
            commands::update::execute(command, config).await
        }
    }
}

/// Flags win over the config file's `observability.logging` section.
fn logging_settings(cli: &Cli, config: Option<&ServiceConfig>) -> (String, String) {
    let configured = config
        .and_then(|c| c.spec.observability.as_ref())
        .and_then(|o| o.logging.clone());

    let level = cli
        .log_level
        .clone()
        .or_else(|| configured.as_ref().map(|l| l.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let format = cli
        .log_format
        .clone()
        .or_else(|| configured.map(|l| l.format))
        .unwrap_or_else(|| "text".to_string());
    (level, format)
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        "json" => builder.json().init(),
        "text" => builder.compact().init(),
        other => anyhow::bail!("Unknown log format '{}' (expected 'text' or 'json')", other),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use machine_api_core::domain::service_config::{LoggingConfig, ObservabilityConfig};

    fn config_with_logging(level: &str, format: &str) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.spec.observability = Some(ObservabilityConfig {
            logging: Some(LoggingConfig {
                level: level.to_string(),
                format: format.to_string(),
            }),
            metrics: None,
        });
        config
    }

    #[test]
    fn test_logging_settings_precedence() {
        let config = config_with_logging("debug", "json");

        let cli = Cli::parse_from(["machine-api", "config", "show"]);
        assert_eq!(
            logging_settings(&cli, Some(&config)),
            ("debug".to_string(), "json".to_string())
        );

        let cli = Cli::parse_from(["machine-api", "--log-level", "warn", "config", "show"]);
        assert_eq!(
            logging_settings(&cli, Some(&config)),
            ("warn".to_string(), "json".to_string())
        );
    }

    #[test]
    fn test_logging_settings_without_config() {
        let cli = Cli::parse_from(["machine-api", "config", "show"]);
        assert_eq!(
            logging_settings(&cli, None),
            ("info".to_string(), "text".to_string())
        );
    }
}
