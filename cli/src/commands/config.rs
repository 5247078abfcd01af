// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use machine_api_core::domain::service_config::{ServiceConfig, StorageKind, CONFIG_PATH_ENV};

const REDACTED: &str = "********";

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./machine-api.yaml)
        #[arg(short, long, default_value = "./machine-api.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = ServiceConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./machine-api.yaml");
        println!("  4. ~/.machine-api/config.yaml");
        println!("  5. /etc/machine-api/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Instance:".bold());
    println!("  Name: {}", config.metadata.name);
    println!(
        "  Listen: {}:{}",
        config.spec.server.bind_address, config.spec.server.port
    );
    println!("  Trust X-Forwarded-For: {}", config.spec.server.trust_forwarded_for);
    println!();

    println!("{}", "Authentication:".bold());
    println!("  JWT secret: {}", describe_secret(&config.spec.auth.jwt_secret));
    println!(
        "  Issuer: {}",
        config.spec.auth.issuer.as_deref().unwrap_or("(any)")
    );
    println!("  Require session: {}", config.spec.auth.require_session);
    println!();

    println!("{}", "Storage:".bold());
    match config.spec.storage.backend {
        StorageKind::Memory => println!("  Backend: memory ({} seeded tokens)", config.spec.tokens.len()),
        StorageKind::Postgres => {
            println!("  Backend: postgres");
            println!(
                "  Connection: {}",
                config
                    .spec
                    .storage
                    .connection_string
                    .as_deref()
                    .map(describe_secret)
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!("  Max connections: {}", config.spec.storage.max_connections);
        }
    }
    println!("  Audit sink: {:?}", config.spec.audit.sink);
    println!();

    println!("{}", "Policies:".bold());
    if config.spec.policies.is_empty() {
        println!("  {}", "(none - all actions allowed)".yellow());
    }
    for rule in &config.spec.policies {
        let state = if rule.active { "" } else { " [inactive]" };
        println!("  {}{}", rule.name.bold(), state);
        println!("    Actions: {}", rule.actions.join(", "));
        println!("    Users: {}", rule.users.join(", "));
        println!("    Clients: {}", rule.clients.join(", "));
        if !rule.realms.is_empty() {
            println!("    Realms: {}", rule.realms.join(", "));
        }
    }
    println!();

    Ok(())
}

/// `env:` references are shown as-is; literal secrets are masked.
fn describe_secret(value: &str) -> String {
    if value.starts_with("env:") {
        value.to_string()
    } else {
        REDACTED.to_string()
    }
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = ServiceConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
