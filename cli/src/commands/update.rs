// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Database Update Command
//!
//! Implements `machine-api update`: applies the schema migrations shipped in
//! `cli/migrations` to the configured PostgreSQL database.
//!
//! # Usage
//!
//! ```bash
//! # Apply all pending migrations
//! machine-api update
//!
//! # Preview migrations without applying
//! machine-api update --dry-run
//! ```
//!
//! # Environment
//!
//! Uses `MACHINE_API_DATABASE_URL` when set, otherwise the configured
//! `spec.storage.connection_string`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use sqlx::postgres::PgPoolOptions;

use machine_api_core::domain::repository::StorageBackend;
use machine_api_core::domain::service_config::{ServiceConfig, DATABASE_URL_ENV};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Args)]
pub struct UpdateCommand {
    /// Perform a dry run without applying changes
    #[arg(long)]
    dry_run: bool,
}

/// `config` comes from `load_or_default`, which applies the
/// `DATABASE_URL_ENV` override.
fn database_url(config: &ServiceConfig) -> Result<String> {
    match config.storage_backend()? {
        StorageBackend::PostgreSQL(pg) => Ok(pg.connection_string),
        StorageBackend::InMemory => anyhow::bail!(
            "No database configured. Set {} or use the postgres storage backend.",
            DATABASE_URL_ENV
        ),
    }
}

pub async fn execute(cmd: UpdateCommand, config: ServiceConfig) -> Result<()> {
    println!("{}", "Machine API Update".bold().green());

    let database_url = database_url(&config)?;

    println!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .context("Failed to connect to database")?;

    let applied_count = sqlx::query("SELECT version FROM _sqlx_migrations")
        .fetch_all(&pool)
        .await
        .map(|rows| rows.len())
        .unwrap_or(0);

    let total_migrations = MIGRATOR.iter().count();

    println!(
        "Migration status: {} applied, {} total available.",
        applied_count, total_migrations
    );

    if applied_count >= total_migrations {
        println!("{}", "✓ Database is up to date.".green());
        return Ok(());
    }

    if cmd.dry_run {
        println!("Pending migrations found (Dry Run):");
        for migration in MIGRATOR.iter().skip(applied_count) {
            println!(" - {} {}", migration.version, migration.description);
        }
        println!("Skipping application due to --dry-run");
        return Ok(());
    }

    println!("Applying pending migrations...");
    MIGRATOR.run(&pool).await.context("Failed to apply migrations")?;
    println!("{}", "✓ Database updated successfully.".green());

    Ok(())
}
