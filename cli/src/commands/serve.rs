// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Serve Command
//!
//! Loads and validates the configuration, wires the storage backend, token
//! directory, audit sink, policy engine and identity resolver into one
//! [`RequestLifecycle`], and serves it over HTTP until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use clap::Args;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use machine_api_core::application::RequestLifecycle;
use machine_api_core::domain::audit::AuditSink;
use machine_api_core::domain::repository::{DomainStore, StorageBackend, TokenDirectory};
use machine_api_core::domain::service_config::ServiceConfig;
use machine_api_core::infrastructure::db::Database;
use machine_api_core::infrastructure::repositories::{
    InMemoryMachineStore, InMemoryTokenDirectory, PostgresMachineStore, PostgresTokenDirectory,
};
use machine_api_core::infrastructure::{
    JwtIdentityResolver, PostgresAuditSink, RulePolicyEngine, TracingAuditSink,
};
use machine_api_core::presentation::api::app;

#[derive(Args)]
pub struct ServeCommand {
    /// Override spec.server.port
    #[arg(long, env = "MACHINE_API_PORT")]
    port: Option<u16>,

    /// Override spec.server.bind_address
    #[arg(long, env = "MACHINE_API_HOST")]
    host: Option<String>,
}

struct Backends {
    store: Arc<dyn DomainStore>,
    tokens: Arc<dyn TokenDirectory>,
    audit: Arc<dyn AuditSink>,
}

pub async fn execute(cmd: ServeCommand, mut config: ServiceConfig) -> Result<()> {
    if let Some(port) = cmd.port {
        config.spec.server.port = port;
    }
    if let Some(host) = cmd.host {
        config.spec.server.bind_address = host;
    }
    config.validate().context("Configuration validation failed")?;
    let config = Arc::new(config);

    info!("Starting machine API instance '{}'", config.metadata.name);

    install_metrics_exporter(&config)?;

    let backends = build_backends(&config).await?;

    let identity = JwtIdentityResolver::new(
        &config.jwt_secret().context("Failed to resolve JWT secret")?,
        config.spec.auth.issuer.clone(),
        config.spec.auth.require_session,
    )?;

    if config.spec.policies.is_empty() {
        warn!("No policies configured; every authenticated caller may run every action");
    }

    let lifecycle = Arc::new(RequestLifecycle::new(
        config.clone(),
        Arc::new(identity),
        Arc::new(RulePolicyEngine::new()),
        backends.store,
        backends.tokens,
        backends.audit,
    ));

    let addr = format!("{}:{}", config.spec.server.bind_address, config.spec.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Machine API listening on {}", addr);

    axum::serve(
        listener,
        app(lifecycle).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server failed")?;

    info!("Machine API shutting down");

    Ok(())
}

async fn build_backends(config: &ServiceConfig) -> Result<Backends> {
    match config.storage_backend()? {
        StorageBackend::InMemory => {
            info!("Using in-memory storage ({} seeded tokens)", config.spec.tokens.len());
            let tokens = Arc::new(InMemoryTokenDirectory::from_seeds(&config.spec.tokens));
            let store = InMemoryMachineStore::new().with_token_directory(tokens.clone());
            Ok(Backends {
                store: Arc::new(store),
                tokens,
                audit: Arc::new(TracingAuditSink::new()),
            })
        }
        StorageBackend::PostgreSQL(pg) => {
            info!("Connecting to PostgreSQL (max {} connections)", pg.max_connections);
            let db = Database::new(&pg)
                .await
                .context("Failed to connect to database")?;
            let pool = db.get_pool().clone();

            let audit: Arc<dyn AuditSink> = match config.audit_pool()? {
                Some(audit_pg) => {
                    info!(
                        "Connecting audit sink to PostgreSQL (max {} connections)",
                        audit_pg.max_connections
                    );
                    let audit_db = Database::new(&audit_pg)
                        .await
                        .context("Failed to connect audit sink to database")?;
                    Arc::new(PostgresAuditSink::new(audit_db.get_pool().clone()))
                }
                None => Arc::new(TracingAuditSink::new()),
            };

            Ok(Backends {
                store: Arc::new(PostgresMachineStore::new(pool.clone())),
                tokens: Arc::new(PostgresTokenDirectory::new(pool)),
                audit,
            })
        }
    }
}

fn install_metrics_exporter(config: &ServiceConfig) -> Result<()> {
    let Some(metrics) = config
        .spec
        .observability
        .as_ref()
        .and_then(|o| o.metrics.as_ref())
        .filter(|m| m.enabled)
    else {
        return Ok(());
    };

    let addr: SocketAddr = format!("{}:{}", config.spec.server.bind_address, metrics.port)
        .parse()
        .context("Invalid metrics listen address")?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Prometheus metrics exposed on {}", addr);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
