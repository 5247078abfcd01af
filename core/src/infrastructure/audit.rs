// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Audit Sinks
//!
//! - [`TracingAuditSink`] writes each record as a structured event on the
//!   `audit` tracing target. Suitable for development and for deployments
//!   that ship logs to an external store.
//! - [`PostgresAuditSink`] inserts into the `audit_log` table through the
//!   pool, outside the request's domain transaction, so a rolled-back
//!   request still leaves its failure entry behind.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use tracing::{info, warn};

use crate::domain::audit::{AuditError, AuditRecord, AuditSink};

pub const AUDIT_TARGET: &str = "audit";

#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        if record.success {
            info!(
                target: AUDIT_TARGET,
                request_id = %record.request_id,
                action = %record.action,
                administrator = %record.administrator,
                client = %record.client,
                serial = record.serial.as_deref().unwrap_or(""),
                token_type = record.token_type.as_deref().unwrap_or(""),
                "machine/{} succeeded",
                record.action
            );
        } else {
            warn!(
                target: AUDIT_TARGET,
                request_id = %record.request_id,
                action = %record.action,
                administrator = %record.administrator,
                client = %record.client,
                serial = record.serial.as_deref().unwrap_or(""),
                token_type = record.token_type.as_deref().unwrap_or(""),
                info = %record.info,
                "machine/{} failed",
                record.action
            );
        }
        Ok(())
    }
}

pub struct PostgresAuditSink {
    pool: PgPool,
}

impl PostgresAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (
                request_id, logged_at, action, success, caller, client,
                administrator, serial, token_type, info
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.request_id)
        .bind(record.timestamp)
        .bind(record.action.as_str())
        .bind(record.success)
        .bind(&record.caller)
        .bind(record.client.to_string())
        .bind(&record.administrator)
        .bind(&record.serial)
        .bind(&record.token_type)
        .bind(&record.info)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
