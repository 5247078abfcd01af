// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Audit Records
//!
//! One [`AuditRecord`] is appended per handled request, after the handler
//! ran and before the transaction is committed. A failed append rolls the
//! request back: no durable effect may exist without its audit entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;
use uuid::Uuid;

use super::action::Action;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: Action,
    pub success: bool,
    /// Authenticated login of the caller.
    pub caller: String,
    pub client: IpAddr,
    /// Display identity of the acting administrator (`login@realm`).
    pub administrator: String,
    pub serial: Option<String>,
    pub token_type: Option<String>,
    /// Failure message, empty on success.
    pub info: String,
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("audit write failed: {0}")]
    Write(String),
}

impl From<sqlx::Error> for AuditError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                AuditError::Unavailable(err.to_string())
            }
            other => AuditError::Write(other.to_string()),
        }
    }
}

/// Durable, append-only log of administrative actions.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError>;
}
