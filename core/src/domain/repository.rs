// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Store Interfaces
//!
//! Persistence contracts for machines, bindings and credential resolution,
//! defined here and implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Purpose | Implementations |
//! |-------|---------|----------------|
//! | `DomainStore` | Opens transactional sessions | `InMemoryMachineStore`, `PostgresMachineStore` |
//! | `StoreSession` | Machine/binding operations inside one transaction | per store |
//! | `TokenDirectory` | Read-only view of the token subsystem | `InMemoryTokenDirectory`, `PostgresTokenDirectory` |
//!
//! ## Session Lifecycle
//!
//! A session is owned by exactly one request. It ends with either
//! `commit` or `rollback`, and is then consumed by `release`. Because
//! `release` takes the boxed session by value, a session cannot be released
//! twice; the pipeline's guard also releases it on drop, so a cancelled
//! request cannot leak it.

use async_trait::async_trait;
use std::net::IpAddr;

use crate::domain::machine::{Binding, BindingFilter, BindingOptions, CredentialItem, Machine, NewMachine};

/// Storage backend selection.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
}

/// Opens request-scoped transactional sessions.
#[async_trait]
pub trait DomainStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreSession>, DomainError>;
}

/// One transaction against the machine store.
#[async_trait]
pub trait StoreSession: Send {
    /// Register a machine. Fails with `Conflict` if the name is taken.
    async fn create_machine(&mut self, machine: NewMachine) -> Result<Machine, DomainError>;

    /// Delete a machine and its bindings. Returns the number of machines removed.
    async fn delete_machine(&mut self, name: &str) -> Result<u64, DomainError>;

    /// All machines, or only the named one.
    async fn list_machines(&mut self, name: Option<&str>) -> Result<Vec<Machine>, DomainError>;

    /// Bind `serial` to `machine` for `application`. Re-adding an existing
    /// triple replaces its options and returns the existing binding.
    async fn add_binding(
        &mut self,
        machine: &str,
        serial: &str,
        application: &str,
        options: BindingOptions,
    ) -> Result<Binding, DomainError>;

    /// Returns the number of bindings removed.
    async fn remove_binding(
        &mut self,
        machine: &str,
        serial: &str,
        application: &str,
    ) -> Result<u64, DomainError>;

    async fn list_bindings(&mut self, filter: &BindingFilter) -> Result<Vec<Binding>, DomainError>;

    /// Authentication items for a machine. When `machine` is `None` the
    /// machine is identified by `client_ip`.
    async fn resolve_application_credentials(
        &mut self,
        machine: Option<&str>,
        application: Option<&str>,
        client_ip: IpAddr,
    ) -> Result<Vec<CredentialItem>, DomainError>;

    async fn commit(&mut self) -> Result<(), DomainError>;

    async fn rollback(&mut self) -> Result<(), DomainError>;

    /// Return the underlying resource. Uncommitted work is discarded.
    fn release(self: Box<Self>);
}

/// Read-only view of token records owned by the token subsystem.
#[async_trait]
pub trait TokenDirectory: Send + Sync {
    async fn token_type(&self, serial: &str) -> Result<Option<String>, DomainError>;

    async fn token_realms(&self, serial: &str) -> Result<Vec<String>, DomainError>;
}

/// Store errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("session already finished")]
    SessionClosed,
}

impl DomainError {
    /// Numeric code carried by failure envelopes.
    pub fn code(&self) -> i32 {
        match self {
            DomainError::NotFound(_) => 601,
            DomainError::Conflict(_) => 602,
            DomainError::Storage(_) | DomainError::SessionClosed => -311,
        }
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DomainError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db)
                if db.is_unique_violation() || db.is_foreign_key_violation() =>
            {
                DomainError::Conflict(db.message().to_string())
            }
            _ => DomainError::Storage(err.to_string()),
        }
    }
}
