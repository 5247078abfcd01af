// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::repository::{DomainError, TokenDirectory};

/// Read-only access to the token subsystem's `tokens` and `token_realms` tables.
pub struct PostgresTokenDirectory {
    pool: PgPool,
}

impl PostgresTokenDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenDirectory for PostgresTokenDirectory {
    async fn token_type(&self, serial: &str) -> Result<Option<String>, DomainError> {
        let row = sqlx::query("SELECT token_type FROM tokens WHERE serial = $1")
            .bind(serial)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("token_type")?)),
            None => Ok(None),
        }
    }

    async fn token_realms(&self, serial: &str) -> Result<Vec<String>, DomainError> {
        let rows = sqlx::query("SELECT realm FROM token_realms WHERE serial = $1 ORDER BY realm")
            .bind(serial)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("realm").map_err(DomainError::from))
            .collect()
    }
}
