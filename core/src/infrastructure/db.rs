// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Pool
//!
//! Wraps `sqlx::postgres::PgPool` in a thin `Database` newtype. The machine
//! store and the token directory share one pool; the postgres audit sink
//! gets its own, since it appends while a store transaction is open.

use anyhow::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::domain::repository::PostgresConfig;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(config: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}
