// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Machine Store
//!
//! Each session owns one database transaction. Dropping an unfinished
//! transaction rolls it back and returns the connection to the pool.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::net::IpAddr;

use crate::domain::machine::{
    Binding, BindingFilter, BindingOptions, CredentialItem, Machine, NewMachine,
};
use crate::domain::repository::{DomainError, DomainStore, StoreSession};

pub struct PostgresMachineStore {
    pool: PgPool,
}

impl PostgresMachineStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DomainStore for PostgresMachineStore {
    async fn begin(&self) -> Result<Box<dyn StoreSession>, DomainError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSession { tx: Some(tx) }))
    }
}

pub struct PgSession {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSession {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, DomainError> {
        self.tx.as_mut().ok_or(DomainError::SessionClosed)
    }
}

#[async_trait]
impl StoreSession for PgSession {
    async fn create_machine(&mut self, machine: NewMachine) -> Result<Machine, DomainError> {
        let tx = self.tx()?;
        let row = sqlx::query(
            r#"
            INSERT INTO machines (name, ip, description, decommission)
            VALUES ($1, $2, $3, $4)
            RETURNING name, ip, description, decommission
            "#,
        )
        .bind(&machine.name)
        .bind(machine.ip.map(|ip| ip.to_string()))
        .bind(&machine.description)
        .bind(machine.decommission)
        .fetch_one(&mut **tx)
        .await?;

        parse_machine_row(&row)
    }

    async fn delete_machine(&mut self, name: &str) -> Result<u64, DomainError> {
        let tx = self.tx()?;
        // machine_tokens rows go with the machine (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM machines WHERE name = $1")
            .bind(name)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_machines(&mut self, name: Option<&str>) -> Result<Vec<Machine>, DomainError> {
        let tx = self.tx()?;
        let rows = sqlx::query(
            r#"
            SELECT name, ip, description, decommission
            FROM machines
            WHERE ($1::text IS NULL OR name = $1)
            ORDER BY name
            "#,
        )
        .bind(name)
        .fetch_all(&mut **tx)
        .await?;

        rows.iter().map(parse_machine_row).collect()
    }

    async fn add_binding(
        &mut self,
        machine: &str,
        serial: &str,
        application: &str,
        options: BindingOptions,
    ) -> Result<Binding, DomainError> {
        let tx = self.tx()?;

        let exists = sqlx::query("SELECT 1 FROM machines WHERE name = $1")
            .bind(machine)
            .fetch_optional(&mut **tx)
            .await?;
        if exists.is_none() {
            return Err(DomainError::NotFound(format!("machine '{}'", machine)));
        }

        let known = sqlx::query("SELECT 1 FROM tokens WHERE serial = $1")
            .bind(serial)
            .fetch_optional(&mut **tx)
            .await?;
        if known.is_none() {
            return Err(DomainError::NotFound(format!("token '{}'", serial)));
        }

        let options_json =
            serde_json::to_value(&options).map_err(|e| DomainError::Storage(e.to_string()))?;

        let row = sqlx::query(
            r#"
            INSERT INTO machine_tokens (machine_name, serial, application, options)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (machine_name, serial, application)
            DO UPDATE SET options = EXCLUDED.options
            RETURNING id, machine_name, serial, application, options
            "#,
        )
        .bind(machine)
        .bind(serial)
        .bind(application)
        .bind(options_json)
        .fetch_one(&mut **tx)
        .await?;

        parse_binding_row(&row)
    }

    async fn remove_binding(
        &mut self,
        machine: &str,
        serial: &str,
        application: &str,
    ) -> Result<u64, DomainError> {
        let tx = self.tx()?;
        let result = sqlx::query(
            "DELETE FROM machine_tokens WHERE machine_name = $1 AND serial = $2 AND application = $3",
        )
        .bind(machine)
        .bind(serial)
        .bind(application)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_bindings(&mut self, filter: &BindingFilter) -> Result<Vec<Binding>, DomainError> {
        let tx = self.tx()?;
        let rows = sqlx::query(
            r#"
            SELECT id, machine_name, serial, application, options
            FROM machine_tokens
            WHERE ($1::text IS NULL OR machine_name = $1)
              AND ($2::text IS NULL OR serial = $2)
              AND ($3::text IS NULL OR application = $3)
            ORDER BY id
            "#,
        )
        .bind(filter.machine.as_deref())
        .bind(filter.serial.as_deref())
        .bind(filter.application.as_deref())
        .fetch_all(&mut **tx)
        .await?;

        rows.iter().map(parse_binding_row).collect()
    }

    async fn resolve_application_credentials(
        &mut self,
        machine: Option<&str>,
        application: Option<&str>,
        client_ip: IpAddr,
    ) -> Result<Vec<CredentialItem>, DomainError> {
        let tx = self.tx()?;

        let target = sqlx::query(
            r#"
            SELECT name, decommission
            FROM machines
            WHERE ($1::text IS NOT NULL AND name = $1)
               OR ($1::text IS NULL AND ip = $2)
            ORDER BY name
            LIMIT 1
            "#,
        )
        .bind(machine)
        .bind(client_ip.to_string())
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| match machine {
            Some(name) => DomainError::NotFound(format!("machine '{}'", name)),
            None => DomainError::NotFound(format!("no machine registered for {}", client_ip)),
        })?;

        let name: String = target.try_get("name")?;
        let decommission: Option<NaiveDate> = target.try_get("decommission")?;
        if decommission.is_some_and(|date| date < chrono::Utc::now().date_naive()) {
            return Ok(vec![]);
        }

        let rows = sqlx::query(
            r#"
            SELECT id, machine_name, serial, application, options
            FROM machine_tokens
            WHERE machine_name = $1
              AND ($2::text IS NULL OR application = $2)
            ORDER BY id
            "#,
        )
        .bind(&name)
        .bind(application)
        .fetch_all(&mut **tx)
        .await?;

        rows.iter()
            .map(|row| {
                let binding = parse_binding_row(row)?;
                let auth_item: serde_json::Value = row.try_get("options")?;
                Ok(CredentialItem {
                    machine: binding.machine,
                    serial: binding.serial,
                    application: binding.application,
                    auth_item,
                })
            })
            .collect()
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        let tx = self.tx.take().ok_or(DomainError::SessionClosed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        let tx = self.tx.take().ok_or(DomainError::SessionClosed)?;
        tx.rollback().await?;
        Ok(())
    }

    fn release(self: Box<Self>) {
        if self.tx.is_some() {
            tracing::debug!("Releasing unfinished transaction; it will be rolled back");
        }
        drop(self);
    }
}

fn parse_machine_row(row: &PgRow) -> Result<Machine, DomainError> {
    let ip: Option<String> = row.try_get("ip")?;
    let ip = ip
        .map(|raw| {
            raw.parse::<IpAddr>()
                .map_err(|e| DomainError::Storage(format!("invalid stored ip '{}': {}", raw, e)))
        })
        .transpose()?;

    Ok(Machine {
        name: row.try_get("name")?,
        ip,
        description: row.try_get("description")?,
        decommission: row.try_get("decommission")?,
    })
}

fn parse_binding_row(row: &PgRow) -> Result<Binding, DomainError> {
    let options: serde_json::Value = row.try_get("options")?;
    let options: BindingOptions = serde_json::from_value(options)
        .map_err(|e| DomainError::Storage(format!("invalid binding options: {}", e)))?;

    Ok(Binding {
        id: row.try_get("id")?,
        machine: row.try_get("machine_name")?,
        serial: row.try_get("serial")?,
        application: row.try_get("application")?,
        options,
    })
}
