// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Store Implementations
//!
//! Infrastructure implementations of the store contracts defined in
//! `crate::domain::repository`.
//!
//! ## PostgreSQL
//! - **PostgresMachineStore** - one database transaction per session
//! - **PostgresTokenDirectory** - reads the token subsystem's tables
//!
//! ## In-Memory
//! - **InMemoryMachineStore** - serialized sessions over a working copy
//! - **InMemoryTokenDirectory** - token records seeded from configuration

pub mod postgres_machine;
pub mod postgres_token_directory;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::machine::{
    Binding, BindingFilter, BindingOptions, CredentialItem, Machine, NewMachine,
};
use crate::domain::repository::{DomainError, DomainStore, StoreSession, TokenDirectory};
use crate::domain::service_config::TokenSeed;

pub use postgres_machine::PostgresMachineStore;
pub use postgres_token_directory::PostgresTokenDirectory;

#[derive(Debug, Clone, Default)]
struct MachineState {
    machines: BTreeMap<String, Machine>,
    bindings: Vec<Binding>,
    next_binding_id: i64,
}

/// Machine store held in process memory.
///
/// Sessions are serialized: `begin` waits for the previous session to be
/// released. Each session mutates a private copy which replaces the shared
/// state on commit.
#[derive(Clone)]
pub struct InMemoryMachineStore {
    state: Arc<Mutex<MachineState>>,
    tokens: Option<Arc<dyn TokenDirectory>>,
}

impl InMemoryMachineStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MachineState::default())),
            tokens: None,
        }
    }

    /// Reject bindings for serials the directory does not know.
    pub fn with_token_directory(mut self, tokens: Arc<dyn TokenDirectory>) -> Self {
        self.tokens = Some(tokens);
        self
    }
}

impl Default for InMemoryMachineStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DomainStore for InMemoryMachineStore {
    async fn begin(&self) -> Result<Box<dyn StoreSession>, DomainError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemorySession {
            guard,
            working,
            tokens: self.tokens.clone(),
            finished: false,
        }))
    }
}

pub struct InMemorySession {
    guard: OwnedMutexGuard<MachineState>,
    working: MachineState,
    tokens: Option<Arc<dyn TokenDirectory>>,
    finished: bool,
}

impl InMemorySession {
    fn state(&mut self) -> Result<&mut MachineState, DomainError> {
        if self.finished {
            return Err(DomainError::SessionClosed);
        }
        Ok(&mut self.working)
    }
}

#[async_trait]
impl StoreSession for InMemorySession {
    async fn create_machine(&mut self, machine: NewMachine) -> Result<Machine, DomainError> {
        let state = self.state()?;
        if state.machines.contains_key(&machine.name) {
            return Err(DomainError::Conflict(format!(
                "machine '{}' already exists",
                machine.name
            )));
        }
        let machine: Machine = machine.into();
        state.machines.insert(machine.name.clone(), machine.clone());
        Ok(machine)
    }

    async fn delete_machine(&mut self, name: &str) -> Result<u64, DomainError> {
        let state = self.state()?;
        if state.machines.remove(name).is_none() {
            return Ok(0);
        }
        state.bindings.retain(|b| b.machine != name);
        Ok(1)
    }

    async fn list_machines(&mut self, name: Option<&str>) -> Result<Vec<Machine>, DomainError> {
        let state = self.state()?;
        Ok(state
            .machines
            .values()
            .filter(|m| name.map_or(true, |n| n == m.name))
            .cloned()
            .collect())
    }

    async fn add_binding(
        &mut self,
        machine: &str,
        serial: &str,
        application: &str,
        options: BindingOptions,
    ) -> Result<Binding, DomainError> {
        if let Some(tokens) = &self.tokens {
            if tokens.token_type(serial).await?.is_none() {
                return Err(DomainError::NotFound(format!("token '{}'", serial)));
            }
        }

        let state = self.state()?;
        if !state.machines.contains_key(machine) {
            return Err(DomainError::NotFound(format!("machine '{}'", machine)));
        }

        if let Some(existing) = state
            .bindings
            .iter_mut()
            .find(|b| b.machine == machine && b.serial == serial && b.application == application)
        {
            existing.options = options;
            return Ok(existing.clone());
        }

        state.next_binding_id += 1;
        let binding = Binding {
            id: state.next_binding_id,
            machine: machine.to_string(),
            serial: serial.to_string(),
            application: application.to_string(),
            options,
        };
        state.bindings.push(binding.clone());
        Ok(binding)
    }

    async fn remove_binding(
        &mut self,
        machine: &str,
        serial: &str,
        application: &str,
    ) -> Result<u64, DomainError> {
        let state = self.state()?;
        let before = state.bindings.len();
        state
            .bindings
            .retain(|b| !(b.machine == machine && b.serial == serial && b.application == application));
        Ok((before - state.bindings.len()) as u64)
    }

    async fn list_bindings(&mut self, filter: &BindingFilter) -> Result<Vec<Binding>, DomainError> {
        let state = self.state()?;
        Ok(state
            .bindings
            .iter()
            .filter(|b| b.matches(filter))
            .cloned()
            .collect())
    }

    async fn resolve_application_credentials(
        &mut self,
        machine: Option<&str>,
        application: Option<&str>,
        client_ip: IpAddr,
    ) -> Result<Vec<CredentialItem>, DomainError> {
        let state = self.state()?;
        let target = match machine {
            Some(name) => state.machines.get(name),
            None => state.machines.values().find(|m| m.ip == Some(client_ip)),
        }
        .ok_or_else(|| match machine {
            Some(name) => DomainError::NotFound(format!("machine '{}'", name)),
            None => DomainError::NotFound(format!("no machine registered for {}", client_ip)),
        })?;

        if !target.is_active_on(Utc::now().date_naive()) {
            return Ok(vec![]);
        }

        state
            .bindings
            .iter()
            .filter(|b| b.machine == target.name)
            .filter(|b| application.map_or(true, |a| a == b.application))
            .map(|b| {
                Ok(CredentialItem {
                    machine: b.machine.clone(),
                    serial: b.serial.clone(),
                    application: b.application.clone(),
                    auth_item: serde_json::to_value(&b.options)
                        .map_err(|e| DomainError::Storage(e.to_string()))?,
                })
            })
            .collect()
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        if self.finished {
            return Err(DomainError::SessionClosed);
        }
        *self.guard = self.working.clone();
        self.finished = true;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        if self.finished {
            return Err(DomainError::SessionClosed);
        }
        self.finished = true;
        Ok(())
    }

    fn release(self: Box<Self>) {
        // Dropping the guard lets the next session begin.
        drop(self);
    }
}

/// Token records seeded from configuration.
#[derive(Default)]
pub struct InMemoryTokenDirectory {
    tokens: RwLock<HashMap<String, TokenSeed>>,
}

impl InMemoryTokenDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seeds(seeds: &[TokenSeed]) -> Self {
        let directory = Self::new();
        for seed in seeds {
            directory.insert(seed.clone());
        }
        directory
    }

    pub fn insert(&self, seed: TokenSeed) {
        self.tokens.write().insert(seed.serial.clone(), seed);
    }
}

#[async_trait]
impl TokenDirectory for InMemoryTokenDirectory {
    async fn token_type(&self, serial: &str) -> Result<Option<String>, DomainError> {
        Ok(self.tokens.read().get(serial).map(|t| t.token_type.clone()))
    }

    async fn token_realms(&self, serial: &str) -> Result<Vec<String>, DomainError> {
        Ok(self
            .tokens
            .read()
            .get(serial)
            .map(|t| t.realms.clone())
            .unwrap_or_default())
    }
}
