// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared stubs for the request pipeline tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Barrier, OwnedSemaphorePermit, Semaphore};

use machine_api_core::application::RequestLifecycle;
use machine_api_core::domain::action::Action;
use machine_api_core::domain::audit::{AuditError, AuditRecord, AuditSink};
use machine_api_core::domain::identity::{AccessError, CallerIdentity, IdentityResolver};
use machine_api_core::domain::machine::{
    Binding, BindingFilter, BindingOptions, CredentialItem, Machine, NewMachine,
};
use machine_api_core::domain::policy::{PolicyContext, PolicyDecision, PolicyDecisionPoint};
use machine_api_core::domain::repository::{
    DomainError, DomainStore, StoreSession, TokenDirectory,
};
use machine_api_core::domain::request::InboundRequest;
use machine_api_core::domain::service_config::{ServiceConfig, TokenSeed};
use machine_api_core::infrastructure::repositories::{InMemoryMachineStore, InMemoryTokenDirectory};
use machine_api_core::infrastructure::RulePolicyEngine;

pub const VALID_CREDENTIAL: &str = "valid-credential";
pub const BAD_SESSION: &str = "stale-session";

/// Accepts exactly one credential; rejects the session `BAD_SESSION`.
pub struct StubIdentity;

impl IdentityResolver for StubIdentity {
    fn resolve(&self, request: &InboundRequest) -> Result<CallerIdentity, AccessError> {
        match request.credential.as_deref() {
            Some(VALID_CREDENTIAL) => Ok(CallerIdentity::new("admin").with_realm("corp")),
            Some(_) => Err(AccessError::Unauthenticated("bad credential".to_string())),
            None => Err(AccessError::Unauthenticated("no credential".to_string())),
        }
    }

    fn check_identity(
        &self,
        _caller: &CallerIdentity,
        request: &InboundRequest,
    ) -> Result<(), AccessError> {
        match request.session.as_deref() {
            Some(BAD_SESSION) => Err(AccessError::Unauthorized("session expired".to_string())),
            _ => Ok(()),
        }
    }
}

pub struct DenyAll;

impl PolicyDecisionPoint for DenyAll {
    fn evaluate(&self, _ctx: &PolicyContext, scope: &str, action: Action) -> PolicyDecision {
        PolicyDecision::Deny {
            reason: format!("no rights for {}/{}", scope, action),
        }
    }
}

#[derive(Default)]
pub struct RecordingAudit {
    pub records: Mutex<Vec<AuditRecord>>,
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

pub struct FailingAudit;

#[async_trait]
impl AuditSink for FailingAudit {
    async fn append(&self, _record: &AuditRecord) -> Result<(), AuditError> {
        Err(AuditError::Unavailable("audit disk full".to_string()))
    }
}

/// Counts session lifecycle events and store calls.
#[derive(Default)]
pub struct Counters {
    pub begun: AtomicUsize,
    pub released: AtomicUsize,
    pub committed: AtomicUsize,
    pub rolled_back: AtomicUsize,
    pub store_calls: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Fixed-size set of connections shared by a store and a token directory,
/// like a `PgPool`. Checkout gives up after a timeout.
#[derive(Clone)]
pub struct ConnectionPool {
    connections: Arc<Semaphore>,
    size: usize,
}

impl ConnectionPool {
    pub fn new(size: usize) -> Self {
        Self {
            connections: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, DomainError> {
        tokio::time::timeout(Duration::from_secs(2), self.connections.clone().acquire_owned())
            .await
            .map_err(|_| {
                DomainError::Storage(
                    "pool timed out while waiting for an open connection".to_string(),
                )
            })?
            .map_err(|_| DomainError::Storage("pool closed".to_string()))
    }
}

/// Connection pool whose `begin` waits until every connection is checked
/// out by a session, so that concurrent requests overlap for certain.
struct SaturatedPool {
    pool: ConnectionPool,
    all_checked_out: Barrier,
}

pub struct TrackingStore {
    inner: InMemoryMachineStore,
    counters: Arc<Counters>,
    pool: Option<Arc<SaturatedPool>>,
    stall: bool,
}

#[async_trait]
impl DomainStore for TrackingStore {
    async fn begin(&self) -> Result<Box<dyn StoreSession>, DomainError> {
        let connection = match &self.pool {
            Some(saturated) => {
                let connection = saturated.pool.acquire().await?;
                saturated.all_checked_out.wait().await;
                Some(connection)
            }
            None => None,
        };
        let inner = self.inner.begin().await?;
        self.counters.begun.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackingSession {
            inner,
            counters: self.counters.clone(),
            stall: self.stall,
            _connection: connection,
        }))
    }
}

struct TrackingSession {
    inner: Box<dyn StoreSession>,
    counters: Arc<Counters>,
    /// Store calls never complete.
    stall: bool,
    _connection: Option<OwnedSemaphorePermit>,
}

impl TrackingSession {
    async fn call(&mut self) {
        self.counters.store_calls.fetch_add(1, Ordering::SeqCst);
        if self.stall {
            std::future::pending::<()>().await;
        }
    }
}

/// Token directory that checks a connection out of `pool` per lookup.
pub struct PooledTokenDirectory {
    inner: InMemoryTokenDirectory,
    pool: ConnectionPool,
}

#[async_trait]
impl TokenDirectory for PooledTokenDirectory {
    async fn token_type(&self, serial: &str) -> Result<Option<String>, DomainError> {
        let _connection = self.pool.acquire().await?;
        self.inner.token_type(serial).await
    }

    async fn token_realms(&self, serial: &str) -> Result<Vec<String>, DomainError> {
        let _connection = self.pool.acquire().await?;
        self.inner.token_realms(serial).await
    }
}

#[async_trait]
impl StoreSession for TrackingSession {
    async fn create_machine(&mut self, machine: NewMachine) -> Result<Machine, DomainError> {
        self.call().await;
        self.inner.create_machine(machine).await
    }

    async fn delete_machine(&mut self, name: &str) -> Result<u64, DomainError> {
        self.call().await;
        self.inner.delete_machine(name).await
    }

    async fn list_machines(&mut self, name: Option<&str>) -> Result<Vec<Machine>, DomainError> {
        self.call().await;
        self.inner.list_machines(name).await
    }

    async fn add_binding(
        &mut self,
        machine: &str,
        serial: &str,
        application: &str,
        options: BindingOptions,
    ) -> Result<Binding, DomainError> {
        self.call().await;
        self.inner.add_binding(machine, serial, application, options).await
    }

    async fn remove_binding(
        &mut self,
        machine: &str,
        serial: &str,
        application: &str,
    ) -> Result<u64, DomainError> {
        self.call().await;
        self.inner.remove_binding(machine, serial, application).await
    }

    async fn list_bindings(&mut self, filter: &BindingFilter) -> Result<Vec<Binding>, DomainError> {
        self.call().await;
        self.inner.list_bindings(filter).await
    }

    async fn resolve_application_credentials(
        &mut self,
        machine: Option<&str>,
        application: Option<&str>,
        client_ip: IpAddr,
    ) -> Result<Vec<CredentialItem>, DomainError> {
        self.call().await;
        self.inner
            .resolve_application_credentials(machine, application, client_ip)
            .await
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        self.counters.committed.fetch_add(1, Ordering::SeqCst);
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        self.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback().await
    }

    fn release(self: Box<Self>) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        self.inner.release();
    }
}

pub fn token_seeds() -> Vec<TokenSeed> {
    vec![
        TokenSeed {
            serial: "SSHK0001".to_string(),
            token_type: "sshkey".to_string(),
            realms: vec!["corp".to_string()],
        },
        TokenSeed {
            serial: "HOTP0002".to_string(),
            token_type: "hotp".to_string(),
            realms: vec!["lab".to_string()],
        },
    ]
}

pub struct Harness {
    pub lifecycle: Arc<RequestLifecycle>,
    pub counters: Arc<Counters>,
    pub audit: Arc<RecordingAudit>,
    pub store: InMemoryMachineStore,
}

pub struct HarnessBuilder {
    config: ServiceConfig,
    policy: Arc<dyn PolicyDecisionPoint>,
    audit: Option<Arc<dyn AuditSink>>,
    store: Option<InMemoryMachineStore>,
    pool: Option<ConnectionPool>,
    stall: bool,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            config: ServiceConfig::default(),
            policy: Arc::new(RulePolicyEngine::new()),
            audit: None,
            store: None,
            pool: None,
            stall: false,
        }
    }

    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn policy(mut self, policy: Arc<dyn PolicyDecisionPoint>) -> Self {
        self.policy = policy;
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Share the machine state of an existing harness.
    pub fn store(mut self, store: InMemoryMachineStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Store sessions and token lookups share a pool of `size` connections.
    /// Exactly `size` requests must be run concurrently.
    pub fn connection_pool(mut self, size: usize) -> Self {
        self.pool = Some(ConnectionPool::new(size));
        self
    }

    /// Every store operation hangs forever.
    pub fn stall_store_calls(mut self) -> Self {
        self.stall = true;
        self
    }

    pub fn build(self) -> Harness {
        let seeded = Arc::new(InMemoryTokenDirectory::from_seeds(&token_seeds()));
        let store = self
            .store
            .unwrap_or_else(|| InMemoryMachineStore::new().with_token_directory(seeded.clone()));
        let tokens: Arc<dyn TokenDirectory> = match &self.pool {
            Some(pool) => Arc::new(PooledTokenDirectory {
                inner: InMemoryTokenDirectory::from_seeds(&token_seeds()),
                pool: pool.clone(),
            }),
            None => seeded,
        };
        let saturated = self.pool.map(|pool| {
            Arc::new(SaturatedPool {
                all_checked_out: Barrier::new(pool.size),
                pool,
            })
        });
        let counters = Arc::new(Counters::default());
        let recording = Arc::new(RecordingAudit::default());
        let audit: Arc<dyn AuditSink> = self
            .audit
            .unwrap_or_else(|| recording.clone() as Arc<dyn AuditSink>);

        let lifecycle = Arc::new(RequestLifecycle::new(
            Arc::new(self.config),
            Arc::new(StubIdentity),
            self.policy,
            Arc::new(TrackingStore {
                inner: store.clone(),
                counters: counters.clone(),
                pool: saturated,
                stall: self.stall,
            }),
            tokens,
            audit,
        ));

        Harness {
            lifecycle,
            counters,
            audit: recording,
            store,
        }
    }
}

pub fn request(action: Action, params: &[(&str, &str)]) -> InboundRequest {
    request_from(action, params, "10.0.0.1")
}

pub fn request_from(action: Action, params: &[(&str, &str)], peer: &str) -> InboundRequest {
    InboundRequest::new(
        action,
        params.iter().copied().collect(),
        peer.parse().expect("valid peer address"),
    )
    .with_credential(VALID_CREDENTIAL)
}
