// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Context Builder (pre-phase)
//!
//! First stage of the request pipeline. Authenticates the caller, resolves
//! the client address, and builds the immutable [`PolicyContext`] from
//! explicit inputs: the configuration snapshot, the known token types, the
//! caller, the client address and, when the request names a `serial`, that
//! token's type and realms.
//!
//! The context is built before the store session is opened. Token lookups
//! may need their own connection from the same pool as the session, so none
//! of them runs while the session holds one.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::identity::{AccessError, CallerIdentity, IdentityResolver};
use crate::domain::policy::PolicyContext;
use crate::domain::repository::{DomainError, TokenDirectory};
use crate::domain::request::InboundRequest;
use crate::domain::service_config::ServiceConfig;

pub struct ContextBuilder {
    config: Arc<ServiceConfig>,
    identity: Arc<dyn IdentityResolver>,
    tokens: Arc<dyn TokenDirectory>,
}

impl ContextBuilder {
    pub fn new(
        config: Arc<ServiceConfig>,
        identity: Arc<dyn IdentityResolver>,
        tokens: Arc<dyn TokenDirectory>,
    ) -> Self {
        Self {
            config,
            identity,
            tokens,
        }
    }

    pub fn authenticate(&self, request: &InboundRequest) -> Result<CallerIdentity, AccessError> {
        self.identity.resolve(request)
    }

    pub fn check_identity(
        &self,
        caller: &CallerIdentity,
        request: &InboundRequest,
    ) -> Result<(), AccessError> {
        self.identity.check_identity(caller, request)
    }

    pub async fn build(
        &self,
        request_id: Uuid,
        request: &InboundRequest,
        caller: CallerIdentity,
    ) -> Result<PolicyContext, DomainError> {
        let client = request.client_address(self.config.spec.server.trust_forwarded_for);
        let serial = request.params.serial().map(str::to_string);

        let (token_type, token_realms) = match serial.as_deref() {
            Some(serial) => (
                self.tokens.token_type(serial).await?,
                self.tokens.token_realms(serial).await?,
            ),
            None => (None, Vec::new()),
        };

        let known_token_types: BTreeSet<String> =
            self.config.spec.token_types.iter().cloned().collect();

        debug!(
            caller = %caller.display_name(),
            %client,
            token_type = ?token_type,
            realms = ?token_realms,
            "Policy context built"
        );

        Ok(PolicyContext {
            request_id,
            action: request.action,
            config: self.config.clone(),
            known_token_types,
            caller,
            client,
            serial,
            token_type,
            token_realms,
        })
    }
}
