// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Request Lifecycle
//!
//! Explicit interceptor chain wrapped around every machine operation:
//!
//! ```text
//! InboundRequest
//!   └─ ContextBuilder::authenticate        ← AccessError propagates, nothing opened
//!   └─ ContextBuilder::build               ← immutable PolicyContext, token lookups
//!   └─ DomainStore::begin                  ← ScopedSession owns the transaction
//!   └─ ContextBuilder::check_identity      ← AccessError propagates after rollback
//!   └─ MachineHandlers::dispatch           ← policy check, params, one store call
//!   └─ Finalizer::finish                   ← audit, commit/rollback, release
//! ApiResponse
//! ```
//!
//! The ordering is fixed: no handler runs without a built context, and no
//! mutation is committed before its audit record has been appended.

use std::sync::Arc;
use tracing::{error, info_span, warn, Instrument};
use uuid::Uuid;

use crate::application::context::ContextBuilder;
use crate::application::envelope::{ApiResponse, OperationError};
use crate::application::finalizer::{Finalizer, REQUESTS_METRIC};
use crate::application::handlers::MachineHandlers;
use crate::application::params::ParamError;
use crate::application::transaction::ScopedSession;
use crate::domain::audit::AuditSink;
use crate::domain::identity::{AccessError, IdentityResolver};
use crate::domain::policy::PolicyDecisionPoint;
use crate::domain::repository::{DomainStore, TokenDirectory};
use crate::domain::request::InboundRequest;
use crate::domain::service_config::ServiceConfig;

pub struct RequestLifecycle {
    context: ContextBuilder,
    handlers: MachineHandlers,
    finalizer: Finalizer,
    store: Arc<dyn DomainStore>,
}

impl RequestLifecycle {
    pub fn new(
        config: Arc<ServiceConfig>,
        identity: Arc<dyn IdentityResolver>,
        policy: Arc<dyn PolicyDecisionPoint>,
        store: Arc<dyn DomainStore>,
        tokens: Arc<dyn TokenDirectory>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            context: ContextBuilder::new(config, identity, tokens),
            handlers: MachineHandlers::new(policy),
            finalizer: Finalizer::new(audit),
            store,
        }
    }

    /// Run one request through the full pipeline.
    ///
    /// Only identity failures surface as `Err`; everything else is reported
    /// inside the returned envelope.
    pub async fn handle(&self, request: InboundRequest) -> Result<ApiResponse, AccessError> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "machine_request",
            request_id = %request_id,
            action = %request.action
        );
        self.run(request_id, request).instrument(span).await
    }

    /// Answer a request whose parameters the transport could not decode.
    ///
    /// The caller is authenticated as usual; no session is opened.
    pub async fn reject(
        &self,
        request: InboundRequest,
        error: ParamError,
    ) -> Result<ApiResponse, AccessError> {
        self.context.authenticate(&request).map_err(|e| {
            warn!("Rejected unauthenticated request: {}", e);
            e
        })?;

        warn!("Undecodable parameters for '{}': {}", request.action, error);
        let error = OperationError::from(error);
        metrics::counter!(
            REQUESTS_METRIC,
            "action" => request.action.as_str(),
            "outcome" => error.kind()
        )
        .increment(1);
        Ok(ApiResponse::failure(&error))
    }

    async fn run(
        &self,
        request_id: Uuid,
        request: InboundRequest,
    ) -> Result<ApiResponse, AccessError> {
        let caller = self.context.authenticate(&request).map_err(|e| {
            warn!("Rejected unauthenticated request: {}", e);
            e
        })?;

        let ctx = match self.context.build(request_id, &request, caller).await {
            Ok(ctx) => ctx,
            Err(e) => {
                error!("Unable to build policy context: {}", e);
                return Ok(self.precondition_failure(&request, OperationError::DomainFailure(e)));
            }
        };

        // From here on the request holds a store connection until the
        // finalizer commits or rolls back.
        let mut session = match self.store.begin().await {
            Ok(session) => ScopedSession::new(session),
            Err(e) => {
                error!("Unable to open store session: {}", e);
                return Ok(self.precondition_failure(&request, OperationError::DomainFailure(e)));
            }
        };

        if let Err(e) = self.context.check_identity(&ctx.caller, &request) {
            warn!("Identity check failed for {}: {}", ctx.caller.display_name(), e);
            let _ = session.rollback().await;
            return Err(e);
        }

        let outcome = match session.session() {
            Ok(store) => self.handlers.dispatch(&ctx, &request.params, store).await,
            Err(e) => Err(OperationError::DomainFailure(e)),
        };

        Ok(self.finalizer.finish(&ctx, session, outcome).await)
    }

    fn precondition_failure(&self, request: &InboundRequest, error: OperationError) -> ApiResponse {
        metrics::counter!(
            REQUESTS_METRIC,
            "action" => request.action.as_str(),
            "outcome" => "precondition_failure"
        )
        .increment(1);
        ApiResponse::failure(&error)
    }
}
