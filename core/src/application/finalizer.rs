// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Audit/Commit Finalizer (post-phase)
//!
//! Last stage of the request pipeline, run for every request that reached a
//! handler, whatever its outcome:
//!
//! 1. attach the acting administrator and, if a serial was given, its token
//!    type (resolved with the policy context)
//! 2. append the audit record
//! 3. commit only if the handler and the audit append both succeeded;
//!    otherwise roll back
//! 4. release the session (done by [`ScopedSession`] on every path)

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::application::envelope::{ApiResponse, OperationError, OperationOutput};
use crate::application::transaction::ScopedSession;
use crate::domain::audit::{AuditRecord, AuditSink};
use crate::domain::policy::PolicyContext;

pub const REQUESTS_METRIC: &str = "machine_api_requests_total";

pub struct Finalizer {
    audit: Arc<dyn AuditSink>,
}

impl Finalizer {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self { audit }
    }

    pub async fn finish(
        &self,
        ctx: &PolicyContext,
        session: ScopedSession,
        outcome: Result<OperationOutput, OperationError>,
    ) -> ApiResponse {
        let mut outcome = outcome;

        let record = AuditRecord {
            request_id: ctx.request_id,
            timestamp: Utc::now(),
            action: ctx.action,
            success: outcome.is_ok(),
            caller: ctx.caller.login.clone(),
            client: ctx.client,
            administrator: ctx.caller.display_name(),
            serial: ctx.serial.clone(),
            token_type: ctx.token_type.clone(),
            info: outcome.as_ref().err().map(|e| e.to_string()).unwrap_or_default(),
        };

        if let Err(e) = self.audit.append(&record).await {
            error!("Audit append failed for request {}: {}", ctx.request_id, e);
            outcome = Err(OperationError::AuditFailure(e));
        }

        if outcome.is_ok() {
            if let Err(e) = session.commit().await {
                outcome = Err(OperationError::DomainFailure(e));
            }
        } else {
            // Rollback errors are logged by the session guard; the
            // original failure is what the caller sees.
            let _ = session.rollback().await;
        }

        let label = match &outcome {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::counter!(REQUESTS_METRIC, "action" => ctx.action.as_str(), "outcome" => label)
            .increment(1);

        match outcome {
            Ok(output) => {
                info!("Machine action '{}' succeeded", ctx.action);
                ApiResponse::success(&output)
            }
            Err(e) => {
                warn!("Machine action '{}' failed ({}): {}", ctx.action, e.kind(), e);
                ApiResponse::failure(&e)
            }
        }
    }
}
