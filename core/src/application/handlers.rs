// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Machine Operation Handlers
//!
//! Every handler has the same shape:
//!
//! 1. enforce `(scope = "machine", action)` against the policy context;
//!    a denial aborts before the store is touched
//! 2. build the typed parameters (missing/invalid parameters abort here)
//! 3. call exactly one store operation on the request's session
//! 4. wrap the result as an [`OperationOutput`]
//!
//! Handlers never commit, roll back or release. The finalizer owns the
//! transaction boundary so that the audit append always precedes commit.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::application::envelope::{OperationError, OperationOutput};
use crate::application::params::{
    AddTokenParams, CreateMachineParams, DelTokenParams, DeleteMachineParams, GetTokenAppsParams,
    OperationParams, ShowMachineParams, ShowTokenParams,
};
use crate::domain::action::{Action, MACHINE_SCOPE};
use crate::domain::machine::BindingFilter;
use crate::domain::policy::{PolicyContext, PolicyDecision, PolicyDecisionPoint};
use crate::domain::repository::StoreSession;
use crate::domain::request::RequestParams;

pub type HandlerResult = Result<OperationOutput, OperationError>;

pub struct MachineHandlers {
    policy: Arc<dyn PolicyDecisionPoint>,
}

impl MachineHandlers {
    pub fn new(policy: Arc<dyn PolicyDecisionPoint>) -> Self {
        Self { policy }
    }

    /// Route the request to the handler for `ctx.action`.
    pub async fn dispatch(
        &self,
        ctx: &PolicyContext,
        params: &RequestParams,
        session: &mut dyn StoreSession,
    ) -> HandlerResult {
        debug!("Dispatching machine action '{}'", ctx.action);
        match ctx.action {
            Action::Create => self.create(ctx, params, session).await,
            Action::Delete => self.delete(ctx, params, session).await,
            Action::Show => self.show(ctx, params, session).await,
            Action::AddToken => self.addtoken(ctx, params, session).await,
            Action::DelToken => self.deltoken(ctx, params, session).await,
            Action::ShowToken => self.showtoken(ctx, params, session).await,
            Action::GetTokenApps => self.gettokenapps(ctx, params, session).await,
        }
    }

    fn enforce(&self, ctx: &PolicyContext, action: Action) -> Result<(), OperationError> {
        match self.policy.evaluate(ctx, MACHINE_SCOPE, action) {
            PolicyDecision::Allow => Ok(()),
            PolicyDecision::Deny { reason } => {
                warn!(
                    caller = %ctx.caller.display_name(),
                    client = %ctx.client,
                    "Policy denied {}/{}: {}",
                    MACHINE_SCOPE,
                    action,
                    reason
                );
                Err(OperationError::PolicyDenied(reason))
            }
        }
    }

    /// Register a machine. Returns `true` once the store accepted it.
    pub async fn create(
        &self,
        ctx: &PolicyContext,
        params: &RequestParams,
        session: &mut dyn StoreSession,
    ) -> HandlerResult {
        self.enforce(ctx, Action::Create)?;
        let request = CreateMachineParams::from_params(params)?;

        let machine = session.create_machine(request.into()).await?;
        debug!("Machine '{}' created", machine.name);
        Ok(OperationOutput::Flag(true))
    }

    /// Remove a machine. The store's removal count is passed through.
    pub async fn delete(
        &self,
        ctx: &PolicyContext,
        params: &RequestParams,
        session: &mut dyn StoreSession,
    ) -> HandlerResult {
        self.enforce(ctx, Action::Delete)?;
        let request = DeleteMachineParams::from_params(params)?;

        let removed = session.delete_machine(&request.name).await?;
        Ok(OperationOutput::Count(removed))
    }

    pub async fn show(
        &self,
        ctx: &PolicyContext,
        params: &RequestParams,
        session: &mut dyn StoreSession,
    ) -> HandlerResult {
        self.enforce(ctx, Action::Show)?;
        let request = ShowMachineParams::from_params(params)?;

        let machines = session.list_machines(request.name.as_deref()).await?;
        Ok(OperationOutput::Machines(machines))
    }

    pub async fn addtoken(
        &self,
        ctx: &PolicyContext,
        params: &RequestParams,
        session: &mut dyn StoreSession,
    ) -> HandlerResult {
        self.enforce(ctx, Action::AddToken)?;
        let request = AddTokenParams::from_params(params)?;

        let binding = session
            .add_binding(
                &request.name,
                &request.serial,
                &request.application,
                request.options,
            )
            .await?;
        debug!(
            "Token {} bound to '{}' for {} (binding {})",
            binding.serial, binding.machine, binding.application, binding.id
        );
        Ok(OperationOutput::Flag(true))
    }

    pub async fn deltoken(
        &self,
        ctx: &PolicyContext,
        params: &RequestParams,
        session: &mut dyn StoreSession,
    ) -> HandlerResult {
        self.enforce(ctx, Action::DelToken)?;
        let request = DelTokenParams::from_params(params)?;

        let removed = session
            .remove_binding(&request.name, &request.serial, &request.application)
            .await?;
        Ok(OperationOutput::Count(removed))
    }

    pub async fn showtoken(
        &self,
        ctx: &PolicyContext,
        params: &RequestParams,
        session: &mut dyn StoreSession,
    ) -> HandlerResult {
        self.enforce(ctx, Action::ShowToken)?;
        let filter: BindingFilter = ShowTokenParams::from_params(params)?.into();

        let bindings = session.list_bindings(&filter).await?;
        Ok(OperationOutput::Bindings(bindings))
    }

    /// Authentication items for a client machine.
    ///
    /// Without a `name` the machine is identified by the client address.
    /// The client itself is not authenticated beyond the policy check.
    pub async fn gettokenapps(
        &self,
        ctx: &PolicyContext,
        params: &RequestParams,
        session: &mut dyn StoreSession,
    ) -> HandlerResult {
        self.enforce(ctx, Action::GetTokenApps)?;
        let request = GetTokenAppsParams::from_params(params)?;

        let items = session
            .resolve_application_credentials(
                request.name.as_deref(),
                request.application.as_deref(),
                ctx.client,
            )
            .await?;
        Ok(OperationOutput::Credentials(items))
    }
}
