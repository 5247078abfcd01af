// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Domain
//!
//! The [`PolicyContext`] is the immutable per-request value the pipeline
//! builds once, from explicit inputs, before any handler runs. Policy
//! decision points read it; nothing mutates it afterwards.
//!
//! [`PolicyRule`] is the configuration shape consumed by the rule-based
//! engine in `crate::infrastructure::policy_engine`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

use super::action::Action;
use super::identity::CallerIdentity;
use super::service_config::ServiceConfig;

/// Everything a policy decision may depend on for one request.
#[derive(Debug, Clone)]
pub struct PolicyContext {
    pub request_id: Uuid,
    pub action: Action,
    pub config: Arc<ServiceConfig>,
    pub known_token_types: BTreeSet<String>,
    pub caller: CallerIdentity,
    pub client: IpAddr,
    /// Serial named by the request, if any.
    pub serial: Option<String>,
    /// Type of `serial`, if the token is known.
    pub token_type: Option<String>,
    /// Realms of `serial`. Empty when no serial was given or the token has none.
    pub token_realms: Vec<String>,
}

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny { reason: String },
}

/// Answers whether `(scope, action)` is permitted in a given context.
pub trait PolicyDecisionPoint: Send + Sync {
    fn evaluate(&self, ctx: &PolicyContext, scope: &str, action: Action) -> PolicyDecision;
}

fn default_wildcard() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_true() -> bool {
    true
}

/// A single allow rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub name: String,

    /// `machine` (or its alias `admin`).
    pub scope: String,

    /// Action names, or `*`.
    pub actions: Vec<String>,

    /// Logins, `login@realm`, or `*`.
    #[serde(default = "default_wildcard")]
    pub users: Vec<String>,

    /// Exact client addresses, or `*`.
    #[serde(default = "default_wildcard")]
    pub clients: Vec<String>,

    /// Token realms the rule is restricted to. Empty means any realm.
    #[serde(default)]
    pub realms: Vec<String>,

    #[serde(default = "default_true")]
    pub active: bool,
}

impl PolicyRule {
    pub const SCOPE_ALIASES: [&'static str; 2] = ["machine", "admin"];

    pub fn applies_to_scope(&self, scope: &str) -> bool {
        self.scope == scope
            || (Self::SCOPE_ALIASES.contains(&scope)
                && Self::SCOPE_ALIASES.contains(&self.scope.as_str()))
    }

    pub fn allows_action(&self, action: Action) -> bool {
        self.actions
            .iter()
            .any(|a| a == "*" || a == action.as_str())
    }

    pub fn allows_user(&self, caller: &CallerIdentity) -> bool {
        let display = caller.display_name();
        self.users
            .iter()
            .any(|u| u == "*" || *u == caller.login || *u == display)
    }

    pub fn allows_client(&self, client: IpAddr) -> bool {
        self.clients.iter().any(|c| {
            c == "*" || c.parse::<IpAddr>().map(|addr| addr == client).unwrap_or(false)
        })
    }

    /// Realm restriction only bites when the request named a token.
    pub fn allows_realms(&self, serial: Option<&str>, token_realms: &[String]) -> bool {
        if self.realms.is_empty() || serial.is_none() {
            return true;
        }
        token_realms.iter().any(|r| self.realms.contains(r))
    }
}
