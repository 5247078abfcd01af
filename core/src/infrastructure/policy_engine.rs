// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Rule-Based Policy Engine
//!
//! Evaluates `(scope, action)` against the allow rules of the configuration
//! snapshot carried in the [`PolicyContext`].
//!
//! ## Evaluation
//!
//! 1. Collect the active rules for the scope. None at all means the scope is
//!    unrestricted and the request is allowed.
//! 2. Otherwise allow iff one rule matches the action, the caller, the client
//!    address and (when the request names a token) the token's realms.
//! 3. Deny by default.

use tracing::debug;

use crate::domain::action::Action;
use crate::domain::policy::{PolicyContext, PolicyDecision, PolicyDecisionPoint, PolicyRule};

#[derive(Debug, Default)]
pub struct RulePolicyEngine;

impl RulePolicyEngine {
    pub fn new() -> Self {
        Self
    }
}

impl PolicyDecisionPoint for RulePolicyEngine {
    fn evaluate(&self, ctx: &PolicyContext, scope: &str, action: Action) -> PolicyDecision {
        let rules: Vec<&PolicyRule> = ctx
            .config
            .spec
            .policies
            .iter()
            .filter(|r| r.active && r.applies_to_scope(scope))
            .collect();

        if rules.is_empty() {
            debug!("No active policies for scope '{}'; allowing {}", scope, action);
            return PolicyDecision::Allow;
        }

        let granted_by = rules.iter().find(|rule| {
            rule.allows_action(action)
                && rule.allows_user(&ctx.caller)
                && rule.allows_client(ctx.client)
                && rule.allows_realms(ctx.serial.as_deref(), &ctx.token_realms)
        });

        match granted_by {
            Some(rule) => {
                debug!("Policy '{}' allows {}/{}", rule.name, scope, action);
                PolicyDecision::Allow
            }
            None => PolicyDecision::Deny {
                reason: format!(
                    "You do not have the administrative right to do this. \
                     Check the policies for scope '{}', action '{}', user '{}'.",
                    scope,
                    action,
                    ctx.caller.display_name()
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::CallerIdentity;
    use crate::domain::service_config::ServiceConfig;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use uuid::Uuid;

    fn context(policies: &str, caller: &str, serial: Option<&str>, realms: &[&str]) -> PolicyContext {
        let mut config = ServiceConfig::default();
        config.spec.policies = serde_yaml::from_str(policies).unwrap();
        PolicyContext {
            request_id: Uuid::new_v4(),
            action: Action::Show,
            config: Arc::new(config),
            known_token_types: BTreeSet::new(),
            caller: CallerIdentity::new(caller),
            client: "10.0.0.1".parse().unwrap(),
            serial: serial.map(str::to_string),
            token_type: None,
            token_realms: realms.iter().map(|r| r.to_string()).collect(),
        }
    }

    const RULES: &str = r#"
- name: admins
  scope: machine
  actions: ["*"]
  users: [admin]
- name: helpdesk
  scope: machine
  actions: [show, showtoken, addtoken]
  users: [helpdesk]
  realms: [corp]
- name: disabled
  scope: machine
  actions: ["*"]
  users: ["*"]
  active: false
"#;

    #[test]
    fn test_no_rules_allows_everything() {
        let ctx = context("[]", "anyone", None, &[]);
        assert_eq!(
            RulePolicyEngine::new().evaluate(&ctx, "machine", Action::Delete),
            PolicyDecision::Allow
        );
    }

    #[test]
    fn test_wildcard_rule_allows_admin() {
        let ctx = context(RULES, "admin", None, &[]);
        let engine = RulePolicyEngine::new();
        for action in Action::ALL {
            assert_eq!(engine.evaluate(&ctx, "machine", action), PolicyDecision::Allow);
        }
    }

    #[test]
    fn test_inactive_rule_is_ignored() {
        let ctx = context(RULES, "mallory", None, &[]);
        let decision = RulePolicyEngine::new().evaluate(&ctx, "machine", Action::Show);
        assert!(matches!(decision, PolicyDecision::Deny { reason } if reason.contains("mallory")));
    }

    #[test]
    fn test_action_restriction() {
        let ctx = context(RULES, "helpdesk", None, &[]);
        let engine = RulePolicyEngine::new();
        assert_eq!(engine.evaluate(&ctx, "machine", Action::Show), PolicyDecision::Allow);
        assert_ne!(engine.evaluate(&ctx, "machine", Action::Delete), PolicyDecision::Allow);
    }

    #[test]
    fn test_realm_scoped_rule() {
        let engine = RulePolicyEngine::new();

        let corp = context(RULES, "helpdesk", Some("SER001"), &["corp"]);
        assert_eq!(engine.evaluate(&corp, "machine", Action::AddToken), PolicyDecision::Allow);

        let lab = context(RULES, "helpdesk", Some("SER002"), &["lab"]);
        assert_ne!(engine.evaluate(&lab, "machine", Action::AddToken), PolicyDecision::Allow);
    }

    #[test]
    fn test_other_scope_unrestricted() {
        let ctx = context(RULES, "mallory", None, &[]);
        assert_eq!(
            RulePolicyEngine::new().evaluate(&ctx, "system", Action::Show),
            PolicyDecision::Allow
        );
    }
}
