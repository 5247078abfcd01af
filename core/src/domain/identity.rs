// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Caller Identity
//!
//! Identity resolution is the only stage allowed to fail *outside* the
//! structured envelope: an [`AccessError`] propagates to the transport so it
//! can answer with the correct unauthenticated / forbidden status.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::request::InboundRequest;

/// The authenticated principal behind a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub login: String,
    pub realm: Option<String>,
    /// Session id bound to the credential, if the issuer set one.
    pub session: Option<String>,
}

impl CallerIdentity {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            realm: None,
            session: None,
        }
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// `login@realm`, or just `login` when no realm is attached.
    pub fn display_name(&self) -> String {
        match &self.realm {
            Some(realm) => format!("{}@{}", self.login, realm),
            None => self.login.clone(),
        }
    }
}

/// Failures that short-circuit the request before any envelope is built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

/// Resolves and checks the caller of a request.
pub trait IdentityResolver: Send + Sync {
    /// Extract the caller from the request credential.
    fn resolve(&self, request: &InboundRequest) -> Result<CallerIdentity, AccessError>;

    /// Identity check required before any handler runs (session validity).
    fn check_identity(
        &self,
        caller: &CallerIdentity,
        request: &InboundRequest,
    ) -> Result<(), AccessError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        assert_eq!(CallerIdentity::new("admin").display_name(), "admin");
        assert_eq!(
            CallerIdentity::new("admin").with_realm("corp").display_name(),
            "admin@corp"
        );
    }
}
