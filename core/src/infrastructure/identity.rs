// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::identity::{AccessError, CallerIdentity, IdentityResolver};
use crate::domain::request::InboundRequest;

/// Request parameter carrying the session id for session-bound credentials.
pub const SESSION_PARAM: &str = "session";

/// Claims carried by an administrator credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    /// Login name
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    /// Session id the credential was issued for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Resolves callers from HS256-signed bearer tokens.
pub struct JwtIdentityResolver {
    decoding_key: DecodingKey,
    issuer: Option<String>,
    require_session: bool,
}

impl JwtIdentityResolver {
    pub fn new(secret: &str, issuer: Option<String>, require_session: bool) -> anyhow::Result<Self> {
        if secret.is_empty() {
            return Err(anyhow::anyhow!("JWT secret must not be empty"));
        }
        Ok(Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            require_session,
        })
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        match &self.issuer {
            Some(issuer) => {
                validation.set_required_spec_claims(&["exp", "iss"]);
                validation.set_issuer(&[issuer.as_str()]);
            }
            None => validation.set_required_spec_claims(&["exp"]),
        }
        validation
    }
}

impl IdentityResolver for JwtIdentityResolver {
    fn resolve(&self, request: &InboundRequest) -> Result<CallerIdentity, AccessError> {
        let token = request
            .credential
            .as_deref()
            .ok_or_else(|| AccessError::Unauthenticated("missing bearer credential".to_string()))?;

        let data = decode::<AdminClaims>(token, &self.decoding_key, &self.validation())
            .map_err(|e| AccessError::Unauthenticated(format!("invalid credential: {}", e)))?;

        let claims = data.claims;
        if claims.sub.trim().is_empty() {
            return Err(AccessError::Unauthenticated("credential has no subject".to_string()));
        }

        Ok(CallerIdentity {
            login: claims.sub,
            realm: claims.realm,
            session: claims.sid,
        })
    }

    fn check_identity(
        &self,
        caller: &CallerIdentity,
        request: &InboundRequest,
    ) -> Result<(), AccessError> {
        if !self.require_session {
            return Ok(());
        }

        let expected = caller.session.as_deref().ok_or_else(|| {
            AccessError::Unauthorized("credential is not bound to a session".to_string())
        })?;

        let presented = request
            .params
            .get(SESSION_PARAM)
            .or(request.session.as_deref());

        match presented {
            Some(session) if session == expected => Ok(()),
            Some(_) => Err(AccessError::Unauthorized("session mismatch".to_string())),
            None => Err(AccessError::Unauthorized("no session presented".to_string())),
        }
    }
}
