// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Result/Error Envelope
//!
//! Handlers return `Result<OperationOutput, OperationError>`; the finalizer
//! turns that into an [`ApiResponse`]. Success carries the version marker
//! and the value. Failure carries a message and, except for policy denials,
//! a numeric code.
//!
//! ```text
//! {"version": "machine-api 0.1.0", "result": {"status": true,  "value": ...}}
//! {"version": "machine-api 0.1.0", "result": {"status": false, "error": {"message": ..., "code": 905}}}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::params::ParamError;
use crate::domain::audit::AuditError;
use crate::domain::machine::{Binding, CredentialItem, Machine};
use crate::domain::repository::DomainError;

pub const PARAMETER_ERROR_CODE: i32 = 905;
pub const AUDIT_ERROR_CODE: i32 = 1101;

pub fn version_marker() -> String {
    format!("machine-api {}", env!("CARGO_PKG_VERSION"))
}

/// Every way a request can fail once identity has been established.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("{0}")]
    PolicyDenied(String),

    #[error("{0}")]
    MissingParameter(ParamError),

    #[error("{0}")]
    InvalidParameter(ParamError),

    #[error("{0}")]
    DomainFailure(#[from] DomainError),

    #[error("{0}")]
    AuditFailure(#[from] AuditError),
}

impl From<ParamError> for OperationError {
    fn from(err: ParamError) -> Self {
        match err {
            ParamError::Missing(_) => OperationError::MissingParameter(err),
            ParamError::Invalid { .. } => OperationError::InvalidParameter(err),
        }
    }
}

impl OperationError {
    /// Policy denials are rendered without a code.
    pub fn code(&self) -> Option<i32> {
        match self {
            OperationError::PolicyDenied(_) => None,
            OperationError::MissingParameter(_) | OperationError::InvalidParameter(_) => {
                Some(PARAMETER_ERROR_CODE)
            }
            OperationError::DomainFailure(e) => Some(e.code()),
            OperationError::AuditFailure(_) => Some(AUDIT_ERROR_CODE),
        }
    }

    /// Metric / log label.
    pub fn kind(&self) -> &'static str {
        match self {
            OperationError::PolicyDenied(_) => "policy_denied",
            OperationError::MissingParameter(_) => "missing_parameter",
            OperationError::InvalidParameter(_) => "invalid_parameter",
            OperationError::DomainFailure(_) => "domain_failure",
            OperationError::AuditFailure(_) => "audit_failure",
        }
    }
}

/// Successful handler results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationOutput {
    Flag(bool),
    Count(u64),
    Machines(Vec<Machine>),
    Bindings(Vec<Binding>),
    Credentials(Vec<CredentialItem>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResult {
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub version: String,
    pub result: ApiResult,
}

impl ApiResponse {
    pub fn success(output: &OperationOutput) -> Self {
        // OperationOutput contains only plain data; serialization cannot fail
        let value = serde_json::to_value(output).unwrap_or(serde_json::Value::Null);
        Self {
            version: version_marker(),
            result: ApiResult {
                status: true,
                value: Some(value),
                error: None,
            },
        }
    }

    pub fn failure(error: &OperationError) -> Self {
        Self {
            version: version_marker(),
            result: ApiResult {
                status: false,
                value: None,
                error: Some(ApiError {
                    message: error.to_string(),
                    code: error.code(),
                }),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.status
    }

    pub fn value(&self) -> Option<&serde_json::Value> {
        self.result.value.as_ref()
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.result.error.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope_shape() {
        let response = ApiResponse::success(&OperationOutput::Flag(true));
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["result"]["status"], json!(true));
        assert_eq!(json["result"]["value"], json!(true));
        assert!(json["result"].get("error").is_none());
        assert!(json["version"].as_str().unwrap().starts_with("machine-api "));
    }

    #[test]
    fn test_policy_failure_has_no_code() {
        let err = OperationError::PolicyDenied("not allowed".to_string());
        let json = serde_json::to_value(ApiResponse::failure(&err)).unwrap();

        assert_eq!(json["result"]["status"], json!(false));
        assert_eq!(json["result"]["error"]["message"], json!("not allowed"));
        assert!(json["result"]["error"].get("code").is_none());
    }

    #[test]
    fn test_operational_failures_carry_codes() {
        let missing = OperationError::from(ParamError::Missing("name"));
        assert!(matches!(missing, OperationError::MissingParameter(_)));
        assert_eq!(missing.code(), Some(PARAMETER_ERROR_CODE));

        let invalid = OperationError::from(ParamError::Invalid {
            name: "ip",
            reason: "bad".to_string(),
        });
        assert_eq!(invalid.kind(), "invalid_parameter");

        let domain = OperationError::from(DomainError::NotFound("machine m1".to_string()));
        assert_eq!(domain.code(), Some(601));

        let audit = OperationError::from(AuditError::Write("disk full".to_string()));
        assert_eq!(audit.code(), Some(AUDIT_ERROR_CODE));
        let json = serde_json::to_value(ApiResponse::failure(&audit)).unwrap();
        assert_eq!(json["result"]["error"]["code"], json!(AUDIT_ERROR_CODE));
    }
}
