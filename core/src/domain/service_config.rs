// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Service Configuration Types
//
// Defines the configuration manifest for a machine API instance:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - HTTP server and client address handling
// - Caller authentication (JWT)
// - Storage and audit backends
// - Known token types and dev-mode token records
// - Policy rules
// - Observability settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::action::MACHINE_SCOPE;
use super::policy::PolicyRule;
use super::repository::{PostgresConfig, StorageBackend};

pub const API_VERSION: &str = "machine-api/v1";
pub const KIND: &str = "ServiceConfig";
pub const CONFIG_PATH_ENV: &str = "MACHINE_API_CONFIG_PATH";
pub const DATABASE_URL_ENV: &str = "MACHINE_API_DATABASE_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("environment variable '{0}' referenced by configuration is not set")]
    MissingEnv(String),
}

/// Top-level configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// API version (must be "machine-api/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ServiceConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: ServiceConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Instance name, used in logs
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfigSpec {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    /// Token types known to the token subsystem
    #[serde(default = "default_token_types")]
    pub token_types: Vec<String>,

    /// Token records for the in-memory token directory (development only)
    #[serde(default)]
    pub tokens: Vec<TokenSeed>,

    /// Allow rules. No rules for a scope means the scope is unrestricted.
    #[serde(default)]
    pub policies: Vec<PolicyRule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Use the first `X-Forwarded-For` entry as client address
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret (supports "env:VAR_NAME")
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    /// Required `iss` claim, if set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Require the request to present the token's session id
    #[serde(default)]
    pub require_session: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_kind")]
    pub backend: StorageKind,

    /// PostgreSQL URL (supports "env:VAR_NAME")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSinkKind {
    Log,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_sink")]
    pub sink: AuditSinkKind,

    /// Size of the audit sink's own connection pool (postgres sink only)
    #[serde(default = "default_audit_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSeed {
    pub serial: String,
    #[serde(rename = "type")]
    pub token_type: String,
    #[serde(default)]
    pub realms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prometheus exporter port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    5001
}

fn default_jwt_secret() -> String {
    "env:MACHINE_API_JWT_SECRET".to_string()
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Memory
}

fn default_max_connections() -> u32 {
    5
}

fn default_audit_sink() -> AuditSinkKind {
    AuditSinkKind::Log
}

fn default_audit_max_connections() -> u32 {
    2
}

fn default_token_types() -> Vec<String> {
    ["hotp", "totp", "spass", "sshkey", "yubikey"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
            trust_forwarded_for: false,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            issuer: None,
            require_session: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_kind(),
            connection_string: None,
            max_connections: default_max_connections(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: default_audit_sink(),
            max_connections: default_audit_max_connections(),
        }
    }
}

impl Default for ServiceConfigSpec {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            storage: StorageConfig::default(),
            audit: AuditConfig::default(),
            token_types: default_token_types(),
            tokens: vec![],
            policies: vec![],
            observability: None,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "machine-api".to_string(),
                version: Some("1.0.0".to_string()),
            },
            spec: ServiceConfigSpec::default(),
        }
    }
}

/// Resolve a "env:VAR_NAME" reference, or return the literal value.
pub fn resolve_secret(value: &str) -> Result<String, ConfigError> {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var).map_err(|_| ConfigError::MissingEnv(var.to_string())),
        None => Ok(value.to_string()),
    }
}

impl ServiceConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. MACHINE_API_CONFIG_PATH environment variable
    /// 2. ./machine-api.yaml (working directory)
    /// 3. ~/.machine-api/config.yaml (user home)
    /// 4. /etc/machine-api/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./machine-api.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".machine-api").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/machine-api/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(config_path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", config_path);
                Self::from_yaml_file(config_path)?
            }
            None => {
                tracing::warn!("No configuration file found in standard locations. Using defaults.");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            tracing::info!("Environment override: {} (storage backend set to postgres)", DATABASE_URL_ENV);
            self.spec.storage.backend = StorageKind::Postgres;
            self.spec.storage.connection_string = Some(url);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version != API_VERSION {
            return Err(ConfigError::Invalid(format!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version, API_VERSION
            )));
        }

        if self.kind != KIND {
            return Err(ConfigError::Invalid(format!(
                "Invalid kind: '{}'. Must be '{}'",
                self.kind, KIND
            )));
        }

        if self.metadata.name.is_empty() {
            return Err(ConfigError::Invalid("metadata.name cannot be empty".to_string()));
        }

        if self.spec.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("spec.auth.jwt_secret cannot be empty".to_string()));
        }

        let postgres_storage = self.spec.storage.backend == StorageKind::Postgres;
        if postgres_storage && self.spec.storage.connection_string.is_none() {
            return Err(ConfigError::Invalid(
                "spec.storage.connection_string is required for the postgres backend".to_string(),
            ));
        }

        if self.spec.audit.sink == AuditSinkKind::Postgres && !postgres_storage {
            return Err(ConfigError::Invalid(
                "spec.audit.sink 'postgres' requires the postgres storage backend".to_string(),
            ));
        }

        if self.spec.storage.max_connections == 0 || self.spec.audit.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be at least 1".to_string(),
            ));
        }

        for rule in &self.spec.policies {
            if rule.name.is_empty() {
                return Err(ConfigError::Invalid("policy name cannot be empty".to_string()));
            }
            if rule.actions.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "policy '{}' must list at least one action",
                    rule.name
                )));
            }
            if !rule.applies_to_scope(MACHINE_SCOPE) {
                return Err(ConfigError::Invalid(format!(
                    "policy '{}' has unknown scope '{}'",
                    rule.name, rule.scope
                )));
            }
        }

        Ok(())
    }

    /// Resolve the configured storage backend, expanding "env:" references.
    pub fn storage_backend(&self) -> Result<StorageBackend, ConfigError> {
        match self.spec.storage.backend {
            StorageKind::Memory => Ok(StorageBackend::InMemory),
            StorageKind::Postgres => {
                let raw = self.spec.storage.connection_string.as_deref().ok_or_else(|| {
                    ConfigError::Invalid("missing spec.storage.connection_string".to_string())
                })?;
                Ok(StorageBackend::PostgreSQL(PostgresConfig {
                    connection_string: resolve_secret(raw)?,
                    max_connections: self.spec.storage.max_connections,
                }))
            }
        }
    }

    /// Pool settings for the postgres audit sink, `None` for the log sink.
    ///
    /// The sink appends while the request's store transaction still holds a
    /// connection, so it is given a pool of its own.
    pub fn audit_pool(&self) -> Result<Option<PostgresConfig>, ConfigError> {
        if self.spec.audit.sink != AuditSinkKind::Postgres {
            return Ok(None);
        }
        match self.storage_backend()? {
            StorageBackend::PostgreSQL(pg) => Ok(Some(PostgresConfig {
                connection_string: pg.connection_string,
                max_connections: self.spec.audit.max_connections,
            })),
            StorageBackend::InMemory => Err(ConfigError::Invalid(
                "spec.audit.sink 'postgres' requires the postgres storage backend".to_string(),
            )),
        }
    }

    pub fn jwt_secret(&self) -> Result<String, ConfigError> {
        resolve_secret(&self.spec.auth.jwt_secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let config = ServiceConfig::default();
        assert_eq!(config.api_version, API_VERSION);
        assert_eq!(config.kind, KIND);
        assert_eq!(config.spec.server.port, 5001);
        assert_eq!(config.spec.storage.backend, StorageKind::Memory);
        assert!(config.spec.token_types.contains(&"sshkey".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_manifest() {
        let yaml = r#"
apiVersion: machine-api/v1
kind: ServiceConfig
metadata:
  name: test-instance
spec:
  server:
    port: 8080
    trust_forwarded_for: true
  auth:
    jwt_secret: secret
    require_session: true
  token_types: [sshkey, hotp]
  tokens:
    - serial: SSHK0001
      type: sshkey
      realms: [corp]
  policies:
    - name: admins
      scope: machine
      actions: ["*"]
      users: [admin]
"#;
        let config = ServiceConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.metadata.name, "test-instance");
        assert_eq!(config.spec.server.port, 8080);
        assert!(config.spec.server.trust_forwarded_for);
        assert_eq!(config.spec.server.bind_address, "0.0.0.0");
        assert!(config.spec.auth.require_session);
        assert_eq!(config.spec.tokens[0].token_type, "sshkey");
        assert_eq!(config.spec.policies.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = ServiceConfig::default();

        config.api_version = "wrong/v1".to_string();
        assert!(config.validate().is_err());
        config.api_version = API_VERSION.to_string();

        config.kind = "WrongKind".to_string();
        assert!(config.validate().is_err());
        config.kind = KIND.to_string();

        config.spec.storage.backend = StorageKind::Postgres;
        assert!(config.validate().is_err());
        config.spec.storage.connection_string = Some("postgres://localhost/machines".to_string());
        assert!(config.validate().is_ok());

        config.spec.storage.backend = StorageKind::Memory;
        config.spec.audit.sink = AuditSinkKind::Postgres;
        assert!(config.validate().is_err());
        config.spec.audit.sink = AuditSinkKind::Log;

        config.spec.policies.push(PolicyRule {
            name: "broken".to_string(),
            scope: "machine".to_string(),
            actions: vec![],
            users: vec!["*".to_string()],
            clients: vec!["*".to_string()],
            realms: vec![],
            active: true,
        });
        assert!(config.validate().is_err());
        config.spec.policies[0].actions = vec!["show".to_string()];
        config.spec.policies[0].scope = "system".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_secret() {
        assert_eq!(resolve_secret("literal").unwrap(), "literal");
        assert!(matches!(
            resolve_secret("env:MACHINE_API_TEST_UNSET_VARIABLE"),
            Err(ConfigError::MissingEnv(_))
        ));
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "apiVersion: machine-api/v1\nkind: ServiceConfig\nmetadata:\n  name: from-file\n",
        )
        .unwrap();

        let config = ServiceConfig::load_or_default(Some(path)).unwrap();
        assert_eq!(config.metadata.name, "from-file");
        assert_eq!(config.spec.server.port, 5001);

        let missing = dir.path().join("missing.yaml");
        assert!(ServiceConfig::load_or_default(Some(missing)).is_err());
    }

    #[test]
    fn test_audit_pool_is_separate_from_storage_pool() {
        let mut config = ServiceConfig::default();
        assert!(config.audit_pool().unwrap().is_none());

        config.spec.storage.backend = StorageKind::Postgres;
        config.spec.storage.connection_string = Some("postgres://localhost/machines".to_string());
        config.spec.storage.max_connections = 5;
        config.spec.audit.sink = AuditSinkKind::Postgres;
        config.spec.audit.max_connections = 3;

        let audit = config.audit_pool().unwrap().unwrap();
        assert_eq!(audit.connection_string, "postgres://localhost/machines");
        assert_eq!(audit.max_connections, 3);

        config.spec.audit.max_connections = 0;
        assert!(config.validate().is_err());
    }
}
