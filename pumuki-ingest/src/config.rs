//! Ingestion client configuration.
//!
//! Precedence, highest first: `PUMUKI_*` environment, the TOML config file
//! (`PUMUKI_CONFIG_FILE` or `.pumuki/ingestion.toml` under the repository
//! root), built-in defaults.
//!
//! ```toml
//! governance_policy = ".pumuki/governance-policy.json"
//!
//! [transport]
//! endpoint = "https://ingest.example/v1/hotspots"
//! timeout_ms = 5000
//! max_retries = 2
//! retry_base_delay_ms = 250
//!
//! [auth]
//! scheme = "bearer"
//! scope_tenant_id = "tenant-a"
//!
//! [paths]
//! audit = ".pumuki/artifacts/saas-ingestion-audit.ndjson"
//! ```

use std::path::{Path, PathBuf};

use pumuki_common::auth::{AuthPolicy, Credentials};
use pumuki_common::config::{EnvError, EnvParser, Sourced};
use pumuki_common::contract::DEFAULT_PAYLOAD_PATH;
use pumuki_common::errors::ErrorCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::audit::DEFAULT_AUDIT_PATH;
use crate::governance::{self, Governance, RedactionKey};
use crate::metrics::DEFAULT_METRICS_PATH;
use crate::transport::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_TIMEOUT_MS, TransportLimits,
};

pub const DEFAULT_CONFIG_FILE: &str = ".pumuki/ingestion.toml";

const MAX_TIMEOUT_MS: u64 = 600_000;
const MAX_RETRIES: u32 = 20;
const MAX_RETRY_BASE_DELAY_MS: u64 = 60_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid environment configuration: {}", format_env_errors(.0))]
    Env(Vec<EnvError>),

    #[error(transparent)]
    Policy(#[from] governance::PolicyLoadError),
}

fn format_env_errors(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConfigError {
    pub const fn catalog_code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } => ErrorCode::ConfigReadError,
            Self::Parse { .. } => ErrorCode::ConfigParseError,
            Self::Env(_) => ErrorCode::ConfigEnvError,
            Self::Policy(_) => ErrorCode::GovernancePolicyUnreadable,
        }
    }
}

// ── File format ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    transport: TransportSection,
    auth: Option<AuthPolicy>,
    paths: PathsSection,
    governance_policy: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TransportSection {
    endpoint: Option<String>,
    timeout_ms: Option<u64>,
    max_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PathsSection {
    payload: Option<PathBuf>,
    audit: Option<PathBuf>,
    metrics: Option<PathBuf>,
}

// ── Resolved configuration ───────────────────────────────────────────────

/// Absolute locations of the three ingestion artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactPaths {
    pub payload: PathBuf,
    pub audit: PathBuf,
    pub metrics: PathBuf,
}

impl ArtifactPaths {
    /// Default locations under `repo_root`.
    pub fn under(repo_root: &Path) -> Self {
        Self {
            payload: repo_root.join(DEFAULT_PAYLOAD_PATH),
            audit: repo_root.join(DEFAULT_AUDIT_PATH),
            metrics: repo_root.join(DEFAULT_METRICS_PATH),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub repo_root: PathBuf,
    /// The config file that was loaded, if any.
    pub config_file: Option<PathBuf>,
    pub endpoint: Sourced<Option<String>>,
    pub credentials: Credentials,
    pub timeout_ms: Sourced<u64>,
    pub max_retries: Sourced<u32>,
    pub retry_base_delay_ms: Sourced<u64>,
    pub paths: ArtifactPaths,
    pub auth_policy: Option<AuthPolicy>,
    pub governance_policy: Option<PathBuf>,
    pub redaction_key: RedactionKey,
}

fn resolve(repo_root: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() { path } else { repo_root.join(path) }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl IngestConfig {
    /// Load configuration for the repository at `repo_root`.
    ///
    /// An explicit `PUMUKI_CONFIG_FILE` must exist; the default file is
    /// optional.
    pub fn load(repo_root: &Path, env: &mut EnvParser) -> Result<Self, ConfigError> {
        let explicit = env.get_optional_string("CONFIG_FILE").into_inner();
        let (file, config_file) = match explicit {
            Some(path) => {
                let path = resolve(repo_root, PathBuf::from(path));
                (read_file_config(&path)?, Some(path))
            }
            None => {
                let path = repo_root.join(DEFAULT_CONFIG_FILE);
                if path.is_file() {
                    (read_file_config(&path)?, Some(path))
                } else {
                    (FileConfig::default(), None)
                }
            }
        };
        let origin = config_file
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        let endpoint = match env.get_optional_string("SAAS_INGESTION_ENDPOINT") {
            Sourced { value: None, .. } => match file.transport.endpoint {
                Some(endpoint) if !endpoint.trim().is_empty() => {
                    Sourced::from_file(Some(endpoint.trim().to_string()), &origin)
                }
                _ => Sourced::default_value(None),
            },
            from_env => from_env,
        };
        let credentials = Credentials::new(
            env.get_optional_string("SAAS_INGESTION_TOKEN").into_inner(),
            env.get_optional_string("SAAS_INGESTION_API_KEY").into_inner(),
        );

        let timeout_ms = env
            .get_u64_range("SAAS_INGESTION_TIMEOUT_MS", DEFAULT_TIMEOUT_MS, 1, MAX_TIMEOUT_MS)
            .or_file(file.transport.timeout_ms, &origin);
        let max_retries = env
            .get_u32_range("SAAS_INGESTION_MAX_RETRIES", DEFAULT_MAX_RETRIES, 0, MAX_RETRIES)
            .or_file(file.transport.max_retries, &origin);
        let retry_base_delay_ms = env
            .get_u64_range(
                "SAAS_INGESTION_RETRY_BASE_DELAY_MS",
                DEFAULT_RETRY_BASE_DELAY_MS,
                1,
                MAX_RETRY_BASE_DELAY_MS,
            )
            .or_file(file.transport.retry_base_delay_ms, &origin);

        let paths = ArtifactPaths {
            payload: env
                .get_path("SAAS_INGESTION_PAYLOAD_PATH", DEFAULT_PAYLOAD_PATH)
                .or_file(file.paths.payload, &origin)
                .into_inner(),
            audit: env
                .get_path("SAAS_INGESTION_AUDIT_PATH", DEFAULT_AUDIT_PATH)
                .or_file(file.paths.audit, &origin)
                .into_inner(),
            metrics: env
                .get_path("SAAS_INGESTION_METRICS_PATH", DEFAULT_METRICS_PATH)
                .or_file(file.paths.metrics, &origin)
                .into_inner(),
        };
        let paths = ArtifactPaths {
            payload: resolve(repo_root, paths.payload),
            audit: resolve(repo_root, paths.audit),
            metrics: resolve(repo_root, paths.metrics),
        };

        let redaction_key = RedactionKey::from_configured(
            env.get_optional_string("GOVERNANCE_REDACTION_KEY")
                .into_inner()
                .as_deref(),
        );

        if env.has_errors() {
            return Err(ConfigError::Env(env.take_errors()));
        }

        let config = Self {
            repo_root: repo_root.to_path_buf(),
            config_file,
            endpoint,
            credentials,
            timeout_ms,
            max_retries,
            retry_base_delay_ms,
            paths,
            auth_policy: file.auth,
            governance_policy: file.governance_policy.map(|p| resolve(repo_root, p)),
            redaction_key,
        };
        debug!(
            endpoint = %config.endpoint.value.as_deref().unwrap_or("<unset>"),
            timeout_ms = %config.timeout_ms,
            max_retries = %config.max_retries,
            audit = %config.paths.audit.display(),
            "Loaded ingestion configuration"
        );
        Ok(config)
    }

    /// Transport limits with zero values sanitised.
    pub fn limits(&self) -> TransportLimits {
        TransportLimits::sanitized(
            self.timeout_ms.value,
            self.max_retries.value,
            self.retry_base_delay_ms.value,
        )
    }

    /// The configured governance policy with this config's redaction key.
    pub fn governance(&self) -> Result<Option<Governance>, ConfigError> {
        let Some(path) = &self.governance_policy else {
            return Ok(None);
        };
        let policy = governance::load_policy(path)?;
        Ok(Some(Governance::new(policy, self.redaction_key.clone())))
    }
}
