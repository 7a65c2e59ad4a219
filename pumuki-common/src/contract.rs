//! Versioned hotspot ingestion contract.
//!
//! This module defines:
//! - the wire payload shipped to the collection backend
//! - the canonical form the integrity hash is computed over
//! - construction from a local hotspots report
//! - strict parsing with integrity verification and upgrade of the `"1.0"`
//!   compatibility alias to the canonical `"1"` version
//! - reading and writing the payload artifact on disk
//!
//! A payload is immutable once built. Any change produces a new payload with a
//! new `integrity.payload_hash`.

use chrono::{DateTime, SecondsFormat, Utc};
use schemars::{JsonSchema, schema::RootSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::canonical::{canonical_digest, is_sha256_hex};
use crate::errors::ErrorCode;
use crate::report::{LocalHotspotsReport, TddBddSnapshot, TddBddStatus};

/// Default artifact location, relative to the repository root.
pub const DEFAULT_PAYLOAD_PATH: &str = ".pumuki/artifacts/hotspots-saas-ingestion-v1.json";
/// Producer identifier every payload must carry.
pub const PRODUCER: &str = "pumuki";

/// Supported contract versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ContractVersion {
    /// Canonical version.
    #[serde(rename = "1")]
    V1,
    /// Compatibility alias accepted on input and upgraded to [`ContractVersion::V1`].
    #[serde(rename = "1.0")]
    V1Compat,
}

impl ContractVersion {
    pub const CANONICAL: Self = Self::V1;
    pub const SUPPORTED: [Self; 2] = [Self::V1, Self::V1Compat];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "1",
            Self::V1Compat => "1.0",
        }
    }

    #[must_use]
    pub const fn is_canonical(self) -> bool {
        matches!(self, Self::V1)
    }

    /// Look up a version by its wire string.
    #[must_use]
    pub fn from_wire(candidate: &str) -> Option<Self> {
        Self::SUPPORTED
            .into_iter()
            .find(|version| version.as_str() == candidate)
    }
}

impl std::fmt::Display for ContractVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the signals were collected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    #[default]
    Local,
    Hook,
    Ci,
}

impl SourceMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Hook => "hook",
            Self::Ci => "ci",
        }
    }
}

impl std::str::FromStr for SourceMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "local" => Ok(Self::Local),
            "hook" => Ok(Self::Hook),
            "ci" => Ok(Self::Ci),
            other => Err(format!("unknown source mode '{other}' (expected local|hook|ci)")),
        }
    }
}

/// Single-valued producer marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Producer {
    #[default]
    #[serde(rename = "pumuki")]
    Pumuki,
}

/// Single-valued integrity algorithm marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum HashAlgorithm {
    #[default]
    #[serde(rename = "sha256")]
    Sha256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RepositoryRef {
    pub repository_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SourceInfo {
    pub producer: Producer,
    pub producer_version: String,
    pub mode: SourceMode,
}

/// Finding counts keyed by enterprise severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SeverityCounts {
    #[serde(rename = "CRITICAL")]
    pub critical: u64,
    #[serde(rename = "HIGH")]
    pub high: u64,
    #[serde(rename = "MEDIUM")]
    pub medium: u64,
    #[serde(rename = "LOW")]
    pub low: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct HotspotEntry {
    pub rank: u32,
    pub path: String,
    pub raw_score: f64,
    pub normalized_score: f64,
    pub findings_total: u64,
    #[serde(alias = "findings_by_enterprise_severity")]
    pub findings_by_severity: SeverityCounts,
    pub findings_distinct_rules: u64,
    pub churn_commits: u64,
    pub churn_distinct_authors: u64,
    pub churn_total_lines: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct HotspotsSection {
    pub top_n: u32,
    pub since_days: u32,
    pub churn_signals: u64,
    pub technical_signals: u64,
    pub ranked: u64,
    pub entries: Vec<HotspotEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TddBddCompliance {
    pub status: TddBddStatus,
    pub in_scope: bool,
    pub slices_total: u64,
    pub slices_valid: u64,
    pub slices_invalid: u64,
    pub waiver_applied: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ComplianceSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tdd_bdd: Option<TddBddCompliance>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Integrity {
    pub algorithm: HashAlgorithm,
    pub payload_hash: String,
}

/// The ingestion payload as shipped over the wire and stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct IngestionPayload {
    pub version: ContractVersion,
    pub generated_at: String,
    pub tenant_id: String,
    pub repository: RepositoryRef,
    pub source: SourceInfo,
    pub hotspots: HotspotsSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance: Option<ComplianceSection>,
    pub integrity: Integrity,
}

impl IngestionPayload {
    #[must_use]
    pub fn repository_id(&self) -> &str {
        &self.repository.repository_id
    }

    #[must_use]
    pub fn payload_hash(&self) -> &str {
        &self.integrity.payload_hash
    }

    /// Recompute the integrity hash over the canonical form of this payload.
    pub fn compute_hash(&self) -> Result<String, ContractError> {
        Ok(canonical_digest(&CanonicalBody::from(self))?)
    }

    /// Whether the stored hash matches the recomputed one.
    pub fn verify_integrity(&self) -> Result<bool, ContractError> {
        Ok(self.compute_hash()? == self.integrity.payload_hash)
    }

    /// Check every structural rule the serde shape cannot express.
    pub fn validate(&self) -> Result<(), ContractError> {
        validate_payload(self).map_err(|reason| ContractError::Schema {
            reason,
            version: Some(self.version.as_str().to_string()),
        })
    }

    /// Pretty JSON for artifacts and the CLI.
    pub fn to_json_pretty(&self) -> Result<String, ContractError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ── Canonical form ───────────────────────────────────────────────────────

#[derive(Serialize)]
struct CanonicalRepository<'a> {
    repository_id: &'a str,
    name: &'a str,
    default_branch: Option<&'a str>,
}

#[derive(Serialize)]
struct CanonicalCompliance<'a> {
    tdd_bdd: &'a TddBddCompliance,
}

/// Everything except `integrity`, with absent optionals normalized to `null`.
#[derive(Serialize)]
struct CanonicalBody<'a> {
    version: ContractVersion,
    generated_at: &'a str,
    tenant_id: &'a str,
    repository: CanonicalRepository<'a>,
    source: &'a SourceInfo,
    hotspots: &'a HotspotsSection,
    compliance: Option<CanonicalCompliance<'a>>,
}

impl<'a> From<&'a IngestionPayload> for CanonicalBody<'a> {
    fn from(payload: &'a IngestionPayload) -> Self {
        Self {
            version: payload.version,
            generated_at: &payload.generated_at,
            tenant_id: &payload.tenant_id,
            repository: CanonicalRepository {
                repository_id: &payload.repository.repository_id,
                name: &payload.repository.name,
                default_branch: payload.repository.default_branch.as_deref(),
            },
            source: &payload.source,
            hotspots: &payload.hotspots,
            compliance: payload
                .compliance
                .as_ref()
                .and_then(|section| section.tdd_bdd.as_ref())
                .map(|tdd_bdd| CanonicalCompliance { tdd_bdd }),
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────────────

/// Contract failures. Always fatal to the payload; it must be rebuilt.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("integrity_hash_mismatch")]
    IntegrityHashMismatch { version: Option<String> },

    #[error("invalid_schema: {reason}")]
    Schema {
        reason: String,
        version: Option<String>,
    },

    #[error("unsupported_version: {version}")]
    UnsupportedVersion { version: String },

    #[error("failed to access contract artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("contract artifact {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode contract: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ContractError {
    /// Diagnostic code shared by every contract failure.
    pub const CODE: &'static str = "CONTRACT_INVALID";

    /// Machine-readable failure kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::IntegrityHashMismatch { .. } => "integrity_hash_mismatch",
            Self::Schema { .. } => "invalid_schema",
            Self::UnsupportedVersion { .. } => "unsupported_version",
            Self::Io { .. } => "artifact_unreadable",
            Self::Json { .. } => "artifact_not_json",
            Self::Encode(_) => "encode_failed",
        }
    }

    /// Version string seen on the rejected input, when one was present.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::IntegrityHashMismatch { version } | Self::Schema { version, .. } => {
                version.as_deref()
            }
            Self::UnsupportedVersion { version } => Some(version),
            _ => None,
        }
    }

    /// Catalog entry for user-facing reporting.
    #[must_use]
    pub const fn catalog_code(&self) -> ErrorCode {
        match self {
            Self::IntegrityHashMismatch { .. } => ErrorCode::ContractIntegrityMismatch,
            Self::Schema { .. } => ErrorCode::ContractInvalidSchema,
            Self::UnsupportedVersion { .. } => ErrorCode::ContractUnsupportedVersion,
            Self::Io { .. } | Self::Json { .. } => ErrorCode::ContractUnreadable,
            Self::Encode(_) => ErrorCode::InternalSerdeError,
        }
    }
}

// ── Validation ───────────────────────────────────────────────────────────

fn require_non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    Ok(())
}

fn validate_payload(payload: &IngestionPayload) -> Result<(), String> {
    if DateTime::parse_from_rfc3339(&payload.generated_at).is_err() {
        return Err(format!(
            "generated_at must be an RFC 3339 timestamp with offset, got '{}'",
            payload.generated_at
        ));
    }
    require_non_empty("tenant_id", &payload.tenant_id)?;
    require_non_empty("repository.repository_id", &payload.repository.repository_id)?;
    require_non_empty("repository.name", &payload.repository.name)?;
    if let Some(branch) = &payload.repository.default_branch {
        require_non_empty("repository.default_branch", branch)?;
    }
    require_non_empty("source.producer_version", &payload.source.producer_version)?;

    let hotspots = &payload.hotspots;
    if hotspots.top_n == 0 {
        return Err("hotspots.top_n must be positive".to_string());
    }
    if hotspots.since_days == 0 {
        return Err("hotspots.since_days must be positive".to_string());
    }
    for (idx, entry) in hotspots.entries.iter().enumerate() {
        if entry.rank == 0 {
            return Err(format!("hotspots.entries[{idx}].rank must be positive"));
        }
        require_non_empty(&format!("hotspots.entries[{idx}].path"), &entry.path)?;
        if !entry.raw_score.is_finite() || entry.raw_score < 0.0 {
            return Err(format!(
                "hotspots.entries[{idx}].raw_score must be a non-negative number"
            ));
        }
        if !(0.0..=1.0).contains(&entry.normalized_score) {
            return Err(format!(
                "hotspots.entries[{idx}].normalized_score must be within 0..=1"
            ));
        }
    }

    if !is_sha256_hex(&payload.integrity.payload_hash) {
        return Err("integrity.payload_hash must be 64 lowercase hex characters".to_string());
    }
    Ok(())
}

// ── Construction ─────────────────────────────────────────────────────────

/// Builds a canonical payload from a local hotspots report.
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    tenant_id: String,
    repository_id: String,
    repository_name: String,
    producer_version: String,
    default_branch: Option<String>,
    source_mode: SourceMode,
    generated_at: Option<String>,
    tdd_bdd: Option<TddBddSnapshot>,
}

impl PayloadBuilder {
    pub fn new(
        tenant_id: impl Into<String>,
        repository_id: impl Into<String>,
        repository_name: impl Into<String>,
        producer_version: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            repository_id: repository_id.into(),
            repository_name: repository_name.into(),
            producer_version: producer_version.into(),
            default_branch: None,
            source_mode: SourceMode::default(),
            generated_at: None,
            tdd_bdd: None,
        }
    }

    /// Set the repository's default branch. Blank values are ignored.
    pub fn default_branch(mut self, branch: impl Into<String>) -> Self {
        let branch = branch.into();
        self.default_branch = (!branch.trim().is_empty()).then_some(branch);
        self
    }

    pub fn source_mode(mut self, mode: SourceMode) -> Self {
        self.source_mode = mode;
        self
    }

    /// Pin the generation timestamp (RFC 3339). Defaults to now.
    pub fn generated_at(mut self, generated_at: impl Into<String>) -> Self {
        self.generated_at = Some(generated_at.into());
        self
    }

    pub fn tdd_bdd(mut self, snapshot: TddBddSnapshot) -> Self {
        self.tdd_bdd = Some(snapshot);
        self
    }

    /// Build and hash the payload.
    pub fn build(self, report: &LocalHotspotsReport) -> Result<IngestionPayload, ContractError> {
        let generated_at = self
            .generated_at
            .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));

        let entries = report
            .hotspots
            .iter()
            .map(|entry| HotspotEntry {
                rank: entry.rank,
                path: entry.path.clone(),
                raw_score: entry.raw_score,
                normalized_score: entry.normalized_score,
                findings_total: entry.findings_total,
                findings_by_severity: SeverityCounts {
                    critical: entry.findings_by_enterprise_severity.critical,
                    high: entry.findings_by_enterprise_severity.high,
                    medium: entry.findings_by_enterprise_severity.medium,
                    low: entry.findings_by_enterprise_severity.low,
                },
                findings_distinct_rules: entry.findings_distinct_rules,
                churn_commits: entry.churn_commits,
                churn_distinct_authors: entry.churn_distinct_authors,
                churn_total_lines: entry.churn_total_lines,
            })
            .collect();

        let compliance = self.tdd_bdd.map(|snapshot| ComplianceSection {
            tdd_bdd: Some(TddBddCompliance {
                status: snapshot.status,
                in_scope: snapshot.scope.in_scope,
                slices_total: snapshot.evidence.slices_total,
                slices_valid: snapshot.evidence.slices_valid,
                slices_invalid: snapshot.evidence.slices_invalid,
                waiver_applied: snapshot.waiver.applied,
            }),
        });

        let mut payload = IngestionPayload {
            version: ContractVersion::CANONICAL,
            generated_at,
            tenant_id: self.tenant_id,
            repository: RepositoryRef {
                repository_id: self.repository_id,
                name: self.repository_name,
                default_branch: self.default_branch,
            },
            source: SourceInfo {
                producer: Producer::Pumuki,
                producer_version: self.producer_version,
                mode: self.source_mode,
            },
            hotspots: HotspotsSection {
                top_n: report.options.top_n,
                since_days: report.options.since_days,
                churn_signals: report.totals.churn_signals,
                technical_signals: report.totals.technical_signals,
                ranked: report.totals.ranked,
                entries,
            },
            compliance,
            integrity: Integrity {
                algorithm: HashAlgorithm::Sha256,
                payload_hash: String::new(),
            },
        };
        payload.integrity.payload_hash = payload.compute_hash()?;
        payload.validate()?;

        debug!(
            tenant_id = %payload.tenant_id,
            repository_id = %payload.repository.repository_id,
            entries = payload.hotspots.entries.len(),
            payload_hash = %payload.integrity.payload_hash,
            "Built ingestion payload"
        );
        Ok(payload)
    }
}

// ── Parsing ──────────────────────────────────────────────────────────────

/// A payload that passed schema and integrity checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedContract {
    /// The payload in canonical version, with a hash matching that version.
    pub contract: IngestionPayload,
    /// The version the input declared, kept for provenance.
    pub source_version: ContractVersion,
}

fn version_candidate(value: &Value) -> Option<String> {
    value
        .get("version")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Validate an untrusted JSON value as an ingestion payload.
///
/// The supplied `integrity.payload_hash` is only ever compared against a
/// recomputed hash, never trusted. Payloads declaring a compatibility version
/// are returned upgraded to the canonical version with a freshly computed hash.
pub fn parse(value: &Value) -> Result<ParsedContract, ContractError> {
    let declared = version_candidate(value);
    if let Some(version) = &declared
        && ContractVersion::from_wire(version).is_none()
    {
        return Err(ContractError::UnsupportedVersion {
            version: version.clone(),
        });
    }

    let payload: IngestionPayload =
        serde_json::from_value(value.clone()).map_err(|err| ContractError::Schema {
            reason: err.to_string(),
            version: declared.clone(),
        })?;
    payload.validate()?;

    if !payload.verify_integrity()? {
        return Err(ContractError::IntegrityHashMismatch { version: declared });
    }

    let source_version = payload.version;
    if source_version.is_canonical() {
        return Ok(ParsedContract {
            contract: payload,
            source_version,
        });
    }

    let mut upgraded = payload;
    upgraded.version = ContractVersion::CANONICAL;
    upgraded.integrity.payload_hash = upgraded.compute_hash()?;
    debug!(
        from = %source_version,
        to = %upgraded.version,
        "Upgraded ingestion payload to canonical version"
    );
    Ok(ParsedContract {
        contract: upgraded,
        source_version,
    })
}

/// Parse a JSON document.
pub fn parse_str(raw: &str) -> Result<ParsedContract, ContractError> {
    let value: Value = serde_json::from_str(raw).map_err(|err| ContractError::Schema {
        reason: err.to_string(),
        version: None,
    })?;
    parse(&value)
}

/// JSON Schema of the canonical payload.
#[must_use]
pub fn contract_json_schema() -> RootSchema {
    schema_for!(IngestionPayload)
}

// ── Artifact I/O ─────────────────────────────────────────────────────────

/// Result of reading the payload artifact from disk.
#[derive(Debug, Clone, PartialEq)]
pub enum ContractArtifact {
    Missing {
        path: PathBuf,
    },
    Invalid {
        path: PathBuf,
        reason: String,
        version: Option<String>,
    },
    Valid {
        path: PathBuf,
        contract: IngestionPayload,
        source_version: ContractVersion,
    },
}

impl ContractArtifact {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Missing { path } | Self::Invalid { path, .. } | Self::Valid { path, .. } => path,
        }
    }

    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Missing { .. } => "missing",
            Self::Invalid { .. } => "invalid",
            Self::Valid { .. } => "valid",
        }
    }
}

/// Read and verify the payload artifact at `path`.
pub fn read_artifact(path: &Path) -> ContractArtifact {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return ContractArtifact::Missing {
                path: path.to_path_buf(),
            };
        }
        Err(err) => {
            return ContractArtifact::Invalid {
                path: path.to_path_buf(),
                reason: err.to_string(),
                version: None,
            };
        }
    };

    match parse_str(&raw) {
        Ok(parsed) => ContractArtifact::Valid {
            path: path.to_path_buf(),
            contract: parsed.contract,
            source_version: parsed.source_version,
        },
        Err(err) => ContractArtifact::Invalid {
            path: path.to_path_buf(),
            reason: match &err {
                ContractError::Schema { reason, .. } => reason.clone(),
                other => other.to_string(),
            },
            version: err.version().map(str::to_string),
        },
    }
}

/// Write the payload artifact as pretty JSON, creating parent directories.
pub fn write_artifact(path: &Path, payload: &IngestionPayload) -> Result<(), ContractError> {
    let io_err = |source| ContractError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut body = payload.to_json_pretty()?;
    body.push('\n');
    std::fs::write(path, body).map_err(io_err)
}
