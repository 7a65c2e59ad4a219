//! Tenant/repository governance: isolation, retention and privacy.
//!
//! A [`GovernancePolicy`] is issued per tenant/repository pair and never
//! mutated. Its canonical hash ([`fingerprint`]) identifies it when comparing
//! the issued policy with the one being enforced.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use pumuki_common::canonical::canonical_digest;
use pumuki_common::contract::IngestionPayload;
use pumuki_common::errors::ErrorCode;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

use crate::audit::AuditEvent;

pub const DEFAULT_AUDIT_EVENTS_TTL_DAYS: i64 = 90;
pub const DEFAULT_METRICS_TTL_DAYS: i64 = 365;
pub const DEFAULT_CONTRACT_TTL_DAYS: i64 = 30;

/// Key used when no redaction key is configured.
pub const DEFAULT_REDACTION_KEY: &[u8] = b"pumuki-governance-redaction-v1";
pub const REDACTION_TOKEN_PREFIX: &str = "hmac-sha256:";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyVersion {
    #[default]
    #[serde(rename = "1")]
    V1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IsolationPolicy {
    pub enforce_tenant_header: bool,
    pub enforce_repository_header: bool,
    pub block_on_mismatch: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionPolicy {
    pub audit_events_ttl_days: i64,
    pub metrics_ttl_days: i64,
    pub contract_ttl_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrivacyPolicy {
    pub redact_tenant_id: bool,
    pub redact_repository_id: bool,
    pub hash_payload_hash: bool,
    pub allow_raw_path_labels: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GovernancePolicy {
    pub version: PolicyVersion,
    pub generated_at: String,
    pub tenant_id: String,
    pub repository_id: String,
    pub isolation: IsolationPolicy,
    pub retention: RetentionPolicy,
    pub privacy: PrivacyPolicy,
}

/// Inputs to [`create_policy`]. Unset fields take the documented defaults.
#[derive(Debug, Clone, Default)]
pub struct PolicyParams {
    pub tenant_id: String,
    pub repository_id: String,
    pub generated_at: Option<String>,
    pub audit_events_ttl_days: Option<i64>,
    pub metrics_ttl_days: Option<i64>,
    pub contract_ttl_days: Option<i64>,
    pub redact_tenant_id: bool,
    pub redact_repository_id: bool,
    pub hash_payload_hash: bool,
    pub allow_raw_path_labels: Option<bool>,
}

impl PolicyParams {
    pub fn new(tenant_id: impl Into<String>, repository_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            repository_id: repository_id.into(),
            ..Self::default()
        }
    }
}

fn positive_or(value: Option<i64>, fallback: i64) -> i64 {
    value.filter(|days| *days > 0).unwrap_or(fallback)
}

/// Issue a policy. Isolation is fully enforced; redaction is off.
pub fn create_policy(params: PolicyParams) -> GovernancePolicy {
    GovernancePolicy {
        version: PolicyVersion::V1,
        generated_at: params
            .generated_at
            .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        tenant_id: params.tenant_id,
        repository_id: params.repository_id,
        isolation: IsolationPolicy {
            enforce_tenant_header: true,
            enforce_repository_header: true,
            block_on_mismatch: true,
        },
        retention: RetentionPolicy {
            audit_events_ttl_days: positive_or(
                params.audit_events_ttl_days,
                DEFAULT_AUDIT_EVENTS_TTL_DAYS,
            ),
            metrics_ttl_days: positive_or(params.metrics_ttl_days, DEFAULT_METRICS_TTL_DAYS),
            contract_ttl_days: positive_or(params.contract_ttl_days, DEFAULT_CONTRACT_TTL_DAYS),
        },
        privacy: PrivacyPolicy {
            redact_tenant_id: params.redact_tenant_id,
            redact_repository_id: params.redact_repository_id,
            hash_payload_hash: params.hash_payload_hash,
            allow_raw_path_labels: params.allow_raw_path_labels.unwrap_or(true),
        },
    }
}

/// Canonical hash of the policy.
pub fn fingerprint(policy: &GovernancePolicy) -> String {
    // Strings, bools and integers only.
    canonical_digest(policy).unwrap_or_default()
}

// ── Violations ───────────────────────────────────────────────────────────

/// A policy that must block ingestion until fixed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GovernanceViolation {
    #[error("tenant_mismatch: policy tenant '{policy}' does not match '{actual}'")]
    TenantMismatch { policy: String, actual: String },

    #[error("repository_mismatch: policy repository '{policy}' does not match '{actual}'")]
    RepositoryMismatch { policy: String, actual: String },

    #[error("retention_invalid: every TTL must be positive")]
    RetentionInvalid,

    #[error("privacy_invalid: redact_tenant_id requires redact_repository_id")]
    PrivacyInvalid,

    #[error("isolation_header_missing: {header}")]
    IsolationHeaderMissing { header: &'static str },

    #[error("isolation_header_mismatch: {header} is '{actual}', policy expects '{expected}'")]
    IsolationHeaderMismatch {
        header: &'static str,
        expected: String,
        actual: String,
    },
}

impl GovernanceViolation {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::TenantMismatch { .. } => "tenant_mismatch",
            Self::RepositoryMismatch { .. } => "repository_mismatch",
            Self::RetentionInvalid => "retention_invalid",
            Self::PrivacyInvalid => "privacy_invalid",
            Self::IsolationHeaderMissing { .. } => "isolation_header_missing",
            Self::IsolationHeaderMismatch { .. } => "isolation_header_mismatch",
        }
    }

    #[must_use]
    pub const fn catalog_code(&self) -> ErrorCode {
        match self {
            Self::TenantMismatch { .. } => ErrorCode::GovernanceTenantMismatch,
            Self::RepositoryMismatch { .. } => ErrorCode::GovernanceRepositoryMismatch,
            Self::RetentionInvalid => ErrorCode::GovernanceRetentionInvalid,
            Self::PrivacyInvalid => ErrorCode::GovernancePrivacyInvalid,
            Self::IsolationHeaderMissing { .. } => ErrorCode::GovernanceIsolationHeaderMissing,
            Self::IsolationHeaderMismatch { .. } => ErrorCode::GovernanceIsolationHeaderMismatch,
        }
    }
}

/// Check the policy is internally consistent and scoped to `payload`.
pub fn validate(policy: &GovernancePolicy, payload: &IngestionPayload) -> Result<(), GovernanceViolation> {
    if policy.tenant_id != payload.tenant_id {
        return Err(GovernanceViolation::TenantMismatch {
            policy: policy.tenant_id.clone(),
            actual: payload.tenant_id.clone(),
        });
    }
    if policy.repository_id != payload.repository.repository_id {
        return Err(GovernanceViolation::RepositoryMismatch {
            policy: policy.repository_id.clone(),
            actual: payload.repository.repository_id.clone(),
        });
    }
    let retention = &policy.retention;
    if retention.audit_events_ttl_days <= 0
        || retention.metrics_ttl_days <= 0
        || retention.contract_ttl_days <= 0
    {
        return Err(GovernanceViolation::RetentionInvalid);
    }
    if policy.privacy.redact_tenant_id && !policy.privacy.redact_repository_id {
        return Err(GovernanceViolation::PrivacyInvalid);
    }
    Ok(())
}

fn check_header(
    enforce: bool,
    block: bool,
    header: &'static str,
    expected: &str,
    actual: Option<&str>,
) -> Result<(), GovernanceViolation> {
    if !enforce {
        return Ok(());
    }
    let violation = match actual.map(str::trim).filter(|v| !v.is_empty()) {
        None => GovernanceViolation::IsolationHeaderMissing { header },
        Some(value) if value != expected => GovernanceViolation::IsolationHeaderMismatch {
            header,
            expected: expected.to_string(),
            actual: value.to_string(),
        },
        Some(_) => return Ok(()),
    };
    if block {
        return Err(violation);
    }
    warn!(code = violation.code(), header, "Isolation mismatch tolerated by policy");
    Ok(())
}

/// Enforce the isolation flags on a received request's scope headers.
pub fn check_isolation(
    policy: &GovernancePolicy,
    tenant_header: Option<&str>,
    repository_header: Option<&str>,
) -> Result<(), GovernanceViolation> {
    let isolation = &policy.isolation;
    check_header(
        isolation.enforce_tenant_header,
        isolation.block_on_mismatch,
        "x-tenant-id",
        &policy.tenant_id,
        tenant_header,
    )?;
    check_header(
        isolation.enforce_repository_header,
        isolation.block_on_mismatch,
        "x-repository-id",
        &policy.repository_id,
        repository_header,
    )
}

// ── Retention ────────────────────────────────────────────────────────────

/// Oldest `event_at` still retained for audit events.
pub fn retention_cutoff(policy: &GovernancePolicy, now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(policy.retention.audit_events_ttl_days.max(0))
}

/// Whether an event stamped `event_at` is at or after `cutoff`. Unparsable
/// timestamps are not retained.
pub fn is_retained(event_at: &str, cutoff: DateTime<Utc>) -> bool {
    DateTime::parse_from_rfc3339(event_at)
        .map(|at| at.with_timezone(&Utc) >= cutoff)
        .unwrap_or(false)
}

// ── Privacy ──────────────────────────────────────────────────────────────

/// Secret used for redaction tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct RedactionKey(Vec<u8>);

impl RedactionKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Use `configured` when non-blank, else the built-in key.
    pub fn from_configured(configured: Option<&str>) -> Self {
        match configured.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => Self::new(key.as_bytes()),
            None => Self::default(),
        }
    }
}

impl Default for RedactionKey {
    fn default() -> Self {
        Self::new(DEFAULT_REDACTION_KEY)
    }
}

impl fmt::Debug for RedactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RedactionKey(***)")
    }
}

type HmacSha256 = Hmac<Sha256>;

/// `hmac-sha256:` followed by the first 16 hex chars of HMAC-SHA256(value).
pub fn redaction_token(key: &RedactionKey, value: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(&key.0).expect("HMAC accepts keys of any length");
    mac.update(value.as_bytes());
    let digest = format!("{:x}", mac.finalize().into_bytes());
    format!("{REDACTION_TOKEN_PREFIX}{}", &digest[..16])
}

/// Whether `value` has the shape of a redaction token.
pub fn is_redaction_token(value: &str) -> bool {
    value.strip_prefix(REDACTION_TOKEN_PREFIX).is_some_and(|hex| {
        hex.len() == 16 && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    })
}

/// Redact the identity fields of `event` as the policy requires.
///
/// `event_id` is recomputed over the redacted fields, so a stored event never
/// carries a hash of identifiers it no longer contains.
pub fn apply_privacy(event: AuditEvent, policy: &GovernancePolicy, key: &RedactionKey) -> AuditEvent {
    let redact = |flag: bool, value: String| {
        if flag { redaction_token(key, &value) } else { value }
    };
    let mut redacted = AuditEvent {
        tenant_id: redact(policy.privacy.redact_tenant_id, event.tenant_id),
        repository_id: redact(policy.privacy.redact_repository_id, event.repository_id),
        payload_hash: redact(policy.privacy.hash_payload_hash, event.payload_hash),
        ..event
    };
    redacted.event_id = redacted.compute_id();
    redacted
}

/// A policy together with the key its redactions use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Governance {
    pub policy: GovernancePolicy,
    pub redaction_key: RedactionKey,
}

impl Governance {
    pub fn new(policy: GovernancePolicy, redaction_key: RedactionKey) -> Self {
        Self {
            policy,
            redaction_key,
        }
    }

    pub fn validate(&self, payload: &IngestionPayload) -> Result<(), GovernanceViolation> {
        validate(&self.policy, payload)
    }

    pub fn apply_privacy(&self, event: AuditEvent) -> AuditEvent {
        apply_privacy(event, &self.policy, &self.redaction_key)
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.policy)
    }
}

// ── Loading ──────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PolicyLoadError {
    #[error("failed to read governance policy {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("governance policy {path} is invalid: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Load a policy from a JSON file.
pub fn load_policy(path: &Path) -> Result<GovernancePolicy, PolicyLoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| PolicyLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| PolicyLoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditOutcome, build_event_at};
    use crate::transport::{TransportResult, TransportSuccess};
    use pumuki_common::testing::sample_payload;

    fn policy() -> GovernancePolicy {
        create_policy(PolicyParams {
            generated_at: Some("2026-02-26T11:30:00.000Z".to_string()),
            ..PolicyParams::new("tenant-a", "repo-a")
        })
    }

    fn event() -> AuditEvent {
        let payload = sample_payload();
        let result = TransportResult::Success(TransportSuccess {
            status: 202,
            attempts: 1,
            duration_ms: 40,
            idempotency_key: "idem".to_string(),
            request_id: Some("req-1".to_string()),
            response_body: "{}".to_string(),
        });
        build_event_at("https://ingest.example/v1", &payload, &result, "2026-02-26T12:00:00Z")
    }

    #[test]
    fn test_create_policy_defaults() {
        let policy = policy();
        assert_eq!(policy.retention.audit_events_ttl_days, 90);
        assert_eq!(policy.retention.metrics_ttl_days, 365);
        assert_eq!(policy.retention.contract_ttl_days, 30);
        assert!(policy.isolation.enforce_tenant_header);
        assert!(policy.isolation.block_on_mismatch);
        assert!(!policy.privacy.redact_tenant_id);
        assert!(policy.privacy.allow_raw_path_labels);
    }

    #[test]
    fn test_create_policy_replaces_non_positive_ttls() {
        let policy = create_policy(PolicyParams {
            audit_events_ttl_days: Some(0),
            metrics_ttl_days: Some(-3),
            contract_ttl_days: Some(7),
            ..PolicyParams::new("t", "r")
        });
        assert_eq!(policy.retention.audit_events_ttl_days, 90);
        assert_eq!(policy.retention.metrics_ttl_days, 365);
        assert_eq!(policy.retention.contract_ttl_days, 7);
    }

    #[test]
    fn test_validate_scope_and_invariants() {
        let payload = sample_payload();
        assert!(validate(&policy(), &payload).is_ok());

        let other_tenant = GovernancePolicy {
            tenant_id: "tenant-b".to_string(),
            ..policy()
        };
        assert_eq!(validate(&other_tenant, &payload).unwrap_err().code(), "tenant_mismatch");

        let other_repo = GovernancePolicy {
            repository_id: "repo-b".to_string(),
            ..policy()
        };
        assert_eq!(validate(&other_repo, &payload).unwrap_err().code(), "repository_mismatch");

        let mut bad_retention = policy();
        bad_retention.retention.contract_ttl_days = 0;
        assert_eq!(validate(&bad_retention, &payload).unwrap_err().code(), "retention_invalid");
    }

    #[test]
    fn test_tenant_redaction_without_repository_redaction_is_rejected() {
        let mut policy = policy();
        policy.privacy.redact_tenant_id = true;
        policy.privacy.redact_repository_id = false;
        let err = validate(&policy, &sample_payload()).unwrap_err();
        assert_eq!(err, GovernanceViolation::PrivacyInvalid);
    }

    #[test]
    fn test_apply_privacy_redacts_flagged_fields() {
        let mut policy = policy();
        policy.privacy.redact_tenant_id = true;
        policy.privacy.redact_repository_id = true;
        let key = RedactionKey::default();

        let original = event();
        let redacted = apply_privacy(original.clone(), &policy, &key);

        assert!(is_redaction_token(&redacted.tenant_id));
        assert!(is_redaction_token(&redacted.repository_id));
        assert_eq!(redacted.payload_hash, original.payload_hash);
        assert_eq!(redacted.outcome, AuditOutcome::Success);
    }

    #[test]
    fn test_apply_privacy_rehashes_event_id() {
        let mut policy = policy();
        policy.privacy.redact_tenant_id = true;
        policy.privacy.redact_repository_id = true;
        policy.privacy.hash_payload_hash = true;

        let original = event();
        let redacted = apply_privacy(original.clone(), &policy, &RedactionKey::default());

        assert_ne!(redacted.event_id, original.event_id);
        assert_eq!(redacted.event_id, redacted.compute_id());
        assert_eq!(redacted.event_id.len(), 64);
    }

    #[test]
    fn test_apply_privacy_passes_through_when_disabled() {
        let original = event();
        let untouched = apply_privacy(original.clone(), &policy(), &RedactionKey::default());
        assert_eq!(untouched, original);
    }

    #[test]
    fn test_redaction_token_depends_on_key() {
        let a = redaction_token(&RedactionKey::default(), "tenant-a");
        let b = redaction_token(&RedactionKey::new("other"), "tenant-a");
        assert!(is_redaction_token(&a));
        assert_ne!(a, b);
        assert_eq!(a, redaction_token(&RedactionKey::default(), "tenant-a"));
    }

    #[test]
    fn test_redaction_key_from_configured() {
        assert_eq!(RedactionKey::from_configured(Some("  ")), RedactionKey::default());
        assert_eq!(RedactionKey::from_configured(Some("k")), RedactionKey::new("k"));
        assert_eq!(format!("{:?}", RedactionKey::new("secret")), "RedactionKey(***)");
    }

    #[test]
    fn test_fingerprint_tracks_policy_changes() {
        let base = policy();
        assert_eq!(fingerprint(&base), fingerprint(&base.clone()));

        let mut changed = base.clone();
        changed.retention.audit_events_ttl_days = 30;
        assert_ne!(fingerprint(&base), fingerprint(&changed));
    }

    #[test]
    fn test_check_isolation() {
        let policy = policy();
        assert!(check_isolation(&policy, Some("tenant-a"), Some("repo-a")).is_ok());
        assert_eq!(
            check_isolation(&policy, None, Some("repo-a")).unwrap_err().code(),
            "isolation_header_missing"
        );
        assert_eq!(
            check_isolation(&policy, Some("tenant-a"), Some("repo-z")).unwrap_err().code(),
            "isolation_header_mismatch"
        );

        let mut lenient = policy.clone();
        lenient.isolation.block_on_mismatch = false;
        assert!(check_isolation(&lenient, Some("tenant-z"), None).is_ok());

        let mut off = policy;
        off.isolation.enforce_tenant_header = false;
        off.isolation.enforce_repository_header = false;
        assert!(check_isolation(&off, None, None).is_ok());
    }

    #[test]
    fn test_retention_cutoff() {
        let now = DateTime::parse_from_rfc3339("2026-06-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let cutoff = retention_cutoff(&policy(), now);
        assert!(is_retained("2026-05-01T00:00:00Z", cutoff));
        assert!(!is_retained("2026-01-01T00:00:00Z", cutoff));
        assert!(!is_retained("not a date", cutoff));
    }

    #[test]
    fn test_policy_json_rejects_unknown_fields() {
        let mut value = serde_json::to_value(policy()).unwrap();
        assert_eq!(value["version"], "1");
        value["extra"] = serde_json::json!(1);
        assert!(serde_json::from_value::<GovernancePolicy>(value).is_err());
    }

    #[test]
    fn test_load_policy_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, serde_json::to_string(&policy()).unwrap()).unwrap();
        assert_eq!(load_policy(&path).unwrap(), policy());
        assert!(matches!(
            load_policy(&dir.path().join("missing.json")),
            Err(PolicyLoadError::Io { .. })
        ));
    }
}
