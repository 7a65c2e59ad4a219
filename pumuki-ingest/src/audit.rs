//! Append-only audit trail of delivery outcomes.
//!
//! One JSON [`AuditEvent`] per line. Readers skip blank and unparsable lines
//! so a torn write never hides the rest of the trail.
//!
//! The log assumes a single writer. Appends from several processes at once
//! are not coordinated, and [`AuditLog::prune`] must not run while another
//! process is appending.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use pumuki_common::canonical::canonical_digest;
use pumuki_common::contract::IngestionPayload;
use pumuki_common::errors::ErrorCode;
use pumuki_common::idempotency::idempotency_key;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::governance::{self, Governance};
use crate::transport::TransportResult;

pub const DEFAULT_AUDIT_PATH: &str = ".pumuki/artifacts/saas-ingestion-audit.ndjson";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Error,
}

/// One terminal delivery outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Hash of every other field.
    pub event_id: String,
    pub event_at: String,
    pub tenant_id: String,
    pub repository_id: String,
    pub endpoint: String,
    pub idempotency_key: String,
    pub payload_hash: String,
    pub outcome: AuditOutcome,
    pub attempts: u32,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

/// Hashed form of an event: absent optionals are hashed as `null`.
#[derive(Serialize)]
struct EventMaterial<'a> {
    event_at: &'a str,
    tenant_id: &'a str,
    repository_id: &'a str,
    endpoint: &'a str,
    idempotency_key: &'a str,
    payload_hash: &'a str,
    outcome: AuditOutcome,
    attempts: u32,
    latency_ms: u64,
    request_id: Option<&'a str>,
    status: Option<u16>,
    error_code: Option<&'a str>,
    retryable: Option<bool>,
}

impl AuditEvent {
    /// Recompute the id from the other fields.
    pub fn compute_id(&self) -> String {
        let material = EventMaterial {
            event_at: &self.event_at,
            tenant_id: &self.tenant_id,
            repository_id: &self.repository_id,
            endpoint: &self.endpoint,
            idempotency_key: &self.idempotency_key,
            payload_hash: &self.payload_hash,
            outcome: self.outcome,
            attempts: self.attempts,
            latency_ms: self.latency_ms,
            request_id: self.request_id.as_deref(),
            status: self.status,
            error_code: self.error_code.as_deref(),
            retryable: self.retryable,
        };
        canonical_digest(&material).unwrap_or_default()
    }

    pub fn is_success(&self) -> bool {
        self.outcome == AuditOutcome::Success
    }
}

/// Build the event for `result`, stamped at `event_at`.
pub fn build_event(
    endpoint: &str,
    payload: &IngestionPayload,
    result: &TransportResult,
    event_at: DateTime<Utc>,
) -> AuditEvent {
    build_event_at(
        endpoint,
        payload,
        result,
        &event_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

/// Same as [`build_event`] with a preformatted timestamp.
pub fn build_event_at(
    endpoint: &str,
    payload: &IngestionPayload,
    result: &TransportResult,
    event_at: &str,
) -> AuditEvent {
    let key = result
        .idempotency_key()
        .map(str::to_string)
        .unwrap_or_else(|| idempotency_key(payload));

    let mut event = AuditEvent {
        event_id: String::new(),
        event_at: event_at.to_string(),
        tenant_id: payload.tenant_id.clone(),
        repository_id: payload.repository.repository_id.clone(),
        endpoint: endpoint.trim().to_string(),
        idempotency_key: key,
        payload_hash: payload.integrity.payload_hash.clone(),
        outcome: AuditOutcome::Success,
        attempts: result.attempts(),
        latency_ms: result.duration_ms(),
        request_id: None,
        status: None,
        error_code: None,
        retryable: None,
    };
    match result {
        TransportResult::Success(ok) => {
            event.status = Some(ok.status);
            event.request_id = ok.request_id.clone();
        }
        TransportResult::Error(err) => {
            event.outcome = AuditOutcome::Error;
            event.status = err.status;
            event.error_code = Some(err.code.as_str().to_string());
            event.retryable = Some(err.retryable);
        }
    }
    event.event_id = event.compute_id();
    event
}

/// Keep the first event for each `event_id`, preserving order.
pub fn dedupe_events(events: Vec<AuditEvent>) -> Vec<AuditEvent> {
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|event| seen.insert(event.event_id.clone()))
        .collect()
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to write audit log {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read audit log {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode audit event: {0}")]
    Encode(#[from] serde_json::Error),
}

impl AuditError {
    pub const fn catalog_code(&self) -> ErrorCode {
        match self {
            Self::Write { .. } | Self::Encode(_) => ErrorCode::AuditWriteFailed,
            Self::Read { .. } => ErrorCode::AuditReadFailed,
        }
    }
}

/// Outcome of [`AuditLog::prune`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub kept: usize,
    /// Expired events plus unparsable lines.
    pub removed: usize,
}

/// The newline-delimited audit file.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_error(&self, source: std::io::Error) -> AuditError {
        AuditError::Write {
            path: self.path.clone(),
            source,
        }
    }

    /// Append one event as a single line.
    pub fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| self.write_error(e))?;
        }
        let line = serde_json::to_string(event)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.write_error(e))?;
        writeln!(file, "{line}").map_err(|e| self.write_error(e))?;
        file.flush().map_err(|e| self.write_error(e))?;
        debug!(event_id = %event.event_id, path = %self.path.display(), "Appended audit event");
        Ok(())
    }

    /// Build, optionally redact, and append the event for `result`.
    pub fn record(
        &self,
        endpoint: &str,
        payload: &IngestionPayload,
        result: &TransportResult,
        governance: Option<&Governance>,
        event_at: DateTime<Utc>,
    ) -> Result<AuditEvent, AuditError> {
        let event = build_event(endpoint, payload, result, event_at);
        let event = match governance {
            Some(governance) => governance.apply_privacy(event),
            None => event,
        };
        self.append(&event)?;
        Ok(event)
    }

    /// Raw file bytes, or `None` when the log does not exist yet.
    fn read_raw(&self) -> Result<Option<Vec<u8>>, AuditError> {
        match fs::read(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(AuditError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Every parsable event in file order. A missing file reads as empty.
    pub fn read_events(&self) -> Result<Vec<AuditEvent>, AuditError> {
        let Some(raw) = self.read_raw()? else {
            return Ok(Vec::new());
        };

        let mut events = Vec::new();
        for line in non_blank_lines(&raw) {
            match serde_json::from_slice::<AuditEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) => warn!("Skipping invalid audit line: {}", e),
            }
        }
        debug!("Loaded {} audit events from {:?}", events.len(), self.path);
        Ok(events)
    }

    /// Most recently appended event.
    pub fn latest(&self) -> Result<Option<AuditEvent>, AuditError> {
        Ok(self.read_events()?.pop())
    }

    /// Rewrite the log keeping only events inside the audit retention window.
    pub fn prune(
        &self,
        policy: &governance::GovernancePolicy,
        now: DateTime<Utc>,
    ) -> Result<PruneReport, AuditError> {
        let Some(raw) = self.read_raw()? else {
            return Ok(PruneReport::default());
        };

        let cutoff = governance::retention_cutoff(policy, now);
        let mut report = PruneReport::default();
        let mut kept = Vec::new();
        for line in non_blank_lines(&raw) {
            match serde_json::from_slice::<AuditEvent>(line) {
                Ok(event) if governance::is_retained(&event.event_at, cutoff) => {
                    kept.push(line);
                    report.kept += 1;
                }
                _ => report.removed += 1,
            }
        }

        let temp_path = self.path.with_extension("tmp");
        {
            let mut file = File::create(&temp_path).map_err(|e| self.write_error(e))?;
            for line in &kept {
                file.write_all(line).map_err(|e| self.write_error(e))?;
                file.write_all(b"\n").map_err(|e| self.write_error(e))?;
            }
        }
        fs::rename(&temp_path, &self.path).map_err(|e| self.write_error(e))?;

        info!(
            kept = report.kept,
            removed = report.removed,
            cutoff = %cutoff.to_rfc3339(),
            "Pruned audit log"
        );
        Ok(report)
    }
}

/// Newline-separated records, skipping blank ones. Lines stay raw bytes so a
/// record that is not valid UTF-8 only fails its own parse.
fn non_blank_lines(raw: &[u8]) -> impl Iterator<Item = &[u8]> {
    raw.split(|byte| *byte == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::{PolicyParams, RedactionKey, create_policy, is_redaction_token};
    use crate::transport::{TransportErrorCode, TransportFailure, TransportSuccess};
    use pumuki_common::testing::sample_payload;
    use tempfile::TempDir;

    const ENDPOINT: &str = "https://ingest.example/v1/hotspots";

    fn success() -> TransportResult {
        TransportResult::Success(TransportSuccess {
            status: 202,
            attempts: 1,
            duration_ms: 35,
            idempotency_key: "idem-1".to_string(),
            request_id: Some("req-1".to_string()),
            response_body: "{}".to_string(),
        })
    }

    fn failure() -> TransportResult {
        TransportResult::Error(TransportFailure {
            code: TransportErrorCode::HttpStatus,
            attempts: 3,
            duration_ms: 900,
            idempotency_key: None,
            message: "http_status_503".to_string(),
            retryable: true,
            status: Some(503),
            response_body: Some("busy".to_string()),
        })
    }

    fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_event_id_is_deterministic() {
        let payload = sample_payload();
        let a = build_event_at(ENDPOINT, &payload, &success(), "2026-02-26T12:00:00.000Z");
        let b = build_event_at(ENDPOINT, &payload, &success(), "2026-02-26T12:00:00.000Z");
        assert_eq!(a.event_id, b.event_id);
        assert_eq!(a.event_id, a.compute_id());
        assert_eq!(a.event_id.len(), 64);

        let later = build_event_at(ENDPOINT, &payload, &success(), "2026-02-26T12:00:01.000Z");
        assert_ne!(a.event_id, later.event_id);
    }

    #[test]
    fn test_success_event_fields() {
        let event = build_event_at(ENDPOINT, &sample_payload(), &success(), "2026-02-26T12:00:00Z");
        assert_eq!(event.outcome, AuditOutcome::Success);
        assert_eq!(event.idempotency_key, "idem-1");
        assert_eq!(event.status, Some(202));
        assert_eq!(event.request_id.as_deref(), Some("req-1"));
        assert_eq!(event.error_code, None);
        assert_eq!(event.retryable, None);
    }

    #[test]
    fn test_error_event_derives_missing_idempotency_key() {
        let payload = sample_payload();
        let event = build_event_at(ENDPOINT, &payload, &failure(), "2026-02-26T12:00:00Z");
        assert_eq!(event.outcome, AuditOutcome::Error);
        assert_eq!(event.idempotency_key, idempotency_key(&payload));
        assert_eq!(event.error_code.as_deref(), Some("HTTP_STATUS"));
        assert_eq!(event.retryable, Some(true));
        assert_eq!(event.status, Some(503));
        assert_eq!(event.attempts, 3);
        assert_eq!(event.latency_ms, 900);
    }

    #[test]
    fn test_append_and_read_skip_corrupt_lines() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path().join("nested/audit.ndjson"));
        let payload = sample_payload();

        let first = log
            .record(ENDPOINT, &payload, &success(), None, at("2026-02-26T12:00:00Z"))
            .unwrap();
        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        writeln!(file, "{{\"event_id\": \"trunc").unwrap();
        writeln!(file).unwrap();
        let second = log
            .record(ENDPOINT, &payload, &failure(), None, at("2026-02-26T12:05:00Z"))
            .unwrap();

        let events = log.read_events().unwrap();
        assert_eq!(events, vec![first, second.clone()]);
        assert_eq!(log.latest().unwrap(), Some(second));
    }

    #[test]
    fn test_read_and_prune_skip_non_utf8_lines() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path().join("audit.ndjson"));
        let payload = sample_payload();

        let first = log
            .record(ENDPOINT, &payload, &success(), None, at("2026-05-20T00:00:00Z"))
            .unwrap();
        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        file.write_all(b"\xe2\x82\n").unwrap();
        let second = log
            .record(ENDPOINT, &payload, &failure(), None, at("2026-05-21T00:00:00Z"))
            .unwrap();

        assert_eq!(log.read_events().unwrap(), vec![first.clone(), second.clone()]);

        let policy = create_policy(PolicyParams::new("tenant-a", "repo-a"));
        let report = log.prune(&policy, at("2026-06-01T00:00:00Z")).unwrap();
        assert_eq!(report, PruneReport { kept: 2, removed: 1 });
        assert_eq!(log.read_events().unwrap(), vec![first, second]);
        assert!(std::str::from_utf8(&fs::read(log.path()).unwrap()).is_ok());
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path().join("absent.ndjson"));
        assert!(log.read_events().unwrap().is_empty());
        assert_eq!(log.latest().unwrap(), None);
    }

    #[test]
    fn test_record_applies_governance_redaction() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path().join("audit.ndjson"));
        let mut policy = create_policy(PolicyParams::new("tenant-a", "repo-a"));
        policy.privacy.redact_tenant_id = true;
        policy.privacy.redact_repository_id = true;
        policy.privacy.hash_payload_hash = true;
        let governance = Governance::new(policy, RedactionKey::default());

        let event = log
            .record(
                ENDPOINT,
                &sample_payload(),
                &success(),
                Some(&governance),
                at("2026-02-26T12:00:00Z"),
            )
            .unwrap();
        assert!(is_redaction_token(&event.tenant_id));
        assert!(is_redaction_token(&event.repository_id));
        assert!(is_redaction_token(&event.payload_hash));
        assert_eq!(event.event_id, event.compute_id());

        let stored = log.read_events().unwrap();
        assert_eq!(stored, vec![event]);
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let payload = sample_payload();
        let a = build_event_at(ENDPOINT, &payload, &success(), "2026-02-26T12:00:00Z");
        let b = build_event_at(ENDPOINT, &payload, &failure(), "2026-02-26T12:00:00Z");
        let deduped = dedupe_events(vec![a.clone(), b.clone(), a.clone()]);
        assert_eq!(deduped, vec![a, b]);
    }

    #[test]
    fn test_prune_drops_expired_and_corrupt_lines() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path().join("audit.ndjson"));
        let payload = sample_payload();

        log.record(ENDPOINT, &payload, &success(), None, at("2025-01-01T00:00:00Z"))
            .unwrap();
        let recent = log
            .record(ENDPOINT, &payload, &success(), None, at("2026-05-20T00:00:00Z"))
            .unwrap();
        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        writeln!(file, "not json").unwrap();

        let policy = create_policy(PolicyParams::new("tenant-a", "repo-a"));
        let report = log.prune(&policy, at("2026-06-01T00:00:00Z")).unwrap();

        assert_eq!(report, PruneReport { kept: 1, removed: 2 });
        assert_eq!(log.read_events().unwrap(), vec![recent]);
        assert!(!dir.path().join("audit.tmp").exists());
    }

    #[test]
    fn test_prune_missing_log_is_noop() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path().join("absent.ndjson"));
        let policy = create_policy(PolicyParams::new("t", "r"));
        assert_eq!(log.prune(&policy, Utc::now()).unwrap(), PruneReport::default());
        assert!(!log.path().exists());
    }
}
