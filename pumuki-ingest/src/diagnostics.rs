//! Publish health report over the contract, audit and metrics artifacts.

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use pumuki_common::contract::{ContractArtifact, ContractVersion, read_artifact};
use serde::Serialize;

use crate::audit::{AuditError, AuditEvent, AuditLog};
use crate::config::ArtifactPaths;
use crate::metrics::{MetricsSnapshot, MetricsWriteError, write_metrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticsStatus {
    Healthy,
    Degraded,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    ContractMissing,
    ContractInvalid,
    AuditEmpty,
    PublishErrorsPresent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticIssue {
    pub severity: IssueSeverity,
    pub code: IssueCode,
    pub message: String,
}

/// What the contract artifact looks like on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ContractSummary {
    Missing {
        path: PathBuf,
    },
    Invalid {
        path: PathBuf,
        reason: String,
    },
    Valid {
        path: PathBuf,
        source_version: ContractVersion,
        tenant_id: String,
        repository_id: String,
        payload_hash: String,
    },
}

impl From<&ContractArtifact> for ContractSummary {
    fn from(artifact: &ContractArtifact) -> Self {
        match artifact {
            ContractArtifact::Missing { path } => Self::Missing { path: path.clone() },
            ContractArtifact::Invalid { path, reason, .. } => Self::Invalid {
                path: path.clone(),
                reason: reason.clone(),
            },
            ContractArtifact::Valid {
                path,
                contract,
                source_version,
            } => Self::Valid {
                path: path.clone(),
                source_version: *source_version,
                tenant_id: contract.tenant_id.clone(),
                repository_id: contract.repository.repository_id.clone(),
                payload_hash: contract.integrity.payload_hash.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditSummary {
    pub path: PathBuf,
    pub events: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_event: Option<AuditEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub path: PathBuf,
    pub snapshot: MetricsSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishDiagnostics {
    pub generated_at: String,
    pub status: DiagnosticsStatus,
    pub contract: ContractSummary,
    pub audit: AuditSummary,
    pub metrics: MetricsSummary,
    pub issues: Vec<DiagnosticIssue>,
}

#[derive(Debug, thiserror::Error)]
pub enum DiagnosticsError {
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error(transparent)]
    Metrics(#[from] MetricsWriteError),
}

/// Status implied by a set of issues.
pub fn status_for(issues: &[DiagnosticIssue]) -> DiagnosticsStatus {
    match issues.iter().map(|issue| issue.severity).max() {
        Some(IssueSeverity::Error) => DiagnosticsStatus::Blocked,
        Some(IssueSeverity::Warning) => DiagnosticsStatus::Degraded,
        None => DiagnosticsStatus::Healthy,
    }
}

/// Inspect the artifacts and refresh the metrics file.
pub fn diagnose(paths: &ArtifactPaths, now: DateTime<Utc>) -> Result<PublishDiagnostics, DiagnosticsError> {
    let artifact = read_artifact(&paths.payload);
    let log = AuditLog::new(&paths.audit);
    let events = log.read_events()?;
    let snapshot = MetricsSnapshot::new(&paths.audit, &events, now);
    write_metrics(&paths.metrics, &snapshot)?;

    let mut issues = Vec::new();
    match &artifact {
        ContractArtifact::Missing { .. } => issues.push(DiagnosticIssue {
            severity: IssueSeverity::Warning,
            code: IssueCode::ContractMissing,
            message: "No contract payload found for ingestion diagnostics.".to_string(),
        }),
        ContractArtifact::Invalid { reason, .. } => issues.push(DiagnosticIssue {
            severity: IssueSeverity::Error,
            code: IssueCode::ContractInvalid,
            message: reason.clone(),
        }),
        ContractArtifact::Valid { .. } => {}
    }
    if events.is_empty() {
        issues.push(DiagnosticIssue {
            severity: IssueSeverity::Warning,
            code: IssueCode::AuditEmpty,
            message: "No ingestion audit events were found.".to_string(),
        });
    }
    let failed = snapshot.metrics.totals.error;
    if failed > 0 {
        issues.push(DiagnosticIssue {
            severity: IssueSeverity::Error,
            code: IssueCode::PublishErrorsPresent,
            message: format!("Detected {failed} failed publish events."),
        });
    }

    Ok(PublishDiagnostics {
        generated_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        status: status_for(&issues),
        contract: ContractSummary::from(&artifact),
        audit: AuditSummary {
            path: paths.audit.clone(),
            events: events.len(),
            latest_event: events.last().cloned(),
        },
        metrics: MetricsSummary {
            path: paths.metrics.clone(),
            snapshot,
        },
        issues,
    })
}
