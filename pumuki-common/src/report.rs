//! Upstream value objects consumed by the contract builder.
//!
//! The local hotspots report and the TDD/BDD evidence snapshot are produced by
//! other Pumuki components. They are treated as already-validated inputs here;
//! this module only knows their JSON shape.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure loading an upstream report file.
#[derive(Debug, Error)]
pub enum ReportLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a valid report: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ReportLoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ReportLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ReportLoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Finding counts per enterprise severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSeverityCounts {
    #[serde(rename = "CRITICAL")]
    pub critical: u64,
    #[serde(rename = "HIGH")]
    pub high: u64,
    #[serde(rename = "MEDIUM")]
    pub medium: u64,
    #[serde(rename = "LOW")]
    pub low: u64,
}

/// A ranked file in the local hotspots report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportHotspot {
    pub rank: u32,
    pub path: String,
    pub raw_score: f64,
    pub normalized_score: f64,
    pub findings_total: u64,
    pub findings_by_enterprise_severity: ReportSeverityCounts,
    pub findings_distinct_rules: u64,
    pub churn_commits: u64,
    pub churn_distinct_authors: u64,
    pub churn_total_lines: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOptions {
    pub top_n: u32,
    pub since_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTotals {
    pub churn_signals: u64,
    pub technical_signals: u64,
    pub ranked: u64,
}

/// Churn + static-analysis hotspot ranking computed locally for one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalHotspotsReport {
    pub generated_at: String,
    pub repo_root: String,
    pub options: ReportOptions,
    pub totals: ReportTotals,
    pub hotspots: Vec<ReportHotspot>,
}

impl LocalHotspotsReport {
    /// Load a report from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, ReportLoadError> {
        load_json(path)
    }
}

/// Outcome of the TDD/BDD evidence gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TddBddStatus {
    Skipped,
    Passed,
    Blocked,
    Waived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TddBddScope {
    pub in_scope: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TddBddEvidence {
    pub slices_total: u64,
    pub slices_valid: u64,
    pub slices_invalid: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TddBddWaiver {
    pub applied: bool,
}

/// Compliance evidence snapshot for the TDD/BDD gate.
///
/// Only the fields the ingestion contract needs are modelled; anything else in
/// the upstream document is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TddBddSnapshot {
    pub status: TddBddStatus,
    pub scope: TddBddScope,
    pub evidence: TddBddEvidence,
    pub waiver: TddBddWaiver,
}

impl TddBddSnapshot {
    /// Load a snapshot from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, ReportLoadError> {
        load_json(path)
    }
}
