//! Fixtures and logging helpers shared by the workspace test suites.

mod log;

pub use log::init_global_test_logging;

use crate::contract::{IngestionPayload, PayloadBuilder};
use crate::report::{
    LocalHotspotsReport, ReportHotspot, ReportOptions, ReportSeverityCounts, ReportTotals,
};

/// Fixed generation time of the sample payloads.
pub const SAMPLE_GENERATED_AT: &str = "2026-02-26T11:30:00+00:00";

/// Build a report hotspot with one finding of the given severity.
pub fn report_hotspot(rank: u32, path: &str, raw_score: f64, severity: &str) -> ReportHotspot {
    let mut counts = ReportSeverityCounts::default();
    match severity {
        "CRITICAL" => counts.critical = 1,
        "HIGH" => counts.high = 1,
        "MEDIUM" => counts.medium = 1,
        "LOW" => counts.low = 1,
        _ => {}
    }
    ReportHotspot {
        rank,
        path: path.to_string(),
        raw_score,
        normalized_score: if raw_score > 0.0 { 1.0 } else { 0.0 },
        findings_total: u64::from(severity != "NONE"),
        findings_by_enterprise_severity: counts,
        findings_distinct_rules: 1,
        churn_commits: 1,
        churn_distinct_authors: 1,
        churn_total_lines: 6,
    }
}

/// A one-entry local hotspots report.
pub fn sample_report() -> LocalHotspotsReport {
    report_with(vec![report_hotspot(1, "apps/backend/src/runtime/hotspot.ts", 10.0, "HIGH")])
}

/// A report over the given hotspots.
pub fn report_with(hotspots: Vec<ReportHotspot>) -> LocalHotspotsReport {
    let ranked = hotspots.len() as u64;
    LocalHotspotsReport {
        generated_at: SAMPLE_GENERATED_AT.to_string(),
        repo_root: "/tmp/repo".to_string(),
        options: ReportOptions {
            top_n: ranked.max(1) as u32,
            since_days: 90,
        },
        totals: ReportTotals {
            churn_signals: ranked,
            technical_signals: ranked,
            ranked,
        },
        hotspots,
    }
}

/// A valid payload for `tenant-a` / `repo-a`.
pub fn sample_payload() -> IngestionPayload {
    payload_for("tenant-a", "repo-a")
}

/// A valid payload for the given scope built from [`sample_report`].
pub fn payload_for(tenant_id: &str, repository_id: &str) -> IngestionPayload {
    payload_from_report(tenant_id, repository_id, &sample_report())
}

/// A valid payload for the given scope built from `report`.
///
/// # Panics
///
/// Panics if the report does not produce a valid payload.
pub fn payload_from_report(
    tenant_id: &str,
    repository_id: &str,
    report: &LocalHotspotsReport,
) -> IngestionPayload {
    PayloadBuilder::new(tenant_id, repository_id, "ast-intelligence-hooks", "6.3.17")
        .generated_at(SAMPLE_GENERATED_AT)
        .build(report)
        .expect("fixture report must build a valid payload")
}
