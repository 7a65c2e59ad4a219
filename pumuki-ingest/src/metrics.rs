//! Delivery metrics aggregated over the audit trail.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::audit::{AuditEvent, AuditOutcome};

pub const DEFAULT_METRICS_PATH: &str = ".pumuki/artifacts/saas-ingestion-metrics.json";

/// Bucket for error events without a code.
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub events: usize,
    pub success: usize,
    pub error: usize,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AttemptStats {
    pub avg: f64,
    pub max: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub min: u64,
    pub max: u64,
    pub avg: f64,
    pub p50: u64,
    pub p95: u64,
}

/// Aggregate view of a set of audit events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryMetrics {
    pub totals: Totals,
    pub attempts: AttemptStats,
    pub latency_ms: LatencyStats,
    pub errors_by_code: BTreeMap<String, usize>,
}

/// The metrics artifact document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub generated_at: String,
    pub source_path: PathBuf,
    #[serde(flatten)]
    pub metrics: DeliveryMetrics,
}

impl MetricsSnapshot {
    pub fn new(source_path: &Path, events: &[AuditEvent], generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at: generated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            source_path: source_path.to_path_buf(),
            metrics: aggregate(events),
        }
    }
}

/// Round to 6 decimal places.
pub fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Value at index `ceil(q*n) - 1` of an ascending sample, clamped to range.
/// Zero for an empty sample.
pub fn percentile(sorted: &[u64], q: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (q * sorted.len() as f64).ceil() as i64 - 1;
    let index = rank.clamp(0, sorted.len() as i64 - 1) as usize;
    sorted[index]
}

fn mean<I: IntoIterator<Item = f64>>(values: I, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    round6(values.into_iter().sum::<f64>() / count as f64)
}

/// Pure aggregation over `events`.
pub fn aggregate(events: &[AuditEvent]) -> DeliveryMetrics {
    let count = events.len();
    let success = events.iter().filter(|e| e.outcome == AuditOutcome::Success).count();
    let success_rate = if count == 0 {
        0.0
    } else {
        round6(success as f64 / count as f64)
    };

    let mut latencies: Vec<u64> = events.iter().map(|e| e.latency_ms).collect();
    latencies.sort_unstable();

    let mut errors_by_code = BTreeMap::new();
    for event in events.iter().filter(|e| e.outcome == AuditOutcome::Error) {
        let code = event
            .error_code
            .as_deref()
            .filter(|code| !code.is_empty())
            .unwrap_or(UNKNOWN_ERROR_CODE);
        *errors_by_code.entry(code.to_string()).or_insert(0) += 1;
    }

    DeliveryMetrics {
        totals: Totals {
            events: count,
            success,
            error: count - success,
            success_rate,
        },
        attempts: AttemptStats {
            avg: mean(events.iter().map(|e| f64::from(e.attempts)), count),
            max: events.iter().map(|e| e.attempts).max().unwrap_or(0),
        },
        latency_ms: LatencyStats {
            min: latencies.first().copied().unwrap_or(0),
            max: latencies.last().copied().unwrap_or(0),
            avg: mean(latencies.iter().map(|&l| l as f64), count),
            p50: percentile(&latencies, 0.5),
            p95: percentile(&latencies, 0.95),
        },
        errors_by_code,
    }
}

#[derive(Debug, Error)]
#[error("failed to write metrics artifact {path}: {source}")]
pub struct MetricsWriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Overwrite `path` with the snapshot as pretty JSON.
pub fn write_metrics(path: &Path, snapshot: &MetricsSnapshot) -> Result<(), MetricsWriteError> {
    let wrap = |source| MetricsWriteError {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(wrap)?;
    }
    let json = serde_json::to_string_pretty(snapshot).map_err(|e| wrap(e.into()))?;
    fs::write(path, format!("{json}\n")).map_err(wrap)?;
    info!(
        path = %path.display(),
        events = snapshot.metrics.totals.events,
        success_rate = snapshot.metrics.totals.success_rate,
        "Wrote ingestion metrics"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(outcome: AuditOutcome, attempts: u32, latency_ms: u64, code: Option<&str>) -> AuditEvent {
        AuditEvent {
            event_id: format!("{outcome:?}-{attempts}-{latency_ms}"),
            event_at: "2026-02-26T12:00:00Z".to_string(),
            tenant_id: "tenant-a".to_string(),
            repository_id: "repo-a".to_string(),
            endpoint: "https://ingest.example".to_string(),
            idempotency_key: "k".to_string(),
            payload_hash: "h".to_string(),
            outcome,
            attempts,
            latency_ms,
            request_id: None,
            status: None,
            error_code: code.map(str::to_string),
            retryable: None,
        }
    }

    #[test]
    fn test_empty_events_are_all_zero() {
        let metrics = aggregate(&[]);
        assert_eq!(metrics, DeliveryMetrics::default());
        assert_eq!(metrics.totals.success_rate, 0.0);
        assert_eq!(metrics.latency_ms.p95, 0);
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let sample: Vec<u64> = (1..=10).map(|n| n * 10).collect();
        assert_eq!(percentile(&sample, 0.95), 100);
        assert_eq!(percentile(&sample, 0.5), 50);
        assert_eq!(percentile(&sample, 0.0), 10);
        assert_eq!(percentile(&sample, 1.5), 100);
        assert_eq!(percentile(&[7], 0.95), 7);
    }

    #[test]
    fn test_aggregate_mixed_outcomes() {
        let events = vec![
            event(AuditOutcome::Success, 1, 100, None),
            event(AuditOutcome::Error, 3, 900, Some("HTTP_STATUS")),
            event(AuditOutcome::Error, 2, 300, Some("TIMEOUT")),
            event(AuditOutcome::Error, 1, 50, None),
            event(AuditOutcome::Success, 1, 200, Some("IGNORED")),
            event(AuditOutcome::Error, 3, 700, Some("HTTP_STATUS")),
        ];
        let metrics = aggregate(&events);

        assert_eq!(metrics.totals.events, 6);
        assert_eq!(metrics.totals.success, 2);
        assert_eq!(metrics.totals.error, 4);
        assert_eq!(metrics.totals.success_rate, 0.333333);
        assert_eq!(metrics.attempts.max, 3);
        assert_eq!(metrics.attempts.avg, 1.833333);
        assert_eq!(metrics.latency_ms.min, 50);
        assert_eq!(metrics.latency_ms.max, 900);
        assert_eq!(metrics.latency_ms.avg, 375.0);
        assert_eq!(metrics.latency_ms.p50, 200);
        assert_eq!(metrics.latency_ms.p95, 900);

        let codes: Vec<_> = metrics.errors_by_code.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(codes, vec![("HTTP_STATUS", 2), ("TIMEOUT", 1), ("UNKNOWN", 1)]);
    }

    #[test]
    fn test_snapshot_json_shape_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("artifacts/metrics.json");
        let generated_at = DateTime::parse_from_rfc3339("2026-02-26T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let snapshot = MetricsSnapshot::new(
            Path::new("audit.ndjson"),
            &[event(AuditOutcome::Success, 1, 10, None)],
            generated_at,
        );
        write_metrics(&out, &snapshot).unwrap();

        let raw = fs::read_to_string(&out).unwrap();
        assert!(raw.ends_with("}\n"));
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["generated_at"], "2026-02-26T12:00:00.000Z");
        assert_eq!(value["source_path"], "audit.ndjson");
        assert_eq!(value["totals"]["success_rate"], 1.0);
        assert_eq!(value["latency_ms"]["p50"], 10);
        assert!(value["errors_by_code"].as_object().unwrap().is_empty());

        let back: MetricsSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(back, snapshot);
    }
}
