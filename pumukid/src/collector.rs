//! In-memory store of accepted ingestion payloads.
//!
//! Submissions are keyed by idempotency key: the first submission of a key
//! is stored and assigned a request id, later ones are reported as
//! duplicates of it. Accepted payloads feed the federation views as
//! snapshots and per-hotspot signals.
//!
//! Only the newest payload of a repository contributes signals: a payload
//! with an equal or later `generated_at` replaces the previous signal set.
//! Snapshot history is kept per repository for reconciliation, bounded by
//! [`SNAPSHOT_HISTORY`].

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};

use pumuki_common::contract::{HotspotEntry, IngestionPayload, SeverityCounts};
use pumuki_ingest::governance::GovernancePolicy;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::federation::{FederationSignal, Severity};
use crate::reconcile::FederationSnapshot;

/// Highest severity with at least one finding.
pub fn dominant_severity(counts: &SeverityCounts) -> Severity {
    if counts.critical > 0 {
        Severity::Critical
    } else if counts.high > 0 {
        Severity::High
    } else if counts.medium > 0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn signal_from_entry(payload: &IngestionPayload, entry: &HotspotEntry) -> FederationSignal {
    FederationSignal {
        tenant_id: payload.tenant_id.clone(),
        repository_id: payload.repository_id().to_string(),
        path: entry.path.clone(),
        enterprise_severity: dominant_severity(&entry.findings_by_severity),
        risk_score: entry.raw_score,
        churn_total_lines: entry.churn_total_lines,
        generated_at: payload.generated_at.clone(),
        payload_hash: payload.payload_hash().to_string(),
    }
}

/// One federation signal per hotspot entry.
pub fn signals_from_payload(payload: &IngestionPayload) -> Vec<FederationSignal> {
    payload
        .hotspots
        .entries
        .iter()
        .map(|entry| signal_from_entry(payload, entry))
        .collect()
}

pub fn snapshot_from_payload(payload: &IngestionPayload) -> FederationSnapshot {
    FederationSnapshot {
        tenant_id: payload.tenant_id.clone(),
        repository_id: payload.repository_id().to_string(),
        generated_at: payload.generated_at.clone(),
        payload_hash: payload.payload_hash().to_string(),
        signals: payload.hotspots.entries.len(),
    }
}

/// Snapshots retained per repository.
pub const SNAPSHOT_HISTORY: usize = 32;

fn parse_generated_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted { request_id: String },
    Duplicate { request_id: String },
}

impl SubmitOutcome {
    pub fn request_id(&self) -> &str {
        match self {
            Self::Accepted { request_id } | Self::Duplicate { request_id } => request_id,
        }
    }
}

type RepositoryKey = (String, String);

/// Signals of the newest payload seen for one repository.
#[derive(Debug)]
struct LatestSignals {
    generated_at: Option<DateTime<Utc>>,
    signals: Vec<FederationSignal>,
}

#[derive(Debug, Default)]
struct CollectorState {
    by_key: HashMap<String, String>,
    snapshots: BTreeMap<RepositoryKey, VecDeque<FederationSnapshot>>,
    latest: BTreeMap<RepositoryKey, LatestSignals>,
}

impl CollectorState {
    fn record_snapshot(&mut self, key: RepositoryKey, snapshot: FederationSnapshot) {
        let history = self.snapshots.entry(key).or_default();
        if history.len() == SNAPSHOT_HISTORY {
            history.pop_front();
        }
        history.push_back(snapshot);
    }

    /// Replace the repository's signals unless the stored set is newer.
    fn replace_signals(&mut self, key: RepositoryKey, payload: &IngestionPayload) -> bool {
        let generated_at = parse_generated_at(&payload.generated_at);
        let newer = match (self.latest.get(&key), generated_at) {
            (None, _) => true,
            (Some(current), Some(at)) => current.generated_at.is_none_or(|current| at >= current),
            (Some(_), None) => false,
        };
        if newer {
            self.latest.insert(
                key,
                LatestSignals {
                    generated_at,
                    signals: signals_from_payload(payload),
                },
            );
        }
        newer
    }
}

/// Shared collection state behind the HTTP API.
#[derive(Debug, Default)]
pub struct Collector {
    state: RwLock<CollectorState>,
    policies: RwLock<HashMap<(String, String), GovernancePolicy>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the governance policy enforced for the policy's scope.
    pub async fn register_policy(&self, policy: GovernancePolicy) {
        let key = (policy.tenant_id.clone(), policy.repository_id.clone());
        info!(tenant = %key.0, repository = %key.1, "Registered governance policy");
        self.policies.write().await.insert(key, policy);
    }

    pub async fn policy_for(&self, tenant_id: &str, repository_id: &str) -> Option<GovernancePolicy> {
        self.policies
            .read()
            .await
            .get(&(tenant_id.to_string(), repository_id.to_string()))
            .cloned()
    }

    /// Store `payload` under `idempotency_key` unless the key was seen before.
    pub async fn submit(&self, idempotency_key: &str, payload: &IngestionPayload) -> SubmitOutcome {
        let mut state = self.state.write().await;
        if let Some(request_id) = state.by_key.get(idempotency_key) {
            debug!(key = %idempotency_key, request_id = %request_id, "Duplicate submission");
            return SubmitOutcome::Duplicate {
                request_id: request_id.clone(),
            };
        }

        let request_id = Uuid::new_v4().to_string();
        state
            .by_key
            .insert(idempotency_key.to_string(), request_id.clone());
        let scope = (payload.tenant_id.clone(), payload.repository_id().to_string());
        state.record_snapshot(scope.clone(), snapshot_from_payload(payload));
        if !state.replace_signals(scope, payload) {
            debug!(
                repository = %payload.repository_id(),
                generated_at = %payload.generated_at,
                "Older payload accepted; current signals kept"
            );
        }
        info!(
            tenant = %payload.tenant_id,
            repository = %payload.repository_id(),
            entries = payload.hotspots.entries.len(),
            request_id = %request_id,
            "Accepted hotspot payload"
        );
        SubmitOutcome::Accepted { request_id }
    }

    /// Signals of the newest payload per repository, in repository order.
    pub async fn signals(&self) -> Vec<FederationSignal> {
        self.state
            .read()
            .await
            .latest
            .values()
            .flat_map(|latest| latest.signals.iter().cloned())
            .collect()
    }

    /// Retained snapshots, grouped by repository in submission order.
    pub async fn snapshots(&self) -> Vec<FederationSnapshot> {
        self.state
            .read()
            .await
            .snapshots
            .values()
            .flat_map(|history| history.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::{AggregateLimits, aggregate, risk_scores};
    use pumuki_common::contract::PayloadBuilder;
    use pumuki_common::report::ReportHotspot;
    use pumuki_common::testing::{payload_for, payload_from_report, report_hotspot, report_with};
    use pumuki_ingest::governance::{PolicyParams, create_policy};

    #[test]
    fn test_dominant_severity_picks_highest_non_zero() {
        let mut counts = SeverityCounts::default();
        assert_eq!(dominant_severity(&counts), Severity::Low);
        counts.medium = 2;
        assert_eq!(dominant_severity(&counts), Severity::Medium);
        counts.critical = 1;
        assert_eq!(dominant_severity(&counts), Severity::Critical);
    }

    #[test]
    fn test_signals_mirror_hotspot_entries() {
        let report = report_with(vec![
            report_hotspot(1, "src/a.ts", 12.5, "CRITICAL"),
            report_hotspot(2, "src/b.ts", 3.0, "NONE"),
        ]);
        let payload = payload_from_report("tenant-a", "repo-a", &report);
        let signals = signals_from_payload(&payload);

        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].path, "src/a.ts");
        assert_eq!(signals[0].enterprise_severity, Severity::Critical);
        assert_eq!(signals[0].risk_score, 12.5);
        assert_eq!(signals[0].churn_total_lines, 6);
        assert_eq!(signals[0].payload_hash, payload.payload_hash());
        assert_eq!(signals[1].enterprise_severity, Severity::Low);

        let snapshot = snapshot_from_payload(&payload);
        assert_eq!(snapshot.generated_at, payload.generated_at);
        assert_eq!(snapshot.repository_id, "repo-a");
        assert_eq!(snapshot.signals, 2);
    }

    #[tokio::test]
    async fn test_submit_deduplicates_by_key() {
        let collector = Collector::new();
        let payload = payload_for("tenant-a", "repo-a");

        let first = collector.submit("key-1", &payload).await;
        let second = collector.submit("key-1", &payload).await;

        assert!(matches!(first, SubmitOutcome::Accepted { .. }));
        assert_eq!(
            second,
            SubmitOutcome::Duplicate {
                request_id: first.request_id().to_string()
            }
        );
        assert_eq!(collector.snapshots().await.len(), 1);
        assert_eq!(collector.signals().await.len(), 1);

        let third = collector.submit("key-2", &payload).await;
        assert_ne!(third.request_id(), first.request_id());
        assert_eq!(collector.snapshots().await.len(), 2);
        assert_eq!(collector.signals().await.len(), 1);
    }

    fn payload_at(generated_at: &str, hotspots: Vec<ReportHotspot>) -> IngestionPayload {
        PayloadBuilder::new("tenant-a", "repo-a", "repo-a", "6.3.17")
            .generated_at(generated_at)
            .build(&report_with(hotspots))
            .unwrap()
    }

    fn weighted_risk(signals: &[FederationSignal]) -> f64 {
        let scores = risk_scores(&aggregate(signals, AggregateLimits::default()));
        scores[0].risk_score
    }

    #[tokio::test]
    async fn test_resubmission_replaces_repository_signals() {
        let collector = Collector::new();
        let first = payload_at(
            "2026-02-26T11:30:00Z",
            vec![report_hotspot(1, "src/a.ts", 10.0, "HIGH")],
        );
        collector.submit("key-1", &first).await;
        let baseline = weighted_risk(&collector.signals().await);

        let resubmitted = payload_at(
            "2026-02-27T11:30:00Z",
            vec![report_hotspot(1, "src/a.ts", 10.0, "HIGH")],
        );
        collector.submit("key-2", &resubmitted).await;

        let signals = collector.signals().await;
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].payload_hash, resubmitted.payload_hash());
        assert_eq!(weighted_risk(&signals), baseline);

        let snapshots = collector.snapshots().await;
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[1].payload_hash, resubmitted.payload_hash());
    }

    #[tokio::test]
    async fn test_older_payload_keeps_current_signals() {
        let collector = Collector::new();
        let current = payload_at(
            "2026-02-27T11:30:00Z",
            vec![report_hotspot(1, "src/a.ts", 10.0, "HIGH")],
        );
        let older = payload_at(
            "2026-02-20T11:30:00Z",
            vec![
                report_hotspot(1, "src/a.ts", 10.0, "HIGH"),
                report_hotspot(2, "src/b.ts", 4.0, "LOW"),
            ],
        );

        collector.submit("key-1", &current).await;
        collector.submit("key-2", &older).await;

        let signals = collector.signals().await;
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].payload_hash, current.payload_hash());
        assert_eq!(collector.snapshots().await.len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_history_is_bounded() {
        let collector = Collector::new();
        for run in 0..(SNAPSHOT_HISTORY + 3) {
            let payload = payload_at(
                "2026-01-01T00:00:00Z",
                vec![report_hotspot(1, "src/a.ts", run as f64 + 1.0, "HIGH")],
            );
            collector.submit(&format!("key-{run}"), &payload).await;
        }

        assert_eq!(collector.snapshots().await.len(), SNAPSHOT_HISTORY);
        assert_eq!(collector.signals().await.len(), 1);
    }

    #[tokio::test]
    async fn test_policy_lookup_by_scope() {
        let collector = Collector::new();
        collector
            .register_policy(create_policy(PolicyParams::new("tenant-a", "repo-a")))
            .await;

        assert!(collector.policy_for("tenant-a", "repo-a").await.is_some());
        assert!(collector.policy_for("tenant-a", "repo-b").await.is_none());
    }
}
