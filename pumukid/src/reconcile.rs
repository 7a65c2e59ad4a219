//! Snapshot reconciliation: hash drift and staleness per repository.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_STALE_AFTER_DAYS: i64 = 14;

/// The integrity fingerprint of one payload for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationSnapshot {
    pub tenant_id: String,
    pub repository_id: String,
    pub generated_at: String,
    pub payload_hash: String,
    /// Hotspot entries carried by the payload.
    pub signals: usize,
}

impl FederationSnapshot {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.generated_at)
            .ok()
            .map(|at| at.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    HashDrift,
    StaleSnapshot,
}

impl IssueCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HashDrift => "hash_drift",
            Self::StaleSnapshot => "stale_snapshot",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationIssue {
    pub tenant_id: String,
    pub repository_id: String,
    pub code: IssueCode,
    pub message: String,
}

impl ReconciliationIssue {
    fn new(snapshot: &FederationSnapshot, code: IssueCode) -> Self {
        Self {
            tenant_id: snapshot.tenant_id.clone(),
            repository_id: snapshot.repository_id.clone(),
            code,
            message: code.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub stale_after_days: i64,
    pub latest: Vec<FederationSnapshot>,
    pub issues: Vec<ReconciliationIssue>,
}

/// Fold `snapshots` to the latest one per repository and report drift and
/// staleness.
///
/// A snapshot replaces the current one when its timestamp is equal or later;
/// the replacement raises `hash_drift` if the hashes differ. Snapshots with
/// unparsable timestamps never replace and are never replaced. Absent or
/// non-positive `stale_after_days` uses [`DEFAULT_STALE_AFTER_DAYS`].
pub fn reconcile(
    snapshots: &[FederationSnapshot],
    stale_after_days: Option<i64>,
    now: DateTime<Utc>,
) -> ReconciliationReport {
    let stale_after_days = stale_after_days
        .filter(|days| *days > 0)
        .unwrap_or(DEFAULT_STALE_AFTER_DAYS);

    let mut latest: BTreeMap<(String, String), FederationSnapshot> = BTreeMap::new();
    let mut issues = Vec::new();

    for snapshot in snapshots {
        let key = (snapshot.tenant_id.clone(), snapshot.repository_id.clone());
        let Some(existing) = latest.get(&key) else {
            latest.insert(key, snapshot.clone());
            continue;
        };
        let (Some(current_at), Some(existing_at)) = (snapshot.timestamp(), existing.timestamp())
        else {
            continue;
        };
        if current_at < existing_at {
            continue;
        }
        if existing.payload_hash != snapshot.payload_hash {
            issues.push(ReconciliationIssue::new(snapshot, IssueCode::HashDrift));
        }
        latest.insert(key, snapshot.clone());
    }

    let stale_after = Duration::days(stale_after_days);
    for snapshot in latest.values() {
        let stale = match snapshot.timestamp() {
            Some(at) => now - at > stale_after,
            None => true,
        };
        if stale {
            issues.push(ReconciliationIssue::new(snapshot, IssueCode::StaleSnapshot));
        }
    }

    issues.sort_by(|left, right| {
        left.tenant_id
            .cmp(&right.tenant_id)
            .then_with(|| left.repository_id.cmp(&right.repository_id))
            .then_with(|| left.code.cmp(&right.code))
    });

    ReconciliationReport {
        stale_after_days,
        latest: latest.into_values().collect(),
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(tenant: &str, repo: &str, at: &str, hash: &str) -> FederationSnapshot {
        FederationSnapshot {
            tenant_id: tenant.to_string(),
            repository_id: repo.to_string(),
            generated_at: at.to_string(),
            payload_hash: hash.to_string(),
            signals: 1,
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_newer_snapshot_with_different_hash_drifts() {
        let snapshots = vec![
            snapshot("t", "r", "2026-02-27T00:00:00Z", "aaa"),
            FederationSnapshot {
                signals: 4,
                ..snapshot("t", "r", "2026-02-28T00:00:00Z", "bbb")
            },
        ];
        let report = reconcile(&snapshots, None, now());

        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].code, IssueCode::HashDrift);
        assert_eq!(report.issues[0].message, "hash_drift");
        assert_eq!(report.latest[0].payload_hash, "bbb");
        assert_eq!(report.latest[0].signals, 4);
    }

    #[test]
    fn test_same_hash_resubmission_is_silent() {
        let snapshots = vec![
            snapshot("t", "r", "2026-02-27T00:00:00Z", "aaa"),
            snapshot("t", "r", "2026-02-28T00:00:00Z", "aaa"),
        ];
        assert!(reconcile(&snapshots, None, now()).issues.is_empty());
    }

    #[test]
    fn test_older_snapshot_is_ignored() {
        let snapshots = vec![
            snapshot("t", "r", "2026-02-28T00:00:00Z", "new"),
            snapshot("t", "r", "2026-02-20T00:00:00Z", "old"),
        ];
        let report = reconcile(&snapshots, None, now());
        assert!(report.issues.is_empty());
        assert_eq!(report.latest[0].payload_hash, "new");
    }

    #[test]
    fn test_stale_and_unparsable_snapshots() {
        let snapshots = vec![
            snapshot("t", "old", "2026-01-01T00:00:00Z", "a"),
            snapshot("t", "bad", "yesterday", "b"),
            snapshot("t", "fresh", "2026-02-28T00:00:00Z", "c"),
        ];
        let report = reconcile(&snapshots, Some(14), now());

        let flagged: Vec<_> = report
            .issues
            .iter()
            .map(|i| (i.repository_id.as_str(), i.code))
            .collect();
        assert_eq!(
            flagged,
            vec![("bad", IssueCode::StaleSnapshot), ("old", IssueCode::StaleSnapshot)]
        );
    }

    #[test]
    fn test_non_positive_threshold_uses_default() {
        let snapshots = vec![snapshot("t", "r", "2026-02-20T00:00:00Z", "a")];
        let report = reconcile(&snapshots, Some(0), now());
        assert_eq!(report.stale_after_days, DEFAULT_STALE_AFTER_DAYS);
        assert!(report.issues.is_empty());

        let strict = reconcile(&snapshots, Some(3), now());
        assert_eq!(strict.issues[0].code, IssueCode::StaleSnapshot);
    }

    #[test]
    fn test_issues_sorted_by_scope_then_code() {
        let snapshots = vec![
            snapshot("t2", "r", "2026-01-01T00:00:00Z", "a"),
            snapshot("t1", "r", "2026-01-01T00:00:00Z", "a"),
            snapshot("t1", "r", "2026-01-02T00:00:00Z", "b"),
        ];
        let report = reconcile(&snapshots, None, now());
        let order: Vec<_> = report
            .issues
            .iter()
            .map(|i| (i.tenant_id.as_str(), i.code))
            .collect();
        assert_eq!(
            order,
            vec![
                ("t1", IssueCode::HashDrift),
                ("t1", IssueCode::StaleSnapshot),
                ("t2", IssueCode::StaleSnapshot),
            ]
        );
    }
}
