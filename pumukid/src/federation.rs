//! Cross-repository aggregation of hotspot risk signals.
//!
//! All functions here are pure. Ordering is total: equal risk scores fall
//! back to severity, then path, then signal fingerprint, so the same input
//! always yields the same view.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use pumuki_common::canonical::canonical_digest;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_REPOSITORIES: usize = 50;
pub const DEFAULT_MAX_SIGNALS_PER_REPOSITORY: usize = 200;
pub const DEFAULT_MAX_TOTAL_SIGNALS: usize = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub const fn weight(self) -> u32 {
        match self {
            Self::Critical => 4,
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }
}

/// One file-level risk signal from one ingested payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederationSignal {
    pub tenant_id: String,
    pub repository_id: String,
    pub path: String,
    pub enterprise_severity: Severity,
    pub risk_score: f64,
    pub churn_total_lines: u64,
    pub generated_at: String,
    pub payload_hash: String,
}

#[derive(Serialize)]
struct FingerprintMaterial<'a> {
    tenant_id: &'a str,
    repository_id: &'a str,
    path: &'a str,
    enterprise_severity: Severity,
    payload_hash: &'a str,
}

impl FederationSignal {
    /// Identity used for de-duplication and as the final tie-break.
    pub fn fingerprint(&self) -> String {
        canonical_digest(&FingerprintMaterial {
            tenant_id: &self.tenant_id,
            repository_id: &self.repository_id,
            path: &self.path,
            enterprise_severity: self.enterprise_severity,
            payload_hash: &self.payload_hash,
        })
        .unwrap_or_default()
    }

    /// Risk score with negative and non-finite values read as zero.
    pub fn effective_risk(&self) -> f64 {
        non_negative(self.risk_score)
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 { value } else { 0.0 }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

// ── Limits ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateLimits {
    pub max_repositories: usize,
    pub max_signals_per_repository: usize,
    pub max_total_signals: usize,
}

impl Default for AggregateLimits {
    fn default() -> Self {
        Self {
            max_repositories: DEFAULT_MAX_REPOSITORIES,
            max_signals_per_repository: DEFAULT_MAX_SIGNALS_PER_REPOSITORY,
            max_total_signals: DEFAULT_MAX_TOTAL_SIGNALS,
        }
    }
}

impl AggregateLimits {
    /// Build limits from optional requested values; absent or non-positive
    /// values take the defaults.
    pub fn normalized(
        max_repositories: Option<i64>,
        max_signals_per_repository: Option<i64>,
        max_total_signals: Option<i64>,
    ) -> Self {
        let pick = |value: Option<i64>, fallback: usize| {
            value
                .filter(|v| *v > 0)
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(fallback)
        };
        Self {
            max_repositories: pick(max_repositories, DEFAULT_MAX_REPOSITORIES),
            max_signals_per_repository: pick(
                max_signals_per_repository,
                DEFAULT_MAX_SIGNALS_PER_REPOSITORY,
            ),
            max_total_signals: pick(max_total_signals, DEFAULT_MAX_TOTAL_SIGNALS),
        }
    }
}

// ── Aggregation ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryTotals {
    pub signals: usize,
    pub weighted_risk: f64,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryAggregate {
    pub tenant_id: String,
    pub repository_id: String,
    pub signals: Vec<FederationSignal>,
    pub totals: RepositoryTotals,
}

impl RepositoryAggregate {
    fn new(tenant_id: String, repository_id: String, signals: Vec<FederationSignal>) -> Self {
        let mut totals = RepositoryTotals {
            signals: signals.len(),
            ..RepositoryTotals::default()
        };
        let mut weighted = 0.0;
        for signal in &signals {
            weighted += signal.effective_risk() * f64::from(signal.enterprise_severity.weight());
            match signal.enterprise_severity {
                Severity::Critical => totals.critical += 1,
                Severity::High => totals.high += 1,
                Severity::Medium => totals.medium += 1,
                Severity::Low => totals.low += 1,
            }
        }
        totals.weighted_risk = round6(weighted);
        Self {
            tenant_id,
            repository_id,
            signals,
            totals,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateTotals {
    pub repositories: usize,
    pub signals: usize,
    pub truncated_repositories: usize,
    pub truncated_signals: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederationAggregate {
    pub limits: AggregateLimits,
    pub repositories: Vec<RepositoryAggregate>,
    pub totals: AggregateTotals,
}

fn compare_signals(left: &(String, FederationSignal), right: &(String, FederationSignal)) -> Ordering {
    let (left_fp, left) = left;
    let (right_fp, right) = right;
    right
        .effective_risk()
        .total_cmp(&left.effective_risk())
        .then_with(|| {
            right
                .enterprise_severity
                .weight()
                .cmp(&left.enterprise_severity.weight())
        })
        .then_with(|| left.path.cmp(&right.path))
        .then_with(|| left_fp.cmp(right_fp))
}

fn compare_repositories(left: &RepositoryAggregate, right: &RepositoryAggregate) -> Ordering {
    right
        .totals
        .weighted_risk
        .total_cmp(&left.totals.weighted_risk)
        .then_with(|| left.tenant_id.cmp(&right.tenant_id))
        .then_with(|| left.repository_id.cmp(&right.repository_id))
}

/// Group, rank and truncate `signals` into per-repository views.
///
/// Within a repository, signals sharing a fingerprint collapse to the last
/// one seen. The global signal cap is filled repository by repository in
/// ranked order.
pub fn aggregate(signals: &[FederationSignal], limits: AggregateLimits) -> FederationAggregate {
    let mut groups: BTreeMap<(String, String), HashMap<String, FederationSignal>> = BTreeMap::new();
    for signal in signals {
        groups
            .entry((signal.tenant_id.clone(), signal.repository_id.clone()))
            .or_default()
            .insert(signal.fingerprint(), signal.clone());
    }
    let original_repositories = groups.len();

    let mut ranked: Vec<RepositoryAggregate> = groups
        .into_iter()
        .map(|((tenant_id, repository_id), unique)| {
            let mut keyed: Vec<(String, FederationSignal)> = unique.into_iter().collect();
            keyed.sort_by(compare_signals);
            keyed.truncate(limits.max_signals_per_repository);
            let signals = keyed.into_iter().map(|(_, signal)| signal).collect();
            RepositoryAggregate::new(tenant_id, repository_id, signals)
        })
        .collect();
    ranked.sort_by(compare_repositories);
    ranked.truncate(limits.max_repositories);

    let mut repositories = Vec::with_capacity(ranked.len());
    let mut included = 0;
    for repository in ranked {
        if included >= limits.max_total_signals {
            break;
        }
        let room = limits.max_total_signals - included;
        let mut signals = repository.signals;
        signals.truncate(room);
        included += signals.len();
        repositories.push(RepositoryAggregate::new(
            repository.tenant_id,
            repository.repository_id,
            signals,
        ));
    }

    FederationAggregate {
        limits,
        totals: AggregateTotals {
            repositories: repositories.len(),
            signals: included,
            truncated_repositories: original_repositories.saturating_sub(repositories.len()),
            truncated_signals: signals.len().saturating_sub(included),
        },
        repositories,
    }
}

/// A repository's position in the federation-wide risk ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub tenant_id: String,
    pub repository_id: String,
    pub risk_score: f64,
    /// 1-based.
    pub rank: usize,
}

/// Rank the aggregate's repositories by weighted risk.
pub fn risk_scores(aggregate: &FederationAggregate) -> Vec<RiskScore> {
    let mut scores: Vec<RiskScore> = aggregate
        .repositories
        .iter()
        .map(|repository| RiskScore {
            tenant_id: repository.tenant_id.clone(),
            repository_id: repository.repository_id.clone(),
            risk_score: repository.totals.weighted_risk,
            rank: 0,
        })
        .collect();
    scores.sort_by(|left, right| {
        right
            .risk_score
            .total_cmp(&left.risk_score)
            .then_with(|| left.tenant_id.cmp(&right.tenant_id))
            .then_with(|| left.repository_id.cmp(&right.repository_id))
    });
    for (index, score) in scores.iter_mut().enumerate() {
        score.rank = index + 1;
    }
    scores
}
