//! Enterprise rollout analytics: KPI snapshot, per-unit report and the
//! adoption stage derived from both.

use serde::{Deserialize, Serialize};

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

fn clamp01(value: f64) -> f64 {
    if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 { value } else { 0.0 }
}

// ── KPI ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiInput {
    pub evaluated_signals: u64,
    pub true_positive_signals: u64,
    pub false_positive_signals: u64,
    pub baseline_risk_score: f64,
    pub current_risk_score: f64,
    pub lead_time_hours: f64,
    pub debt_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KpiSnapshot {
    pub precision: f64,
    pub drift: f64,
    pub lead_time_hours: f64,
    pub debt_risk: f64,
}

/// Precision over classified signals and relative risk drift from baseline.
///
/// A zero baseline reports drift 0 when the current risk is also zero and 1
/// otherwise.
pub fn kpi_snapshot(input: &KpiInput) -> KpiSnapshot {
    let classified = input.true_positive_signals + input.false_positive_signals;
    let precision = if classified == 0 {
        0.0
    } else {
        input.true_positive_signals as f64 / classified as f64
    };

    let baseline = non_negative(input.baseline_risk_score);
    let current = non_negative(input.current_risk_score);
    let drift = if baseline == 0.0 {
        if current == 0.0 { 0.0 } else { 1.0 }
    } else {
        (current - baseline).abs() / baseline
    };

    KpiSnapshot {
        precision: round6(clamp01(precision)),
        drift: round6(non_negative(drift)),
        lead_time_hours: round6(non_negative(input.lead_time_hours)),
        debt_risk: round6(clamp01(input.debt_score)),
    }
}

// ── Distributed report ───────────────────────────────────────────────────

/// Rollout figures for one organisational unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitReport {
    pub unit_id: String,
    pub repositories: u64,
    pub coverage_ratio: f64,
    pub blocked_ratio: f64,
    pub weighted_risk: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributedTotals {
    pub units: usize,
    pub repositories: u64,
    pub coverage_ratio: f64,
    pub blocked_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributedReport {
    pub generated_at: String,
    pub totals: DistributedTotals,
    pub units: Vec<UnitReport>,
}

/// Normalize `units`, sort them by id and average their ratios.
pub fn distributed_report(units: &[UnitReport], generated_at: impl Into<String>) -> DistributedReport {
    let mut units: Vec<UnitReport> = units
        .iter()
        .map(|unit| UnitReport {
            unit_id: unit.unit_id.clone(),
            repositories: unit.repositories,
            coverage_ratio: round6(clamp01(unit.coverage_ratio)),
            blocked_ratio: round6(clamp01(unit.blocked_ratio)),
            weighted_risk: round6(non_negative(unit.weighted_risk)),
        })
        .collect();
    units.sort_by(|left, right| left.unit_id.cmp(&right.unit_id));

    let average = |ratio: fn(&UnitReport) -> f64| {
        if units.is_empty() {
            0.0
        } else {
            round6(units.iter().map(ratio).sum::<f64>() / units.len() as f64)
        }
    };
    let totals = DistributedTotals {
        units: units.len(),
        repositories: units.iter().map(|unit| unit.repositories).sum(),
        coverage_ratio: average(|unit| unit.coverage_ratio),
        blocked_ratio: average(|unit| unit.blocked_ratio),
    };

    DistributedReport {
        generated_at: generated_at.into(),
        totals,
        units,
    }
}

// ── Adoption decision ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdoptionThresholds {
    pub min_precision_for_pilot: f64,
    pub max_drift_for_scale: f64,
    pub max_blocked_ratio_for_scale: f64,
    pub min_coverage_for_scale: f64,
}

impl Default for AdoptionThresholds {
    fn default() -> Self {
        Self {
            min_precision_for_pilot: 0.7,
            max_drift_for_scale: 0.2,
            max_blocked_ratio_for_scale: 0.2,
            min_coverage_for_scale: 0.85,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdoptionStage {
    Blocked,
    Pilot,
    Scale,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdoptionDecision {
    pub stage: AdoptionStage,
    pub reason_codes: Vec<String>,
}

impl AdoptionDecision {
    fn new(stage: AdoptionStage, reason: &str) -> Self {
        Self {
            stage,
            reason_codes: vec![reason.to_string()],
        }
    }
}

pub fn adoption_decision(
    kpi: &KpiSnapshot,
    totals: &DistributedTotals,
    thresholds: &AdoptionThresholds,
) -> AdoptionDecision {
    if kpi.precision < thresholds.min_precision_for_pilot {
        return AdoptionDecision::new(AdoptionStage::Blocked, "precision_below_pilot_threshold");
    }

    let can_scale = kpi.drift <= thresholds.max_drift_for_scale
        && totals.blocked_ratio <= thresholds.max_blocked_ratio_for_scale
        && totals.coverage_ratio >= thresholds.min_coverage_for_scale;
    if can_scale {
        AdoptionDecision::new(AdoptionStage::Scale, "scale_thresholds_met")
    } else {
        AdoptionDecision::new(AdoptionStage::Pilot, "pilot_thresholds_met")
    }
}
