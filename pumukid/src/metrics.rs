//! Prometheus metrics for the collection backend.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `pumukid_submissions_total` | Counter | `outcome` (`accepted`, `duplicate`, `rejected`) |
//! | `pumukid_rejections_total` | Counter | `reason` |
//! | `pumukid_signals_ingested_total` | Counter | |

use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    RegistrationFailed(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    EncodingFailed(String),
}

pub type MetricsResult<T> = Result<T, MetricsError>;

/// Terminal outcome of one ingestion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Accepted,
    Duplicate,
    Rejected,
}

impl SubmissionOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Duplicate => "duplicate",
            Self::Rejected => "rejected",
        }
    }
}

/// Ingestion counters registered with a shared registry.
#[derive(Clone)]
pub struct IngestMetrics {
    registry: Registry,
    submissions_total: CounterVec,
    rejections_total: CounterVec,
    signals_ingested_total: Counter,
}

impl IngestMetrics {
    /// Create the counters and register them with `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if any metric fails to register (e.g., duplicate name).
    pub fn new(registry: &Registry) -> MetricsResult<Self> {
        let submissions_total = CounterVec::new(
            Opts::new(
                "pumukid_submissions_total",
                "Ingestion submissions by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(submissions_total.clone()))?;

        let rejections_total = CounterVec::new(
            Opts::new(
                "pumukid_rejections_total",
                "Rejected ingestion submissions by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let signals_ingested_total = Counter::with_opts(Opts::new(
            "pumukid_signals_ingested_total",
            "Federation signals derived from accepted payloads",
        ))?;
        registry.register(Box::new(signals_ingested_total.clone()))?;

        Ok(Self {
            registry: registry.clone(),
            submissions_total,
            rejections_total,
            signals_ingested_total,
        })
    }

    pub fn accepted(&self, signals: usize) {
        self.submissions_total
            .with_label_values(&[SubmissionOutcome::Accepted.as_str()])
            .inc();
        self.signals_ingested_total.inc_by(signals as f64);
    }

    pub fn duplicate(&self) {
        self.submissions_total
            .with_label_values(&[SubmissionOutcome::Duplicate.as_str()])
            .inc();
    }

    pub fn rejected(&self, reason: &str) {
        self.submissions_total
            .with_label_values(&[SubmissionOutcome::Rejected.as_str()])
            .inc();
        self.rejections_total.with_label_values(&[reason]).inc();
    }

    pub fn submissions(&self, outcome: SubmissionOutcome) -> f64 {
        self.submissions_total
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    /// Encode every metric in the registry in Prometheus text format.
    pub fn encode_text(&self) -> MetricsResult<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| MetricsError::EncodingFailed(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_track_outcomes() {
        let metrics = IngestMetrics::new(&Registry::new()).unwrap();
        metrics.accepted(3);
        metrics.accepted(1);
        metrics.duplicate();
        metrics.rejected("contract_invalid");

        assert_eq!(metrics.submissions(SubmissionOutcome::Accepted), 2.0);
        assert_eq!(metrics.submissions(SubmissionOutcome::Duplicate), 1.0);
        assert_eq!(metrics.submissions(SubmissionOutcome::Rejected), 1.0);

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("pumukid_submissions_total{outcome=\"accepted\"} 2"));
        assert!(text.contains("pumukid_rejections_total{reason=\"contract_invalid\"} 1"));
        assert!(text.contains("pumukid_signals_ingested_total 4"));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        IngestMetrics::new(&registry).unwrap();
        assert!(matches!(
            IngestMetrics::new(&registry),
            Err(MetricsError::RegistrationFailed(_))
        ));
    }
}
