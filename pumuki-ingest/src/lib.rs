//! Pumuki hotspot ingestion client.
//!
//! Publishes integrity-checked hotspot payloads to the collection endpoint and
//! keeps the local audit trail, metrics and governance state that go with it.

#![forbid(unsafe_code)]

pub mod audit;
pub mod config;
pub mod diagnostics;
pub mod governance;
pub mod metrics;
pub mod transport;

pub use audit::{AuditError, AuditEvent, AuditLog, AuditOutcome, PruneReport};
pub use config::{ArtifactPaths, ConfigError, IngestConfig};
pub use diagnostics::{DiagnosticsStatus, PublishDiagnostics, diagnose};
pub use governance::{Governance, GovernancePolicy, GovernanceViolation, RedactionKey};
pub use metrics::{DeliveryMetrics, MetricsSnapshot};
pub use transport::{
    HttpIngestionClient, IngestionClient, IngestionTransport, SendRequest, TransportErrorCode,
    TransportLimits, TransportResult,
};
