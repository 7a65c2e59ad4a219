//! HTTP API for hotspot ingestion and federation views.
//!
//! Provides:
//! - `POST /v1/hotspots/ingest` - idempotent payload submission
//! - `GET /v1/federation/aggregate` - ranked per-repository signals
//! - `GET /v1/federation/risk-scores` - flat repository risk ranking
//! - `GET /v1/federation/reconcile` - hash drift and stale snapshots
//! - `POST /v1/enterprise/adoption` - KPI, unit report and adoption stage
//! - `/metrics` - Prometheus metrics export
//! - `/health` - Basic daemon health check

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{SecondsFormat, Utc};
use pumuki_common::contract::parse_str;
use pumuki_ingest::governance;
use pumuki_ingest::transport::{
    IDEMPOTENCY_HEADER, REPOSITORY_HEADER, REQUEST_ID_HEADER, TENANT_HEADER,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::analytics::{
    AdoptionThresholds, KpiInput, UnitReport, adoption_decision, distributed_report, kpi_snapshot,
};
use crate::collector::{Collector, SubmitOutcome};
use crate::federation::{AggregateLimits, aggregate, risk_scores};
use crate::metrics::IngestMetrics;
use crate::reconcile::reconcile;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub collector: Arc<Collector>,
    pub metrics: IngestMetrics,
    /// Daemon version.
    pub version: &'static str,
    /// Daemon start time.
    pub started_at: Instant,
}

/// Create the HTTP router.
pub fn create_router(state: HttpState) -> Router {
    Router::new()
        .route("/v1/hotspots/ingest", post(ingest_handler))
        .route("/v1/federation/aggregate", get(aggregate_handler))
        .route("/v1/federation/risk-scores", get(risk_scores_handler))
        .route("/v1/federation/reconcile", get(reconcile_handler))
        .route("/v1/enterprise/adoption", post(adoption_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::new(state))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn reject(state: &HttpState, status: StatusCode, error: &str, reason: String) -> Response {
    warn!(error, %reason, "Rejected ingestion request");
    state.metrics.rejected(error);
    (status, Json(json!({ "error": error, "reason": reason }))).into_response()
}

/// Handler for `/v1/hotspots/ingest`.
///
/// 202 on first acceptance, 200 for a repeated idempotency key, 400 on
/// missing headers, 422 on contract failures, 403 on scope or governance
/// violations.
async fn ingest_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let mut scope = Vec::with_capacity(3);
    for name in [IDEMPOTENCY_HEADER, TENANT_HEADER, REPOSITORY_HEADER] {
        match header_value(&headers, name) {
            Some(value) => scope.push(value),
            None => {
                return reject(
                    &state,
                    StatusCode::BAD_REQUEST,
                    "missing_header",
                    format!("{name} header is required"),
                );
            }
        }
    }
    let (key, tenant, repository) = (scope[0], scope[1], scope[2]);

    let parsed = match parse_str(&body) {
        Ok(parsed) => parsed,
        Err(err) => {
            return reject(&state, StatusCode::UNPROCESSABLE_ENTITY, err.kind(), err.to_string());
        }
    };
    let payload = parsed.contract;

    if tenant != payload.tenant_id {
        return reject(
            &state,
            StatusCode::FORBIDDEN,
            "isolation_violation",
            "tenant_id_mismatch".to_string(),
        );
    }
    if repository != payload.repository_id() {
        return reject(
            &state,
            StatusCode::FORBIDDEN,
            "isolation_violation",
            "repository_id_mismatch".to_string(),
        );
    }

    if let Some(policy) = state.collector.policy_for(tenant, repository).await {
        let verdict = governance::check_isolation(&policy, Some(tenant), Some(repository))
            .and_then(|()| governance::validate(&policy, &payload));
        if let Err(violation) = verdict {
            return reject(
                &state,
                StatusCode::FORBIDDEN,
                "isolation_violation",
                violation.code().to_string(),
            );
        }
    }

    let outcome = state.collector.submit(key, &payload).await;
    let request_id = outcome.request_id().to_string();
    let (status, body) = match outcome {
        SubmitOutcome::Accepted { .. } => {
            state.metrics.accepted(payload.hotspots.entries.len());
            (
                StatusCode::ACCEPTED,
                json!({
                    "status": "accepted",
                    "request_id": request_id,
                    "source_version": parsed.source_version.as_str(),
                }),
            )
        }
        SubmitOutcome::Duplicate { .. } => {
            state.metrics.duplicate();
            (
                StatusCode::OK,
                json!({
                    "status": "duplicate",
                    "request_id": request_id,
                }),
            )
        }
    };
    (status, [(REQUEST_ID_HEADER, request_id)], Json(body)).into_response()
}

#[derive(Debug, Default, Deserialize)]
struct LimitsQuery {
    max_repositories: Option<i64>,
    max_signals_per_repository: Option<i64>,
    max_total_signals: Option<i64>,
}

impl LimitsQuery {
    fn limits(&self) -> AggregateLimits {
        AggregateLimits::normalized(
            self.max_repositories,
            self.max_signals_per_repository,
            self.max_total_signals,
        )
    }
}

/// Handler for `/v1/federation/aggregate`.
async fn aggregate_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<LimitsQuery>,
) -> impl IntoResponse {
    let signals = state.collector.signals().await;
    Json(aggregate(&signals, query.limits()))
}

/// Handler for `/v1/federation/risk-scores`.
async fn risk_scores_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<LimitsQuery>,
) -> impl IntoResponse {
    let signals = state.collector.signals().await;
    let scores = risk_scores(&aggregate(&signals, query.limits()));
    Json(json!({ "scores": scores }))
}

#[derive(Debug, Default, Deserialize)]
struct ReconcileQuery {
    stale_after_days: Option<i64>,
}

/// Handler for `/v1/federation/reconcile`.
async fn reconcile_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<ReconcileQuery>,
) -> impl IntoResponse {
    let snapshots = state.collector.snapshots().await;
    Json(reconcile(&snapshots, query.stale_after_days, Utc::now()))
}

#[derive(Debug, Deserialize)]
struct AdoptionRequest {
    kpi: KpiInput,
    #[serde(default)]
    units: Vec<UnitReport>,
    #[serde(default)]
    thresholds: AdoptionThresholds,
}

/// Handler for `/v1/enterprise/adoption`.
async fn adoption_handler(Json(request): Json<AdoptionRequest>) -> impl IntoResponse {
    let kpi = kpi_snapshot(&request.kpi);
    let report = distributed_report(
        &request.units,
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    );
    let decision = adoption_decision(&kpi, &report.totals, &request.thresholds);
    Json(json!({
        "kpi": kpi,
        "report": report,
        "decision": decision,
    }))
}

/// Handler for `/metrics` - Prometheus metrics export.
async fn metrics_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    match state.metrics.encode_text() {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            output,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

/// Handler for `/health` - Basic daemon health check.
async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": state.version,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

/// Start the HTTP server; it stops accepting connections on Ctrl-C.
pub async fn start_server(
    addr: SocketAddr,
    state: HttpState,
) -> tokio::task::JoinHandle<Result<(), std::io::Error>> {
    let router = create_router(state);

    info!("Starting HTTP server on {}", addr);

    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutdown signal received");
            })
            .await
    })
}
