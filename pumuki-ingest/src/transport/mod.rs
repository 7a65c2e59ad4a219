//! Delivery of ingestion payloads to the collection endpoint.
//!
//! [`IngestionTransport::send`] runs, in order:
//! 1. credential policy check (no network call on failure)
//! 2. header isolation check (no network call on failure)
//! 3. up to `max_retries + 1` attempts, each raced against its own timeout
//!    and the caller's cancellation token, with exponential backoff between
//!    retryable failures
//!
//! Every outcome is returned as a [`TransportResult`] value.

pub mod client;
pub mod error;
pub mod retry;

pub use client::{
    ClientError, HttpIngestionClient, IngestionClient, IngestionResponse, OutboundRequest,
    REQUEST_ID_HEADER,
};
pub use error::{RETRYABLE_HTTP_STATUSES, TransportErrorCode, is_retryable_status};
pub use retry::{RetryPolicy, RetryStop};

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use pumuki_common::auth::{self, AuthPolicy, Credentials};
use pumuki_common::canonical::to_canonical_json;
use pumuki_common::contract::IngestionPayload;
use pumuki_common::errors::ErrorCode;
use pumuki_common::idempotency::resolve_idempotency_key;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 250;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const REPOSITORY_HEADER: &str = "x-repository-id";
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Timeout and retry bounds for one send.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportLimits {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TransportLimits {
    fn default() -> Self {
        Self::sanitized(DEFAULT_TIMEOUT_MS, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_DELAY_MS)
    }
}

impl TransportLimits {
    /// Build limits, replacing a zero timeout or base delay with the default.
    pub fn sanitized(timeout_ms: u64, max_retries: u32, retry_base_delay_ms: u64) -> Self {
        let positive = |value: u64, fallback: u64| if value == 0 { fallback } else { value };
        Self {
            timeout: Duration::from_millis(positive(timeout_ms, DEFAULT_TIMEOUT_MS)),
            retry: RetryPolicy {
                max_retries,
                base_delay: Duration::from_millis(positive(
                    retry_base_delay_ms,
                    DEFAULT_RETRY_BASE_DELAY_MS,
                )),
                ..RetryPolicy::default()
            },
        }
    }
}

/// Delivered: the endpoint answered 2xx.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSuccess {
    pub status: u16,
    pub attempts: u32,
    pub duration_ms: u64,
    pub idempotency_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub response_body: String,
}

/// Not delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportFailure {
    pub code: TransportErrorCode,
    pub attempts: u32,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
}

/// Outcome of one [`IngestionTransport::send`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportResult {
    Success(TransportSuccess),
    Error(TransportFailure),
}

impl TransportResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success(ok) => ok.attempts,
            Self::Error(err) => err.attempts,
        }
    }

    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        match self {
            Self::Success(ok) => ok.duration_ms,
            Self::Error(err) => err.duration_ms,
        }
    }

    #[must_use]
    pub fn idempotency_key(&self) -> Option<&str> {
        match self {
            Self::Success(ok) => Some(&ok.idempotency_key),
            Self::Error(err) => err.idempotency_key.as_deref(),
        }
    }

    #[must_use]
    pub fn error_code(&self) -> Option<TransportErrorCode> {
        match self {
            Self::Success(_) => None,
            Self::Error(err) => Some(err.code),
        }
    }

    #[must_use]
    pub fn catalog_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Success(_) => None,
            Self::Error(err) => Some(err.catalog_code()),
        }
    }
}

/// Everything needed to deliver one payload.
#[derive(Debug, Clone)]
pub struct SendRequest<'a> {
    pub endpoint: &'a str,
    pub payload: &'a IngestionPayload,
    pub credentials: Credentials,
    pub auth_policy: Option<&'a AuthPolicy>,
    /// Used when non-blank; otherwise derived from the payload.
    pub idempotency_key: Option<&'a str>,
    /// Extra headers; names are matched case-insensitively.
    pub headers: Vec<(String, String)>,
    /// Instant the credential policy is evaluated at.
    pub now: DateTime<Utc>,
}

impl<'a> SendRequest<'a> {
    pub fn new(endpoint: &'a str, payload: &'a IngestionPayload) -> Self {
        Self {
            endpoint,
            payload,
            credentials: Credentials::default(),
            auth_policy: None,
            idempotency_key: None,
            headers: Vec::new(),
            now: Utc::now(),
        }
    }

    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    #[must_use]
    pub fn auth_policy(mut self, policy: Option<&'a AuthPolicy>) -> Self {
        self.auth_policy = policy;
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: &'a str) -> Self {
        self.idempotency_key = Some(key);
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// Build the header set, rejecting overrides that change the payload scope.
fn build_headers(
    request: &SendRequest<'_>,
    idempotency_key: &str,
) -> Result<BTreeMap<String, String>, &'static str> {
    let custom: BTreeMap<String, String> = request
        .headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
        .collect();

    let tenant_id = &request.payload.tenant_id;
    let repository_id = &request.payload.repository.repository_id;
    if let Some(value) = custom.get(TENANT_HEADER)
        && !value.is_empty()
        && value != tenant_id
    {
        return Err("tenant_id_mismatch");
    }
    if let Some(value) = custom.get(REPOSITORY_HEADER)
        && !value.is_empty()
        && value != repository_id
    {
        return Err("repository_id_mismatch");
    }

    let mut headers = BTreeMap::from([
        ("content-type".to_string(), "application/json".to_string()),
        ("accept".to_string(), "application/json".to_string()),
        (TENANT_HEADER.to_string(), tenant_id.clone()),
        (REPOSITORY_HEADER.to_string(), repository_id.clone()),
        (IDEMPOTENCY_HEADER.to_string(), idempotency_key.to_string()),
    ]);
    headers.extend(custom.into_iter().filter(|(_, value)| !value.is_empty()));
    if let Some(token) = request.credentials.bearer_token() {
        headers.insert("authorization".to_string(), format!("Bearer {token}"));
    }
    if let Some(key) = request.credentials.api_key_value() {
        headers.insert("x-api-key".to_string(), key.to_string());
    }
    Ok(headers)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

enum AttemptOutcome {
    Aborted,
    TimedOut,
    Completed(Result<IngestionResponse, ClientError>),
}

/// Sends payloads through an [`IngestionClient`].
#[derive(Debug, Clone)]
pub struct IngestionTransport<C> {
    client: C,
    limits: TransportLimits,
}

impl<C: IngestionClient> IngestionTransport<C> {
    pub fn new(client: C, limits: TransportLimits) -> Self {
        Self { client, limits }
    }

    pub fn limits(&self) -> &TransportLimits {
        &self.limits
    }

    /// Deliver `request.payload`. Never fails as a Rust error.
    pub async fn send(&self, request: &SendRequest<'_>, cancel: &CancellationToken) -> TransportResult {
        let started = Instant::now();
        let payload = request.payload;
        let idempotency_key = resolve_idempotency_key(request.idempotency_key, payload);

        let rejected = |code: TransportErrorCode, message: String| {
            warn!(%code, %message, tenant_id = %payload.tenant_id, "Submission rejected before delivery");
            TransportResult::Error(TransportFailure {
                code,
                attempts: 0,
                duration_ms: elapsed_ms(started),
                idempotency_key: Some(idempotency_key.clone()),
                message,
                retryable: false,
                status: None,
                response_body: None,
            })
        };

        if let Err(violation) =
            auth::validate(payload, &request.credentials, request.auth_policy, request.now)
        {
            return rejected(TransportErrorCode::AuthPolicyViolation, violation.code().to_string());
        }
        let headers = match build_headers(request, &idempotency_key) {
            Ok(headers) => headers,
            Err(message) => {
                return rejected(TransportErrorCode::IsolationViolation, message.to_string());
            }
        };
        let body = match to_canonical_json(payload) {
            Ok(body) => body,
            Err(err) => return rejected(TransportErrorCode::Network, err.to_string()),
        };

        let outbound = OutboundRequest {
            endpoint: request.endpoint.trim().to_string(),
            headers,
            body,
        };

        let outcome = retry::run_with_retry("ingestion_send", &self.limits.retry, cancel, |attempt| {
            self.attempt(attempt, &outbound, &idempotency_key, started, cancel)
        })
        .await;

        match outcome {
            Ok(success) => {
                info!(
                    status = success.status,
                    attempts = success.attempts,
                    duration_ms = success.duration_ms,
                    request_id = success.request_id.as_deref().unwrap_or(""),
                    "Ingestion payload delivered"
                );
                TransportResult::Success(success)
            }
            Err(RetryStop::Failed(failure)) => TransportResult::Error(failure),
            Err(RetryStop::Cancelled(last)) => TransportResult::Error(TransportFailure {
                code: TransportErrorCode::Aborted,
                attempts: last.attempts,
                duration_ms: elapsed_ms(started),
                idempotency_key: Some(idempotency_key.clone()),
                message: "aborted_during_backoff".to_string(),
                retryable: false,
                status: last.status,
                response_body: last.response_body,
            }),
        }
    }

    async fn attempt(
        &self,
        attempt: u32,
        outbound: &OutboundRequest,
        idempotency_key: &str,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Result<TransportSuccess, TransportFailure> {
        let attempt_scope = cancel.child_token();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => AttemptOutcome::Aborted,
            _ = sleep(self.limits.timeout) => {
                attempt_scope.cancel();
                AttemptOutcome::TimedOut
            }
            result = self.client.post(outbound, &attempt_scope) => AttemptOutcome::Completed(result),
        };

        let failure = |code: TransportErrorCode, message: String, retryable: bool| TransportFailure {
            code,
            attempts: attempt,
            duration_ms: elapsed_ms(started),
            idempotency_key: Some(idempotency_key.to_string()),
            message,
            retryable,
            status: None,
            response_body: None,
        };

        match outcome {
            AttemptOutcome::Aborted | AttemptOutcome::Completed(Err(ClientError::Cancelled)) => {
                Err(failure(TransportErrorCode::Aborted, "aborted".to_string(), false))
            }
            AttemptOutcome::TimedOut => {
                debug!(attempt, timeout_ms = self.limits.timeout.as_millis() as u64, "Attempt timed out");
                Err(failure(
                    TransportErrorCode::Timeout,
                    format!("timeout_after_{}ms", self.limits.timeout.as_millis()),
                    true,
                ))
            }
            AttemptOutcome::Completed(Err(ClientError::Network(message))) => {
                debug!(attempt, %message, "Attempt failed to reach endpoint");
                Err(failure(TransportErrorCode::Network, message, true))
            }
            AttemptOutcome::Completed(Ok(response)) if response.is_success() => Ok(TransportSuccess {
                status: response.status,
                attempts: attempt,
                duration_ms: elapsed_ms(started),
                idempotency_key: idempotency_key.to_string(),
                request_id: response.request_id,
                response_body: response.body,
            }),
            AttemptOutcome::Completed(Ok(response)) => {
                let retryable = is_retryable_status(response.status);
                debug!(attempt, status = response.status, retryable, "Endpoint rejected attempt");
                Err(TransportFailure {
                    status: Some(response.status),
                    response_body: Some(response.body),
                    ..failure(
                        TransportErrorCode::HttpStatus,
                        format!("http_status_{}", response.status),
                        retryable,
                    )
                })
            }
        }
    }
}
