//! HTTP client seam for payload delivery.

use std::collections::BTreeMap;
use std::future::Future;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Response header carrying the server-side request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A fully prepared POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub endpoint: String,
    /// Lower-cased header names.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl OutboundRequest {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// What the endpoint answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionResponse {
    pub status: u16,
    pub request_id: Option<String>,
    pub body: String,
}

impl IngestionResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The request could not be completed.
    #[error("{0}")]
    Network(String),
    /// The attempt scope was cancelled before the response arrived.
    #[error("request cancelled")]
    Cancelled,
}

/// Sends one POST per call. Retry, timeout and header policy live in the
/// transport; implementations only move bytes.
pub trait IngestionClient: Send + Sync {
    /// Perform a single POST. `scope` is cancelled when the attempt times out
    /// or the caller aborts.
    fn post(
        &self,
        request: &OutboundRequest,
        scope: &CancellationToken,
    ) -> impl Future<Output = Result<IngestionResponse, ClientError>> + Send;
}

/// [`IngestionClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpIngestionClient {
    http: reqwest::Client,
}

impl HttpIngestionClient {
    pub fn new() -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("pumuki-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ClientError::Network(err.to_string()))?;
        Ok(Self { http })
    }

    async fn execute(&self, request: &OutboundRequest) -> Result<IngestionResponse, ClientError> {
        let mut builder = self.http.post(&request.endpoint).body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|err| ClientError::Network(err.to_string()))?;
        let status = response.status().as_u16();
        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|err| ClientError::Network(err.to_string()))?;

        Ok(IngestionResponse {
            status,
            request_id,
            body,
        })
    }
}

impl IngestionClient for HttpIngestionClient {
    async fn post(
        &self,
        request: &OutboundRequest,
        scope: &CancellationToken,
    ) -> Result<IngestionResponse, ClientError> {
        tokio::select! {
            biased;
            _ = scope.cancelled() => Err(ClientError::Cancelled),
            result = self.execute(request) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_success_range() {
        let response = |status| IngestionResponse {
            status,
            request_id: None,
            body: String::new(),
        };
        assert!(response(200).is_success());
        assert!(response(202).is_success());
        assert!(!response(199).is_success());
        assert!(!response(300).is_success());
    }

    #[tokio::test]
    async fn test_http_client_honours_cancelled_scope() {
        let client = HttpIngestionClient::new().unwrap();
        let scope = CancellationToken::new();
        scope.cancel();
        let request = OutboundRequest {
            endpoint: "http://127.0.0.1:9/never".to_string(),
            headers: BTreeMap::new(),
            body: "{}".to_string(),
        };
        assert_eq!(client.post(&request, &scope).await, Err(ClientError::Cancelled));
    }

    #[tokio::test]
    async fn test_http_client_reports_network_failure() {
        let client = HttpIngestionClient::new().unwrap();
        let request = OutboundRequest {
            endpoint: "http://127.0.0.1:9/unreachable".to_string(),
            headers: BTreeMap::new(),
            body: "{}".to_string(),
        };
        let result = client.post(&request, &CancellationToken::new()).await;
        assert!(matches!(result, Err(ClientError::Network(_))));
    }
}
