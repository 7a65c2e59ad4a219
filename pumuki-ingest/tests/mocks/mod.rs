//! Scripted ingestion client for deterministic transport tests.
//!
//! ```rust,ignore
//! use mocks::{MockIngestionClient, Reply};
//!
//! let client = MockIngestionClient::new([Reply::status(503), Reply::status(202)]);
//! // ... send through IngestionTransport ...
//! assert_eq!(client.calls(), 2);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pumuki_ingest::transport::{ClientError, IngestionClient, IngestionResponse, OutboundRequest};
use tokio_util::sync::CancellationToken;

/// One scripted answer.
#[derive(Debug, Clone)]
pub struct Reply {
    pub delay: Duration,
    pub outcome: Result<IngestionResponse, ClientError>,
}

#[allow(dead_code)]
impl Reply {
    pub fn status(status: u16) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Ok(IngestionResponse {
                status,
                request_id: None,
                body: format!("{{\"status\":{status}}}"),
            }),
        }
    }

    pub fn accepted(request_id: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Ok(IngestionResponse {
                status: 202,
                request_id: Some(request_id.to_string()),
                body: "{\"accepted\":true}".to_string(),
            }),
        }
    }

    pub fn network(message: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Err(ClientError::Network(message.to_string())),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Replays scripted replies in order and records every request.
///
/// Once the script is exhausted the last reply repeats.
#[derive(Debug, Clone, Default)]
pub struct MockIngestionClient {
    script: Arc<Mutex<VecDeque<Reply>>>,
    last: Arc<Mutex<Option<Reply>>>,
    requests: Arc<Mutex<Vec<OutboundRequest>>>,
}

#[allow(dead_code)]
impl MockIngestionClient {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            script: Arc::new(Mutex::new(replies.into_iter().collect())),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_reply(&self) -> Reply {
        let mut script = self.script.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        match script.pop_front() {
            Some(reply) => {
                *last = Some(reply.clone());
                reply
            }
            None => last.clone().unwrap_or_else(|| Reply::status(500)),
        }
    }
}

impl IngestionClient for MockIngestionClient {
    async fn post(
        &self,
        request: &OutboundRequest,
        scope: &CancellationToken,
    ) -> Result<IngestionResponse, ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.next_reply();
        if !reply.delay.is_zero() {
            tokio::select! {
                biased;
                _ = scope.cancelled() => return Err(ClientError::Cancelled),
                _ = tokio::time::sleep(reply.delay) => {}
            }
        }
        reply.outcome
    }
}
