//! Scripted in-memory transport.
//!
//! Replays a fixed sequence of responses, one per call, and records what was
//! sent. Once the script runs out the last entry repeats, so
//! `ScriptedTransport::statuses(&[503])` answers 503 forever.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use bridge_delivery::{DeliveryError, DeliveryRequest, DeliveryResponse, Transport};
use bytes::Bytes;
use http::HeaderMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One scripted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedResponse {
    /// An HTTP response.
    Status {
        /// Status code to answer with
        status: u16,
        /// Response body
        body: String,
    },
    /// No response: connection refused, reset, DNS failure.
    NetworkError(String),
    /// No response within the transport's timeout.
    Timeout,
    /// Never answers; only the executor's own timeout ends the call.
    Hang,
}

impl ScriptedResponse {
    /// Response with an empty body.
    pub fn status(status: u16) -> Self {
        Self::Status { status, body: String::new() }
    }

    /// Response with a text body.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::Status { status, body: body.into() }
    }

    /// Response with a JSON body.
    pub fn json(status: u16, body: &Value) -> Self {
        Self::Status { status, body: body.to_string() }
    }

    /// `200 {"ok":true}`.
    pub fn ok() -> Self {
        Self::json(200, &serde_json::json!({ "ok": true }))
    }

    /// Connection refused.
    pub fn connection_refused() -> Self {
        Self::NetworkError("connection refused".to_string())
    }
}

/// What the transport received on one call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Attempt number passed by the executor.
    pub attempt_number: u32,
    /// Request correlation id.
    pub request_id: Uuid,
    /// Destination URL.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Bytes,
}

impl RecordedCall {
    /// Body parsed as JSON.
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    script: VecDeque<ScriptedResponse>,
    last: Option<ScriptedResponse>,
    calls: Vec<RecordedCall>,
    cancel_after: Option<(usize, CancellationToken)>,
}

/// [`Transport`] that answers from a script. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    /// Transport answering with `script`, repeating the last entry.
    pub fn new(script: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        let state = ScriptState { script: script.into_iter().collect(), ..Default::default() };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// Transport answering with empty-bodied statuses, repeating the last.
    pub fn statuses(statuses: &[u16]) -> Self {
        Self::new(statuses.iter().copied().map(ScriptedResponse::status))
    }

    /// Transport that always gives the same answer.
    pub fn always(response: ScriptedResponse) -> Self {
        Self::new([response])
    }

    /// Cancels `token` as soon as the `calls`-th call has been answered.
    pub fn cancel_after(self, calls: usize, token: CancellationToken) -> Self {
        self.lock().cancel_after = Some((calls, token));
        self
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_response(&self, request: &DeliveryRequest, attempt_number: u32) -> ScriptedResponse {
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            attempt_number,
            request_id: request.request_id(),
            url: request.url().to_string(),
            headers: request.headers().clone(),
            body: request.body().clone(),
        });

        let response = match state.script.pop_front() {
            Some(response) => {
                state.last = Some(response.clone());
                response
            },
            None => state.last.clone().unwrap_or_else(|| ScriptedResponse::status(200)),
        };

        if let Some((calls, token)) = &state.cancel_after {
            if state.calls.len() >= *calls {
                token.cancel();
            }
        }

        response
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: &DeliveryRequest,
        attempt_number: u32,
    ) -> Result<DeliveryResponse, DeliveryError> {
        match self.next_response(request, attempt_number) {
            ScriptedResponse::Status { status, body } => Ok(DeliveryResponse {
                status_code: status,
                headers: HashMap::new(),
                body,
                duration: Duration::from_millis(5),
            }),
            ScriptedResponse::NetworkError(message) => Err(DeliveryError::network(message)),
            ScriptedResponse::Timeout => Err(DeliveryError::timeout(30_000)),
            ScriptedResponse::Hang => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> DeliveryRequest {
        DeliveryRequest::post("https://vetted.test/hook")
            .json(&serde_json::json!({"n": 1}))
            .build()
            .unwrap_or_else(|e| panic!("valid request: {e}"))
    }

    #[tokio::test]
    async fn replays_script_then_repeats_last() {
        let transport = ScriptedTransport::new([
            ScriptedResponse::connection_refused(),
            ScriptedResponse::status(503),
        ]);
        let request = request();

        assert!(transport.send(&request, 1).await.is_err());
        for attempt in 2..=4 {
            let response = transport.send(&request, attempt).await;
            assert_eq!(response.map(|r| r.status_code), Ok(503));
        }

        let calls = transport.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[3].attempt_number, 4);
        assert_eq!(calls[0].json(), serde_json::json!({"n": 1}));
    }

    #[tokio::test]
    async fn hang_never_answers() {
        let transport = ScriptedTransport::always(ScriptedResponse::Hang);
        let request = request();

        let answered =
            tokio::time::timeout(Duration::from_millis(20), transport.send(&request, 1)).await;

        assert!(answered.is_err());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn cancels_token_after_configured_calls() {
        let token = CancellationToken::new();
        let transport = ScriptedTransport::statuses(&[500]).cancel_after(2, token.clone());
        let request = request();

        let _ = transport.send(&request, 1).await;
        assert!(!token.is_cancelled());
        let _ = transport.send(&request, 2).await;
        assert!(token.is_cancelled());
    }
}
