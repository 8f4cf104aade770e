//! Mock webhook receiver for tests that go over real HTTP.

use bytes::Bytes;
use http::HeaderMap;
use serde_json::Value;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer as WiremockServer, ResponseTemplate,
};

/// Mock webhook receiver listening on a random local port.
pub struct MockServer {
    server: WiremockServer,
}

impl MockServer {
    /// Starts a new mock server.
    pub async fn start() -> Self {
        Self { server: WiremockServer::start().await }
    }

    /// Base URL of the server.
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Absolute URL of `endpoint_path` on this server.
    pub fn endpoint_url(&self, endpoint_path: &str) -> String {
        format!("{}{}", self.server.uri(), endpoint_path)
    }

    /// Starts a sequence of one-shot responses for POSTs to `endpoint_path`.
    pub fn mock_sequence(&self, endpoint_path: &str) -> MockSequenceBuilder<'_> {
        MockSequenceBuilder {
            server: &self.server,
            path: endpoint_path.to_string(),
            responses: Vec::new(),
            then_always: None,
        }
    }

    /// Answers every POST to `endpoint_path` with `status` and `body`.
    pub async fn mock_always(&self, endpoint_path: &str, status: u16, body: impl Into<String>) {
        Mock::given(method("POST"))
            .and(path(endpoint_path))
            .respond_with(ResponseTemplate::new(status).set_body_string(body.into()))
            .mount(&self.server)
            .await;
    }

    /// Every request received so far, oldest first.
    pub async fn received_requests(&self) -> Vec<RecordedRequest> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|request| RecordedRequest {
                method: request.method.to_string(),
                path: request.url.path().to_string(),
                headers: request.headers,
                body: Bytes::from(request.body),
            })
            .collect()
    }

    /// Asserts that exactly `expected` requests were received.
    pub async fn assert_request_count(&self, expected: usize) {
        let received = self.received_requests().await.len();
        assert_eq!(received, expected, "expected {expected} requests, received {received}");
    }
}

/// A request seen by the mock server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method
    pub method: String,
    /// Request path
    pub path: String,
    /// Request headers
    pub headers: HeaderMap,
    /// Raw body
    pub body: Bytes,
}

impl RecordedRequest {
    /// Header value as a string, if present and visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Body parsed as JSON, `Null` if it is not JSON.
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

/// Mounts responses that are each served once, in order.
pub struct MockSequenceBuilder<'a> {
    server: &'a WiremockServer,
    path: String,
    responses: Vec<(u16, String)>,
    then_always: Option<(u16, String)>,
}

impl MockSequenceBuilder<'_> {
    /// Adds a response with the given status and body.
    pub fn respond_with(mut self, status: u16, body: impl Into<String>) -> Self {
        self.responses.push((status, body.into()));
        self
    }

    /// Adds a JSON response.
    pub fn respond_with_json(mut self, status: u16, json: &Value) -> Self {
        self.responses.push((status, json.to_string()));
        self
    }

    /// Adds the same response `times` times.
    pub fn repeat(mut self, times: usize, status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        self.responses.extend(std::iter::repeat((status, body)).take(times));
        self
    }

    /// Response served once the sequence is used up.
    pub fn then_always(mut self, status: u16, body: impl Into<String>) -> Self {
        self.then_always = Some((status, body.into()));
        self
    }

    /// Mounts the sequence. Mocks mounted earlier take precedence, so each
    /// one-shot mock answers in turn.
    pub async fn build(self) {
        for (status, body) in self.responses {
            Mock::given(method("POST"))
                .and(path(self.path.as_str()))
                .respond_with(ResponseTemplate::new(status).set_body_string(body))
                .up_to_n_times(1)
                .mount(self.server)
                .await;
        }

        if let Some((status, body)) = self.then_always {
            Mock::given(method("POST"))
                .and(path(self.path.as_str()))
                .respond_with(ResponseTemplate::new(status).set_body_string(body))
                .mount(self.server)
                .await;
        }
    }
}

/// Assertions over recorded requests.
pub mod assertions {
    use super::*;

    /// Asserts that `request` carries header `key` with `value`.
    pub fn assert_header_present(request: &RecordedRequest, key: &str, value: &str) {
        let actual =
            request.header(key).unwrap_or_else(|| panic!("header '{key}' not present"));
        assert_eq!(actual, value, "header '{key}' has unexpected value");
    }

    /// Asserts that the body of `request` equals `expected`.
    pub fn assert_json_body(request: &RecordedRequest, expected: &Value) {
        assert_eq!(request.json(), *expected, "request body does not match expected JSON");
    }
}
