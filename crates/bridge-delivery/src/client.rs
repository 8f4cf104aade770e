//! HTTP transport for webhook delivery.
//!
//! [`Transport`] is the seam between the retry machinery and the network:
//! one call is exactly one outbound POST. [`DeliveryClient`] is the reqwest
//! implementation; tests substitute a scripted transport.

use std::{collections::HashMap, time::Duration};

use http::HeaderMap;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::{
    error::{DeliveryError, Result},
    request::DeliveryRequest,
};

/// Header carrying the request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-bridge-request-id";

/// Header carrying the 1-based attempt number.
pub const ATTEMPT_HEADER: &str = "x-bridge-delivery-attempt";

/// Bodies above this size are truncated before being kept.
const MAX_RESPONSE_BODY_SIZE: usize = 64 * 1024;

/// Size kept from an oversized body, suffix included.
const MAX_RETAINED_BODY_SIZE: usize = 1024;

const TRUNCATION_SUFFIX: &str = "... (truncated)";

/// Configuration for [`DeliveryClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Per-attempt timeout covering connect, send and body read.
    pub timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Maximum redirects to follow before reporting the 3xx as-is.
    pub max_redirects: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS),
            user_agent: concat!("vetted-bridge/", env!("CARGO_PKG_VERSION")).to_string(),
            max_redirects: 3,
        }
    }
}

/// What the endpoint answered, whatever the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers with lowercase names.
    pub headers: HashMap<String, String>,
    /// Response body as text, truncated when oversized.
    pub body: String,
    /// Wall time of the exchange.
    pub duration: Duration,
}

impl DeliveryResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Sends one attempt of a delivery request.
///
/// Implementations return `Ok` for every HTTP response, including 4xx and
/// 5xx, and `Err` only when no response was obtained (`NetworkError` or
/// `Timeout`). Classification is the caller's job.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Performs exactly one POST of `request`.
    async fn send(&self, request: &DeliveryRequest, attempt_number: u32)
        -> Result<DeliveryResponse>;
}

/// reqwest-backed transport with connection pooling and a per-attempt timeout.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl DeliveryClient {
    /// Creates a client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the timeout is zero or
    /// the underlying HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.timeout.is_zero() {
            return Err(DeliveryError::configuration("client timeout must be greater than 0"));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .build()
            .map_err(|e| DeliveryError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Creates a client with default configuration.
    ///
    /// # Errors
    ///
    /// See [`DeliveryClient::new`].
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn classify_send_error(&self, error: &reqwest::Error) -> DeliveryError {
        if error.is_timeout() {
            return DeliveryError::timeout(duration_millis(self.config.timeout));
        }
        if error.is_connect() {
            return DeliveryError::network(format!("connection failed: {error}"));
        }
        DeliveryError::network(error.to_string())
    }
}

#[async_trait::async_trait]
impl Transport for DeliveryClient {
    async fn send(
        &self,
        request: &DeliveryRequest,
        attempt_number: u32,
    ) -> Result<DeliveryResponse> {
        let span = info_span!(
            "http_post",
            request_id = %request.request_id(),
            url = %request.url(),
            attempt = attempt_number
        );

        async move {
            let start = std::time::Instant::now();

            let response = self
                .client
                .post(request.url().clone())
                .headers(request.headers().clone())
                .header(REQUEST_ID_HEADER, request.request_id().to_string())
                .header(ATTEMPT_HEADER, attempt_number.to_string())
                .body(request.body().clone())
                .send()
                .await
                .map_err(|e| {
                    tracing::debug!(
                        duration_ms = start.elapsed().as_millis(),
                        error = %e,
                        "request failed without a response"
                    );
                    self.classify_send_error(&e)
                })?;

            let status_code = response.status().as_u16();
            let headers = extract_headers(response.headers());
            let body = read_body(response).await.map_err(|e| self.classify_send_error(&e))?;
            let duration = start.elapsed();

            tracing::debug!(status = status_code, duration_ms = duration.as_millis(), "received response");

            Ok(DeliveryResponse { status_code, headers, body, duration })
        }
        .instrument(span)
        .await
    }
}

/// Reads the body as lossy UTF-8, truncating oversized payloads.
///
/// A failure to read the body of a response that already arrived is reported
/// as a transport failure, like a connection reset mid-stream.
async fn read_body(response: Response) -> std::result::Result<String, reqwest::Error> {
    let bytes = response.bytes().await?;
    Ok(truncate_body(&bytes))
}

fn truncate_body(bytes: &[u8]) -> String {
    if bytes.len() <= MAX_RESPONSE_BODY_SIZE {
        return String::from_utf8_lossy(bytes).into_owned();
    }

    let kept = &bytes[..MAX_RETAINED_BODY_SIZE - TRUNCATION_SUFFIX.len()];
    let mut text = String::from_utf8_lossy(kept).into_owned();
    // Lossy decoding of a cut multi-byte char can grow the text past the budget.
    while text.len() > MAX_RETAINED_BODY_SIZE - TRUNCATION_SUFFIX.len() {
        text.pop();
    }
    text.push_str(TRUNCATION_SUFFIX);
    text
}

fn extract_headers(header_map: &HeaderMap) -> HashMap<String, String> {
    header_map
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
