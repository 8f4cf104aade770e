//! Immutable delivery requests.

use bytes::Bytes;
use http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    HeaderMap, HeaderName, HeaderValue, Method,
};
use reqwest::Url;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{DeliveryError, Result};

/// Shared-secret header understood by the Vetted webhook receivers.
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// A webhook to deliver: `POST <url>` with JSON body and endpoint headers.
///
/// Built once through [`DeliveryRequestBuilder`] and never mutated; every
/// attempt of a dispatch sends exactly the same URL, headers and body.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    request_id: Uuid,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
}

impl DeliveryRequest {
    /// Starts building a POST request to `url`.
    pub fn post(url: impl Into<String>) -> DeliveryRequestBuilder {
        DeliveryRequestBuilder {
            url: url.into(),
            headers: Vec::new(),
            body: None,
            request_id: None,
        }
    }

    /// Correlation id, constant across attempts.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Destination URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Always `POST`.
    pub fn method(&self) -> Method {
        Method::POST
    }

    /// Headers sent with every attempt, including `content-type`.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Serialized JSON body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Builder for [`DeliveryRequest`].
///
/// Validation happens in [`build`](Self::build), so a malformed URL or header
/// surfaces before any network traffic.
#[derive(Debug)]
#[must_use]
pub struct DeliveryRequestBuilder {
    url: String,
    headers: Vec<(String, String)>,
    body: Option<std::result::Result<Bytes, String>>,
    request_id: Option<Uuid>,
}

impl DeliveryRequestBuilder {
    /// Serializes `payload` as the JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, payload: &T) -> Self {
        self.body = Some(serde_json::to_vec(payload).map(Bytes::from).map_err(|e| e.to_string()));
        self
    }

    /// Adds a header. Later values for the same name replace earlier ones.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds `Authorization: Bearer <token>`.
    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.header(AUTHORIZATION.as_str(), value)
    }

    /// Adds the `x-webhook-secret` header.
    pub fn webhook_secret(self, secret: impl Into<String>) -> Self {
        self.header(WEBHOOK_SECRET_HEADER, secret)
    }

    /// Uses a caller-supplied correlation id instead of a random one.
    pub fn request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Validates and freezes the request.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::InvalidRequest` when the URL does not parse or
    /// is not http(s), a header name or value is invalid, no body was set, or
    /// the body failed to serialize.
    pub fn build(self) -> Result<DeliveryRequest> {
        let url = Url::parse(&self.url)
            .map_err(|e| DeliveryError::invalid_request(format!("invalid URL {:?}: {e}", self.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DeliveryError::invalid_request(format!(
                "unsupported URL scheme {:?}",
                url.scheme()
            )));
        }

        let body = match self.body {
            Some(Ok(body)) => body,
            Some(Err(e)) => {
                return Err(DeliveryError::invalid_request(format!("payload serialization: {e}")));
            },
            None => return Err(DeliveryError::invalid_request("request has no JSON body")),
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| DeliveryError::invalid_request(format!("header name {name:?}: {e}")))?;
            let mut header_value = HeaderValue::from_str(&value)
                .map_err(|e| DeliveryError::invalid_request(format!("header {name:?}: {e}")))?;
            if header_name == AUTHORIZATION || header_name.as_str() == WEBHOOK_SECRET_HEADER {
                header_value.set_sensitive(true);
            }
            headers.insert(header_name, header_value);
        }

        Ok(DeliveryRequest {
            request_id: self.request_id.unwrap_or_else(Uuid::new_v4),
            url,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builds_json_post_with_auth_headers() {
        let request = DeliveryRequest::post("https://vetted.example.com/functions/v1/submission")
            .json(&json!({"submission_id": "abc-123"}))
            .bearer_token("service-token")
            .webhook_secret("s3cret")
            .build()
            .unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.url().host_str(), Some("vetted.example.com"));
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer service-token");
        assert_eq!(request.headers()[WEBHOOK_SECRET_HEADER], "s3cret");
        assert!(request.headers()[AUTHORIZATION].is_sensitive());
        assert_eq!(request.body().as_ref(), br#"{"submission_id":"abc-123"}"#);
    }

    #[test]
    fn secrets_are_hidden_from_debug_output() {
        let request = DeliveryRequest::post("https://vetted.example.com/hook")
            .json(&json!({}))
            .webhook_secret("do-not-print")
            .build()
            .unwrap();

        assert!(!format!("{request:?}").contains("do-not-print"));
    }

    #[test]
    fn request_id_is_stable_or_supplied() {
        let id = Uuid::new_v4();
        let request =
            DeliveryRequest::post("http://localhost/hook").json(&json!({})).request_id(id).build();
        assert_eq!(request.unwrap().request_id(), id);
    }

    #[test]
    fn rejects_malformed_requests() {
        let missing_body = DeliveryRequest::post("https://vetted.example.com/hook").build();
        assert!(matches!(missing_body, Err(DeliveryError::InvalidRequest { .. })));

        let bad_url = DeliveryRequest::post("not a url").json(&json!({})).build();
        assert!(matches!(bad_url, Err(DeliveryError::InvalidRequest { .. })));

        let bad_scheme = DeliveryRequest::post("ftp://vetted.example.com").json(&json!({})).build();
        assert!(matches!(bad_scheme, Err(DeliveryError::InvalidRequest { .. })));

        let bad_header = DeliveryRequest::post("https://vetted.example.com/hook")
            .json(&json!({}))
            .header("bad header", "value")
            .build();
        assert!(matches!(bad_header, Err(DeliveryError::InvalidRequest { .. })));

        let bad_value = DeliveryRequest::post("https://vetted.example.com/hook")
            .json(&json!({}))
            .header("x-trace", "line\nbreak")
            .build();
        assert!(matches!(bad_value, Err(DeliveryError::InvalidRequest { .. })));
    }
}
