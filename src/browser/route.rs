//! Network interception and data retrieval: Route, RequestInfo and
//! ResponseInfo.
//!
//! A [`Route`] is created for every `network.beforeRequestSent` event
//! once interception is enabled. Exactly one of `fulfill`,
//! `continue_request` or `abort` decides the request's fate; the remote
//! end may have dropped the request in the meantime, so the same
//! tolerance policy as dialogs applies to a narrow error allow-list.
//!
//! Request bodies and response bodies are fetched on demand through
//! `network.getData`; they are not carried on the events themselves.

// ============================================================================
// Imports
// ============================================================================

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::transport::Client;

// ============================================================================
// Race allow-list
// ============================================================================

/// Returns `true` for errors that mean the request is no longer blocked.
fn is_route_race_error(e: &Error) -> bool {
    if matches!(e, Error::ConnectionClosed) {
        return true;
    }
    match e.remote_message() {
        Some(msg) => {
            msg.contains("Invalid state")
                || msg.contains("No blocked request")
                || msg.contains("no such request")
        }
        None => false,
    }
}

// ============================================================================
// RequestInfo
// ============================================================================

/// Read-only view of the intercepted request.
///
/// Decodes the `network.beforeRequestSent` payload lazily; missing
/// fields map to empty values rather than errors.
#[derive(Clone)]
pub struct RequestInfo {
    client: Option<Client>,
    data: Value,
}

impl RequestInfo {
    /// Wraps a `network.beforeRequestSent` event payload.
    ///
    /// Without a client, [`post_data`](Self::post_data) always resolves
    /// to `None`.
    #[inline]
    #[must_use]
    pub fn new(data: Value) -> Self {
        Self { client: None, data }
    }

    /// Wraps an event payload with a client for on-demand data
    /// retrieval.
    #[inline]
    #[must_use]
    pub(crate) fn with_client(data: Value, client: Client) -> Self {
        Self {
            client: Some(client),
            data,
        }
    }

    /// The request URL.
    #[must_use]
    pub fn url(&self) -> &str {
        self.request_field("url").unwrap_or_default()
    }

    /// The HTTP method (GET, POST, ...).
    #[must_use]
    pub fn method(&self) -> &str {
        self.request_field("method").unwrap_or_default()
    }

    /// The wire-level request id.
    #[must_use]
    pub fn request_id(&self) -> &str {
        self.request_field("request").unwrap_or_default()
    }

    /// Request headers flattened from the `{name, value:{value}}` wire
    /// encoding into a plain map.
    #[must_use]
    pub fn headers(&self) -> HashMap<String, String> {
        flatten_headers(self.data.get("request").and_then(|r| r.get("headers")))
    }

    /// Fetches the request body through `network.getData`.
    ///
    /// Returns `None` when the request carries no body, or when this
    /// view has no client or no request id to fetch with.
    ///
    /// # Errors
    ///
    /// Propagates remote errors from `network.getData`.
    pub async fn post_data(&self) -> Result<Option<String>> {
        let Some(client) = &self.client else {
            return Ok(None);
        };
        let request_id = self.request_id();
        if request_id.is_empty() {
            return Ok(None);
        }

        let result = client
            .send(
                "network.getData",
                json!({ "dataType": "request", "request": request_id }),
            )
            .await?;
        decode_bytes_value(result.get("bytes"))
    }

    fn request_field(&self, key: &str) -> Option<&str> {
        self.data
            .get("request")
            .and_then(|r| r.get(key))
            .and_then(Value::as_str)
    }
}

impl std::fmt::Debug for RequestInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestInfo")
            .field("url", &self.url())
            .field("method", &self.method())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ResponseInfo
// ============================================================================

/// Read-only view of a completed response.
///
/// Decodes the `network.responseCompleted` payload lazily; the body is
/// fetched on demand through `network.getData`.
#[derive(Clone)]
pub struct ResponseInfo {
    client: Option<Client>,
    data: Value,
}

impl ResponseInfo {
    /// Wraps a `network.responseCompleted` event payload.
    ///
    /// Without a client, [`body`](Self::body) always resolves to `None`.
    #[inline]
    #[must_use]
    pub fn new(data: Value) -> Self {
        Self { client: None, data }
    }

    /// Wraps an event payload with a client for on-demand body
    /// retrieval.
    #[inline]
    #[must_use]
    pub(crate) fn with_client(data: Value, client: Client) -> Self {
        Self {
            client: Some(client),
            data,
        }
    }

    /// The response URL.
    #[must_use]
    pub fn url(&self) -> &str {
        self.response_field("url")
            .or_else(|| self.data.get("url").and_then(Value::as_str))
            .unwrap_or_default()
    }

    /// The HTTP status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.data
            .get("response")
            .and_then(|r| r.get("status"))
            .and_then(Value::as_u64)
            .unwrap_or_default() as u16
    }

    /// Response headers flattened into a plain map.
    #[must_use]
    pub fn headers(&self) -> HashMap<String, String> {
        flatten_headers(self.data.get("response").and_then(|r| r.get("headers")))
    }

    /// The wire-level request id this response belongs to.
    #[must_use]
    pub fn request_id(&self) -> &str {
        self.data
            .get("request")
            .and_then(|r| r.get("request"))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Fetches the response body through `network.getData`.
    ///
    /// Base64-encoded bodies are decoded to text. Returns `None` when
    /// no body is available or this view has no client.
    ///
    /// # Errors
    ///
    /// Propagates remote errors from `network.getData`, and
    /// [`Error::Protocol`] for a body that is not valid base64/UTF-8.
    pub async fn body(&self) -> Result<Option<String>> {
        let Some(client) = &self.client else {
            return Ok(None);
        };
        let request_id = self.request_id();
        if request_id.is_empty() {
            return Ok(None);
        }

        let result = client
            .send(
                "network.getData",
                json!({ "dataType": "response", "request": request_id }),
            )
            .await?;
        decode_bytes_value(result.get("bytes"))
    }

    fn response_field(&self, key: &str) -> Option<&str> {
        self.data
            .get("response")
            .and_then(|r| r.get(key))
            .and_then(Value::as_str)
    }
}

impl std::fmt::Debug for ResponseInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseInfo")
            .field("url", &self.url())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Wire decoding helpers
// ============================================================================

/// Flattens `[{name, value: {value}}]` header entries into a plain map.
fn flatten_headers(entries: Option<&Value>) -> HashMap<String, String> {
    let entries = entries.and_then(Value::as_array);

    let mut headers = HashMap::new();
    for entry in entries.into_iter().flatten() {
        let Some(name) = entry.get("name").and_then(Value::as_str) else {
            continue;
        };
        let value = entry
            .get("value")
            .and_then(|v| v.get("value"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        headers.insert(name.to_string(), value.to_string());
    }
    headers
}

/// Decodes a `network.getData` bytes object: `{type, value}` where
/// `type` is `string` or `base64`.
fn decode_bytes_value(bytes: Option<&Value>) -> Result<Option<String>> {
    let Some(bytes) = bytes else {
        return Ok(None);
    };
    let Some(value) = bytes.get("value").and_then(Value::as_str) else {
        return Ok(None);
    };

    if bytes.get("type").and_then(Value::as_str) == Some("base64") {
        let decoded = Base64Standard
            .decode(value)
            .map_err(|e| Error::protocol(format!("invalid base64 body: {e}")))?;
        let text = String::from_utf8(decoded)
            .map_err(|e| Error::protocol(format!("body is not UTF-8: {e}")))?;
        return Ok(Some(text));
    }

    Ok(Some(value.to_string()))
}

// ============================================================================
// FulfillOptions
// ============================================================================

/// Response fields for [`Route::fulfill`]. Unset fields are omitted
/// from the command and left to server defaults.
#[derive(Debug, Clone, Default)]
pub struct FulfillOptions {
    /// HTTP status code.
    pub status: Option<u16>,
    /// Response headers.
    pub headers: Option<HashMap<String, String>>,
    /// Content-Type shortcut.
    pub content_type: Option<String>,
    /// Response body.
    pub body: Option<String>,
}

impl FulfillOptions {
    /// Creates empty options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status code.
    #[inline]
    #[must_use]
    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the response headers.
    #[inline]
    #[must_use]
    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Sets the content type.
    #[inline]
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the response body.
    #[inline]
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

// ============================================================================
// ContinueOptions
// ============================================================================

/// Request overrides for [`Route::continue_request`].
#[derive(Debug, Clone, Default)]
pub struct ContinueOptions {
    /// Override the URL.
    pub url: Option<String>,
    /// Override the HTTP method.
    pub method: Option<String>,
    /// Override the headers.
    pub headers: Option<HashMap<String, String>>,
    /// Override the request body.
    pub post_data: Option<String>,
}

impl ContinueOptions {
    /// Creates empty options (continue unchanged).
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the URL.
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Overrides the method.
    #[inline]
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Overrides the headers.
    #[inline]
    #[must_use]
    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Overrides the request body.
    #[inline]
    #[must_use]
    pub fn post_data(mut self, post_data: impl Into<String>) -> Self {
        self.post_data = Some(post_data.into());
        self
    }
}

// ============================================================================
// Route
// ============================================================================

/// An intercepted network request awaiting a decision.
#[derive(Clone)]
pub struct Route {
    client: Client,
    request_id: String,
    request: RequestInfo,
}

impl Route {
    /// Creates a route from an interception event.
    pub(crate) fn new(client: Client, request_id: String, request: RequestInfo) -> Self {
        Self {
            client,
            request_id,
            request,
        }
    }

    /// The intercepted request.
    #[must_use]
    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    /// Fulfills the request with a synthetic response.
    ///
    /// # Errors
    ///
    /// Propagates remote errors except the already-handled races.
    pub async fn fulfill(&self, options: FulfillOptions) -> Result<()> {
        let mut params = json!({ "request": self.request_id });
        if let Some(status) = options.status {
            params["statusCode"] = json!(status);
        }
        if let Some(headers) = options.headers {
            params["headers"] = json!(headers);
        }
        if let Some(content_type) = options.content_type {
            params["contentType"] = json!(content_type);
        }
        if let Some(body) = options.body {
            params["body"] = json!(body);
        }

        self.send_tolerant("vibium:network.fulfill", params).await
    }

    /// Continues the request, optionally with overrides.
    ///
    /// # Errors
    ///
    /// Propagates remote errors except the already-handled races.
    pub async fn continue_request(&self, options: ContinueOptions) -> Result<()> {
        let mut params = json!({ "request": self.request_id });
        if let Some(url) = options.url {
            params["url"] = json!(url);
        }
        if let Some(method) = options.method {
            params["method"] = json!(method);
        }
        if let Some(headers) = options.headers {
            params["headers"] = json!(headers);
        }
        if let Some(post_data) = options.post_data {
            params["postData"] = json!(post_data);
        }

        self.send_tolerant("vibium:network.continue", params).await
    }

    /// Aborts the request.
    ///
    /// # Errors
    ///
    /// Propagates remote errors except the already-handled races.
    pub async fn abort(&self) -> Result<()> {
        let params = json!({ "request": self.request_id });
        self.send_tolerant("network.failRequest", params).await
    }

    async fn send_tolerant(&self, method: &str, params: Value) -> Result<()> {
        match self.client.send(method, params).await {
            Ok(_) => Ok(()),
            Err(e) if is_route_race_error(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("request_id", &self.request_id)
            .field("url", &self.request.url())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_race_allow_list() {
        assert!(is_route_race_error(&Error::ConnectionClosed));
        assert!(is_route_race_error(&Error::remote(
            "invalid state",
            "Invalid state: request already continued"
        )));
        assert!(is_route_race_error(&Error::remote(
            "no such request",
            "No blocked request found"
        )));
        assert!(is_route_race_error(&Error::remote(
            "no such request",
            "no such request: 42"
        )));

        assert!(!is_route_race_error(&Error::remote(
            "invalid argument",
            "statusCode out of range"
        )));
        assert!(!is_route_race_error(&Error::protocol("oops")));
    }

    #[test]
    fn test_request_info_decodes_bidi_payload() {
        let info = RequestInfo::new(json!({
            "context": "ctx1",
            "request": {
                "request": "req-7",
                "url": "https://example.com/api",
                "method": "POST",
                "headers": [
                    { "name": "Accept", "value": { "type": "string", "value": "application/json" } },
                    { "name": "X-Empty", "value": {} }
                ]
            }
        }));

        assert_eq!(info.url(), "https://example.com/api");
        assert_eq!(info.method(), "POST");
        assert_eq!(info.request_id(), "req-7");

        let headers = info.headers();
        assert_eq!(headers.get("Accept").map(String::as_str), Some("application/json"));
        assert_eq!(headers.get("X-Empty").map(String::as_str), Some(""));
    }

    #[test]
    fn test_request_info_tolerates_missing_fields() {
        let info = RequestInfo::new(json!({}));
        assert_eq!(info.url(), "");
        assert_eq!(info.method(), "");
        assert_eq!(info.request_id(), "");
        assert!(info.headers().is_empty());
    }

    #[test]
    fn test_response_info_decodes_bidi_payload() {
        let info = ResponseInfo::new(json!({
            "context": "ctx1",
            "request": { "request": "req-7" },
            "response": {
                "url": "https://example.com/api",
                "status": 404,
                "headers": [
                    { "name": "content-type", "value": { "type": "string", "value": "text/plain" } }
                ]
            }
        }));

        assert_eq!(info.url(), "https://example.com/api");
        assert_eq!(info.status(), 404);
        assert_eq!(info.request_id(), "req-7");
        assert_eq!(
            info.headers().get("content-type").map(String::as_str),
            Some("text/plain")
        );
    }

    #[tokio::test]
    async fn test_body_without_client_is_none() {
        let info = ResponseInfo::new(json!({ "request": { "request": "req-1" } }));
        assert_eq!(info.body().await.expect("body"), None);

        let request = RequestInfo::new(json!({ "request": { "request": "req-1" } }));
        assert_eq!(request.post_data().await.expect("post_data"), None);
    }

    #[test]
    fn test_decode_bytes_value() {
        // Plain string payload.
        let plain = json!({ "type": "string", "value": "a=1&b=2" });
        assert_eq!(
            decode_bytes_value(Some(&plain)).expect("decode"),
            Some("a=1&b=2".to_string())
        );

        // Base64 payload ("hello").
        let encoded = json!({ "type": "base64", "value": "aGVsbG8=" });
        assert_eq!(
            decode_bytes_value(Some(&encoded)).expect("decode"),
            Some("hello".to_string())
        );

        // Absent or empty bytes object.
        assert_eq!(decode_bytes_value(None).expect("decode"), None);
        assert_eq!(decode_bytes_value(Some(&json!({}))).expect("decode"), None);

        // Corrupt base64 is a protocol error, not a silent None.
        let corrupt = json!({ "type": "base64", "value": "!!!" });
        assert!(matches!(
            decode_bytes_value(Some(&corrupt)),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn test_options_builders() {
        let fulfill = FulfillOptions::new()
            .status(200)
            .content_type("text/html")
            .body("<h1>ok</h1>");
        assert_eq!(fulfill.status, Some(200));
        assert_eq!(fulfill.content_type.as_deref(), Some("text/html"));

        let cont = ContinueOptions::new().method("PUT").post_data("x=1");
        assert_eq!(cont.method.as_deref(), Some("PUT"));
        assert_eq!(cont.post_data.as_deref(), Some("x=1"));
    }
}
