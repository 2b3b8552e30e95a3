//! Request and response types passed through the interception chain.

use crate::cancel::CancelHandle;
use http::header::{HeaderMap, HeaderValue, IntoHeaderName};
use http::{Method, StatusCode};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Everything the client knows about one outgoing call.
///
/// Interceptors receive the descriptor by value and hand back a (possibly
/// augmented) descriptor. Plugins keep their per-request state in
/// `metadata`, under keys namespaced by plugin name.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// HTTP method
    pub method: Method,
    /// Target URL: absolute, or relative to the client's base URL
    pub url: String,
    /// Request headers
    pub headers: HeaderMap,
    /// Query parameters appended by the transport
    pub params: BTreeMap<String, String>,
    /// JSON request body
    pub data: Option<Value>,
    /// Per-request timeout enforced by the transport
    pub timeout: Option<Duration>,
    /// Plugin metadata (readable/writable by interceptors)
    pub metadata: HashMap<String, Value>,
    /// Cancellation handle observed by the client while the call is in flight
    pub cancel_handle: Option<CancelHandle>,
}

impl RequestDescriptor {
    /// Create a descriptor for `method` on `url`.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            params: BTreeMap::new(),
            data: None,
            timeout: None,
            metadata: HashMap::new(),
            cancel_handle: None,
        }
    }

    /// Shorthand for a GET descriptor.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Shorthand for a DELETE descriptor.
    #[must_use]
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Shorthand for a POST descriptor with a JSON body.
    #[must_use]
    pub fn post(url: impl Into<String>, data: Value) -> Self {
        Self::new(Method::POST, url).with_data(data)
    }

    /// Set one header, replacing any previous value.
    #[must_use]
    pub fn with_header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Merge a header map into this descriptor, replacing existing values.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in &headers {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// Add a query parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Set the JSON body.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Insert metadata.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Get metadata value.
    #[must_use]
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Get a metadata value stored as a string.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// The cancellation handle attached to this request, if any.
    #[must_use]
    pub fn cancel_handle(&self) -> Option<&CancelHandle> {
        self.cancel_handle.as_ref()
    }
}

/// What a transport produces before the client attaches the originating request.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Response status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Decoded body
    pub data: Value,
}

impl RawResponse {
    /// Create a raw response with empty headers.
    #[must_use]
    pub fn new(status: StatusCode, data: Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            data,
        }
    }

    /// A `200 OK` response.
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self::new(StatusCode::OK, data)
    }
}

/// A settled response, carrying the descriptor that produced it.
#[derive(Debug, Clone)]
pub struct Response {
    /// Response status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Decoded body
    pub data: Value,
    /// The request as it left the request interceptors
    pub request: RequestDescriptor,
}

impl Response {
    /// Attach the originating request to a raw response.
    #[must_use]
    pub fn from_raw(raw: RawResponse, request: RequestDescriptor) -> Self {
        Self {
            status: raw.status,
            headers: raw.headers,
            data: raw.data,
            request,
        }
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
