//! Minimal interceptor-driven HTTP client
//!
//! The client does three things: runs request interceptors, hands the
//! result to a [`Transport`] while watching the request's cancellation
//! handle, and folds the settlement through the response interceptors.
//! Plugins attach to it through [`InterceptorHost`].

pub mod error;
pub mod interceptors;
pub mod request;
pub mod transport;

pub use error::{HttpError, HttpErrorKind};
pub use interceptors::{
    ChainId, InterceptorChain, InterceptorId, InterceptorManager, RequestInterceptor,
    ResponseInterceptor,
};
pub use request::{RawResponse, RequestDescriptor, Response};
#[cfg(feature = "reqwest")]
pub use transport::ReqwestTransport;
pub use transport::{ServiceTransport, Transport};

use http::header::HeaderMap;
use http::{Method, StatusCode};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Anything exposing an interceptor chain plugins can attach to
pub trait InterceptorHost {
    /// The chain plugins register their hooks on
    fn interceptors(&self) -> &Arc<InterceptorChain>;
}

impl InterceptorHost for Arc<InterceptorChain> {
    fn interceptors(&self) -> &Arc<InterceptorChain> {
        self
    }
}

/// Client-wide defaults
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL relative request URLs are resolved against
    pub base_url: Option<String>,
    /// Timeout applied to requests that do not set one
    pub timeout: Option<Duration>,
    /// Headers added to requests that do not already carry them
    pub default_headers: HeaderMap,
    /// Statuses accepted as success
    pub validate_status: fn(StatusCode) -> bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: None,
            default_headers: HeaderMap::new(),
            validate_status: |status| status.is_success(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("default_headers", &self.default_headers)
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    /// Set the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the default timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the default headers
    pub fn with_default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = headers;
        self
    }

    /// Set which statuses count as success
    pub fn with_validate_status(mut self, validate: fn(StatusCode) -> bool) -> Self {
        self.validate_status = validate;
        self
    }
}

/// HTTP client with an interceptor chain
#[derive(Clone)]
pub struct HttpClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    interceptors: Arc<InterceptorChain>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .field("interceptors", &self.interceptors.id())
            .finish()
    }
}

impl InterceptorHost for HttpClient {
    fn interceptors(&self) -> &Arc<InterceptorChain> {
        &self.interceptors
    }
}

impl HttpClient {
    /// Create a client over `transport` with default configuration
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    /// Create a client over `transport`
    pub fn with_config(transport: impl Transport + 'static, config: ClientConfig) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            interceptors: Arc::new(InterceptorChain::new()),
        }
    }

    /// Create a client sending real HTTP through `reqwest`
    #[cfg(feature = "reqwest")]
    pub fn reqwest(config: ClientConfig) -> Self {
        let mut transport = ReqwestTransport::default();
        if let Some(base_url) = &config.base_url {
            transport = transport.with_base_url(base_url.clone());
        }
        Self::with_config(transport, config)
    }

    /// Client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a request through the interceptor chain
    pub async fn request(&self, request: RequestDescriptor) -> Result<Response, HttpError> {
        let request = self.apply_defaults(request);

        // Hooks ejected while this request is in flight still settle it.
        let request_hooks = self.interceptors.request.snapshot();
        let response_hooks = self.interceptors.response.snapshot();

        // A failing hook's error carries the descriptor the earlier hooks produced.
        let mut current = request;
        let mut rejected = None;
        for hook in &request_hooks {
            match hook.apply(current.clone()) {
                Ok(next) => current = next,
                Err(error) => {
                    rejected = Some(attach_request(error, &current));
                    break;
                }
            }
        }

        let result = match rejected {
            Some(error) => Err(error),
            None => self.dispatch(current).await,
        };

        response_hooks
            .iter()
            .fold(result, |result, hook| hook.apply(result))
    }

    /// `GET url`
    pub async fn get(&self, url: impl Into<String>) -> Result<Response, HttpError> {
        self.request(RequestDescriptor::get(url)).await
    }

    /// `DELETE url`
    pub async fn delete(&self, url: impl Into<String>) -> Result<Response, HttpError> {
        self.request(RequestDescriptor::delete(url)).await
    }

    /// `HEAD url`
    pub async fn head(&self, url: impl Into<String>) -> Result<Response, HttpError> {
        self.request(RequestDescriptor::new(Method::HEAD, url)).await
    }

    /// `POST url` with a JSON body
    pub async fn post(&self, url: impl Into<String>, data: Value) -> Result<Response, HttpError> {
        self.request(RequestDescriptor::post(url, data)).await
    }

    /// `PUT url` with a JSON body
    pub async fn put(&self, url: impl Into<String>, data: Value) -> Result<Response, HttpError> {
        self.request(RequestDescriptor::new(Method::PUT, url).with_data(data))
            .await
    }

    /// `PATCH url` with a JSON body
    pub async fn patch(&self, url: impl Into<String>, data: Value) -> Result<Response, HttpError> {
        self.request(RequestDescriptor::new(Method::PATCH, url).with_data(data))
            .await
    }

    fn apply_defaults(&self, mut request: RequestDescriptor) -> RequestDescriptor {
        // Handles belong to one dispatch; a re-sent descriptor starts clean.
        request.cancel_handle = None;
        for (name, value) in &self.config.default_headers {
            if !request.headers.contains_key(name) {
                request.headers.insert(name.clone(), value.clone());
            }
        }
        if request.timeout.is_none() {
            request.timeout = self.config.timeout;
        }
        request
    }

    async fn dispatch(&self, request: RequestDescriptor) -> Result<Response, HttpError> {
        debug!("Dispatching {} {}", request.method, request.url);

        let outcome = match request.cancel_handle() {
            Some(handle) => {
                tokio::select! {
                    biased;
                    _ = handle.cancelled() => Err(cancelled_error(handle)),
                    result = self.send(&request) => result,
                }
            }
            None => self.send(&request).await,
        };

        match outcome {
            Ok(raw) => {
                let response = Response::from_raw(raw, request);
                if (self.config.validate_status)(response.status) {
                    Ok(response)
                } else {
                    Err(HttpError::status(response))
                }
            }
            Err(error) => Err(attach_request(error, &request)),
        }
    }

    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, HttpError> {
        match request.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.transport.send(request))
                .await
                .unwrap_or_else(|_| Err(HttpError::timeout())),
            None => self.transport.send(request).await,
        }
    }
}

fn cancelled_error(handle: &crate::cancel::CancelHandle) -> HttpError {
    match handle.reason() {
        Some(reason) => HttpError::cancelled(reason.clone()),
        None => HttpError::invalid_request("request cancelled without a reason"),
    }
}

fn attach_request(error: HttpError, request: &RequestDescriptor) -> HttpError {
    if error.request.is_some() {
        error
    } else {
        error.with_request(request.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::{CancelHandle, CancelKind, CancelReason, RequestKey};
    use http::HeaderValue;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo_client() -> HttpClient {
        HttpClient::new(ServiceTransport::new(tower::service_fn(
            |request: RequestDescriptor| async move {
                let status = if request.url.starts_with("/missing") {
                    StatusCode::NOT_FOUND
                } else {
                    StatusCode::OK
                };
                Ok::<_, HttpError>(RawResponse::new(status, json!({ "url": request.url })))
            },
        )))
    }

    #[tokio::test]
    async fn test_request_runs_through_interceptors() {
        let client = echo_client();
        client.interceptors().request.register(RequestInterceptor::new(|request| {
            Ok(request.with_header("x-seen", HeaderValue::from_static("1")))
        }));
        client
            .interceptors()
            .response
            .register(ResponseInterceptor::fulfilled(|mut response| {
                response.data["intercepted"] = json!(true);
                Ok(response)
            }));

        let response = client.get("/basic").await.unwrap();
        assert_eq!(response.data["url"], "/basic");
        assert_eq!(response.data["intercepted"], true);
        assert!(response.request.headers.contains_key("x-seen"));
    }

    #[tokio::test]
    async fn test_rejected_status_becomes_error() {
        let client = echo_client();
        let error = client.get("/missing").await.unwrap_err();
        assert_eq!(error.status_code(), Some(StatusCode::NOT_FOUND));
        assert_eq!(error.request.unwrap().url, "/missing");
    }

    #[tokio::test]
    async fn test_validate_status_override() {
        let client = HttpClient::with_config(
            ServiceTransport::new(tower::service_fn(|_r: RequestDescriptor| async move {
                Ok::<_, HttpError>(RawResponse::new(StatusCode::NOT_FOUND, json!(null)))
            })),
            ClientConfig::default().with_validate_status(|_| true),
        );
        assert!(client.get("/missing").await.is_ok());
    }

    #[tokio::test]
    async fn test_request_hook_failure_skips_transport() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let client = HttpClient::new(ServiceTransport::new(tower::service_fn(
            move |_r: RequestDescriptor| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, HttpError>(RawResponse::ok(json!(null))) }
            },
        )));
        client
            .interceptors()
            .request
            .register(RequestInterceptor::new(|_| Err(HttpError::invalid_request("nope"))));

        let error = client.get("/basic").await.unwrap_err();
        assert!(matches!(error.kind, HttpErrorKind::InvalidRequest { .. }));
        assert_eq!(error.request.unwrap().url, "/basic");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    fn fired_handle() -> CancelHandle {
        let handle = CancelHandle::new();
        handle.cancel(CancelReason::new(
            CancelKind::Explicit,
            RequestKey::new(Method::GET, "/basic"),
            RequestDescriptor::get("/basic"),
        ));
        handle
    }

    #[tokio::test]
    async fn test_precancelled_handle_wins() {
        let client = echo_client();
        client.interceptors().request.register(RequestInterceptor::new(|mut request| {
            request.cancel_handle = Some(fired_handle());
            Ok(request)
        }));

        let error = client.get("/basic").await.unwrap_err();
        assert!(error.is_cancel());
        assert!(error.request.is_some());
    }

    #[tokio::test]
    async fn test_resent_descriptor_drops_stale_handle() {
        let client = echo_client();
        let mut request = RequestDescriptor::get("/basic");
        request.cancel_handle = Some(fired_handle());

        let response = client.request(request).await.unwrap();
        assert!(response.request.cancel_handle().is_none());
    }

    #[tokio::test]
    async fn test_rejecting_hook_keeps_earlier_hook_output() {
        let client = echo_client();
        client.interceptors().request.register(RequestInterceptor::new(|mut request| {
            request.insert_metadata("stamp", json!("first"));
            Ok(request)
        }));
        client
            .interceptors()
            .request
            .register(RequestInterceptor::new(|_| Err(HttpError::invalid_request("nope"))));

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        client
            .interceptors()
            .response
            .register(ResponseInterceptor::rejected(move |error| {
                if error.descriptor().and_then(|r| r.metadata_str("stamp")) == Some("first") {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                error
            }));

        client.get("/basic").await.unwrap_err();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_from_defaults() {
        let client = HttpClient::with_config(
            ServiceTransport::new(tower::service_fn(|_r: RequestDescriptor| async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, HttpError>(RawResponse::ok(json!(null)))
            })),
            ClientConfig::default().with_timeout(Duration::from_millis(20)),
        );

        let error = client.get("/slow").await.unwrap_err();
        assert!(matches!(error.kind, HttpErrorKind::Timeout));
        assert_eq!(error.request.unwrap().timeout, Some(Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_default_headers_do_not_override() {
        let mut defaults = HeaderMap::new();
        defaults.insert("x-client", HeaderValue::from_static("redel"));
        defaults.insert("x-mode", HeaderValue::from_static("default"));
        let client = HttpClient::with_config(
            ServiceTransport::new(tower::service_fn(|request: RequestDescriptor| async move {
                let mut raw = RawResponse::ok(json!(null));
                raw.headers = request.headers;
                Ok::<_, HttpError>(raw)
            })),
            ClientConfig::default().with_default_headers(defaults),
        );

        let response = client
            .request(
                RequestDescriptor::get("/").with_header("x-mode", HeaderValue::from_static("mine")),
            )
            .await
            .unwrap();
        assert_eq!(response.headers.get("x-client").unwrap(), "redel");
        assert_eq!(response.headers.get("x-mode").unwrap(), "mine");
    }
}
