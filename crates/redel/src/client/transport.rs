//! Transports: what actually carries a request once the interceptors are done.

use super::error::HttpError;
use super::request::{RawResponse, RequestDescriptor};
use async_trait::async_trait;
use tower::{Service, ServiceExt};

/// Sends one request and decodes its response.
///
/// Transports do not interpret status codes; the client decides which
/// statuses count as failures.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Perform the request
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, HttpError>;
}

/// Adapts a tower [`Service`] into a [`Transport`].
///
/// The service is cloned per call, so any tower stack (timeouts, rate limits,
/// `service_fn` mocks) can sit behind the client.
#[derive(Clone)]
pub struct ServiceTransport<S> {
    inner: S,
}

impl<S> ServiceTransport<S> {
    /// Wrap a service
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// The wrapped service
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S> std::fmt::Debug for ServiceTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl<S> Transport for ServiceTransport<S>
where
    S: Service<RequestDescriptor, Response = RawResponse, Error = HttpError>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send,
{
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, HttpError> {
        self.inner.clone().oneshot(request.clone()).await
    }
}

#[cfg(feature = "reqwest")]
pub use self::reqwest_transport::ReqwestTransport;

#[cfg(feature = "reqwest")]
mod reqwest_transport {
    use super::{HttpError, RawResponse, RequestDescriptor, Transport};
    use async_trait::async_trait;
    use serde_json::Value;
    use tracing::debug;

    /// Real HTTP through `reqwest`.
    ///
    /// Relative URLs are appended to the base URL. Query parameters, JSON
    /// body and per-request timeout come from the descriptor. JSON response
    /// bodies are decoded; anything else becomes a JSON string.
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
        base_url: Option<String>,
    }

    impl Default for ReqwestTransport {
        fn default() -> Self {
            Self::new(reqwest::Client::new())
        }
    }

    impl ReqwestTransport {
        /// Use an existing `reqwest` client
        pub fn new(client: reqwest::Client) -> Self {
            Self {
                client,
                base_url: None,
            }
        }

        /// Resolve relative URLs against `base_url`
        pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
            self.base_url = Some(base_url.into());
            self
        }

        /// The URL a descriptor will be sent to
        pub fn resolve(&self, url: &str) -> String {
            match &self.base_url {
                Some(base) if !is_absolute(url) => format!(
                    "{}/{}",
                    base.trim_end_matches('/'),
                    url.trim_start_matches('/')
                ),
                _ => url.to_string(),
            }
        }
    }

    fn is_absolute(url: &str) -> bool {
        url::Url::parse(url).is_ok_and(|parsed| !parsed.cannot_be_a_base())
    }

    fn map_error(error: reqwest::Error) -> HttpError {
        if error.is_timeout() {
            HttpError::timeout()
        } else {
            HttpError::network(error.to_string())
        }
    }

    #[async_trait]
    impl Transport for ReqwestTransport {
        async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, HttpError> {
            let url = self.resolve(&request.url);
            debug!("Sending {} {}", request.method, url);

            let mut builder = self
                .client
                .request(request.method.clone(), &url)
                .headers(request.headers.clone());
            if !request.params.is_empty() {
                builder = builder.query(&request.params);
            }
            if let Some(data) = &request.data {
                builder = builder.json(data);
            }
            if let Some(timeout) = request.timeout {
                builder = builder.timeout(timeout);
            }

            let response = builder.send().await.map_err(map_error)?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(map_error)?;

            let data = if body.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&body)
                    .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
            };

            Ok(RawResponse {
                status,
                headers,
                data,
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_resolve_relative_and_absolute() {
            let transport = ReqwestTransport::default().with_base_url("http://localhost:3002/");
            assert_eq!(transport.resolve("/basic"), "http://localhost:3002/basic");
            assert_eq!(transport.resolve("basic"), "http://localhost:3002/basic");
            assert_eq!(
                transport.resolve("https://example.com/x"),
                "https://example.com/x"
            );

            let bare = ReqwestTransport::default();
            assert_eq!(bare.resolve("/basic"), "/basic");
        }
    }
}
