//! Request failures as seen by interceptors and callers.

use super::request::{RequestDescriptor, Response};
use crate::cancel::CancelReason;
use http::StatusCode;
use std::fmt;
use thiserror::Error;

/// Why a request did not produce a successful response
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum HttpErrorKind {
    /// The request's cancellation handle fired before the transport settled
    #[error("request cancelled ({0})")]
    Cancelled(CancelReason),

    /// The transport gave up waiting
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure
    #[error("network error: {message}")]
    Network { message: String },

    /// The server answered with a status rejected by the client
    #[error("request failed with status {status}")]
    Status { status: StatusCode },

    /// The descriptor was rejected before reaching the transport
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
}

/// A rejected request.
///
/// `request` is filled by the client with the descriptor as it left the
/// request interceptors. For cancellations the descriptor captured at
/// admission is also reachable through the cancel reason, see
/// [`HttpError::descriptor`].
#[derive(Debug, Clone)]
pub struct HttpError {
    /// Failure classification
    pub kind: HttpErrorKind,
    /// The request that failed
    pub request: Option<RequestDescriptor>,
    /// The response, for status failures
    pub response: Option<Response>,
    /// Set by the cancel plugin when the failure is its own cancellation
    pub is_cancelled: bool,
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.request {
            Some(request) => write!(f, "{} {}: {}", request.method, request.url, self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl HttpError {
    /// Create an error of the given kind with no request attached.
    #[must_use]
    pub fn new(kind: HttpErrorKind) -> Self {
        Self {
            kind,
            request: None,
            response: None,
            is_cancelled: false,
        }
    }

    /// A cancellation error.
    #[must_use]
    pub fn cancelled(reason: CancelReason) -> Self {
        Self::new(HttpErrorKind::Cancelled(reason))
    }

    /// A timeout error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::new(HttpErrorKind::Timeout)
    }

    /// A network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Network {
            message: message.into(),
        })
    }

    /// A status error carrying the rejected response.
    #[must_use]
    pub fn status(response: Response) -> Self {
        let mut error = Self::new(HttpErrorKind::Status {
            status: response.status,
        });
        error.request = Some(response.request.clone());
        error.response = Some(response);
        error
    }

    /// An invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::InvalidRequest {
            message: message.into(),
        })
    }

    /// Attach the failing request.
    #[must_use]
    pub fn with_request(mut self, request: RequestDescriptor) -> Self {
        self.request = Some(request);
        self
    }

    /// Whether the failure is a cancellation, marked or not.
    #[must_use]
    pub fn is_cancel(&self) -> bool {
        matches!(self.kind, HttpErrorKind::Cancelled(_))
    }

    /// The cancellation reason, for cancellation failures.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<&CancelReason> {
        match &self.kind {
            HttpErrorKind::Cancelled(reason) => Some(reason),
            _ => None,
        }
    }

    /// The descriptor associated with this failure.
    ///
    /// Prefers the attached request and falls back to the descriptor captured
    /// by the cancel reason.
    #[must_use]
    pub fn descriptor(&self) -> Option<&RequestDescriptor> {
        self.request
            .as_ref()
            .or_else(|| self.cancel_reason().map(CancelReason::request))
    }

    /// HTTP status of the response, for status failures.
    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        self.response.as_ref().map(|response| response.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::{CancelKind, RequestKey};
    use crate::client::request::RawResponse;
    use http::Method;
    use serde_json::json;

    #[test]
    fn test_status_error_keeps_response_and_request() {
        let request = RequestDescriptor::get("/missing");
        let response = Response::from_raw(
            RawResponse::new(StatusCode::NOT_FOUND, json!(null)),
            request,
        );
        let error = HttpError::status(response);

        assert!(!error.is_cancel());
        assert_eq!(error.status_code(), Some(StatusCode::NOT_FOUND));
        assert_eq!(error.descriptor().unwrap().url, "/missing");
        assert_eq!(error.to_string(), "GET /missing: request failed with status 404 Not Found");
    }

    #[test]
    fn test_descriptor_falls_back_to_cancel_reason() {
        let captured = RequestDescriptor::get("/basic?page=1");
        let reason = CancelReason::new(
            CancelKind::Superseded,
            RequestKey::new(Method::GET, "/basic"),
            captured,
        );
        let error = HttpError::cancelled(reason);

        assert!(error.is_cancel());
        assert!(!error.is_cancelled);
        assert!(error.request.is_none());
        assert_eq!(error.descriptor().unwrap().url, "/basic?page=1");
    }

    #[test]
    fn test_attached_request_wins_over_cancel_reason() {
        let reason = CancelReason::new(
            CancelKind::Explicit,
            RequestKey::new(Method::GET, "/a"),
            RequestDescriptor::get("/a?captured"),
        );
        let error =
            HttpError::cancelled(reason).with_request(RequestDescriptor::get("/a?attached"));
        assert_eq!(error.descriptor().unwrap().url, "/a?attached");
    }

    #[test]
    fn test_network_error_display() {
        let error = HttpError::network("connection refused");
        assert_eq!(error.to_string(), "network error: connection refused");
    }
}
