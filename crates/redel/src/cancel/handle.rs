//! Cancellation handles and the reasons they fire with.

use super::keys::{GroupKey, RequestKey};
use crate::client::RequestDescriptor;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

/// What triggered a cancellation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelKind {
    /// A newer request with the same key was admitted
    Superseded,
    /// The request's cancel group was cancelled
    Group(GroupKey),
    /// The request was cancelled by key from outside the hooks
    Explicit,
}

impl fmt::Display for CancelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelKind::Superseded => write!(f, "superseded by a newer request"),
            CancelKind::Group(group) => write!(f, "cancel group '{}' was cancelled", group),
            CancelKind::Explicit => write!(f, "cancelled explicitly"),
        }
    }
}

/// Why a handle fired, plus the descriptor captured when its request was admitted.
#[derive(Debug, Clone)]
pub struct CancelReason {
    kind: CancelKind,
    key: RequestKey,
    request: Box<RequestDescriptor>,
}

impl CancelReason {
    /// Create a reason for cancelling the request registered under `key`.
    #[must_use]
    pub fn new(kind: CancelKind, key: RequestKey, request: RequestDescriptor) -> Self {
        Self {
            kind,
            key,
            request: Box::new(request),
        }
    }

    /// What triggered the cancellation.
    #[must_use]
    pub fn kind(&self) -> &CancelKind {
        &self.kind
    }

    /// Key of the cancelled request.
    #[must_use]
    pub fn key(&self) -> &RequestKey {
        &self.key
    }

    /// The cancelled request as it was admitted.
    #[must_use]
    pub fn request(&self) -> &RequestDescriptor {
        &self.request
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.kind)
    }
}

/// Capability to abort exactly one in-flight request.
///
/// Clones share state: cancelling any clone cancels them all. The first
/// reason recorded wins; later calls to [`cancel`](Self::cancel) are no-ops.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
}

impl CancelHandle {
    /// Create a live handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the handle. Returns `false` if it had already fired.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        first
    }

    /// Whether the handle has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason the handle fired with.
    #[must_use]
    pub fn reason(&self) -> Option<&CancelReason> {
        self.reason.get()
    }

    /// Resolves once the handle fires.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Underlying token, for transports that observe cancellation themselves.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use std::time::Duration;

    fn reason(kind: CancelKind) -> CancelReason {
        CancelReason::new(
            kind,
            RequestKey::new(Method::GET, "/basic"),
            RequestDescriptor::get("/basic"),
        )
    }

    #[test]
    fn test_first_reason_wins() {
        let handle = CancelHandle::new();
        assert!(!handle.is_cancelled());
        assert!(handle.reason().is_none());

        assert!(handle.cancel(reason(CancelKind::Superseded)));
        assert!(!handle.cancel(reason(CancelKind::Explicit)));

        assert!(handle.is_cancelled());
        assert_eq!(handle.reason().unwrap().kind(), &CancelKind::Superseded);
    }

    #[test]
    fn test_clones_share_state() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        clone.cancel(reason(CancelKind::Group(GroupKey::new("g1"))));
        assert!(handle.is_cancelled());
        assert_eq!(
            handle.reason().unwrap().to_string(),
            "/basic -> GET: cancel group 'g1' was cancelled"
        );
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves() {
        let handle = CancelHandle::new();
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel(reason(CancelKind::Explicit));

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("cancellation should wake the waiter")
            .unwrap();
    }
}
