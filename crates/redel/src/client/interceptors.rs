//! Interceptor chain
//!
//! Two managers, one for request hooks and one for response hooks, each
//! handing out ids that remove exactly the hook they were issued for.
//! Hooks run in registration order.

use super::error::HttpError;
use super::request::{RequestDescriptor, Response};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hook run on every outgoing request
pub type RequestFn =
    dyn Fn(RequestDescriptor) -> Result<RequestDescriptor, HttpError> + Send + Sync;

/// Hook run on every successful response
pub type FulfilledFn = dyn Fn(Response) -> Result<Response, HttpError> + Send + Sync;

/// Hook run on every failure. It cannot recover; the error is always re-rejected.
pub type RejectedFn = dyn Fn(HttpError) -> HttpError + Send + Sync;

/// A request interceptor
#[derive(Clone)]
pub struct RequestInterceptor {
    hook: Arc<RequestFn>,
}

impl RequestInterceptor {
    /// Wrap a request hook
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(RequestDescriptor) -> Result<RequestDescriptor, HttpError> + Send + Sync + 'static,
    {
        Self {
            hook: Arc::new(hook),
        }
    }

    /// Run the hook
    pub fn apply(&self, request: RequestDescriptor) -> Result<RequestDescriptor, HttpError> {
        (self.hook)(request)
    }
}

impl fmt::Debug for RequestInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestInterceptor").finish_non_exhaustive()
    }
}

/// A response interceptor: an optional fulfilled hook and an optional rejected hook
#[derive(Clone, Default)]
pub struct ResponseInterceptor {
    on_fulfilled: Option<Arc<FulfilledFn>>,
    on_rejected: Option<Arc<RejectedFn>>,
}

impl ResponseInterceptor {
    /// Interceptor with both hooks
    pub fn new<F, R>(on_fulfilled: F, on_rejected: R) -> Self
    where
        F: Fn(Response) -> Result<Response, HttpError> + Send + Sync + 'static,
        R: Fn(HttpError) -> HttpError + Send + Sync + 'static,
    {
        Self {
            on_fulfilled: Some(Arc::new(on_fulfilled)),
            on_rejected: Some(Arc::new(on_rejected)),
        }
    }

    /// Interceptor observing successful responses only
    pub fn fulfilled<F>(on_fulfilled: F) -> Self
    where
        F: Fn(Response) -> Result<Response, HttpError> + Send + Sync + 'static,
    {
        Self {
            on_fulfilled: Some(Arc::new(on_fulfilled)),
            on_rejected: None,
        }
    }

    /// Interceptor observing failures only
    pub fn rejected<R>(on_rejected: R) -> Self
    where
        R: Fn(HttpError) -> HttpError + Send + Sync + 'static,
    {
        Self {
            on_fulfilled: None,
            on_rejected: Some(Arc::new(on_rejected)),
        }
    }

    /// Feed one settlement through this interceptor.
    ///
    /// Successes go to the fulfilled hook, failures to the rejected hook;
    /// a missing hook passes its side through unchanged.
    pub fn apply(&self, result: Result<Response, HttpError>) -> Result<Response, HttpError> {
        match result {
            Ok(response) => match &self.on_fulfilled {
                Some(hook) => hook(response),
                None => Ok(response),
            },
            Err(error) => match &self.on_rejected {
                Some(hook) => Err(hook(error)),
                None => Err(error),
            },
        }
    }
}

impl fmt::Debug for ResponseInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseInterceptor")
            .field("on_fulfilled", &self.on_fulfilled.is_some())
            .field("on_rejected", &self.on_rejected.is_some())
            .finish()
    }
}

/// Identifier of a registered interceptor; never reused within a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterceptorId(u64);

impl fmt::Display for InterceptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ordered set of interceptors of one kind
pub struct InterceptorManager<T> {
    next_id: AtomicU64,
    entries: RwLock<BTreeMap<InterceptorId, T>>,
}

impl<T> Default for InterceptorManager<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T: Clone> InterceptorManager<T> {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor and return the id that removes it
    pub fn register(&self, interceptor: T) -> InterceptorId {
        let id = InterceptorId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().insert(id, interceptor);
        id
    }

    /// Remove the interceptor registered under `id`.
    ///
    /// Returns `false` if there was none.
    pub fn eject(&self, id: InterceptorId) -> bool {
        self.entries.write().remove(&id).is_some()
    }

    /// Whether `id` is still registered
    pub fn contains(&self, id: InterceptorId) -> bool {
        self.entries.read().contains_key(&id)
    }

    /// Number of registered interceptors
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no interceptor is registered
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Remove every interceptor
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Registered interceptors in registration order
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.read().values().cloned().collect()
    }
}

impl<T> fmt::Debug for InterceptorManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorManager")
            .field("len", &self.entries.read().len())
            .finish()
    }
}

static NEXT_CHAIN_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique identity of an [`InterceptorChain`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(u64);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain-{}", self.0)
    }
}

/// The request and response interceptors of one client
#[derive(Debug)]
pub struct InterceptorChain {
    id: ChainId,
    /// Request interceptors
    pub request: InterceptorManager<RequestInterceptor>,
    /// Response interceptors
    pub response: InterceptorManager<ResponseInterceptor>,
}

impl Default for InterceptorChain {
    fn default() -> Self {
        Self::new()
    }
}

impl InterceptorChain {
    /// Create an empty chain with a fresh id
    pub fn new() -> Self {
        Self {
            id: ChainId(NEXT_CHAIN_ID.fetch_add(1, Ordering::Relaxed)),
            request: InterceptorManager::new(),
            response: InterceptorManager::new(),
        }
    }

    /// This chain's identity
    pub fn id(&self) -> ChainId {
        self.id
    }

    /// Total number of hooks registered on both managers
    pub fn hook_count(&self) -> usize {
        self.request.len() + self.response.len()
    }
}
