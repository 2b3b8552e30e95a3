//! Pending request tracker
//!
//! Remembers the URL of every request between the moment it leaves the
//! request interceptors and the moment it settles.

use super::core::{PENDING_PLUGIN, Plugin, PluginHooks};
use super::lifecycle::Attachments;
use crate::client::{HttpError, RequestDescriptor, RequestInterceptor, Response, ResponseInterceptor};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Metadata key holding the tracker's id for a request
pub const PENDING_METADATA_KEY: &str = "redel.pending.id";

#[derive(Debug, Default)]
struct PendingState {
    next_id: AtomicU64,
    requests: Mutex<BTreeMap<u64, String>>,
}

impl PendingState {
    fn track(&self, mut request: RequestDescriptor) -> RequestDescriptor {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        request.insert_metadata(PENDING_METADATA_KEY, Value::from(id));
        self.requests.lock().insert(id, request.url.clone());
        debug!("Pending {} {} (#{})", request.method, request.url, id);
        request
    }

    fn untrack(&self, request: &RequestDescriptor) {
        if let Some(id) = request.get_metadata(PENDING_METADATA_KEY).and_then(Value::as_u64) {
            self.requests.lock().remove(&id);
        }
    }

    fn on_fulfilled(&self, response: Response) -> Result<Response, HttpError> {
        self.untrack(&response.request);
        Ok(response)
    }

    fn on_rejected(&self, error: HttpError) -> HttpError {
        if let Some(request) = error.descriptor() {
            self.untrack(request);
        }
        error
    }
}

/// Tracks which requests are still waiting for a response.
///
/// One entry per in-flight request: two concurrent calls to the same URL
/// are listed twice.
#[derive(Debug, Default)]
pub struct PendingPlugin {
    state: Arc<PendingState>,
    attachments: Attachments,
}

impl PendingPlugin {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs of in-flight requests, oldest first
    pub fn get_pending_requests(&self) -> Vec<String> {
        self.state.requests.lock().values().cloned().collect()
    }

    /// Forget every tracked request
    pub fn clear(&self) {
        self.state.requests.lock().clear();
    }

    /// Number of in-flight requests
    pub fn len(&self) -> usize {
        self.state.requests.lock().len()
    }

    /// Whether nothing is in flight
    pub fn is_empty(&self) -> bool {
        self.state.requests.lock().is_empty()
    }
}

impl Plugin for PendingPlugin {
    fn name(&self) -> &str {
        PENDING_PLUGIN
    }

    fn description(&self) -> Option<&str> {
        Some("Tracks requests waiting for a response")
    }

    fn hooks(&self) -> PluginHooks {
        let track = Arc::clone(&self.state);
        let fulfilled = Arc::clone(&self.state);
        let rejected = Arc::clone(&self.state);

        PluginHooks::new(
            RequestInterceptor::new(move |request| Ok(track.track(request))),
            ResponseInterceptor::new(
                move |response| fulfilled.on_fulfilled(response),
                move |error| rejected.on_rejected(error),
            ),
        )
    }

    fn attachments(&self) -> &Attachments {
        &self.attachments
    }
}
