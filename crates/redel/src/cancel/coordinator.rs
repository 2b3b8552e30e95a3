//! Cancellation plugin
//!
//! Admission cancels any in-flight request with the same key before the new
//! one proceeds, so at most one live handle exists per key. Settlement
//! releases the request's own entry and marks failures caused by a
//! cancellation with [`HttpError::is_cancelled`].

use super::handle::{CancelHandle, CancelKind};
use super::keys::{GroupKey, GroupKeySource, KeyDeriver, RequestKey};
use super::registry::{CancelEntry, CancellationRegistry, RequestTicket};
use crate::client::{HttpError, RequestDescriptor, RequestInterceptor, Response, ResponseInterceptor};
use crate::config::Settings;
use crate::error::{RedelError, RedelResult};
use crate::plugins::{Attachments, CANCEL_PLUGIN, Plugin, PluginHooks};
use http::header::{HeaderMap, HeaderValue};
use http::Method;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Metadata key holding the admission ticket of a request
pub const TICKET_METADATA_KEY: &str = "redel.cancel.ticket";

/// Cancellation plugin configuration
#[derive(Debug, Clone, Default)]
pub struct CancelConfig {
    /// Where group keys are read from
    pub group_source: GroupKeySource,
}

impl CancelConfig {
    /// Configuration derived from `settings`
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            group_source: GroupKeySource::from_settings(settings),
        }
    }

    /// Read group keys from `source`
    pub fn with_group_source(mut self, source: GroupKeySource) -> Self {
        self.group_source = source;
        self
    }
}

#[derive(Debug)]
struct CancelState {
    deriver: KeyDeriver,
    registry: Mutex<CancellationRegistry>,
}

impl CancelState {
    fn admit(&self, mut request: RequestDescriptor) -> Result<RequestDescriptor, HttpError> {
        let keys = self
            .deriver
            .derive(&request)
            .map_err(|e| HttpError::invalid_request(e.to_string()))?;

        let ticket = RequestTicket::new();
        request.insert_metadata(TICKET_METADATA_KEY, Value::String(ticket.to_string()));

        let handle = CancelHandle::new();
        let entry = CancelEntry::new(handle.clone(), keys.group, request.clone(), ticket);
        request.cancel_handle = Some(handle);

        let mut registry = self.registry.lock();
        if let Some(previous) = registry.remove(&keys.request) {
            debug!("Superseding in-flight {}", keys.request);
            previous.cancel(CancelKind::Superseded, keys.request.clone());
        }
        debug!("Admitted {} ({})", keys.request, ticket);
        registry.register(keys.request, entry);

        Ok(request)
    }

    fn settle(&self, request: &RequestDescriptor) {
        let Some(ticket) = request
            .metadata_str(TICKET_METADATA_KEY)
            .and_then(|raw| raw.parse::<RequestTicket>().ok())
        else {
            return;
        };
        let Ok(keys) = self.deriver.derive(request) else {
            return;
        };

        if self.registry.lock().release(&keys.request, ticket).is_some() {
            debug!("Released {} ({})", keys.request, ticket);
        }
    }

    fn on_fulfilled(&self, response: Response) -> Result<Response, HttpError> {
        self.settle(&response.request);
        Ok(response)
    }

    fn on_rejected(&self, mut error: HttpError) -> HttpError {
        if let Some(request) = error.descriptor() {
            self.settle(request);
        }

        if error.is_cancel() {
            error.is_cancelled = true;
            match error.descriptor() {
                Some(request) => info!("cancel request execute: {} {}", request.method, request.url),
                None => info!("cancel request execute"),
            }
        }
        error
    }
}

/// Supersede-and-group cancellation of in-flight requests.
///
/// Requests sharing method and path supersede one another. Requests carrying
/// a group key can be cancelled together with
/// [`cancel_group_requests`](Self::cancel_group_requests).
#[derive(Debug)]
pub struct CancelPlugin {
    config: CancelConfig,
    state: Arc<CancelState>,
    attachments: Attachments,
}

impl Default for CancelPlugin {
    fn default() -> Self {
        Self::new(CancelConfig::from_settings(Settings::global()))
    }
}

impl CancelPlugin {
    /// Create a plugin with its own empty registry
    pub fn new(config: CancelConfig) -> Self {
        Self {
            state: Arc::new(CancelState {
                deriver: KeyDeriver::new(config.group_source.clone()),
                registry: Mutex::new(CancellationRegistry::new()),
            }),
            config,
            attachments: Attachments::new(),
        }
    }

    /// Plugin configuration
    pub fn config(&self) -> &CancelConfig {
        &self.config
    }

    /// Cancel every in-flight request of `group`.
    ///
    /// Returns how many were cancelled. Unknown, empty or drained groups
    /// cancel nothing.
    pub fn cancel_group_requests(&self, group: &str) -> usize {
        if group.is_empty() {
            return 0;
        }
        let cancelled = self.state.registry.lock().cancel_group(&GroupKey::new(group));
        if cancelled > 0 {
            info!("Cancelled {} request(s) in group '{}'", cancelled, group);
        }
        cancelled
    }

    /// Cancel the in-flight request for `method` on `url`, if any.
    pub fn cancel_request(&self, method: Method, url: &str) -> bool {
        let key = RequestKey::new(method, url);
        let cancelled = self.state.registry.lock().cancel(&key, CancelKind::Explicit);
        if cancelled {
            debug!("Cancelled in-flight {} explicitly", key);
        }
        cancelled
    }

    /// Header a request must carry to join `group`.
    ///
    /// # Errors
    ///
    /// [`RedelError::InvalidGroupKey`] if `group` is empty or not a valid header
    /// value, or if group keys are read from a query parameter.
    pub fn get_cancel_group_header(&self, group: &str) -> RedelResult<HeaderMap> {
        let group = GroupKey::parse(group)?;
        let GroupKeySource::Header(name) = &self.config.group_source else {
            return Err(RedelError::invalid_group_key(
                "cancel groups are read from a query parameter, use join_group",
            ));
        };
        let value = HeaderValue::from_str(group.as_str())
            .map_err(|e| RedelError::invalid_group_key(format!("'{}': {}", group, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(name.clone(), value);
        Ok(headers)
    }

    /// Tag `request` as a member of `group`, whatever the configured source.
    ///
    /// # Errors
    ///
    /// [`RedelError::InvalidGroupKey`] if `group` is empty or not a valid header value.
    pub fn join_group(
        &self,
        request: RequestDescriptor,
        group: &str,
    ) -> RedelResult<RequestDescriptor> {
        match &self.config.group_source {
            GroupKeySource::Header(_) => Ok(request.with_headers(self.get_cancel_group_header(group)?)),
            GroupKeySource::Query(param) => {
                let group = GroupKey::parse(group)?;
                Ok(request.with_param(param.clone(), group.as_str()))
            }
        }
    }

    /// Number of in-flight requests holding a handle
    pub fn in_flight(&self) -> usize {
        self.state.registry.lock().len()
    }

    /// Request keys registered under `group`, in admission order
    pub fn group_members(&self, group: &str) -> Vec<RequestKey> {
        self.state.registry.lock().group_members(&GroupKey::new(group))
    }

    /// Whether `group` has live members
    pub fn has_group(&self, group: &str) -> bool {
        self.state.registry.lock().has_group(&GroupKey::new(group))
    }

    /// Whether the registry's handle and group maps agree
    pub fn is_consistent(&self) -> bool {
        let consistent = self.state.registry.lock().is_consistent();
        if !consistent {
            warn!("Cancellation registry handle and group maps disagree");
        }
        consistent
    }
}

impl Plugin for CancelPlugin {
    fn name(&self) -> &str {
        CANCEL_PLUGIN
    }

    fn description(&self) -> Option<&str> {
        Some("Cancels superseded and grouped in-flight requests")
    }

    fn hooks(&self) -> PluginHooks {
        let admit = Arc::clone(&self.state);
        let fulfilled = Arc::clone(&self.state);
        let rejected = Arc::clone(&self.state);

        PluginHooks::new(
            RequestInterceptor::new(move |request| admit.admit(request)),
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
