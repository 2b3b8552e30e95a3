//! Plugin lifecycle: attaching hooks to a chain and removing exactly those hooks.

use super::core::Plugin;
use crate::client::{ChainId, InterceptorChain, InterceptorId};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// The interceptor ids one attachment registered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentHandle {
    /// Chain the hooks were registered on
    pub chain: ChainId,
    /// Request interceptor id
    pub request: InterceptorId,
    /// Response interceptor id
    pub response: InterceptorId,
}

/// Attachment handles of one plugin, one per chain
#[derive(Debug, Default)]
pub struct Attachments {
    handles: Mutex<HashMap<ChainId, AttachmentHandle>>,
}

impl Attachments {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `chain`, if attached there
    pub fn get(&self, chain: ChainId) -> Option<AttachmentHandle> {
        self.handles.lock().get(&chain).copied()
    }

    /// Whether attached to `chain`
    pub fn is_attached(&self, chain: ChainId) -> bool {
        self.handles.lock().contains_key(&chain)
    }

    /// Number of chains attached to
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    /// Whether attached nowhere
    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }
}

/// Install one request hook and one response hook of `plugin` on `chain`.
///
/// A plugin may be attached to many chains at once, each with its own
/// handle. Attaching again to a chain it is already on changes nothing and
/// returns the existing handle.
pub fn attach<P: Plugin + ?Sized>(plugin: &P, chain: &InterceptorChain) -> AttachmentHandle {
    let mut handles = plugin.attachments().handles.lock();

    if let Some(existing) = handles.get(&chain.id()) {
        warn!(
            "Plugin '{}' is already attached to {}, keeping existing hooks",
            plugin.name(),
            chain.id()
        );
        return *existing;
    }

    let hooks = plugin.hooks();
    let handle = AttachmentHandle {
        chain: chain.id(),
        request: chain.request.register(hooks.request),
        response: chain.response.register(hooks.response),
    };
    handles.insert(chain.id(), handle);

    info!(
        "Attached plugin '{}' to {} (request {}, response {})",
        plugin.name(),
        handle.chain,
        handle.request,
        handle.response
    );
    handle
}

/// Remove the hooks `plugin` installed on `chain`.
///
/// Other hooks on the chain are untouched. Returns `false`, doing nothing,
/// if the plugin was never attached there.
pub fn detach<P: Plugin + ?Sized>(plugin: &P, chain: &InterceptorChain) -> bool {
    let Some(handle) = plugin.attachments().handles.lock().remove(&chain.id()) else {
        debug!(
            "Plugin '{}' has no hooks on {}, nothing to detach",
            plugin.name(),
            chain.id()
        );
        return false;
    };

    chain.request.eject(handle.request);
    chain.response.eject(handle.response);

    info!("Detached plugin '{}' from {}", plugin.name(), handle.chain);
    true
}
