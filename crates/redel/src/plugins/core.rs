//! Core plugin traits and types
//!
//! Defines the [`Plugin`] contract every middleware implements and the
//! [`PluginHooks`] pair a plugin contributes to an interceptor chain.

use super::lifecycle::{self, AttachmentHandle, Attachments};
use crate::client::{InterceptorChain, RequestInterceptor, ResponseInterceptor};
use std::fmt;

// ============================================================================
// BUILT-IN NAMES
// ============================================================================

/// Name of the cancellation plugin
pub const CANCEL_PLUGIN: &str = "cancel";

/// Name of the pending tracker plugin
pub const PENDING_PLUGIN: &str = "pending";

/// Name of the request log plugin
pub const LOG_PLUGIN: &str = "log";

// ============================================================================
// HOOKS
// ============================================================================

/// The hooks one plugin contributes: one request interceptor and one
/// response interceptor.
#[derive(Debug, Clone)]
pub struct PluginHooks {
    /// Runs on every outgoing request
    pub request: RequestInterceptor,
    /// Runs on every settlement, successful or not
    pub response: ResponseInterceptor,
}

impl PluginHooks {
    /// Bundle a request and a response interceptor
    pub fn new(request: RequestInterceptor, response: ResponseInterceptor) -> Self {
        Self { request, response }
    }
}

// ============================================================================
// PLUGIN TRAIT
// ============================================================================

/// A middleware that attaches to an interceptor chain.
///
/// Implementors provide their hooks and a place to remember where they are
/// attached; [`apply_plugin`](Plugin::apply_plugin) and
/// [`eject`](Plugin::eject) come for free.
///
/// # Examples
///
/// ```rust
/// use redel::client::{InterceptorChain, RequestInterceptor, ResponseInterceptor};
/// use redel::plugins::{Attachments, Plugin, PluginHooks};
///
/// #[derive(Debug, Default)]
/// struct Noop {
///     attachments: Attachments,
/// }
///
/// impl Plugin for Noop {
///     fn name(&self) -> &str {
///         "noop"
///     }
///
///     fn hooks(&self) -> PluginHooks {
///         PluginHooks::new(RequestInterceptor::new(Ok), ResponseInterceptor::default())
///     }
///
///     fn attachments(&self) -> &Attachments {
///         &self.attachments
///     }
/// }
///
/// let chain = InterceptorChain::new();
/// let plugin = Noop::default();
/// plugin.apply_plugin(&chain);
/// assert_eq!(chain.hook_count(), 2);
/// plugin.eject(&chain);
/// assert_eq!(chain.hook_count(), 0);
/// ```
pub trait Plugin: Send + Sync + fmt::Debug {
    /// Plugin name, unique within a host
    fn name(&self) -> &str;

    /// Optional plugin description
    fn description(&self) -> Option<&str> {
        None
    }

    /// Build a fresh pair of hooks bound to this plugin's state
    fn hooks(&self) -> PluginHooks;

    /// Where this plugin is currently attached
    fn attachments(&self) -> &Attachments;

    /// Install this plugin's hooks on `chain`.
    ///
    /// Attaching twice to the same chain returns the existing handle.
    fn apply_plugin(&self, chain: &InterceptorChain) -> AttachmentHandle {
        lifecycle::attach(self, chain)
    }

    /// Remove this plugin's hooks from `chain`.
    ///
    /// Returns `false` if the plugin was not attached there.
    fn eject(&self, chain: &InterceptorChain) -> bool {
        lifecycle::detach(self, chain)
    }
}
