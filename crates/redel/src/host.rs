//! Plugin host
//!
//! [`Redel`] binds a set of authorized plugins to one client's interceptor
//! chain and signs them in and out on request. The host starts unbound;
//! [`use_client`](Redel::use_client) binds it, and binding again first ejects
//! every signed plugin so hooks are never installed twice.

use crate::cancel::{CancelConfig, CancelPlugin};
use crate::client::{InterceptorChain, InterceptorHost, RequestDescriptor};
use crate::error::{RedelError, RedelResult};
use crate::plugins::{CANCEL_PLUGIN, LOG_PLUGIN, LogPlugin, PENDING_PLUGIN, PendingPlugin, Plugin};
use http::Method;
use http::header::HeaderMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

// ============================================================================
// SELECTION
// ============================================================================

/// Plugins to sign when binding a client, in signing order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginSelection {
    names: Vec<String>,
}

impl PluginSelection {
    /// Select nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Select every built-in plugin
    pub fn all() -> Self {
        [CANCEL_PLUGIN, PENDING_PLUGIN, LOG_PLUGIN].into_iter().collect()
    }

    /// Add `name` to the selection
    pub fn with(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.names.contains(&name) {
            self.names.push(name);
        }
        self
    }

    /// Read a selection from a JSON object such as `{"cancel": true, "log": true}`.
    ///
    /// Keys whose value is `false` or `null` are left out.
    ///
    /// # Errors
    ///
    /// [`RedelError::Configuration`] if `value` is not an object.
    pub fn from_value(value: &Value) -> RedelResult<Self> {
        let Value::Object(map) = value else {
            return Err(RedelError::configuration(json_type(value)));
        };

        Ok(map
            .iter()
            .filter(|(_, enabled)| !matches!(enabled, Value::Bool(false) | Value::Null))
            .map(|(name, _)| name.as_str())
            .collect())
    }

    /// Selected names
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl<S: Into<String>> FromIterator<S> for PluginSelection {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), |selection, name| selection.with(name))
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// Why `add` or `eject` did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginWarning {
    /// No authorized plugin has that name
    NotAuthorized,
    /// The plugin is already signed
    AlreadySigned,
    /// The plugin is not signed
    NotSigned,
    /// No client is bound yet
    Unbound,
}

impl fmt::Display for PluginWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginWarning::NotAuthorized => write!(f, "plugin is not authorized"),
            PluginWarning::AlreadySigned => write!(f, "plugin is already signed"),
            PluginWarning::NotSigned => write!(f, "plugin is not signed"),
            PluginWarning::Unbound => write!(f, "no client is bound, call use_client first"),
        }
    }
}

/// Result of `add` or `eject`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginOutcome {
    /// The plugin was attached and signed
    Applied,
    /// The plugin was detached and unsigned
    Ejected,
    /// Nothing changed
    Skipped(PluginWarning),
}

impl PluginOutcome {
    /// Whether the call changed anything
    pub fn is_applied(&self) -> bool {
        !matches!(self, PluginOutcome::Skipped(_))
    }

    /// The warning, if nothing changed
    pub fn warning(&self) -> Option<PluginWarning> {
        match self {
            PluginOutcome::Skipped(warning) => Some(*warning),
            _ => None,
        }
    }
}

// ============================================================================
// HOST
// ============================================================================

#[derive(Debug)]
enum HostState {
    Unbound,
    Bound {
        chain: Arc<InterceptorChain>,
        signed: Vec<String>,
    },
}

/// Builder for [`Redel`]
#[derive(Debug, Default)]
pub struct RedelBuilder {
    cancel: Option<CancelPlugin>,
    pending: Option<PendingPlugin>,
    log: Option<LogPlugin>,
    custom: Vec<Arc<dyn Plugin>>,
}

impl RedelBuilder {
    /// Use a configured cancellation plugin
    pub fn cancel(mut self, plugin: CancelPlugin) -> Self {
        self.cancel = Some(plugin);
        self
    }

    /// Shorthand for a cancellation plugin with `config`
    pub fn cancel_config(self, config: CancelConfig) -> Self {
        self.cancel(CancelPlugin::new(config))
    }

    /// Use a configured pending tracker
    pub fn pending(mut self, plugin: PendingPlugin) -> Self {
        self.pending = Some(plugin);
        self
    }

    /// Use a configured log plugin
    pub fn log(mut self, plugin: LogPlugin) -> Self {
        self.log = Some(plugin);
        self
    }

    /// Authorize an additional plugin
    pub fn plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.custom.push(plugin);
        self
    }

    /// Build the host, unbound
    pub fn build(self) -> Redel {
        let cancel = Arc::new(self.cancel.unwrap_or_default());
        let pending = Arc::new(self.pending.unwrap_or_default());
        let log = Arc::new(self.log.unwrap_or_default());

        let mut plugins: Vec<Arc<dyn Plugin>> = vec![
            Arc::clone(&cancel) as Arc<dyn Plugin>,
            Arc::clone(&pending) as Arc<dyn Plugin>,
            Arc::clone(&log) as Arc<dyn Plugin>,
        ];
        for plugin in self.custom {
            if plugins.iter().any(|p| p.name() == plugin.name()) {
                warn!(
                    "Redel: plugin name '{}' is already authorized, ignoring duplicate",
                    plugin.name()
                );
                continue;
            }
            plugins.push(plugin);
        }

        Redel {
            plugins,
            cancel,
            pending,
            log,
            state: Mutex::new(HostState::Unbound),
        }
    }
}

/// Plugin host bound to one client at a time
pub struct Redel {
    plugins: Vec<Arc<dyn Plugin>>,
    cancel: Arc<CancelPlugin>,
    pending: Arc<PendingPlugin>,
    log: Arc<LogPlugin>,
    state: Mutex<HostState>,
}

impl fmt::Debug for Redel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Redel")
            .field("authorized", &self.authorized_plugins())
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl Default for Redel {
    fn default() -> Self {
        Self::new()
    }
}

impl Redel {
    /// Host with default built-in plugins
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building a host
    pub fn builder() -> RedelBuilder {
        RedelBuilder::default()
    }

    /// Bind to `host`'s interceptor chain and sign the selected plugins.
    ///
    /// If already bound, every signed plugin is ejected first. Names that are
    /// not authorized are ignored with a warning.
    pub fn use_client<H: InterceptorHost + ?Sized>(&self, host: &H, selection: &PluginSelection) {
        let mut state = self.state.lock();
        self.eject_all_locked(&mut state);

        let chain = Arc::clone(host.interceptors());
        let mut signed: Vec<String> = Vec::new();
        for name in selection.names() {
            match self.find(name) {
                Some(plugin) => {
                    plugin.apply_plugin(&chain);
                    info!("Redel: {} plugin was signed", name);
                    signed.push(name.clone());
                }
                None => warn!("Redel: ignoring unknown plugin '{}' in selection", name),
            }
        }

        *state = HostState::Bound { chain, signed };
    }

    /// Like [`use_client`](Self::use_client), reading the selection from JSON.
    ///
    /// # Errors
    ///
    /// [`RedelError::Configuration`] if `config` is not a JSON object. The
    /// host is left untouched.
    pub fn use_config<H: InterceptorHost + ?Sized>(&self, host: &H, config: &Value) -> RedelResult<()> {
        let selection = PluginSelection::from_value(config)?;
        self.use_client(host, &selection);
        Ok(())
    }

    /// Sign one more plugin on the bound client.
    pub fn add(&self, name: &str) -> PluginOutcome {
        let outcome = self.add_inner(name);
        if let PluginOutcome::Skipped(warning) = outcome {
            warn!("Redel: cannot add plugin '{}': {}", name, warning);
        }
        outcome
    }

    fn add_inner(&self, name: &str) -> PluginOutcome {
        let Some(plugin) = self.find(name) else {
            return PluginOutcome::Skipped(PluginWarning::NotAuthorized);
        };
        let mut state = self.state.lock();
        let HostState::Bound { chain, signed } = &mut *state else {
            return PluginOutcome::Skipped(PluginWarning::Unbound);
        };
        if signed.iter().any(|s| s == name) {
            return PluginOutcome::Skipped(PluginWarning::AlreadySigned);
        }

        plugin.apply_plugin(chain);
        signed.push(name.to_string());
        info!("Redel: {} plugin was signed", name);
        PluginOutcome::Applied
    }

    /// Unsign one plugin from the bound client.
    pub fn eject(&self, name: &str) -> PluginOutcome {
        let outcome = self.eject_inner(name);
        if let PluginOutcome::Skipped(warning) = outcome {
            warn!("Redel: cannot eject plugin '{}': {}", name, warning);
        }
        outcome
    }

    fn eject_inner(&self, name: &str) -> PluginOutcome {
        let Some(plugin) = self.find(name) else {
            return PluginOutcome::Skipped(PluginWarning::NotAuthorized);
        };
        let mut state = self.state.lock();
        let HostState::Bound { chain, signed } = &mut *state else {
            return PluginOutcome::Skipped(PluginWarning::Unbound);
        };
        let Some(position) = signed.iter().position(|s| s == name) else {
            return PluginOutcome::Skipped(PluginWarning::NotSigned);
        };

        plugin.eject(chain);
        signed.remove(position);
        info!("Redel: {} plugin was ejected", name);
        PluginOutcome::Ejected
    }

    /// Unsign every signed plugin.
    pub fn eject_all(&self) {
        let mut state = self.state.lock();
        self.eject_all_locked(&mut state);
    }

    fn eject_all_locked(&self, state: &mut HostState) {
        let HostState::Bound { chain, signed } = state else {
            return;
        };
        for name in signed.drain(..) {
            if let Some(plugin) = self.find(&name) {
                plugin.eject(chain);
                info!("Redel: {} plugin was ejected", name);
            }
        }
    }

    /// Signed plugin names, in signing order
    pub fn signed_plugins(&self) -> Vec<String> {
        match &*self.state.lock() {
            HostState::Bound { signed, .. } => signed.clone(),
            HostState::Unbound => Vec::new(),
        }
    }

    /// Authorized plugin names
    pub fn authorized_plugins(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Whether `name` is currently signed
    pub fn is_signed(&self, name: &str) -> bool {
        match &*self.state.lock() {
            HostState::Bound { signed, .. } => signed.iter().any(|s| s == name),
            HostState::Unbound => false,
        }
    }

    /// Whether a client is bound
    pub fn is_bound(&self) -> bool {
        matches!(&*self.state.lock(), HostState::Bound { .. })
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn Plugin>> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    fn require_signed(&self, plugin: &str, operation: &str) -> RedelResult<()> {
        if self.is_signed(plugin) {
            Ok(())
        } else {
            Err(RedelError::plugin_not_signed(plugin, operation))
        }
    }

    // ------------------------------------------------------------------------
    // Plugin APIs, available while the owning plugin is signed
    // ------------------------------------------------------------------------

    /// Cancel every in-flight request of `group`.
    ///
    /// # Errors
    ///
    /// [`RedelError::PluginNotSigned`] unless the cancel plugin is signed.
    pub fn cancel_group_requests(&self, group: &str) -> RedelResult<usize> {
        self.require_signed(CANCEL_PLUGIN, "cancel_group_requests")?;
        Ok(self.cancel.cancel_group_requests(group))
    }

    /// Header a request must carry to join `group`.
    ///
    /// # Errors
    ///
    /// [`RedelError::PluginNotSigned`] unless the cancel plugin is signed, or
    /// [`RedelError::InvalidGroupKey`] for an empty group.
    pub fn get_cancel_group_header(&self, group: &str) -> RedelResult<HeaderMap> {
        self.require_signed(CANCEL_PLUGIN, "get_cancel_group_header")?;
        self.cancel.get_cancel_group_header(group)
    }

    /// Tag `request` as a member of `group`.
    ///
    /// # Errors
    ///
    /// [`RedelError::PluginNotSigned`] unless the cancel plugin is signed, or
    /// [`RedelError::InvalidGroupKey`] for an empty group.
    pub fn join_group(&self, request: RequestDescriptor, group: &str) -> RedelResult<RequestDescriptor> {
        self.require_signed(CANCEL_PLUGIN, "join_group")?;
        self.cancel.join_group(request, group)
    }

    /// Cancel the in-flight request for `method` on `url`.
    ///
    /// # Errors
    ///
    /// [`RedelError::PluginNotSigned`] unless the cancel plugin is signed.
    pub fn cancel_request(&self, method: Method, url: &str) -> RedelResult<bool> {
        self.require_signed(CANCEL_PLUGIN, "cancel_request")?;
        Ok(self.cancel.cancel_request(method, url))
    }

    /// URLs of in-flight requests.
    ///
    /// # Errors
    ///
    /// [`RedelError::PluginNotSigned`] unless the pending plugin is signed.
    pub fn pending_requests(&self) -> RedelResult<Vec<String>> {
        self.require_signed(PENDING_PLUGIN, "get_pending_requests")?;
        Ok(self.pending.get_pending_requests())
    }

    /// Forget every pending request.
    ///
    /// # Errors
    ///
    /// [`RedelError::PluginNotSigned`] unless the pending plugin is signed.
    pub fn clear_pending(&self) -> RedelResult<()> {
        self.require_signed(PENDING_PLUGIN, "clear")?;
        self.pending.clear();
        Ok(())
    }

    /// The cancellation plugin, signed or not
    pub fn cancel_plugin(&self) -> &Arc<CancelPlugin> {
        &self.cancel
    }

    /// The pending tracker, signed or not
    pub fn pending_plugin(&self) -> &Arc<PendingPlugin> {
        &self.pending
    }

    /// The log plugin, signed or not
    pub fn log_plugin(&self) -> &Arc<LogPlugin> {
        &self.log
    }
}
