//! # Redel
//!
//! Plugins for an interceptor-driven HTTP client: supersede duplicate
//! in-flight requests, cancel requests by group, track pending requests and
//! log a structured record of every call.
//!
//! ## Features
//!
//! - Same method and path supersedes: only the latest call settles normally
//! - Cancel groups tagged by a header or query parameter
//! - Cancelled failures carry an explicit `is_cancelled` marker
//! - Plugins are signed in and out at runtime without leaking hooks
//! - Transport-agnostic: any tower service, or `reqwest` behind the default feature
//!
//! ## Architecture
//!
//! ```text
//! Redel (host) ── signs ──> Plugins (cancel, pending, log, custom)
//!                               │ attach / detach
//!                               ↓
//! HttpClient ── InterceptorChain ── Transport
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use redel::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::reqwest(ClientConfig::default().with_base_url("http://localhost:3002"));
//! let redel = Redel::new();
//! redel.use_config(&client, &serde_json::json!({ "cancel": true, "pending": true }))?;
//!
//! let group = redel.get_cancel_group_header("search")?;
//! let request = RequestDescriptor::get("/basic").with_headers(group);
//! let pending = tokio::spawn({
//!     let client = client.clone();
//!     async move { client.request(request).await }
//! });
//!
//! // Cancel once the request has been admitted
//! while redel.cancel_plugin().in_flight() == 0 {
//!     tokio::time::sleep(std::time::Duration::from_millis(1)).await;
//! }
//! assert_eq!(redel.cancel_group_requests("search")?, 1);
//! assert!(matches!(pending.await?, Err(error) if error.is_cancelled));
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod plugins;
pub mod prelude;

pub use cancel::{CancelConfig, CancelPlugin, GroupKey, GroupKeySource, RequestKey};
pub use client::{
    ClientConfig, HttpClient, HttpError, HttpErrorKind, InterceptorChain, InterceptorHost,
    RequestDescriptor, Response,
};
pub use config::Settings;
pub use error::{RedelError, RedelResult};
pub use host::{PluginOutcome, PluginSelection, PluginWarning, Redel, RedelBuilder};
pub use plugins::{LogPlugin, PendingPlugin, Plugin};

/// Version of redel
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
