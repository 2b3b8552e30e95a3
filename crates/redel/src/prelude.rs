//! Prelude module for convenient imports
//!
//! ```rust
//! use redel::prelude::*;
//!
//! let redel = Redel::new();
//! assert!(!redel.is_bound());
//! ```

// Version information
pub use crate::{CRATE_NAME, VERSION};

pub use crate::cancel::{CancelConfig, CancelPlugin, GroupKey, GroupKeySource, RequestKey};
pub use crate::client::{
    ClientConfig, HttpClient, HttpError, HttpErrorKind, InterceptorChain, InterceptorHost,
    RawResponse, RequestDescriptor, RequestInterceptor, Response, ResponseInterceptor,
    ServiceTransport, Transport,
};
#[cfg(feature = "reqwest")]
pub use crate::client::ReqwestTransport;
pub use crate::config::Settings;
pub use crate::error::{RedelError, RedelResult};
pub use crate::host::{PluginOutcome, PluginSelection, PluginWarning, Redel, RedelBuilder};
pub use crate::plugins::{
    Attachments, LogPlugin, MemorySink, PendingPlugin, Plugin, PluginHooks, RecordSink,
    RequestRecord, TracingSink,
};
