//! Plugin system
//!
//! Plugins contribute one request hook and one response hook to an
//! interceptor chain. Hooks run in the order plugins were attached:
//!
//! ```text
//! Request  → cancel → pending → log → Transport
//! Response → cancel → pending → log → Caller
//! ```
//!
//! ## Core Components
//!
//! - **Plugin**: trait every middleware implements
//! - **lifecycle**: attach/detach, tracking one [`AttachmentHandle`] per chain
//! - **Built-in plugins**: [`CancelPlugin`](crate::cancel::CancelPlugin),
//!   [`PendingPlugin`], [`LogPlugin`]

pub mod core;
pub mod lifecycle;
pub mod log;
pub mod pending;

pub use self::core::{CANCEL_PLUGIN, LOG_PLUGIN, PENDING_PLUGIN, Plugin, PluginHooks};
pub use self::lifecycle::{AttachmentHandle, Attachments, attach, detach};
pub use self::log::{LogPlugin, MemorySink, RecordSink, RequestData, RequestRecord, TracingSink};
pub use self::pending::PendingPlugin;
