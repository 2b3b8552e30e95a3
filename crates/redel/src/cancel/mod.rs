//! Request cancellation
//!
//! - [`keys`]: request and group key derivation
//! - [`handle`]: per-request cancellation handles
//! - [`registry`]: live handles and group membership
//! - [`coordinator`]: the plugin wiring them into an interceptor chain

pub mod coordinator;
pub mod handle;
pub mod keys;
pub mod registry;

pub use coordinator::{CancelConfig, CancelPlugin, TICKET_METADATA_KEY};
pub use handle::{CancelHandle, CancelKind, CancelReason};
pub use keys::{DerivedKeys, GroupKey, GroupKeySource, KeyDeriver, RequestKey, normalize_path};
pub use registry::{CancelEntry, CancellationRegistry, RequestTicket};
