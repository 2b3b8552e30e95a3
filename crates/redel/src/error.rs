//! Host-side error types
//!
//! Errors raised by the plugin host and by the cancellation API. Failures of
//! individual HTTP calls travel as [`HttpError`](crate::client::HttpError)
//! instead, so callers can tell misuse of the library apart from a request
//! that did not complete.

use thiserror::Error;

/// Errors that can occur while configuring or driving the plugin host
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RedelError {
    /// The `use` call was given a selection that is not a plain mapping
    #[error("Redel: try to initialize the \"use\" function with wrong config type ({message})")]
    Configuration { message: String },

    /// A plugin-specific API was called while that plugin is not signed
    #[error(
        "Redel: cannot call `{operation}` because the `{plugin}` plugin is not signed; \
         sign it with `use_client` or `add(\"{plugin}\")` first"
    )]
    PluginNotSigned { plugin: String, operation: String },

    /// A group key was empty or cannot be carried on a request
    #[error("Invalid cancel group key: {message}")]
    InvalidGroupKey { message: String },

    /// A request descriptor is missing the parts needed to derive its keys
    #[error("Malformed request descriptor: {message}")]
    MalformedRequest { message: String },
}

impl RedelError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an unsigned-plugin error naming the plugin and the attempted operation
    pub fn plugin_not_signed(plugin: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::PluginNotSigned {
            plugin: plugin.into(),
            operation: operation.into(),
        }
    }

    /// Create an invalid group key error
    pub fn invalid_group_key(message: impl Into<String>) -> Self {
        Self::InvalidGroupKey {
            message: message.into(),
        }
    }

    /// Create a malformed request error
    pub fn malformed_request(message: impl Into<String>) -> Self {
        Self::MalformedRequest {
            message: message.into(),
        }
    }
}

pub type RedelResult<T> = Result<T, RedelError>;
