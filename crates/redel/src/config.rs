//! Process-wide settings
//!
//! Settings are read from the environment once, the first time
//! [`Settings::global`] is called, and stay fixed for the life of the process.

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Header carrying the cancel group key when nothing else is configured
pub const DEFAULT_CANCEL_GROUP_HEADER: &str = "x-cancel-group-key";

static GLOBAL: LazyLock<Settings> = LazyLock::new(Settings::from_env);

/// Library-wide configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Whether the log plugin emits request records
    pub allow_log: bool,

    /// Header the cancel plugin reads group keys from
    pub cancel_group_header: String,

    /// Query parameter to read group keys from instead of the header
    pub cancel_group_query: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            allow_log: false,
            cancel_group_header: DEFAULT_CANCEL_GROUP_HEADER.to_string(),
            cancel_group_query: None,
        }
    }
}

impl Settings {
    /// Settings resolved once at first use
    pub fn global() -> &'static Settings {
        &GLOBAL
    }

    /// Load settings from environment variables
    ///
    /// - `REDEL_ALLOW_LOG` (or `ALLOW_LOG`): `"true"` enables request records
    /// - `REDEL_CANCEL_GROUP_HEADER`: header holding the cancel group key
    /// - `REDEL_CANCEL_GROUP_QUERY`: query parameter holding the cancel group key
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let allow_log = std::env::var("REDEL_ALLOW_LOG")
            .or_else(|_| std::env::var("ALLOW_LOG"))
            .map(|v| is_true(&v))
            .unwrap_or(defaults.allow_log);

        let cancel_group_header = std::env::var("REDEL_CANCEL_GROUP_HEADER")
            .ok()
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.cancel_group_header);

        let cancel_group_query = std::env::var("REDEL_CANCEL_GROUP_QUERY")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Self {
            allow_log,
            cancel_group_header,
            cancel_group_query,
        }
    }

    /// Enable or disable request records
    pub fn with_allow_log(mut self, allow_log: bool) -> Self {
        self.allow_log = allow_log;
        self
    }

    /// Read group keys from the given header
    pub fn with_cancel_group_header(mut self, header: impl Into<String>) -> Self {
        self.cancel_group_header = header.into();
        self
    }

    /// Read group keys from the given query parameter
    pub fn with_cancel_group_query(mut self, param: impl Into<String>) -> Self {
        self.cancel_group_query = Some(param.into());
        self
    }
}

fn is_true(value: &str) -> bool {
    value.trim() == "true"
}
