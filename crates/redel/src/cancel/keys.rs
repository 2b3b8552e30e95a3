//! Key derivation for in-flight requests.
//!
//! A [`RequestKey`] names a logical endpoint call: method plus normalized
//! path. Query string, fragment and body never take part, so two calls to the
//! same endpoint supersede one another whatever their parameters. A
//! [`GroupKey`] is read from a single configured header or query parameter.

use crate::client::RequestDescriptor;
use crate::config::Settings;
use crate::error::{RedelError, RedelResult};
use http::Method;
use http::header::HeaderName;
use std::fmt;
use url::Url;

/// Identity of a logical endpoint call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    method: Method,
    path: String,
}

impl RequestKey {
    /// Build a key from a method and a URL or path; the path is normalized.
    #[must_use]
    pub fn new(method: Method, url: &str) -> Self {
        Self {
            method,
            path: normalize_path(url),
        }
    }

    /// The HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The normalized path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.path, self.method)
    }
}

/// Name of a cancel group. Any non-empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(String);

impl GroupKey {
    /// Wrap a group name.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Wrap a group name, rejecting empty ones.
    pub fn parse(key: &str) -> RedelResult<Self> {
        if key.is_empty() {
            return Err(RedelError::invalid_group_key("group key must not be empty"));
        }
        Ok(Self(key.to_string()))
    }

    /// The group name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Keys derived from one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKeys {
    pub request: RequestKey,
    pub group: Option<GroupKey>,
}

/// Where the group key is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKeySource {
    /// A request header
    Header(HeaderName),
    /// A query parameter, looked up in `params` and then in the URL
    Query(String),
}

impl Default for GroupKeySource {
    fn default() -> Self {
        Self::Header(HeaderName::from_static(crate::config::DEFAULT_CANCEL_GROUP_HEADER))
    }
}

impl GroupKeySource {
    /// Resolve the source configured in `settings`.
    ///
    /// A query parameter takes precedence over the header. An unusable
    /// header name falls back to the default header.
    pub fn from_settings(settings: &Settings) -> Self {
        if let Some(param) = &settings.cancel_group_query {
            return Self::Query(param.clone());
        }
        match HeaderName::from_bytes(settings.cancel_group_header.as_bytes()) {
            Ok(name) => Self::Header(name),
            Err(_) => {
                tracing::warn!(
                    "Ignoring invalid cancel group header name '{}', using default",
                    settings.cancel_group_header
                );
                Self::default()
            }
        }
    }
}

/// Pure key derivation; safe to share and call concurrently.
#[derive(Debug, Clone, Default)]
pub struct KeyDeriver {
    group_source: GroupKeySource,
}

impl KeyDeriver {
    /// Create a deriver reading group keys from `group_source`.
    #[must_use]
    pub fn new(group_source: GroupKeySource) -> Self {
        Self { group_source }
    }

    /// Where group keys are read from.
    #[must_use]
    pub fn group_source(&self) -> &GroupKeySource {
        &self.group_source
    }

    /// Derive the request key and optional group key of `request`.
    ///
    /// # Errors
    ///
    /// Returns [`RedelError::MalformedRequest`] if the descriptor has no URL.
    pub fn derive(&self, request: &RequestDescriptor) -> RedelResult<DerivedKeys> {
        if request.url.trim().is_empty() {
            return Err(RedelError::malformed_request(format!(
                "{} request has an empty url",
                request.method
            )));
        }

        Ok(DerivedKeys {
            request: RequestKey::new(request.method.clone(), &request.url),
            group: self.group_key(request),
        })
    }

    /// Read the group key of `request`, if it carries one.
    #[must_use]
    pub fn group_key(&self, request: &RequestDescriptor) -> Option<GroupKey> {
        let value = match &self.group_source {
            GroupKeySource::Header(name) => request
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            GroupKeySource::Query(param) => request
                .params
                .get(param)
                .cloned()
                .or_else(|| query_param(&request.url, param)),
        };

        value.filter(|v| !v.is_empty()).map(GroupKey)
    }
}

/// Reduce a URL or path to its normalized path.
///
/// Absolute URLs keep only their path. Query and fragment are dropped,
/// repeated slashes collapse, and a trailing slash is removed except on the
/// root.
pub fn normalize_path(url: &str) -> String {
    let url = url.trim();
    let raw = match Url::parse(url) {
        Ok(parsed) if !parsed.cannot_be_a_base() => parsed.path().to_string(),
        _ => {
            let end = url.find(['?', '#']).unwrap_or(url.len());
            url[..end].to_string()
        }
    };

    let mut path = String::with_capacity(raw.len() + 1);
    for segment in raw.split('/').filter(|s| !s.is_empty()) {
        path.push('/');
        path.push_str(segment);
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

fn query_param(url: &str, name: &str) -> Option<String> {
    let start = url.find('?')? + 1;
    let end = url[start..].find('#').map_or(url.len(), |i| start + i);
    url::form_urlencoded::parse(url[start..end].as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
