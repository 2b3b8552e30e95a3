//! Request log plugin
//!
//! Builds one [`RequestRecord`] per request, completes it when the request
//! settles and hands it to a [`RecordSink`]. Records are dropped right after
//! emission.

use super::core::{LOG_PLUGIN, Plugin, PluginHooks};
use super::lifecycle::Attachments;
use crate::client::{HttpError, RequestDescriptor, RequestInterceptor, Response, ResponseInterceptor};
use crate::config::Settings;
use chrono::{DateTime, Utc};
use http::header::HeaderMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Metadata key holding the log correlation id of a request
pub const LOG_METADATA_KEY: &str = "redel.log.request_id";

/// Data a request sent to the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestData {
    /// Parameters parsed from the URL query string
    pub query: BTreeMap<String, String>,
    /// JSON body
    pub data: Value,
    /// Query parameters set on the descriptor
    pub params: BTreeMap<String, String>,
}

/// Everything logged about one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub url: String,
    pub method: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds between admission and settlement
    pub total_time: Option<u64>,
    /// Request timeout in milliseconds
    pub timeout: Option<u64>,
    pub request_headers: BTreeMap<String, String>,
    pub request_data: RequestData,
    pub response_data: Option<Value>,
    pub status: Option<u16>,
    pub is_completed_without_error: Option<bool>,
}

impl RequestRecord {
    fn start(request: &RequestDescriptor) -> Self {
        Self {
            url: request.url.clone(),
            method: request.method.to_string(),
            start_time: Utc::now(),
            end_time: None,
            total_time: None,
            timeout: request
                .timeout
                .map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
            request_headers: header_map(&request.headers),
            request_data: RequestData {
                query: url_query(&request.url),
                data: request.data.clone().unwrap_or(Value::Object(Default::default())),
                params: request.params.clone(),
            },
            response_data: None,
            status: None,
            is_completed_without_error: None,
        }
    }

    fn finish(&mut self, started: Instant, status: Option<u16>, data: Option<Value>, ok: bool) {
        self.end_time = Some(Utc::now());
        self.total_time = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));
        self.status = status;
        self.response_data = data;
        self.is_completed_without_error = Some(ok);
    }
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn url_query(url: &str) -> BTreeMap<String, String> {
    let Some((_, rest)) = url.split_once('?') else {
        return BTreeMap::new();
    };
    let query = rest.split('#').next().unwrap_or_default();
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

// ============================================================================
// SINKS
// ============================================================================

/// Destination of finished records
pub trait RecordSink: Send + Sync + fmt::Debug {
    /// Receive one finished record
    fn emit(&self, record: &RequestRecord);
}

/// Emits records as `tracing` events, one per request, grouped under its URL
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl RecordSink for TracingSink {
    fn emit(&self, record: &RequestRecord) {
        match serde_json::to_string_pretty(record) {
            Ok(json) => info!(target: "redel::log", "{}\n{}", record.url, json),
            Err(e) => info!(target: "redel::log", "{}: unserializable record: {}", record.url, e),
        }
    }
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<RequestRecord>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Records received so far
    pub fn records(&self) -> Vec<RequestRecord> {
        self.records.lock().clone()
    }

    /// Drain the received records
    pub fn take(&self) -> Vec<RequestRecord> {
        std::mem::take(&mut *self.records.lock())
    }
}

impl RecordSink for MemorySink {
    fn emit(&self, record: &RequestRecord) {
        self.records.lock().push(record.clone());
    }
}

impl<S: RecordSink + ?Sized> RecordSink for Arc<S> {
    fn emit(&self, record: &RequestRecord) {
        (**self).emit(record);
    }
}

// ============================================================================
// PLUGIN
// ============================================================================

#[derive(Debug)]
struct LogState {
    enabled: AtomicBool,
    sink: Box<dyn RecordSink>,
    open: Mutex<HashMap<Uuid, (Instant, RequestRecord)>>,
}

impl LogState {
    fn correlation_id(request: &RequestDescriptor) -> Option<Uuid> {
        request
            .metadata_str(LOG_METADATA_KEY)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }

    fn open(&self, mut request: RequestDescriptor) -> RequestDescriptor {
        if !self.enabled.load(Ordering::Relaxed) {
            return request;
        }
        // Always fresh: a re-sent descriptor still carries its previous id.
        let id = Uuid::new_v4();
        request.insert_metadata(LOG_METADATA_KEY, Value::String(id.to_string()));
        self.open
            .lock()
            .insert(id, (Instant::now(), RequestRecord::start(&request)));
        request
    }

    fn close(&self, request: &RequestDescriptor, status: Option<u16>, data: Option<Value>, ok: bool) {
        let Some(id) = Self::correlation_id(request) else {
            return;
        };
        // A request cancelled before this plugin saw it has no record.
        let Some((started, mut record)) = self.open.lock().remove(&id) else {
            return;
        };
        record.finish(started, status, data, ok);
        self.sink.emit(&record);
    }

    fn on_fulfilled(&self, response: Response) -> Result<Response, HttpError> {
        self.close(
            &response.request,
            Some(response.status.as_u16()),
            Some(response.data.clone()),
            true,
        );
        Ok(response)
    }

    fn on_rejected(&self, error: HttpError) -> HttpError {
        if let Some(request) = error.descriptor() {
            let response = error.response.as_ref();
            self.close(
                request,
                response.map(|r| r.status.as_u16()),
                response.map(|r| r.data.clone()),
                false,
            );
        }
        error
    }
}

/// Logs a structured record of every request.
///
/// Disabled unless [`Settings::allow_log`] is set, or enabled explicitly with
/// [`with_enabled`](Self::with_enabled).
#[derive(Debug)]
pub struct LogPlugin {
    state: Arc<LogState>,
    attachments: Attachments,
}

impl Default for LogPlugin {
    fn default() -> Self {
        Self::new(TracingSink)
    }
}

impl LogPlugin {
    /// Create a plugin emitting to `sink`, enabled per global settings
    pub fn new(sink: impl RecordSink + 'static) -> Self {
        Self {
            state: Arc::new(LogState {
                enabled: AtomicBool::new(Settings::global().allow_log),
                sink: Box::new(sink),
                open: Mutex::new(HashMap::new()),
            }),
            attachments: Attachments::new(),
        }
    }

    /// Override the global enable flag for this instance
    pub fn with_enabled(self, enabled: bool) -> Self {
        self.set_enabled(enabled);
        self
    }

    /// Turn record emission on or off
    pub fn set_enabled(&self, enabled: bool) {
        self.state.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether records are emitted
    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::Relaxed)
    }

    /// Number of requests recorded but not yet settled
    pub fn open_records(&self) -> usize {
        self.state.open.lock().len()
    }
}

impl Plugin for LogPlugin {
    fn name(&self) -> &str {
        LOG_PLUGIN
    }

    fn description(&self) -> Option<&str> {
        Some("Logs a structured record of every request")
    }

    fn hooks(&self) -> PluginHooks {
        let open = Arc::clone(&self.state);
        let fulfilled = Arc::clone(&self.state);
        let rejected = Arc::clone(&self.state);

        PluginHooks::new(
            RequestInterceptor::new(move |request| Ok(open.open(request))),
            ResponseInterceptor::new(
                move |response| fulfilled.on_fulfilled(response),
                move |error| rejected.on_rejected(error),
            ),
        )
    }

    fn attachments(&self) -> &Attachments {
        &self.attachments
    }
}
