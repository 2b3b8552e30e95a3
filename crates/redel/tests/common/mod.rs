//! Common test utilities for integration tests
//!
//! A mock transport built from `tower::service_fn` that answers the same
//! routes as the demo server, plus small helpers for driving concurrent
//! requests.

#![allow(dead_code)]

use http::StatusCode;
use redel::client::{HttpClient, HttpError, RawResponse, RequestDescriptor, ServiceTransport};
use redel::plugins::{Attachments, Plugin, PluginHooks};
use redel::client::{RequestInterceptor, ResponseInterceptor};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Delay of `/basic` responses
pub const BASIC_DELAY: Duration = Duration::from_millis(50);

/// Install a test subscriber once; respects `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Routes:
/// - `/basic`: 200 after [`BASIC_DELAY`]
/// - `/time-out/{ms}`: 200 after `ms` milliseconds
/// - `/status/{code}`: that status, immediately
/// - `/network-error`: a network failure
/// - anything else: 200 immediately
pub async fn mock_route(request: RequestDescriptor) -> Result<RawResponse, HttpError> {
    let path = redel::cancel::normalize_path(&request.url);
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    match segments.as_slice() {
        ["basic"] => {
            tokio::time::sleep(BASIC_DELAY).await;
            Ok(RawResponse::ok(json!({ "route": "basic", "method": request.method.as_str() })))
        }
        ["time-out", ms] => {
            let ms: u64 = ms.parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(RawResponse::ok(json!({ "route": "time-out", "ms": ms })))
        }
        ["status", code] => {
            let status = code
                .parse::<u16>()
                .ok()
                .and_then(|c| StatusCode::from_u16(c).ok())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            Ok(RawResponse::new(status, json!({ "route": "status" })))
        }
        ["network-error"] => Err(HttpError::network("connection reset by peer")),
        _ => Ok(RawResponse::ok(json!({ "route": path }))),
    }
}

/// Client over the mock routes
pub fn mock_client() -> HttpClient {
    HttpClient::new(ServiceTransport::new(tower::service_fn(mock_route)))
}

/// Poll `condition` until it holds or a second passes
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..1000 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    condition()
}

/// Plugin counting how many times each of its hooks ran
#[derive(Debug, Default)]
pub struct CountingPlugin {
    pub requests: Arc<AtomicUsize>,
    pub settlements: Arc<AtomicUsize>,
    attachments: Attachments,
}

impl CountingPlugin {
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn settlement_count(&self) -> usize {
        self.settlements.load(Ordering::SeqCst)
    }
}

impl Plugin for CountingPlugin {
    fn name(&self) -> &str {
        "counting"
    }

    fn hooks(&self) -> PluginHooks {
        let requests = Arc::clone(&self.requests);
        let fulfilled = Arc::clone(&self.settlements);
        let rejected = Arc::clone(&self.settlements);

        PluginHooks::new(
            RequestInterceptor::new(move |request| {
                requests.fetch_add(1, Ordering::SeqCst);
                Ok(request)
            }),
            ResponseInterceptor::new(
                move |response| {
                    fulfilled.fetch_add(1, Ordering::SeqCst);
                    Ok(response)
                },
                move |error| {
                    rejected.fetch_add(1, Ordering::SeqCst);
                    error
                },
            ),
        )
    }

    fn attachments(&self) -> &Attachments {
        &self.attachments
    }
}

/// Plugin whose request hook rejects every request
#[derive(Debug, Default)]
pub struct RejectingPlugin {
    attachments: Attachments,
}

impl Plugin for RejectingPlugin {
    fn name(&self) -> &str {
        "rejecting"
    }

    fn hooks(&self) -> PluginHooks {
        PluginHooks::new(
            RequestInterceptor::new(|_| Err(HttpError::invalid_request("rejected by hook"))),
            ResponseInterceptor::default(),
        )
    }

    fn attachments(&self) -> &Attachments {
        &self.attachments
    }
}
