//! Redel demo
//!
//! Starts a small axum server with a slow `/basic` route and a
//! `/time-out/{ms}` route, binds redel to a reqwest-backed client and fires
//! a burst of identical requests followed by a cancelled group.
//!
//! ```text
//! RUST_LOG=info cargo run -p redel-demo -- --burst 5 --plugins cancel,pending,log
//! ```

use anyhow::Context;
use axum::extract::Path;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use futures::future::join_all;
use redel::prelude::*;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Fire duplicate and grouped requests through redel
#[derive(Parser, Debug)]
#[command(name = "redel-demo", version, about)]
struct Cli {
    /// Port of the local demo server (0 picks a free one)
    #[arg(short, long, default_value_t = 0)]
    port: u16,

    /// Plugins to sign, comma separated
    #[arg(long, value_delimiter = ',', default_value = "cancel,pending,log")]
    plugins: Vec<String>,

    /// Number of identical requests in the burst
    #[arg(short, long, default_value_t = 5)]
    burst: usize,

    /// Number of slow requests in the cancelled group
    #[arg(short, long, default_value_t = 3)]
    group: usize,
}

async fn basic() -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(100)).await;
    Json(json!({ "route": "basic" }))
}

async fn time_out(Path(ms): Path<u64>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(json!({ "route": "time-out", "ms": ms }))
}

async fn serve(port: u16) -> anyhow::Result<String> {
    let app = Router::new()
        .route("/basic", get(basic).delete(basic))
        .route("/time-out/{ms}", get(time_out));
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("demo server stopped: {}", e);
        }
    });
    Ok(format!("http://{addr}"))
}

fn summarize(label: &str, results: &[Result<Response, HttpError>]) {
    let settled = results.iter().filter(|r| r.is_ok()).count();
    let cancelled = results
        .iter()
        .filter(|r| r.as_ref().is_err_and(|e| e.is_cancelled))
        .count();
    info!(
        "{}: {} settled, {} cancelled, {} failed",
        label,
        settled,
        cancelled,
        results.len() - settled - cancelled
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let base_url = serve(cli.port).await?;
    info!("{} {} against {}", CRATE_NAME, VERSION, base_url);

    let client = HttpClient::reqwest(ClientConfig::default().with_base_url(base_url));
    let redel = Redel::builder()
        .log(LogPlugin::default().with_enabled(true))
        .build();

    let selection: Map<String, Value> = cli
        .plugins
        .iter()
        .map(|name| (name.trim().to_string(), Value::Bool(true)))
        .collect();
    redel.use_config(&client, &Value::Object(selection))?;
    info!("signed plugins: {:?}", redel.signed_plugins());

    // Identical requests: all but the last are superseded
    let burst = join_all((0..cli.burst).map(|_| client.get("/basic"))).await;
    summarize("burst", &burst);

    // A slow group cancelled while in flight
    if redel.is_signed("cancel") {
        let header = redel.get_cancel_group_header("demo")?;
        let tasks: Vec<_> = (0..cli.group)
            .map(|i| {
                let client = client.clone();
                let request = RequestDescriptor::get(format!("/time-out/{}", 2000 + i))
                    .with_headers(header.clone());
                tokio::spawn(async move { client.request(request).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok(pending) = redel.pending_requests() {
            info!("pending before group cancel: {:?}", pending);
        }
        let cancelled = redel.cancel_group_requests("demo")?;
        info!("cancel_group_requests(\"demo\") cancelled {}", cancelled);

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            results.push(task.await?);
        }
        summarize("group", &results);
    }

    redel.eject_all();
    Ok(())
}
