use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct Counters {
    changes: Arc<AtomicUsize>,
    fail: Arc<AtomicUsize>,
}

/// A local site with pages that behave like the ones being monitored.
///
/// - `/static` never changes
/// - `/changes` returns a new body on every request
/// - `/fail` returns an incomplete page once, then a real one
/// - `/error` always answers 500
/// - `/slow` takes three seconds
/// - `/api/price` serves JSON
pub struct TestSite {
    base: String,
}

impl TestSite {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

async fn changes(State(counters): State<Counters>) -> String {
    let n = counters.changes.fetch_add(1, Ordering::SeqCst) + 1;
    format!("changes {n}")
}

async fn fail(State(counters): State<Counters>) -> &'static str {
    if counters.fail.fetch_add(1, Ordering::SeqCst) < 1 {
        "None"
    } else {
        "fail"
    }
}

/// Bind to an ephemeral port and serve the test site in the background.
pub async fn spawn_site() -> TestSite {
    let app = Router::new()
        .route("/static", get(|| async { "static" }))
        .route("/changes", get(changes))
        .route("/fail", get(fail))
        .route(
            "/error",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                "slow"
            }),
        )
        .route(
            "/api/price",
            get(|| async { r#"{"data": {"price": 10, "currency": "EUR"}}"# }),
        )
        .with_state(Counters::default());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test site");
    let addr = listener.local_addr().expect("Failed to read local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test site crashed");
    });

    TestSite {
        base: format!("http://{addr}"),
    }
}

/// A URL on a port nothing is listening on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to read local addr");
    drop(listener);
    format!("http://{addr}/static")
}

/// Passes the body through unless it looks incomplete.
pub fn fail_parse(text: &str) -> Option<serde_json::Value> {
    (!text.contains("None")).then(|| text.into())
}
