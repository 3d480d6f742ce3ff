use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_GATEWAY: &str = "/";
pub const PATH_STATUS: &str = "/status/{code}";
pub const PATH_GARBAGE: &str = "/garbage";
pub const PATH_SLOW: &str = "/slow";

const WORKERS: [&str; 3] = ["worker-a", "worker-b", "worker-c"];

/// Which gateway requests misbehave, by 1-based request number.
#[derive(Debug, Clone, Default)]
pub struct Disruption {
    /// Answered `502 Bad Gateway` (backend pod gone).
    pub bad_gateway: Vec<RangeInclusive<u64>>,
    /// Answered `504 Gateway Timeout`.
    pub gateway_timeout: Vec<RangeInclusive<u64>>,
    /// Answered normally after `slow_delay`.
    pub slow: Vec<RangeInclusive<u64>>,
    pub slow_delay: Duration,
    /// Answered `200` with a body that is not JSON.
    pub garbage: Vec<RangeInclusive<u64>>,
    /// Retry count reported on every healthy response.
    pub retries: u64,
}

impl Disruption {
    fn hits(ranges: &[RangeInclusive<u64>], n: u64) -> bool {
        ranges.iter().any(|r| r.contains(&n))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    disrupted_total: Arc<AtomicU64>,
}

impl TestServerStats {
    fn next_request(&self) -> u64 {
        self.requests_total.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn inc_disrupted(&self) {
        self.disrupted_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn disrupted_total(&self) -> u64 {
        self.disrupted_total.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
struct AppState {
    stats: TestServerStats,
    disruption: Arc<Disruption>,
}

#[derive(Debug, Serialize)]
struct Backend {
    hostname: String,
}

#[derive(Debug, Serialize)]
struct GatewayResponse {
    status: &'static str,
    gateway: &'static str,
    worker: &'static str,
    backend: Backend,
    #[serde(skip_serializing_if = "is_zero")]
    retries: u64,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

fn healthy(n: u64, retries: u64) -> Response {
    let idx = (n % WORKERS.len() as u64) as usize;
    let worker = WORKERS[idx];
    let body = GatewayResponse {
        status: "ok",
        gateway: "surge-testserver",
        worker,
        backend: Backend {
            hostname: format!("{worker}-pod"),
        },
        retries,
    };
    match serde_json::to_vec(&body) {
        Ok(bytes) => (
            StatusCode::OK,
            [("content-type", "application/json")],
            bytes,
        )
            .into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn handle_gateway(State(state): State<AppState>) -> Response {
    let n = state.stats.next_request();
    let d = &state.disruption;

    if Disruption::hits(&d.bad_gateway, n) {
        state.stats.inc_disrupted();
        return (StatusCode::BAD_GATEWAY, "502 Bad Gateway").into_response();
    }
    if Disruption::hits(&d.gateway_timeout, n) {
        state.stats.inc_disrupted();
        return (StatusCode::GATEWAY_TIMEOUT, "504 Gateway Timeout").into_response();
    }
    if Disruption::hits(&d.garbage, n) {
        state.stats.inc_disrupted();
        return (StatusCode::OK, "<html>upstream maintenance</html>").into_response();
    }
    if Disruption::hits(&d.slow, n) {
        state.stats.inc_disrupted();
        sleep(d.slow_delay).await;
    }

    healthy(n, d.retries)
}

async fn handle_status(State(state): State<AppState>, Path(code): Path<u16>) -> Response {
    state.stats.next_request();
    match StatusCode::from_u16(code) {
        Ok(status) if status == StatusCode::OK => healthy(0, 0),
        Ok(status) => (status, status.to_string()).into_response(),
        Err(_) => (StatusCode::BAD_REQUEST, "invalid status code").into_response(),
    }
}

async fn handle_garbage(State(state): State<AppState>) -> &'static str {
    state.stats.next_request();
    "definitely { not json"
}

#[derive(Debug, Deserialize)]
struct SlowQuery {
    ms: Option<u64>,
}

async fn handle_slow(State(state): State<AppState>, Query(q): Query<SlowQuery>) -> Response {
    let n = state.stats.next_request();
    sleep(Duration::from_millis(q.ms.unwrap_or(50))).await;
    healthy(n, 0)
}

pub fn router(stats: TestServerStats, disruption: Disruption) -> Router {
    let state = AppState {
        stats,
        disruption: Arc::new(disruption),
    };
    Router::new()
        .route(PATH_GATEWAY, get(handle_gateway))
        .route(PATH_STATUS, get(handle_status))
        .route(PATH_GARBAGE, get(handle_garbage))
        .route(PATH_SLOW, get(handle_slow))
        .with_state(state)
}

/// Parses `51-60` or `7` into an inclusive request-number range.
pub fn parse_range(raw: &str) -> Result<RangeInclusive<u64>, String> {
    let raw = raw.trim();
    let (start, end) = match raw.split_once('-') {
        Some((a, b)) => (a.trim(), b.trim()),
        None => (raw, raw),
    };
    let start: u64 = start
        .parse()
        .map_err(|_| format!("invalid range `{raw}` (expected N or N-M)"))?;
    let end: u64 = end
        .parse()
        .map_err(|_| format!("invalid range `{raw}` (expected N or N-M)"))?;
    if start == 0 || end < start {
        return Err(format!("invalid range `{raw}` (1-based, start <= end)"));
    }
    Ok(start..=end)
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(Disruption::default()).await
    }

    pub async fn start_with(disruption: Disruption) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(stats.clone(), disruption);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of the gateway emulator endpoint.
    pub fn gateway_url(&self) -> String {
        format!("{}{PATH_GATEWAY}", self.base_url)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
