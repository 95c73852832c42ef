//! Local HTTP target emulating the API gateway and backend service the load
//! profiles are written against.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_HEALTH: &str = "/health";
pub const PATH_PROCESS: &str = "/api/process";
pub const PATH_INFO: &str = "/api/info";
pub const PATH_STATS: &str = "/stats";
pub const PATH_SLOW: &str = "/slow";
pub const PATH_STATUS: &str = "/status/{code}";

/// Shared counters and fault toggles. Clones share state with the running server.
#[derive(Debug, Clone, Default)]
pub struct TestServerState {
    requests_total: Arc<AtomicU64>,
    process_total: Arc<AtomicU64>,
    process_failed: Arc<AtomicU64>,
    unhealthy: Arc<AtomicBool>,
    overload_every: Arc<AtomicU64>,
    process_delay_ms: Arc<AtomicU64>,
}

impl TestServerState {
    fn hit(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn process_total(&self) -> u64 {
        self.process_total.load(Ordering::Relaxed)
    }

    pub fn process_failed(&self) -> u64 {
        self.process_failed.load(Ordering::Relaxed)
    }

    /// Make `/health` answer 503.
    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.unhealthy.store(unhealthy, Ordering::Relaxed);
    }

    /// Answer every `n`th `/api/process` call with 503 (0 disables).
    pub fn set_overload_every(&self, n: u64) {
        self.overload_every.store(n, Ordering::Relaxed);
    }

    /// Extra latency added to `/api/process`.
    pub fn set_process_delay(&self, delay: Duration) {
        self.process_delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }
}

async fn handle_health(State(state): State<TestServerState>) -> (StatusCode, Json<Value>) {
    state.hit();
    if state.unhealthy.load(Ordering::Relaxed) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unhealthy", "service": "api-gateway"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"status": "healthy", "service": "api-gateway"})),
    )
}

async fn handle_process(State(state): State<TestServerState>) -> (StatusCode, Json<Value>) {
    state.hit();
    let seq = state.process_total.fetch_add(1, Ordering::Relaxed) + 1;

    let delay = state.process_delay_ms.load(Ordering::Relaxed);
    if delay > 0 {
        sleep(Duration::from_millis(delay)).await;
    }

    let every = state.overload_every.load(Ordering::Relaxed);
    if every > 0 && seq % every == 0 {
        state.process_failed.fetch_add(1, Ordering::Relaxed);
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"detail": "Failed to connect to Service A: overloaded"})),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "status": "success",
            "message": "Request processed through gateway",
            "data": {
                "service": "service-a",
                "trace_id": format!("{seq:032x}"),
                "sequence": seq,
            },
        })),
    )
}

async fn handle_info(State(state): State<TestServerState>) -> Json<Value> {
    state.hit();
    Json(json!({
        "service": "api-gateway",
        "version": "1.0.0",
        "backends": {"service_a": "in-process"},
    }))
}

async fn handle_stats(State(state): State<TestServerState>) -> Json<Value> {
    state.hit();
    Json(json!({
        "service": "service-a",
        "stats": {
            "total_requests": state.requests_total(),
            "processed": state.process_total(),
            "failed": state.process_failed(),
        },
    }))
}

async fn handle_slow(
    State(state): State<TestServerState>,
    Query(query): Query<HashMap<String, String>>,
) -> &'static str {
    state.hit();
    let ms = query
        .get("ms")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(50);
    sleep(Duration::from_millis(ms)).await;
    "slow"
}

async fn handle_status(State(state): State<TestServerState>, Path(code): Path<u16>) -> StatusCode {
    state.hit();
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

pub fn router(state: TestServerState) -> Router {
    Router::new()
        .route(PATH_HEALTH, get(handle_health))
        .route(PATH_PROCESS, get(handle_process).post(handle_process))
        .route(PATH_INFO, get(handle_info))
        .route(PATH_STATS, get(handle_stats))
        .route(PATH_SLOW, get(handle_slow))
        .route(PATH_STATUS, get(handle_status))
        .with_state(state)
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    state: TestServerState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = TestServerState::default();
        let app = router(state.clone());

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
            state,
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

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn state(&self) -> &TestServerState {
        &self.state
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
