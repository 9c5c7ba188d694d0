use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{Notify, oneshot};
use tokio::time::{Duration, Instant};

pub const PATH_SERIES: &str = "/api/v1/series";
pub const PATH_INSTANCE_ID: &str = "/latest/meta-data/instance-id";

/// One accepted series payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceivedSeries {
    pub api_key: String,
    pub application_key: Option<String>,
    pub body: serde_json::Value,
}

impl ReceivedSeries {
    /// The `series` array of the payload.
    pub fn series(&self) -> &[serde_json::Value] {
        self.body["series"].as_array().map_or(&[], Vec::as_slice)
    }

    pub fn metric_names(&self) -> Vec<&str> {
        self.series()
            .iter()
            .filter_map(|p| p["metric"].as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntakeOptions {
    /// When set, series posted with any other key are refused with 403.
    pub api_key: Option<String>,
    /// Served from the instance metadata path; 404 when unset.
    pub instance_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IntakeStats {
    requests_total: Arc<AtomicU64>,
    rejected_total: Arc<AtomicU64>,
    saw_json_content_type: Arc<AtomicU64>,
}

impl IntakeStats {
    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn rejected_total(&self) -> u64 {
        self.rejected_total.load(Ordering::Relaxed)
    }

    pub fn saw_json_content_type(&self) -> u64 {
        self.saw_json_content_type.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct IntakeState {
    options: Arc<IntakeOptions>,
    stats: IntakeStats,
    status: Arc<AtomicU16>,
    received: Arc<Mutex<Vec<ReceivedSeries>>>,
    notify: Arc<Notify>,
}

impl IntakeState {
    pub fn new(options: IntakeOptions) -> Self {
        Self {
            options: Arc::new(options),
            stats: IntakeStats::default(),
            status: Arc::new(AtomicU16::new(StatusCode::ACCEPTED.as_u16())),
            received: Arc::default(),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn stats(&self) -> &IntakeStats {
        &self.stats
    }

    pub fn received(&self) -> Vec<ReceivedSeries> {
        self.received.lock().clone()
    }

    /// Status returned for valid series posts from now on. Non-2xx statuses
    /// do not record the payload.
    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
pub struct IntakeUrls {
    pub base_url: String,
    pub series: String,
    pub instance_id: String,
}

impl IntakeUrls {
    pub fn new(base_url: String) -> Self {
        Self {
            series: format!("{base_url}{PATH_SERIES}"),
            instance_id: format!("{base_url}{PATH_INSTANCE_ID}"),
            base_url,
        }
    }
}

async fn handle_series(
    State(state): State<IntakeState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    state.stats.requests_total.fetch_add(1, Ordering::Relaxed);

    if headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().starts_with("application/json"))
    {
        state
            .stats
            .saw_json_content_type
            .fetch_add(1, Ordering::Relaxed);
    }

    let Some(api_key) = query.get("api_key").filter(|k| !k.is_empty()) else {
        state.stats.rejected_total.fetch_add(1, Ordering::Relaxed);
        return (StatusCode::FORBIDDEN, r#"{"errors":["api key required"]}"#);
    };
    if state
        .options
        .api_key
        .as_deref()
        .is_some_and(|expected| expected != api_key)
    {
        state.stats.rejected_total.fetch_add(1, Ordering::Relaxed);
        return (StatusCode::FORBIDDEN, r#"{"errors":["invalid api key"]}"#);
    }

    let body: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => {
            state.stats.rejected_total.fetch_add(1, Ordering::Relaxed);
            return (StatusCode::BAD_REQUEST, r#"{"errors":["bad json"]}"#);
        }
    };
    if !body["series"].is_array() {
        state.stats.rejected_total.fetch_add(1, Ordering::Relaxed);
        return (StatusCode::BAD_REQUEST, r#"{"errors":["missing series"]}"#);
    }

    let status = StatusCode::from_u16(state.status.load(Ordering::Relaxed))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if !status.is_success() {
        state.stats.rejected_total.fetch_add(1, Ordering::Relaxed);
        return (status, r#"{"errors":["unavailable"]}"#);
    }

    state.received.lock().push(ReceivedSeries {
        api_key: api_key.clone(),
        application_key: query.get("application_key").cloned(),
        body,
    });
    state.notify.notify_waiters();

    (status, r#"{"status":"ok"}"#)
}

async fn handle_instance_id(State(state): State<IntakeState>) -> (StatusCode, String) {
    match &state.options.instance_id {
        Some(id) => (StatusCode::OK, id.clone()),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}

pub fn router(state: IntakeState) -> Router {
    Router::new()
        .route(PATH_SERIES, post(handle_series))
        .route(PATH_INSTANCE_ID, get(handle_instance_id))
        .with_state(state)
}

/// In-process fake of the series intake, bound to an ephemeral local port.
pub struct TestServer {
    addr: SocketAddr,
    urls: IntakeUrls,
    state: IntakeState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(IntakeOptions::default()).await
    }

    pub async fn start_with(options: IntakeOptions) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = IntakeState::new(options);
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
            urls: IntakeUrls::new(format!("http://{addr}")),
            state,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.urls.base_url
    }

    pub fn urls(&self) -> &IntakeUrls {
        &self.urls
    }

    pub fn state(&self) -> &IntakeState {
        &self.state
    }

    pub fn stats(&self) -> &IntakeStats {
        self.state.stats()
    }

    pub fn received(&self) -> Vec<ReceivedSeries> {
        self.state.received()
    }

    pub fn set_status(&self, status: u16) {
        self.state.set_status(status);
    }

    /// Waits until at least `n` payloads were accepted. Returns whatever was
    /// received when `timeout` runs out.
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> Vec<ReceivedSeries> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.state.notify.notified();
            let received = self.received();
            if received.len() >= n {
                return received;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.received();
            }
        }
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
