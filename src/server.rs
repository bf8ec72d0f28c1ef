use anyhow::{Context, Result};
use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, Json,
    },
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::trace::TraceLayer;

use crate::html_template::HTML_CONTENT;
use crate::job::{JobManager, JobProgress};

const PUSH_INTERVAL: Duration = Duration::from_secs(1);

struct AppState {
    manager: Arc<JobManager>,
}

pub fn router(manager: Arc<JobManager>) -> Router {
    let state = Arc::new(AppState { manager });

    Router::new()
        .route("/", get(serve_index))
        .route("/api/status", get(get_status))
        .route("/api/events", get(stream_events))
        .route("/api/pause", post(pause))
        .route("/api/resume", post(resume))
        .route("/api/stop", post(stop))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(manager: Arc<JobManager>, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard on {}", addr))?;
    tracing::info!("Web dashboard available at http://{}", addr);

    axum::serve(listener, router(manager))
        .await
        .context("Dashboard server failed")?;
    Ok(())
}

async fn serve_index() -> Html<&'static str> {
    Html(HTML_CONTENT)
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<JobProgress> {
    Json(state.manager.get_progress())
}

async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = IntervalStream::new(tokio::time::interval(PUSH_INTERVAL))
        .map(move |_| Event::default().json_data(state.manager.get_progress()));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn pause(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.manager.pause();
    tracing::info!("Paused from dashboard");
    Json(json!({"status": "paused"}))
}

async fn resume(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.manager.resume();
    tracing::info!("Resumed from dashboard");
    Json(json!({"status": "running"}))
}

async fn stop(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.manager.request_stop();
    tracing::info!("Stop requested from dashboard");
    Json(json!({"status": "stopping"}))
}
