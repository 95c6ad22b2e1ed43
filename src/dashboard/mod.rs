//! # Dashboard — Inspection Status Web Service
//!
//! Runs an Axum HTTP server that serves the browser front-end (optional
//! static directory), exposes the completion dashboard and equipment boards
//! as JSON, and accepts checklist submissions.
//!
//! ## Routes
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET | `/healthz`, `/readyz`, `/metrics` | [`routes_health`] |
//! | GET | `/api/connection` | row-store connector name and state |
//! | GET | `/api/teams` | catalog teams |
//! | GET | `/api/items?type=` | checklist items for a type |
//! | GET | `/api/overview` | completion tiles for every team |
//! | GET | `/api/scopes/{scope}/overview` | completion tiles for one scope |
//! | GET | `/api/scopes/{scope}/equipment?type=` | per-equipment status board |
//! | POST | `/api/scopes/{scope}/inspections` | submit a checklist |

mod routes_health;
mod routes_inspections;
mod routes_status;

use crate::alarm::ReferenceZone;
use crate::catalog::Catalog;
use crate::completion::{BoardContext, RetryPolicy};
use crate::connector::RowConnector;
use crate::history::History;
use crate::prom_metrics;
use crate::submission::SubmitGate;
use anyhow::Result;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Instrument};

pub struct AppState {
    pub connector: Arc<dyn RowConnector>,
    pub catalog: Catalog,
    pub history: Arc<Mutex<History>>,
    pub zone: ReferenceZone,
    pub retry: RetryPolicy,
    pub prom_metrics: Arc<prom_metrics::Metrics>,
    /// Source of "now"; fixed in tests.
    pub clock: fn() -> DateTime<Utc>,
    pub submit_gate: SubmitGate,
}

impl AppState {
    pub fn new(
        connector: Arc<dyn RowConnector>,
        catalog: Catalog,
        history: History,
        zone: ReferenceZone,
        prom_metrics: Arc<prom_metrics::Metrics>,
    ) -> Self {
        AppState {
            connector,
            catalog,
            history: Arc::new(Mutex::new(history)),
            zone,
            retry: RetryPolicy::default(),
            prom_metrics,
            clock: Utc::now,
            submit_gate: SubmitGate::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub(super) fn board(&self) -> BoardContext<'_> {
        BoardContext {
            connector: self.connector.as_ref(),
            catalog: &self.catalog,
            zone: self.zone,
            today: self.zone.today((self.clock)()),
            retry: self.retry,
            metrics: Some(self.prom_metrics.as_ref()),
        }
    }
}

/// Records request latency, propagates or assigns `x-request-id`, and runs
/// the request inside a tracing span carrying that id.
async fn metrics_middleware(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> axum::response::Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = req.method().to_string();
    let raw_path = req.uri().path().to_string();
    let norm_path = normalize_path(&raw_path);
    let start = std::time::Instant::now();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %raw_path,
    );
    let mut response = next.run(req).instrument(span).await;

    state
        .prom_metrics
        .http_request_duration
        .get_or_create(&prom_metrics::HttpLabel {
            method,
            path: norm_path,
        })
        .observe(start.elapsed().as_secs_f64());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Collapse the scope segment so histogram labels stay bounded.
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = path.split('/').collect();
    for i in 1..segments.len() {
        if segments[i - 1] == "scopes" && !segments[i].is_empty() {
            segments[i] = ":scope";
        }
    }
    segments.join("/")
}

pub fn build_router(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/healthz", get(routes_health::handler_healthz))
        .route("/readyz", get(routes_health::handler_readyz))
        .route("/metrics", get(routes_health::handler_metrics))
        .route("/api/connection", get(routes_status::handler_api_connection))
        .route("/api/teams", get(routes_status::handler_api_teams))
        .route("/api/items", get(routes_status::handler_api_items))
        .route("/api/overview", get(routes_status::handler_api_overview))
        .route(
            "/api/scopes/{scope}/overview",
            get(routes_status::handler_api_scope_overview),
        )
        .route(
            "/api/scopes/{scope}/equipment",
            get(routes_status::handler_api_equipment),
        )
        .route(
            "/api/scopes/{scope}/inspections",
            post(routes_inspections::handler_api_submit),
        );

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .layer(CatchPanicLayer::new())
    .layer(axum::middleware::from_fn_with_state(
        state.clone(),
        metrics_middleware,
    ))
    .layer(TraceLayer::new_for_http())
    .layer(RequestBodyLimitLayer::new(256 * 1024))
    .layer(TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(60),
    ))
    .with_state(state)
}

pub async fn run(state: Arc<AppState>, port: u16, static_dir: Option<&Path>) -> Result<()> {
    let app = build_router(state.clone(), static_dir);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(
        port,
        connector = state.connector.name(),
        teams = state.catalog.teams().len(),
        "dashboard running"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("dashboard shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                }
            }
            Err(_) => {
                ctrl_c.await.ok();
                info!("received SIGINT, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT, shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_preserves_fixed_routes() {
        assert_eq!(normalize_path("/api/overview"), "/api/overview");
        assert_eq!(normalize_path("/metrics"), "/metrics");
    }

    #[test]
    fn normalize_path_collapses_scope_segment() {
        assert_eq!(normalize_path("/api/scopes/1-B/equipment"), "/api/scopes/:scope/equipment");
        assert_eq!(normalize_path("/api/scopes/1-A/inspections"), "/api/scopes/:scope/inspections");
    }

    #[test]
    fn normalize_path_handles_empty_and_root() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "");
        assert_eq!(normalize_path("/api/scopes/"), "/api/scopes/");
    }
}
