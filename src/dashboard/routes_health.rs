//! # Health & Observability Endpoints
//!
//! | Endpoint | Purpose |
//! |----------|---------|
//! | `GET /healthz` | Liveness: the process is serving HTTP |
//! | `GET /readyz` | Readiness: the row-store answers a connection test |
//! | `GET /metrics` | Prometheus scraping endpoint |
//!
//! The readiness probe runs a connection test with a 2-second budget. An
//! unconfigured row-store is reported as not ready.

use super::AppState;
use crate::connector::ConnectorError;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use std::sync::Arc;
use std::time::Duration;

const READINESS_BUDGET: Duration = Duration::from_secs(2);

pub(super) async fn handler_healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub(super) async fn handler_readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let check = tokio::time::timeout(READINESS_BUDGET, state.connector.test_connection()).await;
    state.prom_metrics.record_state(state.connector.state());

    match check {
        Ok(Ok(_)) => (StatusCode::OK, "ok".to_string()),
        Ok(Err(ConnectorError::Unavailable)) => {
            (StatusCode::SERVICE_UNAVAILABLE, "row-store not configured".to_string())
        }
        Ok(Err(e)) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "row-store timeout".to_string()),
    }
}

pub(super) async fn handler_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.prom_metrics.record_state(state.connector.state());
    let body = state.prom_metrics.encode();
    (
        StatusCode::OK,
        [(
            "content-type",
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        body,
    )
}
