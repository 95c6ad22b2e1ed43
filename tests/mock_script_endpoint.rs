//! # Mock Script Endpoint — Simulated Spreadsheet Script for Tests
//!
//! A lightweight, in-process HTTP server that mimics the spreadsheet-bound
//! script web app the `script` transport talks to. Every request is a GET on
//! `/exec` whose `action` query parameter selects the operation; the reply is
//! the `{success, data, error}` envelope, wrapped in `callback(...)` when the
//! request carries a `callback` parameter.
//!
//! ## Supported Actions
//!
//! | Action | Reply |
//! |--------|-------|
//! | `testConnection` | success with a message |
//! | `addInspectionData` | records the row, success |
//! | `getEquipment` | configured entries for the requested `type` |
//! | `addEquipment`, `deleteEquipment` | success |
//! | `addInspectionItem`, `deleteInspectionItem` | success |
//!
//! ## Architecture
//!
//! ```text
//! MockScriptEndpoint::builder()...start()
//!   └─ TcpListener::bind("127.0.0.1:0")   (random port)
//!   └─ axum::serve(listener, router)       (background tokio task)
//!   └─ Arc<Mutex<MockState>>               (configured replies + request log)
//! ```

#![allow(dead_code)]

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

// ── Configuration ───────────────────────────────────────────────────

/// What the mock answers, regardless of action.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Normal per-action replies.
    Normal,
    /// `{"success": false, "error": <message>}`.
    Reject(String),
    /// Bare HTTP error status with a non-JSON body.
    HttpError(u16),
    /// Callback-wrapped in an identity other than the one requested.
    ForeignCallback,
    /// A body that is not an envelope at all.
    Garbage,
}

/// One request as received by the mock.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub action: String,
    pub params: HashMap<String, String>,
}

#[derive(Debug)]
struct MockState {
    /// Entries returned by `getEquipment`, keyed by the `type` parameter.
    equipment: HashMap<String, Vec<serde_json::Value>>,
    behavior: MockBehavior,
    delay: Option<Duration>,
    requests: Vec<RecordedRequest>,
}

type SharedState = Arc<Mutex<MockState>>;

pub struct MockScriptEndpointBuilder {
    state: MockState,
}

impl MockScriptEndpointBuilder {
    /// `getEquipment` entries for a type label.
    pub fn with_equipment(mut self, type_label: &str, entries: Vec<serde_json::Value>) -> Self {
        self.state.equipment.insert(type_label.to_string(), entries);
        self
    }

    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        self.state.behavior = behavior;
        self
    }

    /// Hold every reply for `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.state.delay = Some(delay);
        self
    }

    pub async fn start(self) -> MockScriptEndpoint {
        let state = Arc::new(Mutex::new(self.state));
        let app = Router::new()
            .route("/exec", get(handle_exec))
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        MockScriptEndpoint { addr, state }
    }
}

pub struct MockScriptEndpoint {
    addr: SocketAddr,
    state: SharedState,
}

impl MockScriptEndpoint {
    pub fn builder() -> MockScriptEndpointBuilder {
        MockScriptEndpointBuilder {
            state: MockState {
                equipment: HashMap::new(),
                behavior: MockBehavior::Normal,
                delay: None,
                requests: Vec::new(),
            },
        }
    }

    pub async fn start() -> Self {
        Self::builder().start().await
    }

    pub fn url(&self) -> url::Url {
        url::Url::parse(&format!("http://{}/exec", self.addr)).unwrap()
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        self.state.lock().unwrap().behavior = behavior;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Requests with the given action, in arrival order.
    pub fn requests_for(&self, action: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.action == action)
            .collect()
    }
}

// ── Handler ─────────────────────────────────────────────────────────

async fn handle_exec(
    State(state): State<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    let action = params.get("action").cloned().unwrap_or_default();
    let (behavior, delay, envelope) = {
        let mut s = state.lock().unwrap();
        s.requests.push(RecordedRequest {
            action: action.clone(),
            params: params.clone(),
        });
        let envelope = match action.as_str() {
            "testConnection" => serde_json::json!({"success": true, "message": "Connected to mock sheet"}),
            "addInspectionData" => serde_json::json!({"success": true, "message": "Data added"}),
            "getEquipment" => {
                let kind = params.get("type").cloned().unwrap_or_default();
                let entries = s.equipment.get(&kind).cloned().unwrap_or_default();
                serde_json::json!({"success": true, "data": entries})
            }
            "addEquipment" | "deleteEquipment" | "addInspectionItem" | "deleteInspectionItem" => {
                serde_json::json!({"success": true})
            }
            _ => serde_json::json!({"success": false, "error": "Unknown action"}),
        };
        (s.behavior.clone(), s.delay, envelope)
    };

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let body = match behavior {
        MockBehavior::Normal => envelope.to_string(),
        MockBehavior::Reject(message) => {
            serde_json::json!({"success": false, "error": message}).to_string()
        }
        MockBehavior::HttpError(code) => {
            let status = axum::http::StatusCode::from_u16(code).unwrap();
            return (status, "script error").into_response();
        }
        MockBehavior::Garbage => "<html>not json</html>".to_string(),
        MockBehavior::ForeignCallback => {
            return format!("cb_someone_else({});", envelope).into_response();
        }
    };

    match params.get("callback") {
        Some(id) => format!("{}({});", id, body).into_response(),
        None => body.into_response(),
    }
}
