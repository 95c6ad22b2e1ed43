//! # Mock Sheets API — Simulated Spreadsheet REST API for Tests
//!
//! In-process stand-in for the v4 spreadsheet values API and the OAuth token
//! endpoint, enough for the `sheets-api` transport:
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | GET | `/v4/spreadsheets/{id}` | spreadsheet metadata (connection test) |
//! | GET | `/v4/spreadsheets/{id}/values/{range}` | read rows of a tab |
//! | POST | `/v4/spreadsheets/{id}/values/{range}:append` | append rows to a tab |
//! | POST | `/token` | exchange a signed assertion for a bearer token |
//!
//! Requests must carry either `key=<api key>` or `Authorization: Bearer
//! <token>`; anything else gets a structured 403 error body.

#![allow(dead_code)]

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub const SPREADSHEET_ID: &str = "sheet-123";
pub const API_KEY: &str = "test-api-key";
pub const ACCESS_TOKEN: &str = "ya29.mock-token";

#[derive(Debug, Default)]
struct MockState {
    /// Rows per tab name (the part of the range before `!`).
    tabs: HashMap<String, Vec<Vec<serde_json::Value>>>,
    /// Assertions received at the token endpoint.
    assertions: Vec<String>,
    /// Query strings of the append requests, in order.
    append_queries: Vec<HashMap<String, String>>,
    /// A1 ranges of every values request, as received.
    ranges: Vec<String>,
}

type SharedState = Arc<Mutex<MockState>>;

pub struct MockSheetsApi {
    addr: SocketAddr,
    state: SharedState,
}

impl MockSheetsApi {
    pub async fn start() -> Self {
        let state: SharedState = Arc::new(Mutex::new(MockState::default()));
        let app = Router::new()
            .route("/v4/spreadsheets/{id}", get(handle_metadata))
            .route(
                "/v4/spreadsheets/{id}/values/{range}",
                get(handle_values_get).post(handle_values_append),
            )
            .route("/token", post(handle_token))
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        MockSheetsApi { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn token_url(&self) -> String {
        format!("http://{}/token", self.addr)
    }

    pub fn seed_rows(&self, tab: &str, rows: Vec<Vec<serde_json::Value>>) {
        self.state
            .lock()
            .unwrap()
            .tabs
            .entry(tab.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn rows(&self, tab: &str) -> Vec<Vec<serde_json::Value>> {
        self.state
            .lock()
            .unwrap()
            .tabs
            .get(tab)
            .cloned()
            .unwrap_or_default()
    }

    pub fn assertions(&self) -> Vec<String> {
        self.state.lock().unwrap().assertions.clone()
    }

    pub fn append_queries(&self) -> Vec<HashMap<String, String>> {
        self.state.lock().unwrap().append_queries.clone()
    }

    pub fn ranges(&self) -> Vec<String> {
        self.state.lock().unwrap().ranges.clone()
    }
}

fn google_error(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(serde_json::json!({
            "error": {"code": status.as_u16(), "message": message, "status": "ERROR"}
        })),
    )
        .into_response()
}

fn authorized(headers: &HeaderMap, query: &HashMap<String, String>) -> bool {
    if query.get("key").map(String::as_str) == Some(API_KEY) {
        return true;
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {ACCESS_TOKEN}"))
        .unwrap_or(false)
}

fn check_target(
    id: &str,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> Result<(), axum::response::Response> {
    if !authorized(headers, query) {
        return Err(google_error(
            StatusCode::FORBIDDEN,
            "The caller does not have permission",
        ));
    }
    if id != SPREADSHEET_ID {
        return Err(google_error(
            StatusCode::NOT_FOUND,
            "Requested entity was not found.",
        ));
    }
    Ok(())
}

/// Tab name of an A1 range; quoted names (`'1-A'!A:G`) are unquoted.
fn tab_of(range: &str) -> String {
    let sheet = range.rsplit_once('!').map(|(sheet, _)| sheet).unwrap_or(range);
    match sheet.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(quoted) => quoted.replace("''", "'"),
        None => sheet.to_string(),
    }
}

async fn handle_metadata(
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> axum::response::Response {
    if let Err(resp) = check_target(&id, &headers, &query) {
        return resp;
    }
    Json(serde_json::json!({"properties": {"title": "Inspection Log"}})).into_response()
}

async fn handle_values_get(
    State(state): State<SharedState>,
    Path((id, range)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> axum::response::Response {
    if let Err(resp) = check_target(&id, &headers, &query) {
        return resp;
    }
    let tab = tab_of(&range);
    let rows = {
        let mut s = state.lock().unwrap();
        s.ranges.push(range.clone());
        s.tabs.get(&tab).cloned()
    };
    match rows {
        Some(rows) => Json(serde_json::json!({"range": range, "values": rows})).into_response(),
        None => Json(serde_json::json!({"range": range})).into_response(),
    }
}

async fn handle_values_append(
    State(state): State<SharedState>,
    Path((id, range)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> axum::response::Response {
    if let Err(resp) = check_target(&id, &headers, &query) {
        return resp;
    }
    let Some(range) = range.strip_suffix(":append") else {
        return google_error(StatusCode::BAD_REQUEST, "unsupported operation");
    };
    let rows: Vec<Vec<serde_json::Value>> =
        serde_json::from_value(body["values"].clone()).unwrap_or_default();
    let tab = tab_of(range);

    let mut s = state.lock().unwrap();
    s.ranges.push(range.to_string());
    s.append_queries.push(query);
    let existing = s.tabs.entry(tab.clone()).or_default();
    let first = existing.len() + 1;
    existing.extend(rows.iter().cloned());
    let last = existing.len();
    Json(serde_json::json!({
        "spreadsheetId": id,
        "updates": {
            "updatedRange": format!("'{}'!A{first}:G{last}", tab.replace('\'', "''")),
            "updatedRows": rows.len(),
        }
    }))
    .into_response()
}

async fn handle_token(
    State(state): State<SharedState>,
    Form(form): Form<HashMap<String, String>>,
) -> axum::response::Response {
    let grant = form.get("grant_type").cloned().unwrap_or_default();
    let Some(assertion) = form.get("assertion").cloned() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "invalid_request"})),
        )
            .into_response();
    };
    if grant != "urn:ietf:params:oauth:grant-type:jwt-bearer" {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "unsupported_grant_type"})),
        )
            .into_response();
    }
    state.lock().unwrap().assertions.push(assertion);
    Json(serde_json::json!({
        "access_token": ACCESS_TOKEN,
        "expires_in": 3600,
        "token_type": "Bearer"
    }))
    .into_response()
}
