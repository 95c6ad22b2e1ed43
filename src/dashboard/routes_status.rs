//! Catalog, completion dashboard and equipment board handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use super::AppState;
use crate::catalog::Team;
use crate::completion::{self, EquipmentStatus};
use crate::inspection::{InspectionType, SiteScope};
use crate::lock_or_recover;

pub(super) fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": message.into()})),
    )
        .into_response()
}

pub(super) fn parse_scope(raw: &str) -> Result<SiteScope, Response> {
    SiteScope::new(raw).map_err(|e| bad_request(e.to_string()))
}

#[derive(Deserialize)]
pub(super) struct TypeQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl TypeQuery {
    fn parse(&self) -> Result<InspectionType, Response> {
        match self.kind.as_deref() {
            None | Some("") => Err(bad_request("missing type parameter")),
            Some(raw) => raw
                .parse::<InspectionType>()
                .map_err(|e| bad_request(e.to_string())),
        }
    }
}

pub(super) async fn handler_api_connection(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "connector": state.connector.name(),
        "state": state.connector.state(),
    }))
}

#[derive(Serialize)]
pub(super) struct TeamsResponse<'a> {
    primary_scope: &'a SiteScope,
    teams: &'a [Team],
}

pub(super) async fn handler_api_teams(State(state): State<Arc<AppState>>) -> Response {
    Json(TeamsResponse {
        primary_scope: state.catalog.primary_scope(),
        teams: state.catalog.teams(),
    })
    .into_response()
}

pub(super) async fn handler_api_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TypeQuery>,
) -> Response {
    let kind = match query.parse() {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };
    Json(serde_json::json!({
        "type": kind,
        "cycle_days": kind.cycle_days(),
        "items": state.catalog.items_for(kind),
    }))
    .into_response()
}

pub(super) async fn handler_api_overview(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let board = state.board();
    let teams = completion::teams_overview(&board).await;
    Json(serde_json::json!({
        "date": board.today,
        "teams": teams,
    }))
}

pub(super) async fn handler_api_scope_overview(
    State(state): State<Arc<AppState>>,
    Path(scope): Path<String>,
) -> Response {
    let scope = match parse_scope(&scope) {
        Ok(scope) => scope,
        Err(resp) => return resp,
    };
    let board = state.board();
    let overview = completion::scope_overview(&board, &scope).await;
    Json(serde_json::json!({
        "date": board.today,
        "overview": overview,
    }))
    .into_response()
}

#[derive(Serialize)]
pub(super) struct EquipmentBoardResponse {
    scope: SiteScope,
    #[serde(rename = "type")]
    kind: InspectionType,
    date: chrono::NaiveDate,
    /// Set when the row-store could not be read and only local history was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    degraded: Option<String>,
    equipment: Vec<EquipmentStatus>,
}

pub(super) async fn handler_api_equipment(
    State(state): State<Arc<AppState>>,
    Path(scope): Path<String>,
    Query(query): Query<TypeQuery>,
) -> Response {
    let scope = match parse_scope(&scope) {
        Ok(scope) => scope,
        Err(resp) => return resp,
    };
    let kind = match query.parse() {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };

    let today = state.zone.today((state.clock)());
    let (snapshots, degraded) =
        match completion::fetch_with_retry(state.connector.as_ref(), kind, &scope, state.retry).await {
            Ok(snapshots) => (snapshots, None),
            Err(e) => {
                warn!(scope = %scope, kind = %kind, error = %e, "equipment board from local history only");
                (Vec::new(), Some(e.to_string()))
            }
        };

    let equipment = {
        let history = lock_or_recover(&state.history);
        completion::equipment_board(
            kind,
            &scope,
            state.catalog.equipment_for(&scope),
            &snapshots,
            &history,
            today,
            state.zone,
        )
    };

    Json(EquipmentBoardResponse {
        scope,
        kind,
        date: today,
        degraded,
        equipment,
    })
    .into_response()
}
