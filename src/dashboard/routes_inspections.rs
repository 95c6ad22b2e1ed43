//! Checklist submission handler.
//!
//! `POST /api/scopes/{scope}/inspections` takes an [`InspectionDraft`] and
//! appends one row per selected equipment. The status code reflects the
//! summary: 200 when nothing failed, 207 for a partial submission, 502 when
//! every append failed, 422 for an invalid draft.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use super::routes_status::parse_scope;
use super::AppState;
use crate::inspection::{InspectionType, SiteScope};
use crate::submission::{EquipmentOutcome, InspectionDraft, SubmissionReport, SubmissionSummary, Submitter};

#[derive(Serialize)]
struct EquipmentResultBody {
    equipment: String,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct SubmissionBody {
    scope: SiteScope,
    #[serde(rename = "type")]
    kind: InspectionType,
    submitted_at: chrono::DateTime<chrono::Utc>,
    summary: SubmissionSummary,
    appended: usize,
    failed: usize,
    skipped: usize,
    results: Vec<EquipmentResultBody>,
}

impl From<&SubmissionReport> for SubmissionBody {
    fn from(report: &SubmissionReport) -> Self {
        SubmissionBody {
            scope: report.scope.clone(),
            kind: report.kind,
            submitted_at: report.submitted_at,
            summary: report.summary(),
            appended: report.count("appended"),
            failed: report.count("failed"),
            skipped: report.count("skipped_duplicate"),
            results: report
                .results
                .iter()
                .map(|r| EquipmentResultBody {
                    equipment: r.equipment.clone(),
                    outcome: r.outcome.as_str(),
                    error: match &r.outcome {
                        EquipmentOutcome::Failed(e) => Some(e.to_string()),
                        _ => None,
                    },
                })
                .collect(),
        }
    }
}

pub(super) async fn handler_api_submit(
    State(state): State<Arc<AppState>>,
    Path(scope): Path<String>,
    Json(draft): Json<InspectionDraft>,
) -> Response {
    let scope = match parse_scope(&scope) {
        Ok(scope) => scope,
        Err(resp) => return resp,
    };

    let submitter = Submitter::new(state.connector.clone(), state.history.clone(), state.zone)
        .with_metrics(state.prom_metrics.clone())
        .with_gate(state.submit_gate.clone());
    let report = match submitter.submit(&draft, &scope, (state.clock)()).await {
        Ok(report) => report,
        Err(e) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response();
        }
    };

    let status = match report.summary() {
        SubmissionSummary::AllSucceeded => StatusCode::OK,
        SubmissionSummary::Partial => StatusCode::MULTI_STATUS,
        SubmissionSummary::AllFailed => StatusCode::BAD_GATEWAY,
    };
    (status, Json(SubmissionBody::from(&report))).into_response()
}
