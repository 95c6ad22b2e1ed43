//! # Submission — Checklist to Rows
//!
//! Turns one filled-in checklist ([`InspectionDraft`]) into one row per
//! selected equipment. Rows are appended one at a time, in selection order,
//! and each equipment gets its own outcome:
//!
//! | Outcome | Meaning | Local history |
//! |---------|---------|---------------|
//! | `appended` | the row-store accepted the row | updated |
//! | `failed` | the append failed; nothing is retried | unchanged |
//! | `skipped_duplicate` | already submitted today for this scope and type | unchanged |
//!
//! A submission where some rows landed and others did not is reported as
//! [`SubmissionSummary::Partial`]. Appends are not idempotent, so a failed
//! equipment is re-submitted by the caller, not here.
//!
//! Submitters sharing a [`SubmitGate`] run one submission at a time, so the
//! same-day check of a later submission sees the rows an earlier, concurrent
//! one appended.

use crate::alarm::ReferenceZone;
use crate::connector::{ConnectorError, RowConnector};
use crate::history::History;
use crate::inspection::{CheckResult, InspectionRecord, InspectionType, RecordError, SiteScope};
use crate::lock_or_recover;
use crate::prom_metrics::{Metrics, SubmissionLabel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DraftError {
    #[error("no inspection type selected")]
    NoType,
    #[error("no equipment selected")]
    NoEquipment,
    #[error("no checklist items completed")]
    NoChecks,
    #[error("check item {0:?} appears more than once")]
    DuplicateItem(String),
    #[error("equipment {0:?} is selected more than once")]
    DuplicateEquipment(String),
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// A checklist as filled in by the inspector, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionDraft {
    #[serde(rename = "type", default)]
    pub kind: Option<InspectionType>,
    #[serde(default)]
    pub equipment: Vec<String>,
    #[serde(default)]
    pub checks: Vec<CheckResult>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub inspector: String,
    /// Submit even when today's inspection is already in local history.
    #[serde(default)]
    pub allow_duplicates: bool,
}

impl InspectionDraft {
    pub fn validate(&self) -> Result<InspectionType, DraftError> {
        let kind = self.kind.ok_or(DraftError::NoType)?;
        if self.equipment.is_empty() {
            return Err(DraftError::NoEquipment);
        }
        if self.checks.is_empty() {
            return Err(DraftError::NoChecks);
        }

        let mut items = HashSet::new();
        for check in &self.checks {
            if !items.insert(check.item.trim()) {
                return Err(DraftError::DuplicateItem(check.item.clone()));
            }
        }

        let mut equipment = HashSet::new();
        for name in &self.equipment {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                return Err(RecordError::EmptyEquipment.into());
            }
            if !equipment.insert(trimmed) {
                return Err(DraftError::DuplicateEquipment(trimmed.to_string()));
            }
        }
        Ok(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EquipmentOutcome {
    Appended,
    Failed(ConnectorError),
    SkippedDuplicate,
}

impl EquipmentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentOutcome::Appended => "appended",
            EquipmentOutcome::Failed(_) => "failed",
            EquipmentOutcome::SkippedDuplicate => "skipped_duplicate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquipmentResult {
    pub equipment: String,
    pub outcome: EquipmentOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionSummary {
    AllSucceeded,
    Partial,
    AllFailed,
}

#[derive(Debug, Clone)]
pub struct SubmissionReport {
    pub kind: InspectionType,
    pub scope: SiteScope,
    pub submitted_at: DateTime<Utc>,
    pub results: Vec<EquipmentResult>,
}

impl SubmissionReport {
    pub fn count(&self, outcome: &str) -> usize {
        self.results.iter().filter(|r| r.outcome.as_str() == outcome).count()
    }

    /// No failures is success even when everything was skipped; failures
    /// with at least one appended row are partial.
    pub fn summary(&self) -> SubmissionSummary {
        let failed = self.count("failed");
        let appended = self.count("appended");
        match (failed, appended) {
            (0, _) => SubmissionSummary::AllSucceeded,
            (_, 0) => SubmissionSummary::AllFailed,
            _ => SubmissionSummary::Partial,
        }
    }
}

/// Serializes submissions that share it.
pub type SubmitGate = Arc<tokio::sync::Mutex<()>>;

pub struct Submitter {
    connector: Arc<dyn RowConnector>,
    history: Arc<Mutex<History>>,
    zone: ReferenceZone,
    metrics: Option<Arc<Metrics>>,
    gate: SubmitGate,
}

impl Submitter {
    pub fn new(connector: Arc<dyn RowConnector>, history: Arc<Mutex<History>>, zone: ReferenceZone) -> Self {
        Submitter {
            connector,
            history,
            zone,
            metrics: None,
            gate: SubmitGate::default(),
        }
    }

    /// Share `gate` with other submitters writing to the same history.
    pub fn with_gate(mut self, gate: SubmitGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Append one row per selected equipment, sequentially.
    ///
    /// Fails only when the draft itself is invalid; append failures are
    /// reported per equipment in the returned report.
    pub async fn submit(
        &self,
        draft: &InspectionDraft,
        scope: &SiteScope,
        now: DateTime<Utc>,
    ) -> Result<SubmissionReport, DraftError> {
        let kind = draft.validate()?;
        let today = self.zone.today(now);

        let mut records = Vec::with_capacity(draft.equipment.len());
        for name in &draft.equipment {
            let record = InspectionRecord::new(kind, name.trim(), draft.checks.clone(), draft.notes.clone(), now)?
                .with_location(draft.location.clone())
                .with_inspector(draft.inspector.clone());
            records.push(record);
        }

        // Held until history is saved: check, append and record form one step.
        let _serial = self.gate.lock().await;
        let mut results = Vec::with_capacity(records.len());
        for record in &records {
            let equipment = record.equipment().to_string();
            let already_today = !draft.allow_duplicates
                && lock_or_recover(&self.history).last_inspection_date(kind, scope, &equipment, self.zone)
                    == Some(today);
            if already_today {
                info!(scope = %scope, kind = %kind, equipment = %equipment, "already inspected today, skipping");
                results.push(EquipmentResult {
                    equipment,
                    outcome: EquipmentOutcome::SkippedDuplicate,
                });
                continue;
            }

            let outcome = match self.connector.append_inspection_row(record, scope).await {
                Ok(_) => {
                    lock_or_recover(&self.history).record(kind, scope, &equipment, now);
                    EquipmentOutcome::Appended
                }
                Err(e) => {
                    warn!(scope = %scope, kind = %kind, equipment = %equipment, error = %e, "append failed");
                    EquipmentOutcome::Failed(e)
                }
            };
            results.push(EquipmentResult { equipment, outcome });
        }

        let report = SubmissionReport {
            kind,
            scope: scope.clone(),
            submitted_at: now,
            results,
        };

        if report.count("appended") > 0 {
            if let Err(e) = lock_or_recover(&self.history).save() {
                warn!(error = %e, "failed to save local history");
            }
        }
        self.record_metrics(&report);
        info!(
            scope = %scope,
            kind = %kind,
            appended = report.count("appended"),
            failed = report.count("failed"),
            skipped = report.count("skipped_duplicate"),
            summary = ?report.summary(),
            "submission finished"
        );
        Ok(report)
    }

    fn record_metrics(&self, report: &SubmissionReport) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        for result in &report.results {
            metrics
                .inspections_submitted
                .get_or_create(&SubmissionLabel {
                    scope: report.scope.to_string(),
                    kind: report.kind.to_string(),
                    outcome: result.outcome.as_str().to_string(),
                })
                .inc();
        }
    }
}
