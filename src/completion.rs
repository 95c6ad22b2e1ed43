//! # Completion — Dashboard Tiles and Equipment Boards
//!
//! Turns row-store snapshots into the numbers the status dashboard shows.
//!
//! ## Completion Tiles
//!
//! An equipment counts as completed for a type when its last inspection
//! classifies as `normal`. The tile percentage is
//! `round(100 * completed / total)`:
//!
//! | Percentage | Tile status |
//! |------------|-------------|
//! | no equipment | `unknown` |
//! | < 50 | `alarm` |
//! | < 80 | `warning` |
//! | otherwise | `completed` |
//!
//! ## Degradation
//!
//! Reads are retried per [`RetryPolicy`]. A read that still fails turns its
//! tile `unknown` with a warning logged; the rest of the board is unaffected.

use crate::alarm::{classify, classify_raw, label_for, parse_inspection_date, AlarmStatus, ReferenceZone};
use crate::catalog::Catalog;
use crate::connector::{ConnectorError, EquipmentSnapshot, RowConnector};
use crate::history::History;
use crate::inspection::{InspectionType, SiteScope};
use crate::prom_metrics::{Metrics, TileLabel};
use chrono::NaiveDate;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TileStatus {
    Completed,
    Warning,
    Alarm,
    Unknown,
}

impl TileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TileStatus::Completed => "completed",
            TileStatus::Warning => "warning",
            TileStatus::Alarm => "alarm",
            TileStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRate {
    #[serde(rename = "type")]
    pub kind: InspectionType,
    pub completed: usize,
    pub total: usize,
    pub percentage: u32,
    pub status: TileStatus,
}

impl CompletionRate {
    fn unavailable(kind: InspectionType, total: usize) -> Self {
        CompletionRate {
            kind,
            completed: 0,
            total,
            percentage: 0,
            status: TileStatus::Unknown,
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn snapshot_index(snapshots: &[EquipmentSnapshot]) -> HashMap<String, &EquipmentSnapshot> {
    let mut index = HashMap::new();
    for snapshot in snapshots {
        index.entry(normalize(&snapshot.name)).or_insert(snapshot);
    }
    index
}

pub fn completion_rate(
    kind: InspectionType,
    equipment: &[String],
    snapshots: &[EquipmentSnapshot],
    today: NaiveDate,
    zone: ReferenceZone,
) -> CompletionRate {
    let total = equipment.len();
    if total == 0 {
        return CompletionRate::unavailable(kind, 0);
    }

    let index = snapshot_index(snapshots);
    let completed = equipment
        .iter()
        .filter(|name| {
            let raw = index
                .get(&normalize(name))
                .and_then(|s| s.last_inspection_date.as_deref());
            match classify_raw(kind, raw, today, zone) {
                Ok(status) => status == AlarmStatus::Normal,
                Err(e) => {
                    debug!(equipment = %name, error = %e, "unreadable inspection date");
                    false
                }
            }
        })
        .count();

    let percentage = (100.0 * completed as f64 / total as f64).round() as u32;
    let status = if percentage < 50 {
        TileStatus::Alarm
    } else if percentage < 80 {
        TileStatus::Warning
    } else {
        TileStatus::Completed
    };
    CompletionRate {
        kind,
        completed,
        total,
        percentage,
        status,
    }
}

/// Caller-side retry for dashboard reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 2,
            delay: Duration::from_secs(1),
        }
    }
}

/// Fetch with retries. Only timeouts and transport failures are retried.
pub async fn fetch_with_retry(
    connector: &dyn RowConnector,
    kind: InspectionType,
    scope: &SiteScope,
    policy: RetryPolicy,
) -> Result<Vec<EquipmentSnapshot>, ConnectorError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match connector.fetch_equipment_status(kind, scope).await {
            Ok(snapshots) => return Ok(snapshots),
            Err(e) if e.is_retryable() && attempt < attempts => {
                debug!(kind = %kind, scope = %scope, attempt, error = %e, "retrying equipment status");
                attempt += 1;
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Everything a completion board needs besides the scope.
pub struct BoardContext<'a> {
    pub connector: &'a dyn RowConnector,
    pub catalog: &'a Catalog,
    pub zone: ReferenceZone,
    pub today: NaiveDate,
    pub retry: RetryPolicy,
    pub metrics: Option<&'a Metrics>,
}

impl BoardContext<'_> {
    async fn tile(&self, kind: InspectionType, scope: &SiteScope) -> CompletionRate {
        let equipment = self.catalog.equipment_for(scope);
        let rate = match fetch_with_retry(self.connector, kind, scope, self.retry).await {
            Ok(snapshots) => completion_rate(kind, equipment, &snapshots, self.today, self.zone),
            Err(e) => {
                warn!(kind = %kind, scope = %scope, error = %e, "equipment status unavailable");
                CompletionRate::unavailable(kind, equipment.len())
            }
        };
        if let Some(metrics) = self.metrics {
            metrics
                .completion_percent
                .get_or_create(&TileLabel {
                    scope: scope.to_string(),
                    kind: kind.to_string(),
                })
                .set(i64::from(rate.percentage));
        }
        rate
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeOverview {
    pub scope: SiteScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub tiles: Vec<CompletionRate>,
}

/// Tiles for every type in one scope. Types are fetched concurrently.
pub async fn scope_overview(ctx: &BoardContext<'_>, scope: &SiteScope) -> ScopeOverview {
    let tiles = join_all(InspectionType::ALL.into_iter().map(|kind| ctx.tile(kind, scope))).await;
    ScopeOverview {
        scope: scope.clone(),
        name: ctx.catalog.team(scope).map(|t| t.name.clone()),
        tiles,
    }
}

/// Tiles for every team. Teams are fetched concurrently, types one after
/// another within a team. Daily is left off the all-teams board.
pub async fn teams_overview(ctx: &BoardContext<'_>) -> Vec<ScopeOverview> {
    let per_team = ctx.catalog.teams().iter().map(|team| async move {
        let mut tiles = Vec::new();
        for kind in InspectionType::ALL.into_iter().filter(|k| *k != InspectionType::Daily) {
            tiles.push(ctx.tile(kind, &team.scope).await);
        }
        ScopeOverview {
            scope: team.scope.clone(),
            name: Some(team.name.clone()),
            tiles,
        }
    });
    join_all(per_team).await
}

/// Where an equipment's last date came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DateSource {
    Remote,
    Local,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EquipmentStatus {
    pub name: String,
    pub status: AlarmStatus,
    pub label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_inspection_date: Option<NaiveDate>,
    pub source: DateSource,
}

/// One status line per catalog equipment. The remote date wins; local
/// history fills in when the remote has none (or an unreadable one).
pub fn equipment_board(
    kind: InspectionType,
    scope: &SiteScope,
    equipment: &[String],
    snapshots: &[EquipmentSnapshot],
    history: &History,
    today: NaiveDate,
    zone: ReferenceZone,
) -> Vec<EquipmentStatus> {
    let index = snapshot_index(snapshots);
    equipment
        .iter()
        .map(|name| {
            let remote = index
                .get(&normalize(name))
                .and_then(|s| s.last_inspection_date.as_deref())
                .and_then(|raw| match parse_inspection_date(raw, zone) {
                    Ok(date) => Some(date),
                    Err(e) => {
                        debug!(equipment = %name, error = %e, "ignoring unreadable remote date");
                        None
                    }
                });
            let (last, source) = match remote {
                Some(date) => (Some(date), DateSource::Remote),
                None => match history.last_inspection_date(kind, scope, name, zone) {
                    Some(date) => (Some(date), DateSource::Local),
                    None => (None, DateSource::None),
                },
            };
            let status = classify(kind, last, today);
            EquipmentStatus {
                name: name.clone(),
                status,
                label: label_for(status),
                last_inspection_date: last,
                source,
            }
        })
        .collect()
}
