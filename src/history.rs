//! # History — Local Last-Inspection Record
//!
//! Remembers when each (scope, type, equipment) was last submitted from this
//! installation. Used to skip same-day duplicate submissions and to show a
//! status when the row-store has no date for an equipment.
//!
//! Stored as one JSON object keyed by `scope_typeLabel_equipment`:
//!
//! ```json
//! {
//!   "1-A_주간점검_진공펌프": {
//!     "lastInspectionDate": "2025-06-15T01:12:44Z",
//!     "type": "weekly",
//!     "equipment": "진공펌프",
//!     "scope": "1-A"
//!   }
//! }
//! ```
//!
//! Saves go to a temporary sibling file that is then renamed over the
//! original, so a crash mid-write never leaves a truncated history.

use crate::alarm::ReferenceZone;
use crate::inspection::{InspectionType, SiteScope};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("history file {path} is not valid: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("serializing history: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub last_inspection_date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: InspectionType,
    pub equipment: String,
    pub scope: SiteScope,
}

#[derive(Debug, Default)]
pub struct History {
    path: Option<PathBuf>,
    entries: BTreeMap<String, HistoryEntry>,
}

fn key(kind: InspectionType, scope: &SiteScope, equipment: &str) -> String {
    format!("{}_{}_{}", scope, kind.sheet_label(), equipment.trim())
}

impl History {
    /// Open the history at `path`. A missing file is an empty history.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| HistoryError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(HistoryError::Io { path, source }),
        };
        debug!(path = %path.display(), entries = entries.len(), "history loaded");
        Ok(History {
            path: Some(path),
            entries,
        })
    }

    /// A history that is never written to disk.
    pub fn in_memory() -> Self {
        History::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record(&mut self, kind: InspectionType, scope: &SiteScope, equipment: &str, at: DateTime<Utc>) {
        self.entries.insert(
            key(kind, scope, equipment),
            HistoryEntry {
                last_inspection_date: at,
                kind,
                equipment: equipment.trim().to_string(),
                scope: scope.clone(),
            },
        );
    }

    pub fn last_inspection(
        &self,
        kind: InspectionType,
        scope: &SiteScope,
        equipment: &str,
    ) -> Option<DateTime<Utc>> {
        self.entries
            .get(&key(kind, scope, equipment))
            .map(|e| e.last_inspection_date)
    }

    /// Calendar date of the last inspection in `zone`.
    pub fn last_inspection_date(
        &self,
        kind: InspectionType,
        scope: &SiteScope,
        equipment: &str,
        zone: ReferenceZone,
    ) -> Option<NaiveDate> {
        self.last_inspection(kind, scope, equipment)
            .map(|at| zone.date_of(at))
    }

    pub fn entries_for(&self, scope: &SiteScope) -> Vec<&HistoryEntry> {
        self.entries.values().filter(|e| &e.scope == scope).collect()
    }

    /// Write to disk. No-op for in-memory histories.
    pub fn save(&self) -> Result<(), HistoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let raw = serde_json::to_string_pretty(&self.entries)?;
        let io_err = |source| HistoryError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, raw).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;
        debug!(path = %path.display(), entries = self.entries.len(), "history saved");
        Ok(())
    }
}
