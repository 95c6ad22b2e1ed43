//! # Connector — Row-Store Abstraction
//!
//! One interface for appending inspection rows to a remote row-store and for
//! reading back per-equipment last-inspection dates. Transports implement
//! [`RowConnector`] and are picked once at startup from configuration:
//!
//! | Transport | Module | Reaches the store through |
//! |-----------|--------|---------------------------|
//! | script | [`script`] | a script endpoint, plain JSON or callback-wrapped responses |
//! | sheets-api | [`sheets_api`] | the spreadsheet REST API with an API key or service account |
//! | memory | [`memory`] | an in-process row store |
//!
//! Decorators add behavior without touching transports:
//! [`cache::CachedConnector`] keeps short-lived read results and
//! [`instrumented::InstrumentedConnector`] records metrics.
//!
//! ## Connection State
//!
//! ```text
//! Unconfigured ──endpoint set──> Untested ──test ok──> Connected
//!                                                 │  ^
//!                            timeout / transport  │  │ test ok or data call ok
//!                                                 v  │
//!                                               Degraded
//! ```
//!
//! A degraded connector still attempts every call. Remote rejections
//! ([`ConnectorError::Response`]) say nothing about reachability and leave the
//! state alone.
//!
//! ## Retries
//!
//! Appends are not idempotent: every successful call adds a row and the
//! store never de-duplicates. Connectors never retry on their own.

pub mod cache;
pub mod instrumented;
pub mod memory;
pub mod script;
pub mod sheets_api;

use crate::alarm::ReferenceZone;
use crate::config::{ConnectorConfig, ConnectorKind};
use crate::inspection::{InspectionRecord, InspectionType, SiteScope};
use crate::lock_or_recover;
use crate::prom_metrics::Metrics;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Failure of a single connector call. Each call fails independently.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectorError {
    /// No endpoint (or spreadsheet) is configured. Raised before any I/O.
    #[error("no row-store endpoint is configured")]
    Unavailable,
    /// The bounded wait elapsed without a response.
    #[error("row-store did not answer within {0:?}")]
    Timeout(Duration),
    /// The store answered but rejected the request.
    #[error("row-store rejected the request: {0}")]
    Response(String),
    /// The request never produced a usable response.
    #[error("row-store transport failure: {0}")]
    Transport(String),
    /// Credentials could not be used to authorize the request.
    #[error("row-store credentials unusable: {0}")]
    Credentials(String),
}

impl ConnectorError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectorError::Unavailable => "unavailable",
            ConnectorError::Timeout(_) => "timeout",
            ConnectorError::Response(_) => "response",
            ConnectorError::Transport(_) => "transport",
            ConnectorError::Credentials(_) => "credentials",
        }
    }

    /// Whether the same call may succeed if the caller tries again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnectorError::Timeout(_) | ConnectorError::Transport(_))
    }

    fn is_transport_level(&self) -> bool {
        self.is_retryable()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionResult {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowAppendResult {
    pub ok: bool,
    /// Range the store reports as written, when it says.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_range: Option<String>,
}

impl RowAppendResult {
    pub fn appended() -> Self {
        RowAppendResult {
            ok: true,
            updated_range: None,
        }
    }
}

/// Best-effort current state of one piece of equipment as the store sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentSnapshot {
    pub name: String,
    /// Raw value from the store; parse with [`crate::alarm::parse_inspection_date`].
    #[serde(default)]
    pub last_inspection_date: Option<String>,
    /// Scope the store tagged this entry with, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
}

/// Keys the script backend has used over time to tag an entry's sheet.
const SCOPE_TAG_KEYS: [&str; 5] = ["sheetName", "sheet", "tab", "sheet_tab", "sheetname"];

impl EquipmentSnapshot {
    pub fn new(name: impl Into<String>, last_inspection_date: Option<String>) -> Self {
        EquipmentSnapshot {
            name: name.into(),
            last_inspection_date,
            sheet_name: None,
        }
    }

    /// Lenient read of one entry from a script response. Entries without a
    /// name are dropped; non-string dates are treated as absent.
    pub fn from_remote(value: &serde_json::Value) -> Option<Self> {
        let obj = value.as_object()?;
        let name = obj.get("name")?.as_str()?.trim();
        if name.is_empty() {
            return None;
        }
        let last_inspection_date = obj
            .get("lastInspectionDate")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let sheet_name = SCOPE_TAG_KEYS
            .iter()
            .find_map(|key| obj.get(*key).and_then(|v| v.as_str()))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Some(EquipmentSnapshot {
            name: name.to_string(),
            last_inspection_date,
            sheet_name,
        })
    }
}

/// Keep entries that belong to `scope`.
///
/// Entries tagged with another scope are dropped. Untagged entries predate
/// per-team sheets and belong to the primary scope only; the kept ones are
/// tagged with `scope`.
pub fn filter_by_scope(
    entries: Vec<EquipmentSnapshot>,
    scope: &SiteScope,
    primary: &SiteScope,
) -> Vec<EquipmentSnapshot> {
    let accept_untagged = scope == primary;
    entries
        .into_iter()
        .filter_map(|mut entry| match entry.sheet_name.as_deref() {
            Some(tag) if tag == scope.as_str() => Some(entry),
            Some(_) => None,
            None if accept_untagged => {
                entry.sheet_name = Some(scope.to_string());
                Some(entry)
            }
            None => None,
        })
        .collect()
}

/// Request discriminator understood by the script backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    TestConnection,
    AddInspectionData,
    GetEquipment,
    AddEquipment,
    DeleteEquipment,
    AddInspectionItem,
    DeleteInspectionItem,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::TestConnection => "testConnection",
            Action::AddInspectionData => "addInspectionData",
            Action::GetEquipment => "getEquipment",
            Action::AddEquipment => "addEquipment",
            Action::DeleteEquipment => "deleteEquipment",
            Action::AddInspectionItem => "addInspectionItem",
            Action::DeleteInspectionItem => "deleteInspectionItem",
        }
    }
}

/// `{success, data?, error?}` envelope returned by the script backend.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl Envelope {
    pub(crate) fn into_result(self) -> Result<EnvelopeData, ConnectorError> {
        if self.success {
            Ok(EnvelopeData {
                data: self.data,
                message: self.message,
            })
        } else {
            let reason = self
                .error
                .or(self.message)
                .unwrap_or_else(|| "unknown error".to_string());
            Err(ConnectorError::Response(reason))
        }
    }
}

pub(crate) struct EnvelopeData {
    pub(crate) data: Option<serde_json::Value>,
    pub(crate) message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Unconfigured,
    Untested,
    Connected,
    Degraded,
}

/// Tracks [`ConnectionState`] for one connector instance.
#[derive(Debug)]
pub struct ConnectionTracker {
    state: Mutex<ConnectionState>,
}

impl ConnectionTracker {
    pub fn new(configured: bool) -> Self {
        let initial = if configured {
            ConnectionState::Untested
        } else {
            ConnectionState::Unconfigured
        };
        ConnectionTracker {
            state: Mutex::new(initial),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *lock_or_recover(&self.state)
    }

    /// Fold the outcome of one call into the state.
    pub fn record<T>(&self, outcome: &Result<T, ConnectorError>) {
        let mut state = lock_or_recover(&self.state);
        if *state == ConnectionState::Unconfigured {
            return;
        }
        match outcome {
            Ok(_) => *state = ConnectionState::Connected,
            Err(e) if e.is_transport_level() => *state = ConnectionState::Degraded,
            Err(_) => {}
        }
    }
}

#[async_trait]
pub trait RowConnector: Send + Sync {
    /// Transport name for logs and metrics.
    fn name(&self) -> &'static str;

    fn state(&self) -> ConnectionState;

    /// Check reachability and credentials without writing anything.
    async fn test_connection(&self) -> Result<ConnectionResult, ConnectorError>;

    /// Append `record` as one row to the sheet for `scope`. Every successful
    /// call adds a row, retries included.
    async fn append_inspection_row(
        &self,
        record: &InspectionRecord,
        scope: &SiteScope,
    ) -> Result<RowAppendResult, ConnectorError>;

    /// Current last-inspection dates for `kind` within `scope`. Equipment
    /// missing from the result has unknown status.
    async fn fetch_equipment_status(
        &self,
        kind: InspectionType,
        scope: &SiteScope,
    ) -> Result<Vec<EquipmentSnapshot>, ConnectorError>;

    /// Remote catalog management, for transports that support it.
    fn catalog_admin(&self) -> Option<&dyn CatalogAdmin> {
        None
    }
}

/// Equipment and checklist-item management on the remote store.
#[async_trait]
pub trait CatalogAdmin: Send + Sync {
    async fn add_equipment(
        &self,
        kind: InspectionType,
        scope: &SiteScope,
        name: &str,
    ) -> Result<(), ConnectorError>;

    async fn delete_equipment(
        &self,
        kind: InspectionType,
        scope: &SiteScope,
        name: &str,
    ) -> Result<(), ConnectorError>;

    async fn add_inspection_item(&self, kind: InspectionType, item: &str) -> Result<(), ConnectorError>;

    async fn delete_inspection_item(&self, kind: InspectionType, item: &str) -> Result<(), ConnectorError>;
}

/// Build the configured transport, wrapped in instrumentation and the read
/// cache.
pub fn build(
    config: &ConnectorConfig,
    primary_scope: &SiteScope,
    zone: ReferenceZone,
    metrics: Arc<Metrics>,
) -> Result<Arc<dyn RowConnector>> {
    let read_timeout = Duration::from_secs(config.read_timeout_secs);
    let write_timeout = Duration::from_secs(config.write_timeout_secs);

    let transport: Arc<dyn RowConnector> = match config.kind {
        ConnectorKind::Script => {
            let endpoint = config
                .endpoint
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(|s| url::Url::parse(s.trim()))
                .transpose()
                .context("invalid script endpoint URL")?;
            Arc::new(
                script::ScriptConnector::new(endpoint, primary_scope.clone(), zone)
                    .with_framing(config.framing)
                    .with_timeouts(read_timeout, write_timeout),
            )
        }
        ConnectorKind::SheetsApi => {
            let credentials = sheets_api::SheetsCredentials::from_config(config)?;
            let mut connector =
                sheets_api::SheetsApiConnector::new(config.spreadsheet_id.clone(), credentials, zone)
                    .with_timeouts(read_timeout, write_timeout);
            if let Some(base) = config.api_base.as_deref() {
                connector = connector.with_api_base(base);
            }
            Arc::new(connector)
        }
        ConnectorKind::Memory => Arc::new(memory::MemoryConnector::new(zone)),
    };

    let instrumented = Arc::new(instrumented::InstrumentedConnector::new(transport, metrics));
    Ok(Arc::new(cache::CachedConnector::new(
        instrumented,
        Duration::from_secs(config.cache_ttl_secs),
    )))
}
