//! # Script — Script-Endpoint Transport
//!
//! Talks to a spreadsheet-bound script web app with GET requests whose query
//! string carries the request fields. The script answers with the
//! `{success, data, error}` envelope, either as plain JSON or wrapped in a
//! callback invocation:
//!
//! ```text
//! GET <endpoint>?action=getEquipment&type=주간점검&sheetName=1-B&sheet=1-B&callback=cb_3f2a...
//! cb_3f2a...({"success":true,"data":[{"name":"Oven","lastInspectionDate":"2025-06-01"}]});
//! ```
//!
//! Every callback-framed request gets a fresh identity, so concurrent calls
//! can never consume each other's responses. A body wrapped in any other
//! identity is rejected.

use super::{
    filter_by_scope, Action, CatalogAdmin, ConnectionResult, ConnectionState, ConnectionTracker,
    ConnectorError, EnvelopeData, EquipmentSnapshot, Envelope, RowAppendResult, RowConnector,
};
use crate::alarm::ReferenceZone;
use crate::inspection::{InspectionRecord, InspectionType, SiteScope};
use crate::row::InspectionRow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(6);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// How the script endpoint frames its responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    #[default]
    Json,
    Callback,
}

pub struct ScriptConnector {
    endpoint: Option<Url>,
    framing: Framing,
    primary_scope: SiteScope,
    zone: ReferenceZone,
    read_timeout: Duration,
    write_timeout: Duration,
    http: reqwest::Client,
    tracker: ConnectionTracker,
}

impl ScriptConnector {
    /// `endpoint = None` leaves the connector unconfigured: every call fails
    /// with [`ConnectorError::Unavailable`] without touching the network.
    pub fn new(endpoint: Option<Url>, primary_scope: SiteScope, zone: ReferenceZone) -> Self {
        let tracker = ConnectionTracker::new(endpoint.is_some());
        ScriptConnector {
            endpoint,
            framing: Framing::default(),
            primary_scope,
            zone,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            http: reqwest::Client::new(),
            tracker,
        }
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Issue one request and record its outcome in the connection state.
    async fn call(
        &self,
        action: Action,
        params: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<EnvelopeData, ConnectorError> {
        let outcome = self.request(action, params, timeout).await;
        self.tracker.record(&outcome);
        outcome
    }

    async fn request(
        &self,
        action: Action,
        params: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<EnvelopeData, ConnectorError> {
        let endpoint = self.endpoint.as_ref().ok_or(ConnectorError::Unavailable)?;

        let callback = match self.framing {
            Framing::Callback => Some(format!("cb_{}", Uuid::new_v4().simple())),
            Framing::Json => None,
        };

        let mut url = endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("action", action.as_str());
            for (key, value) in params {
                query.append_pair(key, value);
            }
            if let Some(id) = &callback {
                query.append_pair("callback", id);
            }
        }

        debug!(action = action.as_str(), callback = ?callback, "script request");

        let exchange = async {
            let response = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|e| ConnectorError::Transport(e.to_string()))?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| ConnectorError::Transport(e.to_string()))?;
            if !status.is_success() {
                return Err(ConnectorError::Transport(format!("HTTP {status}")));
            }
            Ok::<String, ConnectorError>(body)
        };

        let body = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| ConnectorError::Timeout(timeout))??;

        let payload = match &callback {
            Some(id) => unwrap_callback(&body, id)?,
            None => body.trim(),
        };
        let envelope: Envelope = serde_json::from_str(payload)
            .map_err(|e| ConnectorError::Transport(format!("malformed response: {e}")))?;
        envelope.into_result()
    }

    async fn expect_success(
        &self,
        action: Action,
        params: &[(&str, &str)],
    ) -> Result<(), ConnectorError> {
        self.call(action, params, self.write_timeout).await.map(|_| ())
    }
}

/// Strip `id(` ... `)` and an optional trailing `;` from a callback body.
pub fn unwrap_callback<'a>(body: &'a str, id: &str) -> Result<&'a str, ConnectorError> {
    let trimmed = body.trim();
    let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();

    let Some(open) = trimmed.find('(') else {
        return Err(ConnectorError::Transport(
            "response is not wrapped in a callback".to_string(),
        ));
    };
    let name = trimmed[..open].trim();
    if name != id {
        return Err(ConnectorError::Transport(format!(
            "callback identity mismatch: expected {id}, got {name}"
        )));
    }
    trimmed[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| ConnectorError::Transport("unterminated callback body".to_string()))
}

#[async_trait]
impl RowConnector for ScriptConnector {
    fn name(&self) -> &'static str {
        "script"
    }

    fn state(&self) -> ConnectionState {
        self.tracker.state()
    }

    async fn test_connection(&self) -> Result<ConnectionResult, ConnectorError> {
        let reply = self.call(Action::TestConnection, &[], self.write_timeout).await?;
        Ok(ConnectionResult {
            ok: true,
            message: reply.message.unwrap_or_else(|| "connected".to_string()),
        })
    }

    async fn append_inspection_row(
        &self,
        record: &InspectionRecord,
        scope: &SiteScope,
    ) -> Result<RowAppendResult, ConnectorError> {
        let row = InspectionRow::from_record(record, self.zone).to_json();
        self.call(
            Action::AddInspectionData,
            &[
                ("sheetName", scope.as_str()),
                ("sheet", scope.as_str()),
                ("data", row.as_str()),
            ],
            self.write_timeout,
        )
        .await?;
        Ok(RowAppendResult::appended())
    }

    async fn fetch_equipment_status(
        &self,
        kind: InspectionType,
        scope: &SiteScope,
    ) -> Result<Vec<EquipmentSnapshot>, ConnectorError> {
        let reply = self
            .call(
                Action::GetEquipment,
                &[
                    ("type", kind.sheet_label()),
                    ("sheetName", scope.as_str()),
                    ("sheet", scope.as_str()),
                ],
                self.read_timeout,
            )
            .await?;

        let entries = match reply.data {
            Some(serde_json::Value::Array(items)) => items,
            Some(serde_json::Value::Null) | None => Vec::new(),
            Some(other) => {
                warn!(kind = %kind, scope = %scope, data = %other, "equipment data is not a list");
                Vec::new()
            }
        };
        let snapshots = entries.iter().filter_map(EquipmentSnapshot::from_remote).collect();
        Ok(filter_by_scope(snapshots, scope, &self.primary_scope))
    }

    fn catalog_admin(&self) -> Option<&dyn CatalogAdmin> {
        Some(self)
    }
}

#[async_trait]
impl CatalogAdmin for ScriptConnector {
    async fn add_equipment(
        &self,
        kind: InspectionType,
        scope: &SiteScope,
        name: &str,
    ) -> Result<(), ConnectorError> {
        self.expect_success(
            Action::AddEquipment,
            &[
                ("type", kind.sheet_label()),
                ("sheetName", scope.as_str()),
                ("sheet", scope.as_str()),
                ("name", name),
            ],
        )
        .await
    }

    async fn delete_equipment(
        &self,
        kind: InspectionType,
        scope: &SiteScope,
        name: &str,
    ) -> Result<(), ConnectorError> {
        self.expect_success(
            Action::DeleteEquipment,
            &[
                ("type", kind.sheet_label()),
                ("sheetName", scope.as_str()),
                ("sheet", scope.as_str()),
                ("name", name),
            ],
        )
        .await
    }

    async fn add_inspection_item(&self, kind: InspectionType, item: &str) -> Result<(), ConnectorError> {
        self.expect_success(
            Action::AddInspectionItem,
            &[("type", kind.sheet_label()), ("itemName", item)],
        )
        .await
    }

    async fn delete_inspection_item(&self, kind: InspectionType, item: &str) -> Result<(), ConnectorError> {
        self.expect_success(
            Action::DeleteInspectionItem,
            &[("type", kind.sheet_label()), ("itemName", item)],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwrap_callback_accepts_matching_identity() {
        assert_eq!(unwrap_callback("cb_1({\"success\":true})", "cb_1").unwrap(), "{\"success\":true}");
        assert_eq!(
            unwrap_callback("  cb_1({\"success\":true});\n", "cb_1").unwrap(),
            "{\"success\":true}"
        );
    }

    #[test]
    fn unwrap_callback_rejects_foreign_identity() {
        let err = unwrap_callback("cb_2({\"success\":true})", "cb_1").unwrap_err();
        assert!(matches!(err, ConnectorError::Transport(msg) if msg.contains("mismatch")));
    }

    #[test]
    fn unwrap_callback_rejects_plain_json_and_truncation() {
        assert!(matches!(
            unwrap_callback("{\"success\":true}", "cb_1"),
            Err(ConnectorError::Transport(_))
        ));
        assert!(matches!(
            unwrap_callback("cb_1({\"success\":true}", "cb_1"),
            Err(ConnectorError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn unconfigured_connector_fails_without_io() {
        let connector = ScriptConnector::new(
            None,
            SiteScope::new("1-A").unwrap(),
            ReferenceZone::default(),
        );
        assert_eq!(connector.state(), ConnectionState::Unconfigured);
        assert_eq!(connector.test_connection().await, Err(ConnectorError::Unavailable));
        let scope = SiteScope::new("1-A").unwrap();
        assert_eq!(
            connector.fetch_equipment_status(InspectionType::Weekly, &scope).await,
            Err(ConnectorError::Unavailable)
        );
        assert_eq!(connector.state(), ConnectionState::Unconfigured);
    }

    #[test]
    fn framing_reads_lowercase() {
        let framing: Framing = serde_json::from_str("\"callback\"").unwrap();
        assert_eq!(framing, Framing::Callback);
        assert_eq!(Framing::default(), Framing::Json);
    }
}
