//! # Sheets API — Direct Spreadsheet REST Transport
//!
//! Appends and reads rows with the spreadsheet REST API (v4 shape) instead of
//! going through a script endpoint. Each scope is a sheet tab; rows live in
//! columns `A:G` in [`InspectionRow`] order.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | test | `GET /v4/spreadsheets/{id}?fields=properties.title` |
//! | append | `POST /v4/spreadsheets/{id}/values/'{scope}'!A:G:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS` |
//! | status | `GET /v4/spreadsheets/{id}/values/'{scope}'!A:G` |
//!
//! Tab names are always quoted in A1 ranges (`'` doubled), since scopes like
//! `1-A` are not valid bare sheet references.
//!
//! ## Credentials
//!
//! - API key, sent as the `key` query parameter.
//! - Service account: an RS256 assertion signed with the account's private
//!   key is exchanged at its token URI for a bearer token. The token is
//!   reused until shortly before it expires.

use super::{
    ConnectionResult, ConnectionState, ConnectionTracker, ConnectorError, EquipmentSnapshot,
    RowAppendResult, RowConnector,
};
use crate::alarm::{parse_inspection_date, ReferenceZone};
use crate::config::ConnectorConfig;
use crate::inspection::{InspectionRecord, InspectionType, SiteScope};
use crate::row::InspectionRow;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Refresh a cached token this long before it expires.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Service-account key file, as downloaded from the cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Clone)]
pub enum SheetsCredentials {
    ApiKey(String),
    ServiceAccount(ServiceAccountKey),
}

impl SheetsCredentials {
    /// Service account wins when both are configured. `None` when neither is.
    pub fn from_config(config: &ConnectorConfig) -> anyhow::Result<Option<Self>> {
        if let Some(path) = &config.service_account_path {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading service account key {}", path.display()))?;
            let key: ServiceAccountKey =
                serde_json::from_str(&raw).context("parsing service account key")?;
            return Ok(Some(SheetsCredentials::ServiceAccount(key)));
        }
        Ok(config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| SheetsCredentials::ApiKey(k.to_string())))
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Deserialize)]
struct TokenError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Deserialize)]
struct GoogleError {
    message: String,
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

pub struct SheetsApiConnector {
    spreadsheet_id: Option<String>,
    credentials: Option<SheetsCredentials>,
    api_base: String,
    zone: ReferenceZone,
    read_timeout: Duration,
    write_timeout: Duration,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
    tracker: ConnectionTracker,
}

impl SheetsApiConnector {
    pub fn new(
        spreadsheet_id: Option<String>,
        credentials: Option<SheetsCredentials>,
        zone: ReferenceZone,
    ) -> Self {
        let spreadsheet_id = spreadsheet_id.filter(|id| !id.trim().is_empty());
        let configured = spreadsheet_id.is_some() && credentials.is_some();
        SheetsApiConnector {
            spreadsheet_id,
            credentials,
            api_base: DEFAULT_API_BASE.to_string(),
            zone,
            read_timeout: super::script::DEFAULT_READ_TIMEOUT,
            write_timeout: super::script::DEFAULT_WRITE_TIMEOUT,
            http: reqwest::Client::new(),
            token: Mutex::new(None),
            tracker: ConnectionTracker::new(configured),
        }
    }

    /// Point at another API host (a local mock in tests).
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    fn target(&self) -> Result<(&str, &SheetsCredentials), ConnectorError> {
        match (&self.spreadsheet_id, &self.credentials) {
            (Some(id), Some(credentials)) => Ok((id.as_str(), credentials)),
            _ => Err(ConnectorError::Unavailable),
        }
    }

    fn spreadsheet_url(&self, id: &str) -> String {
        format!("{}/v4/spreadsheets/{}", self.api_base, urlencoding::encode(id))
    }

    fn values_url(&self, id: &str, scope: &SiteScope) -> String {
        format!(
            "{}/values/{}",
            self.spreadsheet_url(id),
            urlencoding::encode(&a1_range(scope))
        )
    }

    async fn call(
        &self,
        request: impl FnOnce(&str) -> reqwest::RequestBuilder + Send,
        timeout: Duration,
    ) -> Result<Value, ConnectorError> {
        let outcome = self.execute(request, timeout).await;
        self.tracker.record(&outcome);
        outcome
    }

    async fn execute(
        &self,
        request: impl FnOnce(&str) -> reqwest::RequestBuilder + Send,
        timeout: Duration,
    ) -> Result<Value, ConnectorError> {
        let (id, credentials) = self.target()?;
        let request = request(id);

        let exchange = async {
            let request = match credentials {
                SheetsCredentials::ApiKey(key) => request.query(&[("key", key.as_str())]),
                SheetsCredentials::ServiceAccount(account) => {
                    request.bearer_auth(self.access_token(account).await?)
                }
            };
            let response = request.send().await.map_err(transport)?;
            let status = response.status();
            let body = response.text().await.map_err(transport)?;
            if !status.is_success() {
                return Err(error_from_body(status, &body));
            }
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&body)
                .map_err(|e| ConnectorError::Transport(format!("malformed response: {e}")))
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| ConnectorError::Timeout(timeout))?
    }

    /// Bearer token for `account`, reusing the cached one while it is fresh.
    async fn access_token(&self, account: &ServiceAccountKey) -> Result<String, ConnectorError> {
        let mut cached = self.token.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref() {
            if token.expires_at > now {
                return Ok(token.value.clone());
            }
        }

        let claims = AssertionClaims {
            iss: &account.client_email,
            scope: SHEETS_SCOPE,
            aud: &account.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .map_err(|e| ConnectorError::Credentials(format!("private key: {e}")))?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| ConnectorError::Credentials(format!("signing assertion: {e}")))?;

        let response = self
            .http
            .post(&account.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        let body = response.text().await.map_err(transport)?;
        if !status.is_success() {
            let reason = serde_json::from_str::<TokenError>(&body)
                .map(|e| e.error_description.unwrap_or(e.error))
                .unwrap_or_else(|_| format!("HTTP {status}"));
            return Err(ConnectorError::Credentials(reason));
        }
        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ConnectorError::Transport(format!("malformed token response: {e}")))?;

        info!(account = %account.client_email, expires_in = token.expires_in, "obtained access token");
        let lifetime = (token.expires_in - TOKEN_REFRESH_MARGIN_SECS).max(0);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: now + ChronoDuration::seconds(lifetime),
        });
        Ok(token.access_token)
    }
}

fn transport(e: reqwest::Error) -> ConnectorError {
    ConnectorError::Transport(e.to_string())
}

/// Structured API errors are remote rejections; anything else is transport.
fn error_from_body(status: reqwest::StatusCode, body: &str) -> ConnectorError {
    match serde_json::from_str::<GoogleErrorBody>(body) {
        Ok(parsed) => ConnectorError::Response(parsed.error.message),
        Err(_) => ConnectorError::Transport(format!("HTTP {status}")),
    }
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Latest inspection date per equipment among rows of `kind`, in order of
/// first appearance. Headers and rows with unreadable dates are skipped.
pub fn latest_per_equipment(
    rows: &[Vec<Value>],
    kind: InspectionType,
    zone: ReferenceZone,
) -> Vec<EquipmentSnapshot> {
    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, NaiveDate> = HashMap::new();

    for row in rows {
        if row.len() < 3 {
            continue;
        }
        if cell_text(&row[1]) != kind.sheet_label() {
            continue;
        }
        let equipment = cell_text(&row[2]);
        if equipment.is_empty() {
            continue;
        }
        let Ok(date) = parse_inspection_date(&cell_text(&row[0]), zone) else {
            continue;
        };
        match latest.get_mut(&equipment) {
            Some(existing) => {
                if date > *existing {
                    *existing = date;
                }
            }
            None => {
                latest.insert(equipment.clone(), date);
                order.push(equipment);
            }
        }
    }

    order
        .into_iter()
        .map(|name| {
            let date = latest.get(&name).map(|d| d.format("%Y-%m-%d").to_string());
            EquipmentSnapshot::new(name, date)
        })
        .collect()
}

#[async_trait]
impl RowConnector for SheetsApiConnector {
    fn name(&self) -> &'static str {
        "sheets-api"
    }

    fn state(&self) -> ConnectionState {
        self.tracker.state()
    }

    async fn test_connection(&self) -> Result<ConnectionResult, ConnectorError> {
        let body = self
            .call(
                |id| {
                    self.http
                        .get(self.spreadsheet_url(id))
                        .query(&[("fields", "properties.title")])
                },
                self.write_timeout,
            )
            .await?;
        let title = body
            .pointer("/properties/title")
            .and_then(Value::as_str)
            .unwrap_or("spreadsheet");
        Ok(ConnectionResult {
            ok: true,
            message: format!("connected to {title}"),
        })
    }

    async fn append_inspection_row(
        &self,
        record: &InspectionRecord,
        scope: &SiteScope,
    ) -> Result<RowAppendResult, ConnectorError> {
        let row = InspectionRow::from_record(record, self.zone);
        let payload = serde_json::json!({ "values": [row.fields()] });
        let body = self
            .call(
                |id| {
                    self.http
                        .post(format!("{}:append", self.values_url(id, scope)))
                        .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
                        .json(&payload)
                },
                self.write_timeout,
            )
            .await?;
        let updated_range = body
            .pointer("/updates/updatedRange")
            .and_then(Value::as_str)
            .map(str::to_string);
        debug!(scope = %scope, range = ?updated_range, "row appended");
        Ok(RowAppendResult {
            ok: true,
            updated_range,
        })
    }

    async fn fetch_equipment_status(
        &self,
        kind: InspectionType,
        scope: &SiteScope,
    ) -> Result<Vec<EquipmentSnapshot>, ConnectorError> {
        let body = self
            .call(|id| self.http.get(self.values_url(id, scope)), self.read_timeout)
            .await?;
        let rows: Vec<Vec<Value>> = match body.get("values") {
            Some(values) => serde_json::from_value(values.clone())
                .map_err(|e| ConnectorError::Transport(format!("malformed values: {e}")))?,
            None => Vec::new(),
        };
        let snapshots = latest_per_equipment(&rows, kind, self.zone)
            .into_iter()
            .map(|mut s| {
                s.sheet_name = Some(scope.to_string());
                s
            })
            .collect();
        Ok(snapshots)
    }
}

/// `A:G` of the scope's tab, with the tab name quoted.
fn a1_range(scope: &SiteScope) -> String {
    format!("'{}'!A:G", scope.as_str().replace('\'', "''"))
}
