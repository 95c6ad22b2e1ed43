//! # Config — Installation Settings
//!
//! Read from `~/.facsys/config.toml` unless `--config` names another file.
//! A missing default file means all defaults; a missing explicit file is an
//! error.
//!
//! ```toml
//! timezone_offset_minutes = 540
//! catalog_path = "/etc/facsys/catalog.toml"
//!
//! [connector]
//! kind = "script"            # script | sheets-api | memory
//! endpoint = "https://script.google.com/macros/s/XXXX/exec"
//! framing = "callback"       # json | callback
//! read_timeout_secs = 6
//! write_timeout_secs = 10
//! cache_ttl_secs = 30
//!
//! [dashboard]
//! port = 7001
//! fetch_attempts = 2
//! retry_delay_ms = 1000
//! ```

use crate::alarm::ReferenceZone;
use crate::catalog::Catalog;
use crate::completion::RetryPolicy;
use crate::connector::script::Framing;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectorKind {
    Script,
    SheetsApi,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    pub kind: ConnectorKind,
    /// Script endpoint URL. Unset leaves the connector unconfigured.
    pub endpoint: Option<String>,
    pub framing: Framing,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub spreadsheet_id: Option<String>,
    pub api_key: Option<String>,
    pub service_account_path: Option<PathBuf>,
    /// Override of the spreadsheet API host.
    pub api_base: Option<String>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        ConnectorConfig {
            kind: ConnectorKind::Script,
            endpoint: None,
            framing: Framing::default(),
            read_timeout_secs: 6,
            write_timeout_secs: 10,
            cache_ttl_secs: 30,
            spreadsheet_id: None,
            api_key: None,
            service_account_path: None,
            api_base: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    pub fetch_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            port: 7001,
            static_dir: None,
            fetch_attempts: 2,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub timezone_offset_minutes: i32,
    pub catalog_path: Option<PathBuf>,
    pub history_path: Option<PathBuf>,
    pub connector: ConnectorConfig,
    pub dashboard: DashboardConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            timezone_offset_minutes: ReferenceZone::DEFAULT_OFFSET_MINUTES,
            catalog_path: None,
            history_path: None,
            connector: ConnectorConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load `path`, or the default config file if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match default_config_path() {
                Ok(p) => (p, false),
                Err(_) => return Ok(AppConfig::default()),
            },
        };
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(AppConfig::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading config {}", path.display()));
            }
        };
        let config: AppConfig =
            toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))?;
        config.zone()?;
        Ok(config)
    }

    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path()?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn zone(&self) -> Result<ReferenceZone> {
        ReferenceZone::from_offset_minutes(self.timezone_offset_minutes).ok_or_else(|| {
            anyhow::anyhow!(
                "timezone_offset_minutes {} is outside ±24h",
                self.timezone_offset_minutes
            )
        })
    }

    /// History file location; `~/.facsys/history.json` unless configured.
    pub fn history_path(&self) -> Result<PathBuf> {
        match &self.history_path {
            Some(p) => Ok(p.clone()),
            None => Ok(facsys_home()?.join("history.json")),
        }
    }

    /// Catalog file location; `~/.facsys/catalog.toml` unless configured.
    pub fn catalog_path(&self) -> Result<PathBuf> {
        match &self.catalog_path {
            Some(p) => Ok(p.clone()),
            None => Ok(facsys_home()?.join("catalog.toml")),
        }
    }

    /// Load the catalog file, or the built-in catalog when no file was
    /// configured and the default one does not exist yet.
    pub fn load_catalog(&self) -> Result<Catalog> {
        let path = self.catalog_path()?;
        if self.catalog_path.is_none() && !path.exists() {
            return Ok(Catalog::embedded()?);
        }
        Ok(Catalog::load(Some(&path))?)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.dashboard.fetch_attempts.max(1),
            delay: Duration::from_millis(self.dashboard.retry_delay_ms),
        }
    }
}

fn facsys_home() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".facsys"))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(facsys_home()?.join("config.toml"))
}
