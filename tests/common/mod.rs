//! Shared test helpers for integration tests.

#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use facsys::alarm::ReferenceZone;
use facsys::catalog::Catalog;
use facsys::completion::RetryPolicy;
use facsys::connector::memory::MemoryConnector;
use facsys::connector::RowConnector;
use facsys::dashboard::{self, AppState};
use facsys::history::History;
use facsys::inspection::SiteScope;
use facsys::prom_metrics::Metrics;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// 2025-06-15 12:00 in the default +09:00 zone.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 15, 3, 0, 0).unwrap()
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
}

pub fn days_ago(n: i64) -> String {
    (today() - chrono::Duration::days(n)).format("%Y-%m-%d").to_string()
}

pub fn scope(id: &str) -> SiteScope {
    SiteScope::new(id).unwrap()
}

/// Retry policy that does not sleep between attempts.
pub fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 2,
        delay: Duration::ZERO,
    }
}

/// Dashboard state over `connector` with the built-in catalog, empty
/// history and a clock fixed at [`fixed_now`].
pub fn build_state(connector: Arc<dyn RowConnector>) -> Arc<AppState> {
    let state = AppState::new(
        connector,
        Catalog::embedded().unwrap(),
        History::in_memory(),
        ReferenceZone::default(),
        Arc::new(Metrics::new()),
    )
    .with_retry(quick_retry())
    .with_clock(fixed_now);
    Arc::new(state)
}

/// Build an Axum test app router over an in-process row store.
pub fn build_test_app(memory: Arc<MemoryConnector>) -> axum::Router {
    dashboard::build_router(build_state(memory), None)
}

/// Write a settings file using the in-process row store, with catalog and
/// history files kept inside `dir`.
pub fn write_memory_config(dir: &Path) -> PathBuf {
    let path = dir.join("config.toml");
    let content = format!(
        "catalog_path = {:?}\nhistory_path = {:?}\n\n[connector]\nkind = \"memory\"\n\n[dashboard]\nretry_delay_ms = 0\n",
        dir.join("catalog.toml"),
        dir.join("history.json"),
    );
    std::fs::write(&path, content).unwrap();
    Catalog::embedded().unwrap().save(&dir.join("catalog.toml")).unwrap();
    path
}
