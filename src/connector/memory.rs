//! In-process row store.
//!
//! Keeps appended rows per scope and a registered equipment list per
//! (scope, type), and answers status queries from the rows the same way the
//! spreadsheet does. Used by `kind = "memory"`, by demos, and by tests that
//! need a connector with scripted failures ([`MemoryConnector::fail_next`]).

use super::{
    CatalogAdmin, ConnectionResult, ConnectionState, ConnectionTracker, ConnectorError,
    EquipmentSnapshot, RowAppendResult, RowConnector,
};
use crate::alarm::{parse_inspection_date, ReferenceZone};
use crate::inspection::{InspectionRecord, InspectionType, SiteScope};
use crate::lock_or_recover;
use crate::row::InspectionRow;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct Store {
    rows: HashMap<SiteScope, Vec<InspectionRow>>,
    equipment: HashMap<(SiteScope, InspectionType), Vec<String>>,
    items: HashMap<InspectionType, Vec<String>>,
    faults: VecDeque<ConnectorError>,
    calls: usize,
}

pub struct MemoryConnector {
    zone: ReferenceZone,
    store: Mutex<Store>,
    tracker: ConnectionTracker,
    read_latency: Duration,
    write_latency: Duration,
}

impl MemoryConnector {
    pub fn new(zone: ReferenceZone) -> Self {
        MemoryConnector {
            zone,
            store: Mutex::new(Store::default()),
            tracker: ConnectionTracker::new(true),
            read_latency: Duration::ZERO,
            write_latency: Duration::ZERO,
        }
    }

    /// Delay status answers by `latency`. The answer reflects the store as
    /// it was when the call started.
    pub fn with_read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = latency;
        self
    }

    /// Delay append acknowledgements by `latency`. The row is stored before
    /// the delay.
    pub fn with_write_latency(mut self, latency: Duration) -> Self {
        self.write_latency = latency;
        self
    }

    /// Register equipment for (scope, type) so it appears in status results
    /// before its first inspection.
    pub fn with_equipment<I, S>(self, scope: &SiteScope, kind: InspectionType, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut store = lock_or_recover(&self.store);
            let list = store.equipment.entry((scope.clone(), kind)).or_default();
            for name in names {
                let name = name.into();
                if !list.contains(&name) {
                    list.push(name);
                }
            }
        }
        self
    }

    /// Seed a row directly, bypassing the append path and its faults.
    pub fn insert_row(&self, scope: &SiteScope, row: InspectionRow) {
        lock_or_recover(&self.store)
            .rows
            .entry(scope.clone())
            .or_default()
            .push(row);
    }

    /// Make the next call (of any operation) fail with `error`. Queued
    /// faults are consumed in order.
    pub fn fail_next(&self, error: ConnectorError) {
        lock_or_recover(&self.store).faults.push_back(error);
    }

    pub fn rows(&self, scope: &SiteScope) -> Vec<InspectionRow> {
        lock_or_recover(&self.store)
            .rows
            .get(scope)
            .cloned()
            .unwrap_or_default()
    }

    pub fn items(&self, kind: InspectionType) -> Vec<String> {
        lock_or_recover(&self.store)
            .items
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of calls made against the store, faulted ones included.
    pub fn calls(&self) -> usize {
        lock_or_recover(&self.store).calls
    }

    /// Run `op` against the store unless a fault is queued.
    fn with_store<T>(&self, op: impl FnOnce(&mut Store) -> Result<T, ConnectorError>) -> Result<T, ConnectorError> {
        let outcome = {
            let mut store = lock_or_recover(&self.store);
            store.calls += 1;
            match store.faults.pop_front() {
                Some(fault) => Err(fault),
                None => op(&mut store),
            }
        };
        self.tracker.record(&outcome);
        outcome
    }

    async fn settle(latency: Duration) {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn snapshots(store: &Store, kind: InspectionType, scope: &SiteScope, zone: ReferenceZone) -> Vec<EquipmentSnapshot> {
        let mut names: Vec<String> = store
            .equipment
            .get(&(scope.clone(), kind))
            .cloned()
            .unwrap_or_default();
        let mut latest: HashMap<&str, NaiveDate> = HashMap::new();

        for row in store.rows.get(scope).into_iter().flatten() {
            if row.inspection_type() != kind.sheet_label() {
                continue;
            }
            let Ok(date) = parse_inspection_date(row.date(), zone) else {
                continue;
            };
            if !names.iter().any(|n| n == row.equipment()) {
                names.push(row.equipment().to_string());
            }
            latest
                .entry(row.equipment())
                .and_modify(|d| *d = (*d).max(date))
                .or_insert(date);
        }

        names
            .iter()
            .map(|name| {
                let mut snapshot = EquipmentSnapshot::new(
                    name.clone(),
                    latest.get(name.as_str()).map(|d| d.format("%Y-%m-%d").to_string()),
                );
                snapshot.sheet_name = Some(scope.to_string());
                snapshot
            })
            .collect()
    }
}

#[async_trait]
impl RowConnector for MemoryConnector {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn state(&self) -> ConnectionState {
        self.tracker.state()
    }

    async fn test_connection(&self) -> Result<ConnectionResult, ConnectorError> {
        self.with_store(|_| {
            Ok(ConnectionResult {
                ok: true,
                message: "in-memory store".to_string(),
            })
        })
    }

    async fn append_inspection_row(
        &self,
        record: &InspectionRecord,
        scope: &SiteScope,
    ) -> Result<RowAppendResult, ConnectorError> {
        let row = InspectionRow::from_record(record, self.zone);
        let outcome = self.with_store(|store| {
            store.rows.entry(scope.clone()).or_default().push(row);
            Ok(RowAppendResult::appended())
        });
        Self::settle(self.write_latency).await;
        outcome
    }

    async fn fetch_equipment_status(
        &self,
        kind: InspectionType,
        scope: &SiteScope,
    ) -> Result<Vec<EquipmentSnapshot>, ConnectorError> {
        let zone = self.zone;
        let outcome = self.with_store(|store| Ok(Self::snapshots(store, kind, scope, zone)));
        Self::settle(self.read_latency).await;
        outcome
    }

    fn catalog_admin(&self) -> Option<&dyn CatalogAdmin> {
        Some(self)
    }
}

#[async_trait]
impl CatalogAdmin for MemoryConnector {
    async fn add_equipment(
        &self,
        kind: InspectionType,
        scope: &SiteScope,
        name: &str,
    ) -> Result<(), ConnectorError> {
        self.with_store(|store| {
            let list = store.equipment.entry((scope.clone(), kind)).or_default();
            if list.iter().any(|n| n == name) {
                return Err(ConnectorError::Response(format!("equipment {name} already exists")));
            }
            list.push(name.to_string());
            Ok(())
        })
    }

    async fn delete_equipment(
        &self,
        kind: InspectionType,
        scope: &SiteScope,
        name: &str,
    ) -> Result<(), ConnectorError> {
        self.with_store(|store| {
            let list = store.equipment.entry((scope.clone(), kind)).or_default();
            let before = list.len();
            list.retain(|n| n != name);
            if list.len() == before {
                return Err(ConnectorError::Response(format!("equipment {name} not found")));
            }
            Ok(())
        })
    }

    async fn add_inspection_item(&self, kind: InspectionType, item: &str) -> Result<(), ConnectorError> {
        self.with_store(|store| {
            let list = store.items.entry(kind).or_default();
            if list.iter().any(|i| i == item) {
                return Err(ConnectorError::Response(format!("item {item} already exists")));
            }
            list.push(item.to_string());
            Ok(())
        })
    }

    async fn delete_inspection_item(&self, kind: InspectionType, item: &str) -> Result<(), ConnectorError> {
        self.with_store(|store| {
            let list = store.items.entry(kind).or_default();
            let before = list.len();
            list.retain(|i| i != item);
            if list.len() == before {
                return Err(ConnectorError::Response(format!("item {item} not found")));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspection::CheckResult;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn scope(s: &str) -> SiteScope {
        SiteScope::new(s).unwrap()
    }

    fn record(kind: InspectionType, equipment: &str, day: u32) -> InspectionRecord {
        InspectionRecord::new(
            kind,
            equipment,
            vec![CheckResult::new("Oil", "done")],
            "",
            Utc.with_ymd_and_hms(2025, 6, day, 3, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn append_then_fetch_reports_latest_date() {
        let a = scope("1-A");
        let connector = MemoryConnector::new(ReferenceZone::default())
            .with_equipment(&a, InspectionType::Weekly, ["Pump", "Oven"]);

        connector.append_inspection_row(&record(InspectionType::Weekly, "Pump", 2), &a).await.unwrap();
        connector.append_inspection_row(&record(InspectionType::Weekly, "Pump", 9), &a).await.unwrap();
        connector.append_inspection_row(&record(InspectionType::Monthly, "Pump", 12), &a).await.unwrap();

        let status = connector.fetch_equipment_status(InspectionType::Weekly, &a).await.unwrap();
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].name, "Pump");
        assert_eq!(status[0].last_inspection_date.as_deref(), Some("2025-06-09"));
        assert_eq!(status[1].name, "Oven");
        assert_eq!(status[1].last_inspection_date, None);
        assert_eq!(connector.rows(&a).len(), 3);
    }

    #[tokio::test]
    async fn scopes_do_not_see_each_other() {
        let connector = MemoryConnector::new(ReferenceZone::default());
        connector
            .append_inspection_row(&record(InspectionType::Daily, "Mixer", 2), &scope("1-B"))
            .await
            .unwrap();
        let other = connector
            .fetch_equipment_status(InspectionType::Daily, &scope("1-C"))
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn faults_are_consumed_in_order_and_drive_state() {
        let a = scope("1-A");
        let connector = MemoryConnector::new(ReferenceZone::default());
        connector.fail_next(ConnectorError::Timeout(Duration::from_secs(6)));
        connector.fail_next(ConnectorError::Response("quota".into()));

        assert!(connector.fetch_equipment_status(InspectionType::Weekly, &a).await.is_err());
        assert_eq!(connector.state(), ConnectionState::Degraded);
        assert_eq!(
            connector.test_connection().await,
            Err(ConnectorError::Response("quota".into()))
        );
        assert_eq!(connector.state(), ConnectionState::Degraded);
        assert!(connector.test_connection().await.is_ok());
        assert_eq!(connector.state(), ConnectionState::Connected);
        assert_eq!(connector.calls(), 3);
    }

    #[tokio::test]
    async fn catalog_admin_rejects_duplicates_and_missing_entries() {
        let a = scope("1-A");
        let connector = MemoryConnector::new(ReferenceZone::default());
        let admin = connector.catalog_admin().unwrap();

        admin.add_equipment(InspectionType::Monthly, &a, "Boiler").await.unwrap();
        assert!(matches!(
            admin.add_equipment(InspectionType::Monthly, &a, "Boiler").await,
            Err(ConnectorError::Response(_))
        ));
        admin.delete_equipment(InspectionType::Monthly, &a, "Boiler").await.unwrap();
        assert!(admin.delete_equipment(InspectionType::Monthly, &a, "Boiler").await.is_err());

        admin.add_inspection_item(InspectionType::Monthly, "Belt tension").await.unwrap();
        assert_eq!(connector.items(InspectionType::Monthly), vec!["Belt tension".to_string()]);
        admin.delete_inspection_item(InspectionType::Monthly, "Belt tension").await.unwrap();
        assert!(connector.items(InspectionType::Monthly).is_empty());
    }
}
