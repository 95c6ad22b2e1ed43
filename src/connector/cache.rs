//! Short-lived cache for equipment status reads.
//!
//! Results are kept per (type, scope) for a fixed TTL. A successful append
//! drops every entry of the appended scope so the next read sees the new row.
//! Each scope carries a generation that invalidation bumps; a read that was
//! in flight across an invalidation returns its result but does not store it.
//! Writes and connection tests always pass through. Remote equipment edits
//! invalidate their scope as appends do.

use super::{
    CatalogAdmin, ConnectionResult, ConnectionState, ConnectorError, EquipmentSnapshot,
    RowAppendResult, RowConnector,
};
use crate::inspection::{InspectionRecord, InspectionType, SiteScope};
use crate::lock_or_recover;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

struct Entry {
    stored_at: Instant,
    snapshots: Vec<EquipmentSnapshot>,
}

#[derive(Default)]
struct Slots {
    entries: HashMap<(InspectionType, SiteScope), Entry>,
    generations: HashMap<SiteScope, u64>,
}

impl Slots {
    fn generation(&self, scope: &SiteScope) -> u64 {
        self.generations.get(scope).copied().unwrap_or(0)
    }
}

pub struct CachedConnector {
    inner: Arc<dyn RowConnector>,
    ttl: Duration,
    slots: Mutex<Slots>,
}

impl CachedConnector {
    pub fn new(inner: Arc<dyn RowConnector>, ttl: Duration) -> Self {
        CachedConnector {
            inner,
            ttl,
            slots: Mutex::new(Slots::default()),
        }
    }

    pub fn invalidate_scope(&self, scope: &SiteScope) {
        let mut slots = lock_or_recover(&self.slots);
        *slots.generations.entry(scope.clone()).or_insert(0) += 1;
        slots.entries.retain(|(_, s), _| s != scope);
    }

    /// Entries still within their TTL.
    pub fn fresh_entries(&self) -> usize {
        let now = Instant::now();
        lock_or_recover(&self.slots)
            .entries
            .values()
            .filter(|e| now.duration_since(e.stored_at) < self.ttl)
            .count()
    }

    /// Cached snapshots for `key`, or the scope's current generation on a miss.
    fn lookup(&self, key: &(InspectionType, SiteScope)) -> Result<Vec<EquipmentSnapshot>, u64> {
        let mut slots = lock_or_recover(&self.slots);
        let expired = match slots.entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => return Ok(entry.snapshots.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            slots.entries.remove(key);
        }
        Err(slots.generation(&key.1))
    }

    fn store(&self, key: (InspectionType, SiteScope), generation: u64, snapshots: Vec<EquipmentSnapshot>) {
        let mut slots = lock_or_recover(&self.slots);
        if slots.generation(&key.1) != generation {
            debug!(kind = %key.0, scope = %key.1, "scope invalidated during read, not caching");
            return;
        }
        slots.entries.insert(
            key,
            Entry {
                stored_at: Instant::now(),
                snapshots,
            },
        );
    }

    fn admin(&self) -> Result<&dyn CatalogAdmin, ConnectorError> {
        self.inner.catalog_admin().ok_or(ConnectorError::Unavailable)
    }
}

#[async_trait]
impl RowConnector for CachedConnector {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    async fn test_connection(&self) -> Result<ConnectionResult, ConnectorError> {
        self.inner.test_connection().await
    }

    async fn append_inspection_row(
        &self,
        record: &InspectionRecord,
        scope: &SiteScope,
    ) -> Result<RowAppendResult, ConnectorError> {
        let result = self.inner.append_inspection_row(record, scope).await?;
        self.invalidate_scope(scope);
        Ok(result)
    }

    async fn fetch_equipment_status(
        &self,
        kind: InspectionType,
        scope: &SiteScope,
    ) -> Result<Vec<EquipmentSnapshot>, ConnectorError> {
        let key = (kind, scope.clone());
        let generation = match self.lookup(&key) {
            Ok(hit) => {
                debug!(kind = %kind, scope = %scope, "equipment status cache hit");
                return Ok(hit);
            }
            Err(generation) => generation,
        };
        let snapshots = self.inner.fetch_equipment_status(kind, scope).await?;
        self.store(key, generation, snapshots.clone());
        Ok(snapshots)
    }

    fn catalog_admin(&self) -> Option<&dyn CatalogAdmin> {
        self.inner.catalog_admin().map(|_| self as &dyn CatalogAdmin)
    }
}

#[async_trait]
impl CatalogAdmin for CachedConnector {
    async fn add_equipment(
        &self,
        kind: InspectionType,
        scope: &SiteScope,
        name: &str,
    ) -> Result<(), ConnectorError> {
        self.admin()?.add_equipment(kind, scope, name).await?;
        self.invalidate_scope(scope);
        Ok(())
    }

    async fn delete_equipment(
        &self,
        kind: InspectionType,
        scope: &SiteScope,
        name: &str,
    ) -> Result<(), ConnectorError> {
        self.admin()?.delete_equipment(kind, scope, name).await?;
        self.invalidate_scope(scope);
        Ok(())
    }

    async fn add_inspection_item(&self, kind: InspectionType, item: &str) -> Result<(), ConnectorError> {
        self.admin()?.add_inspection_item(kind, item).await
    }

    async fn delete_inspection_item(&self, kind: InspectionType, item: &str) -> Result<(), ConnectorError> {
        self.admin()?.delete_inspection_item(kind, item).await
    }
}
