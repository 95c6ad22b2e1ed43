//! Metrics and tracing around any [`RowConnector`].

use super::{
    CatalogAdmin, ConnectionResult, ConnectionState, ConnectorError, EquipmentSnapshot,
    RowAppendResult, RowConnector,
};
use crate::inspection::{InspectionRecord, InspectionType, SiteScope};
use crate::prom_metrics::{ConnectorLabel, Metrics, OperationLabel};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub struct InstrumentedConnector {
    inner: Arc<dyn RowConnector>,
    metrics: Arc<Metrics>,
}

impl InstrumentedConnector {
    pub fn new(inner: Arc<dyn RowConnector>, metrics: Arc<Metrics>) -> Self {
        InstrumentedConnector { inner, metrics }
    }

    fn observe<T>(&self, operation: &'static str, started: Instant, outcome: &Result<T, ConnectorError>) {
        let elapsed = started.elapsed();
        let outcome_label = match outcome {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        self.metrics
            .connector_requests
            .get_or_create(&ConnectorLabel {
                connector: self.inner.name().to_string(),
                operation: operation.to_string(),
                outcome: outcome_label.to_string(),
            })
            .inc();
        self.metrics
            .connector_request_duration
            .get_or_create(&OperationLabel {
                operation: operation.to_string(),
            })
            .observe(elapsed.as_secs_f64());
        self.metrics.record_state(self.inner.state());

        match outcome {
            Ok(_) => debug!(
                connector = self.inner.name(),
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                "row-store call"
            ),
            Err(ConnectorError::Unavailable) => {}
            Err(e) => warn!(
                connector = self.inner.name(),
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "row-store call failed"
            ),
        }
    }
}

#[async_trait]
impl RowConnector for InstrumentedConnector {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    async fn test_connection(&self) -> Result<ConnectionResult, ConnectorError> {
        let started = Instant::now();
        let outcome = self.inner.test_connection().await;
        self.observe("test", started, &outcome);
        outcome
    }

    async fn append_inspection_row(
        &self,
        record: &InspectionRecord,
        scope: &SiteScope,
    ) -> Result<RowAppendResult, ConnectorError> {
        let started = Instant::now();
        let outcome = self.inner.append_inspection_row(record, scope).await;
        self.observe("append", started, &outcome);
        outcome
    }

    async fn fetch_equipment_status(
        &self,
        kind: InspectionType,
        scope: &SiteScope,
    ) -> Result<Vec<EquipmentSnapshot>, ConnectorError> {
        let started = Instant::now();
        let outcome = self.inner.fetch_equipment_status(kind, scope).await;
        self.observe("fetch", started, &outcome);
        outcome
    }

    fn catalog_admin(&self) -> Option<&dyn CatalogAdmin> {
        self.inner.catalog_admin()
    }
}
