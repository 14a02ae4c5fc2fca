use crate::models::{AsteroidDescriptor, CloseApproachEvent, RunContext};
use crate::processor::{
    ExtractionWindow, UpsertReport, WriteReport, plan_window, upsert_catalog, write_events,
};
use crate::schema::{EVENT_PARTITION_COLUMNS, NeoSchemaVersion, get_neo_schema};
use crate::state::{ObjectWatermarkStore, WatermarkStore};
use crate::storage::{TableAddress, TableStore};
use chrono::{DateTime, Utc};
use common::Result;
use common::config::Settings;
use etl::{ExtractionReport, ItemFailure, NeoSource, NeoWsClient, extract_window};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Summary of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub window: ExtractionWindow,
    pub extraction: ExtractionReport,
    pub catalog: UpsertReport,
    pub events: WriteReport,
    pub watermark: DateTime<Utc>,
}

pub struct IngestionService {
    source: Arc<dyn NeoSource>,
    watermarks: Arc<dyn WatermarkStore>,
    tables: TableStore,
    source_name: String,
    max_span_days: u32,
    concurrency: usize,
    events_table: TableAddress,
    catalog_table: TableAddress,
}

impl IngestionService {
    pub fn new(
        settings: &Settings,
        source: Arc<dyn NeoSource>,
        watermarks: Arc<dyn WatermarkStore>,
        tables: TableStore,
    ) -> Self {
        let pipeline = &settings.pipeline;
        let source_name = settings.source.name.clone();
        Self {
            source,
            watermarks,
            tables,
            events_table: TableAddress::new(&pipeline.stage, &source_name, &pipeline.events_table),
            catalog_table: TableAddress::new(
                &pipeline.stage,
                &source_name,
                &pipeline.catalog_table,
            ),
            source_name,
            max_span_days: settings.source.max_span_days,
            concurrency: settings.source.concurrency,
        }
    }

    /// Wires the NeoWs client and the configured object store. Ingestion
    /// is the only command that needs an API key.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.source.require_api_key()?;
        let tables = TableStore::from_config(&settings.storage)?;
        let source = Arc::new(NeoWsClient::new(&settings.source)?);
        let watermarks = Arc::new(ObjectWatermarkStore::new(tables.object_store()));
        Ok(Self::new(settings, source, watermarks, tables))
    }

    pub fn events_table(&self) -> &TableAddress {
        &self.events_table
    }

    pub fn catalog_table(&self) -> &TableAddress {
        &self.catalog_table
    }

    /// Extracts the next window and loads it. The catalog is merged first,
    /// then the events appended; the watermark moves only after both
    /// commits succeeded, so any failure replays the same window next time.
    #[tracing::instrument(skip(self), fields(execution_date = %run.execution_date))]
    pub async fn run(&self, run: RunContext) -> Result<RunReport> {
        let watermark = self
            .watermarks
            .read(&self.source_name, &self.events_table.table)
            .await?;
        let window = plan_window(watermark, run.execution_date, self.max_span_days)?;
        info!("Planned window {} from watermark {:?}", window, watermark);

        let batch = extract_window(
            self.source.as_ref(),
            window.start_date,
            window.end_date,
            self.concurrency,
        )
        .await?;
        let mut extraction = batch.report;

        let mut events = Vec::with_capacity(batch.events.len());
        for raw in &batch.events {
            match CloseApproachEvent::try_from_raw(raw) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!("Skipping close approach of {}: {}", raw.neo_reference_id, e);
                    extraction.failures.push(ItemFailure {
                        id: raw.neo_reference_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        let descriptors: Vec<AsteroidDescriptor> = batch
            .asteroids
            .into_iter()
            .map(AsteroidDescriptor::from)
            .collect();

        let mut catalog = self
            .tables
            .open_or_create(
                self.catalog_table.clone(),
                get_neo_schema(NeoSchemaVersion::Asteroid),
                &[],
            )
            .await?;
        let catalog_report = upsert_catalog(&mut catalog, &descriptors, &run).await?;

        let mut event_table = self
            .tables
            .open_or_create(
                self.events_table.clone(),
                get_neo_schema(NeoSchemaVersion::CloseApproach),
                &EVENT_PARTITION_COLUMNS,
            )
            .await?;
        let events_report = write_events(&mut event_table, &events, &run).await?;

        let watermark = self
            .watermarks
            .advance(
                &self.source_name,
                &self.events_table.table,
                window.end_watermark(),
            )
            .await?;

        info!(
            "Run complete: {} events written, {} deduplicated, {} catalog rows updated, {} inserted",
            events_report.written,
            events_report.deduplicated,
            catalog_report.updated,
            catalog_report.inserted
        );

        Ok(RunReport {
            window,
            extraction,
            catalog: catalog_report,
            events: events_report,
            watermark,
        })
    }
}
