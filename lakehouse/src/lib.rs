pub mod models;
pub mod processor;
pub mod schema;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

use chrono::{NaiveDate, Utc};
use common::Result;
use common::config::Settings;
use models::RunContext;
use processor::DownstreamReader;
use serde_json::Value;
use services::{IngestionService, MaintenanceRunResult, MaintenanceService, RunReport};
use storage::{TableAddress, TableStore};

/// Runs one ingestion for `execution_date` (today when absent).
pub async fn run_ingestion(
    config_path: &str,
    execution_date: Option<NaiveDate>,
) -> Result<RunReport> {
    let settings = Settings::load(config_path)?;
    let service = IngestionService::from_settings(&settings)?;

    let run = match execution_date {
        Some(date) => RunContext::for_date(date),
        None => RunContext::now(),
    };
    service.run(run).await
}

/// One maintenance pass over every table of the configured stages.
pub async fn run_maintenance(
    config_path: &str,
    retention_days: Option<u32>,
) -> Result<MaintenanceRunResult> {
    let settings = Settings::load(config_path)?;
    let tables = TableStore::from_config(&settings.storage)?;

    let mut service = MaintenanceService::new(tables, &settings.maintenance);
    if let Some(days) = retention_days {
        service = service.with_retention_days(days);
    }
    service.run(Utc::now()).await
}

/// Close approaches committed by the run of `execution_date`, as JSON rows.
pub async fn run_show(config_path: &str, execution_date: NaiveDate) -> Result<Vec<Value>> {
    let settings = Settings::load(config_path)?;
    let tables = TableStore::from_config(&settings.storage)?;
    let address = TableAddress::new(
        &settings.pipeline.stage,
        &settings.source.name,
        &settings.pipeline.events_table,
    );

    let table = tables.open(address).await?;
    let batches = DownstreamReader::new()
        .read_run_batch(&table, execution_date)
        .await?;
    utils::arrow::batches_to_json(&batches)
}
