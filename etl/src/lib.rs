pub mod client;
pub mod extract;
pub mod models;
pub mod source;
pub mod utils;

pub use client::NeoWsClient;
pub use extract::{ExtractionBatch, ExtractionReport, ItemFailure, extract_window};
pub use source::NeoSource;

use chrono::NaiveDate;
use common::config::Settings;
use common::{Error, Result};

/// Extracts one window straight from the configured source, without loading.
pub async fn run_extraction(
    config_path: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<ExtractionBatch> {
    let settings = Settings::load(config_path)?;
    settings.source.require_api_key()?;

    if end_date < start_date {
        return Err(Error::InvalidInput(format!(
            "end date {} is before start date {}",
            end_date, start_date
        )));
    }
    let span = (end_date - start_date).num_days();
    if span > i64::from(settings.source.max_span_days) {
        return Err(Error::Config(format!(
            "window of {} days exceeds source.max_span_days = {}",
            span, settings.source.max_span_days
        )));
    }

    let client = NeoWsClient::new(&settings.source)?;
    extract_window(&client, start_date, end_date, settings.source.concurrency).await
}
