use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use common::config::NEOWS_MAX_SPAN_DAYS;
use common::{Error, Result};
use serde::Serialize;
use std::fmt;

/// Inclusive date range requested from the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtractionWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl ExtractionWindow {
    /// The watermark value to persist once this window has been loaded.
    pub fn end_watermark(&self) -> DateTime<Utc> {
        self.end_date.and_time(NaiveTime::MIN).and_utc()
    }
}

impl fmt::Display for ExtractionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start_date, self.end_date)
    }
}

/// Plans the next window. The watermark day is requested again so rows from
/// a partially loaded previous window are picked up; the writer drops the
/// ones already committed.
pub fn plan_window(
    watermark: Option<DateTime<Utc>>,
    execution_date: NaiveDate,
    max_span_days: u32,
) -> Result<ExtractionWindow> {
    if max_span_days > NEOWS_MAX_SPAN_DAYS {
        return Err(Error::Config(format!(
            "max_span_days {} exceeds the feed ceiling of {} days",
            max_span_days, NEOWS_MAX_SPAN_DAYS
        )));
    }

    let start_date = watermark
        .map(|w| w.date_naive())
        .unwrap_or(execution_date);

    let end_date = start_date
        .checked_add_days(Days::new(u64::from(max_span_days)))
        .ok_or_else(|| Error::InvalidInput(format!("window end overflows after {}", start_date)))?;

    Ok(ExtractionWindow {
        start_date,
        end_date,
    })
}
