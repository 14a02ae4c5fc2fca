use crate::processor::partition::{PartitionKey, derive_partition};
use crate::schema::{self, NeoSchemaVersion, TIMESTAMP_TZ};
use crate::utils::arrow::{
    column, date_to_days, days_to_date, micros_to_datetime, millis_to_datetime, opt_f64,
    opt_string,
};
use arrow::array::{
    ArrayRef, Date32Array, Float64Array, Int32Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, Utc};
use common::{Error, Result};
use etl::models::RawCloseApproach;
use std::sync::Arc;

/// Epoch values at or above this magnitude are milliseconds, below it seconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// (`neo_reference_id`, `approach_datetime` in epoch milliseconds).
pub type DedupKey = (String, i64);

#[derive(Debug, Clone, PartialEq)]
pub struct CloseApproachEvent {
    pub neo_reference_id: String,
    pub approach_datetime: DateTime<Utc>,
    pub epoch_date_close_approach: i64,
    pub close_approach_date: Option<String>,
    pub relative_velocity_kps: Option<f64>,
    pub relative_velocity_kph: Option<f64>,
    pub miss_distance_astronomical: Option<f64>,
    pub miss_distance_lunar: Option<f64>,
    pub miss_distance_km: Option<f64>,
    pub orbiting_body: Option<String>,
}

/// An event as committed, with the columns the writer stamps on it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub event: CloseApproachEvent,
    pub partition: PartitionKey,
    pub extraction_date: NaiveDate,
}

/// Casts a Unix epoch in seconds or milliseconds to a UTC timestamp.
pub fn epoch_to_datetime(epoch: i64) -> Result<DateTime<Utc>> {
    let millis = if epoch.abs() >= EPOCH_MILLIS_THRESHOLD {
        epoch
    } else {
        epoch
            .checked_mul(1000)
            .ok_or_else(|| Error::InvalidInput(format!("Epoch {} out of range", epoch)))?
    };
    millis_to_datetime(millis)
}

fn parse_number(field: &str, value: Option<&str>) -> Result<Option<f64>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text
            .parse::<f64>()
            .map(Some)
            .map_err(|e| Error::InvalidInput(format!("{} = {:?}: {}", field, text, e))),
    }
}

impl CloseApproachEvent {
    pub fn try_from_raw(raw: &RawCloseApproach) -> Result<Self> {
        if raw.neo_reference_id.trim().is_empty() {
            return Err(Error::InvalidInput(
                "close approach without neo_reference_id".to_string(),
            ));
        }

        Ok(Self {
            neo_reference_id: raw.neo_reference_id.clone(),
            approach_datetime: epoch_to_datetime(raw.epoch_date_close_approach)?,
            epoch_date_close_approach: raw.epoch_date_close_approach,
            close_approach_date: raw.close_approach_date.clone(),
            relative_velocity_kps: parse_number(
                "relative_velocity_kps",
                raw.relative_velocity_kps.as_deref(),
            )?,
            relative_velocity_kph: parse_number(
                "relative_velocity_kph",
                raw.relative_velocity_kph.as_deref(),
            )?,
            miss_distance_astronomical: parse_number(
                "miss_distance_astronomical",
                raw.miss_distance_astronomical.as_deref(),
            )?,
            miss_distance_lunar: parse_number(
                "miss_distance_lunar",
                raw.miss_distance_lunar.as_deref(),
            )?,
            miss_distance_km: parse_number("miss_distance_km", raw.miss_distance_km.as_deref())?,
            orbiting_body: raw.orbiting_body.clone(),
        })
    }

    pub fn dedup_key(&self) -> DedupKey {
        (
            self.neo_reference_id.clone(),
            self.approach_datetime.timestamp_millis(),
        )
    }
}

/// Encodes events, stamping each row's partition columns and the run's
/// extraction date.
pub fn events_to_batch(
    rows: &[&CloseApproachEvent],
    extraction_date: NaiveDate,
) -> Result<RecordBatch> {
    let partitions: Vec<PartitionKey> = rows
        .iter()
        .map(|r| derive_partition(r.approach_datetime))
        .collect();
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.neo_reference_id.as_str()),
        )),
        Arc::new(
            TimestampMicrosecondArray::from_iter_values(
                rows.iter().map(|r| r.approach_datetime.timestamp_micros()),
            )
            .with_timezone(TIMESTAMP_TZ),
        ),
        Arc::new(Int64Array::from_iter_values(
            rows.iter().map(|r| r.epoch_date_close_approach),
        )),
        Arc::new(StringArray::from_iter(
            rows.iter().map(|r| r.close_approach_date.as_deref()),
        )),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.relative_velocity_kps))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.relative_velocity_kph))),
        Arc::new(Float64Array::from_iter(
            rows.iter().map(|r| r.miss_distance_astronomical),
        )),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.miss_distance_lunar))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.miss_distance_km))),
        Arc::new(StringArray::from_iter(
            rows.iter().map(|r| r.orbiting_body.as_deref()),
        )),
        Arc::new(Int32Array::from_iter_values(partitions.iter().map(|p| p.year))),
        Arc::new(Int32Array::from_iter_values(
            partitions.iter().map(|p| p.month as i32),
        )),
        Arc::new(Int32Array::from_iter_values(
            partitions.iter().map(|p| p.week as i32),
        )),
        Arc::new(Date32Array::from(vec![date_to_days(extraction_date); rows.len()])),
    ];

    Ok(RecordBatch::try_new(
        schema::get_neo_schema(NeoSchemaVersion::CloseApproach),
        columns,
    )?)
}

pub fn batch_to_events(batch: &RecordBatch) -> Result<Vec<StoredEvent>> {
    let ids = column::<StringArray>(batch, schema::NEO_REFERENCE_ID)?;
    let times = column::<TimestampMicrosecondArray>(batch, schema::APPROACH_DATETIME)?;
    let epochs = column::<Int64Array>(batch, "epoch_date_close_approach")?;
    let dates = column::<StringArray>(batch, "close_approach_date")?;
    let kps = column::<Float64Array>(batch, "relative_velocity_kps")?;
    let kph = column::<Float64Array>(batch, "relative_velocity_kph")?;
    let au = column::<Float64Array>(batch, "miss_distance_astronomical")?;
    let lunar = column::<Float64Array>(batch, "miss_distance_lunar")?;
    let km = column::<Float64Array>(batch, "miss_distance_km")?;
    let bodies = column::<StringArray>(batch, "orbiting_body")?;
    let years = column::<Int32Array>(batch, "year")?;
    let months = column::<Int32Array>(batch, "month")?;
    let weeks = column::<Int32Array>(batch, "week")?;
    let extraction = column::<Date32Array>(batch, schema::EXTRACTION_DATE)?;

    (0..batch.num_rows())
        .map(|row| {
            Ok(StoredEvent {
                event: CloseApproachEvent {
                    neo_reference_id: ids.value(row).to_string(),
                    approach_datetime: micros_to_datetime(times.value(row))?,
                    epoch_date_close_approach: epochs.value(row),
                    close_approach_date: opt_string(dates, row),
                    relative_velocity_kps: opt_f64(kps, row),
                    relative_velocity_kph: opt_f64(kph, row),
                    miss_distance_astronomical: opt_f64(au, row),
                    miss_distance_lunar: opt_f64(lunar, row),
                    miss_distance_km: opt_f64(km, row),
                    orbiting_body: opt_string(bodies, row),
                },
                partition: PartitionKey {
                    year: years.value(row),
                    month: months.value(row) as u32,
                    week: weeks.value(row) as u32,
                },
                extraction_date: days_to_date(extraction.value(row))?,
            })
        })
        .collect()
}
