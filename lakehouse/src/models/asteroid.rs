use crate::schema::{self, NeoSchemaVersion};
use crate::utils::arrow::{column, date_to_days, days_to_date, opt_f64, opt_string};
use arrow::array::{ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use common::{Error, Result};
use etl::models::RawAsteroid;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct AsteroidDescriptor {
    pub neo_reference_id: String,
    pub name: Option<String>,
    pub nasa_jpl_url: Option<String>,
    pub absolute_magnitude_h: Option<f64>,
    pub estimated_diameter_min_km: Option<f64>,
    pub estimated_diameter_max_km: Option<f64>,
    pub is_potentially_hazardous_asteroid: bool,
    pub is_sentry_object: bool,
    pub approaches_to_earth: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDescriptor {
    pub descriptor: AsteroidDescriptor,
    pub extraction_date: NaiveDate,
}

impl From<RawAsteroid> for AsteroidDescriptor {
    fn from(raw: RawAsteroid) -> Self {
        Self {
            neo_reference_id: raw.neo_reference_id,
            name: raw.name,
            nasa_jpl_url: raw.nasa_jpl_url,
            absolute_magnitude_h: raw.absolute_magnitude_h,
            estimated_diameter_min_km: raw.estimated_diameter_min_km,
            estimated_diameter_max_km: raw.estimated_diameter_max_km,
            is_potentially_hazardous_asteroid: raw.is_potentially_hazardous_asteroid,
            is_sentry_object: raw.is_sentry_object,
            approaches_to_earth: raw.approaches_to_earth,
        }
    }
}

impl AsteroidDescriptor {
    /// Row-level checks the catalog merge runs before touching storage.
    pub fn validate(&self) -> Result<()> {
        let id = &self.neo_reference_id;
        if id.trim().is_empty() {
            return Err(Error::MergeAbort("descriptor without neo_reference_id".into()));
        }

        for (field, value) in [
            ("absolute_magnitude_h", self.absolute_magnitude_h),
            ("estimated_diameter_min_km", self.estimated_diameter_min_km),
            ("estimated_diameter_max_km", self.estimated_diameter_max_km),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(Error::MergeAbort(format!(
                    "{}: {} is not a finite number",
                    id, field
                )));
            }
        }

        if let (Some(min), Some(max)) = (self.estimated_diameter_min_km, self.estimated_diameter_max_km) {
            if min < 0.0 || min > max {
                return Err(Error::MergeAbort(format!(
                    "{}: invalid diameter bounds [{}, {}]",
                    id, min, max
                )));
            }
        }

        if self.approaches_to_earth < 0 {
            return Err(Error::MergeAbort(format!(
                "{}: negative approaches_to_earth",
                id
            )));
        }

        Ok(())
    }
}

pub fn descriptors_to_batch(
    rows: &[&AsteroidDescriptor],
    extraction_date: NaiveDate,
) -> Result<RecordBatch> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.neo_reference_id.as_str()),
        )),
        Arc::new(StringArray::from_iter(rows.iter().map(|r| r.name.as_deref()))),
        Arc::new(StringArray::from_iter(
            rows.iter().map(|r| r.nasa_jpl_url.as_deref()),
        )),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.absolute_magnitude_h))),
        Arc::new(Float64Array::from_iter(
            rows.iter().map(|r| r.estimated_diameter_min_km),
        )),
        Arc::new(Float64Array::from_iter(
            rows.iter().map(|r| r.estimated_diameter_max_km),
        )),
        Arc::new(BooleanArray::from(
            rows.iter()
                .map(|r| r.is_potentially_hazardous_asteroid)
                .collect::<Vec<bool>>(),
        )),
        Arc::new(BooleanArray::from(
            rows.iter().map(|r| r.is_sentry_object).collect::<Vec<bool>>(),
        )),
        Arc::new(Int64Array::from_iter_values(
            rows.iter().map(|r| r.approaches_to_earth),
        )),
        Arc::new(Date32Array::from(vec![date_to_days(extraction_date); rows.len()])),
    ];

    Ok(RecordBatch::try_new(
        schema::get_neo_schema(NeoSchemaVersion::Asteroid),
        columns,
    )?)
}

pub fn batch_to_descriptors(batch: &RecordBatch) -> Result<Vec<StoredDescriptor>> {
    let ids = column::<StringArray>(batch, schema::NEO_REFERENCE_ID)?;
    let names = column::<StringArray>(batch, "name")?;
    let urls = column::<StringArray>(batch, "nasa_jpl_url")?;
    let magnitudes = column::<Float64Array>(batch, "absolute_magnitude_h")?;
    let min_km = column::<Float64Array>(batch, "estimated_diameter_min_km")?;
    let max_km = column::<Float64Array>(batch, "estimated_diameter_max_km")?;
    let hazardous = column::<BooleanArray>(batch, "is_potentially_hazardous_asteroid")?;
    let sentry = column::<BooleanArray>(batch, "is_sentry_object")?;
    let approaches = column::<Int64Array>(batch, "approaches_to_earth")?;
    let extraction = column::<Date32Array>(batch, schema::EXTRACTION_DATE)?;

    (0..batch.num_rows())
        .map(|row| {
            Ok(StoredDescriptor {
                descriptor: AsteroidDescriptor {
                    neo_reference_id: ids.value(row).to_string(),
                    name: opt_string(names, row),
                    nasa_jpl_url: opt_string(urls, row),
                    absolute_magnitude_h: opt_f64(magnitudes, row),
                    estimated_diameter_min_km: opt_f64(min_km, row),
                    estimated_diameter_max_km: opt_f64(max_km, row),
                    is_potentially_hazardous_asteroid: hazardous.value(row),
                    is_sentry_object: sentry.value(row),
                    approaches_to_earth: approaches.value(row),
                },
                extraction_date: days_to_date(extraction.value(row))?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(min: f64, max: f64) -> AsteroidDescriptor {
        AsteroidDescriptor {
            neo_reference_id: "2000433".to_string(),
            name: Some("433 Eros (A898 PA)".to_string()),
            nasa_jpl_url: None,
            absolute_magnitude_h: Some(10.38),
            estimated_diameter_min_km: Some(min),
            estimated_diameter_max_km: Some(max),
            is_potentially_hazardous_asteroid: false,
            is_sentry_object: false,
            approaches_to_earth: 3,
        }
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        assert!(descriptor(0.4, 0.6).validate().is_ok());
        assert!(matches!(
            descriptor(0.6, 0.4).validate(),
            Err(Error::MergeAbort(_))
        ));
    }

    #[test]
    fn test_validate_rejects_non_finite_and_empty_id() {
        assert!(descriptor(f64::NAN, 0.4).validate().is_err());

        let mut anonymous = descriptor(0.4, 0.6);
        anonymous.neo_reference_id = " ".to_string();
        assert!(matches!(anonymous.validate(), Err(Error::MergeAbort(_))));
    }

    #[test]
    fn test_batch_round_trip_keeps_nulls() {
        let row = descriptor(0.4, 0.6);
        let date = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();

        let batch = descriptors_to_batch(&[&row], date).unwrap();
        let stored = batch_to_descriptors(&batch).unwrap();

        assert_eq!(stored, vec![StoredDescriptor { descriptor: row, extraction_date: date }]);
    }
}
