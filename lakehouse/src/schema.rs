use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use lazy_static::lazy_static;
use std::sync::Arc;

pub const NEO_REFERENCE_ID: &str = "neo_reference_id";
pub const APPROACH_DATETIME: &str = "approach_datetime";
pub const EXTRACTION_DATE: &str = "extraction_date";

/// Delta `timestamp` columns surface as UTC microseconds.
pub const TIMESTAMP_TZ: &str = "UTC";

/// Partition columns of the close-approach table, in directory order.
pub const EVENT_PARTITION_COLUMNS: [&str; 3] = ["year", "month", "week"];

pub fn close_approach_schema() -> Schema {
    Schema::new(vec![
        Field::new(NEO_REFERENCE_ID, DataType::Utf8, false),
        Field::new(
            APPROACH_DATETIME,
            DataType::Timestamp(TimeUnit::Microsecond, Some(TIMESTAMP_TZ.into())),
            false,
        ),
        Field::new("epoch_date_close_approach", DataType::Int64, false),
        Field::new("close_approach_date", DataType::Utf8, true),
        Field::new("relative_velocity_kps", DataType::Float64, true),
        Field::new("relative_velocity_kph", DataType::Float64, true),
        Field::new("miss_distance_astronomical", DataType::Float64, true),
        Field::new("miss_distance_lunar", DataType::Float64, true),
        Field::new("miss_distance_km", DataType::Float64, true),
        Field::new("orbiting_body", DataType::Utf8, true),
        Field::new("year", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
        Field::new("week", DataType::Int32, false),
        Field::new(EXTRACTION_DATE, DataType::Date32, false),
    ])
}

pub fn asteroid_schema() -> Schema {
    Schema::new(vec![
        Field::new(NEO_REFERENCE_ID, DataType::Utf8, false),
        Field::new("name", DataType::Utf8, true),
        Field::new("nasa_jpl_url", DataType::Utf8, true),
        Field::new("absolute_magnitude_h", DataType::Float64, true),
        Field::new("estimated_diameter_min_km", DataType::Float64, true),
        Field::new("estimated_diameter_max_km", DataType::Float64, true),
        Field::new("is_potentially_hazardous_asteroid", DataType::Boolean, false),
        Field::new("is_sentry_object", DataType::Boolean, false),
        Field::new("approaches_to_earth", DataType::Int64, false),
        Field::new(EXTRACTION_DATE, DataType::Date32, false),
    ])
}

pub enum NeoSchemaVersion {
    CloseApproach,
    Asteroid,
}

pub fn get_neo_schema(version: NeoSchemaVersion) -> SchemaRef {
    match version {
        NeoSchemaVersion::CloseApproach => CLOSE_APPROACH_SCHEMA.clone(),
        NeoSchemaVersion::Asteroid => ASTEROID_SCHEMA.clone(),
    }
}

// Lazy-loaded static schemas
lazy_static! {
    static ref CLOSE_APPROACH_SCHEMA: SchemaRef = Arc::new(close_approach_schema());
    static ref ASTEROID_SCHEMA: SchemaRef = Arc::new(asteroid_schema());
}
