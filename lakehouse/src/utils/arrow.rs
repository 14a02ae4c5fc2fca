use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Float64Array, Int32Array, Int64Array,
    StringArray, TimestampMicrosecondArray, TimestampMillisecondArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use common::{Error, Result};
use serde_json::{Number, Value};

/// `NaiveDate::num_days_from_ce` of 1970-01-01, the Date32 origin.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub fn days_to_date(days: i32) -> Result<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
        .ok_or_else(|| Error::InvalidInput(format!("Date32 value {} out of range", days)))
}

pub fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| Error::InvalidInput(format!("Timestamp {}ms out of range", millis)))
}

pub fn micros_to_datetime(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| Error::InvalidInput(format!("Timestamp {}us out of range", micros)))
}

/// Reorders and casts a scanned batch to `schema`. Table scans put partition
/// columns last and may dictionary-encode them.
pub fn conform_batch(batch: &RecordBatch, schema: &SchemaRef) -> Result<RecordBatch> {
    let columns = schema
        .fields()
        .iter()
        .map(|field| {
            let array = batch
                .column_by_name(field.name())
                .ok_or_else(|| Error::SchemaMismatch(format!("Missing column {}", field.name())))?;
            if array.data_type() == field.data_type() {
                Ok(array.clone())
            } else {
                Ok(cast(array, field.data_type())?)
            }
        })
        .collect::<Result<Vec<ArrayRef>>>()?;

    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

/// Looks a column up by name and downcasts it to the expected array type.
pub fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    let array = batch
        .column_by_name(name)
        .ok_or_else(|| Error::SchemaMismatch(format!("Missing column {}", name)))?;

    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        Error::SchemaMismatch(format!(
            "Column {} has unexpected type {:?}",
            name,
            array.data_type()
        ))
    })
}

pub fn opt_string(array: &StringArray, row: usize) -> Option<String> {
    (!array.is_null(row)).then(|| array.value(row).to_string())
}

pub fn opt_f64(array: &Float64Array, row: usize) -> Option<f64> {
    (!array.is_null(row)).then(|| array.value(row))
}

pub fn batches_to_json(batches: &[RecordBatch]) -> Result<Vec<Value>> {
    let mut json_rows = Vec::new();

    for batch in batches {
        for row_idx in 0..batch.num_rows() {
            let mut row = serde_json::Map::new();

            for (col_idx, field) in batch.schema().fields().iter().enumerate() {
                let column = batch.column(col_idx);
                let value = arrow_array_to_json(column.as_ref(), row_idx)?;
                row.insert(field.name().clone(), value);
            }

            json_rows.push(Value::Object(row));
        }
    }

    Ok(json_rows)
}

fn downcast<T: Array + 'static>(array: &dyn Array) -> Result<&T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        Error::SchemaMismatch(format!("Unexpected array type {:?}", array.data_type()))
    })
}

pub fn arrow_array_to_json(array: &dyn Array, index: usize) -> Result<Value> {
    if array.is_null(index) {
        return Ok(Value::Null);
    }

    Ok(match array.data_type() {
        DataType::Int32 => Value::Number(Number::from(downcast::<Int32Array>(array)?.value(index))),
        DataType::Int64 => Value::Number(Number::from(downcast::<Int64Array>(array)?.value(index))),
        DataType::Float64 => Number::from_f64(downcast::<Float64Array>(array)?.value(index))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        DataType::Boolean => Value::Bool(downcast::<BooleanArray>(array)?.value(index)),
        DataType::Utf8 => Value::String(downcast::<StringArray>(array)?.value(index).to_string()),
        DataType::Date32 => {
            let days = downcast::<Date32Array>(array)?.value(index);
            Value::String(days_to_date(days)?.format("%Y-%m-%d").to_string())
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            let millis = downcast::<TimestampMillisecondArray>(array)?.value(index);
            Value::String(millis_to_datetime(millis)?.to_rfc3339())
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let micros = downcast::<TimestampMicrosecondArray>(array)?.value(index);
            Value::String(micros_to_datetime(micros)?.to_rfc3339())
        }
        _ => Value::Null,
    })
}
