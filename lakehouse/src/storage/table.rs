use super::{TableAddress, delta_error};
use crate::utils::arrow::conform_batch;
use arrow::datatypes::{DataType, Field, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Duration, Utc};
use common::{Error, Result};
use datafusion::datasource::TableProvider;
use datafusion::logical_expr::Expr;
use datafusion::prelude::SessionContext;
use deltalake::kernel::{DataType as DeltaDataType, PrimitiveType, StructField};
use deltalake::operations::optimize::{Metrics, OptimizeType};
use deltalake::operations::vacuum::Clock;
use deltalake::{DeltaOps, DeltaTable};
use object_store::path::Path;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Aliases the merge predicates refer to.
pub const SOURCE_ALIAS: &str = "source";
pub const TARGET_ALIAS: &str = "target";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub inserted: usize,
    pub updated: usize,
    /// `None` when the merge changed nothing and committed nothing.
    pub version: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RewriteReport {
    pub partitions: usize,
    pub files_removed: usize,
    pub files_added: usize,
    /// Version of the rewrite commit, `None` when nothing was rewritten.
    pub version: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VacuumReport {
    pub files_deleted: usize,
    pub version: Option<u64>,
}

/// Vacuum cutoffs are computed against the caller's clock, not the host's.
#[derive(Debug)]
struct FixedClock(i64);

impl Clock for FixedClock {
    fn current_timestamp_millis(&self) -> i64 {
        self.0
    }
}

fn is_maintenance(operation: Option<&str>) -> bool {
    operation.is_some_and(|op| op.starts_with("OPTIMIZE") || op.starts_with("VACUUM"))
}

fn millis(timestamp: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(timestamp)
}

/// Arrow schema of a loaded table as its scans produce it.
pub(crate) fn provider_schema(table: &DeltaTable) -> SchemaRef {
    TableProvider::schema(table)
}

/// Delta column definitions for the arrow types the lakehouse writes.
pub(crate) fn delta_columns(schema: &SchemaRef) -> Result<Vec<StructField>> {
    schema.fields().iter().map(|f| delta_field(f)).collect()
}

fn delta_field(field: &Field) -> Result<StructField> {
    let primitive = match field.data_type() {
        DataType::Utf8 => PrimitiveType::String,
        DataType::Int64 => PrimitiveType::Long,
        DataType::Int32 => PrimitiveType::Integer,
        DataType::Float64 => PrimitiveType::Double,
        DataType::Boolean => PrimitiveType::Boolean,
        DataType::Date32 => PrimitiveType::Date,
        DataType::Timestamp(TimeUnit::Microsecond, Some(_)) => PrimitiveType::Timestamp,
        other => {
            return Err(Error::SchemaMismatch(format!(
                "Column {} has no Delta mapping for {:?}",
                field.name(),
                other
            )));
        }
    };
    Ok(StructField::new(
        field.name().clone(),
        DeltaDataType::Primitive(primitive),
        field.is_nullable(),
    ))
}

/// A Delta table plus the arrow schema its rows are read back as.
pub struct VersionedTable {
    address: TableAddress,
    table: DeltaTable,
    schema: SchemaRef,
}

impl VersionedTable {
    pub(crate) fn new(address: TableAddress, table: DeltaTable, schema: SchemaRef) -> Self {
        Self {
            address,
            table,
            schema,
        }
    }

    pub fn address(&self) -> &TableAddress {
        &self.address
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn version(&self) -> Option<u64> {
        u64::try_from(self.table.version()).ok()
    }

    pub fn partition_columns(&self) -> Result<Vec<String>> {
        Ok(self.table.metadata()?.partition_columns.clone())
    }

    pub fn file_count(&self) -> usize {
        self.table.get_files_count()
    }

    pub fn has_column(&self, name: &str) -> bool {
        provider_schema(&self.table).column_with_name(name).is_some()
    }

    /// Picks up commits made through other handles.
    pub async fn refresh(&mut self) -> Result<()> {
        self.table
            .update()
            .await
            .map_err(|e| delta_error(&self.address, e))
    }

    pub(crate) fn provider(&self) -> Arc<dyn TableProvider> {
        Arc::new(self.table.clone())
    }

    fn version_since(&self, before: i64) -> Option<u64> {
        let after = self.table.version();
        (after != before).then(|| u64::try_from(after).ok()).flatten()
    }

    pub async fn scan(&self) -> Result<Vec<RecordBatch>> {
        self.scan_filtered(None).await
    }

    /// Reads the rows matching `filter`. File statistics and partition
    /// values prune what is read.
    pub async fn scan_filtered(&self, filter: Option<Expr>) -> Result<Vec<RecordBatch>> {
        let ctx = SessionContext::new();
        let mut frame = ctx.read_table(self.provider())?;
        if let Some(filter) = filter {
            frame = frame.filter(filter)?;
        }

        frame
            .collect()
            .await?
            .iter()
            .filter(|b| b.num_rows() > 0)
            .map(|b| conform_batch(b, &self.schema))
            .collect()
    }

    /// Merges `source` into the table in one commit. Rows matching
    /// `predicate` are overwritten when `update_matched` is set; the rest are
    /// inserted. Every column of `source` is written.
    pub async fn merge(
        &mut self,
        source: RecordBatch,
        predicate: &str,
        update_matched: bool,
    ) -> Result<MergeSummary> {
        if source.num_rows() == 0 {
            return Ok(MergeSummary::default());
        }

        let columns: Vec<String> = source
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        let source_value = |column: &String| format!("{}.{}", SOURCE_ALIAS, column);
        let frame = SessionContext::new().read_batch(source)?;
        let before = self.table.version();

        let mut builder = DeltaOps(self.table.clone())
            .merge(frame, predicate.to_string())
            .with_source_alias(SOURCE_ALIAS)
            .with_target_alias(TARGET_ALIAS);
        if update_matched {
            builder = builder.when_matched_update(|update| {
                columns
                    .iter()
                    .fold(update, |u, c| u.update(c.as_str(), source_value(c)))
            })?;
        }
        builder = builder.when_not_matched_insert(|insert| {
            columns
                .iter()
                .fold(insert, |i, c| i.set(c.as_str(), source_value(c)))
        })?;

        let (table, metrics) = builder.await.map_err(|e| delta_error(&self.address, e))?;
        self.table = table;

        let summary = MergeSummary {
            inserted: metrics.num_target_rows_inserted,
            updated: metrics.num_target_rows_updated,
            version: self.version_since(before),
        };
        debug!("Merged into {}: {:?}", self.address, summary);
        Ok(summary)
    }

    /// Age anchor for maintenance: the oldest of
    /// - superseded commits made since the last optimize or vacuum, and
    /// - removed files that are still on storage.
    ///
    /// `None` when the table holds nothing to reclaim.
    pub async fn oldest_reclaimable(&self) -> Result<Option<DateTime<Utc>>> {
        let mut history: Vec<_> = self
            .table
            .history(None)
            .await
            .map_err(|e| delta_error(&self.address, e))?
            .into_iter()
            .collect();
        // Newest first; the sort is stable for equal timestamps.
        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let superseded = history
            .iter()
            .take_while(|c| !is_maintenance(c.operation.as_deref()))
            .filter_map(|c| c.timestamp)
            .skip(1)
            .min();

        let store = self.table.object_store();
        let mut tombstoned: Option<i64> = None;
        let tombstones = self
            .table
            .snapshot()?
            .all_tombstones(store.clone())
            .await?;
        for remove in tombstones {
            let Some(deleted_at) = remove.deletion_timestamp else {
                continue;
            };
            match store.head(&Path::from(remove.path.as_str())).await {
                Ok(_) => tombstoned = Some(tombstoned.map_or(deleted_at, |t| t.min(deleted_at))),
                Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(superseded.into_iter().chain(tombstoned).min().and_then(millis))
    }

    fn rewrite_report(&self, metrics: &Metrics, before: i64) -> RewriteReport {
        RewriteReport {
            partitions: metrics.partitions_optimized as usize,
            files_removed: metrics.num_files_removed as usize,
            files_added: metrics.num_files_added as usize,
            version: self.version_since(before),
        }
    }

    /// Z-orders every partition by `column`. A table without the column is
    /// left alone.
    pub async fn zorder(&mut self, column: &str) -> Result<RewriteReport> {
        if !self.has_column(column) {
            debug!("{} has no column {}, skipping z-order", self.address, column);
            return Ok(RewriteReport::default());
        }

        let before = self.table.version();
        let (table, metrics) = DeltaOps(self.table.clone())
            .optimize()
            .with_type(OptimizeType::ZOrder(vec![column.to_string()]))
            .await
            .map_err(|e| delta_error(&self.address, e))?;
        self.table = table;

        let report = self.rewrite_report(&metrics, before);
        info!(
            "Z-ordered {} by {}: {} files -> {}",
            self.address, column, report.files_removed, report.files_added
        );
        Ok(report)
    }

    /// Bin-packs files smaller than `target_size` bytes, per partition.
    pub async fn compact(&mut self, target_size: u64) -> Result<RewriteReport> {
        let before = self.table.version();
        let (table, metrics) = DeltaOps(self.table.clone())
            .optimize()
            .with_type(OptimizeType::Compact)
            .with_target_size(i64::try_from(target_size).unwrap_or(i64::MAX))
            .await
            .map_err(|e| delta_error(&self.address, e))?;
        self.table = table;

        let report = self.rewrite_report(&metrics, before);
        info!(
            "Compacted {}: {} files -> {}",
            self.address, report.files_removed, report.files_added
        );
        Ok(report)
    }

    /// Deletes files removed more than `retention` before `now`.
    pub async fn vacuum(&mut self, retention: Duration, now: DateTime<Utc>) -> Result<VacuumReport> {
        let before = self.table.version();
        let (table, metrics) = DeltaOps(self.table.clone())
            .vacuum()
            .with_retention_period(retention)
            .with_enforce_retention_duration(false)
            .with_clock(Arc::new(FixedClock(now.timestamp_millis())))
            .await
            .map_err(|e| delta_error(&self.address, e))?;
        self.table = table;

        let report = VacuumReport {
            files_deleted: metrics.files_deleted.len(),
            version: self.version_since(before),
        };
        info!("Vacuumed {}: {} files deleted", self.address, report.files_deleted);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::{batch_to_events, events_to_batch};
    use crate::models::CloseApproachEvent;
    use crate::schema::{get_neo_schema, NeoSchemaVersion, EVENT_PARTITION_COLUMNS, EXTRACTION_DATE};
    use crate::storage::TableStore;
    use crate::utils::arrow::date_to_days;
    use chrono::{NaiveDate, TimeZone};
    use datafusion::prelude::{col, lit};
    use datafusion::scalar::ScalarValue;
    use object_store::memory::InMemory;

    fn event(id: &str, day: u32) -> CloseApproachEvent {
        let approach_datetime = Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap();
        CloseApproachEvent {
            neo_reference_id: id.to_string(),
            approach_datetime,
            epoch_date_close_approach: approach_datetime.timestamp_millis(),
            close_approach_date: None,
            relative_velocity_kps: Some(5.0),
            relative_velocity_kph: None,
            miss_distance_astronomical: None,
            miss_distance_lunar: None,
            miss_distance_km: Some(1.0e7),
            orbiting_body: Some("Earth".to_string()),
        }
    }

    async fn open(tables: &TableStore) -> VersionedTable {
        tables
            .open_or_create(
                TableAddress::new("bronze", "neo", "close_approach_data"),
                get_neo_schema(NeoSchemaVersion::CloseApproach),
                &EVENT_PARTITION_COLUMNS,
            )
            .await
            .unwrap()
    }

    const KEY_PREDICATE: &str =
        "target.neo_reference_id = source.neo_reference_id AND target.approach_datetime = source.approach_datetime";

    #[test]
    fn test_delta_columns_cover_both_schemas() {
        for version in [NeoSchemaVersion::CloseApproach, NeoSchemaVersion::Asteroid] {
            let schema = get_neo_schema(version);
            assert_eq!(delta_columns(&schema).unwrap().len(), schema.fields().len());
        }

        let naive = Arc::new(arrow::datatypes::Schema::new(vec![Field::new(
            "ts",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        )]));
        assert!(matches!(delta_columns(&naive), Err(Error::SchemaMismatch(_))));
    }

    #[tokio::test]
    async fn test_insert_only_merge_commits_new_keys_once() {
        let tables = TableStore::new(Arc::new(InMemory::new()));
        let mut table = open(&tables).await;
        let run_date = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let a = event("a", 3);
        let b = event("b", 17);

        let first = table
            .merge(events_to_batch(&[&a], run_date).unwrap(), KEY_PREDICATE, false)
            .await
            .unwrap();
        assert_eq!(first.inserted, 1);
        assert_eq!(first.version, Some(1));

        let second = table
            .merge(events_to_batch(&[&a, &b], run_date).unwrap(), KEY_PREDICATE, false)
            .await
            .unwrap();
        assert_eq!((second.inserted, second.updated), (1, 0));

        let reopened = open(&tables).await;
        assert_eq!(reopened.version(), Some(2));
        let rows: Vec<_> = reopened
            .scan()
            .await
            .unwrap()
            .iter()
            .flat_map(|batch| batch_to_events(batch).unwrap())
            .collect();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_filtered_scan_returns_matching_rows_only() {
        let tables = TableStore::new(Arc::new(InMemory::new()));
        let mut table = open(&tables).await;
        let early = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let late = NaiveDate::from_ymd_opt(2024, 1, 20).unwrap();
        let a = event("a", 3);
        let b = event("b", 17);

        table
            .merge(events_to_batch(&[&a], early).unwrap(), KEY_PREDICATE, false)
            .await
            .unwrap();
        table
            .merge(events_to_batch(&[&b], late).unwrap(), KEY_PREDICATE, false)
            .await
            .unwrap();

        let filter = col(EXTRACTION_DATE).eq(lit(ScalarValue::Date32(Some(date_to_days(late)))));
        let batches = table.scan_filtered(Some(filter)).await.unwrap();

        let rows: Vec<_> = batches.iter().flat_map(|b| batch_to_events(b).unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event.neo_reference_id, "b");
        assert_eq!(batches[0].schema(), table.schema());
    }

    #[tokio::test]
    async fn test_fresh_table_has_nothing_to_reclaim() {
        let tables = TableStore::new(Arc::new(InMemory::new()));
        let mut table = open(&tables).await;
        assert_eq!(table.oldest_reclaimable().await.unwrap(), None);

        let run_date = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        table
            .merge(events_to_batch(&[&event("a", 3)], run_date).unwrap(), KEY_PREDICATE, false)
            .await
            .unwrap();

        // The create commit is now superseded.
        let oldest = table.oldest_reclaimable().await.unwrap();
        assert!(oldest.is_some_and(|t| t <= Utc::now()));
    }
}
