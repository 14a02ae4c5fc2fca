use crate::schema::EXTRACTION_DATE;
use crate::storage::VersionedTable;
use crate::utils::arrow::{conform_batch, date_to_days};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use common::Result;
use datafusion::prelude::{DataFrame, SessionContext, col, lit};
use datafusion::scalar::ScalarValue;
use tracing::debug;
use uuid::Uuid;

/// Read side for later transformation stages.
pub struct DownstreamReader {
    ctx: SessionContext,
}

impl Default for DownstreamReader {
    fn default() -> Self {
        Self::new()
    }
}

impl DownstreamReader {
    pub fn new() -> Self {
        Self {
            ctx: SessionContext::new(),
        }
    }

    /// Runs `query` over `table` registered under a throwaway name.
    async fn execute<F>(&self, table: &VersionedTable, query: F) -> Result<Vec<RecordBatch>>
    where
        F: FnOnce(DataFrame) -> datafusion::error::Result<DataFrame>,
    {
        let table_name = format!("read_{}", Uuid::new_v4().simple());
        self.ctx.register_table(table_name.as_str(), table.provider())?;

        let result = match self.ctx.table(table_name.as_str()).await.and_then(query) {
            Ok(df) => df.collect().await,
            Err(e) => Err(e),
        };
        self.ctx.deregister_table(table_name.as_str())?;

        let schema = table.schema();
        result?
            .iter()
            .filter(|b| b.num_rows() > 0)
            .map(|b| conform_batch(b, &schema))
            .collect()
    }

    /// Rows committed by the run of `execution_date`. Files whose
    /// extraction-date stats exclude the date are never read.
    pub async fn read_run_batch(
        &self,
        table: &VersionedTable,
        execution_date: NaiveDate,
    ) -> Result<Vec<RecordBatch>> {
        let run_date = lit(ScalarValue::Date32(Some(date_to_days(execution_date))));
        let batches = self
            .execute(table, |df| df.filter(col(EXTRACTION_DATE).eq(run_date)))
            .await?;
        debug!(
            "Read {} batches of {} for run {}",
            batches.len(),
            table.address(),
            execution_date
        );
        Ok(batches)
    }

    /// The whole catalog, unfiltered.
    pub async fn read_catalog(&self, table: &VersionedTable) -> Result<Vec<RecordBatch>> {
        self.execute(table, Ok).await
    }
}
