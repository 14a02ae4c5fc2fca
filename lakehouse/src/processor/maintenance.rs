use crate::schema::EXTRACTION_DATE;
use crate::storage::{RewriteReport, VacuumReport, VersionedTable};
use chrono::{DateTime, Duration, Utc};
use common::config::MaintenanceConfig;
use common::{Error, Result};
use serde::Serialize;
use tracing::{debug, info};

const DEFAULT_TARGET_FILE_SIZE: u64 = 128 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizeReport {
    pub table: String,
    pub oldest_reclaimable: DateTime<Utc>,
    pub reorganize: RewriteReport,
    pub compact: RewriteReport,
    pub vacuum: VacuumReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MaintenanceOutcome {
    Optimized(OptimizeReport),
    Skipped,
}

/// Due only when strictly older than the retention window.
fn is_due(age: Duration, retention: Duration) -> bool {
    age > retention
}

/// Decides whether a table's history is old enough to be worth reclaiming,
/// and if so z-orders, compacts and vacuums it in that order.
#[derive(Debug, Clone)]
pub struct MaintenanceScheduler {
    reorganize_column: String,
    target_file_size: u64,
}

impl Default for MaintenanceScheduler {
    fn default() -> Self {
        Self::new(EXTRACTION_DATE, DEFAULT_TARGET_FILE_SIZE)
    }
}

impl MaintenanceScheduler {
    pub fn new(reorganize_column: &str, target_file_size: u64) -> Self {
        Self {
            reorganize_column: reorganize_column.to_string(),
            target_file_size,
        }
    }

    pub fn from_config(config: &MaintenanceConfig) -> Self {
        Self::new(&config.reorganize_column, config.target_file_size)
    }

    /// Runs maintenance when the oldest reclaimable version is strictly
    /// older than `retention_days`. Stateless between calls: right after a
    /// run, nothing is old enough again and the next call is `Skipped`.
    #[tracing::instrument(skip(self, table), fields(table = %table.address()))]
    pub async fn maybe_optimize(
        &self,
        table: &mut VersionedTable,
        retention_days: u32,
        now: DateTime<Utc>,
    ) -> Result<MaintenanceOutcome> {
        if retention_days == 0 {
            return Err(Error::Config(
                "retention_days must be at least 1".to_string(),
            ));
        }
        let retention = Duration::days(i64::from(retention_days));

        let Some(oldest) = table.oldest_reclaimable().await? else {
            debug!("Nothing reclaimable");
            return Ok(MaintenanceOutcome::Skipped);
        };
        let age = now - oldest;
        if !is_due(age, retention) {
            debug!(
                "Oldest reclaimable version is {} days old, retention is {}",
                age.num_days(),
                retention_days
            );
            return Ok(MaintenanceOutcome::Skipped);
        }

        info!(
            "Optimizing: oldest reclaimable version is {} days old",
            age.num_days()
        );
        let reorganize = table.zorder(&self.reorganize_column).await?;
        let compact = table.compact(self.target_file_size).await?;
        let vacuum = table.vacuum(retention, now).await?;

        Ok(MaintenanceOutcome::Optimized(OptimizeReport {
            table: table.address().to_string(),
            oldest_reclaimable: oldest,
            reorganize,
            compact,
            vacuum,
        }))
    }
}
