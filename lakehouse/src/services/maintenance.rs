use crate::processor::{MaintenanceOutcome, MaintenanceScheduler, OptimizeReport};
use crate::storage::{TableAddress, TableStore};
use chrono::{DateTime, Utc};
use common::config::MaintenanceConfig;
use common::{Error, Result};
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Default, Serialize)]
pub struct MaintenanceRunResult {
    pub optimized: Vec<OptimizeReport>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl MaintenanceRunResult {
    fn record_outcome(&mut self, table: &TableAddress, result: Result<MaintenanceOutcome>) {
        match result {
            Ok(MaintenanceOutcome::Optimized(report)) => self.optimized.push(report),
            Ok(MaintenanceOutcome::Skipped) => self.skipped.push(table.to_string()),
            Err(e) => {
                error!("Maintenance of {} failed: {}", table, e);
                self.failed.push((table.to_string(), e.to_string()));
            }
        }
    }
}

/// Runs the maintenance scheduler over every table of the configured stages.
pub struct MaintenanceService {
    tables: TableStore,
    scheduler: MaintenanceScheduler,
    stages: Vec<String>,
    retention_days: u32,
}

impl MaintenanceService {
    pub fn new(tables: TableStore, config: &MaintenanceConfig) -> Self {
        Self {
            tables,
            scheduler: MaintenanceScheduler::from_config(config),
            stages: config.stages.clone(),
            retention_days: config.retention_days,
        }
    }

    pub fn with_retention_days(mut self, retention_days: u32) -> Self {
        self.retention_days = retention_days;
        self
    }

    /// One pass over all tables. A failing table is recorded and the pass
    /// moves on; only an invalid retention aborts up front.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, now: DateTime<Utc>) -> Result<MaintenanceRunResult> {
        if self.retention_days == 0 {
            return Err(Error::Config(
                "retention_days must be at least 1".to_string(),
            ));
        }

        let mut result = MaintenanceRunResult::default();
        for stage in &self.stages {
            let addresses = self.tables.list_tables(stage).await?;
            info!("Found {} tables in stage {}", addresses.len(), stage);

            for address in addresses {
                let outcome = match self.tables.open(address.clone()).await {
                    Ok(mut table) => {
                        self.scheduler
                            .maybe_optimize(&mut table, self.retention_days, now)
                            .await
                    }
                    Err(e) => Err(e),
                };
                result.record_outcome(&address, outcome);
            }
        }

        info!(
            "Maintenance done: {} optimized, {} skipped, {} failed",
            result.optimized.len(),
            result.skipped.len(),
            result.failed.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AsteroidDescriptor, RunContext};
    use crate::processor::upsert_catalog;
    use crate::schema::{NeoSchemaVersion, get_neo_schema};
    use chrono::Duration;
    use object_store::memory::InMemory;
    use object_store::path::Path;
    use object_store::{ObjectStore, PutPayload};
    use std::sync::Arc;

    /// A catalog with one superseded merge.
    async fn merge_twice(tables: &TableStore, address: TableAddress) {
        let mut table = tables
            .open_or_create(address, get_neo_schema(NeoSchemaVersion::Asteroid), &[])
            .await
            .unwrap();
        for approaches in [1, 2] {
            let row = AsteroidDescriptor {
                neo_reference_id: "2000433".to_string(),
                name: None,
                nasa_jpl_url: None,
                absolute_magnitude_h: None,
                estimated_diameter_min_km: None,
                estimated_diameter_max_km: None,
                is_potentially_hazardous_asteroid: false,
                is_sentry_object: false,
                approaches_to_earth: approaches,
            };
            upsert_catalog(&mut table, &[row], &RunContext::now())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_pass_covers_every_stage_and_survives_broken_tables() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let tables = TableStore::new(store.clone());

        merge_twice(&tables, TableAddress::new("bronze", "neo", "old")).await;
        // A log entry that is not a Delta commit.
        store
            .put(
                &Path::from("gold/neo/broken/_delta_log/00000000000000000000.json"),
                PutPayload::from_static(b"not json"),
            )
            .await
            .unwrap();

        let config = MaintenanceConfig {
            stages: vec!["bronze".to_string(), "gold".to_string()],
            ..Default::default()
        };
        let service = MaintenanceService::new(tables.clone(), &config);
        let result = service.run(Utc::now() + Duration::days(10)).await.unwrap();

        assert_eq!(result.optimized.len(), 1);
        assert_eq!(result.optimized[0].table, "bronze/neo/old");
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].0, "gold/neo/broken");

        merge_twice(&tables, TableAddress::new("silver", "neo", "fresh")).await;
        let config = MaintenanceConfig {
            stages: vec!["silver".to_string()],
            ..Default::default()
        };
        let result = MaintenanceService::new(tables, &config)
            .run(Utc::now() + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(result.skipped, vec!["silver/neo/fresh".to_string()]);
    }

    #[tokio::test]
    async fn test_zero_retention_fails_before_any_table() {
        let tables = TableStore::new(Arc::new(InMemory::new()));
        let service =
            MaintenanceService::new(tables, &MaintenanceConfig::default()).with_retention_days(0);

        assert!(matches!(service.run(Utc::now()).await, Err(Error::Config(_))));
    }
}
