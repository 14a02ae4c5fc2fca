use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Result;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub const STATE_DIR: &str = "_state";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkRecord {
    pub source: String,
    pub table: String,
    pub watermark: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persists the end of the last successfully ingested window per
/// (source, table).
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn read(&self, source: &str, table: &str) -> Result<Option<DateTime<Utc>>>;

    /// Moves the watermark forward and returns the stored value. A value
    /// older than the current one is ignored.
    async fn advance(
        &self,
        source: &str,
        table: &str,
        watermark: DateTime<Utc>,
    ) -> Result<DateTime<Utc>>;
}

/// Keeps each watermark as a small JSON document next to the tables.
pub struct ObjectWatermarkStore {
    store: Arc<dyn ObjectStore>,
}

impl ObjectWatermarkStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    fn location(source: &str, table: &str) -> Path {
        Path::from(STATE_DIR)
            .child(source)
            .child(table)
            .child("watermark.json")
    }

    async fn load(&self, source: &str, table: &str) -> Result<Option<WatermarkRecord>> {
        match self.store.get(&Self::location(source, table)).await {
            Ok(result) => {
                let bytes = result.bytes().await?;
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl WatermarkStore for ObjectWatermarkStore {
    async fn read(&self, source: &str, table: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.load(source, table).await?.map(|r| r.watermark))
    }

    async fn advance(
        &self,
        source: &str,
        table: &str,
        watermark: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        if let Some(current) = self.load(source, table).await? {
            if watermark < current.watermark {
                warn!(
                    "Ignoring watermark {} for {}/{}: already at {}",
                    watermark, source, table, current.watermark
                );
                return Ok(current.watermark);
            }
        }

        let record = WatermarkRecord {
            source: source.to_string(),
            table: table.to_string(),
            watermark,
            updated_at: Utc::now(),
        };
        let payload = PutPayload::from(serde_json::to_vec_pretty(&record)?);
        self.store.put(&Self::location(source, table), payload).await?;

        info!("Watermark for {}/{} advanced to {}", source, table, watermark);
        Ok(watermark)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use object_store::memory::InMemory;

    fn store() -> ObjectWatermarkStore {
        ObjectWatermarkStore::new(Arc::new(InMemory::new()))
    }

    #[tokio::test]
    async fn test_first_run_has_no_watermark() {
        assert_eq!(store().read("neo", "close_approach_data").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_watermark_never_moves_backwards() {
        let store = store();
        let jan_8 = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
        let jan_1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        store.advance("neo", "close_approach_data", jan_8).await.unwrap();
        let kept = store.advance("neo", "close_approach_data", jan_1).await.unwrap();

        assert_eq!(kept, jan_8);
        assert_eq!(
            store.read("neo", "close_approach_data").await.unwrap(),
            Some(jan_8)
        );
    }

    #[tokio::test]
    async fn test_watermarks_are_per_table() {
        let store = store();
        let ts = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();

        store.advance("neo", "close_approach_data", ts).await.unwrap();

        assert_eq!(store.read("neo", "asteroid_data").await.unwrap(), None);
    }
}
