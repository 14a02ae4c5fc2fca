use crate::models::NearEarthObject;
use async_trait::async_trait;
use chrono::NaiveDate;
use common::Result;

/// Upstream NEO catalogue. `feed` lists the objects approaching within a
/// date window; `lookup` returns one object's full descriptor.
#[async_trait]
pub trait NeoSource: Send + Sync {
    async fn feed(&self, start_date: NaiveDate, end_date: NaiveDate)
    -> Result<Vec<NearEarthObject>>;

    async fn lookup(&self, neo_reference_id: &str) -> Result<NearEarthObject>;
}
