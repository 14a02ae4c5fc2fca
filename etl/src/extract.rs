use crate::models::{NearEarthObject, RawAsteroid, RawCloseApproach};
use crate::source::NeoSource;
use chrono::NaiveDate;
use common::{Error, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

/// Rows pulled from the source for one window.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionBatch {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub events: Vec<RawCloseApproach>,
    pub asteroids: Vec<RawAsteroid>,
    pub report: ExtractionReport,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionReport {
    pub requested: usize,
    pub succeeded: usize,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub id: String,
    pub reason: String,
}

impl ExtractionReport {
    fn record_outcome(&mut self, result: std::result::Result<(), Error>) {
        match result {
            Ok(()) => self.succeeded += 1,
            Err(Error::ExtractionItem { id, reason }) => {
                self.failures.push(ItemFailure { id, reason })
            }
            Err(e) => self.failures.push(ItemFailure {
                id: "unknown".to_string(),
                reason: e.to_string(),
            }),
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Pulls the feed for `[start_date, end_date]`, then looks every referenced
/// NEO up with at most `concurrency` requests in flight.
///
/// The feed request itself is fatal on failure. A failed lookup only drops
/// that descriptor and is recorded in the report.
#[tracing::instrument(skip(source), fields(start = %start_date, end = %end_date))]
pub async fn extract_window<S>(
    source: &S,
    start_date: NaiveDate,
    end_date: NaiveDate,
    concurrency: usize,
) -> Result<ExtractionBatch>
where
    S: NeoSource + ?Sized,
{
    let feed = source.feed(start_date, end_date).await?;

    let events: Vec<RawCloseApproach> = feed
        .iter()
        .flat_map(NearEarthObject::close_approach_rows)
        .collect();

    let mut ids: Vec<String> = feed.into_iter().map(|neo| neo.neo_reference_id).collect();
    ids.sort();
    ids.dedup();

    info!(
        events = events.len(),
        identifiers = ids.len(),
        "Feed extracted, looking up descriptors"
    );

    let outcomes: Vec<(String, Result<NearEarthObject>)> = stream::iter(ids)
        .map(|id| async move {
            let result = source.lookup(&id).await;
            (id, result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut report = ExtractionReport {
        requested: outcomes.len(),
        ..Default::default()
    };
    let mut asteroids = Vec::with_capacity(outcomes.len());

    for (id, result) in outcomes {
        match result {
            Ok(neo) => {
                asteroids.push(neo.asteroid_row());
                report.record_outcome(Ok(()));
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Skipping descriptor lookup");
                report.record_outcome(Err(Error::ExtractionItem {
                    id,
                    reason: e.to_string(),
                }));
            }
        }
    }

    asteroids.sort_by(|a, b| a.neo_reference_id.cmp(&b.neo_reference_id));

    Ok(ExtractionBatch {
        start_date: Some(start_date),
        end_date: Some(end_date),
        events,
        asteroids,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct ScriptedSource {
        feed: Vec<NearEarthObject>,
        lookups: HashMap<String, NearEarthObject>,
    }

    fn neo(id: &str, epochs: &[i64]) -> NearEarthObject {
        let approaches: Vec<String> = epochs
            .iter()
            .map(|e| {
                format!(
                    r#"{{"epoch_date_close_approach": {}, "orbiting_body": "Earth"}}"#,
                    e
                )
            })
            .collect();
        serde_json::from_str(&format!(
            r#"{{"neo_reference_id": "{}", "close_approach_data": [{}]}}"#,
            id,
            approaches.join(",")
        ))
        .unwrap()
    }

    #[async_trait]
    impl NeoSource for ScriptedSource {
        async fn feed(&self, _: NaiveDate, _: NaiveDate) -> Result<Vec<NearEarthObject>> {
            Ok(self.feed.clone())
        }

        async fn lookup(&self, id: &str) -> Result<NearEarthObject> {
            self.lookups
                .get(id)
                .cloned()
                .ok_or(Error::GatewayTimeout)
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[tokio::test]
    async fn test_failed_lookup_is_skipped_not_fatal() {
        let source = ScriptedSource {
            feed: vec![neo("1", &[1704283200000]), neo("2", &[1704369600000])],
            lookups: HashMap::from([("1".to_string(), neo("1", &[1, 2]))]),
        };

        let batch = extract_window(&source, day(1), day(8), 4).await.unwrap();

        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.asteroids.len(), 1);
        assert_eq!(batch.asteroids[0].neo_reference_id, "1");
        assert_eq!(batch.asteroids[0].approaches_to_earth, 2);
        assert_eq!(batch.report.requested, 2);
        assert_eq!(batch.report.succeeded, 1);
        assert_eq!(batch.report.failed(), 1);
        assert_eq!(batch.report.failures[0].id, "2");
    }

    #[tokio::test]
    async fn test_repeated_identifiers_are_looked_up_once() {
        let source = ScriptedSource {
            feed: vec![neo("7", &[1704283200000]), neo("7", &[1704369600000])],
            lookups: HashMap::from([("7".to_string(), neo("7", &[]))]),
        };

        let batch = extract_window(&source, day(1), day(8), 1).await.unwrap();

        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.report.requested, 1);
        assert_eq!(batch.asteroids.len(), 1);
    }
}
