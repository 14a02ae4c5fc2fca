use crate::models::asteroid::descriptors_to_batch;
use crate::models::{AsteroidDescriptor, RunContext};
use crate::storage::VersionedTable;
use common::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

const CATALOG_MERGE_PREDICATE: &str = "target.neo_reference_id = source.neo_reference_id";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertReport {
    pub received: usize,
    pub updated: usize,
    pub inserted: usize,
    pub version: Option<u64>,
}

/// Merges descriptors into the catalog keyed on `neo_reference_id`.
///
/// Matched rows are replaced whole, unmatched ones inserted. Every row is
/// validated before anything is written, and a single invalid row aborts
/// the merge with `MergeAbort`. Rows the merge does not touch keep their
/// original `extraction_date`.
#[tracing::instrument(skip(table, rows), fields(table = %table.address(), received = rows.len()))]
pub async fn upsert_catalog(
    table: &mut VersionedTable,
    rows: &[AsteroidDescriptor],
    run: &RunContext,
) -> Result<UpsertReport> {
    for row in rows {
        row.validate()?;
    }

    // Later rows for the same id win; the merge rejects two source rows
    // matching one target row.
    let mut incoming: BTreeMap<&str, &AsteroidDescriptor> = BTreeMap::new();
    for row in rows {
        incoming.insert(row.neo_reference_id.as_str(), row);
    }

    let mut report = UpsertReport {
        received: rows.len(),
        ..Default::default()
    };
    if incoming.is_empty() {
        return Ok(report);
    }

    let merged: Vec<&AsteroidDescriptor> = incoming.values().copied().collect();
    let batch = descriptors_to_batch(&merged, run.execution_date)?;
    let summary = table.merge(batch, CATALOG_MERGE_PREDICATE, true).await?;

    report.updated = summary.updated;
    report.inserted = summary.inserted;
    report.version = summary.version;
    info!(
        "Catalog merge: {} updated, {} inserted",
        report.updated, report.inserted
    );
    Ok(report)
}
