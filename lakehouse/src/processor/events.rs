use crate::models::event::events_to_batch;
use crate::models::{CloseApproachEvent, DedupKey, RunContext};
use crate::storage::VersionedTable;
use common::Result;
use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

/// A stored row matches an incoming one on the event key. The partition
/// terms let the merge prune to the partitions the incoming rows map to; a
/// key lives in exactly one partition because the partition is a function
/// of `approach_datetime`.
const EVENT_MERGE_PREDICATE: &str = "target.year = source.year \
    AND target.month = source.month \
    AND target.week = source.week \
    AND target.neo_reference_id = source.neo_reference_id \
    AND target.approach_datetime = source.approach_datetime";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub received: usize,
    pub deduplicated: usize,
    pub written: usize,
    /// Table version created by this write, `None` when nothing was new.
    pub version: Option<u64>,
}

/// Appends close-approach events that are not in the table yet.
///
/// Repeats inside `rows` collapse to their first occurrence; the rest go
/// through one insert-only merge, so a failed run leaves nothing visible and
/// can be retried.
#[tracing::instrument(skip(table, rows), fields(table = %table.address(), received = rows.len()))]
pub async fn write_events(
    table: &mut VersionedTable,
    rows: &[CloseApproachEvent],
    run: &RunContext,
) -> Result<WriteReport> {
    let mut report = WriteReport {
        received: rows.len(),
        ..Default::default()
    };

    let mut seen: HashSet<DedupKey> = HashSet::new();
    let fresh: Vec<&CloseApproachEvent> = rows
        .iter()
        .filter(|row| seen.insert(row.dedup_key()))
        .collect();

    if !fresh.is_empty() {
        let batch = events_to_batch(&fresh, run.execution_date)?;
        let merged = table.merge(batch, EVENT_MERGE_PREDICATE, false).await?;
        report.written = merged.inserted;
        report.version = merged.version;
    }
    report.deduplicated = report.received - report.written;

    if report.written == 0 {
        info!("No new close approaches to write");
    } else {
        info!(
            "Wrote {} close approaches, dropped {} duplicates",
            report.written, report.deduplicated
        );
    }
    Ok(report)
}
