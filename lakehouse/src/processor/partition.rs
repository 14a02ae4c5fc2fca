use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical grouping of close-approach rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    pub year: i32,
    pub month: u32,
    /// 1-5, counted from the first day of the month in blocks of seven days.
    pub week: u32,
}

impl PartitionKey {
    /// Directory fragment, e.g. `year=2024/month=1/week=1`.
    pub fn path_fragment(&self) -> String {
        format!("year={}/month={}/week={}", self.year, self.month, self.week)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path_fragment())
    }
}

/// Week of month is day-based, not ISO: days 1-7 are week 1, 8-14 week 2,
/// and so on, restarting at week 1 on every month's first day.
pub fn derive_partition(approach_datetime: DateTime<Utc>) -> PartitionKey {
    PartitionKey {
        year: approach_datetime.year(),
        month: approach_datetime.month(),
        week: (approach_datetime.day() - 1) / 7 + 1,
    }
}
