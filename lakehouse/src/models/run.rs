use chrono::{DateTime, NaiveDate, Utc};

/// Identity of one ingestion run. `execution_date` is stamped on every row
/// as `extraction_date`; `started_at` timestamps the run's table commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    pub execution_date: NaiveDate,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(execution_date: NaiveDate, started_at: DateTime<Utc>) -> Self {
        Self {
            execution_date,
            started_at,
        }
    }

    pub fn now() -> Self {
        let started_at = Utc::now();
        Self::new(started_at.date_naive(), started_at)
    }

    /// A run for a past or future logical date, committed now.
    pub fn for_date(execution_date: NaiveDate) -> Self {
        Self::new(execution_date, Utc::now())
    }
}
