pub mod catalog;
pub mod events;
pub mod maintenance;
pub mod partition;
pub mod query;
pub mod window;

pub use catalog::{UpsertReport, upsert_catalog};
pub use events::{WriteReport, write_events};
pub use maintenance::{MaintenanceOutcome, MaintenanceScheduler, OptimizeReport};
pub use partition::{PartitionKey, derive_partition};
pub use query::DownstreamReader;
pub use window::{ExtractionWindow, plan_window};
