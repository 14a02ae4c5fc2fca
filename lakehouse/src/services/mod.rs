pub mod ingest;
pub mod maintenance;

pub use ingest::{IngestionService, RunReport};
pub use maintenance::{MaintenanceRunResult, MaintenanceService};
