pub mod asteroid;
pub mod event;
mod run;

pub use asteroid::{AsteroidDescriptor, StoredDescriptor};
pub use event::{CloseApproachEvent, DedupKey, StoredEvent};
pub use run::RunContext;
