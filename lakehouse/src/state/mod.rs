pub mod watermark;

pub use watermark::{ObjectWatermarkStore, WatermarkRecord, WatermarkStore};
