pub mod model;
pub mod service;

pub use model::{BatchError, BatchReport, EntryOutcome};
pub use service::BatchService;
