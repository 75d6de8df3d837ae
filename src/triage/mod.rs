//! Applying a rule document to stored records.

pub mod batch;
pub mod dispatch;
pub mod report;

pub use batch::{preview, run};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use report::{FailureStage, RecordFailure, RunReport};
