//! Reusable execution helpers for workflow stages
//!
//! - **batch**: parallel execution with concurrency control and per-unit results

pub mod batch;

pub use batch::{execute_batch, BatchReport, TaskContext};
