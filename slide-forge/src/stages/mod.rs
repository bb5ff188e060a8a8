//! Graph stages
//!
//! - **coordinator**: answers small talk or hands off to planning
//! - **planner**: produces the step plan
//! - **supervisor**: routes between steps, retries and replanning
//! - **worker**: shared contract for the artifact-producing stages
//! - **storywriter** / **data_analyst**: single-call workers
//! - **reviewer**: critic verdicts and the retry loop
//!
//! The researcher and visualizer workers live in their own modules.

pub mod coordinator;
pub mod data_analyst;
pub mod planner;
pub mod reviewer;
pub mod storywriter;
pub mod supervisor;
pub mod worker;

pub use worker::{stage_for, WorkerStage};
