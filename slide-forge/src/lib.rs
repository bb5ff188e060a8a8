//! slide-forge: a multi-agent workflow engine that turns a conversation into
//! a researched, written and illustrated slide deck.
//!
//! A run walks a cyclic graph of stages (coordinator, planner, supervisor,
//! workers, reviewer) over a single [`state::WorkflowState`], checkpointing
//! after every transition. See [`service::WorkflowService`] for the entry
//! points.

pub mod config;
pub mod context;
pub mod design;
pub mod error;
pub mod graph;
pub mod prompts;
pub mod research;
pub mod schemas;
pub mod service;
pub mod stages;
pub mod state;
pub mod storage;
#[cfg(feature = "testing")]
pub mod testing;
pub mod visualizer;
pub mod workflow_utils;

pub use config::{CriticFailurePolicy, EngineSettings};
pub use context::{Collaborators, EngineContext, RunContext};
pub use design::{DesignContext, ReferenceImage};
pub use error::{EngineError, EngineResult};
pub use graph::{Node, RunOutcome, RunReport};
pub use service::{TurnRequest, WorkflowService};
pub use state::WorkflowState;
pub use storage::{
    Checkpoint, Checkpointer, FsObjectStore, InMemoryCheckpointer, InMemoryObjectStore,
    SqliteCheckpointer,
};
