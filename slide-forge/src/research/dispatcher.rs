use tracing::debug;

use crate::schemas::{ResearchPriority, ResearchTask, TaskStep};
use crate::state::WorkflowState;

/// Pick the research tasks for `step` and reset the result accumulator.
///
/// Planner-supplied tasks are used as-is. A step without any gets a single
/// task built from its instruction.
pub fn dispatch(step: &TaskStep, state: &mut WorkflowState) -> Vec<ResearchTask> {
    let tasks = if step.research_tasks.is_empty() {
        debug!(step = step.id, "no research tasks planned, using the instruction");
        vec![legacy_task(step)]
    } else {
        step.research_tasks.clone()
    };

    state.research_tasks = tasks.clone();
    state.research_results.clear();
    tasks
}

fn legacy_task(step: &TaskStep) -> ResearchTask {
    let perspective = if step.description.trim().is_empty() {
        "General".to_string()
    } else {
        step.description.clone()
    };
    ResearchTask {
        id: 1,
        perspective,
        query_hints: vec![step.instruction.clone()],
        priority: ResearchPriority::High,
        expected_output: format!("Findings that address: {}", step.instruction),
    }
}
