//! Supervisor: the routing state machine.
//!
//! Pure function of the state; never calls the model. Decides whether to
//! dispatch a step, ask the planner for a new plan, or end the run.

use slide_forge_sdk::{AgentRole, ChatMessage};
use tracing::{error, info};

use crate::config::EngineSettings;
use crate::error::EngineError;
use crate::graph::{Node, RunOutcome, Transition};
use crate::schemas::StepRole;
use crate::state::{ReviewStatus, WorkflowState};

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Dispatch(StepRole),
    Replan,
    Terminal(RunOutcome),
}

pub fn run(state: &mut WorkflowState, settings: &EngineSettings) -> Transition {
    match decide(state, settings) {
        Decision::Dispatch(role) => Transition::Goto(Node::Worker(role)),
        Decision::Replan => Transition::Goto(Node::Planner),
        Decision::Terminal(outcome) => Transition::Finish(outcome),
    }
}

pub fn decide(state: &mut WorkflowState, settings: &EngineSettings) -> Decision {
    if let Some(err) = state.error_context.clone() {
        if state.replanning_count >= settings.max_replanning {
            let stop = EngineError::ReplanningLimitExceeded {
                attempts: settings.max_replanning,
                last_error: err,
            }
            .to_string();
            error!("{}", stop);
            state.push_message(ChatMessage::from_agent(AgentRole::Supervisor, stop.clone()));
            return Decision::Terminal(RunOutcome::Stopped { reason: stop });
        }

        state.replanning_count += 1;
        error!(
            "stall detected: {}. Requesting re-planning ({}/{})",
            err, state.replanning_count, settings.max_replanning
        );
        state.push_message(ChatMessage::from_agent(
            AgentRole::Supervisor,
            format!(
                "Replanning Request: Current plan stalled at step {}. Reason: {}",
                state.current_step_index + 1,
                err
            ),
        ));
        state.error_context = None;
        state.retry_count = 0;
        state.review_status = ReviewStatus::Pending;
        return Decision::Replan;
    }

    if state.review_status == ReviewStatus::Approved {
        state.current_step_index += 1;
        state.retry_count = 0;
        state.review_status = ReviewStatus::Pending;
    }

    let Some(step) = state.current_step() else {
        info!(steps = state.plan.len(), "all steps completed");
        return Decision::Terminal(RunOutcome::Completed {
            steps: state.plan.len(),
        });
    };

    let (id, role) = (step.id, step.role);
    if state.active_step_id != Some(id) {
        state.retry_count = 0;
        state.active_step_id = Some(id);
    }
    info!(step = id, %role, "assigning task");
    Decision::Dispatch(role)
}
