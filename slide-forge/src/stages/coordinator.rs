//! Coordinator: gatekeeper at the start of every user turn.
//!
//! Small talk is answered directly and ends the run; anything that needs
//! work is handed to the planner.

use slide_forge_sdk::{AgentRole, ChatMessage};
use tracing::{info, warn};

use crate::context::RunContext;
use crate::error::EngineResult;
use crate::graph::{Node, RunOutcome, Transition};
use crate::prompts;
use crate::schemas::CoordinatorOutput;
use crate::state::WorkflowState;

pub async fn run(state: &mut WorkflowState, run: &RunContext) -> EngineResult<Transition> {
    info!("coordinator processing request");

    let mut messages = vec![ChatMessage::system(prompts::COORDINATOR)];
    messages.extend(state.messages.iter().cloned());

    match run
        .invoke_structured::<CoordinatorOutput>(AgentRole::Coordinator, messages)
        .await
    {
        Ok(output) if output.handoff_to_planner => {
            info!("handing off to planner");
            Ok(Transition::Goto(Node::Planner))
        }
        Ok(output) => {
            run.events.content(AgentRole::Coordinator, output.response.clone());
            state.push_message(ChatMessage::from_agent(
                AgentRole::Coordinator,
                output.response,
            ));
            Ok(Transition::Finish(RunOutcome::Replied))
        }
        Err(e) => {
            // the planner can still make sense of the request
            warn!(error = %e, "coordinator failed, handing off to planner");
            Ok(Transition::Goto(Node::Planner))
        }
    }
}
