//! Planner: turns the conversation into an ordered list of steps.

use std::collections::HashSet;

use slide_forge_sdk::{AgentRole, ChatMessage};
use tracing::{error, info, warn};

use crate::context::RunContext;
use crate::error::{EngineError, EngineResult};
use crate::graph::{Node, RunOutcome, Transition};
use crate::prompts;
use crate::schemas::{PlannerOutput, TaskStep};
use crate::state::WorkflowState;

pub async fn run(state: &mut WorkflowState, run: &RunContext) -> EngineResult<Transition> {
    info!("planner creating execution plan");

    let mut messages = vec![ChatMessage::system(prompts::PLANNER)];
    messages.extend(state.messages.iter().cloned());

    if state.search_before_planning {
        if let Some(query) = state.last_user_message().map(|m| m.content.clone()) {
            search_into_prompt(&mut messages, &query, run).await;
        }
    }

    let planned = run
        .invoke_structured::<PlannerOutput>(AgentRole::Planner, messages)
        .await
        .and_then(|output| validate_plan(output.steps));

    match planned {
        Ok(steps) => {
            info!(steps = steps.len(), "plan generated");
            let summary = format!("Plan Generated: {} steps defined.", steps.len());
            run.events.content(AgentRole::Planner, summary.clone());
            state.install_plan(steps);
            state.push_message(ChatMessage::from_agent(AgentRole::Planner, summary));
            Ok(Transition::Goto(Node::Supervisor))
        }
        Err(e) => {
            error!(error = %e, "planner failed");
            let reason = format!("Failed to generate a valid plan: {}", e);
            run.events.error(Some(AgentRole::Planner), reason.clone());
            state.push_message(ChatMessage::from_agent(AgentRole::Planner, reason.clone()));
            Ok(Transition::Finish(RunOutcome::PlanningFailed { reason }))
        }
    }
}

/// Reject plans the engine cannot execute
pub fn validate_plan(steps: Vec<TaskStep>) -> EngineResult<Vec<TaskStep>> {
    if steps.is_empty() {
        return Err(EngineError::schema("PlannerOutput", "plan has no steps"));
    }
    let mut seen = HashSet::new();
    for step in &steps {
        if !seen.insert(step.id) {
            return Err(EngineError::schema(
                "PlannerOutput",
                format!("duplicate step id {}", step.id),
            ));
        }
    }
    Ok(steps)
}

/// Fold search results for `query` into the last planning message.
/// Search failures only cost the extra context.
async fn search_into_prompt(messages: &mut [ChatMessage], query: &str, run: &RunContext) {
    let call_id = format!("{}_planner_search", run.workflow_id);
    run.events
        .tool_call(&call_id, "web_search", serde_json::json!({ "query": query }));

    match run.clients().search.search(query).await {
        Ok(results) => {
            run.events.tool_result(&call_id, "web_search", results.clone());
            if let Some(last) = messages.last_mut() {
                last.content
                    .push_str(&format!("\n\n# Relative Search Results\n\n{}", results));
            }
        }
        Err(e) => {
            warn!(error = %e, "search before planning failed, planning without it");
            run.events.tool_result(&call_id, "web_search", format!("[ERROR] {}", e));
        }
    }
}
