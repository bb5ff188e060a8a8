//! Worker stage contract.
//!
//! Every worker follows the same shape: read the current step and the
//! artifacts so far, produce one serialized artifact, store it under
//! `step_{id}_{suffix}`, record a conversation entry and hand over to the
//! Reviewer. A failed production is stored as `{"error": ...}` so the
//! Reviewer can reject it like any other bad output.

use async_trait::async_trait;
use serde::Serialize;
use slide_forge_sdk::{AgentRole, ChatMessage};
use tracing::{info, warn};

use crate::context::RunContext;
use crate::error::{EngineError, EngineResult};
use crate::graph::{Node, Transition};
use crate::prompts;
use crate::research::ResearcherStage;
use crate::schemas::{StepRole, TaskStep};
use crate::stages::data_analyst::DataAnalystStage;
use crate::stages::storywriter::StorywriterStage;
use crate::state::WorkflowState;
use crate::visualizer::VisualizerStage;

#[async_trait]
pub trait WorkerStage: Send + Sync {
    fn role(&self) -> StepRole;

    /// Produce the serialized artifact for `step`
    async fn produce(
        &self,
        step: &TaskStep,
        state: &mut WorkflowState,
        run: &RunContext,
    ) -> EngineResult<String>;
}

pub fn stage_for(role: StepRole) -> &'static dyn WorkerStage {
    match role {
        StepRole::Researcher => &ResearcherStage,
        StepRole::Storywriter => &StorywriterStage,
        StepRole::Visualizer => &VisualizerStage,
        StepRole::DataAnalyst => &DataAnalystStage,
    }
}

pub async fn run(
    role: StepRole,
    state: &mut WorkflowState,
    run: &RunContext,
) -> EngineResult<Transition> {
    let step = state.require_current_step()?.clone();
    if step.role != role {
        return Err(EngineError::invalid_state(format!(
            "step {} belongs to {}, not {}",
            step.id, step.role, role
        )));
    }

    let stage = stage_for(role);
    info!(step = step.id, role = %stage.role(), attempt = state.retry_count + 1, "worker started");

    let blob = match stage.produce(&step, state, run).await {
        Ok(blob) => blob,
        Err(e) => {
            warn!(step = step.id, %role, error = %e, "worker failed, storing error artifact");
            run.events.error(Some(role.agent_role()), e.to_string());
            error_artifact(&e)
        }
    };

    let entry = run.settings().format_response(role.as_str(), &blob);
    run.events.content(role.agent_role(), entry.clone());
    state.write_artifact(&step, blob);
    state.push_message(ChatMessage::from_agent(role.agent_role(), entry));

    Ok(Transition::Goto(Node::Reviewer))
}

pub fn error_artifact(err: &EngineError) -> String {
    serde_json::json!({ "error": err.to_string() }).to_string()
}

/// Role prompt, the conversation so far, then the step context.
///
/// Reviewer feedback from an earlier rejection is already part of the
/// conversation, so retries see it without extra plumbing.
pub fn build_messages(
    role: AgentRole,
    step: &TaskStep,
    state: &WorkflowState,
    extra_sections: &[String],
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(prompts::system_prompt(role))];
    messages.extend(state.messages.iter().cloned());

    let artifacts = serde_json::to_string_pretty(&state.artifacts).unwrap_or_default();
    let mut context = format!(
        "Instruction: {}\n\nAvailable Artifacts: {}",
        step.instruction, artifacts
    );
    for section in extra_sections {
        context.push_str("\n\n");
        context.push_str(section);
    }
    messages.push(ChatMessage::user(context));
    messages
}

/// Pretty JSON artifact body
pub fn to_artifact<T: Serialize>(value: &T) -> EngineResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| EngineError::invalid_state(format!("artifact serialization failed: {}", e)))
}
