use async_trait::async_trait;
use slide_forge_sdk::AgentRole;

use crate::context::RunContext;
use crate::error::EngineResult;
use crate::schemas::{StepRole, StorywriterOutput, TaskStep};
use crate::stages::worker::{build_messages, to_artifact, WorkerStage};
use crate::state::WorkflowState;

/// Slide-by-slide narrative text
pub struct StorywriterStage;

#[async_trait]
impl WorkerStage for StorywriterStage {
    fn role(&self) -> StepRole {
        StepRole::Storywriter
    }

    async fn produce(
        &self,
        step: &TaskStep,
        state: &mut WorkflowState,
        run: &RunContext,
    ) -> EngineResult<String> {
        let messages = build_messages(AgentRole::Storywriter, step, state, &[]);
        let output: StorywriterOutput = run
            .invoke_structured(AgentRole::Storywriter, messages)
            .await?;
        to_artifact(&output)
    }
}
