use async_trait::async_trait;
use slide_forge_sdk::AgentRole;
use tracing::debug;

use crate::context::RunContext;
use crate::error::EngineResult;
use crate::schemas::{DataAnalystOutput, StepRole, TaskStep};
use crate::stages::worker::{build_messages, to_artifact, WorkerStage};
use crate::state::WorkflowState;

/// Chart and diagram blueprints
pub struct DataAnalystStage;

#[async_trait]
impl WorkerStage for DataAnalystStage {
    fn role(&self) -> StepRole {
        StepRole::DataAnalyst
    }

    async fn produce(
        &self,
        step: &TaskStep,
        state: &mut WorkflowState,
        run: &RunContext,
    ) -> EngineResult<String> {
        let messages = build_messages(AgentRole::DataAnalyst, step, state, &[]);
        let output: DataAnalystOutput = run
            .invoke_structured(AgentRole::DataAnalyst, messages)
            .await?;
        debug!(blueprints = output.blueprints.len(), "data analyst output validated");
        to_artifact(&output)
    }
}
