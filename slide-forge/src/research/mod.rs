//! Parallel research subsystem
//!
//! A researcher step fans out into one isolated worker per perspective:
//!
//! - **dispatcher**: picks the research tasks for the step
//! - **worker**: runs one task as a bounded search/report loop
//! - **aggregator**: joins the results into a Markdown report
//!
//! Workers never see the conversation and never fail the step: a broken
//! branch degrades to a zero-confidence result and the report says so.

pub mod aggregator;
pub mod dispatcher;
pub mod worker;

use async_trait::async_trait;
use tracing::info;

use crate::context::RunContext;
use crate::error::EngineResult;
use crate::schemas::{StepRole, TaskStep};
use crate::stages::WorkerStage;
use crate::state::WorkflowState;
use crate::workflow_utils::execute_batch;

pub use aggregator::{render_report, LOW_CONFIDENCE_MARKER, LOW_CONFIDENCE_THRESHOLD};

pub struct ResearcherStage;

#[async_trait]
impl WorkerStage for ResearcherStage {
    fn role(&self) -> StepRole {
        StepRole::Researcher
    }

    async fn produce(
        &self,
        step: &TaskStep,
        state: &mut WorkflowState,
        run: &RunContext,
    ) -> EngineResult<String> {
        let tasks = dispatcher::dispatch(step, state);
        let concurrency = run.settings().research_concurrency;
        info!(
            step = step.id,
            tasks = tasks.len(),
            concurrency,
            "dispatching research workers"
        );

        let report = execute_batch(tasks.clone(), concurrency, move |task, ctx| async move {
            info!(
                task = task.id,
                "research worker {}/{}: {}", ctx.task_number, ctx.total_tasks, task.perspective
            );
            worker::investigate(&task, run).await
        })
        .await;

        let failed = report.failed();
        for (task, outcome) in tasks.iter().zip(report.into_outcomes()) {
            let result = match outcome {
                Ok(result) => result,
                Err(e) => worker::degraded(task, &e),
            };
            state.research_results.push(result);
        }
        state.research_results.sort_by_key(|r| r.task_id);

        info!(
            succeeded = state.research_results.len() - failed,
            failed,
            "research join complete"
        );
        Ok(render_report(&state.research_results, failed))
    }
}
