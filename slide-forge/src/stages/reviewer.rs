//! Reviewer: the Reflexion loop.
//!
//! Every worker output is judged by a critic call. Approval sends control
//! back to the supervisor, which advances. Rejection sends it back to the
//! same worker with the feedback in the conversation, until the retry
//! budget is spent; then the step is escalated with an error context and
//! the supervisor decides whether to replan.

use slide_forge_sdk::{AgentRole, ChatMessage};
use tracing::{error, info, warn};

use crate::config::CriticFailurePolicy;
use crate::context::RunContext;
use crate::error::{EngineError, EngineResult};
use crate::graph::{Node, Transition};
use crate::prompts;
use crate::schemas::{ReviewOutput, TaskStep};
use crate::state::{ReviewStatus, Verdict, WorkflowState};

pub async fn run(state: &mut WorkflowState, run: &RunContext) -> EngineResult<Transition> {
    let step = state.require_current_step()?.clone();

    let Some(artifact) = state.artifact_for(&step).map(str::to_string) else {
        let err = EngineError::ArtifactMissing {
            role: step.role.to_string(),
            key: step.artifact_key(),
        };
        error!(step = step.id, error = %err, "escalating without review");
        run.events.error(Some(AgentRole::Reviewer), err.to_string());
        state.error_context = Some(err.to_string());
        state.review_status = ReviewStatus::Rejected;
        return Ok(Transition::Goto(Node::Supervisor));
    };

    let messages = vec![
        ChatMessage::system(prompts::REVIEWER),
        ChatMessage::user(format!(
            "Instruction: {}\n\nOutput to review:\n{}",
            step.instruction, artifact
        )),
    ];

    let review = match run
        .invoke_structured::<ReviewOutput>(AgentRole::Reviewer, messages)
        .await
    {
        Ok(review) => review,
        Err(e) => critic_fallback(run.settings().critic_failure_policy, run.settings().fail_open_score, &e),
    };

    let transition = apply_verdict(state, &step, review, run.settings().max_retries);
    if let Some(message) = state.messages.last().filter(|m| m.is_from(AgentRole::Reviewer)) {
        run.events.content(AgentRole::Reviewer, message.content.clone());
    }
    Ok(transition)
}

/// Verdict to use when the critic call itself failed
pub fn critic_fallback(policy: CriticFailurePolicy, score: f64, err: &EngineError) -> ReviewOutput {
    warn!(error = %err, ?policy, "critic call failed");
    match policy {
        CriticFailurePolicy::FailOpen => ReviewOutput {
            approved: true,
            score,
            feedback: format!("Auto-approved due to critic error: {}", err),
        },
        CriticFailurePolicy::FailClosed => ReviewOutput {
            approved: false,
            score: 0.0,
            feedback: format!("Critic unavailable: {}", err),
        },
    }
}

/// Apply a critic verdict to the state and pick the next node
pub fn apply_verdict(
    state: &mut WorkflowState,
    step: &TaskStep,
    review: ReviewOutput,
    max_retries: u32,
) -> Transition {
    let score = review.score.clamp(0.0, 1.0);

    if review.approved {
        info!(step = step.id, score, "work approved");
        state.record_feedback(step.id, Verdict::Approved, &review.feedback);
        state.review_status = ReviewStatus::Approved;
        state.current_quality_score = Some(score);
        return Transition::Goto(Node::Supervisor);
    }

    if state.retry_count < max_retries {
        info!(
            step = step.id,
            score,
            "rejecting work, retry {}/{}",
            state.retry_count + 1,
            max_retries
        );
        state.record_feedback(step.id, Verdict::Rejected, &review.feedback);
        state.retry_count += 1;
        state.review_status = ReviewStatus::Rejected;
        state.push_message(ChatMessage::from_agent(
            AgentRole::Reviewer,
            format!(
                "Review Feedback (QC Failed, Score={}): {}. Please fix and regenerate.",
                score, review.feedback
            ),
        ));
        return Transition::Goto(Node::Worker(step.role));
    }

    warn!(step = step.id, "max retries reached, escalating");
    state.record_feedback(step.id, Verdict::Failed, &review.feedback);
    state.review_status = ReviewStatus::Rejected;
    state.error_context = Some(
        EngineError::RetryLimitExceeded {
            retries: max_retries,
            feedback: review.feedback,
        }
        .to_string(),
    );
    Transition::Goto(Node::Supervisor)
}
