//! Stage graph and its runner.
//!
//! The graph is cyclic (worker -> reviewer -> worker, supervisor -> planner ->
//! supervisor), so it is expressed as an explicit dispatch table keyed by
//! [`Node`] and executed by a trampoline: every stage returns a
//! [`Transition`], the runner checkpoints `(next node, state)` and loops.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use slide_forge_sdk::{AgentRole, ChatMessage, EngineEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::error::{EngineError, EngineResult};
use crate::schemas::StepRole;
use crate::stages::{coordinator, planner, reviewer, supervisor, worker};
use crate::state::WorkflowState;
use crate::storage::{Checkpoint, Checkpointer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", content = "role", rename_all = "snake_case")]
pub enum Node {
    Coordinator,
    Planner,
    Supervisor,
    Worker(StepRole),
    Reviewer,
    End,
}

impl Node {
    pub fn agent_role(&self) -> AgentRole {
        match self {
            Node::Coordinator => AgentRole::Coordinator,
            Node::Planner => AgentRole::Planner,
            Node::Supervisor | Node::End => AgentRole::Supervisor,
            Node::Worker(role) => role.agent_role(),
            Node::Reviewer => AgentRole::Reviewer,
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::End => f.write_str("end"),
            other => f.write_str(other.agent_role().as_str()),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every plan step was approved
    Completed { steps: usize },
    /// The coordinator answered without planning
    Replied,
    PlanningFailed { reason: String },
    /// Replanning or recursion limit reached
    Stopped { reason: String },
    /// Cancelled or client went away; resumable from the last checkpoint
    Cancelled { reason: String },
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Completed { .. } => "completed",
            RunOutcome::Replied => "replied",
            RunOutcome::PlanningFailed { .. } => "planning_failed",
            RunOutcome::Stopped { .. } => "stopped",
            RunOutcome::Cancelled { .. } => "cancelled",
        }
    }

    pub fn detail(&self) -> Option<String> {
        match self {
            RunOutcome::Completed { steps } => Some(format!("{} steps approved", steps)),
            RunOutcome::Replied => None,
            RunOutcome::PlanningFailed { reason }
            | RunOutcome::Stopped { reason }
            | RunOutcome::Cancelled { reason } => Some(reason.clone()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. } | RunOutcome::Replied)
    }
}

/// What a stage asks the runner to do next
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Goto(Node),
    Finish(RunOutcome),
}

/// Result of one run (a turn or a resume)
#[derive(Debug, Clone)]
pub struct RunReport {
    pub session_id: String,
    pub workflow_id: String,
    pub outcome: RunOutcome,
    pub state: WorkflowState,
    pub transitions: usize,
}

/// Execute the stage behind `node`
pub async fn step(
    node: Node,
    state: &mut WorkflowState,
    run: &RunContext,
) -> EngineResult<Transition> {
    match node {
        Node::Coordinator => coordinator::run(state, run).await,
        Node::Planner => planner::run(state, run).await,
        Node::Supervisor => Ok(supervisor::run(state, run.settings())),
        Node::Worker(role) => worker::run(role, state, run).await,
        Node::Reviewer => reviewer::run(state, run).await,
        Node::End => Err(EngineError::invalid_state("the end node has no stage")),
    }
}

/// Drive the graph from `node` until a stage finishes the run, the recursion
/// limit is hit, or the run is cancelled.
pub async fn drive(
    run: &RunContext,
    checkpointer: &dyn Checkpointer,
    mut state: WorkflowState,
    mut node: Node,
    cancel: &CancellationToken,
) -> EngineResult<RunReport> {
    let limit = run.settings().recursion_limit_workflow;
    let mut transitions = 0usize;

    let outcome = loop {
        if transitions >= limit {
            let reason = with_last_feedback(&state, EngineError::RecursionLimit(limit).to_string());
            warn!(session = %run.session_id, %reason, "stopping run");
            state.push_message(ChatMessage::from_agent(
                AgentRole::Supervisor,
                format!("System Stopped: {}", reason),
            ));
            run.events.error(None, reason.clone());
            break RunOutcome::Stopped { reason };
        }

        let role = node.agent_role();
        let agent_id = run.agent_id(role, transitions);
        run.events.stage_started(role, &agent_id);
        debug!(%node, transitions, "entering stage");

        let transition = match step(node, &mut state, run).await {
            Ok(transition) => transition,
            Err(e) => {
                run.events.error(Some(role), e.to_string());
                return Err(e);
            }
        };
        run.events.stage_completed(role, &agent_id);
        transitions += 1;

        match transition {
            Transition::Goto(next) => {
                node = next;
                save(checkpointer, run, &state, node, None).await?;

                if cancel.is_cancelled() {
                    break RunOutcome::Cancelled {
                        reason: "run cancelled".to_string(),
                    };
                }
                if run.events.is_closed() {
                    break RunOutcome::Cancelled {
                        reason: EngineError::ClientDisconnected.to_string(),
                    };
                }
            }
            Transition::Finish(outcome) => break outcome,
        }
    };

    // a cancelled run keeps its last checkpoint so it can be resumed
    if !matches!(outcome, RunOutcome::Cancelled { .. }) {
        save(checkpointer, run, &state, Node::End, Some(outcome.clone())).await?;
    }

    info!(
        session = %run.session_id,
        workflow = %run.workflow_id,
        outcome = outcome.label(),
        transitions,
        "run finished"
    );
    run.events.send(EngineEvent::WorkflowCompleted {
        workflow_id: run.workflow_id.clone(),
        outcome: outcome.label().to_string(),
        detail: outcome.detail(),
    });

    Ok(RunReport {
        session_id: run.session_id.clone(),
        workflow_id: run.workflow_id.clone(),
        outcome,
        state,
        transitions,
    })
}

pub(crate) async fn save(
    checkpointer: &dyn Checkpointer,
    run: &RunContext,
    state: &WorkflowState,
    next: Node,
    outcome: Option<RunOutcome>,
) -> EngineResult<()> {
    let checkpoint = Checkpoint {
        session_id: run.session_id.clone(),
        workflow_id: run.workflow_id.clone(),
        next,
        outcome,
        state: state.clone(),
        saved_at: Utc::now(),
    };
    checkpointer.save(&checkpoint).await?;
    Ok(())
}

/// Append the current step's most recent review feedback, if any
fn with_last_feedback(state: &WorkflowState, reason: String) -> String {
    let last = state
        .current_step()
        .and_then(|s| state.feedback_history.get(&s.id.to_string()))
        .and_then(|entries| entries.last());
    match last {
        Some(feedback) => format!("{}. Last feedback: {}", reason, feedback),
        None => reason,
    }
}
