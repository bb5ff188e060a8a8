//! Shared workflow state threaded through every stage.
//!
//! One `WorkflowState` exists per session. It is checkpointed after every
//! stage transition and never discarded mid-session; stages mutate it in
//! place and the graph runner persists it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use slide_forge_sdk::{ChatMessage, MessageRole};

use crate::design::{DesignContext, ReferenceImage};
use crate::error::{EngineError, EngineResult};
use crate::schemas::{parse_artifact_key, ResearchResult, ResearchTask, StepRole, TaskStep};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }
}

/// Reviewer verdict as recorded in the feedback history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Rejected,
    Failed,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Approved => "APPROVED",
            Verdict::Rejected => "REJECTED",
            Verdict::Failed => "FAILED (Max Retries)",
        }
    }

    /// Classify a feedback history entry
    pub fn of_entry(entry: &str) -> Option<Verdict> {
        [Verdict::Failed, Verdict::Approved, Verdict::Rejected]
            .into_iter()
            .find(|v| entry.starts_with(v.label()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowState {
    pub messages: Vec<ChatMessage>,
    pub plan: Vec<TaskStep>,
    pub current_step_index: usize,
    /// `step_{id}_{suffix}` -> serialized artifact
    pub artifacts: BTreeMap<String, String>,
    /// step id -> verdict entries, oldest first
    pub feedback_history: BTreeMap<String, Vec<String>>,
    pub retry_count: u32,
    pub replanning_count: u32,
    pub error_context: Option<String>,
    pub review_status: ReviewStatus,
    pub current_quality_score: Option<f64>,
    pub research_tasks: Vec<ResearchTask>,
    pub research_results: Vec<ResearchResult>,
    pub design_context: Option<DesignContext>,
    /// Step most recently dispatched by the supervisor
    pub active_step_id: Option<u32>,
    pub search_before_planning: bool,
    /// Artifacts the caller carried into this turn; restored on every plan
    pub retained_artifacts: BTreeMap<String, String>,
    /// Caller-forced reference image for this turn's visual steps
    pub reference_override: Option<ReferenceImage>,
}

impl WorkflowState {
    pub fn new(design_context: Option<DesignContext>) -> Self {
        Self {
            design_context,
            ..Default::default()
        }
    }

    /// Reset per-turn bookkeeping and merge the incoming conversation.
    /// `replanning_count` is a session budget and survives the turn.
    ///
    /// A caller that re-sends the whole conversation (stored log is a prefix
    /// of `incoming`) replaces the log; anything else is appended.
    pub fn begin_turn(
        &mut self,
        incoming: Vec<ChatMessage>,
        search_before_planning: bool,
        retained_artifacts: BTreeMap<String, String>,
        reference_override: Option<ReferenceImage>,
    ) {
        let resent = incoming.len() >= self.messages.len()
            && incoming[..self.messages.len()] == self.messages[..];
        if resent {
            self.messages = incoming;
        } else {
            self.messages.extend(incoming);
        }

        self.search_before_planning = search_before_planning;
        self.retained_artifacts = retained_artifacts;
        self.reference_override = reference_override;
        self.error_context = None;
        self.retry_count = 0;
        self.review_status = ReviewStatus::Pending;
    }

    /// Install a freshly generated plan
    pub fn install_plan(&mut self, steps: Vec<TaskStep>) {
        self.plan = steps;
        self.current_step_index = 0;
        self.artifacts = self.retained_artifacts.clone();
        self.retry_count = 0;
        self.review_status = ReviewStatus::Pending;
        self.active_step_id = None;
        self.research_tasks.clear();
        self.research_results.clear();
    }

    pub fn current_step(&self) -> Option<&TaskStep> {
        self.plan.get(self.current_step_index)
    }

    pub fn require_current_step(&self) -> EngineResult<&TaskStep> {
        self.current_step().ok_or_else(|| {
            EngineError::invalid_state(format!(
                "no step at index {} (plan has {} steps)",
                self.current_step_index,
                self.plan.len()
            ))
        })
    }

    pub fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn last_user_message(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
    }

    pub fn write_artifact(&mut self, step: &TaskStep, blob: String) {
        self.artifacts.insert(step.artifact_key(), blob);
    }

    pub fn artifact_for(&self, step: &TaskStep) -> Option<&str> {
        self.artifacts.get(&step.artifact_key()).map(String::as_str)
    }

    pub fn record_feedback(&mut self, step_id: u32, verdict: Verdict, text: &str) {
        self.feedback_history
            .entry(step_id.to_string())
            .or_default()
            .push(format!("{}: {}", verdict.label(), text));
    }

    /// Artifacts written by a given role, most recent step first
    pub fn artifacts_by_recency(&self, role: StepRole) -> Vec<(u32, &str)> {
        let mut found: Vec<(u32, &str)> = self
            .artifacts
            .iter()
            .filter_map(|(key, blob)| match parse_artifact_key(key) {
                Some((id, r)) if r == role => Some((id, blob.as_str())),
                _ => None,
            })
            .collect();
        found.sort_by(|a, b| b.0.cmp(&a.0));
        found
    }

    /// Verdict counts across all steps: (approved, rejected, failed)
    pub fn review_tally(&self) -> (usize, usize, usize) {
        let mut tally = (0, 0, 0);
        for entry in self.feedback_history.values().flatten() {
            match Verdict::of_entry(entry) {
                Some(Verdict::Approved) => tally.0 += 1,
                Some(Verdict::Rejected) => tally.1 += 1,
                Some(Verdict::Failed) => tally.2 += 1,
                None => {}
            }
        }
        tally
    }
}
