//! Reflexion loop tests: rejections, retries and critic failures

use std::sync::Arc;

use super::common::*;
use serde_json::json;
use slide_forge::graph::Node;
use slide_forge::schemas::StepRole;
use slide_forge::storage::SqliteCheckpointer;
use slide_forge::testing::{CannedSearch, RecordingImageGenerator, ScriptedModel};
use slide_forge::{CriticFailurePolicy, EngineSettings, RunOutcome};
use slide_forge_sdk::AgentRole;

#[tokio::test]
async fn test_rejected_twice_then_approved() {
    let model = ScriptedModel::new()
        .reply(
            AgentRole::Planner,
            plan(&[(1, "researcher"), (2, "storywriter")]),
        )
        .fallback(AgentRole::Researcher, finish("Battery costs fell", 0.9))
        .fallback(AgentRole::Storywriter, story())
        .reply(AgentRole::Reviewer, approve())
        .reply(AgentRole::Reviewer, reject("Too long"))
        .reply(AgentRole::Reviewer, reject("Needs numbers"))
        .reply(AgentRole::Reviewer, approve());
    let store = SqliteCheckpointer::open_in_memory().unwrap();
    let h = Harness::build_with_checkpointer(
        model,
        RecordingImageGenerator::new(),
        CannedSearch::new(),
        settings(),
        Arc::new(store.clone()),
    );

    let report = h.say("s1", "Battery deck").await;

    assert_eq!(report.outcome, RunOutcome::Completed { steps: 2 });
    assert_eq!(h.model.calls_for(AgentRole::Storywriter), 3);
    assert_eq!(report.state.retry_count, 0);

    let history = &report.state.feedback_history["2"];
    assert_eq!(history.len(), 3);
    assert!(history[0].starts_with("REJECTED: Too long"));
    assert!(history[1].starts_with("REJECTED: Needs numbers"));
    assert!(history[2].starts_with("APPROVED"));

    // retry counter seen each time the storywriter was dispatched
    let retries: Vec<u32> = store
        .history("s1", None)
        .unwrap()
        .into_iter()
        .filter(|r| r.next == Node::Worker(StepRole::Storywriter))
        .map(|r| r.retry_count)
        .collect();
    assert_eq!(retries, vec![0, 1, 2]);

    let feedback: Vec<&str> = report
        .state
        .messages
        .iter()
        .filter(|m| m.is_from(AgentRole::Reviewer))
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(
        feedback,
        vec![
            "Review Feedback (QC Failed, Score=0.3): Too long. Please fix and regenerate.",
            "Review Feedback (QC Failed, Score=0.3): Needs numbers. Please fix and regenerate.",
        ]
    );
}

#[tokio::test]
async fn test_retry_sees_reviewer_feedback() {
    let model = ScriptedModel::new()
        .reply(AgentRole::Planner, plan(&[(1, "storywriter")]))
        .fallback(AgentRole::Storywriter, story())
        .reply(AgentRole::Reviewer, reject("Add a conclusion slide"))
        .reply(AgentRole::Reviewer, approve());
    let h = Harness::new(model);

    h.say("s1", "Battery deck").await;

    let calls: Vec<_> = h
        .model
        .calls()
        .into_iter()
        .filter(|c| c.role == AgentRole::Storywriter)
        .collect();
    assert_eq!(calls.len(), 2);
    assert!(!calls[0]
        .messages
        .iter()
        .any(|m| m.content.contains("Add a conclusion slide")));
    assert!(calls[1]
        .messages
        .iter()
        .any(|m| m.is_from(AgentRole::Reviewer) && m.content.contains("Add a conclusion slide")));
}

#[tokio::test]
async fn test_exhausted_retries_escalate() {
    let model = ScriptedModel::new()
        .reply(AgentRole::Planner, plan(&[(1, "storywriter")]))
        .fallback(AgentRole::Storywriter, story())
        .fallback(AgentRole::Reviewer, reject("Still bad"));
    let settings = EngineSettings {
        max_retries: 1,
        max_replanning: 0,
        ..settings()
    };
    let h = Harness::with_settings(model, settings);

    let report = h.say("s1", "Battery deck").await;

    assert_eq!(h.model.calls_for(AgentRole::Storywriter), 2);
    let history = &report.state.feedback_history["1"];
    assert_eq!(history.len(), 2);
    assert!(history[1].starts_with("FAILED (Max Retries): Still bad"));
    match &report.outcome {
        RunOutcome::Stopped { reason } => {
            assert!(reason.contains("Failed criteria after 1 retries. Last feedback: Still bad"))
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(report.state.review_tally(), (0, 1, 1));
}

#[tokio::test]
async fn test_critic_failure_fails_open_by_default() {
    let model = ScriptedModel::new()
        .reply(AgentRole::Planner, plan(&[(1, "storywriter")]))
        .reply(AgentRole::Storywriter, story())
        .fail(AgentRole::Reviewer, "critic overloaded");
    let h = Harness::new(model);

    let report = h.say("s1", "Battery deck").await;

    assert_eq!(report.outcome, RunOutcome::Completed { steps: 1 });
    assert_eq!(report.state.current_quality_score, Some(0.5));
    let entry = &report.state.feedback_history["1"][0];
    assert!(entry.starts_with("APPROVED: Auto-approved due to critic error"));
    assert!(entry.contains("critic overloaded"));
}

#[tokio::test]
async fn test_critic_failure_can_fail_closed() {
    let model = ScriptedModel::new()
        .reply(AgentRole::Planner, plan(&[(1, "storywriter")]))
        .fallback(AgentRole::Storywriter, story())
        .fail(AgentRole::Reviewer, "critic overloaded")
        .reply(AgentRole::Reviewer, approve());
    let settings = EngineSettings {
        critic_failure_policy: CriticFailurePolicy::FailClosed,
        ..settings()
    };
    let h = Harness::with_settings(model, settings);

    let report = h.say("s1", "Battery deck").await;

    assert_eq!(report.outcome, RunOutcome::Completed { steps: 1 });
    assert_eq!(h.model.calls_for(AgentRole::Storywriter), 2);
    let history = &report.state.feedback_history["1"];
    assert!(history[0].starts_with("REJECTED: Critic unavailable"));
    assert!(history[1].starts_with("APPROVED"));
}

#[tokio::test]
async fn test_invalid_worker_output_is_reviewed_as_error_artifact() {
    let model = ScriptedModel::new()
        .reply(AgentRole::Planner, plan(&[(1, "storywriter")]))
        .reply(AgentRole::Storywriter, json!({ "pages": [] }))
        .reply(AgentRole::Storywriter, story())
        .with_responder(AgentRole::Reviewer, |request| {
            let under_review = last_user_content(&request.messages);
            if under_review.contains("\"error\"") {
                Ok(reject("The output is an error"))
            } else {
                Ok(approve())
            }
        });
    let h = Harness::new(model);

    let report = h.say("s1", "Battery deck").await;

    assert_eq!(report.outcome, RunOutcome::Completed { steps: 1 });
    assert_eq!(h.model.calls_for(AgentRole::Storywriter), 2);
    assert!(report.state.artifacts["step_1_story"].contains("Why now"));
    assert!(report.state.feedback_history["1"][0].starts_with("REJECTED"));
}
