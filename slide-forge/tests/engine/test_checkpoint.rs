//! Checkpoint tests: SQLite persistence, cancellation and resume

use std::sync::Arc;

use super::common::*;
use slide_forge::graph::Node;
use slide_forge::schemas::{StepRole, TaskStep};
use slide_forge::storage::{Checkpoint, Checkpointer, SqliteCheckpointer};
use slide_forge::testing::{CannedSearch, RecordingImageGenerator, ScriptedModel};
use slide_forge::{EngineError, InMemoryCheckpointer, RunOutcome, TurnRequest, WorkflowState};
use slide_forge_sdk::{AgentRole, EventSink};
use tokio_util::sync::CancellationToken;

fn story_model() -> ScriptedModel {
    ScriptedModel::new()
        .reply(
            AgentRole::Planner,
            plan(&[(1, "storywriter"), (2, "storywriter")]),
        )
        .fallback(AgentRole::Storywriter, story())
        .fallback(AgentRole::Reviewer, approve())
}

#[tokio::test]
async fn test_sqlite_store_records_every_transition() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteCheckpointer::open(dir.path().join("checkpoints.db")).unwrap();
    let h = Harness::build_with_checkpointer(
        story_model(),
        RecordingImageGenerator::new(),
        CannedSearch::new(),
        settings(),
        Arc::new(store.clone()),
    );

    let report = h.say("s1", "Battery deck").await;
    assert_eq!(report.outcome, RunOutcome::Completed { steps: 2 });

    let sessions = store.list_sessions(10, 0).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_id, "s1");
    assert_eq!(sessions[0].plan_len, 2);
    assert_eq!(sessions[0].outcome, Some(RunOutcome::Completed { steps: 2 }));

    // initial save, one per transition, final save
    let history = store.history("s1", None).unwrap();
    assert_eq!(history.len(), report.transitions + 1);
    assert_eq!(history.first().unwrap().next, Node::Planner);
    assert_eq!(history.last().unwrap().next, Node::End);
    assert!(history.iter().all(|r| r.workflow_id == report.workflow_id));

    let loaded = store.load("s1").await.unwrap().unwrap();
    assert_eq!(loaded.state, report.state);
}

#[tokio::test]
async fn test_cancelled_run_resumes_from_last_checkpoint() {
    let checkpointer = Arc::new(InMemoryCheckpointer::new());
    let h = Harness::build_with_checkpointer(
        story_model(),
        RecordingImageGenerator::new(),
        CannedSearch::new(),
        settings(),
        checkpointer.clone(),
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = h
        .service
        .run_turn(
            Some("s1".to_string()),
            TurnRequest::user("Battery deck"),
            EventSink::disabled(),
            cancel,
        )
        .await
        .unwrap();

    // the planner ran, then the run stopped at the next checkpoint
    assert!(matches!(report.outcome, RunOutcome::Cancelled { .. }));
    assert_eq!(report.transitions, 1);
    assert_eq!(h.model.calls_for(AgentRole::Planner), 1);
    let checkpoint = checkpointer.load("s1").await.unwrap().unwrap();
    assert!(!checkpoint.is_finished());
    assert_eq!(checkpoint.next, Node::Supervisor);
    assert_eq!(checkpoint.state.plan.len(), 2);

    let resumed = h
        .service
        .resume("s1", EventSink::disabled(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(resumed.outcome, RunOutcome::Completed { steps: 2 });
    assert_eq!(resumed.workflow_id, report.workflow_id);
    assert_eq!(h.model.calls_for(AgentRole::Planner), 1);
    assert_eq!(h.model.calls_for(AgentRole::Storywriter), 2);
}

#[tokio::test]
async fn test_dropped_receiver_stops_run() {
    let h = Harness::new(story_model());
    let (events, rx) = EventSink::channel();
    drop(rx);

    let report = h
        .service
        .run_turn(
            Some("s1".to_string()),
            TurnRequest::user("Battery deck"),
            events,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    match report.outcome {
        RunOutcome::Cancelled { reason } => assert_eq!(reason, "client disconnected"),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(h.model.calls_for(AgentRole::Storywriter), 0);
}

#[tokio::test]
async fn test_resume_of_finished_session_returns_stored_outcome() {
    let h = Harness::new(story_model());
    let first = h.say("s1", "Battery deck").await;

    let resumed = h
        .service
        .resume("s1", EventSink::disabled(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(resumed.outcome, first.outcome);
    assert_eq!(resumed.transitions, 0);
    assert_eq!(h.model.calls_for(AgentRole::Planner), 1);
}

#[tokio::test]
async fn test_resume_unknown_session_fails() {
    let h = Harness::new(story_model());

    let err = h
        .service
        .resume("missing", EventSink::disabled(), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidState(_)));
}

#[tokio::test]
async fn test_missing_artifact_escalates_without_review() {
    let checkpointer = Arc::new(InMemoryCheckpointer::new());
    let h = Harness::build_with_checkpointer(
        ScriptedModel::new()
            .reply(AgentRole::Planner, plan(&[(1, "storywriter")]))
            .fallback(AgentRole::Storywriter, story())
            .fallback(AgentRole::Reviewer, approve()),
        RecordingImageGenerator::new(),
        CannedSearch::new(),
        settings(),
        checkpointer.clone(),
    );

    // interrupted between the worker and the reviewer, with nothing written
    let mut state = WorkflowState::new(None);
    state.plan = vec![TaskStep {
        id: 1,
        role: StepRole::Storywriter,
        instruction: "Write the story".to_string(),
        description: "story".to_string(),
        design_direction: None,
        research_tasks: Vec::new(),
    }];
    state.active_step_id = Some(1);
    checkpointer
        .save(&Checkpoint {
            session_id: "s1".to_string(),
            workflow_id: "wf-1".to_string(),
            next: Node::Reviewer,
            outcome: None,
            state,
            saved_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

    let report = h
        .service
        .resume("s1", EventSink::disabled(), CancellationToken::new())
        .await
        .unwrap();

    // the first model call after resuming is the replan, not a review
    let calls = h.model.calls();
    assert_eq!(calls[0].role, AgentRole::Planner);
    assert_eq!(h.model.calls_for(AgentRole::Reviewer), 1);
    assert_eq!(report.state.replanning_count, 1);
    assert!(report.state.messages.iter().any(|m| m.is_from(AgentRole::Supervisor)
        && m.content.starts_with("Replanning Request: Current plan stalled at step 1.")
        && m.content.contains("Missing artifact for storywriter (step_1_story)")));
    assert_eq!(report.outcome, RunOutcome::Completed { steps: 1 });
}
