//! Common test utilities for engine tests

use std::sync::Arc;

use serde_json::{json, Value};
use slide_forge::storage::Checkpointer;
use slide_forge::testing::{engine_with, CannedSearch, RecordingImageGenerator, ScriptedModel};
use slide_forge::{
    EngineSettings, InMemoryCheckpointer, InMemoryObjectStore, RunReport, TurnRequest,
    WorkflowService,
};
use slide_forge_sdk::{ChatMessage, EventSink, MessageRole};
use tokio_util::sync::CancellationToken;

/// Settings for tests: start at the planner, keep every other default
pub fn settings() -> EngineSettings {
    EngineSettings {
        enable_coordinator: false,
        ..EngineSettings::default()
    }
}

/// Collaborators and service for one test
pub struct Harness {
    pub model: Arc<ScriptedModel>,
    pub images: Arc<RecordingImageGenerator>,
    pub store: Arc<InMemoryObjectStore>,
    pub search: Arc<CannedSearch>,
    pub service: WorkflowService,
}

impl Harness {
    pub fn new(model: ScriptedModel) -> Self {
        Self::build(
            model,
            RecordingImageGenerator::new(),
            CannedSearch::new(),
            settings(),
        )
    }

    pub fn with_settings(model: ScriptedModel, settings: EngineSettings) -> Self {
        Self::build(model, RecordingImageGenerator::new(), CannedSearch::new(), settings)
    }

    pub fn build(
        model: ScriptedModel,
        images: RecordingImageGenerator,
        search: CannedSearch,
        settings: EngineSettings,
    ) -> Self {
        Self::build_with_checkpointer(
            model,
            images,
            search,
            settings,
            Arc::new(InMemoryCheckpointer::new()),
        )
    }

    pub fn build_with_checkpointer(
        model: ScriptedModel,
        images: RecordingImageGenerator,
        search: CannedSearch,
        settings: EngineSettings,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Self {
        let model = Arc::new(model);
        let images = Arc::new(images);
        let store = Arc::new(InMemoryObjectStore::new());
        let search = Arc::new(search);
        let engine = engine_with(
            model.clone(),
            images.clone(),
            store.clone(),
            search.clone(),
            settings,
        );
        Self {
            model,
            images,
            store,
            search,
            service: WorkflowService::new(engine, checkpointer),
        }
    }

    /// Run one turn and fail the test on engine errors
    pub async fn turn(&self, session: &str, request: TurnRequest) -> RunReport {
        self.service
            .run_turn(
                Some(session.to_string()),
                request,
                EventSink::disabled(),
                CancellationToken::new(),
            )
            .await
            .unwrap()
    }

    pub async fn say(&self, session: &str, text: &str) -> RunReport {
        self.turn(session, TurnRequest::user(text)).await
    }
}

// ============================================================================
// Scripted model outputs
// ============================================================================

/// Plan with one step per `(id, role)`
pub fn plan(steps: &[(u32, &str)]) -> Value {
    let steps: Vec<Value> = steps
        .iter()
        .map(|(id, role)| {
            json!({
                "id": id,
                "role": role,
                "instruction": format!("Do the {} work", role),
                "description": format!("{} step", role),
            })
        })
        .collect();
    json!({ "steps": steps })
}

/// Single researcher step with one planned task per perspective
pub fn research_plan(perspectives: &[&str]) -> Value {
    let tasks: Vec<Value> = perspectives
        .iter()
        .enumerate()
        .map(|(i, perspective)| {
            json!({
                "id": i + 1,
                "perspective": perspective,
                "query_hints": [format!("{} 2026", perspective)],
                "priority": "high",
                "expected_output": format!("Key facts on {}", perspective),
            })
        })
        .collect();
    json!({ "steps": [{
        "id": 1,
        "role": "researcher",
        "instruction": "Research the EV market",
        "description": "Market research",
        "research_tasks": tasks,
    }]})
}

pub fn approve() -> Value {
    json!({ "approved": true, "score": 0.9, "feedback": "Looks good" })
}

pub fn reject(feedback: &str) -> Value {
    json!({ "approved": false, "score": 0.3, "feedback": feedback })
}

pub fn story() -> Value {
    json!({ "slides": [
        { "slide_number": 1, "title": "Why now", "bullet_points": ["Costs fell 40%"] },
        { "slide_number": 2, "title": "What next", "bullet_points": ["Scale production"] }
    ]})
}

pub fn finish(report: &str, confidence: f64) -> Value {
    json!({
        "action": "finish",
        "report": report,
        "sources": ["https://example.org/source"],
        "confidence": confidence,
    })
}

pub fn search(query: &str) -> Value {
    json!({ "action": "search", "query": query })
}

/// Visualizer output with one plain prompt per slide number
pub fn visual(slides: &[u32], anchor: Option<&str>, seed: Option<u64>) -> Value {
    let prompts: Vec<Value> = slides
        .iter()
        .map(|n| {
            json!({
                "slide_number": n,
                "image_generation_prompt": format!("Slide {} illustration", n),
                "rationale": "supports the story",
            })
        })
        .collect();
    let mut output = json!({ "prompts": prompts });
    if let Some(anchor) = anchor {
        output["anchor_image_prompt"] = json!(anchor);
    }
    if let Some(seed) = seed {
        output["seed"] = json!(seed);
    }
    output
}

/// Content of the user message carrying the step context
pub fn last_user_content(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.name.is_none() && m.role == MessageRole::User)
        .map(|m| m.content.clone())
        .unwrap_or_default()
}
