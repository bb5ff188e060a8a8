//! One research branch: a bounded ReAct-style loop over the search tool

use slide_forge_sdk::{AgentRole, ChatMessage};
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::error::{EngineError, EngineResult};
use crate::prompts;
use crate::schemas::{ResearchResult, ResearchTask, ResearchTurn};

const SEARCH_TOOL: &str = "web_search";

/// Investigate one task in an isolated message list.
///
/// Each model turn either asks for a search or hands in the final report.
/// The loop is capped at `recursion_limit_researcher` model turns.
pub async fn investigate(task: &ResearchTask, run: &RunContext) -> EngineResult<ResearchResult> {
    let limit = run.settings().recursion_limit_researcher;
    let mut messages = vec![
        ChatMessage::system(prompts::RESEARCHER),
        ChatMessage::user(brief(task)),
    ];

    for turn in 1..=limit {
        let action: ResearchTurn = run
            .invoke_structured(AgentRole::Researcher, messages.clone())
            .await?;

        match action {
            ResearchTurn::Search { query } => {
                let call_id = format!("{}_research_{}_{}", run.workflow_id, task.id, turn);
                debug!(task = task.id, turn, %query, "research search");
                run.events.tool_call(
                    &call_id,
                    SEARCH_TOOL,
                    serde_json::json!({ "query": query, "perspective": task.perspective }),
                );

                let results = run.clients().search.search(&query).await?;
                run.events.tool_result(&call_id, SEARCH_TOOL, results.clone());

                messages.push(ChatMessage::from_agent(
                    AgentRole::Researcher,
                    format!("Searching: {}", query),
                ));
                messages.push(ChatMessage::user(format!(
                    "Search results for \"{}\":\n\n{}",
                    query, results
                )));
            }
            ResearchTurn::Finish {
                report,
                sources,
                confidence,
            } => {
                info!(task = task.id, turns = turn, confidence, "research finished");
                return Ok(ResearchResult {
                    task_id: task.id,
                    perspective: task.perspective.clone(),
                    report,
                    sources,
                    confidence: confidence.clamp(0.0, 1.0),
                });
            }
        }
    }

    Err(EngineError::RecursionLimit(limit))
}

/// Result recorded for a branch that failed
pub fn degraded(task: &ResearchTask, err: &EngineError) -> ResearchResult {
    warn!(task = task.id, error = %err, "research branch failed");
    ResearchResult {
        task_id: task.id,
        perspective: task.perspective.clone(),
        report: format!("[ERROR] Investigation failed: {}", err),
        sources: Vec::new(),
        confidence: 0.0,
    }
}

fn brief(task: &ResearchTask) -> String {
    let mut brief = format!(
        "Perspective: {}\nPriority: {:?}\nExpected output: {}",
        task.perspective, task.priority, task.expected_output
    );
    if !task.query_hints.is_empty() {
        brief.push_str("\nSuggested queries:");
        for hint in &task.query_hints {
            brief.push_str(&format!("\n- {}", hint));
        }
    }
    brief
}
