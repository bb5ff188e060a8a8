//! Shared contracts for the slide-forge workflow engine.
//!
//! - [`contracts`]: collaborator traits (model, image, object store, search)
//! - [`EngineEvent`] / [`EventSink`]: typed progress events for streaming transports
//! - console macros for human-readable CLI output

pub mod contracts;
pub mod error;

pub use contracts::{
    AgentRole, AspectRatio, ChatMessage, ContinuationToken, GeneratedImage, GenerationConfig,
    ImageGenerator, ImageRequest, MediaResolution, MessageRole, ModelClient, ModelRequest,
    ObjectStore, OutputSchema, SearchTool, ThinkingLevel,
};
pub use error::{CollaboratorError, CollaboratorResult};

// Re-export async trait for collaborator implementations
pub use async_trait::async_trait;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Prefix for events echoed to stderr, one JSON object per line
pub const EVENT_LINE_PREFIX: &str = "__SF_EVENT__:";

/// Progress events emitted while a workflow runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A run started (new turn or resume)
    WorkflowStarted {
        workflow_id: String,
        session_id: String,
    },
    /// A stage began executing
    StageStarted { stage: String, agent_id: String },
    /// A stage handed off control
    StageCompleted { stage: String, agent_id: String },
    /// Text produced by a stage
    ContentDelta { stage: String, content: String },
    /// A tool was invoked by a stage (search, image generation)
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: serde_json::Value,
    },
    /// Tool finished
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        result: String,
    },
    /// Run reached a terminal state
    WorkflowCompleted {
        workflow_id: String,
        outcome: String,
        detail: Option<String>,
    },
    /// Non-fatal or fatal error surfaced to the client
    Error {
        stage: Option<String>,
        message: String,
    },
}

impl EngineEvent {
    /// Emit this event to stderr for line-oriented consumers
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            use std::io::Write;
            eprintln!("{}{}", EVENT_LINE_PREFIX, json);
            let _ = std::io::stderr().flush();
        }
    }

    /// Parse a stderr line produced by [`EngineEvent::emit`]
    pub fn parse_line(line: &str) -> Option<Self> {
        line.strip_prefix(EVENT_LINE_PREFIX)
            .and_then(|json| serde_json::from_str(json).ok())
    }
}

/// Timestamped event as delivered to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: EngineEvent,
}

/// Fan-in point for progress events.
///
/// Sending never fails: a dropped receiver means the client went away, which
/// the engine observes through [`EventSink::is_closed`] at its next checkpoint.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<EventEnvelope>>,
    echo_stderr: bool,
}

impl EventSink {
    /// Sink backed by a channel; the receiver is the streaming side
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EventEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                echo_stderr: false,
            },
            rx,
        )
    }

    /// Sink that drops everything
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Also echo every event to stderr
    pub fn with_stderr_echo(mut self) -> Self {
        self.echo_stderr = true;
        self
    }

    pub fn send(&self, event: EngineEvent) {
        if self.echo_stderr {
            event.emit();
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(EventEnvelope {
                at: Utc::now(),
                event,
            });
        }
    }

    /// True when a channel-backed sink lost its receiver
    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().map(|tx| tx.is_closed()).unwrap_or(false)
    }

    pub fn stage_started(&self, stage: AgentRole, agent_id: &str) {
        self.send(EngineEvent::StageStarted {
            stage: stage.to_string(),
            agent_id: agent_id.to_string(),
        });
    }

    pub fn stage_completed(&self, stage: AgentRole, agent_id: &str) {
        self.send(EngineEvent::StageCompleted {
            stage: stage.to_string(),
            agent_id: agent_id.to_string(),
        });
    }

    pub fn content(&self, stage: AgentRole, content: impl Into<String>) {
        self.send(EngineEvent::ContentDelta {
            stage: stage.to_string(),
            content: content.into(),
        });
    }

    pub fn tool_call(&self, tool_call_id: &str, tool_name: &str, input: serde_json::Value) {
        self.send(EngineEvent::ToolCall {
            tool_call_id: tool_call_id.to_string(),
            tool_name: tool_name.to_string(),
            input,
        });
    }

    pub fn tool_result(&self, tool_call_id: &str, tool_name: &str, result: impl Into<String>) {
        self.send(EngineEvent::ToolResult {
            tool_call_id: tool_call_id.to_string(),
            tool_name: tool_name.to_string(),
            result: result.into(),
        });
    }

    pub fn error(&self, stage: Option<AgentRole>, message: impl Into<String>) {
        self.send(EngineEvent::Error {
            stage: stage.map(|s| s.to_string()),
            message: message.into(),
        });
    }
}

// ============================================================================
// Console Logging Macros (for the inspection CLI)
// ============================================================================
// Colored, human-readable output. Structured progress goes through
// EngineEvent instead.
// ============================================================================

/// Logs an informational message.
///
/// # Example
/// ```
/// use slide_forge_sdk::log_info;
/// log_info!("Opening checkpoint store...");
/// ```
#[macro_export]
macro_rules! log_info {
    ($message:expr) => {
        println!("\x1b[36mℹ {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        println!("\x1b[36mℹ {}\x1b[0m", format!($fmt, $($arg)*));
    };
}

/// Logs a warning message.
///
/// # Example
/// ```
/// use slide_forge_sdk::log_warning;
/// log_warning!("Session has no plan yet");
/// ```
#[macro_export]
macro_rules! log_warning {
    ($message:expr) => {
        println!("\x1b[33m⚠ Warning: {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        println!("\x1b[33m⚠ Warning: {}\x1b[0m", format!($fmt, $($arg)*));
    };
}

/// Logs the number of items found.
///
/// # Example
/// ```
/// use slide_forge_sdk::log_found;
/// log_found!(3, "sessions");
/// ```
///
/// Outputs:
/// ```text
/// Found 3 sessions
/// ```
#[macro_export]
macro_rules! log_found {
    ($count:expr, $item_type:expr) => {
        println!("\x1b[36mFound {} {}\x1b[0m", $count, $item_type);
    };
}

/// Logs a review summary with verdict counts.
///
/// # Example
/// ```
/// use slide_forge_sdk::log_review_summary;
/// log_review_summary!(4, 2, 1);
/// ```
///
/// Outputs:
/// ```text
/// Review: ✓ 4 approved, ✗ 2 rejected, ! 1 failed
/// ```
#[macro_export]
macro_rules! log_review_summary {
    ($approved:expr, $rejected:expr, $failed:expr) => {
        println!(
            "\x1b[1mReview: \x1b[32m✓ {} approved\x1b[0m, \x1b[33m✗ {} rejected\x1b[0m, \x1b[31m! {} failed\x1b[0m",
            $approved, $rejected, $failed
        );
    };
}

/// Logs a removal.
///
/// # Example
/// ```
/// use slide_forge_sdk::log_removed;
/// log_removed!("session 42");
/// ```
#[macro_export]
macro_rules! log_removed {
    ($what:expr) => {
        println!("\x1b[32m✓ Removed: {}\x1b[0m", $what);
    };
}
