//! Session-level entry points: start a turn, resume a run
//!
//! The service owns the checkpointer and the set of sessions with an active
//! run. A second request for a busy session is rejected with
//! [`EngineError::SessionBusy`]; different sessions run independently.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use slide_forge_sdk::{ChatMessage, EngineEvent, EventEnvelope, EventSink};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::{EngineContext, RunContext};
use crate::design::{DesignContext, ReferenceImage};
use crate::error::{EngineError, EngineResult};
use crate::graph::{self, Node, RunReport};
use crate::state::WorkflowState;
use crate::storage::{Checkpoint, Checkpointer};

/// One user turn
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub messages: Vec<ChatMessage>,
    pub search_before_planning: bool,
    /// Replaces the session's design context when set
    pub design_context: Option<DesignContext>,
    /// Artifacts from earlier turns the caller wants visible to this one
    pub retained_artifacts: BTreeMap<String, String>,
    pub reference_override: Option<ReferenceImage>,
}

impl TurnRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// Single user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(vec![ChatMessage::user(text)])
    }

    pub fn with_search_before_planning(mut self, enabled: bool) -> Self {
        self.search_before_planning = enabled;
        self
    }

    pub fn with_design(mut self, design: DesignContext) -> Self {
        self.design_context = Some(design);
        self
    }

    pub fn with_retained_artifacts(mut self, artifacts: BTreeMap<String, String>) -> Self {
        self.retained_artifacts = artifacts;
        self
    }

    pub fn with_reference_override(mut self, image: ReferenceImage) -> Self {
        self.reference_override = Some(image);
        self
    }
}

#[derive(Clone)]
pub struct WorkflowService {
    engine: Arc<EngineContext>,
    checkpointer: Arc<dyn Checkpointer>,
    active: Arc<Mutex<HashSet<String>>>,
}

/// Marks a session busy until dropped
struct SessionGuard {
    active: Arc<Mutex<HashSet<String>>>,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.session_id);
        }
    }
}

impl WorkflowService {
    pub fn new(engine: EngineContext, checkpointer: Arc<dyn Checkpointer>) -> Self {
        Self {
            engine: Arc::new(engine),
            checkpointer,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn engine(&self) -> &EngineContext {
        &self.engine
    }

    /// Latest checkpoint of a session, if any
    pub async fn checkpoint(&self, session_id: &str) -> EngineResult<Option<Checkpoint>> {
        Ok(self.checkpointer.load(session_id).await?)
    }

    pub fn is_busy(&self, session_id: &str) -> bool {
        self.active
            .lock()
            .map(|active| active.contains(session_id))
            .unwrap_or(false)
    }

    fn acquire(&self, session_id: &str) -> EngineResult<SessionGuard> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| EngineError::invalid_state("session registry poisoned"))?;
        if !active.insert(session_id.to_string()) {
            return Err(EngineError::SessionBusy(session_id.to_string()));
        }
        Ok(SessionGuard {
            active: self.active.clone(),
            session_id: session_id.to_string(),
        })
    }

    fn run_context(&self, session_id: String, workflow_id: String, events: EventSink) -> RunContext {
        RunContext {
            engine: self.engine.clone(),
            events,
            session_id,
            workflow_id,
        }
    }

    /// Run one turn of a session; a new session is created when `session_id`
    /// is `None` or has no checkpoint yet.
    pub async fn run_turn(
        &self,
        session_id: Option<String>,
        request: TurnRequest,
        events: EventSink,
        cancel: CancellationToken,
    ) -> EngineResult<RunReport> {
        if request.messages.is_empty() {
            return Err(EngineError::EmptyInput);
        }
        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let _guard = self.acquire(&session_id)?;

        let TurnRequest {
            messages,
            search_before_planning,
            design_context,
            retained_artifacts,
            reference_override,
        } = request;

        let mut state = match self.checkpointer.load(&session_id).await? {
            Some(checkpoint) => {
                if !checkpoint.is_finished() {
                    warn!(
                        session = %session_id,
                        next = %checkpoint.next,
                        "previous run did not finish; starting a new turn over it"
                    );
                }
                checkpoint.state
            }
            None => WorkflowState::new(None),
        };
        if design_context.is_some() {
            state.design_context = design_context;
        }
        state.begin_turn(
            messages,
            search_before_planning,
            retained_artifacts,
            reference_override,
        );

        let workflow_id = Uuid::new_v4().to_string();
        let run = self.run_context(session_id.clone(), workflow_id.clone(), events);
        let entry = if self.engine.settings.enable_coordinator {
            Node::Coordinator
        } else {
            Node::Planner
        };

        info!(session = %session_id, workflow = %workflow_id, %entry, "starting turn");
        run.events.send(EngineEvent::WorkflowStarted {
            workflow_id,
            session_id,
        });

        graph::save(self.checkpointer.as_ref(), &run, &state, entry, None).await?;
        graph::drive(&run, self.checkpointer.as_ref(), state, entry, &cancel).await
    }

    /// Continue a session from its last checkpoint.
    ///
    /// A finished session returns its stored outcome without running anything.
    pub async fn resume(
        &self,
        session_id: &str,
        events: EventSink,
        cancel: CancellationToken,
    ) -> EngineResult<RunReport> {
        let _guard = self.acquire(session_id)?;
        let checkpoint = self
            .checkpointer
            .load(session_id)
            .await?
            .ok_or_else(|| {
                EngineError::invalid_state(format!("no checkpoint for session {}", session_id))
            })?;

        if checkpoint.is_finished() {
            let outcome = checkpoint.outcome.ok_or_else(|| {
                EngineError::invalid_state(format!(
                    "session {} finished without an outcome",
                    session_id
                ))
            })?;
            return Ok(RunReport {
                session_id: checkpoint.session_id,
                workflow_id: checkpoint.workflow_id,
                outcome,
                state: checkpoint.state,
                transitions: 0,
            });
        }

        let run = self.run_context(
            checkpoint.session_id.clone(),
            checkpoint.workflow_id.clone(),
            events,
        );
        info!(session = %session_id, next = %checkpoint.next, "resuming run");
        run.events.send(EngineEvent::WorkflowStarted {
            workflow_id: checkpoint.workflow_id,
            session_id: checkpoint.session_id,
        });
        graph::drive(
            &run,
            self.checkpointer.as_ref(),
            checkpoint.state,
            checkpoint.next,
            &cancel,
        )
        .await
    }

    /// Spawn a turn in the background and stream its events
    pub fn start_turn(
        &self,
        session_id: Option<String>,
        request: TurnRequest,
        cancel: CancellationToken,
    ) -> (
        JoinHandle<EngineResult<RunReport>>,
        mpsc::UnboundedReceiver<EventEnvelope>,
    ) {
        let (events, rx) = EventSink::channel();
        let service = self.clone();
        let handle = tokio::spawn(async move {
            service.run_turn(session_id, request, events, cancel).await
        });
        (handle, rx)
    }
}
