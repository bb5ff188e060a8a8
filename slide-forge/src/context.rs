//! Dependency-injected collaborators and per-run context

use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use slide_forge_sdk::{
    AgentRole, ChatMessage, EventSink, ImageGenerator, ModelClient, ModelRequest, ObjectStore,
    OutputSchema, SearchTool,
};
use tracing::debug;

use crate::config::EngineSettings;
use crate::error::{EngineError, EngineResult};

/// Every external collaborator the engine talks to
#[derive(Clone)]
pub struct Collaborators {
    pub model: Arc<dyn ModelClient>,
    pub images: Arc<dyn ImageGenerator>,
    pub store: Arc<dyn ObjectStore>,
    pub search: Arc<dyn SearchTool>,
}

/// Long-lived engine configuration shared by all sessions
#[derive(Clone)]
pub struct EngineContext {
    pub clients: Collaborators,
    pub settings: EngineSettings,
}

impl EngineContext {
    pub fn new(clients: Collaborators, settings: EngineSettings) -> Self {
        Self { clients, settings }
    }
}

/// Everything a stage needs while one run is in flight
#[derive(Clone)]
pub struct RunContext {
    pub engine: Arc<EngineContext>,
    pub events: EventSink,
    pub session_id: String,
    pub workflow_id: String,
}

impl RunContext {
    pub fn settings(&self) -> &EngineSettings {
        &self.engine.settings
    }

    pub fn clients(&self) -> &Collaborators {
        &self.engine.clients
    }

    /// Stable id used to correlate stage and tool events
    pub fn agent_id(&self, role: AgentRole, sequence: usize) -> String {
        format!("{}_{}_{}", self.workflow_id, role, sequence)
    }

    /// Invoke the model and validate its output against `T`
    pub async fn invoke_structured<T>(
        &self,
        role: AgentRole,
        messages: Vec<ChatMessage>,
    ) -> EngineResult<T>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let schema = OutputSchema::of::<T>();
        let schema_name = schema.name.clone();
        debug!(%role, schema = %schema_name, messages = messages.len(), "invoking model");

        let raw = self
            .clients()
            .model
            .invoke(ModelRequest {
                role,
                messages,
                schema,
            })
            .await?;

        serde_json::from_value(raw).map_err(|e| EngineError::schema(schema_name, e))
    }
}
