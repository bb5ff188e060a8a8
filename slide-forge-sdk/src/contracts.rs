//! Boundary contracts consumed by the engine.
//!
//! Everything that talks to the network lives behind one of these traits:
//! model inference, image generation, object storage and web search. The
//! engine holds them as `Arc<dyn ...>` inside its context and never knows
//! which backend sits behind them.

use std::borrow::Cow;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CollaboratorResult;

/// Stage identity used to address model calls and tag messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Coordinator,
    Planner,
    Supervisor,
    Researcher,
    Storywriter,
    Visualizer,
    DataAnalyst,
    Reviewer,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Coordinator => "coordinator",
            AgentRole::Planner => "planner",
            AgentRole::Supervisor => "supervisor",
            AgentRole::Researcher => "researcher",
            AgentRole::Storywriter => "storywriter",
            AgentRole::Visualizer => "visualizer",
            AgentRole::DataAnalyst => "data_analyst",
            AgentRole::Reviewer => "reviewer",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One conversation turn. `name` is the author tag (`planner`, `reviewer`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            name: None,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            name: None,
            content: content.into(),
        }
    }

    /// Message authored by an engine stage
    pub fn from_agent(author: AgentRole, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            name: Some(author.as_str().to_string()),
            content: content.into(),
        }
    }

    pub fn is_from(&self, author: AgentRole) -> bool {
        self.name.as_deref() == Some(author.as_str())
    }
}

/// Output contract handed to the model client alongside the messages
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

impl OutputSchema {
    pub fn of<T: JsonSchema>() -> Self {
        Self {
            name: T::schema_name().into_owned(),
            schema: serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub role: AgentRole,
    pub messages: Vec<ChatMessage>,
    pub schema: OutputSchema,
}

/// Model inference: `invoke(role, messages, schema)`.
///
/// Implementations return the raw structured value; the engine is
/// responsible for validating it against the schema type.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn invoke(&self, request: ModelRequest) -> CollaboratorResult<serde_json::Value>;
}

/// Opaque continuation value issued by the image service.
///
/// The engine never inspects it; it is stored with the slide signature and
/// handed back on the next edit of the same slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken(Bytes);

impl ContinuationToken {
    pub fn new(raw: impl Into<Bytes>) -> Self {
        Self(raw.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for ContinuationToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for ContinuationToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(|raw| Self(Bytes::from(raw)))
            .map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for ContinuationToken {
    fn schema_name() -> Cow<'static, str> {
        "ContinuationToken".into()
    }

    fn json_schema(_generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
        schemars::json_schema!({
            "type": "string",
            "contentEncoding": "base64"
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Low,
    #[default]
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MediaResolution {
    Medium,
    #[default]
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "1:1")]
    Square,
}

/// Image engine parameters chosen by the visualizer model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GenerationConfig {
    pub thinking_level: ThinkingLevel,
    pub media_resolution: MediaResolution,
    pub aspect_ratio: AspectRatio,
}

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub seed: u64,
    pub reference: Option<Bytes>,
    pub continuation_token: Option<ContinuationToken>,
    pub config: GenerationConfig,
}

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Bytes,
    pub continuation_token: Option<ContinuationToken>,
}

/// Image generation: `generate(prompt, seed, reference?, token?)`
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: ImageRequest) -> CollaboratorResult<GeneratedImage>;
}

/// Byte storage addressed by URL
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, bytes: Bytes, content_type: &str) -> CollaboratorResult<String>;
    async fn get(&self, url: &str) -> CollaboratorResult<Bytes>;
}

/// Web search used by research workers and search-before-planning
#[async_trait]
pub trait SearchTool: Send + Sync {
    async fn search(&self, query: &str) -> CollaboratorResult<String>;
}
