//! Typed outputs of every model call.
//!
//! Each type derives `JsonSchema`; the schema is handed to the model client
//! and the returned value is validated by deserializing into the type. Doc
//! comments on fields end up as schema descriptions.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use slide_forge_sdk::{AgentRole, ContinuationToken, GenerationConfig};

// ============================================================================
// Plan
// ============================================================================

/// Worker roles a plan step can be assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepRole {
    Researcher,
    Storywriter,
    Visualizer,
    DataAnalyst,
}

impl StepRole {
    pub const ALL: [StepRole; 4] = [
        StepRole::Researcher,
        StepRole::Storywriter,
        StepRole::Visualizer,
        StepRole::DataAnalyst,
    ];

    /// Suffix of the artifact key this role writes
    pub fn artifact_suffix(&self) -> &'static str {
        match self {
            StepRole::Researcher => "research",
            StepRole::Storywriter => "story",
            StepRole::Visualizer => "visual",
            StepRole::DataAnalyst => "data",
        }
    }

    pub fn agent_role(&self) -> AgentRole {
        match self {
            StepRole::Researcher => AgentRole::Researcher,
            StepRole::Storywriter => AgentRole::Storywriter,
            StepRole::Visualizer => AgentRole::Visualizer,
            StepRole::DataAnalyst => AgentRole::DataAnalyst,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.agent_role().as_str()
    }
}

impl fmt::Display for StepRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResearchPriority {
    High,
    #[default]
    Medium,
    Low,
}

/// One research perspective, investigated by an isolated worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResearchTask {
    pub id: u32,
    /// Angle of investigation, e.g. "market size" or "regulation"
    pub perspective: String,
    /// Suggested search queries
    #[serde(default)]
    pub query_hints: Vec<String>,
    #[serde(default)]
    pub priority: ResearchPriority,
    /// What the final report for this perspective should contain
    pub expected_output: String,
}

/// One unit of the plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskStep {
    /// Step number, unique within the plan (starts at 1)
    pub id: u32,
    pub role: StepRole,
    /// Detailed instruction for the worker
    pub instruction: String,
    /// Short summary of the step
    pub description: String,
    /// Tone and style guidance for visual steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_direction: Option<String>,
    /// Research perspectives for researcher steps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub research_tasks: Vec<ResearchTask>,
}

impl TaskStep {
    /// `step_{id}_{suffix}`
    pub fn artifact_key(&self) -> String {
        artifact_key(self.id, self.role)
    }
}

pub fn artifact_key(step_id: u32, role: StepRole) -> String {
    format!("step_{}_{}", step_id, role.artifact_suffix())
}

/// Split an artifact key into step id and role
pub fn parse_artifact_key(key: &str) -> Option<(u32, StepRole)> {
    let rest = key.strip_prefix("step_")?;
    let (id, suffix) = rest.split_once('_')?;
    let id = id.parse().ok()?;
    let role = StepRole::ALL
        .into_iter()
        .find(|r| r.artifact_suffix() == suffix)?;
    Some((id, role))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlannerOutput {
    pub steps: Vec<TaskStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CoordinatorOutput {
    /// True when the request needs the planning pipeline
    pub handoff_to_planner: bool,
    /// Direct answer when no handoff is needed
    #[serde(default)]
    pub response: String,
}

// ============================================================================
// Worker outputs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SlideContent {
    pub slide_number: u32,
    pub title: String,
    pub bullet_points: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StorywriterOutput {
    pub slides: Vec<SlideContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum DataValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DataPoint {
    pub label: String,
    pub value: DataValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VisualType {
    BarChart,
    LineChart,
    PieChart,
    Flowchart,
    Infographic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VisualBlueprint {
    pub visual_type: VisualType,
    pub title: String,
    pub data_series: Vec<DataPoint>,
    #[serde(default)]
    pub annotations: Vec<String>,
    #[serde(default)]
    pub design_notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DataAnalystOutput {
    pub blueprints: Vec<VisualBlueprint>,
}

/// Critic verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReviewOutput {
    pub approved: bool,
    /// Quality score in 0.0..=1.0
    pub score: f64,
    /// Concrete improvement feedback, or a comment on approval
    pub feedback: String,
}

// ============================================================================
// Research
// ============================================================================

/// One turn of a research worker: search again, or hand in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ResearchTurn {
    Search {
        query: String,
    },
    Finish {
        report: String,
        #[serde(default)]
        sources: Vec<String>,
        /// Confidence in the findings, 0.0..=1.0
        confidence: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResearchResult {
    pub task_id: u32,
    pub perspective: String,
    pub report: String,
    #[serde(default)]
    pub sources: Vec<String>,
    pub confidence: f64,
}

// ============================================================================
// Visualizer
// ============================================================================

/// Slide layout categories of a presentation template
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum LayoutType {
    TitleSlide,
    TitleAndContent,
    SectionHeader,
    TwoContent,
    Comparison,
    ContentWithCaption,
    PictureWithCaption,
    TitleOnly,
    TitleAndVerticalText,
    VerticalTitleAndText,
    Blank,
    Other,
}

impl LayoutType {
    /// Closest layout to borrow a template from when this one has none
    pub fn fallback(&self) -> Option<LayoutType> {
        match self {
            LayoutType::SectionHeader => Some(LayoutType::TitleSlide),
            LayoutType::TwoContent => Some(LayoutType::Comparison),
            LayoutType::ContentWithCaption | LayoutType::PictureWithCaption => {
                Some(LayoutType::TitleAndContent)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StructuredImagePrompt {
    /// e.g. "Title Slide", "Content", "Data Visualization"
    pub slide_type: String,
    pub main_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_title: Option<String>,
    /// Body text rendered on the slide
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
    pub visual_style: String,
}

impl StructuredImagePrompt {
    /// Render the final text prompt; the last line always starts with
    /// `Visual style:`
    pub fn compile(&self, slide_number: u32) -> String {
        let mut lines = vec![
            format!("# Slide{}: {}", slide_number, self.slide_type),
            format!("## {}", self.main_title),
        ];
        if let Some(sub) = self.sub_title.as_deref().filter(|s| !s.trim().is_empty()) {
            lines.push(format!("### {}", sub));
        }
        if let Some(contents) = self.contents.as_deref().filter(|s| !s.trim().is_empty()) {
            lines.push(contents.trim_end().to_string());
        }
        lines.push(format!("Visual style: {}", self.visual_style));
        lines.join("\n")
    }
}

/// Generation metadata that makes a slide editable with continuity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ThoughtSignature {
    pub seed: u64,
    pub base_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    /// Reference image actually used for this generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<ContinuationToken>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ImagePrompt {
    pub slide_number: u32,
    /// Final text prompt; filled from `structured_prompt` when that is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_generation_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_prompt: Option<StructuredImagePrompt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_type: Option<LayoutType>,
    /// Why this visual was chosen
    #[serde(default)]
    pub rationale: String,
    /// Set by the engine after generation
    #[serde(default)]
    pub generated_image_url: Option<String>,
    /// Set by the engine after generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<ThoughtSignature>,
}

impl ImagePrompt {
    /// Text sent to the image service
    pub fn prompt_text(&self) -> Option<String> {
        match &self.structured_prompt {
            Some(structured) => Some(structured.compile(self.slide_number)),
            None => self
                .image_generation_prompt
                .clone()
                .filter(|p| !p.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VisualizerOutput {
    /// Prompt for a dedicated style anchor, generated before any slide
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_image_prompt: Option<String>,
    /// Set by the engine when an anchor was generated or reused
    #[serde(default)]
    pub anchor_image_url: Option<String>,
    pub prompts: Vec<ImagePrompt>,
    #[serde(default)]
    pub generation_config: GenerationConfig,
    /// Seed for slides that have no earlier signature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}
