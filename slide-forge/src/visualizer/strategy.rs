//! Reference-image strategy and edit-mode bookkeeping

use serde::Deserialize;
use tracing::debug;

use crate::design::{DesignContext, ReferenceImage};
use crate::schemas::{ImagePrompt, StepRole};
use crate::state::WorkflowState;

/// Where slides get their shared style reference from, in precedence order
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceStrategy {
    /// Caller-forced image for every slide
    Override(ReferenceImage),
    /// Per-slide template image chosen by layout; no anchor is generated
    Template,
    /// Generate a dedicated style anchor first and reference it everywhere
    DedicatedAnchor(String),
    /// Download the anchor an earlier visual step recorded
    ReuseAnchor(String),
    /// Generate slide one first and reference it for the rest
    FirstSlide,
}

impl ReferenceStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ReferenceStrategy::Override(_) => "override",
            ReferenceStrategy::Template => "template",
            ReferenceStrategy::DedicatedAnchor(_) => "dedicated_anchor",
            ReferenceStrategy::ReuseAnchor(_) => "reuse_anchor",
            ReferenceStrategy::FirstSlide => "first_slide",
        }
    }
}

pub fn select_strategy(
    override_image: Option<&ReferenceImage>,
    design: Option<&DesignContext>,
    anchor_prompt: Option<&str>,
    prior_anchor_url: Option<&str>,
) -> ReferenceStrategy {
    if let Some(image) = override_image {
        return ReferenceStrategy::Override(image.clone());
    }
    if design.map(DesignContext::has_templates).unwrap_or(false) {
        return ReferenceStrategy::Template;
    }
    if let Some(prompt) = anchor_prompt.filter(|p| !p.trim().is_empty()) {
        return ReferenceStrategy::DedicatedAnchor(prompt.to_string());
    }
    if let Some(url) = prior_anchor_url {
        return ReferenceStrategy::ReuseAnchor(url.to_string());
    }
    ReferenceStrategy::FirstSlide
}

/// Lenient view of an earlier visual artifact; error artifacts parse as empty
#[derive(Debug, Default, Deserialize)]
struct PriorVisual {
    #[serde(default)]
    anchor_image_url: Option<String>,
    #[serde(default)]
    prompts: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
struct PriorRun {
    step_id: u32,
    anchor_image_url: Option<String>,
    prompts: Vec<ImagePrompt>,
}

/// Slides generated by earlier visual steps, most recent step first
#[derive(Debug, Clone, Default)]
pub struct PriorGenerations {
    runs: Vec<PriorRun>,
}

impl PriorGenerations {
    pub fn collect(state: &WorkflowState) -> Self {
        let runs = state
            .artifacts_by_recency(StepRole::Visualizer)
            .into_iter()
            .map(|(step_id, blob)| {
                let parsed: PriorVisual = serde_json::from_str(blob).unwrap_or_default();
                let prompts: Vec<ImagePrompt> = parsed
                    .prompts
                    .into_iter()
                    .filter_map(|p| serde_json::from_value(p).ok())
                    .collect();
                debug!(step_id, slides = prompts.len(), "prior visual artifact");
                PriorRun {
                    step_id,
                    anchor_image_url: parsed.anchor_image_url,
                    prompts,
                }
            })
            .collect();
        Self { runs }
    }

    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(|r| r.prompts.is_empty())
    }

    /// Anchor recorded by the most recent step that has one
    pub fn anchor_url(&self) -> Option<&str> {
        self.runs
            .iter()
            .find_map(|r| r.anchor_image_url.as_deref())
    }

    /// Latest usable generation of `slide_number`
    pub fn for_slide(&self, slide_number: u32) -> Option<&ImagePrompt> {
        self.runs
            .iter()
            .flat_map(|r| r.prompts.iter())
            .find(|p| {
                p.slide_number == slide_number
                    && (p.thought_signature.is_some() || p.generated_image_url.is_some())
            })
    }

    /// Step ids with prior output, most recent first
    pub fn step_ids(&self) -> Vec<u32> {
        self.runs.iter().map(|r| r.step_id).collect()
    }

    /// Edit-mode listing shown to the model
    pub fn to_context_json(&self) -> String {
        let prompts: Vec<&ImagePrompt> = self.runs.iter().flat_map(|r| r.prompts.iter()).collect();
        serde_json::to_string_pretty(&prompts).unwrap_or_default()
    }
}
