//! Image-consistency engine
//!
//! The visualizer model writes one prompt per slide; this module turns those
//! prompts into images that look like they belong to the same deck:
//!
//! - **strategy**: picks the shared reference (override, template, anchor,
//!   first slide) and reads earlier visual steps for edit mode
//! - **slide**: generates and stores one slide, reusing the seed and
//!   continuation token of its previous version
//!
//! Slides after the anchor are generated concurrently under
//! `visualizer_concurrency`. A slide that fails keeps a null URL; the rest of
//! the deck is unaffected.

pub mod slide;
pub mod strategy;

use async_trait::async_trait;
use slide_forge_sdk::AgentRole;
use tracing::{info, warn};

use crate::context::RunContext;
use crate::design::{DesignContext, ReferenceImage};
use crate::error::EngineResult;
use crate::schemas::{ImagePrompt, StepRole, TaskStep, VisualizerOutput};
use crate::stages::worker::{build_messages, to_artifact};
use crate::stages::WorkerStage;
use crate::state::WorkflowState;
use crate::workflow_utils::execute_batch;

pub use slide::{fresh_seed, SharedReference, SlideJob};
pub use strategy::{select_strategy, PriorGenerations, ReferenceStrategy};

pub struct VisualizerStage;

#[async_trait]
impl WorkerStage for VisualizerStage {
    fn role(&self) -> StepRole {
        StepRole::Visualizer
    }

    async fn produce(
        &self,
        step: &TaskStep,
        state: &mut WorkflowState,
        run: &RunContext,
    ) -> EngineResult<String> {
        let priors = PriorGenerations::collect(state);

        let mut sections = Vec::new();
        if let Some(direction) = step
            .design_direction
            .as_deref()
            .filter(|d| !d.trim().is_empty())
        {
            sections.push(format!("[Design Direction from Planner]\n{}", direction));
        }
        if let Some(design) = &state.design_context {
            sections.push(design.prompt_summary());
        }
        if !priors.is_empty() {
            info!(steps = ?priors.step_ids(), "edit mode: previous generations found");
            sections.push(format!(
                "# PREVIOUS GENERATIONS (EDIT MODE)\nUser wants to modify these. Maintain consistency with seed/style if specified:\n{}",
                priors.to_context_json()
            ));
        }

        let messages = build_messages(AgentRole::Visualizer, step, state, &sections);
        let output: VisualizerOutput = run
            .invoke_structured(AgentRole::Visualizer, messages)
            .await?;

        let rendered = render_deck(
            output,
            &priors,
            state.design_context.as_ref(),
            state.reference_override.as_ref(),
            run,
        )
        .await;
        to_artifact(&rendered)
    }
}

/// Generate every slide of `output` and record URLs and signatures on it
pub async fn render_deck(
    mut output: VisualizerOutput,
    priors: &PriorGenerations,
    design: Option<&DesignContext>,
    override_image: Option<&ReferenceImage>,
    run: &RunContext,
) -> VisualizerOutput {
    // only an anchor this run generated or reused is recorded
    output.anchor_image_url = None;
    let mut targets = std::mem::take(&mut output.prompts);
    if targets.is_empty() {
        warn!("visualizer produced no slide prompts");
        return output;
    }
    let config = output.generation_config;

    let strategy = select_strategy(
        override_image,
        design,
        output.anchor_image_prompt.as_deref(),
        priors.anchor_url(),
    );
    info!(strategy = strategy.name(), slides = targets.len(), "reference strategy selected");

    let mut shared: Option<SharedReference> = None;
    let mut first_slide_anchor = false;
    match strategy {
        ReferenceStrategy::Override(image) => {
            shared = Some(SharedReference {
                bytes: image.bytes,
                url: image.url,
            });
        }
        ReferenceStrategy::Template => {}
        ReferenceStrategy::DedicatedAnchor(prompt) => {
            let seed = output.seed.unwrap_or_else(fresh_seed);
            match slide::generate_anchor(&prompt, seed, config, run).await {
                Ok(anchor) => {
                    output.anchor_image_url = anchor.url.clone();
                    shared = Some(anchor);
                }
                Err(e) => {
                    warn!(error = %e, "style anchor failed, generating without one");
                    run.events
                        .error(Some(AgentRole::Visualizer), format!("style anchor failed: {}", e));
                }
            }
        }
        ReferenceStrategy::ReuseAnchor(url) => match run.clients().store.get(&url).await {
            Ok(bytes) => {
                info!(%url, bytes = bytes.len(), "reusing style anchor");
                output.anchor_image_url = Some(url.clone());
                shared = Some(SharedReference {
                    bytes,
                    url: Some(url),
                });
            }
            Err(e) => {
                warn!(%url, error = %e, "existing anchor unavailable, using slide 1 instead");
                first_slide_anchor = true;
            }
        },
        ReferenceStrategy::FirstSlide => first_slide_anchor = true,
    }

    let mut rendered: Vec<ImagePrompt> = Vec::with_capacity(targets.len());

    if first_slide_anchor {
        targets.sort_by_key(|p| p.slide_number);
        let first = targets.remove(0);
        let job = SlideJob {
            shared: None,
            design,
            priors,
            config,
            default_seed: output.seed,
        };
        match job.render(first, run).await {
            Ok(slide) => {
                shared = Some(SharedReference {
                    url: slide.prompt.generated_image_url.clone(),
                    bytes: slide.bytes,
                });
                rendered.push(slide.prompt);
            }
            Err(failure) => {
                warn!(slide = failure.prompt.slide_number, error = %failure.error, "anchor slide failed");
                rendered.push(failure.prompt);
            }
        }
    }

    let job = SlideJob {
        shared: shared.as_ref(),
        design,
        priors,
        config,
        default_seed: output.seed,
    };
    let job = &job;
    let report = execute_batch(
        targets,
        run.settings().visualizer_concurrency,
        move |item, _ctx| job.render(item, run),
    )
    .await;

    let failed = report.failed();
    let succeeded = report.succeeded();
    for outcome in report.into_outcomes() {
        match outcome {
            Ok(slide) => rendered.push(slide.prompt),
            Err(failure) => {
                warn!(slide = failure.prompt.slide_number, error = %failure.error, "slide generation failed");
                run.events.error(
                    Some(AgentRole::Visualizer),
                    format!("slide {} failed: {}", failure.prompt.slide_number, failure.error),
                );
                rendered.push(failure.prompt);
            }
        }
    }

    rendered.sort_by_key(|p| p.slide_number);
    info!(slides = rendered.len(), succeeded, failed, "visualizer batch complete");
    output.prompts = rendered;
    output
}
