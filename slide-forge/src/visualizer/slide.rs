//! Single-slide generation unit

use bytes::Bytes;
use rand::Rng;
use slide_forge_sdk::{ContinuationToken, GeneratedImage, GenerationConfig, ImageRequest};
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::RunContext;
use crate::design::DesignContext;
use crate::error::{EngineError, EngineResult};
use crate::schemas::{ImagePrompt, ThoughtSignature};
use crate::visualizer::strategy::PriorGenerations;

const IMAGE_TOOL: &str = "image_generation";
const IMAGE_CONTENT_TYPE: &str = "image/png";

/// Reference bytes every slide in the batch is generated against
#[derive(Debug, Clone)]
pub struct SharedReference {
    pub bytes: Bytes,
    pub url: Option<String>,
}

#[derive(Debug)]
pub struct RenderedSlide {
    pub prompt: ImagePrompt,
    pub bytes: Bytes,
}

/// A slide that could not be generated; its URL stays null
#[derive(Debug)]
pub struct SlideFailure {
    pub prompt: ImagePrompt,
    pub error: EngineError,
}

/// Inputs shared by every slide of one visual step
pub struct SlideJob<'a> {
    pub shared: Option<&'a SharedReference>,
    pub design: Option<&'a DesignContext>,
    pub priors: &'a PriorGenerations,
    pub config: GenerationConfig,
    /// Seed for slides without an earlier signature
    pub default_seed: Option<u64>,
}

impl SlideJob<'_> {
    pub async fn render(
        &self,
        mut item: ImagePrompt,
        run: &RunContext,
    ) -> Result<RenderedSlide, SlideFailure> {
        match self.try_render(&mut item, run).await {
            Ok(bytes) => Ok(RenderedSlide {
                prompt: item,
                bytes,
            }),
            Err(error) => Err(SlideFailure {
                prompt: item,
                error,
            }),
        }
    }

    async fn try_render(&self, item: &mut ImagePrompt, run: &RunContext) -> EngineResult<Bytes> {
        // URL and signature are engine-owned; whatever the model wrote is dropped
        item.generated_image_url = None;
        item.thought_signature = None;
        let text = item.prompt_text().ok_or_else(|| {
            EngineError::invalid_state(format!("slide {} has no prompt", item.slide_number))
        })?;
        item.image_generation_prompt = Some(text.clone());

        // deep edit: same slide number, most recent step first
        let prior = self.priors.for_slide(item.slide_number);
        let prior_signature = prior.and_then(|p| p.thought_signature.as_ref());
        let seed = prior_signature
            .map(|s| s.seed)
            .or(self.default_seed)
            .unwrap_or_else(fresh_seed);
        let token = prior_signature.and_then(|s| s.continuation_token.clone());

        let (reference, reference_url) = self.resolve_reference(item, prior, run).await;
        info!(
            slide = item.slide_number,
            seed,
            has_reference = reference.is_some(),
            edit = prior_signature.is_some(),
            "generating slide"
        );

        let (image, url) = generate_and_store(
            run,
            &text,
            seed,
            reference,
            token,
            self.config,
            item.slide_number,
        )
        .await?;

        item.generated_image_url = Some(url);
        item.thought_signature = Some(ThoughtSignature {
            seed,
            base_prompt: text,
            refined_prompt: None,
            model_version: None,
            reference_image_url: reference_url,
            continuation_token: image.continuation_token,
        });
        Ok(image.bytes)
    }

    /// Shared anchor, then the layout template, then the slide's own prior image
    async fn resolve_reference(
        &self,
        item: &ImagePrompt,
        prior: Option<&ImagePrompt>,
        run: &RunContext,
    ) -> (Option<Bytes>, Option<String>) {
        if let Some(shared) = self.shared {
            return (Some(shared.bytes.clone()), shared.url.clone());
        }
        if let Some(template) = self
            .design
            .and_then(|d| d.template_for_layout(item.layout_type))
        {
            return (Some(template.bytes.clone()), template.url.clone());
        }
        if let Some(url) = prior.and_then(|p| p.generated_image_url.as_deref()) {
            match run.clients().store.get(url).await {
                Ok(bytes) => return (Some(bytes), Some(url.to_string())),
                Err(e) => {
                    warn!(slide = item.slide_number, %url, error = %e, "prior image download failed")
                }
            }
        }
        (None, None)
    }
}

/// Generate the dedicated style anchor; it never has a reference itself
pub async fn generate_anchor(
    prompt: &str,
    seed: u64,
    config: GenerationConfig,
    run: &RunContext,
) -> EngineResult<SharedReference> {
    info!(seed, "generating style anchor");
    let (image, url) = generate_and_store(run, prompt, seed, None, None, config, 0).await?;
    Ok(SharedReference {
        bytes: image.bytes,
        url: Some(url),
    })
}

async fn generate_and_store(
    run: &RunContext,
    prompt: &str,
    seed: u64,
    reference: Option<Bytes>,
    continuation_token: Option<ContinuationToken>,
    config: GenerationConfig,
    slide_number: u32,
) -> EngineResult<(GeneratedImage, String)> {
    let call_id = format!(
        "{}_slide_{}_{}",
        run.workflow_id,
        slide_number,
        Uuid::new_v4().simple()
    );
    run.events.tool_call(
        &call_id,
        IMAGE_TOOL,
        serde_json::json!({
            "slide_number": slide_number,
            "seed": seed,
            "has_reference": reference.is_some(),
            "aspect_ratio": config.aspect_ratio,
        }),
    );

    let image = run
        .clients()
        .images
        .generate(ImageRequest {
            prompt: prompt.to_string(),
            seed,
            reference,
            continuation_token,
            config,
        })
        .await?;
    let url = run
        .clients()
        .store
        .put(image.bytes.clone(), IMAGE_CONTENT_TYPE)
        .await?;

    run.events.tool_result(&call_id, IMAGE_TOOL, url.clone());
    Ok((image, url))
}

/// Random seed in the 32-bit range
pub fn fresh_seed() -> u64 {
    rand::thread_rng().gen_range(0..=u64::from(u32::MAX))
}
