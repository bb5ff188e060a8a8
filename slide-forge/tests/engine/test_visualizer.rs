//! Image-consistency tests: reference strategies, deep edits, concurrency

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use super::common::*;
use slide_forge::schemas::{LayoutType, VisualizerOutput};
use slide_forge::testing::{CannedSearch, RecordingImageGenerator, ScriptedModel};
use slide_forge::{DesignContext, EngineSettings, ReferenceImage, RunOutcome, TurnRequest};
use slide_forge_sdk::{AgentRole, ObjectStore};

fn visual_artifact(state: &slide_forge::WorkflowState, key: &str) -> VisualizerOutput {
    serde_json::from_str(&state.artifacts[key]).unwrap()
}

fn visual_model(output: serde_json::Value) -> ScriptedModel {
    ScriptedModel::new()
        .reply(AgentRole::Planner, plan(&[(1, "visualizer")]))
        .reply(AgentRole::Visualizer, output)
        .fallback(AgentRole::Reviewer, approve())
}

#[tokio::test]
async fn test_dedicated_anchor_is_referenced_by_every_slide() {
    let h = Harness::new(visual_model(visual(
        &[1, 2, 3],
        Some("Muted teal palette, flat shapes"),
        Some(77),
    )));

    let report = h.say("s1", "Illustrate the deck").await;
    assert_eq!(report.outcome, RunOutcome::Completed { steps: 1 });

    let calls = h.images.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[0].prompt, "Muted teal palette, flat shapes");
    assert!(calls[0].reference.is_none());
    let anchor_bytes = Bytes::from("IMG1:Muted teal palette, flat shapes");
    for call in &calls[1..] {
        assert_eq!(call.reference.as_ref(), Some(&anchor_bytes));
        assert_eq!(call.seed, 77);
    }

    let output = visual_artifact(&report.state, "step_1_visual");
    let anchor_url = output.anchor_image_url.clone().unwrap();
    assert_eq!(h.store.get(&anchor_url).await.unwrap(), anchor_bytes);
    assert_eq!(
        output.prompts.iter().map(|p| p.slide_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    for prompt in &output.prompts {
        assert!(prompt.generated_image_url.is_some());
        let signature = prompt.thought_signature.as_ref().unwrap();
        assert_eq!(signature.seed, 77);
        assert_eq!(signature.reference_image_url.as_deref(), Some(anchor_url.as_str()));
        assert!(signature.continuation_token.is_some());
    }
}

#[tokio::test]
async fn test_first_slide_becomes_the_reference() {
    let h = Harness::new(visual_model(visual(&[3, 1, 2], None, None)));

    let report = h.say("s1", "Illustrate the deck").await;
    assert_eq!(report.outcome, RunOutcome::Completed { steps: 1 });

    let calls = h.images.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].prompt, "Slide 1 illustration");
    assert!(calls[0].reference.is_none());
    let first = Bytes::from("IMG1:Slide 1 illustration");
    for call in &calls[1..] {
        assert_eq!(call.reference.as_ref(), Some(&first));
    }
    assert!(calls.iter().all(|c| c.seed <= u64::from(u32::MAX)));

    let output = visual_artifact(&report.state, "step_1_visual");
    assert!(output.anchor_image_url.is_none());
    assert!(output.prompts.iter().all(|p| p.generated_image_url.is_some()));
}

#[tokio::test]
async fn test_existing_anchor_is_reused_across_turns() {
    let model = ScriptedModel::new()
        .fallback(AgentRole::Planner, plan(&[(1, "visualizer")]))
        .reply(AgentRole::Visualizer, visual(&[1], Some("House style"), None))
        .reply(AgentRole::Visualizer, visual(&[2, 3], None, None))
        .fallback(AgentRole::Reviewer, approve());
    let h = Harness::new(model);

    let first = h.say("s1", "Start the deck").await;
    let anchor_url = visual_artifact(&first.state, "step_1_visual")
        .anchor_image_url
        .unwrap();
    assert_eq!(h.images.call_count(), 2);

    let second = h
        .turn(
            "s1",
            TurnRequest::user("Add two slides").with_retained_artifacts(first.state.artifacts.clone()),
        )
        .await;
    assert_eq!(second.outcome, RunOutcome::Completed { steps: 1 });

    // no new anchor: one call per new slide, all against the stored anchor
    let calls = h.images.calls();
    assert_eq!(calls.len(), 4);
    let anchor_bytes = Bytes::from("IMG1:House style");
    for call in &calls[2..] {
        assert_eq!(call.reference.as_ref(), Some(&anchor_bytes));
    }
    let output = visual_artifact(&second.state, "step_1_visual");
    assert_eq!(output.anchor_image_url.as_deref(), Some(anchor_url.as_str()));
    for prompt in &output.prompts {
        let signature = prompt.thought_signature.as_ref().unwrap();
        assert_eq!(signature.reference_image_url.as_deref(), Some(anchor_url.as_str()));
    }

    // the visualizer was told about the earlier generation
    let visual_calls: Vec<_> = h
        .model
        .calls()
        .into_iter()
        .filter(|c| c.role == AgentRole::Visualizer)
        .collect();
    assert!(last_user_content(&visual_calls[1].messages)
        .contains("# PREVIOUS GENERATIONS (EDIT MODE)"));
}

#[tokio::test]
async fn test_second_visual_step_in_plan_reuses_first_anchor() {
    let model = ScriptedModel::new()
        .reply(
            AgentRole::Planner,
            plan(&[(1, "visualizer"), (2, "visualizer")]),
        )
        .reply(AgentRole::Visualizer, visual(&[1], Some("House style"), None))
        .reply(AgentRole::Visualizer, visual(&[2, 3], None, None))
        .fallback(AgentRole::Reviewer, approve());
    let h = Harness::new(model);

    let report = h.say("s1", "Build the deck").await;
    assert_eq!(report.outcome, RunOutcome::Completed { steps: 2 });

    // one anchor for the whole plan
    let calls = h.images.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls.iter().filter(|c| c.prompt == "House style").count(), 1);
    let anchor_bytes = Bytes::from("IMG1:House style");
    for call in &calls[1..] {
        assert_eq!(call.reference.as_ref(), Some(&anchor_bytes));
    }

    let first = visual_artifact(&report.state, "step_1_visual");
    let anchor_url = first.anchor_image_url.clone().unwrap();
    let second = visual_artifact(&report.state, "step_2_visual");
    assert_eq!(second.anchor_image_url.as_deref(), Some(anchor_url.as_str()));
    for prompt in first.prompts.iter().chain(second.prompts.iter()) {
        let signature = prompt.thought_signature.as_ref().unwrap();
        assert_eq!(signature.reference_image_url.as_deref(), Some(anchor_url.as_str()));
    }
}

#[tokio::test]
async fn test_model_written_urls_are_not_recorded() {
    let mut output = visual(&[1, 2], None, None);
    output["anchor_image_url"] = json!("mem://bogus-anchor");
    output["prompts"][0]["thought_signature"] = json!({
        "seed": 5,
        "base_prompt": "echoed",
        "reference_image_url": "mem://never-used",
    });
    let h = Harness::new(visual_model(output));

    let report = h.say("s1", "Illustrate the deck").await;
    assert_eq!(report.outcome, RunOutcome::Completed { steps: 1 });

    // slide 1 is the first-slide reference and was generated without one
    let calls = h.images.calls();
    assert!(calls[0].reference.is_none());

    let output = visual_artifact(&report.state, "step_1_visual");
    assert!(output.anchor_image_url.is_none());
    let first = output.prompts[0].thought_signature.as_ref().unwrap();
    assert!(first.reference_image_url.is_none());
    assert_eq!(first.base_prompt, "Slide 1 illustration");
    let second = output.prompts[1].thought_signature.as_ref().unwrap();
    assert_eq!(
        second.reference_image_url,
        output.prompts[0].generated_image_url
    );
}

#[tokio::test]
async fn test_deep_edit_reuses_seed_token_and_prior_image() {
    let model = ScriptedModel::new()
        .fallback(AgentRole::Planner, plan(&[(1, "visualizer")]))
        .reply(AgentRole::Visualizer, visual(&[1], None, Some(4242)))
        .reply(
            AgentRole::Visualizer,
            json!({ "prompts": [{
                "slide_number": 1,
                "image_generation_prompt": "Slide 1 illustration, warmer colors",
                "rationale": "user asked for warmer colors"
            }]}),
        )
        .fallback(AgentRole::Reviewer, approve());
    let h = Harness::new(model);

    let first = h.say("s1", "Make slide 1").await;
    let before = visual_artifact(&first.state, "step_1_visual");
    let old_url = before.prompts[0].generated_image_url.clone().unwrap();

    let second = h
        .turn(
            "s1",
            TurnRequest::user("Make slide 1 warmer")
                .with_retained_artifacts(first.state.artifacts.clone()),
        )
        .await;
    assert_eq!(second.outcome, RunOutcome::Completed { steps: 1 });

    let calls = h.images.calls();
    assert_eq!(calls.len(), 2);
    let edit = &calls[1];
    assert_eq!(edit.seed, 4242);
    assert_eq!(
        edit.reference.as_ref(),
        Some(&Bytes::from("IMG1:Slide 1 illustration"))
    );
    assert_eq!(edit.continuation_token.as_ref().unwrap().as_bytes(), b"tok-1");

    let after = visual_artifact(&second.state, "step_1_visual");
    let signature = after.prompts[0].thought_signature.as_ref().unwrap();
    assert_eq!(signature.seed, 4242);
    assert_eq!(signature.reference_image_url.as_deref(), Some(old_url.as_str()));
    assert_eq!(signature.continuation_token.as_ref().unwrap().as_bytes(), b"tok-2");
    assert_ne!(after.prompts[0].generated_image_url.as_deref(), Some(old_url.as_str()));
}

#[tokio::test]
async fn test_slide_generation_respects_concurrency_limit() {
    let slides: Vec<u32> = (1..=8).collect();
    let settings = EngineSettings {
        visualizer_concurrency: 3,
        ..settings()
    };
    let h = Harness::build(
        visual_model(visual(&slides, None, None)),
        RecordingImageGenerator::new().with_delay(Duration::from_millis(20)),
        CannedSearch::new(),
        settings,
    );

    let report = h.say("s1", "Illustrate the deck").await;

    assert_eq!(report.outcome, RunOutcome::Completed { steps: 1 });
    assert_eq!(h.images.call_count(), 8);
    assert_eq!(h.images.max_in_flight(), 3);
}

#[tokio::test]
async fn test_failed_slide_keeps_null_url() {
    let h = Harness::build(
        visual_model(visual(&[1, 2, 3], Some("Anchor style"), None)),
        RecordingImageGenerator::new().fail_on("Slide 2"),
        CannedSearch::new(),
        settings(),
    );

    let report = h.say("s1", "Illustrate the deck").await;

    assert_eq!(report.outcome, RunOutcome::Completed { steps: 1 });
    let output = visual_artifact(&report.state, "step_1_visual");
    let urls: Vec<bool> = output
        .prompts
        .iter()
        .map(|p| p.generated_image_url.is_some())
        .collect();
    assert_eq!(urls, vec![true, false, true]);
    assert!(output.prompts[1].thought_signature.is_none());
}

#[tokio::test]
async fn test_failed_anchor_generates_without_reference() {
    let h = Harness::build(
        visual_model(visual(&[1, 2], Some("Broken anchor"), None)),
        RecordingImageGenerator::new().fail_on("Broken"),
        CannedSearch::new(),
        settings(),
    );

    let report = h.say("s1", "Illustrate the deck").await;

    let output = visual_artifact(&report.state, "step_1_visual");
    assert!(output.anchor_image_url.is_none());
    assert!(output.prompts.iter().all(|p| p.generated_image_url.is_some()));
    let calls = h.images.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls[1..].iter().all(|c| c.reference.is_none()));
}

#[tokio::test]
async fn test_template_images_replace_the_anchor() {
    let mut layout_images = BTreeMap::new();
    layout_images.insert(
        LayoutType::TitleSlide,
        ReferenceImage::new(Bytes::from_static(b"TITLE-TEMPLATE"), None),
    );
    let design = DesignContext {
        layout_images,
        default_image: Some(ReferenceImage::new(Bytes::from_static(b"DEFAULT"), None)),
        source_filename: Some("corporate.pptx".to_string()),
        ..Default::default()
    };
    let output = json!({
        "anchor_image_prompt": "ignored when templates exist",
        "prompts": [
            { "slide_number": 1, "image_generation_prompt": "Cover", "layout_type": "title_slide" },
            { "slide_number": 2, "image_generation_prompt": "Body" }
        ]
    });
    let h = Harness::new(visual_model(output));

    let report = h
        .turn("s1", TurnRequest::user("Use our template").with_design(design))
        .await;
    assert_eq!(report.outcome, RunOutcome::Completed { steps: 1 });

    let calls = h.images.calls();
    assert_eq!(calls.len(), 2);
    let by_prompt = |p: &str| calls.iter().find(|c| c.prompt == p).unwrap();
    assert_eq!(
        by_prompt("Cover").reference.as_deref(),
        Some(&b"TITLE-TEMPLATE"[..])
    );
    assert_eq!(by_prompt("Body").reference.as_deref(), Some(&b"DEFAULT"[..]));

    let visual_call = h
        .model
        .calls()
        .into_iter()
        .find(|c| c.role == AgentRole::Visualizer)
        .unwrap();
    let context = last_user_content(&visual_call.messages);
    assert!(context.contains("[Template Design]"));
    assert!(context.contains("corporate.pptx"));
}

#[tokio::test]
async fn test_reference_override_wins() {
    let h = Harness::new(visual_model(visual(&[1, 2], Some("Anchor"), None)));

    let report = h
        .turn(
            "s1",
            TurnRequest::user("Match this image").with_reference_override(ReferenceImage::new(
                Bytes::from_static(b"USER-IMAGE"),
                Some("https://example.org/ref.png".to_string()),
            )),
        )
        .await;

    assert_eq!(report.outcome, RunOutcome::Completed { steps: 1 });
    let calls = h.images.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls
        .iter()
        .all(|c| c.reference.as_deref() == Some(&b"USER-IMAGE"[..])));
    let output = visual_artifact(&report.state, "step_1_visual");
    assert!(output.prompts.iter().all(|p| {
        p.thought_signature
            .as_ref()
            .and_then(|s| s.reference_image_url.as_deref())
            == Some("https://example.org/ref.png")
    }));
}

#[tokio::test]
async fn test_structured_prompt_is_compiled() {
    let output = json!({ "prompts": [{
        "slide_number": 4,
        "structured_prompt": {
            "slide_type": "Data Slide",
            "main_title": "Costs",
            "sub_title": "2020-2025",
            "visual_style": "flat vector"
        }
    }]});
    let h = Harness::new(visual_model(output));

    h.say("s1", "Illustrate the deck").await;

    let calls = h.images.calls();
    assert_eq!(
        calls[0].prompt,
        "# Slide4: Data Slide\n## Costs\n### 2020-2025\nVisual style: flat vector"
    );
}
