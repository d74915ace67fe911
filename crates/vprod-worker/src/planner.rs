//! IR planning.
//!
//! Turns a task's requirement into the IR document the pipeline executes.
//! A caller-supplied preview is used verbatim. Otherwise the template is
//! generated and one text-completion call is attempted; anything short of a
//! parsable JSON object with a `metadata` key keeps the template.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;
use vprod_models::{IrDocument, ProduceVideoParams};

use crate::completion::TextCompletion;
use crate::logging::TaskLogger;
use crate::metrics;

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap());

static BARE_JSON: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)(\{.*\})").unwrap());

/// Why the template was kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// No collaborator configured
    NoCollaborator,
    /// The completion call failed or timed out
    CollaboratorError,
    /// The response held no JSON object
    NoJson,
    /// The located object did not parse
    InvalidJson,
    /// The object had no `metadata` key
    MissingMetadata,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::NoCollaborator => "no_collaborator",
            FallbackReason::CollaboratorError => "collaborator_error",
            FallbackReason::NoJson => "no_json",
            FallbackReason::InvalidJson => "invalid_json",
            FallbackReason::MissingMetadata => "missing_metadata",
        }
    }
}

/// Where the planned document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrOrigin {
    Preview,
    Completion,
    Template(FallbackReason),
}

#[derive(Debug, Clone)]
pub struct PlannedIr {
    pub document: IrDocument,
    pub origin: IrOrigin,
}

/// Builds IR documents, optionally backed by a text-completion collaborator.
#[derive(Clone, Default)]
pub struct IrPlanner {
    completion: Option<Arc<dyn TextCompletion>>,
}

impl IrPlanner {
    pub fn new(completion: Option<Arc<dyn TextCompletion>>) -> Self {
        Self { completion }
    }

    /// Plan the IR for `params`. Never fails.
    pub async fn plan(&self, params: &ProduceVideoParams, logger: &TaskLogger) -> PlannedIr {
        if let Some(preview) = &params.ir_preview {
            logger.log_progress("Using caller-supplied IR");
            return PlannedIr {
                document: preview.clone(),
                origin: IrOrigin::Preview,
            };
        }

        let mut template = IrDocument::generate_template(
            &params.brands,
            &params.models,
            params.target_duration,
        );
        template.set_user_input(params.user_requirement.as_str());
        if !params.target_platforms.is_empty() {
            if let Some(metadata) = template.metadata.as_mut() {
                metadata.target_platforms = Some(params.target_platforms.clone());
            }
        }

        let Some(completion) = &self.completion else {
            return fallback(template, FallbackReason::NoCollaborator);
        };

        let response = match completion.complete(&build_prompt(params)).await {
            Ok(text) => text,
            Err(e) => {
                logger.log_warning(&format!("Requirement parsing failed, keeping template: {}", e));
                return fallback(template, FallbackReason::CollaboratorError);
            }
        };

        match extract_ir(&response) {
            Ok(value) => {
                let mut document = IrDocument::from_value(value).merge_with_defaults();
                let has_input = document
                    .metadata
                    .as_ref()
                    .and_then(|m| m.user_input.as_deref())
                    .is_some_and(|s| !s.is_empty());
                if !has_input {
                    document.set_user_input(params.user_requirement.as_str());
                }
                logger.log_progress("Requirement parsed into IR");
                PlannedIr {
                    document,
                    origin: IrOrigin::Completion,
                }
            }
            Err(reason) => {
                logger.log_warning(&format!(
                    "No usable IR in completion response ({}), keeping template",
                    reason.as_str()
                ));
                tracing::debug!(response = %response, "Completion response");
                fallback(template, reason)
            }
        }
    }
}

fn fallback(document: IrDocument, reason: FallbackReason) -> PlannedIr {
    metrics::record_ir_fallback(reason.as_str());
    PlannedIr {
        document,
        origin: IrOrigin::Template(reason),
    }
}

/// Locate the IR object in free text: a fenced block first, then the widest
/// bare `{...}` span.
pub fn extract_ir(text: &str) -> Result<Value, FallbackReason> {
    let captures = FENCED_JSON
        .captures(text)
        .or_else(|| BARE_JSON.captures(text))
        .ok_or(FallbackReason::NoJson)?;
    let json = captures.get(1).map_or("", |m| m.as_str());

    let value: Value = serde_json::from_str(json).map_err(|_| FallbackReason::InvalidJson)?;
    if value.as_object().is_some_and(|o| o.contains_key("metadata")) {
        Ok(value)
    } else {
        Err(FallbackReason::MissingMetadata)
    }
}

fn or_unspecified(items: &[String]) -> String {
    if items.is_empty() {
        "unspecified".to_string()
    } else {
        items.join(", ")
    }
}

/// Prompt asking the collaborator for a complete five-section IR document.
pub fn build_prompt(params: &ProduceVideoParams) -> String {
    let duration = params
        .target_duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(vprod_models::ir::DEFAULT_TARGET_DURATION);

    format!(
        r#"Analyze the user's requirement and produce a standardized video production IR (intermediate representation).

User requirement: {requirement}

Provided context:
- Brands: {brands}
- Models: {models}
- Target platforms: {platforms}
- Target duration: {duration} seconds

The IR is a JSON object that MUST contain all five top-level sections:

1. metadata: project_id, title, created_at, version, target_duration,
   target_platforms, brands, models, style_keywords, target_audience, user_input
2. audio_design: voiceover (voice_settings, segments), background_music (tracks),
   original_sound, sound_effects, audio_mix_strategy
3. visual_structure: segments (each with id, type, start_time, duration, narration,
   visual_requirements, material_search_strategy, transition_in, transition_out),
   pacing_strategy
4. post_processing: color_grading_profile, aspect_ratio, resolution, subtitles,
   logo_overlay, end_card, filters
5. export_settings: formats, quality_presets, bitrate

Where the requirement is ambiguous, follow automotive video production best practice.
Return ONLY the JSON object, wrapped in a ```json code block, with no other text.
"#,
        requirement = params.user_requirement,
        brands = or_unspecified(&params.brands),
        models = or_unspecified(&params.models),
        platforms = or_unspecified(&params.target_platforms),
        duration = duration,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{WorkerError, WorkerResult};
    use async_trait::async_trait;
    use serde_json::json;
    use vprod_models::TaskId;

    struct Scripted(Result<String, String>);

    #[async_trait]
    impl TextCompletion for Scripted {
        async fn complete(&self, _prompt: &str) -> WorkerResult<String> {
            self.0.clone().map_err(WorkerError::collaborator)
        }
    }

    fn planner(response: Result<&str, &str>) -> IrPlanner {
        let scripted = Scripted(response.map(str::to_string).map_err(str::to_string));
        IrPlanner::new(Some(Arc::new(scripted)))
    }

    fn logger() -> TaskLogger {
        TaskLogger::new(&TaskId::from_string("t"), "w")
    }

    #[test]
    fn test_extract_fenced_json() {
        let text = "Here you go:\n```json\n{\"metadata\": {\"title\": \"A\"}, \"x\": {\"y\": 1}}\n```\nThanks";
        let value = extract_ir(text).unwrap();
        assert_eq!(value["metadata"]["title"], "A");
        assert_eq!(value["x"]["y"], 1);
    }

    #[test]
    fn test_extract_bare_json() {
        let value = extract_ir("result: {\"metadata\": {}} done").unwrap();
        assert_eq!(value, json!({ "metadata": {} }));
    }

    #[test]
    fn test_extract_failures() {
        assert_eq!(extract_ir("no json here"), Err(FallbackReason::NoJson));
        assert_eq!(extract_ir("{not json}"), Err(FallbackReason::InvalidJson));
        assert_eq!(
            extract_ir("```\n{\"title\": \"x\"}\n```"),
            Err(FallbackReason::MissingMetadata)
        );
    }

    #[tokio::test]
    async fn test_prose_response_keeps_template() {
        let params = ProduceVideoParams::new("30s highlight reel").with_brands(vec!["Acme".into()]);
        let planned = planner(Ok("Sure! I think this video should be exciting."))
            .plan(&params, &logger())
            .await;

        assert_eq!(planned.origin, IrOrigin::Template(FallbackReason::NoJson));

        let mut expected = IrDocument::generate_template(&params.brands, &params.models, None);
        expected.set_user_input("30s highlight reel");
        let (got, want) = (
            planned.document.metadata.as_ref().unwrap(),
            expected.metadata.as_mut().unwrap(),
        );
        want.project_id = got.project_id.clone();
        want.title = got.title.clone();
        want.created_at = got.created_at.clone();
        assert_eq!(planned.document, expected);
    }

    #[tokio::test]
    async fn test_completion_document_adopted_and_filled() {
        let response = r#"```json
{"metadata": {"project_id": "p-1", "title": "Launch"},
 "visual_structure": {"segments": [{"id": "hook", "start_time": 0, "duration": 4}]}}
```"#;
        let params = ProduceVideoParams::new("launch teaser");
        let planned = planner(Ok(response)).plan(&params, &logger()).await;

        assert_eq!(planned.origin, IrOrigin::Completion);
        let doc = &planned.document;
        assert_eq!(doc.project_id(), Some("p-1"));
        assert!(doc.validate().valid);
        assert_eq!(
            doc.metadata.as_ref().unwrap().user_input.as_deref(),
            Some("launch teaser")
        );
        let requests = doc.segment_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].title.as_deref(), Some("hook"));
    }

    #[tokio::test]
    async fn test_collaborator_error_keeps_template() {
        let params = ProduceVideoParams::new("reel").with_target_duration(30.0);
        let planned = planner(Err("timeout")).plan(&params, &logger()).await;

        assert_eq!(
            planned.origin,
            IrOrigin::Template(FallbackReason::CollaboratorError)
        );
        let metadata = planned.document.metadata.unwrap();
        assert_eq!(metadata.target_duration, Some(30.0));
        assert_eq!(metadata.user_input.as_deref(), Some("reel"));
    }

    #[tokio::test]
    async fn test_preview_used_verbatim() {
        let preview = IrDocument::from_value(json!({ "metadata": { "project_id": "fixed" } }));
        let params = ProduceVideoParams::new("ignored").with_ir_preview(preview.clone());
        let planned = planner(Ok("```json\n{\"metadata\": {}}\n```"))
            .plan(&params, &logger())
            .await;

        assert_eq!(planned.origin, IrOrigin::Preview);
        assert_eq!(planned.document, preview);
    }

    #[tokio::test]
    async fn test_without_collaborator_uses_template() {
        let mut params = ProduceVideoParams::new("reel");
        params.target_platforms = vec!["youtube".into()];
        let planned = IrPlanner::new(None).plan(&params, &logger()).await;

        assert_eq!(
            planned.origin,
            IrOrigin::Template(FallbackReason::NoCollaborator)
        );
        assert_eq!(
            planned.document.metadata.unwrap().target_platforms,
            Some(vec!["youtube".to_string()])
        );
    }

    #[test]
    fn test_prompt_lists_context() {
        let params = ProduceVideoParams::new("city drive").with_brands(vec!["Acme".into()]);
        let prompt = build_prompt(&params);
        assert!(prompt.contains("User requirement: city drive"));
        assert!(prompt.contains("- Brands: Acme"));
        assert!(prompt.contains("- Models: unspecified"));
        assert!(prompt.contains("- Target duration: 60 seconds"));
        for section in vprod_models::REQUIRED_SECTIONS {
            assert!(prompt.contains(section));
        }
    }
}
