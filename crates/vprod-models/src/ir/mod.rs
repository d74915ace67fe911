//! Intermediate Representation (IR) of a video production plan.
//!
//! The IR is a nested document with five top-level sections. It arrives from
//! untrusted producers (text-completion output, API clients), so parsing never
//! fails on shape: a malformed field reads as absent and unknown keys are kept.
//! [`IrDocument::merge_with_defaults`] then fills every gap from the template.

#[macro_use]
mod backfill;
mod sections;
mod template;

pub use backfill::{lenient, Backfill};
pub use sections::*;
pub use template::DEFAULT_TARGET_DURATION;

use schemars::schema::RootSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::media::SegmentRequest;

/// Top-level sections every executable document must carry.
pub const REQUIRED_SECTIONS: [&str; 5] = [
    "metadata",
    "audio_design",
    "visual_structure",
    "post_processing",
    "export_settings",
];

ir_section! {
    /// A complete or partial production plan.
    pub struct IrDocument {
        pub metadata: Metadata,
        pub audio_design: AudioDesign,
        pub visual_structure: VisualStructure,
        pub post_processing: PostProcessing,
        pub export_settings: ExportSettings,
    }
}

/// Outcome of [`IrDocument::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub valid: bool,
    /// Absent sections, in [`REQUIRED_SECTIONS`] order
    pub missing_sections: Vec<String>,
}

impl IrDocument {
    /// Build a fully populated document.
    ///
    /// A missing, non-positive or non-finite `target_duration` becomes
    /// [`DEFAULT_TARGET_DURATION`]. Each call mints a fresh project id.
    pub fn generate_template(
        brands: &[String],
        models: &[String],
        target_duration: Option<f64>,
    ) -> Self {
        template::build(brands, models, target_duration)
    }

    /// Interpret arbitrary JSON as a document. Never fails; anything that is
    /// not an object yields an empty document.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Report which required sections are absent.
    pub fn validate(&self) -> Validation {
        let present = [
            self.metadata.is_some(),
            self.audio_design.is_some(),
            self.visual_structure.is_some(),
            self.post_processing.is_some(),
            self.export_settings.is_some(),
        ];
        let missing_sections: Vec<String> = REQUIRED_SECTIONS
            .iter()
            .zip(present)
            .filter(|(_, present)| !present)
            .map(|(name, _)| name.to_string())
            .collect();

        Validation {
            valid: missing_sections.is_empty(),
            missing_sections,
        }
    }

    /// Fill every absent key from a default template, at every depth.
    ///
    /// Values already present are kept, lists included. `self` is not
    /// modified; the merged copy is returned.
    pub fn merge_with_defaults(&self) -> Self {
        let mut merged = self.clone();
        merged.backfill(&Self::generate_template(&[], &[], None));
        merged
    }

    pub fn project_id(&self) -> Option<&str> {
        self.metadata.as_ref()?.project_id.as_deref()
    }

    /// Record the free-text requirement in `metadata.user_input`.
    pub fn set_user_input(&mut self, text: impl Into<String>) {
        self.metadata.get_or_insert_with(Metadata::default).user_input = Some(text.into());
    }

    /// Time ranges of the visual segments, in document order.
    ///
    /// A segment spans `start_time..start_time + duration` and is titled by
    /// its id, or `Segment <n>` when it has none. Segments without a complete
    /// range produce a request with no range, which extraction skips.
    pub fn segment_requests(&self) -> Vec<SegmentRequest> {
        let Some(segments) = self
            .visual_structure
            .as_ref()
            .and_then(|v| v.segments.as_ref())
        else {
            return Vec::new();
        };

        segments
            .iter()
            .enumerate()
            .map(|(i, seg)| SegmentRequest {
                start_time: seg.start_time,
                end_time: match (seg.start_time, seg.duration) {
                    (Some(start), Some(duration)) => Some(start + duration),
                    _ => None,
                },
                title: Some(
                    seg.id
                        .clone()
                        .unwrap_or_else(|| format!("Segment {}", i + 1)),
                ),
                ..Default::default()
            })
            .collect()
    }

    /// JSON Schema of the document layout.
    pub fn json_schema() -> RootSchema {
        schemars::schema_for!(IrDocument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn brands(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_template_for_brand_and_duration() {
        let doc = IrDocument::generate_template(&brands(&["Acme"]), &[], Some(45.0));
        let meta = doc.metadata.as_ref().unwrap();
        assert_eq!(meta.brands, Some(brands(&["Acme"])));
        assert_eq!(meta.target_duration, Some(45.0));

        let post = doc.post_processing.as_ref().unwrap();
        assert_eq!(post.logo_overlay.as_ref().unwrap().enabled, Some(true));

        let segments = doc.segment_requests();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].time_range(), Some((0.0, 9.0)));

        let music = doc.audio_design.as_ref().unwrap().background_music.as_ref().unwrap();
        let track = &music.tracks.as_ref().unwrap()[0];
        assert_eq!(track.segments.as_ref().unwrap()[0].end_time, Some(45.0));

        assert!(doc.validate().valid);
    }

    #[test]
    fn test_template_defaults_duration_and_logo() {
        for duration in [None, Some(0.0), Some(-5.0), Some(f64::NAN)] {
            let doc = IrDocument::generate_template(&[], &[], duration);
            let meta = doc.metadata.as_ref().unwrap();
            assert_eq!(meta.target_duration, Some(DEFAULT_TARGET_DURATION));
            let logo = doc.post_processing.as_ref().unwrap().logo_overlay.as_ref().unwrap();
            assert_eq!(logo.enabled, Some(false));
        }
    }

    #[test]
    fn test_templates_have_distinct_project_ids() {
        let a = IrDocument::generate_template(&[], &[], None);
        let b = IrDocument::generate_template(&[], &[], None);
        assert!(a.project_id().is_some());
        assert_ne!(a.project_id(), b.project_id());
    }

    #[test]
    fn test_validate_reports_each_missing_section() {
        let full = IrDocument::generate_template(&[], &[], None).to_value();
        for name in REQUIRED_SECTIONS {
            let mut value = full.clone();
            value.as_object_mut().unwrap().remove(name);
            let report = IrDocument::from_value(value).validate();
            assert!(!report.valid);
            assert_eq!(report.missing_sections, vec![name.to_string()]);
        }

        let empty = IrDocument::from_value(json!({})).validate();
        assert_eq!(empty.missing_sections.len(), REQUIRED_SECTIONS.len());
    }

    #[test]
    fn test_non_object_input_is_empty_document() {
        let doc = IrDocument::from_value(json!(["not", "a", "document"]));
        assert_eq!(doc, IrDocument::default());
        assert!(!doc.validate().valid);
    }

    #[test]
    fn test_merge_keeps_caller_values() {
        let input = IrDocument::from_value(json!({
            "metadata": { "title": "Mine", "studio_notes": { "take": 3 } },
            "visual_structure": {
                "segments": [{ "id": "hero", "start_time": 2.0, "duration": 3.0 }]
            },
            "custom_section": { "keep": true }
        }));
        let before = input.clone();

        let merged = input.merge_with_defaults();
        assert_eq!(input, before);
        assert!(merged.validate().valid);

        let meta = merged.metadata.as_ref().unwrap();
        assert_eq!(meta.title.as_deref(), Some("Mine"));
        assert_eq!(meta.target_duration, Some(DEFAULT_TARGET_DURATION));
        assert_eq!(meta.extra.get("studio_notes"), Some(&json!({ "take": 3 })));
        assert_eq!(merged.extra.get("custom_section"), Some(&json!({ "keep": true })));

        // Lists are atomic: the caller's single segment is not padded.
        let visual = merged.visual_structure.as_ref().unwrap();
        assert_eq!(visual.segments.as_ref().unwrap().len(), 1);
        assert!(visual.pacing_strategy.is_some());
        assert_eq!(merged.segment_requests()[0].time_range(), Some((2.0, 5.0)));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let input = IrDocument::from_value(json!({
            "metadata": { "title": "Mine" },
            "export_settings": { "formats": ["mov"] }
        }));
        let once = input.merge_with_defaults();
        let twice = once.merge_with_defaults();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_malformed_values_are_replaced() {
        let doc = IrDocument::from_value(json!({
            "metadata": { "target_duration": "long", "brands": "Acme" },
            "audio_design": "none",
        }));
        assert!(doc.audio_design.is_none());

        let merged = doc.merge_with_defaults();
        let meta = merged.metadata.as_ref().unwrap();
        assert_eq!(meta.target_duration, Some(DEFAULT_TARGET_DURATION));
        assert_eq!(meta.brands, Some(Vec::new()));
        assert!(merged.audio_design.is_some());
    }

    #[test]
    fn test_bad_segment_items_do_not_discard_the_list() {
        let doc = IrDocument::from_value(json!({
            "visual_structure": { "segments": [
                { "id": "hook", "start_time": 0.0, "duration": 3.0 },
                "not a segment",
                42,
                { "id": "payoff", "start_time": 6.0, "duration": 4.0 }
            ]}
        }));

        let merged = doc.merge_with_defaults();
        let visual = merged.visual_structure.as_ref().unwrap();
        assert_eq!(visual.segments.as_ref().unwrap().len(), 2);
        let ranges: Vec<_> = merged
            .segment_requests()
            .iter()
            .map(|r| r.time_range())
            .collect();
        assert_eq!(ranges, vec![Some((0.0, 3.0)), Some((6.0, 10.0))]);
    }

    #[test]
    fn test_segment_requests_titles_and_incomplete_ranges() {
        let doc = IrDocument::from_value(json!({
            "visual_structure": { "segments": [
                { "start_time": 0.0, "duration": 4.0 },
                { "id": "closing", "start_time": 4.0 }
            ]}
        }));
        let requests = doc.segment_requests();
        assert_eq!(requests[0].title.as_deref(), Some("Segment 1"));
        assert_eq!(requests[0].time_range(), Some((0.0, 4.0)));
        assert_eq!(requests[1].title.as_deref(), Some("closing"));
        assert_eq!(requests[1].time_range(), None);
    }

    #[test]
    fn test_user_input_on_empty_document() {
        let mut doc = IrDocument::default();
        doc.set_user_input("30s highlight reel");
        assert_eq!(
            doc.metadata.unwrap().user_input.as_deref(),
            Some("30s highlight reel")
        );
    }

    #[test]
    fn test_json_schema_lists_sections() {
        let schema = serde_json::to_value(IrDocument::json_schema()).unwrap();
        let properties = schema["properties"].as_object().unwrap();
        for name in REQUIRED_SECTIONS {
            assert!(properties.contains_key(name), "missing {name}");
        }
    }
}
