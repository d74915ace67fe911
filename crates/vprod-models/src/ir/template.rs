//! Default IR document.

use chrono::Utc;
use uuid::Uuid;

use super::sections::*;
use super::IrDocument;

/// Duration used when the caller gives none or a non-positive one.
pub const DEFAULT_TARGET_DURATION: f64 = 60.0;

const SCHEMA_VERSION: &str = "1.0";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Build a fully populated document for the given brands, models and duration.
pub(super) fn build(brands: &[String], models: &[String], target_duration: Option<f64>) -> IrDocument {
    let duration = target_duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(DEFAULT_TARGET_DURATION);
    let project_id = Uuid::new_v4().to_string();

    IrDocument {
        metadata: Some(Metadata {
            title: Some(format!("Video project {}", &project_id[..8])),
            project_id: Some(project_id),
            created_at: Some(Utc::now().to_rfc3339()),
            version: Some(SCHEMA_VERSION.to_string()),
            target_duration: Some(duration),
            target_platforms: Some(strings(&["douyin", "kuaishou", "bilibili"])),
            brands: Some(brands.to_vec()),
            models: Some(models.to_vec()),
            style_keywords: Some(strings(&["modern", "dynamic", "premium"])),
            target_audience: Some("general audience".to_string()),
            user_input: Some(String::new()),
            ..Default::default()
        }),
        audio_design: Some(audio_design(duration)),
        visual_structure: Some(visual_structure(brands, models, duration)),
        post_processing: Some(post_processing(!brands.is_empty())),
        export_settings: Some(ExportSettings {
            formats: Some(strings(&["mp4"])),
            quality_presets: Some(strings(&["high"])),
            bitrate: Some("8M".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn audio_design(duration: f64) -> AudioDesign {
    AudioDesign {
        voiceover: Some(Voiceover {
            enabled: Some(true),
            voice_settings: Some(VoiceSettings {
                reference_id: Some(String::new()),
                mp3_bitrate: Some(128),
                chunk_length: Some(200),
                latency_mode: Some("normal".to_string()),
                audio_gain_db: Some(0.0),
                audio_cut: Some(AudioCut {
                    enabled: Some(true),
                    threshold: Some(-40.0),
                    min_silence_len: Some(300),
                    keep_silence: Some(100),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            segments: Some(Vec::new()),
            ..Default::default()
        }),
        background_music: Some(BackgroundMusic {
            enabled: Some(true),
            tracks: Some(vec![MusicTrack {
                id: Some("main_bgm".to_string()),
                style: Some("electronic".to_string()),
                mood: Some("energetic".to_string()),
                segments: Some(vec![MusicSegment {
                    start_time: Some(0.0),
                    end_time: Some(duration),
                    volume: Some(VolumeEnvelope {
                        base: Some(0.3),
                        curve: Some(vec![
                            volume_point(0.0, 0.3),
                            volume_point(duration * 0.9, 0.3),
                            volume_point(duration, 0.0),
                        ]),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        original_sound: Some(OriginalSound {
            enabled: Some(false),
            segments: Some(Vec::new()),
            ..Default::default()
        }),
        sound_effects: Some(SoundEffects {
            enabled: Some(false),
            effects: Some(Vec::new()),
            ..Default::default()
        }),
        audio_mix_strategy: Some(AudioMixStrategy {
            voiceover_priority: Some("high".to_string()),
            ducking: Some(Ducking {
                enabled: Some(true),
                duck_amount: Some(0.3),
                duck_attack: Some(0.1),
                duck_release: Some(0.5),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn volume_point(time: f64, value: f64) -> VolumePoint {
    VolumePoint {
        time: Some(time),
        value: Some(value),
        ..Default::default()
    }
}

fn visual_structure(brands: &[String], models: &[String], duration: f64) -> VisualStructure {
    let opening = VisualSegment {
        id: Some("seg_001".to_string()),
        segment_type: Some("opening".to_string()),
        start_time: Some(0.0),
        duration: Some(duration * 0.2),
        narration: Some(Narration {
            voiceover_id: Some(String::new()),
            use_original_audio: Some(false),
            volume: Some(1.0),
            ..Default::default()
        }),
        visual_requirements: Some(VisualRequirements {
            scene_type: Some("exterior".to_string()),
            shot_types: Some(strings(&["wide", "tracking"])),
            required_elements: Some(strings(&["vehicle"])),
            mood: Some("dynamic".to_string()),
            camera_movement: Some("smooth".to_string()),
            color_grading: Some("vivid".to_string()),
            lighting: Some("natural".to_string()),
            ..Default::default()
        }),
        material_search_strategy: Some(MaterialSearchStrategy {
            search_type: Some("semantic".to_string()),
            priority_brands: Some(brands.to_vec()),
            priority_models: Some(models.to_vec()),
            priority_tags: Some(strings(&["exterior", "driving"])),
            excluded_tags: Some(strings(&["low_quality", "blurry"])),
            matching_strategy: Some("weighted".to_string()),
            minimum_match_score: Some(0.7),
            fallback_strategy: Some("relax_constraints".to_string()),
            weight_settings: Some(WeightSettings {
                visual_similarity: Some(0.4),
                contextual_relevance: Some(0.4),
                technical_quality: Some(0.2),
                ..Default::default()
            }),
            segment_filters: Some(SegmentFilters {
                min_duration: Some(2.0),
                max_duration: Some(15.0),
                preferred_aspect_ratio: Some("16:9".to_string()),
                min_resolution: Some("1920x1080".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }),
        transition_in: Some("fade".to_string()),
        transition_out: Some("cut".to_string()),
        ..Default::default()
    };

    VisualStructure {
        segments: Some(vec![opening]),
        pacing_strategy: Some(PacingStrategy {
            pacing_type: Some("dynamic".to_string()),
            default_segment_duration: Some(3.0),
            min_segment_duration: Some(1.5),
            transition_duration: Some(0.5),
            rhythm_pattern: Some(strings(&["fast", "fast", "slow", "fast"])),
            emphasis_points: Some(Vec::new()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn post_processing(with_logo: bool) -> PostProcessing {
    PostProcessing {
        color_grading_profile: Some("cinematic".to_string()),
        aspect_ratio: Some("16:9".to_string()),
        resolution: Some("1920x1080".to_string()),
        subtitles: Some(Subtitles {
            enabled: Some(true),
            style: Some("modern".to_string()),
            position: Some("bottom".to_string()),
            auto_generate: Some(true),
            font_size: Some(36),
            background: Some(SubtitleBackground {
                enabled: Some(true),
                opacity: Some(0.6),
                ..Default::default()
            }),
            ..Default::default()
        }),
        logo_overlay: Some(LogoOverlay {
            enabled: Some(with_logo),
            position: Some("top_right".to_string()),
            duration: Some("full".to_string()),
            opacity: Some(0.8),
            ..Default::default()
        }),
        end_card: Some(EndCard {
            enabled: Some(true),
            duration: Some(3.0),
            elements: Some(strings(&["logo", "slogan", "call_to_action"])),
            ..Default::default()
        }),
        filters: Some(Vec::new()),
        ..Default::default()
    }
}
