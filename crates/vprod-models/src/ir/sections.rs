//! IR section types.
//!
//! Field names follow the persisted JSON layout. Nested objects are their own
//! sections so that default-fill reaches every level; lists are atomic.

use serde_json::Value;

ir_section! {
    /// Project identity and production targets.
    pub struct Metadata {
        pub project_id: String,
        pub title: String,
        pub created_at: String,
        pub version: String,
        pub target_duration: f64,
        pub target_platforms: Vec<String>,
        pub brands: Vec<String>,
        pub models: Vec<String>,
        pub style_keywords: Vec<String>,
        pub target_audience: String,
        /// Free-text requirement that produced this document
        pub user_input: String,
    }
}

// ============================================================================
// Audio
// ============================================================================

ir_section! {
    pub struct AudioDesign {
        pub voiceover: Voiceover,
        pub background_music: BackgroundMusic,
        pub original_sound: OriginalSound,
        pub sound_effects: SoundEffects,
        pub audio_mix_strategy: AudioMixStrategy,
    }
}

ir_section! {
    pub struct Voiceover {
        pub enabled: bool,
        pub voice_settings: VoiceSettings,
        pub segments: Vec<VoiceoverSegment>,
    }
}

ir_section! {
    /// Text-to-speech synthesis settings.
    pub struct VoiceSettings {
        pub reference_id: String,
        pub mp3_bitrate: u32,
        pub chunk_length: u32,
        pub latency_mode: String,
        pub audio_gain_db: f64,
        pub audio_cut: AudioCut,
    }
}

ir_section! {
    /// Silence trimming applied to synthesized speech.
    pub struct AudioCut {
        pub enabled: bool,
        /// dBFS
        pub threshold: f64,
        /// ms
        pub min_silence_len: u32,
        /// ms
        pub keep_silence: u32,
    }
}

ir_section! {
    pub struct VoiceoverSegment {
        pub id: String,
        pub text: String,
        pub position: String,
        pub timing: VoiceoverTiming,
        pub processing: VoiceoverProcessing,
    }
}

ir_section! {
    pub struct VoiceoverTiming {
        pub start_time: f64,
        pub duration: f64,
        pub sync_with_visual: bool,
    }
}

ir_section! {
    pub struct VoiceoverProcessing {
        pub emphasis_words: Vec<String>,
        pub pace: String,
        pub tone: String,
    }
}

ir_section! {
    pub struct BackgroundMusic {
        pub enabled: bool,
        pub tracks: Vec<MusicTrack>,
    }
}

ir_section! {
    pub struct MusicTrack {
        pub id: String,
        pub style: String,
        pub mood: String,
        pub segments: Vec<MusicSegment>,
    }
}

ir_section! {
    pub struct MusicSegment {
        pub start_time: f64,
        pub end_time: f64,
        pub volume: VolumeEnvelope,
    }
}

ir_section! {
    pub struct VolumeEnvelope {
        pub base: f64,
        pub curve: Vec<VolumePoint>,
    }
}

ir_section! {
    pub struct VolumePoint {
        pub time: f64,
        pub value: f64,
    }
}

ir_section! {
    pub struct OriginalSound {
        pub enabled: bool,
        pub segments: Vec<Value>,
    }
}

ir_section! {
    pub struct SoundEffects {
        pub enabled: bool,
        pub effects: Vec<Value>,
    }
}

ir_section! {
    pub struct AudioMixStrategy {
        pub voiceover_priority: String,
        pub ducking: Ducking,
    }
}

ir_section! {
    /// Music attenuation while speech plays.
    pub struct Ducking {
        pub enabled: bool,
        pub duck_amount: f64,
        pub duck_attack: f64,
        pub duck_release: f64,
    }
}

// ============================================================================
// Visual
// ============================================================================

ir_section! {
    pub struct VisualStructure {
        pub segments: Vec<VisualSegment>,
        pub pacing_strategy: PacingStrategy,
    }
}

ir_section! {
    /// One shot of the edit timeline.
    pub struct VisualSegment {
        pub id: String,
        #[serde(rename = "type")]
        pub segment_type: String,
        pub start_time: f64,
        pub duration: f64,
        pub narration: Narration,
        pub visual_requirements: VisualRequirements,
        pub material_search_strategy: MaterialSearchStrategy,
        pub transition_in: String,
        pub transition_out: String,
    }
}

ir_section! {
    pub struct Narration {
        pub voiceover_id: String,
        pub use_original_audio: bool,
        pub volume: f64,
    }
}

ir_section! {
    pub struct VisualRequirements {
        pub scene_type: String,
        pub shot_types: Vec<String>,
        pub required_elements: Vec<String>,
        pub mood: String,
        pub camera_movement: String,
        pub color_grading: String,
        pub lighting: String,
    }
}

ir_section! {
    /// How footage for a shot is located in the material library.
    pub struct MaterialSearchStrategy {
        pub search_type: String,
        pub priority_brands: Vec<String>,
        pub priority_models: Vec<String>,
        pub priority_tags: Vec<String>,
        pub excluded_tags: Vec<String>,
        pub matching_strategy: String,
        pub minimum_match_score: f64,
        pub fallback_strategy: String,
        pub weight_settings: WeightSettings,
        pub segment_filters: SegmentFilters,
    }
}

ir_section! {
    pub struct WeightSettings {
        pub visual_similarity: f64,
        pub contextual_relevance: f64,
        pub technical_quality: f64,
    }
}

ir_section! {
    pub struct SegmentFilters {
        pub min_duration: f64,
        pub max_duration: f64,
        pub preferred_aspect_ratio: String,
        pub min_resolution: String,
    }
}

ir_section! {
    pub struct PacingStrategy {
        #[serde(rename = "type")]
        pub pacing_type: String,
        pub default_segment_duration: f64,
        pub min_segment_duration: f64,
        pub transition_duration: f64,
        pub rhythm_pattern: Vec<String>,
        pub emphasis_points: Vec<Value>,
    }
}

// ============================================================================
// Post-processing and export
// ============================================================================

ir_section! {
    pub struct PostProcessing {
        pub color_grading_profile: String,
        pub aspect_ratio: String,
        pub resolution: String,
        pub subtitles: Subtitles,
        pub logo_overlay: LogoOverlay,
        pub end_card: EndCard,
        pub filters: Vec<Value>,
    }
}

ir_section! {
    pub struct Subtitles {
        pub enabled: bool,
        pub style: String,
        pub position: String,
        pub auto_generate: bool,
        pub font_size: u32,
        pub background: SubtitleBackground,
    }
}

ir_section! {
    pub struct SubtitleBackground {
        pub enabled: bool,
        pub opacity: f64,
    }
}

ir_section! {
    pub struct LogoOverlay {
        pub enabled: bool,
        pub position: String,
        pub duration: String,
        pub opacity: f64,
    }
}

ir_section! {
    pub struct EndCard {
        pub enabled: bool,
        pub duration: f64,
        pub elements: Vec<String>,
    }
}

ir_section! {
    pub struct ExportSettings {
        pub formats: Vec<String>,
        pub quality_presets: Vec<String>,
        pub bitrate: String,
    }
}
