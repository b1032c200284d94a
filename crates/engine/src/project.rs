use serde::{Deserialize, Serialize};

use crate::api::{ItemSummary, ProjectSnapshot};
use crate::error::{EngineError, Result};
use crate::export::{ExportJob, ExportStatus};
use crate::timeline::TimelineIndex;

/// Opaque identifier of a project.
pub type ProjectId = String;
/// Opaque identifier of a timeline item.
pub type ItemId = String;

/// Display duration assigned to freshly uploaded items, in seconds.
pub const DEFAULT_ITEM_DURATION: f64 = 2.0;

/// Rhythm multipliers accepted by the beat-sync settings.
pub const RHYTHM_MULTIPLIERS: [f64; 4] = [0.5, 1.0, 2.0, 4.0];

/// Project state shared with the remote store.
///
/// The JSON layout matches the project resource served by the backend, which
/// names items `photos` and the audio track `music`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    #[serde(rename = "photos", default)]
    pub items: Vec<Item>,
    #[serde(rename = "music", default)]
    pub audio: Option<AudioTrack>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub export_status: ExportStatus,
    #[serde(default)]
    pub export_progress: f64,
    #[serde(default)]
    pub export_file: Option<String>,
}

/// One timed photo on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(default)]
    pub order: u32,
    #[serde(default = "default_item_duration")]
    pub duration: f64,
    pub orientation: Orientation,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(flatten)]
    pub media: MediaRefs,
}

/// References to the stored media of one item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRefs {
    pub filename: String,
    #[serde(default)]
    pub original_name: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub preview: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
    Square,
}

impl Orientation {
    /// Classifies an image by aspect ratio; ratios within 0.9..=1.1 are square.
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        if height == 0 {
            return Self::Landscape;
        }
        let ratio = f64::from(width) / f64::from(height);
        if ratio > 1.1 {
            Self::Landscape
        } else if ratio < 0.9 {
            Self::Portrait
        } else {
            Self::Square
        }
    }
}

/// Audio track with the tempo used for beat sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub original_name: String,
    pub duration: f64,
    pub tempo: f64,
    #[serde(default)]
    pub beats: Vec<f64>,
}

impl AudioTrack {
    /// Seconds per beat scaled by `multiplier`.
    pub fn beat_interval(&self, multiplier: f64) -> f64 {
        60.0 / self.tempo * multiplier
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub format: Format,
    pub resolution: Resolution,
    pub transition: Transition,
    pub transition_duration: f64,
    pub global_rhythm_multiplier: f64,
    pub animation_type: AnimationType,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            format: Format::Horizontal,
            resolution: Resolution::P1080,
            transition: Transition::None,
            transition_duration: 0.3,
            global_rhythm_multiplier: 1.0,
            animation_type: AnimationType::Zoom,
        }
    }
}

impl Settings {
    /// Output frame size for the configured resolution and format.
    pub fn frame_size(&self) -> (u32, u32) {
        let (long, short) = match self.resolution {
            Resolution::P720 => (1280, 720),
            Resolution::P1080 => (1920, 1080),
        };
        match self.format {
            Format::Horizontal => (long, short),
            Format::Vertical => (short, long),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    None,
    Fade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationType {
    Zoom,
    Pan,
    Both,
}

/// Partial settings update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Format>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<Transition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_rhythm_multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animation_type: Option<AnimationType>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Rejects values the backend would store but the timeline cannot use.
    pub fn validate(&self) -> Result<()> {
        if let Some(value) = self.global_rhythm_multiplier {
            if !RHYTHM_MULTIPLIERS.contains(&value) {
                return Err(EngineError::InvalidRhythmMultiplier { value });
            }
        }
        if let Some(duration) = self.transition_duration {
            if !duration.is_finite() || duration <= 0.0 {
                return Err(EngineError::InvalidDuration { duration });
            }
        }
        Ok(())
    }

    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(format) = self.format {
            settings.format = format;
        }
        if let Some(resolution) = self.resolution {
            settings.resolution = resolution;
        }
        if let Some(transition) = self.transition {
            settings.transition = transition;
        }
        if let Some(duration) = self.transition_duration {
            settings.transition_duration = duration;
        }
        if let Some(multiplier) = self.global_rhythm_multiplier {
            settings.global_rhythm_multiplier = multiplier;
        }
        if let Some(animation_type) = self.animation_type {
            settings.animation_type = animation_type;
        }
    }
}

impl Project {
    /// Creates an empty project with default settings.
    pub fn new(id: impl Into<ProjectId>) -> Self {
        Self {
            id: id.into(),
            items: Vec::new(),
            audio: None,
            settings: Settings::default(),
            export_status: ExportStatus::Idle,
            export_progress: 0.0,
            export_file: None,
        }
    }

    /// Sorts items by their `order` field; the remote does not guarantee
    /// array order matches sequence order.
    pub fn normalize(&mut self) {
        self.items.sort_by_key(|item| item.order);
    }

    pub fn item(&self, item_id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn item_ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }

    /// Export job state as recorded on the project resource.
    pub fn export_job(&self) -> ExportJob {
        ExportJob {
            status: self.export_status,
            progress: self.export_progress,
            file: self.export_file.clone(),
        }
    }

    /// Creates an immutable snapshot for the host.
    pub fn snapshot(&self, index: &TimelineIndex) -> ProjectSnapshot {
        ProjectSnapshot {
            project_id: self.id.clone(),
            items: self
                .items
                .iter()
                .enumerate()
                .map(|(position, item)| ItemSummary {
                    id: item.id.clone(),
                    order: item.order,
                    start: index.start_of(position).unwrap_or(0.0),
                    duration: item.duration,
                    orientation: item.orientation,
                    thumbnail: item.media.thumbnail.clone(),
                })
                .collect(),
            total_duration: index.total(),
            audio_tempo: self.audio.as_ref().map(|audio| audio.tempo),
            settings: self.settings.clone(),
        }
    }
}

fn default_item_duration() -> f64 {
    DEFAULT_ITEM_DURATION
}

#[cfg(test)]
mod tests {
    use super::{
        AudioTrack, Format, Orientation, Project, Resolution, Settings, SettingsPatch,
    };
    use crate::error::EngineError;
    use crate::export::ExportStatus;

    #[test]
    fn decodes_backend_project_document() {
        let json = r#"{
            "id": "p1",
            "photos": [
                {"id": "b", "filename": "b.jpg", "original_name": "B.jpg", "width": 600,
                 "height": 900, "orientation": "portrait", "duration": 3.0, "order": 1,
                 "thumbnail": "b_thumb.jpg", "preview": null},
                {"id": "a", "filename": "a.jpg", "original_name": "A.jpg", "width": 900,
                 "height": 600, "orientation": "landscape", "duration": 2.0, "order": 0}
            ],
            "music": null,
            "settings": {"format": "vertical", "resolution": "720p", "transition": "fade",
                         "transition_duration": 0.3, "global_rhythm_multiplier": 2.0,
                         "animation_type": "both"},
            "created_at": "2025-01-01T00:00:00Z",
            "export_status": "processing",
            "export_progress": 40.0,
            "export_file": null
        }"#;

        let mut project: Project = serde_json::from_str(json).expect("decode project");
        project.normalize();

        assert_eq!(project.item_ids(), vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(project.items[1].media.thumbnail.as_deref(), Some("b_thumb.jpg"));
        assert_eq!(project.settings.format, Format::Vertical);
        assert_eq!(project.settings.resolution, Resolution::P720);
        assert_eq!(project.export_job().status, ExportStatus::Processing);
    }

    #[test]
    fn orientation_uses_ten_percent_square_band() {
        assert_eq!(Orientation::from_dimensions(1920, 1080), Orientation::Landscape);
        assert_eq!(Orientation::from_dimensions(1080, 1920), Orientation::Portrait);
        assert_eq!(Orientation::from_dimensions(1000, 1050), Orientation::Square);
    }

    #[test]
    fn frame_size_swaps_axes_for_vertical_format() {
        let settings = Settings {
            format: Format::Vertical,
            resolution: Resolution::P720,
            ..Settings::default()
        };
        assert_eq!(settings.frame_size(), (720, 1280));
        assert_eq!(Settings::default().frame_size(), (1920, 1080));
    }

    #[test]
    fn settings_patch_rejects_unknown_rhythm_multiplier() {
        let patch = SettingsPatch {
            global_rhythm_multiplier: Some(3.0),
            ..SettingsPatch::default()
        };
        assert!(matches!(
            patch.validate(),
            Err(EngineError::InvalidRhythmMultiplier { .. })
        ));
    }

    #[test]
    fn settings_patch_serializes_only_present_fields() {
        let patch = SettingsPatch {
            format: Some(Format::Vertical),
            ..SettingsPatch::default()
        };
        let json = serde_json::to_string(&patch).expect("encode patch");
        assert_eq!(json, r#"{"format":"vertical"}"#);
    }

    #[test]
    fn beat_interval_scales_with_multiplier() {
        let track = AudioTrack {
            id: "m".to_owned(),
            filename: "m.mp3".to_owned(),
            original_name: String::new(),
            duration: 180.0,
            tempo: 120.0,
            beats: Vec::new(),
        };
        assert!((track.beat_interval(2.0) - 1.0).abs() < 1e-9);
    }
}
