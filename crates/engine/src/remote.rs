use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::export::ExportJob;
use crate::project::{AudioTrack, ItemId, Project, SettingsPatch};

pub mod http;
pub mod memory;

pub use http::HttpRemote;
pub use memory::InMemoryRemote;

/// Remote requests, used for logging and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateProject,
    FetchProject,
    AddItems,
    SetAudioTrack,
    SyncToBeats,
    UpdateSettings,
    UpdateItemDuration,
    UpdateAllDurations,
    ReorderItems,
    DeleteItem,
    StartExport,
    ExportStatus,
    DownloadExport,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Self::CreateProject => "create project",
            Self::FetchProject => "fetch project",
            Self::AddItems => "add items",
            Self::SetAudioTrack => "set audio track",
            Self::SyncToBeats => "sync to beats",
            Self::UpdateSettings => "update settings",
            Self::UpdateItemDuration => "update item duration",
            Self::UpdateAllDurations => "update all durations",
            Self::ReorderItems => "reorder items",
            Self::DeleteItem => "delete item",
            Self::StartExport => "start export",
            Self::ExportStatus => "export status",
            Self::DownloadExport => "download export",
        }
    }
}

/// Kinds of media streams served by reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Thumbnail,
    Preview,
    Audio,
}

impl MediaKind {
    pub(crate) fn path_segment(self) -> &'static str {
        match self {
            Self::Photo => "photos",
            Self::Thumbnail => "thumbnails",
            Self::Preview => "previews",
            Self::Audio => "music",
        }
    }
}

/// Result of an item upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadReport {
    pub uploaded: usize,
}

/// Result of a beat-sync request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatSync {
    pub synced: bool,
    #[serde(default)]
    pub beat_interval: Option<f64>,
}

/// Request/response contract with the project store.
///
/// Every method is one remote round trip; callers run them on the engine
/// thread and treat each call as a suspension point.
pub trait ProjectRemote {
    fn create_project(&self) -> Result<Project>;

    fn fetch_project(&self, project_id: &str) -> Result<Project>;

    /// Uploads image files; unsupported files are skipped by the store.
    fn add_items(&self, project_id: &str, paths: &[PathBuf]) -> Result<UploadReport>;

    fn set_audio_track(&self, project_id: &str, path: &Path) -> Result<AudioTrack>;

    /// Asks the store to recompute every item duration from the track tempo.
    fn sync_to_beats(&self, project_id: &str) -> Result<BeatSync>;

    fn update_settings(&self, project_id: &str, patch: &SettingsPatch) -> Result<()>;

    fn update_item_duration(&self, project_id: &str, item_id: &str, duration: f64) -> Result<()>;

    fn update_all_durations(&self, project_id: &str, duration: f64) -> Result<()>;

    fn reorder_items(&self, project_id: &str, sequence: &[ItemId]) -> Result<()>;

    fn delete_item(&self, project_id: &str, item_id: &str) -> Result<()>;

    fn start_export(&self, project_id: &str) -> Result<()>;

    fn export_status(&self, project_id: &str) -> Result<ExportJob>;

    fn download_export(&self, project_id: &str) -> Result<Vec<u8>>;

    /// Location of a stored media stream.
    fn media_url(&self, kind: MediaKind, filename: &str) -> String;
}

impl<R: ProjectRemote + ?Sized> ProjectRemote for Box<R> {
    fn create_project(&self) -> Result<Project> {
        (**self).create_project()
    }

    fn fetch_project(&self, project_id: &str) -> Result<Project> {
        (**self).fetch_project(project_id)
    }

    fn add_items(&self, project_id: &str, paths: &[PathBuf]) -> Result<UploadReport> {
        (**self).add_items(project_id, paths)
    }

    fn set_audio_track(&self, project_id: &str, path: &Path) -> Result<AudioTrack> {
        (**self).set_audio_track(project_id, path)
    }

    fn sync_to_beats(&self, project_id: &str) -> Result<BeatSync> {
        (**self).sync_to_beats(project_id)
    }

    fn update_settings(&self, project_id: &str, patch: &SettingsPatch) -> Result<()> {
        (**self).update_settings(project_id, patch)
    }

    fn update_item_duration(&self, project_id: &str, item_id: &str, duration: f64) -> Result<()> {
        (**self).update_item_duration(project_id, item_id, duration)
    }

    fn update_all_durations(&self, project_id: &str, duration: f64) -> Result<()> {
        (**self).update_all_durations(project_id, duration)
    }

    fn reorder_items(&self, project_id: &str, sequence: &[ItemId]) -> Result<()> {
        (**self).reorder_items(project_id, sequence)
    }

    fn delete_item(&self, project_id: &str, item_id: &str) -> Result<()> {
        (**self).delete_item(project_id, item_id)
    }

    fn start_export(&self, project_id: &str) -> Result<()> {
        (**self).start_export(project_id)
    }

    fn export_status(&self, project_id: &str) -> Result<ExportJob> {
        (**self).export_status(project_id)
    }

    fn download_export(&self, project_id: &str) -> Result<Vec<u8>> {
        (**self).download_export(project_id)
    }

    fn media_url(&self, kind: MediaKind, filename: &str) -> String {
        (**self).media_url(kind, filename)
    }
}
