use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};
use uuid::Uuid;

use super::{BeatSync, MediaKind, Operation, ProjectRemote, UploadReport};
use crate::error::{EngineError, Result};
use crate::export::{ExportJob, ExportStatus};
use crate::project::{
    AudioTrack, DEFAULT_ITEM_DURATION, Format, Item, ItemId, MediaRefs, Orientation, Project,
    SettingsPatch,
};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "gif", "bmp"];
const EXPORT_PROGRESS_STEP: f64 = 25.0;
/// Analysis results assumed for uploaded audio; tempo detection is not done
/// in process.
const ASSUMED_AUDIO_DURATION: f64 = 180.0;
const ASSUMED_AUDIO_TEMPO: f64 = 120.0;

/// Process-local project store with the same semantics as the REST backend.
///
/// Clones share state, so a test can hand one clone to the engine and keep
/// another to inspect calls or inject failures.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRemote {
    store: Arc<Mutex<Store>>,
}

#[derive(Debug, Default)]
struct Store {
    projects: HashMap<String, Project>,
    fail_once: Vec<Operation>,
    fail_always: HashSet<Operation>,
    export_script: VecDeque<ExportJob>,
    calls: Vec<Operation>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a project whose items have the given durations, ids
    /// `photo-0`, `photo-1`, ... in order.
    pub fn seed_project(&self, durations: &[f64]) -> Project {
        let mut project = Project::new(Uuid::new_v4().to_string());
        project.items = durations
            .iter()
            .enumerate()
            .map(|(order, duration)| {
                let id = format!("photo-{order}");
                Item {
                    media: media_refs(&id, "jpg", Format::Horizontal),
                    id,
                    order: order as u32,
                    duration: *duration,
                    orientation: Orientation::Landscape,
                    width: 1920,
                    height: 1080,
                }
            })
            .collect();
        self.lock()
            .projects
            .insert(project.id.clone(), project.clone());
        project
    }

    /// Attaches an audio track with `tempo` to a stored project.
    pub fn seed_audio(&self, project_id: &str, tempo: f64) {
        if let Some(project) = self.lock().projects.get_mut(project_id) {
            project.audio = Some(assumed_track("seeded.mp3", tempo));
        }
    }

    /// Makes the next call of `operation` fail.
    pub fn fail_next(&self, operation: Operation) {
        self.lock().fail_once.push(operation);
    }

    /// Makes every call of `operation` fail.
    pub fn fail_always(&self, operation: Operation) {
        self.lock().fail_always.insert(operation);
    }

    /// Status reports returned by successive export polls. Without a script
    /// the job advances by a fixed step per poll.
    pub fn script_export(&self, reports: Vec<ExportJob>) {
        self.lock().export_script = reports.into();
    }

    /// Operations requested so far, in order.
    pub fn calls(&self) -> Vec<Operation> {
        self.lock().calls.clone()
    }

    pub fn project(&self, project_id: &str) -> Option<Project> {
        self.lock().projects.get(project_id).cloned()
    }

    /// Overwrites a stored project, e.g. to simulate an edit from elsewhere.
    pub fn replace_project(&self, project: Project) {
        self.lock().projects.insert(project.id.clone(), project);
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, operation: Operation) -> Result<MutexGuard<'_, Store>> {
        let mut store = self.lock();
        store.calls.push(operation);
        let scheduled = store
            .fail_once
            .iter()
            .position(|pending| *pending == operation);
        if let Some(position) = scheduled {
            store.fail_once.remove(position);
            return Err(EngineError::remote(operation.name(), "injected failure"));
        }
        if store.fail_always.contains(&operation) {
            return Err(EngineError::remote(operation.name(), "injected failure"));
        }
        debug!(operation = operation.name(), "in-memory request");
        Ok(store)
    }
}

impl Store {
    fn project_mut(&mut self, project_id: &str) -> Result<&mut Project> {
        self.projects
            .get_mut(project_id)
            .ok_or_else(|| EngineError::ProjectNotFound {
                project_id: project_id.to_owned(),
            })
    }
}

impl ProjectRemote for InMemoryRemote {
    fn create_project(&self) -> Result<Project> {
        let mut store = self.begin(Operation::CreateProject)?;
        let project = Project::new(Uuid::new_v4().to_string());
        store.projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    fn fetch_project(&self, project_id: &str) -> Result<Project> {
        let mut store = self.begin(Operation::FetchProject)?;
        store.project_mut(project_id).map(|project| project.clone())
    }

    fn add_items(&self, project_id: &str, paths: &[PathBuf]) -> Result<UploadReport> {
        let mut store = self.begin(Operation::AddItems)?;
        let project = store.project_mut(project_id)?;
        let format = project.settings.format;

        let mut uploaded = Vec::new();
        for path in paths {
            let Some(extension) = image_extension(path) else {
                warn!(path = %path.display(), "skipping unsupported upload");
                continue;
            };
            let (width, height) = image::image_dimensions(path).map_err(|source| {
                EngineError::ImageDimensions {
                    path: path.clone(),
                    source,
                }
            })?;
            let id = Uuid::new_v4().to_string();
            let mut media = media_refs(&id, &extension, format);
            media.original_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            uploaded.push(Item {
                order: (project.items.len() + uploaded.len()) as u32,
                duration: DEFAULT_ITEM_DURATION,
                orientation: Orientation::from_dimensions(width, height),
                width,
                height,
                media,
                id,
            });
        }

        let report = UploadReport {
            uploaded: uploaded.len(),
        };
        project.items.extend(uploaded);
        Ok(report)
    }

    fn set_audio_track(&self, project_id: &str, path: &Path) -> Result<AudioTrack> {
        let mut store = self.begin(Operation::SetAudioTrack)?;
        let project = store.project_mut(project_id)?;
        let is_mp3 = path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("mp3"));
        if !is_mp3 {
            return Err(EngineError::UnsupportedMedia {
                path: path.to_path_buf(),
            });
        }

        let mut track = assumed_track("upload.mp3", ASSUMED_AUDIO_TEMPO);
        track.filename = format!("{}.mp3", track.id);
        track.original_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        project.audio = Some(track.clone());
        Ok(track)
    }

    fn sync_to_beats(&self, project_id: &str) -> Result<BeatSync> {
        let mut store = self.begin(Operation::SyncToBeats)?;
        let project = store.project_mut(project_id)?;
        let Some(audio) = project.audio.as_ref() else {
            return Err(EngineError::remote(
                Operation::SyncToBeats.name(),
                "no music uploaded",
            ));
        };
        if project.items.is_empty() {
            return Ok(BeatSync {
                synced: false,
                beat_interval: None,
            });
        }

        let interval = audio.beat_interval(project.settings.global_rhythm_multiplier);
        for item in &mut project.items {
            item.duration = interval;
        }
        Ok(BeatSync {
            synced: true,
            beat_interval: Some(interval),
        })
    }

    fn update_settings(&self, project_id: &str, patch: &SettingsPatch) -> Result<()> {
        let mut store = self.begin(Operation::UpdateSettings)?;
        let project = store.project_mut(project_id)?;
        if let Some(format) = patch.format {
            for item in &mut project.items {
                item.media.preview = Some(preview_name(&item.id, format));
            }
        }
        patch.apply_to(&mut project.settings);
        Ok(())
    }

    fn update_item_duration(&self, project_id: &str, item_id: &str, duration: f64) -> Result<()> {
        let mut store = self.begin(Operation::UpdateItemDuration)?;
        let project = store.project_mut(project_id)?;
        if let Some(item) = project.items.iter_mut().find(|item| item.id == item_id) {
            item.duration = duration;
        }
        Ok(())
    }

    fn update_all_durations(&self, project_id: &str, duration: f64) -> Result<()> {
        let mut store = self.begin(Operation::UpdateAllDurations)?;
        let project = store.project_mut(project_id)?;
        for item in &mut project.items {
            item.duration = duration;
        }
        Ok(())
    }

    fn reorder_items(&self, project_id: &str, sequence: &[ItemId]) -> Result<()> {
        let mut store = self.begin(Operation::ReorderItems)?;
        let project = store.project_mut(project_id)?;
        let positions: HashMap<&str, u32> = sequence
            .iter()
            .enumerate()
            .map(|(position, id)| (id.as_str(), position as u32))
            .collect();
        for item in &mut project.items {
            if let Some(position) = positions.get(item.id.as_str()) {
                item.order = *position;
            }
        }
        project.normalize();
        Ok(())
    }

    fn delete_item(&self, project_id: &str, item_id: &str) -> Result<()> {
        let mut store = self.begin(Operation::DeleteItem)?;
        let project = store.project_mut(project_id)?;
        project.normalize();
        project.items.retain(|item| item.id != item_id);
        for (position, item) in project.items.iter_mut().enumerate() {
            item.order = position as u32;
        }
        Ok(())
    }

    fn start_export(&self, project_id: &str) -> Result<()> {
        let mut store = self.begin(Operation::StartExport)?;
        let project = store.project_mut(project_id)?;
        project.export_status = ExportStatus::Processing;
        project.export_progress = 0.0;
        project.export_file = None;
        Ok(())
    }

    fn export_status(&self, project_id: &str) -> Result<ExportJob> {
        let mut store = self.begin(Operation::ExportStatus)?;
        let processing = store.project_mut(project_id)?.export_status == ExportStatus::Processing;
        let scripted = if processing {
            store.export_script.pop_front()
        } else {
            None
        };
        let project = store.project_mut(project_id)?;

        if processing {
            match scripted {
                Some(report) => {
                    project.export_status = report.status;
                    project.export_progress = report.progress;
                    project.export_file = report.file;
                }
                None => {
                    project.export_progress =
                        (project.export_progress + EXPORT_PROGRESS_STEP).min(100.0);
                    if project.export_progress >= 100.0 {
                        project.export_status = if project.items.is_empty() {
                            ExportStatus::Error
                        } else {
                            ExportStatus::Completed
                        };
                        project.export_file = (project.export_status
                            == ExportStatus::Completed)
                            .then(|| format!("{}.mp4", project.id));
                    }
                }
            }
        }
        Ok(project.export_job())
    }

    fn download_export(&self, project_id: &str) -> Result<Vec<u8>> {
        let mut store = self.begin(Operation::DownloadExport)?;
        let project = store.project_mut(project_id)?;
        match &project.export_file {
            Some(file) => Ok(format!("rendered:{file}").into_bytes()),
            None => Err(EngineError::remote(
                Operation::DownloadExport.name(),
                "no export available",
            )),
        }
    }

    fn media_url(&self, kind: MediaKind, filename: &str) -> String {
        format!("memory://{}/{filename}", kind.path_segment())
    }
}

fn image_extension(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_EXTENSIONS
        .contains(&extension.as_str())
        .then_some(extension)
}

fn media_refs(id: &str, extension: &str, format: Format) -> MediaRefs {
    MediaRefs {
        filename: format!("{id}.{extension}"),
        original_name: format!("{id}.{extension}"),
        thumbnail: Some(format!("{id}_thumb.jpg")),
        preview: Some(preview_name(id, format)),
    }
}

fn preview_name(id: &str, format: Format) -> String {
    let format = match format {
        Format::Horizontal => "horizontal",
        Format::Vertical => "vertical",
    };
    format!("{id}_preview_{format}.jpg")
}

fn assumed_track(filename: &str, tempo: f64) -> AudioTrack {
    AudioTrack {
        id: Uuid::new_v4().to_string(),
        filename: filename.to_owned(),
        original_name: filename.to_owned(),
        duration: ASSUMED_AUDIO_DURATION,
        tempo,
        beats: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::InMemoryRemote;
    use crate::error::EngineError;
    use crate::export::ExportStatus;
    use crate::project::{Format, SettingsPatch};
    use crate::remote::{Operation, ProjectRemote};

    #[test]
    fn reorder_follows_sequence_positions() {
        let remote = InMemoryRemote::new();
        let project = remote.seed_project(&[1.0, 2.0, 3.0]);

        remote
            .reorder_items(
                &project.id,
                &["photo-2".to_owned(), "photo-0".to_owned(), "photo-1".to_owned()],
            )
            .expect("reorder");

        let stored = remote.fetch_project(&project.id).expect("fetch");
        assert_eq!(stored.item_ids(), vec!["photo-2", "photo-0", "photo-1"]);
        assert_eq!(stored.items[0].order, 0);
    }

    #[test]
    fn beat_sync_assigns_scaled_interval_to_every_item() {
        let remote = InMemoryRemote::new();
        let project = remote.seed_project(&[1.0, 2.0, 3.0]);
        remote.seed_audio(&project.id, 120.0);
        remote
            .update_settings(
                &project.id,
                &SettingsPatch {
                    global_rhythm_multiplier: Some(2.0),
                    ..SettingsPatch::default()
                },
            )
            .expect("settings");

        let outcome = remote.sync_to_beats(&project.id).expect("sync");

        assert!(outcome.synced);
        assert_eq!(outcome.beat_interval, Some(1.0));
        let stored = remote.project(&project.id).expect("stored");
        assert!(stored.items.iter().all(|item| item.duration == 1.0));
    }

    #[test]
    fn beat_sync_without_audio_fails() {
        let remote = InMemoryRemote::new();
        let project = remote.seed_project(&[1.0]);

        assert!(remote.sync_to_beats(&project.id).is_err());
    }

    #[test]
    fn delete_keeps_order_dense() {
        let remote = InMemoryRemote::new();
        let project = remote.seed_project(&[1.0, 1.0, 1.0]);

        remote.delete_item(&project.id, "photo-1").expect("delete");

        let stored = remote.project(&project.id).expect("stored");
        let orders: Vec<u32> = stored.items.iter().map(|item| item.order).collect();
        assert_eq!(orders, vec![0, 1]);
    }

    #[test]
    fn format_change_regenerates_preview_names() {
        let remote = InMemoryRemote::new();
        let project = remote.seed_project(&[1.0]);

        remote
            .update_settings(
                &project.id,
                &SettingsPatch {
                    format: Some(Format::Vertical),
                    ..SettingsPatch::default()
                },
            )
            .expect("settings");

        let stored = remote.project(&project.id).expect("stored");
        assert_eq!(
            stored.items[0].media.preview.as_deref(),
            Some("photo-0_preview_vertical.jpg")
        );
    }

    #[test]
    fn unscripted_export_completes_after_four_polls() {
        let remote = InMemoryRemote::new();
        let project = remote.seed_project(&[1.0]);
        remote.start_export(&project.id).expect("start");

        let mut last = None;
        for _ in 0..4 {
            last = Some(remote.export_status(&project.id).expect("status"));
        }

        let job = last.expect("polled");
        assert_eq!(job.status, ExportStatus::Completed);
        assert_eq!(job.progress, 100.0);
        assert!(remote.download_export(&project.id).is_ok());
    }

    #[test]
    fn injected_failures_fire_once_and_are_recorded() {
        let remote = InMemoryRemote::new();
        let project = remote.seed_project(&[1.0]);
        remote.fail_next(Operation::FetchProject);

        assert!(remote.fetch_project(&project.id).is_err());
        assert!(remote.fetch_project(&project.id).is_ok());
        assert_eq!(
            remote.calls(),
            vec![Operation::FetchProject, Operation::FetchProject]
        );
    }

    #[test]
    fn unsupported_uploads_are_skipped() {
        let remote = InMemoryRemote::new();
        let project = remote.seed_project(&[]);

        let report = remote
            .add_items(&project.id, &[PathBuf::from("notes.txt")])
            .expect("upload");

        assert_eq!(report.uploaded, 0);
    }

    #[test]
    fn audio_upload_requires_mp3() {
        let remote = InMemoryRemote::new();
        let project = remote.seed_project(&[1.0]);

        let result = remote.set_audio_track(&project.id, &PathBuf::from("song.wav"));
        assert!(matches!(result, Err(EngineError::UnsupportedMedia { .. })));

        let track = remote
            .set_audio_track(&project.id, &PathBuf::from("song.MP3"))
            .expect("mp3 upload");
        assert_eq!(track.original_name, "song.MP3");
    }
}
