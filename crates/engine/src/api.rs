use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::export::{ExportJob, ExportMonitor};
use crate::mutation::{apply_reorder, has_dense_order, validate_duration};
use crate::playback::{ClockTick, PlaybackClock, PlaybackState};
use crate::project::{ItemId, Orientation, Project, Settings, SettingsPatch};
use crate::remote::{MediaKind, ProjectRemote};
use crate::scheduler::{Scheduler, TaskKind};
use crate::session::{self, SessionStore};
use crate::sync::{AudioChannel, PlaybackFrame, SyncController};
use crate::time::TimeSource;
use crate::timeline::TimelineIndex;

/// Commands accepted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Resumes the recorded project or creates a new one.
    OpenSession,
    /// Replaces the active project with a freshly created one.
    NewProject,
    Refresh,
    AddItems {
        paths: Vec<PathBuf>,
    },
    SetAudioTrack {
        path: PathBuf,
    },
    /// Asks the store to derive every item duration from the track tempo.
    SyncToBeats,
    UpdateSettings {
        patch: SettingsPatch,
    },
    /// Moves items into `sequence` order.
    ///
    /// Applied locally before the request is sent; if the request fails the
    /// project is re-fetched and replaces the local copy.
    ///
    /// # Example
    /// ```ignore
    /// use engine::Command;
    ///
    /// let _ = engine.handle_command(Command::Reorder {
    ///     sequence: vec!["photo-2".into(), "photo-0".into(), "photo-1".into()],
    /// });
    /// ```
    Reorder {
        sequence: Vec<ItemId>,
    },
    SetItemDuration {
        item_id: ItemId,
        duration: f64,
    },
    /// Sets the same duration on every item in one request.
    SetAllDurations {
        duration: f64,
    },
    DeleteItem {
        item_id: ItemId,
    },
    Play,
    Pause,
    Seek {
        seconds: f64,
    },
    Stop,
    StartExport,
    DownloadExport {
        path: PathBuf,
    },
    DismissExport,
}

/// Events emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ProjectChanged(ProjectSnapshot),
    PlaybackChanged {
        state: PlaybackState,
        current_time: f64,
    },
    Frame(PlaybackFrame),
    ExportChanged(ExportJob),
    ExportDownloaded {
        path: PathBuf,
        bytes: usize,
    },
    Error(EngineErrorEvent),
}

/// Category of a user-facing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    Initialization,
    Mutation,
    Upload,
    Export,
    Playback,
    Other,
}

impl From<&EngineError> for EngineErrorKind {
    fn from(value: &EngineError) -> Self {
        match value {
            EngineError::InvalidDuration { .. }
            | EngineError::InvalidReorder { .. }
            | EngineError::InvalidRhythmMultiplier { .. }
            | EngineError::ItemNotFound { .. }
            | EngineError::NoAudioTrack => Self::Mutation,
            EngineError::ExportInProgress | EngineError::ExportNotReady => Self::Export,
            EngineError::EmptyTimeline => Self::Playback,
            _ => Self::Other,
        }
    }
}

/// User-facing error payload emitted as an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineErrorEvent {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineErrorEvent {
    pub fn new(kind: EngineErrorKind, error: &EngineError) -> Self {
        Self {
            kind,
            message: error.to_string(),
        }
    }

    pub fn from_error(error: &EngineError) -> Self {
        Self::new(EngineErrorKind::from(error), error)
    }
}

/// Immutable project snapshot consumed by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSnapshot {
    pub project_id: String,
    pub items: Vec<ItemSummary>,
    pub total_duration: f64,
    pub audio_tempo: Option<f64>,
    pub settings: Settings,
}

/// Snapshot representation of one timeline item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSummary {
    pub id: ItemId,
    pub order: u32,
    pub start: f64,
    pub duration: f64,
    pub orientation: Orientation,
    pub thumbnail: Option<String>,
}

/// Timeline engine: owns the active project, the playback clock and the
/// export monitor, and runs their timers cooperatively on the caller's
/// thread.
pub struct Engine<R, A, T> {
    remote: R,
    audio: A,
    time: T,
    session: Box<dyn SessionStore + Send>,
    project: Option<Project>,
    index: TimelineIndex,
    clock: PlaybackClock,
    sync: SyncController,
    export: ExportMonitor,
    scheduler: Scheduler,
    loaded_audio: Option<String>,
}

impl<R, A, T> Engine<R, A, T>
where
    R: ProjectRemote,
    A: AudioChannel,
    T: TimeSource,
{
    /// Creates an engine without an active project; send
    /// [`Command::OpenSession`] to load one.
    ///
    /// # Example
    /// ```
    /// use engine::config::EngineConfig;
    /// use engine::remote::InMemoryRemote;
    /// use engine::session::MemorySessionStore;
    /// use engine::sync::SilentAudio;
    /// use engine::time::SystemTimeSource;
    /// use engine::{Command, Engine};
    ///
    /// let mut engine = Engine::new(
    ///     InMemoryRemote::new(),
    ///     SilentAudio,
    ///     SystemTimeSource::new(),
    ///     MemorySessionStore::new(),
    ///     &EngineConfig::default(),
    /// );
    /// let events = engine.handle_command(Command::OpenSession).unwrap();
    /// assert!(!events.is_empty());
    /// ```
    pub fn new<S>(remote: R, audio: A, time: T, session: S, config: &EngineConfig) -> Self
    where
        S: SessionStore + Send + 'static,
    {
        Self {
            remote,
            audio,
            time,
            session: Box::new(session),
            project: None,
            index: TimelineIndex::default(),
            clock: PlaybackClock::new(config.tick_interval()),
            sync: SyncController::new(config.fade_duration_secs, config.zoom_factor),
            export: ExportMonitor::new(config.export_poll_interval()),
            scheduler: Scheduler::new(),
            loaded_audio: None,
        }
    }

    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    pub fn timeline(&self) -> &TimelineIndex {
        &self.index
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.clock.state()
    }

    pub fn current_time(&self) -> f64 {
        self.clock.current_time()
    }

    pub fn export_job(&self) -> &ExportJob {
        self.export.job()
    }

    /// Applies one command and returns emitted events.
    pub fn handle_command(&mut self, command: Command) -> Result<Vec<Event>> {
        match command {
            Command::OpenSession => Ok(self.open_session()),
            Command::NewProject => self.new_project(),
            Command::Refresh => self.refresh(),
            Command::AddItems { paths } => self.add_items(paths),
            Command::SetAudioTrack { path } => self.set_audio_track(path),
            Command::SyncToBeats => self.sync_to_beats(),
            Command::UpdateSettings { patch } => self.update_settings(patch),
            Command::Reorder { sequence } => self.reorder(sequence),
            Command::SetItemDuration { item_id, duration } => {
                self.set_item_duration(item_id, duration)
            }
            Command::SetAllDurations { duration } => self.set_all_durations(duration),
            Command::DeleteItem { item_id } => self.delete_item(item_id),
            Command::Play => self.play(),
            Command::Pause => Ok(self.pause()),
            Command::Seek { seconds } => self.seek(seconds),
            Command::Stop => Ok(self.stop()),
            Command::StartExport => self.start_export(),
            Command::DownloadExport { path } => self.download_export(path),
            Command::DismissExport => {
                self.export.dismiss(&mut self.scheduler);
                Ok(vec![Event::ExportChanged(self.export.job().clone())])
            }
        }
    }

    /// Runs every timer callback that is due and returns their events.
    pub fn run_due_tasks(&mut self) -> Vec<Event> {
        let now = self.time.now();
        let mut events = Vec::new();
        for (task, kind) in self.scheduler.take_due(now) {
            // An earlier callback in this batch may have cancelled this one.
            if !self.scheduler.is_scheduled(task) {
                continue;
            }
            match kind {
                TaskKind::PlaybackTick => self.on_playback_tick(now, &mut events),
                TaskKind::ExportPoll => self.on_export_poll(&mut events),
            }
        }
        events
    }

    /// Time until the next timer callback is due, `None` when idle.
    pub fn time_until_next_task(&self) -> Option<Duration> {
        self.scheduler.time_until_next(self.time.now())
    }

    /// Cancels every pending callback and silences audio.
    pub fn dispose(&mut self) {
        self.clock.reset(&mut self.scheduler);
        self.export.dismiss(&mut self.scheduler);
        self.scheduler.cancel_all();
        self.sync.reset();
        if self.has_audio() {
            self.sync.pause_audio(&mut self.audio);
        }
        debug!("engine disposed");
    }

    fn open_session(&mut self) -> Vec<Event> {
        match session::resume_or_create(&self.remote, self.session.as_mut()) {
            Ok(project) => self.replace_session_project(project),
            Err(error) => {
                warn!(%error, "session initialization failed");
                vec![Event::Error(EngineErrorEvent::new(
                    EngineErrorKind::Initialization,
                    &error,
                ))]
            }
        }
    }

    fn new_project(&mut self) -> Result<Vec<Event>> {
        let project = session::start_new(&self.remote, self.session.as_mut())?;
        Ok(self.replace_session_project(project))
    }

    fn replace_session_project(&mut self, project: Project) -> Vec<Event> {
        self.clock.reset(&mut self.scheduler);
        self.sync.reset();
        self.export.dismiss(&mut self.scheduler);
        let mut events = self.install_project(project);
        events.push(Event::PlaybackChanged {
            state: self.clock.state(),
            current_time: self.clock.current_time(),
        });
        events.push(Event::ExportChanged(self.export.job().clone()));
        events
    }

    fn refresh(&mut self) -> Result<Vec<Event>> {
        let project_id = self.project_id()?;
        let project = self.remote.fetch_project(&project_id)?;
        Ok(self.install_project(project))
    }

    /// Replaces the local project with `project` and re-derives everything
    /// that depends on the item list.
    fn install_project(&mut self, mut project: Project) -> Vec<Event> {
        project.normalize();
        if !has_dense_order(&project.items) {
            warn!(project_id = %project.id, "item order is not dense");
        }
        let now = self.time.now();
        self.index = TimelineIndex::rebuild(&project.items);
        let clamped = self
            .clock
            .clamp_to(self.index.total(), now, &mut self.scheduler);
        self.load_audio_source(&project);

        info!(
            project_id = %project.id,
            item_count = self.index.len(),
            total_duration = self.index.total(),
            "project installed"
        );
        let mut events = vec![Event::ProjectChanged(project.snapshot(&self.index))];
        self.project = Some(project);

        if clamped {
            if !self.clock.is_running() && self.has_audio() {
                self.sync.pause_audio(&mut self.audio);
            }
            events.push(Event::PlaybackChanged {
                state: self.clock.state(),
                current_time: self.clock.current_time(),
            });
            events.push(Event::Frame(self.sample_frame(now)));
        }
        events
    }

    fn load_audio_source(&mut self, project: &Project) {
        let filename = project.audio.as_ref().map(|track| track.filename.clone());
        if filename == self.loaded_audio {
            return;
        }
        match &filename {
            Some(filename) => {
                let url = self.remote.media_url(MediaKind::Audio, filename);
                match self.audio.load(&url) {
                    Ok(()) if self.clock.is_running() => {
                        self.sync
                            .align_audio(&mut self.audio, self.clock.current_time(), true);
                    }
                    Ok(()) => {}
                    Err(error) => warn!(%error, %url, "audio source could not be loaded"),
                }
            }
            None => self.sync.pause_audio(&mut self.audio),
        }
        self.loaded_audio = filename;
    }

    /// Refreshes after a settled or failed request; `outcome` errors are
    /// surfaced as `kind` events, never retried.
    fn reconcile(
        &mut self,
        kind: EngineErrorKind,
        outcome: Result<()>,
        mut events: Vec<Event>,
    ) -> Vec<Event> {
        if let Err(error) = outcome {
            warn!(%error, ?kind, "remote rejected edit, refreshing");
            events.push(Event::Error(EngineErrorEvent::new(kind, &error)));
        }
        match self.refresh() {
            Ok(refreshed) => events.extend(refreshed),
            Err(error) => {
                warn!(%error, "refresh after edit failed");
                events.push(Event::Error(EngineErrorEvent::new(kind, &error)));
            }
        }
        events
    }

    fn add_items(&mut self, paths: Vec<PathBuf>) -> Result<Vec<Event>> {
        let project_id = self.project_id()?;
        match self.remote.add_items(&project_id, &paths) {
            Ok(report) => {
                info!(uploaded = report.uploaded, requested = paths.len(), "items uploaded");
                Ok(self.reconcile(EngineErrorKind::Upload, Ok(()), Vec::new()))
            }
            Err(error) => {
                warn!(%error, "item upload failed");
                Ok(vec![Event::Error(EngineErrorEvent::new(
                    EngineErrorKind::Upload,
                    &error,
                ))])
            }
        }
    }

    fn set_audio_track(&mut self, path: PathBuf) -> Result<Vec<Event>> {
        let project_id = self.project_id()?;
        match self.remote.set_audio_track(&project_id, &path) {
            Ok(track) => {
                info!(tempo = track.tempo, duration = track.duration, "audio track set");
                Ok(self.reconcile(EngineErrorKind::Upload, Ok(()), Vec::new()))
            }
            Err(error) => {
                warn!(%error, path = %path.display(), "audio upload failed");
                Ok(vec![Event::Error(EngineErrorEvent::new(
                    EngineErrorKind::Upload,
                    &error,
                ))])
            }
        }
    }

    fn sync_to_beats(&mut self) -> Result<Vec<Event>> {
        let project = self.project.as_ref().ok_or(EngineError::ProjectNotLoaded)?;
        if project.audio.is_none() {
            return Err(EngineError::NoAudioTrack);
        }
        let project_id = project.id.clone();
        let outcome = self.remote.sync_to_beats(&project_id).map(|sync| {
            info!(synced = sync.synced, beat_interval = ?sync.beat_interval, "beat sync applied");
        });
        Ok(self.reconcile(EngineErrorKind::Mutation, outcome, Vec::new()))
    }

    fn update_settings(&mut self, patch: SettingsPatch) -> Result<Vec<Event>> {
        let project_id = self.project_id()?;
        patch.validate()?;
        if patch.is_empty() {
            return Ok(Vec::new());
        }
        let outcome = self.remote.update_settings(&project_id, &patch);
        Ok(self.reconcile(EngineErrorKind::Mutation, outcome, Vec::new()))
    }

    fn reorder(&mut self, sequence: Vec<ItemId>) -> Result<Vec<Event>> {
        let project = self.project.as_mut().ok_or(EngineError::ProjectNotLoaded)?;
        apply_reorder(&mut project.items, &sequence)?;
        let project_id = project.id.clone();
        self.index = TimelineIndex::rebuild(&project.items);
        let events = vec![Event::ProjectChanged(project.snapshot(&self.index))];

        match self.remote.reorder_items(&project_id, &sequence) {
            Ok(()) => {
                info!(item_count = sequence.len(), "reorder persisted");
                Ok(events)
            }
            Err(error) => Ok(self.reconcile(EngineErrorKind::Mutation, Err(error), events)),
        }
    }

    fn set_item_duration(&mut self, item_id: ItemId, duration: f64) -> Result<Vec<Event>> {
        let duration = validate_duration(duration)?;
        let project = self.project.as_ref().ok_or(EngineError::ProjectNotLoaded)?;
        if project.item(&item_id).is_none() {
            return Err(EngineError::ItemNotFound { item_id });
        }
        let project_id = project.id.clone();

        let outcome = self
            .remote
            .update_item_duration(&project_id, &item_id, duration);
        Ok(self.reconcile(EngineErrorKind::Mutation, outcome, Vec::new()))
    }

    fn set_all_durations(&mut self, duration: f64) -> Result<Vec<Event>> {
        let duration = validate_duration(duration)?;
        let project_id = self.project_id()?;

        let outcome = self.remote.update_all_durations(&project_id, duration);
        Ok(self.reconcile(EngineErrorKind::Mutation, outcome, Vec::new()))
    }

    fn delete_item(&mut self, item_id: ItemId) -> Result<Vec<Event>> {
        let project_id = self.project_id()?;

        let outcome = self.remote.delete_item(&project_id, &item_id);
        Ok(self.reconcile(EngineErrorKind::Mutation, outcome, Vec::new()))
    }

    fn play(&mut self) -> Result<Vec<Event>> {
        self.project_id()?;
        let now = self.time.now();
        if !self
            .clock
            .play(now, self.index.total(), &mut self.scheduler)?
        {
            return Ok(Vec::new());
        }

        if self.has_audio() {
            self.sync
                .align_audio(&mut self.audio, self.clock.current_time(), true);
        }
        Ok(vec![
            Event::PlaybackChanged {
                state: self.clock.state(),
                current_time: self.clock.current_time(),
            },
            Event::Frame(self.sample_frame(now)),
        ])
    }

    fn pause(&mut self) -> Vec<Event> {
        let now = self.time.now();
        if !self
            .clock
            .pause(now, self.index.total(), &mut self.scheduler)
        {
            return Vec::new();
        }
        if self.clock.state() == PlaybackState::Stopped {
            self.sync.reset();
        }
        if self.has_audio() {
            self.sync.pause_audio(&mut self.audio);
        }
        vec![
            Event::PlaybackChanged {
                state: self.clock.state(),
                current_time: self.clock.current_time(),
            },
            Event::Frame(self.sample_frame(now)),
        ]
    }

    fn seek(&mut self, seconds: f64) -> Result<Vec<Event>> {
        self.project_id()?;
        let now = self.time.now();
        let position = self.clock.seek(seconds, self.index.total(), now);
        if self.has_audio() {
            self.sync
                .align_audio(&mut self.audio, position, self.clock.is_running());
        }
        Ok(vec![
            Event::PlaybackChanged {
                state: self.clock.state(),
                current_time: position,
            },
            Event::Frame(self.sample_frame(now)),
        ])
    }

    fn stop(&mut self) -> Vec<Event> {
        let now = self.time.now();
        self.clock.reset(&mut self.scheduler);
        self.sync.reset();
        if self.has_audio() {
            self.sync.pause_audio(&mut self.audio);
        }
        vec![
            Event::PlaybackChanged {
                state: self.clock.state(),
                current_time: 0.0,
            },
            Event::Frame(self.sample_frame(now)),
        ]
    }

    fn on_playback_tick(&mut self, now: Duration, events: &mut Vec<Event>) {
        match self
            .clock
            .tick(now, self.index.total(), &mut self.scheduler)
        {
            ClockTick::Idle => {}
            ClockTick::Advanced(_) => events.push(Event::Frame(self.sample_frame(now))),
            ClockTick::Finished => {
                self.sync.reset();
                if self.has_audio() {
                    self.sync.pause_audio(&mut self.audio);
                }
                events.push(Event::PlaybackChanged {
                    state: self.clock.state(),
                    current_time: self.clock.current_time(),
                });
                events.push(Event::Frame(self.sample_frame(now)));
            }
        }
    }

    fn start_export(&mut self) -> Result<Vec<Event>> {
        let project = self.project.as_ref().ok_or(EngineError::ProjectNotLoaded)?;
        let now = self.time.now();
        let started = self.export.start(
            &self.remote,
            &project.id,
            project.items.len(),
            &mut self.scheduler,
            now,
        );

        match started {
            Ok(()) => Ok(vec![Event::ExportChanged(self.export.job().clone())]),
            Err(error) if error.is_remote() => Ok(vec![
                Event::ExportChanged(self.export.job().clone()),
                Event::Error(EngineErrorEvent::new(EngineErrorKind::Export, &error)),
            ]),
            Err(error) => Err(error),
        }
    }

    fn on_export_poll(&mut self, events: &mut Vec<Event>) {
        let Some(project_id) = self.project.as_ref().map(|project| project.id.clone()) else {
            self.export.dismiss(&mut self.scheduler);
            return;
        };
        let polled = self
            .export
            .poll(&self.remote, &project_id, &mut self.scheduler);
        events.push(Event::ExportChanged(self.export.job().clone()));
        if let Err(error) = polled {
            events.push(Event::Error(EngineErrorEvent::new(
                EngineErrorKind::Export,
                &error,
            )));
        }
    }

    fn download_export(&mut self, path: PathBuf) -> Result<Vec<Event>> {
        let project_id = self.project_id()?;
        let bytes = self.export.download(&self.remote, &project_id)?;
        fs::write(&path, &bytes).map_err(|source| EngineError::Io {
            context: "failed to write export",
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), bytes = bytes.len(), "export downloaded");
        Ok(vec![Event::ExportDownloaded {
            path,
            bytes: bytes.len(),
        }])
    }

    fn sample_frame(&mut self, now: Duration) -> PlaybackFrame {
        let frame = self.sync.frame(
            now,
            self.clock.current_time(),
            self.clock.is_running(),
            &self.index,
        );
        if self.has_audio() {
            self.sync.apply_volume(&mut self.audio, &frame);
        }
        frame
    }

    fn has_audio(&self) -> bool {
        self.loaded_audio.is_some()
    }

    fn project_id(&self) -> Result<String> {
        self.project
            .as_ref()
            .map(|project| project.id.clone())
            .ok_or(EngineError::ProjectNotLoaded)
    }
}
