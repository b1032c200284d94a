mod bridge;

use std::path::PathBuf;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use anyhow::{Context as _, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use engine::project::{AnimationType, Format, Resolution, SettingsPatch, Transition};
use engine::remote::InMemoryRemote;
use engine::session::{FileSessionStore, MemorySessionStore, SessionStore};
use engine::{
    Command, Engine, EngineConfig, EngineErrorKind, Event, ExportStatus, HttpRemote,
    PlaybackState, ProjectRemote, ProjectSnapshot, SilentAudio, SystemTimeSource,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use bridge::{EngineCommandSender, EngineEventReceiver, spawn_engine_bridge};

/// Quiet period after which a command is considered settled.
const SETTLE: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(name = "photosync", version)]
struct Cli {
    /// Base URL of the project API.
    #[arg(long, env = "PHOTOSYNC_API_URL")]
    api_url: Option<String>,

    /// JSON engine config file.
    #[arg(long, env = "PHOTOSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Keep the project in memory instead of talking to the API.
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Item durations of the in-memory project, e.g. `2,3,1`.
    #[arg(long, value_delimiter = ',', requires = "offline")]
    seed: Vec<f64>,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Print the active project.
    Info,
    /// Replace the active project with an empty one.
    New,
    /// Play the timeline in real time and report item changes.
    Play {
        /// Start position in seconds.
        #[arg(long)]
        from: Option<f64>,
    },
    /// Upload image files.
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Upload the audio track.
    Music { path: PathBuf },
    /// Derive every item duration from the track tempo.
    SyncBeats,
    /// Update output settings.
    Settings(SettingsArgs),
    /// Move items into the given order.
    Reorder {
        #[arg(required = true)]
        item_ids: Vec<String>,
    },
    /// Set one item's duration in seconds.
    Duration { item_id: String, seconds: f64 },
    /// Set every item's duration in seconds.
    DurationAll { seconds: f64 },
    /// Remove an item.
    Delete { item_id: String },
    /// Render the timeline and download the result.
    Export {
        /// Output video path.
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Parser, Debug)]
struct SettingsArgs {
    #[arg(long)]
    format: Option<FormatArg>,

    #[arg(long)]
    resolution: Option<ResolutionArg>,

    #[arg(long)]
    transition: Option<TransitionArg>,

    /// Transition length in seconds.
    #[arg(long)]
    transition_duration: Option<f64>,

    /// Beats per item: 0.5, 1, 2 or 4.
    #[arg(long)]
    rhythm: Option<f64>,

    #[arg(long)]
    animation: Option<AnimationArg>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum FormatArg {
    Horizontal,
    Vertical,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ResolutionArg {
    #[value(name = "720p")]
    P720,
    #[value(name = "1080p")]
    P1080,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum TransitionArg {
    None,
    Fade,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum AnimationArg {
    Zoom,
    Pan,
    Both,
}

impl From<SettingsArgs> for SettingsPatch {
    fn from(args: SettingsArgs) -> Self {
        Self {
            format: args.format.map(|format| match format {
                FormatArg::Horizontal => Format::Horizontal,
                FormatArg::Vertical => Format::Vertical,
            }),
            resolution: args.resolution.map(|resolution| match resolution {
                ResolutionArg::P720 => Resolution::P720,
                ResolutionArg::P1080 => Resolution::P1080,
            }),
            transition: args.transition.map(|transition| match transition {
                TransitionArg::None => Transition::None,
                TransitionArg::Fade => Transition::Fade,
            }),
            transition_duration: args.transition_duration,
            global_rhythm_multiplier: args.rhythm,
            animation_type: args.animation.map(|animation| match animation {
                AnimationArg::Zoom => AnimationType::Zoom,
                AnimationArg::Pan => AnimationType::Pan,
                AnimationArg::Both => AnimationType::Both,
            }),
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let session = Session::start(&cli, &config)?;

    session.open()?;
    match cli.action {
        Action::Info => Ok(()),
        Action::New => session.apply(Command::NewProject),
        Action::Play { from } => session.play(from),
        Action::Add { paths } => session.apply(Command::AddItems { paths }),
        Action::Music { path } => session.apply(Command::SetAudioTrack { path }),
        Action::SyncBeats => session.apply(Command::SyncToBeats),
        Action::Settings(args) => {
            let patch = SettingsPatch::from(args);
            if patch.is_empty() {
                bail!("no setting given");
            }
            session.apply(Command::UpdateSettings { patch })
        }
        Action::Reorder { item_ids } => session.apply(Command::Reorder { sequence: item_ids }),
        Action::Duration { item_id, seconds } => session.apply(Command::SetItemDuration {
            item_id,
            duration: seconds,
        }),
        Action::DurationAll { seconds } => {
            session.apply(Command::SetAllDurations { duration: seconds })
        }
        Action::Delete { item_id } => session.apply(Command::DeleteItem { item_id }),
        Action::Export { out } => session.export(out),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("load config '{}'", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(api_url) = &cli.api_url {
        config.api_base_url = api_url.clone();
    }
    Ok(config)
}

/// Front-end half of the engine bridge.
struct Session {
    commands: EngineCommandSender,
    events: EngineEventReceiver,
    request_timeout: Duration,
}

impl Session {
    fn start(cli: &Cli, config: &EngineConfig) -> anyhow::Result<Self> {
        let (remote, store): (Box<dyn ProjectRemote + Send>, Box<dyn SessionStore + Send>) =
            if cli.offline {
                let remote = InMemoryRemote::new();
                let store = if cli.seed.is_empty() {
                    MemorySessionStore::new()
                } else {
                    MemorySessionStore::with_project(remote.seed_project(&cli.seed).id)
                };
                (Box::new(remote), Box::new(store))
            } else {
                let remote = HttpRemote::new(config.api_base_url.clone(), config.request_timeout())
                    .context("build api client")?;
                let store = match &config.session_file {
                    Some(path) => FileSessionStore::new(path),
                    None => FileSessionStore::in_data_dir().context("locate session file")?,
                };
                debug!(path = %store.path().display(), "session file");
                (Box::new(remote), Box::new(store))
            };

        let engine = Engine::new(remote, SilentAudio, SystemTimeSource::new(), store, config);
        let (commands, events) = spawn_engine_bridge(engine);
        Ok(Self {
            commands,
            events,
            request_timeout: config.request_timeout() + SETTLE,
        })
    }

    fn send(&self, command: Command) -> anyhow::Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("engine thread stopped"))
    }

    fn next_event(&self, timeout: Duration) -> anyhow::Result<Option<Event>> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => bail!("engine thread stopped"),
        }
    }

    fn open(&self) -> anyhow::Result<()> {
        self.send(Command::OpenSession)?;
        loop {
            let event = self
                .next_event(self.request_timeout)?
                .ok_or_else(|| anyhow!("timed out opening the session"))?;
            match event {
                Event::ProjectChanged(snapshot) => print_snapshot(&snapshot),
                Event::ExportChanged(_) => return Ok(()),
                Event::Error(error) if error.kind == EngineErrorKind::Initialization => {
                    bail!("could not open a project: {}", error.message)
                }
                _ => {}
            }
        }
    }

    /// Sends one edit and reports its events until the engine goes quiet.
    fn apply(&self, command: Command) -> anyhow::Result<()> {
        self.send(command)?;
        let mut failed = None;
        let mut wait = self.request_timeout;
        while let Some(event) = self.next_event(wait)? {
            wait = SETTLE;
            match event {
                Event::ProjectChanged(snapshot) => print_snapshot(&snapshot),
                Event::Error(error) => {
                    eprintln!("error: {}", error.message);
                    failed = Some(error.message);
                }
                _ => {}
            }
        }
        match failed {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }

    fn play(&self, from: Option<f64>) -> anyhow::Result<()> {
        if let Some(seconds) = from {
            self.send(Command::Seek { seconds })?;
        }
        self.send(Command::Play)?;

        let mut active = None;
        let mut started = false;
        loop {
            let event = self
                .next_event(self.request_timeout)?
                .ok_or_else(|| anyhow!("playback stopped reporting"))?;
            match event {
                Event::Frame(frame) if frame.active_index != active => {
                    active = frame.active_index;
                    if let (Some(position), Some(item_id)) = (active, &frame.item_id) {
                        println!("{:>7.2}s  #{position} {item_id}", frame.current_time);
                    }
                }
                Event::PlaybackChanged {
                    state: PlaybackState::Running,
                    ..
                } => started = true,
                Event::PlaybackChanged {
                    state: PlaybackState::Stopped,
                    ..
                } if started => {
                    println!("finished");
                    return Ok(());
                }
                Event::Error(error) => bail!("{}", error.message),
                _ => {}
            }
        }
    }

    fn export(&self, out: PathBuf) -> anyhow::Result<()> {
        self.send(Command::StartExport)?;
        loop {
            let event = self
                .next_event(self.request_timeout)?
                .ok_or_else(|| anyhow!("export status stopped updating"))?;
            match event {
                Event::ExportChanged(job) => {
                    eprintln!("export {:?} {:.0}%", job.status, job.progress);
                    if job.status.is_terminal() {
                        if job.status != ExportStatus::Completed {
                            bail!("export failed");
                        }
                        break;
                    }
                }
                Event::Error(error) => bail!("{}", error.message),
                _ => {}
            }
        }

        self.send(Command::DownloadExport { path: out })?;
        loop {
            let event = self
                .next_event(self.request_timeout)?
                .ok_or_else(|| anyhow!("download timed out"))?;
            match event {
                Event::ExportDownloaded { path, bytes } => {
                    eprintln!("wrote {} ({bytes} bytes)", path.display());
                    return Ok(());
                }
                Event::Error(error) => bail!("{}", error.message),
                _ => {}
            }
        }
    }
}

fn print_snapshot(snapshot: &ProjectSnapshot) {
    let tempo = snapshot
        .audio_tempo
        .map(|tempo| format!("{tempo:.0} bpm"))
        .unwrap_or_else(|| "no audio".to_owned());
    println!(
        "project {}  {} items  {:.2}s  {tempo}",
        snapshot.project_id,
        snapshot.items.len(),
        snapshot.total_duration
    );
    for item in &snapshot.items {
        println!(
            "  #{:<3} {:<38} {:>7.2}s +{:.2}s  {:?}",
            item.order, item.id, item.start, item.duration, item.orientation
        );
    }
}
