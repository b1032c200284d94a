//! Host-agnostic photo timeline engine: keeps a remote project, its playback
//! clock, audio sync and export job consistent.

pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod mutation;
pub mod playback;
pub mod project;
pub mod remote;
pub mod scheduler;
pub mod session;
pub mod sync;
pub mod time;
pub mod timeline;

pub use api::{
    Command, Engine, EngineErrorEvent, EngineErrorKind, Event, ItemSummary, ProjectSnapshot,
};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use export::{ExportJob, ExportStatus};
pub use playback::PlaybackState;
pub use remote::{HttpRemote, InMemoryRemote, ProjectRemote};
pub use sync::{AudioChannel, PlaybackFrame, SilentAudio};
pub use time::{ManualTimeSource, SystemTimeSource, TimeSource};
pub use timeline::TimelineIndex;
