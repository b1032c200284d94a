use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::project::{Project, ProjectId};
use crate::remote::ProjectRemote;

const SESSION_FILE_NAME: &str = "session.json";

/// Durable storage for the active project id.
pub trait SessionStore {
    fn load(&self) -> Result<Option<ProjectId>>;

    fn save(&mut self, project_id: &str) -> Result<()>;

    fn clear(&mut self) -> Result<()>;
}

impl<S: SessionStore + ?Sized> SessionStore for Box<S> {
    fn load(&self) -> Result<Option<ProjectId>> {
        (**self).load()
    }

    fn save(&mut self, project_id: &str) -> Result<()> {
        (**self).save(project_id)
    }

    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }
}

/// Keeps the project id in memory only.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    project_id: Option<ProjectId>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(project_id: impl Into<ProjectId>) -> Self {
        Self {
            project_id: Some(project_id.into()),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<ProjectId>> {
        Ok(self.project_id.clone())
    }

    fn save(&mut self, project_id: &str) -> Result<()> {
        self.project_id = Some(project_id.to_owned());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.project_id = None;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    project_id: ProjectId,
}

/// Keeps the project id in a small JSON file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in the platform data directory, e.g.
    /// `~/.local/share/photosync/session.json` on Linux.
    pub fn in_data_dir() -> Result<Self> {
        let dirs =
            ProjectDirs::from("", "", "photosync").ok_or(EngineError::NoSessionDirectory)?;
        Ok(Self::new(dirs.data_dir().join(SESSION_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<ProjectId>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(EngineError::Io {
                    context: "failed to read session file",
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let file: SessionFile =
            serde_json::from_slice(&bytes).map_err(|source| EngineError::Json {
                path: self.path.clone(),
                source,
            })?;
        Ok(Some(file.project_id))
    }

    fn save(&mut self, project_id: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| EngineError::Io {
                context: "failed to create session directory",
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_vec_pretty(&SessionFile {
            project_id: project_id.to_owned(),
        })
        .map_err(|source| EngineError::Json {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, json).map_err(|source| EngineError::Io {
            context: "failed to write session file",
            path: self.path.clone(),
            source,
        })
    }

    fn clear(&mut self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(EngineError::Io {
                context: "failed to remove session file",
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Resumes the recorded project or creates a fresh one.
///
/// A missing, unreadable or stale key never fails the session: the key is
/// cleared and a new project is created and recorded. Only a failed creation
/// is returned as an error.
pub fn resume_or_create<R, S>(remote: &R, store: &mut S) -> Result<Project>
where
    R: ProjectRemote + ?Sized,
    S: SessionStore + ?Sized,
{
    let recorded = store.load().unwrap_or_else(|error| {
        warn!(%error, "session key unreadable, starting fresh");
        None
    });

    if let Some(project_id) = recorded {
        match remote.fetch_project(&project_id) {
            Ok(mut project) => {
                project.normalize();
                info!(project_id = %project.id, item_count = project.items.len(), "session resumed");
                return Ok(project);
            }
            Err(error) => {
                warn!(%error, %project_id, "recorded project unavailable, clearing key");
                if let Err(error) = store.clear() {
                    warn!(%error, "failed to clear session key");
                }
            }
        }
    }

    start_new(remote, store)
}

/// Creates a project and records it as the active one.
pub fn start_new<R, S>(remote: &R, store: &mut S) -> Result<Project>
where
    R: ProjectRemote + ?Sized,
    S: SessionStore + ?Sized,
{
    let project = remote.create_project()?;
    if let Err(error) = store.save(&project.id) {
        warn!(%error, project_id = %project.id, "failed to persist session key");
    }
    info!(project_id = %project.id, "session created");
    Ok(project)
}
