use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::multipart::Form;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Serialize;
use tracing::debug;

use super::{BeatSync, MediaKind, Operation, ProjectRemote, UploadReport};
use crate::error::{EngineError, Result};
use crate::export::ExportJob;
use crate::project::{AudioTrack, ItemId, Project, SettingsPatch};

/// Blocking HTTP client for the project REST API.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct ReorderBody<'a> {
    photo_ids: &'a [ItemId],
}

#[derive(Serialize)]
struct DurationBody<'a> {
    photo_id: &'a str,
    duration: f64,
}

#[derive(Serialize)]
struct AllDurationsBody {
    duration: f64,
}

impl HttpRemote {
    /// Creates a client for the API rooted at `base_url` (e.g.
    /// `http://localhost:8001`).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| EngineError::Http {
                operation: "build client",
                source,
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{path}", self.base_url)
    }

    fn project_url(&self, project_id: &str, suffix: &str) -> String {
        self.api_url(&format!("/projects/{project_id}{suffix}"))
    }

    fn send(&self, operation: Operation, request: RequestBuilder) -> Result<Response> {
        debug!(operation = operation.name(), "remote request");
        let response = request.send().map_err(http_error(operation))?;
        response.error_for_status().map_err(http_error(operation))
    }
}

fn http_error(operation: Operation) -> impl FnOnce(reqwest::Error) -> EngineError {
    move |source| EngineError::Http {
        operation: operation.name(),
        source,
    }
}

impl ProjectRemote for HttpRemote {
    fn create_project(&self) -> Result<Project> {
        let operation = Operation::CreateProject;
        self.send(operation, self.client.post(self.api_url("/projects")))?
            .json()
            .map_err(http_error(operation))
    }

    fn fetch_project(&self, project_id: &str) -> Result<Project> {
        let operation = Operation::FetchProject;
        let response = self
            .client
            .get(self.project_url(project_id, ""))
            .send()
            .map_err(http_error(operation))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(EngineError::ProjectNotFound {
                project_id: project_id.to_owned(),
            });
        }
        response
            .error_for_status()
            .map_err(http_error(operation))?
            .json()
            .map_err(http_error(operation))
    }

    fn add_items(&self, project_id: &str, paths: &[PathBuf]) -> Result<UploadReport> {
        let operation = Operation::AddItems;
        let mut form = Form::new();
        for path in paths {
            form = form
                .file("files", path)
                .map_err(|source| EngineError::Io {
                    context: "failed to read upload",
                    path: path.clone(),
                    source,
                })?;
        }
        self.send(
            operation,
            self.client
                .post(self.project_url(project_id, "/photos"))
                .multipart(form),
        )?
        .json()
        .map_err(http_error(operation))
    }

    fn set_audio_track(&self, project_id: &str, path: &Path) -> Result<AudioTrack> {
        let operation = Operation::SetAudioTrack;
        let form = Form::new()
            .file("file", path)
            .map_err(|source| EngineError::Io {
                context: "failed to read audio upload",
                path: path.to_path_buf(),
                source,
            })?;
        self.send(
            operation,
            self.client
                .post(self.project_url(project_id, "/music"))
                .multipart(form),
        )?
        .json()
        .map_err(http_error(operation))
    }

    fn sync_to_beats(&self, project_id: &str) -> Result<BeatSync> {
        let operation = Operation::SyncToBeats;
        self.send(
            operation,
            self.client
                .post(self.project_url(project_id, "/sync-to-beats")),
        )?
        .json()
        .map_err(http_error(operation))
    }

    fn update_settings(&self, project_id: &str, patch: &SettingsPatch) -> Result<()> {
        self.send(
            Operation::UpdateSettings,
            self.client
                .put(self.project_url(project_id, "/settings"))
                .json(patch),
        )?;
        Ok(())
    }

    fn update_item_duration(&self, project_id: &str, item_id: &str, duration: f64) -> Result<()> {
        self.send(
            Operation::UpdateItemDuration,
            self.client
                .put(self.project_url(project_id, "/photos/duration"))
                .json(&DurationBody {
                    photo_id: item_id,
                    duration,
                }),
        )?;
        Ok(())
    }

    fn update_all_durations(&self, project_id: &str, duration: f64) -> Result<()> {
        self.send(
            Operation::UpdateAllDurations,
            self.client
                .put(self.project_url(project_id, "/photos/duration/all"))
                .json(&AllDurationsBody { duration }),
        )?;
        Ok(())
    }

    fn reorder_items(&self, project_id: &str, sequence: &[ItemId]) -> Result<()> {
        self.send(
            Operation::ReorderItems,
            self.client
                .put(self.project_url(project_id, "/photos/reorder"))
                .json(&ReorderBody {
                    photo_ids: sequence,
                }),
        )?;
        Ok(())
    }

    fn delete_item(&self, project_id: &str, item_id: &str) -> Result<()> {
        self.send(
            Operation::DeleteItem,
            self.client
                .delete(self.project_url(project_id, &format!("/photos/{item_id}"))),
        )?;
        Ok(())
    }

    fn start_export(&self, project_id: &str) -> Result<()> {
        self.send(
            Operation::StartExport,
            self.client.post(self.project_url(project_id, "/export")),
        )?;
        Ok(())
    }

    fn export_status(&self, project_id: &str) -> Result<ExportJob> {
        let operation = Operation::ExportStatus;
        self.send(
            operation,
            self.client
                .get(self.project_url(project_id, "/export/status")),
        )?
        .json()
        .map_err(http_error(operation))
    }

    fn download_export(&self, project_id: &str) -> Result<Vec<u8>> {
        let operation = Operation::DownloadExport;
        let bytes = self
            .send(
                operation,
                self.client
                    .get(self.project_url(project_id, "/export/download")),
            )?
            .bytes()
            .map_err(http_error(operation))?;
        Ok(bytes.to_vec())
    }

    fn media_url(&self, kind: MediaKind, filename: &str) -> String {
        self.api_url(&format!("/{}/{filename}", kind.path_segment()))
    }
}
