use std::path::PathBuf;

use thiserror::Error;

/// Result type used by the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by engine commands, remote requests and session handling.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("project is not loaded")]
    ProjectNotLoaded,
    #[error("timeline has no items")]
    EmptyTimeline,
    #[error("item not found: {item_id}")]
    ItemNotFound { item_id: String },
    #[error("invalid duration {duration}: durations must be positive seconds")]
    InvalidDuration { duration: f64 },
    #[error("invalid reorder sequence: {reason}")]
    InvalidReorder { reason: String },
    #[error("invalid rhythm multiplier {value}")]
    InvalidRhythmMultiplier { value: f64 },
    #[error("project has no audio track")]
    NoAudioTrack,
    #[error("an export is already processing")]
    ExportInProgress,
    #[error("export is not completed")]
    ExportNotReady,
    #[error("remote {operation} failed: {reason}")]
    Remote {
        operation: &'static str,
        reason: String,
    },
    #[error("remote {operation} request failed: {source}")]
    Http {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("project not found: {project_id}")]
    ProjectNotFound { project_id: String },
    #[error("unsupported media file: {}", path.display())]
    UnsupportedMedia { path: PathBuf },
    #[error("could not read image dimensions of {}: {source}", path.display())]
    ImageDimensions {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{context}: {} ({source})", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json (de)serialization failed at {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("session storage location is unavailable")]
    NoSessionDirectory,
}

impl EngineError {
    /// Returns true for failures reported by (or while talking to) the remote.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Remote { .. } | Self::Http { .. } | Self::ProjectNotFound { .. }
        )
    }

    pub(crate) fn remote(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Remote {
            operation,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EngineError;

    #[test]
    fn remote_errors_are_classified_as_remote() {
        assert!(EngineError::remote("reorder", "boom").is_remote());
        assert!(
            EngineError::ProjectNotFound {
                project_id: "p".to_owned()
            }
            .is_remote()
        );
        assert!(!EngineError::EmptyTimeline.is_remote());
    }

    #[test]
    fn invalid_duration_message_names_the_value() {
        let message = EngineError::InvalidDuration { duration: -1.5 }.to_string();
        assert!(message.contains("-1.5"));
    }
}
