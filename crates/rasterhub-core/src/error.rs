//! Error types for rasterhub

use thiserror::Error;

use crate::job::ValidationError;
use crate::limits::SecurityError;

pub type Result<T> = std::result::Result<T, RenderError>;

/// Main error type shared by engines, the pool, sessions and the dispatcher.
///
/// Failures of a single job inside a batch are not represented here: they
/// travel as strings inside [`crate::JobResult`] so the rest of the batch
/// keeps going.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Failed to load font {path}: {reason}")]
    FontLoad { path: String, reason: String },

    #[error("Engine '{engine}' is unavailable: {reason}")]
    EngineUnavailable { engine: String, reason: String },

    #[error("No rendering engine available")]
    NoEngineAvailable,

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Invalid job specification: {0}")]
    Schema(#[from] ValidationError),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Missing results for {} job(s): {}", .ids.len(), .ids.join(", "))]
    MissingResults { ids: Vec<String> },

    #[error("Session is closed")]
    SessionClosed,

    #[error("Failed to decode image payload: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Shorthand for a [`RenderError::FontLoad`] with any displayable reason.
    pub fn font_load(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::FontLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for a [`RenderError::EngineUnavailable`].
    pub fn unavailable(engine: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::EngineUnavailable {
            engine: engine.into(),
            reason: reason.to_string(),
        }
    }

    /// True for failures that abort a whole batch rather than one job.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Schema(_)
                | Self::InvalidJson(_)
                | Self::Transport(_)
                | Self::MissingResults { .. }
                | Self::SessionClosed
                | Self::NoEngineAvailable
        )
    }
}

impl From<serde_json::Error> for RenderError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidJson(err.to_string())
    }
}

impl From<SecurityError> for RenderError {
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::PathNotFound(path) => Self::font_load(path, "file not found"),
            other => Self::InvalidInput(other.to_string()),
        }
    }
}
