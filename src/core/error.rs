//! Error types for the defectset library.

use thiserror::Error;

/// Result type alias using defectset's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a dataset build.
///
/// Malformed descriptors and timestamps past the last release are not
/// errors: the stages skip them and report counts instead.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Version-control collaborator failure.
    #[error("Git error: {0}")]
    Git(String),

    /// Issue-tracker collaborator failure.
    #[error("Issue tracker error: {0}")]
    Tracker(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The tracker returned no release usable for the timeline.
    #[error("No dated releases found for project {project}")]
    EmptyTimeline { project: String },
}

impl Error {
    /// Create a new git error.
    pub fn git(message: impl Into<String>) -> Self {
        Self::Git(message.into())
    }

    /// Create a new issue tracker error.
    pub fn tracker(message: impl Into<String>) -> Self {
        Self::Tracker(message.into())
    }

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
