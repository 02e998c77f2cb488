//! Error types for the cvdecode-core library

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors of a batch run.
///
/// Per-item transcription failures are not represented here; they are carried as
/// [`OutcomeError`] values inside the batch results.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Audio directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("Manifest file not found: {}", .0.display())]
    ManifestNotFound(PathBuf),

    #[error("Missing {} audio file(s): {}", .0.len(), join_names(.0))]
    MissingFiles(BTreeSet<String>),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to persist {}: {message}", .path.display())]
    Persistence { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for cvdecode operations
pub type Result<T> = std::result::Result<T, DecodeError>;

fn join_names(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

impl From<csv::Error> for DecodeError {
    fn from(err: csv::Error) -> Self {
        DecodeError::Manifest(err.to_string())
    }
}

impl PartialEq for DecodeError {
    fn eq(&self, other: &Self) -> bool {
        match self {
            DecodeError::DirectoryNotFound(path) => {
                matches!(other, DecodeError::DirectoryNotFound(o) if path == o)
            }
            DecodeError::ManifestNotFound(path) => {
                matches!(other, DecodeError::ManifestNotFound(o) if path == o)
            }
            DecodeError::MissingFiles(names) => {
                matches!(other, DecodeError::MissingFiles(o) if names == o)
            }
            DecodeError::Manifest(msg) => {
                matches!(other, DecodeError::Manifest(o) if msg == o)
            }
            DecodeError::Configuration(msg) => {
                matches!(other, DecodeError::Configuration(o) if msg == o)
            }
            DecodeError::Persistence { path, message } => {
                matches!(other, DecodeError::Persistence { path: p, message: m } if path == p && message == m)
            }
            DecodeError::Io(err) => {
                matches!(other, DecodeError::Io(e) if err.to_string() == e.to_string())
            }
        }
    }
}

/// Why a single transcription attempt failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeError {
    /// The inference service answered with a non-200 status
    Status(u16),
    /// The request did not complete within the configured timeout
    Timeout,
    /// Connection, DNS or protocol failure
    Transport(String),
    /// A 200 response whose body is not `{transcription, duration}`
    MalformedBody(String),
    /// The audio file could not be read from disk
    Read(String),
}

impl OutcomeError {
    /// Value written into the merged dataset for this failure.
    ///
    /// A malformed body yields no usable fields, so it maps to `None` and the
    /// merger falls back to the sentinel.
    pub fn marker(&self) -> Option<String> {
        match self {
            OutcomeError::Status(code) => Some(format!("Error: {}", code)),
            OutcomeError::Timeout => Some("Error: timeout".to_string()),
            OutcomeError::Transport(_) => Some("Error: transport".to_string()),
            OutcomeError::Read(_) => Some("Error: unreadable file".to_string()),
            OutcomeError::MalformedBody(_) => None,
        }
    }
}

impl fmt::Display for OutcomeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeError::Status(code) => write!(f, "HTTP status {}", code),
            OutcomeError::Timeout => write!(f, "request timed out"),
            OutcomeError::Transport(msg) => write!(f, "transport error: {}", msg),
            OutcomeError::MalformedBody(msg) => write!(f, "malformed response body: {}", msg),
            OutcomeError::Read(msg) => write!(f, "failed to read audio file: {}", msg),
        }
    }
}

impl std::error::Error for OutcomeError {}
