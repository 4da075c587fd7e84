//! Typed errors for the projection core. Application plumbing keeps using
//! `anyhow`; these enums exist where callers branch on the failure kind.

use std::io;
use std::string::FromUtf8Error;

use thiserror::Error;

/// Failures of the payload codec.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload is not valid JSON")]
    Json(#[from] serde_json::Error),
    #[error("malformed percent escape at byte {0}")]
    MalformedEscape(usize),
    #[error("payload is not valid UTF-8")]
    Utf8(#[from] FromUtf8Error),
}

/// Failures reported by a display surface host or handle.
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// The host declined to create a surface at all.
    #[error("surface creation refused: {0}")]
    Refused(String),
    /// The surface exists but did not accept a document.
    #[error("surface rejected the document: {0}")]
    Rejected(String),
    #[error("surface is closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Session-level failures surfaced to the user.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("a projection window is already open")]
    AlreadyOpen,
    #[error("no songs are selected")]
    EmptySelection,
    #[error("projection window could not be created")]
    SurfaceRefused(#[source] SurfaceError),
    #[error("failed to open projection")]
    InjectionFailed(#[source] SurfaceError),
    #[error("failed to encode projection payload")]
    Codec(#[from] CodecError),
}

impl ProjectionError {
    /// The single error string shown by the controller for this failure.
    pub fn user_message(&self) -> String {
        match self {
            ProjectionError::AlreadyOpen => {
                "The projection window is already open. Close it first.".to_string()
            }
            ProjectionError::EmptySelection => "Select at least one song to project.".to_string(),
            ProjectionError::SurfaceRefused(_) => {
                "The projection window could not be created. Check your popup-blocking \
                 (terminal launcher) settings."
                    .to_string()
            }
            ProjectionError::InjectionFailed(_) | ProjectionError::Codec(_) => {
                "Failed to open projection.".to_string()
            }
        }
    }
}
