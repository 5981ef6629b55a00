//! Error taxonomy for the animator client.
//!
//! `ValidationError` and `PreconditionError` are rejected before any workflow
//! starts and leave state untouched. The remaining `ClientError` variants
//! terminate an upload into `Failed`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("please select an image file ('{name}' has type '{declared_type}')")]
    NotAnImage { name: String, declared_type: String },
    #[error("please select an audio file such as MP3 or WAV ('{name}' has type '{declared_type}')")]
    NotAnAudioClip { name: String, declared_type: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("please select both an image and an audio file")]
    IncompleteSelection,
    #[error("please select an image before calibrating the mouth position")]
    NoImageSelected,
    #[error("image is not laid out yet (zero display or natural size)")]
    ImageNotLaidOut,
    #[error("an upload is already in progress")]
    UploadInFlight,
    #[error("no rendered video is available")]
    NoResult,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error("could not reach the render service: {0}")]
    Transport(String),
    #[error("invalid response from server: {0}")]
    MalformedResponse(String),
    #[error("{message}")]
    ServerReported { status: u16, message: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// True for failures that end an upload workflow in `Failed`.
    pub fn is_workflow_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::MalformedResponse(_) | Self::ServerReported { .. }
        )
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}
