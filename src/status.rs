//! Status codes and error types.
//!
//! Synchronous failures (bad arguments, wrong session state, missing codec,
//! unopenable path, licensing) are reported as [`RecorderError`] from the call
//! that triggered them. Failures inside the background worker are
//! [`PipelineError`]s; they are logged and only ever surface as an absent path
//! in the completion handler.

use std::path::PathBuf;

use framecorder_codec::CodecError;
use thiserror::Error;

use crate::license::TokenStatus;
use crate::mux::MuxError;
use crate::pacing::PacingError;

/// Closed set of status codes reported across the C ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaStatus {
    Ok = 0,
    InvalidArgument = 1,
    InvalidOperation = 2,
    NotImplemented = 3,
    InvalidSession = 101,
    MissingHub = 102,
    InvalidHub = 103,
    InvalidPlan = 104,
    LimitedPlan = 105,
}

impl MediaStatus {
    /// Numeric code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Whether this status means success.
    pub fn is_ok(self) -> bool {
        self == MediaStatus::Ok
    }
}

/// Errors returned synchronously to the caller.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Malformed geometry, rate, buffer size or path.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not valid in the session's current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// No codec backend for the requested format on this platform.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Destination could not be opened or created.
    #[error("cannot open {}: {source}", path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Licensing collaborator rejected the session.
    #[error("session not authorized: {0:?}")]
    Session(TokenStatus),
}

impl RecorderError {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Status code for this error.
    pub fn status(&self) -> MediaStatus {
        match self {
            RecorderError::InvalidArgument(_) | RecorderError::Resource { .. } => {
                MediaStatus::InvalidArgument
            }
            RecorderError::InvalidOperation(_) => MediaStatus::InvalidOperation,
            RecorderError::UnsupportedFormat(_) => MediaStatus::NotImplemented,
            RecorderError::Session(status) => status.media_status(),
        }
    }
}

impl From<CodecError> for RecorderError {
    fn from(err: CodecError) -> Self {
        if err.is_unsupported() {
            RecorderError::UnsupportedFormat(err.to_string())
        } else {
            RecorderError::InvalidArgument(err.to_string())
        }
    }
}

/// Fatal failure inside the recording worker.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("encode failed: {0}")]
    Encode(#[from] CodecError),

    #[error("mux failed: {0}")]
    Mux(#[from] MuxError),

    #[error("pacing failed: {0}")]
    Pacing(#[from] PacingError),

    #[error("worker panicked: {0}")]
    Panicked(String),
}
