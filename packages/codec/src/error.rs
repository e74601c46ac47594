//! Error types for codec operations.

use thiserror::Error;

/// Errors that can occur while encoding media.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Invalid parameter passed to an encoder.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Encoder used before it was initialized, or after it was flushed.
    #[error("encoder not initialized")]
    EncoderNotInitialized,

    /// Unsupported parameter.
    #[error("unsupported parameter: {0}")]
    UnsupportedParam(String),

    /// No backend is available for the requested codec.
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Unsupported pixel format.
    #[error("unsupported pixel format")]
    UnsupportedPixelFormat,

    /// Invalid frame dimensions.
    #[error("invalid frame dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Frame conversion error.
    #[error("frame conversion error: {0}")]
    ConversionError(String),

    /// Backend-specific encoder failure.
    #[error("encoder error: {0}")]
    Generic(String),
}

impl CodecError {
    /// Create an InvalidParam error with a message.
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Self::InvalidParam(msg.into())
    }

    /// Create an UnsupportedParam error with a message.
    pub fn unsupported_param(msg: impl Into<String>) -> Self {
        Self::UnsupportedParam(msg.into())
    }

    /// Create an UnsupportedCodec error naming the codec.
    pub fn unsupported_codec(codec: impl std::fmt::Display) -> Self {
        Self::UnsupportedCodec(codec.to_string())
    }

    /// Create a Generic error with a message.
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Whether this error means the backend is missing rather than broken.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedCodec(_) | Self::UnsupportedPixelFormat | Self::UnsupportedParam(_)
        )
    }
}
