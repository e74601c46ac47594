//! Container writers.
//!
//! Each muxer owns the output file from creation to [`Muxer::finalize`].
//! Fields that are only known at the end of the stream (sizes, durations,
//! sample tables, cues) are written as placeholders or kept in memory and
//! patched or appended during finalize.

use std::path::PathBuf;

use thiserror::Error;

use crate::encoder::AccessUnit;
use crate::sample::MediaKind;

pub mod gif;
pub mod jpeg;
pub mod mp4;
pub mod nal;
pub mod wav;
pub mod webm;

pub use self::gif::GifMuxer;
pub use self::jpeg::JpegSequenceMuxer;
pub use self::mp4::{Mp4Audio, Mp4Muxer, Mp4Video};
pub use self::wav::WavMuxer;
pub use self::webm::{WebmAudio, WebmMuxer, WebmVideo};

/// Container and I/O failures.
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} track is empty")]
    EmptyTrack(&'static str),

    #[error("missing codec configuration: {0}")]
    MissingConfig(&'static str),

    #[error("unexpected {0:?} access unit for this container")]
    UnexpectedTrack(MediaKind),

    #[error("invalid access unit: {0}")]
    InvalidUnit(String),

    #[error("invalid stream parameter: {0}")]
    InvalidParameter(String),

    #[error("GIF encoding error: {0}")]
    Gif(#[from] ::gif::EncodingError),
}

/// Writes access units into one container file.
pub trait Muxer: Send {
    /// Append one access unit of the given track.
    fn write(&mut self, kind: MediaKind, unit: AccessUnit) -> Result<(), MuxError>;

    /// Patch deferred fields, close the file and return the output path.
    fn finalize(self: Box<Self>) -> Result<PathBuf, MuxError>;
}

/// Convert nanoseconds to a track timescale, rounding to nearest.
pub fn to_timescale(nanos: i64, timescale: u32) -> u64 {
    let nanos = u128::try_from(nanos.max(0)).unwrap_or(0);
    ((nanos * u128::from(timescale) + 500_000_000) / 1_000_000_000) as u64
}
