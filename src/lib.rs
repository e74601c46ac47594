//! framecorder - record live RGBA frames and float PCM into media files.
//!
//! A [`RecorderFactory`] creates a [`RecordingSession`] for one of the
//! supported [`Format`]s:
//!
//! - MP4 with H.264 or HEVC video, optional AAC or PCM audio
//! - animated GIF
//! - WEBM with VP8 video, optional Opus audio
//! - 16-bit PCM WAV
//! - numbered JPEG image sequences
//!
//! Producers call [`RecordingSession::commit_frame`] and
//! [`RecordingSession::commit_samples`] from their capture loop. Those calls
//! only copy and enqueue; pacing, encoding and container writes run on a
//! worker thread per session. [`RecordingSession::finish_writing`] (or the
//! async [`RecordingSession::finish`]) reports the output path once the
//! container is finalized.
//!
//! Codec backends come from a [`CodecProvider`]. The built-in
//! [`DefaultCodecs`] cover GIF, JPEG and PCM, plus H.264 with the `openh264`
//! feature.

pub mod clock;
pub mod config;
pub mod encoder;
pub mod factory;
pub mod ffi;
pub mod license;
pub mod mux;
pub mod pacing;
pub mod path;
mod queue;
pub mod sample;
pub mod session;
pub mod status;

pub use clock::{Clock, FixedIntervalClock, RealtimeClock};
pub use config::{Backpressure, Format, QueueConfig, RecordingConfig};
pub use encoder::{AccessUnit, KeyframeCadence};
pub use factory::{RecorderFactory, RecorderFactoryBuilder};
pub use license::{TokenStatus, TokenValidator};
pub use path::recording_path;
pub use queue::CompletionHandler;
pub use sample::{AudioSample, MediaKind, SampleBuffer, VideoSample};
pub use session::{RecordingSession, SessionState, SessionStats};
pub use status::{MediaStatus, PipelineError, RecorderError};

pub use framecorder_codec as codec;
pub use framecorder_codec::{CodecProvider, DefaultCodecs};
