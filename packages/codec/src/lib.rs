//! Codec capability for framecorder.
//!
//! This crate turns raw frames and PCM into encoded packets. It defines the
//! encoder traits the recording engine drives and ships the backends that
//! need no platform SDK:
//!
//! - **GIF** palette quantization (NeuQuant via the `gif` crate)
//! - **JPEG** stills via the `image` crate
//! - **PCM16** audio
//! - **H.264** via OpenH264 (`openh264` feature)
//!
//! Other codecs (HEVC, VP8/VP9, AAC, Opus) are plugged in by implementing
//! [`CodecProvider`].
//!
//! # Quick Start
//!
//! ```ignore
//! use framecorder_codec::{Codec, CodecProvider, DefaultCodecs, EncoderConfig, VideoFrame};
//!
//! let config = EncoderConfig::new(320, 240).codec(Codec::Gif);
//! let mut encoder = DefaultCodecs.video_encoder(&config)?;
//!
//! let frame = VideoFrame::from_rgba(320, 240, rgba, timestamp_us);
//! for packet in encoder.encode(&frame)? {
//!     // packet.data holds palette indices, the palette is in packet.side_data
//! }
//! ```
//!
//! # Feature Flags
//!
//! - `openh264` - Build the OpenH264 software encoder from source

mod error;
mod frame;
mod traits;
mod types;

pub mod gif;
pub mod jpeg;
pub mod pcm;
mod provider;

#[cfg(feature = "openh264")]
pub mod openh264;

pub use error::CodecError;
pub use frame::{expected_frame_size, rgba_to_i420, VideoFrame};
pub use provider::DefaultCodecs;
pub use traits::{
    AudioEncoder, CodecProvider, EncodeParams, EncodedPacket, SideData, VideoEncoder,
    VideoFrameData,
};
pub use types::{AudioCodec, AudioEncoderConfig, Codec, EncoderConfig, PixelFormat};
