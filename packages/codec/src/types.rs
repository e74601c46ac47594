//! Core types for media encoding.

use std::fmt;

/// Video codec type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// H.264/AVC codec.
    H264,
    /// H.265/HEVC codec.
    Hevc,
    /// VP8 codec (WEBM).
    Vp8,
    /// VP9 codec (WEBM).
    Vp9,
    /// Palettized GIF image data.
    Gif,
    /// Baseline JPEG stills.
    Jpeg,
}

impl Default for Codec {
    fn default() -> Self {
        Self::H264
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::H264 => "H.264",
            Self::Hevc => "HEVC",
            Self::Vp8 => "VP8",
            Self::Vp9 => "VP9",
            Self::Gif => "GIF",
            Self::Jpeg => "JPEG",
        };
        f.write_str(name)
    }
}

/// Audio codec type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCodec {
    /// Signed 16-bit little-endian PCM.
    Pcm16,
    /// AAC-LC.
    Aac,
    /// Opus.
    Opus,
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pcm16 => "PCM16",
            Self::Aac => "AAC",
            Self::Opus => "Opus",
        };
        f.write_str(name)
    }
}

/// Pixel format for video frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// RGBA with 8 bits per channel (32 bits per pixel).
    Rgba,
    /// NV12 (YUV 4:2:0, planar Y + interleaved UV).
    Nv12,
    /// I420/YUV420P (YUV 4:2:0, planar Y + U + V).
    I420,
}

impl PixelFormat {
    /// Returns the number of bytes per pixel for packed formats,
    /// or an approximation for planar formats.
    #[must_use]
    pub fn bytes_per_pixel(&self) -> f32 {
        match self {
            Self::Rgba => 4.0,
            Self::Nv12 | Self::I420 => 1.5, // YUV 4:2:0
        }
    }

    /// Returns true if this is a planar format (Y, U, V in separate planes).
    #[must_use]
    pub fn is_planar(&self) -> bool {
        matches!(self, Self::Nv12 | Self::I420)
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        Self::Rgba
    }
}

/// Configuration for creating a video encoder.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Video codec to use.
    pub codec: Codec,
    /// Nominal frame rate in frames per second. Zero for variable-delay codecs.
    pub frame_rate: f32,
    /// Target bitrate in bits per second. Zero lets the backend choose.
    pub bitrate: u32,
    /// GOP length in frames. 0 means only the first frame is a keyframe.
    pub gop_length: u32,
    /// Still-image quality (1-100) for JPEG.
    pub quality: u8,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            codec: Codec::H264,
            frame_rate: 30.0,
            bitrate: 10_000_000,
            gop_length: 60,
            quality: 80,
        }
    }
}

impl EncoderConfig {
    /// Create a new encoder configuration with the given dimensions.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Set the codec.
    #[must_use]
    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the frame rate.
    #[must_use]
    pub fn frame_rate(mut self, frame_rate: f32) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// Set the target bitrate in bits per second.
    #[must_use]
    pub fn bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Set the GOP length in frames.
    #[must_use]
    pub fn gop_length(mut self, gop_length: u32) -> Self {
        self.gop_length = gop_length;
        self
    }

    /// Set the still-image quality, clamped to 1..=100.
    #[must_use]
    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }
}

/// Configuration for creating an audio encoder.
#[derive(Debug, Clone)]
pub struct AudioEncoderConfig {
    /// Audio codec to use.
    pub codec: AudioCodec,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
    /// Target bitrate in bits per second (ignored by PCM).
    pub bitrate: u32,
}

impl AudioEncoderConfig {
    /// Create a new audio encoder configuration.
    #[must_use]
    pub fn new(codec: AudioCodec, sample_rate: u32, channels: u16) -> Self {
        Self {
            codec,
            sample_rate,
            channels,
            bitrate: 64_000,
        }
    }

    /// Set the target bitrate in bits per second.
    #[must_use]
    pub fn bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }
}
