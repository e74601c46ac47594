//! Core traits for media encoding.

use crate::{AudioCodec, AudioEncoderConfig, Codec, CodecError, EncoderConfig, PixelFormat};

/// Trait for types that can provide video frame data.
///
/// This trait allows different frame types to be used with the encoder
/// without requiring a specific concrete type.
pub trait VideoFrameData: Send {
    /// Returns the frame width in pixels.
    fn width(&self) -> u32;

    /// Returns the frame height in pixels.
    fn height(&self) -> u32;

    /// Returns the pixel format of the frame.
    fn pixel_format(&self) -> PixelFormat;

    /// Returns the raw frame data as a byte slice.
    fn data(&self) -> &[u8];

    /// Returns the frame timestamp in microseconds.
    fn timestamp_us(&self) -> u64;
}

/// Parameters for encoding a single frame.
#[derive(Debug, Clone, Default)]
pub struct EncodeParams {
    /// Force this frame to be a keyframe (IDR frame).
    pub force_keyframe: bool,
    /// Optional timestamp to use (overrides frame timestamp).
    pub timestamp_us: Option<u64>,
}

/// Out-of-band data a container needs alongside the packet payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideData {
    /// Local color table (packed RGB triples) for a palettized image,
    /// with the optional transparent index.
    Palette {
        colors: Vec<u8>,
        transparent: Option<u8>,
    },
    /// Decoder configuration record (AudioSpecificConfig, OpusHead, ...).
    DecoderConfig(Vec<u8>),
}

/// Result of encoding a frame or a block of audio.
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    /// Encoded bitstream data (e.g., H.264 Annex B NAL units).
    pub data: Vec<u8>,
    /// Presentation timestamp in microseconds.
    pub pts_us: u64,
    /// Whether this packet can be decoded on its own.
    pub is_keyframe: bool,
    /// Packet index (monotonically increasing per encoder).
    pub frame_index: u64,
    /// Number of PCM frames covered by an audio packet; 1 for video.
    pub frame_count: u32,
    /// Out-of-band data for the container, if any.
    pub side_data: Option<SideData>,
}

impl EncodedPacket {
    /// Create a new encoded video packet.
    #[must_use]
    pub fn new(data: Vec<u8>, pts_us: u64, is_keyframe: bool, frame_index: u64) -> Self {
        Self {
            data,
            pts_us,
            is_keyframe,
            frame_index,
            frame_count: 1,
            side_data: None,
        }
    }

    /// Create a new encoded audio packet covering `frame_count` PCM frames.
    #[must_use]
    pub fn audio(data: Vec<u8>, pts_us: u64, frame_index: u64, frame_count: u32) -> Self {
        Self {
            data,
            pts_us,
            is_keyframe: true,
            frame_index,
            frame_count,
            side_data: None,
        }
    }

    /// Attach side data to the packet.
    #[must_use]
    pub fn with_side_data(mut self, side_data: SideData) -> Self {
        self.side_data = Some(side_data);
        self
    }
}

/// Trait for video encoders.
///
/// Implementors of this trait turn raw frames into a compressed bitstream
/// format (e.g., H.264, HEVC, VP8) or into a palettized/still image payload.
///
/// # Example
///
/// ```ignore
/// use framecorder_codec::{VideoEncoder, VideoFrame, EncoderConfig, EncodeParams};
///
/// let mut encoder = provider.video_encoder(&EncoderConfig::new(640, 480))?;
/// let frame = VideoFrame::from_rgba(640, 480, rgba, timestamp_us);
/// for packet in encoder.encode_with_params(&frame, EncodeParams::default())? {
///     // packet.data is ready for the container
/// }
/// ```
pub trait VideoEncoder: Send {
    /// Encode a video frame.
    ///
    /// May return zero packets while the encoder is buffering, or several
    /// packets for a single input.
    fn encode(&mut self, frame: &dyn VideoFrameData) -> Result<Vec<EncodedPacket>, CodecError> {
        self.encode_with_params(frame, EncodeParams::default())
    }

    /// Encode a video frame with additional parameters.
    fn encode_with_params(
        &mut self,
        frame: &dyn VideoFrameData,
        params: EncodeParams,
    ) -> Result<Vec<EncodedPacket>, CodecError>;

    /// Flush the encoder and return any remaining packets.
    ///
    /// This should be called when no more frames will be submitted
    /// to ensure all encoded data is retrieved.
    fn flush(&mut self) -> Result<Vec<EncodedPacket>, CodecError>;

    /// Returns the codec being used.
    fn codec(&self) -> Codec;

    /// Returns the configured dimensions (width, height).
    fn dimensions(&self) -> (u32, u32);
}

/// Trait for audio encoders fed with interleaved `f32` PCM.
pub trait AudioEncoder: Send {
    /// Encode a block of interleaved samples.
    ///
    /// `samples.len()` is always a multiple of the configured channel count.
    fn encode(&mut self, samples: &[f32], timestamp_us: u64)
        -> Result<Vec<EncodedPacket>, CodecError>;

    /// Flush any partially filled block.
    fn flush(&mut self) -> Result<Vec<EncodedPacket>, CodecError>;

    /// Returns the codec being used.
    fn codec(&self) -> AudioCodec;

    /// Decoder configuration the container must carry, if the codec has one.
    fn decoder_config(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Source of encoder instances.
///
/// A provider returns [`CodecError::UnsupportedCodec`] for codecs it has no
/// backend for; callers treat that as "format not available on this
/// platform" rather than as an encode failure.
pub trait CodecProvider: Send + Sync {
    /// Create a video encoder for `config.codec`.
    fn video_encoder(&self, config: &EncoderConfig) -> Result<Box<dyn VideoEncoder>, CodecError>;

    /// Create an audio encoder for `config.codec`.
    fn audio_encoder(
        &self,
        config: &AudioEncoderConfig,
    ) -> Result<Box<dyn AudioEncoder>, CodecError>;

    /// Whether a video backend exists for `codec`.
    fn supports_video(&self, codec: Codec) -> bool;

    /// Whether an audio backend exists for `codec`.
    fn supports_audio(&self, codec: AudioCodec) -> bool;
}
