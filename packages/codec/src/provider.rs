//! Built-in codec backends.

use crate::gif::GifEncoder;
use crate::jpeg::JpegEncoder;
use crate::pcm::Pcm16Encoder;
use crate::{
    AudioCodec, AudioEncoder, AudioEncoderConfig, Codec, CodecError, CodecProvider,
    EncoderConfig, VideoEncoder,
};

/// Provider for the encoders compiled into this crate.
///
/// GIF, JPEG and PCM16 are always available. H.264 is available with the
/// `openh264` feature. HEVC, VP8, VP9, AAC and Opus need an external
/// provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCodecs;

impl CodecProvider for DefaultCodecs {
    fn video_encoder(&self, config: &EncoderConfig) -> Result<Box<dyn VideoEncoder>, CodecError> {
        match config.codec {
            Codec::Gif => Ok(Box::new(GifEncoder::new(config)?)),
            Codec::Jpeg => Ok(Box::new(JpegEncoder::new(config)?)),
            #[cfg(feature = "openh264")]
            Codec::H264 => Ok(Box::new(crate::openh264::OpenH264Encoder::new(config)?)),
            other => Err(CodecError::unsupported_codec(other)),
        }
    }

    fn audio_encoder(
        &self,
        config: &AudioEncoderConfig,
    ) -> Result<Box<dyn AudioEncoder>, CodecError> {
        match config.codec {
            AudioCodec::Pcm16 => Ok(Box::new(Pcm16Encoder::new(config)?)),
            other => Err(CodecError::unsupported_codec(other)),
        }
    }

    fn supports_video(&self, codec: Codec) -> bool {
        match codec {
            Codec::Gif | Codec::Jpeg => true,
            Codec::H264 => cfg!(feature = "openh264"),
            Codec::Hevc | Codec::Vp8 | Codec::Vp9 => false,
        }
    }

    fn supports_audio(&self, codec: AudioCodec) -> bool {
        codec == AudioCodec::Pcm16
    }
}
