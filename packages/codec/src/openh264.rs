//! Software H.264 encoder backed by OpenH264.

use openh264::encoder::{
    BitRate, Encoder, EncoderConfig as OpenH264Config, FrameRate, FrameType, RateControlMode,
};
use openh264::formats::YUVBuffer;
use openh264::OpenH264API;

use crate::frame::rgba_to_i420;
use crate::{
    Codec, CodecError, EncodeParams, EncodedPacket, EncoderConfig, PixelFormat, VideoEncoder,
    VideoFrameData,
};

/// Cross-platform H.264 encoder producing Annex B access units.
pub struct OpenH264Encoder {
    encoder: Encoder,
    width: u32,
    height: u32,
    frame_index: u64,
}

// SAFETY: the wrapped encoder is only touched through &mut self.
unsafe impl Send for OpenH264Encoder {}

impl OpenH264Encoder {
    /// Create a new encoder. Dimensions must be even.
    pub fn new(config: &EncoderConfig) -> Result<Self, CodecError> {
        if config.codec != Codec::H264 {
            return Err(CodecError::unsupported_codec(config.codec));
        }
        if config.width == 0 || config.height == 0 || config.width % 2 != 0 || config.height % 2 != 0 {
            return Err(CodecError::InvalidDimensions {
                width: config.width,
                height: config.height,
            });
        }

        if !(config.frame_rate.is_finite() && config.frame_rate > 0.0) || config.bitrate == 0 {
            return Err(CodecError::generic(format!(
                "OpenH264 needs a positive rate, got {} bps @ {} fps",
                config.bitrate, config.frame_rate
            )));
        }

        // One access unit per input frame: the pacer already fixed the cadence.
        let settings = OpenH264Config::new()
            .bitrate(BitRate::from_bps(config.bitrate))
            .max_frame_rate(FrameRate::from_hz(config.frame_rate))
            .rate_control_mode(RateControlMode::Bitrate)
            .skip_frames(false);
        let api = OpenH264API::from_source();
        let encoder = Encoder::with_api_config(api, settings)
            .map_err(|e| CodecError::generic(format!("OpenH264 init failed: {}", e)))?;

        tracing::debug!(
            "OpenH264 encoder ready: {}x{} @ {} fps, {} bps",
            config.width,
            config.height,
            config.frame_rate,
            config.bitrate
        );

        Ok(Self {
            encoder,
            width: config.width,
            height: config.height,
            frame_index: 0,
        })
    }
}

impl VideoEncoder for OpenH264Encoder {
    fn encode_with_params(
        &mut self,
        frame: &dyn VideoFrameData,
        params: EncodeParams,
    ) -> Result<Vec<EncodedPacket>, CodecError> {
        let i420 = match frame.pixel_format() {
            PixelFormat::Rgba => rgba_to_i420(frame.data(), self.width, self.height)?,
            PixelFormat::I420 => frame.data().to_vec(),
            PixelFormat::Nv12 => return Err(CodecError::UnsupportedPixelFormat),
        };
        let yuv = YUVBuffer::from_vec(i420, self.width as usize, self.height as usize);

        if params.force_keyframe {
            self.encoder.force_intra_frame();
        }
        let bitstream = self
            .encoder
            .encode(&yuv)
            .map_err(|e| CodecError::generic(format!("OpenH264 encode failed: {}", e)))?;

        let data = bitstream.to_vec();
        if data.is_empty() {
            return Err(CodecError::generic(format!(
                "OpenH264 produced no output for frame {}",
                self.frame_index
            )));
        }
        let is_keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);
        let pts_us = params.timestamp_us.unwrap_or_else(|| frame.timestamp_us());
        let packet = EncodedPacket::new(data, pts_us, is_keyframe, self.frame_index);
        self.frame_index += 1;
        Ok(vec![packet])
    }

    fn flush(&mut self) -> Result<Vec<EncodedPacket>, CodecError> {
        // OpenH264 has no lookahead in its default configuration.
        Ok(Vec::new())
    }

    fn codec(&self) -> Codec {
        Codec::H264
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VideoFrame;

    fn config() -> EncoderConfig {
        EncoderConfig::new(64, 48)
            .codec(Codec::H264)
            .frame_rate(30.0)
            .bitrate(500_000)
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        assert!(OpenH264Encoder::new(&config().bitrate(0)).is_err());
        assert!(OpenH264Encoder::new(&config().frame_rate(0.0)).is_err());
    }

    #[test]
    fn test_every_frame_yields_a_packet() {
        let mut encoder = OpenH264Encoder::new(&config().bitrate(20_000)).unwrap();
        for i in 0..30u64 {
            let pixels: Vec<u8> = (0..64 * 48 * 4).map(|n| (n as u64 * 7 + i * 13) as u8).collect();
            let frame = VideoFrame::new(64, 48, PixelFormat::Rgba, pixels, i * 33_333);
            let packets = encoder.encode_with_params(&frame, EncodeParams::default()).unwrap();
            assert_eq!(packets.len(), 1, "frame {} was skipped", i);
        }
    }
}
