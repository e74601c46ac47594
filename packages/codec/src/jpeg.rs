//! JPEG still encoder for image-sequence recordings.

use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
use image::ExtendedColorType;

use crate::{
    Codec, CodecError, EncodeParams, EncodedPacket, EncoderConfig, PixelFormat, VideoEncoder,
    VideoFrameData,
};

/// Encodes every RGBA frame to a standalone JPEG image.
pub struct JpegEncoder {
    width: u32,
    height: u32,
    quality: u8,
    frame_count: u64,
}

impl JpegEncoder {
    /// Create a new JPEG encoder. Quality is clamped to 1..=100.
    pub fn new(config: &EncoderConfig) -> Result<Self, CodecError> {
        if config.codec != Codec::Jpeg {
            return Err(CodecError::invalid_param(format!(
                "JPEG encoder cannot produce {}",
                config.codec
            )));
        }
        if config.width == 0 || config.height == 0 || config.width > 65_535 || config.height > 65_535 {
            return Err(CodecError::InvalidDimensions {
                width: config.width,
                height: config.height,
            });
        }
        Ok(Self {
            width: config.width,
            height: config.height,
            quality: config.quality.clamp(1, 100),
            frame_count: 0,
        })
    }
}

impl VideoEncoder for JpegEncoder {
    fn encode_with_params(
        &mut self,
        frame: &dyn VideoFrameData,
        params: EncodeParams,
    ) -> Result<Vec<EncodedPacket>, CodecError> {
        if frame.pixel_format() != PixelFormat::Rgba {
            return Err(CodecError::UnsupportedPixelFormat);
        }
        let expected = self.width as usize * self.height as usize * 4;
        if frame.data().len() != expected {
            return Err(CodecError::ConversionError(format!(
                "RGBA data size mismatch: expected {}, got {}",
                expected,
                frame.data().len()
            )));
        }

        // JPEG has no alpha channel
        let rgb: Vec<u8> = frame
            .data()
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();

        let mut data = Vec::new();
        ImageJpegEncoder::new_with_quality(&mut data, self.quality)
            .encode(&rgb, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| CodecError::generic(format!("JPEG encode failed: {}", e)))?;

        let pts_us = params.timestamp_us.unwrap_or_else(|| frame.timestamp_us());
        let packet = EncodedPacket::new(data, pts_us, true, self.frame_count);
        self.frame_count += 1;
        Ok(vec![packet])
    }

    fn flush(&mut self) -> Result<Vec<EncodedPacket>, CodecError> {
        Ok(Vec::new())
    }

    fn codec(&self) -> Codec {
        Codec::Jpeg
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
