//! GIF palette encoder.
//!
//! Quantizes each RGBA frame to its own 256-color local palette with
//! NeuQuant (through the `gif` crate). The packet payload is the index
//! buffer; the palette travels as [`SideData::Palette`]. LZW compression and
//! block framing are left to the container writer.

use crate::{
    Codec, CodecError, EncodeParams, EncodedPacket, EncoderConfig, PixelFormat, SideData,
    VideoEncoder, VideoFrameData,
};

/// Default NeuQuant sampling factor (1 = best quality, 30 = fastest).
pub const DEFAULT_SPEED: i32 = 10;

/// Per-frame palette quantizer for animated GIF.
pub struct GifEncoder {
    width: u16,
    height: u16,
    speed: i32,
    frame_count: u64,
}

impl GifEncoder {
    /// Create a new GIF encoder.
    pub fn new(config: &EncoderConfig) -> Result<Self, CodecError> {
        if config.codec != Codec::Gif {
            return Err(CodecError::invalid_param(format!(
                "GIF encoder cannot produce {}",
                config.codec
            )));
        }
        let (width, height) = match (u16::try_from(config.width), u16::try_from(config.height)) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => (w, h),
            _ => {
                return Err(CodecError::InvalidDimensions {
                    width: config.width,
                    height: config.height,
                })
            }
        };
        Ok(Self {
            width,
            height,
            speed: DEFAULT_SPEED,
            frame_count: 0,
        })
    }

    /// Set the NeuQuant sampling factor, clamped to 1..=30.
    #[must_use]
    pub fn with_speed(mut self, speed: i32) -> Self {
        self.speed = speed.clamp(1, 30);
        self
    }
}

impl VideoEncoder for GifEncoder {
    fn encode_with_params(
        &mut self,
        frame: &dyn VideoFrameData,
        params: EncodeParams,
    ) -> Result<Vec<EncodedPacket>, CodecError> {
        if frame.pixel_format() != PixelFormat::Rgba {
            return Err(CodecError::UnsupportedPixelFormat);
        }
        if frame.width() != u32::from(self.width) || frame.height() != u32::from(self.height) {
            return Err(CodecError::InvalidDimensions {
                width: frame.width(),
                height: frame.height(),
            });
        }
        let expected = self.width as usize * self.height as usize * 4;
        if frame.data().len() != expected {
            return Err(CodecError::ConversionError(format!(
                "RGBA data size mismatch: expected {}, got {}",
                expected,
                frame.data().len()
            )));
        }

        // Quantization rewrites fully transparent pixels, so work on a copy.
        let mut pixels = frame.data().to_vec();
        let quantized = ::gif::Frame::from_rgba_speed(self.width, self.height, &mut pixels, self.speed);
        let colors = quantized
            .palette
            .clone()
            .ok_or_else(|| CodecError::generic("quantizer produced no palette"))?;

        let pts_us = params.timestamp_us.unwrap_or_else(|| frame.timestamp_us());
        let packet = EncodedPacket::new(quantized.buffer.into_owned(), pts_us, true, self.frame_count)
            .with_side_data(SideData::Palette {
                colors,
                transparent: quantized.transparent,
            });
        self.frame_count += 1;
        Ok(vec![packet])
    }

    fn flush(&mut self) -> Result<Vec<EncodedPacket>, CodecError> {
        Ok(Vec::new())
    }

    fn codec(&self) -> Codec {
        Codec::Gif
    }

    fn dimensions(&self) -> (u32, u32) {
        (u32::from(self.width), u32::from(self.height))
    }
}
