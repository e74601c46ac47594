//! Signed 16-bit PCM "encoder".

use crate::{AudioCodec, AudioEncoder, AudioEncoderConfig, CodecError, EncodedPacket};

/// Converts interleaved `f32` samples to little-endian `i16`.
///
/// Input is clamped to [-1.0, 1.0] before scaling.
pub struct Pcm16Encoder {
    channels: u16,
    packet_count: u64,
}

impl Pcm16Encoder {
    /// Create a new PCM16 encoder.
    pub fn new(config: &AudioEncoderConfig) -> Result<Self, CodecError> {
        if config.codec != AudioCodec::Pcm16 {
            return Err(CodecError::invalid_param(format!(
                "PCM encoder cannot produce {}",
                config.codec
            )));
        }
        if config.channels == 0 || config.sample_rate == 0 {
            return Err(CodecError::invalid_param("channels and sample rate must be > 0"));
        }
        Ok(Self {
            channels: config.channels,
            packet_count: 0,
        })
    }
}

/// Scale one float sample to `i16`.
#[must_use]
pub fn f32_to_i16(sample: f32) -> i16 {
    let clamped = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    (clamped * f32::from(i16::MAX)).round() as i16
}

impl AudioEncoder for Pcm16Encoder {
    fn encode(
        &mut self,
        samples: &[f32],
        timestamp_us: u64,
    ) -> Result<Vec<EncodedPacket>, CodecError> {
        let channels = usize::from(self.channels);
        if samples.len() % channels != 0 {
            return Err(CodecError::invalid_param(format!(
                "{} samples is not a multiple of {} channels",
                samples.len(),
                channels
            )));
        }
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let mut data = Vec::with_capacity(samples.len() * 2);
        for &s in samples {
            data.extend_from_slice(&f32_to_i16(s).to_le_bytes());
        }
        let frames = u32::try_from(samples.len() / channels)
            .map_err(|_| CodecError::invalid_param("audio block too large"))?;

        let packet = EncodedPacket::audio(data, timestamp_us, self.packet_count, frames);
        self.packet_count += 1;
        Ok(vec![packet])
    }

    fn flush(&mut self) -> Result<Vec<EncodedPacket>, CodecError> {
        Ok(Vec::new())
    }

    fn codec(&self) -> AudioCodec {
        AudioCodec::Pcm16
    }
}
