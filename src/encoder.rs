//! Encoder adapters.
//!
//! Wrap a codec backend from `framecorder-codec`, feed it paced samples and
//! turn its packets into [`AccessUnit`]s on the output timeline. Keyframe
//! cadence is enforced here, not in the backends.

use std::collections::VecDeque;

use framecorder_codec::{
    AudioEncoder, CodecError, EncodeParams, EncodedPacket, PixelFormat, SideData, VideoEncoder,
    VideoFrameData,
};

use crate::pacing::Paced;
use crate::sample::{AudioSample, VideoSample};

/// One compressed unit ready for the container.
#[derive(Debug, Clone)]
pub struct AccessUnit {
    pub data: Vec<u8>,
    /// Presentation time on the output timeline, nanoseconds.
    pub timestamp: i64,
    /// Nanoseconds until the next unit of the same track.
    pub duration: i64,
    pub keyframe: bool,
    /// PCM frames covered (audio); 1 for video.
    pub frame_count: u32,
    pub side_data: Option<SideData>,
}

/// Forces a keyframe on the first unit and every `interval` units after.
#[derive(Debug, Clone)]
pub struct KeyframeCadence {
    interval: u32,
    count: u64,
}

impl KeyframeCadence {
    /// `interval == 0` forces only the first unit.
    pub fn new(interval: u32) -> Self {
        Self { interval, count: 0 }
    }

    /// Whether the next unit must be a keyframe.
    pub fn next(&mut self) -> bool {
        let index = self.count;
        self.count += 1;
        index == 0 || (self.interval > 0 && index % u64::from(self.interval) == 0)
    }
}

/// Borrowed view of a paced frame for the codec traits.
struct PacedFrame<'a> {
    sample: &'a VideoSample,
    timestamp_us: u64,
}

impl VideoFrameData for PacedFrame<'_> {
    fn width(&self) -> u32 {
        self.sample.width
    }

    fn height(&self) -> u32 {
        self.sample.height
    }

    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Rgba
    }

    fn data(&self) -> &[u8] {
        &self.sample.pixels
    }

    fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }
}

#[derive(Debug, Clone, Copy)]
struct Timing {
    pts_us: u64,
    timestamp: i64,
    duration: i64,
}

/// Drives a [`VideoEncoder`] with paced frames.
pub struct VideoEncoderAdapter {
    encoder: Box<dyn VideoEncoder>,
    cadence: KeyframeCadence,
    pending: VecDeque<Timing>,
    nominal_duration: i64,
    units: u64,
}

impl VideoEncoderAdapter {
    pub fn new(encoder: Box<dyn VideoEncoder>, keyframe_interval: u32, nominal_duration: i64) -> Self {
        Self {
            encoder,
            cadence: KeyframeCadence::new(keyframe_interval),
            pending: VecDeque::new(),
            nominal_duration,
            units: 0,
        }
    }

    /// Total access units produced.
    pub fn units(&self) -> u64 {
        self.units
    }

    pub fn encode(&mut self, frame: &Paced<VideoSample>) -> Result<Vec<AccessUnit>, CodecError> {
        let timestamp_us = u64::try_from(frame.timestamp / 1_000).unwrap_or(0);
        self.pending.push_back(Timing {
            pts_us: timestamp_us,
            timestamp: frame.timestamp,
            duration: frame.duration,
        });

        let params = EncodeParams {
            force_keyframe: self.cadence.next(),
            timestamp_us: Some(timestamp_us),
        };
        let view = PacedFrame {
            sample: &frame.item,
            timestamp_us,
        };
        let packets = self.encoder.encode_with_params(&view, params)?;
        Ok(self.to_units(packets))
    }

    /// Drain buffered packets from the backend.
    pub fn flush(&mut self) -> Result<Vec<AccessUnit>, CodecError> {
        let packets = self.encoder.flush()?;
        Ok(self.to_units(packets))
    }

    fn to_units(&mut self, packets: Vec<EncodedPacket>) -> Vec<AccessUnit> {
        packets
            .into_iter()
            .map(|packet| {
                let timing = self.timing_for(packet.pts_us);
                self.units += 1;
                AccessUnit {
                    data: packet.data,
                    timestamp: timing.timestamp,
                    duration: timing.duration,
                    keyframe: packet.is_keyframe,
                    frame_count: 1,
                    side_data: packet.side_data,
                }
            })
            .collect()
    }

    /// Match a packet back to the frame it came from. Frames the backend
    /// skipped are discarded from the pending list.
    fn timing_for(&mut self, pts_us: u64) -> Timing {
        match self.pending.iter().position(|t| t.pts_us == pts_us) {
            Some(index) => {
                let mut timing = self.pending[index];
                self.pending.drain(..=index);
                if index > 0 {
                    tracing::debug!("Encoder skipped {} frame(s) before pts {}us", index, pts_us);
                }
                timing.duration = timing.duration.max(1);
                timing
            }
            None => Timing {
                pts_us,
                timestamp: i64::try_from(pts_us).unwrap_or(i64::MAX / 1_000) * 1_000,
                duration: self.nominal_duration,
            },
        }
    }
}

/// Drives an [`AudioEncoder`].
///
/// Audio units are placed by sample count: the first sample starts at zero
/// and every unit lasts `frame_count / sample_rate`.
pub struct AudioEncoderAdapter {
    encoder: Box<dyn AudioEncoder>,
    sample_rate: u32,
    frames: u64,
}

impl AudioEncoderAdapter {
    pub fn new(encoder: Box<dyn AudioEncoder>, sample_rate: u32) -> Self {
        Self {
            encoder,
            sample_rate,
            frames: 0,
        }
    }

    /// Decoder configuration the container must carry.
    pub fn decoder_config(&self) -> Option<Vec<u8>> {
        self.encoder.decoder_config()
    }

    /// Total PCM frames encoded.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn encode(&mut self, sample: &AudioSample) -> Result<Vec<AccessUnit>, CodecError> {
        let timestamp_us = u64::try_from(sample.timestamp / 1_000).unwrap_or(0);
        let packets = self.encoder.encode(&sample.samples, timestamp_us)?;
        Ok(self.to_units(packets))
    }

    pub fn flush(&mut self) -> Result<Vec<AccessUnit>, CodecError> {
        let packets = self.encoder.flush()?;
        Ok(self.to_units(packets))
    }

    fn frames_to_ns(&self, frames: u64) -> i64 {
        (u128::from(frames) * 1_000_000_000 / u128::from(self.sample_rate.max(1))) as i64
    }

    fn to_units(&mut self, packets: Vec<EncodedPacket>) -> Vec<AccessUnit> {
        packets
            .into_iter()
            .map(|packet| {
                let start = self.frames;
                self.frames += u64::from(packet.frame_count);
                let timestamp = self.frames_to_ns(start);
                AccessUnit {
                    data: packet.data,
                    timestamp,
                    duration: self.frames_to_ns(self.frames) - timestamp,
                    keyframe: true,
                    frame_count: packet.frame_count,
                    side_data: packet.side_data,
                }
            })
            .collect()
    }
}
