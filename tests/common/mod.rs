//! Deterministic codec backends for integration tests.
//!
//! The fakes emit bitstreams with the framing the containers expect (Annex B
//! parameter sets and slices, VP8 frame tags, fixed-size audio packets) so
//! the muxers can be exercised without real encoders.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use framecorder::codec::{
    AudioCodec, AudioEncoder, AudioEncoderConfig, Codec, CodecError, CodecProvider,
    DefaultCodecs, EncodeParams, EncodedPacket, EncoderConfig, VideoEncoder, VideoFrameData,
};
use framecorder::mux::mp4::aac_audio_specific_config;
use framecorder::{RecorderFactory, RecordingSession};

pub fn annex_b(nals: &[&[u8]]) -> Vec<u8> {
    let mut data = Vec::new();
    for nal in nals {
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(nal);
    }
    data
}

/// H.264 or HEVC: parameter sets plus IDR on forced keyframes, a single
/// slice otherwise.
pub struct FakeNalEncoder {
    codec: Codec,
    width: u32,
    height: u32,
    index: u64,
}

impl VideoEncoder for FakeNalEncoder {
    fn encode_with_params(
        &mut self,
        frame: &dyn VideoFrameData,
        params: EncodeParams,
    ) -> Result<Vec<EncodedPacket>, CodecError> {
        let pts = params.timestamp_us.unwrap_or(frame.timestamp_us());
        let marker = frame.data().first().copied().unwrap_or(0);
        let data = match (self.codec, params.force_keyframe) {
            (Codec::Hevc, true) => annex_b(&[
                &[0x40, 0x01, 0x0c, 0x01],
                &[0x42, 0x01, 0x01, 0x01, 0x60],
                &[0x44, 0x01, 0xc1, 0x72],
                &[0x26, 0x01, 0xaf, marker],
            ]),
            (Codec::Hevc, false) => annex_b(&[&[0x02, 0x01, 0xd0, marker]]),
            (_, true) => annex_b(&[
                &[0x67, 0x42, 0x00, 0x1e, 0x01],
                &[0x68, 0xce, 0x01],
                &[0x65, 0x88, marker],
            ]),
            (_, false) => annex_b(&[&[0x41, 0x9a, marker]]),
        };
        self.index += 1;
        Ok(vec![EncodedPacket::new(
            data,
            pts,
            params.force_keyframe,
            self.index,
        )])
    }

    fn flush(&mut self) -> Result<Vec<EncodedPacket>, CodecError> {
        Ok(Vec::new())
    }

    fn codec(&self) -> Codec {
        self.codec
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// VP8-shaped frames: 3-byte frame tag, key frames add the start code and size.
pub struct FakeVp8Encoder {
    width: u32,
    height: u32,
    index: u64,
}

impl VideoEncoder for FakeVp8Encoder {
    fn encode_with_params(
        &mut self,
        frame: &dyn VideoFrameData,
        params: EncodeParams,
    ) -> Result<Vec<EncodedPacket>, CodecError> {
        let pts = params.timestamp_us.unwrap_or(frame.timestamp_us());
        let mut data = if params.force_keyframe {
            vec![0x10, 0x02, 0x00, 0x9d, 0x01, 0x2a]
        } else {
            vec![0x11, 0x02, 0x00]
        };
        if params.force_keyframe {
            data.extend_from_slice(&(self.width as u16).to_le_bytes());
            data.extend_from_slice(&(self.height as u16).to_le_bytes());
        }
        self.index += 1;
        Ok(vec![EncodedPacket::new(data, pts, params.force_keyframe, self.index)])
    }

    fn flush(&mut self) -> Result<Vec<EncodedPacket>, CodecError> {
        Ok(Vec::new())
    }

    fn codec(&self) -> Codec {
        Codec::Vp8
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Packs PCM into fixed-size packets (960 frames for Opus, 1024 for AAC).
pub struct FakeBlockEncoder {
    codec: AudioCodec,
    sample_rate: u32,
    channels: usize,
    block: usize,
    pending: usize,
    index: u64,
}

impl FakeBlockEncoder {
    fn packet(&mut self, frames: usize) -> EncodedPacket {
        self.index += 1;
        EncodedPacket::audio(vec![0xFC, frames as u8, 0x00], 0, self.index, frames as u32)
    }
}

impl AudioEncoder for FakeBlockEncoder {
    fn encode(
        &mut self,
        samples: &[f32],
        _timestamp_us: u64,
    ) -> Result<Vec<EncodedPacket>, CodecError> {
        self.pending += samples.len() / self.channels;
        let mut packets = Vec::new();
        while self.pending >= self.block {
            self.pending -= self.block;
            let block = self.block;
            packets.push(self.packet(block));
        }
        Ok(packets)
    }

    fn flush(&mut self) -> Result<Vec<EncodedPacket>, CodecError> {
        if self.pending == 0 {
            return Ok(Vec::new());
        }
        let frames = std::mem::take(&mut self.pending);
        Ok(vec![self.packet(frames)])
    }

    fn codec(&self) -> AudioCodec {
        self.codec
    }

    fn decoder_config(&self) -> Option<Vec<u8>> {
        match self.codec {
            AudioCodec::Aac => Some(aac_audio_specific_config(
                self.sample_rate,
                self.channels as u16,
            )),
            _ => None,
        }
    }
}

/// Provider that fills in every codec the built-in set lacks.
#[derive(Debug, Clone, Copy)]
pub struct FakeCodecs {
    pub aac: bool,
}

impl CodecProvider for FakeCodecs {
    fn video_encoder(&self, config: &EncoderConfig) -> Result<Box<dyn VideoEncoder>, CodecError> {
        match config.codec {
            Codec::H264 | Codec::Hevc => Ok(Box::new(FakeNalEncoder {
                codec: config.codec,
                width: config.width,
                height: config.height,
                index: 0,
            })),
            Codec::Vp8 | Codec::Vp9 => Ok(Box::new(FakeVp8Encoder {
                width: config.width,
                height: config.height,
                index: 0,
            })),
            Codec::Gif | Codec::Jpeg => DefaultCodecs.video_encoder(config),
        }
    }

    fn audio_encoder(
        &self,
        config: &AudioEncoderConfig,
    ) -> Result<Box<dyn AudioEncoder>, CodecError> {
        let block = match config.codec {
            AudioCodec::Pcm16 => return DefaultCodecs.audio_encoder(config),
            AudioCodec::Aac if !self.aac => return Err(CodecError::unsupported_codec("AAC")),
            AudioCodec::Aac => 1024,
            AudioCodec::Opus => 960,
        };
        Ok(Box::new(FakeBlockEncoder {
            codec: config.codec,
            sample_rate: config.sample_rate,
            channels: usize::from(config.channels),
            block,
            pending: 0,
            index: 0,
        }))
    }

    fn supports_video(&self, _codec: Codec) -> bool {
        true
    }

    fn supports_audio(&self, codec: AudioCodec) -> bool {
        codec != AudioCodec::Aac || self.aac
    }
}

pub fn fake_factory(aac: bool) -> RecorderFactory {
    RecorderFactory::builder()
        .codecs(Arc::new(FakeCodecs { aac }))
        .build()
}

/// Finish `session` and wait for the completion handler.
pub fn finish_and_wait(session: &RecordingSession) -> Option<PathBuf> {
    let (tx, rx) = mpsc::channel();
    session
        .finish_writing(move |path| {
            let _ = tx.send(path);
        })
        .unwrap();
    rx.recv_timeout(Duration::from_secs(30)).unwrap()
}

/// `n` timestamps spaced exactly `1 / fps` apart, in nanoseconds.
pub fn spaced(n: usize, fps: f64) -> Vec<i64> {
    (0..n).map(|i| (i as f64 * 1e9 / fps).round() as i64).collect()
}

pub fn u32_at(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

pub fn read(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap()
}
