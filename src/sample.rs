//! Units of raw media handed from the producer to the worker.

use std::sync::Arc;

use bytes::Bytes;

/// Kind of media a sample or track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

/// One RGBA8888 frame.
#[derive(Debug, Clone)]
pub struct VideoSample {
    pub width: u32,
    pub height: u32,
    /// Packed RGBA pixels, `width * height * 4` bytes.
    pub pixels: Bytes,
    /// Producer timestamp in nanoseconds.
    pub timestamp: i64,
}

/// One block of interleaved `f32` PCM.
#[derive(Debug, Clone)]
pub struct AudioSample {
    pub channels: u16,
    pub samples: Arc<[f32]>,
    /// Producer timestamp in nanoseconds.
    pub timestamp: i64,
}

impl AudioSample {
    /// Number of PCM frames (samples per channel).
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / usize::from(self.channels)
        }
    }
}

/// A committed unit of media. Immutable once built.
///
/// Cloning is cheap: pixel and sample storage is reference counted, which
/// lets fixed-rate pacing re-emit a held frame without copying it.
#[derive(Debug, Clone)]
pub enum SampleBuffer {
    Video(VideoSample),
    Audio(AudioSample),
}

impl SampleBuffer {
    /// Copy a caller-owned RGBA buffer into a new video sample.
    pub fn video(width: u32, height: u32, pixels: &[u8], timestamp: i64) -> Self {
        SampleBuffer::Video(VideoSample {
            width,
            height,
            pixels: Bytes::copy_from_slice(pixels),
            timestamp,
        })
    }

    /// Copy caller-owned interleaved PCM into a new audio sample.
    pub fn audio(channels: u16, samples: &[f32], timestamp: i64) -> Self {
        SampleBuffer::Audio(AudioSample {
            channels,
            samples: Arc::from(samples),
            timestamp,
        })
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            SampleBuffer::Video(_) => MediaKind::Video,
            SampleBuffer::Audio(_) => MediaKind::Audio,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            SampleBuffer::Video(v) => v.timestamp,
            SampleBuffer::Audio(a) => a.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_sample_copies_pixels() {
        let mut pixels = vec![1u8; 16];
        let sample = SampleBuffer::video(2, 2, &pixels, 5);
        pixels[0] = 9;
        match sample {
            SampleBuffer::Video(v) => {
                assert_eq!(v.pixels[0], 1);
                assert_eq!(v.timestamp, 5);
            }
            SampleBuffer::Audio(_) => panic!("expected video"),
        }
    }

    #[test]
    fn test_audio_frame_count() {
        let sample = SampleBuffer::audio(2, &[0.0; 10], 0);
        assert_eq!(sample.kind(), MediaKind::Audio);
        match sample {
            SampleBuffer::Audio(a) => assert_eq!(a.frame_count(), 5),
            SampleBuffer::Video(_) => panic!("expected audio"),
        }
    }

    #[test]
    fn test_clone_shares_storage() {
        let sample = SampleBuffer::video(1, 1, &[1, 2, 3, 4], 0);
        let copy = sample.clone();
        match (sample, copy) {
            (SampleBuffer::Video(a), SampleBuffer::Video(b)) => {
                assert_eq!(a.pixels.as_ptr(), b.pixels.as_ptr());
            }
            _ => panic!("expected video"),
        }
    }
}
