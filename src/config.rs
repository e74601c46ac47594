//! Recording configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use framecorder_codec::Codec;

/// Output container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// MP4 with H.264 video and optional AAC/PCM audio.
    Mp4,
    /// MP4 with HEVC video and optional AAC/PCM audio.
    Hevc,
    /// Animated GIF.
    Gif,
    /// WEBM with VP8 video and optional Opus audio.
    Webm,
    /// 16-bit PCM WAV.
    Wav,
    /// Directory of numbered JPEG stills.
    Jpeg,
}

impl Format {
    /// Default file extension. JPEG sequences are directories and have none.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            Format::Mp4 | Format::Hevc => Some("mp4"),
            Format::Gif => Some("gif"),
            Format::Webm => Some("webm"),
            Format::Wav => Some("wav"),
            Format::Jpeg => None,
        }
    }

    /// Video codec driven for this format, if it has a video track.
    pub fn video_codec(self) -> Option<Codec> {
        match self {
            Format::Mp4 => Some(Codec::H264),
            Format::Hevc => Some(Codec::Hevc),
            Format::Gif => Some(Codec::Gif),
            Format::Webm => Some(Codec::Vp8),
            Format::Jpeg => Some(Codec::Jpeg),
            Format::Wav => None,
        }
    }

    /// Whether the format needs a constant output frame rate.
    pub fn is_fixed_rate(self) -> bool {
        matches!(self, Format::Mp4 | Format::Hevc | Format::Webm)
    }

    /// Whether the format can carry an audio track.
    pub fn supports_audio(self) -> bool {
        matches!(self, Format::Mp4 | Format::Hevc | Format::Webm | Format::Wav)
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Format::Mp4 => "MP4",
            Format::Hevc => "HEVC",
            Format::Gif => "GIF",
            Format::Webm => "WEBM",
            Format::Wav => "WAV",
            Format::Jpeg => "JPEG",
        };
        f.write_str(name)
    }
}

/// What `commit*` does when the ingestion queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backpressure {
    /// Discard the oldest queued item of the same kind.
    DropOldest,
    /// Wait up to `timeout` for room, then enqueue past capacity.
    Block { timeout: Duration },
}

/// Ingestion queue limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Watermark above which backpressure applies.
    pub capacity: usize,
    /// Policy for video frames.
    pub video: Backpressure,
    /// Policy for audio blocks.
    pub audio: Backpressure,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            video: Backpressure::DropOldest,
            audio: Backpressure::Block {
                timeout: Duration::from_millis(20),
            },
        }
    }
}

impl QueueConfig {
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn video(mut self, policy: Backpressure) -> Self {
        self.video = policy;
        self
    }

    #[must_use]
    pub fn audio(mut self, policy: Backpressure) -> Self {
        self.audio = policy;
        self
    }
}

/// Immutable parameters captured when a recorder is created.
///
/// `sample_rate == 0 && channel_count == 0` means no audio track.
///
/// # Example
///
/// ```
/// use framecorder::RecordingConfig;
///
/// let config = RecordingConfig::new("/tmp/out.mp4")
///     .size(1280, 720)
///     .frame_rate(30.0)
///     .audio(48_000, 2);
/// assert!(config.has_audio());
/// ```
#[derive(Debug, Clone)]
pub struct RecordingConfig {
    /// Output file (or directory, for JPEG sequences).
    pub path: PathBuf,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Output frame rate for fixed-rate formats.
    pub frame_rate: f32,
    /// Minimum per-frame delay in seconds for GIF.
    pub frame_delay: f32,
    /// Audio sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved audio channel count.
    pub channel_count: u32,
    /// Video bit rate in bits per second. Zero lets the codec choose.
    pub video_bit_rate: u32,
    /// Audio bit rate in bits per second.
    pub audio_bit_rate: u32,
    /// Seconds between forced keyframes. Zero means first frame only.
    pub keyframe_interval: f32,
    /// JPEG quality, 1..=100.
    pub quality: u8,
    /// Ingestion queue limits.
    pub queue: QueueConfig,
}

impl RecordingConfig {
    /// Create a configuration writing to `path` with default rates.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            width: 0,
            height: 0,
            frame_rate: 30.0,
            frame_delay: 0.1,
            sample_rate: 0,
            channel_count: 0,
            video_bit_rate: 10_000_000,
            audio_bit_rate: 64_000,
            keyframe_interval: 2.0,
            quality: 80,
            queue: QueueConfig::default(),
        }
    }

    #[must_use]
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn frame_rate(mut self, frame_rate: f32) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// Set the minimum GIF frame delay in seconds.
    #[must_use]
    pub fn frame_delay(mut self, seconds: f32) -> Self {
        self.frame_delay = seconds;
        self
    }

    /// Enable an audio track. `(0, 0)` disables it.
    #[must_use]
    pub fn audio(mut self, sample_rate: u32, channel_count: u32) -> Self {
        self.sample_rate = sample_rate;
        self.channel_count = channel_count;
        self
    }

    #[must_use]
    pub fn video_bit_rate(mut self, bits_per_second: u32) -> Self {
        self.video_bit_rate = bits_per_second;
        self
    }

    #[must_use]
    pub fn audio_bit_rate(mut self, bits_per_second: u32) -> Self {
        self.audio_bit_rate = bits_per_second;
        self
    }

    #[must_use]
    pub fn keyframe_interval(mut self, seconds: f32) -> Self {
        self.keyframe_interval = seconds;
        self
    }

    /// Set the JPEG quality, clamped to 1..=100.
    #[must_use]
    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    #[must_use]
    pub fn queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    /// Whether an audio track was requested.
    pub fn has_audio(&self) -> bool {
        self.sample_rate > 0 && self.channel_count > 0
    }

    /// Keyframe cadence in video frames. Zero means first frame only.
    pub fn keyframe_frames(&self) -> u32 {
        if self.keyframe_interval <= 0.0 || !self.keyframe_interval.is_finite() {
            return 0;
        }
        (self.keyframe_interval * self.frame_rate).round().max(1.0) as u32
    }

    /// Size in bytes of one RGBA frame.
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RecordingConfig::new("out.mp4");
        assert_eq!(config.video_bit_rate, 10_000_000);
        assert_eq!(config.audio_bit_rate, 64_000);
        assert_eq!(config.quality, 80);
        assert!(!config.has_audio());
        assert_eq!(config.queue.capacity, 64);
    }

    #[test]
    fn test_keyframe_frames() {
        let config = RecordingConfig::new("a").frame_rate(30.0).keyframe_interval(2.0);
        assert_eq!(config.keyframe_frames(), 60);

        let config = config.keyframe_interval(0.0);
        assert_eq!(config.keyframe_frames(), 0);

        // Never less than every frame
        let config = config.keyframe_interval(0.001);
        assert_eq!(config.keyframe_frames(), 1);
    }

    #[test]
    fn test_quality_clamped() {
        assert_eq!(RecordingConfig::new("a").quality(0).quality, 1);
        assert_eq!(RecordingConfig::new("a").quality(200).quality, 100);
    }

    #[test]
    fn test_format_traits() {
        assert_eq!(Format::Mp4.extension(), Some("mp4"));
        assert_eq!(Format::Jpeg.extension(), None);
        assert!(Format::Webm.is_fixed_rate());
        assert!(!Format::Gif.is_fixed_rate());
        assert!(!Format::Gif.supports_audio());
        assert_eq!(Format::Wav.video_codec(), None);
    }
}
