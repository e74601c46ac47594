//! Recorder construction.
//!
//! [`RecorderFactory`] is the only place that knows every format: it checks
//! the configuration, picks the codecs and container for the format, opens
//! the destination and starts the session.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use framecorder_codec::{
    AudioCodec, AudioEncoder, AudioEncoderConfig, Codec, CodecProvider, DefaultCodecs,
    EncoderConfig,
};

use crate::config::{Format, RecordingConfig};
use crate::encoder::{AudioEncoderAdapter, VideoEncoderAdapter};
use crate::license::{TokenStatus, TokenValidator};
use crate::mux::{
    GifMuxer, JpegSequenceMuxer, Mp4Audio, Mp4Muxer, Mp4Video, MuxError, Muxer, WavMuxer,
    WebmAudio, WebmMuxer, WebmVideo,
};
use crate::pacing::{AudioPacer, FixedRatePacer, VariableDelayPacer};
use crate::session::{AudioTrack, Pipeline, RecordingSession, VideoPacing, VideoTrack};
use crate::status::{MediaStatus, RecorderError};

/// Largest accepted frame edge in pixels.
pub const MAX_DIMENSION: u32 = 16_384;

/// Largest accepted audio channel count.
pub const MAX_CHANNELS: u32 = 32;

/// Largest accepted audio sample rate in Hz.
pub const MAX_SAMPLE_RATE: u32 = 768_000;

/// Opus in WEBM is written with channel mapping family 0 (mono or stereo).
pub const MAX_WEBM_CHANNELS: u32 = 2;

/// Builder for a [`RecorderFactory`].
pub struct RecorderFactoryBuilder {
    codecs: Arc<dyn CodecProvider>,
    validator: Option<Arc<dyn TokenValidator>>,
}

impl RecorderFactoryBuilder {
    pub fn new() -> Self {
        Self {
            codecs: Arc::new(DefaultCodecs),
            validator: None,
        }
    }

    /// Use `codecs` instead of the built-in backends.
    pub fn codecs(mut self, codecs: Arc<dyn CodecProvider>) -> Self {
        self.codecs = codecs;
        self
    }

    /// Require a validated session token before creating recorders.
    pub fn token_validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn build(self) -> RecorderFactory {
        RecorderFactory {
            codecs: self.codecs,
            validator: self.validator,
            token: Mutex::new(None),
        }
    }
}

impl Default for RecorderFactoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates recording sessions.
///
/// # Example
///
/// ```no_run
/// use framecorder::{Format, RecorderFactory, RecordingConfig};
///
/// let factory = RecorderFactory::new();
/// let config = RecordingConfig::new("/tmp/clip.gif").size(320, 240).frame_delay(0.1);
/// let session = factory.create(Format::Gif, config)?;
/// session.commit_frame(&vec![0u8; 320 * 240 * 4], 0)?;
/// session.finish_writing(|path| println!("saved to {:?}", path))?;
/// # Ok::<(), framecorder::RecorderError>(())
/// ```
pub struct RecorderFactory {
    codecs: Arc<dyn CodecProvider>,
    validator: Option<Arc<dyn TokenValidator>>,
    token: Mutex<Option<TokenStatus>>,
}

impl Default for RecorderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl RecorderFactory {
    /// Factory with the built-in codecs and no licensing check.
    pub fn new() -> Self {
        RecorderFactoryBuilder::new().build()
    }

    pub fn builder() -> RecorderFactoryBuilder {
        RecorderFactoryBuilder::new()
    }

    /// Validate and store a session token.
    ///
    /// Without a validator every token is accepted.
    pub fn set_session_token(&self, token: &str) -> MediaStatus {
        let status = match &self.validator {
            Some(validator) => validator.validate(token),
            None => TokenStatus::Valid,
        };
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
        if status.is_valid() {
            tracing::info!("Session token accepted");
        } else {
            tracing::warn!("Session token rejected: {:?}", status);
        }
        status.media_status()
    }

    fn check_session(&self) -> Result<(), RecorderError> {
        if self.validator.is_none() {
            return Ok(());
        }
        let status = *self.token.lock().unwrap_or_else(PoisonError::into_inner);
        match status {
            Some(TokenStatus::Valid) => Ok(()),
            Some(status) => Err(RecorderError::Session(status)),
            None => Err(RecorderError::Session(TokenStatus::Invalid)),
        }
    }

    pub fn create_mp4(&self, config: RecordingConfig) -> Result<RecordingSession, RecorderError> {
        self.create(Format::Mp4, config)
    }

    pub fn create_hevc(&self, config: RecordingConfig) -> Result<RecordingSession, RecorderError> {
        self.create(Format::Hevc, config)
    }

    pub fn create_gif(&self, config: RecordingConfig) -> Result<RecordingSession, RecorderError> {
        self.create(Format::Gif, config)
    }

    pub fn create_webm(&self, config: RecordingConfig) -> Result<RecordingSession, RecorderError> {
        self.create(Format::Webm, config)
    }

    pub fn create_wav(&self, config: RecordingConfig) -> Result<RecordingSession, RecorderError> {
        self.create(Format::Wav, config)
    }

    pub fn create_jpeg(&self, config: RecordingConfig) -> Result<RecordingSession, RecorderError> {
        self.create(Format::Jpeg, config)
    }

    /// Validate `config`, open the destination and start recording.
    pub fn create(
        &self,
        format: Format,
        config: RecordingConfig,
    ) -> Result<RecordingSession, RecorderError> {
        self.check_session()?;
        validate(format, &config)?;

        let video = self.video_track(format, &config)?;
        let audio = self.audio_track(format, &config)?;
        let muxer = open_muxer(format, &config, audio.as_ref())?;

        let pipeline = Pipeline {
            video,
            audio: audio.map(|(track, _)| track),
            muxer,
        };
        RecordingSession::start(format, &config, pipeline)
    }

    fn video_track(
        &self,
        format: Format,
        config: &RecordingConfig,
    ) -> Result<Option<VideoTrack>, RecorderError> {
        let Some(codec) = format.video_codec() else {
            return Ok(None);
        };
        if !self.codecs.supports_video(codec) {
            return Err(RecorderError::UnsupportedFormat(format!(
                "no {} encoder available for {}",
                codec, format
            )));
        }

        let mut encoder_config = EncoderConfig::new(config.width, config.height)
            .codec(codec)
            .bitrate(config.video_bit_rate)
            .quality(config.quality);
        let (pacing, gop, nominal) = match format {
            Format::Gif => (
                VideoPacing::Variable(VariableDelayPacer::new(config.frame_delay)),
                0,
                (f64::from(config.frame_delay) * 1e9) as i64,
            ),
            Format::Jpeg => (VideoPacing::Passthrough, 1, 0),
            _ => {
                encoder_config = encoder_config.frame_rate(config.frame_rate);
                (
                    VideoPacing::Fixed(FixedRatePacer::new(config.frame_rate)),
                    config.keyframe_frames(),
                    (1e9 / f64::from(config.frame_rate)).round() as i64,
                )
            }
        };
        let encoder_config = encoder_config.gop_length(gop);
        let encoder = self.codecs.video_encoder(&encoder_config)?;

        Ok(Some(VideoTrack {
            pacing,
            encoder: VideoEncoderAdapter::new(encoder, gop, nominal),
        }))
    }

    fn audio_track(
        &self,
        format: Format,
        config: &RecordingConfig,
    ) -> Result<Option<(AudioTrack, AudioCodec)>, RecorderError> {
        if !config.has_audio() {
            return Ok(None);
        }
        let codec = match format {
            Format::Mp4 | Format::Hevc if self.codecs.supports_audio(AudioCodec::Aac) => {
                AudioCodec::Aac
            }
            Format::Mp4 | Format::Hevc | Format::Wav => AudioCodec::Pcm16,
            Format::Webm => AudioCodec::Opus,
            Format::Gif | Format::Jpeg => return Ok(None),
        };

        let encoder_config =
            AudioEncoderConfig::new(codec, config.sample_rate, config.channel_count as u16)
                .bitrate(config.audio_bit_rate);
        let encoder: Box<dyn AudioEncoder> = if self.codecs.supports_audio(codec) {
            self.codecs.audio_encoder(&encoder_config)?
        } else if codec == AudioCodec::Pcm16 {
            Box::new(framecorder_codec::pcm::Pcm16Encoder::new(&encoder_config)?)
        } else {
            return Err(RecorderError::UnsupportedFormat(format!(
                "no {} encoder available for {}",
                codec, format
            )));
        };

        let track = AudioTrack {
            pacer: AudioPacer::new(),
            encoder: AudioEncoderAdapter::new(encoder, config.sample_rate),
        };
        Ok(Some((track, codec)))
    }
}

fn invalid(msg: impl Into<String>) -> RecorderError {
    RecorderError::invalid_argument(msg)
}

/// Check every numeric parameter against what `format` needs.
pub fn validate(format: Format, config: &RecordingConfig) -> Result<(), RecorderError> {
    if config.path.as_os_str().is_empty() {
        return Err(invalid("output path is empty"));
    }

    if format.video_codec().is_some() {
        let (w, h) = (config.width, config.height);
        if w == 0 || h == 0 || w > MAX_DIMENSION || h > MAX_DIMENSION {
            return Err(invalid(format!(
                "frame size {}x{} outside 1..={}",
                w, h, MAX_DIMENSION
            )));
        }
        if matches!(format, Format::Mp4 | Format::Hevc) && (w % 2 != 0 || h % 2 != 0) {
            return Err(invalid(format!("{} needs even frame size, got {}x{}", format, w, h)));
        }
    }

    if format.is_fixed_rate() && !(config.frame_rate.is_finite() && config.frame_rate > 0.0) {
        return Err(invalid(format!("frame rate {} must be positive", config.frame_rate)));
    }
    if format == Format::Gif && !(config.frame_delay.is_finite() && config.frame_delay > 0.0) {
        return Err(invalid(format!("frame delay {} must be positive", config.frame_delay)));
    }
    if !(config.keyframe_interval.is_finite() && config.keyframe_interval >= 0.0) {
        return Err(invalid(format!(
            "keyframe interval {} must not be negative",
            config.keyframe_interval
        )));
    }

    if (config.sample_rate == 0) != (config.channel_count == 0) {
        return Err(invalid(format!(
            "sample rate {} and channel count {} must both be zero or both positive",
            config.sample_rate, config.channel_count
        )));
    }
    if config.channel_count > MAX_CHANNELS {
        return Err(invalid(format!(
            "{} channels exceeds {}",
            config.channel_count, MAX_CHANNELS
        )));
    }
    if config.sample_rate > MAX_SAMPLE_RATE {
        return Err(invalid(format!(
            "sample rate {} exceeds {}",
            config.sample_rate, MAX_SAMPLE_RATE
        )));
    }
    if format == Format::Webm && config.channel_count > MAX_WEBM_CHANNELS {
        return Err(invalid(format!(
            "WEBM audio supports at most {} channels, got {}",
            MAX_WEBM_CHANNELS, config.channel_count
        )));
    }
    if config.has_audio() && !format.supports_audio() {
        return Err(invalid(format!("{} recordings cannot carry audio", format)));
    }
    if format == Format::Wav && !config.has_audio() {
        return Err(invalid("WAV needs a sample rate and channel count"));
    }

    if config.queue.capacity == 0 {
        return Err(invalid("queue capacity must be positive"));
    }
    Ok(())
}

fn resource_error(path: &Path, err: MuxError) -> RecorderError {
    match err {
        MuxError::Io(source) => RecorderError::Resource {
            path: path.to_path_buf(),
            source,
        },
        other => RecorderError::invalid_argument(other.to_string()),
    }
}

fn open_muxer(
    format: Format,
    config: &RecordingConfig,
    audio: Option<&(AudioTrack, AudioCodec)>,
) -> Result<Box<dyn Muxer>, RecorderError> {
    let path = config.path.as_path();
    let channels = config.channel_count as u16;
    let decoder_config = audio.and_then(|(track, _)| track.encoder.decoder_config());

    let muxer: Box<dyn Muxer> = match format {
        Format::Mp4 | Format::Hevc => {
            let codec = if format == Format::Mp4 {
                Codec::H264
            } else {
                Codec::Hevc
            };
            let video = Mp4Video {
                codec,
                width: config.width,
                height: config.height,
            };
            let audio = audio.map(|(_, codec)| Mp4Audio {
                codec: *codec,
                sample_rate: config.sample_rate,
                channels,
                bit_rate: config.audio_bit_rate,
                decoder_config: decoder_config.clone(),
            });
            Box::new(Mp4Muxer::create(path, video, audio).map_err(|e| resource_error(path, e))?)
        }
        Format::Webm => {
            let video = WebmVideo {
                codec: Codec::Vp8,
                width: config.width,
                height: config.height,
            };
            let audio = audio.map(|_| WebmAudio {
                sample_rate: config.sample_rate,
                channels,
                codec_private: decoder_config.clone(),
            });
            Box::new(WebmMuxer::create(path, video, audio).map_err(|e| resource_error(path, e))?)
        }
        Format::Gif => Box::new(
            GifMuxer::create(path, config.width as u16, config.height as u16)
                .map_err(|e| resource_error(path, e))?,
        ),
        Format::Wav => Box::new(
            WavMuxer::create(path, config.sample_rate, channels)
                .map_err(|e| resource_error(path, e))?,
        ),
        Format::Jpeg => {
            Box::new(JpegSequenceMuxer::create(path).map_err(|e| resource_error(path, e))?)
        }
    };
    Ok(muxer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str) -> RecordingConfig {
        RecordingConfig::new(name).size(64, 48)
    }

    #[test]
    fn test_validate_geometry() {
        assert!(validate(Format::Gif, &config("a.gif")).is_ok());
        assert!(validate(Format::Gif, &config("a.gif").size(0, 48)).is_err());
        assert!(validate(Format::Mp4, &config("a.mp4").size(63, 48)).is_err());
        assert!(validate(Format::Jpeg, &config("seq").size(63, 47)).is_ok());
        assert!(validate(Format::Gif, &config("a.gif").size(MAX_DIMENSION + 1, 2)).is_err());
    }

    #[test]
    fn test_validate_rates() {
        assert!(validate(Format::Mp4, &config("a.mp4").frame_rate(0.0)).is_err());
        assert!(validate(Format::Mp4, &config("a.mp4").frame_rate(f32::NAN)).is_err());
        // GIF ignores the frame rate
        assert!(validate(Format::Gif, &config("a.gif").frame_rate(0.0)).is_ok());
        assert!(validate(Format::Gif, &config("a.gif").frame_delay(-1.0)).is_err());
        assert!(validate(Format::Gif, &config("a.gif").frame_delay(0.0)).is_err());
        assert!(validate(Format::Gif, &config("a.gif").frame_delay(0.02)).is_ok());
        assert!(validate(Format::Mp4, &config("a.mp4").keyframe_interval(-2.0)).is_err());
    }

    #[test]
    fn test_validate_audio() {
        assert!(validate(Format::Mp4, &config("a.mp4").audio(48_000, 0)).is_err());
        assert!(validate(Format::Mp4, &config("a.mp4").audio(0, 2)).is_err());
        assert!(validate(Format::Gif, &config("a.gif").audio(48_000, 2)).is_err());
        assert!(validate(Format::Wav, &RecordingConfig::new("a.wav")).is_err());
        assert!(validate(Format::Wav, &RecordingConfig::new("a.wav").audio(44_100, 1)).is_ok());
        assert!(validate(Format::Wav, &RecordingConfig::new("a.wav").audio(44_100, 64)).is_err());
        assert!(validate(Format::Wav, &RecordingConfig::new("a.wav").audio(MAX_SAMPLE_RATE, 2)).is_ok());
        assert!(validate(Format::Wav, &RecordingConfig::new("a.wav").audio(MAX_SAMPLE_RATE + 1, 2)).is_err());
        assert!(validate(Format::Webm, &config("a.webm").audio(48_000, 2)).is_ok());
        assert!(validate(Format::Webm, &config("a.webm").audio(48_000, 6)).is_err());
        assert!(validate(Format::Mp4, &config("a.mp4").audio(48_000, 6)).is_ok());
    }

    #[test]
    fn test_missing_backend_is_not_implemented() {
        let dir = tempfile::tempdir().unwrap();
        let factory = RecorderFactory::new();
        let err = factory
            .create(Format::Hevc, RecordingConfig::new(dir.path().join("a.mp4")).size(64, 48))
            .unwrap_err();
        assert_eq!(err.status(), MediaStatus::NotImplemented);
        // Nothing was created
        assert!(!dir.path().join("a.mp4").exists());
    }

    #[test]
    fn test_unwritable_path_is_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("a.gif");
        let err = RecorderFactory::new()
            .create(Format::Gif, RecordingConfig::new(path).size(8, 8))
            .unwrap_err();
        assert!(matches!(err, RecorderError::Resource { .. }));
        assert_eq!(err.status(), MediaStatus::InvalidArgument);
    }

    #[test]
    fn test_token_required_with_validator() {
        let dir = tempfile::tempdir().unwrap();
        let validator = |token: &str| {
            if token == "good" {
                TokenStatus::Valid
            } else {
                TokenStatus::HubMissing
            }
        };
        let factory = RecorderFactory::builder()
            .token_validator(Arc::new(validator))
            .build();
        let gif = || RecordingConfig::new(dir.path().join("a.gif")).size(8, 8);

        let err = factory.create(Format::Gif, gif()).unwrap_err();
        assert_eq!(err.status(), MediaStatus::InvalidSession);

        assert_eq!(factory.set_session_token("bad"), MediaStatus::MissingHub);
        let err = factory.create(Format::Gif, gif()).unwrap_err();
        assert_eq!(err.status(), MediaStatus::MissingHub);

        assert_eq!(factory.set_session_token("good"), MediaStatus::Ok);
        assert!(factory.create(Format::Gif, gif()).is_ok());
    }
}
