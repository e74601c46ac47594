//! Recording sessions: the producer-facing handle and its worker thread.
//!
//! ```text
//! producer ──commit_frame/commit_samples──► IngestQueue ──► worker thread
//!                                                             │
//!                                            pacing ─► encoder ─► muxer ─► file
//! ```
//!
//! The producer side only validates and copies; every encode and write
//! happens on the worker. `finish_writing` closes the queue, and the worker
//! finalizes the container once it reaches the finish marker, then calls the
//! completion handler exactly once.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::config::{Format, RecordingConfig};
use crate::encoder::{AccessUnit, AudioEncoderAdapter, VideoEncoderAdapter};
use crate::mux::Muxer;
use crate::pacing::{AudioPacer, FixedRatePacer, Paced, PacingError, VariableDelayPacer};
use crate::queue::{CompletionHandler, IngestQueue, QueueItem};
use crate::sample::{AudioSample, MediaKind, SampleBuffer, VideoSample};
use crate::status::{PipelineError, RecorderError};

/// Lifecycle of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    /// Accepting commits.
    Recording = 0,
    /// Draining the queue and finalizing.
    Finishing = 1,
    /// Container finalized, handler called with the path.
    Finished = 2,
    /// Something failed, handler called without a path.
    Failed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Recording,
            1 => SessionState::Finishing,
            2 => SessionState::Finished,
            _ => SessionState::Failed,
        }
    }

    /// Whether the session reached a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Finished | SessionState::Failed)
    }
}

/// Snapshot of a session's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Samples waiting for the worker.
    pub queued: usize,
    /// Samples accepted by `commit_*`.
    pub committed: u64,
    /// Video frames discarded by backpressure.
    pub dropped: u64,
}

// ============================================================================
// Worker-side pipeline
// ============================================================================

pub(crate) enum VideoPacing {
    Fixed(FixedRatePacer<VideoSample>),
    Variable(VariableDelayPacer<VideoSample>),
    /// Every frame stands alone (image sequences).
    Passthrough,
}

impl VideoPacing {
    fn push(&mut self, sample: VideoSample) -> Result<Vec<Paced<VideoSample>>, PacingError> {
        let timestamp = sample.timestamp;
        Ok(match self {
            VideoPacing::Fixed(pacer) => pacer.push(timestamp, sample)?,
            VideoPacing::Variable(pacer) => pacer.push(timestamp, sample)?.into_iter().collect(),
            VideoPacing::Passthrough => vec![Paced {
                item: sample,
                timestamp,
                duration: 0,
                duplicate: false,
            }],
        })
    }

    fn finish(&mut self) -> Option<Paced<VideoSample>> {
        match self {
            VideoPacing::Fixed(pacer) => pacer.finish(),
            VideoPacing::Variable(pacer) => pacer.finish(),
            VideoPacing::Passthrough => None,
        }
    }
}

pub(crate) struct VideoTrack {
    pub pacing: VideoPacing,
    pub encoder: VideoEncoderAdapter,
}

pub(crate) struct AudioTrack {
    pub pacer: AudioPacer,
    pub encoder: AudioEncoderAdapter,
}

/// Encoders and muxer for one session, owned by the worker.
pub(crate) struct Pipeline {
    pub video: Option<VideoTrack>,
    pub audio: Option<AudioTrack>,
    pub muxer: Box<dyn Muxer>,
}

impl Pipeline {
    fn process(&mut self, sample: SampleBuffer) -> Result<(), PipelineError> {
        match sample {
            SampleBuffer::Video(frame) => self.process_video(frame),
            SampleBuffer::Audio(block) => self.process_audio(block),
        }
    }

    fn process_video(&mut self, frame: VideoSample) -> Result<(), PipelineError> {
        let Some(track) = self.video.as_mut() else {
            return Ok(());
        };
        let mut units = Vec::new();
        for paced in track.pacing.push(frame)? {
            units.extend(track.encoder.encode(&paced)?);
        }
        self.write_all(MediaKind::Video, units)
    }

    fn process_audio(&mut self, block: AudioSample) -> Result<(), PipelineError> {
        let Some(track) = self.audio.as_mut() else {
            return Ok(());
        };
        track.pacer.check(block.timestamp)?;
        let units = track.encoder.encode(&block)?;
        self.write_all(MediaKind::Audio, units)
    }

    fn write_all(&mut self, kind: MediaKind, units: Vec<AccessUnit>) -> Result<(), PipelineError> {
        for unit in units {
            self.muxer.write(kind, unit)?;
        }
        Ok(())
    }

    /// Flush pacing and encoders, then finalize the container.
    fn finish(mut self) -> Result<PathBuf, PipelineError> {
        if let Some(track) = self.video.as_mut() {
            let mut units = Vec::new();
            if let Some(last) = track.pacing.finish() {
                units.extend(track.encoder.encode(&last)?);
            }
            units.extend(track.encoder.flush()?);
            tracing::debug!("Video track: {} access units", track.encoder.units());
            self.write_all(MediaKind::Video, units)?;
        }
        if let Some(track) = self.audio.as_mut() {
            let units = track.encoder.flush()?;
            tracing::debug!("Audio track: {} PCM frames", track.encoder.frames());
            self.write_all(MediaKind::Audio, units)?;
        }
        Ok(self.muxer.finalize()?)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_worker(label: String, queue: Arc<IngestQueue>, pipeline: Pipeline, state: Arc<AtomicU8>) {
    let mut pipeline = Some(pipeline);
    loop {
        match queue.pop() {
            QueueItem::Sample(sample) => {
                // After a failure, keep draining until the finish marker.
                let Some(active) = pipeline.as_mut() else {
                    continue;
                };
                let result = panic::catch_unwind(AssertUnwindSafe(|| active.process(sample)))
                    .unwrap_or_else(|payload| {
                        Err(PipelineError::Panicked(panic_message(payload.as_ref())))
                    });
                if let Err(e) = result {
                    tracing::error!("{}: recording failed: {}", label, e);
                    pipeline = None;
                }
            }
            QueueItem::Finish(handler) => {
                let path = pipeline.take().and_then(|active| {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| active.finish()))
                        .unwrap_or_else(|payload| {
                            Err(PipelineError::Panicked(panic_message(payload.as_ref())))
                        });
                    match result {
                        Ok(path) => Some(path),
                        Err(e) => {
                            tracing::error!("{}: finalize failed: {}", label, e);
                            None
                        }
                    }
                });

                let terminal = if path.is_some() {
                    SessionState::Finished
                } else {
                    SessionState::Failed
                };
                state.store(terminal as u8, Ordering::Release);
                match &path {
                    Some(p) => tracing::info!("{}: recording finished: {}", label, p.display()),
                    None => tracing::warn!("{}: recording failed, no output", label),
                }

                if panic::catch_unwind(AssertUnwindSafe(|| handler(path))).is_err() {
                    tracing::error!("{}: completion handler panicked", label);
                }
                return;
            }
        }
    }
}

// ============================================================================
// Producer-facing handle
// ============================================================================

/// An active recording.
///
/// Created by [`RecorderFactory`](crate::RecorderFactory). `commit_*` calls
/// copy the caller's buffer and return immediately; encoding and I/O run on
/// a dedicated worker thread.
pub struct RecordingSession {
    format: Format,
    width: u32,
    height: u32,
    channels: u32,
    has_video: bool,
    has_audio: bool,
    queue: Arc<IngestQueue>,
    state: Arc<AtomicU8>,
}

impl RecordingSession {
    /// Spawn the worker and return the producer handle.
    pub(crate) fn start(
        format: Format,
        config: &RecordingConfig,
        pipeline: Pipeline,
    ) -> Result<Self, RecorderError> {
        let queue = Arc::new(IngestQueue::new(config.queue.clone()));
        let state = Arc::new(AtomicU8::new(SessionState::Recording as u8));
        let has_video = pipeline.video.is_some();
        let has_audio = pipeline.audio.is_some();

        let label = format!("{} recorder", format);
        let worker_queue = Arc::clone(&queue);
        let worker_state = Arc::clone(&state);
        std::thread::Builder::new()
            .name(format!("framecorder-{}", format.to_string().to_lowercase()))
            .spawn(move || run_worker(label, worker_queue, pipeline, worker_state))
            .map_err(|e| {
                RecorderError::invalid_operation(format!("failed to spawn worker: {}", e))
            })?;

        tracing::info!(
            "{} recording started: {} ({}x{}, audio: {})",
            format,
            config.path.display(),
            config.width,
            config.height,
            if has_audio {
                format!("{} Hz x{}", config.sample_rate, config.channel_count)
            } else {
                "none".to_string()
            }
        );

        Ok(Self {
            format,
            width: if has_video { config.width } else { 0 },
            height: if has_video { config.height } else { 0 },
            channels: config.channel_count,
            has_video,
            has_audio,
            queue,
            state,
        })
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Configured frame size. `(0, 0)` for audio-only recorders.
    pub fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> SessionStats {
        let counters = self.queue.counters();
        SessionStats {
            queued: self.queue.depth(),
            committed: counters.committed.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
        }
    }

    fn ensure_recording(&self) -> Result<(), RecorderError> {
        match self.state() {
            SessionState::Recording => Ok(()),
            state => Err(RecorderError::invalid_operation(format!(
                "session is {:?}, not recording",
                state
            ))),
        }
    }

    /// Queue one RGBA8888 frame of exactly `width * height * 4` bytes.
    pub fn commit_frame(&self, pixels: &[u8], timestamp: i64) -> Result<(), RecorderError> {
        self.ensure_recording()?;
        if !self.has_video {
            return Err(RecorderError::invalid_operation(format!(
                "{} recorder has no video track",
                self.format
            )));
        }
        let expected = self.width as usize * self.height as usize * 4;
        if pixels.len() != expected {
            return Err(RecorderError::invalid_argument(format!(
                "frame is {} bytes, expected {} ({}x{} RGBA)",
                pixels.len(),
                expected,
                self.width,
                self.height
            )));
        }
        self.queue
            .push(SampleBuffer::video(self.width, self.height, pixels, timestamp))
    }

    /// Queue a block of interleaved `f32` PCM.
    ///
    /// `samples.len()` must be a multiple of the channel count.
    pub fn commit_samples(&self, samples: &[f32], timestamp: i64) -> Result<(), RecorderError> {
        self.ensure_recording()?;
        if !self.has_audio {
            return Err(RecorderError::invalid_operation(format!(
                "{} recorder has no audio track",
                self.format
            )));
        }
        if samples.len() % self.channels as usize != 0 {
            return Err(RecorderError::invalid_argument(format!(
                "{} samples is not a multiple of {} channels",
                samples.len(),
                self.channels
            )));
        }
        if samples.is_empty() {
            return Ok(());
        }
        self.queue
            .push(SampleBuffer::audio(self.channels as u16, samples, timestamp))
    }

    /// Stop accepting samples and finalize in the background.
    ///
    /// `handler` runs once on the worker thread with the output path, or
    /// `None` if anything failed. Only the first call succeeds.
    pub fn finish_writing<F>(&self, handler: F) -> Result<(), RecorderError>
    where
        F: FnOnce(Option<PathBuf>) + Send + 'static,
    {
        self.begin_finish(Box::new(handler))
    }

    /// Async form of [`finish_writing`](Self::finish_writing).
    pub fn finish(
        &self,
    ) -> Result<impl Future<Output = Option<PathBuf>> + Send + 'static, RecorderError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.finish_writing(move |path| {
            let _ = tx.send(path);
        })?;
        Ok(async move { rx.await.ok().flatten() })
    }

    fn begin_finish(&self, handler: CompletionHandler) -> Result<(), RecorderError> {
        self.state
            .compare_exchange(
                SessionState::Recording as u8,
                SessionState::Finishing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| RecorderError::invalid_operation("finish already requested"))?;
        self.queue
            .close(handler)
            .map_err(|_| RecorderError::invalid_operation("finish already requested"))?;
        tracing::debug!(
            "{} recorder finishing with {} queued samples",
            self.format,
            self.queue.depth()
        );
        Ok(())
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if self.state() == SessionState::Recording {
            tracing::warn!("{} recorder dropped while recording, finishing", self.format);
            let _ = self.begin_finish(Box::new(|_| {}));
        }
    }
}

impl std::fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSession")
            .field("format", &self.format)
            .field("frame_size", &self.frame_size())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecorderFactory;
    use std::sync::mpsc;
    use std::time::Duration;

    fn gif_session(dir: &std::path::Path) -> RecordingSession {
        let config = RecordingConfig::new(dir.join("t.gif")).size(4, 4).frame_delay(0.1);
        RecorderFactory::new().create(Format::Gif, config).unwrap()
    }

    #[test]
    fn test_state_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let session = gif_session(dir.path());
        assert_eq!(session.state(), SessionState::Recording);
        session.commit_frame(&[0u8; 64], 0).unwrap();

        let (tx, rx) = mpsc::channel();
        session.finish_writing(move |path| tx.send(path).unwrap()).unwrap();
        assert!(matches!(
            session.state(),
            SessionState::Finishing | SessionState::Finished
        ));
        let path = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(path.is_some());
        assert_eq!(session.state(), SessionState::Finished);
    }

    #[test]
    fn test_empty_recording_fails() {
        let dir = tempfile::tempdir().unwrap();
        let session = gif_session(dir.path());
        let (tx, rx) = mpsc::channel();
        session.finish_writing(move |path| tx.send(path).unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(10)).unwrap(), None);
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn test_gif_rejects_audio() {
        let dir = tempfile::tempdir().unwrap();
        let session = gif_session(dir.path());
        let err = session.commit_samples(&[0.0; 2], 0).unwrap_err();
        assert!(matches!(err, RecorderError::InvalidOperation(_)));
    }

    #[test]
    fn test_stats_count_commits() {
        let dir = tempfile::tempdir().unwrap();
        let session = gif_session(dir.path());
        for i in 0..3 {
            session.commit_frame(&[0u8; 64], i * 100_000_000).unwrap();
        }
        assert_eq!(session.stats().committed, 3);
        assert_eq!(session.stats().dropped, 0);
        assert_eq!(session.frame_size(), (4, 4));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
