//! C ABI over the recorder API.
//!
//! Every function returns a [`MediaStatus`] code. Recorders are opaque
//! `FCMediaRecorder*` handles owned by the caller and freed with
//! `FCMediaRecorderRelease`. Finishing does not free the handle, so calls
//! made after it (including a second finish) report `InvalidOperation`.
#![allow(clippy::missing_safety_doc, clippy::too_many_arguments, non_snake_case)]

use std::ffi::{c_char, c_void, CStr, CString};
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::config::{Format, RecordingConfig};
use crate::factory::RecorderFactory;
use crate::session::RecordingSession;
use crate::status::MediaStatus;

/// Completion callback: `(context, path)`, `path` is NULL on failure and
/// only valid for the duration of the call.
pub type FCRecordingHandler = Option<extern "C" fn(context: *mut c_void, path: *const c_char)>;

/// Opaque recorder handle.
pub struct FCMediaRecorder {
    session: RecordingSession,
}

static FACTORY: OnceLock<RecorderFactory> = OnceLock::new();

fn factory() -> &'static RecorderFactory {
    FACTORY.get_or_init(RecorderFactory::new)
}

/// Install the factory used by every `FCCreate*` call.
///
/// Returns `false` if a factory was already in use.
pub fn install_factory(factory: RecorderFactory) -> bool {
    FACTORY.set(factory).is_ok()
}

unsafe fn c_str_to_path(ptr: *const c_char) -> Option<PathBuf> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(PathBuf::from)
}

fn non_negative(values: &[i32]) -> Option<Vec<u32>> {
    values.iter().map(|&v| u32::try_from(v).ok()).collect()
}

unsafe fn create(
    format: Format,
    config: Option<RecordingConfig>,
    recorder: *mut *mut FCMediaRecorder,
) -> MediaStatus {
    if recorder.is_null() {
        return MediaStatus::InvalidArgument;
    }
    *recorder = std::ptr::null_mut();
    let Some(config) = config else {
        return MediaStatus::InvalidArgument;
    };
    match factory().create(format, config) {
        Ok(session) => {
            *recorder = Box::into_raw(Box::new(FCMediaRecorder { session }));
            MediaStatus::Ok
        }
        Err(e) => {
            tracing::warn!("Failed to create {} recorder: {}", format, e);
            e.status()
        }
    }
}

unsafe fn video_config(
    path: *const c_char,
    width: i32,
    height: i32,
    frame_rate: f32,
    sample_rate: i32,
    channel_count: i32,
    video_bit_rate: i32,
    audio_bit_rate: i32,
    keyframe_interval: f32,
) -> Option<RecordingConfig> {
    let path = c_str_to_path(path)?;
    let v = non_negative(&[
        width,
        height,
        sample_rate,
        channel_count,
        video_bit_rate,
        audio_bit_rate,
    ])?;
    Some(
        RecordingConfig::new(path)
            .size(v[0], v[1])
            .frame_rate(frame_rate)
            .audio(v[2], v[3])
            .video_bit_rate(v[4])
            .audio_bit_rate(v[5])
            .keyframe_interval(keyframe_interval),
    )
}

// ============================================================================
// C ABI - Licensing
// ============================================================================

/// Validate and store the session token for subsequent `FCCreate*` calls.
#[no_mangle]
pub unsafe extern "C" fn FCSetSessionToken(token: *const c_char) -> MediaStatus {
    if token.is_null() {
        return MediaStatus::InvalidArgument;
    }
    match CStr::from_ptr(token).to_str() {
        Ok(token) => factory().set_session_token(token),
        Err(_) => MediaStatus::InvalidArgument,
    }
}

// ============================================================================
// C ABI - Creation
// ============================================================================

/// Create an MP4 (H.264) recorder. `sample_rate == channel_count == 0`
/// disables audio.
#[no_mangle]
pub unsafe extern "C" fn FCCreateMP4Recorder(
    path: *const c_char,
    width: i32,
    height: i32,
    frame_rate: f32,
    sample_rate: i32,
    channel_count: i32,
    video_bit_rate: i32,
    audio_bit_rate: i32,
    keyframe_interval: f32,
    recorder: *mut *mut FCMediaRecorder,
) -> MediaStatus {
    let config = video_config(
        path,
        width,
        height,
        frame_rate,
        sample_rate,
        channel_count,
        video_bit_rate,
        audio_bit_rate,
        keyframe_interval,
    );
    create(Format::Mp4, config, recorder)
}

/// Create an MP4 (HEVC) recorder.
#[no_mangle]
pub unsafe extern "C" fn FCCreateHEVCRecorder(
    path: *const c_char,
    width: i32,
    height: i32,
    frame_rate: f32,
    sample_rate: i32,
    channel_count: i32,
    video_bit_rate: i32,
    audio_bit_rate: i32,
    keyframe_interval: f32,
    recorder: *mut *mut FCMediaRecorder,
) -> MediaStatus {
    let config = video_config(
        path,
        width,
        height,
        frame_rate,
        sample_rate,
        channel_count,
        video_bit_rate,
        audio_bit_rate,
        keyframe_interval,
    );
    create(Format::Hevc, config, recorder)
}

/// Create a WEBM (VP8 + Opus) recorder.
#[no_mangle]
pub unsafe extern "C" fn FCCreateWEBMRecorder(
    path: *const c_char,
    width: i32,
    height: i32,
    frame_rate: f32,
    sample_rate: i32,
    channel_count: i32,
    video_bit_rate: i32,
    audio_bit_rate: i32,
    keyframe_interval: f32,
    recorder: *mut *mut FCMediaRecorder,
) -> MediaStatus {
    let config = video_config(
        path,
        width,
        height,
        frame_rate,
        sample_rate,
        channel_count,
        video_bit_rate,
        audio_bit_rate,
        keyframe_interval,
    );
    create(Format::Webm, config, recorder)
}

/// Create an animated GIF recorder. `delay` is the minimum frame delay in
/// seconds.
#[no_mangle]
pub unsafe extern "C" fn FCCreateGIFRecorder(
    path: *const c_char,
    width: i32,
    height: i32,
    delay: f32,
    recorder: *mut *mut FCMediaRecorder,
) -> MediaStatus {
    let config = c_str_to_path(path).and_then(|path| {
        let v = non_negative(&[width, height])?;
        Some(RecordingConfig::new(path).size(v[0], v[1]).frame_delay(delay))
    });
    create(Format::Gif, config, recorder)
}

/// Create a WAV recorder.
#[no_mangle]
pub unsafe extern "C" fn FCCreateWAVRecorder(
    path: *const c_char,
    sample_rate: i32,
    channel_count: i32,
    recorder: *mut *mut FCMediaRecorder,
) -> MediaStatus {
    let config = c_str_to_path(path).and_then(|path| {
        let v = non_negative(&[sample_rate, channel_count])?;
        Some(RecordingConfig::new(path).audio(v[0], v[1]))
    });
    create(Format::Wav, config, recorder)
}

/// Create a JPEG image-sequence recorder writing into directory `path`.
#[no_mangle]
pub unsafe extern "C" fn FCCreateJPEGRecorder(
    path: *const c_char,
    width: i32,
    height: i32,
    quality: i32,
    recorder: *mut *mut FCMediaRecorder,
) -> MediaStatus {
    let config = c_str_to_path(path).and_then(|path| {
        let v = non_negative(&[width, height])?;
        let quality = u8::try_from(quality.clamp(1, 100)).ok()?;
        Some(RecordingConfig::new(path).size(v[0], v[1]).quality(quality))
    });
    create(Format::Jpeg, config, recorder)
}

// ============================================================================
// C ABI - Recording
// ============================================================================

/// Get the configured frame size.
#[no_mangle]
pub unsafe extern "C" fn FCMediaRecorderGetFrameSize(
    recorder: *const FCMediaRecorder,
    width: *mut i32,
    height: *mut i32,
) -> MediaStatus {
    let Some(recorder) = recorder.as_ref() else {
        return MediaStatus::InvalidArgument;
    };
    if width.is_null() || height.is_null() {
        return MediaStatus::InvalidArgument;
    }
    let (w, h) = recorder.session.frame_size();
    *width = w as i32;
    *height = h as i32;
    MediaStatus::Ok
}

/// Commit an RGBA8888 frame of `size` bytes.
#[no_mangle]
pub unsafe extern "C" fn FCMediaRecorderCommitFrame(
    recorder: *const FCMediaRecorder,
    pixels: *const u8,
    size: usize,
    timestamp: i64,
) -> MediaStatus {
    let Some(recorder) = recorder.as_ref() else {
        return MediaStatus::InvalidArgument;
    };
    if pixels.is_null() {
        return MediaStatus::InvalidArgument;
    }
    let pixels = std::slice::from_raw_parts(pixels, size);
    match recorder.session.commit_frame(pixels, timestamp) {
        Ok(()) => MediaStatus::Ok,
        Err(e) => e.status(),
    }
}

/// Commit `sample_count` interleaved float samples.
#[no_mangle]
pub unsafe extern "C" fn FCMediaRecorderCommitSamples(
    recorder: *const FCMediaRecorder,
    samples: *const f32,
    sample_count: i32,
    timestamp: i64,
) -> MediaStatus {
    let Some(recorder) = recorder.as_ref() else {
        return MediaStatus::InvalidArgument;
    };
    let Ok(count) = usize::try_from(sample_count) else {
        return MediaStatus::InvalidArgument;
    };
    if samples.is_null() {
        return MediaStatus::InvalidArgument;
    }
    let samples = std::slice::from_raw_parts(samples, count);
    match recorder.session.commit_samples(samples, timestamp) {
        Ok(()) => MediaStatus::Ok,
        Err(e) => e.status(),
    }
}

struct SendContext(*mut c_void);

// The context is opaque to us and handed back to the caller's callback.
unsafe impl Send for SendContext {}

/// Finish writing. `handler` runs once on a background thread. `recorder`
/// stays valid until `FCMediaRecorderRelease`.
#[no_mangle]
pub unsafe extern "C" fn FCMediaRecorderFinishWriting(
    recorder: *mut FCMediaRecorder,
    handler: FCRecordingHandler,
    context: *mut c_void,
) -> MediaStatus {
    let Some(recorder) = recorder.as_ref() else {
        return MediaStatus::InvalidArgument;
    };

    let context = SendContext(context);
    let result = recorder.session.finish_writing(move |path| {
        let context = context;
        if let Some(callback) = handler {
            let path = path.and_then(|p| CString::new(p.to_string_lossy().into_owned()).ok());
            let ptr = path.as_ref().map_or(std::ptr::null(), |p| p.as_ptr());
            callback(context.0, ptr);
        }
    });

    match result {
        Ok(()) => MediaStatus::Ok,
        Err(e) => e.status(),
    }
}

/// Free a recorder handle. A recorder released while still recording is
/// finished in the background and its file kept.
#[no_mangle]
pub unsafe extern "C" fn FCMediaRecorderRelease(recorder: *mut FCMediaRecorder) -> MediaStatus {
    if recorder.is_null() {
        return MediaStatus::InvalidArgument;
    }
    drop(Box::from_raw(recorder));
    MediaStatus::Ok
}
