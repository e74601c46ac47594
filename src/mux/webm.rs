//! WEBM (Matroska subset) writer for VP8/VP9 video and Opus audio.
//!
//! # Layout
//!
//! ```text
//! EBML header
//! Segment (size: unknown, patched)
//!   Void        reserved, overwritten by SeekHead at finalize
//!   Info        TimecodeScale = 1 ms, Duration (patched)
//!   Tracks
//!   Cluster*    (size: unknown, patched) Timecode + SimpleBlocks
//!   Cues        appended at finalize
//! ```
//!
//! A new cluster starts on a video keyframe once the current one spans
//! [`CLUSTER_DURATION_MS`], or whenever a block's relative timecode would
//! overflow 16 bits. A cluster cut while audio lags the keyframe starts
//! at the next pending audio time instead.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use framecorder_codec::Codec;

use super::{MuxError, Muxer};
use crate::encoder::AccessUnit;
use crate::sample::MediaKind;

/// Element IDs.
pub mod id {
    pub const EBML: u32 = 0x1A45DFA3;
    pub const EBML_VERSION: u32 = 0x4286;
    pub const EBML_READ_VERSION: u32 = 0x42F7;
    pub const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
    pub const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
    pub const DOC_TYPE: u32 = 0x4282;
    pub const DOC_TYPE_VERSION: u32 = 0x4287;
    pub const DOC_TYPE_READ_VERSION: u32 = 0x4285;
    pub const SEGMENT: u32 = 0x18538067;
    pub const SEEK_HEAD: u32 = 0x114D9B74;
    pub const SEEK: u32 = 0x4DBB;
    pub const SEEK_ID: u32 = 0x53AB;
    pub const SEEK_POSITION: u32 = 0x53AC;
    pub const VOID: u32 = 0xEC;
    pub const INFO: u32 = 0x1549A966;
    pub const TIMECODE_SCALE: u32 = 0x2AD7B1;
    pub const DURATION: u32 = 0x4489;
    pub const MUXING_APP: u32 = 0x4D80;
    pub const WRITING_APP: u32 = 0x5741;
    pub const TRACKS: u32 = 0x1654AE6B;
    pub const TRACK_ENTRY: u32 = 0xAE;
    pub const TRACK_NUMBER: u32 = 0xD7;
    pub const TRACK_UID: u32 = 0x73C5;
    pub const TRACK_TYPE: u32 = 0x83;
    pub const CODEC_ID: u32 = 0x86;
    pub const CODEC_PRIVATE: u32 = 0x63A2;
    pub const SEEK_PRE_ROLL: u32 = 0x56BB;
    pub const VIDEO: u32 = 0xE0;
    pub const PIXEL_WIDTH: u32 = 0xB0;
    pub const PIXEL_HEIGHT: u32 = 0xBA;
    pub const AUDIO: u32 = 0xE1;
    pub const SAMPLING_FREQUENCY: u32 = 0xB5;
    pub const CHANNELS: u32 = 0x9F;
    pub const CLUSTER: u32 = 0x1F43B675;
    pub const TIMECODE: u32 = 0xE7;
    pub const SIMPLE_BLOCK: u32 = 0xA3;
    pub const CUES: u32 = 0x1C53BB6B;
    pub const CUE_POINT: u32 = 0xBB;
    pub const CUE_TIME: u32 = 0xB3;
    pub const CUE_TRACK_POSITIONS: u32 = 0xB7;
    pub const CUE_TRACK: u32 = 0xF7;
    pub const CUE_CLUSTER_POSITION: u32 = 0xF1;
}

/// Target cluster length before cutting at the next keyframe.
pub const CLUSTER_DURATION_MS: i64 = 5_000;

/// Bytes reserved after the Segment header for the SeekHead.
const SEEK_HEAD_RESERVED: usize = 96;

/// 8-byte "unknown size" sentinel.
const UNKNOWN_SIZE: [u8; 8] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

const VIDEO_TRACK: u8 = 1;
const AUDIO_TRACK: u8 = 2;

/// Video track parameters.
#[derive(Debug, Clone)]
pub struct WebmVideo {
    /// `Codec::Vp8` or `Codec::Vp9`.
    pub codec: Codec,
    pub width: u32,
    pub height: u32,
}

/// Opus audio track parameters.
#[derive(Debug, Clone)]
pub struct WebmAudio {
    pub sample_rate: u32,
    pub channels: u16,
    /// OpusHead. A default header is generated when absent.
    pub codec_private: Option<Vec<u8>>,
}

#[derive(Debug)]
struct OpenCluster {
    size_offset: u64,
    data_start: u64,
    timecode: i64,
    cued: bool,
}

/// Single-pass WEBM muxer with back-patched sizes.
pub struct WebmMuxer {
    path: PathBuf,
    file: BufWriter<File>,
    position: u64,
    segment_size_offset: u64,
    segment_data_start: u64,
    seek_head_offset: u64,
    info_offset: u64,
    tracks_offset: u64,
    duration_offset: u64,
    has_audio: bool,
    cluster: Option<OpenCluster>,
    /// (size field offset, data start, end) of every closed cluster.
    closed_clusters: Vec<(u64, u64, u64)>,
    /// (time in ms, cluster position relative to segment data).
    cues: Vec<(u64, u64)>,
    end_ms: i64,
    /// Start of the next audio packet in ms, once audio has been written.
    audio_next_ms: Option<i64>,
    video_frames: u64,
}

impl WebmMuxer {
    /// Create the file and write everything up to the first cluster.
    pub fn create(
        path: impl AsRef<Path>,
        video: WebmVideo,
        audio: Option<WebmAudio>,
    ) -> Result<Self, MuxError> {
        let codec_id = match video.codec {
            Codec::Vp8 => "V_VP8",
            Codec::Vp9 => "V_VP9",
            other => {
                return Err(MuxError::InvalidUnit(format!("WEBM cannot carry {}", other)));
            }
        };

        if let Some(audio) = &audio {
            if audio.codec_private.is_none() && !(1..=2).contains(&audio.channels) {
                return Err(MuxError::InvalidParameter(format!(
                    "default OpusHead covers mono or stereo, got {} channels",
                    audio.channels
                )));
            }
        }

        let path = path.as_ref().to_path_buf();
        let mut file = BufWriter::new(File::create(&path)?);
        let mut head = Vec::new();

        // EBML header
        let mut ebml = Vec::new();
        uint_element(&mut ebml, id::EBML_VERSION, 1);
        uint_element(&mut ebml, id::EBML_READ_VERSION, 1);
        uint_element(&mut ebml, id::EBML_MAX_ID_LENGTH, 4);
        uint_element(&mut ebml, id::EBML_MAX_SIZE_LENGTH, 8);
        string_element(&mut ebml, id::DOC_TYPE, "webm");
        uint_element(&mut ebml, id::DOC_TYPE_VERSION, 4);
        uint_element(&mut ebml, id::DOC_TYPE_READ_VERSION, 2);
        element(&mut head, id::EBML, &ebml);

        // Segment with unknown size
        write_id(&mut head, id::SEGMENT);
        let segment_size_offset = head.len() as u64;
        head.extend_from_slice(&UNKNOWN_SIZE);
        let segment_data_start = head.len() as u64;

        let seek_head_offset = head.len() as u64;
        write_void(&mut head, SEEK_HEAD_RESERVED);

        // Info
        let info_offset = head.len() as u64;
        let mut info = Vec::new();
        uint_element(&mut info, id::TIMECODE_SCALE, 1_000_000);
        string_element(&mut info, id::MUXING_APP, "framecorder");
        string_element(&mut info, id::WRITING_APP, "framecorder");
        let duration_in_info = info.len() + 3; // 2-byte ID + 1-byte size
        float_element(&mut info, id::DURATION, 0.0);
        let info_header = element_header_len(id::INFO, info.len());
        let duration_offset = info_offset + (info_header + duration_in_info) as u64;
        element(&mut head, id::INFO, &info);

        // Tracks
        let tracks_offset = head.len() as u64;
        let mut tracks = Vec::new();

        let mut entry = Vec::new();
        uint_element(&mut entry, id::TRACK_NUMBER, u64::from(VIDEO_TRACK));
        uint_element(&mut entry, id::TRACK_UID, u64::from(VIDEO_TRACK));
        uint_element(&mut entry, id::TRACK_TYPE, 1);
        string_element(&mut entry, id::CODEC_ID, codec_id);
        let mut video_settings = Vec::new();
        uint_element(&mut video_settings, id::PIXEL_WIDTH, u64::from(video.width));
        uint_element(&mut video_settings, id::PIXEL_HEIGHT, u64::from(video.height));
        element(&mut entry, id::VIDEO, &video_settings);
        element(&mut tracks, id::TRACK_ENTRY, &entry);

        let has_audio = audio.is_some();
        if let Some(audio) = audio {
            let private = audio
                .codec_private
                .unwrap_or_else(|| opus_head(audio.channels, audio.sample_rate));
            let mut entry = Vec::new();
            uint_element(&mut entry, id::TRACK_NUMBER, u64::from(AUDIO_TRACK));
            uint_element(&mut entry, id::TRACK_UID, u64::from(AUDIO_TRACK));
            uint_element(&mut entry, id::TRACK_TYPE, 2);
            string_element(&mut entry, id::CODEC_ID, "A_OPUS");
            element(&mut entry, id::CODEC_PRIVATE, &private);
            uint_element(&mut entry, id::SEEK_PRE_ROLL, 80_000_000);
            let mut audio_settings = Vec::new();
            float_element(
                &mut audio_settings,
                id::SAMPLING_FREQUENCY,
                f64::from(audio.sample_rate),
            );
            uint_element(&mut audio_settings, id::CHANNELS, u64::from(audio.channels));
            element(&mut entry, id::AUDIO, &audio_settings);
            element(&mut tracks, id::TRACK_ENTRY, &entry);
        }
        element(&mut head, id::TRACKS, &tracks);

        file.write_all(&head)?;
        tracing::debug!("WEBM: created {} ({} video)", path.display(), video.codec);

        Ok(Self {
            path,
            file,
            position: head.len() as u64,
            segment_size_offset,
            segment_data_start,
            seek_head_offset,
            info_offset,
            tracks_offset,
            duration_offset,
            has_audio,
            cluster: None,
            closed_clusters: Vec::new(),
            cues: Vec::new(),
            end_ms: 0,
            audio_next_ms: None,
            video_frames: 0,
        })
    }

    fn append(&mut self, data: &[u8]) -> Result<(), MuxError> {
        self.file.write_all(data)?;
        self.position += data.len() as u64;
        Ok(())
    }

    fn close_cluster(&mut self) {
        if let Some(cluster) = self.cluster.take() {
            self.closed_clusters
                .push((cluster.size_offset, cluster.data_start, self.position));
        }
    }

    /// Timecode for a cluster cut at `time`: pulled back to the pending
    /// audio position so audio that lags video keeps non-negative offsets.
    fn cluster_start(&self, time: i64) -> i64 {
        let floor = self.cluster.as_ref().map_or(i64::MIN, |c| c.timecode);
        match self.audio_next_ms {
            Some(next) if next >= floor && next < time && time - next <= CLUSTER_DURATION_MS => {
                next
            }
            _ => time,
        }
    }

    fn open_cluster(&mut self, timecode: i64) -> Result<(), MuxError> {
        self.close_cluster();
        let start = self.position;
        let mut buf = Vec::new();
        write_id(&mut buf, id::CLUSTER);
        buf.extend_from_slice(&UNKNOWN_SIZE);
        let data_start = start + buf.len() as u64;
        uint_element(&mut buf, id::TIMECODE, timecode.max(0) as u64);
        self.append(&buf)?;
        self.cluster = Some(OpenCluster {
            size_offset: start + 4,
            data_start,
            timecode,
            cued: false,
        });
        Ok(())
    }

    fn patch(&mut self, offset: u64, bytes: &[u8]) -> Result<(), MuxError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    fn build_seek_head(&self, cues_offset: u64) -> Vec<u8> {
        let mut seeks = Vec::new();
        for (target, offset) in [
            (id::INFO, self.info_offset),
            (id::TRACKS, self.tracks_offset),
            (id::CUES, cues_offset),
        ] {
            let mut seek = Vec::new();
            let mut target_id = Vec::new();
            write_id(&mut target_id, target);
            element(&mut seek, id::SEEK_ID, &target_id);
            uint_element(&mut seek, id::SEEK_POSITION, offset - self.segment_data_start);
            element(&mut seeks, id::SEEK, &seek);
        }
        let mut out = Vec::new();
        element(&mut out, id::SEEK_HEAD, &seeks);
        out
    }
}

impl Muxer for WebmMuxer {
    fn write(&mut self, kind: MediaKind, unit: AccessUnit) -> Result<(), MuxError> {
        let track = match kind {
            MediaKind::Video => VIDEO_TRACK,
            MediaKind::Audio if self.has_audio => AUDIO_TRACK,
            MediaKind::Audio => return Err(MuxError::UnexpectedTrack(kind)),
        };
        let time = (unit.timestamp + 500_000).div_euclid(1_000_000);
        let end = (unit.timestamp + unit.duration + 500_000).div_euclid(1_000_000);
        self.end_ms = self.end_ms.max(end);
        let video_key = kind == MediaKind::Video && unit.keyframe;

        let needs_cluster = match &self.cluster {
            None => true,
            Some(cluster) => {
                let relative = time - cluster.timecode;
                (video_key && relative >= CLUSTER_DURATION_MS)
                    || relative > i64::from(i16::MAX)
                    || relative < i64::from(i16::MIN)
            }
        };
        if needs_cluster {
            let timecode = self.cluster_start(time);
            self.open_cluster(timecode)?;
        }
        if kind == MediaKind::Audio {
            self.audio_next_ms = Some(end);
        }

        let segment_data_start = self.segment_data_start;
        let Some(cluster) = self.cluster.as_mut() else {
            return Err(MuxError::InvalidUnit("no open cluster".to_string()));
        };
        if video_key && !cluster.cued {
            cluster.cued = true;
            let position = cluster.size_offset - 4 - segment_data_start;
            self.cues.push((time.max(0) as u64, position));
        }
        let relative = (time - cluster.timecode) as i16;

        let mut block = Vec::with_capacity(unit.data.len() + 16);
        write_id(&mut block, id::SIMPLE_BLOCK);
        write_size(&mut block, 4 + unit.data.len() as u64);
        block.push(0x80 | track); // track number as 1-byte vint
        block.extend_from_slice(&relative.to_be_bytes());
        block.push(if unit.keyframe { 0x80 } else { 0x00 });
        block.extend_from_slice(&unit.data);
        self.append(&block)?;

        if kind == MediaKind::Video {
            self.video_frames += 1;
        }
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<PathBuf, MuxError> {
        if self.video_frames == 0 {
            return Err(MuxError::EmptyTrack("video"));
        }
        self.close_cluster();

        // Cues
        let cues_offset = self.position;
        let mut points = Vec::new();
        for &(time, position) in &self.cues {
            let mut track_positions = Vec::new();
            uint_element(&mut track_positions, id::CUE_TRACK, u64::from(VIDEO_TRACK));
            uint_element(&mut track_positions, id::CUE_CLUSTER_POSITION, position);
            let mut point = Vec::new();
            uint_element(&mut point, id::CUE_TIME, time);
            element(&mut point, id::CUE_TRACK_POSITIONS, &track_positions);
            element(&mut points, id::CUE_POINT, &point);
        }
        let mut cues = Vec::new();
        element(&mut cues, id::CUES, &points);
        self.append(&cues)?;
        let end = self.position;

        // Patch deferred fields
        for (size_offset, data_start, cluster_end) in self.closed_clusters.clone() {
            self.patch(size_offset, &fixed_size(cluster_end - data_start))?;
        }
        let segment_size = fixed_size(end - self.segment_data_start);
        self.patch(self.segment_size_offset, &segment_size)?;
        let duration = (self.end_ms as f64).to_be_bytes();
        self.patch(self.duration_offset, &duration)?;

        let mut seek_head = self.build_seek_head(cues_offset);
        let filler = SEEK_HEAD_RESERVED.saturating_sub(seek_head.len());
        if filler > 0 {
            write_void(&mut seek_head, filler);
        }
        if seek_head.len() == SEEK_HEAD_RESERVED {
            self.patch(self.seek_head_offset, &seek_head)?;
        } else {
            tracing::warn!("WEBM: SeekHead does not fit its reserved space, leaving Void");
        }

        self.file.seek(SeekFrom::Start(end))?;
        self.file.flush()?;

        tracing::info!(
            "WEBM: finalized {} ({} video frames, {} ms, {} clusters)",
            self.path.display(),
            self.video_frames,
            self.end_ms,
            self.closed_clusters.len()
        );
        Ok(self.path)
    }
}

/// Default OpusHead (mapping family 0) for a mono or stereo stream.
pub fn opus_head(channels: u16, input_sample_rate: u32) -> Vec<u8> {
    let mut head = Vec::with_capacity(19);
    head.extend_from_slice(b"OpusHead");
    head.push(1); // version
    head.push(channels as u8);
    head.extend_from_slice(&312u16.to_le_bytes()); // pre-skip
    head.extend_from_slice(&input_sample_rate.to_le_bytes());
    head.extend_from_slice(&0i16.to_le_bytes()); // output gain
    head.push(0); // channel mapping family
    head
}

// ========================================
// EBML writing helpers
// ========================================

fn write_id(buf: &mut Vec<u8>, element_id: u32) {
    let bytes = element_id.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(3);
    buf.extend_from_slice(&bytes[skip..]);
}

fn vint_len(value: u64) -> usize {
    (1..=8)
        .find(|&len| value < (1u64 << (7 * len)) - 1)
        .unwrap_or(8)
}

fn write_size(buf: &mut Vec<u8>, size: u64) {
    let len = vint_len(size);
    let marked = size | (1u64 << (7 * len));
    buf.extend_from_slice(&marked.to_be_bytes()[8 - len..]);
}

/// 8-byte size field for back-patching.
fn fixed_size(size: u64) -> [u8; 8] {
    ((1u64 << 56) | size).to_be_bytes()
}

fn element_header_len(element_id: u32, size: usize) -> usize {
    let mut header = Vec::new();
    write_id(&mut header, element_id);
    write_size(&mut header, size as u64);
    header.len()
}

fn element(buf: &mut Vec<u8>, element_id: u32, payload: &[u8]) {
    write_id(buf, element_id);
    write_size(buf, payload.len() as u64);
    buf.extend_from_slice(payload);
}

fn uint_element(buf: &mut Vec<u8>, element_id: u32, value: u64) {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
    element(buf, element_id, &bytes[skip..]);
}

fn float_element(buf: &mut Vec<u8>, element_id: u32, value: f64) {
    element(buf, element_id, &value.to_be_bytes());
}

fn string_element(buf: &mut Vec<u8>, element_id: u32, value: &str) {
    element(buf, element_id, value.as_bytes());
}

/// Void element occupying exactly `total` bytes (`total >= 2`).
fn write_void(buf: &mut Vec<u8>, total: usize) {
    let total = total.max(2);
    // One-byte size covers payloads up to 126 bytes
    let (size_len, payload) = if total - 2 < 127 {
        (1, total - 2)
    } else {
        (8, total - 9)
    };
    buf.push(id::VOID as u8);
    if size_len == 1 {
        buf.push(0x80 | payload as u8);
    } else {
        buf.extend_from_slice(&fixed_size(payload as u64));
    }
    buf.resize(buf.len() + payload, 0);
}

// ============================================================================
// EBML reader, for reading back written files
// ============================================================================

/// One parsed element header.
#[derive(Debug, Clone)]
pub struct Element {
    pub id: u32,
    pub offset: usize,
    pub header_size: usize,
    /// Payload size; `None` for the unknown-size sentinel.
    pub size: Option<u64>,
}

impl Element {
    /// Payload bytes, running to the end of `data` for unknown sizes.
    pub fn payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        let start = (self.offset + self.header_size).min(data.len());
        let end = match self.size {
            Some(size) => (start + size as usize).min(data.len()),
            None => data.len(),
        };
        &data[start..end]
    }
}

fn read_vint(data: &[u8], at: usize, keep_marker: bool) -> Option<(u64, usize)> {
    let first = *data.get(at)?;
    let len = first.leading_zeros() as usize + 1;
    if len > 8 || at + len > data.len() {
        return None;
    }
    let mut value = if keep_marker {
        u64::from(first)
    } else {
        u64::from(first) & ((1u64 << (8 - len)) - 1)
    };
    for &b in &data[at + 1..at + len] {
        value = (value << 8) | u64::from(b);
    }
    Some((value, len))
}

/// Parse the sibling elements in `data`.
pub fn iter_elements(data: &[u8]) -> Vec<Element> {
    let mut elements = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let Some((element_id, id_len)) = read_vint(data, offset, true) else {
            break;
        };
        let Some((raw_size, size_len)) = read_vint(data, offset + id_len, false) else {
            break;
        };
        let unknown = raw_size == (1u64 << (7 * size_len)) - 1;
        let element = Element {
            id: element_id as u32,
            offset,
            header_size: id_len + size_len,
            size: (!unknown).then_some(raw_size),
        };
        let next = match element.size {
            Some(size) => offset + element.header_size + size as usize,
            None => data.len(),
        };
        elements.push(element);
        offset = next;
    }
    elements
}

/// Find the first child element with `element_id`.
pub fn find_element(data: &[u8], element_id: u32) -> Option<Element> {
    iter_elements(data).into_iter().find(|e| e.id == element_id)
}

/// Read an unsigned integer payload.
pub fn read_uint(payload: &[u8]) -> u64 {
    payload.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(ms: i64, keyframe: bool) -> AccessUnit {
        AccessUnit {
            data: vec![0x9d, 0x01, 0x2a, 0x00],
            timestamp: ms * 1_000_000,
            duration: 40_000_000,
            keyframe,
            frame_count: 1,
            side_data: None,
        }
    }

    fn write_file(frames: &[(i64, bool)], audio: bool) -> Vec<u8> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.webm");
        let video = WebmVideo {
            codec: Codec::Vp8,
            width: 32,
            height: 16,
        };
        let audio = audio.then(|| WebmAudio {
            sample_rate: 48_000,
            channels: 2,
            codec_private: None,
        });
        let mut muxer = Box::new(WebmMuxer::create(&path, video, audio).unwrap());
        for &(ms, key) in frames {
            muxer.write(MediaKind::Video, frame(ms, key)).unwrap();
        }
        std::fs::read(muxer.finalize().unwrap()).unwrap()
    }

    #[test]
    fn test_vint_sizes() {
        let mut buf = Vec::new();
        write_size(&mut buf, 5);
        assert_eq!(buf, vec![0x85]);
        buf.clear();
        write_size(&mut buf, 127);
        assert_eq!(buf, vec![0x40, 0x7F]);
        assert_eq!(read_vint(&[0x40, 0x7F], 0, false), Some((127, 2)));
        assert_eq!(fixed_size(3), [0x01, 0, 0, 0, 0, 0, 0, 3]);
    }

    #[test]
    fn test_webm_structure() {
        let frames: Vec<(i64, bool)> = (0..10).map(|i| (i * 40, i == 0)).collect();
        let data = write_file(&frames, true);

        let top = iter_elements(&data);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].id, id::EBML);
        let doc_type = find_element(top[0].payload(&data), id::DOC_TYPE).unwrap();
        assert_eq!(doc_type.payload(top[0].payload(&data)), b"webm");

        // Segment size was patched and covers the rest of the file
        let segment = &top[1];
        assert_eq!(segment.id, id::SEGMENT);
        assert_eq!(
            segment.size,
            Some((data.len() - segment.offset - segment.header_size) as u64)
        );

        let body = segment.payload(&data);
        let ids: Vec<u32> = iter_elements(body).iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![id::SEEK_HEAD, id::VOID, id::INFO, id::TRACKS, id::CLUSTER, id::CUES]);

        let info = find_element(body, id::INFO).unwrap();
        let duration = find_element(info.payload(body), id::DURATION).unwrap();
        let bytes: [u8; 8] = duration.payload(info.payload(body)).try_into().unwrap();
        assert_eq!(f64::from_be_bytes(bytes), 400.0);

        let tracks = find_element(body, id::TRACKS).unwrap();
        assert_eq!(
            iter_elements(tracks.payload(body))
                .iter()
                .filter(|e| e.id == id::TRACK_ENTRY)
                .count(),
            2
        );

        let cluster = find_element(body, id::CLUSTER).unwrap();
        assert!(cluster.size.is_some());
        let blocks = iter_elements(cluster.payload(body))
            .iter()
            .filter(|e| e.id == id::SIMPLE_BLOCK)
            .count();
        assert_eq!(blocks, 10);
    }

    #[test]
    fn test_webm_clusters_cut_on_keyframes() {
        // 12 s at 25 fps with a keyframe every 2 s
        let frames: Vec<(i64, bool)> = (0..300).map(|i| (i * 40, i % 50 == 0)).collect();
        let data = write_file(&frames, false);
        let segment = iter_elements(&data).remove(1);
        let body = segment.payload(&data);

        let clusters: Vec<Element> = iter_elements(body)
            .into_iter()
            .filter(|e| e.id == id::CLUSTER)
            .collect();
        // Keyframes every 2 s, so the first cut lands on the 6 s keyframe
        assert_eq!(clusters.len(), 2);
        let timecodes: Vec<u64> = clusters
            .iter()
            .map(|c| {
                let tc = find_element(c.payload(body), id::TIMECODE).unwrap();
                read_uint(tc.payload(c.payload(body)))
            })
            .collect();
        assert_eq!(timecodes, vec![0, 6_000]);

        let cues = find_element(body, id::CUES).unwrap();
        let points = iter_elements(cues.payload(body));
        assert_eq!(points.len(), 2);
        // CueClusterPosition points at the cluster
        let point = points[1].payload(cues.payload(body));
        let positions = find_element(point, id::CUE_TRACK_POSITIONS).unwrap();
        let position = find_element(positions.payload(point), id::CUE_CLUSTER_POSITION).unwrap();
        let at = read_uint(position.payload(positions.payload(point))) as usize;
        assert_eq!(at, clusters[1].offset);
    }

    #[test]
    fn test_seek_head_points_at_cues() {
        let data = write_file(&[(0, true), (40, false)], false);
        let segment = iter_elements(&data).remove(1);
        let body = segment.payload(&data);
        let seek_head = find_element(body, id::SEEK_HEAD).unwrap();
        let seeks = iter_elements(seek_head.payload(body));
        assert_eq!(seeks.len(), 3);
        let last = seeks[2].payload(seek_head.payload(body));
        let position = find_element(last, id::SEEK_POSITION).unwrap();
        let at = read_uint(position.payload(last)) as usize;
        assert_eq!(iter_elements(&body[at..])[0].id, id::CUES);
    }

    fn audio_packet(ms: i64) -> AccessUnit {
        AccessUnit {
            data: vec![0xFC, 0x00],
            timestamp: ms * 1_000_000,
            duration: 20_000_000,
            keyframe: true,
            frame_count: 960,
            side_data: None,
        }
    }

    #[test]
    fn test_cluster_starts_at_pending_audio() {
        let dir = tempfile::tempdir().unwrap();
        let video = WebmVideo {
            codec: Codec::Vp8,
            width: 32,
            height: 16,
        };
        let audio = WebmAudio {
            sample_rate: 48_000,
            channels: 2,
            codec_private: None,
        };
        let mut muxer =
            Box::new(WebmMuxer::create(dir.path().join("lag.webm"), video, Some(audio)).unwrap());
        muxer.write(MediaKind::Video, frame(0, true)).unwrap();
        // Audio runs up to 5 s, then the 6 s keyframe arrives before the rest
        for ms in (0..5_000).step_by(20) {
            muxer.write(MediaKind::Audio, audio_packet(ms)).unwrap();
        }
        muxer.write(MediaKind::Video, frame(6_000, true)).unwrap();
        for ms in (5_000..6_000).step_by(20) {
            muxer.write(MediaKind::Audio, audio_packet(ms)).unwrap();
        }
        let data = std::fs::read(muxer.finalize().unwrap()).unwrap();

        let segment = iter_elements(&data).remove(1);
        let body = segment.payload(&data);
        let clusters: Vec<Element> = iter_elements(body)
            .into_iter()
            .filter(|e| e.id == id::CLUSTER)
            .collect();
        assert_eq!(clusters.len(), 2);
        let second = clusters[1].payload(body);
        let tc = find_element(second, id::TIMECODE).unwrap();
        assert_eq!(read_uint(tc.payload(second)), 5_000);

        for cluster in &clusters {
            let content = cluster.payload(body);
            for block in iter_elements(content).iter().filter(|e| e.id == id::SIMPLE_BLOCK) {
                let payload = block.payload(content);
                let relative = i16::from_be_bytes([payload[1], payload[2]]);
                assert!(relative >= 0, "negative block offset {}", relative);
            }
        }

        // The cue still points at the keyframe time
        let cues = find_element(body, id::CUES).unwrap();
        let point = iter_elements(cues.payload(body)).remove(1);
        let time = find_element(point.payload(cues.payload(body)), id::CUE_TIME).unwrap();
        assert_eq!(read_uint(time.payload(point.payload(cues.payload(body)))), 6_000);
    }

    #[test]
    fn test_default_opus_head_needs_mono_or_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surround.webm");
        let video = WebmVideo {
            codec: Codec::Vp8,
            width: 32,
            height: 16,
        };
        let audio = WebmAudio {
            sample_rate: 48_000,
            channels: 6,
            codec_private: None,
        };
        assert!(matches!(
            WebmMuxer::create(&path, video, Some(audio)),
            Err(MuxError::InvalidParameter(_))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_opus_head() {
        let head = opus_head(2, 48_000);
        assert_eq!(head.len(), 19);
        assert_eq!(&head[..8], b"OpusHead");
        assert_eq!(head[9], 2);
    }
}
