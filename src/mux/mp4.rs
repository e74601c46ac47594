//! Progressive MP4 writer for H.264 and HEVC, with optional AAC or PCM audio.
//!
//! # Layout
//!
//! ```text
//! ftyp
//! mdat   (64-bit size, patched at finalize)
//!   sample data, appended as units arrive
//! moov   (written at finalize)
//!   mvhd
//!   trak (video)  tkhd, mdia { mdhd, hdlr, minf { vmhd, dinf, stbl } }
//!   trak (audio)  tkhd, mdia { mdhd, hdlr, minf { smhd, dinf, stbl } }
//! ```
//!
//! Sample tables (`stts`, `stss`, `stsc`, `stsz`, `co64`) are accumulated in
//! memory. Parameter sets are pulled out of the Annex B stream into the
//! `avcC` / `hvcC` sample entry.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use framecorder_codec::{AudioCodec, Codec};

use super::nal::{parse_annex_b, NalSyntax};
use super::{to_timescale, MuxError, Muxer};
use crate::encoder::AccessUnit;
use crate::sample::MediaKind;

/// Video timescale (ticks per second).
pub const VIDEO_TIMESCALE: u32 = 90_000;

/// Movie header timescale (milliseconds).
const MOVIE_TIMESCALE: u32 = 1_000;

const MDAT_HEADER_SIZE: u64 = 16;

const IDENTITY_MATRIX: [u32; 9] = [0x00010000, 0, 0, 0, 0x00010000, 0, 0, 0, 0x40000000];

/// Video track parameters.
#[derive(Debug, Clone)]
pub struct Mp4Video {
    /// `Codec::H264` or `Codec::Hevc`.
    pub codec: Codec,
    pub width: u32,
    pub height: u32,
}

/// Audio track parameters.
#[derive(Debug, Clone)]
pub struct Mp4Audio {
    /// `AudioCodec::Aac` or `AudioCodec::Pcm16`.
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_rate: u32,
    /// AudioSpecificConfig for AAC. Derived from the rate and channel count
    /// when absent.
    pub decoder_config: Option<Vec<u8>>,
}

/// Accumulated sample table for one track.
#[derive(Debug)]
struct SampleTable {
    timescale: u32,
    /// Constant sample size (PCM), or `None` for per-sample sizes.
    fixed_size: Option<u32>,
    sizes: Vec<u32>,
    sample_count: u64,
    /// Run-length `stts` entries: (sample_count, sample_delta).
    deltas: Vec<(u32, u32)>,
    /// 1-based numbers of sync samples.
    sync: Vec<u32>,
    all_sync: bool,
    /// (file offset, samples in chunk).
    chunks: Vec<(u64, u32)>,
    duration: u64,
}

impl SampleTable {
    fn new(timescale: u32, fixed_size: Option<u32>, all_sync: bool) -> Self {
        Self {
            timescale,
            fixed_size,
            sizes: Vec::new(),
            sample_count: 0,
            deltas: Vec::new(),
            sync: Vec::new(),
            all_sync,
            chunks: Vec::new(),
            duration: 0,
        }
    }

    fn push_delta(&mut self, count: u32, delta: u32) {
        self.duration += u64::from(count) * u64::from(delta);
        match self.deltas.last_mut() {
            Some((n, d)) if *d == delta => *n += count,
            _ => self.deltas.push((count, delta)),
        }
    }
}

struct VideoTrack {
    config: Mp4Video,
    syntax: NalSyntax,
    vps: Option<Vec<u8>>,
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
    table: SampleTable,
    origin: Option<i64>,
    /// Relative timestamp and duration of the last written sample.
    last: Option<(i64, i64)>,
}

struct AudioTrack {
    config: Mp4Audio,
    table: SampleTable,
}

/// Progressive (non-fragmented) MP4 muxer.
pub struct Mp4Muxer {
    path: PathBuf,
    file: BufWriter<File>,
    mdat_offset: u64,
    position: u64,
    video: VideoTrack,
    audio: Option<AudioTrack>,
}

impl Mp4Muxer {
    /// Create the file and write `ftyp` plus the `mdat` header placeholder.
    pub fn create(
        path: impl AsRef<Path>,
        video: Mp4Video,
        audio: Option<Mp4Audio>,
    ) -> Result<Self, MuxError> {
        let syntax = match video.codec {
            Codec::H264 => NalSyntax::Avc,
            Codec::Hevc => NalSyntax::Hevc,
            other => {
                return Err(MuxError::InvalidUnit(format!("MP4 cannot carry {}", other)));
            }
        };
        let audio = match audio {
            Some(config) => {
                if !matches!(config.codec, AudioCodec::Aac | AudioCodec::Pcm16) {
                    return Err(MuxError::InvalidUnit(format!(
                        "MP4 cannot carry {} audio",
                        config.codec
                    )));
                }
                let fixed = (config.codec == AudioCodec::Pcm16)
                    .then(|| 2 * u32::from(config.channels));
                Some(AudioTrack {
                    table: SampleTable::new(config.sample_rate, fixed, true),
                    config,
                })
            }
            None => None,
        };

        let path = path.as_ref().to_path_buf();
        let mut file = BufWriter::new(File::create(&path)?);

        let mut head = Vec::new();
        write_ftyp(&mut head, video.codec);
        let mdat_offset = head.len() as u64;
        // Large-size mdat: size field 1, real size in the following u64
        head.extend_from_slice(&1u32.to_be_bytes());
        head.extend_from_slice(b"mdat");
        head.extend_from_slice(&0u64.to_be_bytes());
        file.write_all(&head)?;

        tracing::debug!("MP4: created {} ({} video)", path.display(), video.codec);

        Ok(Self {
            path,
            file,
            mdat_offset,
            position: head.len() as u64,
            video: VideoTrack {
                config: video,
                syntax,
                vps: None,
                sps: None,
                pps: None,
                table: SampleTable::new(VIDEO_TIMESCALE, None, false),
                origin: None,
                last: None,
            },
            audio,
        })
    }

    fn append(&mut self, data: &[u8]) -> Result<u64, MuxError> {
        let offset = self.position;
        self.file.write_all(data)?;
        self.position += data.len() as u64;
        Ok(offset)
    }

    fn write_video(&mut self, unit: AccessUnit) -> Result<(), MuxError> {
        let parsed = parse_annex_b(&unit.data, self.video.syntax);
        let track = &mut self.video;
        if track.vps.is_none() {
            track.vps = parsed.vps.clone();
        }
        if track.sps.is_none() {
            track.sps = parsed.sps.clone();
        }
        if track.pps.is_none() {
            track.pps = parsed.pps.clone();
        }

        let payload = parsed.to_length_prefixed();
        if payload.is_empty() {
            tracing::debug!("MP4: access unit carried no picture data, skipping");
            return Ok(());
        }
        let keyframe = unit.keyframe || parsed.is_keyframe;

        let origin = *self.video.origin.get_or_insert(unit.timestamp);
        let relative = unit.timestamp - origin;
        if let Some((previous, _)) = self.video.last {
            let delta = to_timescale(relative, VIDEO_TIMESCALE)
                .saturating_sub(to_timescale(previous, VIDEO_TIMESCALE));
            self.video.table.push_delta(1, clamp_u32(delta).max(1));
        }
        self.video.last = Some((relative, unit.duration));

        let offset = self.append(&payload)?;
        let table = &mut self.video.table;
        table.sample_count += 1;
        table.sizes.push(clamp_u32(payload.len() as u64));
        table.chunks.push((offset, 1));
        if keyframe {
            table.sync.push(clamp_u32(table.sample_count));
        }
        Ok(())
    }

    fn write_audio(&mut self, unit: AccessUnit) -> Result<(), MuxError> {
        if self.audio.is_none() {
            return Err(MuxError::UnexpectedTrack(MediaKind::Audio));
        }
        if unit.data.is_empty() || unit.frame_count == 0 {
            return Ok(());
        }
        let offset = self.append(&unit.data)?;
        let Some(track) = self.audio.as_mut() else {
            return Ok(());
        };
        let table = &mut track.table;
        match table.fixed_size {
            Some(frame_size) => {
                if unit.data.len() as u64 != u64::from(frame_size) * u64::from(unit.frame_count) {
                    return Err(MuxError::InvalidUnit(format!(
                        "PCM block of {} bytes does not hold {} frames",
                        unit.data.len(),
                        unit.frame_count
                    )));
                }
                table.sample_count += u64::from(unit.frame_count);
                table.push_delta(unit.frame_count, 1);
                table.chunks.push((offset, unit.frame_count));
            }
            None => {
                table.sample_count += 1;
                table.sizes.push(clamp_u32(unit.data.len() as u64));
                table.push_delta(1, unit.frame_count);
                table.chunks.push((offset, 1));
            }
        }
        Ok(())
    }

    fn build_moov(&self) -> Result<Vec<u8>, MuxError> {
        let video = &self.video;
        let entry = video_sample_entry(video)?;
        let video_ms = scale_duration(video.table.duration, VIDEO_TIMESCALE, MOVIE_TIMESCALE);

        let audio = self.audio.as_ref().filter(|a| {
            if a.table.sample_count == 0 {
                tracing::warn!("MP4: audio track received no samples, omitting it");
            }
            a.table.sample_count > 0
        });
        let audio_ms = audio
            .map(|a| scale_duration(a.table.duration, a.table.timescale, MOVIE_TIMESCALE))
            .unwrap_or(0);

        let mut moov = Vec::new();
        let next_track_id = if audio.is_some() { 3 } else { 2 };
        write_mvhd(&mut moov, video_ms.max(audio_ms), next_track_id);
        write_trak(
            &mut moov,
            &TrakInfo {
                track_id: 1,
                kind: MediaKind::Video,
                movie_duration: video_ms,
                width: video.config.width,
                height: video.config.height,
            },
            &video.table,
            &entry,
        );
        if let Some(audio) = audio {
            let entry = audio_sample_entry(&audio.config);
            write_trak(
                &mut moov,
                &TrakInfo {
                    track_id: 2,
                    kind: MediaKind::Audio,
                    movie_duration: audio_ms,
                    width: 0,
                    height: 0,
                },
                &audio.table,
                &entry,
            );
        }

        let mut out = Vec::with_capacity(moov.len() + 8);
        write_box(&mut out, b"moov", &moov);
        Ok(out)
    }
}

impl Muxer for Mp4Muxer {
    fn write(&mut self, kind: MediaKind, unit: AccessUnit) -> Result<(), MuxError> {
        match kind {
            MediaKind::Video => self.write_video(unit),
            MediaKind::Audio => self.write_audio(unit),
        }
    }

    fn finalize(mut self: Box<Self>) -> Result<PathBuf, MuxError> {
        if self.video.table.sample_count == 0 {
            return Err(MuxError::EmptyTrack("video"));
        }
        if let Some((relative, duration)) = self.video.last {
            let end = to_timescale(relative + duration.max(1), VIDEO_TIMESCALE);
            let delta = end.saturating_sub(to_timescale(relative, VIDEO_TIMESCALE));
            self.video.table.push_delta(1, clamp_u32(delta).max(1));
        }

        let moov = self.build_moov()?;

        // Patch the mdat size now that all sample data is written
        let mdat_size = self.position - self.mdat_offset;
        self.file.seek(SeekFrom::Start(self.mdat_offset + 8))?;
        self.file.write_all(&mdat_size.to_be_bytes())?;
        self.file.seek(SeekFrom::Start(self.position))?;

        self.file.write_all(&moov)?;
        self.file.flush()?;

        tracing::info!(
            "MP4: finalized {} ({} video samples, {:.2}s)",
            self.path.display(),
            self.video.table.sample_count,
            self.video.table.duration as f64 / f64::from(VIDEO_TIMESCALE)
        );
        Ok(self.path)
    }
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn scale_duration(duration: u64, from: u32, to: u32) -> u64 {
    if from == 0 {
        return 0;
    }
    ((u128::from(duration) * u128::from(to) + u128::from(from) / 2) / u128::from(from)) as u64
}

// ========================================
// Box writing helpers
// ========================================

fn write_box(buf: &mut Vec<u8>, box_type: &[u8; 4], content: &[u8]) {
    let size = 8 + content.len();
    buf.extend_from_slice(&(size as u32).to_be_bytes());
    buf.extend_from_slice(box_type);
    buf.extend_from_slice(content);
}

fn full_box_header(content: &mut Vec<u8>, version: u8, flags: u32) {
    content.push(version);
    content.extend_from_slice(&flags.to_be_bytes()[1..]);
}

fn write_ftyp(buf: &mut Vec<u8>, codec: Codec) {
    let codec_brand: &[u8; 4] = if codec == Codec::Hevc { b"hvc1" } else { b"avc1" };
    let brands: [&[u8; 4]; 4] = [b"isom", b"iso2", codec_brand, b"mp41"];

    let mut content = Vec::new();
    content.extend_from_slice(b"isom"); // major brand
    content.extend_from_slice(&0x200u32.to_be_bytes()); // minor version
    for brand in brands {
        content.extend_from_slice(brand);
    }
    write_box(buf, b"ftyp", &content);
}

fn write_mvhd(buf: &mut Vec<u8>, duration: u64, next_track_id: u32) {
    let mut content = Vec::new();
    full_box_header(&mut content, 0, 0);

    content.extend_from_slice(&0u32.to_be_bytes()); // creation time
    content.extend_from_slice(&0u32.to_be_bytes()); // modification time
    content.extend_from_slice(&MOVIE_TIMESCALE.to_be_bytes()); // timescale
    content.extend_from_slice(&clamp_u32(duration).to_be_bytes()); // duration

    content.extend_from_slice(&0x00010000u32.to_be_bytes()); // rate (1.0)
    content.extend_from_slice(&0x0100u16.to_be_bytes()); // volume (1.0)
    content.extend_from_slice(&[0; 10]); // reserved

    for m in &IDENTITY_MATRIX {
        content.extend_from_slice(&m.to_be_bytes());
    }

    content.extend_from_slice(&[0; 24]); // pre_defined
    content.extend_from_slice(&next_track_id.to_be_bytes());

    write_box(buf, b"mvhd", &content);
}

struct TrakInfo {
    track_id: u32,
    kind: MediaKind,
    movie_duration: u64,
    width: u32,
    height: u32,
}

fn write_trak(buf: &mut Vec<u8>, info: &TrakInfo, table: &SampleTable, sample_entry: &[u8]) {
    let mut trak = Vec::new();
    write_tkhd(&mut trak, info);

    let mut mdia = Vec::new();
    write_mdhd(&mut mdia, table.timescale, table.duration);
    write_hdlr(&mut mdia, info.kind);

    let mut minf = Vec::new();
    match info.kind {
        MediaKind::Video => {
            let mut vmhd = Vec::new();
            full_box_header(&mut vmhd, 0, 1);
            vmhd.extend_from_slice(&0u16.to_be_bytes()); // graphics_mode
            vmhd.extend_from_slice(&[0; 6]); // opcolor
            write_box(&mut minf, b"vmhd", &vmhd);
        }
        MediaKind::Audio => {
            let mut smhd = Vec::new();
            full_box_header(&mut smhd, 0, 0);
            smhd.extend_from_slice(&0i16.to_be_bytes()); // balance
            smhd.extend_from_slice(&0u16.to_be_bytes()); // reserved
            write_box(&mut minf, b"smhd", &smhd);
        }
    }
    write_dinf(&mut minf);
    write_stbl(&mut minf, table, sample_entry);

    write_box(&mut mdia, b"minf", &minf);
    write_box(&mut trak, b"mdia", &mdia);
    write_box(buf, b"trak", &trak);
}

fn write_tkhd(buf: &mut Vec<u8>, info: &TrakInfo) {
    let mut content = Vec::new();
    full_box_header(&mut content, 0, 3); // track enabled, in movie

    content.extend_from_slice(&0u32.to_be_bytes()); // creation time
    content.extend_from_slice(&0u32.to_be_bytes()); // modification time
    content.extend_from_slice(&info.track_id.to_be_bytes());
    content.extend_from_slice(&0u32.to_be_bytes()); // reserved
    content.extend_from_slice(&clamp_u32(info.movie_duration).to_be_bytes());

    content.extend_from_slice(&[0; 8]); // reserved
    content.extend_from_slice(&0i16.to_be_bytes()); // layer
    content.extend_from_slice(&0i16.to_be_bytes()); // alternate_group
    let volume: u16 = if info.kind == MediaKind::Audio { 0x0100 } else { 0 };
    content.extend_from_slice(&volume.to_be_bytes());
    content.extend_from_slice(&0u16.to_be_bytes()); // reserved

    for m in &IDENTITY_MATRIX {
        content.extend_from_slice(&m.to_be_bytes());
    }

    // Width and height as 16.16 fixed point
    content.extend_from_slice(&(info.width << 16).to_be_bytes());
    content.extend_from_slice(&(info.height << 16).to_be_bytes());

    write_box(buf, b"tkhd", &content);
}

fn write_mdhd(buf: &mut Vec<u8>, timescale: u32, duration: u64) {
    let mut content = Vec::new();
    full_box_header(&mut content, 0, 0);

    content.extend_from_slice(&0u32.to_be_bytes()); // creation time
    content.extend_from_slice(&0u32.to_be_bytes()); // modification time
    content.extend_from_slice(&timescale.to_be_bytes());
    content.extend_from_slice(&clamp_u32(duration).to_be_bytes());

    content.extend_from_slice(&0x55c4u16.to_be_bytes()); // language (und)
    content.extend_from_slice(&0u16.to_be_bytes()); // pre_defined

    write_box(buf, b"mdhd", &content);
}

fn write_hdlr(buf: &mut Vec<u8>, kind: MediaKind) {
    let (handler, name): (&[u8; 4], &[u8]) = match kind {
        MediaKind::Video => (b"vide", b"VideoHandler\0"),
        MediaKind::Audio => (b"soun", b"SoundHandler\0"),
    };
    let mut content = Vec::new();
    full_box_header(&mut content, 0, 0);
    content.extend_from_slice(&0u32.to_be_bytes()); // pre_defined
    content.extend_from_slice(handler);
    content.extend_from_slice(&[0; 12]); // reserved
    content.extend_from_slice(name);
    write_box(buf, b"hdlr", &content);
}

fn write_dinf(buf: &mut Vec<u8>) {
    let mut dref = Vec::new();
    full_box_header(&mut dref, 0, 0);
    dref.extend_from_slice(&1u32.to_be_bytes()); // entry_count

    // url entry (self-contained)
    let mut url = Vec::new();
    full_box_header(&mut url, 0, 1);
    write_box(&mut dref, b"url ", &url);

    let mut dinf = Vec::new();
    write_box(&mut dinf, b"dref", &dref);
    write_box(buf, b"dinf", &dinf);
}

fn write_stbl(buf: &mut Vec<u8>, table: &SampleTable, sample_entry: &[u8]) {
    let mut stbl = Vec::new();

    // stsd
    let mut stsd = Vec::new();
    full_box_header(&mut stsd, 0, 0);
    stsd.extend_from_slice(&1u32.to_be_bytes()); // entry_count
    stsd.extend_from_slice(sample_entry);
    write_box(&mut stbl, b"stsd", &stsd);

    // stts
    let mut stts = Vec::new();
    full_box_header(&mut stts, 0, 0);
    stts.extend_from_slice(&(table.deltas.len() as u32).to_be_bytes());
    for (count, delta) in &table.deltas {
        stts.extend_from_slice(&count.to_be_bytes());
        stts.extend_from_slice(&delta.to_be_bytes());
    }
    write_box(&mut stbl, b"stts", &stts);

    // stss (absent means every sample is a sync sample)
    if !table.all_sync {
        let mut stss = Vec::new();
        full_box_header(&mut stss, 0, 0);
        stss.extend_from_slice(&(table.sync.len() as u32).to_be_bytes());
        for sample in &table.sync {
            stss.extend_from_slice(&sample.to_be_bytes());
        }
        write_box(&mut stbl, b"stss", &stss);
    }

    // stsc, run-length over samples-per-chunk
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for (index, &(_, samples)) in table.chunks.iter().enumerate() {
        if runs.last().map(|&(_, n)| n) != Some(samples) {
            runs.push((index as u32 + 1, samples));
        }
    }
    let mut stsc = Vec::new();
    full_box_header(&mut stsc, 0, 0);
    stsc.extend_from_slice(&(runs.len() as u32).to_be_bytes());
    for (first_chunk, samples) in &runs {
        stsc.extend_from_slice(&first_chunk.to_be_bytes());
        stsc.extend_from_slice(&samples.to_be_bytes());
        stsc.extend_from_slice(&1u32.to_be_bytes()); // sample_description_index
    }
    write_box(&mut stbl, b"stsc", &stsc);

    // stsz
    let mut stsz = Vec::new();
    full_box_header(&mut stsz, 0, 0);
    match table.fixed_size {
        Some(size) => {
            stsz.extend_from_slice(&size.to_be_bytes());
            stsz.extend_from_slice(&clamp_u32(table.sample_count).to_be_bytes());
        }
        None => {
            stsz.extend_from_slice(&0u32.to_be_bytes());
            stsz.extend_from_slice(&(table.sizes.len() as u32).to_be_bytes());
            for size in &table.sizes {
                stsz.extend_from_slice(&size.to_be_bytes());
            }
        }
    }
    write_box(&mut stbl, b"stsz", &stsz);

    // co64
    let mut co64 = Vec::new();
    full_box_header(&mut co64, 0, 0);
    co64.extend_from_slice(&(table.chunks.len() as u32).to_be_bytes());
    for (offset, _) in &table.chunks {
        co64.extend_from_slice(&offset.to_be_bytes());
    }
    write_box(&mut stbl, b"co64", &co64);

    write_box(buf, b"stbl", &stbl);
}

fn video_sample_entry(track: &VideoTrack) -> Result<Vec<u8>, MuxError> {
    let (entry_type, config_box) = match track.syntax {
        NalSyntax::Avc => {
            let (Some(sps), Some(pps)) = (&track.sps, &track.pps) else {
                return Err(MuxError::MissingConfig("H.264 SPS/PPS"));
            };
            let mut avcc = Vec::new();
            write_avcc(&mut avcc, sps, pps);
            (b"avc1", avcc)
        }
        NalSyntax::Hevc => {
            let (Some(vps), Some(sps), Some(pps)) = (&track.vps, &track.sps, &track.pps) else {
                return Err(MuxError::MissingConfig("HEVC VPS/SPS/PPS"));
            };
            let mut hvcc = Vec::new();
            write_hvcc(&mut hvcc, vps, sps, pps);
            (b"hvc1", hvcc)
        }
    };

    let mut content = Vec::new();
    content.extend_from_slice(&[0; 6]); // reserved
    content.extend_from_slice(&1u16.to_be_bytes()); // data_reference_index

    content.extend_from_slice(&0u16.to_be_bytes()); // pre_defined
    content.extend_from_slice(&0u16.to_be_bytes()); // reserved
    content.extend_from_slice(&[0; 12]); // pre_defined

    content.extend_from_slice(&(track.config.width as u16).to_be_bytes());
    content.extend_from_slice(&(track.config.height as u16).to_be_bytes());

    content.extend_from_slice(&0x00480000u32.to_be_bytes()); // horiz resolution 72 dpi
    content.extend_from_slice(&0x00480000u32.to_be_bytes()); // vert resolution 72 dpi
    content.extend_from_slice(&0u32.to_be_bytes()); // reserved
    content.extend_from_slice(&1u16.to_be_bytes()); // frame_count

    // Compressor name (32 bytes)
    let mut compressor = [0u8; 32];
    let name = b"framecorder";
    compressor[0] = name.len() as u8;
    compressor[1..1 + name.len()].copy_from_slice(name);
    content.extend_from_slice(&compressor);

    content.extend_from_slice(&0x0018u16.to_be_bytes()); // depth (24-bit)
    content.extend_from_slice(&(-1i16).to_be_bytes()); // pre_defined

    content.extend_from_slice(&config_box);

    let mut entry = Vec::new();
    write_box(&mut entry, entry_type, &content);
    Ok(entry)
}

fn write_avcc(buf: &mut Vec<u8>, sps: &[u8], pps: &[u8]) {
    let mut content = Vec::new();

    content.push(1); // configuration_version

    // Profile, compatibility, and level from SPS
    if sps.len() >= 4 {
        content.push(sps[1]); // profile_idc
        content.push(sps[2]); // profile_compatibility
        content.push(sps[3]); // level_idc
    } else {
        content.extend_from_slice(&[0x64, 0x00, 0x1f]); // High profile, level 3.1
    }

    content.push(0xFF); // length_size_minus_one (3 = 4 bytes) | reserved

    content.push(0xE1); // num_sps | reserved
    content.extend_from_slice(&(sps.len() as u16).to_be_bytes());
    content.extend_from_slice(sps);

    content.push(1); // num_pps
    content.extend_from_slice(&(pps.len() as u16).to_be_bytes());
    content.extend_from_slice(pps);

    write_box(buf, b"avcC", &content);
}

fn write_hvcc(buf: &mut Vec<u8>, vps: &[u8], sps: &[u8], pps: &[u8]) {
    let mut content = Vec::new();

    content.push(1); // configuration_version

    // general_profile_tier_level: 12 bytes after the 2-byte NAL header and
    // the vps_id/max_sub_layers byte.
    if sps.len() >= 15 {
        content.extend_from_slice(&sps[3..15]);
    } else {
        content.push(0x01); // Main profile, main tier
        content.extend_from_slice(&0x6000_0000u32.to_be_bytes()); // compatibility flags
        content.extend_from_slice(&[0x90, 0, 0, 0, 0, 0]); // constraint flags
        content.push(93); // level 3.1
    }

    content.extend_from_slice(&0xF000u16.to_be_bytes()); // min_spatial_segmentation_idc
    content.push(0xFC); // parallelismType
    content.push(0xFD); // chroma_format_idc (4:2:0)
    content.push(0xF8); // bit_depth_luma_minus8
    content.push(0xF8); // bit_depth_chroma_minus8
    content.extend_from_slice(&0u16.to_be_bytes()); // avgFrameRate
    // constantFrameRate 0, numTemporalLayers 1, temporalIdNested 1, lengthSizeMinusOne 3
    content.push(0x0F);

    content.push(3); // numOfArrays
    for (nal_type, nal) in [(32u8, vps), (33, sps), (34, pps)] {
        content.push(0x80 | nal_type); // array_completeness | NAL_unit_type
        content.extend_from_slice(&1u16.to_be_bytes()); // numNalus
        content.extend_from_slice(&(nal.len() as u16).to_be_bytes());
        content.extend_from_slice(nal);
    }

    write_box(buf, b"hvcC", &content);
}

fn audio_sample_entry(config: &Mp4Audio) -> Vec<u8> {
    let mut content = Vec::new();
    content.extend_from_slice(&[0; 6]); // reserved
    content.extend_from_slice(&1u16.to_be_bytes()); // data_reference_index
    content.extend_from_slice(&[0; 8]); // reserved
    content.extend_from_slice(&config.channels.to_be_bytes());
    content.extend_from_slice(&16u16.to_be_bytes()); // sample size
    content.extend_from_slice(&0u16.to_be_bytes()); // pre_defined
    content.extend_from_slice(&0u16.to_be_bytes()); // reserved
    // Sample rate as 16.16 fixed point
    content.extend_from_slice(&(config.sample_rate.min(0xFFFF) << 16).to_be_bytes());

    let entry_type = match config.codec {
        AudioCodec::Aac => {
            let asc = config
                .decoder_config
                .clone()
                .unwrap_or_else(|| aac_audio_specific_config(config.sample_rate, config.channels));
            write_esds(&mut content, &asc, config.bit_rate);
            b"mp4a"
        }
        // Little-endian signed 16-bit PCM
        _ => b"sowt",
    };

    let mut entry = Vec::new();
    write_box(&mut entry, entry_type, &content);
    entry
}

fn write_descriptor(buf: &mut Vec<u8>, tag: u8, payload: &[u8]) {
    buf.push(tag);
    let len = payload.len() as u32;
    // Four-byte expandable size form
    buf.extend_from_slice(&[
        0x80 | ((len >> 21) & 0x7F) as u8,
        0x80 | ((len >> 14) & 0x7F) as u8,
        0x80 | ((len >> 7) & 0x7F) as u8,
        (len & 0x7F) as u8,
    ]);
    buf.extend_from_slice(payload);
}

fn write_esds(buf: &mut Vec<u8>, audio_specific_config: &[u8], bit_rate: u32) {
    let mut decoder_specific = Vec::new();
    write_descriptor(&mut decoder_specific, 0x05, audio_specific_config);

    let mut decoder_config = Vec::new();
    decoder_config.push(0x40); // objectTypeIndication: MPEG-4 audio
    decoder_config.push(0x15); // streamType audio << 2 | reserved
    decoder_config.extend_from_slice(&[0, 0, 0]); // bufferSizeDB
    decoder_config.extend_from_slice(&bit_rate.to_be_bytes()); // maxBitrate
    decoder_config.extend_from_slice(&bit_rate.to_be_bytes()); // avgBitrate
    decoder_config.extend_from_slice(&decoder_specific);

    let mut es = Vec::new();
    es.extend_from_slice(&2u16.to_be_bytes()); // ES_ID
    es.push(0); // flags
    write_descriptor(&mut es, 0x04, &decoder_config);
    write_descriptor(&mut es, 0x06, &[0x02]); // SLConfigDescriptor

    let mut content = Vec::new();
    full_box_header(&mut content, 0, 0);
    write_descriptor(&mut content, 0x03, &es);
    write_box(buf, b"esds", &content);
}

/// AAC-LC AudioSpecificConfig for a sample rate and channel count.
pub fn aac_audio_specific_config(sample_rate: u32, channels: u16) -> Vec<u8> {
    const RATES: [u32; 13] = [
        96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
    ];
    let index = RATES.iter().position(|&r| r == sample_rate).unwrap_or(3) as u16;
    let object_type: u16 = 2; // AAC-LC
    let config = (object_type << 11) | (index << 7) | ((channels & 0x0F) << 3);
    config.to_be_bytes().to_vec()
}

// ============================================================================
// Box Parser, for reading back written files
// ============================================================================

/// Parsed box header.
#[derive(Debug, Clone)]
pub struct BoxHeader {
    pub box_type: [u8; 4],
    pub offset: usize,
    pub size: usize,
    pub header_size: usize,
}

impl BoxHeader {
    /// Returns the content bytes (after the header) within the given data slice.
    pub fn content<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        let start = self.offset + self.header_size;
        let end = (self.offset + self.size).min(data.len());
        if start >= end {
            &[]
        } else {
            &data[start..end]
        }
    }
}

/// Iterate over the boxes at one nesting level.
///
/// Understands 64-bit (`size == 1`) and to-end-of-data (`size == 0`) sizes.
pub fn iter_boxes(data: &[u8]) -> Vec<BoxHeader> {
    let mut boxes = Vec::new();
    let mut offset = 0;
    while offset + 8 <= data.len() {
        let size32 = u32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as usize;
        let box_type: [u8; 4] = [
            data[offset + 4],
            data[offset + 5],
            data[offset + 6],
            data[offset + 7],
        ];
        let (size, header_size) = match size32 {
            0 => (data.len() - offset, 8),
            1 if offset + 16 <= data.len() => {
                let mut large = [0u8; 8];
                large.copy_from_slice(&data[offset + 8..offset + 16]);
                (u64::from_be_bytes(large) as usize, 16)
            }
            n => (n, 8),
        };
        if size < header_size {
            break;
        }
        boxes.push(BoxHeader {
            box_type,
            offset,
            size: size.min(data.len() - offset),
            header_size,
        });
        offset += size;
    }
    boxes
}

/// Find a specific box by type (non-recursive).
pub fn find_box(data: &[u8], box_type: &[u8; 4]) -> Option<BoxHeader> {
    iter_boxes(data)
        .into_iter()
        .find(|b| &b.box_type == box_type)
}

/// Find a box by navigating a path of nested container boxes.
/// Returns the content bytes of the final box in the path.
pub fn find_box_path<'a>(data: &'a [u8], path: &[&[u8; 4]]) -> Option<&'a [u8]> {
    let Some((first, rest)) = path.split_first() else {
        return Some(data);
    };
    let header = find_box(data, first)?;
    find_box_path(header.content(data), rest)
}
