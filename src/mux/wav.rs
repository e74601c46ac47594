//! RIFF/WAVE writer for 16-bit PCM.
//!
//! The 44-byte header is written with zero sizes and patched at finalize. A
//! file abandoned before finalize keeps the placeholder sizes.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{MuxError, Muxer};
use crate::encoder::AccessUnit;
use crate::sample::MediaKind;

/// Size of the canonical PCM WAV header.
pub const HEADER_SIZE: usize = 44;

/// Streaming WAV muxer.
pub struct WavMuxer {
    path: PathBuf,
    file: BufWriter<File>,
    channels: u16,
    data_bytes: u64,
}

impl WavMuxer {
    pub fn create(path: impl AsRef<Path>, sample_rate: u32, channels: u16) -> Result<Self, MuxError> {
        let path = path.as_ref().to_path_buf();
        let placeholder = header(sample_rate, channels, 0)?;
        let mut file = BufWriter::new(File::create(&path)?);
        file.write_all(&placeholder)?;
        Ok(Self {
            path,
            file,
            channels,
            data_bytes: 0,
        })
    }
}

/// Build a PCM16 WAV header for `data_bytes` of sample data.
///
/// Fails if the byte rate does not fit the header's 32-bit field.
pub fn header(sample_rate: u32, channels: u16, data_bytes: u32) -> Result<[u8; HEADER_SIZE], MuxError> {
    let invalid = || {
        MuxError::InvalidParameter(format!(
            "{} Hz x{} does not fit a WAV header",
            sample_rate, channels
        ))
    };
    let block_align = channels.checked_mul(2).ok_or_else(invalid)?;
    let byte_rate = sample_rate
        .checked_mul(u32::from(block_align))
        .ok_or_else(invalid)?;

    let mut h = [0u8; HEADER_SIZE];
    h[0..4].copy_from_slice(b"RIFF");
    h[4..8].copy_from_slice(&data_bytes.saturating_add(36).to_le_bytes());
    h[8..12].copy_from_slice(b"WAVE");
    h[12..16].copy_from_slice(b"fmt ");
    h[16..20].copy_from_slice(&16u32.to_le_bytes()); // fmt chunk size
    h[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    h[22..24].copy_from_slice(&channels.to_le_bytes());
    h[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    h[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    h[32..34].copy_from_slice(&block_align.to_le_bytes());
    h[34..36].copy_from_slice(&16u16.to_le_bytes()); // bits per sample
    h[36..40].copy_from_slice(b"data");
    h[40..44].copy_from_slice(&data_bytes.to_le_bytes());
    Ok(h)
}

/// Fields read back from a WAV header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavInfo {
    pub riff_size: u32,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

/// Parse a canonical 44-byte WAV header.
pub fn parse_header(data: &[u8]) -> Option<WavInfo> {
    if data.len() < HEADER_SIZE || &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return None;
    }
    let u16_at = |at: usize| u16::from_le_bytes([data[at], data[at + 1]]);
    let u32_at = |at: usize| u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
    Some(WavInfo {
        riff_size: u32_at(4),
        channels: u16_at(22),
        sample_rate: u32_at(24),
        bits_per_sample: u16_at(34),
        data_size: u32_at(40),
    })
}

impl Muxer for WavMuxer {
    fn write(&mut self, kind: MediaKind, unit: AccessUnit) -> Result<(), MuxError> {
        if kind != MediaKind::Audio {
            return Err(MuxError::UnexpectedTrack(kind));
        }
        if unit.data.len() % (usize::from(self.channels) * 2) != 0 {
            return Err(MuxError::InvalidUnit(format!(
                "{} PCM bytes is not a whole number of frames",
                unit.data.len()
            )));
        }
        self.file.write_all(&unit.data)?;
        self.data_bytes += unit.data.len() as u64;
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<PathBuf, MuxError> {
        if self.data_bytes == 0 {
            return Err(MuxError::EmptyTrack("audio"));
        }
        let riff_size = u32::try_from(self.data_bytes + 36)
            .map_err(|_| MuxError::InvalidUnit("WAV data exceeds 4 GiB".to_string()))?;
        let data_bytes = riff_size - 36;

        self.file.seek(SeekFrom::Start(4))?;
        self.file.write_all(&riff_size.to_le_bytes())?;
        self.file.seek(SeekFrom::Start(40))?;
        self.file.write_all(&data_bytes.to_le_bytes())?;
        self.file.flush()?;

        tracing::info!("WAV: finalized {} ({} bytes)", self.path.display(), data_bytes);
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(bytes: usize) -> AccessUnit {
        AccessUnit {
            data: vec![0x11; bytes],
            timestamp: 0,
            duration: 0,
            keyframe: true,
            frame_count: (bytes / 4) as u32,
            side_data: None,
        }
    }

    #[test]
    fn test_wav_header_patched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        let mut muxer = Box::new(WavMuxer::create(&path, 44_100, 2).unwrap());
        muxer.write(MediaKind::Audio, pcm(400)).unwrap();
        muxer.write(MediaKind::Audio, pcm(100)).unwrap();
        let data = std::fs::read(muxer.finalize().unwrap()).unwrap();

        let info = parse_header(&data).unwrap();
        assert_eq!(info.data_size, 500);
        assert_eq!(info.riff_size, 536);
        assert_eq!(info.channels, 2);
        assert_eq!(info.sample_rate, 44_100);
        assert_eq!(info.bits_per_sample, 16);
        assert_eq!(data.len(), HEADER_SIZE + 500);
    }

    #[test]
    fn test_wav_rejects_video() {
        let dir = tempfile::tempdir().unwrap();
        let mut muxer = WavMuxer::create(dir.path().join("v.wav"), 8_000, 1).unwrap();
        assert!(matches!(
            muxer.write(MediaKind::Video, pcm(4)),
            Err(MuxError::UnexpectedTrack(MediaKind::Video))
        ));
    }

    #[test]
    fn test_wav_byte_rate_overflow_is_error() {
        assert!(matches!(
            header(3_000_000_000, 2, 0),
            Err(MuxError::InvalidParameter(_))
        ));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.wav");
        assert!(WavMuxer::create(&path, u32::MAX, 8).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_wav_empty_fails() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = Box::new(WavMuxer::create(dir.path().join("e.wav"), 8_000, 1).unwrap());
        assert!(matches!(muxer.finalize(), Err(MuxError::EmptyTrack("audio"))));
    }
}
