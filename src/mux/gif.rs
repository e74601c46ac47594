//! Animated GIF writer.
//!
//! GIF is append-only: frames are LZW-compressed and written as they arrive,
//! and finalize only writes the trailer. The loop count is always infinite.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ::gif::{DisposalMethod, Encoder, Frame, Repeat};
use framecorder_codec::SideData;

use super::{MuxError, Muxer};
use crate::encoder::AccessUnit;
use crate::pacing::gif_delay_units;
use crate::sample::MediaKind;

/// Streaming GIF muxer fed with palettized frames.
pub struct GifMuxer {
    path: PathBuf,
    encoder: Encoder<BufWriter<File>>,
    width: u16,
    height: u16,
    frames: u64,
}

impl GifMuxer {
    pub fn create(path: impl AsRef<Path>, width: u16, height: u16) -> Result<Self, MuxError> {
        let path = path.as_ref().to_path_buf();
        let file = BufWriter::new(File::create(&path)?);
        // Every frame carries its own local palette
        let mut encoder = Encoder::new(file, width, height, &[])?;
        encoder.set_repeat(Repeat::Infinite)?;
        Ok(Self {
            path,
            encoder,
            width,
            height,
            frames: 0,
        })
    }
}

impl Muxer for GifMuxer {
    fn write(&mut self, kind: MediaKind, unit: AccessUnit) -> Result<(), MuxError> {
        if kind != MediaKind::Video {
            return Err(MuxError::UnexpectedTrack(kind));
        }
        let Some(SideData::Palette {
            colors,
            transparent,
        }) = unit.side_data
        else {
            return Err(MuxError::MissingConfig("GIF frame palette"));
        };
        let expected = usize::from(self.width) * usize::from(self.height);
        if unit.data.len() != expected {
            return Err(MuxError::InvalidUnit(format!(
                "expected {} palette indices, got {}",
                expected,
                unit.data.len()
            )));
        }

        let frame = Frame {
            width: self.width,
            height: self.height,
            delay: gif_delay_units(unit.duration),
            dispose: DisposalMethod::Keep,
            transparent,
            palette: Some(colors),
            buffer: Cow::Owned(unit.data),
            ..Frame::default()
        };
        self.encoder.write_frame(&frame)?;
        self.frames += 1;
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<PathBuf, MuxError> {
        let GifMuxer {
            path,
            encoder,
            frames,
            ..
        } = *self;
        if frames == 0 {
            return Err(MuxError::EmptyTrack("video"));
        }
        // Writes the trailer
        let mut file = encoder.into_inner()?;
        file.flush()?;
        tracing::info!("GIF: finalized {} ({} frames)", path.display(), frames);
        Ok(path)
    }
}
