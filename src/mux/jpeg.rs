//! Image-sequence writer: one numbered JPEG file per frame.

use std::fs;
use std::path::{Path, PathBuf};

use super::{MuxError, Muxer};
use crate::encoder::AccessUnit;
use crate::sample::MediaKind;

/// Writes `<dir>/1.jpg`, `<dir>/2.jpg`, ...
pub struct JpegSequenceMuxer {
    dir: PathBuf,
    count: u64,
}

impl JpegSequenceMuxer {
    /// Create (or reuse) the output directory.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, MuxError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, count: 0 })
    }
}

impl Muxer for JpegSequenceMuxer {
    fn write(&mut self, kind: MediaKind, unit: AccessUnit) -> Result<(), MuxError> {
        if kind != MediaKind::Video {
            return Err(MuxError::UnexpectedTrack(kind));
        }
        self.count += 1;
        fs::write(self.dir.join(format!("{}.jpg", self.count)), &unit.data)?;
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<PathBuf, MuxError> {
        if self.count == 0 {
            return Err(MuxError::EmptyTrack("video"));
        }
        tracing::info!("JPEG: wrote {} images to {}", self.count, self.dir.display());
        Ok(self.dir)
    }
}
