//! Video frame types and conversions.

use crate::{CodecError, PixelFormat, VideoFrameData};

/// A video frame with pixel data.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format of the frame data.
    pub pixel_format: PixelFormat,
    /// Raw pixel data.
    pub data: Vec<u8>,
    /// Frame timestamp in microseconds.
    pub timestamp_us: u64,
}

impl VideoFrame {
    /// Create a new video frame.
    #[must_use]
    pub fn new(
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        data: Vec<u8>,
        timestamp_us: u64,
    ) -> Self {
        Self {
            width,
            height,
            pixel_format,
            data,
            timestamp_us,
        }
    }

    /// Create a frame from RGBA data.
    #[must_use]
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>, timestamp_us: u64) -> Self {
        Self::new(width, height, PixelFormat::Rgba, data, timestamp_us)
    }

    /// Expected data size for the current dimensions and pixel format.
    #[must_use]
    pub fn expected_data_size(&self) -> usize {
        expected_frame_size(self.width, self.height, self.pixel_format)
    }

    /// Convert this frame to I420 format.
    ///
    /// If the frame is already I420, returns a clone.
    pub fn to_i420(&self) -> Result<VideoFrame, CodecError> {
        match self.pixel_format {
            PixelFormat::I420 => Ok(self.clone()),
            PixelFormat::Rgba => {
                let i420 = rgba_to_i420(&self.data, self.width, self.height)?;
                Ok(VideoFrame::new(
                    self.width,
                    self.height,
                    PixelFormat::I420,
                    i420,
                    self.timestamp_us,
                ))
            }
            PixelFormat::Nv12 => Err(CodecError::UnsupportedPixelFormat),
        }
    }
}

impl VideoFrameData for VideoFrame {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }
}

/// Calculate expected frame size for given dimensions and format.
#[must_use]
pub fn expected_frame_size(width: u32, height: u32, format: PixelFormat) -> usize {
    let pixels = width as usize * height as usize;
    match format {
        PixelFormat::Rgba => pixels * 4,
        PixelFormat::Nv12 | PixelFormat::I420 => {
            let chroma = width.div_ceil(2) as usize * height.div_ceil(2) as usize;
            pixels + chroma * 2
        }
    }
}

// ============================================================================
// Color conversion functions
// ============================================================================

/// Convert RGBA to I420 (BT.601, 2x2 averaged chroma).
///
/// Odd widths/heights replicate the last row/column into the chroma block.
pub fn rgba_to_i420(rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CodecError> {
    let w = width as usize;
    let h = height as usize;
    let expected = w * h * 4;
    if rgba.len() != expected {
        return Err(CodecError::ConversionError(format!(
            "RGBA data size mismatch: expected {}, got {}",
            expected,
            rgba.len()
        )));
    }

    let y_size = w * h;
    let cw = w.div_ceil(2);
    let ch = h.div_ceil(2);
    let mut i420 = vec![0u8; y_size + cw * ch * 2];

    // Y plane
    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) * 4;
            let r = rgba[idx] as i32;
            let g = rgba[idx + 1] as i32;
            let b = rgba[idx + 2] as i32;

            let y_val = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
            i420[y * w + x] = y_val.clamp(0, 255) as u8;
        }
    }

    // U and V planes (subsampled 2x2)
    let u_offset = y_size;
    let v_offset = y_size + cw * ch;
    for cy in 0..ch {
        for cx in 0..cw {
            let mut r_sum = 0i32;
            let mut g_sum = 0i32;
            let mut b_sum = 0i32;

            for dy in 0..2 {
                for dx in 0..2 {
                    let py = (cy * 2 + dy).min(h - 1);
                    let px = (cx * 2 + dx).min(w - 1);
                    let idx = (py * w + px) * 4;
                    r_sum += rgba[idx] as i32;
                    g_sum += rgba[idx + 1] as i32;
                    b_sum += rgba[idx + 2] as i32;
                }
            }

            let r = r_sum / 4;
            let g = g_sum / 4;
            let b = b_sum / 4;

            let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
            let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;

            i420[u_offset + cy * cw + cx] = u.clamp(0, 255) as u8;
            i420[v_offset + cy * cw + cx] = v.clamp(0, 255) as u8;
        }
    }

    Ok(i420)
}
