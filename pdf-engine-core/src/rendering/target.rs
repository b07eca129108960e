//! Caller-owned render targets and render control.

use crate::core::error::{PDFError, PDFResult};
use crate::core::page::Rect;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Bitmap pixel layouts a caller may hand over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit coverage only.
    Alpha8,
    /// 16-bit little-endian `rrrrrggg gggbbbbb`.
    Rgb565,
    /// 16-bit, four bits per channel.
    Argb4444,
    /// Bytes R, G, B, A with premultiplied alpha.
    Argb8888,
    /// Four half floats per pixel.
    RgbaF16,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Alpha8 => 1,
            PixelFormat::Rgb565 | PixelFormat::Argb4444 => 2,
            PixelFormat::Argb8888 => 4,
            PixelFormat::RgbaF16 => 8,
        }
    }

    /// Whether the rasterizer can write this format.
    pub fn is_supported(self) -> bool {
        matches!(self, PixelFormat::Rgb565 | PixelFormat::Argb8888)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Alpha8 => "ALPHA_8",
            PixelFormat::Rgb565 => "RGB_565",
            PixelFormat::Argb4444 => "ARGB_4444",
            PixelFormat::Argb8888 => "ARGB_8888",
            PixelFormat::RgbaF16 => "RGBA_F16",
        };
        f.write_str(name)
    }
}

/// A pixel buffer owned by the caller. The engine writes into it during a
/// render call and keeps no reference afterwards.
#[derive(Debug)]
pub struct RasterTarget<'a> {
    pub width: u32,
    pub height: u32,
    /// Bytes per row.
    pub stride: usize,
    pub format: PixelFormat,
    buffer: &'a mut [u8],
}

impl<'a> RasterTarget<'a> {
    /// Wraps `buffer` with tightly packed rows.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        buffer: &'a mut [u8],
    ) -> PDFResult<Self> {
        let stride = width as usize * format.bytes_per_pixel();
        Self::with_stride(width, height, stride, format, buffer)
    }

    pub fn with_stride(
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        buffer: &'a mut [u8],
    ) -> PDFResult<Self> {
        if width == 0 || height == 0 {
            return Err(PDFError::InvalidTarget(format!("empty target {}x{}", width, height)));
        }
        let row = width as usize * format.bytes_per_pixel();
        if stride < row {
            return Err(PDFError::InvalidTarget(format!(
                "stride {} shorter than a row of {} bytes",
                stride, row
            )));
        }
        let needed = stride * (height as usize - 1) + row;
        if buffer.len() < needed {
            return Err(PDFError::InvalidTarget(format!(
                "buffer holds {} bytes, {}x{} {} needs {}",
                buffer.len(),
                width,
                height,
                format,
                needed
            )));
        }
        Ok(RasterTarget {
            width,
            height,
            stride,
            format,
            buffer,
        })
    }

    pub fn check_format(&self) -> PDFResult<()> {
        if self.format.is_supported() {
            Ok(())
        } else {
            Err(PDFError::UnsupportedPixelFormat(self.format.to_string()))
        }
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer[..]
    }

    /// Writes premultiplied RGBA rows of `width` pixels into the buffer.
    pub(crate) fn write_rgba(&mut self, rgba: &[u8]) -> PDFResult<()> {
        let width = self.width as usize;
        for (y, src) in rgba.chunks_exact(width * 4).take(self.height as usize).enumerate() {
            let start = y * self.stride;
            match self.format {
                PixelFormat::Argb8888 => {
                    self.buffer[start..start + width * 4].copy_from_slice(src);
                }
                PixelFormat::Rgb565 => {
                    let dst = &mut self.buffer[start..start + width * 2];
                    for (px, out) in src.chunks_exact(4).zip(dst.chunks_exact_mut(2)) {
                        out.copy_from_slice(&rgb565(px[0], px[1], px[2]).to_le_bytes());
                    }
                }
                other => return Err(PDFError::UnsupportedPixelFormat(other.to_string())),
            }
        }
        Ok(())
    }
}

/// Packs an opaque colour, rounding each channel to the nearest level.
pub fn rgb565(r: u8, g: u8, b: u8) -> u16 {
    let r = (u16::from(r) * 31 + 127) / 255;
    let g = (u16::from(g) * 63 + 127) / 255;
    let b = (u16::from(b) * 31 + 127) / 255;
    (r << 11) | (g << 5) | b
}

/// Cooperative cancellation flag shared between a render call and whoever
/// wants to stop it.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Every command was drawn and the target holds the page.
    Completed,
    /// The token was cancelled; the target was not touched.
    Cancelled,
}

/// What the rasterizer needs to know about the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub view_box: Rect,
    /// Clockwise, one of 0, 90, 180, 270.
    pub rotation: u16,
}

impl PageGeometry {
    /// Maps default user space onto device pixels at scale 1: y flipped,
    /// rotated, with the view box corner at the origin.
    ///
    /// Based on PDF.js's PageViewport.
    pub fn base_transform(&self) -> [f64; 6] {
        let Rect { x0, y0, x1, y1 } = self.view_box;
        match self.rotation {
            90 => [0.0, 1.0, 1.0, 0.0, -y0, -x0],
            180 => [-1.0, 0.0, 0.0, 1.0, x1, -y0],
            270 => [0.0, -1.0, -1.0, 0.0, y1, x1],
            _ => [1.0, 0.0, 0.0, -1.0, -x0, y1],
        }
    }

    /// Size of the rotated page in points.
    pub fn size(&self) -> (f64, f64) {
        let (w, h) = (self.view_box.width(), self.view_box.height());
        if self.rotation % 180 == 90 {
            (h, w)
        } else {
            (w, h)
        }
    }
}
