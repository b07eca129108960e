//! Options for opening and rendering documents.

use std::path::PathBuf;

/// Options controlling how a document is opened and the resource limits
/// applied while it is used.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Longest chain of references followed by `resolve` (default: 32).
    pub max_resolution_depth: usize,
    /// Deepest page tree walked (default: 32).
    pub max_page_tree_depth: usize,
    /// Rebuild the cross-reference table by scanning when it is unusable
    /// (default: true).
    pub recovery: bool,
    /// Parsed fonts kept per document (default: 64).
    pub font_cache_capacity: usize,
    /// Decoded images kept per document (default: 32).
    pub image_cache_capacity: usize,
    /// Deepest nesting of form XObjects (default: 12).
    pub max_form_depth: usize,
    /// Directories searched for the standard fonts when a document does not
    /// embed them (default: common system font directories).
    pub font_search_dirs: Vec<PathBuf>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            max_resolution_depth: 32,
            max_page_tree_depth: 32,
            recovery: true,
            font_cache_capacity: 64,
            image_cache_capacity: 32,
            max_form_depth: 12,
            font_search_dirs: default_font_dirs(),
        }
    }
}

impl OpenOptions {
    /// Options that fail instead of scanning a damaged file.
    pub fn strict() -> Self {
        Self {
            recovery: false,
            ..Self::default()
        }
    }

    pub fn with_font_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.font_search_dirs = dirs;
        self
    }
}

fn default_font_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = [
        "/usr/share/fonts",
        "/usr/local/share/fonts",
        "/System/Library/Fonts",
        "/Library/Fonts",
        "C:\\Windows\\Fonts",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();

    if let Some(home) = std::env::var_os("HOME") {
        dirs.push(PathBuf::from(home).join(".fonts"));
    }
    dirs
}

/// Options for a single render call.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    /// Device pixels per PDF point (default: 1.0).
    pub scale: f32,
    /// Horizontal offset of the target within the full page image, in device
    /// pixels. Used to render a tile of a larger page (default: 0).
    pub offset_x: f32,
    /// Vertical offset, as `offset_x` (default: 0).
    pub offset_y: f32,
    /// Anti-alias paths and glyphs (default: true).
    pub anti_alias: bool,
    /// Smooth scaled images (default: true).
    pub interpolate_images: bool,
    /// Colour the target is cleared to before drawing, as RGBA
    /// (default: opaque white).
    pub background: [u8; 4],
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            anti_alias: true,
            interpolate_images: true,
            background: [255, 255, 255, 255],
        }
    }
}

impl RenderOptions {
    pub fn with_scale(scale: f32) -> Self {
        Self {
            scale,
            ..Self::default()
        }
    }

    /// Scale that fits a page of `page_width` x `page_height` points into
    /// `width` x `height` pixels, preserving aspect ratio.
    pub fn fit(page_width: f64, page_height: f64, width: u32, height: u32) -> Self {
        let sx = f64::from(width) / page_width.max(1.0);
        let sy = f64::from(height) / page_height.max(1.0);
        Self::with_scale(sx.min(sy) as f32)
    }
}
