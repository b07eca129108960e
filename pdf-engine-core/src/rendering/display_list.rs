//! Draw commands produced by the interpreter.
//!
//! Coordinates are in default user space (page space, y up). Mapping onto a
//! device is left to the rasterizer, so one display list serves any scale or
//! rotation.

use super::graphics_state::{Color, FillRule, Matrix, StrokeProps, TextRenderingMode};
use super::path::Path;
use crate::core::font::Font;
use crate::core::image::DecodedImage;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct FillStyle {
    pub color: Color,
    pub rule: FillRule,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrokeStyle {
    pub color: Color,
    pub props: StrokeProps,
}

/// One shown glyph.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub code: u32,
    /// Maps text space, where one unit is one em of the font size, to page
    /// space.
    pub transform: Matrix,
    pub unicode: Option<String>,
}

/// Glyphs shown by one text operator.
#[derive(Debug, Clone)]
pub struct GlyphRun {
    pub font: Arc<Font>,
    pub glyphs: Vec<Glyph>,
    pub render_mode: TextRenderingMode,
    /// `None` when the render mode does not fill.
    pub fill: Option<Color>,
    /// `None` when the render mode does not stroke.
    pub stroke: Option<StrokeStyle>,
    /// CTM in effect, for scaling the stroke width.
    pub ctm: Matrix,
}

impl GlyphRun {
    /// Text of the run, as far as the font maps it.
    pub fn text(&self) -> String {
        self.glyphs.iter().filter_map(|g| g.unicode.as_deref()).collect()
    }
}

impl PartialEq for GlyphRun {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.font, &other.font)
            && self.glyphs == other.glyphs
            && self.render_mode == other.render_mode
            && self.fill == other.fill
            && self.stroke == other.stroke
            && self.ctm == other.ctm
    }
}

/// One of the shapes intersected to form a clip.
#[derive(Debug, Clone, PartialEq)]
pub enum ClipShape {
    /// A path in the coordinate system given by `transform`.
    Path {
        path: Path,
        rule: FillRule,
        transform: Matrix,
    },
    /// The union of glyph outlines shown with a clipping render mode.
    Text(Vec<GlyphRun>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    /// Fills and/or strokes `path`, whose points are mapped by `transform`.
    DrawPath {
        path: Path,
        transform: Matrix,
        fill: Option<FillStyle>,
        stroke: Option<StrokeStyle>,
    },
    GlyphRun(GlyphRun),
    /// Paints `image` into the unit square mapped by `transform`.
    DrawImage {
        image: Arc<DecodedImage>,
        transform: Matrix,
        /// Paint for stencil masks; the alpha applies to any image.
        color: Color,
        interpolate: bool,
    },
    /// Replaces the clip for the commands that follow. The clip is the
    /// intersection of the shapes; no shapes means no clipping.
    SetClip(Arc<Vec<ClipShape>>),
}

impl fmt::Display for DrawCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawCommand::DrawPath { path, fill, stroke, .. } => {
                let mode = match (fill, stroke) {
                    (Some(_), Some(_)) => "fill+stroke",
                    (Some(_), None) => "fill",
                    (None, Some(_)) => "stroke",
                    (None, None) => "none",
                };
                write!(f, "draw-path {} [{} elements]", mode, path.len())?;
                if let Some((x0, y0, x1, y1)) = path.bounding_box() {
                    write!(f, " bbox {:.1} {:.1} {:.1} {:.1}", x0, y0, x1, y1)?;
                }
                Ok(())
            }
            DrawCommand::GlyphRun(run) => write!(
                f,
                "glyph-run {} [{} glyphs] {:?}",
                run.font.name,
                run.glyphs.len(),
                run.text()
            ),
            DrawCommand::DrawImage { image, transform, .. } => write!(
                f,
                "draw-image {}x{}{} at {:.1} {:.1}",
                image.width,
                image.height,
                if image.is_stencil() { " stencil" } else { "" },
                transform[4],
                transform[5]
            ),
            DrawCommand::SetClip(shapes) => write!(f, "set-clip [{} shapes]", shapes.len()),
        }
    }
}

/// Interpreter output: what to draw, and what went wrong on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayList {
    pub commands: Vec<DrawCommand>,
    pub warnings: Vec<String>,
}

impl DisplayList {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Text of every glyph run, one run per line.
    pub fn text(&self) -> String {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::GlyphRun(run) => Some(run.text()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
