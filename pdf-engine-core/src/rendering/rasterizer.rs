//! Draws a display list into a caller's bitmap with tiny-skia.
//!
//! Everything is painted into a scratch RGBA pixmap first and copied into the
//! target only when the whole list was drawn, so a cancelled render leaves
//! the target untouched.

use super::display_list::{ClipShape, DisplayList, DrawCommand, GlyphRun, StrokeStyle};
use super::glyph::GlyphSource;
use super::graphics_state::{concat, Color, FillRule, LineCap, LineJoin, Matrix, StrokeProps};
use super::path::{Path, PathElement};
use super::target::{CancellationToken, PageGeometry, RasterTarget, RenderOutcome};
use crate::core::config::RenderOptions;
use crate::core::error::{PDFError, PDFResult};
use crate::core::font::Font;
use crate::core::image::{DecodedImage, ImagePixels};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tiny_skia::{
    FillRule as SkiaFillRule, FilterQuality, IntSize, LineCap as SkiaLineCap,
    LineJoin as SkiaLineJoin, Mask,
    Paint, PathBuilder, Pixmap, PixmapPaint, Stroke, StrokeDash, Transform,
};
use tracing::{debug, trace};

// --- Conversion helpers ---

fn to_skia_transform(m: &Matrix) -> Transform {
    Transform::from_row(
        m[0] as f32,
        m[1] as f32,
        m[2] as f32,
        m[3] as f32,
        m[4] as f32,
        m[5] as f32,
    )
}

fn to_skia_line_cap(line_cap: LineCap) -> SkiaLineCap {
    match line_cap {
        LineCap::Butt => SkiaLineCap::Butt,
        LineCap::Round => SkiaLineCap::Round,
        LineCap::ProjectingSquare => SkiaLineCap::Square,
    }
}

fn to_skia_line_join(line_join: LineJoin) -> SkiaLineJoin {
    match line_join {
        LineJoin::Miter => SkiaLineJoin::Miter,
        LineJoin::Round => SkiaLineJoin::Round,
        LineJoin::Bevel => SkiaLineJoin::Bevel,
    }
}

fn to_skia_fill_rule(fill_rule: FillRule) -> SkiaFillRule {
    match fill_rule {
        FillRule::NonZero => SkiaFillRule::Winding,
        FillRule::EvenOdd => SkiaFillRule::EvenOdd,
    }
}

/// `width_scale` multiplies the line width and dash lengths.
fn to_skia_stroke(props: &StrokeProps, width_scale: f64) -> Stroke {
    let dash = if props.dash_array.is_empty() {
        None
    } else {
        // An odd count repeats the array to get on/off pairs.
        let mut intervals: Vec<f32> =
            props.dash_array.iter().map(|v| (v * width_scale) as f32).collect();
        if intervals.len() % 2 == 1 {
            intervals.extend_from_within(..);
        }
        StrokeDash::new(intervals, (props.dash_offset * width_scale) as f32)
    };
    Stroke {
        width: (props.line_width * width_scale) as f32,
        miter_limit: props.miter_limit as f32,
        line_cap: to_skia_line_cap(props.line_cap),
        line_join: to_skia_line_join(props.line_join),
        dash,
    }
}

fn to_skia_color(color: Color) -> tiny_skia::Color {
    let [r, g, b, a] = color.to_rgba8();
    tiny_skia::Color::from_rgba8(r, g, b, a)
}

fn to_skia_path(path: &Path) -> Option<tiny_skia::Path> {
    let mut builder = PathBuilder::new();
    for element in path.elements() {
        match *element {
            PathElement::MoveTo(x, y) => builder.move_to(x as f32, y as f32),
            PathElement::LineTo(x, y) => builder.line_to(x as f32, y as f32),
            PathElement::CurveTo(x1, y1, x2, y2, x, y) => {
                builder.cubic_to(x1 as f32, y1 as f32, x2 as f32, y2 as f32, x as f32, y as f32)
            }
            PathElement::ClosePath => builder.close(),
        }
    }
    builder.finish()
}

/// Geometric mean scale of a matrix, for line widths.
fn matrix_scale(m: &Matrix) -> f64 {
    (m[0] * m[3] - m[1] * m[2]).abs().sqrt()
}

/// Straight RGBA to the premultiplied pixmap layout; stencils take `color`.
fn image_pixmap(image: &DecodedImage, color: Color) -> Option<Pixmap> {
    let size = IntSize::from_wh(image.width, image.height)?;
    let premultiply = |v: u8, a: u8| ((u16::from(v) * u16::from(a) + 127) / 255) as u8;
    let data = match &image.pixels {
        ImagePixels::Rgba(rgba) => rgba
            .chunks_exact(4)
            .flat_map(|px| {
                let a = px[3];
                [premultiply(px[0], a), premultiply(px[1], a), premultiply(px[2], a), a]
            })
            .collect(),
        ImagePixels::Stencil(coverage) => {
            let [r, g, b, _] = Color { a: 1.0, ..color }.to_rgba8();
            coverage
                .iter()
                .flat_map(|&a| [premultiply(r, a), premultiply(g, a), premultiply(b, a), a])
                .collect()
        }
    };
    Pixmap::from_vec(data, size)
}

/// Renders `list` into `target`.
///
/// The page is placed with `geometry`, scaled by `options.scale` and shifted
/// by the options' offsets. Returns [`RenderOutcome::Cancelled`] without
/// touching the target when `cancel` fires before the last command.
pub fn rasterize(
    list: &DisplayList,
    geometry: PageGeometry,
    target: &mut RasterTarget<'_>,
    options: &RenderOptions,
    cancel: &CancellationToken,
) -> PDFResult<RenderOutcome> {
    target.check_format()?;
    let mut pixmap = Pixmap::new(target.width, target.height)
        .ok_or_else(|| {
            PDFError::InvalidTarget(format!("cannot allocate {}x{}", target.width, target.height))
        })?;
    let [r, g, b, a] = options.background;
    pixmap.fill(tiny_skia::Color::from_rgba8(r, g, b, a));

    let scale = f64::from(options.scale);
    let device = concat(
        &[
            scale,
            0.0,
            0.0,
            scale,
            -f64::from(options.offset_x),
            -f64::from(options.offset_y),
        ],
        &geometry.base_transform(),
    );
    debug!(
        width = target.width,
        height = target.height,
        format = %target.format,
        commands = list.len(),
        "rasterizing"
    );

    let mut rasterizer = Rasterizer {
        pixmap,
        device,
        mask: None,
        anti_alias: options.anti_alias,
        interpolate: options.interpolate_images,
        sources: FxHashMap::default(),
        outlines: FxHashMap::default(),
    };
    for command in &list.commands {
        if cancel.is_cancelled() {
            debug!("render cancelled");
            return Ok(RenderOutcome::Cancelled);
        }
        rasterizer.draw(command);
    }
    if cancel.is_cancelled() {
        return Ok(RenderOutcome::Cancelled);
    }

    target.write_rgba(rasterizer.pixmap.data())?;
    Ok(RenderOutcome::Completed)
}

/// Per-render drawing state.
struct Rasterizer<'l> {
    pixmap: Pixmap,
    /// Page space to device pixels.
    device: Matrix,
    /// `None` means unclipped.
    mask: Option<Mask>,
    anti_alias: bool,
    interpolate: bool,
    /// Parsed font programs keyed by font identity.
    sources: FxHashMap<usize, Option<GlyphSource<'l>>>,
    /// Glyph outlines in em units keyed by font identity and code.
    outlines: FxHashMap<(usize, u32), Option<tiny_skia::Path>>,
}

impl<'l> Rasterizer<'l> {
    fn draw(&mut self, command: &'l DrawCommand) {
        match command {
            DrawCommand::DrawPath {
                path,
                transform,
                fill,
                stroke,
            } => {
                let Some(sk_path) = to_skia_path(path) else {
                    return;
                };
                let transform = to_skia_transform(&concat(&self.device, transform));
                if let Some(fill) = fill {
                    let paint = self.paint(fill.color);
                    self.pixmap.fill_path(
                        &sk_path,
                        &paint,
                        to_skia_fill_rule(fill.rule),
                        transform,
                        self.mask.as_ref(),
                    );
                }
                if let Some(stroke) = stroke {
                    self.stroke(&sk_path, stroke, 1.0, transform);
                }
            }
            DrawCommand::GlyphRun(run) => self.draw_glyph_run(run),
            DrawCommand::DrawImage {
                image,
                transform,
                color,
                interpolate,
            } => self.draw_image(image, transform, *color, *interpolate),
            DrawCommand::SetClip(shapes) => self.set_clip(shapes),
        }
    }

    fn paint(&self, color: Color) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color(to_skia_color(color));
        paint.anti_alias = self.anti_alias;
        paint
    }

    fn stroke(
        &mut self,
        path: &tiny_skia::Path,
        style: &StrokeStyle,
        width_scale: f64,
        transform: Transform,
    ) {
        let paint = self.paint(style.color);
        let stroke = to_skia_stroke(&style.props, width_scale);
        self.pixmap
            .stroke_path(path, &paint, &stroke, transform, self.mask.as_ref());
    }

    /// Outline of one glyph in em units, cached for the rest of the render.
    fn glyph_outline(&mut self, font: &'l Arc<Font>, code: u32) -> Option<tiny_skia::Path> {
        let key = Arc::as_ptr(font) as usize;
        if let Some(outline) = self.outlines.get(&(key, code)) {
            return outline.clone();
        }
        let source = self
            .sources
            .entry(key)
            .or_insert_with(|| {
                let source = GlyphSource::new(font);
                if source.is_none() {
                    trace!(font = %font.name, "no usable font program");
                }
                source
            });
        let outline = source.as_ref().and_then(|s| s.outline(code));
        self.outlines.insert((key, code), outline.clone());
        outline
    }

    /// Glyphs of a run merged into one path in page space.
    fn run_path(&mut self, run: &'l GlyphRun) -> Option<tiny_skia::Path> {
        let mut builder = PathBuilder::new();
        for glyph in &run.glyphs {
            let Some(outline) = self.glyph_outline(&run.font, glyph.code) else {
                continue;
            };
            let placed = concat(&glyph.transform, &run.font.font_matrix().map(|v| v * 1000.0));
            if let Some(path) = outline.transform(to_skia_transform(&placed)) {
                builder.push_path(&path);
            }
        }
        builder.finish()
    }

    fn draw_glyph_run(&mut self, run: &'l GlyphRun) {
        if run.fill.is_none() && run.stroke.is_none() {
            return;
        }
        let Some(path) = self.run_path(run) else {
            return;
        };
        let transform = to_skia_transform(&self.device);
        if let Some(color) = run.fill {
            let paint = self.paint(color);
            self.pixmap
                .fill_path(&path, &paint, SkiaFillRule::Winding, transform, self.mask.as_ref());
        }
        if let Some(stroke) = &run.stroke {
            // The path is already in page space; the line width is in user space.
            self.stroke(&path, stroke, matrix_scale(&run.ctm), transform);
        }
    }

    fn draw_image(
        &mut self,
        image: &DecodedImage,
        transform: &Matrix,
        color: Color,
        interpolate: bool,
    ) {
        let Some(pixmap) = image_pixmap(image, color) else {
            return;
        };
        let (w, h) = (f64::from(image.width), f64::from(image.height));
        // Image row 0 is the top of the unit square.
        let unit = [1.0 / w, 0.0, 0.0, -1.0 / h, 0.0, 1.0];
        let full = concat(&concat(&self.device, transform), &unit);
        // Stencil masks stay sharp unless they ask for smoothing.
        let smooth = self.interpolate && (interpolate || !image.is_stencil());
        let paint = PixmapPaint {
            opacity: color.a.clamp(0.0, 1.0) as f32,
            quality: if smooth {
                FilterQuality::Bilinear
            } else {
                FilterQuality::Nearest
            },
            ..PixmapPaint::default()
        };
        self.pixmap
            .draw_pixmap(
                0,
                0,
                pixmap.as_ref(),
                &paint,
                to_skia_transform(&full),
                self.mask.as_ref(),
            );
    }

    fn set_clip(&mut self, shapes: &'l Arc<Vec<ClipShape>>) {
        if shapes.is_empty() {
            self.mask = None;
            return;
        }
        let Some(mut mask) = Mask::new(self.pixmap.width(), self.pixmap.height()) else {
            return;
        };
        for (i, shape) in shapes.iter().enumerate() {
            let (path, rule, transform) = match shape {
                ClipShape::Path { path, rule, transform } => {
                    (to_skia_path(path), to_skia_fill_rule(*rule), concat(&self.device, transform))
                }
                ClipShape::Text(runs) => {
                    let mut builder = PathBuilder::new();
                    for run in runs {
                        if let Some(path) = self.run_path(run) {
                            builder.push_path(&path);
                        }
                    }
                    (builder.finish(), SkiaFillRule::Winding, self.device)
                }
            };
            let Some(path) = path else {
                // Clipping to nothing hides everything.
                mask = match Mask::new(self.pixmap.width(), self.pixmap.height()) {
                    Some(empty) => empty,
                    None => return,
                };
                break;
            };
            let transform = to_skia_transform(&transform);
            if i == 0 {
                mask.fill_path(&path, rule, self.anti_alias, transform);
            } else {
                mask.intersect_path(&path, rule, self.anti_alias, transform);
            }
        }
        self.mask = Some(mask);
    }
}
