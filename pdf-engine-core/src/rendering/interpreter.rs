//! Content stream interpreter.
//!
//! Replays a page's operators against a graphics state stack and records
//! what they draw as a [`DisplayList`]. Problems with a single operator are
//! recorded as warnings and interpretation carries on with the next one.
//!
//! Based on PDF.js's evaluator.js and canvas.js.

use super::display_list::{
    ClipShape, DisplayList, DrawCommand, FillStyle, Glyph, GlyphRun, StrokeStyle,
};
use super::graphics_state::{
    concat, matrix_from, translate, Color, ColorState, FillRule, GraphicsState, LineCap, LineJoin,
    Matrix, TextRenderingMode, IDENTITY,
};
use super::path::Path;
use crate::core::color_space::ColorSpace;
use crate::core::config::OpenOptions;
use crate::core::content_stream::{ContentStream, OpCode, Operation};
use crate::core::document::ResourceCache;
use crate::core::error::{PDFError, PDFResult};
use crate::core::font::{Font, FontKind};
use crate::core::image::DecodedImage;
use crate::core::object_store::ObjectStore;
use crate::core::page::Rect;
use crate::core::parser::{PDFDict, PDFObject};
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// Nested `q` deeper than this is ignored.
const MAX_SAVE_DEPTH: usize = 4096;

/// Advance, in thousandths of an em, for glyphs nothing gives a width for.
const DEFAULT_ADVANCE: f64 = 500.0;

/// Vertical origin of glyphs in vertical fonts (the `/DW2` default).
const VERTICAL_ORIGIN_Y: f64 = 0.88;

/// Extent of the area painted by `sh` when the shading has no `/BBox`.
const SHADING_EXTENT: f64 = 1.0e5;

fn operand_error(op: &Operation, expected: &str) -> PDFError {
    PDFError::content_stream_error(format!(
        "{} expects {}, got {} operands",
        op.op,
        expected,
        op.args.len()
    ))
}

/// The last `N` operands as numbers.
fn numbers<const N: usize>(op: &Operation) -> PDFResult<[f64; N]> {
    let start = op
        .args
        .len()
        .checked_sub(N)
        .ok_or_else(|| operand_error(op, &format!("{} numbers", N)))?;
    let mut out = [0.0; N];
    for (slot, arg) in out.iter_mut().zip(&op.args[start..]) {
        *slot = arg
            .as_number()
            .filter(|n| n.is_finite())
            .ok_or_else(|| operand_error(op, &format!("{} numbers", N)))?;
    }
    Ok(out)
}

fn name_operand(op: &Operation) -> PDFResult<&str> {
    op.args
        .iter()
        .rev()
        .find_map(PDFObject::as_name)
        .ok_or_else(|| operand_error(op, "a name"))
}

/// Interprets content streams of one document.
pub struct Interpreter<'a> {
    store: &'a ObjectStore,
    options: &'a OpenOptions,
    cache: &'a ResourceCache,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    path: Path,
    pending_clip: Option<FillRule>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    /// Runs shown with a clipping render mode in the current text object.
    text_clip: Option<Vec<GlyphRun>>,
    /// Clip most recently handed to the display list.
    emitted_clip: Arc<Vec<ClipShape>>,
    form_depth: usize,
    reported_fonts: FxHashSet<usize>,
    pattern_warned: bool,
    list: DisplayList,
}

impl<'a> Interpreter<'a> {
    pub fn new(store: &'a ObjectStore, options: &'a OpenOptions, cache: &'a ResourceCache) -> Self {
        let state = GraphicsState::new();
        let emitted_clip = Arc::clone(&state.clip);
        Interpreter {
            store,
            options,
            cache,
            state,
            stack: Vec::new(),
            path: Path::new(),
            pending_clip: None,
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            text_clip: None,
            emitted_clip,
            form_depth: 0,
            reported_fonts: FxHashSet::default(),
            pattern_warned: false,
            list: DisplayList::default(),
        }
    }

    /// Interprets `content` with `resources` (a dictionary or a reference to
    /// one) and returns everything it drew.
    pub fn run(mut self, content: &ContentStream, resources: Option<&PDFObject>) -> DisplayList {
        self.list.warnings.extend(content.warnings.iter().cloned());
        let resources = resources.and_then(|r| match self.store.resolve_object(r) {
            Ok(resolved) => Some(resolved),
            Err(e) => {
                self.warn(format!("page resources: {}", e));
                None
            }
        });
        let dict = resources.as_deref().and_then(PDFObject::as_dict);
        self.execute(&content.operations, dict);
        if !self.stack.is_empty() {
            tracing::trace!("{} unbalanced q at end of content", self.stack.len());
        }
        self.list
    }

    fn warn(&mut self, message: String) {
        tracing::debug!("interpreter: {}", message);
        self.list.warnings.push(message);
    }

    fn execute(&mut self, operations: &[Operation], resources: Option<&PDFDict>) {
        for op in operations {
            if let Err(e) = self.apply(op, resources) {
                self.warn(format!("{}: {}", op.op, e));
            }
        }
    }

    fn apply(&mut self, op: &Operation, resources: Option<&PDFDict>) -> PDFResult<()> {
        match op.op {
            // Graphics state
            OpCode::Save => self.save()?,
            OpCode::Restore => self.restore()?,
            OpCode::Transform => {
                let m = numbers::<6>(op)?;
                self.state.concat_matrix(&m);
            }
            OpCode::SetLineWidth => self.state.stroke_props.line_width = numbers::<1>(op)?[0].abs(),
            OpCode::SetLineCap => {
                let [cap] = numbers::<1>(op)?;
                self.state.stroke_props.line_cap =
                    LineCap::from_i64(cap as i64)
                        .ok_or_else(|| operand_error(op, "a cap style 0..=2"))?;
            }
            OpCode::SetLineJoin => {
                let [join] = numbers::<1>(op)?;
                self.state.stroke_props.line_join =
                    LineJoin::from_i64(join as i64)
                        .ok_or_else(|| operand_error(op, "a join style 0..=2"))?;
            }
            OpCode::SetMiterLimit => self.state.stroke_props.miter_limit = numbers::<1>(op)?[0],
            OpCode::SetDash => {
                let array = op
                    .args
                    .first()
                    .and_then(PDFObject::as_number_array)
                    .ok_or_else(|| operand_error(op, "an array and a phase"))?;
                let phase = op.number(1).unwrap_or(0.0);
                self.state.stroke_props.set_dash(array, phase);
            }
            OpCode::SetRenderingIntent | OpCode::SetFlatness => {}
            OpCode::SetGState => self.set_ext_gstate(name_operand(op)?, resources)?,

            // Path construction
            OpCode::MoveTo => {
                let [x, y] = numbers(op)?;
                self.path.move_to(x, y);
            }
            OpCode::LineTo => {
                let [x, y] = numbers(op)?;
                self.path.line_to(x, y);
            }
            OpCode::CurveTo => {
                let [x1, y1, x2, y2, x, y] = numbers(op)?;
                self.path.curve_to(x1, y1, x2, y2, x, y);
            }
            OpCode::CurveTo2 => {
                let [x2, y2, x, y] = numbers(op)?;
                self.path.curve_to_v(x2, y2, x, y);
            }
            OpCode::CurveTo3 => {
                let [x1, y1, x, y] = numbers(op)?;
                self.path.curve_to_y(x1, y1, x, y);
            }
            OpCode::ClosePath => self.path.close_path(),
            OpCode::Rectangle => {
                let [x, y, w, h] = numbers(op)?;
                self.path.rect(x, y, w, h);
            }

            // Path painting
            OpCode::Stroke => self.paint(None, true, false),
            OpCode::CloseStroke => self.paint(None, true, true),
            OpCode::Fill => self.paint(Some(FillRule::NonZero), false, false),
            OpCode::EOFill => self.paint(Some(FillRule::EvenOdd), false, false),
            OpCode::FillStroke => self.paint(Some(FillRule::NonZero), true, false),
            OpCode::EOFillStroke => self.paint(Some(FillRule::EvenOdd), true, false),
            OpCode::CloseFillStroke => self.paint(Some(FillRule::NonZero), true, true),
            OpCode::CloseEOFillStroke => self.paint(Some(FillRule::EvenOdd), true, true),
            OpCode::EndPath => self.paint(None, false, false),
            OpCode::Clip => self.pending_clip = Some(FillRule::NonZero),
            OpCode::EOClip => self.pending_clip = Some(FillRule::EvenOdd),

            // Text objects and state
            OpCode::BeginText => {
                self.text_matrix = IDENTITY;
                self.line_matrix = IDENTITY;
                self.text_clip = None;
            }
            OpCode::EndText => {
                if let Some(runs) = self.text_clip.take() {
                    self.state.add_clip(ClipShape::Text(runs));
                }
            }
            OpCode::SetCharSpacing => self.state.text.char_spacing = numbers::<1>(op)?[0],
            OpCode::SetWordSpacing => self.state.text.word_spacing = numbers::<1>(op)?[0],
            OpCode::SetHScale => self.state.text.horizontal_scaling = numbers::<1>(op)?[0] / 100.0,
            OpCode::SetLeading => self.state.text.leading = numbers::<1>(op)?[0],
            OpCode::SetFont => {
                let name = op.name(0).ok_or_else(|| operand_error(op, "a font name and size"))?;
                let [size] = numbers::<1>(op)?;
                self.state.text.font_size = size;
                self.state.text.font = None;
                let font = self.load_font_resource(name, resources)?;
                self.state.text.font = Some(font);
            }
            OpCode::SetTextRenderingMode => {
                let [mode] = numbers::<1>(op)?;
                self.state.text.render_mode = TextRenderingMode::from_i64(mode as i64)
                    .ok_or_else(|| operand_error(op, "a render mode 0..=7"))?;
            }
            OpCode::SetTextRise => self.state.text.rise = numbers::<1>(op)?[0],
            OpCode::MoveText => {
                let [tx, ty] = numbers(op)?;
                self.move_text(tx, ty);
            }
            OpCode::SetLeadingMoveText => {
                let [tx, ty] = numbers(op)?;
                self.state.text.leading = -ty;
                self.move_text(tx, ty);
            }
            OpCode::SetTextMatrix => {
                let m = numbers::<6>(op)?;
                self.text_matrix = m;
                self.line_matrix = m;
            }
            OpCode::NextLine => self.next_line(),

            // Text showing
            OpCode::ShowText => {
                let bytes = op
                    .args
                    .last()
                    .and_then(PDFObject::as_bytes)
                    .ok_or_else(|| operand_error(op, "a string"))?;
                self.show_text(&[TextItem::Text(bytes)])?;
            }
            OpCode::ShowSpacedText => {
                let array = op
                    .args
                    .last()
                    .and_then(PDFObject::as_array)
                    .ok_or_else(|| operand_error(op, "an array"))?;
                let items: Vec<TextItem> = array
                    .iter()
                    .filter_map(|item| match &**item {
                        PDFObject::Number(n) => Some(TextItem::Adjust(*n)),
                        other => other.as_bytes().map(TextItem::Text),
                    })
                    .collect();
                self.show_text(&items)?;
            }
            OpCode::NextLineShowText => {
                let bytes = op
                    .args
                    .last()
                    .and_then(PDFObject::as_bytes)
                    .ok_or_else(|| operand_error(op, "a string"))?;
                self.next_line();
                self.show_text(&[TextItem::Text(bytes)])?;
            }
            OpCode::NextLineSetSpacingShowText => {
                let bytes = op
                    .args
                    .last()
                    .and_then(PDFObject::as_bytes)
                    .ok_or_else(|| operand_error(op, "a string"))?;
                let (aw, ac) = match op.args.as_slice() {
                    [aw, ac, _] => (aw.as_number(), ac.as_number()),
                    _ => (None, None),
                };
                let (Some(aw), Some(ac)) = (aw, ac) else {
                    return Err(operand_error(op, "two numbers and a string"));
                };
                self.state.text.word_spacing = aw;
                self.state.text.char_spacing = ac;
                self.next_line();
                self.show_text(&[TextItem::Text(bytes)])?;
            }
            // Type3 glyph metrics; glyph procedures are not run.
            OpCode::SetCharWidth | OpCode::SetCharWidthAndBounds => {}

            // Color
            OpCode::SetStrokeColorSpace => {
                let space = self.color_space(op, resources)?;
                self.state.stroke = ColorState::new(space);
            }
            OpCode::SetFillColorSpace => {
                let space = self.color_space(op, resources)?;
                self.state.fill = ColorState::new(space);
            }
            OpCode::SetStrokeColor | OpCode::SetStrokeColorN => {
                self.state.stroke.components = self.color_operands(op, false);
            }
            OpCode::SetFillColor | OpCode::SetFillColorN => {
                self.state.fill.components = self.color_operands(op, true);
            }
            OpCode::SetStrokeGray => {
                self.state.stroke = device_color(ColorSpace::DeviceGray, &numbers::<1>(op)?)
            }
            OpCode::SetFillGray => {
                self.state.fill = device_color(ColorSpace::DeviceGray, &numbers::<1>(op)?)
            }
            OpCode::SetStrokeRGBColor => {
                self.state.stroke = device_color(ColorSpace::DeviceRGB, &numbers::<3>(op)?)
            }
            OpCode::SetFillRGBColor => {
                self.state.fill = device_color(ColorSpace::DeviceRGB, &numbers::<3>(op)?)
            }
            OpCode::SetStrokeCMYKColor => {
                self.state.stroke = device_color(ColorSpace::DeviceCMYK, &numbers::<4>(op)?)
            }
            OpCode::SetFillCMYKColor => {
                self.state.fill = device_color(ColorSpace::DeviceCMYK, &numbers::<4>(op)?)
            }

            // Shading, images and XObjects
            OpCode::ShadingFill => self.shading_fill(name_operand(op)?, resources)?,
            OpCode::InlineImage => {
                let stream = op.args.first().ok_or_else(|| operand_error(op, "an inline image"))?;
                let image = DecodedImage::decode(stream, self.store, resources)?;
                self.draw_image(Arc::new(image));
            }
            OpCode::PaintXObject => self.paint_xobject(name_operand(op)?, resources)?,

            // Marked content and compatibility sections carry nothing to draw.
            OpCode::MarkPoint
            | OpCode::MarkPointProps
            | OpCode::BeginMarkedContent
            | OpCode::BeginMarkedContentProps
            | OpCode::EndMarkedContent
            | OpCode::BeginCompat
            | OpCode::EndCompat => {}
        }
        Ok(())
    }

    // === Graphics state ===

    fn save(&mut self) -> PDFResult<()> {
        if self.stack.len() >= MAX_SAVE_DEPTH {
            return Err(PDFError::content_stream_error(format!(
                "graphics state nested deeper than {}",
                MAX_SAVE_DEPTH
            )));
        }
        self.stack.push(self.state.clone());
        Ok(())
    }

    fn restore(&mut self) -> PDFResult<()> {
        let state = self
            .stack
            .pop()
            .ok_or_else(|| PDFError::content_stream_error("Q without matching q"))?;
        self.state = state;
        Ok(())
    }

    /// Looks `name` up in the `category` subdictionary of `resources`,
    /// leaving references unresolved.
    fn resource(
        &self,
        resources: Option<&PDFDict>,
        category: &str,
        name: &str,
    ) -> Option<PDFObject> {
        let category = self.store.get_lenient(resources?, category)?;
        category.get(name).cloned()
    }

    fn set_ext_gstate(&mut self, name: &str, resources: Option<&PDFDict>) -> PDFResult<()> {
        let raw = self
            .resource(resources, "ExtGState", name)
            .ok_or_else(|| PDFError::content_stream_error(format!("no ExtGState /{}", name)))?;
        let gs = self.store.resolve_object(&raw)?;
        let dict = gs
            .as_dict()
            .ok_or_else(|| {
                let kind = gs.type_name();
                PDFError::content_stream_error(format!("ExtGState /{} is a {}", name, kind))
            })?;

        // Keys are independent of each other, so map order does not matter.
        for key in dict.keys() {
            let Some(value) = self.store.get_lenient(dict, key) else {
                continue;
            };
            match key.as_str() {
                "LW" => {
                    if let Some(width) = value.as_number() {
                        self.state.stroke_props.line_width = width.abs();
                    }
                }
                "LC" => {
                    if let Some(cap) = value.as_int().and_then(LineCap::from_i64) {
                        self.state.stroke_props.line_cap = cap;
                    }
                }
                "LJ" => {
                    if let Some(join) = value.as_int().and_then(LineJoin::from_i64) {
                        self.state.stroke_props.line_join = join;
                    }
                }
                "ML" => {
                    if let Some(limit) = value.as_number() {
                        self.state.stroke_props.miter_limit = limit;
                    }
                }
                "D" => {
                    if let Some([array, phase]) = value.as_array() {
                        if let Some(array) = array.as_number_array() {
                            let phase = phase.as_number().unwrap_or(0.0);
                            self.state.stroke_props.set_dash(array, phase);
                        }
                    }
                }
                "CA" => self.state.stroke_alpha = value.as_number().unwrap_or(1.0).clamp(0.0, 1.0),
                "ca" => self.state.fill_alpha = value.as_number().unwrap_or(1.0).clamp(0.0, 1.0),
                "Font" => {
                    let Some([font, size]) = value.as_array() else {
                        continue;
                    };
                    match self.cache.font(font, self.store, self.options) {
                        Ok(font) => {
                            self.report_font(&font);
                            self.state.text.font = Some(font);
                            if let Some(size) = size.as_number() {
                                self.state.text.font_size = size;
                            }
                        }
                        Err(e) => self.warn(format!("ExtGState /{} font: {}", name, e)),
                    }
                }
                _ => tracing::trace!("ExtGState key /{} ignored", key),
            }
        }
        Ok(())
    }

    // === Painting ===

    /// Emits a `SetClip` if the clip changed since the last draw.
    fn sync_clip(&mut self) {
        if !Arc::ptr_eq(&self.state.clip, &self.emitted_clip) {
            self.emitted_clip = Arc::clone(&self.state.clip);
            self.list
                .commands
                .push(DrawCommand::SetClip(Arc::clone(&self.state.clip)));
        }
    }

    /// Paints and ends the current path. A pending `W`/`W*` takes effect
    /// after the painting, for the operators that follow.
    fn paint(&mut self, fill: Option<FillRule>, stroke: bool, close: bool) {
        if close {
            self.path.close_path();
        }
        let mut path = self.path.take();
        let transform = self.state.ctm;
        let clip_rule = self.pending_clip.take();

        if !path.is_empty() && (fill.is_some() || stroke) {
            self.sync_clip();
            let drawn = if clip_rule.is_some() {
                path.clone()
            } else {
                std::mem::take(&mut path)
            };
            self.list.commands.push(DrawCommand::DrawPath {
                path: drawn,
                transform,
                fill: fill.map(|rule| FillStyle {
                    color: self.state.fill_color(),
                    rule,
                }),
                stroke: stroke.then(|| StrokeStyle {
                    color: self.state.stroke_color(),
                    props: self.state.stroke_props.clone(),
                }),
            });
        }
        if let Some(rule) = clip_rule {
            self.state.add_clip(ClipShape::Path { path, rule, transform });
        }
    }

    fn draw_image(&mut self, image: Arc<DecodedImage>) {
        self.sync_clip();
        let color = if image.is_stencil() {
            self.state.fill_color()
        } else {
            Color {
                a: self.state.fill_alpha,
                ..Color::WHITE
            }
        };
        let interpolate = image.interpolate;
        self.list.commands.push(DrawCommand::DrawImage {
            image,
            transform: self.state.ctm,
            color,
            interpolate,
        });
    }

    fn paint_xobject(&mut self, name: &str, resources: Option<&PDFDict>) -> PDFResult<()> {
        let raw = self
            .resource(resources, "XObject", name)
            .ok_or_else(|| PDFError::content_stream_error(format!("no XObject /{}", name)))?;
        let object = self.store.resolve_object(&raw)?;
        let dict = object
            .as_dict()
            .ok_or_else(|| {
                let kind = object.type_name();
                PDFError::content_stream_error(format!("XObject /{} is a {}", name, kind))
            })?;
        let subtype = self
            .store
            .get_lenient(dict, "Subtype")
            .and_then(|s| s.as_name().map(str::to_string));

        match subtype.as_deref() {
            Some("Image") => {
                let image = match raw.as_reference() {
                    Some(reference) => self.cache.image(reference, self.store, resources)?,
                    None => Arc::new(DecodedImage::decode(&object, self.store, resources)?),
                };
                self.draw_image(image);
                Ok(())
            }
            Some("Form") => self.paint_form(&object, resources),
            Some("PS") => Ok(()),
            other => Err(PDFError::content_stream_error(format!(
                "XObject /{} has subtype {:?}",
                name, other
            ))),
        }
    }

    fn paint_form(
        &mut self,
        form: &PDFObject,
        parent_resources: Option<&PDFDict>,
    ) -> PDFResult<()> {
        if self.form_depth >= self.options.max_form_depth {
            return Err(PDFError::content_stream_error(format!(
                "form XObjects nested deeper than {}",
                self.options.max_form_depth
            )));
        }
        let dict = form
            .as_dict()
            .ok_or_else(|| {
                PDFError::content_stream_error(format!("form is a {}", form.type_name()))
            })?;
        let content = ContentStream::parse(self.store.decode_stream(form)?);
        self.list
            .warnings
            .extend(content.warnings.iter().map(|w| format!("form: {}", w)));

        let own_resources = self.store.get_lenient(dict, "Resources");
        let resources = own_resources
            .as_deref()
            .and_then(PDFObject::as_dict)
            .or(parent_resources);
        let matrix = self
            .store
            .get_lenient(dict, "Matrix")
            .and_then(|m| m.as_number_array())
            .and_then(|m| matrix_from(&m));
        let bbox = self
            .store
            .get_lenient(dict, "BBox")
            .and_then(|b| Rect::from_object(&b));

        let depth = self.stack.len();
        self.stack.push(self.state.clone());
        let outer_path = self.path.take();
        self.pending_clip = None;

        if let Some(m) = matrix {
            self.state.concat_matrix(&m);
        }
        if let Some(bbox) = bbox {
            self.state.add_clip(ClipShape::Path {
                path: Path::from_rect(bbox.x0, bbox.y0, bbox.width(), bbox.height()),
                rule: FillRule::NonZero,
                transform: self.state.ctm,
            });
        }

        self.form_depth += 1;
        self.execute(&content.operations, resources);
        self.form_depth -= 1;

        // Drop anything the form left saved, then restore our own save.
        self.stack.truncate(depth + 1);
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
        self.path = outer_path;
        self.pending_clip = None;
        Ok(())
    }

    fn shading_fill(&mut self, name: &str, resources: Option<&PDFDict>) -> PDFResult<()> {
        let raw = self
            .resource(resources, "Shading", name)
            .ok_or_else(|| PDFError::content_stream_error(format!("no Shading /{}", name)))?;
        let shading = self.store.resolve_object(&raw)?;
        let dict = shading
            .as_dict()
            .ok_or_else(|| {
                PDFError::content_stream_error(format!(
                    "Shading /{} is a {}",
                    name,
                    shading.type_name()
                ))
            })?;
        let space_obj = dict
            .get("ColorSpace")
            .ok_or_else(|| {
                PDFError::content_stream_error(format!("Shading /{} has no /ColorSpace", name))
            })?;
        let space = ColorSpace::parse(space_obj, self.store, resources)?;

        let components = self
            .store
            .get_lenient(dict, "Function")
            .and_then(|f| sample_function(self.store, &f, 0.5, 0))
            .or_else(|| {
                self.store
                    .get_lenient(dict, "Background")
                    .and_then(|b| b.as_number_array())
            })
            .unwrap_or_else(|| space.initial_color());
        let color = Color::from_rgb(space.to_rgb(&components), self.state.fill_alpha);
        self.warn(format!("shading /{} drawn as a flat color", name));

        let bbox = self
            .store
            .get_lenient(dict, "BBox")
            .and_then(|b| Rect::from_object(&b));
        let (path, transform) = match bbox {
            Some(r) => (Path::from_rect(r.x0, r.y0, r.width(), r.height()), self.state.ctm),
            None => (
                Path::from_rect(
                    -SHADING_EXTENT,
                    -SHADING_EXTENT,
                    2.0 * SHADING_EXTENT,
                    2.0 * SHADING_EXTENT,
                ),
                IDENTITY,
            ),
        };
        self.sync_clip();
        self.list.commands.push(DrawCommand::DrawPath {
            path,
            transform,
            fill: Some(FillStyle {
                color,
                rule: FillRule::NonZero,
            }),
            stroke: None,
        });
        Ok(())
    }

    // === Color ===

    fn color_space(&self, op: &Operation, resources: Option<&PDFDict>) -> PDFResult<ColorSpace> {
        let name = op.args.last().ok_or_else(|| operand_error(op, "a color space"))?;
        ColorSpace::parse(name, self.store, resources)
    }

    fn color_operands(&mut self, op: &Operation, fill: bool) -> Vec<f64> {
        let target = if fill { &self.state.fill } else { &self.state.stroke };
        if target.space == ColorSpace::Pattern && !self.pattern_warned {
            self.pattern_warned = true;
            self.warn("pattern colors drawn as mid gray".to_string());
        }
        op.args.iter().filter_map(PDFObject::as_number).collect()
    }

    // === Text ===

    fn load_font_resource(
        &mut self,
        name: &str,
        resources: Option<&PDFDict>,
    ) -> PDFResult<Arc<Font>> {
        let raw = self
            .resource(resources, "Font", name)
            .ok_or_else(|| PDFError::content_stream_error(format!("no font /{}", name)))?;
        let font = self.cache.font(&raw, self.store, self.options)?;
        self.report_font(&font);
        Ok(font)
    }

    /// Records a font's load warnings the first time it is used.
    fn report_font(&mut self, font: &Arc<Font>) {
        if !self.reported_fonts.insert(Arc::as_ptr(font) as usize) {
            return;
        }
        for warning in &font.warnings {
            self.list.warnings.push(format!("font {}: {}", font.name, warning));
        }
        if font.kind == FontKind::Type3 {
            self.warn(format!("font {}: Type3 glyphs are not drawn", font.name));
        }
    }

    fn move_text(&mut self, tx: f64, ty: f64) {
        self.line_matrix = concat(&self.line_matrix, &translate(tx, ty));
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.state.text.leading;
        self.move_text(0.0, -leading);
    }

    /// Width of `code` in thousandths of an em.
    fn advance_width(font: &Font, code: u32) -> f64 {
        if let Some(width) = font.width(code) {
            return width;
        }
        #[cfg(feature = "rendering")]
        {
            if let Some(width) = super::glyph::program_advance(font, code) {
                return width;
            }
        }
        DEFAULT_ADVANCE
    }

    fn show_text(&mut self, items: &[TextItem<'_>]) -> PDFResult<()> {
        let font = self
            .state
            .text
            .font
            .clone()
            .ok_or_else(|| PDFError::content_stream_error("text shown before a font was set"))?;
        let text = self.state.text.clone();
        let vertical = font.is_vertical();
        let size = text.font_size;
        let h_scale = text.horizontal_scaling;
        let glyph_space = [size * h_scale, 0.0, 0.0, size, 0.0, text.rise];

        let mut glyphs = Vec::new();
        for item in items {
            let bytes = match item {
                TextItem::Adjust(n) => {
                    let shift = -n / 1000.0 * size;
                    let step = if vertical {
                        translate(0.0, shift)
                    } else {
                        translate(shift * h_scale, 0.0)
                    };
                    self.text_matrix = concat(&self.text_matrix, &step);
                    continue;
                }
                TextItem::Text(bytes) => bytes,
            };

            for code in font.char_codes(bytes) {
                let width = Self::advance_width(&font, code.code) / 1000.0;
                let trm = concat(&self.state.ctm, &concat(&self.text_matrix, &glyph_space));
                let transform = if vertical {
                    concat(&trm, &translate(-width / 2.0, -VERTICAL_ORIGIN_Y))
                } else {
                    trm
                };
                glyphs.push(Glyph {
                    code: code.code,
                    transform,
                    unicode: font.unicode(code.code),
                });

                let word = if code.len == 1 && code.code == 32 {
                    text.word_spacing
                } else {
                    0.0
                };
                let step = if vertical {
                    translate(0.0, -size + text.char_spacing + word)
                } else {
                    translate((width * size + text.char_spacing + word) * h_scale, 0.0)
                };
                self.text_matrix = concat(&self.text_matrix, &step);
            }
        }

        if glyphs.is_empty() {
            return Ok(());
        }
        let mode = text.render_mode;
        let run = GlyphRun {
            font,
            glyphs,
            render_mode: mode,
            fill: mode.fills().then(|| self.state.fill_color()),
            stroke: mode.strokes().then(|| StrokeStyle {
                color: self.state.stroke_color(),
                props: self.state.stroke_props.clone(),
            }),
            ctm: self.state.ctm,
        };
        if mode.clips() {
            self.text_clip.get_or_insert_with(Vec::new).push(run.clone());
        }
        self.sync_clip();
        self.list.commands.push(DrawCommand::GlyphRun(run));
        Ok(())
    }
}

/// An element of a `TJ` array.
enum TextItem<'a> {
    Text(&'a [u8]),
    Adjust(f64),
}

fn device_color(space: ColorSpace, components: &[f64]) -> ColorState {
    ColorState {
        space,
        components: components.to_vec(),
    }
}

/// Evaluates a sampled-free function (types 2 and 3, or an array of
/// single-output functions) at `t`.
fn sample_function(
    store: &ObjectStore,
    function: &PDFObject,
    t: f64,
    depth: usize,
) -> Option<Vec<f64>> {
    if depth > 8 {
        return None;
    }
    if let Some(array) = function.as_array() {
        let mut out = Vec::new();
        for f in array {
            let f = store.resolve_object(f).ok()?;
            out.extend(sample_function(store, &f, t, depth + 1)?);
        }
        return Some(out);
    }
    let dict = function.as_dict()?;
    let number = |key: &str| store.get_lenient(dict, key).and_then(|v| v.as_number());
    let numbers = |key: &str| store.get_lenient(dict, key).and_then(|v| v.as_number_array());

    match number("FunctionType")? as i64 {
        2 => {
            let c0 = numbers("C0").unwrap_or_else(|| vec![0.0]);
            let c1 = numbers("C1").unwrap_or_else(|| vec![1.0]);
            let exponent = number("N").unwrap_or(1.0);
            let k = t.powf(exponent);
            Some(c0.iter().zip(&c1).map(|(a, b)| a + k * (b - a)).collect())
        }
        3 => {
            let functions = store.get_lenient(dict, "Functions")?;
            let functions = functions.as_array()?;
            let domain = numbers("Domain").unwrap_or_else(|| vec![0.0, 1.0]);
            let (d0, d1) = (domain.first().copied()?, domain.get(1).copied()?);
            let x = d0 + t * (d1 - d0);
            let bounds = numbers("Bounds").unwrap_or_default();
            let last = functions.len().checked_sub(1)?;
            let index = bounds.iter().take_while(|b| x >= **b).count().min(last);
            let lo = if index == 0 { d0 } else { bounds[index - 1] };
            let hi = bounds.get(index).copied().unwrap_or(d1);
            let encode = numbers("Encode").unwrap_or_default();
            let (e0, e1) = (
                encode.get(2 * index).copied().unwrap_or(0.0),
                encode.get(2 * index + 1).copied().unwrap_or(1.0),
            );
            let local = if hi > lo { (x - lo) / (hi - lo) } else { 0.0 };
            let sub = store.resolve_object(&functions[index]).ok()?;
            sample_function(store, &sub, e0 + local * (e1 - e0), depth + 1)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::xref::XRefTable;
    use rustc_hash::FxHashMap;
    use std::collections::HashMap;

    fn store() -> ObjectStore {
        let data = Arc::new(Vec::new());
        let xref = XRefTable::from_parts(FxHashMap::default(), HashMap::new());
        ObjectStore::new(data, xref, false, false, 32)
    }

    fn run(content: &str, resources: Option<PDFObject>) -> DisplayList {
        let store = store();
        let options = OpenOptions::default();
        let cache = ResourceCache::new(&options);
        let content = ContentStream::parse(content.as_bytes().to_vec());
        Interpreter::new(&store, &options, &cache).run(&content, resources.as_ref())
    }

    #[test]
    fn test_fill_rect() {
        let list = run("1 0 0 rg 10 20 30 40 re f", None);
        assert_eq!(list.len(), 1);
        match &list.commands[0] {
            DrawCommand::DrawPath { path, fill, stroke, transform } => {
                assert_eq!(path.bounding_box(), Some((10.0, 20.0, 40.0, 60.0)));
                let fill = fill.as_ref().unwrap();
                assert_eq!(fill.color, Color::rgb(1.0, 0.0, 0.0));
                assert_eq!(fill.rule, FillRule::NonZero);
                assert!(stroke.is_none());
                assert_eq!(*transform, IDENTITY);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_save_restore_scopes_state() {
        let list = run("q 2 0 0 2 0 0 cm 0 0 1 1 re S Q 0 0 1 1 re B*", None);
        let transforms: Vec<Matrix> = list
            .commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::DrawPath { transform, .. } => Some(*transform),
                _ => None,
            })
            .collect();
        assert_eq!(transforms, vec![[2.0, 0.0, 0.0, 2.0, 0.0, 0.0], IDENTITY]);
    }

    #[test]
    fn test_bad_operators_are_warnings() {
        let list = run("Q 1 re /Foo gs 0 0 5 5 re f", None);
        assert_eq!(list.len(), 1);
        assert!(list.warnings.len() >= 3);
    }

    #[test]
    fn test_clip_applies_to_later_drawing() {
        let list = run("0 0 10 10 re W n 0 0 50 50 re f", None);
        assert!(matches!(&list.commands[0], DrawCommand::SetClip(shapes) if shapes.len() == 1));
        assert!(matches!(&list.commands[1], DrawCommand::DrawPath { .. }));

        // A restore brings back the unclipped state.
        let list = run("q 0 0 10 10 re W n Q 0 0 50 50 re f", None);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_clip_with_paint_uses_previous_clip() {
        let list = run("0 0 10 10 re W f 0 0 50 50 re f", None);
        assert!(matches!(&list.commands[0], DrawCommand::DrawPath { .. }));
        assert!(matches!(&list.commands[1], DrawCommand::SetClip(_)));
        assert!(matches!(&list.commands[2], DrawCommand::DrawPath { .. }));
    }

    #[test]
    fn test_text_without_font_warns() {
        let list = run("BT (Hi) Tj ET", None);
        assert!(list.is_empty());
        assert_eq!(list.warnings.len(), 1);
    }

    #[test]
    fn test_text_layout() {
        let mut fonts = HashMap::new();
        let mut font = HashMap::new();
        font.insert("Type".to_string(), PDFObject::Name("Font".into()));
        font.insert("Subtype".to_string(), PDFObject::Name("Type1".into()));
        font.insert("BaseFont".to_string(), PDFObject::Name("NoSuchFont".into()));
        font.insert("FirstChar".to_string(), PDFObject::Number(65.0));
        font.insert(
            "Widths".to_string(),
            PDFObject::Array(
                [600.0, 400.0]
                    .iter()
                    .map(|w| Box::new(PDFObject::Number(*w)))
                    .collect(),
            ),
        );
        fonts.insert("F1".to_string(), PDFObject::Dictionary(font));
        let mut resources = HashMap::new();
        resources.insert("Font".to_string(), PDFObject::Dictionary(fonts));

        let list = run(
            "BT /F1 10 Tf 100 200 Td [(A) -1000 (B)] TJ ET",
            Some(PDFObject::Dictionary(resources)),
        );
        let run = list
            .commands
            .iter()
            .find_map(|c| match c {
                DrawCommand::GlyphRun(run) => Some(run),
                _ => None,
            })
            .expect("glyph run");
        assert_eq!(run.text(), "AB");
        assert_eq!(run.glyphs[0].transform, [10.0, 0.0, 0.0, 10.0, 100.0, 200.0]);
        // 600/1000 * 10 for A, then 1000/1000 * 10 from the adjustment.
        assert_eq!(run.glyphs[1].transform[4], 116.0);
    }

    #[test]
    fn test_function_sampling() {
        let store = store();
        let mut f = HashMap::new();
        f.insert("FunctionType".to_string(), PDFObject::Number(2.0));
        let single =
            |v: f64| PDFObject::Array(std::iter::once(Box::new(PDFObject::Number(v))).collect());
        f.insert("C0".to_string(), single(0.0));
        f.insert("C1".to_string(), single(1.0));
        f.insert("N".to_string(), PDFObject::Number(1.0));
        let sampled = sample_function(&store, &PDFObject::Dictionary(f), 0.5, 0).unwrap();
        assert_eq!(sampled, vec![0.5]);
    }
}
