//! Graphics state management for PDF rendering.
//!
//! This module handles the graphics state stack and all state properties
//! as defined in the PDF specification (section 8.4).

use super::display_list::ClipShape;
use crate::core::color_space::ColorSpace;
use crate::core::font::Font;
use std::sync::Arc;

/// Affine transform `[a b c d e f]`:
/// ```text
/// | a b 0 |
/// | c d 0 |
/// | e f 1 |
/// ```
pub type Matrix = [f64; 6];

pub const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Returns the transform that applies `inner` first, then `outer`.
///
/// Based on PDF.js's Util.transform.
pub fn concat(outer: &Matrix, inner: &Matrix) -> Matrix {
    let [a, b, c, d, e, f] = *inner;
    let [oa, ob, oc, od, oe, of] = *outer;
    [
        oa * a + oc * b,
        ob * a + od * b,
        oa * c + oc * d,
        ob * c + od * d,
        oa * e + oc * f + oe,
        ob * e + od * f + of,
    ]
}

pub fn transform_point(m: &Matrix, x: f64, y: f64) -> (f64, f64) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

pub fn translate(tx: f64, ty: f64) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

/// Reads a six-number matrix operand or dictionary entry.
pub fn matrix_from(values: &[f64]) -> Option<Matrix> {
    let m: Matrix = values.get(..6)?.try_into().ok()?;
    m.iter().all(|v| v.is_finite()).then_some(m)
}

/// Line cap style (PDF spec 8.4.3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    /// Stroke is squared off at the endpoint
    #[default]
    Butt = 0,
    /// Semicircular arc centred on the endpoint
    Round = 1,
    /// Stroke continues half a line width beyond the endpoint
    ProjectingSquare = 2,
}

impl LineCap {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(LineCap::Butt),
            1 => Some(LineCap::Round),
            2 => Some(LineCap::ProjectingSquare),
            _ => None,
        }
    }
}

/// Line join style (PDF spec 8.4.3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineJoin {
    #[default]
    Miter = 0,
    Round = 1,
    Bevel = 2,
}

impl LineJoin {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(LineJoin::Miter),
            1 => Some(LineJoin::Round),
            2 => Some(LineJoin::Bevel),
            _ => None,
        }
    }
}

/// Stroke properties for path rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeProps {
    /// Line width in user space units. Zero means the thinnest line the
    /// device can draw.
    pub line_width: f64,
    pub line_cap: LineCap,
    pub line_join: LineJoin,
    /// Maximum ratio of miter length to line width before a bevel is used.
    pub miter_limit: f64,
    /// Alternating on/off lengths. Empty means a solid line.
    pub dash_array: Vec<f64>,
    pub dash_offset: f64,
}

impl Default for StrokeProps {
    fn default() -> Self {
        StrokeProps {
            line_width: 1.0,
            line_cap: LineCap::default(),
            line_join: LineJoin::default(),
            miter_limit: 10.0,
            dash_array: Vec::new(),
            dash_offset: 0.0,
        }
    }
}

impl StrokeProps {
    /// Sets the dash pattern. Patterns that are all zero or contain negative
    /// lengths draw solid lines.
    pub fn set_dash(&mut self, array: Vec<f64>, offset: f64) {
        let valid =
            array.iter().all(|v| v.is_finite() && *v >= 0.0) && array.iter().any(|v| *v > 0.0);
        self.dash_array = if valid { array } else { Vec::new() };
        self.dash_offset = if offset.is_finite() { offset } else { 0.0 };
    }
}

/// Resolved color with alpha, each channel in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);

    pub const fn rgb(r: f64, g: f64, b: f64) -> Self {
        Color { r, g, b, a: 1.0 }
    }

    pub fn from_rgb(rgb: [f64; 3], alpha: f64) -> Self {
        Color {
            r: rgb[0],
            g: rgb[1],
            b: rgb[2],
            a: alpha.clamp(0.0, 1.0),
        }
    }

    /// Channels as bytes, straight alpha.
    pub fn to_rgba8(self) -> [u8; 4] {
        let byte = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [byte(self.r), byte(self.g), byte(self.b), byte(self.a)]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

/// Text rendering mode (PDF spec 9.3.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextRenderingMode {
    #[default]
    Fill = 0,
    Stroke = 1,
    FillStroke = 2,
    Invisible = 3,
    FillClip = 4,
    StrokeClip = 5,
    FillStrokeClip = 6,
    Clip = 7,
}

impl TextRenderingMode {
    pub fn from_i64(value: i64) -> Option<Self> {
        use TextRenderingMode::*;
        [Fill, Stroke, FillStroke, Invisible, FillClip, StrokeClip, FillStrokeClip, Clip]
            .get(usize::try_from(value).ok()?)
            .copied()
    }

    pub fn fills(self) -> bool {
        matches!(
            self,
            TextRenderingMode::Fill
                | TextRenderingMode::FillStroke
                | TextRenderingMode::FillClip
                | TextRenderingMode::FillStrokeClip
        )
    }

    pub fn strokes(self) -> bool {
        matches!(
            self,
            TextRenderingMode::Stroke
                | TextRenderingMode::FillStroke
                | TextRenderingMode::StrokeClip
                | TextRenderingMode::FillStrokeClip
        )
    }

    /// Whether shown glyphs are added to the clip at `ET`.
    pub fn clips(self) -> bool {
        self as u8 >= TextRenderingMode::FillClip as u8
    }
}

/// Fill rule for path filling and clipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillRule {
    #[default]
    NonZero,
    EvenOdd,
}

/// A color space with the current color in it.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorState {
    pub space: ColorSpace,
    pub components: Vec<f64>,
}

impl ColorState {
    pub fn new(space: ColorSpace) -> Self {
        let components = space.initial_color();
        ColorState { space, components }
    }

    pub fn rgb(&self) -> [f64; 3] {
        self.space.to_rgb(&self.components)
    }
}

impl Default for ColorState {
    fn default() -> Self {
        ColorState::new(ColorSpace::DeviceGray)
    }
}

/// Text state parameters (PDF spec 9.3).
#[derive(Debug, Clone)]
pub struct TextState {
    pub font: Option<Arc<Font>>,
    pub font_size: f64,
    pub char_spacing: f64,
    pub word_spacing: f64,
    /// `Tz` as a fraction (1.0 = 100%).
    pub horizontal_scaling: f64,
    pub leading: f64,
    pub rise: f64,
    pub render_mode: TextRenderingMode,
}

impl Default for TextState {
    fn default() -> Self {
        TextState {
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 1.0,
            leading: 0.0,
            rise: 0.0,
            render_mode: TextRenderingMode::Fill,
        }
    }
}

/// Graphics state for PDF rendering.
///
/// Saved and restored as a whole by `q`/`Q`. The text matrices are not part
/// of it; they live only between `BT` and `ET`.
#[derive(Debug, Clone)]
pub struct GraphicsState {
    /// Current transformation matrix, user space to default user space.
    pub ctm: Matrix,
    pub stroke_props: StrokeProps,
    pub fill: ColorState,
    pub stroke: ColorState,
    /// `ca`
    pub fill_alpha: f64,
    /// `CA`
    pub stroke_alpha: f64,
    pub text: TextState,
    /// Shapes the current clip is the intersection of.
    pub clip: Arc<Vec<ClipShape>>,
}

impl Default for GraphicsState {
    fn default() -> Self {
        GraphicsState {
            ctm: IDENTITY,
            stroke_props: StrokeProps::default(),
            fill: ColorState::default(),
            stroke: ColorState::default(),
            fill_alpha: 1.0,
            stroke_alpha: 1.0,
            text: TextState::default(),
            clip: Arc::new(Vec::new()),
        }
    }
}

impl GraphicsState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenates `transform` to the CTM (`cm`).
    pub fn concat_matrix(&mut self, transform: &Matrix) {
        self.ctm = concat(&self.ctm, transform);
    }

    pub fn transform_point(&self, x: f64, y: f64) -> (f64, f64) {
        transform_point(&self.ctm, x, y)
    }

    pub fn fill_color(&self) -> Color {
        Color::from_rgb(self.fill.rgb(), self.fill_alpha)
    }

    pub fn stroke_color(&self) -> Color {
        Color::from_rgb(self.stroke.rgb(), self.stroke_alpha)
    }

    /// Intersects the clip with `shape`.
    pub fn add_clip(&mut self, shape: ClipShape) {
        let mut shapes = Vec::clone(&self.clip);
        shapes.push(shape);
        self.clip = Arc::new(shapes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = GraphicsState::default();
        assert_eq!(state.ctm, IDENTITY);
        assert_eq!(state.fill_color(), Color::BLACK);
        assert_eq!(state.stroke_color(), Color::BLACK);
        assert_eq!(state.stroke_props.line_width, 1.0);
        assert!(state.clip.is_empty());
    }

    #[test]
    fn test_concat_matrix() {
        let mut state = GraphicsState::default();

        state.concat_matrix(&[1.0, 0.0, 0.0, 1.0, 10.0, 20.0]);
        assert_eq!(state.ctm, [1.0, 0.0, 0.0, 1.0, 10.0, 20.0]);

        // The new matrix applies before the existing translation.
        state.concat_matrix(&[2.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
        assert_eq!(state.ctm, [2.0, 0.0, 0.0, 2.0, 10.0, 20.0]);
        assert_eq!(state.transform_point(1.0, 1.0), (12.0, 22.0));
    }

    #[test]
    fn test_colors_follow_space() {
        let mut state = GraphicsState::default();
        state.fill = ColorState {
            space: ColorSpace::DeviceCMYK,
            components: vec![0.0, 0.0, 0.0, 0.0],
        };
        state.fill_alpha = 0.5;
        assert_eq!(state.fill_color(), Color { r: 1.0, g: 1.0, b: 1.0, a: 0.5 });
        assert_eq!(Color::WHITE.to_rgba8(), [255, 255, 255, 255]);
    }

    #[test]
    fn test_invalid_dash_is_solid() {
        let mut props = StrokeProps::default();
        props.set_dash(vec![3.0, 2.0], 1.0);
        assert_eq!(props.dash_array, vec![3.0, 2.0]);
        props.set_dash(vec![0.0, 0.0], 0.0);
        assert!(props.dash_array.is_empty());
        props.set_dash(vec![-1.0], 0.0);
        assert!(props.dash_array.is_empty());
    }

    #[test]
    fn test_render_modes() {
        assert_eq!(TextRenderingMode::from_i64(7), Some(TextRenderingMode::Clip));
        assert_eq!(TextRenderingMode::from_i64(8), None);
        assert!(TextRenderingMode::FillStrokeClip.fills());
        assert!(TextRenderingMode::FillStrokeClip.strokes());
        assert!(TextRenderingMode::StrokeClip.clips());
        assert!(!TextRenderingMode::Invisible.fills());
        assert!(!TextRenderingMode::Invisible.clips());
    }
}
