//! PDF rendering layer.
//!
//! Rendering happens in two steps, after PDF.js's evaluator/canvas split:
//! - the [`Interpreter`] runs a page's content stream against a graphics
//!   state stack and emits a device independent [`DisplayList`];
//! - [`rasterize`] draws that list into a caller-owned [`RasterTarget`]
//!   (requires the `rendering` feature).

pub mod display_list;
pub mod graphics_state;
pub mod interpreter;
pub mod path;
pub mod target;

#[cfg(feature = "rendering")]
mod glyph;
#[cfg(feature = "rendering")]
pub mod rasterizer;

// Re-export key types
pub use display_list::{
    ClipShape, DisplayList, DrawCommand, FillStyle, Glyph, GlyphRun, StrokeStyle,
};
pub use graphics_state::{
    Color, FillRule, GraphicsState, LineCap, LineJoin, Matrix, StrokeProps, TextRenderingMode,
};
pub use interpreter::Interpreter;
pub use path::{Path, PathElement};
pub use target::{rgb565, CancellationToken, PageGeometry, PixelFormat, RasterTarget, RenderOutcome};

#[cfg(feature = "rendering")]
pub use rasterizer::rasterize;
