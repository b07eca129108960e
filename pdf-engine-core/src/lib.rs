//! # pdf-engine-core: a PDF document engine
//!
//! Opens PDF files, exposes their page tree, metadata and bookmarks, and
//! renders pages into caller-owned bitmaps. The design follows PDF.js: a
//! lexer and parser over an in-memory buffer, a cross-reference table with a
//! recovery scan for damaged files, lazily resolved and cached objects, and a
//! content stream interpreter that feeds a rasterizer.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdf_engine_core::{PDFDocument, PixelFormat, RasterTarget, RenderOptions};
//!
//! let doc = PDFDocument::open_file("document.pdf")?;
//! println!("{} pages", doc.page_count()?);
//!
//! for bookmark in doc.outline()? {
//!     println!("{} -> {:?}", bookmark.title, bookmark.page_index);
//! }
//!
//! let page = doc.get_page(0)?;
//! let mut pixels = vec![0u8; 200 * 300 * 2];
//! let mut target = RasterTarget::new(200, 300, PixelFormat::Rgb565, &mut pixels)?;
//! let options = RenderOptions::fit(page.width()?, page.height()?, 200, 300);
//! page.render(&mut target, &options)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! 1. **Container layer**: header, cross-reference sections and trailer,
//!    rebuilt by scanning for `obj` markers when they are damaged
//! 2. **Object layer**: lazy, cached resolution of indirect objects with
//!    cycle detection, and stream filters
//! 3. **Document layer**: page tree with inherited attributes, document
//!    information and the outline
//! 4. **Content layer**: operators to [`DisplayList`] draw commands, and the
//!    rasterizer that paints them
//!
//! Documents and pages are `Send + Sync`. After [`PDFDocument::close`] every
//! call, including calls through [`Page`] handles, fails with
//! [`PDFError::DocumentClosed`].

pub mod core;
pub mod rendering;

// Re-export main types for convenience
pub use core::{
    Bookmark, DestinationKind, DocumentInfo, OpenOptions, Page, PDFDocument, PDFError, PDFObject,
    PDFResult, Rect, Ref, RenderOptions,
};

// Re-export rendering types
pub use rendering::{
    CancellationToken, DisplayList, DrawCommand, PageGeometry, PixelFormat, RasterTarget,
    RenderOutcome,
};

#[cfg(feature = "rendering")]
pub use rendering::rasterize;

// Re-export decode module
pub use core::decode;
