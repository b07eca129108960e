//! Glyph outlines from embedded or system font programs.
//!
//! Outlines come back in text space of a one-point font: one unit is one em,
//! y points up. The caller scales them by the glyph's text matrix.

use crate::core::encoding;
use crate::core::font::{Font, ProgramFormat};
use tiny_skia::{Path, PathBuilder};
use ttf_parser::{cff, Face, GlyphId, OutlineBuilder, PlatformId};

/// Private-use offset symbolic TrueType fonts map their codes to.
const SYMBOL_OFFSET: u32 = 0xF000;

/// Bare CFF programs are laid out on a 1000 unit em.
const CFF_UNITS_PER_EM: f32 = 1000.0;

/// Collects outline segments into a tiny-skia path, scaled to em units.
struct PathConverter {
    builder: PathBuilder,
    scale: f32,
}

impl OutlineBuilder for PathConverter {
    fn move_to(&mut self, x: f32, y: f32) {
        self.builder.move_to(x * self.scale, y * self.scale);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(x * self.scale, y * self.scale);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let s = self.scale;
        self.builder.quad_to(x1 * s, y1 * s, x * s, y * s);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let s = self.scale;
        self.builder.cubic_to(x1 * s, y1 * s, x2 * s, y2 * s, x * s, y * s);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

enum Program<'f> {
    Sfnt(Face<'f>),
    Cff(cff::Table<'f>),
}

/// A parsed font program bound to the PDF font that uses it.
pub(crate) struct GlyphSource<'f> {
    font: &'f Font,
    program: Program<'f>,
}

impl<'f> GlyphSource<'f> {
    /// Parses the font's program. `None` when there is none or it is broken.
    pub(crate) fn new(font: &'f Font) -> Option<Self> {
        let program = font.program()?;
        let data = program.data.as_slice();
        let program = match program.format {
            ProgramFormat::TrueType | ProgramFormat::OpenType => {
                Program::Sfnt(Face::parse(data, 0).ok()?)
            }
            ProgramFormat::Cff => Program::Cff(cff::Table::parse(data)?),
        };
        Some(GlyphSource { font, program })
    }

    /// Outline of `code` in em units, or `None` for blank or unmapped glyphs.
    pub(crate) fn outline(&self, code: u32) -> Option<Path> {
        let gid = self.glyph_id(code)?;
        match &self.program {
            Program::Sfnt(face) => {
                let mut converter = PathConverter {
                    builder: PathBuilder::new(),
                    scale: 1.0 / f32::from(face.units_per_em().max(1)),
                };
                face.outline_glyph(gid, &mut converter)?;
                converter.builder.finish()
            }
            Program::Cff(table) => {
                let mut converter = PathConverter {
                    builder: PathBuilder::new(),
                    scale: 1.0 / CFF_UNITS_PER_EM,
                };
                table.outline(gid, &mut converter).ok()?;
                converter.builder.finish()
            }
        }
    }

    /// Advance of `code` in thousandths of an em.
    pub(crate) fn advance(&self, code: u32) -> Option<f64> {
        let gid = self.glyph_id(code)?;
        match &self.program {
            Program::Sfnt(face) => {
                let advance = face.glyph_hor_advance(gid)?;
                Some(f64::from(advance) * 1000.0 / f64::from(face.units_per_em().max(1)))
            }
            Program::Cff(_) => None,
        }
    }

    fn glyph_id(&self, code: u32) -> Option<GlyphId> {
        match &self.program {
            Program::Sfnt(face) => self.sfnt_glyph_id(face, code),
            Program::Cff(table) => self.cff_glyph_id(table, code),
        }
    }

    fn sfnt_glyph_id(&self, face: &Face<'_>, code: u32) -> Option<GlyphId> {
        if let Some(metrics) = self.font.cid_metrics() {
            return Some(GlyphId(metrics.cid_to_gid.map(code)));
        }
        let builtin = self.font.uses_builtin_encoding(code);
        if !builtin {
            let by_unicode = self
                .font
                .glyph_name(code)
                .and_then(encoding::glyph_name_to_unicode)
                .and_then(|ch| face.glyph_index(ch));
            if by_unicode.is_some() {
                return by_unicode;
            }
            let by_name = self
                .font
                .glyph_name(code)
                .and_then(|name| face.glyph_index_by_name(name));
            if let Some(gid) = by_name {
                return Some(gid);
            }
        }
        // Symbolic fonts: look the raw code up in the symbol or Mac subtables.
        let subtables = face.tables().cmap.map(|table| table.subtables);
        let lookup = |platform: PlatformId, encoding_id: u16, value: u32| {
            subtables?
                .into_iter()
                .filter(|s| s.platform_id == platform && s.encoding_id == encoding_id)
                .find_map(|s| s.glyph_index(value))
        };
        lookup(PlatformId::Windows, 0, SYMBOL_OFFSET + code)
            .or_else(|| lookup(PlatformId::Windows, 0, code))
            .or_else(|| lookup(PlatformId::Macintosh, 0, code))
            .or_else(|| {
                char::from_u32(code)
                    .filter(|_| builtin)
                    .and_then(|ch| face.glyph_index(ch))
            })
            .filter(|gid| gid.0 != 0)
    }

    fn cff_glyph_id(&self, table: &cff::Table<'_>, code: u32) -> Option<GlyphId> {
        if self.font.is_composite() {
            // CID-keyed programs are taken as identity ordered.
            return u16::try_from(code).ok().map(GlyphId);
        }
        if !self.font.uses_builtin_encoding(code) {
            let by_name = self
                .font
                .glyph_name(code)
                .and_then(|name| table.glyph_index_by_name(name));
            if let Some(gid) = by_name {
                return Some(gid);
            }
        }
        table.glyph_index(u8::try_from(code).ok()?)
    }
}

/// Advance of `code` taken from the font program, in thousandths of an em.
/// Used when the PDF font dictionary has no width for it.
pub(crate) fn program_advance(font: &Font, code: u32) -> Option<f64> {
    GlyphSource::new(font)?.advance(code)
}
