//! Font dictionaries: metrics, encodings and font programs.
//!
//! A [`Font`] carries what the interpreter needs to lay out a string:
//! how bytes split into character codes, the advance of each code, the text
//! each code stands for, and the font program that draws it. Turning a
//! program into outlines happens in the rendering layer.
//!
//! Based on PDF.js src/core/fonts.js and src/core/evaluator.js
//! (translateFont, extractWidths)

use super::cmap::ToUnicodeMap;
use super::config::OpenOptions;
use super::encoding::{self, BaseEncoding};
use super::error::PDFResult;
use super::object_store::ObjectStore;
use super::parser::{PDFDict, PDFObject};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// `/W` ranges wider than this are clamped.
const MAX_CID_RANGE: u32 = 0xFFFF;

/// How deep `font_search_dirs` are walked looking for font files.
const MAX_FONT_DIR_DEPTH: usize = 4;

/// Default advance, in thousandths of an em, for composite fonts.
const DEFAULT_CID_WIDTH: f64 = 1000.0;

/// Font dictionary `/Subtype`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontKind {
    Type1,
    MMType1,
    TrueType,
    /// Glyphs are content streams; drawing them is not supported.
    Type3,
    /// Composite font with a CIDFont descendant.
    Type0,
}

impl FontKind {
    pub fn from_subtype(subtype: &str) -> Option<Self> {
        match subtype {
            "Type1" => Some(FontKind::Type1),
            "MMType1" => Some(FontKind::MMType1),
            "TrueType" => Some(FontKind::TrueType),
            "Type3" => Some(FontKind::Type3),
            "Type0" => Some(FontKind::Type0),
            _ => None,
        }
    }
}

/// Format of a font program's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramFormat {
    /// sfnt container with `glyf` outlines (`/FontFile2` or a system font).
    TrueType,
    /// sfnt container, possibly with CFF outlines (`/FontFile3 /OpenType`).
    OpenType,
    /// Bare CFF (`/FontFile3 /Type1C` or `/CIDFontType0C`).
    Cff,
}

/// A font program ready for glyph lookup.
#[derive(Debug, Clone)]
pub struct FontProgram {
    pub data: Arc<Vec<u8>>,
    pub format: ProgramFormat,
    /// False when the program was found on the system instead of in the file.
    pub embedded: bool,
}

/// CID to glyph id mapping of a CIDFontType2 descendant.
#[derive(Debug, Clone, PartialEq)]
pub enum CidToGid {
    Identity,
    Table(Vec<u16>),
}

impl CidToGid {
    pub fn map(&self, cid: u32) -> u16 {
        match self {
            CidToGid::Identity => cid.min(u32::from(u16::MAX)) as u16,
            CidToGid::Table(table) => table.get(cid as usize).copied().unwrap_or(0),
        }
    }
}

/// Metrics of a composite font's descendant.
#[derive(Debug, Clone)]
pub struct CidMetrics {
    pub vertical: bool,
    pub default_width: f64,
    pub widths: FxHashMap<u32, f64>,
    pub cid_to_gid: CidToGid,
}

/// A character code read from a string, with its byte length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharCode {
    pub code: u32,
    pub len: usize,
}

/// A loaded font resource.
#[derive(Debug, Clone)]
pub struct Font {
    pub name: String,
    pub kind: FontKind,
    base_encoding: BaseEncoding,
    differences: FxHashMap<u8, String>,
    first_char: u32,
    widths: Vec<f64>,
    missing_width: Option<f64>,
    to_unicode: Option<ToUnicodeMap>,
    cid: Option<CidMetrics>,
    program: Option<FontProgram>,
    /// Glyph space to text space. Only Type3 fonts differ from 1/1000.
    font_matrix: [f64; 6],
    /// Problems found while loading, reported once per use of the font.
    pub warnings: Vec<String>,
}

impl Font {
    /// Loads the font dictionary `dict`.
    ///
    /// Broken sub-objects (widths, encodings, programs) are dropped with a
    /// warning; only an unresolvable descendant of a composite font fails.
    pub fn load(dict: &PDFDict, store: &ObjectStore, options: &OpenOptions) -> PDFResult<Font> {
        let mut warnings = Vec::new();
        let subtype = dict.get("Subtype").and_then(PDFObject::as_name).unwrap_or("Type1");
        let kind = FontKind::from_subtype(subtype).unwrap_or_else(|| {
            warnings.push(format!("unknown font subtype /{}; treating as Type1", subtype));
            FontKind::Type1
        });
        let name = dict
            .get("BaseFont")
            .and_then(PDFObject::as_name)
            .unwrap_or("")
            .to_string();

        let mut font = Font {
            name,
            kind,
            base_encoding: BaseEncoding::Standard,
            differences: FxHashMap::default(),
            first_char: 0,
            widths: Vec::new(),
            missing_width: None,
            to_unicode: None,
            cid: None,
            program: None,
            font_matrix: [0.001, 0.0, 0.0, 0.001, 0.0, 0.0],
            warnings,
        };

        font.to_unicode = store
            .get_lenient(dict, "ToUnicode")
            .filter(|s| s.is_stream())
            .and_then(|s| match store.decode_stream(&s) {
                Ok(data) => ToUnicodeMap::parse(&data).ok(),
                Err(e) => {
                    font.warnings.push(format!("ToUnicode: {}", e));
                    None
                }
            });

        match kind {
            FontKind::Type0 => font.load_composite(dict, store, options)?,
            _ => font.load_simple(dict, store, options),
        }

        for warning in &font.warnings {
            tracing::debug!("font {}: {}", font.name, warning);
        }
        Ok(font)
    }

    fn load_simple(&mut self, dict: &PDFDict, store: &ObjectStore, options: &OpenOptions) {
        if self.kind == FontKind::Type3 {
            if let Some(matrix) = store
                .get_lenient(dict, "FontMatrix")
                .and_then(|m| m.as_number_array())
                .filter(|m| m.len() == 6)
            {
                self.font_matrix.copy_from_slice(&matrix);
            }
        }

        self.first_char = store
            .get_lenient(dict, "FirstChar")
            .and_then(|v| v.as_usize())
            .unwrap_or(0) as u32;
        if let Some(widths) = store.get_lenient(dict, "Widths") {
            self.widths = widths
                .as_array()
                .unwrap_or_default()
                .iter()
                .map(|w| {
                    store
                        .resolve_object(w)
                        .ok()
                        .and_then(|w| w.as_number())
                        .unwrap_or(0.0)
                })
                .collect();
        }

        let descriptor = store.get_lenient(dict, "FontDescriptor");
        let descriptor = descriptor.as_ref().and_then(|d| d.as_dict());
        if let Some(descriptor) = descriptor {
            self.missing_width = store
                .get_lenient(descriptor, "MissingWidth")
                .and_then(|w| w.as_number());
        }
        let symbolic = descriptor
            .and_then(|d| d.get("Flags"))
            .and_then(PDFObject::as_int)
            .is_some_and(|flags| flags & 4 != 0);

        let embedded = descriptor.and_then(|d| self.embedded_program(d, store));
        let has_program = embedded.is_some();
        self.program = embedded;

        self.base_encoding = match self.kind {
            FontKind::TrueType if symbolic => BaseEncoding::Builtin,
            FontKind::Type1 | FontKind::MMType1 if symbolic && has_program => {
                BaseEncoding::Builtin
            }
            FontKind::TrueType => BaseEncoding::WinAnsi,
            _ => BaseEncoding::Standard,
        };
        if let Some(encoding) = store.get_lenient(dict, "Encoding") {
            self.read_encoding(&encoding, store);
        }

        if self.program.is_none() && self.kind != FontKind::Type3 {
            let flags = descriptor
                .and_then(|d| d.get("Flags"))
                .and_then(PDFObject::as_int)
                .unwrap_or(0);
            self.program = find_system_font(&self.name, flags, &options.font_search_dirs);
            if self.program.is_none() {
                self.warnings
                    .push(format!("no font program for {}; glyphs are not drawn", self.name));
            }
        }
    }

    fn read_encoding(&mut self, encoding: &PDFObject, store: &ObjectStore) {
        match encoding {
            PDFObject::Name(name) => match BaseEncoding::from_name(name) {
                Some(base) => self.base_encoding = base,
                None => self.warnings.push(format!("unknown encoding /{}", name)),
            },
            PDFObject::Dictionary(dict) => {
                if let Some(base) = dict
                    .get("BaseEncoding")
                    .and_then(PDFObject::as_name)
                    .and_then(BaseEncoding::from_name)
                {
                    self.base_encoding = base;
                }
                let Some(differences) = store.get_lenient(dict, "Differences") else {
                    return;
                };
                let mut code: u32 = 0;
                for item in differences.as_array().unwrap_or_default() {
                    match &**item {
                        PDFObject::Number(n) => code = n.max(0.0) as u32,
                        PDFObject::Name(glyph) => {
                            if let Ok(byte) = u8::try_from(code) {
                                self.differences.insert(byte, glyph.clone());
                            }
                            code += 1;
                        }
                        _ => {}
                    }
                }
            }
            other => self
                .warnings
                .push(format!("ignoring /Encoding of type {}", other.type_name())),
        }
    }

    fn load_composite(
        &mut self,
        dict: &PDFDict,
        store: &ObjectStore,
        options: &OpenOptions,
    ) -> PDFResult<()> {
        let vertical = match store.get_lenient(dict, "Encoding").as_deref() {
            Some(PDFObject::Name(name)) if name == "Identity-H" => false,
            Some(PDFObject::Name(name)) if name == "Identity-V" => true,
            Some(other) => {
                self.warnings.push(format!(
                    "CMap {} is not supported; reading codes as Identity-H",
                    other.as_name().unwrap_or(other.type_name())
                ));
                false
            }
            None => false,
        };

        let descendants = store.get(dict, "DescendantFonts")?;
        let first = descendants
            .as_ref()
            .and_then(|d| d.as_array())
            .and_then(|a| a.first());
        let descendant = match first {
            Some(first) => Some(store.resolve_object(first)?.into_shared()),
            None => None,
        };
        let empty = PDFDict::new();
        let cid_font = descendant.as_ref().and_then(|d| d.as_dict()).unwrap_or(&empty);
        if descendant.is_none() {
            self.warnings.push("Type0 font has no descendant".to_string());
        }

        let default_width = store
            .get_lenient(cid_font, "DW")
            .and_then(|w| w.as_number())
            .unwrap_or(DEFAULT_CID_WIDTH);
        let widths = store
            .get_lenient(cid_font, "W")
            .map(|w| parse_cid_widths(&w, store))
            .unwrap_or_default();

        let cid_to_gid = match store.get_lenient(cid_font, "CIDToGIDMap") {
            Some(map) if map.is_stream() => match store.decode_stream(&map) {
                Ok(data) => CidToGid::Table(
                    data.chunks_exact(2)
                        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                        .collect(),
                ),
                Err(e) => {
                    self.warnings.push(format!("CIDToGIDMap: {}", e));
                    CidToGid::Identity
                }
            },
            _ => CidToGid::Identity,
        };

        self.cid = Some(CidMetrics {
            vertical,
            default_width,
            widths,
            cid_to_gid,
        });

        let descriptor = store.get_lenient(cid_font, "FontDescriptor");
        let descriptor = descriptor.as_ref().and_then(|d| d.as_dict());
        self.program = descriptor.and_then(|d| self.embedded_program(d, store));
        if self.program.is_none() {
            let flags = descriptor
                .and_then(|d| d.get("Flags"))
                .and_then(PDFObject::as_int)
                .unwrap_or(0);
            self.program = find_system_font(&self.name, flags, &options.font_search_dirs);
            if self.program.is_none() {
                self.warnings
                    .push(format!("no font program for {}; glyphs are not drawn", self.name));
            }
        }
        Ok(())
    }

    /// Reads `/FontFile2` or `/FontFile3` from a descriptor.
    fn embedded_program(
        &mut self,
        descriptor: &PDFDict,
        store: &ObjectStore,
    ) -> Option<FontProgram> {
        let (stream, format) = if let Some(file) = store.get_lenient(descriptor, "FontFile2") {
            (file, ProgramFormat::TrueType)
        } else if let Some(file) = store.get_lenient(descriptor, "FontFile3") {
            let format = match file.get("Subtype").and_then(PDFObject::as_name) {
                Some("OpenType") => ProgramFormat::OpenType,
                _ => ProgramFormat::Cff,
            };
            (file, format)
        } else {
            if descriptor.contains_key("FontFile") {
                self.warnings
                    .push("embedded Type1 programs are not supported".to_string());
            }
            return None;
        };

        match store.decode_stream(&stream) {
            Ok(data) if !data.is_empty() => Some(FontProgram {
                data: Arc::new(data),
                format,
                embedded: true,
            }),
            Ok(_) => None,
            Err(e) => {
                self.warnings.push(format!("font program: {}", e));
                None
            }
        }
    }

    pub fn is_composite(&self) -> bool {
        self.cid.is_some()
    }

    pub fn is_vertical(&self) -> bool {
        self.cid.as_ref().is_some_and(|c| c.vertical)
    }

    pub fn program(&self) -> Option<&FontProgram> {
        self.program.as_ref()
    }

    pub fn cid_metrics(&self) -> Option<&CidMetrics> {
        self.cid.as_ref()
    }

    pub fn font_matrix(&self) -> [f64; 6] {
        self.font_matrix
    }

    /// Splits a string operand into character codes.
    pub fn char_codes(&self, bytes: &[u8]) -> Vec<CharCode> {
        if self.is_composite() {
            bytes
                .chunks(2)
                .map(|pair| CharCode {
                    code: pair.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b)),
                    len: pair.len(),
                })
                .collect()
        } else {
            bytes
                .iter()
                .map(|&b| CharCode {
                    code: u32::from(b),
                    len: 1,
                })
                .collect()
        }
    }

    /// Advance of `code` in thousandths of text space, if the font says.
    pub fn width(&self, code: u32) -> Option<f64> {
        if let Some(cid) = &self.cid {
            return Some(cid.widths.get(&code).copied().unwrap_or(cid.default_width));
        }
        let declared = code
            .checked_sub(self.first_char)
            .and_then(|i| self.widths.get(i as usize))
            .copied()
            .or(self.missing_width)?;
        // Type3 widths are in glyph space.
        Some(declared * self.font_matrix[0] * 1000.0)
    }

    /// The glyph name a simple font assigns to `code`.
    pub fn glyph_name(&self, code: u32) -> Option<&str> {
        let byte = u8::try_from(code).ok()?;
        if let Some(name) = self.differences.get(&byte) {
            return Some(name);
        }
        self.base_encoding
            .to_unicode(byte)
            .and_then(encoding::unicode_to_glyph_name)
    }

    /// Text for `code`: `/ToUnicode` first, then the simple-font encoding.
    pub fn unicode(&self, code: u32) -> Option<String> {
        if let Some(text) = self.to_unicode.as_ref().and_then(|m| m.lookup(code)) {
            return Some(text.to_string());
        }
        if self.is_composite() {
            return None;
        }
        let byte = u8::try_from(code).ok()?;
        let ch = match self.differences.get(&byte) {
            Some(name) => encoding::glyph_name_to_unicode(name),
            None => self.base_encoding.to_unicode(byte),
        };
        ch.map(String::from)
    }

    /// Whether the encoding of `code` is defined by the font program alone.
    pub fn uses_builtin_encoding(&self, code: u32) -> bool {
        self.base_encoding == BaseEncoding::Builtin
            && u8::try_from(code).is_ok_and(|b| !self.differences.contains_key(&b))
    }
}

/// Parses `/W`: `c [w1 w2 ...]` and `cfirst clast w` groups.
fn parse_cid_widths(w: &PDFObject, store: &ObjectStore) -> FxHashMap<u32, f64> {
    let mut widths = FxHashMap::default();
    let items: Vec<PDFObject> = w
        .as_array()
        .unwrap_or_default()
        .iter()
        .filter_map(|item| store.resolve_object(item).ok().map(|v| (*v).clone()))
        .collect();

    let mut i = 0;
    while i < items.len() {
        let Some(first) = items[i].as_usize().map(|n| n as u32) else {
            i += 1;
            continue;
        };
        match items.get(i + 1) {
            Some(PDFObject::Array(list)) => {
                for (offset, width) in list.iter().enumerate() {
                    let width = store.resolve_object(width).ok().and_then(|w| w.as_number());
                    if let Some(width) = width {
                        widths.insert(first + offset as u32, width);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Some(last), Some(width)) = (
                    last.as_usize().map(|n| n as u32),
                    items.get(i + 2).and_then(PDFObject::as_number),
                ) else {
                    i += 3;
                    continue;
                };
                for cid in first..=last.min(first.saturating_add(MAX_CID_RANGE)) {
                    widths.insert(cid, width);
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

/// Strips a subset tag such as `ABCDEF+`.
pub fn strip_subset_prefix(name: &str) -> &str {
    match name.split_once('+') {
        Some((tag, rest)) if tag.len() == 6 && tag.bytes().all(|b| b.is_ascii_uppercase()) => rest,
        _ => name,
    }
}

/// Candidate file names for a non-embedded font, best match first.
fn fallback_candidates(name: &str, flags: i64) -> Vec<&'static str> {
    let lower = strip_subset_prefix(name).to_ascii_lowercase();
    if lower.contains("symbol") || lower.contains("dingbats") {
        return Vec::new();
    }
    let bold = lower.contains("bold") || lower.contains("black") || lower.contains("heavy");
    let italic = lower.contains("italic") || lower.contains("oblique");
    let mono = lower.contains("courier") || lower.contains("mono") || flags & 1 != 0;
    let serif = !mono
        && (lower.contains("times")
            || lower.contains("georgia")
            || lower.contains("serif") && !lower.contains("sans")
            || flags & 2 != 0);

    // Regular, bold, italic, bold italic.
    let style = usize::from(bold) + 2 * usize::from(italic);
    let pick = |names: [&'static str; 4]| names[style];
    if mono {
        vec![
            pick([
                "LiberationMono-Regular.ttf",
                "LiberationMono-Bold.ttf",
                "LiberationMono-Italic.ttf",
                "LiberationMono-BoldItalic.ttf",
            ]),
            pick([
                "DejaVuSansMono.ttf",
                "DejaVuSansMono-Bold.ttf",
                "DejaVuSansMono-Oblique.ttf",
                "DejaVuSansMono-BoldOblique.ttf",
            ]),
            pick(["cour.ttf", "courbd.ttf", "couri.ttf", "courbi.ttf"]),
            "LiberationMono-Regular.ttf",
            "DejaVuSansMono.ttf",
        ]
    } else if serif {
        vec![
            pick([
                "LiberationSerif-Regular.ttf",
                "LiberationSerif-Bold.ttf",
                "LiberationSerif-Italic.ttf",
                "LiberationSerif-BoldItalic.ttf",
            ]),
            pick([
                "DejaVuSerif.ttf",
                "DejaVuSerif-Bold.ttf",
                "DejaVuSerif-Italic.ttf",
                "DejaVuSerif-BoldItalic.ttf",
            ]),
            pick(["times.ttf", "timesbd.ttf", "timesi.ttf", "timesbi.ttf"]),
            "LiberationSerif-Regular.ttf",
            "DejaVuSerif.ttf",
        ]
    } else {
        vec![
            pick([
                "LiberationSans-Regular.ttf",
                "LiberationSans-Bold.ttf",
                "LiberationSans-Italic.ttf",
                "LiberationSans-BoldItalic.ttf",
            ]),
            pick([
                "DejaVuSans.ttf",
                "DejaVuSans-Bold.ttf",
                "DejaVuSans-Oblique.ttf",
                "DejaVuSans-BoldOblique.ttf",
            ]),
            pick(["arial.ttf", "arialbd.ttf", "ariali.ttf", "arialbi.ttf"]),
            "LiberationSans-Regular.ttf",
            "DejaVuSans.ttf",
        ]
    }
}

type FontFileCache = Mutex<FxHashMap<(Vec<PathBuf>, &'static str), Option<Arc<Vec<u8>>>>>;

/// Font files are shared across documents; directories are walked once per
/// candidate name.
fn font_file_cache() -> &'static FontFileCache {
    static CACHE: OnceLock<FontFileCache> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(FxHashMap::default()))
}

/// Looks for a system font standing in for `name`.
pub fn find_system_font(name: &str, flags: i64, dirs: &[PathBuf]) -> Option<FontProgram> {
    for candidate in fallback_candidates(name, flags) {
        let key = (dirs.to_vec(), candidate);
        if let Some(cached) = font_file_cache().lock().get(&key) {
            match cached {
                Some(data) => {
                    return Some(FontProgram {
                        data: Arc::clone(data),
                        format: ProgramFormat::TrueType,
                        embedded: false,
                    });
                }
                None => continue,
            }
        }

        let found = dirs
            .iter()
            .find_map(|dir| find_file(dir, candidate, MAX_FONT_DIR_DEPTH))
            .and_then(|path| std::fs::read(&path).ok())
            .map(Arc::new);
        font_file_cache().lock().insert(key, found.clone());

        if let Some(data) = found {
            tracing::debug!("using system font {} for {}", candidate, name);
            return Some(FontProgram {
                data,
                format: ProgramFormat::TrueType,
                embedded: false,
            });
        }
    }
    None
}

fn find_file(dir: &Path, file_name: &str, depth: usize) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.eq_ignore_ascii_case(file_name))
        {
            return Some(path);
        }
    }
    if depth == 0 {
        return None;
    }
    subdirs.sort();
    subdirs
        .iter()
        .find_map(|sub| find_file(sub, file_name, depth - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::xref::XRefTable;

    fn empty_store() -> ObjectStore {
        ObjectStore::new(
            Arc::new(Vec::new()),
            XRefTable::from_parts(FxHashMap::default(), PDFDict::new()),
            false,
            false,
            32,
        )
    }

    fn dict(entries: Vec<(&str, PDFObject)>) -> PDFDict {
        entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    fn name(n: &str) -> PDFObject {
        PDFObject::Name(n.to_string())
    }

    fn array(items: Vec<PDFObject>) -> PDFObject {
        PDFObject::Array(items.into_iter().map(Box::new).collect())
    }

    fn no_fonts() -> OpenOptions {
        OpenOptions::default().with_font_search_dirs(Vec::new())
    }

    #[test]
    fn test_simple_font_widths_and_encoding() {
        let store = empty_store();
        let font_dict = dict(vec![
            ("Type", name("Font")),
            ("Subtype", name("Type1")),
            ("BaseFont", name("Helvetica")),
            ("FirstChar", PDFObject::Number(65.0)),
            ("Widths", array(vec![PDFObject::Number(667.0), PDFObject::Number(600.0)])),
            (
                "Encoding",
                PDFObject::Dictionary(dict(vec![
                    ("BaseEncoding", name("WinAnsiEncoding")),
                    (
                        "Differences",
                        array(vec![PDFObject::Number(66.0), name("emdash"), name("uni20AC")]),
                    ),
                ])),
            ),
        ]);
        let font = Font::load(&font_dict, &store, &no_fonts()).unwrap();

        assert_eq!(font.kind, FontKind::Type1);
        assert_eq!(font.width(65), Some(667.0));
        assert_eq!(font.width(66), Some(600.0));
        assert_eq!(font.width(90), None);
        assert_eq!(font.unicode(65).as_deref(), Some("A"));
        assert_eq!(font.unicode(66).as_deref(), Some("—"));
        assert_eq!(font.unicode(67).as_deref(), Some("€"));
        assert_eq!(font.glyph_name(66), Some("emdash"));
        assert_eq!(font.glyph_name(65), Some("A"));
        assert!(font.program().is_none());
        assert!(!font.warnings.is_empty());
    }

    #[test]
    fn test_type3_widths_scaled_by_font_matrix() {
        let store = empty_store();
        let font_dict = dict(vec![
            ("Subtype", name("Type3")),
            (
                "FontMatrix",
                array(vec![
                    PDFObject::Number(0.01),
                    PDFObject::Number(0.0),
                    PDFObject::Number(0.0),
                    PDFObject::Number(0.01),
                    PDFObject::Number(0.0),
                    PDFObject::Number(0.0),
                ]),
            ),
            ("FirstChar", PDFObject::Number(0.0)),
            ("Widths", array(vec![PDFObject::Number(50.0)])),
        ]);
        let font = Font::load(&font_dict, &store, &no_fonts()).unwrap();
        assert_eq!(font.kind, FontKind::Type3);
        assert!((font.width(0).unwrap() - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_composite_font_codes_and_widths() {
        let store = empty_store();
        let descendant = dict(vec![
            ("Subtype", name("CIDFontType2")),
            ("DW", PDFObject::Number(500.0)),
            (
                "W",
                array(vec![
                    PDFObject::Number(1.0),
                    array(vec![PDFObject::Number(100.0), PDFObject::Number(200.0)]),
                    PDFObject::Number(10.0),
                    PDFObject::Number(12.0),
                    PDFObject::Number(300.0),
                ]),
            ),
        ]);
        let font_dict = dict(vec![
            ("Subtype", name("Type0")),
            ("BaseFont", name("ABCDEF+Custom")),
            ("Encoding", name("Identity-H")),
            ("DescendantFonts", array(vec![PDFObject::Dictionary(descendant)])),
        ]);
        let font = Font::load(&font_dict, &store, &no_fonts()).unwrap();

        assert!(font.is_composite());
        assert!(!font.is_vertical());
        let codes = font.char_codes(&[0x00, 0x01, 0x00, 0x0B]);
        assert_eq!(codes.iter().map(|c| c.code).collect::<Vec<_>>(), vec![1, 11]);
        assert_eq!(font.width(1), Some(100.0));
        assert_eq!(font.width(2), Some(200.0));
        assert_eq!(font.width(11), Some(300.0));
        assert_eq!(font.width(40), Some(500.0));
        assert_eq!(font.cid_metrics().unwrap().cid_to_gid.map(7), 7);
        assert_eq!(font.unicode(1), None);
    }

    #[test]
    fn test_unsupported_cmap_warns() {
        let store = empty_store();
        let font_dict = dict(vec![
            ("Subtype", name("Type0")),
            ("Encoding", name("UniJIS-UCS2-H")),
            ("DescendantFonts", array(vec![PDFObject::Dictionary(PDFDict::new())])),
        ]);
        let font = Font::load(&font_dict, &store, &no_fonts()).unwrap();
        assert!(font.warnings.iter().any(|w| w.contains("UniJIS-UCS2-H")));
    }

    #[test]
    fn test_truetype_defaults_to_win_ansi() {
        let store = empty_store();
        let font_dict = dict(vec![("Subtype", name("TrueType")), ("BaseFont", name("Arial"))]);
        let font = Font::load(&font_dict, &store, &no_fonts()).unwrap();
        assert_eq!(font.unicode(0x80).as_deref(), Some("€"));
    }

    #[test]
    fn test_subset_prefix_and_candidates() {
        assert_eq!(strip_subset_prefix("ABCDEF+Times-Bold"), "Times-Bold");
        assert_eq!(strip_subset_prefix("Abcdef+Times"), "Abcdef+Times");
        assert_eq!(fallback_candidates("Times-Bold", 0)[0], "LiberationSerif-Bold.ttf");
        assert_eq!(
            fallback_candidates("Helvetica-Oblique", 0)[0],
            "LiberationSans-Italic.ttf"
        );
        assert_eq!(fallback_candidates("CourierNew", 0)[0], "LiberationMono-Regular.ttf");
        assert!(fallback_candidates("Symbol", 0).is_empty());
    }

    #[test]
    fn test_system_font_found_in_search_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("truetype").join("liberation");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("LiberationSans-Bold.ttf"), b"not really a font").unwrap();

        let program =
            find_system_font("Helvetica-Bold", 0, &[dir.path().to_path_buf()]).unwrap();
        assert!(!program.embedded);
        assert_eq!(program.data.as_slice(), b"not really a font");
    }
}
