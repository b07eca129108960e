//! `/ToUnicode` CMap parsing.
//!
//! Only the `bfchar` and `bfrange` sections matter for mapping character
//! codes to text; everything else in the CMap program is skipped.
//!
//! Based on PDF.js src/core/cmap.js
//!
//! Example:
//! ```text
//! 1 begincodespacerange <0000> <FFFF> endcodespacerange
//! 2 beginbfchar
//! <0003> <0020>
//! <0005> <0041>
//! endbfchar
//! 1 beginbfrange
//! <0010> <0020> <0030>
//! endbfrange
//! ```

use super::error::PDFResult;
use super::lexer::Lexer;
use super::parser::{PDFObject, Parser};
use super::stream::Stream;
use rustc_hash::FxHashMap;

/// Ranges wider than this are truncated; real CMaps never need more.
const MAX_RANGE: u32 = 0xFFFF;

#[derive(Debug, Clone, Default)]
pub struct ToUnicodeMap {
    mappings: FxHashMap<u32, String>,
}

impl ToUnicodeMap {
    pub fn parse(data: &[u8]) -> PDFResult<Self> {
        let lexer = Lexer::new(Box::new(Stream::from_bytes(data.to_vec())))?;
        let mut parser = Parser::new(lexer)?;
        let mut map = ToUnicodeMap::default();

        while parser.has_more() {
            let obj = match parser.get_object() {
                Ok(obj) => obj,
                Err(_) => continue,
            };
            match &obj {
                PDFObject::Command(cmd) if cmd == "beginbfchar" => map.read_bfchar(&mut parser),
                PDFObject::Command(cmd) if cmd == "beginbfrange" => map.read_bfrange(&mut parser),
                _ => {}
            }
        }

        Ok(map)
    }

    /// `<src> <dst>` pairs up to `endbfchar`.
    fn read_bfchar(&mut self, parser: &mut Parser) {
        while parser.has_more() && parser.peek_command() != Some("endbfchar") {
            let (Ok(src), Ok(dst)) = (parser.get_object(), parser.get_object()) else {
                continue;
            };
            if let (Some(code), Some(text)) = (code_of(&src), text_of(&dst)) {
                self.mappings.insert(code, text);
            }
        }
    }

    /// `<lo> <hi> <dst>` or `<lo> <hi> [<dst> ...]` triples up to `endbfrange`.
    fn read_bfrange(&mut self, parser: &mut Parser) {
        while parser.has_more() && parser.peek_command() != Some("endbfrange") {
            let (Ok(lo), Ok(hi), Ok(dst)) =
                (parser.get_object(), parser.get_object(), parser.get_object())
            else {
                continue;
            };
            let (Some(lo), Some(hi)) = (code_of(&lo), code_of(&hi)) else {
                continue;
            };
            let hi = hi.min(lo.saturating_add(MAX_RANGE));

            match &dst {
                PDFObject::Array(items) => {
                    for (code, item) in (lo..=hi).zip(items.iter()) {
                        if let Some(text) = text_of(item) {
                            self.mappings.insert(code, text);
                        }
                    }
                }
                other => {
                    let Some(units) = other.as_bytes().map(utf16_units) else {
                        continue;
                    };
                    let Some((&last, prefix)) = units.split_last() else {
                        continue;
                    };
                    for (offset, code) in (lo..=hi).enumerate() {
                        let mut shifted = prefix.to_vec();
                        shifted.push(last.wrapping_add(offset as u16));
                        self.mappings
                            .insert(code, String::from_utf16_lossy(&shifted));
                    }
                }
            }
        }
    }

    pub fn lookup(&self, code: u32) -> Option<&str> {
        self.mappings.get(&code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

fn code_of(obj: &PDFObject) -> Option<u32> {
    let bytes = obj.as_bytes()?;
    if bytes.is_empty() || bytes.len() > 4 {
        return None;
    }
    Some(bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
}

fn text_of(obj: &PDFObject) -> Option<String> {
    match obj {
        PDFObject::Name(name) => Some(name.clone()),
        other => other
            .as_bytes()
            .map(|b| String::from_utf16_lossy(&utf16_units(b))),
    }
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [single] => u16::from(*single),
            _ => 0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CMAP: &[u8] = b"/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CMapName /Adobe-Identity-UCS def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
2 beginbfchar
<0003> <0020>
<0005> <00660069>
endbfchar
2 beginbfrange
<0010> <0012> <0041>
<0020> <0021> [<0078> <0079>]
endbfrange
endcmap";

    #[test]
    fn test_bfchar_and_bfrange() {
        let map = ToUnicodeMap::parse(CMAP).unwrap();
        assert_eq!(map.lookup(3), Some(" "));
        assert_eq!(map.lookup(5), Some("fi"));
        assert_eq!(map.lookup(0x11), Some("B"));
        assert_eq!(map.lookup(0x12), Some("C"));
        assert_eq!(map.lookup(0x21), Some("y"));
        assert_eq!(map.lookup(0x13), None);
        assert_eq!(map.len(), 7);
    }

    #[test]
    fn test_garbage_is_ignored() {
        let map = ToUnicodeMap::parse(b"1 beginbfchar <01> endbfchar ]] <<").unwrap();
        assert!(map.is_empty());
    }
}
