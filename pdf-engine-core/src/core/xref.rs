use super::decode;
use super::error::{PDFError, PDFResult};
use super::lexer::Lexer;
use super::parser::{PDFDict, PDFObject, Parser, Ref};
use super::stream::Stream;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

/// Distance from the end of the file searched for `startxref`.
const STARTXREF_WINDOW: usize = 1024;

/// Upper bound on chained sections, so a hostile `/Prev` chain cannot spin.
const MAX_SECTIONS: usize = 1024;

/// Cross-reference table entry.
///
/// Each entry describes where to find an indirect object in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// The object number is available for reuse.
    Free { next_free: u32, generation: u32 },

    /// Stored uncompressed at the given byte offset.
    Uncompressed { offset: usize, generation: u32 },

    /// Stored inside an object stream.
    Compressed { obj_stream_num: u32, index: u32 },
}

impl XRefEntry {
    pub fn is_free(&self) -> bool {
        matches!(self, XRefEntry::Free { .. })
    }

    pub fn generation(&self) -> u32 {
        match self {
            XRefEntry::Free { generation, .. } | XRefEntry::Uncompressed { generation, .. } => {
                *generation
            }
            XRefEntry::Compressed { .. } => 0,
        }
    }
}

/// The merged result of walking every cross-reference section of a file.
///
/// Based on PDF.js src/core/xref.js
#[derive(Debug, Clone, Default)]
pub struct XRefTable {
    entries: FxHashMap<u32, XRefEntry>,
    trailer: PDFDict,
    /// Number of sections merged, newest first.
    sections: usize,
}

/// Where a section came from, which decides whether it may replace a free entry.
#[derive(Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    Primary,
    HybridStream,
}

impl XRefTable {
    /// Builds a table directly from entries and a trailer (recovery mode).
    pub fn from_parts(entries: FxHashMap<u32, XRefEntry>, trailer: PDFDict) -> Self {
        XRefTable {
            entries,
            trailer,
            sections: 0,
        }
    }

    /// Reads every section reachable from `startxref`, following `/Prev` and
    /// `/XRefStm`. Sections read first are newer and take precedence.
    pub fn parse(data: &Arc<Vec<u8>>, startxref: usize) -> PDFResult<Self> {
        let mut table = XRefTable::default();
        let mut visited = FxHashSet::default();
        let mut pending = vec![(startxref, SectionKind::Primary)];

        while let Some((offset, kind)) = pending.pop() {
            if !visited.insert(offset) {
                tracing::warn!("xref chain loops back to offset {}", offset);
                continue;
            }
            if visited.len() > MAX_SECTIONS {
                return Err(PDFError::MalformedContainer(format!(
                    "more than {} cross-reference sections",
                    MAX_SECTIONS
                )));
            }

            let (entries, trailer) = read_section(data, offset)?;
            table.merge(entries, kind);

            // Stack order: the hybrid stream is read before the previous section.
            if let Some(prev) = trailer.get("Prev").and_then(PDFObject::as_usize) {
                pending.push((prev, SectionKind::Primary));
            }
            if let Some(stm) = trailer.get("XRefStm").and_then(PDFObject::as_usize) {
                pending.push((stm, SectionKind::HybridStream));
            }

            for (key, value) in trailer {
                table.trailer.entry(key).or_insert(value);
            }
            table.sections += 1;
        }

        Ok(table)
    }

    fn merge(&mut self, entries: Vec<(u32, XRefEntry)>, kind: SectionKind) {
        for (num, entry) in entries {
            match self.entries.get(&num) {
                None => {
                    self.entries.insert(num, entry);
                }
                // Hybrid files list compressed objects as free in the table.
                Some(existing)
                    if kind == SectionKind::HybridStream
                        && existing.is_free()
                        && !entry.is_free() =>
                {
                    self.entries.insert(num, entry);
                }
                Some(_) => {}
            }
        }
    }

    pub fn get(&self, num: u32) -> Option<&XRefEntry> {
        self.entries.get(&num)
    }

    pub fn trailer(&self) -> &PDFDict {
        &self.trailer
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn section_count(&self) -> usize {
        self.sections
    }

    /// Object numbers of every in-use entry, sorted.
    pub fn object_numbers(&self) -> Vec<u32> {
        let mut nums: Vec<u32> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.is_free())
            .map(|(n, _)| *n)
            .collect();
        nums.sort_unstable();
        nums
    }

    /// Root catalog reference named by the trailer.
    pub fn root(&self) -> Option<Ref> {
        self.trailer.get("Root").and_then(PDFObject::as_reference)
    }
}

/// Finds the byte offset recorded after the last `startxref` keyword.
///
/// Format:
/// ```text
/// startxref
/// 12345
/// %%EOF
/// ```
pub fn find_startxref(data: &[u8]) -> PDFResult<usize> {
    let search_start = data.len().saturating_sub(STARTXREF_WINDOW);
    let window = &data[search_start..];

    let keyword = b"startxref";
    let pos = window
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or_else(|| PDFError::MalformedContainer("startxref not found".to_string()))?;

    let digits: String = window[pos + keyword.len()..]
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .map(|&b| b as char)
        .collect();

    let offset: usize = digits.parse().map_err(|_| {
        PDFError::MalformedContainer("no offset after startxref".to_string())
    })?;
    if offset >= data.len() {
        return Err(PDFError::MalformedContainer(format!(
            "startxref offset {} is beyond the end of the file",
            offset
        )));
    }
    Ok(offset)
}

/// Opens a parser positioned at `offset` of the shared file buffer.
pub(crate) fn parser_at(data: &Arc<Vec<u8>>, offset: usize) -> PDFResult<Parser> {
    if offset >= data.len() {
        return Err(PDFError::InvalidPosition {
            pos: offset,
            length: data.len(),
        });
    }
    let stream = Stream::from_arc(Arc::clone(data), offset, 0);
    Parser::new(Lexer::new(Box::new(stream))?)
}

/// Reads `N G obj <object>` from an already positioned parser.
///
/// The object must be followed by `endobj`, though a missing keyword is
/// tolerated.
pub(crate) fn read_indirect(parser: &mut Parser) -> PDFResult<(Ref, PDFObject)> {
    let num = parser.get_object()?;
    let generation = parser.get_object()?;
    let keyword = parser.get_object()?;

    let (Some(num), Some(generation)) = (num.as_int(), generation.as_int()) else {
        return Err(PDFError::Generic("expected an object header".to_string()));
    };
    if !keyword.is_command("obj") || num < 0 || generation < 0 {
        return Err(PDFError::Generic(format!(
            "expected 'obj' after {} {}",
            num, generation
        )));
    }

    let reference = Ref::new(num as u32, generation as u32);
    let object = parser.get_object()?;
    if parser.peek_command() != Some("endobj") {
        tracing::trace!("object {} is missing endobj", reference);
    }
    Ok((reference, object))
}

fn read_section(
    data: &Arc<Vec<u8>>,
    offset: usize,
) -> PDFResult<(Vec<(u32, XRefEntry)>, PDFDict)> {
    let mut parser = parser_at(data, offset)?;

    if parser.peek_command() == Some("xref") {
        parser.get_object()?;
        return read_table(&mut parser);
    }

    let (reference, object) = read_indirect(&mut parser).map_err(|e| {
        PDFError::MalformedContainer(format!(
            "no cross-reference section at offset {}: {}",
            offset, e
        ))
    })?;
    read_stream(reference, object)
}

/// Reads the subsections of a classic table and the trailer after them.
///
/// Example:
/// ```text
/// xref
/// 0 3
/// 0000000000 65535 f
/// 0000000015 00000 n
/// 0000000079 00000 n
/// trailer
/// << /Size 3 /Root 1 0 R >>
/// ```
fn read_table(parser: &mut Parser) -> PDFResult<(Vec<(u32, XRefEntry)>, PDFDict)> {
    let mut entries = Vec::new();

    loop {
        if parser.peek_command() == Some("trailer") {
            parser.get_object()?;
            break;
        }

        let first = parser.get_object()?;
        let count = parser.get_object()?;
        let (Some(first), Some(count)) = (first.as_int(), count.as_int()) else {
            return Err(PDFError::MalformedContainer(
                "expected a subsection header or 'trailer'".to_string(),
            ));
        };
        if first < 0 || count < 0 {
            return Err(PDFError::MalformedContainer(format!(
                "invalid subsection {} {}",
                first, count
            )));
        }

        let mut first = u32::try_from(first).map_err(|_| {
            PDFError::MalformedContainer(format!("subsection start {} out of range", first))
        })?;
        for i in 0..u32::try_from(count).unwrap_or(u32::MAX) {
            let entry = read_table_entry(parser)?;

            // Some writers start the table at 1 while listing object 0's free entry.
            if i == 0 && first == 1 && matches!(entry, XRefEntry::Free { generation: 65535, .. })
            {
                first = 0;
            }
            let num = first.checked_add(i).ok_or_else(|| {
                PDFError::MalformedContainer(format!("subsection {} {} overflows", first, count))
            })?;
            entries.push((num, entry));
        }
    }

    match parser.get_object()? {
        PDFObject::Dictionary(trailer) => Ok((entries, trailer)),
        other => Err(PDFError::MalformedContainer(format!(
            "expected trailer dictionary, found {}",
            other.type_name()
        ))),
    }
}

/// Format: `offset generation n|f`.
fn read_table_entry(parser: &mut Parser) -> PDFResult<XRefEntry> {
    let offset = parser.get_object()?;
    let generation = parser.get_object()?;
    let kind = parser.get_object()?;

    let (Some(offset), Some(generation)) = (offset.as_usize(), generation.as_usize()) else {
        return Err(PDFError::MalformedContainer(
            "invalid cross-reference entry".to_string(),
        ));
    };

    match &kind {
        PDFObject::Command(c) if c == "n" => Ok(XRefEntry::Uncompressed {
            offset,
            generation: generation as u32,
        }),
        PDFObject::Command(c) if c == "f" => Ok(XRefEntry::Free {
            next_free: offset as u32,
            generation: generation as u32,
        }),
        other => Err(PDFError::MalformedContainer(format!(
            "invalid cross-reference entry type {:?}",
            other
        ))),
    }
}

/// Decodes a cross-reference stream (`/Type /XRef`).
fn read_stream(
    reference: Ref,
    object: PDFObject,
) -> PDFResult<(Vec<(u32, XRefEntry)>, PDFDict)> {
    let PDFObject::Stream { dict, data } = object else {
        return Err(PDFError::MalformedContainer(format!(
            "object {} is not a cross-reference stream",
            reference
        )));
    };

    let chain = decode::filter_chain(dict.get("Filter"), dict.get("DecodeParms"))?;
    let decoded = decode::apply_filters(&data, &chain)?;
    let entries = parse_stream_entries(&dict, &decoded)?;

    let mut trailer = dict;
    for key in ["Length", "Filter", "DecodeParms", "W", "Index", "Type"] {
        trailer.remove(key);
    }
    Ok((entries, trailer))
}

fn parse_stream_entries(dict: &PDFDict, data: &[u8]) -> PDFResult<Vec<(u32, XRefEntry)>> {
    let widths: Vec<usize> = dict
        .get("W")
        .and_then(PDFObject::as_number_array)
        .filter(|w| w.len() == 3 && w.iter().all(|v| (0.0..=8.0).contains(v)))
        .map(|w| w.iter().map(|v| *v as usize).collect())
        .ok_or_else(|| PDFError::MalformedContainer("invalid /W in xref stream".to_string()))?;

    let size = dict.get("Size").and_then(PDFObject::as_usize).unwrap_or(0);
    let index: Vec<usize> = dict
        .get("Index")
        .and_then(PDFObject::as_number_array)
        .map(|v| v.iter().map(|n| n.max(0.0) as usize).collect())
        .unwrap_or_else(|| vec![0, size]);

    let row = widths.iter().sum::<usize>();
    if row == 0 {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    let mut rows = data.chunks_exact(row);

    for pair in index.chunks(2) {
        let [first, count] = pair else { break };
        for i in 0..*count {
            let Some(bytes) = rows.next() else {
                tracing::warn!("xref stream is shorter than its /Index declares");
                return Ok(entries);
            };

            let (f1, rest) = bytes.split_at(widths[0]);
            let (f2, f3) = rest.split_at(widths[1]);
            let kind = if widths[0] == 0 { 1 } else { be_uint(f1) };
            let (f2, f3) = (be_uint(f2), be_uint(f3));

            let entry = match kind {
                0 => XRefEntry::Free {
                    next_free: f2 as u32,
                    generation: f3 as u32,
                },
                1 => XRefEntry::Uncompressed {
                    offset: f2 as usize,
                    generation: f3 as u32,
                },
                2 => XRefEntry::Compressed {
                    obj_stream_num: f2 as u32,
                    index: f3 as u32,
                },
                // Unknown types are reserved and treated as null references.
                _ => continue,
            };
            let num = first
                .checked_add(i)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| {
                    PDFError::MalformedContainer(format!("/Index {} {} overflows", first, count))
                })?;
            entries.push((num, entry));
        }
    }
    Ok(entries)
}

fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}
