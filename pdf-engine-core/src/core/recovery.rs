//! Recovery mode: rebuilds the cross-reference table by scanning the file.
//!
//! Used when `startxref` is missing, the declared sections cannot be parsed,
//! or the catalog they point at cannot be loaded.
//!
//! Based on PDF.js XRef.indexObjects()

use super::decode;
use super::error::{PDFError, PDFResult};
use super::lexer::{is_delimiter, is_whitespace};
use super::object_store::ObjectStream;
use super::parser::{PDFDict, PDFObject, Ref};
use super::xref::{self, XRefEntry, XRefTable};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Longest object or generation number accepted in an object header.
const MAX_NUMBER_DIGITS: usize = 10;

/// Scans `data` for `N G obj` headers and `trailer` dictionaries.
///
/// When an object is defined more than once the last definition wins, which
/// matches incremental updates appended to the end of the file. Objects
/// stored in object streams fill numbers that have no direct definition.
/// Fails with `MalformedContainer` only when no object is found.
pub fn scan(data: &Arc<Vec<u8>>) -> PDFResult<XRefTable> {
    let headers = find_object_headers(data);
    if headers.is_empty() {
        return Err(PDFError::MalformedContainer(
            "no objects found while scanning".to_string(),
        ));
    }

    let mut entries: FxHashMap<u32, XRefEntry> = FxHashMap::default();
    for (reference, offset) in &headers {
        entries.insert(
            reference.num,
            XRefEntry::Uncompressed {
                offset: *offset,
                generation: reference.generation,
            },
        );
    }

    let mut trailer = PDFDict::new();
    let mut catalog: Option<Ref> = None;
    let mut compressed: Vec<(u32, XRefEntry)> = Vec::new();

    for (reference, offset) in &headers {
        // Only the surviving definition of each number is inspected.
        if entries.get(&reference.num)
            != Some(&XRefEntry::Uncompressed {
                offset: *offset,
                generation: reference.generation,
            })
        {
            continue;
        }
        let Ok(mut parser) = xref::parser_at(data, *offset) else {
            continue;
        };
        let Ok((_, object)) = xref::read_indirect(&mut parser) else {
            continue;
        };

        match &object {
            PDFObject::Stream { dict, data: raw } => {
                if dict.get("Type").is_some_and(|t| t.is_name("XRef")) {
                    merge_trailer(&mut trailer, dict);
                } else if dict.get("Type").is_some_and(|t| t.is_name("ObjStm")) {
                    let Some(stream) = decode_object_stream(dict, raw) else {
                        continue;
                    };
                    for (index, (num, _)) in stream.entries().iter().enumerate() {
                        compressed.push((
                            *num,
                            XRefEntry::Compressed {
                                obj_stream_num: reference.num,
                                index: index as u32,
                            },
                        ));
                        if catalog.is_none()
                            && stream
                                .object_at(index, Some(*num))
                                .is_ok_and(|o| is_catalog(&o))
                        {
                            catalog = Some(Ref::new(*num, 0));
                        }
                    }
                }
            }
            obj if catalog.is_none() && is_catalog(obj) => catalog = Some(*reference),
            _ => {}
        }
    }

    for (num, entry) in compressed {
        entries.entry(num).or_insert(entry);
    }

    for offset in find_all(data, b"trailer") {
        let Ok(mut parser) = xref::parser_at(data, offset + b"trailer".len()) else {
            continue;
        };
        if let Ok(PDFObject::Dictionary(dict)) = parser.get_object() {
            merge_trailer(&mut trailer, &dict);
        }
    }

    let root_known = trailer
        .get("Root")
        .and_then(PDFObject::as_reference)
        .is_some_and(|r| entries.contains_key(&r.num));
    if !root_known {
        match catalog {
            Some(r) => {
                tracing::debug!("recovered catalog {}", r);
                trailer.insert("Root".to_string(), PDFObject::Ref(r));
            }
            None => {
                trailer.remove("Root");
            }
        }
    }

    tracing::debug!("recovery scan indexed {} objects", entries.len());
    Ok(XRefTable::from_parts(entries, trailer))
}

/// Later trailers overwrite earlier ones; chain links are dropped.
fn merge_trailer(trailer: &mut PDFDict, found: &PDFDict) {
    for (key, value) in found {
        if matches!(
            key.as_str(),
            "Prev" | "XRefStm" | "Length" | "Filter" | "DecodeParms" | "W" | "Index" | "Type"
        ) {
            continue;
        }
        trailer.insert(key.clone(), value.clone());
    }
}

fn is_catalog(obj: &PDFObject) -> bool {
    obj.as_dict()
        .and_then(|d| d.get("Type"))
        .is_some_and(|t| t.is_name("Catalog"))
}

fn decode_object_stream(dict: &PDFDict, raw: &[u8]) -> Option<ObjectStream> {
    let chain = decode::filter_chain(dict.get("Filter"), dict.get("DecodeParms")).ok()?;
    let decoded = decode::apply_filters(raw, &chain).ok()?;
    ObjectStream::parse(dict, decoded).ok()
}

/// Returns every `N G obj` header with the offset of its first digit.
pub(crate) fn find_object_headers(data: &[u8]) -> Vec<(Ref, usize)> {
    find_all(data, b"obj")
        .filter(|&pos| {
            data.get(pos + 3)
                .is_none_or(|&b| is_whitespace(b) || is_delimiter(b))
        })
        .filter_map(|pos| header_before(data, pos))
        .collect()
}

/// Walks backwards from `obj` over `<digits> <ws> <digits> <ws>?`.
fn header_before(data: &[u8], obj_pos: usize) -> Option<(Ref, usize)> {
    let mut pos = obj_pos;
    skip_back(data, &mut pos, is_whitespace);

    let gen_end = pos;
    skip_back(data, &mut pos, |b| b.is_ascii_digit());
    let gen_start = pos;

    let ws_end = pos;
    skip_back(data, &mut pos, is_whitespace);
    if pos == ws_end {
        return None;
    }

    let num_end = pos;
    skip_back(data, &mut pos, |b| b.is_ascii_digit());
    let num_start = pos;

    if gen_start == gen_end
        || num_start == num_end
        || num_end - num_start > MAX_NUMBER_DIGITS
        || gen_end - gen_start > MAX_NUMBER_DIGITS
    {
        return None;
    }
    if num_start > 0 && !is_whitespace(data[num_start - 1]) && !is_delimiter(data[num_start - 1]) {
        return None;
    }

    let num = parse_digits(&data[num_start..num_end])?;
    let generation = parse_digits(&data[gen_start..gen_end])?;
    Some((Ref::new(num, generation), num_start))
}

fn skip_back(data: &[u8], pos: &mut usize, pred: impl Fn(u8) -> bool) {
    while *pos > 0 && pred(data[*pos - 1]) {
        *pos -= 1;
    }
}

fn parse_digits(digits: &[u8]) -> Option<u32> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

fn find_all<'a>(haystack: &'a [u8], needle: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(move |(_, w)| *w == needle)
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arc(bytes: &[u8]) -> Arc<Vec<u8>> {
        Arc::new(bytes.to_vec())
    }

    #[test]
    fn test_header_detection() {
        let data = b"1 0 obj\nnull\nendobj\n  12 3 obj<<>>endobj x7 0 obj 99 0obj";
        let headers = find_object_headers(data);
        let refs: Vec<Ref> = headers.iter().map(|(r, _)| *r).collect();
        assert_eq!(refs, vec![Ref::new(1, 0), Ref::new(12, 3), Ref::new(99, 0)]);
        assert_eq!(headers[0].1, 0);
        assert_eq!(&data[headers[1].1..headers[1].1 + 2], b"12");
    }

    #[test]
    fn test_scan_without_table() {
        let data = arc(b"%PDF-1.4\n\
            1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n\
            2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n\
            3 0 obj << /Type /Page /Parent 2 0 R >> endobj\n");
        let table = scan(&data).unwrap();
        assert_eq!(table.object_numbers(), vec![1, 2, 3]);
        assert_eq!(table.root(), Some(Ref::new(1, 0)));
    }

    #[test]
    fn test_last_definition_wins() {
        let data = arc(b"%PDF-1.4\n1 0 obj (old) endobj\n1 0 obj (new) endobj\n");
        let table = scan(&data).unwrap();
        let Some(XRefEntry::Uncompressed { offset, .. }) = table.get(1) else {
            panic!("object 1 missing");
        };
        assert!(data[*offset..].starts_with(b"1 0 obj (new)"));
    }

    #[test]
    fn test_trailer_root_is_used() {
        let data = arc(b"%PDF-1.4\n\
            4 0 obj << /Type /Catalog >> endobj\n\
            5 0 obj << /Pages 6 0 R >> endobj\n\
            trailer << /Root 5 0 R /Info 4 0 R /Prev 17 >>\n");
        let table = scan(&data).unwrap();
        assert_eq!(table.root(), Some(Ref::new(5, 0)));
        assert!(table.trailer().get("Info").is_some());
        assert!(table.trailer().get("Prev").is_none());
    }

    #[test]
    fn test_dangling_trailer_root_replaced_by_catalog() {
        let data = arc(b"%PDF-1.4\n\
            4 0 obj << /Type /Catalog >> endobj\n\
            trailer << /Root 40 0 R >>\n");
        let table = scan(&data).unwrap();
        assert_eq!(table.root(), Some(Ref::new(4, 0)));
    }

    #[test]
    fn test_object_stream_members_indexed() {
        let header = "7 0 ";
        let content = format!("{}<< /Type /Catalog /Pages 8 0 R >>", header);
        let data = format!(
            "%PDF-1.5\n3 0 obj << /Type /ObjStm /N 1 /First {} /Length {} >>\nstream\n{}\nendstream\nendobj\n",
            header.len(),
            content.len(),
            content
        );
        let table = scan(&arc(data.as_bytes())).unwrap();
        assert_eq!(
            table.get(7),
            Some(&XRefEntry::Compressed {
                obj_stream_num: 3,
                index: 0
            })
        );
        assert_eq!(table.root(), Some(Ref::new(7, 0)));
    }

    #[test]
    fn test_no_objects_is_malformed() {
        assert!(matches!(
            scan(&arc(b"%PDF-1.4\nthis is not a document\n")),
            Err(PDFError::MalformedContainer(_))
        ));
    }
}
