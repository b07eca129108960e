use super::decode::{self, DecodedStream, FilterStep};
use super::error::{PDFError, PDFResult};
use super::lexer::Lexer;
use super::parser::{PDFDict, PDFObject, Parser, Ref};
use super::recovery;
use super::stream::Stream;
use super::xref::{self, XRefEntry, XRefTable};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

type Slot<T> = Arc<OnceLock<PDFResult<Arc<T>>>>;

/// A resolved value: either borrowed from the object that held it directly or
/// a shared handle to a cached indirect object.
#[derive(Debug, Clone)]
pub enum Resolved<'a> {
    Borrowed(&'a PDFObject),
    Shared(Arc<PDFObject>),
}

impl Deref for Resolved<'_> {
    type Target = PDFObject;

    fn deref(&self) -> &PDFObject {
        match self {
            Resolved::Borrowed(obj) => obj,
            Resolved::Shared(obj) => obj,
        }
    }
}

impl Resolved<'_> {
    /// Detaches the value from the borrow, cloning only if it was borrowed.
    pub fn into_shared(self) -> Arc<PDFObject> {
        match self {
            Resolved::Borrowed(obj) => Arc::new(obj.clone()),
            Resolved::Shared(obj) => obj,
        }
    }
}

/// The decoded contents of an object stream (`/Type /ObjStm`).
#[derive(Debug)]
pub(crate) struct ObjectStream {
    data: Arc<Vec<u8>>,
    /// Object number and absolute offset in `data`, in header order.
    offsets: Vec<(u32, usize)>,
}

impl ObjectStream {
    pub(crate) fn parse(dict: &PDFDict, decoded: Vec<u8>) -> PDFResult<Self> {
        let count = dict.get("N").and_then(PDFObject::as_usize);
        let first = dict.get("First").and_then(PDFObject::as_usize);
        let (Some(count), Some(first)) = (count, first) else {
            return Err(PDFError::Generic(
                "object stream without /N or /First".to_string(),
            ));
        };
        if first == 0 || first > decoded.len() {
            return Err(PDFError::Generic(format!(
                "object stream /First {} out of range",
                first
            )));
        }

        let data = Arc::new(decoded);
        let header = Stream::from_arc(Arc::clone(&data), 0, first);
        let mut parser = Parser::new(Lexer::new(Box::new(header))?)?;

        let mut offsets = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let num = parser.get_object()?;
            let offset = parser.get_object()?;
            match (num.as_usize(), offset.as_usize()) {
                (Some(num), Some(offset)) => offsets.push((num as u32, first + offset)),
                _ => break,
            }
        }

        Ok(ObjectStream { data, offsets })
    }

    pub(crate) fn entries(&self) -> &[(u32, usize)] {
        &self.offsets
    }

    /// Parses the object at `index`; falls back to a search by number when
    /// the index disagrees with the header.
    pub(crate) fn object_at(&self, index: usize, num: Option<u32>) -> PDFResult<PDFObject> {
        let offset = match (self.offsets.get(index), num) {
            (Some(&(n, off)), Some(num)) if n == num => off,
            (Some(&(_, off)), None) => off,
            (_, Some(num)) => self
                .offsets
                .iter()
                .find(|(n, _)| *n == num)
                .map(|(_, off)| *off)
                .ok_or_else(|| PDFError::unresolved(num, 0))?,
            (None, None) => {
                return Err(PDFError::Generic(format!(
                    "object stream has no entry {}",
                    index
                )));
            }
        };

        let stream = Stream::from_arc(Arc::clone(&self.data), offset, 0);
        let mut parser = Parser::new(Lexer::new(Box::new(stream))?)?;
        parser.get_object()
    }
}

/// Lazily resolves indirect objects and caches them per object id.
///
/// The slot map is locked only to find or create a slot; parsing happens
/// inside the slot's `OnceLock`, so concurrent requests for different ids
/// proceed in parallel and concurrent requests for the same id parse once.
///
/// Based on PDF.js src/core/xref.js (XRef.fetch)
pub struct ObjectStore {
    data: Arc<Vec<u8>>,
    xref: Arc<XRefTable>,
    slots: Mutex<FxHashMap<Ref, Slot<PDFObject>>>,
    object_streams: Mutex<FxHashMap<u32, Slot<ObjectStream>>>,
    /// Scan of the whole file, used when a declared offset is wrong.
    fallback: OnceLock<Option<XRefTable>>,
    from_recovery: bool,
    allow_fallback: bool,
    max_depth: usize,
    parses: AtomicUsize,
}

impl ObjectStore {
    pub fn new(
        data: Arc<Vec<u8>>,
        xref: XRefTable,
        from_recovery: bool,
        allow_fallback: bool,
        max_depth: usize,
    ) -> Self {
        ObjectStore {
            data,
            xref: Arc::new(xref),
            slots: Mutex::new(FxHashMap::default()),
            object_streams: Mutex::new(FxHashMap::default()),
            fallback: OnceLock::new(),
            from_recovery,
            allow_fallback,
            max_depth: max_depth.max(1),
            parses: AtomicUsize::new(0),
        }
    }

    pub fn xref(&self) -> &XRefTable {
        &self.xref
    }

    pub fn trailer(&self) -> &PDFDict {
        self.xref.trailer()
    }

    /// Whether the table was rebuilt by scanning the file.
    pub fn is_recovered(&self) -> bool {
        self.from_recovery
    }

    /// Number of objects parsed so far; cached hits do not count.
    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::Relaxed)
    }

    /// Resolves a reference, following chains of references to references.
    ///
    /// Fails with `CyclicReference` when the chain revisits an object or
    /// exceeds the depth bound, and with `UnresolvedReference` when an object
    /// in the chain does not exist.
    pub fn resolve(&self, reference: Ref) -> PDFResult<Arc<PDFObject>> {
        let mut chain = Vec::with_capacity(2);
        let mut current = reference;

        loop {
            if chain.contains(&current) || chain.len() >= self.max_depth {
                tracing::debug!("reference chain from {} does not terminate", reference);
                return Err(PDFError::CyclicReference {
                    num: reference.num,
                    generation: reference.generation,
                });
            }
            chain.push(current);

            let object = self.fetch(current)?;
            match &*object {
                PDFObject::Ref(next) => current = *next,
                _ => return Ok(object),
            }
        }
    }

    /// Resolves `obj` if it is a reference, otherwise borrows it.
    pub fn resolve_object<'a>(&self, obj: &'a PDFObject) -> PDFResult<Resolved<'a>> {
        match obj {
            PDFObject::Ref(r) => self.resolve(*r).map(Resolved::Shared),
            other => Ok(Resolved::Borrowed(other)),
        }
    }

    /// Looks up `key` in `dict` and resolves it. A missing key is `Ok(None)`.
    pub fn get<'a>(&self, dict: &'a PDFDict, key: &str) -> PDFResult<Option<Resolved<'a>>> {
        dict.get(key).map(|v| self.resolve_object(v)).transpose()
    }

    /// Like [`ObjectStore::get`], treating unresolvable values as absent.
    pub fn get_lenient<'a>(&self, dict: &'a PDFDict, key: &str) -> Option<Resolved<'a>> {
        match self.get(dict, key) {
            Ok(value) => value.filter(|v| !v.is_null()),
            Err(e) => {
                tracing::debug!("ignoring /{}: {}", key, e);
                None
            }
        }
    }

    /// Loads the object stored under `reference` without following a
    /// top-level reference.
    pub fn fetch(&self, reference: Ref) -> PDFResult<Arc<PDFObject>> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(reference).or_default())
        };
        slot.get_or_init(|| self.load(reference).map(Arc::new))
            .clone()
    }

    fn load(&self, reference: Ref) -> PDFResult<PDFObject> {
        match self.xref.get(reference.num) {
            Some(XRefEntry::Uncompressed { offset, generation }) => {
                if *generation != reference.generation {
                    tracing::trace!(
                        "{} requested, table has generation {}",
                        reference,
                        generation
                    );
                }
                match self.load_uncompressed(reference, *offset) {
                    Ok(obj) => Ok(obj),
                    Err(e) => self.load_from_fallback(reference).ok_or(e),
                }
            }
            Some(XRefEntry::Compressed {
                obj_stream_num,
                index,
            }) => self.load_compressed(reference, *obj_stream_num, *index as usize),
            Some(XRefEntry::Free { .. }) | None => self
                .load_from_fallback(reference)
                .ok_or_else(|| PDFError::unresolved(reference.num, reference.generation)),
        }
    }

    fn load_uncompressed(&self, reference: Ref, offset: usize) -> PDFResult<PDFObject> {
        let mut parser = xref::parser_at(&self.data, offset)?;
        let data = Arc::clone(&self.data);
        let table = Arc::clone(&self.xref);
        parser.set_length_resolver(move |r| read_direct_length(&data, &table, r));

        let (found, object) = xref::read_indirect(&mut parser)?;
        if found.num != reference.num {
            return Err(PDFError::Generic(format!(
                "expected object {} at offset {}, found {}",
                reference, offset, found
            )));
        }
        self.parses.fetch_add(1, Ordering::Relaxed);
        Ok(object)
    }

    fn load_compressed(
        &self,
        reference: Ref,
        stream_num: u32,
        index: usize,
    ) -> PDFResult<PDFObject> {
        let object_stream = self.object_stream(stream_num)?;
        let object = object_stream.object_at(index, Some(reference.num))?;
        self.parses.fetch_add(1, Ordering::Relaxed);
        Ok(object)
    }

    fn object_stream(&self, num: u32) -> PDFResult<Arc<ObjectStream>> {
        let slot = {
            let mut streams = self.object_streams.lock();
            Arc::clone(streams.entry(num).or_default())
        };
        slot.get_or_init(|| self.load_object_stream(num).map(Arc::new))
            .clone()
    }

    /// Object streams are never themselves compressed, so loading one never
    /// re-enters a slot that is being initialised.
    fn load_object_stream(&self, num: u32) -> PDFResult<ObjectStream> {
        let offset = match self.xref.get(num) {
            Some(XRefEntry::Uncompressed { offset, .. }) => *offset,
            _ => return Err(PDFError::unresolved(num, 0)),
        };
        let object = self.load_uncompressed(Ref::new(num, 0), offset)?;
        let PDFObject::Stream { dict, data } = &object else {
            return Err(PDFError::Generic(format!("object {} is not an object stream", num)));
        };

        let filter = direct_value(&self.data, &self.xref, dict.get("Filter"));
        let params = direct_value(&self.data, &self.xref, dict.get("DecodeParms"));
        let chain = decode::filter_chain(filter.as_ref(), params.as_ref())?;
        ObjectStream::parse(dict, decode::apply_filters(data, &chain)?)
    }

    fn load_from_fallback(&self, reference: Ref) -> Option<PDFObject> {
        if self.from_recovery || !self.allow_fallback {
            return None;
        }
        let table = self
            .fallback
            .get_or_init(|| {
                tracing::warn!("object {} is not where the table says; scanning file", reference);
                recovery::scan(&self.data).ok()
            })
            .as_ref()?;

        match table.get(reference.num)? {
            XRefEntry::Uncompressed { offset, .. } => {
                self.load_uncompressed(reference, *offset).ok()
            }
            _ => None,
        }
    }

    /// Resolves `/Filter` and `/DecodeParms` of a stream dictionary.
    pub fn filter_chain(&self, dict: &PDFDict) -> PDFResult<Vec<FilterStep>> {
        let filter = self.get(dict, "Filter")?.map(|f| self.deep_resolve(&f));
        let params = self.get(dict, "DecodeParms")?.map(|p| self.deep_resolve(&p));
        decode::filter_chain(filter.as_ref(), params.as_ref())
    }

    /// Copies `obj`, resolving references one level inside arrays.
    fn deep_resolve(&self, obj: &PDFObject) -> PDFObject {
        match obj {
            PDFObject::Array(items) => PDFObject::Array(
                items
                    .iter()
                    .map(|item| {
                        Box::new(match self.resolve_object(item) {
                            Ok(value) => (*value).clone(),
                            Err(_) => PDFObject::Null,
                        })
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Decodes a stream's data through every filter in its chain.
    pub fn decode_stream(&self, stream: &PDFObject) -> PDFResult<Vec<u8>> {
        let PDFObject::Stream { dict, data } = stream else {
            return Err(PDFError::Generic(format!(
                "expected stream, found {}",
                stream.type_name()
            )));
        };
        decode::apply_filters(data, &self.filter_chain(dict)?)
    }

    /// Decodes generic filters and hands back any trailing image codec.
    pub fn decode_image_stream(&self, stream: &PDFObject) -> PDFResult<DecodedStream> {
        let PDFObject::Stream { dict, data } = stream else {
            return Err(PDFError::Generic(format!(
                "expected image stream, found {}",
                stream.type_name()
            )));
        };
        decode::decode_until_image_codec(data, &self.filter_chain(dict)?)
    }
}

/// Reads an indirect `/Length` without touching the cache.
fn read_direct_length(data: &Arc<Vec<u8>>, table: &XRefTable, reference: Ref) -> Option<usize> {
    let XRefEntry::Uncompressed { offset, .. } = table.get(reference.num)? else {
        return None;
    };
    let mut parser = xref::parser_at(data, *offset).ok()?;
    let (_, object) = xref::read_indirect(&mut parser).ok()?;
    object.as_usize()
}

/// Follows a reference through uncompressed objects only, bypassing the cache.
fn direct_value(
    data: &Arc<Vec<u8>>,
    table: &XRefTable,
    obj: Option<&PDFObject>,
) -> Option<PDFObject> {
    let mut current = obj?.clone();
    for _ in 0..4 {
        let PDFObject::Ref(r) = current else {
            return Some(current);
        };
        let XRefEntry::Uncompressed { offset, .. } = table.get(r.num)? else {
            return None;
        };
        let mut parser = xref::parser_at(data, *offset).ok()?;
        current = xref::read_indirect(&mut parser).ok()?.1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a file from numbered object bodies and returns a store over it.
    fn store(objects: &[(u32, &str)]) -> ObjectStore {
        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut entries = FxHashMap::default();
        for (num, body) in objects {
            entries.insert(
                *num,
                XRefEntry::Uncompressed {
                    offset: pdf.len(),
                    generation: 0,
                },
            );
            pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", num, body).as_bytes());
        }
        let table = XRefTable::from_parts(entries, PDFDict::new());
        ObjectStore::new(Arc::new(pdf), table, false, false, 32)
    }

    #[test]
    fn test_resolve_is_cached() {
        let store = store(&[(1, "<< /A 1 >>")]);
        let a = store.resolve(Ref::new(1, 0)).unwrap();
        let b = store.resolve(Ref::new(1, 0)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.parse_count(), 1);
    }

    #[test]
    fn test_missing_object_is_unresolved() {
        let store = store(&[(1, "null")]);
        assert!(matches!(
            store.resolve(Ref::new(7, 0)),
            Err(PDFError::UnresolvedReference { num: 7, .. })
        ));
    }

    #[test]
    fn test_reference_chain_is_followed() {
        let store = store(&[(1, "2 0 R"), (2, "3 0 R"), (3, "(end)")]);
        let obj = store.resolve(Ref::new(1, 0)).unwrap();
        assert_eq!(obj.as_bytes(), Some(&b"end"[..]));
    }

    #[test]
    fn test_two_object_cycle() {
        let store = store(&[(1, "2 0 R"), (2, "1 0 R")]);
        assert!(matches!(
            store.resolve(Ref::new(1, 0)),
            Err(PDFError::CyclicReference { num: 1, .. })
        ));
        // Cached failures do not change the answer.
        assert!(matches!(
            store.resolve(Ref::new(2, 0)),
            Err(PDFError::CyclicReference { num: 2, .. })
        ));
    }

    #[test]
    fn test_depth_bound() {
        let bodies: Vec<String> = (1..=40).map(|n| format!("{} 0 R", n + 1)).collect();
        let objects: Vec<(u32, &str)> = bodies
            .iter()
            .enumerate()
            .map(|(i, b)| (i as u32 + 1, b.as_str()))
            .collect();
        let store = store(&objects);
        assert!(matches!(
            store.resolve(Ref::new(1, 0)),
            Err(PDFError::CyclicReference { .. })
        ));
    }

    #[test]
    fn test_indirect_length() {
        let store = store(&[
            (1, "<< /Length 2 0 R >>\nstream\nxxendstreamyy\nendstream"),
            (2, "13"),
        ]);
        let obj = store.resolve(Ref::new(1, 0)).unwrap();
        match &*obj {
            PDFObject::Stream { data, .. } => assert_eq!(data, b"xxendstreamyy"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_stream_with_indirect_filter() {
        let store = store(&[
            (1, "<< /Length 6 /Filter 2 0 R >>\nstream\n414243\nendstream"),
            (2, "/ASCIIHexDecode"),
        ]);
        let obj = store.resolve(Ref::new(1, 0)).unwrap();
        assert_eq!(store.decode_stream(&obj).unwrap(), b"ABC");
    }

    #[test]
    fn test_unknown_filter_is_recoverable() {
        let store = store(&[(1, "<< /Length 3 /Filter /Unheard >>\nstream\nabc\nendstream")]);
        let obj = store.resolve(Ref::new(1, 0)).unwrap();
        let err = store.decode_stream(&obj).unwrap_err();
        assert!(matches!(err, PDFError::UnsupportedFilter(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_object_stream() {
        let header = "10 0 11 6 ";
        let body = "(ten) << /Eleven true >>";
        let content = format!("{}{}", header, body);
        let stream_body = format!(
            "<< /Type /ObjStm /N 2 /First {} /Length {} >>\nstream\n{}\nendstream",
            header.len(),
            content.len(),
            content
        );

        let mut pdf = b"%PDF-1.5\n".to_vec();
        let offset = pdf.len();
        pdf.extend_from_slice(format!("5 0 obj\n{}\nendobj\n", stream_body).as_bytes());

        let mut entries = FxHashMap::default();
        entries.insert(5, XRefEntry::Uncompressed { offset, generation: 0 });
        entries.insert(10, XRefEntry::Compressed { obj_stream_num: 5, index: 0 });
        entries.insert(11, XRefEntry::Compressed { obj_stream_num: 5, index: 1 });
        let store = ObjectStore::new(
            Arc::new(pdf),
            XRefTable::from_parts(entries, PDFDict::new()),
            false,
            false,
            32,
        );

        assert_eq!(
            store.resolve(Ref::new(10, 0)).unwrap().as_bytes(),
            Some(&b"ten"[..])
        );
        let eleven = store.resolve(Ref::new(11, 0)).unwrap();
        assert_eq!(eleven.get("Eleven").and_then(PDFObject::as_boolean), Some(true));
    }

    #[test]
    fn test_wrong_offset_uses_fallback_scan() {
        let mut pdf = b"%PDF-1.4\n".to_vec();
        pdf.extend_from_slice(b"1 0 obj\n(right)\nendobj\n");
        let mut entries = FxHashMap::default();
        entries.insert(1, XRefEntry::Uncompressed { offset: 3, generation: 0 });
        let store = ObjectStore::new(
            Arc::new(pdf),
            XRefTable::from_parts(entries, PDFDict::new()),
            false,
            true,
            32,
        );
        assert_eq!(
            store.resolve(Ref::new(1, 0)).unwrap().as_bytes(),
            Some(&b"right"[..])
        );
    }

    #[test]
    fn test_concurrent_resolution_parses_once() {
        let store = Arc::new(store(&[(1, "<< /Shared true >>"), (2, "[1 2 3]")]));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let num = if i % 2 == 0 { 1 } else { 2 };
                    store.resolve(Ref::new(num, 0)).map(|_| ())
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap().unwrap();
        }
        assert_eq!(store.parse_count(), 2);
    }

    #[test]
    fn test_resolved_deref() {
        let store = store(&[(1, "42")]);
        let direct = PDFObject::Number(7.0);
        assert_eq!(store.resolve_object(&direct).unwrap().as_number(), Some(7.0));
        let indirect = PDFObject::Ref(Ref::new(1, 0));
        assert_eq!(store.resolve_object(&indirect).unwrap().as_number(), Some(42.0));
    }
}
