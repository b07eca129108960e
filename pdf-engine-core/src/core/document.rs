//! Document lifecycle: open, page access, metadata, outline and close.

use super::config::OpenOptions;
use super::content_stream::ContentStream;
use super::error::{PDFError, PDFResult};
use super::font::Font;
use super::image::DecodedImage;
use super::metadata::DocumentInfo;
use super::object_store::ObjectStore;
use super::outline::{self, Bookmark};
use super::page::{self, Page, PageEntry};
use super::parser::{PDFDict, PDFObject, Ref};
use super::recovery;
use super::xref::{self, XRefTable};
use crate::rendering::{DisplayList, Interpreter};
use lru::LruCache;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Bytes at the start of the file searched for the `%PDF-` header.
const HEADER_SEARCH_LIMIT: usize = 1024;

/// A PDF document opened from memory.
///
/// The handle is cheap to clone and can be shared between threads; all
/// clones see the same caches. Object resolution is synchronised per object,
/// so concurrent readers never parse the same object twice.
///
/// Based on PDF.js's PDFDocument class.
///
/// # Example
/// ```no_run
/// use pdf_engine_core::PDFDocument;
///
/// let data = std::fs::read("document.pdf")?;
/// let doc = PDFDocument::open(data)?;
/// for index in 0..doc.page_count()? {
///     let page = doc.get_page(index)?;
///     println!("page {}: {} x {} pt", index + 1, page.width()?, page.height()?);
/// }
/// doc.close();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct PDFDocument {
    inner: Arc<DocumentInner>,
}

impl std::fmt::Debug for PDFDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PDFDocument")
            .field("version", &self.inner.version)
            .field("objects", &self.inner.store.xref().len())
            .field("recovered", &self.inner.store.is_recovered())
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .finish()
    }
}

/// Decoded fonts and images shared by every interpretation of a document.
pub struct ResourceCache {
    fonts: Mutex<LruCache<Ref, Arc<Font>>>,
    images: Mutex<LruCache<Ref, Arc<DecodedImage>>>,
}

impl ResourceCache {
    pub fn new(options: &OpenOptions) -> Self {
        let capacity = |n: usize| NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN);
        ResourceCache {
            fonts: Mutex::new(LruCache::new(capacity(options.font_cache_capacity))),
            images: Mutex::new(LruCache::new(capacity(options.image_cache_capacity))),
        }
    }

    /// Loads the font at `obj`, caching fonts stored as indirect objects.
    pub fn font(
        &self,
        obj: &PDFObject,
        store: &ObjectStore,
        options: &OpenOptions,
    ) -> PDFResult<Arc<Font>> {
        let Some(reference) = obj.as_reference() else {
            let dict = obj
                .as_dict()
                .ok_or_else(|| PDFError::Generic(format!("font is a {}", obj.type_name())))?;
            return Font::load(dict, store, options).map(Arc::new);
        };
        if let Some(font) = self.fonts.lock().get(&reference) {
            return Ok(Arc::clone(font));
        }

        let object = store.resolve(reference)?;
        let dict = object
            .as_dict()
            .ok_or_else(|| {
                PDFError::Generic(format!("font {} is a {}", reference, object.type_name()))
            })?;
        let font = Arc::new(Font::load(dict, store, options)?);
        self.fonts.lock().put(reference, Arc::clone(&font));
        Ok(font)
    }

    /// Decodes the image XObject `reference`.
    pub fn image(
        &self,
        reference: Ref,
        store: &ObjectStore,
        resources: Option<&PDFDict>,
    ) -> PDFResult<Arc<DecodedImage>> {
        if let Some(image) = self.images.lock().get(&reference) {
            return Ok(Arc::clone(image));
        }
        let stream = store.resolve(reference)?;
        let image = Arc::new(DecodedImage::decode(&stream, store, resources)?);
        self.images.lock().put(reference, Arc::clone(&image));
        Ok(image)
    }

    fn clear(&self) {
        self.fonts.lock().clear();
        self.images.lock().clear();
    }
}

/// State shared by a document and every handle derived from it.
pub(crate) struct DocumentInner {
    store: ObjectStore,
    options: OpenOptions,
    catalog: Arc<PDFObject>,
    version: Option<String>,
    closed: AtomicBool,
    pages: OnceLock<Arc<Vec<Arc<PageEntry>>>>,
    page_numbers: OnceLock<FxHashMap<Ref, usize>>,
    resources: ResourceCache,
}

impl DocumentInner {
    pub(crate) fn ensure_open(&self) -> PDFResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(PDFError::DocumentClosed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn store(&self) -> &ObjectStore {
        &self.store
    }

    fn pages(&self) -> &Arc<Vec<Arc<PageEntry>>> {
        self.pages.get_or_init(|| {
            let depth = self.options.max_page_tree_depth;
            let pages = page::collect_pages(&self.store, &self.catalog, depth);
            tracing::debug!("page tree holds {} pages", pages.len());
            Arc::new(pages)
        })
    }

    /// Index of the page whose object is `reference`.
    fn page_index_of(&self, reference: Ref) -> Option<usize> {
        self.page_numbers
            .get_or_init(|| {
                self.pages()
                    .iter()
                    .enumerate()
                    .filter_map(|(i, p)| p.reference.map(|r| (r, i)))
                    .collect()
            })
            .get(&reference)
            .copied()
    }

    pub(crate) fn interpret(
        &self,
        content: &ContentStream,
        resources: Option<&PDFObject>,
    ) -> DisplayList {
        Interpreter::new(&self.store, &self.options, &self.resources).run(content, resources)
    }
}

impl PDFDocument {
    /// Opens a document with default options.
    pub fn open(data: Vec<u8>) -> PDFResult<Self> {
        Self::open_with(data, OpenOptions::default())
    }

    /// Reads and opens the file at `path`.
    pub fn open_file(path: impl AsRef<Path>) -> PDFResult<Self> {
        Self::open_file_with(path, OpenOptions::default())
    }

    pub fn open_file_with(path: impl AsRef<Path>, options: OpenOptions) -> PDFResult<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::open_with(data, options)
    }

    /// Opens a document.
    ///
    /// The declared cross-reference sections are tried first. If they are
    /// missing or unusable, or the catalog they lead to cannot be loaded, the
    /// file is scanned for objects instead (unless `options.recovery` is
    /// off). Fails with `MalformedContainer` when even the scan finds no
    /// objects, and with `EncryptedDocument` when the trailer declares
    /// encryption.
    pub fn open_with(data: Vec<u8>, options: OpenOptions) -> PDFResult<Self> {
        let data = Arc::new(data);
        let version = header_version(&data);
        if version.is_none() {
            tracing::warn!("no %PDF- header; continuing");
        }

        let declared = xref::find_startxref(&data)
            .and_then(|offset| XRefTable::parse(&data, offset))
            .and_then(|table| match table.root() {
                Some(_) => Ok(table),
                None => Err(PDFError::MalformedContainer("trailer has no /Root".into())),
            });

        let (table, recovered) = match declared {
            Ok(table) => (table, false),
            Err(e) => (rebuild(&data, &options, &e)?, true),
        };
        check_encryption(&table)?;

        let store = ObjectStore::new(
            Arc::clone(&data),
            table,
            recovered,
            options.recovery,
            options.max_resolution_depth,
        );

        let (store, catalog) = match load_catalog(&store) {
            Ok(catalog) => (store, catalog),
            Err(e) if recovered => {
                tracing::warn!("no usable catalog ({}); looking for pages directly", e);
                (store, Arc::new(PDFObject::Dictionary(PDFDict::new())))
            }
            Err(e) => {
                let table = rebuild(&data, &options, &e)?;
                check_encryption(&table)?;
                let store = ObjectStore::new(
                    Arc::clone(&data),
                    table,
                    true,
                    options.recovery,
                    options.max_resolution_depth,
                );
                let catalog = load_catalog(&store).unwrap_or_else(|e| {
                    tracing::warn!("no usable catalog ({}); looking for pages directly", e);
                    Arc::new(PDFObject::Dictionary(PDFDict::new()))
                });
                (store, catalog)
            }
        };

        let resources = ResourceCache::new(&options);
        Ok(PDFDocument {
            inner: Arc::new(DocumentInner {
                store,
                options,
                catalog,
                version,
                closed: AtomicBool::new(false),
                pages: OnceLock::new(),
                page_numbers: OnceLock::new(),
                resources,
            }),
        })
    }

    /// Version from the `%PDF-x.y` header, if there is one.
    pub fn version(&self) -> Option<&str> {
        self.inner.version.as_deref()
    }

    /// Whether the cross-reference table was rebuilt by scanning.
    pub fn is_recovered(&self) -> PDFResult<bool> {
        self.inner.ensure_open()?;
        Ok(self.inner.store.is_recovered())
    }

    pub fn catalog(&self) -> PDFResult<Arc<PDFObject>> {
        self.inner.ensure_open()?;
        Ok(Arc::clone(&self.inner.catalog))
    }

    pub fn trailer(&self) -> PDFResult<PDFDict> {
        self.inner.ensure_open()?;
        Ok(self.inner.store.trailer().clone())
    }

    /// Number of leaf pages reached by walking the page tree.
    pub fn page_count(&self) -> PDFResult<usize> {
        self.inner.ensure_open()?;
        Ok(self.inner.pages().len())
    }

    /// Returns the page at zero-based `index`.
    pub fn get_page(&self, index: usize) -> PDFResult<Page> {
        self.inner.ensure_open()?;
        let pages = self.inner.pages();
        let entry = pages.get(index).ok_or(PDFError::PageIndexOutOfRange {
            index,
            count: pages.len(),
        })?;
        Ok(Page::new(index, Arc::clone(entry), Arc::clone(&self.inner)))
    }

    /// All pages in document order.
    pub fn pages(&self) -> PDFResult<Vec<Page>> {
        self.inner.ensure_open()?;
        Ok(self
            .inner
            .pages()
            .iter()
            .enumerate()
            .map(|(i, entry)| Page::new(i, Arc::clone(entry), Arc::clone(&self.inner)))
            .collect())
    }

    /// Resolves an indirect reference.
    pub fn resolve(&self, reference: Ref) -> PDFResult<Arc<PDFObject>> {
        self.inner.ensure_open()?;
        self.inner.store.resolve(reference)
    }

    /// Resolves `obj` if it is a reference, otherwise returns a copy.
    pub fn resolve_object(&self, obj: &PDFObject) -> PDFResult<Arc<PDFObject>> {
        self.inner.ensure_open()?;
        self.inner.store.resolve_object(obj).map(|r| r.into_shared())
    }

    /// Decodes a stream object through its filter chain.
    pub fn decode_stream(&self, stream: &PDFObject) -> PDFResult<Vec<u8>> {
        self.inner.ensure_open()?;
        self.inner.store.decode_stream(stream)
    }

    /// The document information dictionary. Absent fields stay `None`.
    pub fn metadata(&self) -> PDFResult<DocumentInfo> {
        self.inner.ensure_open()?;
        Ok(DocumentInfo::load(&self.inner.store))
    }

    /// Top-level bookmarks. A document without an outline has none.
    pub fn outline(&self) -> PDFResult<Vec<Bookmark>> {
        self.inner.ensure_open()?;
        let inner = &self.inner;
        Ok(outline::load_outline(
            &inner.store,
            &inner.catalog,
            |r| inner.page_index_of(r),
            inner.pages().len(),
            inner.options.max_page_tree_depth,
        ))
    }

    /// Closes the document. Every later call on it, on its clones and on
    /// pages obtained from it fails with `DocumentClosed`.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.resources.clear();
            tracing::debug!("document closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

/// Reads `x.y` from a `%PDF-x.y` header near the start of the file.
fn header_version(data: &[u8]) -> Option<String> {
    let window = &data[..data.len().min(HEADER_SEARCH_LIMIT)];
    let start = window.windows(5).position(|w| w == b"%PDF-")? + 5;
    let version: String = data[start..]
        .iter()
        .take(8)
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .map(|&b| b as char)
        .collect();
    (!version.is_empty()).then_some(version)
}

fn rebuild(data: &Arc<Vec<u8>>, options: &OpenOptions, cause: &PDFError) -> PDFResult<XRefTable> {
    if !options.recovery {
        return Err(match cause {
            PDFError::MalformedContainer(_) => cause.clone(),
            other => PDFError::MalformedContainer(other.to_string()),
        });
    }
    tracing::warn!("cross-reference data unusable ({}); scanning file", cause);
    recovery::scan(data)
}

fn check_encryption(table: &XRefTable) -> PDFResult<()> {
    match table.trailer().get("Encrypt") {
        Some(value) if !value.is_null() => Err(PDFError::EncryptedDocument),
        _ => Ok(()),
    }
}

fn load_catalog(store: &ObjectStore) -> PDFResult<Arc<PDFObject>> {
    let root = store
        .trailer()
        .get("Root")
        .and_then(PDFObject::as_reference)
        .ok_or_else(|| PDFError::MalformedContainer("trailer has no /Root".into()))?;
    let catalog = store.resolve(root)?;
    if catalog.as_dict().is_none() {
        return Err(PDFError::MalformedContainer(format!(
            "catalog {} is a {}",
            root,
            catalog.type_name()
        )));
    }
    Ok(catalog)
}
