//! Page tree walking and page handles.
//!
//! The page tree is flattened once per document into a list of
//! [`PageEntry`] values that carry the attributes each page inherits from
//! its ancestors. A [`Page`] is a cheap handle onto one entry plus the
//! document it came from; every call checks that the document is still open.

use super::content_stream::ContentStream;
use super::document::DocumentInner;
use super::error::PDFResult;
use super::object_store::ObjectStore;
use super::parser::{PDFDict, PDFObject, Ref};
use crate::rendering::DisplayList;
use rustc_hash::FxHashSet;
use std::sync::{Arc, OnceLock};

/// US Letter, used when no ancestor declares a media box.
pub const DEFAULT_MEDIA_BOX: Rect = Rect {
    x0: 0.0,
    y0: 0.0,
    x1: 612.0,
    y1: 792.0,
};

/// An axis-aligned rectangle in default user space, normalised so that
/// `x0 <= x1` and `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Rect {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Reads a `[llx lly urx ury]` array.
    pub fn from_object(obj: &PDFObject) -> Option<Self> {
        let values = obj.as_number_array()?;
        if values.len() < 4 || values.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Rect::new(values[0], values[1], values[2], values[3]))
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let r = Rect {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        };
        (!r.is_empty()).then_some(r)
    }
}

/// Attributes a page may inherit from its ancestors.
#[derive(Debug, Clone, Default)]
pub struct PageAttributes {
    pub media_box: Option<Rect>,
    pub crop_box: Option<Rect>,
    pub rotate: Option<i64>,
    pub resources: Option<Arc<PDFObject>>,
}

impl PageAttributes {
    /// Attributes of `dict`, falling back to `self` for absent keys.
    fn inherit(&self, dict: &PDFDict, store: &ObjectStore) -> PageAttributes {
        let rect = |key: &str| {
            store
                .get_lenient(dict, key)
                .and_then(|v| Rect::from_object(&v))
                .filter(|r| !r.is_empty())
        };
        PageAttributes {
            media_box: rect("MediaBox").or(self.media_box),
            crop_box: rect("CropBox").or(self.crop_box),
            rotate: store
                .get_lenient(dict, "Rotate")
                .and_then(|v| v.as_int())
                .or(self.rotate),
            resources: store
                .get_lenient(dict, "Resources")
                .filter(|r| r.as_dict().is_some())
                .map(|r| r.into_shared())
                .or_else(|| self.resources.clone()),
        }
    }

    pub fn media_box(&self) -> Rect {
        self.media_box.unwrap_or(DEFAULT_MEDIA_BOX)
    }

    /// Crop box, defaulting to the media box.
    pub fn crop_box(&self) -> Rect {
        self.crop_box.unwrap_or_else(|| self.media_box())
    }

    /// Visible region: media box intersected with crop box. A crop box that
    /// misses the media box entirely is ignored.
    pub fn view_box(&self) -> Rect {
        let media = self.media_box();
        media.intersect(&self.crop_box()).unwrap_or(media)
    }

    /// Rotation normalised to 0, 90, 180 or 270. Other values read as 0.
    pub fn rotation(&self) -> u16 {
        match self.rotate.unwrap_or(0) {
            r if r % 90 != 0 => 0,
            r => r.rem_euclid(360) as u16,
        }
    }
}

/// One page of the flattened tree.
#[derive(Debug)]
pub struct PageEntry {
    pub reference: Option<Ref>,
    pub dict: Arc<PDFObject>,
    pub attrs: PageAttributes,
    content: OnceLock<Arc<ContentStream>>,
}

impl PageEntry {
    fn new(reference: Option<Ref>, dict: Arc<PDFObject>, attrs: PageAttributes) -> Self {
        PageEntry {
            reference,
            dict,
            attrs,
            content: OnceLock::new(),
        }
    }

    /// Parsed content, decoded and cached on first use.
    pub(crate) fn content(&self, store: &ObjectStore) -> Arc<ContentStream> {
        Arc::clone(
            self.content
                .get_or_init(|| Arc::new(load_content(&self.dict, store))),
        )
    }
}

/// Decodes `/Contents` (a stream or an array of streams) and parses it.
///
/// Streams that fail to decode are skipped and noted in the warnings.
fn load_content(page: &PDFObject, store: &ObjectStore) -> ContentStream {
    let mut data = Vec::new();
    let mut warnings = Vec::new();

    let streams: Vec<Arc<PDFObject>> = match page.get("Contents") {
        None => Vec::new(),
        Some(contents) => match store.resolve_object(contents) {
            Ok(resolved) => match &*resolved {
                PDFObject::Array(items) => items
                    .iter()
                    .filter_map(|item| match store.resolve_object(item) {
                        Ok(s) => Some(s.into_shared()),
                        Err(e) => {
                            warnings.push(format!("content stream skipped: {}", e));
                            None
                        }
                    })
                    .collect(),
                _ => vec![resolved.into_shared()],
            },
            Err(e) => {
                warnings.push(format!("page contents unavailable: {}", e));
                Vec::new()
            }
        },
    };

    for stream in &streams {
        match store.decode_stream(stream) {
            Ok(bytes) => {
                data.extend_from_slice(&bytes);
                // Operators may not span streams, but tokens must not merge.
                data.push(b'\n');
            }
            Err(e) => {
                tracing::warn!("content stream skipped: {}", e);
                warnings.push(format!("content stream skipped: {}", e));
            }
        }
    }

    let mut content = ContentStream::parse(data);
    warnings.append(&mut content.warnings);
    content.warnings = warnings;
    content
}

/// Flattens the page tree under the catalog's `/Pages`.
///
/// The walk is iterative with a visited set, so a cycle or a shared subtree
/// is reported once and skipped. Subtrees deeper than `max_depth` are
/// skipped. If the tree yields nothing, every `/Type /Page` object in the
/// file is collected instead.
pub(crate) fn collect_pages(
    store: &ObjectStore,
    catalog: &PDFObject,
    max_depth: usize,
) -> Vec<Arc<PageEntry>> {
    let mut pages = Vec::new();
    let mut visited: FxHashSet<Ref> = FxHashSet::default();
    let mut stack: Vec<(PDFObject, PageAttributes, usize)> = Vec::new();

    match catalog.get("Pages") {
        Some(root) => stack.push((root.clone(), PageAttributes::default(), 0)),
        None => tracing::warn!("catalog has no /Pages"),
    }

    while let Some((node, inherited, depth)) = stack.pop() {
        let reference = node.as_reference();
        if let Some(r) = reference {
            if !visited.insert(r) {
                tracing::warn!("page tree revisits {}; skipping", r);
                continue;
            }
        }
        let resolved = match store.resolve_object(&node) {
            Ok(resolved) => resolved.into_shared(),
            Err(e) => {
                tracing::warn!("page tree node unavailable: {}", e);
                continue;
            }
        };
        let Some(dict) = resolved.as_dict() else {
            tracing::warn!("page tree node is a {}", resolved.type_name());
            continue;
        };

        let attrs = inherited.inherit(dict, store);
        let is_page = dict.get("Type").is_some_and(|t| t.is_name("Page"));
        let kids = if is_page {
            None
        } else {
            store.get_lenient(dict, "Kids").map(|k| k.into_shared())
        };

        match kids {
            Some(kids) => {
                if depth >= max_depth {
                    tracing::warn!("page tree deeper than {}; subtree skipped", max_depth);
                    continue;
                }
                let children = kids.as_array().unwrap_or_default();
                for kid in children.iter().rev() {
                    stack.push(((**kid).clone(), attrs.clone(), depth + 1));
                }
            }
            None if is_page || !dict.get("Type").is_some_and(|t| t.is_name("Pages")) => {
                pages.push(Arc::new(PageEntry::new(reference, Arc::clone(&resolved), attrs)));
            }
            None => {}
        }
    }

    if pages.is_empty() {
        pages = scan_for_pages(store, max_depth);
        if !pages.is_empty() {
            tracing::warn!("page tree empty; found {} pages by scanning", pages.len());
        }
    }
    pages
}

/// Collects every `/Type /Page` object, inheriting through `/Parent`.
fn scan_for_pages(store: &ObjectStore, max_depth: usize) -> Vec<Arc<PageEntry>> {
    let mut pages = Vec::new();
    for num in store.xref().object_numbers() {
        let generation = store.xref().get(num).map_or(0, |e| e.generation());
        let reference = Ref::new(num, generation);
        let Ok(object) = store.resolve(reference) else {
            continue;
        };
        let Some(dict) = object.as_dict() else {
            continue;
        };
        if !dict.get("Type").is_some_and(|t| t.is_name("Page")) {
            continue;
        }
        let attrs = inherited_from_parents(dict, store, max_depth);
        pages.push(Arc::new(PageEntry::new(Some(reference), Arc::clone(&object), attrs)));
    }
    pages
}

/// Walks the `/Parent` chain from the root down, so nearer ancestors win.
fn inherited_from_parents(dict: &PDFDict, store: &ObjectStore, max_depth: usize) -> PageAttributes {
    let mut chain: Vec<Arc<PDFObject>> = Vec::new();
    let mut visited = FxHashSet::default();
    let mut parent = dict.get("Parent").and_then(PDFObject::as_reference);

    while let Some(r) = parent {
        if chain.len() >= max_depth || !visited.insert(r) {
            break;
        }
        let Ok(node) = store.resolve(r) else {
            break;
        };
        parent = node.get("Parent").and_then(PDFObject::as_reference);
        chain.push(node);
    }

    let mut attrs = PageAttributes::default();
    for node in chain.iter().rev() {
        if let Some(d) = node.as_dict() {
            attrs = attrs.inherit(d, store);
        }
    }
    attrs.inherit(dict, store)
}

/// A page of an open document.
///
/// Handles stay valid as long as the document is open. After
/// [`PDFDocument::close`](super::document::PDFDocument::close) every method
/// fails with
/// [`PDFError::DocumentClosed`](super::error::PDFError::DocumentClosed).
#[derive(Clone)]
pub struct Page {
    index: usize,
    entry: Arc<PageEntry>,
    doc: Arc<DocumentInner>,
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("index", &self.index)
            .field("reference", &self.entry.reference)
            .finish()
    }
}

impl Page {
    pub(crate) fn new(index: usize, entry: Arc<PageEntry>, doc: Arc<DocumentInner>) -> Self {
        Page { index, entry, doc }
    }

    fn attrs(&self) -> PDFResult<&PageAttributes> {
        self.doc.ensure_open()?;
        Ok(&self.entry.attrs)
    }

    /// Zero-based position in the document.
    pub fn index(&self) -> PDFResult<usize> {
        self.doc.ensure_open()?;
        Ok(self.index)
    }

    /// The page object's reference, absent for a direct page dictionary.
    pub fn reference(&self) -> PDFResult<Option<Ref>> {
        self.doc.ensure_open()?;
        Ok(self.entry.reference)
    }

    /// The page dictionary.
    pub fn dict(&self) -> PDFResult<Arc<PDFObject>> {
        self.doc.ensure_open()?;
        Ok(Arc::clone(&self.entry.dict))
    }

    pub fn media_box(&self) -> PDFResult<Rect> {
        Ok(self.attrs()?.media_box())
    }

    pub fn crop_box(&self) -> PDFResult<Rect> {
        Ok(self.attrs()?.crop_box())
    }

    pub fn view_box(&self) -> PDFResult<Rect> {
        Ok(self.attrs()?.view_box())
    }

    /// Clockwise rotation in degrees: 0, 90, 180 or 270.
    pub fn rotation(&self) -> PDFResult<u16> {
        Ok(self.attrs()?.rotation())
    }

    /// Displayed width in points, after rotation.
    pub fn width(&self) -> PDFResult<f64> {
        let attrs = self.attrs()?;
        let view = attrs.view_box();
        Ok(match attrs.rotation() {
            90 | 270 => view.height(),
            _ => view.width(),
        })
    }

    /// Displayed height in points, after rotation.
    pub fn height(&self) -> PDFResult<f64> {
        let attrs = self.attrs()?;
        let view = attrs.view_box();
        Ok(match attrs.rotation() {
            90 | 270 => view.width(),
            _ => view.height(),
        })
    }

    /// The (possibly inherited) resource dictionary.
    pub fn resources(&self) -> PDFResult<Option<Arc<PDFObject>>> {
        Ok(self.attrs()?.resources.clone())
    }

    /// Parsed content stream, cached after the first call.
    pub fn content_stream(&self) -> PDFResult<Arc<ContentStream>> {
        self.doc.ensure_open()?;
        Ok(self.entry.content(self.doc.store()))
    }

    /// Runs the content stream and returns the page's draw commands in
    /// default user space.
    pub fn interpret(&self) -> PDFResult<DisplayList> {
        let content = self.content_stream()?;
        let list = self.doc.interpret(&content, self.entry.attrs.resources.as_deref());
        self.doc.ensure_open()?;
        Ok(list)
    }

    /// Renders the page into `target`.
    #[cfg(feature = "rendering")]
    pub fn render(
        &self,
        target: &mut crate::rendering::RasterTarget<'_>,
        options: &super::config::RenderOptions,
    ) -> PDFResult<crate::rendering::RenderOutcome> {
        self.render_with_cancel(target, options, &crate::rendering::CancellationToken::new())
    }

    /// Renders the page into `target`, checking `cancel` between draw
    /// commands. A cancelled render leaves `target` untouched.
    #[cfg(feature = "rendering")]
    pub fn render_with_cancel(
        &self,
        target: &mut crate::rendering::RasterTarget<'_>,
        options: &super::config::RenderOptions,
        cancel: &crate::rendering::CancellationToken,
    ) -> PDFResult<crate::rendering::RenderOutcome> {
        target.check_format()?;
        let list = self.interpret()?;
        let attrs = self.attrs()?;
        let geometry = crate::rendering::PageGeometry {
            view_box: attrs.view_box(),
            rotation: attrs.rotation(),
        };
        let outcome = crate::rendering::rasterize(
            &list,
            geometry,
            target,
            options,
            cancel,
        )?;
        self.doc.ensure_open()?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_normalised_and_intersected() {
        let a = Rect::new(100.0, 200.0, 0.0, 0.0);
        assert_eq!(a, Rect::new(0.0, 0.0, 100.0, 200.0));
        let b = Rect::new(50.0, 50.0, 150.0, 150.0);
        assert_eq!(a.intersect(&b), Some(Rect::new(50.0, 50.0, 100.0, 150.0)));
        assert_eq!(a.intersect(&Rect::new(200.0, 0.0, 300.0, 10.0)), None);
    }

    #[test]
    fn test_rect_from_object() {
        let obj = PDFObject::Array(
            [0.0, 0.0, 595.0, 842.0]
                .iter()
                .map(|n| Box::new(PDFObject::Number(*n)))
                .collect(),
        );
        assert_eq!(Rect::from_object(&obj), Some(Rect::new(0.0, 0.0, 595.0, 842.0)));
        let short = PDFObject::Array(vec![Box::new(PDFObject::Number(1.0))].into());
        assert_eq!(Rect::from_object(&short), None);
    }

    #[test]
    fn test_attribute_defaults() {
        let attrs = PageAttributes::default();
        assert_eq!(attrs.media_box(), DEFAULT_MEDIA_BOX);
        assert_eq!(attrs.view_box(), DEFAULT_MEDIA_BOX);
        assert_eq!(attrs.rotation(), 0);
    }

    #[test]
    fn test_rotation_normalised() {
        let with = |r| PageAttributes {
            rotate: Some(r),
            ..Default::default()
        };
        assert_eq!(with(-90).rotation(), 270);
        assert_eq!(with(450).rotation(), 90);
        assert_eq!(with(45).rotation(), 0);
    }

    #[test]
    fn test_view_box_ignores_disjoint_crop() {
        let attrs = PageAttributes {
            media_box: Some(Rect::new(0.0, 0.0, 100.0, 100.0)),
            crop_box: Some(Rect::new(10.0, 10.0, 50.0, 200.0)),
            ..Default::default()
        };
        assert_eq!(attrs.view_box(), Rect::new(10.0, 10.0, 50.0, 100.0));

        let disjoint = PageAttributes {
            crop_box: Some(Rect::new(1000.0, 1000.0, 1100.0, 1100.0)),
            ..attrs
        };
        assert_eq!(disjoint.view_box(), Rect::new(0.0, 0.0, 100.0, 100.0));
    }
}
