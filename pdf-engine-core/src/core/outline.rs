//! Document outline (bookmarks).
//!
//! Outline items form a linked structure: `/First` points at the first
//! child, `/Next` at the following sibling. Items are loaded through the
//! object store, so a reference loop in a damaged file is detected by a
//! visited set instead of being followed forever.
//!
//! Based on PDF.js's catalog.js #readDocumentOutline.

use super::metadata::decode_text_string;
use super::object_store::ObjectStore;
use super::parser::{PDFDict, PDFObject, Ref};
use rustc_hash::FxHashSet;

/// Bound on name tree depth while looking up named destinations.
const MAX_NAME_TREE_DEPTH: usize = 32;

/// Where a bookmark points, before it is mapped to a page.
#[derive(Debug, Clone, PartialEq)]
pub enum DestinationKind {
    /// An explicit `[page /View ...]` array.
    Explicit,
    /// A named destination, looked up in `/Dests` or the `/Names` tree.
    Named(String),
    /// A URI action.
    Uri(String),
    /// A `GoToR` action into another file.
    Remote { file: Option<String> },
    /// Any other action type, by name.
    Action(String),
    /// No destination or action at all.
    None,
}

/// One outline entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Bookmark {
    pub title: String,
    /// Zero-based target page. `None` means the destination could not be
    /// mapped to a page of this document.
    pub page_index: Option<usize>,
    pub destination: DestinationKind,
    pub children: Vec<Bookmark>,
    /// Whether the item is shown expanded (`/Count` positive).
    pub open: bool,
    /// RGB colour in 0..=1, black when absent.
    pub color: [f64; 3],
    pub bold: bool,
    pub italic: bool,
}

impl Bookmark {
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Number of bookmarks in this subtree, including this one.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Bookmark::count).sum::<usize>()
    }
}

/// Loads the outline rooted at the catalog's `/Outlines`.
///
/// Broken items are skipped; their siblings are still returned. Destinations
/// that do not name a page of this document leave `page_index` unset.
pub fn load_outline(
    store: &ObjectStore,
    catalog: &PDFObject,
    page_index_of: impl Fn(Ref) -> Option<usize>,
    page_count: usize,
    max_depth: usize,
) -> Vec<Bookmark> {
    let Some(catalog) = catalog.as_dict() else {
        return Vec::new();
    };
    let Some(root) = store.get_lenient(catalog, "Outlines") else {
        return Vec::new();
    };
    let Some(root) = root.as_dict() else {
        tracing::debug!("/Outlines is a {}", root.type_name());
        return Vec::new();
    };

    let mut loader = OutlineLoader {
        store,
        catalog,
        page_index_of,
        page_count,
        max_depth,
        visited: FxHashSet::default(),
    };
    loader.items(root.get("First"), 0)
}

struct OutlineLoader<'a, F> {
    store: &'a ObjectStore,
    catalog: &'a PDFDict,
    page_index_of: F,
    page_count: usize,
    max_depth: usize,
    visited: FxHashSet<Ref>,
}

impl<F: Fn(Ref) -> Option<usize>> OutlineLoader<'_, F> {
    /// Loads a sibling chain starting at `first`.
    fn items(&mut self, first: Option<&PDFObject>, depth: usize) -> Vec<Bookmark> {
        let mut items = Vec::new();
        if depth >= self.max_depth {
            tracing::warn!("outline nested deeper than {}, truncating", self.max_depth);
            return items;
        }

        let mut next = first.and_then(PDFObject::as_reference);
        while let Some(reference) = next.take() {
            if !self.visited.insert(reference) {
                tracing::warn!("outline item {} reached twice, stopping", reference);
                break;
            }
            let object = match self.store.resolve(reference) {
                Ok(object) => object,
                Err(e) => {
                    tracing::warn!("outline item {}: {}", reference, e);
                    break;
                }
            };
            let Some(dict) = object.as_dict() else {
                tracing::warn!("outline item {} is a {}", reference, object.type_name());
                break;
            };

            let children = self.items(dict.get("First"), depth + 1);
            items.push(self.bookmark(dict, children));
            next = dict.get("Next").and_then(PDFObject::as_reference);
        }
        items
    }

    fn bookmark(&self, dict: &PDFDict, children: Vec<Bookmark>) -> Bookmark {
        let title = self
            .store
            .get_lenient(dict, "Title")
            .and_then(|t| t.as_bytes().map(decode_text_string))
            .unwrap_or_default();

        let (destination, page_index) = self.destination(dict);
        let names_page =
            matches!(destination, DestinationKind::Explicit | DestinationKind::Named(_));
        if page_index.is_none() && names_page {
            tracing::warn!("bookmark {:?} points at no page of this document", title);
        }

        let count = self
            .store
            .get_lenient(dict, "Count")
            .and_then(|c| c.as_int())
            .unwrap_or(0);
        let flags = self
            .store
            .get_lenient(dict, "F")
            .and_then(|f| f.as_int())
            .unwrap_or(0);
        let color = self
            .store
            .get_lenient(dict, "C")
            .and_then(|c| c.as_number_array())
            .filter(|c| c.len() == 3)
            .map(|c| [c[0].clamp(0.0, 1.0), c[1].clamp(0.0, 1.0), c[2].clamp(0.0, 1.0)])
            .unwrap_or([0.0; 3]);

        Bookmark {
            title,
            page_index,
            destination,
            children,
            open: count > 0,
            color,
            bold: flags & 2 != 0,
            italic: flags & 1 != 0,
        }
    }

    /// Reads `/Dest`, falling back to the `/A` action.
    fn destination(&self, dict: &PDFDict) -> (DestinationKind, Option<usize>) {
        if let Some(dest) = self.store.get_lenient(dict, "Dest") {
            return self.dest_value(&dest);
        }
        let Some(action) = self.store.get_lenient(dict, "A") else {
            return (DestinationKind::None, None);
        };
        let Some(action) = action.as_dict() else {
            return (DestinationKind::None, None);
        };

        let kind = self
            .store
            .get_lenient(action, "S")
            .and_then(|s| s.as_name().map(str::to_string))
            .unwrap_or_default();
        match kind.as_str() {
            "GoTo" => match self.store.get_lenient(action, "D") {
                Some(dest) => self.dest_value(&dest),
                None => (DestinationKind::None, None),
            },
            "URI" => {
                let uri = self
                    .store
                    .get_lenient(action, "URI")
                    .and_then(|u| u.as_bytes().map(|b| String::from_utf8_lossy(b).into_owned()))
                    .unwrap_or_default();
                (DestinationKind::Uri(uri), None)
            }
            "GoToR" => {
                let file = self.store.get_lenient(action, "F").and_then(|f| match &*f {
                    PDFObject::String(b) | PDFObject::HexString(b) => Some(decode_text_string(b)),
                    PDFObject::Dictionary(spec) => spec
                        .get("UF")
                        .or_else(|| spec.get("F"))
                        .and_then(PDFObject::as_bytes)
                        .map(decode_text_string),
                    _ => None,
                });
                (DestinationKind::Remote { file }, None)
            }
            _ => (DestinationKind::Action(kind), None),
        }
    }

    /// Interprets a destination value: an explicit array or a name.
    fn dest_value(&self, dest: &PDFObject) -> (DestinationKind, Option<usize>) {
        match dest {
            PDFObject::Array(_) => (DestinationKind::Explicit, self.explicit_page(dest)),
            PDFObject::Name(name) => {
                let page = self.named(name.as_bytes()).and_then(|d| self.explicit_page(&d));
                (DestinationKind::Named(name.clone()), page)
            }
            PDFObject::String(bytes) | PDFObject::HexString(bytes) => {
                let page = self.named(bytes).and_then(|d| self.explicit_page(&d));
                (DestinationKind::Named(decode_text_string(bytes)), page)
            }
            _ => (DestinationKind::None, None),
        }
    }

    /// Page of an explicit destination. The first element is a page
    /// reference, or a page number in some producers' output.
    fn explicit_page(&self, dest: &PDFObject) -> Option<usize> {
        match &**dest.as_array()?.first()? {
            PDFObject::Ref(page) => (self.page_index_of)(*page),
            PDFObject::Number(n) if *n >= 0.0 && n.fract() == 0.0 => {
                let index = *n as usize;
                (index < self.page_count).then_some(index)
            }
            _ => None,
        }
    }

    /// Looks a name up in the catalog's `/Dests` dictionary, then in the
    /// `/Names` `/Dests` name tree. The result is the explicit array.
    fn named(&self, name: &[u8]) -> Option<PDFObject> {
        let found = self.dests_dict(name).or_else(|| self.dests_tree(name))?;
        let found = self.store.resolve_object(&found).ok()?;
        // A destination may be wrapped as << /D [...] >>.
        let value = match found.as_dict() {
            Some(dict) => (*self.store.get_lenient(dict, "D")?).clone(),
            None => (*found).clone(),
        };
        value.as_array().is_some().then_some(value)
    }

    fn dests_dict(&self, name: &[u8]) -> Option<PDFObject> {
        let dests = self.store.get_lenient(self.catalog, "Dests")?;
        let key = std::str::from_utf8(name).ok()?;
        dests.get(key).cloned()
    }

    fn dests_tree(&self, name: &[u8]) -> Option<PDFObject> {
        let names = self.store.get_lenient(self.catalog, "Names")?;
        let names = names.as_dict()?;
        let root = self.store.get_lenient(names, "Dests")?.into_shared();
        lookup_name_tree(self.store, &root, name)
    }
}

/// Finds `key` in a name tree, using `/Limits` to skip kids.
pub fn lookup_name_tree(store: &ObjectStore, root: &PDFObject, key: &[u8]) -> Option<PDFObject> {
    let mut visited = FxHashSet::default();
    let mut stack = vec![(root.clone(), 0usize)];

    while let Some((node, depth)) = stack.pop() {
        let Some(dict) = node.as_dict() else {
            continue;
        };

        if let Some(names) = store.get_lenient(dict, "Names") {
            for pair in names.as_array().unwrap_or_default().chunks(2) {
                let [k, v] = pair else { continue };
                let k = store.resolve_object(k).ok();
                if k.as_deref().and_then(PDFObject::as_bytes) == Some(key) {
                    return Some((**v).clone());
                }
            }
        }

        if depth >= MAX_NAME_TREE_DEPTH {
            tracing::warn!("name tree deeper than {}", MAX_NAME_TREE_DEPTH);
            continue;
        }
        let Some(kids) = store.get_lenient(dict, "Kids") else {
            continue;
        };
        for kid in kids.as_array().unwrap_or_default() {
            if let Some(r) = kid.as_reference() {
                if !visited.insert(r) {
                    continue;
                }
            }
            let Ok(kid) = store.resolve_object(kid) else {
                continue;
            };
            if !within_limits(store, &kid, key) {
                continue;
            }
            stack.push((kid.into_shared().as_ref().clone(), depth + 1));
        }
    }
    None
}

fn within_limits(store: &ObjectStore, node: &PDFObject, key: &[u8]) -> bool {
    let Some(limits) = node.as_dict().and_then(|d| store.get_lenient(d, "Limits")) else {
        return true;
    };
    match limits.as_array() {
        Some([low, high]) => match (low.as_bytes(), high.as_bytes()) {
            (Some(low), Some(high)) => low <= key && key <= high,
            _ => true,
        },
        _ => true,
    }
}
