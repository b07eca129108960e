//! Document lifecycle, page tree, metadata and outline tests.

mod test_utils;

use pdf_engine_core::core::DestinationKind;
use pdf_engine_core::{PDFDocument, PDFError, PDFObject, Rect, Ref};
use std::sync::Arc;
use std::thread;
use test_utils::*;

// ============================================================================
// Opening and page tree
// ============================================================================

#[test]
fn test_open_simple_document() {
    let doc = simple_pdf(&["0 0 m 10 10 l S", "BT /F1 12 Tf (Hi) Tj ET"]).open().unwrap();
    assert_eq!(doc.version(), Some("1.7"));
    assert!(!doc.is_recovered().unwrap());
    assert_eq!(doc.page_count().unwrap(), 2);

    let page = doc.get_page(1).unwrap();
    assert_eq!(page.index().unwrap(), 1);
    assert_eq!(page.reference().unwrap(), Some(Ref::new(12, 0)));
    assert_eq!(page.media_box().unwrap(), Rect::new(0.0, 0.0, 612.0, 792.0));
}

#[test]
fn test_page_index_out_of_range() {
    let doc = simple_pdf(&["", ""]).open().unwrap();
    match doc.get_page(2) {
        Err(PDFError::PageIndexOutOfRange { index, count }) => assert_eq!((index, count), (2, 2)),
        other => panic!("expected PageIndexOutOfRange, got {:?}", other.map(|_| ())),
    }
    // The failed call leaves the document usable.
    assert!(doc.get_page(0).is_ok());
}

#[test]
fn test_page_count_matches_leaves() {
    for (leaves, fanout) in [(1, 2), (7, 3), (25, 4), (64, 8)] {
        let doc = page_tree_pdf(leaves, fanout).open().unwrap();
        assert_eq!(doc.page_count().unwrap(), leaves, "{} leaves, fanout {}", leaves, fanout);
    }
}

#[test]
fn test_inherited_attributes_and_defaults() {
    let doc = PdfBuilder::new()
        .root(1)
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(
            2,
            "<< /Type /Pages /Kids [3 0 R 4 0 R 5 0 R] /Count 3 /MediaBox [0 0 595 842] /Rotate 90 >>",
        )
        .object(3, "<< /Type /Page /Parent 2 0 R >>")
        .object(4, "<< /Type /Page /Parent 2 0 R /Rotate -90 /CropBox [100 100 700 500] >>")
        .object(5, "<< /Type /Page /Parent 6 0 R >>")
        .object(6, "<< /Type /Pages /Kids [5 0 R] /Count 1 >>")
        .open()
        .unwrap();

    let first = doc.get_page(0).unwrap();
    assert_eq!(first.media_box().unwrap(), Rect::new(0.0, 0.0, 595.0, 842.0));
    assert_eq!(first.rotation().unwrap(), 90);
    assert_eq!((first.width().unwrap(), first.height().unwrap()), (842.0, 595.0));

    let second = doc.get_page(1).unwrap();
    assert_eq!(second.rotation().unwrap(), 270);
    // View box is the media box clipped by the crop box.
    assert_eq!(second.view_box().unwrap(), Rect::new(100.0, 100.0, 595.0, 500.0));
}

#[test]
fn test_default_media_box() {
    let doc = PdfBuilder::new()
        .root(1)
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 0 0] >>")
        .open()
        .unwrap();
    let page = doc.get_page(0).unwrap();
    assert_eq!(page.view_box().unwrap(), Rect::new(0.0, 0.0, 612.0, 792.0));
}

#[test]
fn test_cyclic_page_tree_terminates() {
    let doc = PdfBuilder::new()
        .root(1)
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R >>")
        .object(4, "<< /Type /Pages /Kids [2 0 R] /Count 1 >>")
        .open()
        .unwrap();
    assert_eq!(doc.page_count().unwrap(), 1);
}

// ============================================================================
// Object model
// ============================================================================

#[test]
fn test_resolve_is_idempotent() {
    let doc = simple_pdf(&["0 0 m"]).open().unwrap();
    let first = doc.resolve(Ref::new(3, 0)).unwrap();
    let second = doc.resolve(Ref::new(3, 0)).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.get("BaseFont").and_then(PDFObject::as_name), Some("Helvetica"));
}

#[test]
fn test_reference_cycle_is_reported() {
    let doc = simple_pdf(&[""])
        .object(40, "41 0 R")
        .object(41, "40 0 R")
        .open()
        .unwrap();
    assert!(matches!(
        doc.resolve(Ref::new(40, 0)),
        Err(PDFError::CyclicReference { .. })
    ));
    // The document keeps working.
    assert_eq!(doc.page_count().unwrap(), 1);
}

#[test]
fn test_missing_object_is_unresolved() {
    let doc = simple_pdf(&[""]).open().unwrap();
    assert!(matches!(
        doc.resolve(Ref::new(500, 0)),
        Err(PDFError::UnresolvedReference { num: 500, .. })
    ));
    // Object 5 is a free entry in the table.
    assert!(matches!(
        doc.resolve(Ref::new(5, 0)),
        Err(PDFError::UnresolvedReference { num: 5, .. })
    ));
}

#[test]
fn test_decode_streams() {
    let doc = simple_pdf(&[""])
        .stream(40, "/Filter /ASCIIHexDecode", b"48656C6C6F>")
        .stream(41, "/Filter /NoSuchFilter", b"data")
        .stream(42, "/Filter [/AHx /A85]", b"38382F7E3E>")
        .open()
        .unwrap();

    let hex = doc.resolve(Ref::new(40, 0)).unwrap();
    assert_eq!(doc.decode_stream(&hex).unwrap(), b"Hello");

    let unknown = doc.resolve(Ref::new(41, 0)).unwrap();
    assert!(matches!(doc.decode_stream(&unknown), Err(PDFError::UnsupportedFilter(_))));

    // Abbreviated names, applied in order: hex gives "88/~>", ASCII85 gives "Hi".
    let chained = doc.resolve(Ref::new(42, 0)).unwrap();
    assert_eq!(doc.decode_stream(&chained).unwrap(), b"Hi");
}

#[test]
fn test_unsupported_filter_in_content_is_a_warning() {
    let doc = PdfBuilder::new()
        .root(1)
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /Contents [4 0 R 5 0 R] >>")
        .stream(4, "/Filter /JBIG3", b"garbage")
        .stream(5, "", b"0 0 10 10 re f")
        .open()
        .unwrap();
    let list = doc.get_page(0).unwrap().interpret().unwrap();
    assert_eq!(list.len(), 1);
    assert!(!list.warnings.is_empty());
}

// ============================================================================
// Recovery and refusal
// ============================================================================

#[test]
fn test_recovery_without_xref() {
    let builder = simple_pdf(&["0 0 10 10 re f", ""]);
    let doc = PDFDocument::open(builder.build_without_xref()).unwrap();
    assert!(doc.is_recovered().unwrap());
    assert_eq!(doc.page_count().unwrap(), 2);
    assert_eq!(doc.get_page(0).unwrap().interpret().unwrap().len(), 1);
}

#[test]
fn test_recovery_with_wrong_startxref() {
    let mut bytes = simple_pdf(&[""]).build();
    let pos = bytes.windows(9).rposition(|w| w == b"startxref").unwrap();
    bytes.truncate(pos);
    bytes.extend_from_slice(b"startxref\n99999\n%%EOF\n");
    let doc = PDFDocument::open(bytes).unwrap();
    assert!(doc.is_recovered().unwrap());
    assert_eq!(doc.page_count().unwrap(), 1);
}

#[test]
fn test_garbage_is_malformed() {
    assert!(matches!(
        PDFDocument::open(b"this is not a pdf at all".to_vec()),
        Err(PDFError::MalformedContainer(_))
    ));
    assert!(matches!(PDFDocument::open(Vec::new()), Err(PDFError::MalformedContainer(_))));
}

#[test]
fn test_encrypted_document_is_refused() {
    let result = simple_pdf(&[""])
        .object(30, "<< /Filter /Standard /V 2 /R 3 /O <00> /U <00> /P -4 >>")
        .trailer_entries("/Encrypt 30 0 R")
        .open();
    assert!(matches!(result, Err(PDFError::EncryptedDocument)));
}

#[test]
fn test_open_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.pdf");
    std::fs::write(&path, simple_pdf(&["", "", ""]).build()).unwrap();
    let doc = PDFDocument::open_file(&path).unwrap();
    assert_eq!(doc.page_count().unwrap(), 3);

    assert!(matches!(
        PDFDocument::open_file(dir.path().join("missing.pdf")),
        Err(PDFError::Io(_))
    ));
}

// ============================================================================
// Metadata
// ============================================================================

#[test]
fn test_metadata_fields() {
    let doc = simple_pdf(&[""])
        .object(
            20,
            "<< /Title (Annual Report) /Author <FEFF00C9006D0069006C0065> /Producer (engine) \
             /CreationDate (D:20240115103000+02'00') /ModDate (garbage) >>",
        )
        .info(20)
        .open()
        .unwrap();
    let info = doc.metadata().unwrap();
    assert_eq!(info.title.as_deref(), Some("Annual Report"));
    assert_eq!(info.author.as_deref(), Some("Émile"));
    assert_eq!(info.subject, None);
    assert_eq!(info.keywords, None);
    assert_eq!(info.producer.as_deref(), Some("engine"));

    let created = info.creation_date_parsed().unwrap();
    assert_eq!(created.to_rfc3339(), "2024-01-15T10:30:00+02:00");
    assert_eq!(info.mod_date.as_deref(), Some("garbage"));
    assert_eq!(info.mod_date_parsed(), None);
}

#[test]
fn test_metadata_absent() {
    let doc = simple_pdf(&[""]).open().unwrap();
    assert!(doc.metadata().unwrap().is_empty());
}

// ============================================================================
// Outline
// ============================================================================

/// Three pages (objects 10, 12, 14) with a five-entry outline rooted at 50.
fn outlined_pdf() -> PdfBuilder {
    simple_pdf(&["", "", ""])
        .object(1, "<< /Type /Catalog /Pages 2 0 R /Outlines 50 0 R /Dests 60 0 R >>")
        .object(50, "<< /Type /Outlines /First 51 0 R /Last 56 0 R /Count 5 >>")
        .object(51, "<< /Title (Intro) /Parent 50 0 R /Next 52 0 R /Dest [10 0 R /Fit] >>")
        .object(
            52,
            "<< /Title (Broken) /Parent 50 0 R /Prev 51 0 R /Next 53 0 R /Dest [99 0 R /XYZ 0 0 0] >>",
        )
        .object(
            53,
            "<< /Title (Chapter) /Parent 50 0 R /Prev 52 0 R /Next 54 0 R /First 55 0 R /Last 55 0 R \
             /Count -1 /A << /S /GoTo /D /chap >> /F 3 /C [1 0 0] >>",
        )
        .object(
            54,
            "<< /Title (Website) /Parent 50 0 R /Prev 53 0 R /Next 56 0 R \
             /A << /S /URI /URI (https://example.com) >> >>",
        )
        .object(55, "<< /Title (Section) /Parent 53 0 R /Dest [2 /FitH 700] >>")
        .object(56, "<< /Title (Appendix) /Parent 50 0 R /Prev 54 0 R /Dest [99 /Fit] >>")
        .object(60, "<< /chap << /D [12 0 R /Fit] >> >>")
}

#[test]
fn test_outline_tree() {
    let doc = outlined_pdf().open().unwrap();
    let outline = doc.outline().unwrap();
    let titles: Vec<&str> = outline.iter().map(|b| b.title.as_str()).collect();
    assert_eq!(titles, ["Intro", "Broken", "Chapter", "Website", "Appendix"]);

    assert_eq!(outline[0].page_index, Some(0));
    assert_eq!(outline[0].destination, DestinationKind::Explicit);

    // An unresolvable target does not disturb its siblings.
    assert_eq!(outline[1].page_index, None);

    let chapter = &outline[2];
    assert_eq!(chapter.page_index, Some(1));
    assert_eq!(chapter.destination, DestinationKind::Named("chap".into()));
    assert!(chapter.has_children());
    assert!(!chapter.open);
    assert!(chapter.bold && chapter.italic);
    assert_eq!(chapter.color, [1.0, 0.0, 0.0]);
    assert_eq!(chapter.children[0].title, "Section");
    assert_eq!(chapter.children[0].page_index, Some(2));

    assert_eq!(outline[3].page_index, None);
    assert_eq!(outline[3].destination, DestinationKind::Uri("https://example.com".into()));

    // A page number past the end of the document names no page.
    assert_eq!(outline[4].page_index, None);
    assert_eq!(outline[4].destination, DestinationKind::Explicit);
}

#[test]
fn test_outline_cycle_terminates() {
    let doc = simple_pdf(&[""])
        .object(1, "<< /Type /Catalog /Pages 2 0 R /Outlines 50 0 R >>")
        .object(50, "<< /First 51 0 R >>")
        .object(51, "<< /Title (A) /Next 52 0 R /First 51 0 R >>")
        .object(52, "<< /Title (B) /Next 51 0 R >>")
        .open()
        .unwrap();
    let outline = doc.outline().unwrap();
    let titles: Vec<&str> = outline.iter().map(|b| b.title.as_str()).collect();
    assert_eq!(titles, ["A", "B"]);
    assert!(outline[0].children.is_empty());
}

#[test]
fn test_no_outline() {
    let doc = simple_pdf(&[""]).open().unwrap();
    assert!(doc.outline().unwrap().is_empty());
}

// ============================================================================
// Lifecycle and concurrency
// ============================================================================

#[test]
fn test_close_invalidates_document_and_pages() {
    let doc = simple_pdf(&["0 0 10 10 re f"]).open().unwrap();
    let page = doc.get_page(0).unwrap();
    let clone = doc.clone();

    doc.close();
    assert!(clone.is_closed());
    assert!(matches!(doc.page_count(), Err(PDFError::DocumentClosed)));
    assert!(matches!(clone.get_page(0), Err(PDFError::DocumentClosed)));
    assert!(matches!(doc.metadata(), Err(PDFError::DocumentClosed)));
    assert!(matches!(doc.outline(), Err(PDFError::DocumentClosed)));
    assert!(matches!(page.width(), Err(PDFError::DocumentClosed)));
    assert!(matches!(page.interpret(), Err(PDFError::DocumentClosed)));

    // Closing twice is harmless.
    doc.close();
    assert!(doc.is_closed());
}

#[test]
fn test_handles_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<PDFDocument>();
    assert_send_sync::<pdf_engine_core::Page>();
}

#[test]
fn test_concurrent_page_access() {
    let contents: Vec<String> = (0..8)
        .map(|i| format!("{} 0 0 rg 0 0 {} 10 re f", i % 2, i + 1))
        .collect();
    let refs: Vec<&str> = contents.iter().map(String::as_str).collect();
    let doc = simple_pdf(&refs).open().unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let doc = doc.clone();
            thread::spawn(move || {
                let page = doc.get_page(i).unwrap();
                let list = page.interpret().unwrap();
                (list.len(), doc.resolve(Ref::new(3, 0)).unwrap())
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(results.iter().all(|(len, _)| *len == 1));
    // Every thread saw the same cached object.
    assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0].1, &w[1].1)));
}
