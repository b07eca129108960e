//! Property-based tests for robustness validation.
//!
//! These tests use proptest to generate random inputs and verify invariants.

mod test_utils;

use pdf_engine_core::core::{ContentStream, Lexer, Parser, Stream, Token};
use pdf_engine_core::{PDFDocument, PDFError, Ref};
use proptest::prelude::*;
use std::sync::Arc;
use test_utils::*;

// ============================================================================
// Lexer and parser
// ============================================================================

proptest! {
    /// The lexer reaches EOF or an error on any input, without panicking.
    #[test]
    fn prop_lexer_terminates(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let mut lexer = Lexer::new(Box::new(Stream::from_bytes(data.clone()))).unwrap();
        for _ in 0..=data.len() + 1 {
            match lexer.get_object() {
                Ok(Token::EOF) | Err(_) => break,
                Ok(_) => {}
            }
        }
    }

    #[test]
    fn prop_parser_never_panics(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let lexer = Lexer::new(Box::new(Stream::from_bytes(data.clone()))).unwrap();
        if let Ok(mut parser) = Parser::new(lexer) {
            for _ in 0..=data.len() + 1 {
                match parser.get_object() {
                    Ok(obj) if obj.is_eof() => break,
                    Err(_) => break,
                    Ok(_) => {}
                }
            }
        }
    }

    /// Content parsing is tolerant: it always returns, recording problems.
    #[test]
    fn prop_content_parse_never_panics(text in "[ -~\n]{0,256}") {
        let content = ContentStream::parse(text.into_bytes());
        prop_assert!(content.operations.len() <= 256);
    }

    #[test]
    fn prop_integers_round_trip(n in -1_000_000i64..1_000_000) {
        let lexer = Lexer::new(Box::new(Stream::from_bytes(n.to_string().into_bytes()))).unwrap();
        let mut parser = Parser::new(lexer).unwrap();
        prop_assert_eq!(parser.get_object().unwrap().as_int(), Some(n));
    }
}

// ============================================================================
// Documents
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Arbitrary bytes either open or fail with an error; nothing panics.
    #[test]
    fn prop_open_never_panics(data in proptest::collection::vec(any::<u8>(), 0..1024)) {
        let _ = PDFDocument::open(data);
    }

    /// Damaging a valid file anywhere never panics, and whatever opens still
    /// answers page queries.
    #[test]
    fn prop_damaged_file_degrades(cut in 0usize..1000, byte in any::<u8>()) {
        let mut data = simple_pdf(&["0 0 10 10 re f", "BT /F1 9 Tf (x) Tj ET"]).build();
        let pos = cut % data.len();
        data[pos] = byte;
        if let Ok(doc) = PDFDocument::open(data) {
            let count = doc.page_count().unwrap();
            for i in 0..count {
                let page = doc.get_page(i).unwrap();
                let _ = page.interpret();
            }
            prop_assert!(matches!(
                doc.get_page(count),
                Err(PDFError::PageIndexOutOfRange { .. })
            ), "expected PageIndexOutOfRange for index past page count");
        }
    }

    #[test]
    fn prop_page_count_equals_leaves(leaves in 1usize..80, fanout in 2usize..10) {
        let doc = page_tree_pdf(leaves, fanout).open().unwrap();
        prop_assert_eq!(doc.page_count().unwrap(), leaves);
    }

    /// Resolving the same reference twice yields the same shared object.
    #[test]
    fn prop_resolve_idempotent(num in 1u32..20) {
        let doc = simple_pdf(&["", ""]).open().unwrap();
        let first = doc.resolve(Ref::new(num, 0));
        let second = doc.resolve(Ref::new(num, 0));
        match (first, second) {
            (Ok(a), Ok(b)) => prop_assert!(Arc::ptr_eq(&a, &b)),
            (Err(a), Err(b)) => prop_assert_eq!(a.to_string(), b.to_string()),
            _ => prop_assert!(false, "resolution of {} changed between calls", num),
        }
    }
}
