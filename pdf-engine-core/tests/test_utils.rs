//! Test utilities and helpers for pdf-engine-core tests
//!
//! Documents are assembled in memory by [`PdfBuilder`], which lays the
//! objects out and writes a cross-reference table with correct offsets, so
//! tests never depend on fixture files.

#![allow(dead_code)]

use pdf_engine_core::{PDFDocument, PDFResult};

/// One indirect object waiting to be written.
struct Entry {
    num: u32,
    body: Vec<u8>,
}

/// Builds a PDF file from object bodies.
#[derive(Default)]
pub struct PdfBuilder {
    objects: Vec<Entry>,
    root: Option<u32>,
    info: Option<u32>,
    trailer_extra: String,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `num 0 obj <body> endobj`.
    pub fn object(mut self, num: u32, body: &str) -> Self {
        self.objects.push(Entry {
            num,
            body: body.as_bytes().to_vec(),
        });
        self
    }

    /// Adds a stream object; `/Length` is filled in.
    pub fn stream(self, num: u32, dict_entries: &str, data: &[u8]) -> Self {
        self.raw_stream(num, &format!("<< /Length {} {} >>", data.len(), dict_entries), data)
    }

    /// Adds a stream object with the dictionary written as given.
    pub fn raw_stream(mut self, num: u32, dict: &str, data: &[u8]) -> Self {
        let mut body = dict.as_bytes().to_vec();
        body.extend_from_slice(b"\nstream\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.objects.push(Entry { num, body });
        self
    }

    pub fn root(mut self, num: u32) -> Self {
        self.root = Some(num);
        self
    }

    pub fn info(mut self, num: u32) -> Self {
        self.info = Some(num);
        self
    }

    /// Extra trailer entries, e.g. `/Encrypt 9 0 R`.
    pub fn trailer_entries(mut self, entries: &str) -> Self {
        self.trailer_extra = entries.to_string();
        self
    }

    /// The file with a classic cross-reference table.
    pub fn build(&self) -> Vec<u8> {
        let mut out = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n".to_vec();
        let mut offsets = Vec::new();
        for entry in &self.objects {
            offsets.push((entry.num, out.len()));
            out.extend_from_slice(format!("{} 0 obj\n", entry.num).as_bytes());
            out.extend_from_slice(&entry.body);
            out.extend_from_slice(b"\nendobj\n");
        }

        let size = self.objects.iter().map(|e| e.num).max().unwrap_or(0) + 1;
        let xref_offset = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
        out.extend_from_slice(b"0000000000 65535 f \n");
        for num in 1..size {
            match offsets.iter().rev().find(|(n, _)| *n == num) {
                Some((_, offset)) => {
                    out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes())
                }
                None => out.extend_from_slice(b"0000000000 00000 f \n"),
            }
        }

        let mut trailer = format!("trailer\n<< /Size {}", size);
        if let Some(root) = self.root {
            trailer.push_str(&format!(" /Root {} 0 R", root));
        }
        if let Some(info) = self.info {
            trailer.push_str(&format!(" /Info {} 0 R", info));
        }
        if !self.trailer_extra.is_empty() {
            trailer.push(' ');
            trailer.push_str(&self.trailer_extra);
        }
        trailer.push_str(" >>\n");
        out.extend_from_slice(trailer.as_bytes());
        out.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_offset).as_bytes());
        out
    }

    /// The file without any cross-reference data, as a damaged file would be.
    pub fn build_without_xref(&self) -> Vec<u8> {
        let mut out = b"%PDF-1.4\n".to_vec();
        for entry in &self.objects {
            out.extend_from_slice(format!("{} 0 obj\n", entry.num).as_bytes());
            out.extend_from_slice(&entry.body);
            out.extend_from_slice(b"\nendobj\n");
        }
        if let Some(root) = self.root {
            out.extend_from_slice(format!("trailer\n<< /Root {} 0 R >>\n", root).as_bytes());
        }
        out.extend_from_slice(b"%%EOF\n");
        out
    }

    pub fn open(&self) -> PDFResult<PDFDocument> {
        PDFDocument::open(self.build())
    }
}

/// A document whose pages show the given content streams on US Letter media.
/// Objects: 1 catalog, 2 page tree, 3 font, then a page and its content
/// stream per page.
pub fn simple_pdf(contents: &[&str]) -> PdfBuilder {
    let mut builder = PdfBuilder::new()
        .root(1)
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(
            3,
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /FirstChar 32 /LastChar 126 \
             /Widths [278 278 355 556 556 889 667 191 333 333 389 584 278 333 278 278] \
             /Encoding /WinAnsiEncoding >>",
        );
    let kids: Vec<String> = (0..contents.len()).map(|i| format!("{} 0 R", 10 + 2 * i)).collect();
    builder = builder.object(
        2,
        &format!(
            "<< /Type /Pages /Kids [{}] /Count {} /MediaBox [0 0 612 792] >>",
            kids.join(" "),
            contents.len()
        ),
    );
    for (i, content) in contents.iter().enumerate() {
        let page = 10 + 2 * i as u32;
        builder = builder
            .object(
                page,
                &format!(
                    "<< /Type /Page /Parent 2 0 R /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >>",
                    page + 1
                ),
            )
            .stream(page + 1, "", content.as_bytes());
    }
    builder
}

/// A balanced page tree of `leaves` pages, `fanout` kids per node. The
/// catalog is object 1; the tree starts at object 2.
pub fn page_tree_pdf(leaves: usize, fanout: usize) -> PdfBuilder {
    let fanout = fanout.max(2);
    let mut builder = PdfBuilder::new().root(1).object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    let mut next = 3u32;
    fn build_node(
        builder: PdfBuilder,
        num: u32,
        parent: Option<u32>,
        leaves: usize,
        fanout: usize,
        next: &mut u32,
    ) -> PdfBuilder {
        let parent_entry = parent.map(|p| format!(" /Parent {} 0 R", p)).unwrap_or_default();
        if leaves <= fanout {
            let mut kids = Vec::new();
            let mut builder = builder;
            for _ in 0..leaves {
                let leaf = *next;
                *next += 1;
                kids.push(format!("{} 0 R", leaf));
                builder = builder.object(leaf, &format!("<< /Type /Page /Parent {} 0 R >>", num));
            }
            return builder.object(
                num,
                &format!(
                    "<< /Type /Pages{} /Kids [{}] /Count {} >>",
                    parent_entry,
                    kids.join(" "),
                    leaves
                ),
            );
        }
        let per_kid = leaves.div_ceil(fanout);
        let mut remaining = leaves;
        let mut kids = Vec::new();
        let mut builder = builder;
        while remaining > 0 {
            let take = per_kid.min(remaining);
            remaining -= take;
            let kid = *next;
            *next += 1;
            kids.push(format!("{} 0 R", kid));
            builder = build_node(builder, kid, Some(num), take, fanout, next);
        }
        builder.object(
            num,
            &format!(
                "<< /Type /Pages{} /Kids [{}] /Count {} >>",
                parent_entry,
                kids.join(" "),
                leaves
            ),
        )
    }
    builder = build_node(builder, 2, None, leaves, fanout, &mut next);
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_offsets_point_at_objects() {
        let bytes = PdfBuilder::new().root(1).object(1, "<< /Type /Catalog >>").build();
        let text = String::from_utf8_lossy(&bytes);
        let entry = text.lines().find(|l| l.ends_with(" 00000 n ")).unwrap();
        let offset: usize = entry[..10].parse().unwrap();
        assert!(bytes[offset..].starts_with(b"1 0 obj"));
    }
}
