/// Benchmarks for pdf-engine-core parsing and rendering performance
///
/// Documents are generated in memory so the numbers do not depend on
/// fixture files.
///
/// Run with: cargo bench
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use pdf_engine_core::{PDFDocument, PixelFormat, RasterTarget, Ref, RenderOptions};

/// A document with `pages` pages, each drawing a grid of filled squares,
/// a stroked diagonal and a line of text.
fn generate_pdf(pages: usize) -> Vec<u8> {
    let mut content = String::new();
    for row in 0..20 {
        for col in 0..20 {
            content.push_str(&format!(
                "{} {} {} rg {} {} 20 20 re f\n",
                row as f32 / 20.0,
                col as f32 / 20.0,
                0.5,
                30 * col,
                40 * row
            ));
        }
    }
    content.push_str("q 0 G 2 w 0 0 m 612 792 l S Q\n");
    content.push_str("BT /F1 18 Tf 72 720 Td (The quick brown fox) Tj ET\n");

    let mut objects: Vec<(usize, String)> = vec![
        (1, "<< /Type /Catalog /Pages 2 0 R >>".to_string()),
        (
            3,
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_string(),
        ),
    ];
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", 10 + 2 * i)).collect();
    objects.push((
        2,
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} /MediaBox [0 0 612 792] /Resources << /Font << /F1 3 0 R >> >> >>",
            kids.join(" "),
            pages
        ),
    ));
    for i in 0..pages {
        let page = 10 + 2 * i;
        objects.push((
            page,
            format!("<< /Type /Page /Parent 2 0 R /Contents {} 0 R >>", page + 1),
        ));
        objects.push((
            page + 1,
            format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content),
        ));
    }
    objects.sort_by_key(|(num, _)| *num);

    let mut out = b"%PDF-1.7\n".to_vec();
    let mut offsets = Vec::new();
    for (num, body) in &objects {
        offsets.push((*num, out.len()));
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", num, body).as_bytes());
    }
    let size = objects.last().map_or(1, |(num, _)| num + 1);
    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", size).as_bytes());
    for num in 1..size {
        match offsets.iter().find(|(n, _)| *n == num) {
            Some((_, offset)) => {
                out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes())
            }
            None => out.extend_from_slice(b"0000000000 00000 f \n"),
        }
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            size, xref
        )
        .as_bytes(),
    );
    out
}

/// Removes the cross-reference data so opening goes through the scan.
fn strip_xref(mut data: Vec<u8>) -> Vec<u8> {
    if let Some(pos) = data.windows(6).rposition(|w| w == b"\nxref\n") {
        data.truncate(pos + 1);
    }
    data
}

/// Benchmark PDF document opening
fn benchmark_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_opening");

    for pages in [1, 50, 500] {
        let data = generate_pdf(pages);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::new("xref", pages), &data, |b, data| {
            b.iter(|| {
                let doc = PDFDocument::open(black_box(data.clone())).unwrap();
                doc.page_count().unwrap()
            });
        });

        let damaged = strip_xref(data);
        group.bench_with_input(BenchmarkId::new("recovery", pages), &damaged, |b, data| {
            b.iter(|| {
                let doc = PDFDocument::open(black_box(data.clone())).unwrap();
                doc.page_count().unwrap()
            });
        });
    }

    group.finish();
}

/// Benchmark resolving every object of a fresh document
fn benchmark_resolve(c: &mut Criterion) {
    let data = generate_pdf(100);

    c.bench_function("resolve_all_objects", |b| {
        b.iter(|| {
            let doc = PDFDocument::open(data.clone()).unwrap();
            for num in 1..(10 + 2 * 100) {
                let _ = black_box(doc.resolve(Ref::new(num, 0)));
            }
        });
    });
}

/// Benchmark content stream interpretation
fn benchmark_interpret(c: &mut Criterion) {
    let doc = PDFDocument::open(generate_pdf(1)).unwrap();
    let page = doc.get_page(0).unwrap();

    c.bench_function("interpret_page", |b| {
        b.iter(|| black_box(page.interpret().unwrap()));
    });
}

/// Benchmark rasterization into each supported format
fn benchmark_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    let doc = PDFDocument::open(generate_pdf(1)).unwrap();
    let page = doc.get_page(0).unwrap();
    let (width, height) = (306u32, 396u32);
    let options = RenderOptions::with_scale(0.5);

    for format in [PixelFormat::Rgb565, PixelFormat::Argb8888] {
        let mut buf = vec![0u8; width as usize * height as usize * format.bytes_per_pixel()];
        group.throughput(Throughput::Elements(u64::from(width * height)));
        group.bench_function(BenchmarkId::from_parameter(format!("{:?}", format)), |b| {
            b.iter(|| {
                let mut target = RasterTarget::new(width, height, format, &mut buf).unwrap();
                page.render(&mut target, black_box(&options)).unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_open,
    benchmark_resolve,
    benchmark_interpret,
    benchmark_render
);
criterion_main!(benches);
