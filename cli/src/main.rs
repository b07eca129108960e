mod cli;

use std::error::Error;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use cli::{Cli, Commands, FormatArg};
use pdf_engine_core::{
    Bookmark, PDFDocument, PDFError, PixelFormat, RasterTarget, RenderOptions, RenderOutcome,
};
use tracing::debug;

type CliResult = Result<(), Box<dyn Error>>;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Info { ref file } => show_info(file),
        Commands::Outline { ref file } => show_outline(file),
        Commands::Ops { ref file, page } => show_ops(file, page),
        Commands::Render {
            ref file,
            page,
            width,
            height,
            format,
            no_aa,
            ref output,
        } => render(file, page, width, height, format, !no_aa, output),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();

    // A subscriber may already be installed when embedded in tests.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Converts a 1-based page number into an index.
fn page_index(doc: &PDFDocument, page: usize) -> Result<usize, PDFError> {
    page.checked_sub(1).ok_or(PDFError::PageIndexOutOfRange {
        index: 0,
        count: doc.page_count()?,
    })
}

fn show_info(file: &Path) -> CliResult {
    let doc = PDFDocument::open_file(file)?;
    let page_count = doc.page_count()?;

    println!("═══════════════ DOCUMENT ═══════════════");
    println!("File: {}", file.display());
    if let Some(version) = doc.version() {
        println!("PDF Version: {}", version);
    }
    if doc.is_recovered()? {
        println!("Cross-reference table rebuilt by scanning the file");
    }
    println!("Pages: {}", page_count);
    println!();

    println!("═══════════════ DOCUMENT INFO ═══════════════");
    let info = doc.metadata()?;
    if info.is_empty() {
        println!("No document info dictionary found");
    }
    for (key, value) in info.fields() {
        if let Some(value) = value {
            println!("{:>13}: {}", key, value);
        }
    }
    if let Some(date) = info.creation_date_parsed() {
        println!("{:>13}: {}", "Created", date.to_rfc3339());
    }
    if let Some(date) = info.mod_date_parsed() {
        println!("{:>13}: {}", "Modified", date.to_rfc3339());
    }
    println!();

    println!("═══════════════ PAGE SIZES ═══════════════");
    for (index, page) in doc.pages()?.iter().enumerate() {
        let (width, height) = (page.width()?, page.height()?);
        let rotation = page.rotation()?;
        print!(
            "Page {}: {:.2} x {:.2} points ({:.2} x {:.2} inches)",
            index + 1,
            width,
            height,
            width / 72.0,
            height / 72.0
        );
        if rotation != 0 {
            print!(", rotated {}°", rotation);
        }
        println!();
    }
    Ok(())
}

fn show_outline(file: &Path) -> CliResult {
    let doc = PDFDocument::open_file(file)?;
    let outline = doc.outline()?;
    if outline.is_empty() {
        println!("No outline found in document");
        return Ok(());
    }
    print_bookmarks(&outline, 0);
    Ok(())
}

fn print_bookmarks(bookmarks: &[Bookmark], depth: usize) {
    for bookmark in bookmarks {
        let target = match bookmark.page_index {
            Some(index) => format!("page {}", index + 1),
            None => "unresolved".to_string(),
        };
        let marker = if !bookmark.has_children() {
            "•"
        } else if bookmark.open {
            "▾"
        } else {
            "▸"
        };
        println!("{}{} {} ({})", "  ".repeat(depth), marker, bookmark.title, target);
        print_bookmarks(&bookmark.children, depth + 1);
    }
}

fn show_ops(file: &Path, page: usize) -> CliResult {
    let doc = PDFDocument::open_file(file)?;
    let page = doc.get_page(page_index(&doc, page)?)?;
    let list = page.interpret()?;

    for (i, command) in list.commands.iter().enumerate() {
        println!("{:>5} {}", i, command);
    }
    if !list.warnings.is_empty() {
        println!();
        println!("{} warning(s):", list.warnings.len());
        for warning in &list.warnings {
            println!("  {}", warning);
        }
    }
    Ok(())
}

fn render(
    file: &Path,
    page: usize,
    width: u32,
    height: u32,
    format: FormatArg,
    anti_alias: bool,
    output: &Path,
) -> CliResult {
    let doc = PDFDocument::open_file(file)?;
    let page = doc.get_page(page_index(&doc, page)?)?;

    let format = PixelFormat::from(format);
    let mut pixels = vec![0u8; width as usize * height as usize * format.bytes_per_pixel()];
    let mut target = RasterTarget::new(width, height, format, &mut pixels)?;
    let options = RenderOptions {
        anti_alias,
        ..RenderOptions::fit(page.width()?, page.height()?, width, height)
    };
    debug!(scale = options.scale, "rendering page {}", page.index()? + 1);

    if page.render(&mut target, &options)? == RenderOutcome::Cancelled {
        return Err("render was cancelled".into());
    }

    let rgba = to_rgba(&pixels, format);
    let image = image::RgbaImage::from_raw(width, height, rgba).ok_or("bitmap size mismatch")?;
    image.save(output)?;
    println!("Wrote {}x{} {} render to {}", width, height, format, output.display());
    Ok(())
}

/// Expands a tightly packed target buffer into straight RGBA for the PNG encoder.
fn to_rgba(pixels: &[u8], format: PixelFormat) -> Vec<u8> {
    match format {
        PixelFormat::Rgb565 => pixels
            .chunks_exact(2)
            .flat_map(|px| {
                let v = u16::from_le_bytes([px[0], px[1]]);
                let expand = |bits: u16, max: u16| {
                    ((u32::from(bits) * 255 + u32::from(max) / 2) / u32::from(max)) as u8
                };
                [expand(v >> 11, 31), expand((v >> 5) & 0x3F, 63), expand(v & 0x1F, 31), 255]
            })
            .collect(),
        _ => pixels
            .chunks_exact(4)
            .flat_map(|px| {
                let a = px[3];
                let unpremultiply = |v: u8| {
                    if a == 0 {
                        0
                    } else {
                        ((u32::from(v) * 255 + u32::from(a) / 2) / u32::from(a)).min(255) as u8
                    }
                };
                [unpremultiply(px[0]), unpremultiply(px[1]), unpremultiply(px[2]), a]
            })
            .collect(),
    }
}
