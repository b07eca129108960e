use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use pdf_engine_core::PixelFormat;

/// Inspect and render PDF documents.
#[derive(Debug, Parser)]
#[command(name = "pdf-engine", about, version)]
pub struct Cli {
    /// Log engine diagnostics to stderr (RUST_LOG overrides the level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show page count, page sizes and document metadata
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print the bookmark tree
    Outline {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// List the draw commands and warnings of one page
    Ops {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Page number, starting at 1
        #[arg(long, default_value_t = 1)]
        page: usize,
    },

    /// Render one page to a PNG file
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Page number, starting at 1
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Bitmap width in pixels
        #[arg(long, default_value_t = 612)]
        width: u32,

        /// Bitmap height in pixels
        #[arg(long, default_value_t = 792)]
        height: u32,

        /// Pixel format of the intermediate bitmap
        #[arg(long, value_enum, default_value_t = FormatArg::Argb8888)]
        format: FormatArg,

        /// Disable anti-aliasing
        #[arg(long)]
        no_aa: bool,

        /// Where to write the PNG
        #[arg(short, long, value_name = "PNG")]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Rgb565,
    Argb8888,
}

impl From<FormatArg> for PixelFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Rgb565 => PixelFormat::Rgb565,
            FormatArg::Argb8888 => PixelFormat::Argb8888,
        }
    }
}
