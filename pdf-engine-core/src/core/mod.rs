pub mod base_stream;
pub mod cmap;
pub mod color_space;
pub mod config;
pub mod content_stream;
pub mod decode;
pub mod document;
pub mod encoding;
pub mod error;
pub mod font;
pub mod image;
pub mod lexer;
pub mod metadata;
pub mod object_store;
pub mod outline;
pub mod page;
pub mod parser;
pub mod recovery;
pub mod stream;
pub mod xref;

pub use base_stream::BaseStream;
pub use cmap::ToUnicodeMap;
pub use color_space::ColorSpace;
pub use config::{OpenOptions, RenderOptions};
pub use content_stream::{ContentStream, OpCode, Operation};
pub use document::{PDFDocument, ResourceCache};
pub use error::{PDFError, PDFResult};
pub use font::{Font, FontKind};
pub use image::{DecodedImage, ImagePixels};
pub use lexer::{Lexer, Token};
pub use metadata::DocumentInfo;
pub use object_store::{ObjectStore, Resolved};
pub use outline::{Bookmark, DestinationKind};
pub use page::{Page, Rect};
pub use parser::{PDFDict, PDFObject, Parser, Ref};
pub use stream::Stream;
pub use xref::{XRefEntry, XRefTable};
