use std::sync::Arc;
use thiserror::Error;

/// Universal error type for the document engine.
///
/// The first group of variants is the public taxonomy callers match on.
/// The rest are raised while tokenizing or decoding and are usually absorbed
/// by the recovery paths before they reach a caller.
#[derive(Debug, Clone, Error)]
pub enum PDFError {
    /// The file has no recoverable object structure at all.
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// An indirect reference points at a missing, free or unparsable object.
    #[error("unresolved reference {num} {generation} R")]
    UnresolvedReference { num: u32, generation: u32 },

    /// Following references revisited an object or exceeded the depth bound.
    #[error("cyclic reference at {num} {generation} R")]
    CyclicReference { num: u32, generation: u32 },

    /// A stream declares a filter this engine cannot decode.
    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// `get_page` was called with an index past the end of the page list.
    #[error("page index {index} out of range (document has {count} pages)")]
    PageIndexOutOfRange { index: usize, count: usize },

    /// The raster target uses a pixel format the rasterizer does not write.
    #[error("unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),

    /// The document (or the document behind a page handle) has been closed.
    #[error("document is closed")]
    DocumentClosed,

    /// The trailer declares an /Encrypt dictionary.
    #[error("encrypted documents are not supported")]
    EncryptedDocument,

    /// End of stream reached unexpectedly
    #[error("unexpected end of stream")]
    UnexpectedEndOfStream,

    /// Invalid byte range requested
    #[error("invalid byte range: {begin}..{end}")]
    InvalidByteRange { begin: usize, end: usize },

    /// Invalid stream position
    #[error("invalid position {pos} for stream of length {length}")]
    InvalidPosition { pos: usize, length: usize },

    /// Syntax error with message
    #[error("{0}")]
    Generic(String),

    /// Malformed operator or operand inside a content stream
    #[error("content stream error: {0}")]
    ContentStream(String),

    /// A supported filter failed on its input
    #[error("decode error: {0}")]
    Decode(String),

    /// The caller's buffer does not match the declared target geometry
    #[error("invalid render target: {0}")]
    InvalidTarget(String),

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

impl PDFError {
    pub fn content_stream_error(msg: impl Into<String>) -> Self {
        PDFError::ContentStream(msg.into())
    }

    pub fn unresolved(num: u32, generation: u32) -> Self {
        PDFError::UnresolvedReference { num, generation }
    }

    /// Returns true for errors that degrade output instead of failing the caller.
    ///
    /// Parsing-layer problems are recoverable; contract violations
    /// (bad index, bad pixel format, use after close) are not.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            PDFError::MalformedContainer(_)
                | PDFError::PageIndexOutOfRange { .. }
                | PDFError::UnsupportedPixelFormat(_)
                | PDFError::DocumentClosed
                | PDFError::EncryptedDocument
                | PDFError::InvalidTarget(_)
                | PDFError::Io(_)
        )
    }
}

impl From<std::io::Error> for PDFError {
    fn from(err: std::io::Error) -> Self {
        PDFError::Io(Arc::new(err))
    }
}

/// Result type alias for PDF operations
pub type PDFResult<T> = Result<T, PDFError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_display() {
        let err = PDFError::unresolved(12, 0);
        assert_eq!(err.to_string(), "unresolved reference 12 0 R");

        let err = PDFError::PageIndexOutOfRange { index: 3, count: 2 };
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(PDFError::CyclicReference { num: 1, generation: 0 }.is_recoverable());
        assert!(PDFError::UnsupportedFilter("JBIG2Decode".into()).is_recoverable());
        assert!(!PDFError::DocumentClosed.is_recoverable());
        assert!(!PDFError::UnsupportedPixelFormat("Alpha8".into()).is_recoverable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.pdf");
        let err: PDFError = io.into();
        assert!(matches!(err, PDFError::Io(_)));
        // Clone is required by the object cache.
        let copy = err.clone();
        assert_eq!(copy.to_string(), err.to_string());
    }
}
