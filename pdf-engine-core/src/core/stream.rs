use super::base_stream::BaseStream;
use super::error::{PDFError, PDFResult};
use std::sync::Arc;

/// In-memory stream over a shared byte buffer.
///
/// The document keeps the file bytes in one `Arc`; every parser created for an
/// object fetch gets a `Stream` that shares it, so a window onto part of the
/// file never copies data.
pub struct Stream {
    bytes: Arc<Vec<u8>>,
    pos: usize,
    start: usize,
    length: usize,
}

impl Stream {
    /// Creates a stream over `bytes[start..start + length]`.
    ///
    /// A `length` of zero means "to the end of the buffer".
    pub fn new(bytes: Vec<u8>, start: usize, length: usize) -> Self {
        Self::from_arc(Arc::new(bytes), start, length)
    }

    /// Creates a stream that shares an existing buffer.
    pub fn from_arc(bytes: Arc<Vec<u8>>, start: usize, length: usize) -> Self {
        let start = start.min(bytes.len());
        let available = bytes.len() - start;
        let length = if length == 0 { available } else { length.min(available) };

        Stream {
            bytes,
            pos: start,
            start,
            length,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(bytes, 0, 0)
    }

    /// Borrows `begin..end` of the underlying buffer.
    pub fn slice(&self, begin: usize, end: usize) -> PDFResult<&[u8]> {
        if begin > end || end > self.start + self.length {
            return Err(PDFError::InvalidByteRange { begin, end });
        }
        Ok(&self.bytes[begin..end])
    }
}

impl BaseStream for Stream {
    fn length(&self) -> usize {
        self.length
    }

    fn is_empty(&self) -> bool {
        self.length == 0
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn set_pos(&mut self, pos: usize) -> PDFResult<()> {
        if pos < self.start || pos > self.start + self.length {
            return Err(PDFError::InvalidPosition {
                pos,
                length: self.length,
            });
        }
        self.pos = pos;
        Ok(())
    }

    fn get_byte(&mut self) -> PDFResult<u8> {
        if self.pos >= self.start + self.length {
            return Err(PDFError::UnexpectedEndOfStream);
        }
        let byte = self.bytes[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    fn get_byte_range(&self, begin: usize, end: usize) -> PDFResult<Vec<u8>> {
        self.slice(begin, end).map(|s| s.to_vec())
    }

    fn start(&self) -> usize {
        self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_creation() {
        let stream = Stream::from_bytes(vec![1, 2, 3, 4, 5]);

        assert_eq!(stream.length(), 5);
        assert_eq!(stream.pos(), 0);
        assert!(!stream.is_empty());
    }

    #[test]
    fn test_read_and_peek() {
        let mut stream = Stream::from_bytes(vec![10, 20, 30]);

        assert_eq!(stream.peek_byte().unwrap(), 10);
        assert_eq!(stream.pos(), 0);
        assert_eq!(stream.get_byte().unwrap(), 10);
        assert_eq!(stream.get_byte().unwrap(), 20);
        assert_eq!(stream.get_byte().unwrap(), 30);
        assert!(matches!(
            stream.get_byte(),
            Err(PDFError::UnexpectedEndOfStream)
        ));
    }

    #[test]
    fn test_window_keeps_absolute_offsets() {
        let shared = Arc::new(b"0123456789".to_vec());
        let mut window = Stream::from_arc(Arc::clone(&shared), 4, 3);

        assert_eq!(window.pos(), 4);
        assert_eq!(window.end(), 7);
        assert_eq!(window.get_byte().unwrap(), b'4');
        assert_eq!(window.get_byte_range(4, 7).unwrap(), b"456".to_vec());
        assert!(window.set_pos(2).is_err());
        assert!(window.set_pos(8).is_err());
    }

    #[test]
    fn test_slice_bounds() {
        let stream = Stream::new(b"abcdef".to_vec(), 1, 3);
        assert_eq!(stream.slice(1, 4).unwrap(), b"bcd");
        assert!(stream.slice(1, 5).is_err());
        assert!(stream.get_byte_range(3, 2).is_err());
    }
}
