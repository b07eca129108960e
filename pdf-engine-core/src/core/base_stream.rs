use super::error::PDFResult;

/// Byte source the lexer reads from.
///
/// The engine only reads fully materialized buffers, so the trait keeps the
/// random-access subset the tokenizer and the stream parser need. Positions are
/// absolute offsets into the underlying buffer.
pub trait BaseStream {
    /// Returns the total length of the stream in bytes.
    fn length(&self) -> usize;

    /// Returns true if the stream contains no data.
    fn is_empty(&self) -> bool;

    /// Returns the current position in the stream.
    fn pos(&self) -> usize;

    /// Sets the current position in the stream.
    fn set_pos(&mut self, pos: usize) -> PDFResult<()>;

    /// Reads a single byte, advancing the position.
    fn get_byte(&mut self) -> PDFResult<u8>;

    /// Returns `begin..end` without moving the position.
    fn get_byte_range(&self, begin: usize, end: usize) -> PDFResult<Vec<u8>>;

    /// Returns the first readable offset.
    fn start(&self) -> usize;

    /// Offset one past the last readable byte.
    fn end(&self) -> usize {
        self.start() + self.length()
    }

    /// Reads a single byte without advancing the position.
    fn peek_byte(&mut self) -> PDFResult<u8> {
        let current_pos = self.pos();
        let byte = self.get_byte()?;
        self.set_pos(current_pos)?;
        Ok(byte)
    }
}
