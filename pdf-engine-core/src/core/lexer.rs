//! Tokenizer for PDF syntax.
//!
//! Turns a byte stream into numbers, strings, names, delimiters and bare
//! keywords. The parser builds objects on top of these tokens and the content
//! stream reader uses the same lexer for operators.
//!
//! Error recovery follows what mainstream viewers accept: stray signs and
//! line breaks inside numbers are ignored, unterminated strings end at EOF and
//! odd-length hex strings are padded with a zero nibble.

use super::base_stream::BaseStream;
use super::error::{PDFError, PDFResult};

/// Longest keyword the lexer accepts before giving up on a token.
const MAX_COMMAND_LENGTH: usize = 128;

/// Token produced by [`Lexer::get_object`].
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    EOF,
    Boolean(bool),
    Null,
    /// Integers and reals share one representation.
    Number(f64),
    /// Literal string `( ... )` with escapes resolved.
    String(Vec<u8>),
    /// Hexadecimal string `< ... >`.
    HexString(Vec<u8>),
    /// Name without the leading slash, `#xx` escapes resolved.
    Name(String),
    /// Bare keyword: an operator, `obj`, `R`, `stream`, ...
    Command(String),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
}

pub struct Lexer {
    stream: Box<dyn BaseStream>,
    /// Byte under the cursor, `None` at end of data.
    current: Option<u8>,
    buf: Vec<u8>,
}

/// PDF whitespace: NUL, TAB, LF, FF, CR, SPACE.
pub(crate) fn is_whitespace(ch: u8) -> bool {
    matches!(ch, 0x00 | 0x09 | 0x0A | 0x0C | 0x0D | 0x20)
}

pub(crate) fn is_delimiter(ch: u8) -> bool {
    matches!(
        ch,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_special(ch: u8) -> bool {
    is_whitespace(ch) || is_delimiter(ch)
}

fn hex_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}

impl Lexer {
    pub fn new(mut stream: Box<dyn BaseStream>) -> PDFResult<Self> {
        let current = Self::read_byte(&mut stream)?;
        Ok(Lexer {
            stream,
            current,
            buf: Vec::new(),
        })
    }

    fn read_byte(stream: &mut Box<dyn BaseStream>) -> PDFResult<Option<u8>> {
        match stream.get_byte() {
            Ok(byte) => Ok(Some(byte)),
            Err(PDFError::UnexpectedEndOfStream) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn advance(&mut self) -> PDFResult<Option<u8>> {
        self.current = Self::read_byte(&mut self.stream)?;
        Ok(self.current)
    }

    fn peek(&mut self) -> PDFResult<Option<u8>> {
        match self.stream.peek_byte() {
            Ok(byte) => Ok(Some(byte)),
            Err(PDFError::UnexpectedEndOfStream) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Absolute offset of the byte under the cursor.
    pub fn position(&self) -> usize {
        match self.current {
            Some(_) => self.stream.pos() - 1,
            None => self.stream.pos(),
        }
    }

    /// Moves the cursor to an absolute offset.
    pub fn seek(&mut self, pos: usize) -> PDFResult<()> {
        let pos = pos.clamp(self.stream.start(), self.stream.end());
        self.stream.set_pos(pos)?;
        self.advance()?;
        Ok(())
    }

    /// Offset one past the last readable byte.
    pub fn end(&self) -> usize {
        self.stream.end()
    }

    /// Byte under the cursor without consuming it.
    pub fn current_byte(&self) -> Option<u8> {
        self.current
    }

    /// Consumes the byte under the cursor.
    pub fn next_byte(&mut self) -> PDFResult<Option<u8>> {
        let byte = self.current;
        if byte.is_some() {
            self.advance()?;
        }
        Ok(byte)
    }

    /// Copies raw bytes `begin..end` from the underlying stream.
    pub fn raw_bytes(&self, begin: usize, end: usize) -> PDFResult<Vec<u8>> {
        if begin == end {
            return Ok(Vec::new());
        }
        self.stream.get_byte_range(begin, end)
    }

    /// Finds `needle` at or after `from`, scanning at most `limit` bytes.
    pub fn find(&self, needle: &[u8], from: usize, limit: Option<usize>) -> Option<usize> {
        let end = match limit {
            Some(limit) => (from + limit).min(self.end()),
            None => self.end(),
        };
        if from >= end || end - from < needle.len() {
            return None;
        }
        let hay = self.stream.get_byte_range(from, end).ok()?;
        hay.windows(needle.len())
            .position(|w| w == needle)
            .map(|p| from + p)
    }

    fn skip_whitespace_and_comments(&mut self) -> PDFResult<()> {
        let mut in_comment = false;
        while let Some(ch) = self.current {
            if in_comment {
                if ch == b'\n' || ch == b'\r' {
                    in_comment = false;
                }
            } else if ch == b'%' {
                in_comment = true;
            } else if !is_whitespace(ch) {
                break;
            }
            self.advance()?;
        }
        Ok(())
    }

    /// Reads the next token.
    ///
    /// Errors consume at least one byte, so a caller that logs and retries
    /// always makes progress.
    pub fn get_object(&mut self) -> PDFResult<Token> {
        self.skip_whitespace_and_comments()?;

        let Some(ch) = self.current else {
            return Ok(Token::EOF);
        };

        match ch {
            b'0'..=b'9' | b'+' | b'-' | b'.' => self.get_number(),
            b'(' => self.get_string(),
            b'/' => self.get_name(),
            b'[' => {
                self.advance()?;
                Ok(Token::ArrayStart)
            }
            b']' => {
                self.advance()?;
                Ok(Token::ArrayEnd)
            }
            b'<' => {
                if self.advance()? == Some(b'<') {
                    self.advance()?;
                    Ok(Token::DictStart)
                } else {
                    self.get_hex_string()
                }
            }
            b'>' => {
                let next = self.advance()?;
                if next == Some(b'>') {
                    self.advance()?;
                    Ok(Token::DictEnd)
                } else {
                    Err(PDFError::Generic(format!(
                        "unexpected '>' followed by {:?}",
                        next.map(char::from)
                    )))
                }
            }
            // PostScript calculator braces only appear in function streams.
            b'{' | b'}' => {
                self.advance()?;
                Ok(Token::Command(char::from(ch).to_string()))
            }
            b')' => {
                self.advance()?;
                Err(PDFError::Generic("illegal character ')'".to_string()))
            }
            _ => self.get_command(),
        }
    }

    fn get_number(&mut self) -> PDFResult<Token> {
        let mut ch = self.current;
        let mut negative = false;

        match ch {
            Some(b'-') => {
                negative = true;
                ch = self.advance()?;
                // A doubled minus is treated as one.
                if ch == Some(b'-') {
                    ch = self.advance()?;
                }
            }
            Some(b'+') => ch = self.advance()?,
            _ => {}
        }

        while matches!(ch, Some(b'\n') | Some(b'\r')) {
            ch = self.advance()?;
        }

        let mut fraction_digits: Option<i32> = None;
        if ch == Some(b'.') {
            fraction_digits = Some(0);
            ch = self.advance()?;
        }

        let first = match ch {
            Some(d @ b'0'..=b'9') => d,
            Some(c) if is_whitespace(c) || c == b'(' || c == b'<' => {
                return Ok(Token::Number(0.0));
            }
            None => return Ok(Token::Number(0.0)),
            Some(c) => {
                return Err(PDFError::Generic(format!(
                    "invalid number character '{}'",
                    char::from(c)
                )));
            }
        };

        let mut mantissa = f64::from(first - b'0');
        if let Some(n) = fraction_digits.as_mut() {
            *n += 1;
        }
        let mut exponent: Option<i32> = None;
        let mut exponent_sign = 1;

        loop {
            ch = self.advance()?;
            match ch {
                Some(d @ b'0'..=b'9') => {
                    let digit = d - b'0';
                    if let Some(exp) = exponent.as_mut() {
                        *exp = exp.saturating_mul(10).saturating_add(i32::from(digit));
                    } else {
                        mantissa = mantissa * 10.0 + f64::from(digit);
                        if let Some(n) = fraction_digits.as_mut() {
                            *n += 1;
                        }
                    }
                }
                Some(b'.') if exponent.is_none() => {
                    if fraction_digits.is_some() {
                        break;
                    }
                    fraction_digits = Some(0);
                }
                // Minus signs inside a number are ignored.
                Some(b'-') if exponent.is_none() => {}
                Some(b'e') | Some(b'E') if exponent.is_none() => match self.peek()? {
                    Some(sign @ (b'+' | b'-')) => {
                        exponent_sign = if sign == b'-' { -1 } else { 1 };
                        self.advance()?;
                        exponent = Some(0);
                    }
                    Some(b'0'..=b'9') => exponent = Some(0),
                    // The 'e' starts the next keyword.
                    _ => break,
                },
                _ => break,
            }
        }

        let mut value = mantissa;
        if let Some(n) = fraction_digits {
            value /= 10f64.powi(n);
        }
        if let Some(exp) = exponent {
            value *= 10f64.powi(exponent_sign * exp);
        }
        if negative {
            value = -value;
        }
        Ok(Token::Number(value))
    }

    fn get_string(&mut self) -> PDFResult<Token> {
        self.buf.clear();
        let mut depth = 1usize;
        let mut ch = self.advance()?;

        loop {
            let Some(c) = ch else { break };
            let mut lookahead_pending = false;

            match c {
                b'(' => {
                    depth += 1;
                    self.buf.push(c);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance()?;
                        break;
                    }
                    self.buf.push(c);
                }
                b'\\' => {
                    ch = self.advance()?;
                    let Some(esc) = ch else { break };
                    match esc {
                        b'n' => self.buf.push(b'\n'),
                        b'r' => self.buf.push(b'\r'),
                        b't' => self.buf.push(b'\t'),
                        b'b' => self.buf.push(0x08),
                        b'f' => self.buf.push(0x0C),
                        b'0'..=b'7' => {
                            let mut value = u32::from(esc - b'0');
                            ch = self.advance()?;
                            lookahead_pending = true;
                            if let Some(d @ b'0'..=b'7') = ch {
                                value = (value << 3) + u32::from(d - b'0');
                                ch = self.advance()?;
                                if let Some(d @ b'0'..=b'7') = ch {
                                    value = (value << 3) + u32::from(d - b'0');
                                    lookahead_pending = false;
                                }
                            }
                            self.buf.push((value & 0xFF) as u8);
                        }
                        // Escaped line break is a continuation.
                        b'\r' => {
                            if self.peek()? == Some(b'\n') {
                                self.advance()?;
                            }
                        }
                        b'\n' => {}
                        other => self.buf.push(other),
                    }
                }
                _ => self.buf.push(c),
            }

            if !lookahead_pending {
                ch = self.advance()?;
            }
        }

        Ok(Token::String(std::mem::take(&mut self.buf)))
    }

    fn get_hex_string(&mut self) -> PDFResult<Token> {
        self.buf.clear();
        let mut high: Option<u8> = None;

        while let Some(ch) = self.current {
            if ch == b'>' {
                self.advance()?;
                break;
            }
            if let Some(v) = hex_value(ch) {
                match high.take() {
                    Some(h) => self.buf.push((h << 4) | v),
                    None => high = Some(v),
                }
            }
            self.advance()?;
        }

        if let Some(h) = high {
            self.buf.push(h << 4);
        }
        Ok(Token::HexString(std::mem::take(&mut self.buf)))
    }

    fn get_name(&mut self) -> PDFResult<Token> {
        self.buf.clear();
        let mut ch = self.advance()?;

        while let Some(c) = ch {
            if is_special(c) {
                break;
            }
            if c == b'#' {
                let first = self.advance()?;
                match first.and_then(hex_value) {
                    Some(h) => {
                        let second = self.advance()?;
                        match second.and_then(hex_value) {
                            Some(l) => self.buf.push((h << 4) | l),
                            None => {
                                // Not an escape after all, keep the text.
                                self.buf.push(b'#');
                                self.buf.extend(first);
                                ch = second;
                                continue;
                            }
                        }
                    }
                    None => {
                        self.buf.push(b'#');
                        ch = first;
                        continue;
                    }
                }
            } else {
                self.buf.push(c);
            }
            ch = self.advance()?;
        }

        Ok(Token::Name(String::from_utf8_lossy(&self.buf).into_owned()))
    }

    fn get_command(&mut self) -> PDFResult<Token> {
        let mut word = String::new();
        while let Some(c) = self.current {
            if is_special(c) {
                break;
            }
            if word.len() >= MAX_COMMAND_LENGTH {
                return Err(PDFError::Generic(format!(
                    "keyword longer than {} bytes",
                    MAX_COMMAND_LENGTH
                )));
            }
            word.push(char::from(c));
            self.advance()?;
        }

        Ok(match word.as_str() {
            "true" => Token::Boolean(true),
            "false" => Token::Boolean(false),
            "null" => Token::Null,
            _ => Token::Command(word),
        })
    }
}
