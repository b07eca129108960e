use super::error::{PDFError, PDFResult};
use super::lexer::{Lexer, Token, is_delimiter, is_whitespace};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;

/// Arrays and dictionaries nested deeper than this are rejected.
const MAX_NESTING: usize = 100;

/// Consecutive lexer errors tolerated while filling the lookahead.
const MAX_LEXER_ERRORS: usize = 64;

/// Bytes after a declared stream end searched for the `endstream` keyword.
const ENDSTREAM_SLACK: usize = 48;

/// Indirect object reference, written `N G R` in a file.
///
/// # Example
/// ```
/// use pdf_engine_core::core::parser::Ref;
///
/// let page = Ref::new(5, 0);
/// assert_eq!(page.to_string(), "5 0 R");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ref {
    pub num: u32,
    pub generation: u32,
}

impl Ref {
    #[inline]
    pub const fn new(num: u32, generation: u32) -> Self {
        Self { num, generation }
    }

    /// Object id as a tuple.
    #[inline]
    pub const fn as_id(self) -> (u32, u32) {
        (self.num, self.generation)
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.num, self.generation)
    }
}

/// Dictionary payload shared by dictionaries and stream headers.
pub type PDFDict = HashMap<String, PDFObject>;

/// A PDF value.
///
/// References are plain lookup keys into the object store. Nothing in this
/// type points at another indirect object, so a cyclic document cannot build
/// a cyclic value.
#[derive(Debug, Clone, PartialEq)]
pub enum PDFObject {
    Null,
    Boolean(bool),
    Number(f64),
    /// Literal string `(...)`
    String(Vec<u8>),
    /// Hex string `<...>`
    HexString(Vec<u8>),
    Name(String),
    /// Most arrays (boxes, matrices, colors) have at most four entries,
    /// so they stay inline.
    Array(SmallVec<[Box<PDFObject>; 4]>),
    Dictionary(PDFDict),
    /// Stream header plus the raw, still encoded, payload.
    Stream { dict: PDFDict, data: Vec<u8> },
    Ref(Ref),
    EOF,
    /// Bare keyword. Only meaningful inside content streams.
    Command(String),
}

impl PDFObject {
    pub fn is_eof(&self) -> bool {
        matches!(self, PDFObject::EOF)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PDFObject::Null)
    }

    #[inline]
    pub fn is_command(&self, cmd: &str) -> bool {
        matches!(self, PDFObject::Command(c) if c == cmd)
    }

    pub fn is_name(&self, name: &str) -> bool {
        matches!(self, PDFObject::Name(n) if n == name)
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            PDFObject::Name(name) => Some(name),
            _ => None,
        }
    }

    /// Bytes of a literal or hex string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PDFObject::String(data) | PDFObject::HexString(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            PDFObject::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PDFObject::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Number truncated to an integer.
    pub fn as_int(&self) -> Option<i64> {
        self.as_number()
            .filter(|n| n.is_finite())
            .map(|n| n.trunc() as i64)
    }

    /// Non-negative integer suitable for an index or a length.
    pub fn as_usize(&self) -> Option<usize> {
        self.as_int().filter(|n| *n >= 0).map(|n| n as usize)
    }

    /// Dictionary of a dictionary or of a stream header.
    pub fn as_dict(&self) -> Option<&PDFDict> {
        match self {
            PDFObject::Dictionary(dict) | PDFObject::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Box<PDFObject>]> {
        match self {
            PDFObject::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<Ref> {
        match self {
            PDFObject::Ref(r) => Some(*r),
            _ => None,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, PDFObject::Stream { .. })
    }

    /// Looks up `key` in a dictionary or stream header.
    pub fn get(&self, key: &str) -> Option<&PDFObject> {
        self.as_dict().and_then(|d| d.get(key))
    }

    /// Array of numbers, or `None` if any entry is not a number.
    pub fn as_number_array(&self) -> Option<Vec<f64>> {
        self.as_array()?.iter().map(|o| o.as_number()).collect()
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PDFObject::Null => "null",
            PDFObject::Boolean(_) => "boolean",
            PDFObject::Number(_) => "number",
            PDFObject::String(_) | PDFObject::HexString(_) => "string",
            PDFObject::Name(_) => "name",
            PDFObject::Array(_) => "array",
            PDFObject::Dictionary(_) => "dictionary",
            PDFObject::Stream { .. } => "stream",
            PDFObject::Ref(_) => "reference",
            PDFObject::EOF => "eof",
            PDFObject::Command(_) => "command",
        }
    }
}

/// Resolves an indirect `/Length` while a stream is being parsed.
pub type LengthResolver = Box<dyn Fn(Ref) -> Option<usize>>;

/// Builds objects from lexer tokens.
///
/// Two tokens of lookahead let the parser recognise `N G R` references and a
/// dictionary followed by the `stream` keyword.
///
/// Based on PDF.js src/core/parser.js
pub struct Parser {
    lexer: Lexer,
    buf1: Option<Token>,
    buf2: Option<Token>,
    /// Offset where lexing of `buf2` started (before its leading whitespace).
    buf2_start: usize,
    length_resolver: Option<LengthResolver>,
    depth: usize,
}

impl Parser {
    pub fn new(lexer: Lexer) -> PDFResult<Self> {
        let mut parser = Parser {
            lexer,
            buf1: None,
            buf2: None,
            buf2_start: 0,
            length_resolver: None,
            depth: 0,
        };
        parser.refill()?;
        Ok(parser)
    }

    /// Installs the callback used when a stream's `/Length` is indirect.
    pub fn set_length_resolver<F>(&mut self, resolver: F)
    where
        F: Fn(Ref) -> Option<usize> + 'static,
    {
        self.length_resolver = Some(Box::new(resolver));
    }

    /// Reads a token, skipping over bytes the lexer rejects.
    fn next_token(&mut self) -> PDFResult<Token> {
        let mut failures = 0;
        loop {
            match self.lexer.get_object() {
                Ok(token) => return Ok(token),
                Err(e) if failures < MAX_LEXER_ERRORS => {
                    tracing::trace!("skipping bad token at {}: {}", self.lexer.position(), e);
                    failures += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn refill(&mut self) -> PDFResult<()> {
        self.buf1 = Some(self.next_token()?);
        self.buf2_start = self.lexer.position();
        self.buf2 = Some(self.next_token()?);
        Ok(())
    }

    fn shift(&mut self) -> PDFResult<()> {
        self.buf1 = self.buf2.take();
        self.buf2_start = self.lexer.position();
        self.buf2 = Some(self.next_token()?);
        Ok(())
    }

    /// Returns true while the next token is not EOF.
    #[inline]
    pub fn has_more(&self) -> bool {
        !matches!(&self.buf1, Some(Token::EOF) | None)
    }

    /// Returns the next token if it is a keyword.
    pub fn peek_command(&self) -> Option<&str> {
        match &self.buf1 {
            Some(Token::Command(cmd)) => Some(cmd),
            _ => None,
        }
    }

    /// Absolute offset of the lexer cursor.
    pub fn position(&self) -> usize {
        self.lexer.position()
    }

    /// Reads the next object.
    ///
    /// Based on PDF.js Parser.getObj()
    pub fn get_object(&mut self) -> PDFResult<PDFObject> {
        let token = self
            .buf1
            .take()
            .ok_or_else(|| PDFError::Generic("parser lookahead is empty".to_string()))?;
        self.shift()?;

        match token {
            Token::ArrayStart => self.nested(Self::parse_array),
            Token::DictStart => self.nested(Self::parse_dictionary),
            Token::ArrayEnd => Err(PDFError::Generic("unexpected ']'".to_string())),
            Token::DictEnd => Err(PDFError::Generic("unexpected '>>'".to_string())),
            Token::Number(n) => {
                if let (Some(Token::Number(generation)), Some(Token::Command(cmd))) =
                    (&self.buf1, &self.buf2)
                {
                    if cmd == "R" && n >= 0.0 && *generation >= 0.0 {
                        let reference = Ref::new(n as u32, *generation as u32);
                        self.shift()?;
                        self.shift()?;
                        return Ok(PDFObject::Ref(reference));
                    }
                }
                Ok(PDFObject::Number(n))
            }
            Token::EOF => Ok(PDFObject::EOF),
            Token::Boolean(b) => Ok(PDFObject::Boolean(b)),
            Token::Null => Ok(PDFObject::Null),
            Token::String(s) => Ok(PDFObject::String(s)),
            Token::HexString(s) => Ok(PDFObject::HexString(s)),
            Token::Name(n) => Ok(PDFObject::Name(n)),
            Token::Command(c) => Ok(PDFObject::Command(c)),
        }
    }

    fn nested(&mut self, parse: fn(&mut Self) -> PDFResult<PDFObject>) -> PDFResult<PDFObject> {
        if self.depth >= MAX_NESTING {
            return Err(PDFError::Generic(format!(
                "objects nested deeper than {}",
                MAX_NESTING
            )));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_array(&mut self) -> PDFResult<PDFObject> {
        let mut array = SmallVec::<[Box<PDFObject>; 4]>::new();

        loop {
            match &self.buf1 {
                Some(Token::ArrayEnd) => {
                    self.shift()?;
                    break;
                }
                Some(Token::EOF) | None => {
                    return Err(PDFError::Generic("unterminated array".to_string()));
                }
                _ => {}
            }

            match self.get_object() {
                Ok(obj) => array.push(Box::new(obj)),
                Err(e) => {
                    tracing::trace!("dropping malformed array element: {}", e);
                }
            }
        }

        Ok(PDFObject::Array(array))
    }

    fn parse_dictionary(&mut self) -> PDFResult<PDFObject> {
        let mut dict = PDFDict::new();

        loop {
            let key = match &self.buf1 {
                Some(Token::DictEnd) => break,
                Some(Token::EOF) | None => {
                    return Err(PDFError::Generic("unterminated dictionary".to_string()));
                }
                Some(Token::Command(cmd)) if cmd == "endobj" => {
                    tracing::debug!("dictionary closed by endobj without '>>'");
                    return Ok(PDFObject::Dictionary(dict));
                }
                Some(Token::Name(name)) => name.clone(),
                Some(_) => {
                    // Keys must be names; skip whatever is in the way.
                    self.shift()?;
                    continue;
                }
            };
            self.shift()?;

            match &self.buf1 {
                Some(Token::EOF) | None => {
                    return Err(PDFError::Generic("unterminated dictionary".to_string()));
                }
                Some(Token::DictEnd) => {
                    dict.insert(key, PDFObject::Null);
                    break;
                }
                _ => {}
            }

            match self.get_object() {
                Ok(value) => {
                    dict.insert(key, value);
                }
                Err(e) => {
                    tracing::trace!("value for /{} is malformed: {}", key, e);
                    dict.insert(key, PDFObject::Null);
                }
            }
        }

        // buf1 is '>>'. A `stream` keyword in buf2 means the lexer sits right
        // after that keyword, on the end-of-line before the payload.
        if matches!(&self.buf2, Some(Token::Command(cmd)) if cmd == "stream") {
            self.buf1 = None;
            self.buf2 = None;
            return self.parse_stream(dict);
        }

        self.shift()?;
        Ok(PDFObject::Dictionary(dict))
    }

    fn declared_length(&self, dict: &PDFDict) -> Option<usize> {
        match dict.get("Length") {
            Some(PDFObject::Ref(r)) => match &self.length_resolver {
                Some(resolve) => resolve(*r),
                None => None,
            },
            Some(obj) => obj.as_usize(),
            None => None,
        }
    }

    /// Reads a stream payload after its dictionary.
    ///
    /// Uses `/Length` when it is consistent with an `endstream` keyword
    /// nearby, otherwise scans forward for `endstream`.
    ///
    /// Based on PDF.js Parser.makeStream()
    fn parse_stream(&mut self, dict: PDFDict) -> PDFResult<PDFObject> {
        while self.lexer.current_byte() == Some(b' ') {
            self.lexer.next_byte()?;
        }
        match self.lexer.current_byte() {
            Some(b'\r') => {
                self.lexer.next_byte()?;
                if self.lexer.current_byte() == Some(b'\n') {
                    self.lexer.next_byte()?;
                }
            }
            Some(b'\n') => {
                self.lexer.next_byte()?;
            }
            _ => {}
        }

        let start = self.lexer.position();
        let file_end = self.lexer.end();

        let checked = self.declared_length(&dict).and_then(|len| {
            let end = start.checked_add(len)?;
            if end > file_end {
                return None;
            }
            self.lexer
                .find(b"endstream", end, Some(ENDSTREAM_SLACK))
                .map(|_| end)
        });

        let (end, resume) = match checked {
            Some(end) => (end, end),
            None => match self.lexer.find(b"endstream", start, None) {
                Some(marker) => (trim_eol(&self.lexer, start, marker), marker),
                None => {
                    tracing::debug!("stream without endstream, reading to endobj or EOF");
                    let end = self.lexer.find(b"endobj", start, None).unwrap_or(file_end);
                    (end, end)
                }
            },
        };

        let data = self.lexer.raw_bytes(start, end)?;

        self.lexer.seek(resume)?;
        self.refill()?;
        if self.peek_command() == Some("endstream") {
            self.shift()?;
        }

        Ok(PDFObject::Stream { dict, data })
    }

    /// Reads the payload of an inline image.
    ///
    /// Must be called when the next token is the `ID` keyword. The payload runs
    /// from one whitespace byte after `ID` up to an `EI` keyword that is
    /// surrounded by whitespace and followed by plausible content text.
    pub fn read_inline_image_data(&mut self) -> PDFResult<Vec<u8>> {
        if self.peek_command() != Some("ID") {
            return Err(PDFError::content_stream_error("inline image without ID"));
        }

        let mut start = self.buf2_start;
        if let Ok(b) = self.lexer.raw_bytes(start, start + 1) {
            if b.first().copied().is_some_and(is_whitespace) {
                start += 1;
            }
        }

        let file_end = self.lexer.end();
        let mut search = start;
        let (data_end, resume) = loop {
            let Some(pos) = self.lexer.find(b"EI", search, None) else {
                break (file_end, file_end);
            };
            if self.is_inline_image_end(pos) {
                let before = if pos > start {
                    self.lexer.raw_bytes(pos - 1, pos)?.first().copied()
                } else {
                    None
                };
                let end = if before.is_some_and(is_whitespace) { pos - 1 } else { pos };
                break (end.max(start), pos + 2);
            }
            search = pos + 1;
        };

        let data = self.lexer.raw_bytes(start, data_end)?;
        self.lexer.seek(resume)?;
        self.refill()?;
        Ok(data)
    }

    fn is_inline_image_end(&self, pos: usize) -> bool {
        let file_end = self.lexer.end();
        let before_ok = pos == 0
            || self
                .lexer
                .raw_bytes(pos - 1, pos)
                .ok()
                .and_then(|b| b.first().copied())
                .is_some_and(is_whitespace);
        if !before_ok {
            return false;
        }
        let after = pos + 2;
        if after >= file_end {
            return true;
        }
        let tail_end = (after + 16).min(file_end);
        let Ok(tail) = self.lexer.raw_bytes(after, tail_end) else {
            return false;
        };
        let first = tail[0];
        if !is_whitespace(first) && !is_delimiter(first) {
            return false;
        }
        // Binary image data rarely looks like a run of printable operators.
        tail.iter()
            .all(|&b| is_whitespace(b) || (0x20..0x7F).contains(&b))
    }
}

/// Drops the end-of-line that precedes `endstream`.
fn trim_eol(lexer: &Lexer, start: usize, marker: usize) -> usize {
    let mut end = marker;
    let tail_start = marker.saturating_sub(2).max(start);
    let Ok(tail) = lexer.raw_bytes(tail_start, marker) else {
        return end;
    };
    if tail.ends_with(b"\r\n") {
        end -= 2;
    } else if tail.ends_with(b"\n") || tail.ends_with(b"\r") {
        end -= 1;
    }
    end.max(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stream::Stream;
    use smallvec::smallvec;

    fn parser(input: &[u8]) -> Parser {
        let lexer = Lexer::new(Box::new(Stream::from_bytes(input.to_vec()))).unwrap();
        Parser::new(lexer).unwrap()
    }

    fn parse(input: &str) -> PDFResult<PDFObject> {
        parser(input.as_bytes()).get_object()
    }

    // ========================================================================
    // Simple objects
    // ========================================================================

    #[test]
    fn test_parse_scalars() {
        assert_eq!(parse("42").unwrap(), PDFObject::Number(42.0));
        assert_eq!(parse("true").unwrap(), PDFObject::Boolean(true));
        assert_eq!(parse("null").unwrap(), PDFObject::Null);
        assert_eq!(parse("(hi)").unwrap(), PDFObject::String(b"hi".to_vec()));
        assert_eq!(parse("<6869>").unwrap(), PDFObject::HexString(b"hi".to_vec()));
        assert_eq!(parse("/Type").unwrap(), PDFObject::Name("Type".to_string()));
    }

    #[test]
    fn test_parse_references() {
        assert_eq!(parse("5 0 R").unwrap(), PDFObject::Ref(Ref::new(5, 0)));
        assert_eq!(
            parse("[5 0 R 10 2 R 7]").unwrap(),
            PDFObject::Array(smallvec![
                Box::new(PDFObject::Ref(Ref::new(5, 0))),
                Box::new(PDFObject::Ref(Ref::new(10, 2))),
                Box::new(PDFObject::Number(7.0)),
            ])
        );
        // Two numbers not followed by R stay numbers.
        let mut p = parser(b"1 0 obj");
        assert_eq!(p.get_object().unwrap(), PDFObject::Number(1.0));
        assert_eq!(p.get_object().unwrap(), PDFObject::Number(0.0));
        assert!(p.get_object().unwrap().is_command("obj"));
    }

    // ========================================================================
    // Containers
    // ========================================================================

    #[test]
    fn test_parse_nested_containers() {
        let obj = parse("<< /Type /Page /Contents [5 0 R 6 0 R] /Resources << /Font 7 0 R >> >>")
            .unwrap();
        assert!(obj.get("Type").unwrap().is_name("Page"));
        assert_eq!(obj.get("Contents").unwrap().as_array().unwrap().len(), 2);
        assert_eq!(
            obj.get("Resources").unwrap().get("Font"),
            Some(&PDFObject::Ref(Ref::new(7, 0)))
        );
    }

    #[test]
    fn test_dictionary_missing_value_is_null() {
        let obj = parse("<< /A 1 /B >>").unwrap();
        assert_eq!(obj.get("B"), Some(&PDFObject::Null));
    }

    #[test]
    fn test_unterminated_containers() {
        assert!(parse("[1 2 3").is_err());
        assert!(parse("<< /Type /Font").is_err());
    }

    #[test]
    fn test_nesting_is_bounded() {
        let deep = "[".repeat(MAX_NESTING + 10);
        assert!(parse(&deep).is_err());
    }

    // ========================================================================
    // Streams
    // ========================================================================

    #[test]
    fn test_stream_with_length() {
        let mut p = parser(b"<< /Length 5 >>\nstream\r\nhello\nendstream\nendobj");
        let obj = p.get_object().unwrap();
        match obj {
            PDFObject::Stream { data, dict } => {
                assert_eq!(data, b"hello");
                assert_eq!(dict.get("Length"), Some(&PDFObject::Number(5.0)));
            }
            other => panic!("expected stream, got {:?}", other),
        }
        assert!(p.get_object().unwrap().is_command("endobj"));
    }

    #[test]
    fn test_stream_with_wrong_length_scans_for_endstream() {
        let mut p = parser(b"<< /Length 999 >>\nstream\nabc\r\nendstream\nendobj");
        match p.get_object().unwrap() {
            PDFObject::Stream { data, .. } => assert_eq!(data, b"abc"),
            other => panic!("expected stream, got {:?}", other),
        }
        assert!(p.get_object().unwrap().is_command("endobj"));
    }

    #[test]
    fn test_stream_with_indirect_length() {
        let mut p = parser(b"<< /Length 9 0 R >>\nstream\n0123456789endstream");
        p.set_length_resolver(|r| (r == Ref::new(9, 0)).then_some(4));
        match p.get_object().unwrap() {
            PDFObject::Stream { data, .. } => assert_eq!(data, b"0123"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_inline_image_data() {
        let mut p = parser(b"BI /W 2 /H 1 /BPC 8 /CS /G ID \xff\x00 EI Q");
        assert!(p.get_object().unwrap().is_command("BI"));
        let mut keys = 0;
        while p.peek_command() != Some("ID") {
            p.get_object().unwrap();
            keys += 1;
        }
        assert_eq!(keys, 8);
        assert_eq!(p.read_inline_image_data().unwrap(), vec![0xff, 0x00]);
        assert!(p.get_object().unwrap().is_command("Q"));
    }

    #[test]
    fn test_inline_image_skips_ei_inside_data() {
        let mut p = parser(b"ID \x01EI\x02 EI\x90\x91 EI\nQ");
        assert_eq!(
            p.read_inline_image_data().unwrap(),
            b"\x01EI\x02 EI\x90\x91".to_vec()
        );
        assert!(p.get_object().unwrap().is_command("Q"));
    }
}
