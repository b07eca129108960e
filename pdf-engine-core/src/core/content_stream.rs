//! Content stream parsing.
//!
//! A content stream is a sequence of operands followed by an operator. The
//! parser here turns it into [`Operation`]s and never fails: tokens it cannot
//! make sense of are dropped and reported as warnings, and parsing resumes
//! with the next token.
//!
//! Based on PDF.js src/core/evaluator.js (EvaluatorPreprocessor) and
//! src/shared/util.js (OPS constants).

use super::error::{PDFError, PDFResult};
use super::lexer::Lexer;
use super::parser::{PDFDict, PDFObject, Parser};
use super::stream::Stream;
use std::fmt;

/// Operands kept for a single operator; anything beyond is dropped.
const MAX_OPERANDS: usize = 64;

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $name:ident => $cmd:literal, )*) => {
        /// Content stream operators.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum OpCode {
            $( $(#[$doc])* $name, )*
        }

        impl OpCode {
            /// Maps an operator keyword to its opcode.
            pub fn from_command(cmd: &str) -> Option<OpCode> {
                match cmd {
                    $( $cmd => Some(OpCode::$name), )*
                    // Obsolete spelling of `f`.
                    "F" => Some(OpCode::Fill),
                    _ => None,
                }
            }

            /// Returns the operator keyword.
            pub fn to_command(self) -> &'static str {
                match self {
                    $( OpCode::$name => $cmd, )*
                }
            }
        }
    };
}

opcodes! {
    // Graphics state
    SetLineWidth => "w",
    SetLineCap => "J",
    SetLineJoin => "j",
    SetMiterLimit => "M",
    SetDash => "d",
    SetRenderingIntent => "ri",
    SetFlatness => "i",
    /// `gs`: apply an ExtGState dictionary.
    SetGState => "gs",
    Save => "q",
    Restore => "Q",
    /// `cm`: concatenate a matrix onto the CTM.
    Transform => "cm",

    // Path construction
    MoveTo => "m",
    LineTo => "l",
    CurveTo => "c",
    /// `v`: curve whose first control point is the current point.
    CurveTo2 => "v",
    /// `y`: curve whose second control point is the end point.
    CurveTo3 => "y",
    ClosePath => "h",
    Rectangle => "re",

    // Path painting
    Stroke => "S",
    CloseStroke => "s",
    Fill => "f",
    EOFill => "f*",
    FillStroke => "B",
    EOFillStroke => "B*",
    CloseFillStroke => "b",
    CloseEOFillStroke => "b*",
    EndPath => "n",

    // Clipping
    Clip => "W",
    EOClip => "W*",

    // Text
    BeginText => "BT",
    EndText => "ET",
    SetCharSpacing => "Tc",
    SetWordSpacing => "Tw",
    SetHScale => "Tz",
    SetLeading => "TL",
    SetFont => "Tf",
    SetTextRenderingMode => "Tr",
    SetTextRise => "Ts",
    MoveText => "Td",
    SetLeadingMoveText => "TD",
    SetTextMatrix => "Tm",
    NextLine => "T*",
    ShowText => "Tj",
    ShowSpacedText => "TJ",
    NextLineShowText => "'",
    NextLineSetSpacingShowText => "\"",

    // Type 3 glyph metrics
    SetCharWidth => "d0",
    SetCharWidthAndBounds => "d1",

    // Colour
    SetStrokeColorSpace => "CS",
    SetFillColorSpace => "cs",
    SetStrokeColor => "SC",
    SetStrokeColorN => "SCN",
    SetFillColor => "sc",
    SetFillColorN => "scn",
    SetStrokeGray => "G",
    SetFillGray => "g",
    SetStrokeRGBColor => "RG",
    SetFillRGBColor => "rg",
    SetStrokeCMYKColor => "K",
    SetFillCMYKColor => "k",

    ShadingFill => "sh",
    /// `BI ... ID ... EI`. The single operand is the image as a stream.
    InlineImage => "BI",
    PaintXObject => "Do",

    // Marked content
    MarkPoint => "MP",
    MarkPointProps => "DP",
    BeginMarkedContent => "BMC",
    BeginMarkedContentProps => "BDC",
    EndMarkedContent => "EMC",

    // Compatibility
    BeginCompat => "BX",
    EndCompat => "EX",
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_command())
    }
}

/// An operator and the operands read before it.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub op: OpCode,
    pub args: Vec<PDFObject>,
}

impl Operation {
    pub fn new(op: OpCode, args: Vec<PDFObject>) -> Self {
        Operation { op, args }
    }

    pub fn number(&self, index: usize) -> Option<f64> {
        self.args.get(index).and_then(PDFObject::as_number)
    }

    /// All operands as numbers, or `None` if any is not a number.
    pub fn numbers(&self) -> Option<Vec<f64>> {
        self.args.iter().map(PDFObject::as_number).collect()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.args.get(index).and_then(PDFObject::as_name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.op)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match arg {
                PDFObject::Stream { data, .. } => write!(f, "<{} bytes>", data.len())?,
                other => write!(f, "{:?}", other)?,
            }
        }
        write!(f, ")")
    }
}

/// A parsed content stream with the problems met while parsing it.
#[derive(Debug, Clone, Default)]
pub struct ContentStream {
    pub operations: Vec<Operation>,
    pub warnings: Vec<String>,
}

impl ContentStream {
    /// Parses `data`, recording rather than failing on malformed input.
    pub fn parse(data: Vec<u8>) -> ContentStream {
        let mut content = ContentStream::default();
        let mut reader = match ContentStreamReader::new(data) {
            Ok(reader) => reader,
            Err(e) => {
                content.warnings.push(e.to_string());
                return content;
            }
        };

        loop {
            match reader.read_operation() {
                Ok(Some(op)) => content.operations.push(op),
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("content stream: {}", e);
                    content.warnings.push(e.to_string());
                }
            }
        }
        content
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Reads one operation at a time from a content stream.
pub struct ContentStreamReader {
    parser: Parser,
}

impl ContentStreamReader {
    pub fn new(data: Vec<u8>) -> PDFResult<Self> {
        let lexer = Lexer::new(Box::new(Stream::from_bytes(data)))?;
        Ok(ContentStreamReader {
            parser: Parser::new(lexer)?,
        })
    }

    /// Returns the next operation, `Ok(None)` at the end of the stream.
    ///
    /// An error reports a problem that was skipped over; reading may continue.
    pub fn read_operation(&mut self) -> PDFResult<Option<Operation>> {
        let mut args = Vec::new();

        loop {
            if !self.parser.has_more() {
                if !args.is_empty() {
                    tracing::trace!("{} operands left at end of stream", args.len());
                }
                return Ok(None);
            }

            if self.parser.peek_command() == Some("BI") {
                self.parser.get_object()?;
                return self.read_inline_image().map(Some);
            }

            let obj = match self.parser.get_object() {
                Ok(obj) => obj,
                Err(e) => {
                    return Err(PDFError::content_stream_error(format!(
                        "malformed operand dropped: {}",
                        e
                    )));
                }
            };

            match obj {
                PDFObject::EOF => return Ok(None),
                PDFObject::Command(cmd) => {
                    return match OpCode::from_command(&cmd) {
                        Some(op) => Ok(Some(Operation::new(op, args))),
                        None => Err(PDFError::content_stream_error(format!(
                            "unknown operator '{}' skipped with {} operands",
                            cmd,
                            args.len()
                        ))),
                    };
                }
                operand => {
                    if args.len() < MAX_OPERANDS {
                        args.push(operand);
                    }
                }
            }
        }
    }

    /// Reads the dictionary and data of an inline image after `BI`.
    fn read_inline_image(&mut self) -> PDFResult<Operation> {
        let mut dict = PDFDict::new();

        loop {
            if !self.parser.has_more() {
                return Err(PDFError::content_stream_error(
                    "inline image without ID",
                ));
            }
            if self.parser.peek_command() == Some("ID") {
                break;
            }
            let key = self.parser.get_object()?;
            let value = self.parser.get_object()?;
            match key {
                PDFObject::Name(key) => {
                    dict.insert(expand_inline_key(&key).to_string(), expand_inline_value(value));
                }
                other => {
                    return Err(PDFError::content_stream_error(format!(
                        "inline image key is a {}",
                        other.type_name()
                    )));
                }
            }
        }

        let data = self.parser.read_inline_image_data()?;
        Ok(Operation::new(
            OpCode::InlineImage,
            vec![PDFObject::Stream { dict, data }],
        ))
    }
}

fn expand_inline_key(key: &str) -> &str {
    match key {
        "BPC" => "BitsPerComponent",
        "CS" => "ColorSpace",
        "D" => "Decode",
        "DP" => "DecodeParms",
        "F" => "Filter",
        "H" => "Height",
        "IM" => "ImageMask",
        "I" => "Interpolate",
        "W" => "Width",
        "L" => "Length",
        other => other,
    }
}

fn expand_inline_value(value: PDFObject) -> PDFObject {
    match value {
        PDFObject::Name(name) => {
            let full = match name.as_str() {
                "G" => "DeviceGray",
                "RGB" => "DeviceRGB",
                "CMYK" => "DeviceCMYK",
                "I" => "Indexed",
                _ => return PDFObject::Name(name),
            };
            PDFObject::Name(full.to_string())
        }
        other => other,
    }
}
