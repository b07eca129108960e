//! Document information dictionary and PDF text strings.

use super::object_store::ObjectStore;
use super::parser::PDFObject;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};

/// The eight standard `/Info` entries. Absent or unreadable entries are
/// `None`; nothing is synthesised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    /// Raw `D:` date string.
    pub creation_date: Option<String>,
    /// Raw `D:` date string.
    pub mod_date: Option<String>,
}

impl DocumentInfo {
    pub(crate) fn load(store: &ObjectStore) -> Self {
        let Some(info) = store.get_lenient(store.trailer(), "Info") else {
            return DocumentInfo::default();
        };
        let Some(dict) = info.as_dict() else {
            tracing::debug!("/Info is a {}", info.type_name());
            return DocumentInfo::default();
        };
        let text = |key: &str| {
            store
                .get_lenient(dict, key)
                .and_then(|v| v.as_bytes().map(decode_text_string))
        };
        DocumentInfo {
            title: text("Title"),
            author: text("Author"),
            subject: text("Subject"),
            keywords: text("Keywords"),
            creator: text("Creator"),
            producer: text("Producer"),
            creation_date: text("CreationDate"),
            mod_date: text("ModDate"),
        }
    }

    pub fn creation_date_parsed(&self) -> Option<DateTime<FixedOffset>> {
        self.creation_date.as_deref().and_then(parse_pdf_date)
    }

    pub fn mod_date_parsed(&self) -> Option<DateTime<FixedOffset>> {
        self.mod_date.as_deref().and_then(parse_pdf_date)
    }

    /// Field names paired with their values, in a fixed order.
    pub fn fields(&self) -> [(&'static str, Option<&str>); 8] {
        [
            ("Title", self.title.as_deref()),
            ("Author", self.author.as_deref()),
            ("Subject", self.subject.as_deref()),
            ("Keywords", self.keywords.as_deref()),
            ("Creator", self.creator.as_deref()),
            ("Producer", self.producer.as_deref()),
            ("CreationDate", self.creation_date.as_deref()),
            ("ModDate", self.mod_date.as_deref()),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|(_, v)| v.is_none())
    }
}

/// PDFDocEncoding code points that differ from Latin-1.
fn pdf_doc_char(byte: u8) -> Option<char> {
    const LOW: [char; 8] = ['˘', 'ˇ', 'ˆ', '˙', '˝', '˛', '˚', '˜'];
    const HIGH: [char; 31] = [
        '•', '†', '‡', '…', '—', '–', 'ƒ', '⁄', '‹', '›', '−', '‰', '„', '“', '”', '‘', //
        '’', '‚', '™', 'ﬁ', 'ﬂ', 'Ł', 'Œ', 'Š', 'Ÿ', 'Ž', 'ı', 'ł', 'œ', 'š', 'ž',
    ];
    match byte {
        0x18..=0x1F => Some(LOW[(byte - 0x18) as usize]),
        0x80..=0x9E => Some(HIGH[(byte - 0x80) as usize]),
        0xA0 => Some('€'),
        0x9F | 0xAD => None,
        _ => Some(byte as char),
    }
}

/// Decodes a text string: UTF-16BE/LE or UTF-8 with a byte order mark,
/// otherwise PDFDocEncoding. Trailing NULs are dropped.
pub fn decode_text_string(bytes: &[u8]) -> String {
    let text = if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|p| u16::from_be_bytes([p[0], p[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|p| u16::from_le_bytes([p[0], p[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        String::from_utf8_lossy(rest).into_owned()
    } else {
        bytes.iter().filter_map(|&b| pdf_doc_char(b)).collect()
    };
    text.trim_end_matches('\0').to_string()
}

/// Text of a string object, if it is one.
pub fn text_of(obj: &PDFObject) -> Option<String> {
    obj.as_bytes().map(decode_text_string)
}

/// Parses `D:YYYYMMDDHHmmSSOHH'mm'`. Everything after the year is optional;
/// a missing offset means UTC.
pub fn parse_pdf_date(input: &str) -> Option<DateTime<FixedOffset>> {
    let s = input.trim();
    let s = s.strip_prefix("D:").unwrap_or(s);
    let bytes = s.as_bytes();

    let mut pos = 0;
    let mut field = |len: usize, default: u32| -> Option<u32> {
        let digits = bytes.get(pos..pos + len);
        match digits {
            Some(d) if d.iter().all(u8::is_ascii_digit) => {
                pos += len;
                std::str::from_utf8(d).ok()?.parse().ok()
            }
            _ => Some(default),
        }
    };

    let year_digits = bytes.iter().take(4).filter(|b| b.is_ascii_digit()).count();
    if year_digits < 4 {
        return None;
    }
    let year = field(4, 0)? as i32;
    let month = field(2, 1)?;
    let day = field(2, 1)?;
    let hour = field(2, 0)?;
    let minute = field(2, 0)?;
    let second = field(2, 0)?;

    let offset_seconds = match bytes.get(pos) {
        Some(sign @ (b'+' | b'-')) => {
            let rest = &s[pos + 1..];
            let digits: String = rest.chars().filter(char::is_ascii_digit).take(4).collect();
            let hours: i32 = digits.get(0..2).and_then(|h| h.parse().ok()).unwrap_or(0);
            let minutes: i32 = digits.get(2..4).and_then(|m| m.parse().ok()).unwrap_or(0);
            let total = hours * 3600 + minutes * 60;
            if *sign == b'-' { -total } else { total }
        }
        _ => 0,
    };

    let naive =
        NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second.min(59))?;
    let offset = FixedOffset::east_opt(offset_seconds)?;
    offset.from_local_datetime(&naive).single()
}
