//! Simple-font encodings and glyph names.
//!
//! Maps single-byte character codes to Unicode for the predefined encodings
//! and translates the common Adobe glyph names used in `/Differences`.

/// A predefined base encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseEncoding {
    Standard,
    WinAnsi,
    MacRoman,
    /// The font program's own encoding (symbolic fonts).
    Builtin,
}

impl BaseEncoding {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "StandardEncoding" => Some(BaseEncoding::Standard),
            "WinAnsiEncoding" => Some(BaseEncoding::WinAnsi),
            "MacRomanEncoding" => Some(BaseEncoding::MacRoman),
            _ => None,
        }
    }

    /// Unicode for `code`, if the encoding defines it.
    pub fn to_unicode(self, code: u8) -> Option<char> {
        match self {
            BaseEncoding::Standard => standard(code),
            BaseEncoding::WinAnsi => win_ansi(code),
            BaseEncoding::MacRoman => mac_roman(code),
            BaseEncoding::Builtin => None,
        }
    }
}

fn printable_ascii(code: u8) -> Option<char> {
    (0x20..0x7F).contains(&code).then_some(code as char)
}

fn win_ansi(code: u8) -> Option<char> {
    const HIGH: [char; 32] = [
        '€', '\0', '‚', 'ƒ', '„', '…', '†', '‡', 'ˆ', '‰', 'Š', '‹', 'Œ', '\0', 'Ž', '\0',
        '\0', '‘', '’', '“', '”', '•', '–', '—', '˜', '™', 'š', '›', 'œ', '\0', 'ž', 'Ÿ',
    ];
    match code {
        0x80..=0x9F => Some(HIGH[(code - 0x80) as usize]).filter(|c| *c != '\0'),
        0xA0..=0xFF => char::from_u32(u32::from(code)),
        // WinAnsi maps otherwise unused codes to bullet.
        0x7F => Some('•'),
        _ => printable_ascii(code),
    }
}

fn mac_roman(code: u8) -> Option<char> {
    const HIGH: [char; 128] = [
        'Ä', 'Å', 'Ç', 'É', 'Ñ', 'Ö', 'Ü', 'á', 'à', 'â', 'ä', 'ã', 'å', 'ç', 'é', 'è', //
        'ê', 'ë', 'í', 'ì', 'î', 'ï', 'ñ', 'ó', 'ò', 'ô', 'ö', 'õ', 'ú', 'ù', 'û', 'ü', //
        '†', '°', '¢', '£', '§', '•', '¶', 'ß', '®', '©', '™', '´', '¨', '≠', 'Æ', 'Ø', //
        '∞', '±', '≤', '≥', '¥', 'µ', '∂', '∑', '∏', 'π', '∫', 'ª', 'º', 'Ω', 'æ', 'ø', //
        '¿', '¡', '¬', '√', 'ƒ', '≈', '∆', '«', '»', '…', '\u{a0}', 'À', 'Ã', 'Õ', 'Œ', 'œ', //
        '–', '—', '“', '”', '‘', '’', '÷', '◊', 'ÿ', 'Ÿ', '⁄', '€', '‹', '›', 'ﬁ', 'ﬂ', //
        '‡', '·', '‚', '„', '‰', 'Â', 'Ê', 'Á', 'Ë', 'È', 'Í', 'Î', 'Ï', 'Ì', 'Ó', 'Ô', //
        '\u{f8ff}', 'Ò', 'Ú', 'Û', 'Ù', 'ı', 'ˆ', '˜', '¯', '˘', '˙', '˚', '¸', '˝', '˛', 'ˇ',
    ];
    match code {
        0x80..=0xFF => Some(HIGH[(code - 0x80) as usize]),
        _ => printable_ascii(code),
    }
}

fn standard(code: u8) -> Option<char> {
    Some(match code {
        0x27 => '’',
        0x60 => '‘',
        0xA1 => '¡',
        0xA2 => '¢',
        0xA3 => '£',
        0xA4 => '⁄',
        0xA5 => '¥',
        0xA6 => 'ƒ',
        0xA7 => '§',
        0xA8 => '¤',
        0xA9 => '\'',
        0xAA => '“',
        0xAB => '«',
        0xAC => '‹',
        0xAD => '›',
        0xAE => 'ﬁ',
        0xAF => 'ﬂ',
        0xB1 => '–',
        0xB2 => '†',
        0xB3 => '‡',
        0xB4 => '·',
        0xB6 => '¶',
        0xB7 => '•',
        0xB8 => '‚',
        0xB9 => '„',
        0xBA => '”',
        0xBB => '»',
        0xBC => '…',
        0xBD => '‰',
        0xBF => '¿',
        0xC1 => '`',
        0xC2 => '´',
        0xC3 => 'ˆ',
        0xC4 => '˜',
        0xC5 => '¯',
        0xC6 => '˘',
        0xC7 => '˙',
        0xC8 => '¨',
        0xCA => '˚',
        0xCB => '¸',
        0xCD => '˝',
        0xCE => '˛',
        0xCF => 'ˇ',
        0xD0 => '—',
        0xE1 => 'Æ',
        0xE3 => 'ª',
        0xE8 => 'Ł',
        0xE9 => 'Ø',
        0xEA => 'Œ',
        0xEB => 'º',
        0xF1 => 'æ',
        0xF5 => 'ı',
        0xF8 => 'ł',
        0xF9 => 'ø',
        0xFA => 'œ',
        0xFB => 'ß',
        _ => return printable_ascii(code),
    })
}

/// Glyph names of printable ASCII, indexed from 0x20.
const ASCII_NAMES: [&str; 95] = [
    "space", "exclam", "quotedbl", "numbersign", "dollar", "percent", "ampersand",
    "quotesingle", "parenleft", "parenright", "asterisk", "plus", "comma", "hyphen", "period",
    "slash", "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
    "colon", "semicolon", "less", "equal", "greater", "question", "at", "A", "B", "C", "D",
    "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R", "S", "T", "U", "V",
    "W", "X", "Y", "Z", "bracketleft", "backslash", "bracketright", "asciicircum",
    "underscore", "grave", "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m",
    "n", "o", "p", "q", "r", "s", "t", "u", "v", "w", "x", "y", "z", "braceleft", "bar",
    "braceright", "asciitilde",
];

/// Named glyphs outside ASCII that documents commonly reference.
const EXTRA_NAMES: &[(&str, char)] = &[
    ("quoteleft", '‘'),
    ("quoteright", '’'),
    ("quotedblleft", '“'),
    ("quotedblright", '”'),
    ("quotesinglbase", '‚'),
    ("quotedblbase", '„'),
    ("bullet", '•'),
    ("endash", '–'),
    ("emdash", '—'),
    ("ellipsis", '…'),
    ("dagger", '†'),
    ("daggerdbl", '‡'),
    ("fi", 'ﬁ'),
    ("fl", 'ﬂ'),
    ("trademark", '™'),
    ("copyright", '©'),
    ("registered", '®'),
    ("degree", '°'),
    ("Euro", '€'),
    ("section", '§'),
    ("paragraph", '¶'),
    ("germandbls", 'ß'),
    ("minus", '−'),
    ("multiply", '×'),
    ("divide", '÷'),
    ("plusminus", '±'),
    ("nbspace", '\u{a0}'),
    ("periodcentered", '·'),
    ("guillemotleft", '«'),
    ("guillemotright", '»'),
    ("dotlessi", 'ı'),
    ("florin", 'ƒ'),
    ("perthousand", '‰'),
];

/// Translates a glyph name to Unicode: ASCII and common names, `uniXXXX`,
/// `uXXXX[XX]`, and single-letter names.
pub fn glyph_name_to_unicode(name: &str) -> Option<char> {
    if let Some(pos) = ASCII_NAMES.iter().position(|n| *n == name) {
        return char::from_u32(0x20 + pos as u32);
    }
    if let Some((_, ch)) = EXTRA_NAMES.iter().find(|(n, _)| *n == name) {
        return Some(*ch);
    }
    // Variants such as "a.sc" or "f_i" keep their base letter's meaning.
    let base = name.split('.').next().unwrap_or(name);
    if base != name {
        return glyph_name_to_unicode(base);
    }
    let hex = name
        .strip_prefix("uni")
        .filter(|h| h.len() == 4)
        .or_else(|| name.strip_prefix('u').filter(|h| (4..=6).contains(&h.len())))?;
    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
}

/// The Adobe glyph name for `ch`, where one is known.
pub fn unicode_to_glyph_name(ch: char) -> Option<&'static str> {
    let code = u32::from(ch);
    if (0x20..0x7F).contains(&code) {
        return Some(ASCII_NAMES[(code - 0x20) as usize]);
    }
    EXTRA_NAMES.iter().find(|(_, c)| *c == ch).map(|(n, _)| *n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_encodings() {
        assert_eq!(BaseEncoding::WinAnsi.to_unicode(b'A'), Some('A'));
        assert_eq!(BaseEncoding::WinAnsi.to_unicode(0x80), Some('€'));
        assert_eq!(BaseEncoding::WinAnsi.to_unicode(0x81), None);
        assert_eq!(BaseEncoding::WinAnsi.to_unicode(0xE9), Some('é'));
        assert_eq!(BaseEncoding::MacRoman.to_unicode(0x8E), Some('é'));
        assert_eq!(BaseEncoding::Standard.to_unicode(0x27), Some('’'));
        assert_eq!(BaseEncoding::Standard.to_unicode(0xE9), Some('Ø'));
        assert_eq!(BaseEncoding::Builtin.to_unicode(b'A'), None);
    }

    #[test]
    fn test_glyph_names() {
        assert_eq!(glyph_name_to_unicode("A"), Some('A'));
        assert_eq!(glyph_name_to_unicode("space"), Some(' '));
        assert_eq!(glyph_name_to_unicode("emdash"), Some('—'));
        assert_eq!(glyph_name_to_unicode("uni20AC"), Some('€'));
        assert_eq!(glyph_name_to_unicode("u1F600"), Some('😀'));
        assert_eq!(glyph_name_to_unicode("a.sc"), Some('a'));
        assert_eq!(glyph_name_to_unicode("nonsense"), None);
        assert_eq!(unicode_to_glyph_name('{'), Some("braceleft"));
        assert_eq!(unicode_to_glyph_name('“'), Some("quotedblleft"));
    }
}
