//! Character decoding for the three book encodings, plus the process-wide
//! wide/narrow (full-width/half-width) character mapping.
//!
//! JIS X 0208 row-cell pairs are resolved through `encoding_rs`'s EUC-JP
//! table by setting the high bit on both bytes; GB 2312 pairs go through the
//! GB18030 table the same way. ISO 8859-1 bytes map directly to their
//! Unicode scalar values.

use std::collections::HashMap;
use std::sync::OnceLock;

use encoding_rs::{EUC_JP, GB18030};
use log::debug;

use super::error::{EbError, Result};

/// Placeholder emitted for book-local ("gaiji") characters, whose glyphs
/// live in the subbook's font files rather than any standard code table.
pub const LOCAL_CHARACTER_PLACEHOLDER: char = '\u{fffd}';

/// The character encoding of a book's text stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Iso8859_1,
    JisX0208,
    JisX0208Gb2312,
}

impl Encoding {
    /// Maps the `language` file's character code to an encoding.
    pub fn from_language_code(code: u16) -> Result<Self> {
        match code {
            1 => Ok(Encoding::Iso8859_1),
            2 => Ok(Encoding::JisX0208),
            3 => Ok(Encoding::JisX0208Gb2312),
            other => Err(EbError::UnsupportedEncoding(other)),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Encoding::Iso8859_1 => "iso8859-1",
            Encoding::JisX0208 => "jisx0208",
            Encoding::JisX0208Gb2312 => "jisx0208-gb2312",
        }
    }

    pub fn is_single_byte(&self) -> bool {
        matches!(self, Encoding::Iso8859_1)
    }
}

/// Whether a single ISO 8859-1 byte is printable (0x20..=0x7E or
/// 0xA0..=0xFF).
pub fn is_latin_printable(byte: u8) -> bool {
    (0x20..0x7f).contains(&byte) || byte >= 0xa0
}

fn decode_two_byte(table: &'static encoding_rs::Encoding, bytes: [u8; 2]) -> Option<char> {
    let (text, had_errors) = table.decode_without_bom_handling(&bytes);
    if had_errors {
        return None;
    }
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Some(ch),
        _ => None,
    }
}

/// Decode one 2-byte unit of text under a two-byte encoding.
///
/// Returns `None` for pairs outside the encoding's printable planes; the
/// caller treats those as consumed filler. `narrow_open` reports whether a
/// `narrow` section is currently open, which is the only context available
/// for resolving book-local characters in the JIS X 0208 + GB 2312 hybrid.
pub fn decode_pair(encoding: Encoding, c1: u8, c2: u8, narrow_open: bool) -> Option<char> {
    let jis = (0x20 < c1 && c1 < 0x7f) && (0x20 < c2 && c2 < 0x7f);
    match encoding {
        Encoding::Iso8859_1 => None,
        Encoding::JisX0208 => {
            if jis {
                decode_two_byte(EUC_JP, [c1 | 0x80, c2 | 0x80])
            } else {
                None
            }
        }
        Encoding::JisX0208Gb2312 => {
            if jis {
                decode_two_byte(EUC_JP, [c1 | 0x80, c2 | 0x80])
            } else if (0x20 < c1 && c1 < 0x7f) && (0xa0 < c2 && c2 < 0xff) {
                decode_two_byte(GB18030, [c1 | 0x80, c2])
            } else if (0xa0 < c1 && c1 < 0xff) && (0x20 < c2 && c2 < 0x7f) {
                // Book-local character; the glyph is only resolvable through
                // the subbook's narrow/wide font files.
                debug!(
                    "Local {} character {:#04x}{:02x} replaced with placeholder",
                    if narrow_open { "narrow" } else { "wide" },
                    c1,
                    c2
                );
                Some(LOCAL_CHARACTER_PLACEHOLDER)
            } else {
                None
            }
        }
    }
}

/// Decode a fixed-length string field: truncate at the first NUL, decode
/// under `encoding`, trim surrounding whitespace.
pub fn decode_fixed(bytes: &[u8], encoding: Encoding) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let bytes = &bytes[..end];

    let decoded: String = if encoding.is_single_byte() {
        bytes.iter().map(|&b| char::from(b)).collect()
    } else {
        bytes
            .chunks_exact(2)
            .filter_map(|pair| decode_pair(encoding, pair[0], pair[1], false))
            .collect()
    };
    decoded.trim().to_string()
}

struct WidthMaps {
    wide_to_narrow: HashMap<char, char>,
    narrow_to_wide: HashMap<char, char>,
}

/// (wide, narrow) pairs outside the contiguous full-width ASCII run:
/// half-width katakana and punctuation (FF61..=FF9F), full-width signs
/// (FFE0..=FFE6) and half-width forms (FFE8..=FFEE).
const WIDTH_PAIRS: &[(char, char)] = &[
    ('。', '｡'),
    ('「', '｢'),
    ('」', '｣'),
    ('、', '､'),
    ('・', '･'),
    ('ヲ', 'ｦ'),
    ('ァ', 'ｧ'),
    ('ィ', 'ｨ'),
    ('ゥ', 'ｩ'),
    ('ェ', 'ｪ'),
    ('ォ', 'ｫ'),
    ('ャ', 'ｬ'),
    ('ュ', 'ｭ'),
    ('ョ', 'ｮ'),
    ('ッ', 'ｯ'),
    ('ー', 'ｰ'),
    ('ア', 'ｱ'),
    ('イ', 'ｲ'),
    ('ウ', 'ｳ'),
    ('エ', 'ｴ'),
    ('オ', 'ｵ'),
    ('カ', 'ｶ'),
    ('キ', 'ｷ'),
    ('ク', 'ｸ'),
    ('ケ', 'ｹ'),
    ('コ', 'ｺ'),
    ('サ', 'ｻ'),
    ('シ', 'ｼ'),
    ('ス', 'ｽ'),
    ('セ', 'ｾ'),
    ('ソ', 'ｿ'),
    ('タ', 'ﾀ'),
    ('チ', 'ﾁ'),
    ('ツ', 'ﾂ'),
    ('テ', 'ﾃ'),
    ('ト', 'ﾄ'),
    ('ナ', 'ﾅ'),
    ('ニ', 'ﾆ'),
    ('ヌ', 'ﾇ'),
    ('ネ', 'ﾈ'),
    ('ノ', 'ﾉ'),
    ('ハ', 'ﾊ'),
    ('ヒ', 'ﾋ'),
    ('フ', 'ﾌ'),
    ('ヘ', 'ﾍ'),
    ('ホ', 'ﾎ'),
    ('マ', 'ﾏ'),
    ('ミ', 'ﾐ'),
    ('ム', 'ﾑ'),
    ('メ', 'ﾒ'),
    ('モ', 'ﾓ'),
    ('ヤ', 'ﾔ'),
    ('ユ', 'ﾕ'),
    ('ヨ', 'ﾖ'),
    ('ラ', 'ﾗ'),
    ('リ', 'ﾘ'),
    ('ル', 'ﾙ'),
    ('レ', 'ﾚ'),
    ('ロ', 'ﾛ'),
    ('ワ', 'ﾜ'),
    ('ン', 'ﾝ'),
    ('゛', 'ﾞ'),
    ('゜', 'ﾟ'),
    ('￠', '¢'),
    ('￡', '£'),
    ('￢', '¬'),
    ('￣', '¯'),
    ('￤', '¦'),
    ('￥', '¥'),
    ('￦', '₩'),
    ('\u{2502}', '\u{ffe8}'),
    ('\u{2190}', '\u{ffe9}'),
    ('\u{2191}', '\u{ffea}'),
    ('\u{2192}', '\u{ffeb}'),
    ('\u{2193}', '\u{ffec}'),
    ('\u{25a0}', '\u{ffed}'),
    ('\u{25cb}', '\u{ffee}'),
];

static WIDTH_MAPS: OnceLock<WidthMaps> = OnceLock::new();

fn width_maps() -> &'static WidthMaps {
    WIDTH_MAPS.get_or_init(|| {
        let mut wide_to_narrow = HashMap::new();
        let mut narrow_to_wide = HashMap::new();

        // Full-width ASCII FF01..=FF5E mirrors 0x21..=0x7E at a fixed
        // distance.
        for narrow in 0x21u32..=0x7e {
            let wide = char::from_u32(narrow + 0xfee0).expect("BMP code point");
            let narrow = char::from_u32(narrow).expect("ASCII code point");
            wide_to_narrow.insert(wide, narrow);
            narrow_to_wide.insert(narrow, wide);
        }
        for &(wide, narrow) in WIDTH_PAIRS {
            wide_to_narrow.insert(wide, narrow);
            narrow_to_wide.insert(narrow, wide);
        }

        debug!("Mapped {} characters from wide<->narrow", wide_to_narrow.len());
        WidthMaps {
            wide_to_narrow,
            narrow_to_wide,
        }
    })
}

/// Take a wide-character string and convert it to a narrow one.
/// Characters without a half-width counterpart pass through unchanged.
pub fn to_narrow(s: &str) -> String {
    let maps = width_maps();
    s.chars()
        .map(|ch| maps.wide_to_narrow.get(&ch).copied().unwrap_or(ch))
        .collect()
}

/// Take a narrow-character string and convert it to a wide one.
pub fn to_wide(s: &str) -> String {
    let maps = width_maps();
    s.chars()
        .map(|ch| maps.narrow_to_wide.get(&ch).copied().unwrap_or(ch))
        .collect()
}
