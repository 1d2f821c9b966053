//! Search-index table parsing and the bit-flag normalization policy.
//!
//! Each subbook with text carries one index page: a 16-byte table header
//! followed by up to 127 sixteen-byte search-method entries. The packed
//! 24-bit flag word of each entry, combined with the table's global
//! availability code, decides how search keys are normalized for that
//! method.

use std::collections::HashMap;

use log::{debug, warn};

use super::catalog::BookType;
use super::charset::Encoding;
use super::error::Result;
use super::layout::{FieldDef, FieldKind, RawRecord, RecordLayout};
use super::zio::Zio;

/// Index-style codes shared by all policy fields.
pub const STYLE_CONVERT: u8 = 0;
pub const STYLE_ASIS: u8 = 1;
pub const STYLE_REVERSED_CONVERT: u8 = 2;
pub const STYLE_DELETE: u8 = 2;

/// One page holds the 16-byte header plus at most 127 entries.
const MAX_SEARCH_METHODS: usize = 2048 / 16 - 1;

static INDEX_TABLE_HEADER_FIELDS: [FieldDef; 5] = [
    FieldDef { name: "header", offset: 0, width: 1, kind: FieldKind::Bytes },
    FieldDef { name: "index_count", offset: 1, width: 1, kind: FieldKind::UInt },
    FieldDef { name: "unknown0", offset: 2, width: 2, kind: FieldKind::Bytes },
    FieldDef { name: "global_availability", offset: 4, width: 1, kind: FieldKind::UInt },
    FieldDef { name: "unknown1", offset: 5, width: 11, kind: FieldKind::Bytes },
];
pub static INDEX_TABLE_HEADER: RecordLayout = RecordLayout {
    name: "index_table_header",
    size: 16,
    fields: &INDEX_TABLE_HEADER_FIELDS,
};

static SEARCH_INDEX_ENTRY_FIELDS: [FieldDef; 7] = [
    FieldDef { name: "index_id", offset: 0, width: 1, kind: FieldKind::UInt },
    FieldDef { name: "unknown0", offset: 1, width: 1, kind: FieldKind::Bytes },
    FieldDef { name: "start_page", offset: 2, width: 4, kind: FieldKind::UInt },
    FieldDef { name: "page_count", offset: 6, width: 4, kind: FieldKind::UInt },
    FieldDef { name: "availability", offset: 10, width: 1, kind: FieldKind::UInt },
    FieldDef { name: "flags", offset: 11, width: 3, kind: FieldKind::U24 },
    FieldDef { name: "unknown1", offset: 14, width: 2, kind: FieldKind::Bytes },
];
pub static SEARCH_INDEX_ENTRY: RecordLayout = RecordLayout {
    name: "search_index_entry",
    size: 16,
    fields: &SEARCH_INDEX_ENTRY_FIELDS,
};

/// How one search method normalizes its keys. Each field holds one of the
/// `STYLE_*` codes. Derived once per entry and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizationPolicy {
    pub katakana: u8,
    pub lower: u8,
    pub mark: u8,
    pub long_vowel: u8,
    pub double_consonant: u8,
    pub contracted_sound: u8,
    pub small_vowel: u8,
    pub voiced_consonant: u8,
    pub p_sound: u8,
    pub space: u8,
}

/// One decoded search-method entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMethod {
    pub index_id: u8,
    pub start_page: u32,
    /// Inclusive last page of the method's range.
    pub end_page: u32,
    pub availability: u8,
    /// The raw packed 24-bit flag word.
    pub flags: u32,
    pub policy: NormalizationPolicy,
}

/// Named search types a method can register under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchKey {
    Text,
    Menu,
    Copyright,
    ImageMenu,
    EndwordKana,
    EndwordAsis,
    EndwordAlphabet,
    Keyword,
    Cross,
    WordKana,
    WordAsis,
    WordAlphabet,
    Sound,
    /// EPWING search-title page.
    TitlePage,
    /// EB font pages, indexed 0..=3.
    WideFont(u8),
    NarrowFont(u8),
}

/// A subbook's registered search methods.
///
/// Non-`multi` entries overwrite on duplicate registration; `multi` entries
/// accumulate in table order.
#[derive(Debug, Default)]
pub struct SearchTable {
    methods: HashMap<SearchKey, SearchMethod>,
    pub multi: Vec<SearchMethod>,
}

impl SearchTable {
    pub fn get(&self, key: SearchKey) -> Option<&SearchMethod> {
        self.methods.get(&key)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.multi.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SearchKey, &SearchMethod)> {
        self.methods.iter()
    }
}

/// S-EBXA compressed-text locations found in an EB index table. The
/// compressed backend itself is an external provider; the locations are
/// recorded for it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SebxaSettings {
    pub index_location: Option<u32>,
    pub index_base: Option<u32>,
}

/// Derive the normalization policy for one entry. Pure: the result depends
/// only on the arguments.
pub fn derive_policy(
    global_availability: u8,
    index_id: u8,
    availability: u8,
    flags: u32,
    encoding: Encoding,
) -> NormalizationPolicy {
    let mut policy = if (global_availability == 0 && availability == 2) || global_availability == 2
    {
        NormalizationPolicy {
            katakana: ((flags & 0xc00000) >> 22) as u8,
            lower: ((flags & 0x300000) >> 20) as u8,
            mark: if (flags & 0x0c0000) >> 18 == 0 {
                STYLE_DELETE
            } else {
                STYLE_ASIS
            },
            long_vowel: ((flags & 0x030000) >> 16) as u8,
            double_consonant: ((flags & 0x00c000) >> 14) as u8,
            contracted_sound: ((flags & 0x003000) >> 12) as u8,
            small_vowel: ((flags & 0x000c00) >> 10) as u8,
            voiced_consonant: ((flags & 0x000300) >> 8) as u8,
            p_sound: ((flags & 0x0000c0) >> 6) as u8,
            space: STYLE_DELETE,
        }
    } else if index_id == 0x70 || index_id == 0x90 {
        // Kana word/endword indices always convert.
        NormalizationPolicy {
            katakana: STYLE_CONVERT,
            lower: STYLE_CONVERT,
            mark: STYLE_DELETE,
            long_vowel: STYLE_CONVERT,
            double_consonant: STYLE_CONVERT,
            contracted_sound: STYLE_CONVERT,
            small_vowel: STYLE_CONVERT,
            voiced_consonant: STYLE_CONVERT,
            p_sound: STYLE_CONVERT,
            space: STYLE_DELETE,
        }
    } else {
        NormalizationPolicy {
            katakana: STYLE_ASIS,
            lower: STYLE_CONVERT,
            mark: STYLE_ASIS,
            long_vowel: STYLE_ASIS,
            double_consonant: STYLE_ASIS,
            contracted_sound: STYLE_ASIS,
            small_vowel: STYLE_ASIS,
            voiced_consonant: STYLE_ASIS,
            p_sound: STYLE_ASIS,
            space: STYLE_DELETE,
        }
    };

    // Space handling is independent of the branch above.
    policy.space = if encoding == Encoding::Iso8859_1 || index_id == 0x72 || index_id == 0x92 {
        STYLE_ASIS
    } else {
        STYLE_DELETE
    };

    policy
}

/// Read and decode the search-index table at `index_page`.
pub fn load(
    zio: &mut dyn Zio,
    index_page: u32,
    encoding: Encoding,
    book_type: BookType,
    zio_is_plain: bool,
) -> Result<(SearchTable, SebxaSettings)> {
    let mut table = SearchTable::default();
    let mut sebxa = SebxaSettings::default();

    zio.seek_page(index_page, 0)?;

    let mut header_buf = [0u8; 16];
    zio.read_into(&mut header_buf)?;
    let header = RawRecord::new(&INDEX_TABLE_HEADER, &header_buf)?;

    let index_count = header.uint("index_count")? as usize;
    debug!("Index count {:#x}", index_count);
    if index_count >= MAX_SEARCH_METHODS {
        debug!("Unexpected text where index should be");
        return Ok((table, sebxa));
    }

    let mut global = header.uint("global_availability")? as u8;
    if global > 2 {
        debug!("(global availability was {:#x})", global);
        global = 0;
    }
    debug!("Global availability {:#x}", global);

    let mut entry_buf = [0u8; 16];
    for i in 0..index_count {
        zio.read_into(&mut entry_buf)?;
        let rec = RawRecord::new(&SEARCH_INDEX_ENTRY, &entry_buf)?;

        let index_id = rec.uint("index_id")? as u8;
        let start_page = rec.uint("start_page")? as u32;
        let page_count = rec.uint("page_count")? as u32;
        let availability = rec.uint("availability")? as u8;
        let flags = rec.uint("flags")? as u32;

        debug!(
            "Search method {} id {:#04x}: start page {}, {} pages, flags {:#08x}, availability {:#x}",
            i, index_id, start_page, page_count, flags, availability
        );

        let end_page = start_page as i64 + page_count as i64 - 1;
        if end_page < start_page as i64 {
            warn!("Search method {} has an empty page range; dropped", i);
            continue;
        }

        let method = SearchMethod {
            index_id,
            start_page,
            end_page: end_page as u32,
            availability,
            flags,
            policy: derive_policy(global, index_id, availability, flags, encoding),
        };

        match index_id {
            0x00 => table.register(SearchKey::Text, method),
            0x01 => table.register(SearchKey::Menu, method),
            0x02 => table.register(SearchKey::Copyright, method),
            0x10 => table.register(SearchKey::ImageMenu, method),
            0x70 => table.register(SearchKey::EndwordKana, method),
            0x71 => table.register(SearchKey::EndwordAsis, method),
            0x72 => table.register(SearchKey::EndwordAlphabet, method),
            0x80 => table.register(SearchKey::Keyword, method),
            0x81 => table.register(SearchKey::Cross, method),
            0x90 => table.register(SearchKey::WordKana, method),
            0x91 => table.register(SearchKey::WordAsis, method),
            0x92 => table.register(SearchKey::WordAlphabet, method),
            0xd8 => table.register(SearchKey::Sound, method),
            0xff => table.multi.push(method),
            // EB-only entries locate S-EBXA compressed text; only plain
            // (uncompressed) streams can be reindexed through them.
            0x21 | 0x22 if book_type == BookType::Eb => {
                if !zio_is_plain {
                    debug!("Sebxa settings in unsupported book?");
                } else if index_id == 0x21 {
                    sebxa.index_base = Some(start_page);
                } else {
                    sebxa.index_location = Some(start_page);
                }
                if sebxa.index_base.is_some() && sebxa.index_location.is_some() {
                    debug!("Sebxa locations complete; compressed backend is external");
                }
            }
            0xf1..=0xf8 if book_type == BookType::Eb => {
                let slot = (index_id - 0xf1) / 2;
                let key = if index_id % 2 == 1 {
                    SearchKey::WideFont(slot)
                } else {
                    SearchKey::NarrowFont(slot)
                };
                table.register(key, method);
            }
            0x16 if book_type == BookType::Epwing => {
                table.register(SearchKey::TitlePage, method);
            }
            0x16 | 0x21 | 0x22 | 0xf1..=0xf8 => {
                // Known id gated to the other disc family; ignored.
            }
            other => {
                debug!("Unknown search type {:#04x}", other);
            }
        }
    }

    Ok((table, sebxa))
}

impl SearchTable {
    fn register(&mut self, key: SearchKey, method: SearchMethod) {
        debug!("Search added {:?}", key);
        self.methods.insert(key, method);
    }
}
