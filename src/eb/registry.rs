//! Static escape-code registry.
//!
//! Maps each one-byte escape code (following the 0x1F lead byte) to a token:
//! a section start/end, an inline directive, or a skip code. Tokens carry an
//! optional payload layout, an info extractor and a handler. The table is
//! built once per process and validated in full — every referenced payload
//! layout must pass its size self-check before the first byte of text is
//! decoded.

use std::sync::OnceLock;

use super::catalog;
use super::handlers;
use super::indices;
use super::layout::{FieldDef, FieldKind, RecordLayout};
use super::error::Result;

/// The escape lead byte reserved by the on-disk convention.
pub const ESCAPE_CODE: u8 = 0x1f;

/// Full 2-byte escape pairs used by the stop-code heuristics.
pub const KEYWORD_START_CODE: u16 = 0x1f41;
pub const SET_INDENT_CODE: u16 = 0x1f09;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Start,
    End,
    Directive,
    /// Suppresses all dispatch until `resume` reappears as an escape code.
    Skip { resume: u8 },
}

pub struct Token {
    pub name: &'static str,
    pub kind: TokenKind,
    /// Payload layout, sized including the 2 leading code bytes.
    pub layout: Option<&'static RecordLayout>,
    pub extract: Option<handlers::ExtractFn>,
    pub handler: Option<handlers::HandlerFn>,
    /// Extra bytes to consume after the payload and handler.
    pub skip_bytes: i64,
}

// Payload layouts. Field offsets start at the escape pair itself, matching
// the on-disk records.

static PAGE_OFFSET_FIELDS: [FieldDef; 3] = [
    FieldDef { name: "code", offset: 0, width: 2, kind: FieldKind::Bytes },
    FieldDef { name: "page", offset: 2, width: 4, kind: FieldKind::Bcd },
    FieldDef { name: "offset", offset: 6, width: 2, kind: FieldKind::Bcd },
];
pub static PAGE_OFFSET: RecordLayout = RecordLayout {
    name: "page_offset",
    size: 8,
    fields: &PAGE_OFFSET_FIELDS,
};

static SET_INDENT_FIELDS: [FieldDef; 2] = [
    FieldDef { name: "code", offset: 0, width: 2, kind: FieldKind::Bytes },
    FieldDef { name: "indent", offset: 2, width: 2, kind: FieldKind::UInt },
];
pub static SET_INDENT: RecordLayout = RecordLayout {
    name: "set_indent",
    size: 4,
    fields: &SET_INDENT_FIELDS,
};

static KEYWORD_START_FIELDS: [FieldDef; 2] = [
    FieldDef { name: "code", offset: 0, width: 2, kind: FieldKind::Bytes },
    FieldDef { name: "auto_stop_code", offset: 2, width: 2, kind: FieldKind::UInt },
];
pub static KEYWORD_START: RecordLayout = RecordLayout {
    name: "keyword_start",
    size: 4,
    fields: &KEYWORD_START_FIELDS,
};

static REFERENCE_START_FIELDS: [FieldDef; 3] = [
    FieldDef { name: "code", offset: 0, width: 2, kind: FieldKind::Bytes },
    FieldDef { name: "arg_check", offset: 2, width: 1, kind: FieldKind::UInt },
    FieldDef { name: "unknown", offset: 3, width: 1, kind: FieldKind::Bytes },
];
pub static REFERENCE_START: RecordLayout = RecordLayout {
    name: "reference_start",
    size: 4,
    fields: &REFERENCE_START_FIELDS,
};

static GRAPHIC_BLOCK_START_FIELDS: [FieldDef; 2] = [
    FieldDef { name: "code", offset: 0, width: 2, kind: FieldKind::Bytes },
    FieldDef { name: "arg1", offset: 2, width: 2, kind: FieldKind::Bcd },
];
pub static GRAPHIC_BLOCK_START: RecordLayout = RecordLayout {
    name: "graphic_block_start",
    size: 4,
    fields: &GRAPHIC_BLOCK_START_FIELDS,
};

static MONO_GRAPHIC_START_FIELDS: [FieldDef; 4] = [
    FieldDef { name: "code", offset: 0, width: 2, kind: FieldKind::Bytes },
    FieldDef { name: "unknown", offset: 2, width: 2, kind: FieldKind::Bytes },
    FieldDef { name: "width", offset: 4, width: 4, kind: FieldKind::Bcd },
    FieldDef { name: "height", offset: 8, width: 4, kind: FieldKind::Bcd },
];
pub static MONO_GRAPHIC_START: RecordLayout = RecordLayout {
    name: "mono_graphic_start",
    size: 12,
    fields: &MONO_GRAPHIC_START_FIELDS,
};

static WAVE_SOUND_START_FIELDS: [FieldDef; 6] = [
    FieldDef { name: "code", offset: 0, width: 2, kind: FieldKind::Bytes },
    FieldDef { name: "arg1", offset: 2, width: 4, kind: FieldKind::UInt },
    FieldDef { name: "start_page", offset: 6, width: 4, kind: FieldKind::Bcd },
    FieldDef { name: "start_offset", offset: 10, width: 2, kind: FieldKind::Bcd },
    FieldDef { name: "end_page", offset: 12, width: 4, kind: FieldKind::Bcd },
    FieldDef { name: "end_offset", offset: 16, width: 2, kind: FieldKind::Bcd },
];
pub static WAVE_SOUND_START: RecordLayout = RecordLayout {
    name: "wave_sound_start",
    size: 18,
    fields: &WAVE_SOUND_START_FIELDS,
};

static GRAPHIC_START_FIELDS: [FieldDef; 5] = [
    FieldDef { name: "code", offset: 0, width: 2, kind: FieldKind::Bytes },
    FieldDef { name: "type_info", offset: 2, width: 2, kind: FieldKind::UInt },
    FieldDef { name: "unknown", offset: 4, width: 10, kind: FieldKind::Bytes },
    FieldDef { name: "page", offset: 14, width: 4, kind: FieldKind::Bcd },
    FieldDef { name: "offset", offset: 18, width: 2, kind: FieldKind::Bcd },
];
pub static GRAPHIC_START: RecordLayout = RecordLayout {
    name: "graphic_start",
    size: 20,
    fields: &GRAPHIC_START_FIELDS,
};

static CLICKABLE_START_FIELDS: [FieldDef; 9] = [
    FieldDef { name: "code", offset: 0, width: 2, kind: FieldKind::Bytes },
    FieldDef { name: "unknown0", offset: 2, width: 6, kind: FieldKind::Bytes },
    FieldDef { name: "x", offset: 8, width: 2, kind: FieldKind::Bcd },
    FieldDef { name: "y", offset: 10, width: 2, kind: FieldKind::Bcd },
    FieldDef { name: "width", offset: 12, width: 2, kind: FieldKind::Bcd },
    FieldDef { name: "height", offset: 14, width: 2, kind: FieldKind::Bcd },
    FieldDef { name: "unknown1", offset: 16, width: 12, kind: FieldKind::Bytes },
    FieldDef { name: "page", offset: 28, width: 4, kind: FieldKind::Bcd },
    FieldDef { name: "offset", offset: 32, width: 2, kind: FieldKind::Bcd },
];
pub static CLICKABLE_START: RecordLayout = RecordLayout {
    name: "clickable_start",
    size: 34,
    fields: &CLICKABLE_START_FIELDS,
};

static MPEG_START_FIELDS: [FieldDef; 8] = [
    FieldDef { name: "code", offset: 0, width: 2, kind: FieldKind::Bytes },
    FieldDef { name: "unknown0", offset: 2, width: 4, kind: FieldKind::UInt },
    FieldDef { name: "unknown1", offset: 6, width: 16, kind: FieldKind::Bytes },
    FieldDef { name: "arg2", offset: 22, width: 4, kind: FieldKind::UInt },
    FieldDef { name: "arg3", offset: 26, width: 4, kind: FieldKind::UInt },
    FieldDef { name: "arg4", offset: 30, width: 4, kind: FieldKind::UInt },
    FieldDef { name: "arg5", offset: 34, width: 4, kind: FieldKind::UInt },
    FieldDef { name: "unknown2", offset: 38, width: 8, kind: FieldKind::Bytes },
];
pub static MPEG_START: RecordLayout = RecordLayout {
    name: "mpeg_start",
    size: 46,
    fields: &MPEG_START_FIELDS,
};

static DECORATION_START_FIELDS: [FieldDef; 2] = [
    FieldDef { name: "code", offset: 0, width: 2, kind: FieldKind::Bytes },
    FieldDef { name: "decoration_code", offset: 2, width: 2, kind: FieldKind::UInt },
];
pub static DECORATION_START: RecordLayout = RecordLayout {
    name: "decoration_start",
    size: 4,
    fields: &DECORATION_START_FIELDS,
};

/// Every layout the crate reads from disc, payload and table records alike.
/// All of them are validated when the registry initializes.
fn all_layouts() -> [&'static RecordLayout; 17] {
    [
        &PAGE_OFFSET,
        &SET_INDENT,
        &KEYWORD_START,
        &REFERENCE_START,
        &GRAPHIC_BLOCK_START,
        &MONO_GRAPHIC_START,
        &WAVE_SOUND_START,
        &GRAPHIC_START,
        &CLICKABLE_START,
        &MPEG_START,
        &DECORATION_START,
        &catalog::CATALOG_HEADER,
        &catalog::EPWING_CATALOG_ENTRY,
        &catalog::EB_CATALOG_ENTRY,
        &catalog::EPWING_RESOURCE,
        &indices::INDEX_TABLE_HEADER,
        &indices::SEARCH_INDEX_ENTRY,
    ]
}

/// Escape codes whose payload length is data-dependent: they suppress all
/// dispatch until their resume code reappears.
const SKIP_CODES: &[u8] = &[
    0x14, //
    0x35, 0x36, 0x37, 0x38, 0x3a, 0x3b, 0x3d, 0x3e, 0x3f, //
    0x49, 0x4e, //
    0x70, 0x71, 0x72, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, //
    0x7b, 0x7c, 0x7d, 0x7e, 0x7f, 0x80, 0x81, 0x82, 0x83, 0x84, 0x85, //
    0x86, 0x87, 0x88, 0x89, 0x8a, 0x8b, 0x8c, 0x8d, 0x8e, 0x8f, //
    0xe4, 0xe6, 0xe8, 0xea, 0xec, 0xee, //
    0xf0, 0xf2, 0xf4, 0xf6, 0xf8, 0xfa, //
    0xfc, 0xfe,
];

/// The code that disarms a given skip code.
fn skip_resume_code(code: u8) -> u8 {
    if code == 0x14 {
        0x15
    } else if (0xe4..=0xfe).contains(&code) {
        code + 0x01
    } else {
        code + 0x20
    }
}

pub struct Registry {
    tokens: [Option<Token>; 256],
}

impl Registry {
    pub fn token(&self, code: u8) -> Option<&Token> {
        self.tokens[code as usize].as_ref()
    }

    /// The end-token code for a section name, used when a skipped section's
    /// span has to be consumed silently.
    pub fn end_code_for(&self, name: &str) -> Option<u8> {
        self.tokens.iter().enumerate().find_map(|(code, slot)| {
            slot.as_ref()
                .filter(|t| t.kind == TokenKind::End && t.name == name)
                .map(|_| code as u8)
        })
    }

    fn build() -> Result<Registry> {
        for layout in all_layouts() {
            layout.validate()?;
        }

        fn tok(name: &'static str, kind: TokenKind) -> Token {
            Token {
                name,
                kind,
                layout: None,
                extract: None,
                handler: None,
                skip_bytes: 0,
            }
        }

        let mut tokens: [Option<Token>; 256] = std::array::from_fn(|_| None);
        let mut set = |code: u8, token: Token| {
            tokens[code as usize] = Some(token);
        };

        set(0x02, tok("text", TokenKind::Start));
        set(0x03, Token {
            handler: Some(handlers::text_end),
            ..tok("text", TokenKind::End)
        });
        set(0x04, tok("narrow", TokenKind::Start));
        set(0x05, tok("narrow", TokenKind::End));
        set(0x06, tok("subscript", TokenKind::Start));
        set(0x07, tok("subscript", TokenKind::End));
        set(0x09, Token {
            layout: Some(&SET_INDENT),
            extract: Some(handlers::extract_set_indent),
            handler: Some(handlers::set_indent),
            ..tok("set_indent", TokenKind::Directive)
        });
        set(0x0a, tok("newline", TokenKind::Directive));
        set(0x0b, tok("unicode", TokenKind::Start));
        set(0x0c, tok("unicode", TokenKind::End));
        set(0x0e, tok("superscript", TokenKind::Start));
        set(0x0f, tok("superscript", TokenKind::End));
        set(0x10, tok("no_newline", TokenKind::Start));
        set(0x11, tok("no_newline", TokenKind::End));
        set(0x12, tok("emphasis", TokenKind::Start));
        set(0x13, tok("emphasis", TokenKind::End));

        // Emphasis directives carry inline data on EB discs; described in
        // JIS X 4081-1996.
        for code in [0x1a, 0x1b, 0x1e, 0x1f] {
            set(code, Token {
                handler: Some(handlers::emphasis_directive),
                ..tok("emphasis", TokenKind::Directive)
            });
        }

        set(0x1c, Token {
            handler: Some(handlers::gaiji_boundary),
            ..tok("gaiji", TokenKind::Start)
        });
        set(0x1d, Token {
            handler: Some(handlers::gaiji_boundary),
            ..tok("gaiji", TokenKind::End)
        });

        set(0x32, tok("mono_graphic_ref", TokenKind::Start));
        set(0x39, Token {
            layout: Some(&MPEG_START),
            ..tok("mpeg", TokenKind::Start)
        });
        set(0x3c, Token {
            layout: Some(&GRAPHIC_START),
            extract: Some(handlers::extract_graphic),
            ..tok("inline_graphic", TokenKind::Start)
        });

        set(0x41, Token {
            layout: Some(&KEYWORD_START),
            extract: Some(handlers::extract_keyword),
            handler: Some(handlers::keyword_start),
            ..tok("keyword", TokenKind::Start)
        });
        set(0x42, Token {
            layout: Some(&REFERENCE_START),
            extract: Some(handlers::extract_reference),
            handler: Some(handlers::reference_start),
            ..tok("reference", TokenKind::Start)
        });
        set(0x43, tok("candidate", TokenKind::Start));
        set(0x44, Token {
            layout: Some(&MONO_GRAPHIC_START),
            extract: Some(handlers::extract_mono_graphic),
            handler: Some(handlers::mono_graphic_start),
            ..tok("mono_graphic", TokenKind::Start)
        });
        set(0x45, Token {
            layout: Some(&GRAPHIC_BLOCK_START),
            extract: Some(handlers::extract_graphic_block),
            handler: Some(handlers::graphic_block_start),
            ..tok("graphic_block", TokenKind::Start)
        });
        set(0x4a, Token {
            layout: Some(&WAVE_SOUND_START),
            extract: Some(handlers::extract_wave_sound),
            ..tok("wave_sound", TokenKind::Start)
        });
        set(0x4b, Token {
            layout: Some(&PAGE_OFFSET),
            extract: Some(handlers::extract_page_offset),
            handler: Some(handlers::paged_reference_start),
            ..tok("paged_reference", TokenKind::Start)
        });
        set(0x4c, Token {
            skip_bytes: 2,
            ..tok("image_page", TokenKind::Start)
        });
        set(0x4d, Token {
            layout: Some(&GRAPHIC_START),
            extract: Some(handlers::extract_graphic),
            ..tok("graphic", TokenKind::Start)
        });
        set(0x4f, Token {
            layout: Some(&CLICKABLE_START),
            extract: Some(handlers::extract_clickable),
            ..tok("clickable", TokenKind::Start)
        });

        set(0x52, Token {
            layout: Some(&PAGE_OFFSET),
            extract: Some(handlers::extract_page_offset),
            ..tok("mono_graphic_ref", TokenKind::End)
        });
        set(0x53, tok("eb_sound", TokenKind::End));
        set(0x59, tok("mpeg", TokenKind::End));
        set(0x5c, tok("inline_graphic", TokenKind::End));
        set(0x61, tok("keyword", TokenKind::End));
        set(0x62, Token {
            layout: Some(&PAGE_OFFSET),
            extract: Some(handlers::extract_page_offset),
            ..tok("reference", TokenKind::End)
        });
        set(0x63, Token {
            layout: Some(&PAGE_OFFSET),
            extract: Some(handlers::extract_page_offset),
            ..tok("candidate", TokenKind::End)
        });
        set(0x64, Token {
            layout: Some(&PAGE_OFFSET),
            extract: Some(handlers::extract_page_offset),
            ..tok("mono_graphic", TokenKind::End)
        });
        set(0x6a, tok("wave_sound", TokenKind::End));
        set(0x6b, tok("paged_reference", TokenKind::End));
        set(0x6c, tok("image_page", TokenKind::End));
        set(0x6d, tok("graphic", TokenKind::End));
        set(0x6f, tok("clickable", TokenKind::End));

        set(0xe0, Token {
            layout: Some(&DECORATION_START),
            extract: Some(handlers::extract_decoration),
            handler: Some(handlers::decoration_start),
            ..tok("decoration", TokenKind::Start)
        });
        set(0xe1, tok("decoration", TokenKind::End));

        for &code in SKIP_CODES {
            set(code, tok("skip_code", TokenKind::Skip { resume: skip_resume_code(code) }));
        }

        Ok(Registry { tokens })
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// The process-wide escape-code registry. Built and validated on first use;
/// idempotent and safe for concurrent read-only access afterwards.
pub fn registry() -> Result<&'static Registry> {
    if let Some(reg) = REGISTRY.get() {
        return Ok(reg);
    }
    let built = Registry::build()?;
    Ok(REGISTRY.get_or_init(|| built))
}
