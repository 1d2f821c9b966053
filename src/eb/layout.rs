//! Binary struct overlay layer.
//!
//! The on-disc format is a collection of fixed-width, big-endian, byte-packed
//! records: catalog headers, subbook descriptors, search-index tables and the
//! payloads carried by text escape tokens. A [`RecordLayout`] describes one
//! such record as an ordered field list; a [`RawRecord`] couples a layout
//! with the raw bytes and offers typed accessors.
//!
//! Every layout declares its on-disk size, and [`RecordLayout::validate`]
//! refuses any layout whose fields do not tile that size exactly. The
//! registry runs this check over every known layout at startup, so a drifted
//! format table fails fast instead of silently mis-slicing records.

use byteorder::{BigEndian, ByteOrder};

use super::charset::{self, Encoding};
use super::error::{EbError, Result};

/// How a field's raw bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Plain big-endian unsigned integer, 1, 2 or 4 bytes wide.
    UInt,
    /// 3-byte big-endian unsigned integer.
    U24,
    /// Binary-coded decimal, 2 or 4 bytes wide.
    Bcd,
    /// Fixed-length encoded string, NUL-truncated.
    Str,
    /// Opaque bytes (payload data, padding, fields with unknown meaning).
    Bytes,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub offset: usize,
    pub width: usize,
    pub kind: FieldKind,
}

/// Declarative description of one fixed-size on-disk record.
#[derive(Debug)]
pub struct RecordLayout {
    pub name: &'static str,
    /// Declared on-disk size in bytes. Escape-token payload layouts include
    /// the 2 leading code bytes, matching how the records appear on disc.
    pub size: usize,
    pub fields: &'static [FieldDef],
}

impl RecordLayout {
    /// Checks that the field list tiles the declared size exactly: fields
    /// are contiguous from offset 0, widths are legal for their kind, and
    /// the total equals `size`.
    pub fn validate(&self) -> Result<()> {
        let mut end = 0usize;
        for field in self.fields {
            let width_ok = match field.kind {
                FieldKind::UInt => matches!(field.width, 1 | 2 | 4),
                FieldKind::U24 => field.width == 3,
                FieldKind::Bcd => matches!(field.width, 2 | 4),
                FieldKind::Str | FieldKind::Bytes => field.width > 0,
            };
            if field.offset != end || !width_ok {
                return Err(EbError::Layout {
                    layout: self.name,
                    declared: self.size,
                    computed: field.offset + field.width,
                });
            }
            end = field.offset + field.width;
        }
        if end != self.size {
            return Err(EbError::Layout {
                layout: self.name,
                declared: self.size,
                computed: end,
            });
        }
        Ok(())
    }

    fn field(&self, name: &str) -> Result<&FieldDef> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or(EbError::Layout {
                layout: self.name,
                declared: self.size,
                computed: 0,
            })
    }
}

/// Decode a big-endian BCD field: each nibble is one decimal digit, most
/// significant first. 2 bytes yield 0..=9999, 4 bytes 0..=99999999.
///
/// Nibble values of 10 or more are out of contract for the format; they
/// produce an unspecified value without panicking, mirroring the on-disc
/// convention of not validating these fields.
pub fn bcd_decode(bytes: &[u8]) -> u64 {
    let mut value = 0u64;
    for b in bytes {
        value = value * 100 + ((b >> 4) & 0x0f) as u64 * 10 + (b & 0x0f) as u64;
    }
    value
}

/// A fixed-size record overlaid on a byte buffer.
///
/// Accessors look fields up by name and fail with a layout error when asked
/// for a field under the wrong kind, which again indicates a format-table
/// bug rather than corrupt data.
pub struct RawRecord<'a> {
    layout: &'static RecordLayout,
    bytes: &'a [u8],
}

impl<'a> RawRecord<'a> {
    pub fn new(layout: &'static RecordLayout, bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() != layout.size {
            return Err(EbError::InvalidFormat(format!(
                "Record {} needs {} bytes, got {}",
                layout.name,
                layout.size,
                bytes.len()
            )));
        }
        Ok(Self { layout, bytes })
    }

    pub fn layout(&self) -> &'static RecordLayout {
        self.layout
    }

    fn slice(&self, field: &FieldDef) -> &'a [u8] {
        &self.bytes[field.offset..field.offset + field.width]
    }

    /// Plain unsigned integer field (`UInt` or `U24`).
    pub fn uint(&self, name: &str) -> Result<u64> {
        let field = self.layout.field(name)?;
        let raw = self.slice(field);
        let value = match field.kind {
            FieldKind::UInt => match field.width {
                1 => raw[0] as u64,
                2 => BigEndian::read_u16(raw) as u64,
                4 => BigEndian::read_u32(raw) as u64,
                _ => {
                    return Err(EbError::Layout {
                        layout: self.layout.name,
                        declared: self.layout.size,
                        computed: field.offset,
                    })
                }
            },
            FieldKind::U24 => BigEndian::read_u24(raw) as u64,
            _ => {
                return Err(EbError::Layout {
                    layout: self.layout.name,
                    declared: self.layout.size,
                    computed: field.offset,
                })
            }
        };
        Ok(value)
    }

    /// Binary-coded-decimal field.
    pub fn bcd(&self, name: &str) -> Result<u64> {
        let field = self.layout.field(name)?;
        if field.kind != FieldKind::Bcd {
            return Err(EbError::Layout {
                layout: self.layout.name,
                declared: self.layout.size,
                computed: field.offset,
            });
        }
        Ok(bcd_decode(self.slice(field)))
    }

    /// Raw bytes of any field.
    pub fn bytes(&self, name: &str) -> Result<&'a [u8]> {
        Ok(self.slice(self.layout.field(name)?))
    }

    /// Fixed-length encoded string field: NUL-truncated, decoded under the
    /// given encoding, trailing whitespace trimmed.
    pub fn str(&self, name: &str, encoding: Encoding) -> Result<String> {
        let field = self.layout.field(name)?;
        if field.kind != FieldKind::Str {
            return Err(EbError::Layout {
                layout: self.layout.name,
                declared: self.layout.size,
                computed: field.offset,
            });
        }
        Ok(charset::decode_fixed(self.slice(field), encoding))
    }
}
