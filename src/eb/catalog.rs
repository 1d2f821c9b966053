//! Catalog file records: the disc header, subbook descriptors and the
//! EPWING resource records that follow them.
//!
//! Both disc families use a fixed 16-byte catalog header and 164-byte
//! descriptor records. EPWING catalogs append one further 164-byte resource
//! record per subbook naming the text file and any sound/graphic streams.

use log::debug;

use super::charset::{self, Encoding};
use super::error::{EbError, Result};
use super::layout::{FieldDef, FieldKind, RawRecord, RecordLayout};
use super::zio::Zio;

pub const MAX_SUBBOOKS: usize = 50;

const SUBBOOK_RECORD_SIZE: usize = 164;
const DIRECTORY_NAME_LENGTH: usize = 8;

/// The two disc families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookType {
    Eb,
    Epwing,
}

impl BookType {
    pub fn label(&self) -> &'static str {
        match self {
            BookType::Eb => "eb",
            BookType::Epwing => "epwing",
        }
    }
}

static CATALOG_HEADER_FIELDS: [FieldDef; 3] = [
    FieldDef { name: "subbook_count", offset: 0, width: 2, kind: FieldKind::UInt },
    FieldDef { name: "epwing_version", offset: 2, width: 2, kind: FieldKind::UInt },
    FieldDef { name: "unknown", offset: 4, width: 12, kind: FieldKind::Bytes },
];
pub static CATALOG_HEADER: RecordLayout = RecordLayout {
    name: "catalog_header",
    size: 16,
    fields: &CATALOG_HEADER_FIELDS,
};

static EPWING_CATALOG_ENTRY_FIELDS: [FieldDef; 8] = [
    FieldDef { name: "head", offset: 0, width: 2, kind: FieldKind::UInt },
    FieldDef { name: "title", offset: 2, width: 80, kind: FieldKind::Str },
    FieldDef { name: "directory", offset: 82, width: 8, kind: FieldKind::Str },
    FieldDef { name: "unknown0", offset: 90, width: 4, kind: FieldKind::Bytes },
    FieldDef { name: "index_page", offset: 94, width: 2, kind: FieldKind::UInt },
    FieldDef { name: "unknown1", offset: 96, width: 4, kind: FieldKind::Bytes },
    FieldDef { name: "wide_fonts", offset: 100, width: 32, kind: FieldKind::Bytes },
    FieldDef { name: "narrow_fonts", offset: 132, width: 32, kind: FieldKind::Bytes },
];
pub static EPWING_CATALOG_ENTRY: RecordLayout = RecordLayout {
    name: "epwing_catalog_entry",
    size: SUBBOOK_RECORD_SIZE,
    fields: &EPWING_CATALOG_ENTRY_FIELDS,
};

// EB descriptor records occupy the same 164 bytes but no field of them is
// decoded here; see DESIGN.md.
static EB_CATALOG_ENTRY_FIELDS: [FieldDef; 1] = [
    FieldDef { name: "unknown", offset: 0, width: SUBBOOK_RECORD_SIZE, kind: FieldKind::Bytes },
];
pub static EB_CATALOG_ENTRY: RecordLayout = RecordLayout {
    name: "eb_catalog_entry",
    size: SUBBOOK_RECORD_SIZE,
    fields: &EB_CATALOG_ENTRY_FIELDS,
};

static EPWING_RESOURCE_FIELDS: [FieldDef; 11] = [
    FieldDef { name: "header", offset: 0, width: 3, kind: FieldKind::Bytes },
    FieldDef { name: "valid", offset: 3, width: 1, kind: FieldKind::UInt },
    FieldDef { name: "text_filename", offset: 4, width: 8, kind: FieldKind::Str },
    FieldDef { name: "unknown0", offset: 12, width: 29, kind: FieldKind::Bytes },
    FieldDef { name: "resource_types", offset: 41, width: 2, kind: FieldKind::Bytes },
    FieldDef { name: "unknown1", offset: 43, width: 1, kind: FieldKind::Bytes },
    FieldDef { name: "resource_path2", offset: 44, width: 8, kind: FieldKind::Str },
    FieldDef { name: "unknown2", offset: 52, width: 1, kind: FieldKind::Bytes },
    FieldDef { name: "zio_codes", offset: 53, width: 3, kind: FieldKind::Bytes },
    FieldDef { name: "resource_path1", offset: 56, width: 8, kind: FieldKind::Str },
    FieldDef { name: "padding", offset: 64, width: 100, kind: FieldKind::Bytes },
];
pub static EPWING_RESOURCE: RecordLayout = RecordLayout {
    name: "epwing_resource",
    size: SUBBOOK_RECORD_SIZE,
    fields: &EPWING_RESOURCE_FIELDS,
};

/// Storage codec tag of an auxiliary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageCodec {
    Plain,
    Epwing,
    Epwing6,
}

fn codec_from(code: u8) -> Option<StorageCodec> {
    match code {
        0x00 => Some(StorageCodec::Plain),
        0x11 => Some(StorageCodec::Epwing),
        0x12 => Some(StorageCodec::Epwing6),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Sound,
    Graphic,
}

fn resource_kind_from(value: u8) -> Option<ResourceKind> {
    match value & 3 {
        1 => Some(ResourceKind::Sound),
        2 => Some(ResourceKind::Graphic),
        _ => None,
    }
}

/// An auxiliary data stream declared by an EPWING resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub kind: ResourceKind,
    pub path: String,
    pub codec: Option<StorageCodec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogHeader {
    pub subbook_count: u16,
    pub epwing_version: Option<u16>,
}

/// Raw typed fields of one subbook, as read from the catalog. Immutable
/// after catalog load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubbookDescriptor {
    pub title: String,
    pub directory: String,
    pub index_page: u16,
    pub wide_fonts: Vec<String>,
    pub narrow_fonts: Vec<String>,
    pub text_filename: Option<String>,
    pub resources: Vec<Resource>,
}

#[derive(Debug)]
pub struct Catalog {
    pub book_type: BookType,
    pub header: CatalogHeader,
    /// Per-subbook parse results; a malformed descriptor never aborts its
    /// siblings.
    pub subbooks: Vec<Result<SubbookDescriptor>>,
}

/// Parse a whole catalog file from the start of the provider.
pub fn parse(zio: &mut dyn Zio, book_type: BookType, encoding: Encoding) -> Result<Catalog> {
    zio.open()?;
    zio.seek_absolute(0)?;

    let mut header_buf = [0u8; 16];
    zio.read_into(&mut header_buf)?;
    let header_rec = RawRecord::new(&CATALOG_HEADER, &header_buf)?;

    let subbook_count = header_rec.uint("subbook_count")? as u16;
    let epwing_version = match book_type {
        BookType::Epwing => Some(header_rec.uint("epwing_version")? as u16),
        BookType::Eb => None,
    };
    debug!("Subbook count {}", subbook_count);
    if let Some(version) = epwing_version {
        debug!("EPWing version {}", version);
    }

    if subbook_count as usize > MAX_SUBBOOKS {
        return Err(EbError::InvalidFormat(format!(
            "Catalog declares {} subbooks (limit {})",
            subbook_count, MAX_SUBBOOKS
        )));
    }

    let mut subbooks = Vec::with_capacity(subbook_count as usize);
    let mut entry_buf = [0u8; SUBBOOK_RECORD_SIZE];
    for i in 0..subbook_count {
        zio.read_into(&mut entry_buf)?;
        let descriptor = match book_type {
            BookType::Epwing => parse_epwing_entry(&entry_buf, encoding),
            BookType::Eb => Err(EbError::InvalidFormat(
                "EB catalog descriptors are not supported".to_string(),
            )),
        };
        if let Ok(descriptor) = &descriptor {
            debug!("Subbook {}: {:?}", i + 1, descriptor.title);
        }
        subbooks.push(descriptor);
    }

    // EPWING catalogs follow the descriptors with one resource record per
    // subbook; read them all to keep the stream aligned even when a
    // descriptor failed to parse.
    if book_type == BookType::Epwing {
        for descriptor in subbooks.iter_mut() {
            zio.read_into(&mut entry_buf)?;
            let resource = parse_resource_record(&entry_buf)?;
            if let (Ok(descriptor), Some(resource)) = (descriptor, resource) {
                debug!("Subbook text filename: {}", resource.text_filename);
                descriptor.text_filename = Some(resource.text_filename);
                descriptor.resources = resource.resources;
            }
        }
    }

    Ok(Catalog {
        book_type,
        header: CatalogHeader {
            subbook_count,
            epwing_version,
        },
        subbooks,
    })
}

fn parse_epwing_entry(bytes: &[u8], encoding: Encoding) -> Result<SubbookDescriptor> {
    let rec = RawRecord::new(&EPWING_CATALOG_ENTRY, bytes)?;
    Ok(SubbookDescriptor {
        title: rec.str("title", encoding)?,
        directory: rec.str("directory", Encoding::Iso8859_1)?,
        index_page: rec.uint("index_page")? as u16,
        wide_fonts: font_list(rec.bytes("wide_fonts")?),
        narrow_fonts: font_list(rec.bytes("narrow_fonts")?),
        text_filename: None,
        resources: Vec::new(),
    })
}

fn font_list(bytes: &[u8]) -> Vec<String> {
    bytes
        .chunks_exact(DIRECTORY_NAME_LENGTH)
        .map(|chunk| charset::decode_fixed(chunk, Encoding::Iso8859_1))
        .filter(|name| !name.is_empty())
        .collect()
}

struct ResourceRecord {
    text_filename: String,
    resources: Vec<Resource>,
}

/// Decode one resource record; `None` when the record is flagged invalid or
/// its text stream's codec tag is unknown.
fn parse_resource_record(bytes: &[u8]) -> Result<Option<ResourceRecord>> {
    let rec = RawRecord::new(&EPWING_RESOURCE, bytes)?;

    let codes = rec.bytes("zio_codes")?;
    if rec.uint("valid")? == 0 || codec_from(codes[2]).is_none() {
        return Ok(None);
    }

    let kinds = rec.bytes("resource_types")?;
    let paths = [
        rec.str("resource_path1", Encoding::Iso8859_1)?,
        rec.str("resource_path2", Encoding::Iso8859_1)?,
    ];

    let resources = kinds
        .iter()
        .zip(paths)
        .zip(codes)
        .filter_map(|((&kind, path), &code)| {
            resource_kind_from(kind).map(|kind| Resource {
                kind,
                path,
                codec: codec_from(code),
            })
        })
        .collect();

    Ok(Some(ResourceRecord {
        text_filename: rec.str("text_filename", Encoding::Iso8859_1)?,
        resources,
    }))
}
