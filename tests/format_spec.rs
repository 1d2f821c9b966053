//! Layout, charset, catalog and search-index tests against in-memory
//! fixtures.

use eb_reader::eb::catalog::{self, BookType};
use eb_reader::eb::charset;
use eb_reader::eb::indices::{
    self, derive_policy, STYLE_ASIS, STYLE_CONVERT, STYLE_DELETE,
};
use eb_reader::eb::layout::{bcd_decode, FieldDef, FieldKind, RecordLayout};
use eb_reader::eb::registry;
use eb_reader::{Book, EbError, Encoding, SearchKey, SubbookText, ZioMemory};

const PAGE: usize = 2048;

fn index_entry(index_id: u8, start_page: u32, page_count: u32, availability: u8, flags: u32) -> [u8; 16] {
    let mut entry = [0u8; 16];
    entry[0] = index_id;
    entry[2..6].copy_from_slice(&start_page.to_be_bytes());
    entry[6..10].copy_from_slice(&page_count.to_be_bytes());
    entry[10] = availability;
    entry[11..14].copy_from_slice(&flags.to_be_bytes()[1..]);
    entry
}

fn index_page(global: u8, entries: &[[u8; 16]]) -> Vec<u8> {
    assert!(entries.len() < 127);
    let mut page = vec![0u8; PAGE];
    page[1] = entries.len() as u8;
    page[4] = global;
    for (i, entry) in entries.iter().enumerate() {
        let at = 16 + i * 16;
        page[at..at + 16].copy_from_slice(entry);
    }
    page
}

fn load_indices(global: u8, entries: &[[u8; 16]], encoding: Encoding, book_type: BookType) -> indices::SearchTable {
    let mut zio = ZioMemory::new(index_page(global, entries));
    let (table, _) = indices::load(&mut zio, 1, encoding, book_type, true).expect("index load");
    table
}

#[test]
fn bcd_concatenates_decimal_nibbles() {
    assert_eq!(bcd_decode(&[0x12, 0x34]), 1234);
    assert_eq!(bcd_decode(&[0x00, 0x07]), 7);
    assert_eq!(bcd_decode(&[0x99, 0x99]), 9999);
    assert_eq!(bcd_decode(&[0x00, 0x00, 0x01, 0x23]), 123);
    assert_eq!(bcd_decode(&[0x12, 0x34, 0x56, 0x78]), 12345678);
    // Nibbles >= 10 are out of contract: unspecified value, but no panic.
    let _ = bcd_decode(&[0xab, 0xcd]);
}

static GAPPED_FIELDS: [FieldDef; 2] = [
    FieldDef { name: "a", offset: 0, width: 2, kind: FieldKind::UInt },
    FieldDef { name: "b", offset: 4, width: 2, kind: FieldKind::UInt },
];
static GAPPED: RecordLayout = RecordLayout { name: "gapped", size: 6, fields: &GAPPED_FIELDS };

static SHORT_FIELDS: [FieldDef; 1] = [
    FieldDef { name: "a", offset: 0, width: 2, kind: FieldKind::UInt },
];
static SHORT: RecordLayout = RecordLayout { name: "short", size: 4, fields: &SHORT_FIELDS };

#[test]
fn layout_self_check_rejects_drifted_tables() {
    assert!(matches!(GAPPED.validate(), Err(EbError::Layout { .. })));
    assert!(matches!(SHORT.validate(), Err(EbError::Layout { .. })));
}

#[test]
fn registry_validates_every_layout_at_init() {
    let reg = registry::registry().expect("registry init");
    // Spot-check the table: text start/end, a skip code, a payload layout.
    assert!(reg.token(0x02).is_some());
    assert!(reg.token(0x03).is_some());
    assert!(reg.token(0x14).is_some());
    assert_eq!(reg.token(0x62).and_then(|t| t.layout).map(|l| l.size), Some(8));
    assert!(reg.token(0x08).is_none());
}

#[test]
fn fixed_strings_truncate_at_nul_and_trim() {
    assert_eq!(charset::decode_fixed(b"honmon\0\0", Encoding::Iso8859_1), "honmon");
    assert_eq!(charset::decode_fixed(b"abc   ", Encoding::Iso8859_1), "abc");
    assert_eq!(charset::decode_fixed(b"\0zzzz", Encoding::Iso8859_1), "");
}

#[test]
fn jis_and_gb_pairs_decode() {
    assert_eq!(charset::decode_pair(Encoding::JisX0208, 0x25, 0x22, false), Some('ア'));
    assert_eq!(charset::decode_pair(Encoding::JisX0208, 0x30, 0x21, false), Some('亜'));
    assert_eq!(charset::decode_pair(Encoding::JisX0208, 0x23, 0x41, false), Some('Ａ'));
    // Outside the JIS plane nothing is emitted for a plain JIS book.
    assert_eq!(charset::decode_pair(Encoding::JisX0208, 0x30, 0xa1, false), None);
    // The hybrid encoding reinterprets the same pair as GB 2312.
    assert_eq!(charset::decode_pair(Encoding::JisX0208Gb2312, 0x30, 0xa1, false), Some('啊'));
    // Book-local characters have no standard mapping.
    assert_eq!(
        charset::decode_pair(Encoding::JisX0208Gb2312, 0xa1, 0x21, false),
        Some(charset::LOCAL_CHARACTER_PLACEHOLDER)
    );
    assert_eq!(
        charset::decode_pair(Encoding::JisX0208Gb2312, 0xa1, 0x21, true),
        Some(charset::LOCAL_CHARACTER_PLACEHOLDER)
    );
}

#[test]
fn wide_narrow_mapping_round_trips() {
    assert_eq!(charset::to_narrow("ｔｅｓｔ"), "test");
    assert_eq!(charset::to_wide("test"), "ｔｅｓｔ");
    assert_eq!(charset::to_narrow("アイウエオ"), "ｱｲｳｴｵ");
    assert_eq!(charset::to_wide("ｱｲｳｴｵ"), "アイウエオ");
    // Unmapped characters pass through.
    assert_eq!(charset::to_narrow("語 x"), "語 x");
}

#[test]
fn language_codes_map_to_encodings() {
    assert_eq!(Encoding::from_language_code(1).unwrap(), Encoding::Iso8859_1);
    assert_eq!(Encoding::from_language_code(2).unwrap(), Encoding::JisX0208);
    assert_eq!(Encoding::from_language_code(3).unwrap(), Encoding::JisX0208Gb2312);
    assert!(matches!(
        Encoding::from_language_code(4),
        Err(EbError::UnsupportedEncoding(4))
    ));
}

// --- Search-index decoding -------------------------------------------------

#[test]
fn flag_bits_drive_policy_when_globally_available() {
    // Scenario: global availability 2, text index, top two flag bits 01.
    let policy = derive_policy(2, 0x00, 0, 0x400000, Encoding::JisX0208);
    assert_eq!(policy.katakana, 1);

    let table = load_indices(
        2,
        &[index_entry(0x00, 5, 3, 0, 0x400000)],
        Encoding::JisX0208,
        BookType::Epwing,
    );
    let method = table.get(SearchKey::Text).expect("text search");
    assert_eq!(method.policy.katakana, 1);
    assert_eq!(method.start_page, 5);
    assert_eq!(method.end_page, 7);
}

#[test]
fn policy_derivation_is_pure() {
    let a = derive_policy(0, 0x91, 2, 0xc0ffee, Encoding::JisX0208);
    let b = derive_policy(0, 0x91, 2, 0xc0ffee, Encoding::JisX0208);
    assert_eq!(a, b);

    // When the flag branch does not apply, flags must not influence the
    // result.
    let c = derive_policy(1, 0x91, 0, 0x000000, Encoding::JisX0208);
    let d = derive_policy(1, 0x91, 0, 0xffffff, Encoding::JisX0208);
    assert_eq!(c, d);
}

#[test]
fn kana_indices_force_conversion() {
    let policy = derive_policy(1, 0x70, 0, 0, Encoding::JisX0208);
    assert_eq!(policy.katakana, STYLE_CONVERT);
    assert_eq!(policy.lower, STYLE_CONVERT);
    assert_eq!(policy.mark, STYLE_DELETE);
    assert_eq!(policy.p_sound, STYLE_CONVERT);

    let fallback = derive_policy(1, 0x91, 0, 0, Encoding::JisX0208);
    assert_eq!(fallback.katakana, STYLE_ASIS);
    assert_eq!(fallback.lower, STYLE_CONVERT);
    assert_eq!(fallback.mark, STYLE_ASIS);
}

#[test]
fn space_rule_follows_encoding_and_alphabet_indices() {
    assert_eq!(derive_policy(1, 0x00, 0, 0, Encoding::Iso8859_1).space, STYLE_ASIS);
    assert_eq!(derive_policy(1, 0x72, 0, 0, Encoding::JisX0208).space, STYLE_ASIS);
    assert_eq!(derive_policy(1, 0x92, 0, 0, Encoding::JisX0208).space, STYLE_ASIS);
    assert_eq!(derive_policy(1, 0x00, 0, 0, Encoding::JisX0208).space, STYLE_DELETE);
}

#[test]
fn out_of_range_global_availability_is_zero() {
    // global 5 acts as 0, so an entry with availability 2 still gets the
    // flag-driven branch.
    let table = load_indices(
        5,
        &[index_entry(0x80, 1, 1, 2, 0x400000)],
        Encoding::JisX0208,
        BookType::Epwing,
    );
    assert_eq!(table.get(SearchKey::Keyword).unwrap().policy.katakana, 1);
}

#[test]
fn multi_entries_accumulate_in_order() {
    let table = load_indices(
        0,
        &[
            index_entry(0xff, 10, 1, 0, 0),
            index_entry(0xff, 20, 1, 0, 0),
            index_entry(0x00, 30, 1, 0, 0),
        ],
        Encoding::JisX0208,
        BookType::Epwing,
    );
    assert_eq!(table.multi.len(), 2);
    assert_eq!(table.multi[0].start_page, 10);
    assert_eq!(table.multi[1].start_page, 20);
    assert_eq!(table.get(SearchKey::Text).unwrap().start_page, 30);
}

#[test]
fn unknown_and_misgated_index_ids_are_dropped() {
    let table = load_indices(
        0,
        &[
            index_entry(0x55, 1, 1, 0, 0),
            // EB-only font entry on an EPWING book.
            index_entry(0xf1, 2, 1, 0, 0),
        ],
        Encoding::JisX0208,
        BookType::Epwing,
    );
    assert!(table.is_empty());

    let eb_table = load_indices(
        0,
        &[index_entry(0xf1, 2, 1, 0, 0), index_entry(0xf2, 3, 1, 0, 0)],
        Encoding::JisX0208,
        BookType::Eb,
    );
    assert_eq!(eb_table.get(SearchKey::WideFont(0)).unwrap().start_page, 2);
    assert_eq!(eb_table.get(SearchKey::NarrowFont(0)).unwrap().start_page, 3);
}

#[test]
fn overlong_index_count_yields_empty_table() {
    let mut page = index_page(0, &[]);
    page[1] = 127;
    let mut zio = ZioMemory::new(page);
    let (table, _) = indices::load(&mut zio, 1, Encoding::JisX0208, BookType::Epwing, true).unwrap();
    assert!(table.is_empty());
}

// --- Catalog decoding ------------------------------------------------------

fn epwing_catalog(entries: &[(&str, &str, u16)], resources: &[Option<&str>]) -> Vec<u8> {
    let mut data = vec![0u8; 16];
    data[0..2].copy_from_slice(&(entries.len() as u16).to_be_bytes());
    data[2..4].copy_from_slice(&5u16.to_be_bytes());

    for &(title, directory, index_page) in entries {
        let mut entry = [0u8; 164];
        entry[2..2 + title.len()].copy_from_slice(title.as_bytes());
        entry[82..82 + directory.len()].copy_from_slice(directory.as_bytes());
        entry[94..96].copy_from_slice(&index_page.to_be_bytes());
        data.extend_from_slice(&entry);
    }
    for filename in resources {
        let mut record = [0u8; 164];
        if let Some(filename) = filename {
            record[3] = 1;
            record[4..4 + filename.len()].copy_from_slice(filename.as_bytes());
            // zio codes stay 0x00 (plain)
        }
        data.extend_from_slice(&record);
    }
    data
}

#[test]
fn epwing_catalog_yields_descriptors_and_resources() {
    let data = epwing_catalog(
        &[("TEST BOOK", "test", 12), ("OTHER", "other", 0)],
        &[Some("start"), None],
    );
    let mut zio = ZioMemory::new(data);
    let catalog = catalog::parse(&mut zio, BookType::Epwing, Encoding::Iso8859_1).unwrap();

    assert_eq!(catalog.header.subbook_count, 2);
    assert_eq!(catalog.header.epwing_version, Some(5));
    assert_eq!(catalog.subbooks.len(), 2);

    let first = catalog.subbooks[0].as_ref().unwrap();
    assert_eq!(first.title, "TEST BOOK");
    assert_eq!(first.directory, "test");
    assert_eq!(first.index_page, 12);
    assert_eq!(first.text_filename.as_deref(), Some("start"));

    // The second record was flagged invalid, so no filename was attached.
    let second = catalog.subbooks[1].as_ref().unwrap();
    assert_eq!(second.index_page, 0);
    assert_eq!(second.text_filename, None);
}

#[test]
fn catalog_rejects_absurd_subbook_counts() {
    let mut data = vec![0u8; 16];
    data[0..2].copy_from_slice(&200u16.to_be_bytes());
    let mut zio = ZioMemory::new(data);
    assert!(matches!(
        catalog::parse(&mut zio, BookType::Epwing, Encoding::Iso8859_1),
        Err(EbError::InvalidFormat(_))
    ));
}

#[test]
fn eb_descriptors_fail_per_subbook() {
    let mut data = vec![0u8; 16];
    data[0..2].copy_from_slice(&1u16.to_be_bytes());
    data.extend_from_slice(&[0u8; 164]);
    let mut zio = ZioMemory::new(data);
    let catalog = catalog::parse(&mut zio, BookType::Eb, Encoding::JisX0208).unwrap();
    assert_eq!(catalog.subbooks.len(), 1);
    assert!(catalog.subbooks[0].is_err());
}

#[test]
fn index_load_seeks_to_the_descriptor_page() {
    // A subbook whose catalog record says index_page=12 must read its index
    // table from byte (12-1)*2048 = 22528.
    let data = epwing_catalog(&[("TEST BOOK", "test", 12)], &[Some("honmon")]);
    let mut zio = ZioMemory::new(data);
    let catalog = catalog::parse(&mut zio, BookType::Epwing, Encoding::Iso8859_1).unwrap();
    let descriptor = catalog.subbooks[0].as_ref().unwrap();
    assert_eq!(descriptor.index_page, 12);

    let mut stream = vec![0u8; 11 * PAGE];
    stream.extend_from_slice(&index_page(0, &[index_entry(0x00, 15, 2, 0, 0)]));
    assert_eq!(stream.len(), 12 * PAGE);

    let mut text = SubbookText::new(
        ZioMemory::new(stream),
        descriptor.index_page as u32,
        Encoding::Iso8859_1,
        BookType::Epwing,
    )
    .expect("subbook text");

    // One entry parsed from the table at 22528: seek target was honored.
    let method = text.searches().get(SearchKey::Text).expect("text search");
    assert_eq!(method.start_page, 15);
    assert_eq!(method.end_page, 16);
    // Position sits right after the header and the single entry.
    assert_eq!(text.stream_position().unwrap(), 22528 + 16 + 16);
}

#[test]
fn book_open_isolates_failed_subbooks() {
    use std::fs;

    let dir = std::env::temp_dir().join(format!("eb_reader_spec_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(dir.join("sub1").join("data")).unwrap();

    // Two subbooks in the catalog; only sub1 has a text file on disk.
    let data = epwing_catalog(
        &[("FIRST", "sub1", 1), ("SECOND", "missing", 1)],
        &[Some("honmon"), Some("honmon")],
    );
    fs::write(dir.join("catalogs"), data).unwrap();
    fs::write(dir.join("language"), 1u16.to_be_bytes()).unwrap();
    fs::write(
        dir.join("sub1").join("data").join("honmon"),
        index_page(0, &[index_entry(0x00, 2, 1, 0, 0)]),
    )
    .unwrap();

    let book = Book::open(&dir).unwrap();
    assert!(book.is_epwing());
    assert_eq!(book.encoding(), Encoding::Iso8859_1);

    // The broken subbook is reported in place; its sibling loads.
    assert_eq!(book.subbook_results().len(), 2);
    assert!(book.subbook_results()[0].is_ok());
    assert!(matches!(book.subbook_results()[1], Err(EbError::NotFound(_))));
    assert_eq!(book.subbooks().count(), 1);

    let first = book.subbooks().next().unwrap();
    assert_eq!(first.title, "FIRST");
    assert!(first.text().unwrap().searches().get(SearchKey::Text).is_some());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn search_table_reports_registered_methods() {
    let table = load_indices(
        0,
        &[
            index_entry(0x00, 1, 1, 0, 0),
            index_entry(0x80, 2, 1, 0, 0),
            index_entry(0x90, 3, 1, 0, 0),
        ],
        Encoding::JisX0208,
        BookType::Epwing,
    );
    assert_eq!(table.len(), 3);
    let mut keys: Vec<_> = table.iter().map(|(k, _)| *k).collect();
    keys.sort_by_key(|k| format!("{:?}", k));
    assert_eq!(keys, vec![SearchKey::Keyword, SearchKey::Text, SearchKey::WordKana]);
}
