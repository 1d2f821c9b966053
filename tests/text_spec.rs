//! Text decoding state machine tests against synthetic byte streams.
//!
//! Each stream sits at page 2 of an in-memory source; page 1 holds an empty
//! search-index table so the subbook opens cleanly.

use eb_reader::eb::catalog::BookType;
use eb_reader::{
    EbError, Encoding, NodeItem, ReadOptions, SectionKind, SectionNode, StopCode, SubbookText,
    Value, ZioMemory,
};

const PAGE: usize = 2048;
const ESC: u8 = 0x1f;

fn source(stream: &[u8], encoding: Encoding, book_type: BookType) -> SubbookText<ZioMemory> {
    // Page 1: index table with zero entries. Page 2: the text stream.
    let mut data = vec![0u8; PAGE];
    data.extend_from_slice(stream);
    SubbookText::new(ZioMemory::new(data), 1, encoding, book_type).expect("subbook text")
}

fn read_all(text: &mut SubbookText<ZioMemory>) -> Vec<SectionNode> {
    text.read(&ReadOptions::at(2, 0))
        .expect("read")
        .map(|r| r.expect("section ok"))
        .collect()
}

fn text_run(s: &str) -> NodeItem {
    NodeItem::Text(s.to_string())
}

#[test]
fn ascii_text_section_decodes_and_hard_stops() {
    // Open text, two ASCII bytes, close text.
    let stream = [ESC, 0x02, b'A', b'B', ESC, 0x03];
    let mut text = source(&stream, Encoding::Iso8859_1, BookType::Epwing);

    let nodes = read_all(&mut text);
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].name, "text");
    assert_eq!(nodes[0].kind, SectionKind::Section);
    assert_eq!(nodes[0].data, vec![text_run("AB")]);

    // The hard stop rewound the stream onto the closing token.
    assert_eq!(text.stream_position().unwrap(), PAGE as u64 + 4);
}

#[test]
fn repeated_reads_yield_identical_trees() {
    let stream = [
        ESC, 0x02, b'H', b'i', //
        ESC, 0x09, 0x00, 0x05, // set_indent directive
        b'!', //
        ESC, 0x03,
    ];
    let mut text = source(&stream, Encoding::Iso8859_1, BookType::Epwing);

    let first = read_all(&mut text);
    let second = read_all(&mut text);
    assert_eq!(first, second);

    let root = &first[0];
    assert_eq!(root.data.len(), 3);
    assert_eq!(root.data[0], text_run("Hi"));
    match &root.data[1] {
        NodeItem::Node(directive) => {
            assert_eq!(directive.name, "set_indent");
            assert_eq!(directive.kind, SectionKind::Directive);
            assert_eq!(directive.info.get("indent"), Some(&Value::UInt(5)));
        }
        other => panic!("expected a directive node, got {:?}", other),
    }
    assert_eq!(root.data[2], text_run("!"));
}

#[test]
fn well_formed_stream_leaves_no_open_sections() {
    // Sections all close before end of stream; the read ends at EOF.
    let stream = [
        ESC, 0x12, b'A', //
        ESC, 0x06, b'b', ESC, 0x07, // nested subscript
        ESC, 0x13,
    ];
    let mut text = source(&stream, Encoding::Iso8859_1, BookType::Epwing);
    let mut iter = text.read(&ReadOptions::at(2, 0)).unwrap();

    let mut names = Vec::new();
    for result in iter.by_ref() {
        names.push(result.unwrap().name);
    }
    assert_eq!(names, vec!["subscript", "emphasis"]);
    assert_eq!(iter.context().open_section_depth(), 0);
}

#[test]
fn bytes_outside_sections_are_discarded_bytewise() {
    // Leading junk is odd-length, so the text start token straddles a
    // 2-byte unit boundary.
    let stream = [b'z', b'z', b'z', ESC, 0x02, b'A', ESC, 0x03];
    let mut text = source(&stream, Encoding::Iso8859_1, BookType::Epwing);
    let nodes = read_all(&mut text);
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].data, vec![text_run("A")]);
}

#[test]
fn jis_pairs_coalesce_into_one_run() {
    let stream = [ESC, 0x02, 0x30, 0x21, 0x30, 0x21, 0x25, 0x22, ESC, 0x03];
    let mut text = source(&stream, Encoding::JisX0208, BookType::Epwing);
    let nodes = read_all(&mut text);
    assert_eq!(nodes[0].data, vec![text_run("亜亜ア")]);
}

#[test]
fn unknown_escape_codes_are_filler() {
    let stream = [ESC, 0x02, b'A', ESC, 0x99, b'B', ESC, 0x03];
    let mut text = source(&stream, Encoding::Iso8859_1, BookType::Epwing);
    let nodes = read_all(&mut text);
    assert_eq!(nodes[0].data, vec![text_run("AB")]);
}

#[test]
fn keyword_records_auto_stop_code_then_soft_stops() {
    // First keyword records the stop word; the second, arriving after
    // printable output with the same stop word, soft-stops the read before
    // any node is appended.
    let stream = [
        ESC, 0x02, b'H', b'I', //
        ESC, 0x41, 0x00, 0x0a, b'K', ESC, 0x61, //
        b'X', b'Y', //
        ESC, 0x41, 0x00, 0x0a, //
        b'Z', ESC, 0x03, // never reached
    ];
    let mut text = source(&stream, Encoding::Iso8859_1, BookType::Epwing);
    let mut iter = text.read(&ReadOptions::at(2, 0)).unwrap();

    let mut nodes = Vec::new();
    for result in iter.by_ref() {
        nodes.push(result.unwrap());
    }

    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].name, "keyword");
    assert_eq!(nodes[0].data, vec![text_run("K")]);
    assert_eq!(nodes[0].info.get("auto_stop_code"), Some(&Value::UInt(0x000a)));

    let ctx = iter.context();
    assert_eq!(ctx.auto_stop_code, Some(0x000a));
    assert_eq!(ctx.keyword_count, 1);
}

#[test]
fn appendix_stop_code_overrides_the_keyword_heuristic() {
    let stream = [
        ESC, 0x02, b'A', //
        ESC, 0x09, 0x00, 0x05, // set_indent matching the appendix stop code
        b'B', ESC, 0x03,
    ];
    let mut text = source(&stream, Encoding::Iso8859_1, BookType::Epwing);
    text.set_stop_code(Some(StopCode { code: 0x1f09, following: 5 }));

    let nodes = read_all(&mut text);
    // Soft stop before the directive: the open text section never finishes.
    assert!(nodes.is_empty());

    // Without printable output the same directive does not stop the read.
    let stream = [ESC, 0x02, ESC, 0x09, 0x00, 0x05, b'B', ESC, 0x03];
    let mut text = source(&stream, Encoding::Iso8859_1, BookType::Epwing);
    text.set_stop_code(Some(StopCode { code: 0x1f09, following: 5 }));
    let nodes = read_all(&mut text);
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].data[1], text_run("B"));
}

#[test]
fn armed_skip_code_suppresses_tokens_and_characters() {
    let stream = [
        ESC, 0x02, b'A', //
        ESC, 0x14, // arms skip until 0x15
        b'B', ESC, 0x41, 0x00, 0x00, // suppressed keyword
        ESC, 0x15, // disarm
        b'C', ESC, 0x03,
    ];
    let mut text = source(&stream, Encoding::Iso8859_1, BookType::Epwing);
    let nodes = read_all(&mut text);
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].name, "text");
    assert_eq!(nodes[0].data, vec![text_run("AC")]);
}

#[test]
fn degenerate_mono_graphic_is_discarded_through_its_end() {
    let stream = [
        ESC, 0x02, b'A', //
        ESC, 0x44, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // zero width and height
        b'B', // inside the discarded span
        ESC, 0x64, 0, 0, 0, 0, 0, 0, // end token payload, consumed silently
        b'C', ESC, 0x03,
    ];
    let mut text = source(&stream, Encoding::Iso8859_1, BookType::Epwing);
    let nodes = read_all(&mut text);
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].data, vec![text_run("AC")]);
}

#[test]
fn mono_graphic_with_geometry_keeps_its_payload_info() {
    let stream = [
        ESC, 0x02, //
        ESC, 0x44, 0, 0, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x03, //
        ESC, 0x64, 0x00, 0x00, 0x01, 0x23, 0x04, 0x56, //
        ESC, 0x03,
    ];
    let mut text = source(&stream, Encoding::Iso8859_1, BookType::Epwing);
    let nodes = read_all(&mut text);

    let graphic = &nodes[0];
    assert_eq!(graphic.name, "mono_graphic");
    assert_eq!(graphic.info.get("width"), Some(&Value::UInt(2)));
    assert_eq!(graphic.info.get("height"), Some(&Value::UInt(3)));
    assert_eq!(graphic.info.get("page"), Some(&Value::UInt(123)));
    assert_eq!(graphic.info.get("offset"), Some(&Value::UInt(456)));
    assert_eq!(graphic.info.get("is_leaf"), Some(&Value::Bool(false)));

    // The finished graphic also appears as a child of the text section.
    let root = &nodes[1];
    assert_eq!(root.name, "text");
    match &root.data[0] {
        NodeItem::Node(child) => assert_eq!(child, graphic),
        other => panic!("expected nested node, got {:?}", other),
    }
}

#[test]
fn reference_check_byte_pushes_back_trailing_bytes() {
    // arg_check != 0: the two bytes after it belong to the text.
    let stream = [
        ESC, 0x02, //
        ESC, 0x42, 0x01, b'A', //
        b'B', //
        ESC, 0x62, 0, 0, 0, 0, 0, 0, //
        ESC, 0x03,
    ];
    let mut text = source(&stream, Encoding::Iso8859_1, BookType::Eb);
    let nodes = read_all(&mut text);

    let reference = &nodes[0];
    assert_eq!(reference.name, "reference");
    assert_eq!(reference.data, vec![text_run("AB")]);
    assert_eq!(reference.info.get("is_leaf"), Some(&Value::Bool(true)));
}

#[test]
fn decoration_resolves_named_styles() {
    let stream = [
        ESC, 0x02, //
        ESC, 0xe0, 0x00, 0x03, b'X', ESC, 0xe1, //
        ESC, 0xe0, 0x00, 0x01, b'Y', ESC, 0xe1, //
        ESC, 0xe0, 0x00, 0x07, b'Z', ESC, 0xe1, //
        ESC, 0x03,
    ];
    let mut text = source(&stream, Encoding::Iso8859_1, BookType::Epwing);
    let nodes = read_all(&mut text);

    let styles: Vec<_> = nodes
        .iter()
        .filter(|n| n.name == "decoration")
        .map(|n| n.info.get("decoration_type").cloned())
        .collect();
    assert_eq!(
        styles,
        vec![
            Some(Value::Str("bold")),
            Some(Value::Str("italic")),
            Some(Value::Str("unknown")),
        ]
    );
}

#[test]
fn narrow_sections_convert_to_half_width_on_close() {
    // Full-width JIS 'Ａ' inside a narrow section becomes ASCII 'A'.
    let stream = [ESC, 0x02, ESC, 0x04, 0x23, 0x41, ESC, 0x05, ESC, 0x03];
    let mut text = source(&stream, Encoding::JisX0208, BookType::Epwing);
    let nodes = read_all(&mut text);

    assert_eq!(nodes[0].name, "narrow");
    assert_eq!(nodes[0].data, vec![text_run("A")]);
    // The copy nested in the text section was converted too.
    match &nodes[1].data[0] {
        NodeItem::Node(narrow) => assert_eq!(narrow.data, vec![text_run("A")]),
        other => panic!("expected nested narrow node, got {:?}", other),
    }

    // With conversion off the full-width run is preserved.
    let mut text = source(&stream, Encoding::JisX0208, BookType::Epwing);
    let nodes: Vec<SectionNode> = text
        .read(&ReadOptions {
            convert_narrow: false,
            ..ReadOptions::at(2, 0)
        })
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(nodes[0].data, vec![text_run("Ａ")]);
}

#[test]
fn emphasis_directive_consumes_inline_data_on_eb() {
    let stream = [
        ESC, 0x02, b'A', //
        ESC, 0x1a, 0x01, 0x02, 0x03, 0x04, // inline data, not a code
        b'B', ESC, 0x03,
    ];
    let mut text = source(&stream, Encoding::Iso8859_1, BookType::Eb);
    let nodes = read_all(&mut text);
    let root = &nodes[0];
    assert_eq!(root.data.len(), 3);
    assert_eq!(root.data[0], text_run("A"));
    assert!(matches!(&root.data[1], NodeItem::Node(n) if n.name == "emphasis"));
    assert_eq!(root.data[2], text_run("B"));

    // When the next unit is already an escape code nothing is consumed.
    let stream = [ESC, 0x02, ESC, 0x1a, ESC, 0x03];
    let mut text = source(&stream, Encoding::Iso8859_1, BookType::Eb);
    let nodes = read_all(&mut text);
    assert!(matches!(&nodes[0].data[0], NodeItem::Node(n) if n.name == "emphasis"));
}

#[test]
fn paged_reference_soft_stops_at_its_own_end() {
    let stream = [
        ESC, 0x02, //
        ESC, 0x4b, 0, 0, 0, 0, 0, 0, // page/offset payload
        ESC, 0x6b, //
        b'A', ESC, 0x03,
    ];
    let mut text = source(&stream, Encoding::Iso8859_1, BookType::Epwing);
    let nodes = read_all(&mut text);
    assert!(nodes.is_empty());
}

#[test]
fn mismatched_end_token_is_fatal() {
    let stream = [ESC, 0x02, b'A', ESC, 0x05];
    let mut text = source(&stream, Encoding::Iso8859_1, BookType::Epwing);
    let mut iter = text.read(&ReadOptions::at(2, 0)).unwrap();

    match iter.next() {
        Some(Err(EbError::MalformedSection { expected, found })) => {
            assert_eq!(expected, "text");
            assert_eq!(found, "narrow");
        }
        other => panic!("expected a malformed-section error, got {:?}", other),
    }
    assert!(iter.next().is_none());
}

#[test]
fn graphic_info_names_the_image_format() {
    let mut stream = vec![ESC, 0x02];
    stream.extend_from_slice(&[ESC, 0x4d]);
    stream.extend_from_slice(&[0x01, 0x00]); // type_info high byte set: jpeg
    stream.extend_from_slice(&[0u8; 10]);
    stream.extend_from_slice(&[0x00, 0x00, 0x00, 0x42, 0x00, 0x08]);
    stream.extend_from_slice(&[ESC, 0x6d, ESC, 0x03]);

    let mut text = source(&stream, Encoding::Iso8859_1, BookType::Epwing);
    let nodes = read_all(&mut text);
    let graphic = &nodes[0];
    assert_eq!(graphic.name, "graphic");
    assert_eq!(graphic.info.get("image_type"), Some(&Value::Str("jpeg")));
    assert_eq!(graphic.info.get("page"), Some(&Value::UInt(42)));
    assert_eq!(graphic.info.get("offset"), Some(&Value::UInt(8)));
}

#[test]
fn flattened_text_spans_nested_sections() {
    let stream = [
        ESC, 0x02, b'a', //
        ESC, 0x12, b'b', ESC, 0x13, //
        b'c', ESC, 0x03,
    ];
    let mut text = source(&stream, Encoding::Iso8859_1, BookType::Epwing);
    let nodes = read_all(&mut text);
    let root = nodes.last().unwrap();
    assert_eq!(root.name, "text");
    assert_eq!(root.text(), "abc");
}
