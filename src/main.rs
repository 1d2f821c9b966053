use std::env;

use eb_reader::{Book, NodeItem, ReadOptions, SearchKey, SectionNode};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <path-to-book-dir> [--dump]", args[0]);
        std::process::exit(1);
    }

    let book_path = &args[1];
    let dump = args.iter().any(|arg| arg == "--dump");

    println!("Reading book: {}", book_path);
    println!("{}", "=".repeat(60));

    let book = match Book::open(book_path) {
        Ok(book) => book,
        Err(e) => {
            eprintln!("\nERROR: Failed to open book");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    println!("\nBook Information:");
    println!("  Type: {}", book.book_type().label());
    println!("  Encoding: {}", book.encoding().label());
    if let Some(version) = book.epwing_version() {
        println!("  EPWing version: {}", version);
    }

    for (i, result) in book.subbook_results().iter().enumerate() {
        match result {
            Ok(subbook) => {
                println!("\nSubbook {}:", i + 1);
                println!("  Title: {}", subbook.title);
                println!("  Directory: {}", subbook.directory);
                println!("  Index page: {}", subbook.index_page);
                if !subbook.wide_fonts.is_empty() {
                    println!("  Wide fonts: {:?}", subbook.wide_fonts);
                }
                if !subbook.narrow_fonts.is_empty() {
                    println!("  Narrow fonts: {:?}", subbook.narrow_fonts);
                }
                if let Some(text) = subbook.text() {
                    println!("  Search methods: {}", text.searches().len());
                }
            }
            Err(e) => {
                println!("\nSubbook {}: FAILED ({})", i + 1, e);
            }
        }
    }

    if dump {
        dump_first_subbook(book);
    }
}

fn dump_first_subbook(mut book: Book) {
    let Some(subbook) = book.subbook_mut(0) else {
        eprintln!("\nNo readable subbook to dump");
        std::process::exit(1);
    };

    println!("\n{}", "=".repeat(60));
    println!("Text of subbook 1:");

    let iter = match subbook.read(&ReadOptions::search(SearchKey::Text)) {
        Ok(iter) => iter,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    for result in iter.take(50) {
        match result {
            Ok(section) => print_section(&section, 0),
            Err(e) => {
                eprintln!("ERROR: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn print_section(section: &SectionNode, indent: usize) {
    let pad = "  ".repeat(indent);
    println!("{}[{}] {:?}", pad, section.name, section.info);
    for item in &section.data {
        match item {
            NodeItem::Text(text) => println!("{}  \"{}\"", pad, text),
            NodeItem::Node(node) => print_section(node, indent + 1),
        }
    }
}
