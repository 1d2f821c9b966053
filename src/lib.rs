//! # eb-reader
//!
//! A reader for EB/EPWING electronic dictionary discs.
//!
//! Decodes the fixed-layout binary catalog describing a disc's subbooks and
//! each subbook's text stream, in which Japanese-encoded text interleaves
//! with escape codes that open and close nested markup sections (keyword,
//! reference, graphic, decoration, ...) and carry fixed-size binary
//! payloads. Decode-only: writing dictionaries is not supported.

pub mod eb;

// Re-export the main types for convenience
pub use eb::{
    Appendix, Book, BookType, EbError, Encoding, Location, NodeItem, NormalizationPolicy,
    ReadOptions, Result, SearchKey, SearchMethod, SectionKind, SectionNode, StopCode, Subbook,
    SubbookText, Value, Zio, ZioMemory, ZioPlainFile,
};
