//! Core EB/EPWING reader module.

pub mod book;
pub mod catalog;
pub mod charset;
pub mod error;
pub mod handlers;
pub mod indices;
pub mod layout;
pub mod registry;
pub mod text;
pub mod zio;

pub use book::{Appendix, Book, Subbook};
pub use catalog::{BookType, Resource, ResourceKind, StorageCodec, SubbookDescriptor};
pub use charset::Encoding;
pub use error::{EbError, Result};
pub use indices::{NormalizationPolicy, SearchKey, SearchMethod, SearchTable};
pub use text::{
    Location, NodeItem, ReadOptions, SectionKind, SectionNode, StopCode, SubbookText, TextIter,
    Value,
};
pub use zio::{Zio, ZioMemory, ZioPlainFile, PAGE_SIZE};
