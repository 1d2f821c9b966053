//! Custom error types for the eb-reader crate.

use thiserror::Error;

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum EbError {
    /// An error originating from I/O operations.
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    /// An expected file or resource is absent. Recoverable: the caller may
    /// try alternate names or extensions.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The book's language descriptor names a character code outside the
    /// three supported encodings. Fatal for that book.
    #[error("Unsupported character code: {0}. Only ISO 8859-1 (1), JIS X 0208 (2) and JIS X 0208 + GB 2312 (3) are supported.")]
    UnsupportedEncoding(u16),

    /// A record layout's computed field span disagrees with its declared
    /// on-disk size. Indicates a bug in a format table, never corrupt data.
    #[error("Layout check failed for {layout}: declared {declared} bytes, fields span {computed}")]
    Layout {
        layout: &'static str,
        declared: usize,
        computed: usize,
    },

    /// An end token arrived that does not match the currently open section.
    /// The stream is corrupt or the engine state is wrong.
    #[error("Mismatched section end: expected {expected:?}, found {found:?}")]
    MalformedSection {
        expected: &'static str,
        found: &'static str,
    },

    /// The data is structurally invalid or does not conform to the on-disk
    /// format (short record, impossible count, etc.).
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

impl EbError {
    /// True when this error is an I/O end-of-file, which the text reader
    /// treats as a clean end of iteration rather than a failure.
    pub fn is_eof(&self) -> bool {
        matches!(self, EbError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}

/// A convenience `Result` type alias using the crate's `EbError` type.
pub type Result<T> = std::result::Result<T, EbError>;
