//! Book and subbook assembly.
//!
//! A book directory holds an optional `language` file, a `catalog` (EB) or
//! `catalogs` (EPWING) file, and one subdirectory per subbook with its text
//! stream under `data/`. Subbooks are constructed individually: one
//! malformed descriptor is reported for that subbook and never aborts the
//! rest of the catalog.

use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use log::{debug, error};

use super::catalog::{self, BookType, Resource, SubbookDescriptor};
use super::charset::Encoding;
use super::error::{EbError, Result};
use super::text::{ReadOptions, StopCode, SubbookText, TextIter};
use super::zio::{Zio, ZioPlainFile};

const DEFAULT_ENCODING: Encoding = Encoding::JisX0208;
/// EPWING text stream filename when the resource record does not name one.
const DEFAULT_TEXT_FILENAME: &str = "honmon";

/// Optional subbook-level correction data. Only the main-text stop code is
/// consumed by this crate; the appendix file itself is supplied externally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appendix {
    pub stop_code: Option<StopCode>,
}

/// One dictionary title within a disc.
pub struct Subbook {
    pub title: String,
    pub directory: String,
    pub index_page: u16,
    pub wide_fonts: Vec<String>,
    pub narrow_fonts: Vec<String>,
    pub resources: Vec<Resource>,
    appendix: Option<Appendix>,
    text: Option<SubbookText<ZioPlainFile>>,
}

impl Subbook {
    fn from_descriptor(
        book_path: &Path,
        descriptor: SubbookDescriptor,
        encoding: Encoding,
        book_type: BookType,
    ) -> Result<Self> {
        let text = if descriptor.index_page == 0 {
            debug!("Subbook {} holds stream data only", descriptor.directory);
            None
        } else {
            let filename = descriptor
                .text_filename
                .clone()
                .unwrap_or_else(|| DEFAULT_TEXT_FILENAME.to_string());
            let path = book_path
                .join(&descriptor.directory)
                .join("data")
                .join(&filename);
            Some(SubbookText::new(
                ZioPlainFile::new(path),
                descriptor.index_page as u32,
                encoding,
                book_type,
            )?)
        };

        Ok(Self {
            title: descriptor.title,
            directory: descriptor.directory,
            index_page: descriptor.index_page,
            wide_fonts: descriptor.wide_fonts,
            narrow_fonts: descriptor.narrow_fonts,
            resources: descriptor.resources,
            appendix: None,
            text,
        })
    }

    /// True when the subbook carries no text stream (`index_page == 0`).
    pub fn stream_data_only(&self) -> bool {
        self.index_page == 0
    }

    pub fn appendix(&self) -> Option<&Appendix> {
        self.appendix.as_ref()
    }

    /// Installs appendix data; its stop code feeds the text reader's
    /// main-text stop check.
    pub fn set_appendix(&mut self, appendix: Option<Appendix>) {
        let stop_code = appendix.and_then(|a| a.stop_code);
        self.appendix = appendix;
        if let Some(text) = self.text.as_mut() {
            text.set_stop_code(stop_code);
        }
    }

    pub fn text(&self) -> Option<&SubbookText<ZioPlainFile>> {
        self.text.as_ref()
    }

    pub fn text_mut(&mut self) -> Option<&mut SubbookText<ZioPlainFile>> {
        self.text.as_mut()
    }

    /// Starts a text read; see [`SubbookText::read`].
    pub fn read(&mut self, options: &ReadOptions) -> Result<TextIter<'_, ZioPlainFile>> {
        self.text
            .as_mut()
            .ok_or_else(|| EbError::NotFound("no text in this subbook".to_string()))?
            .read(options)
    }
}

/// A dictionary disc: catalog, encoding and its subbooks.
pub struct Book {
    path: PathBuf,
    encoding: Encoding,
    book_type: BookType,
    epwing_version: Option<u16>,
    subbooks: Vec<Result<Subbook>>,
}

impl Book {
    /// Opens the book rooted at `path`: loads the language descriptor (JIS
    /// X 0208 assumed when absent) and the catalog, then constructs each
    /// subbook.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let encoding = load_language(&path)?;
        let (book_type, mut zio) = open_catalog(&path)?;
        let catalog = catalog::parse(&mut zio, book_type, encoding)?;

        let subbook_count = catalog.subbooks.len();
        let subbooks = catalog
            .subbooks
            .into_iter()
            .enumerate()
            .map(|(i, descriptor)| {
                descriptor
                    .and_then(|d| Subbook::from_descriptor(&path, d, encoding, book_type))
                    .map_err(|e| {
                        error!("Subbook {} of {} creation failed: {}", i + 1, subbook_count, e);
                        e
                    })
            })
            .collect();

        Ok(Self {
            path,
            encoding,
            book_type,
            epwing_version: catalog.header.epwing_version,
            subbooks,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn book_type(&self) -> BookType {
        self.book_type
    }

    pub fn epwing_version(&self) -> Option<u16> {
        self.epwing_version
    }

    pub fn is_epwing(&self) -> bool {
        self.book_type == BookType::Epwing
    }

    pub fn is_eb(&self) -> bool {
        self.book_type == BookType::Eb
    }

    /// The successfully constructed subbooks.
    pub fn subbooks(&self) -> impl Iterator<Item = &Subbook> {
        self.subbooks.iter().filter_map(|s| s.as_ref().ok())
    }

    /// All per-subbook construction results, failures included.
    pub fn subbook_results(&self) -> &[Result<Subbook>] {
        &self.subbooks
    }

    pub fn subbook_mut(&mut self, index: usize) -> Option<&mut Subbook> {
        self.subbooks.get_mut(index).and_then(|s| s.as_mut().ok())
    }
}

fn load_language(path: &Path) -> Result<Encoding> {
    let mut zio = ZioPlainFile::new(path.join("language"));
    match zio.open() {
        Ok(()) => {
            let mut code = [0u8; 2];
            zio.read_into(&mut code)?;
            Encoding::from_language_code(BigEndian::read_u16(&code))
        }
        Err(EbError::NotFound(_)) => {
            debug!(
                "Language file not found; assuming {}",
                DEFAULT_ENCODING.label()
            );
            Ok(DEFAULT_ENCODING)
        }
        Err(e) => Err(e),
    }
}

fn open_catalog(path: &Path) -> Result<(BookType, ZioPlainFile)> {
    let eb_path = path.join("catalog");
    let mut zio = ZioPlainFile::new(&eb_path);
    match zio.open() {
        Ok(()) => return Ok((BookType::Eb, zio)),
        Err(EbError::NotFound(_)) => {}
        Err(e) => return Err(e),
    }

    let epwing_path = path.join("catalogs");
    let mut zio = ZioPlainFile::new(&epwing_path);
    match zio.open() {
        Ok(()) => Ok((BookType::Epwing, zio)),
        Err(EbError::NotFound(_)) => Err(EbError::NotFound(format!(
            "{} or {}",
            eb_path.display(),
            epwing_path.display()
        ))),
        Err(e) => Err(e),
    }
}
