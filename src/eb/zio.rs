//! Seekable, page-addressed byte-stream providers ("zio" in the on-disc
//! naming convention).
//!
//! Every consumer in this crate reads through the [`Zio`] trait so that the
//! same parsing code runs against a plain file on disk or an in-memory
//! buffer. Compressed block stores (ebzip, S-EBXA) are external providers
//! and can be supplied by implementing [`Zio`] outside this crate.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::debug;

use super::error::{EbError, Result};

/// Size of a page in bytes (page = block in JIS X 4081).
pub const PAGE_SIZE: u64 = 2048;

/// A seekable byte source with page-granular absolute addressing.
///
/// Positions are byte offsets; pages are 1-based and translate to
/// `(page - 1) * 2048 + byte_offset`.
pub trait Zio {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self);
    fn seek_absolute(&mut self, pos: u64) -> Result<()>;
    fn seek_relative(&mut self, delta: i64) -> Result<()>;
    fn tell(&mut self) -> Result<u64>;
    /// Fill `buf` completely or fail (end-of-file surfaces as an
    /// `UnexpectedEof` I/O error).
    fn read_into(&mut self, buf: &mut [u8]) -> Result<()>;
    fn read(&mut self, n: usize) -> Result<Vec<u8>>;

    /// Whether this provider reads uncompressed data in place. Block
    /// compressed providers report false.
    fn is_plain(&self) -> bool {
        true
    }

    /// Seek to a 1-based page number plus a byte offset within that page.
    fn seek_page(&mut self, page: u32, offset: u32) -> Result<()> {
        if page == 0 {
            return Err(EbError::InvalidFormat("Page numbers are 1-based; got page 0".to_string()));
        }
        let pos = (page as u64 - 1) * PAGE_SIZE + offset as u64;
        debug!("Seeking page {} offset {} (pos={})", page, offset, pos);
        self.seek_absolute(pos)
    }
}

/// A plain (uncompressed) file provider.
///
/// The file is opened lazily on first use, so constructing one is free and
/// never touches the filesystem.
pub struct ZioPlainFile {
    path: PathBuf,
    file: Option<File>,
}

impl ZioPlainFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_open(&mut self) -> Result<&mut File> {
        if self.file.is_none() {
            debug!("Opening file {}", self.path.display());
            let file = File::open(&self.path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EbError::NotFound(self.path.display().to_string())
                } else {
                    EbError::Io(e)
                }
            })?;
            self.file = Some(file);
        }
        Ok(self.file.as_mut().expect("file was just opened"))
    }
}

impl Zio for ZioPlainFile {
    fn open(&mut self) -> Result<()> {
        self.ensure_open().map(|_| ())
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            debug!("Closing file {}", self.path.display());
        }
    }

    fn seek_absolute(&mut self, pos: u64) -> Result<()> {
        self.ensure_open()?.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    fn seek_relative(&mut self, delta: i64) -> Result<()> {
        self.ensure_open()?.seek(SeekFrom::Current(delta))?;
        Ok(())
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.ensure_open()?.stream_position()?)
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        self.ensure_open()?.read_exact(buf)?;
        Ok(())
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.read_into(&mut buf)?;
        Ok(buf)
    }
}

/// An in-memory provider backed by a byte vector.
///
/// Used by the test suite to build synthetic discs, and handy for callers
/// that already hold a page range in memory.
pub struct ZioMemory {
    data: Vec<u8>,
    pos: u64,
}

impl ZioMemory {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl Zio for ZioMemory {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) {}

    fn seek_absolute(&mut self, pos: u64) -> Result<()> {
        self.pos = pos;
        Ok(())
    }

    fn seek_relative(&mut self, delta: i64) -> Result<()> {
        let next = self.pos as i64 + delta;
        if next < 0 {
            return Err(EbError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before start of buffer",
            )));
        }
        self.pos = next as u64;
        Ok(())
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.pos)
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let start = self.pos as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            return Err(EbError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "read past end of buffer",
            )));
        }
        buf.copy_from_slice(&self.data[start..end]);
        self.pos = end as u64;
        Ok(())
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.read_into(&mut buf)?;
        Ok(buf)
    }
}
