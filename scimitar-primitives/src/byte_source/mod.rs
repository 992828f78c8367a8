//! Positionless random-access reads over an immutable byte store.
//!
//! A forge archive is consulted by many decoders at once: the entry walk, the
//! container decoders and the deferred chunk decompression all want their own
//! cursor over the same file. Instead of sharing one seekable handle, the
//! archive owns a [`ByteSource`] and every consumer gets an independent
//! [`SourceCursor`] over it.

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::Path,
    sync::Mutex,
};

pub use self::cursor::SourceCursor;

mod cursor;

/// An immutable byte store supporting reads at arbitrary offsets.
///
/// Implementations take `&self`, so any number of cursors can be layered on
/// top of a single source.
pub trait ByteSource {
    /// Total length of the store in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly `buf.len()` bytes starting at `offset`.
    ///
    /// Fails with [`io::ErrorKind::UnexpectedEof`] if the requested range
    /// crosses the end of the store.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// A fresh independent cursor positioned at the start of the store.
    fn cursor(&self) -> SourceCursor<&Self>
    where
        Self: Sized,
    {
        SourceCursor::new(self)
    }
}

impl<T: ByteSource + ?Sized> ByteSource for &T {
    fn len(&self) -> u64 {
        T::len(self)
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        T::read_exact_at(self, offset, buf)
    }
}

/// A file-backed source.
///
/// Assumes the file is not modified while open. The underlying handle is
/// seeked under a mutex; the read model is single-threaded (callers that want
/// parallelism open one source per archive), so the lock is uncontended.
#[derive(Debug)]
pub struct FileSource {
    file: Mutex<File>,
    len: u64,
}

impl FileSource {
    pub fn new(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();

        Ok(Self {
            file: Mutex::new(file),
            len,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::new(File::open(path)?)
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }
}

/// An in-memory source over anything that derefs to a byte slice.
#[derive(Debug, Clone)]
pub struct SliceSource<B>(B);

impl<B: AsRef<[u8]>> SliceSource<B> {
    pub fn new(bytes: B) -> Self {
        Self(bytes)
    }

    pub fn into_inner(self) -> B {
        self.0
    }
}

impl<B: AsRef<[u8]>> ByteSource for SliceSource<B> {
    fn len(&self) -> u64 {
        self.0.as_ref().len() as u64
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let bytes = self.0.as_ref();
        let end = offset
            .checked_add(buf.len() as u64)
            .filter(|&end| end <= bytes.len() as u64)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "read out of bounds of SliceSource",
                )
            })?;
        buf.copy_from_slice(&bytes[offset as usize..end as usize]);

        Ok(())
    }
}
