//! Support for the `.forge` archive container.
//!
//! A forge archive is a flat sequence of independently-addressable entries.
//! The whole entry table and the parallel name table are read into memory up
//! front; entry payloads are only touched when a container is materialized.
//!
//! The first entry of every archive is a [`container::Descriptor`], the last
//! is a [`container::Hash`], and everything in between is a
//! [`container::File`].

use std::{
    io::{Seek, SeekFrom},
    path::Path,
};

use binrw::BinRead;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use scimitar_primitives::byte_source::{ByteSource, FileSource, SourceCursor};
use snafu::ResultExt;
use tracing::warn;

use crate::format::{DecodeSnafu, FormatError, IoSnafu, Result};

pub mod container;

pub use container::Container;

/// The fixed archive header.
///
/// Most fields have no known interpretation and are preserved verbatim; the
/// comments record the values observed in shipped archives.
#[derive(BinRead, Debug, Clone)]
#[br(little, magic = b"scimitar\0")]
pub struct ForgeHeader {
    pub version: u32,
    pub header_offset: u32,
    pub x11: u32, // 0
    pub x15: u32, // 0x10
    pub x19: u32, // 0
    pub x1d: u8,
    /// Total entry count, including the leading descriptor and trailing hash.
    pub num_entries: u32,
    pub x22: u32, // 2
    pub x26: u32, // 0
    pub x2a: u32, // 0
    pub x2e: u32, // 0
    pub x32: i32, // -1
    pub x36: i32, // -1
    pub num_plus2: u32,
    pub x3e: u32, // 1
    pub x42: u32, // 0x4a
    pub x46: u32, // 0
    pub num2: u32,
    pub x4e: u32, // 2
    pub x52: u32, // 0x7a
    pub x56: u32, // 0
    pub x5a: i32, // -1
    pub x5e: i32, // -1
    pub x62: u32, // 0
    pub num_plus1: u32,
    pub names_offset: u64,
    pub lostfound: u64,
}

/// Locates one container within the archive.
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(little)]
pub struct Entry {
    /// Absolute payload start.
    pub offset: u64,
    pub uid: u64,
    pub size: u32,
}

impl Entry {
    /// Absolute payload end; derived, not serialized.
    pub fn end(&self) -> u64 {
        self.offset + self.size as u64
    }
}

/// Per-entry metadata record, parallel to the entry table.
///
/// Semantically significant fields are [`file_type`](Self::file_type) and
/// [`timestamp`](Self::timestamp); the rest is preserved opaquely.
#[derive(BinRead, Debug, Clone)]
#[br(little)]
pub struct NameEntry {
    pub x00: u32, // 0
    pub x04: u32, // 4
    pub x08: u64, // 0
    pub x10: u32, // 4
    pub meta: [u8; 0xFF],
    pub x113: u8,
    /// POSIX seconds.
    pub timestamp: u32,
    pub x118: u32, // 0
    pub prev_entry_idx: i32,
    pub next_entry_idx: i32,
    pub x124: u64, // 0
    /// Container/payload magic; the container dispatch key.
    pub file_type: u32,
    pub x130: u32, // 0
    pub x134: [u8; 12],
}

impl NameEntry {
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp as i64, 0)
    }
}

/// An opened archive. Immutable; owns its byte source.
#[derive(Debug)]
pub struct Forge<S: ByteSource> {
    source: S,
    header: ForgeHeader,
    entries: Vec<Entry>,
    names: Vec<NameEntry>,
}

impl Forge<FileSource> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let source = FileSource::open(path).context(IoSnafu)?;
        Self::new(source)
    }
}

impl<S: ByteSource> Forge<S> {
    pub fn new(source: S) -> Result<Self> {
        let mut r = SourceCursor::new(&source);

        let header = ForgeHeader::read(&mut r).map_err(|e| {
            if matches!(e, binrw::Error::BadMagic { .. }) {
                FormatError::NotAnArchive { source: e }
            } else {
                FormatError::Decode {
                    what: "forge header",
                    source: e,
                }
            }
        })?;

        let mut entries = Vec::with_capacity(header.num_entries as usize);
        for _ in 0..header.num_entries {
            entries.push(Entry::read_le(&mut r).context(DecodeSnafu { what: "entry table" })?);
        }

        r.seek(SeekFrom::Start(header.names_offset))
            .context(IoSnafu)?;
        let mut names = Vec::with_capacity(header.num_entries as usize);
        for _ in 0..header.num_entries {
            names.push(NameEntry::read_le(&mut r).context(DecodeSnafu { what: "name table" })?);
        }

        Ok(Self {
            source,
            header,
            entries,
            names,
        })
    }

    pub fn header(&self) -> &ForgeHeader {
        &self.header
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn names(&self) -> &[NameEntry] {
        &self.names
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode the container behind entry `index`.
    ///
    /// An unknown container magic is not fatal: it is demoted to a warning
    /// and a [`Container::Unparsed`] so neighbors can still be enumerated.
    ///
    /// Panics if `index` is out of bounds.
    pub fn container(&self, index: usize) -> Result<Container> {
        let entry = self.entries[index];
        let mut r = SourceCursor::new(&self.source);
        r.seek(SeekFrom::Start(entry.offset)).context(IoSnafu)?;
        match container::decode(&mut r, &entry, index) {
            Err(FormatError::UnknownContainerMagic { magic, .. }) => {
                warn!("no decoder for container {index} (magic 0x{magic:08X}), skipping");
                Ok(Container::Unparsed {
                    magic,
                    start: entry.offset,
                    end: entry.end(),
                })
            }
            container => container,
        }
    }

    /// Iterate `(index, entry, name, container)` over the whole archive.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Entry, &NameEntry, Result<Container>)> {
        (0..self.entries.len())
            .map(move |i| (i, &self.entries[i], &self.names[i], self.container(i)))
    }

    /// Entries whose `file_type` magic matches.
    pub fn by_file_type(
        &self,
        file_type: u32,
    ) -> impl Iterator<Item = (usize, &Entry, &NameEntry, Result<Container>)> {
        self.names
            .iter()
            .enumerate()
            .filter(move |(_, name)| name.file_type == file_type)
            .map(move |(i, name)| (i, &self.entries[i], name, self.container(i)))
    }

    /// Entries carrying file data (everything with a nonzero `file_type`).
    pub fn files(&self) -> impl Iterator<Item = (usize, &Entry, &NameEntry, Result<Container>)> {
        self.names
            .iter()
            .enumerate()
            .filter(|(_, name)| name.file_type != 0)
            .map(move |(i, name)| (i, &self.entries[i], name, self.container(i)))
    }

    /// Linear-scan lookup by entry uid.
    pub fn by_uid(&self, uid: u64) -> Option<(usize, &Entry, &NameEntry)> {
        self.entries
            .iter()
            .position(|e| e.uid == uid)
            .map(|i| (i, &self.entries[i], &self.names[i]))
    }

    /// Decompress the payload datablock of a file container.
    pub fn read_payload(&self, file: &container::File) -> Result<Bytes> {
        file.payload().decompress(&self.source)
    }

    /// Decompress the metadata datablock of a file container, if present.
    pub fn read_meta(&self, file: &container::File) -> Result<Option<Bytes>> {
        file.meta()
            .map(|block| block.decompress(&self.source))
            .transpose()
    }
}
