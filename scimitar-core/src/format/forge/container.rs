//! The typed containers behind archive entries.
//!
//! Dispatch is closed over the three known magics (`1` → [`Descriptor`],
//! `6` → [`Hash`], `0x57FBAA34` → [`File`]); anything else ends up as
//! [`Container::Unparsed`] so the archive walk can continue past container
//! kinds this crate does not understand.

use std::io::{Read, Seek, SeekFrom};

use binrw::BinRead;
use bytes::Bytes;
use indexmap::IndexMap;
use snafu::{ResultExt, ensure};
use tracing::warn;

use crate::format::{
    DecodeSnafu, IoSnafu, MagicMismatchSnafu, Result, UnknownContainerMagicSnafu,
    UnknownDescriptorTypeSnafu, null_terminated,
};
use crate::format::{datablock::Datablock, forge::Entry};

pub const DESCRIPTOR_MAGIC: u32 = 1;
pub const HASH_MAGIC: u32 = 6;
pub const FILE_MAGIC: u32 = 0x57FB_AA34;

/// The full nested datablock magic. Its little-endian low half is
/// [`FILE_MAGIC`], so a file entry's payload starts with this value split
/// across the dispatch magic and the word that follows.
pub const DATA_MAGIC: u64 = 0x1014_FA99_57FB_AA34;
const DATA_MAGIC_HIGH: u32 = 0x1014_FA99;

#[derive(Debug, Clone)]
pub enum Container {
    Descriptor(Descriptor),
    Hash(Hash),
    File(File),
    /// A container kind with no registered decoder. Kept so enumeration of
    /// its neighbors can continue.
    Unparsed { magic: u32, start: u64, end: u64 },
}

impl Container {
    pub fn as_descriptor(&self) -> Option<&Descriptor> {
        match self {
            Container::Descriptor(desc) => Some(desc),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&Hash> {
        match self {
            Container::Hash(hash) => Some(hash),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&File> {
        match self {
            Container::File(file) => Some(file),
            _ => None,
        }
    }
}

/// Dispatch on the magic at the cursor, which must sit at `entry.offset`.
///
/// An unregistered magic fails with
/// [`FormatError::UnknownContainerMagic`](crate::format::FormatError); the
/// archive layer demotes that to a warning and an [`Container::Unparsed`].
pub(crate) fn decode<R: Read + Seek>(r: &mut R, entry: &Entry, index: usize) -> Result<Container> {
    let magic = u32::read_le(r).context(DecodeSnafu {
        what: "container magic",
    })?;

    match magic {
        DESCRIPTOR_MAGIC => Descriptor::parse(r, entry).map(Container::Descriptor),
        HASH_MAGIC => Hash::parse(r).map(Container::Hash),
        FILE_MAGIC => File::parse(r, entry).map(Container::File),
        _ => UnknownContainerMagicSnafu { magic, index }.fail(),
    }
}

/// A value stored in a [`Descriptor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    U32(u32),
    U64(u64),
    Bytes(Bytes),
}

/// Archive-level key/value metadata; the first entry of every forge archive.
///
/// Insertion order is preserved.
#[derive(Debug, Clone, Default)]
pub struct Descriptor {
    values: IndexMap<u32, Value>,
}

impl Descriptor {
    pub(crate) fn parse<R: Read + Seek>(r: &mut R, entry: &Entry) -> Result<Self> {
        const WHAT: &str = "descriptor";

        let mut values = IndexMap::new();
        while r.stream_position().context(IoSnafu)? < entry.end() {
            let id = u32::read_le(r).context(DecodeSnafu { what: WHAT })?;
            let dtype = u32::read_le(r).context(DecodeSnafu { what: WHAT })?;
            let value = match dtype {
                0 => Value::U32(u32::read_le(r).context(DecodeSnafu { what: WHAT })?),
                1 => {
                    let len = u32::read_le(r).context(DecodeSnafu { what: WHAT })?;
                    let mut bytes = vec![0; len as usize];
                    r.read_exact(&mut bytes).context(IoSnafu)?;
                    // trailing NUL
                    u8::read_le(r).context(DecodeSnafu { what: WHAT })?;
                    Value::Bytes(bytes.into())
                }
                5 => Value::U64(u64::read_le(r).context(DecodeSnafu { what: WHAT })?),
                _ => return UnknownDescriptorTypeSnafu { id, dtype }.fail(),
            };
            if values.insert(id, value).is_some() {
                warn!(id, "duplicate descriptor id, keeping the later value");
            }
        }

        Ok(Self { values })
    }

    pub fn get(&self, id: u32) -> Option<&Value> {
        self.values.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Value)> {
        self.values.iter().map(|(&id, value)| (id, value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The archive trailer record; the last entry of every forge archive.
///
/// Up to five nested sections, each gated by the u32 before it: a zero gate
/// short-circuits everything after. Preserved, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hash {
    pub hash1: u64,
    pub gate1: u32,
    pub hash2: u64,
    pub gate2: u32,
    pub name: [u8; 0x40],
    pub x58: u64,
    pub x60: u64,
    pub gate3: u32,
    pub x6c: u64,
    pub x74: u64,
    pub gate4: u32,
    pub x80: u64,
}

impl Default for Hash {
    fn default() -> Self {
        Self {
            hash1: 0,
            gate1: 0,
            hash2: 0,
            gate2: 0,
            name: [0; 0x40],
            x58: 0,
            x60: 0,
            gate3: 0,
            x6c: 0,
            x74: 0,
            gate4: 0,
            x80: 0,
        }
    }
}

impl Hash {
    pub(crate) fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        const WHAT: &str = "hash trailer";

        let hash1 = u64::read_le(r).context(DecodeSnafu { what: WHAT })?;
        let gate1 = u32::read_le(r).context(DecodeSnafu { what: WHAT })?;
        if gate1 == 0 {
            return Ok(Self {
                hash1,
                ..Self::default()
            });
        }

        let hash2 = u64::read_le(r).context(DecodeSnafu { what: WHAT })?;
        let gate2 = u32::read_le(r).context(DecodeSnafu { what: WHAT })?;
        if gate2 == 0 {
            return Ok(Self {
                hash1,
                gate1,
                hash2,
                ..Self::default()
            });
        }

        let mut name = [0; 0x40];
        r.read_exact(&mut name).context(IoSnafu)?;
        let x58 = u64::read_le(r).context(DecodeSnafu { what: WHAT })?;
        let x60 = u64::read_le(r).context(DecodeSnafu { what: WHAT })?;
        let gate3 = u32::read_le(r).context(DecodeSnafu { what: WHAT })?;
        if gate3 == 0 {
            return Ok(Self {
                hash1,
                gate1,
                hash2,
                gate2,
                name,
                x58,
                x60,
                ..Self::default()
            });
        }

        let x6c = u64::read_le(r).context(DecodeSnafu { what: WHAT })?;
        let x74 = u64::read_le(r).context(DecodeSnafu { what: WHAT })?;
        let gate4 = u32::read_le(r).context(DecodeSnafu { what: WHAT })?;
        if gate4 == 0 {
            return Ok(Self {
                hash1,
                gate1,
                hash2,
                gate2,
                name,
                x58,
                x60,
                gate3,
                x6c,
                x74,
                ..Self::default()
            });
        }

        let x80 = u64::read_le(r).context(DecodeSnafu { what: WHAT })?;
        Ok(Self {
            hash1,
            gate1,
            hash2,
            gate2,
            name,
            x58,
            x60,
            gate3,
            x6c,
            x74,
            gate4,
            x80,
        })
    }

    /// The NUL-truncated name field of the third section.
    pub fn name(&self) -> &[u8] {
        null_terminated(&self.name)
    }
}

/// A datablock-bearing payload container.
#[derive(Debug, Clone)]
pub struct File {
    meta: Option<Datablock>,
    payload: Datablock,
}

impl File {
    pub(crate) fn parse<R: Read + Seek>(r: &mut R, entry: &Entry) -> Result<Self> {
        // the dispatch magic was the low half of DATA_MAGIC; the high half
        // must follow
        let at = r.stream_position().context(IoSnafu)?;
        let high = u32::read_le(r).context(DecodeSnafu {
            what: "file container",
        })?;
        ensure!(
            high == DATA_MAGIC_HIGH,
            MagicMismatchSnafu {
                expected: DATA_MAGIC_HIGH as u64,
                got: high as u64,
                at,
            }
        );

        let first = Datablock::parse(r)?;

        if r.stream_position().context(IoSnafu)? < entry.end() {
            let probe = u64::read_le(r).context(DecodeSnafu {
                what: "nested container magic",
            })?;
            if probe == DATA_MAGIC {
                let payload = Datablock::parse(r)?;
                return Ok(Self {
                    meta: Some(first),
                    payload,
                });
            }
            // unknown nested container variant: the first block is the
            // payload, whatever follows is skipped
            r.seek(SeekFrom::Start(entry.end())).context(IoSnafu)?;
        }

        Ok(Self {
            meta: None,
            payload: first,
        })
    }

    /// The datablock holding the actual file contents.
    pub fn payload(&self) -> &Datablock {
        &self.payload
    }

    /// The links/metadata datablock preceding the payload, when present.
    pub fn meta(&self) -> Option<&Datablock> {
        self.meta.as_ref()
    }

    pub fn has_meta(&self) -> bool {
        self.meta.is_some()
    }
}
