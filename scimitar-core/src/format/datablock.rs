//! The chunked compressed store every file payload is wrapped in.
//!
//! A datablock is a run of independently-stored chunks. The serialized form
//! interleaves three sections: a preamble, a `(unpacked, packed)` size table
//! for all chunks, then `(hash, payload)` for each chunk in the same order.
//! Parsing therefore makes two passes over the chunk list; the second pass
//! records the absolute payload offsets and skips the payload bytes.
//!
//! Decompression is deferred: a parsed [`Datablock`] only holds offsets into
//! the backing [`ByteSource`], so [`Datablock::decompress`] can run long
//! after archive iteration has moved on.

use std::io::{Read, Seek, SeekFrom};

use binrw::BinRead;
use bytes::Bytes;
use scimitar_primitives::byte_source::ByteSource;
use snafu::{ResultExt, ensure};

use crate::format::{
    DecodeSnafu, IoSnafu, Result, UnpackedSizeMismatchSnafu, ZstdFrameInvalidSnafu,
};

/// One fragment of a datablock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Logical (decompressed) size.
    pub unpacked: u32,
    /// Stored size.
    pub packed: u32,
    /// Checksum or uid; never verified.
    pub hash: u32,
    /// Absolute position of the chunk payload in the backing source.
    pub offset: u64,
}

impl Chunk {
    /// A chunk that did not shrink is stored raw.
    pub fn is_compressed(&self) -> bool {
        self.unpacked > self.packed
    }
}

#[derive(Debug, Clone)]
pub struct Datablock {
    /// Container deserializer variant; 2 in older archives, 3 since Y5.
    pub variant: u16,
    pub x_a: u16,
    pub x_c: u8,
    /// Varies across archives; meaning unknown.
    pub x_d: u16,
    pub chunks: Vec<Chunk>,
    pub packed_total: u64,
    pub unpacked_total: u64,
}

impl Datablock {
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        const WHAT: &str = "datablock";

        let variant = u16::read_le(r).context(DecodeSnafu { what: WHAT })?;
        let x_a = u16::read_le(r).context(DecodeSnafu { what: WHAT })?;
        let x_c = u8::read_le(r).context(DecodeSnafu { what: WHAT })?;
        let x_d = u16::read_le(r).context(DecodeSnafu { what: WHAT })?;
        let num_chunks = u32::read_le(r).context(DecodeSnafu { what: WHAT })?;

        // first pass: the size table
        let mut chunks = Vec::with_capacity(num_chunks as usize);
        let mut packed_total = 0u64;
        let mut unpacked_total = 0u64;
        for _ in 0..num_chunks {
            let unpacked = u32::read_le(r).context(DecodeSnafu { what: WHAT })?;
            let packed = u32::read_le(r).context(DecodeSnafu { what: WHAT })?;
            packed_total += packed as u64;
            unpacked_total += unpacked as u64;
            chunks.push(Chunk {
                unpacked,
                packed,
                hash: 0,
                offset: 0,
            });
        }

        // second pass: hashes and payload positions
        for chunk in &mut chunks {
            chunk.hash = u32::read_le(r).context(DecodeSnafu { what: WHAT })?;
            chunk.offset = r.stream_position().context(IoSnafu)?;
            r.seek(SeekFrom::Current(chunk.packed as i64))
                .context(IoSnafu)?;
        }

        Ok(Self {
            variant,
            x_a,
            x_c,
            x_d,
            chunks,
            packed_total,
            unpacked_total,
        })
    }

    pub fn is_compressed(&self) -> bool {
        self.chunks.iter().any(Chunk::is_compressed)
    }

    /// Decode every chunk in order into one contiguous buffer.
    pub fn decompress<S: ByteSource>(&self, source: &S) -> Result<Bytes> {
        let mut out = Vec::with_capacity(self.unpacked_total as usize);
        for chunk in &self.chunks {
            let mut stored = vec![0; chunk.packed as usize];
            source
                .read_exact_at(chunk.offset, &mut stored)
                .context(IoSnafu)?;

            if chunk.is_compressed() {
                let data = zstd::bulk::decompress(&stored, chunk.unpacked as usize).context(
                    ZstdFrameInvalidSnafu {
                        offset: chunk.offset,
                    },
                )?;
                ensure!(
                    data.len() == chunk.unpacked as usize,
                    UnpackedSizeMismatchSnafu {
                        offset: chunk.offset,
                        expected: chunk.unpacked,
                        got: data.len(),
                    }
                );
                out.extend_from_slice(&data);
            } else {
                out.extend_from_slice(&stored);
            }
        }

        Ok(out.into())
    }
}
