//! Common structures shared by several payload formats.

use std::io::{Read, Seek};

use binrw::BinRead;
use bytes::Bytes;
use snafu::{ResultExt, ensure};

use crate::format::{DecodeSnafu, IoSnafu, MagicMismatchSnafu, Result};

/// The preamble carried by every decoded file payload (mesh, texture, asset).
///
/// `var2` and `var3` are almost always zero; a handful of entries in the main
/// archive carry other values, so they are preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub encoded_meta: Bytes,
    pub var1: u32,
    pub magic: u32,
    pub uid: u64,
    pub var2: u32,
    pub var3: u32,
}

impl FileMeta {
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        const WHAT: &str = "file meta";

        let meta_len = u32::read_le(r).context(DecodeSnafu { what: WHAT })?;
        let mut encoded_meta = vec![0; meta_len as usize];
        r.read_exact(&mut encoded_meta).context(IoSnafu)?;

        let var1 = u32::read_le(r).context(DecodeSnafu { what: WHAT })?;
        let magic = u32::read_le(r).context(DecodeSnafu { what: WHAT })?;
        let uid = u64::read_le(r).context(DecodeSnafu { what: WHAT })?;

        // the payload magic is stored twice, back to back
        let at = r.stream_position().context(IoSnafu)?;
        let second = u32::read_le(r).context(DecodeSnafu { what: WHAT })?;
        ensure!(
            second == magic,
            MagicMismatchSnafu {
                expected: magic as u64,
                got: second as u64,
                at,
            }
        );

        let var2 = u32::read_le(r).context(DecodeSnafu { what: WHAT })?;
        let var3 = u32::read_le(r).context(DecodeSnafu { what: WHAT })?;

        Ok(Self {
            encoded_meta: encoded_meta.into(),
            var1,
            magic,
            uid,
            var2,
            var3,
        })
    }
}

/// One `(magic, meta, data)` framed piece of a composite payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePiece {
    pub magic: u32,
    pub meta: Bytes,
    pub data: Bytes,
}

impl FilePiece {
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        const WHAT: &str = "file piece";

        let meta_len = u32::read_le(r).context(DecodeSnafu { what: WHAT })?;
        let mut meta = vec![0; meta_len as usize];
        r.read_exact(&mut meta).context(IoSnafu)?;

        let data_len = u32::read_le(r).context(DecodeSnafu { what: WHAT })?;
        let magic = u32::read_le(r).context(DecodeSnafu { what: WHAT })?;
        let mut data = vec![0; data_len as usize];
        r.read_exact(&mut data).context(IoSnafu)?;

        Ok(Self {
            magic,
            meta: meta.into(),
            data: data.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{FileMeta, FilePiece};
    use crate::format::{FormatError, test_util::Builder};

    #[test]
    fn file_meta_round_trips_fields() {
        let data = Builder::new()
            .u32(3)
            .raw(b"abc")
            .u32(0xAA)
            .u32(0x1234_5678)
            .u64(0xDEAD_BEEF)
            .u32(0x1234_5678)
            .u32(0)
            .u32(0)
            .into_vec();

        let meta = FileMeta::parse(&mut Cursor::new(&data)).unwrap();
        assert_eq!(meta.encoded_meta.as_ref(), b"abc");
        assert_eq!(meta.var1, 0xAA);
        assert_eq!(meta.magic, 0x1234_5678);
        assert_eq!(meta.uid, 0xDEAD_BEEF);
        assert_eq!((meta.var2, meta.var3), (0, 0));
    }

    #[test]
    fn file_meta_rejects_magic_mismatch() {
        let data = Builder::new()
            .u32(0)
            .u32(0)
            .u32(0x1234_5678)
            .u64(1)
            .u32(0x1234_0000)
            .u32(0)
            .u32(0)
            .into_vec();

        match FileMeta::parse(&mut Cursor::new(&data)) {
            Err(FormatError::MagicMismatch { expected, got, .. }) => {
                assert_eq!(expected, 0x1234_5678);
                assert_eq!(got, 0x1234_0000);
            }
            other => panic!("expected MagicMismatch, got {other:?}"),
        }
    }

    #[test]
    fn file_piece_framing() {
        let data = Builder::new()
            .u32(2)
            .raw(b"mm")
            .u32(4)
            .u32(0xCAFE)
            .raw(b"data")
            .into_vec();

        let piece = FilePiece::parse(&mut Cursor::new(&data)).unwrap();
        assert_eq!(piece.magic, 0xCAFE);
        assert_eq!(piece.meta.as_ref(), b"mm");
        assert_eq!(piece.data.as_ref(), b"data");
    }
}
