//! Splitting composite asset payloads.
//!
//! An "asset" entry aggregates references to the textures and meshes that
//! make up one game object. Its payload is a run of framed
//! [`FilePiece`](crate::format::meta::FilePiece)s; shader pieces additionally
//! split into a vertex blob and a fragment blob. Nothing beyond the split is
//! interpreted here.

use std::io::{Cursor, Read};

use binrw::BinRead;
use bytes::Bytes;
use snafu::ResultExt;

use crate::format::{DecodeSnafu, IoSnafu, Result, meta::FilePiece};

/// `file_type` magic of asset entries.
pub const ASSET_MAGIC: u32 = 0x22EC_BE63;

pub fn is_asset(file_type: u32) -> bool {
    file_type == ASSET_MAGIC
}

/// Split an asset payload into its framed pieces, reading to the end of the
/// buffer.
pub fn split_pieces(data: &[u8]) -> Result<Vec<FilePiece>> {
    let mut r = Cursor::new(data);
    let mut pieces = Vec::new();
    while (r.position() as usize) < data.len() {
        pieces.push(FilePiece::parse(&mut r)?);
    }
    Ok(pieces)
}

/// The pieces whose payload magic matches.
pub fn pieces_with_magic(pieces: &[FilePiece], magic: u32) -> impl Iterator<Item = &FilePiece> {
    pieces.iter().filter(move |piece| piece.magic == magic)
}

/// A shader payload split into its two stage blobs. The tail is whatever
/// follows the blobs; it is preserved, not interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderPair {
    pub vertex: Bytes,
    pub fragment: Bytes,
    pub tail: Bytes,
}

/// Split a shader piece into vertex and fragment blobs.
pub fn split_shader(data: &[u8]) -> Result<ShaderPair> {
    const WHAT: &str = "shader piece";

    let mut r = Cursor::new(data);

    let vertex_len = u32::read_le(&mut r).context(DecodeSnafu { what: WHAT })?;
    let mut vertex = vec![0; vertex_len as usize];
    r.read_exact(&mut vertex).context(IoSnafu)?;
    u8::read_le(&mut r).context(DecodeSnafu { what: WHAT })?; // NUL

    let fragment_len = u32::read_le(&mut r).context(DecodeSnafu { what: WHAT })?;
    let mut fragment = vec![0; fragment_len as usize];
    r.read_exact(&mut fragment).context(IoSnafu)?;
    u8::read_le(&mut r).context(DecodeSnafu { what: WHAT })?; // NUL

    // padding, an entry count and one extra byte precede the tail
    let mut padding = [0; 0x10];
    r.read_exact(&mut padding).context(IoSnafu)?;
    u32::read_le(&mut r).context(DecodeSnafu { what: WHAT })?;
    u8::read_le(&mut r).context(DecodeSnafu { what: WHAT })?;

    let tail = data[r.position() as usize..].to_vec();

    Ok(ShaderPair {
        vertex: vertex.into(),
        fragment: fragment.into(),
        tail: tail.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::{is_asset, pieces_with_magic, split_pieces, split_shader};
    use crate::format::test_util::Builder;

    fn piece(magic: u32, meta: &[u8], data: &[u8]) -> Builder {
        Builder::new()
            .u32(meta.len() as u32)
            .raw(meta)
            .u32(data.len() as u32)
            .u32(magic)
            .raw(data)
    }

    #[test]
    fn splits_framed_pieces_to_the_end() {
        let data = piece(0xAAAA, b"m1", b"first")
            .raw(&piece(0xBBBB, b"", b"second").into_vec())
            .raw(&piece(0xAAAA, b"m3", b"").into_vec())
            .into_vec();

        let pieces = split_pieces(&data).unwrap();
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0].data.as_ref(), b"first");
        assert_eq!(pieces[1].magic, 0xBBBB);
        assert_eq!(pieces[2].meta.as_ref(), b"m3");

        assert_eq!(pieces_with_magic(&pieces, 0xAAAA).count(), 2);
        assert!(is_asset(0x22EC_BE63));
    }

    #[test]
    fn truncated_piece_is_an_error() {
        let mut data = piece(0x1, b"", b"payload").into_vec();
        data.truncate(data.len() - 2);
        assert!(split_pieces(&data).is_err());
    }

    #[test]
    fn shader_blobs_split_at_their_length_prefixes() {
        let data = Builder::new()
            .u32(4)
            .raw(b"vert")
            .u8(0)
            .u32(4)
            .raw(b"frag")
            .u8(0)
            .pad(0x10)
            .u32(3) // entry count
            .u8(0)
            .raw(b"tail bytes")
            .into_vec();

        let shader = split_shader(&data).unwrap();
        assert_eq!(shader.vertex.as_ref(), b"vert");
        assert_eq!(shader.fragment.as_ref(), b"frag");
        assert_eq!(shader.tail.as_ref(), b"tail bytes");
    }
}
