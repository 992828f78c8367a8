//! Decoders for the on-disk formats. All multi-byte fields are little-endian.

use snafu::Snafu;

pub mod asset;
pub mod datablock;
pub mod depgraph;
pub mod forge;
pub mod mesh;
pub mod meta;
pub mod texture;

#[cfg(test)]
pub(crate) mod test_util;

/// Errors produced while decoding archives and their payloads.
///
/// Only [`FormatError::UnknownContainerMagic`] is recovered locally (the
/// archive iterator demotes it to an unparsed container so enumeration can
/// continue); everything else propagates.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FormatError {
    #[snafu(display("i/o error"))]
    Io { source: std::io::Error },

    /// A hand-rolled bounds check hit the end of the stream.
    #[snafu(display("unexpected end of stream while reading {what}"))]
    UnexpectedEof { what: &'static str },

    /// A structured read failed (truncated stream, failed field assert).
    #[snafu(display("malformed {what}"))]
    Decode {
        what: &'static str,
        source: binrw::Error,
    },

    #[snafu(display("not a forge archive"))]
    NotAnArchive { source: binrw::Error },

    #[snafu(display("magic mismatch at 0x{at:X}: expected 0x{expected:X}, got 0x{got:X}"))]
    MagicMismatch { expected: u64, got: u64, at: u64 },

    #[snafu(display("no decoder for container magic 0x{magic:08X} (entry {index})"))]
    UnknownContainerMagic { magic: u32, index: usize },

    #[snafu(display("unknown descriptor value type 0x{dtype:X} for id 0x{id:X}"))]
    UnknownDescriptorType { id: u32, dtype: u32 },

    #[snafu(display("invalid depgraph file: leading magic 0x{got:016X}"))]
    InvalidDepgraph { got: u64 },

    #[snafu(display("unknown depgraph version 0x{version:02X}"))]
    UnknownDepgraphVersion { version: u8 },

    #[snafu(display(
        "unsupported mesh format: revision {revision}, vertex stride 0x{vert_stride:X}"
    ))]
    UnsupportedMeshFormat { revision: u32, vert_stride: u32 },

    #[snafu(display("unknown texture format code 0x{code:X}"))]
    UnknownTextureFormat { code: u32 },

    #[snafu(display("invalid zstd frame in chunk at 0x{offset:X}"))]
    ZstdFrameInvalid {
        offset: u64,
        source: std::io::Error,
    },

    #[snafu(display("chunk at 0x{offset:X} unpacked to {got} bytes, expected {expected}"))]
    UnpackedSizeMismatch {
        offset: u64,
        expected: u32,
        got: usize,
    },
}

pub type Result<T, E = FormatError> = std::result::Result<T, E>;

/// Truncate a fixed-width string field at its first NUL.
pub(crate) fn null_terminated(buf: &[u8]) -> &[u8] {
    match buf.iter().position(|&b| b == 0) {
        Some(end) => &buf[..end],
        None => buf,
    }
}

#[cfg(test)]
mod tests {
    use super::null_terminated;

    #[test]
    fn null_terminated_truncates() {
        assert_eq!(null_terminated(b"abc\0\0def"), b"abc");
        assert_eq!(null_terminated(b"\0"), b"");
        assert_eq!(null_terminated(b"no-nul"), b"no-nul");
    }
}
