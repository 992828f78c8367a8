//! Support for decoding the texture payload format.
//!
//! A forge texture is a plain GPU surface with a mangled header and a trailer
//! tucked behind the pixel data. The decoder maps the proprietary format code
//! to a canonical DXGI format id and reconstructs the real dimensions from
//! the mip-chain adjusted values; the raw blob between header and trailer,
//! together with those three values, is everything an external DDS
//! transcoder needs.

use std::io::{Cursor, Seek, SeekFrom};

use binrw::BinRead;
use bytes::Bytes;
use snafu::{OptionExt, ResultExt, ensure};

use crate::format::{
    DecodeSnafu, IoSnafu, MagicMismatchSnafu, Result, UnexpectedEofSnafu,
    UnknownTextureFormatSnafu, meta::FileMeta,
};

const TEXTURE_HEADER_MAGIC: u32 = 0x1323_7FE9;

/// Trailer size behind the pixel data.
const TRAILER_LEN: u64 = 0x29;

/// `file_type` magics of the known texture container kinds.
pub fn is_texture(file_type: u32) -> bool {
    matches!(
        file_type,
        0xD7B5_C478
            | 0xF9C8_0707
            | 0x59CE_4D13
            | 0x9F49_2D22
            | 0x3876_CCDF // textures4 archives
            | 0x9468_B9E2 // gui textures
            | 0x05A6_1FAD
    )
}

/// Proprietary format code to DXGI format id.
pub fn dxgi_format(code: u32) -> Option<u32> {
    Some(match code {
        0x00 => 87, // B8G8R8A8_UNORM
        0x02 => 71, // BC1_UNORM
        0x03 => 71, // BC1_UNORM
        0x04 => 74, // BC2_UNORM
        0x05 => 77, // BC3_UNORM
        0x06 => 83, // BC5_UNORM
        0x07 => 61, // R8_UNORM
        0x08 => 61, // R8_UNORM
        0x09 => 56, // R16_UNORM
        0x0B => 42, // R32_UINT
        0x0C => 3,  // R32G32B32A32_UINT
        0x0E => 80, // BC4_UNORM
        0x0F => 95, // BC6H_UF16
        0x10 => 98, // BC7_UNORM
        0x11 => 87, // B8G8R8A8_UNORM
        _ => return None,
    })
}

/// Header fields in front of the pixel data. Comments record observed values.
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(little)]
pub struct TextureHeader {
    pub format_code: u32,
    pub x04: u32, // 1
    pub x08: u32,
    /// Texture usage classifier: 0 diffuse, 1 normal maps, 2 roughness and
    /// the like, 3 icons/cubemaps, 4 LUTs, 6 B/W masks, 7 RGB masks.
    pub usage_class: u32,
    pub x10: u32,
    pub x14: u32,
    pub x18: u32,
    pub x1c: u32, // 0
    pub x20: u32, // 0
    pub x24: u32, // 0
    pub container_id: u32,
    pub x2c: u8,
    pub num_blocks: u16,
    pub x2f: u8,
    pub x30: u32, // 7
}

/// Trailer fields behind the pixel data. Comments record observed values.
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(little)]
pub struct TextureTrailer {
    /// Mip-chain adjusted width; shift by `mip_shift` for pixels.
    pub w: u32,
    /// Mip-chain adjusted height.
    pub h: u32,
    pub e8: u32, // 1
    pub ec: u32, // 0
    pub mip_shift: u32,
    pub e14: u32,
    pub mip_count: u32,
    pub e1c: u32,
    pub e20: u32, // 7
    pub e24: u32, // 7
    pub e28: u8,  // 1
}

/// A decoded texture payload.
///
/// Keeps the whole payload buffer so [`Texture::blob`] can hand out the raw
/// surface without another archive read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    data: Bytes,
    payload_start: u64,
    payload_end: u64,

    pub meta: FileMeta,
    pub header: TextureHeader,
    pub trailer: TextureTrailer,
    /// Canonical format id for [`TextureHeader::format_code`].
    pub dxgi_format: u32,
}

impl Texture {
    pub fn parse(data: Bytes) -> Result<Self> {
        const WHAT: &str = "texture header";

        let mut r = Cursor::new(data.as_ref());
        let meta = FileMeta::parse(&mut r)?;

        let at = r.position();
        let magic = u32::read_le(&mut r).context(DecodeSnafu { what: WHAT })?;
        ensure!(
            magic == TEXTURE_HEADER_MAGIC,
            MagicMismatchSnafu {
                expected: TEXTURE_HEADER_MAGIC as u64,
                got: magic as u64,
                at,
            }
        );

        let header = TextureHeader::read_le(&mut r).context(DecodeSnafu { what: WHAT })?;
        let dxgi_format = dxgi_format(header.format_code).context(UnknownTextureFormatSnafu {
            code: header.format_code,
        })?;

        let payload_start = r.position();
        let payload_end = (data.len() as u64)
            .checked_sub(TRAILER_LEN)
            .filter(|&end| end >= payload_start)
            .context(UnexpectedEofSnafu {
                what: "texture payload",
            })?;

        r.seek(SeekFrom::Start(payload_end)).context(IoSnafu)?;
        let trailer = TextureTrailer::read_le(&mut r).context(DecodeSnafu {
            what: "texture trailer",
        })?;

        Ok(Self {
            data,
            payload_start,
            payload_end,
            meta,
            header,
            trailer,
            dxgi_format,
        })
    }

    /// Real dimensions in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        (
            self.trailer.w >> self.trailer.mip_shift,
            self.trailer.h >> self.trailer.mip_shift,
        )
    }

    /// The raw surface bytes between header and trailer.
    pub fn blob(&self) -> Bytes {
        self.data
            .slice(self.payload_start as usize..self.payload_end as usize)
    }

    pub fn blob_len(&self) -> u64 {
        self.payload_end - self.payload_start
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::{Texture, is_texture};
    use crate::format::{FormatError, test_util::Builder};

    fn build_texture_payload(format_code: u32) -> Bytes {
        Builder::new()
            // file meta
            .u32(0)
            .u32(0)
            .u32(0xD7B5_C478)
            .u64(7)
            .u32(0xD7B5_C478)
            .u32(0)
            .u32(0)
            // header
            .u32(0x1323_7FE9)
            .u32(format_code)
            .u32(1)
            .u32(0)
            .u32(2) // usage class
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0xC0) // container id
            .u8(0)
            .u16(1) // block count
            .u8(0)
            .u32(7)
            // surface bytes
            .raw(&[0xAB; 16])
            // trailer
            .u32(1024)
            .u32(2048)
            .u32(1)
            .u32(0)
            .u32(1) // mip shift
            .u32(0)
            .u32(11) // mip count
            .u32(0)
            .u32(7)
            .u32(7)
            .u8(1)
            .into_vec()
            .into()
    }

    #[test]
    fn decodes_header_blob_and_trailer() {
        let tex = Texture::parse(build_texture_payload(0x0F)).unwrap();

        assert_eq!(tex.meta.uid, 7);
        assert_eq!(tex.header.usage_class, 2);
        assert_eq!(tex.header.container_id, 0xC0);
        assert_eq!(tex.trailer.mip_count, 11);

        assert_eq!(tex.dxgi_format, 95);
        assert_eq!(tex.dimensions(), (512, 1024));

        assert_eq!(tex.blob_len(), 16);
        assert_eq!(tex.blob().as_ref(), &[0xAB; 16]);
    }

    #[test]
    fn format_code_aliases_map_to_the_same_dxgi_id() {
        assert_eq!(Texture::parse(build_texture_payload(0x02)).unwrap().dxgi_format, 71);
        assert_eq!(Texture::parse(build_texture_payload(0x03)).unwrap().dxgi_format, 71);
        assert_eq!(Texture::parse(build_texture_payload(0x11)).unwrap().dxgi_format, 87);
    }

    #[test]
    fn unknown_format_codes_are_rejected() {
        match Texture::parse(build_texture_payload(0x42)) {
            Err(FormatError::UnknownTextureFormat { code }) => assert_eq!(code, 0x42),
            other => panic!("expected UnknownTextureFormat, got {other:?}"),
        }
    }

    #[test]
    fn known_texture_container_magics() {
        assert!(is_texture(0xD7B5_C478));
        assert!(is_texture(0x9468_B9E2));
        assert!(!is_texture(0xABEB_2DFB));
    }
}
