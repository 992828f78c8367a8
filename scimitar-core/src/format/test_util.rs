//! Byte-level fixture builders shared by the decoder tests.

/// Little-endian byte string builder.
pub(crate) struct Builder {
    buf: Vec<u8>,
}

impl Builder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    pub fn u16(mut self, v: u16) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i32(mut self, v: i32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(mut self, v: u64) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i16(mut self, v: i16) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn f32(mut self, v: f32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn pad(mut self, len: usize) -> Self {
        self.buf.resize(self.buf.len() + len, 0);
        self
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

/// Serialize a datablock from `(logical bytes, compress?)` chunks.
pub(crate) fn build_datablock(chunks: &[(&[u8], bool)]) -> Vec<u8> {
    let payloads: Vec<Vec<u8>> = chunks
        .iter()
        .map(|&(data, compress)| {
            if compress {
                let packed = zstd::bulk::compress(data, 0).unwrap();
                assert!(
                    packed.len() < data.len(),
                    "fixture chunk data must actually compress"
                );
                packed
            } else {
                data.to_vec()
            }
        })
        .collect();

    let mut b = Builder::new()
        .u16(2)
        .u16(3)
        .u8(0)
        .u16(0)
        .u32(chunks.len() as u32);
    for (&(data, _), packed) in chunks.iter().zip(&payloads) {
        b = b.u32(data.len() as u32).u32(packed.len() as u32);
    }
    for packed in &payloads {
        b = b.u32(0xABCD_EF01).raw(packed);
    }
    b.into_vec()
}

/// Serialize a `.depgraphbin` file from raw link tuples.
pub(crate) fn build_depgraph_file(
    links: &[(u64, u64, i32, u16, u8, u8)],
    compress: bool,
) -> Vec<u8> {
    let mut body = Builder::new().u8(2);
    for &(src, dst, x10, x14, x16, x17) in links {
        body = body.u64(src).u64(dst).i32(x10).u16(x14).u8(x16).u8(x17);
    }
    let body = body.into_vec();

    Builder::new()
        .u64(0x1014_FA99_57FB_AA34)
        .raw(&build_datablock(&[(&body, compress)]))
        .into_vec()
}

/// Serialize a minimal forge archive from `(uid, file_type, payload)` entries.
///
/// Payloads include their leading container magic. The caller is responsible
/// for making the first entry a descriptor and the last a hash, like the game
/// does.
pub(crate) fn build_forge(entries: &[(u64, u32, Vec<u8>)]) -> Vec<u8> {
    const HEADER_LEN: u64 = 0x7A;
    const ENTRY_LEN: u64 = 20;

    let n = entries.len() as u32;

    let mut payload_offset = HEADER_LEN + ENTRY_LEN * entries.len() as u64;
    let mut offsets = Vec::new();
    for (_, _, payload) in entries {
        offsets.push(payload_offset);
        payload_offset += payload.len() as u64;
    }
    let names_offset = payload_offset;

    let mut b = Builder::new()
        .raw(b"scimitar\0")
        .u32(30) // version
        .u32(0) // header offset
        .u32(0)
        .u32(0x10)
        .u32(0)
        .u8(0)
        .u32(n)
        .u32(2)
        .u32(0)
        .u32(0)
        .u32(0)
        .i32(-1)
        .i32(-1)
        .u32(n + 2)
        .u32(1)
        .u32(0x4A)
        .u32(0)
        .u32(n)
        .u32(2)
        .u32(0x7A)
        .u32(0)
        .i32(-1)
        .i32(-1)
        .u32(0)
        .u32(n + 1)
        .u64(names_offset)
        .u64(0);

    for (i, (uid, _, payload)) in entries.iter().enumerate() {
        b = b.u64(offsets[i]).u64(*uid).u32(payload.len() as u32);
    }
    for (_, _, payload) in entries {
        b = b.raw(payload);
    }
    for (_, file_type, _) in entries {
        b = b
            .u32(0)
            .u32(4)
            .u64(0)
            .u32(4)
            .pad(0xFF) // entry metadata
            .u8(0)
            .u32(1_700_000_000) // timestamp
            .u32(0)
            .i32(-1)
            .i32(-1)
            .u64(0)
            .u32(*file_type)
            .u32(0)
            .pad(12);
    }

    b.into_vec()
}
