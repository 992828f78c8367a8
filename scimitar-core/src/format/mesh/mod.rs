//! Support for decoding the mesh payload format.
//!
//! A mesh stores shared vertex streams plus triangle "islands": sets of
//! triangles within one LOD that share a material id. Triangle indices are
//! not a flat dump; they come in 0x180-byte chunks of 64 triangles, and the
//! last chunk of an island is padded with copies of the last valid vertex
//! index, forming degenerate `(k, k, k)` triplets that get trimmed on read.
//!
//! Island metadata is LOD-major: `num_lods × num_islands` descriptors, the
//! descriptors of LOD 0 first.

use std::io::{Cursor, Read, Seek, SeekFrom};

use binrw::{BinRead, BinResult};
use glam::{Vec2, Vec3, Vec4};
use indexmap::IndexMap;
use itertools::Itertools;
use snafu::{ResultExt, ensure};
use tracing::warn;

use crate::format::{
    DecodeSnafu, IoSnafu, MagicMismatchSnafu, Result, UnsupportedMeshFormatSnafu, meta::FileMeta,
};

mod vertex;

pub const TRIS_IN_CHUNK: usize = 64;
pub const TRIS_CHUNK_BYTES: u32 = 0x180;

/// `file_type` magic of mesh payload entries.
pub const MESH_MAGIC: u32 = 0xABEB_2DFB;
const MESH_HEADER_MAGIC: u32 = 0xFC9E_1595;

pub fn is_mesh(file_type: u32) -> bool {
    file_type == MESH_MAGIC
}

/// Per-island, per-LOD metadata.
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(little)]
pub struct IslandDescriptor {
    pub x00: u32,
    /// Added to every triangle index of the island when building a view.
    pub vert_offset: u32,
    pub vert_count: u32,
    pub tris_chunk_offset: u32,
    pub tris_chunk_count: u32,
    /// Material bucket the island belongs to.
    pub mat_id: u32,
    pub x18: u32,
    pub x1c: u32,
    pub x20: u32,
}

/// Axis-aligned island bounds, stored as eight floats. Kept verbatim.
#[derive(BinRead, Debug, Clone, Copy, PartialEq)]
#[br(little)]
pub struct BoundingBox(pub [f32; 8]);

/// Believed to map island bones to skinning data; only partially understood.
/// The full record is preserved verbatim in `raw`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IslandSkinMapping {
    pub x00: u16,
    pub bones_used: u8,
    pub mat_id: u8,
    pub x04: u16,
    pub vert_buf_len: u16,
    pub indices: Vec<u8>,
    pub x108: u32,
    pub raw: [u8; Self::SIZE],
}

impl IslandSkinMapping {
    pub const SIZE: usize = 0x10C;

    fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let mut raw = [0u8; Self::SIZE];
        r.read_exact(&mut raw).context(IoSnafu)?;

        let len = raw[8] as usize;
        Ok(Self {
            x00: u16::from_le_bytes([raw[0], raw[1]]),
            bones_used: raw[2],
            mat_id: raw[3],
            x04: u16::from_le_bytes([raw[4], raw[5]]),
            vert_buf_len: u16::from_le_bytes([raw[6], raw[7]]),
            indices: raw[9..9 + len].to_vec(),
            x108: u32::from_le_bytes(raw[0x108..].try_into().unwrap()),
            raw,
        })
    }
}

#[derive(BinRead, Debug, Clone, Copy, PartialEq)]
#[br(little)]
struct RawMeshHeader {
    x00: u32, // 0x14
    revision: u32,
    vert_stride: u32,
    verts_data_len: u32,
    tris_data_len: u32,
    vertmaps_data_len: u32,
    un2: u32,
    trisblock_stat_len: u32,
    triunknown_len: u32,
    x24: u32, // 0
    x28: u32, // 0
    usage_class: u32,
    num_lods: u32,
    mesh_type: i32,
    num_islands: u32,
    x3c: u32, // 0
    x40: f32,
    x44: f32,
    rng3_len: u32,
}

/// A fully decoded mesh payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub meta: FileMeta,
    pub size_till_footer: u32,

    pub x00: u32,
    pub revision: u32,
    pub vert_stride: u32,
    pub verts_data_len: u32,
    pub tris_data_len: u32,
    pub vertmaps_data_len: u32,
    pub un2: u32,
    pub trisblock_stat_len: u32,
    pub triunknown_len: u32,
    pub usage_class: u32,
    pub num_lods: u32,
    pub mesh_type: i32,
    pub num_islands: u32,
    pub x40: f32,
    pub x44: f32,
    pub rng3_len: u32,
    pub num_verts: u32,

    pub verts: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub tangents: Option<Vec<Vec3>>,
    pub binormals: Option<Vec<Vec3>>,
    /// Zero or more color sets, one entry per set.
    pub colors: Vec<Vec<Vec4>>,
    pub uvs: Option<Vec<Vec2>>,
    /// The 20 reserved floats per vertex of the 0x5C layout; meaning unknown.
    pub reserved_floats: Vec<[f32; 20]>,

    /// Trimmed triangle lists, LOD-major, one per island descriptor.
    pub islands: Vec<Vec<[u16; 3]>>,
    pub island_metas: Vec<IslandDescriptor>,
    pub island_bboxes: Vec<BoundingBox>,
    pub island_skin_mappings: Vec<IslandSkinMapping>,

    /// One `num_verts`-sized map per LOD.
    pub vertmaps: Vec<Vec<u16>>,
    /// Eleven floats per triangle chunk.
    pub chunk_stats: Vec<[f32; 11]>,
    /// One opaque 4-byte record per stored triangle, padding included.
    pub tri_extras: Vec<[u8; 4]>,
}

impl Mesh {
    pub fn parse(data: &[u8]) -> Result<Self> {
        const WHAT: &str = "mesh header";

        let mut r = Cursor::new(data);
        let meta = FileMeta::parse(&mut r)?;

        let at = r.position();
        let magic = u32::read_le(&mut r).context(DecodeSnafu { what: WHAT })?;
        ensure!(
            magic == MESH_HEADER_MAGIC,
            MagicMismatchSnafu {
                expected: MESH_HEADER_MAGIC as u64,
                got: magic as u64,
                at,
            }
        );
        let size_till_footer = u32::read_le(&mut r).context(DecodeSnafu { what: WHAT })?;

        let h = RawMeshHeader::read_le(&mut r).context(DecodeSnafu { what: WHAT })?;
        if !matches!(h.vert_stride, 0x18 | 0x1C | 0x24 | 0x28 | 0x2C | 0x5C) {
            warn!("unknown vertex stride 0x{:X}", h.vert_stride);
        }
        ensure!(
            h.vert_stride != 0,
            UnsupportedMeshFormatSnafu {
                revision: h.revision,
                vert_stride: h.vert_stride,
            }
        );

        let num_verts = h.verts_data_len / h.vert_stride;
        let verts_start = r.position();
        let tris_start = verts_start + h.verts_data_len as u64;
        let extra_start = tris_start + h.tris_data_len as u64;
        let tail_start = extra_start
            + h.vertmaps_data_len as u64
            + h.un2 as u64
            + h.trisblock_stat_len as u64
            + h.triunknown_len as u64;

        // tail: island descriptors (LOD-major), bounding boxes, skin mappings
        r.seek(SeekFrom::Start(tail_start)).context(IoSnafu)?;
        let island_metas = read_stream(
            &mut r,
            h.num_islands as usize * h.num_lods as usize,
            IslandDescriptor::read_le,
        )
        .context(DecodeSnafu {
            what: "island descriptors",
        })?;
        let island_bboxes = read_stream(&mut r, h.num_islands as usize, BoundingBox::read_le)
            .context(DecodeSnafu {
                what: "island bounding boxes",
            })?;
        let mut island_skin_mappings = Vec::with_capacity(h.num_islands as usize);
        for _ in 0..h.num_islands {
            island_skin_mappings.push(IslandSkinMapping::parse(&mut r)?);
        }

        // vertex streams
        r.seek(SeekFrom::Start(verts_start)).context(IoSnafu)?;
        let n = num_verts as usize;
        let mut verts = Vec::new();
        let mut normals = None;
        let mut tangents = None;
        let mut binormals = None;
        let mut colors: Vec<Vec<Vec4>> = Vec::new();
        let mut uvs = None;
        let mut reserved_floats = Vec::new();

        const STREAM: &str = "vertex streams";
        match (h.revision, h.vert_stride) {
            (0, 0x18 | 0x1C) => {
                // interleaved: position, unknown bytes, uv
                let skip = h.vert_stride as i64 - 12;
                let mut uv = Vec::with_capacity(n);
                for _ in 0..n {
                    verts.push(
                        vertex::read_quantized_pos(&mut r).context(DecodeSnafu { what: STREAM })?,
                    );
                    r.seek(SeekFrom::Current(skip)).context(IoSnafu)?;
                    uv.push(vertex::read_half_uv(&mut r).context(DecodeSnafu { what: STREAM })?);
                }
                uvs = Some(uv);
            }
            (1 | 2, 0x18 | 0x1C) => {
                verts = read_stream(&mut r, n, vertex::read_quantized_pos)
                    .context(DecodeSnafu { what: STREAM })?;
                normals = Some(
                    read_stream(&mut r, n, vertex::read_packed_vec)
                        .context(DecodeSnafu { what: STREAM })?,
                );
                tangents = Some(
                    read_stream(&mut r, n, vertex::read_packed_vec)
                        .context(DecodeSnafu { what: STREAM })?,
                );
                binormals = Some(
                    read_stream(&mut r, n, vertex::read_packed_vec)
                        .context(DecodeSnafu { what: STREAM })?,
                );
                if h.vert_stride == 0x1C {
                    colors.push(
                        read_stream(&mut r, n, vertex::read_packed_color)
                            .context(DecodeSnafu { what: STREAM })?,
                    );
                }
                uvs = Some(
                    read_stream(&mut r, n, vertex::read_half_uv)
                        .context(DecodeSnafu { what: STREAM })?,
                );
            }
            (1 | 2, 0x24 | 0x28 | 0x2C) => {
                verts =
                    read_stream(&mut r, n, vertex::read_pos).context(DecodeSnafu { what: STREAM })?;
                normals = Some(
                    read_stream(&mut r, n, vertex::read_packed_vec)
                        .context(DecodeSnafu { what: STREAM })?,
                );
                tangents = Some(
                    read_stream(&mut r, n, vertex::read_packed_vec)
                        .context(DecodeSnafu { what: STREAM })?,
                );
                binormals = Some(
                    read_stream(&mut r, n, vertex::read_packed_vec)
                        .context(DecodeSnafu { what: STREAM })?,
                );
                uvs = Some(
                    read_stream(&mut r, n, vertex::read_half_uv)
                        .context(DecodeSnafu { what: STREAM })?,
                );
                for _ in 0..(h.vert_stride - 0x1C) / 4 {
                    colors.push(
                        read_stream(&mut r, n, vertex::read_packed_color)
                            .context(DecodeSnafu { what: STREAM })?,
                    );
                }
            }
            (1 | 2, 0x5C) => {
                // position plus 20 reserved floats, interleaved
                for _ in 0..n {
                    verts.push(vertex::read_pos(&mut r).context(DecodeSnafu { what: STREAM })?);
                    reserved_floats.push(
                        <[f32; 20]>::read_le(&mut r).context(DecodeSnafu { what: STREAM })?,
                    );
                }
            }
            _ => {
                return UnsupportedMeshFormatSnafu {
                    revision: h.revision,
                    vert_stride: h.vert_stride,
                }
                .fail();
            }
        }

        // triangle chunks, read sequentially in island order
        r.seek(SeekFrom::Start(tris_start)).context(IoSnafu)?;
        let mut islands = Vec::with_capacity(island_metas.len());
        for island_meta in &island_metas {
            let count = island_meta.tris_chunk_count as usize * TRIS_IN_CHUNK * 3;
            let indices =
                read_stream(&mut r, count, u16::read_le).context(DecodeSnafu {
                    what: "triangle indices",
                })?;
            islands.push(collect_island_triangles(indices));
        }

        // vertex maps, one per LOD
        let mut vertmaps = Vec::new();
        if h.vertmaps_data_len > 0 {
            r.seek(SeekFrom::Start(extra_start)).context(IoSnafu)?;
            for _ in 0..h.num_lods {
                vertmaps.push(read_stream(&mut r, n, u16::read_le).context(DecodeSnafu {
                    what: "vertex maps",
                })?);
            }
        }

        // per-chunk statistics
        let mut chunk_stats = Vec::new();
        if h.trisblock_stat_len > 0 {
            r.seek(SeekFrom::Start(
                extra_start + h.vertmaps_data_len as u64 + h.un2 as u64,
            ))
            .context(IoSnafu)?;
            chunk_stats = read_stream(
                &mut r,
                (h.tris_data_len / TRIS_CHUNK_BYTES) as usize,
                <[f32; 11]>::read_le,
            )
            .context(DecodeSnafu {
                what: "chunk statistics",
            })?;
        }

        // per-triangle opaque records
        let mut tri_extras = Vec::new();
        if h.triunknown_len > 0 {
            r.seek(SeekFrom::Start(
                extra_start
                    + h.vertmaps_data_len as u64
                    + h.un2 as u64
                    + h.trisblock_stat_len as u64,
            ))
            .context(IoSnafu)?;
            tri_extras = read_stream(&mut r, h.triunknown_len as usize / 4, <[u8; 4]>::read_le)
                .context(DecodeSnafu {
                    what: "per-triangle records",
                })?;
        }

        Ok(Self {
            meta,
            size_till_footer,
            x00: h.x00,
            revision: h.revision,
            vert_stride: h.vert_stride,
            verts_data_len: h.verts_data_len,
            tris_data_len: h.tris_data_len,
            vertmaps_data_len: h.vertmaps_data_len,
            un2: h.un2,
            trisblock_stat_len: h.trisblock_stat_len,
            triunknown_len: h.triunknown_len,
            usage_class: h.usage_class,
            num_lods: h.num_lods,
            mesh_type: h.mesh_type,
            num_islands: h.num_islands,
            x40: h.x40,
            x44: h.x44,
            rng3_len: h.rng3_len,
            num_verts,
            verts,
            normals,
            tangents,
            binormals,
            colors,
            uvs,
            reserved_floats,
            islands,
            island_metas,
            island_bboxes,
            island_skin_mappings,
            vertmaps,
            chunk_stats,
            tri_extras,
        })
    }

    /// Build a cleaned view of one LOD.
    ///
    /// `islands` selects island indices within the LOD (`None` for all).
    /// With `prune_isolated`, vertices referenced by no triangle are dropped
    /// and triangle indices remapped.
    ///
    /// Panics if `lod` or an island index is out of range.
    pub fn build_view(&self, lod: u32, islands: Option<&[u32]>, prune_isolated: bool) -> MeshView {
        assert!(lod < self.num_lods, "lod {lod} >= {}", self.num_lods);

        let mut view = MeshView {
            verts: self.verts.clone(),
            normals: self.normals.clone(),
            uvs: self.uvs.clone(),
            colors: self.colors.clone(),
            islands: IndexMap::new(),
        };

        let all: Vec<u32>;
        let selection = match islands {
            Some(islands) => islands,
            None => {
                all = (0..self.num_islands).collect();
                all.as_slice()
            }
        };

        for &island in selection {
            assert!(
                island < self.num_islands,
                "island {island} >= {}",
                self.num_islands
            );
            let index = (lod * self.num_islands + island) as usize;
            let island_meta = &self.island_metas[index];
            let offset = island_meta.vert_offset;

            view.islands
                .entry(island_meta.mat_id)
                .or_default()
                .extend(
                    self.islands[index]
                        .iter()
                        .map(|tri| tri.map(|v| v as u32 + offset)),
                );
        }

        if prune_isolated {
            prune_isolated_verts(&mut view);
        }
        view
    }
}

/// A cleaned per-LOD mesh view: shared vertex data plus triangles bucketed by
/// material id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshView {
    pub verts: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub uvs: Option<Vec<Vec2>>,
    pub colors: Vec<Vec<Vec4>>,
    pub islands: IndexMap<u32, Vec<[u32; 3]>>,
}

fn read_stream<R, T>(
    r: &mut R,
    count: usize,
    mut read_one: impl FnMut(&mut R) -> BinResult<T>,
) -> BinResult<Vec<T>> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(read_one(r)?);
    }
    Ok(out)
}

/// Trim the trailing degenerate `(k, k, k)` padding triplets and group what
/// remains into triangles.
fn collect_island_triangles(mut indices: Vec<u16>) -> Vec<[u16; 3]> {
    if let Some(&last) = indices.last() {
        let sentinel = [last; 3];
        let mut end = indices.len();
        while end >= 3 && indices[end - 3..end] == sentinel {
            end -= 3;
        }
        indices.truncate(end);
    }

    indices
        .into_iter()
        .tuples()
        .map(|(a, b, c)| [a, b, c])
        .collect()
}

fn prune_isolated_verts(view: &mut MeshView) {
    let used: Vec<u32> = view
        .islands
        .values()
        .flatten()
        .flatten()
        .copied()
        .collect::<std::collections::BTreeSet<u32>>()
        .into_iter()
        .collect();
    let remap: std::collections::HashMap<u32, u32> = used
        .iter()
        .enumerate()
        .map(|(new, &old)| (old, new as u32))
        .collect();

    view.verts = filter_by_indices(&view.verts, &used);
    if let Some(normals) = &mut view.normals {
        *normals = filter_by_indices(normals, &used);
    }
    if let Some(uvs) = &mut view.uvs {
        *uvs = filter_by_indices(uvs, &used);
    }
    for set in &mut view.colors {
        *set = filter_by_indices(set, &used);
    }

    for tris in view.islands.values_mut() {
        for tri in tris {
            *tri = tri.map(|v| remap[&v]);
        }
    }
}

fn filter_by_indices<T: Copy>(items: &[T], keep: &[u32]) -> Vec<T> {
    keep.iter()
        .filter(|&&i| (i as usize) < items.len())
        .map(|&i| items[i as usize])
        .collect()
}
