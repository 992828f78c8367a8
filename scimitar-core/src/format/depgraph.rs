//! Support for `.depgraphbin` dependency graph files.
//!
//! A depgraph file is a datablock (see [`crate::format::datablock`]) whose
//! decompressed contents are a version byte followed by a flat run of
//! [`Link`] records. The game ships several of them; merging is a set union
//! over structural link equality, so merge order does not matter.

use std::{io::Cursor, path::Path};

use binrw::BinRead;
use scimitar_primitives::byte_source::SliceSource;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};

use crate::format::{
    DecodeSnafu, InvalidDepgraphSnafu, IoSnafu, Result, UnknownDepgraphVersionSnafu,
    datablock::Datablock, forge::container::DATA_MAGIC,
};

const DEPGRAPH_VERSION: u8 = 0x02;

/// A directed dependency edge: `src` depends on `dst`.
///
/// The four trailing fields are preserved but not interpreted; they take part
/// in link identity, matching the serialized form.
#[derive(
    BinRead,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[br(little)]
pub struct Link {
    pub src: u64,
    pub dst: u64,
    pub x10: i32,
    pub x14: u16,
    pub x16: u8,
    pub x17: u8,
}

/// The union of all parsed dependency links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepGraph {
    links: std::collections::BTreeSet<Link>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut graph = Self::new();
        graph.merge_from(path)?;
        Ok(graph)
    }

    /// Parse another depgraph file and union its links into this graph.
    pub fn merge_from(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let data = std::fs::read(path).context(IoSnafu)?;
        self.merge_from_slice(&data)
    }

    pub fn merge_from_slice(&mut self, data: &[u8]) -> Result<()> {
        let mut r = Cursor::new(data);
        let magic = u64::read_le(&mut r).context(DecodeSnafu {
            what: "depgraph magic",
        })?;
        ensure!(magic == DATA_MAGIC, InvalidDepgraphSnafu { got: magic });

        let block = Datablock::parse(&mut r)?;
        let unpacked = block.decompress(&SliceSource::new(data))?;

        let mut r = Cursor::new(unpacked.as_ref());
        let version = u8::read_le(&mut r).context(DecodeSnafu {
            what: "depgraph version",
        })?;
        ensure!(
            version == DEPGRAPH_VERSION,
            UnknownDepgraphVersionSnafu { version }
        );

        let end = unpacked.len() as u64;
        while r.position() < end {
            let link = Link::read_le(&mut r).context(DecodeSnafu {
                what: "dependency link",
            })?;
            self.links.insert(link);
        }

        Ok(())
    }

    /// Union another graph into this one.
    pub fn merge(&mut self, other: &DepGraph) {
        self.links.extend(other.links.iter().copied());
    }

    pub fn insert(&mut self, link: Link) -> bool {
        self.links.insert(link)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    /// Uids that `uid` depends on.
    pub fn children_of(&self, uid: u64) -> Vec<u64> {
        self.links
            .iter()
            .filter(|link| link.src == uid)
            .map(|link| link.dst)
            .collect()
    }

    /// Uids that depend on `uid`.
    pub fn parents_of(&self, uid: u64) -> Vec<u64> {
        self.links
            .iter()
            .filter(|link| link.dst == uid)
            .map(|link| link.src)
            .collect()
    }

    /// Full links originating at `uid`.
    pub fn links_from(&self, uid: u64) -> Vec<&Link> {
        self.links.iter().filter(|link| link.src == uid).collect()
    }

    /// Full links pointing at `uid`.
    pub fn links_to(&self, uid: u64) -> Vec<&Link> {
        self.links.iter().filter(|link| link.dst == uid).collect()
    }

    pub fn linked(&self, src: u64, dst: u64) -> bool {
        self.links
            .iter()
            .any(|link| link.src == src && link.dst == dst)
    }
}

impl FromIterator<Link> for DepGraph {
    fn from_iter<I: IntoIterator<Item = Link>>(iter: I) -> Self {
        Self {
            links: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DepGraph;
    use crate::format::{FormatError, test_util::build_depgraph_file};

    const L1: (u64, u64, i32, u16, u8, u8) = (1, 10, 0, 0, 0, 0);
    const L2: (u64, u64, i32, u16, u8, u8) = (1, 11, -1, 2, 3, 4);
    const L3: (u64, u64, i32, u16, u8, u8) = (2, 10, 0, 0, 0, 0);

    #[test]
    fn parses_links() {
        let data = build_depgraph_file(&[L1, L2], false);
        let mut graph = DepGraph::new();
        graph.merge_from_slice(&data).unwrap();

        assert_eq!(graph.len(), 2);
        assert!(graph.linked(1, 10));
        assert!(graph.linked(1, 11));
        assert!(!graph.linked(10, 1));

        let link = *graph.links_to(11)[0];
        assert_eq!((link.x10, link.x14, link.x16, link.x17), (-1, 2, 3, 4));
    }

    #[test]
    fn parses_compressed_graphs() {
        let links: Vec<_> = (0..64).map(|i| (1u64, i as u64, 0, 0, 0, 0)).collect();
        let data = build_depgraph_file(&links, true);

        let mut graph = DepGraph::new();
        graph.merge_from_slice(&data).unwrap();
        assert_eq!(graph.len(), 64);
    }

    #[test]
    fn merge_is_a_set_union_in_any_order() {
        let a = build_depgraph_file(&[L1, L2], false);
        let b = build_depgraph_file(&[L2, L3], false);

        let mut ab = DepGraph::new();
        ab.merge_from_slice(&a).unwrap();
        ab.merge_from_slice(&b).unwrap();

        let mut ba = DepGraph::new();
        ba.merge_from_slice(&b).unwrap();
        ba.merge_from_slice(&a).unwrap();

        assert_eq!(ab.len(), 3);
        assert_eq!(ab, ba);
    }

    #[test]
    fn queries_walk_both_directions() {
        let data = build_depgraph_file(&[L1, L2, L3], false);
        let mut graph = DepGraph::new();
        graph.merge_from_slice(&data).unwrap();

        assert_eq!(graph.children_of(1), [10, 11]);
        assert_eq!(graph.parents_of(10), [1, 2]);
        assert_eq!(graph.links_from(2).len(), 1);
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let mut data = build_depgraph_file(&[L1], false);
        data[0] ^= 0xFF;
        assert!(matches!(
            DepGraph::new().merge_from_slice(&data),
            Err(FormatError::InvalidDepgraph { .. })
        ));

        // version byte sits at the start of the stored chunk payload
        let mut data = build_depgraph_file(&[L1], false);
        let version_at = data.len() - (L1_BYTES + 1);
        data[version_at] = 0x03;
        match DepGraph::new().merge_from_slice(&data) {
            Err(FormatError::UnknownDepgraphVersion { version }) => assert_eq!(version, 3),
            other => panic!("expected UnknownDepgraphVersion, got {other:?}"),
        }
    }

    const L1_BYTES: usize = 24;
}
