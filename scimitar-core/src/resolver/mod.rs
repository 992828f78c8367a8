//! Cross-archive asset index.
//!
//! The game spreads an asset's pieces over many archives: an "asset" entry
//! in one forge references texture and mesh uids that live elsewhere. This
//! module scans a directory of `.forge` and `.depgraphbin` files once,
//! builds the uid index and the filtered asset dependency graph, and
//! persists both into a cache directory so later runs skip the scan.
//!
//! Cache invalidation is the caller's job: delete the directory whenever the
//! game distribution updates.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};
use tracing::info;

use crate::format::{
    FormatError,
    asset::ASSET_MAGIC,
    depgraph::{DepGraph, Link},
    forge::Forge,
};

mod cache;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ResolverError {
    #[snafu(display("cache directory {} does not exist", path.display()))]
    CacheMissing { path: PathBuf },

    #[snafu(display("cache artifact {} is missing or unreadable", path.display()))]
    CacheCorrupt { path: PathBuf },

    #[snafu(display("failed to write cache artifact {}", path.display()))]
    CacheWrite { path: PathBuf },

    #[snafu(display("i/o error on {}", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse {}", path.display()))]
    Parse {
        path: PathBuf,
        source: FormatError,
    },
}

pub type Result<T, E = ResolverError> = std::result::Result<T, E>;

/// Where one uid lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryLocation {
    /// File name of the archive holding the entry.
    pub forge: String,
    /// Position of the entry within that archive.
    pub index: u32,
    /// `file_type` magic from the entry's name record.
    pub file_type: u32,
}

/// The generated index: uid locations plus the asset dependency graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinksIndex {
    pub uids_index: BTreeMap<u64, EntryLocation>,
    pub asset_uids: BTreeSet<u64>,
    pub all_links: DepGraph,
    /// `all_links` restricted to links whose source is an asset.
    pub asset_children: DepGraph,
}

impl LinksIndex {
    /// Scan every archive and dependency graph in `forges_dir`.
    pub fn generate(forges_dir: impl AsRef<Path>) -> Result<Self> {
        let forges_dir = forges_dir.as_ref();

        let mut uids_index = BTreeMap::new();
        let mut asset_uids = BTreeSet::new();

        for path in files_with_extension(forges_dir, "forge")? {
            info!(path = %path.display(), "scanning archive");
            let forge = Forge::open(&path).context(ParseSnafu { path: path.clone() })?;
            let forge_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            for (index, (entry, name)) in forge.entries().iter().zip(forge.names()).enumerate() {
                if name.file_type == ASSET_MAGIC {
                    asset_uids.insert(entry.uid);
                }
                uids_index.insert(
                    entry.uid,
                    EntryLocation {
                        forge: forge_name.clone(),
                        index: index as u32,
                        file_type: name.file_type,
                    },
                );
            }
        }

        let mut all_links = DepGraph::new();
        for path in files_with_extension(forges_dir, "depgraphbin")? {
            info!(path = %path.display(), "gathering dependencies");
            all_links
                .merge_from(&path)
                .context(ParseSnafu { path })?;
        }

        let asset_children: DepGraph = all_links
            .links()
            .filter(|link| asset_uids.contains(&link.src))
            .copied()
            .collect();

        info!(
            uids = uids_index.len(),
            assets = asset_uids.len(),
            links = all_links.len(),
            asset_links = asset_children.len(),
            "index generated"
        );

        Ok(Self {
            uids_index,
            asset_uids,
            all_links,
            asset_children,
        })
    }

    /// Load all four artifacts from a cache directory.
    pub fn load(cache_dir: impl AsRef<Path>) -> Result<Self> {
        let cache_dir = cache_dir.as_ref();
        ensure!(
            cache_dir.is_dir(),
            CacheMissingSnafu { path: cache_dir }
        );

        Ok(Self {
            uids_index: cache::load(cache_dir, cache::UIDS_INDEX)?,
            asset_uids: cache::load(cache_dir, cache::ASSET_UIDS)?,
            all_links: cache::load(cache_dir, cache::ALL_LINKS)?,
            asset_children: cache::load(cache_dir, cache::ASSET_CHILDREN)?,
        })
    }

    /// Persist all four artifacts into a cache directory.
    pub fn save(&self, cache_dir: impl AsRef<Path>) -> Result<()> {
        let cache_dir = cache_dir.as_ref();
        std::fs::create_dir_all(cache_dir).context(IoSnafu { path: cache_dir })?;

        cache::store(cache_dir, cache::UIDS_INDEX, &self.uids_index)?;
        cache::store(cache_dir, cache::ASSET_UIDS, &self.asset_uids)?;
        cache::store(cache_dir, cache::ALL_LINKS, &self.all_links)?;
        cache::store(cache_dir, cache::ASSET_CHILDREN, &self.asset_children)?;
        Ok(())
    }

    /// Load from the cache when it exists, otherwise scan and persist.
    pub fn load_or_generate(
        forges_dir: impl AsRef<Path>,
        cache_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        if cache_dir.as_ref().is_dir() {
            Self::load(cache_dir)
        } else {
            let index = Self::generate(forges_dir)?;
            index.save(cache_dir)?;
            Ok(index)
        }
    }

    pub fn locate(&self, uid: u64) -> Option<&EntryLocation> {
        self.uids_index.get(&uid)
    }

    pub fn is_asset(&self, uid: u64) -> bool {
        self.asset_uids.contains(&uid)
    }

    /// Links from assets that reference `uid`.
    pub fn assets_referencing(&self, uid: u64) -> Vec<&Link> {
        self.asset_children.links_to(uid)
    }

    /// Uids the asset `uid` depends on.
    pub fn children_of_asset(&self, uid: u64) -> Vec<u64> {
        self.asset_children.children_of(uid)
    }
}

fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).context(IoSnafu { path: dir })? {
        let entry = entry.context(IoSnafu { path: dir })?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == extension) {
            paths.push(path);
        }
    }
    // directory order is platform-dependent; keep the scan deterministic
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{LinksIndex, ResolverError};
    use crate::format::{
        asset::ASSET_MAGIC,
        test_util::{Builder, build_datablock, build_depgraph_file, build_forge},
    };

    fn descriptor_payload() -> Vec<u8> {
        Builder::new().u32(1).into_vec()
    }

    fn hash_payload() -> Vec<u8> {
        Builder::new().u32(6).u64(0xFEED).u32(0).into_vec()
    }

    fn file_payload(contents: &[u8]) -> Vec<u8> {
        Builder::new()
            .u32(0x57FB_AA34)
            .u32(0x1014_FA99)
            .raw(&build_datablock(&[(contents, false)]))
            .into_vec()
    }

    fn populate_forges_dir(dir: &std::path::Path) {
        let forge_a = build_forge(&[
            (1, 1, descriptor_payload()),
            (100, ASSET_MAGIC, file_payload(b"asset")),
            (101, 0xABEB_2DFB, file_payload(b"mesh")),
            (2, 6, hash_payload()),
        ]);
        let forge_b = build_forge(&[
            (3, 1, descriptor_payload()),
            (200, 0xD7B5_C478, file_payload(b"texture")),
            (4, 6, hash_payload()),
        ]);
        fs::write(dir.join("datapc64_a.forge"), forge_a).unwrap();
        fs::write(dir.join("datapc64_b.forge"), forge_b).unwrap();

        // the asset pulls in the mesh and the texture; uid 300 links to
        // nothing we track
        let graph_a = build_depgraph_file(
            &[(100, 101, 0, 0, 0, 0), (300, 200, 0, 0, 0, 0)],
            false,
        );
        let graph_b = build_depgraph_file(&[(100, 200, 0, 0, 0, 0)], false);
        fs::write(dir.join("a.depgraphbin"), graph_a).unwrap();
        fs::write(dir.join("b.depgraphbin"), graph_b).unwrap();
    }

    #[test]
    fn generate_builds_the_uid_index_and_filters_asset_links() {
        let dir = tempfile::tempdir().unwrap();
        populate_forges_dir(dir.path());

        let index = LinksIndex::generate(dir.path()).unwrap();

        assert_eq!(index.uids_index.len(), 7);
        let loc = index.locate(101).unwrap();
        assert_eq!(loc.forge, "datapc64_a.forge");
        assert_eq!(loc.index, 2);
        assert_eq!(loc.file_type, 0xABEB_2DFB);

        assert!(index.is_asset(100));
        assert!(!index.is_asset(101));

        assert_eq!(index.all_links.len(), 3);
        // the 300 -> 200 link is not asset-sourced and gets filtered
        assert_eq!(index.asset_children.len(), 2);
        assert_eq!(index.children_of_asset(100), [101, 200]);

        let referencing = index.assets_referencing(200);
        assert_eq!(referencing.len(), 1);
        assert_eq!(referencing[0].src, 100);
    }

    #[test]
    fn cache_round_trips_and_loads_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        populate_forges_dir(dir.path());
        let cache = dir.path().join("cache");

        let index = LinksIndex::generate(dir.path()).unwrap();
        index.save(&cache).unwrap();

        let first = LinksIndex::load(&cache).unwrap();
        let second = LinksIndex::load(&cache).unwrap();
        assert_eq!(first, index);
        assert_eq!(first, second);
    }

    #[test]
    fn load_or_generate_persists_on_first_use() {
        let dir = tempfile::tempdir().unwrap();
        populate_forges_dir(dir.path());
        let cache = dir.path().join("cache");

        let generated = LinksIndex::load_or_generate(dir.path(), &cache).unwrap();
        assert!(cache.is_dir());

        let loaded = LinksIndex::load_or_generate(dir.path(), &cache).unwrap();
        assert_eq!(generated, loaded);
    }

    #[test]
    fn missing_cache_dir_is_distinguished_from_corrupt_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        populate_forges_dir(dir.path());
        let cache = dir.path().join("cache");

        assert!(matches!(
            LinksIndex::load(&cache),
            Err(ResolverError::CacheMissing { .. })
        ));

        let index = LinksIndex::generate(dir.path()).unwrap();
        index.save(&cache).unwrap();

        fs::remove_file(cache.join("all_links.cbor")).unwrap();
        assert!(matches!(
            LinksIndex::load(&cache),
            Err(ResolverError::CacheCorrupt { .. })
        ));

        index.save(&cache).unwrap();
        fs::write(cache.join("asset_uids.cbor"), b"not cbor").unwrap();
        assert!(matches!(
            LinksIndex::load(&cache),
            Err(ResolverError::CacheCorrupt { .. })
        ));
    }
}
