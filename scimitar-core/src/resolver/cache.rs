//! The serialized cache artifacts.
//!
//! Each artifact is a CBOR file carrying a version envelope, so the cache
//! format can evolve without misreading stale data. All four artifacts must
//! be present and decodable for a load to succeed.

use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use snafu::{OptionExt, ensure};

use crate::resolver::{CacheCorruptSnafu, CacheWriteSnafu, Result};

pub(super) const UIDS_INDEX: &str = "uids_index.cbor";
pub(super) const ASSET_UIDS: &str = "asset_uids.cbor";
pub(super) const ALL_LINKS: &str = "all_links.cbor";
pub(super) const ASSET_CHILDREN: &str = "asset_children.cbor";

const CACHE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    data: T,
}

pub(super) fn store<T: Serialize>(dir: &Path, name: &str, data: &T) -> Result<()> {
    let path = dir.join(name);
    let file = File::create(&path)
        .ok()
        .context(CacheWriteSnafu { path: path.clone() })?;

    ciborium::into_writer(
        &Envelope {
            version: CACHE_VERSION,
            data,
        },
        BufWriter::new(file),
    )
    .ok()
    .context(CacheWriteSnafu { path })?;

    Ok(())
}

pub(super) fn load<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<T> {
    let path = dir.join(name);
    let file = File::open(&path)
        .ok()
        .context(CacheCorruptSnafu { path: path.clone() })?;

    let envelope: Envelope<T> = ciborium::from_reader(BufReader::new(file))
        .ok()
        .context(CacheCorruptSnafu { path: path.clone() })?;
    ensure!(
        envelope.version == CACHE_VERSION,
        CacheCorruptSnafu { path }
    );

    Ok(envelope.data)
}
