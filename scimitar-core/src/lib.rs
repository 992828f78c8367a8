//! Read-side unpacker for the forge asset containers of the scimitar engine.
//!
//! The crate decodes a directory of game-shipped archives into
//! semantically-interpreted assets:
//!
//! * [`format::forge`] parses the `.forge` container itself: header, entry
//!   table, name table, and the typed containers behind each entry.
//! * [`format::datablock`] decodes the chunked zstd store every file payload
//!   is wrapped in.
//! * [`format::mesh`] and [`format::texture`] decode the two non-trivial
//!   payload kinds: quantized vertex/index geometry and GPU texture blobs.
//! * [`format::depgraph`] parses `.depgraphbin` dependency graphs, and
//!   [`resolver`] joins them with the archives into a persistent cross-archive
//!   asset index.
//!
//! Everything is read-only; there is no repacking support.

pub mod format;
pub mod resolver;
