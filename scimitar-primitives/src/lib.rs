//! Shared low-level plumbing for the scimitar crates.

pub mod byte_source;
