//! # mountfs-trie
//!
//! A trie keyed by path segments, the lookup structure behind the mount
//! table. Keys are split by a pluggable [`Segmenter`]:
//!
//! - [`path_segmenter`]: general purpose, one segment per `/`-prefixed run
//! - [`mount_segmenter`]: tolerant of repeated and trailing separators,
//!   and keeps the root key `/` in a node of its own
//!
//! Lookups come in three flavours: [`PathTrie::get_exact`],
//! [`PathTrie::get`] (deepest existing node) and
//! [`PathTrie::longest_match`] (deepest node holding a value).

mod segment;
mod trie;

pub use segment::{Segmenter, Segments, mount_segmenter, path_segmenter};
pub use trie::PathTrie;
