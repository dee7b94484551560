//! # mountfs
//!
//! A composite virtual filesystem: independent backends mounted at path
//! prefixes and reached through one namespace, much like UNIX mounts.
//!
//! Key components:
//!
//! - [`FileSystem`] - Core trait every backend implements
//! - [`MountTable`] - Longest-prefix routing over a path trie
//! - [`Vfs`] - The router; a `FileSystem` in its own right
//! - [`MountedFile`] - Handle that keeps its mount busy until closed
//! - [`MemoryBackend`] - In-memory filesystem (default root, testing)
//! - [`LocalBackend`] - Host directory access (with path security)
//!
//! ## Design Decisions
//!
//! - **Deepest mount wins**: `/a/b` shadows `/a` for everything below it;
//!   a mount at `/` catches whatever nothing else claims.
//! - **Open handles pin mounts**: unmount fails with `Busy` rather than
//!   waiting. Callers close handles and retry.
//! - **No cross-backend emulation**: renaming between backends is refused.
//! - **Optional capabilities are opt-in**: [`FileSystem::as_linker`] and
//!   [`FileSystem::as_syncer`] return `None` unless a backend opts in.

pub mod backends;
mod config;
mod error;
mod handle;
mod mount;
mod ops;
pub mod path;
mod router;
mod types;

#[cfg(unix)]
pub use backends::LocalBackend;
pub use backends::MemoryBackend;
pub use config::{BackendConfig, MountEntry, VfsConfig};
pub use error::{ErrorKind, VfsError, VfsResult};
pub use handle::MountedFile;
pub use mount::{MountInfo, MountPoint, MountTable, Resolved};
pub use ops::{File, FileSystem, Linker, Syncer};
pub use router::Vfs;
pub use types::{FileType, Link, LinkOptions, Metadata, OpenFlags};
