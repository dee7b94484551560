//! Filesystem backends.
//!
//! Backends implement [`FileSystem`](crate::FileSystem) for different
//! storage types and are mounted into a [`Vfs`](crate::Vfs).

#[cfg(unix)]
mod local;
mod memory;

#[cfg(unix)]
pub use local::LocalBackend;
pub use memory::MemoryBackend;
