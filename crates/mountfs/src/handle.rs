//! Reference-counted file handles.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use crate::error::VfsResult;
use crate::mount::MountPoint;
use crate::ops::File;
use crate::types::Metadata;

/// A backend handle opened through a [`Vfs`](crate::Vfs).
///
/// Holds one open reference on the mount it came from. The reference is
/// given back exactly once: on the first [`close`](File::close), or on drop
/// if the handle was never closed.
pub struct MountedFile {
    inner: Box<dyn File>,
    mount: Option<Arc<MountPoint>>,
}

impl fmt::Debug for MountedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountedFile")
            .field("name", &self.inner.name())
            .field("mount", &self.mount.as_ref().map(|m| m.prefix()))
            .finish()
    }
}

impl MountedFile {
    /// Wrap `inner`, which must have been opened under a reference already
    /// taken on `mount`.
    pub(crate) fn new(inner: Box<dyn File>, mount: Arc<MountPoint>) -> Self {
        Self {
            inner,
            mount: Some(mount),
        }
    }

    /// Prefix of the mount this handle counts against, until closed.
    pub fn mount_prefix(&self) -> Option<&str> {
        self.mount.as_deref().map(MountPoint::prefix)
    }

    fn release(&mut self) {
        if let Some(mount) = self.mount.take() {
            tracing::trace!(prefix = mount.prefix(), file = self.inner.name(), "handle released");
            mount.release();
        }
    }
}

impl Read for MountedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for MountedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for MountedFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl File for MountedFile {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn stat(&self) -> VfsResult<Metadata> {
        self.inner.stat()
    }

    fn truncate(&mut self, size: u64) -> VfsResult<()> {
        self.inner.truncate(size)
    }

    fn sync(&mut self) -> VfsResult<()> {
        self.inner.sync()
    }

    fn close(&mut self) -> VfsResult<()> {
        let result = self.inner.close();
        self.release();
        result
    }
}

impl Drop for MountedFile {
    fn drop(&mut self) {
        self.release();
    }
}
