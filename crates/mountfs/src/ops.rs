//! Filesystem capability traits.
//!
//! [`FileSystem`] is the mandatory surface every backend implements.
//! Optional capabilities ([`Linker`], [`Syncer`]) are discovered at runtime
//! through the `as_*` accessor methods, which return `None` unless a backend
//! overrides them.
//!
//! Paths handed to a backend are relative to its own root. The router
//! strips the mount prefix before delegating, so a backend mounted at
//! `/data` sees `/data/x.txt` as `x.txt` and the mount point itself as `""`.

use std::fmt;
use std::io::{Read, Seek, Write};
use std::path::Path;
use std::time::SystemTime;

use crate::error::{VfsError, VfsResult};
use crate::types::{Link, LinkOptions, Metadata, OpenFlags};

/// An open file handle.
pub trait File: Read + Write + Seek + Send + fmt::Debug {
    /// Name the file was opened with.
    fn name(&self) -> &str;

    /// Metadata of the open file.
    fn stat(&self) -> VfsResult<Metadata>;

    /// Resize the file.
    fn truncate(&mut self, size: u64) -> VfsResult<()>;

    /// Flush buffered data to the backing store.
    fn sync(&mut self) -> VfsResult<()>;

    /// Close the handle. Further reads and writes fail.
    fn close(&mut self) -> VfsResult<()>;
}

/// Core filesystem operations.
pub trait FileSystem: Send + Sync {
    /// Short name of the implementation, e.g. `"memory"`.
    fn name(&self) -> &str;

    // ========================================================================
    // Handles
    // ========================================================================

    /// Open a file with explicit flags and permission bits for creation.
    fn open_file(&self, path: &Path, flags: OpenFlags, perm: u32) -> VfsResult<Box<dyn File>>;

    /// Open a file for reading.
    fn open(&self, path: &Path) -> VfsResult<Box<dyn File>> {
        self.open_file(path, OpenFlags::read(), 0)
    }

    /// Create or truncate a file and open it for reading and writing.
    fn create(&self, path: &Path) -> VfsResult<Box<dyn File>> {
        self.open_file(path, OpenFlags::create_truncate(), 0o666)
    }

    // ========================================================================
    // Namespace
    // ========================================================================

    /// Create a single directory. The parent must exist.
    fn mkdir(&self, path: &Path, perm: u32) -> VfsResult<()>;

    /// Create a directory and any missing parents.
    ///
    /// The default implementation only uses [`stat`](Self::stat) and
    /// [`mkdir`](Self::mkdir), one level at a time.
    fn mkdir_all(&self, path: &Path, perm: u32) -> VfsResult<()> {
        match self.stat(path) {
            Ok(meta) if meta.is_dir() => return Ok(()),
            Ok(_) => return Err(VfsError::not_a_directory(path.display().to_string())),
            Err(_) => {}
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && parent.parent().is_some() {
                self.mkdir_all(parent, perm)?;
            }
        }
        self.mkdir(path, perm)
    }

    /// Remove a file or empty directory.
    fn remove(&self, path: &Path) -> VfsResult<()>;

    /// Remove a path and everything below it. Missing paths are not an error.
    fn remove_all(&self, path: &Path) -> VfsResult<()>;

    /// Rename a file or directory.
    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()>;

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Metadata for a path.
    fn stat(&self, path: &Path) -> VfsResult<Metadata>;

    /// Entries of a directory, sorted by name.
    fn read_dir(&self, path: &Path) -> VfsResult<Vec<Metadata>>;

    /// Change permission bits.
    fn chmod(&self, path: &Path, perm: u32) -> VfsResult<()>;

    /// Change owner and group.
    fn chown(&self, path: &Path, uid: u32, gid: u32) -> VfsResult<()>;

    /// Change access and modification times.
    fn set_times(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> VfsResult<()>;

    // ========================================================================
    // Optional capabilities
    // ========================================================================

    /// URL generation, if this backend supports it.
    fn as_linker(&self) -> Option<&dyn Linker> {
        None
    }

    /// Flush-on-unmount, if this backend needs it.
    fn as_syncer(&self) -> Option<&dyn Syncer> {
        None
    }

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    fn exists(&self, path: &Path) -> bool {
        self.stat(path).is_ok()
    }

    /// Read an entire file.
    fn read_all(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let mut file = self.open(path)?;
        let mut data = Vec::new();
        let read = file.read_to_end(&mut data).map_err(VfsError::from);
        let closed = file.close();
        read?;
        closed?;
        Ok(data)
    }

    /// Replace the contents of a file, creating it if needed.
    fn write_all(&self, path: &Path, data: &[u8]) -> VfsResult<()> {
        let mut file = self.create(path)?;
        let written = file.write_all(data).map_err(VfsError::from);
        let closed = file.close();
        written?;
        closed
    }
}

/// Optional capability: generate URLs for files.
pub trait Linker: Send + Sync {
    /// A short-lived signed URL.
    fn presigned_url(&self, path: &Path, opts: &LinkOptions) -> VfsResult<Link>;

    /// A public URL.
    fn public_url(&self, path: &Path) -> VfsResult<Link>;

    /// A URL reachable from inside the deployment.
    fn internal_url(&self, path: &Path, opts: &LinkOptions) -> VfsResult<Link>;
}

/// Optional capability: flush state when the last mount goes away.
pub trait Syncer: Send + Sync {
    /// Flush everything to the backing store.
    fn sync(&self) -> VfsResult<()>;
}
