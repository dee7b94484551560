//! The composite filesystem.

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{VfsError, VfsResult};
use crate::handle::MountedFile;
use crate::mount::{MountInfo, MountPoint, MountTable, Resolved, same_backend};
use crate::ops::{File, FileSystem, Linker};
use crate::path;
use crate::types::{Link, LinkOptions, Metadata, OpenFlags};

/// A filesystem assembled from backends mounted at path prefixes.
///
/// Every call resolves its path through the [`MountTable`] and is forwarded
/// to the matched backend with the prefix stripped. A `Vfs` is itself a
/// [`FileSystem`], so it can be mounted inside another `Vfs`, but never
/// inside itself.
///
/// # Example
///
/// ```rust
/// use std::path::Path;
/// use std::sync::Arc;
/// use mountfs::{FileSystem, MemoryBackend, Vfs};
///
/// let vfs = Vfs::new();
/// vfs.mount("/", Arc::new(MemoryBackend::new())).unwrap();
/// vfs.mount("/data", Arc::new(MemoryBackend::new())).unwrap();
///
/// vfs.write_all(Path::new("/data/x.txt"), b"hello").unwrap();
/// assert_eq!(vfs.read_all(Path::new("/data/x.txt")).unwrap(), b"hello");
/// assert!(!vfs.exists(Path::new("/x.txt")));
/// ```
#[derive(Debug, Default)]
pub struct Vfs {
    table: MountTable,
}

impl Vfs {
    /// Name reported by [`FileSystem::name`].
    pub const NAME: &'static str = "vfs";

    /// Create a router with nothing mounted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `fs` at `prefix`. See [`MountTable::mount`].
    ///
    /// Fails with [`VfsError::Recursive`] if `fs` is this router.
    pub fn mount(&self, prefix: &str, fs: Arc<dyn FileSystem>) -> VfsResult<()> {
        if !path::to_slash(prefix).starts_with('/') {
            return Err(VfsError::invalid_argument("mount", prefix));
        }
        if std::ptr::addr_eq(Arc::as_ptr(&fs), self as *const Self) {
            return Err(VfsError::Recursive(prefix.to_string()));
        }
        self.table.mount(prefix, fs)
    }

    /// Unmount by prefix, backend, or both. See [`MountTable::unmount`].
    pub fn unmount(&self, prefix: &str, fs: Option<&Arc<dyn FileSystem>>) -> VfsResult<()> {
        self.table.unmount(prefix, fs)
    }

    /// Snapshot of all mounts, sorted by prefix.
    pub fn mounts(&self) -> Vec<MountInfo> {
        self.table.mounts()
    }

    /// Resolve `path` without touching the backend.
    pub fn resolve(&self, path: &Path) -> VfsResult<Resolved> {
        self.table.resolve(path)
    }

    /// The underlying mount table.
    pub fn mount_table(&self) -> &MountTable {
        &self.table
    }

    /// Open a file and return the concrete tracked handle.
    ///
    /// The mount's open count is raised before the backend is called and
    /// lowered again if the backend fails.
    pub fn open_tracked(&self, path: &Path, flags: OpenFlags, perm: u32) -> VfsResult<MountedFile> {
        let Resolved { mount, relative } = self.table.resolve_and_acquire(path)?;
        match mount.fs().open_file(&relative, flags, perm) {
            Ok(inner) => Ok(MountedFile::new(inner, mount)),
            Err(e) => {
                mount.release();
                Err(rebase(e, &[(&mount, relative.as_path(), path)]))
            }
        }
    }

    fn with_linker<T>(
        &self,
        op: &'static str,
        path: &Path,
        f: impl FnOnce(&dyn Linker, &Path) -> VfsResult<T>,
    ) -> VfsResult<T> {
        let r = self.table.resolve(path)?;
        let linker = r
            .fs()
            .as_linker()
            .ok_or_else(|| VfsError::not_supported(op, path.display().to_string()))?;
        f(linker, &r.relative).map_err(|e| r.rebase(e, path))
    }
}

impl Resolved {
    fn rebase(&self, err: VfsError, requested: &Path) -> VfsError {
        rebase(err, &[(&self.mount, self.relative.as_path(), requested)])
    }
}

/// Move the path in a backend error from the backend's namespace into the
/// router's.
///
/// Each candidate is a mount, the relative path handed to its backend, and
/// the path the caller asked for. A payload naming the relative path itself
/// becomes the requested path; one naming an ancestor of it is rejoined
/// under the mount prefix. Anything else, and the error kind, is left as
/// the backend reported it.
fn rebase(mut err: VfsError, candidates: &[(&Arc<MountPoint>, &Path, &Path)]) -> VfsError {
    if let Some(payload) = err.path_mut() {
        if let Some(full) = rebased_path(payload, candidates) {
            *payload = full;
        }
    }
    err
}

fn rebased_path(payload: &str, candidates: &[(&Arc<MountPoint>, &Path, &Path)]) -> Option<String> {
    let reported = path::rooted(Path::new(payload));
    let exact = candidates
        .iter()
        .find(|&&(_, relative, _)| path::rooted(relative) == reported)
        .map(|&(_, _, requested)| requested.display().to_string());
    exact.or_else(|| {
        candidates
            .iter()
            .find(|&&(_, relative, _)| path::is_within(&path::rooted(relative), &reported))
            .map(|&(mount, _, _)| path::join_rooted(mount.prefix(), &reported))
    })
}

impl FileSystem for Vfs {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn open_file(&self, path: &Path, flags: OpenFlags, perm: u32) -> VfsResult<Box<dyn File>> {
        Ok(Box::new(self.open_tracked(path, flags, perm)?))
    }

    fn mkdir(&self, path: &Path, perm: u32) -> VfsResult<()> {
        let r = self.table.resolve(path)?;
        r.fs().mkdir(&r.relative, perm).map_err(|e| r.rebase(e, path))
    }

    fn remove(&self, path: &Path) -> VfsResult<()> {
        let r = self.table.resolve(path)?;
        r.fs().remove(&r.relative).map_err(|e| r.rebase(e, path))
    }

    fn remove_all(&self, path: &Path) -> VfsResult<()> {
        let r = self.table.resolve(path)?;
        r.fs().remove_all(&r.relative).map_err(|e| r.rebase(e, path))
    }

    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        let src = self.table.resolve(from)?;
        let dst = self.table.resolve(to)?;
        if !same_backend(src.fs(), dst.fs()) {
            return Err(VfsError::not_supported("rename", from.display().to_string()));
        }
        src.fs().rename(&src.relative, &dst.relative).map_err(|e| {
            rebase(
                e,
                &[
                    (&src.mount, src.relative.as_path(), from),
                    (&dst.mount, dst.relative.as_path(), to),
                ],
            )
        })
    }

    fn stat(&self, path: &Path) -> VfsResult<Metadata> {
        let r = self.table.resolve(path)?;
        r.fs().stat(&r.relative).map_err(|e| r.rebase(e, path))
    }

    fn read_dir(&self, path: &Path) -> VfsResult<Vec<Metadata>> {
        let r = self.table.resolve(path)?;
        r.fs().read_dir(&r.relative).map_err(|e| r.rebase(e, path))
    }

    fn chmod(&self, path: &Path, perm: u32) -> VfsResult<()> {
        let r = self.table.resolve(path)?;
        r.fs().chmod(&r.relative, perm).map_err(|e| r.rebase(e, path))
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> VfsResult<()> {
        let r = self.table.resolve(path)?;
        r.fs().chown(&r.relative, uid, gid).map_err(|e| r.rebase(e, path))
    }

    fn set_times(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> VfsResult<()> {
        let r = self.table.resolve(path)?;
        r.fs().set_times(&r.relative, atime, mtime).map_err(|e| r.rebase(e, path))
    }

    fn as_linker(&self) -> Option<&dyn Linker> {
        Some(self)
    }
}

impl Linker for Vfs {
    fn presigned_url(&self, path: &Path, opts: &LinkOptions) -> VfsResult<Link> {
        self.with_linker("presigned_url", path, |linker, rel| linker.presigned_url(rel, opts))
    }

    fn public_url(&self, path: &Path) -> VfsResult<Link> {
        self.with_linker("public_url", path, |linker, rel| linker.public_url(rel))
    }

    fn internal_url(&self, path: &Path, opts: &LinkOptions) -> VfsResult<Link> {
        self.with_linker("internal_url", path, |linker, rel| linker.internal_url(rel, opts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;
    use crate::error::ErrorKind;

    fn memory() -> Arc<dyn FileSystem> {
        Arc::new(MemoryBackend::new())
    }

    #[test]
    fn test_self_mount_is_recursive() {
        let vfs = Arc::new(Vfs::new());
        let as_fs: Arc<dyn FileSystem> = vfs.clone();
        let err = vfs.mount("/loop", as_fs).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Recursive);
        assert!(vfs.mounts().is_empty());
    }

    #[test]
    fn test_invalid_prefix_checked_before_recursion() {
        let vfs = Arc::new(Vfs::new());
        let as_fs: Arc<dyn FileSystem> = vfs.clone();
        let err = vfs.mount("loop", as_fs).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_nested_vfs() {
        let inner = Arc::new(Vfs::new());
        inner.mount("/", memory()).unwrap();
        inner.mount("/deep", memory()).unwrap();

        let outer = Vfs::new();
        outer.mount("/", memory()).unwrap();
        outer.mount("/inner", inner.clone()).unwrap();

        outer.write_all(Path::new("/inner/deep/f.txt"), b"nested").unwrap();
        assert_eq!(inner.read_all(Path::new("/deep/f.txt")).unwrap(), b"nested");
        assert!(!outer.exists(Path::new("/deep/f.txt")));
    }

    #[test]
    fn test_rename_same_backend() {
        let vfs = Vfs::new();
        vfs.mount("/a", memory()).unwrap();
        vfs.write_all(Path::new("/a/old.txt"), b"x").unwrap();
        vfs.rename(Path::new("/a/old.txt"), Path::new("/a/new.txt")).unwrap();
        assert!(vfs.exists(Path::new("/a/new.txt")));
        assert!(!vfs.exists(Path::new("/a/old.txt")));
    }

    #[test]
    fn test_rename_across_backends() {
        let vfs = Vfs::new();
        vfs.mount("/a", memory()).unwrap();
        vfs.mount("/b", memory()).unwrap();
        vfs.write_all(Path::new("/a/file.txt"), b"x").unwrap();

        let err = vfs
            .rename(Path::new("/a/file.txt"), Path::new("/b/file.txt"))
            .unwrap_err();
        assert!(matches!(err, VfsError::NotSupported { op: "rename", ref path } if path == "/a/file.txt"));
        assert!(vfs.exists(Path::new("/a/file.txt")));
    }

    #[test]
    fn test_rename_between_prefixes_of_one_backend() {
        let shared = memory();
        let vfs = Vfs::new();
        vfs.mount("/a", Arc::clone(&shared)).unwrap();
        vfs.mount("/b", Arc::clone(&shared)).unwrap();
        vfs.write_all(Path::new("/a/file.txt"), b"x").unwrap();

        vfs.rename(Path::new("/a/file.txt"), Path::new("/b/moved.txt"))
            .unwrap();
        assert!(vfs.exists(Path::new("/a/moved.txt")));
    }

    #[test]
    fn test_link_without_linker() {
        let vfs = Vfs::new();
        vfs.mount("/", memory()).unwrap();
        let err = vfs.public_url(Path::new("/a.txt")).unwrap_err();
        assert!(matches!(err, VfsError::NotSupported { op: "public_url", .. }));
        let err = vfs
            .presigned_url(Path::new("/a.txt"), &LinkOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
    }

    #[test]
    fn test_open_failure_releases_reference() {
        let vfs = Vfs::new();
        vfs.mount("/data", memory()).unwrap();
        let err = vfs.open(Path::new("/data/missing.txt")).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(vfs.mounts()[0].open_count, 0);
        vfs.unmount("/data", None).unwrap();
    }

    #[test]
    fn test_create_is_tracked() {
        let vfs = Vfs::new();
        vfs.mount("/data", memory()).unwrap();
        let mut file = vfs.create(Path::new("/data/new.txt")).unwrap();
        assert_eq!(vfs.mounts()[0].open_count, 1);
        assert_eq!(vfs.mount_table().len(), 1);
        file.close().unwrap();
        assert_eq!(vfs.mounts()[0].open_count, 0);
    }

    #[test]
    fn test_backend_errors_name_the_requested_path() {
        let shared = memory();
        let vfs = Vfs::new();
        vfs.mount("/", memory()).unwrap();
        vfs.mount("/data", Arc::clone(&shared)).unwrap();
        vfs.mount("/alias", Arc::clone(&shared)).unwrap();

        let err = vfs.stat(Path::new("/data/missing")).unwrap_err();
        assert!(matches!(err, VfsError::NotFound(ref p) if p == "/data/missing"));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = vfs.open(Path::new("/data/nope.txt")).unwrap_err();
        assert!(matches!(err, VfsError::NotFound(ref p) if p == "/data/nope.txt"));

        let err = vfs.stat(Path::new("/top.txt")).unwrap_err();
        assert!(matches!(err, VfsError::NotFound(ref p) if p == "/top.txt"));

        // The backend blames a missing parent.
        let err = vfs.mkdir(Path::new("/data/a/b"), 0o755).unwrap_err();
        assert!(matches!(err, VfsError::NotFound(ref p) if p == "/data/a"));

        vfs.write_all(Path::new("/data/f"), b"x").unwrap();
        let err = vfs
            .rename(Path::new("/data/f"), Path::new("/alias/no/g"))
            .unwrap_err();
        assert!(matches!(err, VfsError::NotFound(ref p) if p == "/alias/no"));

        // Errors without a path are untouched.
        let ro = Vfs::new();
        ro.mount("/ro", Arc::new(MemoryBackend::read_only())).unwrap();
        let err = ro.mkdir(Path::new("/ro/d"), 0o755).unwrap_err();
        assert!(matches!(err, VfsError::ReadOnly));
    }

    #[test]
    fn test_nested_errors_name_the_outer_path() {
        let inner = Arc::new(Vfs::new());
        inner.mount("/", memory()).unwrap();
        let outer = Vfs::new();
        outer.mount("/inner", inner).unwrap();

        let err = outer.stat(Path::new("/inner/deep/x")).unwrap_err();
        assert!(matches!(err, VfsError::NotFound(ref p) if p == "/inner/deep/x"));
    }

    #[test]
    fn test_handle_debug_shows_mount() {
        let vfs = Vfs::new();
        vfs.mount("/data", memory()).unwrap();
        let file: Box<dyn File> = vfs.create(Path::new("/data/f")).unwrap();
        let shown = format!("{file:?}");
        assert!(shown.contains("MountedFile"), "{shown}");
        assert!(shown.contains("/data"), "{shown}");
    }

    #[test]
    fn test_no_mount_error_carries_path() {
        let vfs = Vfs::new();
        let err = vfs.stat(Path::new("/nothing/here.txt")).unwrap_err();
        assert!(matches!(err, VfsError::NoMountPoint(ref p) if p == "/nothing/here.txt"));
    }
}
