//! Mount table with longest-prefix routing.
//!
//! Mount points live in a [`PathTrie`] split by [`mount_segmenter`], guarded
//! by a single read/write lock. Resolution takes the read lock; mount and
//! unmount take the write lock for the mutation only.

use std::fmt;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use mountfs_trie::{PathTrie, mount_segmenter};
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::{VfsError, VfsResult};
use crate::ops::FileSystem;
use crate::path;

/// A mounted backend.
///
/// Shared between the table and every handle opened through it, so a handle
/// can release its reference even after the mount was replaced.
pub struct MountPoint {
    prefix: String,
    fs: Arc<dyn FileSystem>,
    open_count: AtomicU32,
}

impl fmt::Debug for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountPoint")
            .field("prefix", &self.prefix)
            .field("fs", &self.fs.name())
            .field("open_count", &self.open_count())
            .finish()
    }
}

impl MountPoint {
    fn new(prefix: String, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            prefix,
            fs,
            open_count: AtomicU32::new(0),
        }
    }

    /// Normalized mount prefix, e.g. `/data`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The mounted backend.
    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Number of handles currently open through this mount.
    pub fn open_count(&self) -> u32 {
        self.open_count.load(Ordering::Acquire)
    }

    /// True if this mount holds exactly `fs`.
    pub fn is_backed_by(&self, fs: &Arc<dyn FileSystem>) -> bool {
        same_backend(&self.fs, fs)
    }

    /// Take one open reference.
    pub(crate) fn acquire(&self) -> VfsResult<()> {
        self.open_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_add(1))
            .map(|_| ())
            .map_err(|_| VfsError::TooManyOpenFiles(self.prefix.clone()))
    }

    /// Drop one open reference.
    ///
    /// # Panics
    ///
    /// If the count is already zero. That means a handle released twice,
    /// which is a bookkeeping bug and not something callers can recover from.
    pub(crate) fn release(&self) {
        let released =
            self.open_count
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if released.is_err() {
            panic!("open count underflow on mount {}", self.prefix);
        }
    }
}

/// Snapshot of one mount, as returned by [`MountTable::mounts`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountInfo {
    /// The mount prefix (e.g., "/data").
    pub prefix: String,
    /// Name of the mounted backend.
    pub backend: String,
    /// Handles open at the time of the snapshot.
    pub open_count: u32,
}

/// Outcome of resolving a path against the table.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// The matched mount.
    pub mount: Arc<MountPoint>,
    /// Path relative to the mount, without a leading separator. Empty for
    /// the mount point itself.
    pub relative: PathBuf,
}

impl Resolved {
    fn new(mount: &Arc<MountPoint>, relative: &str) -> Self {
        Self {
            mount: Arc::clone(mount),
            relative: PathBuf::from(relative),
        }
    }

    /// The backend the path resolved to.
    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        self.mount.fs()
    }
}

/// Routes paths to mounted backends.
///
/// Mount points are matched by longest prefix. If `/mnt` and `/mnt/project`
/// are both mounted, `/mnt/project/src/main.rs` routes to `/mnt/project`
/// while `/mnt/other` routes to `/mnt`. A mount at `/` catches every path no
/// other mount claims.
pub struct MountTable {
    mounts: RwLock<PathTrie<Arc<MountPoint>>>,
}

impl fmt::Debug for MountTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountTable")
            .field("mounts", &self.mounts())
            .finish()
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MountTable {
    /// Create a new empty mount table.
    pub fn new() -> Self {
        Self {
            mounts: RwLock::new(PathTrie::with_segmenter(mount_segmenter)),
        }
    }

    /// Mount `fs` at `prefix`, replacing whatever was mounted there.
    ///
    /// The prefix must be absolute. It does not need to exist as a
    /// directory anywhere. A replaced mount is not drained: handles opened
    /// through it stay valid and keep counting against the old mount point.
    #[tracing::instrument(skip(self, fs), fields(backend = fs.name()), name = "mtab.mount")]
    pub fn mount(&self, prefix: &str, fs: Arc<dyn FileSystem>) -> VfsResult<()> {
        let slashed = path::to_slash(prefix);
        if !slashed.starts_with('/') {
            return Err(VfsError::invalid_argument("mount", prefix));
        }
        let prefix = path::clean(&slashed);
        let mount = Arc::new(MountPoint::new(prefix.clone(), fs));

        let mut mounts = self.mounts.write();
        if let Some(old) = mounts.get_exact(&prefix) {
            let open = old.open_count();
            if open > 0 {
                tracing::warn!(
                    prefix = %prefix,
                    open,
                    "replacing mount that still has open handles"
                );
            }
        }
        mounts.put(&prefix, mount);
        tracing::debug!(prefix = %prefix, "mounted");
        Ok(())
    }

    /// Remove a mount.
    ///
    /// `prefix` selects by mount prefix and `fs` by backend identity; an
    /// empty prefix matches any prefix and `None` matches any backend. At
    /// least one selector is required. The first matching mount is removed,
    /// unless handles are still open through it.
    ///
    /// Once no other prefix refers to the removed backend, its
    /// [`Syncer`](crate::ops::Syncer) capability (if any) runs outside the
    /// lock and its error becomes the result.
    #[tracing::instrument(skip(self, fs), name = "mtab.unmount")]
    pub fn unmount(&self, prefix: &str, fs: Option<&Arc<dyn FileSystem>>) -> VfsResult<()> {
        if prefix.is_empty() && fs.is_none() {
            return Err(VfsError::invalid_argument("unmount", prefix));
        }
        let wanted = path::clean(&path::to_slash(prefix));
        let any_prefix = wanted == ".";

        let removed = {
            let mut mounts = self.mounts.write();
            let found = mounts.walk(|_, mount| {
                let prefix_ok = any_prefix || mount.prefix == wanted;
                let fs_ok = fs.is_none_or(|fs| mount.is_backed_by(fs));
                if prefix_ok && fs_ok {
                    ControlFlow::Break(Arc::clone(mount))
                } else {
                    ControlFlow::Continue(())
                }
            });
            let ControlFlow::Break(mount) = found else {
                return Err(VfsError::not_found(prefix));
            };
            if mount.open_count() != 0 {
                let requested = if any_prefix { mount.prefix() } else { prefix };
                return Err(VfsError::Busy(requested.to_string()));
            }
            mounts.delete(&mount.prefix);
            mount
        };
        tracing::debug!(prefix = %removed.prefix, "unmounted");

        let still_mounted = {
            let mounts = self.mounts.read();
            mounts
                .walk(|_, mount| {
                    if mount.is_backed_by(&removed.fs) {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                })
                .is_break()
        };
        if still_mounted {
            return Ok(());
        }

        if let Some(syncer) = removed.fs.as_syncer() {
            if let Err(e) = syncer.sync() {
                tracing::warn!(prefix = %removed.prefix, error = %e, "sync on unmount failed");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Find the mount serving `path` and the path relative to it.
    pub fn resolve(&self, path: &Path) -> VfsResult<Resolved> {
        let cleaned = path::rooted(path);
        let mounts = self.mounts.read();
        Self::lookup(&mounts, &cleaned).ok_or_else(|| {
            tracing::debug!(path = %path.display(), "no mount point");
            VfsError::no_mount_point(path.display().to_string())
        })
    }

    /// Resolve `path` and take an open reference on the mount.
    ///
    /// The reference is taken while the read lock is held, so an unmount
    /// cannot slip in between the lookup and the increment.
    pub fn resolve_and_acquire(&self, path: &Path) -> VfsResult<Resolved> {
        let cleaned = path::rooted(path);
        let mounts = self.mounts.read();
        let resolved = Self::lookup(&mounts, &cleaned).ok_or_else(|| {
            tracing::debug!(path = %path.display(), "no mount point");
            VfsError::no_mount_point(path.display().to_string())
        })?;
        resolved.mount.acquire()?;
        Ok(resolved)
    }

    fn lookup(mounts: &PathTrie<Arc<MountPoint>>, cleaned: &str) -> Option<Resolved> {
        if let Some((mount, rest)) = mounts.longest_match(cleaned) {
            return Some(Resolved::new(mount, rest));
        }
        mounts
            .get_exact("/")
            .map(|root| Resolved::new(root, cleaned.trim_start_matches('/')))
    }

    /// Snapshot of all mounts, sorted by prefix.
    pub fn mounts(&self) -> Vec<MountInfo> {
        let mounts = self.mounts.read();
        let mut list = Vec::with_capacity(mounts.len());
        let _ = mounts.walk(|_, mount| {
            list.push(MountInfo {
                prefix: mount.prefix.clone(),
                backend: mount.fs.name().to_string(),
                open_count: mount.open_count(),
            });
            ControlFlow::<()>::Continue(())
        });
        list.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        list
    }

    /// Number of mounts.
    pub fn len(&self) -> usize {
        self.mounts.read().len()
    }

    /// True if nothing is mounted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Backend identity. Compares data pointers only, so two `Arc`s to the
/// same object compare equal even if their vtables differ.
pub(crate) fn same_backend(a: &Arc<dyn FileSystem>, b: &Arc<dyn FileSystem>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;

    fn memory() -> Arc<dyn FileSystem> {
        Arc::new(MemoryBackend::new())
    }

    #[test]
    fn test_mount_rejects_relative_prefix() {
        let table = MountTable::new();
        let err = table.mount("data", memory()).unwrap_err();
        assert!(matches!(err, VfsError::InvalidArgument { op: "mount", .. }));
        let err = table.mount("", memory()).unwrap_err();
        assert!(matches!(err, VfsError::InvalidArgument { .. }));
        assert!(table.is_empty());
    }

    #[test]
    fn test_mount_cleans_prefix() {
        let table = MountTable::new();
        table.mount("/data//sub/", memory()).unwrap();
        let mounts = table.mounts();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].prefix, "/data/sub");
        assert_eq!(mounts[0].backend, "memory");
    }

    #[test]
    fn test_resolve_longest_prefix() {
        let table = MountTable::new();
        let a = memory();
        let ab = memory();
        table.mount("/a", Arc::clone(&a)).unwrap();
        table.mount("/a/b", Arc::clone(&ab)).unwrap();

        let r = table.resolve(Path::new("/a/b/c/d.txt")).unwrap();
        assert!(same_backend(r.fs(), &ab));
        assert_eq!(r.relative, Path::new("c/d.txt"));
        assert_eq!(r.mount.prefix(), "/a/b");

        let r = table.resolve(Path::new("/a/x.txt")).unwrap();
        assert!(same_backend(r.fs(), &a));
        assert_eq!(r.relative, Path::new("x.txt"));
    }

    #[test]
    fn test_resolve_skips_intermediate_nodes() {
        let table = MountTable::new();
        let a = memory();
        table.mount("/a", Arc::clone(&a)).unwrap();
        table.mount("/a/b/c", memory()).unwrap();

        // `/a/b` exists in the trie only as an intermediate node.
        let r = table.resolve(Path::new("/a/b/x")).unwrap();
        assert!(same_backend(r.fs(), &a));
        assert_eq!(r.relative, Path::new("b/x"));
    }

    #[test]
    fn test_resolve_root_fallback() {
        let table = MountTable::new();
        let root = memory();
        table.mount("/", Arc::clone(&root)).unwrap();

        for (path, rel) in [("/", ""), ("/x", "x"), ("/a/b/c", "a/b/c"), ("//a//b/", "a/b")] {
            let r = table.resolve(Path::new(path)).unwrap();
            assert!(same_backend(r.fs(), &root), "{path}");
            assert_eq!(r.relative, Path::new(rel), "{path}");
        }
    }

    #[test]
    fn test_resolve_mount_point_itself() {
        let table = MountTable::new();
        table.mount("/", memory()).unwrap();
        let data = memory();
        table.mount("/data", Arc::clone(&data)).unwrap();

        let r = table.resolve(Path::new("/data")).unwrap();
        assert!(same_backend(r.fs(), &data));
        assert_eq!(r.relative, Path::new(""));
    }

    #[test]
    fn test_resolve_without_match() {
        let table = MountTable::new();
        table.mount("/data", memory()).unwrap();
        let err = table.resolve(Path::new("/other/file")).unwrap_err();
        assert!(matches!(err, VfsError::NoMountPoint(ref p) if p == "/other/file"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_acquire_release() {
        let table = MountTable::new();
        table.mount("/data", memory()).unwrap();

        let r = table.resolve_and_acquire(Path::new("/data/x")).unwrap();
        assert_eq!(r.mount.open_count(), 1);
        assert_eq!(table.mounts()[0].open_count, 1);
        r.mount.release();
        assert_eq!(r.mount.open_count(), 0);
    }

    #[test]
    #[should_panic(expected = "open count underflow")]
    fn test_release_underflow_panics() {
        let table = MountTable::new();
        table.mount("/data", memory()).unwrap();
        let r = table.resolve(Path::new("/data")).unwrap();
        r.mount.release();
    }

    #[test]
    fn test_acquire_overflow() {
        let mount = MountPoint::new("/m".into(), memory());
        mount.open_count.store(u32::MAX, Ordering::Release);
        let err = mount.acquire().unwrap_err();
        assert!(matches!(err, VfsError::TooManyOpenFiles(_)));
        assert_eq!(mount.open_count(), u32::MAX);
    }

    #[test]
    fn test_unmount_requires_selector() {
        let table = MountTable::new();
        let err = table.unmount("", None).unwrap_err();
        assert!(matches!(err, VfsError::InvalidArgument { op: "unmount", .. }));
    }

    #[test]
    fn test_unmount_by_prefix_and_backend() {
        let table = MountTable::new();
        let a = memory();
        let b = memory();
        table.mount("/a", Arc::clone(&a)).unwrap();
        table.mount("/b", Arc::clone(&b)).unwrap();

        // Prefix and backend must both match.
        let err = table.unmount("/a", Some(&b)).unwrap_err();
        assert!(err.is_not_found());

        table.unmount("", Some(&b)).unwrap();
        assert_eq!(table.mounts().len(), 1);

        table.unmount("/a/", None).unwrap();
        assert!(table.is_empty());

        let err = table.unmount("/a", None).unwrap_err();
        assert!(matches!(err, VfsError::NotFound(ref p) if p == "/a"));
    }

    #[test]
    fn test_unmount_busy() {
        let table = MountTable::new();
        table.mount("/data", memory()).unwrap();
        let r = table.resolve_and_acquire(Path::new("/data/f")).unwrap();

        let err = table.unmount("/data", None).unwrap_err();
        assert!(matches!(err, VfsError::Busy(ref p) if p == "/data"));
        assert_eq!(table.len(), 1);

        r.mount.release();
        table.unmount("/data", None).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_busy_reports_requested_prefix() {
        let table = MountTable::new();
        let fs = memory();
        table.mount("/data", Arc::clone(&fs)).unwrap();
        let r = table.resolve_and_acquire(Path::new("/data/f")).unwrap();

        let err = table.unmount("/data//", None).unwrap_err();
        assert!(matches!(err, VfsError::Busy(ref p) if p == "/data//"));

        // Selected by backend alone, the matched prefix is all there is.
        let err = table.unmount("", Some(&fs)).unwrap_err();
        assert!(matches!(err, VfsError::Busy(ref p) if p == "/data"));

        r.mount.release();
    }

    #[test]
    fn test_remount_replaces() {
        let table = MountTable::new();
        let first = memory();
        let second = memory();
        table.mount("/m", Arc::clone(&first)).unwrap();
        table.mount("/m", Arc::clone(&second)).unwrap();

        assert_eq!(table.len(), 1);
        let r = table.resolve(Path::new("/m/x")).unwrap();
        assert!(same_backend(r.fs(), &second));
    }

    #[test]
    fn test_unmount_leaves_no_stale_nodes() {
        let table = MountTable::new();
        let deep = memory();
        table.mount("/a/b", Arc::clone(&deep)).unwrap();
        table.unmount("/a/b", None).unwrap();

        let shallow = memory();
        table.mount("/a", Arc::clone(&shallow)).unwrap();
        let r = table.resolve(Path::new("/a/b/c")).unwrap();
        assert!(same_backend(r.fs(), &shallow));
        assert_eq!(r.relative, Path::new("b/c"));
        assert_eq!(table.mounts.read().node_count(), 1);
    }
}
