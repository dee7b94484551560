//! In-memory filesystem backend.
//!
//! Used as the default root mount and for testing. All data is ephemeral.

use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::error::{VfsError, VfsResult};
use crate::ops::{File, FileSystem};
use crate::path::base_name;
use crate::types::{Metadata, OpenFlags};

#[derive(Debug, Clone)]
struct Attrs {
    perm: u32,
    mtime: SystemTime,
    atime: SystemTime,
    uid: u32,
    gid: u32,
}

impl Attrs {
    fn new(perm: u32) -> Self {
        let now = SystemTime::now();
        Self {
            perm: perm & 0o7777,
            mtime: now,
            atime: now,
            uid: 0,
            gid: 0,
        }
    }
}

/// File contents, shared between the namespace and open handles.
#[derive(Debug)]
struct FileNode {
    data: Vec<u8>,
    attrs: Attrs,
}

/// Entry in the memory filesystem.
#[derive(Debug)]
enum Entry {
    File(Arc<RwLock<FileNode>>),
    Directory(Attrs),
}

impl Entry {
    fn metadata(&self, name: &str) -> Metadata {
        match self {
            Entry::File(node) => {
                let node = node.read();
                let mut meta = Metadata::file(name, node.data.len() as u64, node.attrs.perm);
                meta.mtime = node.attrs.mtime;
                meta
            }
            Entry::Directory(attrs) => {
                let mut meta = Metadata::directory(name, attrs.perm);
                meta.mtime = attrs.mtime;
                meta
            }
        }
    }

    fn update(&mut self, f: impl FnOnce(&mut Attrs)) {
        match self {
            Entry::File(node) => f(&mut node.write().attrs),
            Entry::Directory(attrs) => f(attrs),
        }
    }
}

/// In-memory filesystem backend.
///
/// Thread-safe via internal `RwLock`. All data is lost when dropped. Open
/// handles share file contents with the namespace, so writes through a
/// handle are visible to later opens right away.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<PathBuf, Entry>>,
    read_only: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        // Root directory always exists
        entries.insert(PathBuf::new(), Entry::Directory(Attrs::new(0o755)));
        Self {
            entries: RwLock::new(entries),
            read_only: AtomicBool::new(false),
        }
    }

    /// Create an empty filesystem that rejects every modification.
    pub fn read_only() -> Self {
        let fs = Self::new();
        fs.set_read_only(true);
        fs
    }

    /// Toggle read-only mode. Lets a test or loader populate a backend
    /// before freezing it.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Release);
    }

    /// Whether modifications are rejected.
    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }

    fn check_writable(&self) -> VfsResult<()> {
        if self.is_read_only() {
            Err(VfsError::ReadOnly)
        } else {
            Ok(())
        }
    }

    /// Normalize a path: remove leading `/`, resolve `.` and `..`.
    fn normalize(path: &Path) -> PathBuf {
        let mut result = PathBuf::new();
        for component in path.components() {
            match component {
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
                Component::ParentDir => {
                    result.pop();
                }
                Component::Normal(s) => result.push(s),
            }
        }
        result
    }

    fn path_str(path: &Path) -> String {
        path.display().to_string()
    }

    fn entry_name(path: &Path) -> String {
        if path.as_os_str().is_empty() {
            return "/".to_string();
        }
        base_name(&path.to_string_lossy()).to_string()
    }

    /// The parent of `path` must exist and be a directory.
    fn check_parent(entries: &HashMap<PathBuf, Entry>, path: &Path) -> VfsResult<()> {
        let parent = path.parent().unwrap_or(Path::new(""));
        match entries.get(parent) {
            Some(Entry::Directory(_)) => Ok(()),
            Some(Entry::File(_)) => Err(VfsError::not_a_directory(Self::path_str(parent))),
            None => Err(VfsError::not_found(Self::path_str(parent))),
        }
    }

    fn has_children(entries: &HashMap<PathBuf, Entry>, path: &Path) -> bool {
        entries
            .keys()
            .any(|k| k.parent() == Some(path) && k.as_path() != path)
    }

    fn with_entry(&self, path: &Path, f: impl FnOnce(&mut Attrs)) -> VfsResult<()> {
        self.check_writable()?;
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(&normalized)
            .ok_or_else(|| VfsError::not_found(Self::path_str(&normalized)))?;
        entry.update(f);
        Ok(())
    }
}

impl FileSystem for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn open_file(&self, path: &Path, flags: OpenFlags, perm: u32) -> VfsResult<Box<dyn File>> {
        if flags.is_writable() || flags.create {
            self.check_writable()?;
        }
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write();

        let existing = match entries.get(&normalized) {
            Some(Entry::Directory(_)) => {
                return Err(VfsError::is_a_directory(Self::path_str(&normalized)));
            }
            Some(Entry::File(node)) => Some(Arc::clone(node)),
            None => None,
        };
        let node = match existing {
            Some(_) if flags.create && flags.exclusive => {
                return Err(VfsError::already_exists(Self::path_str(&normalized)));
            }
            Some(node) => {
                if flags.truncate {
                    let mut file = node.write();
                    file.data.clear();
                    file.attrs.mtime = SystemTime::now();
                }
                node
            }
            None if flags.create => {
                Self::check_parent(&entries, &normalized)?;
                let node = Arc::new(RwLock::new(FileNode {
                    data: Vec::new(),
                    attrs: Attrs::new(perm),
                }));
                entries.insert(normalized, Entry::File(Arc::clone(&node)));
                node
            }
            None => return Err(VfsError::not_found(Self::path_str(&normalized))),
        };

        Ok(Box::new(MemoryFile {
            name: Self::path_str(path),
            node,
            pos: 0,
            flags,
            closed: false,
        }))
    }

    fn mkdir(&self, path: &Path, perm: u32) -> VfsResult<()> {
        self.check_writable()?;
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write();

        if entries.contains_key(&normalized) {
            return Err(VfsError::already_exists(Self::path_str(&normalized)));
        }
        Self::check_parent(&entries, &normalized)?;
        entries.insert(normalized, Entry::Directory(Attrs::new(perm)));
        Ok(())
    }

    fn remove(&self, path: &Path) -> VfsResult<()> {
        self.check_writable()?;
        let normalized = Self::normalize(path);
        if normalized.as_os_str().is_empty() {
            return Err(VfsError::permission_denied("cannot remove root"));
        }
        let mut entries = self.entries.write();

        match entries.get(&normalized) {
            Some(Entry::Directory(_)) if Self::has_children(&entries, &normalized) => {
                Err(VfsError::directory_not_empty(Self::path_str(&normalized)))
            }
            Some(_) => {
                entries.remove(&normalized);
                Ok(())
            }
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    fn remove_all(&self, path: &Path) -> VfsResult<()> {
        self.check_writable()?;
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write();
        if normalized.as_os_str().is_empty() {
            // Root survives; everything under it goes.
            entries.retain(|k, _| k.as_os_str().is_empty());
            return Ok(());
        }
        entries.retain(|k, _| !k.starts_with(&normalized));
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        self.check_writable()?;
        let from_normalized = Self::normalize(from);
        let to_normalized = Self::normalize(to);
        if from_normalized.as_os_str().is_empty() || to_normalized.as_os_str().is_empty() {
            return Err(VfsError::permission_denied("cannot rename root"));
        }
        if from_normalized == to_normalized {
            return Ok(());
        }
        if to_normalized.starts_with(&from_normalized) {
            return Err(VfsError::invalid_path(Self::path_str(&to_normalized)));
        }

        let mut entries = self.entries.write();
        let is_dir = match entries.get(&from_normalized) {
            Some(entry) => matches!(entry, Entry::Directory(_)),
            None => return Err(VfsError::not_found(Self::path_str(&from_normalized))),
        };
        Self::check_parent(&entries, &to_normalized)?;
        match entries.get(&to_normalized) {
            Some(Entry::Directory(_)) if !is_dir => {
                return Err(VfsError::is_a_directory(Self::path_str(&to_normalized)));
            }
            Some(Entry::Directory(_)) if Self::has_children(&entries, &to_normalized) => {
                return Err(VfsError::directory_not_empty(Self::path_str(&to_normalized)));
            }
            Some(Entry::File(_)) if is_dir => {
                return Err(VfsError::not_a_directory(Self::path_str(&to_normalized)));
            }
            _ => {}
        }

        let moved: Vec<PathBuf> = entries
            .keys()
            .filter(|k| k.starts_with(&from_normalized))
            .cloned()
            .collect();
        for old in moved {
            if let Some(entry) = entries.remove(&old) {
                let new_path = match old.strip_prefix(&from_normalized) {
                    Ok(rest) if !rest.as_os_str().is_empty() => to_normalized.join(rest),
                    _ => to_normalized.clone(),
                };
                entries.insert(new_path, entry);
            }
        }
        Ok(())
    }

    fn stat(&self, path: &Path) -> VfsResult<Metadata> {
        let normalized = Self::normalize(path);
        let entries = self.entries.read();
        entries
            .get(&normalized)
            .map(|e| e.metadata(&Self::entry_name(&normalized)))
            .ok_or_else(|| VfsError::not_found(Self::path_str(&normalized)))
    }

    fn read_dir(&self, path: &Path) -> VfsResult<Vec<Metadata>> {
        let normalized = Self::normalize(path);
        let entries = self.entries.read();

        match entries.get(&normalized) {
            Some(Entry::Directory(_)) => {}
            Some(Entry::File(_)) => {
                return Err(VfsError::not_a_directory(Self::path_str(&normalized)));
            }
            None => return Err(VfsError::not_found(Self::path_str(&normalized))),
        }

        let mut result: Vec<Metadata> = entries
            .iter()
            .filter(|(k, _)| k.parent() == Some(normalized.as_path()) && **k != normalized)
            .map(|(k, e)| e.metadata(&Self::entry_name(k)))
            .collect();

        // Sort for consistent ordering
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    fn chmod(&self, path: &Path, perm: u32) -> VfsResult<()> {
        self.with_entry(path, |attrs| attrs.perm = perm & 0o7777)
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> VfsResult<()> {
        self.with_entry(path, |attrs| {
            attrs.uid = uid;
            attrs.gid = gid;
        })
    }

    fn set_times(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> VfsResult<()> {
        self.with_entry(path, |attrs| {
            attrs.atime = atime;
            attrs.mtime = mtime;
        })
    }
}

/// Open handle on a [`MemoryBackend`] file.
#[derive(Debug)]
struct MemoryFile {
    name: String,
    node: Arc<RwLock<FileNode>>,
    pos: u64,
    flags: OpenFlags,
    closed: bool,
}

impl MemoryFile {
    fn check_open(&self) -> io::Result<()> {
        if self.closed {
            Err(VfsError::Closed(self.name.clone()).into())
        } else {
            Ok(())
        }
    }
}

impl Read for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_open()?;
        let node = self.node.read();
        let len = node.data.len();
        let start = usize::try_from(self.pos).unwrap_or(len).min(len);
        let n = buf.len().min(len - start);
        buf[..n].copy_from_slice(&node.data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_open()?;
        if !self.flags.is_writable() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{}: not opened for writing", self.name),
            ));
        }
        let mut node = self.node.write();
        if self.flags.append {
            self.pos = node.data.len() as u64;
        }
        let start = usize::try_from(self.pos)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset too large"))?;
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "offset too large"))?;
        if end > node.data.len() {
            let grow = end - node.data.len();
            node.data
                .try_reserve(grow)
                .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))?;
            node.data.resize(end, 0);
        }
        node.data[start..end].copy_from_slice(buf);
        node.attrs.mtime = SystemTime::now();
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_open()
    }
}

impl Seek for MemoryFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.check_open()?;
        let next = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(off) => (self.node.read().data.len() as u64).checked_add_signed(off),
            SeekFrom::Current(off) => self.pos.checked_add_signed(off),
        };
        let next = next.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative position")
        })?;
        self.pos = next;
        Ok(next)
    }
}

impl File for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn stat(&self) -> VfsResult<Metadata> {
        let node = self.node.read();
        let mut meta = Metadata::file(base_name(&self.name), node.data.len() as u64, node.attrs.perm);
        meta.mtime = node.attrs.mtime;
        Ok(meta)
    }

    fn truncate(&mut self, size: u64) -> VfsResult<()> {
        self.check_open()?;
        if !self.flags.is_writable() {
            return Err(VfsError::permission_denied(self.name.clone()));
        }
        let size = usize::try_from(size).map_err(|_| VfsError::other("size too large"))?;
        let mut node = self.node.write();
        if let Some(grow) = size.checked_sub(node.data.len()) {
            node.data
                .try_reserve(grow)
                .map_err(|e| VfsError::Io(io::Error::new(io::ErrorKind::OutOfMemory, e)))?;
        }
        node.data.resize(size, 0);
        node.attrs.mtime = SystemTime::now();
        Ok(())
    }

    fn sync(&mut self) -> VfsResult<()> {
        Ok(self.check_open()?)
    }

    fn close(&mut self) -> VfsResult<()> {
        if self.closed {
            return Err(VfsError::Closed(self.name.clone()));
        }
        self.closed = true;
        Ok(())
    }
}
