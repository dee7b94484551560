//! Local filesystem backend.
//!
//! Provides access to real filesystem paths, with path security
//! to prevent escaping the root directory.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{VfsError, VfsResult};
use crate::ops::{File, FileSystem};
use crate::types::{FileType, Metadata, OpenFlags};

/// Local filesystem backend.
///
/// All operations are relative to `root`. For example, if `root` is
/// `/home/amy/project`, then `open("src/main.rs")` opens
/// `/home/amy/project/src/main.rs`.
///
/// Path security is enforced: attempts to escape via `..` or symlinks are
/// blocked.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
    read_only: bool,
}

impl LocalBackend {
    /// Create a new local filesystem rooted at the given path.
    ///
    /// The root is canonicalized at construction time to handle symlinks
    /// (e.g. macOS `/tmp` → `/private/tmp`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self {
            root,
            read_only: false,
        }
    }

    /// Create a read-only local filesystem.
    pub fn read_only(root: impl Into<PathBuf>) -> Self {
        let mut fs = Self::new(root);
        fs.read_only = true;
        fs
    }

    /// Set whether this filesystem is read-only.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path to an absolute path within the root.
    ///
    /// Returns an error if the path escapes the root.
    fn resolve(&self, path: &Path) -> VfsResult<PathBuf> {
        let path = path.strip_prefix("/").unwrap_or(path);
        if path.as_os_str().is_empty() {
            return Ok(self.root.clone());
        }

        let full = self.root.join(path);

        // For new files, canonicalize the parent and append the file name.
        let canonical = if full.exists() {
            full.canonicalize()?
        } else {
            let parent = full
                .parent()
                .ok_or_else(|| VfsError::invalid_path(path.display().to_string()))?;
            let file_name = full
                .file_name()
                .ok_or_else(|| VfsError::invalid_path(path.display().to_string()))?;
            if parent.exists() {
                parent.canonicalize()?.join(file_name)
            } else {
                // Fails on the actual operation.
                full
            }
        };

        if !canonical.starts_with(&self.root) {
            return Err(VfsError::path_escapes_root(format!(
                "{} is not under {}",
                canonical.display(),
                self.root.display()
            )));
        }
        Ok(canonical)
    }

    fn check_writable(&self) -> VfsResult<()> {
        if self.read_only {
            Err(VfsError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn convert(name: String, meta: &fs::Metadata) -> Metadata {
        Metadata {
            name,
            size: if meta.is_dir() { 0 } else { meta.len() },
            kind: if meta.is_dir() {
                FileType::Directory
            } else {
                FileType::File
            },
            perm: meta.permissions().mode() & 0o7777,
            mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }

    fn entry_name(full: &Path) -> String {
        full.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string())
    }
}

impl FileSystem for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    fn open_file(&self, path: &Path, flags: OpenFlags, perm: u32) -> VfsResult<Box<dyn File>> {
        if flags.is_writable() || flags.create {
            self.check_writable()?;
        }
        let full_path = self.resolve(path)?;
        if full_path.is_dir() {
            return Err(VfsError::is_a_directory(path.display().to_string()));
        }

        let mut options = fs::OpenOptions::new();
        options
            .read(flags.read)
            .write(flags.write && !flags.append)
            .append(flags.append)
            .truncate(flags.truncate)
            .mode(perm);
        if flags.create && flags.exclusive {
            options.create_new(true);
        } else {
            options.create(flags.create);
        }
        let file = options.open(&full_path)?;

        Ok(Box::new(LocalFile {
            name: path.display().to_string(),
            file: Some(file),
        }))
    }

    fn mkdir(&self, path: &Path, perm: u32) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;
        fs::DirBuilder::new().mode(perm).create(&full_path)?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;
        if full_path == self.root {
            return Err(VfsError::permission_denied("cannot remove root"));
        }
        let meta = fs::symlink_metadata(&full_path)?;
        if meta.is_dir() {
            fs::remove_dir(&full_path)?;
        } else {
            fs::remove_file(&full_path)?;
        }
        Ok(())
    }

    fn remove_all(&self, path: &Path) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;
        if full_path == self.root {
            return Err(VfsError::permission_denied("cannot remove root"));
        }
        match fs::symlink_metadata(&full_path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&full_path)?,
            Ok(_) => fs::remove_file(&full_path)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        self.check_writable()?;
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;
        fs::rename(&from_path, &to_path)?;
        Ok(())
    }

    fn stat(&self, path: &Path) -> VfsResult<Metadata> {
        let full_path = self.resolve(path)?;
        let meta = fs::metadata(&full_path)?;
        Ok(Self::convert(Self::entry_name(&full_path), &meta))
    }

    fn read_dir(&self, path: &Path) -> VfsResult<Vec<Metadata>> {
        let full_path = self.resolve(path)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(&full_path)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(Self::convert(name, &meta));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn chmod(&self, path: &Path, perm: u32) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;
        fs::set_permissions(&full_path, fs::Permissions::from_mode(perm))?;
        Ok(())
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;
        std::os::unix::fs::chown(&full_path, Some(uid), Some(gid))?;
        Ok(())
    }

    fn set_times(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;
        let file = fs::File::open(&full_path)?;
        file.set_times(
            fs::FileTimes::new()
                .set_accessed(atime)
                .set_modified(mtime),
        )?;
        Ok(())
    }
}

/// Open handle on a [`LocalBackend`] file.
#[derive(Debug)]
struct LocalFile {
    name: String,
    file: Option<fs::File>,
}

impl LocalFile {
    fn file(&self) -> io::Result<&fs::File> {
        self.file
            .as_ref()
            .ok_or_else(|| VfsError::Closed(self.name.clone()).into())
    }

    fn file_mut(&mut self) -> io::Result<&mut fs::File> {
        match self.file.as_mut() {
            Some(file) => Ok(file),
            None => Err(VfsError::Closed(self.name.clone()).into()),
        }
    }
}

impl Read for LocalFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file_mut()?.read(buf)
    }
}

impl Write for LocalFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file_mut()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file_mut()?.flush()
    }
}

impl Seek for LocalFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file_mut()?.seek(pos)
    }
}

impl File for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn stat(&self) -> VfsResult<Metadata> {
        let meta = self.file()?.metadata()?;
        let name = crate::path::base_name(&self.name).to_string();
        Ok(LocalBackend::convert(name, &meta))
    }

    fn truncate(&mut self, size: u64) -> VfsResult<()> {
        self.file()?.set_len(size)?;
        Ok(())
    }

    fn sync(&mut self) -> VfsResult<()> {
        self.file()?.sync_all()?;
        Ok(())
    }

    fn close(&mut self) -> VfsResult<()> {
        match self.file.take() {
            Some(file) => {
                drop(file);
                Ok(())
            }
            None => Err(VfsError::Closed(self.name.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (LocalBackend, TempDir) {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path());
        (backend, dir)
    }

    #[test]
    fn test_create_and_read() {
        let (backend, dir) = setup();
        backend.write_all(Path::new("test.txt"), b"hello world").unwrap();

        assert_eq!(backend.read_all(Path::new("test.txt")).unwrap(), b"hello world");
        assert_eq!(
            fs::read(dir.path().join("test.txt")).unwrap(),
            b"hello world"
        );
    }

    #[test]
    fn test_partial_read() {
        let (backend, _dir) = setup();
        backend.write_all(Path::new("test.txt"), b"hello world").unwrap();

        let mut file = backend.open(Path::new("test.txt")).unwrap();
        file.seek(SeekFrom::Start(6)).unwrap();
        let mut buf = String::new();
        file.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "world");
    }

    #[test]
    fn test_mkdir_and_read_dir() {
        let (backend, _dir) = setup();

        backend.mkdir(Path::new("subdir"), 0o755).unwrap();
        backend.write_all(Path::new("subdir/file.txt"), b"").unwrap();
        backend.write_all(Path::new("root.txt"), b"").unwrap();

        let entries = backend.read_dir(Path::new("")).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["root.txt", "subdir"]);
        assert!(entries[1].is_dir());
    }

    #[test]
    fn test_mkdir_all_and_remove_all() {
        let (backend, dir) = setup();
        backend.mkdir_all(Path::new("a/b/c"), 0o755).unwrap();
        assert!(dir.path().join("a/b/c").is_dir());

        backend.write_all(Path::new("a/b/c/f"), b"x").unwrap();
        backend.remove_all(Path::new("a")).unwrap();
        assert!(!dir.path().join("a").exists());
        backend.remove_all(Path::new("a")).unwrap();
    }

    #[test]
    fn test_remove() {
        let (backend, _dir) = setup();
        backend.write_all(Path::new("f"), b"").unwrap();
        backend.remove(Path::new("f")).unwrap();
        assert!(backend.stat(Path::new("f")).unwrap_err().is_not_found());
        assert!(backend.remove(Path::new("")).is_err());
    }

    #[test]
    fn test_read_only() {
        let (mut backend, _dir) = setup();
        backend.set_read_only(true);

        let result = backend.create(Path::new("test.txt"));
        assert!(matches!(result, Err(VfsError::ReadOnly)));
    }

    #[test]
    fn test_path_escape_blocked() {
        let (backend, _dir) = setup();

        let result = backend.open(Path::new("../../../etc/passwd"));
        assert!(matches!(result, Err(VfsError::PathEscapesRoot(_))));
    }

    #[test]
    fn test_symlink_escape_blocked() {
        let (backend, dir) = setup();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret"), b"s").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let result = backend.open(Path::new("link/secret"));
        assert!(matches!(result, Err(VfsError::PathEscapesRoot(_))));
    }

    #[test]
    fn test_rename() {
        let (backend, _dir) = setup();
        backend.write_all(Path::new("old.txt"), b"content").unwrap();
        backend.rename(Path::new("old.txt"), Path::new("new.txt")).unwrap();

        assert!(!backend.exists(Path::new("old.txt")));
        assert_eq!(backend.read_all(Path::new("new.txt")).unwrap(), b"content");
    }

    #[test]
    fn test_chmod_and_times() {
        let (backend, _dir) = setup();
        backend.write_all(Path::new("f"), b"").unwrap();

        backend.chmod(Path::new("f"), 0o600).unwrap();
        assert_eq!(backend.stat(Path::new("f")).unwrap().perm, 0o600);

        let then = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        backend.set_times(Path::new("f"), then, then).unwrap();
        assert_eq!(backend.stat(Path::new("f")).unwrap().mtime, then);
    }

    #[test]
    fn test_exclusive_create() {
        let (backend, _dir) = setup();
        backend.write_all(Path::new("f"), b"").unwrap();
        let err = backend
            .open_file(Path::new("f"), OpenFlags::create_exclusive(), 0o644)
            .unwrap_err();
        assert_eq!(io::Error::from(err).kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_close_twice() {
        let (backend, _dir) = setup();
        let mut file = backend.create(Path::new("f")).unwrap();
        file.close().unwrap();
        assert!(matches!(file.close(), Err(VfsError::Closed(_))));
        assert!(file.write(b"x").is_err());
    }
}
