//! VFS error types.

use std::io;
use thiserror::Error;

/// Coarse classification of a [`VfsError`].
///
/// The first five kinds are raised by the mount table and router; the
/// rest describe failures reported by backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed mount or unmount request.
    InvalidArgument,
    /// A router was asked to mount itself.
    Recursive,
    /// No mount, or no file, at the requested path.
    NotFound,
    /// Unmount refused while handles are open.
    Busy,
    /// Cross-backend operation or missing optional capability.
    NotSupported,
    /// Any other backend failure.
    Backend,
}

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Malformed request, e.g. a relative or empty mount prefix.
    #[error("{op} {path}: invalid argument")]
    InvalidArgument { op: &'static str, path: String },

    /// Mounting a router inside itself.
    #[error("mount {0}: recursive mount may cause dead lock")]
    Recursive(String),

    /// No mount point for path.
    #[error("no mount point for path: {0}")]
    NoMountPoint(String),

    /// Unmount refused because files are still open through the mount.
    #[error("unmount {0}: device or resource busy")]
    Busy(String),

    /// Operation not supported for this path or backend.
    #[error("{op} {path}: not supported")]
    NotSupported { op: &'static str, path: String },

    /// Open reference count for a mount point would overflow.
    #[error("too many open files: {0}")]
    TooManyOpenFiles(String),

    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Permission denied.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Filesystem is read-only.
    #[error("filesystem is read-only")]
    ReadOnly,

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Path escapes root (security violation).
    #[error("path escapes root: {0}")]
    PathEscapesRoot(String),

    /// Invalid path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Handle used after close.
    #[error("file already closed: {0}")]
    Closed(String),

    /// Invalid mount configuration.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl VfsError {
    /// Create an InvalidArgument error.
    pub fn invalid_argument(op: &'static str, path: impl Into<String>) -> Self {
        Self::InvalidArgument {
            op,
            path: path.into(),
        }
    }

    /// Create a NotSupported error.
    pub fn not_supported(op: &'static str, path: impl Into<String>) -> Self {
        Self::NotSupported {
            op,
            path: path.into(),
        }
    }

    /// Create a NoMountPoint error.
    pub fn no_mount_point(path: impl Into<String>) -> Self {
        Self::NoMountPoint(path.into())
    }

    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    /// Create a PathEscapesRoot error.
    pub fn path_escapes_root(path: impl Into<String>) -> Self {
        Self::PathEscapesRoot(path.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VfsError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            VfsError::Recursive(_) => ErrorKind::Recursive,
            VfsError::NoMountPoint(_) | VfsError::NotFound(_) => ErrorKind::NotFound,
            VfsError::Busy(_) => ErrorKind::Busy,
            VfsError::NotSupported { .. } => ErrorKind::NotSupported,
            VfsError::Io(e) if e.kind() == io::ErrorKind::NotFound => ErrorKind::NotFound,
            _ => ErrorKind::Backend,
        }
    }

    /// The path carried by a backend-level error, if it has one.
    pub(crate) fn path_mut(&mut self) -> Option<&mut String> {
        match self {
            VfsError::NotFound(p)
            | VfsError::AlreadyExists(p)
            | VfsError::PermissionDenied(p)
            | VfsError::NotADirectory(p)
            | VfsError::IsADirectory(p)
            | VfsError::DirectoryNotEmpty(p)
            | VfsError::InvalidPath(p)
            | VfsError::NoMountPoint(p) => Some(p),
            VfsError::NotSupported { path, .. } => Some(path),
            _ => None,
        }
    }

    /// True for "no such file" failures, whether raised by a backend or
    /// by the OS.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::Io(e) => e,
            VfsError::InvalidArgument { .. } | VfsError::InvalidPath(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, e)
            }
            VfsError::NoMountPoint(_) | VfsError::NotFound(_) => {
                io::Error::new(io::ErrorKind::NotFound, e)
            }
            VfsError::Busy(_) => io::Error::new(io::ErrorKind::ResourceBusy, e),
            VfsError::NotSupported { .. } => io::Error::new(io::ErrorKind::Unsupported, e),
            VfsError::AlreadyExists(_) => io::Error::new(io::ErrorKind::AlreadyExists, e),
            VfsError::PermissionDenied(_) | VfsError::PathEscapesRoot(_) => {
                io::Error::new(io::ErrorKind::PermissionDenied, e)
            }
            VfsError::ReadOnly => io::Error::new(io::ErrorKind::ReadOnlyFilesystem, e),
            VfsError::NotADirectory(_) => io::Error::new(io::ErrorKind::NotADirectory, e),
            VfsError::IsADirectory(_) => io::Error::new(io::ErrorKind::IsADirectory, e),
            VfsError::DirectoryNotEmpty(_) => {
                io::Error::new(io::ErrorKind::DirectoryNotEmpty, e)
            }
            other => io::Error::other(other),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
