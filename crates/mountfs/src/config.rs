//! Mount configuration.
//!
//! A config names backends and lists where to mount them, so one backend
//! can appear at several prefixes:
//!
//! ```toml
//! [backends.scratch]
//! type = "memory"
//!
//! [backends.work]
//! type = "local"
//! root = "/srv/work"
//! read_only = true
//!
//! [[mounts]]
//! prefix = "/"
//! backend = "scratch"
//!
//! [[mounts]]
//! prefix = "/work"
//! backend = "work"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backends::MemoryBackend;
#[cfg(unix)]
use crate::backends::LocalBackend;
use crate::error::{VfsError, VfsResult};
use crate::ops::FileSystem;
use crate::router::Vfs;

/// Configuration for one backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Ephemeral in-memory store.
    Memory {
        #[serde(default)]
        read_only: bool,
    },
    /// Directory on the host filesystem.
    Local {
        root: PathBuf,
        #[serde(default)]
        read_only: bool,
    },
}

impl BackendConfig {
    /// Instantiate the backend.
    pub fn build(&self) -> VfsResult<Arc<dyn FileSystem>> {
        match self {
            BackendConfig::Memory { read_only } => {
                let fs = MemoryBackend::new();
                fs.set_read_only(*read_only);
                Ok(Arc::new(fs))
            }
            #[cfg(unix)]
            BackendConfig::Local { root, read_only } => {
                if !root.is_dir() {
                    return Err(VfsError::config(format!(
                        "local backend root {} is not a directory",
                        root.display()
                    )));
                }
                let mut fs = LocalBackend::new(root);
                fs.set_read_only(*read_only);
                Ok(Arc::new(fs))
            }
            #[cfg(not(unix))]
            BackendConfig::Local { .. } => Err(VfsError::config(
                "local backends are only supported on unix",
            )),
        }
    }
}

/// One `[[mounts]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MountEntry {
    /// Absolute mount prefix.
    pub prefix: String,
    /// Key into [`VfsConfig::backends`].
    pub backend: String,
}

/// A full mount layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VfsConfig {
    /// Named backends.
    #[serde(default)]
    pub backends: BTreeMap<String, BackendConfig>,
    /// Mounts, applied in order. A later entry at the same prefix replaces
    /// an earlier one.
    #[serde(default)]
    pub mounts: Vec<MountEntry>,
}

impl VfsConfig {
    /// A single memory backend at `/`.
    pub fn memory_root() -> Self {
        let mut backends = BTreeMap::new();
        backends.insert("root".to_string(), BackendConfig::Memory { read_only: false });
        Self {
            backends,
            mounts: vec![MountEntry {
                prefix: "/".to_string(),
                backend: "root".to_string(),
            }],
        }
    }

    /// Parse from TOML text.
    pub fn from_toml_str(text: &str) -> VfsResult<Self> {
        toml::from_str(text).map_err(|e| VfsError::config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> VfsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| VfsError::config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> VfsResult<String> {
        toml::to_string_pretty(self).map_err(|e| VfsError::config(e.to_string()))
    }

    /// Build every backend once and mount it at each of its prefixes.
    pub fn build(&self) -> VfsResult<Vfs> {
        let mut built: BTreeMap<&str, Arc<dyn FileSystem>> = BTreeMap::new();
        for (name, backend) in &self.backends {
            built.insert(name.as_str(), backend.build()?);
        }

        let vfs = Vfs::new();
        for entry in &self.mounts {
            let fs = built.get(entry.backend.as_str()).ok_or_else(|| {
                VfsError::config(format!(
                    "mount {} refers to unknown backend {:?}",
                    entry.prefix, entry.backend
                ))
            })?;
            vfs.mount(&entry.prefix, Arc::clone(fs))?;
        }
        tracing::debug!(
            backends = self.backends.len(),
            mounts = self.mounts.len(),
            "vfs built from config"
        );
        Ok(vfs)
    }
}
