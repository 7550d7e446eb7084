//! Paths relative to the mounted data directories.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Whether paths that differ only in casing name the same file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Casing {
    Sensitive,
    Insensitive,
}

impl Casing {
    /// Convention of the platform the model runs on.
    pub fn platform_default() -> Self {
        if cfg!(any(windows, target_os = "macos")) {
            Casing::Insensitive
        } else {
            Casing::Sensitive
        }
    }

    /// Comparison key for a path: forward slashes, no trailing slash,
    /// lower-cased when insensitive.
    pub fn normalize(self, path: &Path) -> String {
        let key = path.to_string_lossy().replace('\\', "/");
        let key = match key.trim_end_matches('/') {
            "" => "/".to_string(),
            trimmed => trimmed.to_string(),
        };
        match self {
            Casing::Sensitive => key,
            Casing::Insensitive => key.to_lowercase(),
        }
    }
}

impl Default for Casing {
    fn default() -> Self {
        Self::platform_default()
    }
}

/// An absolute path together with the data directory it belongs to.
///
/// Equality, ordering and hashing use the normalized key only, so two
/// paths with different casing compare equal under [`Casing::Insensitive`].
#[derive(Debug, Clone)]
pub struct DataDirPath {
    path: PathBuf,
    key: String,
    data_dir_index: Option<usize>,
    data_dir_root_segments: usize,
}

impl DataDirPath {
    /// Path that has not been matched against any data directory yet.
    pub fn unrooted(path: impl Into<PathBuf>, casing: Casing) -> Self {
        let path = path.into();
        Self {
            key: casing.normalize(&path),
            path,
            data_dir_index: None,
            data_dir_root_segments: 0,
        }
    }

    /// Match `path` against the ordered data directory roots (already
    /// normalized). The first root containing the path wins.
    pub fn resolve(path: impl Into<PathBuf>, roots: &[String], casing: Casing) -> Option<Self> {
        let mut resolved = Self::unrooted(path, casing);
        let (index, root) = roots.iter().enumerate().find(|(_, root)| {
            resolved.key == **root || resolved.key.starts_with(&format!("{}/", root.trim_end_matches('/')))
        })?;
        resolved.data_dir_index = Some(index);
        resolved.data_dir_root_segments = root.trim_end_matches('/').split('/').count();
        Some(resolved)
    }

    /// Absolute path with the casing it was last seen with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn data_dir_index(&self) -> Option<usize> {
        self.data_dir_index
    }

    /// Part of the path below its data directory, without a leading slash.
    /// Counted in segments since lower-casing may change byte lengths.
    pub fn data_dir_relative(&self) -> String {
        let full = self.path.to_string_lossy().replace('\\', "/");
        full.split('/')
            .skip(self.data_dir_root_segments)
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// File or folder name with its stored casing.
    pub fn file_name(&self) -> Option<String> {
        self.path.file_name().map(|name| name.to_string_lossy().into_owned())
    }

    /// Whether `self` lies strictly below `folder`.
    pub fn is_under(&self, folder: &DataDirPath) -> bool {
        self.key.len() > folder.key.len()
            && self.key.starts_with(&folder.key)
            && (folder.key.ends_with('/') || self.key.as_bytes()[folder.key.len()] == b'/')
    }

    /// Number of path components, used to delete folders deepest first.
    pub fn depth(&self) -> usize {
        self.key.matches('/').count()
    }
}

impl PartialEq for DataDirPath {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for DataDirPath {}

impl PartialOrd for DataDirPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DataDirPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl Hash for DataDirPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for DataDirPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
