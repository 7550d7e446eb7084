//! On-disk snapshot of the model's maps, so a restart can skip rehashing
//! files whose timestamps did not change.

use crate::error::{FileSystemModelError, ModelResult};
use crate::model::{FilesMap, FoldersMap};
use crate::path::{Casing, DataDirPath};
use crate::status::{FileState, FileStatus};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedFile {
    pub path: PathBuf,
    pub status: FileStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedFolder {
    pub path: PathBuf,
    pub state: FileState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemCache {
    pub version: u32,
    pub files: Vec<CachedFile>,
    pub folders: Vec<CachedFolder>,
}

impl Default for FileSystemCache {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            files: Vec::new(),
            folders: Vec::new(),
        }
    }
}

impl FileSystemCache {
    pub fn from_maps(files: &FilesMap, folders: &FoldersMap) -> Self {
        Self {
            version: CACHE_VERSION,
            files: files
                .iter()
                .map(|(path, status)| CachedFile {
                    path: path.path().to_path_buf(),
                    status: status.clone(),
                })
                .collect(),
            folders: folders
                .iter()
                .map(|(path, state)| CachedFolder {
                    path: path.path().to_path_buf(),
                    state: *state,
                })
                .collect(),
        }
    }

    /// Unrooted maps, ready for [`crate::FileSystemModel::initialize`].
    pub fn into_maps(self, casing: Casing) -> (FilesMap, FoldersMap) {
        let files = self
            .files
            .into_iter()
            .map(|file| (DataDirPath::unrooted(file.path, casing), file.status))
            .collect();
        let folders = self
            .folders
            .into_iter()
            .map(|folder| (DataDirPath::unrooted(folder.path, casing), folder.state))
            .collect();
        (files, folders)
    }

    pub fn save(&self, path: &Path) -> ModelResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| FileSystemModelError::io(path, e))?;
        debug!(path = %path.display(), files = self.files.len(), "saved file system cache");
        Ok(())
    }

    /// Load a cache file. A missing file or one written by another cache
    /// version yields an empty cache.
    pub fn load(path: &Path) -> ModelResult<Self> {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(FileSystemModelError::io(path, e)),
        };
        let cache: Self = serde_json::from_str(&json)?;
        if cache.version != CACHE_VERSION {
            warn!(found = cache.version, expected = CACHE_VERSION, "ignoring outdated file system cache");
            return Ok(Self::default());
        }
        Ok(cache)
    }
}
