use std::path::PathBuf;
use thiserror::Error;

use crate::watcher::WatcherError;

#[derive(Error, Debug)]
pub enum FileSystemModelError {
    #[error("Path is not inside any data directory: {0}")]
    NotInDataDir(PathBuf),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File is locked: {0}")]
    FileLocked(PathBuf),

    #[error("Unknown file: {0}")]
    UnknownFile(PathBuf),

    #[error("Watcher error: {0}")]
    Watcher(#[from] WatcherError),

    #[error("Cache error: {0}")]
    Cache(#[from] serde_json::Error),

    #[error("File system model is not initialized")]
    NotInitialized,
}

impl FileSystemModelError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type ModelResult<T> = Result<T, FileSystemModelError>;
