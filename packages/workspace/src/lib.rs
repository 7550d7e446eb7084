//! # Plasma Workspace
//!
//! Keeps an in-memory mirror of the files below a set of data directories:
//! timestamps, cached content hashes and the documents they are linked to.
//!
//! ## Flow
//!
//! ```text
//! disk ──scan──┐
//!              ├──> FileSystemModel ──> FileChangedEvent / FolderChangedEvent
//! notify ──────┘          │
//!                         └──> FileSystemCache (json, survives restarts)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use plasma_workspace::{FileSystemConfig, FileSystemModel, FilesMap, FoldersMap};
//!
//! let model = FileSystemModel::with_real_file_system();
//! model.initialize(FileSystemConfig::with_data_dirs(vec!["./data".into()]), FilesMap::new(), FoldersMap::new())?;
//! model.check_file_system()?;
//! let status = model.hash_file(Path::new("./data/level.json"))?;
//! ```

mod cache;
mod config;
mod error;
mod events;
mod model;
mod path;
mod status;
mod watcher;

pub use cache::{CachedFile, CachedFolder, FileSystemCache};
pub use config::FileSystemConfig;
pub use error::{FileSystemModelError, ModelResult};
pub use events::{EventDispatcher, FileChangedEvent, FileEventType, FolderChangedEvent, FolderEventType, Handler};
pub use model::{FileSystemModel, FilesMap, FoldersMap};
pub use path::{Casing, DataDirPath};
pub use status::{FileState, FileStatus};
pub use watcher::{FileWatcher, WatcherError, WatcherEvent, WatcherEventKind, WatcherResult};
