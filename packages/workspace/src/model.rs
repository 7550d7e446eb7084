//! # File System Model
//!
//! Mirror of the files and folders below the configured data directories.
//!
//! ## Design
//!
//! - One mutex guards the roots and both maps. It is held for map access
//!   only, never across file I/O; events are broadcast after it is released,
//!   so handlers may call back into the model.
//! - A full [`FileSystemModel::check_folder`] pass adds, updates and removes
//!   entries; the watcher feeds single paths into
//!   [`FileSystemModel::notify_of_change`].
//! - Content hashes are cached per file and invalidated whenever the file's
//!   timestamp changes.

use crate::config::FileSystemConfig;
use crate::error::{FileSystemModelError, ModelResult};
use crate::events::{EventDispatcher, FileChangedEvent, FileEventType, FolderChangedEvent, FolderEventType, Handler};
use crate::path::{Casing, DataDirPath};
use crate::status::{FileState, FileStatus};
use crate::watcher::FileWatcher;
use chrono::{DateTime, Utc};
use plasma_common::{FileStats, FileSystem, RealFileSystem, SubscriptionId};
use std::collections::{BTreeMap, HashSet};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

pub type FilesMap = BTreeMap<DataDirPath, FileStatus>;
pub type FoldersMap = BTreeMap<DataDirPath, FileState>;

const HASH_CHUNK_SIZE: usize = 4096;

#[derive(Default)]
struct ModelState {
    config: FileSystemConfig,
    roots: Vec<PathBuf>,
    root_keys: Vec<String>,
    files: FilesMap,
    folders: FoldersMap,
    initialized: bool,
}

impl ModelState {
    fn resolve(&self, path: &Path) -> ModelResult<DataDirPath> {
        if !self.initialized {
            return Err(FileSystemModelError::NotInitialized);
        }
        DataDirPath::resolve(path, &self.root_keys, self.config.casing)
            .ok_or_else(|| FileSystemModelError::NotInDataDir(path.to_path_buf()))
    }

    /// Remove `folder` and everything below it, deepest folders first.
    fn remove_subtree(&mut self, folder: &DataDirPath, events: &mut Events) {
        let stale_files: Vec<DataDirPath> = self.files.keys().filter(|f| f.is_under(folder)).cloned().collect();
        for file in stale_files {
            if let Some(status) = self.files.remove(&file) {
                events.files.push(FileChangedEvent::new(FileEventType::FileRemoved, file, status));
            }
        }
        let mut stale_folders: Vec<DataDirPath> = self
            .folders
            .keys()
            .filter(|f| *f == folder || f.is_under(folder))
            .cloned()
            .collect();
        stale_folders.sort_by_key(|f| std::cmp::Reverse(f.depth()));
        for stale in stale_folders {
            self.folders.remove(&stale);
            events.folders.push(FolderChangedEvent::new(FolderEventType::FolderRemoved, stale));
        }
    }
}

/// Events collected under the lock, broadcast after it is released.
#[derive(Default)]
struct Events {
    files: Vec<FileChangedEvent>,
    folders: Vec<FolderChangedEvent>,
}

fn to_utc(time: std::time::SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

/// 64-bit content hash. Never 0, which marks a hash as not computed.
fn finish_hash(hasher: &blake3::Hasher) -> u64 {
    let mut first = [0u8; 8];
    first.copy_from_slice(&hasher.finalize().as_bytes()[..8]);
    u64::from_le_bytes(first).max(1)
}

pub struct FileSystemModel {
    fs: Arc<dyn FileSystem>,
    state: Mutex<ModelState>,
    file_events: EventDispatcher<FileChangedEvent>,
    folder_events: EventDispatcher<FolderChangedEvent>,
    watcher: Mutex<Option<FileWatcher>>,
}

impl FileSystemModel {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            state: Mutex::new(ModelState::default()),
            file_events: EventDispatcher::new(),
            folder_events: EventDispatcher::new(),
            watcher: Mutex::new(None),
        }
    }

    pub fn with_real_file_system() -> Self {
        Self::new(Arc::new(RealFileSystem))
    }

    fn lock(&self) -> MutexGuard<'_, ModelState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_watcher(&self) -> MutexGuard<'_, Option<FileWatcher>> {
        self.watcher.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, events: Events) {
        for event in events.folders {
            self.folder_events.broadcast(event);
        }
        for event in events.files {
            self.file_events.broadcast(event);
        }
    }

    fn emit_reset(&self) {
        self.folder_events.broadcast(FolderChangedEvent::reset());
        self.file_events.broadcast(FileChangedEvent::reset());
    }

    // ---------------------------------------------------------------------
    // Lifetime
    // ---------------------------------------------------------------------

    /// Adopt `files` and `folders` (e.g. loaded from a cache), keeping only
    /// entries that lie inside one of the configured data directories.
    pub fn initialize(&self, config: FileSystemConfig, files: FilesMap, folders: FoldersMap) -> ModelResult<()> {
        let casing = config.casing;
        let mut roots = Vec::with_capacity(config.data_dirs.len());
        for dir in &config.data_dirs {
            let root = self
                .fs
                .canonicalize(dir)
                .map_err(|e| FileSystemModelError::io(dir, e))?;
            roots.push(root);
        }
        let root_keys: Vec<String> = roots.iter().map(|root| casing.normalize(root)).collect();

        let rebase = |path: &DataDirPath| DataDirPath::resolve(path.path(), &root_keys, casing);
        let mut kept_files = FilesMap::new();
        for (path, status) in files {
            match rebase(&path) {
                Some(resolved) => {
                    kept_files.insert(resolved, status);
                }
                None => debug!(path = %path, "dropping cached file outside the data directories"),
            }
        }
        let kept_folders: FoldersMap = folders
            .into_iter()
            .filter_map(|(path, state)| rebase(&path).map(|resolved| (resolved, state)))
            .collect();

        let watcher = if config.watch {
            match FileWatcher::new(&roots) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!(error = %e, "file watcher could not be installed, changes need a manual check");
                    None
                }
            }
        } else {
            None
        };

        info!(
            data_dirs = roots.len(),
            files = kept_files.len(),
            folders = kept_folders.len(),
            "file system model initialized"
        );
        {
            let mut state = self.lock();
            *state = ModelState {
                config,
                roots,
                root_keys,
                files: kept_files,
                folders: kept_folders,
                initialized: true,
            };
        }
        *self.lock_watcher() = watcher;
        self.emit_reset();
        Ok(())
    }

    /// Stop watching and hand back the current maps, e.g. to persist them.
    pub fn deinitialize(&self) -> (FilesMap, FoldersMap) {
        *self.lock_watcher() = None;
        let maps = {
            let mut state = self.lock();
            state.initialized = false;
            state.roots.clear();
            state.root_keys.clear();
            (std::mem::take(&mut state.files), std::mem::take(&mut state.folders))
        };
        info!("file system model deinitialized");
        self.emit_reset();
        maps
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    pub fn is_watching(&self) -> bool {
        self.lock_watcher().is_some()
    }

    /// Resolved data directory roots, in configuration order.
    pub fn data_dirs(&self) -> Vec<PathBuf> {
        self.lock().roots.clone()
    }

    pub fn casing(&self) -> Casing {
        self.lock().config.casing
    }

    pub fn make_data_dir_path(&self, path: &Path) -> ModelResult<DataDirPath> {
        self.lock().resolve(path)
    }

    // ---------------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------------

    pub fn subscribe_file_events(&self, handler: Handler<FileChangedEvent>) -> SubscriptionId {
        self.file_events.subscribe(handler)
    }

    pub fn unsubscribe_file_events(&self, id: SubscriptionId) -> bool {
        self.file_events.unsubscribe(id)
    }

    pub fn subscribe_folder_events(&self, handler: Handler<FolderChangedEvent>) -> SubscriptionId {
        self.folder_events.subscribe(handler)
    }

    pub fn unsubscribe_folder_events(&self, id: SubscriptionId) -> bool {
        self.folder_events.unsubscribe(id)
    }

    // ---------------------------------------------------------------------
    // Reconciliation
    // ---------------------------------------------------------------------

    /// Reconcile every data directory against disk.
    pub fn check_file_system(&self) -> ModelResult<()> {
        for root in self.data_dirs() {
            self.check_folder(&root)?;
        }
        self.emit_reset();
        Ok(())
    }

    /// Scan `path` recursively, adding and updating what exists and removing
    /// what no longer does.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn check_folder(&self, path: &Path) -> ModelResult<()> {
        let folder = self.make_data_dir_path(path)?;
        let stats = match self.fs.stat(path) {
            Ok(stats) => stats,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.remove_entry(&folder);
                return Ok(());
            }
            Err(e) => return Err(FileSystemModelError::io(path, e)),
        };
        self.upsert(folder.clone(), &stats, false)?;

        let entries = self.fs.walk(path).map_err(|e| FileSystemModelError::io(path, e))?;
        let mut visited = HashSet::with_capacity(entries.len() + 1);
        visited.insert(folder.clone());
        for entry in entries {
            let resolved = self.make_data_dir_path(&entry.path)?;
            visited.insert(resolved.clone());
            self.upsert(resolved, &entry.stats, false)?;
        }

        let mut events = Events::default();
        {
            let mut state = self.lock();
            let stale_files: Vec<DataDirPath> = state
                .files
                .keys()
                .filter(|f| f.is_under(&folder) && !visited.contains(*f))
                .cloned()
                .collect();
            for file in stale_files {
                if let Some(status) = state.files.remove(&file) {
                    events.files.push(FileChangedEvent::new(FileEventType::FileRemoved, file, status));
                }
            }
            let mut stale_folders: Vec<DataDirPath> = state
                .folders
                .keys()
                .filter(|f| f.is_under(&folder) && !visited.contains(*f))
                .cloned()
                .collect();
            stale_folders.sort_by_key(|f| std::cmp::Reverse(f.depth()));
            for stale in stale_folders {
                state.folders.remove(&stale);
                events.folders.push(FolderChangedEvent::new(FolderEventType::FolderRemoved, stale));
            }
        }
        debug!(removed_files = events.files.len(), removed_folders = events.folders.len(), "folder checked");
        self.emit(events);
        Ok(())
    }

    /// Record one entry reported by the file system. New folders are scanned.
    pub fn handle_single_file(&self, path: &Path, stats: &FileStats) -> ModelResult<()> {
        let resolved = self.make_data_dir_path(path)?;
        self.upsert(resolved, stats, true)
    }

    fn upsert(&self, path: DataDirPath, stats: &FileStats, recurse: bool) -> ModelResult<()> {
        if stats.is_directory {
            let added = {
                let mut state = self.lock();
                match state.folders.get_mut(&path) {
                    Some(folder_state) => {
                        *folder_state = FileState::Valid;
                        false
                    }
                    None => {
                        state.folders.insert(path.clone(), FileState::Valid);
                        true
                    }
                }
            };
            if added {
                debug!(folder = %path, "folder added");
                self.folder_events
                    .broadcast(FolderChangedEvent::new(FolderEventType::FolderAdded, path.clone()));
                if recurse {
                    self.check_folder(path.path())?;
                }
            }
            return Ok(());
        }

        let modified = to_utc(stats.last_modified);
        let mut events = Events::default();
        {
            let mut state = self.lock();
            let casing = state.config.casing;

            let stored = state.files.get_key_value(&path).map(|(key, status)| (key.clone(), status.clone()));
            match stored {
                Some((old_key, old_status))
                    if casing == Casing::Insensitive
                        && !stats.name.is_empty()
                        && old_key.file_name().as_deref() != Some(stats.name.as_str()) =>
                {
                    // Same file, new casing: re-add under the reported name.
                    let renamed = state.resolve(&path.path().with_file_name(&stats.name))?;
                    state.files.remove(&old_key);
                    let mut status = FileStatus::new(stats.last_modified);
                    status.document_id = old_status.document_id;
                    if old_status.last_modified == modified {
                        status.hash = old_status.hash;
                    }
                    state.files.insert(renamed.clone(), status.clone());
                    events
                        .files
                        .push(FileChangedEvent::new(FileEventType::FileRemoved, old_key, old_status));
                    events
                        .files
                        .push(FileChangedEvent::new(FileEventType::FileAdded, renamed, status));
                }
                Some(_) => {
                    if let Some(status) = state.files.get_mut(&path) {
                        if status.last_modified != modified {
                            status.last_modified = modified;
                            status.hash = 0;
                            status.state = FileState::Valid;
                            let status = status.clone();
                            events
                                .files
                                .push(FileChangedEvent::new(FileEventType::FileChanged, path.clone(), status));
                        }
                    }
                }
                None => {
                    let status = FileStatus::new(stats.last_modified);
                    state.files.insert(path.clone(), status.clone());
                    events
                        .files
                        .push(FileChangedEvent::new(FileEventType::FileAdded, path.clone(), status));
                }
            }
        }
        self.emit(events);
        Ok(())
    }

    fn remove_entry(&self, path: &DataDirPath) {
        let mut events = Events::default();
        {
            let mut state = self.lock();
            if let Some(status) = state.files.remove(path) {
                events
                    .files
                    .push(FileChangedEvent::new(FileEventType::FileRemoved, path.clone(), status));
            } else if state.folders.contains_key(path) {
                state.remove_subtree(path, &mut events);
            }
        }
        self.emit(events);
    }

    /// Re-examine a single absolute path after an external change.
    pub fn notify_of_change(&self, path: &Path) -> ModelResult<()> {
        let resolved = self.make_data_dir_path(path)?;
        match self.fs.stat(path) {
            Ok(stats) => self.upsert(resolved, &stats, true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.remove_entry(&resolved);
                Ok(())
            }
            Err(e) => Err(FileSystemModelError::io(path, e)),
        }
    }

    /// Feed pending watcher events into [`FileSystemModel::notify_of_change`].
    /// Returns how many paths were processed.
    pub fn process_watcher_events(&self) -> usize {
        let events = match self.lock_watcher().as_ref() {
            Some(watcher) => watcher.drain(),
            None => return 0,
        };
        let mut processed = 0;
        for event in events {
            match self.notify_of_change(&event.path) {
                Ok(()) => processed += 1,
                Err(FileSystemModelError::NotInDataDir(_)) => {}
                Err(e) => warn!(path = %event.path.display(), error = %e, "failed to process file change"),
            }
        }
        processed
    }

    // ---------------------------------------------------------------------
    // Content
    // ---------------------------------------------------------------------

    fn open_for_read(&self, path: &Path, resolved: &DataDirPath) -> ModelResult<Box<dyn Read + Send>> {
        match self.fs.open(path) {
            Ok(reader) => Ok(reader),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.remove_entry(resolved);
                Err(FileSystemModelError::io(path, e))
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to open file");
                let mut state = self.lock();
                let status = state.files.entry(resolved.clone()).or_default();
                status.state = FileState::FileLocked;
                status.hash = 0;
                Err(FileSystemModelError::FileLocked(path.to_path_buf()))
            }
        }
    }

    /// Store a freshly read hash and timestamp, returning the new status.
    fn commit_content(&self, resolved: DataDirPath, stats: &FileStats, hash: u64) -> FileStatus {
        let modified = to_utc(stats.last_modified);
        let mut events = Events::default();
        let status = {
            let mut state = self.lock();
            let previous = state.files.get(&resolved).cloned();
            let status = FileStatus {
                state: FileState::Valid,
                last_modified: modified,
                hash,
                document_id: previous.as_ref().and_then(|p| p.document_id),
            };
            match previous {
                None => events.files.push(FileChangedEvent::new(
                    FileEventType::FileAdded,
                    resolved.clone(),
                    status.clone(),
                )),
                Some(previous) if previous.last_modified != modified || previous.state != FileState::Valid => {
                    events.files.push(FileChangedEvent::new(
                        FileEventType::FileChanged,
                        resolved.clone(),
                        status.clone(),
                    ))
                }
                Some(_) => {}
            }
            state.files.insert(resolved, status.clone());
            status
        };
        self.emit(events);
        status
    }

    /// Hash of the file's content. A cached hash is returned without reading
    /// the file as long as its timestamp did not change.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn hash_file(&self, path: &Path) -> ModelResult<FileStatus> {
        let resolved = self.make_data_dir_path(path)?;
        let stats = self.fs.stat(path).map_err(|e| FileSystemModelError::io(path, e))?;
        if stats.is_directory {
            return Err(FileSystemModelError::io(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "cannot hash a directory"),
            ));
        }
        if let Some(cached) = self.lock().files.get(&resolved) {
            if cached.is_hash_current(stats.last_modified) {
                return Ok(cached.clone());
            }
        }

        let mut reader = self.open_for_read(path, &resolved)?;
        // Stat again while the file is open so the stored timestamp matches
        // the content that is hashed.
        let stats = self.fs.stat(path).map_err(|e| FileSystemModelError::io(path, e))?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = [0u8; HASH_CHUNK_SIZE];
        loop {
            let read = reader.read(&mut buffer).map_err(|e| FileSystemModelError::io(path, e))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        drop(reader);

        let hash = finish_hash(&hasher);
        debug!(hash, "hashed file");
        Ok(self.commit_content(resolved, &stats, hash))
    }

    /// Read the whole file, updating its cached hash and timestamp on the way.
    pub fn read_document(&self, path: &Path) -> ModelResult<(Vec<u8>, FileStatus)> {
        let resolved = self.make_data_dir_path(path)?;
        let mut reader = self.open_for_read(path, &resolved)?;
        let stats = self.fs.stat(path).map_err(|e| FileSystemModelError::io(path, e))?;
        let mut content = Vec::with_capacity(stats.size as usize);
        reader
            .read_to_end(&mut content)
            .map_err(|e| FileSystemModelError::io(path, e))?;
        drop(reader);

        let mut hasher = blake3::Hasher::new();
        hasher.update(&content);
        let status = self.commit_content(resolved, &stats, finish_hash(&hasher));
        Ok((content, status))
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn find_file(&self, path: &Path) -> Option<FileStatus> {
        let state = self.lock();
        let resolved = state.resolve(path).ok()?;
        state.files.get(&resolved).cloned()
    }

    /// First file, in path order, for which `visitor` returns true.
    pub fn find_file_by(&self, mut visitor: impl FnMut(&DataDirPath, &FileStatus) -> bool) -> Option<(DataDirPath, FileStatus)> {
        let state = self.lock();
        state
            .files
            .iter()
            .find(|(path, status)| visitor(path, status))
            .map(|(path, status)| (path.clone(), status.clone()))
    }

    pub fn files(&self) -> FilesMap {
        self.lock().files.clone()
    }

    pub fn folders(&self) -> FoldersMap {
        self.lock().folders.clone()
    }

    pub fn file_count(&self) -> usize {
        self.lock().files.len()
    }

    pub fn folder_count(&self) -> usize {
        self.lock().folders.len()
    }

    // ---------------------------------------------------------------------
    // Document links
    // ---------------------------------------------------------------------

    pub fn link_document(&self, path: &Path, document: Uuid) -> ModelResult<()> {
        let event = {
            let mut state = self.lock();
            let resolved = state.resolve(path)?;
            let (key, status) = state
                .files
                .get_key_value(&resolved)
                .map(|(key, status)| (key.clone(), status.clone()))
                .ok_or_else(|| FileSystemModelError::UnknownFile(path.to_path_buf()))?;
            if status.document_id == Some(document) {
                return Ok(());
            }
            let mut status = status;
            status.document_id = Some(document);
            state.files.insert(key.clone(), status.clone());
            FileChangedEvent::new(FileEventType::DocumentLinked, key, status)
        };
        self.file_events.broadcast(event);
        Ok(())
    }

    pub fn unlink_document(&self, path: &Path) -> ModelResult<()> {
        let event = {
            let mut state = self.lock();
            let resolved = state.resolve(path)?;
            let Some((key, status)) = state
                .files
                .get_key_value(&resolved)
                .map(|(key, status)| (key.clone(), status.clone()))
            else {
                return Err(FileSystemModelError::UnknownFile(path.to_path_buf()));
            };
            if status.document_id.is_none() {
                return Ok(());
            }
            let mut status = status;
            status.document_id = None;
            state.files.insert(key.clone(), status.clone());
            FileChangedEvent::new(FileEventType::DocumentUnlinked, key, status)
        };
        self.file_events.broadcast(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plasma_common::MockFileSystem;

    fn model(fs: &Arc<MockFileSystem>) -> FileSystemModel {
        let model = FileSystemModel::new(fs.clone());
        let config = FileSystemConfig {
            data_dirs: vec![PathBuf::from("/data")],
            casing: Casing::Sensitive,
            watch: false,
        };
        model.initialize(config, FilesMap::new(), FoldersMap::new()).unwrap();
        model
    }

    #[test]
    fn test_uninitialized_model_refuses_paths() {
        let model = FileSystemModel::new(Arc::new(MockFileSystem::new()));
        assert!(matches!(
            model.make_data_dir_path(Path::new("/data/a.txt")),
            Err(FileSystemModelError::NotInitialized)
        ));
    }

    #[test]
    fn test_initialize_drops_entries_outside_roots() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_dir("/data");
        let mut files = FilesMap::new();
        files.insert(DataDirPath::unrooted("/data/kept.txt", Casing::Sensitive), FileStatus::default());
        files.insert(DataDirPath::unrooted("/old/dropped.txt", Casing::Sensitive), FileStatus::default());

        let model = FileSystemModel::new(fs.clone());
        let config = FileSystemConfig {
            data_dirs: vec![PathBuf::from("/data")],
            casing: Casing::Sensitive,
            watch: false,
        };
        model.initialize(config, files, FoldersMap::new()).unwrap();

        let files = model.files();
        assert_eq!(files.len(), 1);
        let (path, _) = files.iter().next().unwrap();
        assert_eq!(path.data_dir_index(), Some(0));
        assert_eq!(path.data_dir_relative(), "kept.txt");
    }

    #[test]
    fn test_initialize_fails_for_missing_data_dir() {
        let fs = Arc::new(MockFileSystem::new());
        let model = FileSystemModel::new(fs);
        let config = FileSystemConfig {
            data_dirs: vec![PathBuf::from("/missing")],
            casing: Casing::Sensitive,
            watch: false,
        };
        assert!(matches!(
            model.initialize(config, FilesMap::new(), FoldersMap::new()),
            Err(FileSystemModelError::Io { .. })
        ));
        assert!(!model.is_initialized());
    }

    #[test]
    fn test_paths_outside_data_dirs_are_rejected() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_dir("/data");
        let model = model(&fs);
        assert!(matches!(
            model.notify_of_change(Path::new("/other/file.txt")),
            Err(FileSystemModelError::NotInDataDir(_))
        ));
    }

    #[test]
    fn test_hash_is_never_zero() {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"anything");
        assert_ne!(finish_hash(&hasher), 0);
    }
}
