use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// Metadata reported by [`FileSystem::stat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStats {
    pub is_directory: bool,
    pub last_modified: SystemTime,
    pub size: u64,
    /// File name with the casing the file system reports.
    pub name: String,
}

/// One entry produced by [`FileSystem::walk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub path: PathBuf,
    pub stats: FileStats,
}

/// File system abstraction for path resolution, scanning and testing
pub trait FileSystem: Send + Sync {
    /// Check if a file exists
    fn exists(&self, path: &Path) -> bool;

    /// Canonicalize a path (resolve symlinks, make absolute)
    fn canonicalize(&self, path: &Path) -> Result<PathBuf, io::Error>;

    /// Stat a single file or directory
    fn stat(&self, path: &Path) -> Result<FileStats, io::Error>;

    /// Recursively list everything below `root` (not including `root`).
    /// Parents are listed before their children.
    fn walk(&self, root: &Path) -> Result<Vec<DirEntry>, io::Error>;

    /// Open a file for shared reading
    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>, io::Error>;
}

/// Real file system implementation
pub struct RealFileSystem;

impl RealFileSystem {
    fn stats_from_metadata(path: &Path, metadata: &std::fs::Metadata) -> FileStats {
        FileStats {
            is_directory: metadata.is_dir(),
            last_modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            size: metadata.len(),
            name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

impl FileSystem for RealFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, io::Error> {
        std::fs::canonicalize(path)
    }

    fn stat(&self, path: &Path) -> Result<FileStats, io::Error> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self::stats_from_metadata(path, &metadata))
    }

    fn walk(&self, root: &Path) -> Result<Vec<DirEntry>, io::Error> {
        let mut entries = Vec::new();
        for entry in walkdir::WalkDir::new(root).min_depth(1) {
            let entry = entry.map_err(io::Error::from)?;
            let metadata = entry.metadata().map_err(io::Error::from)?;
            entries.push(DirEntry {
                path: entry.path().to_path_buf(),
                stats: Self::stats_from_metadata(entry.path(), &metadata),
            });
        }
        Ok(entries)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>, io::Error> {
        Ok(Box::new(std::fs::File::open(path)?))
    }
}

#[derive(Debug, Clone)]
struct MockEntry {
    path: PathBuf,
    is_directory: bool,
    contents: Vec<u8>,
    last_modified: SystemTime,
    locked: bool,
}

#[derive(Debug, Default)]
struct MockState {
    entries: BTreeMap<String, MockEntry>,
    open_count: usize,
}

/// In-memory file system for tests. Counts opens so tests can tell whether
/// file content was read, and can simulate locked files and case-insensitive
/// lookups.
pub struct MockFileSystem {
    state: Mutex<MockState>,
    case_insensitive: bool,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            case_insensitive: false,
        }
    }

    /// A mock that resolves paths regardless of casing and reports the
    /// casing the entry was created with.
    pub fn case_insensitive() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            case_insensitive: true,
        }
    }

    fn key(&self, path: &Path) -> String {
        let key = path.to_string_lossy().replace('\\', "/");
        let key = key.trim_end_matches('/').to_string();
        if self.case_insensitive {
            key.to_lowercase()
        } else {
            key
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, path: &Path, is_directory: bool, contents: Vec<u8>) {
        let key = self.key(path);
        let mut state = self.lock();
        let last_modified = state
            .entries
            .get(&key)
            .map(|entry| entry.last_modified + Duration::from_secs(1))
            .unwrap_or(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000));
        state.entries.insert(
            key,
            MockEntry {
                path: path.to_path_buf(),
                is_directory,
                contents,
                last_modified,
                locked: false,
            },
        );
    }

    /// Add a directory (parents are not created implicitly).
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        self.insert(path.as_ref(), true, Vec::new());
    }

    /// Add or replace a file. Replacing advances its timestamp.
    pub fn add_file(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) {
        self.insert(path.as_ref(), false, contents.into());
    }

    /// Remove a file, or a directory together with everything below it.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let key = self.key(path.as_ref());
        let prefix = format!("{key}/");
        let mut state = self.lock();
        state
            .entries
            .retain(|entry_key, _| entry_key != &key && !entry_key.starts_with(&prefix));
    }

    /// Advance the timestamp of an entry without changing its content.
    pub fn touch(&self, path: impl AsRef<Path>) {
        let key = self.key(path.as_ref());
        if let Some(entry) = self.lock().entries.get_mut(&key) {
            entry.last_modified += Duration::from_secs(1);
        }
    }

    pub fn set_modified(&self, path: impl AsRef<Path>, time: SystemTime) {
        let key = self.key(path.as_ref());
        if let Some(entry) = self.lock().entries.get_mut(&key) {
            entry.last_modified = time;
        }
    }

    /// Make `open` fail for the entry, as if another process held it.
    pub fn set_locked(&self, path: impl AsRef<Path>, locked: bool) {
        let key = self.key(path.as_ref());
        if let Some(entry) = self.lock().entries.get_mut(&key) {
            entry.locked = locked;
        }
    }

    /// Number of successful `open` calls so far.
    pub fn open_count(&self) -> usize {
        self.lock().open_count
    }

    fn stats_of(entry: &MockEntry) -> FileStats {
        FileStats {
            is_directory: entry.is_directory,
            last_modified: entry.last_modified,
            size: entry.contents.len() as u64,
            name: entry
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} does not exist", path.display()),
    )
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        let key = self.key(path);
        self.lock().entries.contains_key(&key)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, io::Error> {
        let key = self.key(path);
        self.lock()
            .entries
            .get(&key)
            .map(|entry| entry.path.clone())
            .ok_or_else(|| not_found(path))
    }

    fn stat(&self, path: &Path) -> Result<FileStats, io::Error> {
        let key = self.key(path);
        self.lock()
            .entries
            .get(&key)
            .map(Self::stats_of)
            .ok_or_else(|| not_found(path))
    }

    fn walk(&self, root: &Path) -> Result<Vec<DirEntry>, io::Error> {
        let key = self.key(root);
        let prefix = format!("{key}/");
        let state = self.lock();
        if !state.entries.contains_key(&key) {
            return Err(not_found(root));
        }
        // Sorted keys list every parent directly before its children.
        Ok(state
            .entries
            .iter()
            .filter(|(entry_key, _)| entry_key.starts_with(&prefix))
            .map(|(_, entry)| DirEntry {
                path: entry.path.clone(),
                stats: Self::stats_of(entry),
            })
            .collect())
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>, io::Error> {
        let key = self.key(path);
        let mut state = self.lock();
        let entry = state.entries.get(&key).ok_or_else(|| not_found(path))?;
        if entry.is_directory {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            ));
        }
        if entry.locked {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is locked", path.display()),
            ));
        }
        let contents = entry.contents.clone();
        state.open_count += 1;
        Ok(Box::new(Cursor::new(contents)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_walk_lists_parents_first() {
        let fs = MockFileSystem::new();
        fs.add_dir("/data");
        fs.add_dir("/data/a");
        fs.add_file("/data/a/one.txt", "1");
        fs.add_file("/data/b.txt", "2");

        let entries = fs.walk(Path::new("/data")).unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/data/a"),
                PathBuf::from("/data/a/one.txt"),
                PathBuf::from("/data/b.txt"),
            ]
        );
    }

    #[test]
    fn test_mock_counts_opens_and_locks() {
        let fs = MockFileSystem::new();
        fs.add_file("/f.txt", "hello");

        let mut content = String::new();
        fs.open(Path::new("/f.txt"))
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "hello");
        assert_eq!(fs.open_count(), 1);

        fs.set_locked("/f.txt", true);
        let err = fs.open(Path::new("/f.txt")).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(fs.open_count(), 1);
    }

    #[test]
    fn test_mock_touch_advances_timestamp() {
        let fs = MockFileSystem::new();
        fs.add_file("/f.txt", "x");
        let before = fs.stat(Path::new("/f.txt")).unwrap().last_modified;
        fs.touch("/f.txt");
        let after = fs.stat(Path::new("/f.txt")).unwrap().last_modified;
        assert!(after > before);
    }

    #[test]
    fn test_mock_case_insensitive_reports_stored_casing() {
        let fs = MockFileSystem::case_insensitive();
        fs.add_file("/Data/Readme.MD", "x");
        let stats = fs.stat(Path::new("/data/readme.md")).unwrap();
        assert_eq!(stats.name, "Readme.MD");
    }

    #[test]
    fn test_real_file_system_walk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/file.txt"), "content").unwrap();

        let fs = RealFileSystem;
        let entries = fs.walk(dir.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.stats.is_directory));
        let file = entries.iter().find(|e| !e.stats.is_directory).unwrap();
        assert_eq!(file.stats.size, 7);
        assert_eq!(file.stats.name, "file.txt");
    }
}
