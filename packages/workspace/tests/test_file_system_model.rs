use plasma_common::MockFileSystem;
use plasma_workspace::{
    Casing, FileChangedEvent, FileEventType, FileState, FileStatus, FileSystemCache, FileSystemConfig,
    FileSystemModel, FileSystemModelError, FilesMap, FolderChangedEvent, FolderEventType, FoldersMap,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

fn config(casing: Casing) -> FileSystemConfig {
    FileSystemConfig {
        data_dirs: vec![PathBuf::from("/data")],
        casing,
        watch: false,
    }
}

fn sample_fs() -> Arc<MockFileSystem> {
    let fs = Arc::new(MockFileSystem::new());
    fs.add_dir("/data");
    fs.add_file("/data/a.txt", "alpha");
    fs.add_dir("/data/sub");
    fs.add_file("/data/sub/b.txt", "beta");
    fs
}

fn scanned(fs: &Arc<MockFileSystem>) -> FileSystemModel {
    let model = FileSystemModel::new(fs.clone());
    model
        .initialize(config(Casing::Sensitive), FilesMap::new(), FoldersMap::new())
        .expect("initialize");
    model.check_file_system().expect("scan");
    model
}

fn record_file_events(model: &FileSystemModel) -> Arc<Mutex<Vec<(FileEventType, Option<String>)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    model.subscribe_file_events(Arc::new(move |event: &FileChangedEvent| {
        let name = event.path.as_ref().and_then(|p| p.file_name());
        sink.lock().unwrap().push((event.event_type, name));
    }));
    seen
}

fn record_folder_events(model: &FileSystemModel) -> Arc<Mutex<Vec<(FolderEventType, Option<String>)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    model.subscribe_folder_events(Arc::new(move |event: &FolderChangedEvent| {
        let name = event.path.as_ref().and_then(|p| p.file_name());
        sink.lock().unwrap().push((event.event_type, name));
    }));
    seen
}

#[test]
fn test_scan_finds_files_and_folders() {
    let fs = sample_fs();
    let model = FileSystemModel::new(fs.clone());
    model
        .initialize(config(Casing::Sensitive), FilesMap::new(), FoldersMap::new())
        .unwrap();
    let files = record_file_events(&model);

    model.check_file_system().unwrap();

    assert_eq!(model.file_count(), 2);
    // The data directory itself is tracked as a folder.
    assert_eq!(model.folder_count(), 2);
    assert_eq!(
        *files.lock().unwrap(),
        vec![
            (FileEventType::FileAdded, Some("a.txt".to_string())),
            (FileEventType::FileAdded, Some("b.txt".to_string())),
            (FileEventType::ModelReset, None),
        ]
    );

    let status = model.find_file(Path::new("/data/sub/b.txt")).expect("b.txt is known");
    assert_eq!(status.state, FileState::Valid);
    assert_eq!(status.hash, 0);
    assert_eq!(fs.open_count(), 0);
}

#[test]
fn test_rescan_without_changes_is_silent() {
    let fs = sample_fs();
    let model = scanned(&fs);
    let files = record_file_events(&model);
    let folders = record_folder_events(&model);

    model.check_folder(Path::new("/data")).unwrap();

    assert!(files.lock().unwrap().is_empty());
    assert!(folders.lock().unwrap().is_empty());
}

#[test]
fn test_hash_is_cached_until_the_file_changes() {
    let fs = sample_fs();
    let model = scanned(&fs);
    let path = Path::new("/data/a.txt");

    let first = model.hash_file(path).unwrap();
    assert_ne!(first.hash, 0);
    assert_eq!(fs.open_count(), 1);

    let again = model.hash_file(path).unwrap();
    assert_eq!(again.hash, first.hash);
    assert_eq!(fs.open_count(), 1, "a current hash must not re-read the file");

    fs.touch(path);
    let files = record_file_events(&model);
    let touched = model.hash_file(path).unwrap();
    assert_eq!(fs.open_count(), 2);
    assert_eq!(touched.hash, first.hash, "same content, same hash");
    assert_eq!(*files.lock().unwrap(), vec![(FileEventType::FileChanged, Some("a.txt".to_string()))]);

    model.hash_file(path).unwrap();
    assert_eq!(fs.open_count(), 2);
}

#[test]
fn test_change_notification_invalidates_hash() {
    let fs = sample_fs();
    let model = scanned(&fs);
    let path = Path::new("/data/a.txt");
    let before = model.hash_file(path).unwrap();

    fs.add_file(path, "changed");
    model.notify_of_change(path).unwrap();
    assert_eq!(model.find_file(path).unwrap().hash, 0);

    let after = model.hash_file(path).unwrap();
    assert_ne!(after.hash, before.hash);
    assert_eq!(fs.open_count(), 2);
}

#[test]
fn test_read_document_matches_hash() {
    let fs = sample_fs();
    let model = scanned(&fs);
    let path = Path::new("/data/sub/b.txt");

    let (content, status) = model.read_document(path).unwrap();
    assert_eq!(content, b"beta");
    assert_eq!(model.hash_file(path).unwrap().hash, status.hash);
    assert_eq!(fs.open_count(), 1);
}

#[test]
fn test_locked_file_is_reported() {
    let fs = sample_fs();
    let model = scanned(&fs);
    let path = Path::new("/data/a.txt");
    fs.set_locked(path, true);

    let result = model.hash_file(path);
    assert!(matches!(result, Err(FileSystemModelError::FileLocked(_))));
    assert_eq!(model.find_file(path).unwrap().state, FileState::FileLocked);

    fs.set_locked(path, false);
    let status = model.hash_file(path).unwrap();
    assert_eq!(status.state, FileState::Valid);
    assert_ne!(status.hash, 0);
}

#[test]
fn test_removed_folders_go_deepest_first() {
    let fs = sample_fs();
    fs.add_dir("/data/sub/deep");
    fs.add_file("/data/sub/deep/c.txt", "gamma");
    let model = scanned(&fs);
    assert_eq!(model.file_count(), 3);
    let files = record_file_events(&model);
    let folders = record_folder_events(&model);

    fs.remove("/data/sub");
    model.check_folder(Path::new("/data")).unwrap();

    assert_eq!(model.file_count(), 1);
    assert_eq!(model.folder_count(), 1);
    assert_eq!(
        *folders.lock().unwrap(),
        vec![
            (FolderEventType::FolderRemoved, Some("deep".to_string())),
            (FolderEventType::FolderRemoved, Some("sub".to_string())),
        ]
    );
    let removed: Vec<_> = files.lock().unwrap().iter().map(|(t, _)| *t).collect();
    assert_eq!(removed, vec![FileEventType::FileRemoved, FileEventType::FileRemoved]);
}

#[test]
fn test_notify_of_removed_folder_drops_subtree() {
    let fs = sample_fs();
    let model = scanned(&fs);

    fs.remove("/data/sub");
    model.notify_of_change(Path::new("/data/sub")).unwrap();

    assert!(model.find_file(Path::new("/data/sub/b.txt")).is_none());
    assert!(model.find_file(Path::new("/data/a.txt")).is_some());
    assert_eq!(model.folder_count(), 1);
}

#[test]
fn test_notify_of_new_folder_scans_it() {
    let fs = sample_fs();
    let model = scanned(&fs);
    let folders = record_folder_events(&model);

    fs.add_dir("/data/new");
    fs.add_file("/data/new/one.txt", "1");
    fs.add_file("/data/new/two.txt", "2");
    model.notify_of_change(Path::new("/data/new")).unwrap();

    assert_eq!(model.file_count(), 4);
    assert_eq!(
        *folders.lock().unwrap(),
        vec![(FolderEventType::FolderAdded, Some("new".to_string()))]
    );
}

#[test]
fn test_event_raised_from_handler_is_delivered_after_current_one() {
    let fs = sample_fs();
    fs.add_file("/data/c.txt", "gamma");
    let model = Arc::new(FileSystemModel::new(fs.clone()));
    model
        .initialize(config(Casing::Sensitive), FilesMap::new(), FoldersMap::new())
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let depth = Arc::new(Mutex::new((0usize, 0usize)));
    let weak = Arc::downgrade(&model);
    let (sink, depth_in) = (seen.clone(), depth.clone());
    model.subscribe_file_events(Arc::new(move |event: &FileChangedEvent| {
        {
            let mut d = depth_in.lock().unwrap();
            d.0 += 1;
            d.1 = d.1.max(d.0);
        }
        let name = event.path.as_ref().and_then(|p| p.file_name());
        sink.lock().unwrap().push((event.event_type, name.clone()));
        if event.event_type == FileEventType::FileAdded && name.as_deref() == Some("a.txt") {
            if let Some(model) = weak.upgrade() {
                model.notify_of_change(Path::new("/data/c.txt")).unwrap();
                // The nested event is queued, not delivered yet.
                assert_eq!(sink.lock().unwrap().len(), 1);
            }
        }
        depth_in.lock().unwrap().0 -= 1;
    }));

    model.notify_of_change(Path::new("/data/a.txt")).unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (FileEventType::FileAdded, Some("a.txt".to_string())),
            (FileEventType::FileAdded, Some("c.txt".to_string())),
        ]
    );
    assert_eq!(depth.lock().unwrap().1, 1);
    assert_eq!(model.file_count(), 2);
}

#[test]
fn test_casing_change_renames_entry() {
    let fs = Arc::new(MockFileSystem::case_insensitive());
    fs.add_dir("/data");
    fs.add_file("/data/Readme.md", "docs");
    let model = FileSystemModel::new(fs.clone());
    model
        .initialize(config(Casing::Insensitive), FilesMap::new(), FoldersMap::new())
        .unwrap();
    model.check_file_system().unwrap();
    let doc = uuid::Uuid::new_v4();
    model.link_document(Path::new("/data/readme.md"), doc).unwrap();
    let files = record_file_events(&model);

    fs.remove("/data/Readme.md");
    fs.add_file("/data/README.md", "docs");
    model.check_folder(Path::new("/data")).unwrap();

    assert_eq!(
        *files.lock().unwrap(),
        vec![
            (FileEventType::FileRemoved, Some("Readme.md".to_string())),
            (FileEventType::FileAdded, Some("README.md".to_string())),
        ]
    );
    let all = model.files();
    assert_eq!(all.len(), 1);
    let (path, status) = all.iter().next().unwrap();
    assert_eq!(path.file_name().as_deref(), Some("README.md"));
    assert_eq!(status.document_id, Some(doc));
}

#[test]
fn test_link_and_unlink_document() {
    let fs = sample_fs();
    let model = scanned(&fs);
    let files = record_file_events(&model);
    let path = Path::new("/data/a.txt");
    let doc = uuid::Uuid::new_v4();

    model.link_document(path, doc).unwrap();
    assert_eq!(model.find_file(path).unwrap().document_id, Some(doc));
    let found = model.find_file_by(|_, status| status.document_id == Some(doc));
    assert_eq!(found.map(|(p, _)| p.data_dir_relative()), Some("a.txt".to_string()));

    model.unlink_document(path).unwrap();
    assert_eq!(model.find_file(path).unwrap().document_id, None);
    // Unlinking twice is a no-op.
    model.unlink_document(path).unwrap();

    assert_eq!(
        *files.lock().unwrap(),
        vec![
            (FileEventType::DocumentLinked, Some("a.txt".to_string())),
            (FileEventType::DocumentUnlinked, Some("a.txt".to_string())),
        ]
    );
    assert!(matches!(
        model.link_document(Path::new("/data/missing.txt"), doc),
        Err(FileSystemModelError::UnknownFile(_))
    ));
}

#[test]
fn test_cached_hash_survives_restart() {
    let fs = sample_fs();
    let model = scanned(&fs);
    let hash = model.hash_file(Path::new("/data/a.txt")).unwrap().hash;
    let (files, folders) = model.deinitialize();
    assert!(!model.is_initialized());

    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("fs-cache.json");
    FileSystemCache::from_maps(&files, &folders).save(&cache_path).unwrap();
    let (files, folders) = FileSystemCache::load(&cache_path).unwrap().into_maps(Casing::Sensitive);

    let restarted = FileSystemModel::new(fs.clone());
    restarted
        .initialize(config(Casing::Sensitive), files, folders)
        .unwrap();
    assert_eq!(restarted.file_count(), 2);
    assert_eq!(restarted.hash_file(Path::new("/data/a.txt")).unwrap().hash, hash);
    assert_eq!(fs.open_count(), 1, "restarted model reuses the cached hash");
}

#[test]
fn test_initialize_keeps_seeded_status() {
    let fs = sample_fs();
    let mut files = FilesMap::new();
    let mut status = FileStatus::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000));
    status.hash = 5;
    files.insert(plasma_workspace::DataDirPath::unrooted("/data/a.txt", Casing::Sensitive), status);

    let model = FileSystemModel::new(fs.clone());
    model
        .initialize(config(Casing::Sensitive), files, FoldersMap::new())
        .unwrap();

    assert_eq!(model.hash_file(Path::new("/data/a.txt")).unwrap().hash, 5);
    assert_eq!(fs.open_count(), 0);
}

#[test]
fn test_real_file_system_scan_and_hash() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    std::fs::write(dir.path().join("nested").join("file.txt"), "content").unwrap();

    let model = FileSystemModel::with_real_file_system();
    model
        .initialize(
            FileSystemConfig {
                data_dirs: vec![dir.path().to_path_buf()],
                casing: Casing::Sensitive,
                watch: false,
            },
            FilesMap::new(),
            FoldersMap::new(),
        )
        .unwrap();
    model.check_file_system().unwrap();

    let root = model.data_dirs()[0].clone();
    let file = root.join("nested").join("file.txt");
    assert_eq!(model.file_count(), 1);
    let status = model.hash_file(&file).unwrap();
    assert_ne!(status.hash, 0);

    let (content, _) = model.read_document(&file).unwrap();
    assert_eq!(content, b"content");
}
