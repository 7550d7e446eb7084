use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Failed to create watcher: {0}")]
    CreateError(#[from] notify::Error),

    #[error("Watch error: {0}")]
    WatchError(String),
}

pub type WatcherResult<T> = Result<T, WatcherError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherEventKind {
    FileAdded,
    FileRemoved,
    FileChanged,
    DirectoryAdded,
    DirectoryRemoved,
}

/// A change reported for one absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherEvent {
    pub kind: WatcherEventKind,
    pub path: PathBuf,
}

impl WatcherEvent {
    /// Translate a raw notify event. Access events and unknown kinds are
    /// dropped; renames become a removal of the old and an addition of the
    /// new path.
    pub fn from_notify(event: &Event) -> Vec<WatcherEvent> {
        let kind = match event.kind {
            EventKind::Create(CreateKind::Folder) => WatcherEventKind::DirectoryAdded,
            EventKind::Create(_) => WatcherEventKind::FileAdded,
            EventKind::Remove(RemoveKind::Folder) => WatcherEventKind::DirectoryRemoved,
            EventKind::Remove(_) => WatcherEventKind::FileRemoved,
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
                return vec![
                    WatcherEvent {
                        kind: WatcherEventKind::FileRemoved,
                        path: event.paths[0].clone(),
                    },
                    WatcherEvent {
                        kind: WatcherEventKind::FileAdded,
                        path: event.paths[1].clone(),
                    },
                ];
            }
            EventKind::Modify(_) => WatcherEventKind::FileChanged,
            _ => return Vec::new(),
        };
        event
            .paths
            .iter()
            .map(|path| WatcherEvent {
                kind,
                path: path.clone(),
            })
            .collect()
    }
}

/// Recursive watcher over a set of directories.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    receiver: Receiver<notify::Result<Event>>,
    roots: Vec<PathBuf>,
}

impl FileWatcher {
    pub fn new(roots: &[PathBuf]) -> WatcherResult<Self> {
        let (tx, rx) = channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;

        for root in roots {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| WatcherError::WatchError(format!("{}: {e}", root.display())))?;
            debug!(root = %root.display(), "watching data directory");
        }

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
            roots: roots.to_vec(),
        })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Block until the next translatable event arrives.
    pub fn next_events(&self) -> Option<Vec<WatcherEvent>> {
        loop {
            match self.receiver.recv() {
                Ok(Ok(event)) => {
                    let events = WatcherEvent::from_notify(&event);
                    if !events.is_empty() {
                        return Some(events);
                    }
                }
                Ok(Err(e)) => debug!(error = %e, "watcher reported an error"),
                Err(_) => return None,
            }
        }
    }

    /// Everything that arrived since the last call, without blocking.
    pub fn drain(&self) -> Vec<WatcherEvent> {
        let mut events = Vec::new();
        while let Ok(result) = self.receiver.try_recv() {
            match result {
                Ok(event) => events.extend(WatcherEvent::from_notify(&event)),
                Err(e) => debug!(error = %e, "watcher reported an error"),
            }
        }
        events
    }
}
