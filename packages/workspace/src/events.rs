//! # File system events
//!
//! Change events are delivered through an [`EventDispatcher`]. A broadcast
//! triggered from inside a handler on the same thread is queued instead of
//! delivered recursively; the outermost broadcast drains the queue, so every
//! event is delivered exactly once, in the order it was raised.

use crate::path::DataDirPath;
use crate::status::FileStatus;
use plasma_common::{EventSource, SubscriptionId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventType {
    FileAdded,
    FileChanged,
    FileRemoved,
    DocumentLinked,
    DocumentUnlinked,
    ModelReset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileChangedEvent {
    pub event_type: FileEventType,
    /// Unset for [`FileEventType::ModelReset`].
    pub path: Option<DataDirPath>,
    pub status: FileStatus,
}

impl FileChangedEvent {
    pub fn new(event_type: FileEventType, path: DataDirPath, status: FileStatus) -> Self {
        Self {
            event_type,
            path: Some(path),
            status,
        }
    }

    pub fn reset() -> Self {
        Self {
            event_type: FileEventType::ModelReset,
            path: None,
            status: FileStatus::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderEventType {
    FolderAdded,
    FolderRemoved,
    ModelReset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FolderChangedEvent {
    pub event_type: FolderEventType,
    pub path: Option<DataDirPath>,
}

impl FolderChangedEvent {
    pub fn new(event_type: FolderEventType, path: DataDirPath) -> Self {
        Self {
            event_type,
            path: Some(path),
        }
    }

    pub fn reset() -> Self {
        Self {
            event_type: FolderEventType::ModelReset,
            path: None,
        }
    }
}

pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Broadcaster with per-thread coalescing of re-entrant events.
pub struct EventDispatcher<E: Clone> {
    handlers: Mutex<EventSource<Handler<E>>>,
    /// Pending events of threads currently broadcasting.
    pending: Mutex<HashMap<ThreadId, VecDeque<E>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<E: Clone> EventDispatcher<E> {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(EventSource::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, handler: Handler<E>) -> SubscriptionId {
        lock(&self.handlers).subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.handlers).unsubscribe(id)
    }

    /// Deliver `event`, or queue it if this thread is already delivering.
    pub fn broadcast(&self, event: E) {
        let thread = thread::current().id();
        {
            let mut pending = lock(&self.pending);
            if let Some(queue) = pending.get_mut(&thread) {
                queue.push_back(event);
                return;
            }
            pending.insert(thread, VecDeque::from([event]));
        }
        let _guard = PendingGuard {
            pending: &self.pending,
            thread,
        };

        loop {
            let next = lock(&self.pending).get_mut(&thread).and_then(VecDeque::pop_front);
            let Some(event) = next else { break };

            let handlers = lock(&self.handlers).snapshot();
            for handler in handlers {
                handler(&event);
            }
        }
    }

    /// Whether the calling thread is inside [`EventDispatcher::broadcast`].
    pub fn is_broadcasting(&self) -> bool {
        lock(&self.pending).contains_key(&thread::current().id())
    }
}

/// Ends the thread's broadcast on drop, also when a handler panics.
struct PendingGuard<'a, E> {
    pending: &'a Mutex<HashMap<ThreadId, VecDeque<E>>>,
    thread: ThreadId,
}

impl<E> Drop for PendingGuard<'_, E> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.thread);
    }
}

impl<E: Clone> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}
