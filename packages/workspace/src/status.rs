use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// What the model knows about an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileState {
    /// Never successfully seen.
    #[default]
    Unknown,
    Valid,
    /// Opening the file failed, e.g. because another process holds it.
    FileLocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatus {
    pub state: FileState,
    pub last_modified: DateTime<Utc>,
    /// Content hash, 0 until computed or after the file changed.
    pub hash: u64,
    /// Document the file is linked to, if any.
    pub document_id: Option<Uuid>,
}

impl FileStatus {
    pub fn new(last_modified: SystemTime) -> Self {
        Self {
            state: FileState::Valid,
            last_modified: DateTime::<Utc>::from(last_modified),
            hash: 0,
            document_id: None,
        }
    }

    /// Whether the cached hash can be trusted for a file last modified at
    /// `modified`.
    pub fn is_hash_current(&self, modified: SystemTime) -> bool {
        self.hash != 0 && self.state == FileState::Valid && self.last_modified == DateTime::<Utc>::from(modified)
    }
}

impl Default for FileStatus {
    fn default() -> Self {
        Self {
            state: FileState::Unknown,
            last_modified: DateTime::<Utc>::from(SystemTime::UNIX_EPOCH),
            hash: 0,
            document_id: None,
        }
    }
}
