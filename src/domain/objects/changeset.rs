use bytes::Bytes;
use chrono::{DateTime, FixedOffset};

/// A single Mercurial revision as delivered by the changeset source, in
/// topological order.
#[derive(Debug, Clone)]
pub struct Changeset {
    /// Local revision number.
    pub rev: u64,
    /// Full hex changeset id.
    pub id: String,
    /// Parent changeset ids, 0 to 2 entries.
    pub parents: Vec<String>,
    /// Mercurial named branch label.
    pub branch: String,
    /// Raw username string, any of the forms Mercurial users write.
    pub author: String,
    pub timestamp: DateTime<FixedOffset>,
    pub message: String,
    pub files: Vec<FileChange>,
    /// Contents of `.hgtags` at this revision, present only when the file
    /// changed here. An empty string means the file was deleted.
    pub hgtags: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOp {
    Add,
    Modify,
    Delete,
    Rename { from: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileMode {
    #[default]
    Regular,
    Executable,
    Symlink,
}

impl FileMode {
    pub fn as_str(&self) -> &str {
        match self {
            FileMode::Regular => "100644",
            FileMode::Executable => "100755",
            FileMode::Symlink => "120000",
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            FileMode::Regular => 0o100644,
            FileMode::Executable => 0o100755,
            FileMode::Symlink => 0o120000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileChange {
    pub path: String,
    pub op: FileOp,
    pub mode: FileMode,
    /// File contents for adds and modifications; deletions carry none.
    pub content: Option<Bytes>,
}

impl FileChange {
    pub fn added(path: &str, content: impl Into<Bytes>) -> Self {
        FileChange {
            path: path.to_string(),
            op: FileOp::Add,
            mode: FileMode::Regular,
            content: Some(content.into()),
        }
    }

    pub fn modified(path: &str, content: impl Into<Bytes>) -> Self {
        FileChange {
            path: path.to_string(),
            op: FileOp::Modify,
            mode: FileMode::Regular,
            content: Some(content.into()),
        }
    }

    pub fn deleted(path: &str) -> Self {
        FileChange {
            path: path.to_string(),
            op: FileOp::Delete,
            mode: FileMode::Regular,
            content: None,
        }
    }

    pub fn renamed(from: &str, to: &str, content: impl Into<Bytes>) -> Self {
        FileChange {
            path: to.to_string(),
            op: FileOp::Rename {
                from: from.to_string(),
            },
            mode: FileMode::Regular,
            content: Some(content.into()),
        }
    }

    pub fn with_mode(mut self, mode: FileMode) -> Self {
        self.mode = mode;
        self
    }
}
