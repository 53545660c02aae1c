use crate::domain::objects::author::Author;
use crate::domain::objects::changeset::{Changeset, FileChange, FileOp};
use chrono::{DateTime, FixedOffset};
use derive_new::new;

/// Everything the Git writer needs to persist one commit. Author and
/// committer are identical, timestamps keep the Mercurial timezone offset.
#[derive(Debug, Clone)]
pub struct CommitMeta {
    pub author: Author,
    pub timestamp: DateTime<FixedOffset>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, new)]
pub struct CommitBuilder {
    decorate_revision_id: bool,
}

impl CommitBuilder {
    pub fn build(&self, changeset: &Changeset) -> anyhow::Result<CommitMeta> {
        Ok(CommitMeta {
            author: Author::parse(&changeset.author)?,
            timestamp: changeset.timestamp,
            message: self.compose_message(changeset),
        })
    }

    fn compose_message(&self, changeset: &Changeset) -> String {
        let mut message = if changeset.message.is_empty() {
            describe_changes(&changeset.files)
        } else {
            changeset.message.clone()
        };

        if self.decorate_revision_id {
            message.push_str(&format!("\n\nHG-revision: {}", changeset.rev));
        }
        message
    }
}

/// Synthesize a message for a changeset committed without one: a line per
/// file operation, grouped as added/modified/deleted/renamed, paths sorted
/// within each group.
pub fn describe_changes(files: &[FileChange]) -> String {
    let mut added = Vec::new();
    let mut modified = Vec::new();
    let mut deleted = Vec::new();
    let mut renamed = Vec::new();

    for change in files {
        match &change.op {
            FileOp::Add => added.push(format!("Added: {}", change.path)),
            FileOp::Modify => modified.push(format!("Modified: {}", change.path)),
            FileOp::Delete => deleted.push(format!("Deleted: {}", change.path)),
            FileOp::Rename { from } => {
                renamed.push(format!("Renamed: {from} → {}", change.path));
            }
        }
    }

    let mut lines = Vec::new();
    for mut section in [added, modified, deleted, renamed] {
        section.sort();
        lines.append(&mut section);
    }
    lines.join("\n")
}
