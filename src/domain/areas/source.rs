use crate::domain::objects::changeset::{Changeset, FileChange, FileMode, FileOp};
use anyhow::{bail, Context};
use chrono::{DateTime, FixedOffset};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Yields changesets in topological order. The pipeline is the only
/// consumer; implementations own whatever process or file handles they need
/// and release them on drop.
pub trait ChangesetSource {
    fn next_changeset(&mut self) -> anyhow::Result<Option<Changeset>>;
}

const FIELD_SEP: char = '\x1f';
const RECORD_SEP: char = '\x1e';

/// Metadata template: one record per revision, fields separated by control
/// characters that cannot appear in the values.
const LOG_TEMPLATE: &str =
    "{rev}\x1f{node}\x1f{p1node}\x1f{p2node}\x1f{branch}\x1f{author}\x1f{date|hgdate}\x1f{desc}\x1e";

#[derive(Debug, Clone)]
struct RevisionRecord {
    rev: u64,
    node: String,
    parents: Vec<String>,
    branch: String,
    author: String,
    timestamp: DateTime<FixedOffset>,
    message: String,
}

/// Reads a Mercurial repository through the `hg` command line client.
/// Revision numbers in Mercurial are already topological (a child always
/// carries a higher number than its parents), so ascending `hg log` order is
/// a valid pipeline order.
#[derive(Debug)]
pub struct HgCommandReader {
    repository: PathBuf,
    pending: VecDeque<RevisionRecord>,
}

impl HgCommandReader {
    pub fn open(repository: &Path) -> anyhow::Result<Self> {
        if !repository.join(".hg").is_dir() {
            bail!(
                "{} is not a Mercurial repository (no .hg directory)",
                repository.display()
            );
        }

        let mut reader = HgCommandReader {
            repository: repository.to_path_buf(),
            pending: VecDeque::new(),
        };

        let output = reader.run_hg(&["log", "-T", LOG_TEMPLATE])?;
        let text = String::from_utf8(output).context("hg log returned invalid UTF-8")?;

        // hg log lists newest first; the pipeline wants oldest first.
        let mut records = Vec::new();
        for record in text.split(RECORD_SEP) {
            if record.trim_matches(['\n', '\r']).is_empty() {
                continue;
            }
            records.push(parse_record(record)?);
        }
        records.sort_by_key(|record| record.rev);
        reader.pending = records.into();

        Ok(reader)
    }

    fn run_hg(&self, args: &[&str]) -> anyhow::Result<Vec<u8>> {
        let output = Command::new("hg")
            .arg("-R")
            .arg(&self.repository)
            .args(args)
            .env("HGENCODING", "UTF-8")
            .output()
            .context("failed to run hg; is Mercurial installed?")?;

        if !output.status.success() {
            bail!(
                "hg {} failed: {}",
                args.first().copied().unwrap_or(""),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.stdout)
    }

    fn read_file(&self, node: &str, path: &str) -> anyhow::Result<Vec<u8>> {
        self.run_hg(&["cat", "-r", node, &format!("path:{path}")])
            .with_context(|| format!("failed to read {path} at revision {node}"))
    }

    /// File modes at a revision: `hg files` reports `x` for executables and
    /// `l` for symlinks.
    fn file_modes(&self, node: &str) -> anyhow::Result<HashMap<String, FileMode>> {
        let output = self.run_hg(&["files", "-r", node, "-T", "{flags}\x1f{path}\x1e"])?;
        let text = String::from_utf8(output).context("hg files returned invalid UTF-8")?;

        let mut modes = HashMap::new();
        for record in text.split(RECORD_SEP) {
            let Some((flags, path)) = record.split_once(FIELD_SEP) else {
                continue;
            };
            let mode = match flags {
                "x" => FileMode::Executable,
                "l" => FileMode::Symlink,
                _ => FileMode::Regular,
            };
            modes.insert(path.to_string(), mode);
        }
        Ok(modes)
    }

    /// Per-changeset file operations from `hg status --change`, with rename
    /// detection: a copy whose source was removed in the same changeset is a
    /// rename.
    fn file_changes(&self, record: &RevisionRecord) -> anyhow::Result<Vec<FileChange>> {
        let output = self.run_hg(&["status", "--change", &record.node, "-C"])?;
        let text = String::from_utf8(output).context("hg status returned invalid UTF-8")?;

        let mut entries: Vec<(char, String, Option<String>)> = Vec::new();
        let mut removed = HashSet::new();
        for line in text.lines() {
            if let Some(source) = line.strip_prefix("  ") {
                // copy source for the preceding added file
                if let Some(last) = entries.last_mut() {
                    last.2 = Some(source.to_string());
                }
                continue;
            }

            let Some((status, path)) = line.split_once(' ') else {
                bail!("unexpected hg status line: \"{line}\"");
            };
            let status = status.chars().next().unwrap_or('?');
            if status == 'R' {
                removed.insert(path.to_string());
            }
            entries.push((status, path.to_string(), None));
        }

        let modes = self.file_modes(&record.node)?;
        let mut changes = Vec::new();
        for (status, path, copy_source) in entries {
            match status {
                'A' | 'M' => {
                    let content = self.read_file(&record.node, &path)?;
                    let op = match copy_source {
                        Some(source) if status == 'A' && removed.contains(&source) => {
                            FileOp::Rename { from: source }
                        }
                        _ if status == 'A' => FileOp::Add,
                        _ => FileOp::Modify,
                    };
                    changes.push(FileChange {
                        mode: modes.get(&path).copied().unwrap_or_default(),
                        path,
                        op,
                        content: Some(content.into()),
                    });
                }
                'R' => {
                    // Rename sources are represented by their rename entry.
                    let renamed_away = changes.iter().any(|change| {
                        matches!(&change.op, FileOp::Rename { from } if from == &path)
                    });
                    if !renamed_away {
                        changes.push(FileChange::deleted(&path));
                    }
                }
                other => bail!("unexpected hg status code '{other}' for {path}"),
            }
        }

        Ok(changes)
    }

    fn hgtags(&self, record: &RevisionRecord, changes: &[FileChange]) -> anyhow::Result<Option<String>> {
        let touched = changes.iter().any(|change| change.path == ".hgtags");
        if !touched {
            return Ok(None);
        }

        let deleted = changes
            .iter()
            .any(|change| change.path == ".hgtags" && change.op == FileOp::Delete);
        if deleted {
            return Ok(Some(String::new()));
        }

        let content = self.read_file(&record.node, ".hgtags")?;
        Ok(Some(
            String::from_utf8(content).context(".hgtags is not valid UTF-8")?,
        ))
    }
}

impl ChangesetSource for HgCommandReader {
    fn next_changeset(&mut self) -> anyhow::Result<Option<Changeset>> {
        let Some(record) = self.pending.pop_front() else {
            return Ok(None);
        };

        let files = self
            .file_changes(&record)
            .with_context(|| format!("while reading revision {} ({})", record.rev, record.node))?;
        let hgtags = self.hgtags(&record, &files)?;

        Ok(Some(Changeset {
            rev: record.rev,
            id: record.node,
            parents: record.parents,
            branch: record.branch,
            author: record.author,
            timestamp: record.timestamp,
            message: record.message,
            files,
            hgtags,
        }))
    }
}

fn parse_record(record: &str) -> anyhow::Result<RevisionRecord> {
    let record = record.trim_start_matches(['\n', '\r']);
    let fields: Vec<&str> = record.splitn(8, FIELD_SEP).collect();
    let [rev, node, p1, p2, branch, author, date, message] = fields.as_slice() else {
        bail!("malformed hg log record: \"{record}\"");
    };

    let rev: u64 = rev
        .parse()
        .with_context(|| format!("bad revision number \"{rev}\""))?;

    let null_node = "0".repeat(40);
    let parents = [p1, p2]
        .into_iter()
        .filter(|node| !node.is_empty() && **node != null_node)
        .map(|node| node.to_string())
        .collect();

    Ok(RevisionRecord {
        rev,
        node: node.to_string(),
        parents,
        branch: branch.to_string(),
        author: author.to_string(),
        timestamp: parse_hgdate(date)?,
        message: message.to_string(),
    })
}

/// `hgdate` is `<unix seconds> <offset>`, the offset in seconds west of UTC.
fn parse_hgdate(date: &str) -> anyhow::Result<DateTime<FixedOffset>> {
    let Some((seconds, offset)) = date.split_once(' ') else {
        bail!("malformed hgdate \"{date}\"");
    };

    let seconds: i64 = seconds
        .parse()
        .with_context(|| format!("bad timestamp in hgdate \"{date}\""))?;
    let offset_seconds: i32 = offset
        .parse()
        .with_context(|| format!("bad timezone offset in hgdate \"{date}\""))?;

    let offset = FixedOffset::west_opt(offset_seconds)
        .with_context(|| format!("timezone offset out of range in hgdate \"{date}\""))?;
    let timestamp = DateTime::from_timestamp(seconds, 0)
        .with_context(|| format!("timestamp out of range in hgdate \"{date}\""))?;

    Ok(timestamp.with_timezone(&offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hgdate_preserves_the_timezone_offset() {
        // 2021-06-01 12:00:00 UTC, two hours east of UTC
        let parsed = parse_hgdate("1622548800 -7200").unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 7200);
        assert_eq!(parsed.timestamp(), 1622548800);
    }

    #[test]
    fn log_records_parse_into_revisions() {
        let node = "a".repeat(40);
        let parent = "b".repeat(40);
        let null = "0".repeat(40);
        let record = format!(
            "3\x1f{node}\x1f{parent}\x1f{null}\x1fdefault\x1fbob\x1f1622548800 0\x1ffix\nmore"
        );

        let revision = parse_record(&record).unwrap();
        assert_eq!(revision.rev, 3);
        assert_eq!(revision.parents, vec![parent]);
        assert_eq!(revision.branch, "default");
        assert_eq!(revision.message, "fix\nmore");
    }

    #[test]
    fn malformed_records_are_fatal() {
        assert!(parse_record("only\x1ftwo").is_err());
    }

    #[test]
    fn opening_a_non_repository_fails() {
        let err = HgCommandReader::open(Path::new("/definitely/not/a/repo")).unwrap_err();
        assert!(err.to_string().contains("not a Mercurial repository"));
    }
}
