use crate::domain::objects::author::Author;
use crate::domain::objects::changeset::{FileChange, FileOp};
use anyhow::{bail, Context};
use chrono::{DateTime, FixedOffset};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// One commit to persist: file operations are relative to the first parent's
/// tree (an empty tree for root commits).
#[derive(Debug, Clone)]
pub struct CommitSpec<'a> {
    pub parents: &'a [String],
    pub changes: &'a [FileChange],
    pub author: &'a Author,
    pub timestamp: DateTime<FixedOffset>,
    pub message: &'a str,
}

/// The target Git repository. Tree construction is delegated here; the
/// pipeline only hands over file lists with modes and ref updates.
pub trait GitWriter {
    fn write_commit(&mut self, spec: &CommitSpec<'_>) -> anyhow::Result<String>;
    fn update_ref(&mut self, refname: &str, commit: &str) -> anyhow::Result<()>;
    fn delete_ref(&mut self, refname: &str) -> anyhow::Result<()>;
    fn flush(&mut self) -> anyhow::Result<()>;
}

/// Writes through spawned `git` plumbing: `hash-object`, `read-tree`,
/// `update-index`, `write-tree`, `commit-tree` and `update-ref`, against a
/// scratch index file so the target's own index stays untouched.
pub struct GitCommandRepository {
    repository: PathBuf,
    index_file: PathBuf,
}

impl GitCommandRepository {
    pub fn open(repository: &Path) -> anyhow::Result<Self> {
        let output = Command::new("git")
            .arg("-C")
            .arg(repository)
            .args(["rev-parse", "--git-dir"])
            .output()
            .context("failed to run git; is Git installed?")?;
        if !output.status.success() {
            bail!(
                "{} is not a Git repository: {}",
                repository.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let git_dir = String::from_utf8(output.stdout).context("git rev-parse output")?;
        let git_dir = repository.join(git_dir.trim());
        let index_file = git_dir.join("hg2git.index");

        Ok(GitCommandRepository {
            repository: repository.to_path_buf(),
            index_file,
        })
    }

    fn git(&self) -> Command {
        let mut command = Command::new("git");
        command
            .arg("-C")
            .arg(&self.repository)
            .env("GIT_INDEX_FILE", &self.index_file);
        command
    }

    fn run(&self, command: &mut Command, what: &str) -> anyhow::Result<Vec<u8>> {
        let output = command
            .output()
            .with_context(|| format!("failed to spawn git {what}"))?;
        if !output.status.success() {
            bail!(
                "git {what} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.stdout)
    }

    fn run_with_stdin(
        &self,
        command: &mut Command,
        what: &str,
        input: &[u8],
    ) -> anyhow::Result<Vec<u8>> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn git {what}"))?;

        child
            .stdin
            .take()
            .with_context(|| format!("no stdin for git {what}"))?
            .write_all(input)
            .with_context(|| format!("failed to feed git {what}"))?;

        let output = child
            .wait_with_output()
            .with_context(|| format!("git {what} did not finish"))?;
        if !output.status.success() {
            bail!(
                "git {what} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.stdout)
    }

    fn hash_object(&self, change: &FileChange) -> anyhow::Result<String> {
        let content = change
            .content
            .as_deref()
            .with_context(|| format!("no content for {}", change.path))?;

        let stdout = self.run_with_stdin(
            self.git().args(["hash-object", "-w", "--stdin"]),
            "hash-object",
            content,
        )?;
        Ok(String::from_utf8(stdout).context("hash-object output")?.trim().to_string())
    }

    /// Populate the scratch index with the base tree and apply the staged
    /// changes through `update-index --index-info`.
    fn stage(&self, base: Option<&str>, changes: &[FileChange]) -> anyhow::Result<()> {
        match base {
            Some(commit) => self.run(self.git().args(["read-tree", commit]), "read-tree")?,
            None => self.run(self.git().args(["read-tree", "--empty"]), "read-tree")?,
        };

        let mut index_info = Vec::new();
        for change in changes {
            match &change.op {
                FileOp::Delete => {
                    writeln!(index_info, "000000 {} 0\t{}", "0".repeat(40), change.path)?;
                }
                FileOp::Rename { from } => {
                    writeln!(index_info, "000000 {} 0\t{from}", "0".repeat(40))?;
                    let blob = self.hash_object(change)?;
                    writeln!(index_info, "{} {blob} 0\t{}", change.mode.as_str(), change.path)?;
                }
                FileOp::Add | FileOp::Modify => {
                    let blob = self.hash_object(change)?;
                    writeln!(index_info, "{} {blob} 0\t{}", change.mode.as_str(), change.path)?;
                }
            }
        }

        self.run_with_stdin(
            self.git().args(["update-index", "--index-info"]),
            "update-index",
            &index_info,
        )?;
        Ok(())
    }
}

impl GitWriter for GitCommandRepository {
    fn write_commit(&mut self, spec: &CommitSpec<'_>) -> anyhow::Result<String> {
        self.stage(spec.parents.first().map(String::as_str), spec.changes)?;

        let tree = self.run(self.git().args(["write-tree"]), "write-tree")?;
        let tree = String::from_utf8(tree).context("write-tree output")?.trim().to_string();

        let date = format!("{} {}", spec.timestamp.timestamp(), spec.timestamp.format("%z"));
        let mut command = self.git();
        command.args(["commit-tree", &tree]);
        for parent in spec.parents {
            command.args(["-p", parent]);
        }
        command
            .env("GIT_AUTHOR_NAME", &spec.author.name)
            .env("GIT_AUTHOR_EMAIL", &spec.author.email)
            .env("GIT_AUTHOR_DATE", &date)
            .env("GIT_COMMITTER_NAME", &spec.author.name)
            .env("GIT_COMMITTER_EMAIL", &spec.author.email)
            .env("GIT_COMMITTER_DATE", &date);

        let commit = self.run_with_stdin(&mut command, "commit-tree", spec.message.as_bytes())?;
        Ok(String::from_utf8(commit).context("commit-tree output")?.trim().to_string())
    }

    fn update_ref(&mut self, refname: &str, commit: &str) -> anyhow::Result<()> {
        self.run(self.git().args(["update-ref", refname, commit]), "update-ref")?;
        Ok(())
    }

    fn delete_ref(&mut self, refname: &str) -> anyhow::Result<()> {
        self.run(self.git().args(["update-ref", "-d", refname]), "update-ref -d")?;
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        // All writes go straight through; drop the scratch index.
        let _ = std::fs::remove_file(&self.index_file);
        Ok(())
    }
}

/// Discards everything, handing out synthetic commit ids. Used when no
/// `--target-repository` is given and the run only produces the log.
#[derive(Debug, Default)]
pub struct NullWriter {
    next_commit: u64,
}

impl GitWriter for NullWriter {
    fn write_commit(&mut self, _spec: &CommitSpec<'_>) -> anyhow::Result<String> {
        self.next_commit += 1;
        Ok(format!("{:040x}", self.next_commit))
    }

    fn update_ref(&mut self, _refname: &str, _commit: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn delete_ref(&mut self, _refname: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
