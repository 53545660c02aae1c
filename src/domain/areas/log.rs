use crate::domain::objects::changeset::{Changeset, FileOp};
use anyhow::{bail, Context};
use std::io::Write;

/// What the conversion log records, accumulated from repeated
/// `--verbose` options. `all` is shorthand for `dump,revs,commits`;
/// `dump_all` is orthogonal and implies `dump`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogFlags {
    pub dump: bool,
    pub dump_all: bool,
    pub revs: bool,
    pub commits: bool,
}

impl LogFlags {
    pub fn from_verbose(values: &[String]) -> anyhow::Result<Self> {
        let mut flags = LogFlags::default();

        for value in values {
            for item in value.split(',') {
                let item = item.trim();
                match item {
                    "dump" => flags.dump = true,
                    "revs" => flags.revs = true,
                    "commits" => flags.commits = true,
                    "all" => {
                        flags.dump = true;
                        flags.revs = true;
                        flags.commits = true;
                    }
                    "dump_all" => {
                        flags.dump = true;
                        flags.dump_all = true;
                    }
                    "" => {}
                    other => bail!(
                        "unknown --verbose value \"{other}\" \
                         (expected dump, revs, commits, all or dump_all)"
                    ),
                }
            }
        }

        Ok(flags)
    }
}

/// The conversion log sink. Everything user-facing about a run that is not
/// progress indication goes through here; the sink is stdout or the
/// `--log` file.
pub struct ConversionLog {
    sink: Box<dyn Write>,
    flags: LogFlags,
}

impl ConversionLog {
    pub fn new(sink: Box<dyn Write>, flags: LogFlags) -> Self {
        ConversionLog { sink, flags }
    }

    pub fn flags(&self) -> LogFlags {
        self.flags
    }

    pub fn dump_changeset(&mut self, changeset: &Changeset) -> anyhow::Result<()> {
        if !self.flags.dump {
            return Ok(());
        }

        writeln!(
            self.sink,
            "REVISION: {} ({}), branch: {}, time: {}, author: {}",
            changeset.rev,
            changeset.id,
            changeset.branch,
            changeset.timestamp.to_rfc3339(),
            changeset.author
        )
        .context("failed to write conversion log")?;

        if !changeset.message.is_empty() {
            let mut lines = changeset.message.lines();
            if let Some(first) = lines.next() {
                writeln!(self.sink, "MESSAGE: {first}")?;
            }
            for line in lines {
                writeln!(self.sink, "         {line}")?;
            }
        }

        for change in &changeset.files {
            match &change.op {
                FileOp::Add => writeln!(self.sink, "   FILE add {}", change.path)?,
                FileOp::Modify => writeln!(self.sink, "   FILE change {}", change.path)?,
                FileOp::Delete => writeln!(self.sink, "   FILE delete {}", change.path)?,
                FileOp::Rename { from } => {
                    writeln!(self.sink, "   FILE rename {from} to {}", change.path)?;
                }
            }
        }

        writeln!(self.sink).context("failed to write conversion log")
    }

    pub fn revision(&mut self, changeset: &Changeset, refname: &str) -> anyhow::Result<()> {
        if !self.flags.revs {
            return Ok(());
        }
        writeln!(
            self.sink,
            "REV: {} ({}) -> {refname}",
            changeset.rev, changeset.id
        )
        .context("failed to write conversion log")
    }

    pub fn commit(
        &mut self,
        commit: &str,
        refname: &str,
        branch: &str,
        rev: u64,
    ) -> anyhow::Result<()> {
        if !self.flags.commits {
            return Ok(());
        }
        writeln!(self.sink, "COMMIT:{commit} REF:{refname} BRANCH:{branch};{rev}")
            .context("failed to write conversion log")
    }

    pub fn skipped(&mut self, changeset: &Changeset, reason: &str) -> anyhow::Result<()> {
        if !self.flags.dump_all {
            return Ok(());
        }
        writeln!(
            self.sink,
            "SKIPPED: {} ({}): {reason}",
            changeset.rev, changeset.id
        )
        .context("failed to write conversion log")
    }

    /// Warnings are written regardless of verbosity.
    pub fn warning(&mut self, message: &str) -> anyhow::Result<()> {
        writeln!(self.sink, "WARNING: {message}").context("failed to write conversion log")
    }

    pub fn note(&mut self, message: &str) -> anyhow::Result<()> {
        writeln!(self.sink, "{message}").context("failed to write conversion log")
    }

    pub fn flush(&mut self) -> anyhow::Result<()> {
        self.sink.flush().context("failed to flush conversion log")
    }
}
