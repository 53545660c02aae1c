#![allow(dead_code)]

use chrono::{DateTime, FixedOffset, TimeZone};
use hg2git::domain::areas::log::{ConversionLog, LogFlags};
use hg2git::domain::areas::pipeline::{Counters, Pipeline};
use hg2git::domain::areas::repository::{CommitSpec, GitWriter};
use hg2git::domain::areas::source::ChangesetSource;
use hg2git::domain::config::project::{resolve, ConfigOverrides, ProjectConfig};
use hg2git::domain::config::schema::ConfigDocument;
use hg2git::domain::config::selector::ProjectFilter;
use hg2git::domain::objects::changeset::{Changeset, FileChange};
use hg2git::domain::objects::commit::CommitBuilder;
use std::collections::{BTreeMap, VecDeque};

/// Synthetic changeset id for a revision number.
pub fn node(rev: u64) -> String {
    format!("{rev:040x}")
}

pub fn timestamp(rev: u64) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(3600)
        .unwrap()
        .with_ymd_and_hms(2021, 6, 1, 12, 0, 0)
        .unwrap()
        + chrono::Duration::minutes(rev as i64)
}

pub fn changeset(
    rev: u64,
    parents: &[u64],
    branch: &str,
    message: &str,
    files: Vec<FileChange>,
) -> Changeset {
    Changeset {
        rev,
        id: node(rev),
        parents: parents.iter().map(|parent| node(*parent)).collect(),
        branch: branch.to_string(),
        author: "Alice Example <alice@example.org>".to_string(),
        timestamp: timestamp(rev),
        message: message.to_string(),
        files,
        hgtags: None,
    }
}

pub fn with_hgtags(mut changeset: Changeset, contents: &str) -> Changeset {
    changeset
        .files
        .push(FileChange::modified(".hgtags", contents.to_string()));
    changeset.hgtags = Some(contents.to_string());
    changeset
}

pub struct MemorySource {
    queue: VecDeque<Changeset>,
}

impl MemorySource {
    pub fn new(changesets: Vec<Changeset>) -> Self {
        MemorySource {
            queue: changesets.into(),
        }
    }
}

impl ChangesetSource for MemorySource {
    fn next_changeset(&mut self) -> anyhow::Result<Option<Changeset>> {
        Ok(self.queue.pop_front())
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCommit {
    pub id: String,
    pub parents: Vec<String>,
    pub author: String,
    pub timestamp: DateTime<FixedOffset>,
    pub message: String,
    pub paths: Vec<String>,
}

/// Remembers every commit and ref update instead of writing a repository.
#[derive(Debug, Default)]
pub struct RecordingWriter {
    pub commits: Vec<RecordedCommit>,
    pub refs: BTreeMap<String, String>,
    pub deleted_refs: Vec<String>,
    pub flushed: bool,
}

impl RecordingWriter {
    pub fn commit(&self, index: usize) -> &RecordedCommit {
        &self.commits[index]
    }

    pub fn resolve_ref(&self, refname: &str) -> &RecordedCommit {
        let id = self
            .refs
            .get(refname)
            .unwrap_or_else(|| panic!("ref {refname} was never written"));
        self.commits
            .iter()
            .find(|commit| &commit.id == id)
            .unwrap_or_else(|| panic!("ref {refname} points at unknown commit {id}"))
    }
}

impl GitWriter for RecordingWriter {
    fn write_commit(&mut self, spec: &CommitSpec<'_>) -> anyhow::Result<String> {
        let id = format!("{:040x}", 0xc0de_0000_u64 + self.commits.len() as u64);
        self.commits.push(RecordedCommit {
            id: id.clone(),
            parents: spec.parents.to_vec(),
            author: spec.author.display(),
            timestamp: spec.timestamp,
            message: spec.message.to_string(),
            paths: spec.changes.iter().map(|change| change.path.clone()).collect(),
        });
        Ok(id)
    }

    fn update_ref(&mut self, refname: &str, commit: &str) -> anyhow::Result<()> {
        self.refs.insert(refname.to_string(), commit.to_string());
        Ok(())
    }

    fn delete_ref(&mut self, refname: &str) -> anyhow::Result<()> {
        self.refs.remove(refname);
        self.deleted_refs.push(refname.to_string());
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.flushed = true;
        Ok(())
    }
}

/// Resolve a YAML configuration and select the enabled projects.
pub fn projects(yaml: &str) -> Vec<ProjectConfig> {
    let document: ConfigDocument = serde_yaml::from_str(yaml).unwrap();
    let resolved = resolve(&document, &ConfigOverrides::default()).unwrap();
    ProjectFilter::parse(&[]).unwrap().select(&resolved)
}

pub fn catch_all_project() -> Vec<ProjectConfig> {
    projects("Project:\n  - Name: conversion\n")
}

pub struct PipelineRun {
    pub writer: RecordingWriter,
    pub counters: Counters,
}

pub fn run_pipeline(projects: &[ProjectConfig], changesets: Vec<Changeset>) -> PipelineRun {
    run_pipeline_with(projects, changesets, false, None, LogFlags::default())
}

pub fn run_pipeline_with(
    projects: &[ProjectConfig],
    changesets: Vec<Changeset>,
    decorate_revision_id: bool,
    end_revision: Option<u64>,
    flags: LogFlags,
) -> PipelineRun {
    let mut writer = RecordingWriter::default();
    let mut log = ConversionLog::new(Box::new(std::io::sink()), flags);
    let mut pipeline = Pipeline::new(
        projects,
        &mut writer,
        &mut log,
        CommitBuilder::new(decorate_revision_id),
        end_revision,
    );

    let counters = pipeline
        .run(&mut MemorySource::new(changesets), &mut |_| {})
        .expect("pipeline run failed");

    PipelineRun { writer, counters }
}
