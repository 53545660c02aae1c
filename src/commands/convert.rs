//! The conversion command: wires the Mercurial reader, the resolved
//! configuration and the Git writer into one pipeline run.

use crate::domain::areas::log::{ConversionLog, LogFlags};
use crate::domain::areas::pipeline::{Counters, Pipeline};
use crate::domain::areas::repository::{GitCommandRepository, GitWriter, NullWriter};
use crate::domain::areas::source::{ChangesetSource, HgCommandReader};
use crate::domain::config::project::{resolve, ConfigOverrides, ProjectConfig};
use crate::domain::config::schema::ConfigDocument;
use crate::domain::config::selector::ProjectFilter;
use crate::domain::objects::commit::CommitBuilder;
use anyhow::{bail, Context};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    pub repository: PathBuf,
    pub config: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub end_revision: Option<u64>,
    pub quiet: bool,
    /// Progress update period in seconds; `None` keeps the default.
    pub progress: Option<f64>,
    pub branches: Option<String>,
    pub tags: Option<String>,
    pub use_default_config: bool,
    pub verbose: Vec<String>,
    pub projects: Vec<String>,
    pub target_repository: Option<PathBuf>,
    pub decorate_revision_id: bool,
}

pub fn run(options: &ConvertOptions) -> anyhow::Result<Counters> {
    let flags = LogFlags::from_verbose(&options.verbose)?;
    let sink: Box<dyn Write> = match &options.log_file {
        Some(path) => Box::new(std::io::BufWriter::new(
            std::fs::File::create(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout()),
    };
    let mut log = ConversionLog::new(sink, flags);

    let document = match &options.config {
        Some(path) => ConfigDocument::load(path)?,
        None => ConfigDocument::default(),
    };
    let overrides = ConfigOverrides {
        branches_namespace: options.branches.clone(),
        tags_namespace: options.tags.clone(),
        use_default_config: options.use_default_config,
    };
    let resolved = resolve(&document, &overrides)?;

    let filter = ProjectFilter::parse(&options.projects)?;
    let projects = filter.select(&resolved);
    if projects.is_empty() {
        bail!("no projects selected; check the --project filters");
    }

    let mut source = HgCommandReader::open(&options.repository)?;

    let counters = match &options.target_repository {
        Some(path) => {
            let mut writer = GitCommandRepository::open(path)?;
            run_pipeline(options, &projects, &mut source, &mut writer, &mut log)?
        }
        None => {
            log.note("No --target-repository given: dry run, nothing will be written")?;
            let mut writer = NullWriter::default();
            run_pipeline(options, &projects, &mut source, &mut writer, &mut log)?
        }
    };

    Ok(counters)
}

fn run_pipeline(
    options: &ConvertOptions,
    projects: &[ProjectConfig],
    source: &mut dyn ChangesetSource,
    writer: &mut dyn GitWriter,
    log: &mut ConversionLog,
) -> anyhow::Result<Counters> {
    let progress = make_progress(options)?;
    let builder = CommitBuilder::new(options.decorate_revision_id);
    let started = Instant::now();

    let mut pipeline = Pipeline::new(projects, writer, log, builder, options.end_revision);
    let counters = pipeline.run(source, &mut |counters: Counters| {
        progress.set_message(format!(
            "Processing revision {}, total {} commits",
            counters.revisions, counters.commits
        ));
    })?;

    progress.finish_and_clear();

    if !options.quiet {
        eprintln!(
            "{}",
            format!(
                "Processed {} revisions, made {} commits, written {} branches and {} tags in {:.1?}",
                counters.revisions,
                counters.commits,
                counters.branches,
                counters.tags,
                started.elapsed()
            )
            .green()
        );
    }

    Ok(counters)
}

fn make_progress(options: &ConvertOptions) -> anyhow::Result<ProgressBar> {
    if options.quiet {
        return Ok(ProgressBar::hidden());
    }

    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}").context("invalid progress template")?,
    );
    let period = options.progress.unwrap_or(1.0).max(0.05);
    bar.enable_steady_tick(Duration::from_secs_f64(period));
    Ok(bar)
}
