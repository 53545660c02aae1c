use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use hg2git::commands::convert::{self, ConvertOptions};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "hg2git",
    version,
    about = "Convert a Mercurial repository to a Git repository",
    long_about = "Reads a Mercurial repository end-to-end and emits an equivalent \
    Git history into a target Git repository, driven by pattern-based \
    branch and tag mapping rules."
)]
struct Cli {
    #[arg(index = 1, value_name = "REPOSITORY", help = "Mercurial repository root directory")]
    repository: PathBuf,

    #[arg(short, long, value_name = "FILE", help = "YAML file to configure conversion to Git")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Logfile destination; defaults to stdout")]
    log: Option<PathBuf>,

    #[arg(
        short = 'e',
        long,
        value_name = "REV",
        help = "Revision to stop the input processing after"
    )]
    end_revision: Option<u64>,

    #[arg(short, long, help = "Suppress progress indication")]
    quiet: bool,

    #[arg(
        long,
        value_name = "SECONDS",
        num_args = 0..=1,
        default_missing_value = "1",
        help = "Force progress indication and optionally set the update period in seconds"
    )]
    progress: Option<f64>,

    #[arg(long, value_name = "NAMESPACE", help = "Namespace for branches, default 'refs/heads/'")]
    branches: Option<String>,

    #[arg(long, value_name = "NAMESPACE", help = "Namespace for tags, default 'refs/tags/'")]
    tags: Option<String>,

    #[arg(
        long,
        help = "Don't use the default mappings (refs/heads/*, refs/tags/*); \
        the mappings need to be provided in a config file instead"
    )]
    no_default_config: bool,

    #[arg(
        short = 'v',
        long,
        value_name = "WHAT",
        action = clap::ArgAction::Append,
        num_args = 0..=1,
        default_missing_value = "dump,commits",
        help = "Log verbosity: dump, revs, commits, all, dump_all (repeatable)"
    )]
    verbose: Vec<String>,

    #[arg(
        long,
        value_name = "FILTER",
        action = clap::ArgAction::Append,
        help = "Process only selected projects; comma-separable globspecs, '!' excludes"
    )]
    project: Vec<String>,

    #[arg(long, value_name = "PATH", help = "Target Git repository to write the conversion result")]
    target_repository: Option<PathBuf>,

    #[arg(
        long,
        value_name = "TAGLINE",
        action = clap::ArgAction::Append,
        value_parser = ["revision-id"],
        help = "Add taglines to the commit message"
    )]
    decorate_commit_message: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let options = ConvertOptions {
        repository: cli.repository,
        config: cli.config,
        log_file: cli.log,
        end_revision: cli.end_revision,
        quiet: cli.quiet,
        progress: cli.progress,
        branches: cli.branches,
        tags: cli.tags,
        use_default_config: !cli.no_default_config,
        verbose: cli.verbose,
        projects: cli.project,
        target_repository: cli.target_repository,
        decorate_revision_id: cli
            .decorate_commit_message
            .iter()
            .any(|tagline| tagline == "revision-id"),
    };

    if let Err(error) = convert::run(&options) {
        eprintln!("{} {error:#}", "ERROR:".red().bold());
        std::process::exit(1);
    }

    Ok(())
}
