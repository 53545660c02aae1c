use crate::domain::areas::log::ConversionLog;
use crate::domain::areas::refs::{AllocatedRef, Allocation, RefAllocator, RefKind};
use crate::domain::areas::repository::{CommitSpec, GitWriter};
use crate::domain::areas::source::ChangesetSource;
use crate::domain::config::project::ProjectConfig;
use crate::domain::objects::changeset::Changeset;
use crate::domain::objects::commit::CommitBuilder;
use crate::domain::objects::hgtags;
use anyhow::Context;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Totals reported on completion and polled by the progress reporter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub revisions: u64,
    pub commits: u64,
    pub branches: u64,
    pub tags: u64,
}

#[derive(Debug, Clone)]
struct BranchHead {
    allocated: AllocatedRef,
    last_rev: u64,
    last_commit: Option<String>,
}

/// Drives the conversion: consumes changesets in topological order, routes
/// them to projects, allocates refs, builds commits and pushes everything to
/// the Git writer. Strictly sequential: a changeset's commit id depends on
/// its parents' ids.
pub struct Pipeline<'a> {
    projects: &'a [ProjectConfig],
    writer: &'a mut dyn GitWriter,
    log: &'a mut ConversionLog,
    builder: CommitBuilder,
    end_revision: Option<u64>,
    allocator: RefAllocator,
    /// HG changeset id -> Git commit id; `None` for suppressed changesets
    /// with no converted ancestor.
    commit_map: HashMap<String, Option<String>>,
    heads: HashMap<(usize, String), BranchHead>,
    tag_state: BTreeMap<String, String>,
    tag_refs: HashMap<String, String>,
    warned_branches: HashSet<(usize, String)>,
    counters: Counters,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        projects: &'a [ProjectConfig],
        writer: &'a mut dyn GitWriter,
        log: &'a mut ConversionLog,
        builder: CommitBuilder,
        end_revision: Option<u64>,
    ) -> Self {
        Pipeline {
            projects,
            writer,
            log,
            builder,
            end_revision,
            allocator: RefAllocator::default(),
            commit_map: HashMap::new(),
            heads: HashMap::new(),
            tag_state: BTreeMap::new(),
            tag_refs: HashMap::new(),
            warned_branches: HashSet::new(),
            counters: Counters::default(),
        }
    }

    pub fn run(
        &mut self,
        source: &mut dyn ChangesetSource,
        on_progress: &mut dyn FnMut(Counters),
    ) -> anyhow::Result<Counters> {
        while let Some(changeset) = source.next_changeset()? {
            self.counters.revisions += 1;
            self.process(&changeset).with_context(|| {
                format!("while converting revision {} ({})", changeset.rev, changeset.id)
            })?;
            on_progress(self.counters);

            if self.end_revision == Some(changeset.rev) {
                self.log
                    .note(&format!("Stopped at --end-revision {}", changeset.rev))?;
                break;
            }
        }

        self.finalize()?;
        Ok(self.counters)
    }

    fn process(&mut self, changeset: &Changeset) -> anyhow::Result<()> {
        self.log.dump_changeset(changeset)?;

        let Some(project) = self
            .projects
            .iter()
            .position(|project| project.owns_branch(&changeset.branch))
        else {
            self.log
                .skipped(changeset, &format!("branch \"{}\" owned by no project", changeset.branch))?;
            self.inherit_parent_mapping(changeset);
            return Ok(());
        };

        self.convert_changeset(project, changeset)?;

        // The .hgtags edit is authoritative at the changeset carrying it.
        // Tag refs resolve through the owning project, so they still apply
        // when the branch itself maps to no Git ref or the commit was
        // suppressed.
        if let Some(contents) = &changeset.hgtags {
            self.apply_hgtags(project, contents)?;
        }

        Ok(())
    }

    fn convert_changeset(&mut self, project: usize, changeset: &Changeset) -> anyhow::Result<()> {
        let allocation = self
            .allocator
            .allocate(&self.projects[project], RefKind::Branch, &changeset.branch)?;
        let allocated = match allocation {
            Allocation::Mapped(allocated) => allocated,
            Allocation::Blocked { globspec } => {
                self.warn_branch_once(project, changeset, &format!(
                    "branch \"{}\" blocked from a ref by globspec \"{globspec}\" in project \"{}\"",
                    changeset.branch, self.projects[project].name
                ))?;
                self.inherit_parent_mapping(changeset);
                return Ok(());
            }
            Allocation::Unmapped => {
                self.warn_branch_once(project, changeset, &format!(
                    "branch \"{}\" not mapped to any ref in project \"{}\"",
                    changeset.branch, self.projects[project].name
                ))?;
                self.inherit_parent_mapping(changeset);
                return Ok(());
            }
        };

        // Resolve parents through the commit map, dropping the ones whose
        // changesets were skipped. A merge degraded to one usable parent
        // becomes a normal commit.
        let mut parents: Vec<String> = Vec::new();
        for parent in &changeset.parents {
            let Some(mapped) = self.commit_map.get(parent) else {
                anyhow::bail!("parent {parent} has not been converted yet");
            };
            if let Some(commit) = mapped {
                if !parents.contains(commit) {
                    parents.push(commit.clone());
                }
            }
        }

        // A changeset with neither file operations nor a message is noise
        // unless it merges two histories; --verbose=dump_all keeps them all.
        let flags = self.log.flags();
        if changeset.files.is_empty()
            && changeset.message.is_empty()
            && parents.len() < 2
            && !flags.dump_all
        {
            self.inherit_parent_mapping(changeset);
            self.touch_head(project, changeset, &allocated);
            return Ok(());
        }

        let meta = self.builder.build(changeset)?;
        let commit = self
            .writer
            .write_commit(&CommitSpec {
                parents: &parents,
                changes: &changeset.files,
                author: &meta.author,
                timestamp: meta.timestamp,
                message: &meta.message,
            })
            .context("the Git writer refused the commit")?;

        self.commit_map
            .insert(changeset.id.clone(), Some(commit.clone()));
        self.counters.commits += 1;
        self.log
            .commit(&commit, &allocated.refname, &changeset.branch, changeset.rev)?;
        self.log.revision(changeset, &allocated.refname)?;

        // Count a branch when its ref is first written, not when an empty
        // changeset merely touches the head state.
        let key = (project, changeset.branch.clone());
        let newly_written = match self.heads.get(&key) {
            None => true,
            Some(head) => head.last_commit.is_none(),
        };
        if newly_written {
            self.counters.branches += 1;
        }
        self.heads.insert(
            key,
            BranchHead {
                allocated: allocated.clone(),
                last_rev: changeset.rev,
                last_commit: Some(commit.clone()),
            },
        );

        self.writer
            .update_ref(&allocated.refname, &commit)
            .context("the Git writer refused the branch ref update")?;

        let revision_ref =
            self.allocator
                .revision_ref(&self.projects[project], &allocated, changeset.rev)?;
        self.writer
            .update_ref(&revision_ref, &commit)
            .context("the Git writer refused the revision ref update")?;

        Ok(())
    }

    fn apply_hgtags(&mut self, project: usize, contents: &str) -> anyhow::Result<()> {
        let new_state = hgtags::parse(contents).context("corrupt .hgtags")?;
        let changes = hgtags::diff(&self.tag_state, &new_state);

        for (tag, node) in changes.added {
            match self.commit_map.get(&node).cloned() {
                Some(Some(commit)) => {
                    self.apply_tag(project, &tag, &commit)?;
                }
                Some(None) => {
                    self.log.warning(&format!(
                        "tag \"{tag}\" references skipped revision {node}"
                    ))?;
                }
                None => {
                    self.log.warning(&format!(
                        "tag \"{tag}\" references unknown revision {node}"
                    ))?;
                }
            }
        }

        for tag in changes.removed {
            if let Some(refname) = self.tag_refs.get(&tag) {
                self.writer
                    .delete_ref(refname)
                    .context("the Git writer refused the tag ref deletion")?;
                self.log.note(&format!("Removed tag ref {refname}"))?;
            }
        }

        self.tag_state = new_state;
        Ok(())
    }

    fn apply_tag(&mut self, project: usize, tag: &str, commit: &str) -> anyhow::Result<()> {
        match self
            .allocator
            .allocate(&self.projects[project], RefKind::Tag, tag)?
        {
            Allocation::Mapped(allocated) => {
                self.writer
                    .update_ref(&allocated.refname, commit)
                    .context("the Git writer refused the tag ref update")?;
                if self
                    .tag_refs
                    .insert(tag.to_string(), allocated.refname)
                    .is_none()
                {
                    self.counters.tags += 1;
                }
            }
            Allocation::Blocked { .. } => {
                self.log
                    .warning(&format!("tag \"{tag}\" explicitly not mapped to a ref"))?;
            }
            Allocation::Unmapped => {
                self.log
                    .warning(&format!("tag \"{tag}\" not mapped to any ref"))?;
            }
        }
        Ok(())
    }

    /// Keep the parent chain consistent for descendants of a changeset that
    /// produced no commit: they inherit the nearest converted ancestor.
    fn inherit_parent_mapping(&mut self, changeset: &Changeset) {
        let inherited = changeset
            .parents
            .first()
            .and_then(|parent| self.commit_map.get(parent).cloned())
            .flatten();
        self.commit_map.insert(changeset.id.clone(), inherited);
    }

    fn touch_head(&mut self, project: usize, changeset: &Changeset, allocated: &AllocatedRef) {
        let key = (project, changeset.branch.clone());
        let inherited = self.commit_map.get(&changeset.id).cloned().flatten();
        let head = self.heads.entry(key).or_insert_with(|| BranchHead {
            allocated: allocated.clone(),
            last_rev: changeset.rev,
            last_commit: None,
        });
        head.last_rev = changeset.rev;
        if inherited.is_some() {
            head.last_commit = inherited;
        }
    }

    fn warn_branch_once(
        &mut self,
        project: usize,
        changeset: &Changeset,
        message: &str,
    ) -> anyhow::Result<()> {
        if self
            .warned_branches
            .insert((project, changeset.branch.clone()))
        {
            self.log.warning(message)?;
        }
        self.log.skipped(changeset, message)
    }

    /// Re-confirm every branch head ref and release the writer.
    fn finalize(&mut self) -> anyhow::Result<()> {
        let mut heads: Vec<&BranchHead> = self.heads.values().collect();
        heads.sort_by(|a, b| a.allocated.refname.cmp(&b.allocated.refname));

        for head in heads {
            if let Some(commit) = &head.last_commit {
                self.writer
                    .update_ref(&head.allocated.refname, commit)
                    .context("the Git writer refused the final ref update")?;
            }
        }

        self.writer.flush()?;
        self.log.flush()
    }
}
