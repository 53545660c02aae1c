use crate::domain::config::project::{ProjectConfig, RefMapping, ReplaceRule};
use crate::domain::config::vars::SubstContext;
use anyhow::Context;
use std::collections::HashMap;

const INVALID_REFNAME_REGEX: &str =
    r"^\.|/\.|\.\.|^/|/$|//|\.$|\.lock$|\.lock/|@\{|[\x00-\x20*:?\[\\~^\x7f]";

pub fn is_valid_refname(name: &str) -> anyhow::Result<bool> {
    if name.is_empty() {
        return Ok(false);
    }

    let re = regex::Regex::new(INVALID_REFNAME_REGEX)
        .with_context(|| format!("invalid refname regex: {INVALID_REFNAME_REGEX}"))?;

    // The regex matches INVALID patterns, so return true if it does NOT match
    Ok(!re.is_match(name))
}

/// Apply the project's Replace rules in inherited order, force the `refs/`
/// prefix, and reject anything Git would still refuse.
pub fn sanitize_refname(raw: &str, rules: &[ReplaceRule]) -> anyhow::Result<String> {
    let mut name = raw.to_string();
    for rule in rules {
        name = name.replace(&rule.chars, &rule.with);
    }

    if !name.starts_with("refs/") {
        name = format!("refs/{name}");
    }

    if !is_valid_refname(&name)? {
        anyhow::bail!(
            "\"{name}\" (mapped from \"{raw}\") is not a valid Git refname; \
             add a Replace rule to cover it"
        );
    }

    Ok(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    Branch,
    Tag,
}

/// A claimed, collision-free Git refname for one (project, source name).
#[derive(Debug, Clone)]
pub struct AllocatedRef {
    pub refname: String,
    revision_ref_template: Option<String>,
    captures: Vec<String>,
}

/// Outcome of a ref allocation.
#[derive(Debug, Clone)]
pub enum Allocation {
    Mapped(AllocatedRef),
    /// A map rule matched but declares no Refname.
    Blocked { globspec: String },
    /// No map rule matched.
    Unmapped,
}

/// Maps (project, source name) pairs to unique Git refnames. Collisions pick
/// up a `__<N>` suffix; once allocated, a name is stable for the whole run.
#[derive(Debug, Default)]
pub struct RefAllocator {
    claimed: HashMap<String, (String, String)>,
    assigned: HashMap<(String, RefKind, String), Allocation>,
}

impl RefAllocator {
    pub fn allocate(
        &mut self,
        project: &ProjectConfig,
        kind: RefKind,
        name: &str,
    ) -> anyhow::Result<Allocation> {
        let key = (project.name.clone(), kind, name.to_string());
        if let Some(existing) = self.assigned.get(&key) {
            return Ok(existing.clone());
        }

        let mapping = match kind {
            RefKind::Branch => project.map_branch(name)?,
            RefKind::Tag => project.map_tag(name)?,
        };

        let allocation = match mapping {
            RefMapping::Unmapped => Allocation::Unmapped,
            RefMapping::Blocked { globspec } => Allocation::Blocked { globspec },
            RefMapping::Mapped(mapped) => {
                let sanitized = sanitize_refname(&mapped.refname, &project.replace)?;
                let refname = self.claim(sanitized, &project.name, name);
                Allocation::Mapped(AllocatedRef {
                    refname,
                    revision_ref_template: mapped.revision_ref,
                    captures: mapped.captures,
                })
            }
        };

        self.assigned.insert(key, allocation.clone());
        Ok(allocation)
    }

    fn claim(&mut self, refname: String, project: &str, source: &str) -> String {
        let owner = (project.to_string(), source.to_string());
        if !self.claimed.contains_key(&refname) {
            self.claimed.insert(refname.clone(), owner);
            return refname;
        }

        let mut suffix = 1;
        loop {
            let candidate = format!("{refname}__{suffix}");
            if !self.claimed.contains_key(&candidate) {
                self.claimed.insert(candidate.clone(), owner);
                return candidate;
            }
            suffix += 1;
        }
    }

    /// The per-revision auxiliary ref for a commit on this branch. Without an
    /// explicit RevisionRef template the ref lands under `refs/revisions/`,
    /// keyed by the branch part of the allocated refname.
    pub fn revision_ref(
        &self,
        project: &ProjectConfig,
        allocated: &AllocatedRef,
        rev: u64,
    ) -> anyhow::Result<String> {
        let rev_text = rev.to_string();
        let raw = match &allocated.revision_ref_template {
            Some(template) => project
                .env
                .substitute_with(
                    template,
                    &allocated.captures,
                    SubstContext::Refname,
                    &[("rev", &rev_text)],
                )
                .with_context(|| format!("in RevisionRef template \"{template}\""))?,
            None => {
                let branches = project.env.get("Branches").unwrap_or("refs/heads/");
                let branch = allocated
                    .refname
                    .strip_prefix(branches)
                    .or_else(|| allocated.refname.strip_prefix("refs/"))
                    .unwrap_or(&allocated.refname);
                format!("refs/revisions/{branch}/r{rev}")
            }
        };

        sanitize_refname(&raw, &project.replace)
    }
}
