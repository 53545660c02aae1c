use crate::domain::config::schema::{
    ConfigDocument, MapBranchDocument, MapTagDocument, ProjectDocument, ReplaceDocument,
    SectionDocument,
};
use crate::domain::config::vars::{SubstContext, VarEnv, PRESET_VARS};
use crate::domain::patterns::{Pattern, PatternSequence};
use anyhow::{bail, Context};
use derive_new::new;
use std::collections::HashSet;

/// Replacement rules applied to every refname before the hardcoded and
/// configured tiers the user declares. Git forbids spaces in refnames, and
/// Mercurial branch names carry them routinely.
const HARDCODED_REPLACE: &[(&str, &str)] = &[(" ", "_")];

/// The always-present last-resort mappings: every branch lands under
/// `$Branches/`, every tag under `$Tags/`.
const HARDCODED_MAP_BRANCH: (&str, &str) = ("**", "$Branches/$1");
const HARDCODED_MAP_TAG: (&str, &str) = ("**", "$Tags/$1");

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct ReplaceRule {
    pub chars: String,
    pub with: String,
}

#[derive(Debug, Clone)]
pub struct MapRule {
    pub globspec: String,
    pub pattern: Pattern,
    pub refname: Option<String>,
    pub revision_ref: Option<String>,
}

/// CLI-provided overrides applied during resolution.
#[derive(Debug, Clone)]
pub struct ConfigOverrides {
    pub branches_namespace: Option<String>,
    pub tags_namespace: Option<String>,
    pub use_default_config: bool,
}

impl Default for ConfigOverrides {
    fn default() -> Self {
        ConfigOverrides {
            branches_namespace: None,
            tags_namespace: None,
            use_default_config: true,
        }
    }
}

/// A fully resolved project: flattened variables, ordered Replace rules and
/// map rules, compiled branch filter.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub name: String,
    pub branch_filter: PatternSequence,
    pub explicit_only: bool,
    pub needs_projects: Vec<String>,
    pub env: VarEnv,
    pub replace: Vec<ReplaceRule>,
    pub map_branches: Vec<MapRule>,
    pub map_tags: Vec<MapRule>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub projects: Vec<ProjectConfig>,
}

/// Outcome of looking a source name up in a project's map rules.
#[derive(Debug, Clone)]
pub enum RefMapping {
    Mapped(MappedRef),
    /// A rule matched but carries no Refname: the name is explicitly
    /// unmapped and must not produce a ref.
    Blocked { globspec: String },
    /// No rule matched at all.
    Unmapped,
}

#[derive(Debug, Clone)]
pub struct MappedRef {
    /// Substituted but not yet sanitized refname.
    pub refname: String,
    pub revision_ref: Option<String>,
    pub captures: Vec<String>,
    pub globspec: String,
}

pub fn resolve(
    document: &ConfigDocument,
    overrides: &ConfigOverrides,
) -> anyhow::Result<ResolvedConfig> {
    let mut seen = HashSet::new();
    for project in &document.projects {
        if !seen.insert(project.name.as_str()) {
            bail!("duplicate project name \"{}\"", project.name);
        }
    }

    // Without any Project section the whole repository converts through one
    // implicit catch-all project.
    let implicit = vec![ProjectDocument::default()];
    let documents = if document.projects.is_empty() {
        &implicit
    } else {
        &document.projects
    };

    let mut projects = Vec::with_capacity(documents.len());
    for project in documents {
        projects.push(
            resolve_project(project, document.default.as_ref(), overrides)
                .with_context(|| format!("in project \"{}\"", project.name))?,
        );
    }

    for project in &projects {
        for needed in &project.needs_projects {
            if !projects.iter().any(|other| &other.name == needed) {
                bail!(
                    "project \"{}\" needs unknown project \"{needed}\"",
                    project.name
                );
            }
        }
    }

    Ok(ResolvedConfig { projects })
}

fn resolve_project(
    project: &ProjectDocument,
    default: Option<&SectionDocument>,
    overrides: &ConfigOverrides,
) -> anyhow::Result<ProjectConfig> {
    let inherit_default = project.inherit_default.0;
    let inherit_mappings = project.inherit_default_mappings.0;

    // The namespace seeds are always present, even with InheritDefault="No".
    let mut env = VarEnv::default();
    for (name, value) in PRESET_VARS.entries() {
        env.define(name, value);
    }
    if let Some(namespace) = &overrides.branches_namespace {
        env.define("Branches", namespace);
    }
    if let Some(namespace) = &overrides.tags_namespace {
        env.define("Tags", namespace);
    }

    if inherit_default {
        if let Some(default) = default {
            for (name, value) in &default.vars {
                env.define(name, value);
            }
        }
    }
    for (name, value) in &project.vars {
        env.define(name, value);
    }
    env.check_resolvable()?;

    // Replace rules apply hardcoded first, then Default, then Project.
    let mut replace: Vec<ReplaceRule> = HARDCODED_REPLACE
        .iter()
        .map(|(chars, with)| ReplaceRule::new((*chars).to_string(), (*with).to_string()))
        .collect();
    if inherit_default {
        if let Some(default) = default {
            replace.extend(default.replace.iter().map(replace_rule));
        }
    }
    replace.extend(project.replace.iter().map(replace_rule));

    // Map rules merge the other way around: the project's own rules come
    // first, Default's follow, the hardcoded catch-alls come last.
    let mut map_branches = Vec::new();
    let mut map_tags = Vec::new();
    for rule in &project.map_branch {
        map_branches.push(branch_rule(rule, &env)?);
    }
    for rule in &project.map_tag {
        map_tags.push(tag_rule(rule, &env)?);
    }
    if inherit_mappings {
        if let Some(default) = default {
            for rule in &default.map_branch {
                map_branches.push(branch_rule(rule, &env)?);
            }
            for rule in &default.map_tag {
                map_tags.push(tag_rule(rule, &env)?);
            }
        }
        if overrides.use_default_config {
            map_branches.push(compile_rule(
                HARDCODED_MAP_BRANCH.0,
                Some(HARDCODED_MAP_BRANCH.1),
                None,
                &env,
            )?);
            map_tags.push(compile_rule(
                HARDCODED_MAP_TAG.0,
                Some(HARDCODED_MAP_TAG.1),
                None,
                &env,
            )?);
        }
    }

    let branch_filter = compile_sequence(&project.branch, &env)
        .with_context(|| format!("invalid Branch filter \"{}\"", project.branch))?;

    let needs_projects = project
        .needs_projects
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    Ok(ProjectConfig {
        name: project.name.clone(),
        branch_filter,
        explicit_only: project.explicit_only.0,
        needs_projects,
        env,
        replace,
        map_branches,
        map_tags,
    })
}

fn replace_rule(document: &ReplaceDocument) -> ReplaceRule {
    ReplaceRule::new(document.chars.clone(), document.with.clone())
}

fn branch_rule(document: &MapBranchDocument, env: &VarEnv) -> anyhow::Result<MapRule> {
    compile_rule(
        &document.branch,
        document.refname.as_deref(),
        document.revision_ref.as_deref(),
        env,
    )
}

fn tag_rule(document: &MapTagDocument, env: &VarEnv) -> anyhow::Result<MapRule> {
    compile_rule(&document.tag, document.refname.as_deref(), None, env)
}

fn compile_rule(
    globspec: &str,
    refname: Option<&str>,
    revision_ref: Option<&str>,
    env: &VarEnv,
) -> anyhow::Result<MapRule> {
    let expanded = env.substitute(globspec, &[], SubstContext::Pattern)?;
    let pattern = Pattern::compile(&expanded)
        .with_context(|| format!("invalid map pattern \"{globspec}\""))?;

    Ok(MapRule {
        globspec: globspec.to_string(),
        pattern,
        refname: refname.map(str::to_string),
        revision_ref: revision_ref.map(str::to_string),
    })
}

/// Expand variables in each sequence entry, then compile the whole filter.
fn compile_sequence(source: &str, env: &VarEnv) -> anyhow::Result<PatternSequence> {
    let expanded = source
        .split(';')
        .map(|entry| {
            let entry = entry.trim();
            match entry.strip_prefix('!') {
                Some(body) => Ok(format!(
                    "!{}",
                    env.substitute(body, &[], SubstContext::Pattern)?
                )),
                None => env.substitute(entry, &[], SubstContext::Pattern),
            }
        })
        .collect::<anyhow::Result<Vec<String>>>()?;

    PatternSequence::compile(&expanded.join(";"))
}

impl ProjectConfig {
    pub fn owns_branch(&self, branch: &str) -> bool {
        self.branch_filter.is_match(branch)
    }

    pub fn map_branch(&self, name: &str) -> anyhow::Result<RefMapping> {
        Self::map_name(&self.map_branches, name, &self.env)
    }

    pub fn map_tag(&self, name: &str) -> anyhow::Result<RefMapping> {
        Self::map_name(&self.map_tags, name, &self.env)
    }

    fn map_name(rules: &[MapRule], name: &str, env: &VarEnv) -> anyhow::Result<RefMapping> {
        for rule in rules {
            let Some(captures) = rule.pattern.matches(name) else {
                continue;
            };

            return match &rule.refname {
                None => Ok(RefMapping::Blocked {
                    globspec: rule.globspec.clone(),
                }),
                Some(template) => {
                    let refname = env
                        .substitute(template, &captures, SubstContext::Refname)
                        .with_context(|| {
                            format!("in Refname template \"{template}\" for \"{name}\"")
                        })?;
                    Ok(RefMapping::Mapped(MappedRef {
                        refname,
                        revision_ref: rule.revision_ref.clone(),
                        captures,
                        globspec: rule.globspec.clone(),
                    }))
                }
            };
        }

        Ok(RefMapping::Unmapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve_str(yaml: &str, overrides: &ConfigOverrides) -> ResolvedConfig {
        let document: ConfigDocument = serde_yaml::from_str(yaml).unwrap();
        resolve(&document, overrides).unwrap()
    }

    fn mapped(mapping: RefMapping) -> MappedRef {
        match mapping {
            RefMapping::Mapped(mapped) => mapped,
            other => panic!("expected a mapped ref, got {other:?}"),
        }
    }

    #[test]
    fn empty_document_yields_catch_all_project() {
        let config = resolve_str("{}", &ConfigOverrides::default());
        assert_eq!(config.projects.len(), 1);

        let project = &config.projects[0];
        assert_eq!(project.name, "*");
        assert!(project.owns_branch("default"));

        let result = mapped(project.map_branch("feature/a").unwrap());
        assert_eq!(result.refname, "refs/heads/feature/a");
    }

    #[test]
    fn cli_namespaces_override_the_presets() {
        let overrides = ConfigOverrides {
            branches_namespace: Some("refs/imported/heads/".to_string()),
            ..ConfigOverrides::default()
        };
        let config = resolve_str("{}", &overrides);

        let result = mapped(config.projects[0].map_branch("default").unwrap());
        assert_eq!(result.refname, "refs/imported/heads/default");
    }

    #[test]
    fn no_default_config_drops_the_hardcoded_mappings() {
        let overrides = ConfigOverrides {
            use_default_config: false,
            ..ConfigOverrides::default()
        };
        let config = resolve_str("{}", &overrides);

        assert!(matches!(
            config.projects[0].map_branch("default").unwrap(),
            RefMapping::Unmapped
        ));
    }

    #[test]
    fn project_rules_precede_default_and_hardcoded_rules() {
        let config = resolve_str(
            r#"
            Default:
              MapBranch:
                - Branch: "releases/*"
                  Refname: "$Branches/default-won/$1"
            Project:
              - Name: core
                MapBranch:
                  - Branch: "releases/*"
                    Refname: "$Branches/release-$1"
            "#,
            &ConfigOverrides::default(),
        );

        let project = &config.projects[0];
        let result = mapped(project.map_branch("releases/2.0").unwrap());
        assert_eq!(result.refname, "refs/heads/release-2.0");

        // Anything else still falls through to the hardcoded catch-all.
        let result = mapped(project.map_branch("feature/a").unwrap());
        assert_eq!(result.refname, "refs/heads/feature/a");
    }

    #[test]
    fn inherit_default_mappings_no_suppresses_both_tiers() {
        let config = resolve_str(
            r#"
            Default:
              MapBranch:
                - Branch: "**"
                  Refname: "$Branches/from-default/$1"
            Project:
              - Name: core
                InheritDefaultMappings: "No"
                MapBranch:
                  - Branch: "main"
                    Refname: "$Branches/main"
            "#,
            &ConfigOverrides::default(),
        );

        let project = &config.projects[0];
        assert!(matches!(
            project.map_branch("main").unwrap(),
            RefMapping::Mapped(_)
        ));
        assert!(matches!(
            project.map_branch("other").unwrap(),
            RefMapping::Unmapped
        ));
    }

    #[test]
    fn inherit_default_no_keeps_the_namespace_seeds() {
        let config = resolve_str(
            r#"
            Default:
              Vars:
                Team: platform
            Project:
              - Name: core
                InheritDefault: "No"
            "#,
            &ConfigOverrides::default(),
        );

        let project = &config.projects[0];
        assert_eq!(project.env.get("Branches"), Some("refs/heads/"));
        assert_eq!(project.env.get("Team"), None);
    }

    #[test]
    fn absent_refname_blocks_the_branch() {
        let config = resolve_str(
            r#"
            Project:
              - Name: core
                MapBranch:
                  - Branch: "wip/**"
            "#,
            &ConfigOverrides::default(),
        );

        assert!(matches!(
            config.projects[0].map_branch("wip/spike").unwrap(),
            RefMapping::Blocked { .. }
        ));
    }

    #[test]
    fn refname_templates_substitute_captures() {
        let config = resolve_str(
            r#"
            Project:
              - Name: core
                MapBranch:
                  - Branch: "releases/{1.0,2.0}/hotfix-*"
                    Refname: "$Branches/rel-$1/$2"
            "#,
            &ConfigOverrides::default(),
        );

        let result = mapped(
            config.projects[0]
                .map_branch("releases/2.0/hotfix-abc")
                .unwrap(),
        );
        assert_eq!(result.refname, "refs/heads/rel-2.0/hotfix-abc");
        assert_eq!(result.captures, vec!["2.0", "abc"]);
    }

    #[test]
    fn variable_lists_expand_to_alternation_in_map_patterns() {
        let config = resolve_str(
            r#"
            Project:
              - Name: core
                Vars:
                  Stable: "main;release"
                MapBranch:
                  - Branch: "$Stable"
                    Refname: "$Branches/stable/$1"
            "#,
            &ConfigOverrides::default(),
        );

        let project = &config.projects[0];
        let result = mapped(project.map_branch("release").unwrap());
        assert_eq!(result.refname, "refs/heads/stable/release");
    }

    #[test]
    fn duplicate_project_names_are_rejected() {
        let document: ConfigDocument =
            serde_yaml::from_str("Project:\n  - Name: x\n  - Name: x\n").unwrap();
        let err = resolve(&document, &ConfigOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("duplicate project name"));
    }

    #[test]
    fn unknown_needed_projects_are_rejected() {
        let document: ConfigDocument =
            serde_yaml::from_str("Project:\n  - Name: x\n    NeedsProjects: \"ghost\"\n").unwrap();
        let err = resolve(&document, &ConfigOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn variable_cycles_fail_resolution() {
        let document: ConfigDocument = serde_yaml::from_str(
            "Project:\n  - Name: x\n    Vars:\n      A: \"$B\"\n      B: \"$A\"\n",
        )
        .unwrap();
        let err = resolve(&document, &ConfigOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn branch_filters_honor_negation() {
        let config = resolve_str(
            r#"
            Project:
              - Name: core
                Branch: "releases/**;!releases/frozen"
            "#,
            &ConfigOverrides::default(),
        );

        let project = &config.projects[0];
        assert!(project.owns_branch("releases/2.0"));
        assert!(!project.owns_branch("releases/frozen"));
        assert!(!project.owns_branch("misc"));
    }
}
