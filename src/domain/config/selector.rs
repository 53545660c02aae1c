use crate::domain::config::project::{ProjectConfig, ResolvedConfig};
use crate::domain::patterns::Pattern;
use anyhow::Context;

/// `--project` filters: comma-separated glob specs matched against project
/// names, with a leading `!` for exclusion.
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    entries: Vec<FilterEntry>,
}

#[derive(Debug, Clone)]
struct FilterEntry {
    negative: bool,
    pattern: Pattern,
}

impl ProjectFilter {
    pub fn parse(specs: &[String]) -> anyhow::Result<Self> {
        let mut entries = Vec::new();

        for spec in specs {
            for raw in spec.split(',') {
                let raw = raw.trim();
                if raw.is_empty() {
                    continue;
                }

                let (negative, body) = match raw.strip_prefix('!') {
                    Some(body) => (true, body),
                    None => (false, raw),
                };
                entries.push(FilterEntry {
                    negative,
                    pattern: Pattern::compile(body)
                        .with_context(|| format!("invalid --project filter \"{raw}\""))?,
                });
            }
        }

        Ok(ProjectFilter { entries })
    }

    /// Pick the enabled projects, preserving configuration order.
    /// `NeedsProjects` dependencies are force-enabled transitively, even when
    /// a filter excludes them.
    pub fn select(&self, config: &ResolvedConfig) -> Vec<ProjectConfig> {
        let has_positive = self.entries.iter().any(|entry| !entry.negative);

        let mut enabled: Vec<bool> = config
            .projects
            .iter()
            .map(|project| {
                let excluded = self
                    .entries
                    .iter()
                    .any(|entry| entry.negative && entry.pattern.is_match(&project.name));
                let included = if has_positive {
                    self.entries
                        .iter()
                        .any(|entry| !entry.negative && entry.pattern.is_match(&project.name))
                } else {
                    !project.explicit_only
                };
                included && !excluded
            })
            .collect();

        loop {
            let mut changed = false;
            for index in 0..config.projects.len() {
                if !enabled[index] {
                    continue;
                }
                for needed in &config.projects[index].needs_projects {
                    if let Some(dep) = config
                        .projects
                        .iter()
                        .position(|project| &project.name == needed)
                    {
                        if !enabled[dep] {
                            enabled[dep] = true;
                            changed = true;
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }

        config
            .projects
            .iter()
            .zip(&enabled)
            .filter(|(_, enabled)| **enabled)
            .map(|(project, _)| project.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::project::{resolve, ConfigOverrides};
    use crate::domain::config::schema::ConfigDocument;

    fn config(yaml: &str) -> ResolvedConfig {
        let document: ConfigDocument = serde_yaml::from_str(yaml).unwrap();
        resolve(&document, &ConfigOverrides::default()).unwrap()
    }

    fn names(projects: &[ProjectConfig]) -> Vec<&str> {
        projects.iter().map(|project| project.name.as_str()).collect()
    }

    const THREE: &str = r#"
        Project:
          - Name: core
          - Name: tools
          - Name: attic
            ExplicitOnly: "Yes"
    "#;

    #[test]
    fn no_filters_enable_everything_except_explicit_only() {
        let filter = ProjectFilter::parse(&[]).unwrap();
        let selected = filter.select(&config(THREE));
        assert_eq!(names(&selected), vec!["core", "tools"]);
    }

    #[test]
    fn positive_filters_select_by_glob() {
        let filter = ProjectFilter::parse(&["to*".to_string()]).unwrap();
        let selected = filter.select(&config(THREE));
        assert_eq!(names(&selected), vec!["tools"]);
    }

    #[test]
    fn positive_filters_can_pull_in_explicit_only_projects() {
        let filter = ProjectFilter::parse(&["attic".to_string()]).unwrap();
        let selected = filter.select(&config(THREE));
        assert_eq!(names(&selected), vec!["attic"]);
    }

    #[test]
    fn negative_filters_exclude() {
        let filter = ProjectFilter::parse(&["!tools".to_string()]).unwrap();
        let selected = filter.select(&config(THREE));
        assert_eq!(names(&selected), vec!["core"]);
    }

    #[test]
    fn comma_separated_filters_in_one_option() {
        let filter = ProjectFilter::parse(&["core,tools".to_string()]).unwrap();
        let selected = filter.select(&config(THREE));
        assert_eq!(names(&selected), vec!["core", "tools"]);
    }

    #[test]
    fn needed_projects_are_force_enabled_transitively() {
        let filter = ProjectFilter::parse(&["app,!base".to_string()]).unwrap();
        let selected = filter.select(&config(
            r#"
            Project:
              - Name: base
              - Name: lib
                NeedsProjects: "base"
              - Name: app
                NeedsProjects: "lib"
            "#,
        ));
        assert_eq!(names(&selected), vec!["base", "lib", "app"]);
    }
}
