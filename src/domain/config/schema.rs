use anyhow::Context;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::Path;

/// The configuration document as written by the user. Unknown elements and
/// attributes are configuration errors, not silently ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDocument {
    #[serde(rename = "Default", default)]
    pub default: Option<SectionDocument>,

    #[serde(rename = "Project", default)]
    pub projects: Vec<ProjectDocument>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SectionDocument {
    #[serde(rename = "Vars", default)]
    pub vars: BTreeMap<String, String>,

    #[serde(rename = "Replace", default)]
    pub replace: Vec<ReplaceDocument>,

    #[serde(rename = "MapBranch", default)]
    pub map_branch: Vec<MapBranchDocument>,

    #[serde(rename = "MapTag", default)]
    pub map_tag: Vec<MapTagDocument>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectDocument {
    #[serde(rename = "Name", default = "default_project_name")]
    pub name: String,

    /// Branch filter pattern sequence; an absent filter matches every branch.
    #[serde(rename = "Branch", default)]
    pub branch: String,

    #[serde(rename = "InheritDefault", default = "yes")]
    pub inherit_default: YesNo,

    #[serde(rename = "InheritDefaultMappings", default = "yes")]
    pub inherit_default_mappings: YesNo,

    #[serde(rename = "ExplicitOnly", default = "no")]
    pub explicit_only: YesNo,

    /// Comma-separated names of projects this project depends on.
    #[serde(rename = "NeedsProjects", default)]
    pub needs_projects: String,

    #[serde(rename = "Vars", default)]
    pub vars: BTreeMap<String, String>,

    #[serde(rename = "Replace", default)]
    pub replace: Vec<ReplaceDocument>,

    #[serde(rename = "MapBranch", default)]
    pub map_branch: Vec<MapBranchDocument>,

    #[serde(rename = "MapTag", default)]
    pub map_tag: Vec<MapTagDocument>,
}

impl Default for ProjectDocument {
    fn default() -> Self {
        ProjectDocument {
            name: default_project_name(),
            branch: String::new(),
            inherit_default: yes(),
            inherit_default_mappings: yes(),
            explicit_only: no(),
            needs_projects: String::new(),
            vars: BTreeMap::new(),
            replace: Vec::new(),
            map_branch: Vec::new(),
            map_tag: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplaceDocument {
    #[serde(rename = "Chars")]
    pub chars: String,

    #[serde(rename = "With")]
    pub with: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapBranchDocument {
    #[serde(rename = "Branch")]
    pub branch: String,

    /// Absent refname means the branch is explicitly unmapped.
    #[serde(rename = "Refname", default)]
    pub refname: Option<String>,

    #[serde(rename = "RevisionRef", default)]
    pub revision_ref: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapTagDocument {
    #[serde(rename = "Tag")]
    pub tag: String,

    #[serde(rename = "Refname", default)]
    pub refname: Option<String>,
}

/// `Yes`/`No` attribute values; anything else is a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YesNo(pub bool);

impl<'de> Deserialize<'de> for YesNo {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        match value.as_str() {
            "Yes" | "yes" => Ok(YesNo(true)),
            "No" | "no" => Ok(YesNo(false)),
            other => Err(D::Error::custom(format!(
                "expected \"Yes\" or \"No\", found \"{other}\""
            ))),
        }
    }
}

fn default_project_name() -> String {
    "*".to_string()
}

fn yes() -> YesNo {
    YesNo(true)
}

fn no() -> YesNo {
    YesNo(false)
}

impl ConfigDocument {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        serde_yaml::from_str(&content)
            .with_context(|| format!("invalid configuration in {}", path.display()))
    }
}
