use anyhow::bail;
use std::collections::BTreeMap;

/// The node Mercurial writes into `.hgtags` to retract a tag.
pub const NULL_NODE: &str = "0000000000000000000000000000000000000000";

/// Parse `.hgtags` contents into tag -> node. Later lines win, a null node
/// retracts the tag.
pub fn parse(contents: &str) -> anyhow::Result<BTreeMap<String, String>> {
    let mut tags = BTreeMap::new();

    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        let Some((node, tag)) = line.split_once(' ') else {
            bail!("corrupt .hgtags line {}: \"{line}\"", lineno + 1);
        };
        if node.len() != 40 || !node.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("corrupt .hgtags line {}: bad node \"{node}\"", lineno + 1);
        }
        if tag.is_empty() {
            bail!("corrupt .hgtags line {}: empty tag name", lineno + 1);
        }

        if node == NULL_NODE {
            tags.remove(tag);
        } else {
            tags.insert(tag.to_string(), node.to_string());
        }
    }

    Ok(tags)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDiff {
    /// Tags that appeared or now point at a different node.
    pub added: Vec<(String, String)>,
    /// Tags no longer present.
    pub removed: Vec<String>,
}

pub fn diff(old: &BTreeMap<String, String>, new: &BTreeMap<String, String>) -> TagDiff {
    let mut changes = TagDiff::default();

    for (tag, node) in new {
        if old.get(tag) != Some(node) {
            changes.added.push((tag.clone(), node.clone()));
        }
    }
    for tag in old.keys() {
        if !new.contains_key(tag) {
            changes.removed.push(tag.clone());
        }
    }

    changes
}
