use crate::domain::patterns::glob::Pattern;

/// A semicolon-separated list of patterns, each optionally negated with a
/// leading `!`.
#[derive(Debug, Clone)]
pub struct PatternSequence {
    source: String,
    entries: Vec<SequenceEntry>,
}

#[derive(Debug, Clone)]
struct SequenceEntry {
    negative: bool,
    pattern: Pattern,
}

impl PatternSequence {
    pub fn compile(source: &str) -> anyhow::Result<Self> {
        let mut entries = Vec::new();

        for raw in source.split(';') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }

            let (negative, body) = match raw.strip_prefix('!') {
                Some(body) => (true, body),
                None => (false, raw),
            };
            entries.push(SequenceEntry {
                negative,
                pattern: Pattern::compile(body)?,
            });
        }

        Ok(PatternSequence {
            source: source.to_string(),
            entries,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// A matching negative entry fails the whole sequence, wherever it
    /// appears; otherwise the first matching positive entry wins. A sequence
    /// without positive entries matches everything (an implicit trailing `**`
    /// with no captures).
    pub fn matches(&self, candidate: &str) -> Option<Vec<String>> {
        if self
            .entries
            .iter()
            .any(|entry| entry.negative && entry.pattern.is_match(candidate))
        {
            return None;
        }

        let mut saw_positive = false;
        for entry in &self.entries {
            if entry.negative {
                continue;
            }
            saw_positive = true;
            if let Some(captures) = entry.pattern.matches(candidate) {
                return Some(captures);
            }
        }

        if saw_positive {
            None
        } else {
            Some(Vec::new())
        }
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.matches(candidate).is_some()
    }
}
