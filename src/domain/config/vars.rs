use anyhow::bail;
use std::collections::HashMap;

/// Variable presets seeded into every project environment. The CLI
/// `--branches`/`--tags` namespaces override these values.
pub const PRESET_VARS: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "Branches" => "refs/heads/",
    "Tags" => "refs/tags/",
};

/// Where a substitution result will be used. Semicolon-separated variable
/// values expand to `{a,b,…}` alternation in pattern sources; in refname
/// templates semicolons stay literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstContext {
    Pattern,
    Refname,
}

/// Named string values with lazy, cycle-checked substitution.
#[derive(Debug, Clone, Default)]
pub struct VarEnv {
    values: HashMap<String, String>,
}

impl VarEnv {
    pub fn define(&mut self, name: &str, value: &str) {
        self.values.insert(name.to_string(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Eagerly expand every value once so that reference cycles and
    /// undefined names fail at configuration time rather than mid-run.
    pub fn check_resolvable(&self) -> anyhow::Result<()> {
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();

        for name in names {
            self.substitute(&format!("$({name})"), &[], SubstContext::Pattern)?;
        }
        Ok(())
    }

    pub fn substitute(
        &self,
        template: &str,
        captures: &[String],
        context: SubstContext,
    ) -> anyhow::Result<String> {
        self.substitute_with(template, captures, context, &[])
    }

    /// Substitute with additional local bindings (e.g. `rev` for revision
    /// refs) that shadow the environment.
    pub fn substitute_with(
        &self,
        template: &str,
        captures: &[String],
        context: SubstContext,
        locals: &[(&str, &str)],
    ) -> anyhow::Result<String> {
        let mut visiting = Vec::new();
        let mut glyphs = 0;
        let mut out = self.expand(
            template,
            captures,
            context,
            locals,
            &mut visiting,
            Some(&mut glyphs),
        )?;

        // Namespace variables end with a slash, so templates like
        // `$Branches/name` would otherwise produce a doubled separator.
        if context == SubstContext::Refname {
            while out.contains("//") {
                out = out.replace("//", "/");
            }
        }
        Ok(out)
    }

    fn expand(
        &self,
        template: &str,
        captures: &[String],
        context: SubstContext,
        locals: &[(&str, &str)],
        visiting: &mut Vec<String>,
        mut glyphs: Option<&mut usize>,
    ) -> anyhow::Result<String> {
        let chars: Vec<char> = template.chars().collect();
        let mut out = String::with_capacity(template.len());
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '$' => {
                    let (reference, consumed) = scan_reference(&chars[i + 1..]);
                    match reference {
                        Reference::Capture(n) => {
                            if n >= 1 {
                                if let Some(text) = captures.get(n - 1) {
                                    out.push_str(text);
                                }
                            }
                            i += 1 + consumed;
                        }
                        Reference::Name(name) => {
                            let expanded = self.expand_variable(
                                &name, template, captures, context, locals, visiting,
                            )?;
                            out.push_str(&expanded);
                            i += 1 + consumed;
                        }
                        Reference::None => {
                            out.push('$');
                            i += 1;
                        }
                    }
                }
                '*' => match (context, glyphs.as_deref_mut()) {
                    // Wildcard glyphs in refname templates address captures
                    // positionally, in the same order as the source pattern's
                    // wildcards.
                    (SubstContext::Refname, Some(counter)) => {
                        if let Some(text) = captures.get(*counter) {
                            out.push_str(text);
                        }
                        *counter += 1;
                        i += if chars.get(i + 1) == Some(&'*') { 2 } else { 1 };
                    }
                    _ => {
                        out.push('*');
                        i += 1;
                    }
                },
                c => {
                    out.push(c);
                    i += 1;
                }
            }
        }

        Ok(out)
    }

    fn expand_variable(
        &self,
        name: &str,
        template: &str,
        captures: &[String],
        context: SubstContext,
        locals: &[(&str, &str)],
        visiting: &mut Vec<String>,
    ) -> anyhow::Result<String> {
        if let Some((_, value)) = locals.iter().find(|(local, _)| *local == name) {
            return Ok((*value).to_string());
        }

        let Some(value) = self.values.get(name) else {
            bail!("undefined variable \"${name}\" in \"{template}\"");
        };

        if visiting.iter().any(|seen| seen == name) {
            bail!(
                "variable reference cycle: {} -> {name}",
                visiting.join(" -> ")
            );
        }

        visiting.push(name.to_string());
        let expanded = self.expand(value, captures, context, locals, visiting, None)?;
        visiting.pop();

        // A semicolon-separated list becomes a brace alternation when it
        // lands inside a pattern source.
        if context == SubstContext::Pattern && expanded.contains(';') {
            let alternatives: Vec<&str> = expanded.split(';').collect();
            Ok(format!("{{{}}}", alternatives.join(",")))
        } else {
            Ok(expanded)
        }
    }
}

enum Reference {
    Capture(usize),
    Name(String),
    None,
}

/// Scan the text following a `$`, returning the reference and how many
/// characters it consumed.
fn scan_reference(chars: &[char]) -> (Reference, usize) {
    match chars.first() {
        Some(open @ ('{' | '(')) => {
            let close = if *open == '{' { '}' } else { ')' };
            let Some(end) = chars.iter().position(|&c| c == close) else {
                return (Reference::None, 0);
            };
            let inner: String = chars[1..end].iter().collect();
            if inner.is_empty() {
                (Reference::None, 0)
            } else if inner.chars().all(|c| c.is_ascii_digit()) {
                (Reference::Capture(inner.parse().unwrap_or(0)), end + 1)
            } else {
                (Reference::Name(inner), end + 1)
            }
        }
        Some(c) if c.is_ascii_digit() => {
            let len = chars.iter().take_while(|c| c.is_ascii_digit()).count();
            let digits: String = chars[..len].iter().collect();
            (Reference::Capture(digits.parse().unwrap_or(0)), len)
        }
        Some(c) if c.is_ascii_alphabetic() || *c == '_' => {
            // Bare names end at the first non-identifier character.
            let len = chars
                .iter()
                .take_while(|c| c.is_ascii_alphanumeric() || **c == '_')
                .count();
            (Reference::Name(chars[..len].iter().collect()), len)
        }
        _ => (Reference::None, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> VarEnv {
        let mut env = VarEnv::default();
        for (name, value) in pairs {
            env.define(name, value);
        }
        env
    }

    #[test]
    fn name_reference_forms() {
        let env = env(&[("Branches", "refs/heads/")]);
        for template in ["$Branches", "${Branches}", "$(Branches)"] {
            assert_eq!(
                env.substitute(template, &[], SubstContext::Refname).unwrap(),
                "refs/heads/"
            );
        }
    }

    #[test]
    fn bare_name_ends_at_non_identifier() {
        let env = env(&[("Tags", "refs/tags/")]);
        assert_eq!(
            env.substitute("$Tags-x", &[], SubstContext::Refname).unwrap(),
            "refs/tags/-x"
        );
    }

    #[test]
    fn numeric_references_resolve_captures() {
        let env = VarEnv::default();
        let captures = vec!["2.0".to_string(), "abc".to_string()];
        assert_eq!(
            env.substitute("rel-$1/$2", &captures, SubstContext::Refname)
                .unwrap(),
            "rel-2.0/abc"
        );
        assert_eq!(
            env.substitute("x${2}y", &captures, SubstContext::Refname)
                .unwrap(),
            "xabcy"
        );
    }

    #[test]
    fn out_of_range_captures_expand_empty() {
        let env = VarEnv::default();
        assert_eq!(
            env.substitute("a$3b", &["x".to_string()], SubstContext::Refname)
                .unwrap(),
            "ab"
        );
    }

    #[test]
    fn semicolon_lists_become_alternation_in_pattern_context() {
        let env = env(&[("A", "x;y"), ("B", "${A}/z")]);
        assert_eq!(
            env.substitute("$B", &[], SubstContext::Pattern).unwrap(),
            "{x,y}/z"
        );
        assert_eq!(
            env.substitute("$B", &[], SubstContext::Refname).unwrap(),
            "x;y/z"
        );
    }

    #[test]
    fn wildcard_glyphs_address_captures_in_refname_context() {
        let env = env(&[("Branches", "refs/heads/")]);
        let captures = vec!["feature/a".to_string()];
        assert_eq!(
            env.substitute("$Branches/**", &captures, SubstContext::Refname)
                .unwrap(),
            "refs/heads/feature/a"
        );
    }

    #[test]
    fn undefined_variable_is_an_error() {
        let env = VarEnv::default();
        let err = env
            .substitute("$Missing", &[], SubstContext::Refname)
            .unwrap_err();
        assert!(err.to_string().contains("undefined variable"));
    }

    #[test]
    fn reference_cycles_are_detected() {
        let env = env(&[("A", "$B"), ("B", "$A")]);
        let err = env.check_resolvable().unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn local_bindings_shadow_the_environment() {
        let env = env(&[("rev", "nope")]);
        assert_eq!(
            env.substitute_with("r$rev", &[], SubstContext::Refname, &[("rev", "42")])
                .unwrap(),
            "r42"
        );
    }

    #[test]
    fn substitution_is_idempotent_once_resolved() {
        let env = env(&[("Branches", "refs/heads/")]);
        let once = env
            .substitute("$Branches/main", &[], SubstContext::Refname)
            .unwrap();
        let twice = env.substitute(&once, &[], SubstContext::Refname).unwrap();
        assert_eq!(once, twice);
    }
}
