use anyhow::bail;

/// A compiled wildcard expression.
///
/// Wildcards (`?`, `*`, `**`) and `{a,b,…}` alternation groups each bind one
/// capture, numbered left to right in source order. Alternation groups count
/// as a single capture holding the chosen alternative's matched text.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    tokens: Vec<Token>,
    anchored: bool,
    dir_only: bool,
    capture_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(Vec<char>),
    AnyChar { cap: Option<usize> },
    Star { min: usize, cap: Option<usize> },
    GlobStar { cap: Option<usize> },
    Alternation { alts: Vec<Vec<Token>>, cap: Option<usize> },
}

impl Token {
    fn capture_slot(&mut self) -> Option<&mut Option<usize>> {
        match self {
            Token::Literal(_) => None,
            Token::AnyChar { cap }
            | Token::Star { cap, .. }
            | Token::GlobStar { cap }
            | Token::Alternation { cap, .. } => Some(cap),
        }
    }
}

impl Pattern {
    pub fn compile(source: &str) -> anyhow::Result<Self> {
        let mut body = source;
        let mut dir_only = false;
        if let Some(stripped) = body.strip_suffix('/') {
            body = stripped;
            dir_only = true;
        }

        let chars: Vec<char> = body.chars().collect();
        let mut tokens = tokenize(&chars, source, dir_only)?;

        // Assign capture ordinals to the top-level wildcards only; wildcards
        // inside an alternation are swallowed by the group's own capture.
        let mut capture_count = 0;
        for token in &mut tokens {
            if let Some(slot) = token.capture_slot() {
                *slot = Some(capture_count);
                capture_count += 1;
            }
        }

        // A pattern containing a slash is anchored to the start of the
        // candidate; `**` can cross slashes so it forces anchoring as well.
        // Anything else matches a single path component anywhere.
        let anchored = source.contains('/') || contains_globstar(&tokens);

        Ok(Pattern {
            source: source.to_string(),
            tokens,
            anchored,
            dir_only,
            capture_count,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn capture_count(&self) -> usize {
        self.capture_count
    }

    /// Match `candidate`, returning the bound captures on success.
    pub fn matches(&self, candidate: &str) -> Option<Vec<String>> {
        if self.anchored {
            self.match_component(candidate)
        } else {
            candidate
                .split('/')
                .find_map(|part| self.match_component(part))
        }
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.matches(candidate).is_some()
    }

    fn match_component(&self, text: &str) -> Option<Vec<String>> {
        let chars: Vec<char> = text.chars().collect();
        let mut captures = vec![String::new(); self.capture_count];
        let end = if self.dir_only {
            EndRule::Boundary
        } else {
            EndRule::Exact
        };

        if match_tokens(&self.tokens, &chars, &mut captures, end) {
            Some(captures)
        } else {
            None
        }
    }
}

fn tokenize(chars: &[char], source: &str, trailing_slash: bool) -> anyhow::Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '[' => bail!("character ranges are not supported in pattern \"{source}\""),
            '?' => {
                flush_literal(&mut tokens, &mut literal);
                tokens.push(Token::AnyChar { cap: None });
                i += 1;
            }
            '*' => {
                flush_literal(&mut tokens, &mut literal);
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::GlobStar { cap: None });
                    i += 2;
                } else {
                    // A lone `*` between two slashes requires at least one
                    // character; elsewhere it matches the empty string too.
                    let after_slash = i > 0 && chars[i - 1] == '/';
                    let before_slash = chars.get(i + 1) == Some(&'/')
                        || (i + 1 == chars.len() && trailing_slash);
                    let min = usize::from(after_slash && before_slash);
                    tokens.push(Token::Star { min, cap: None });
                    i += 1;
                }
            }
            '{' => {
                flush_literal(&mut tokens, &mut literal);
                let (alts, consumed) = parse_alternation(&chars[i..], source)?;
                tokens.push(Token::Alternation { alts, cap: None });
                i += consumed;
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }

    flush_literal(&mut tokens, &mut literal);
    Ok(tokens)
}

fn flush_literal(tokens: &mut Vec<Token>, literal: &mut String) {
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal.chars().collect()));
        literal.clear();
    }
}

fn parse_alternation(chars: &[char], source: &str) -> anyhow::Result<(Vec<Vec<Token>>, usize)> {
    let mut end = None;
    let mut depth = 0;
    for (idx, &c) in chars.iter().enumerate() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(idx);
                    break;
                }
            }
            _ => {}
        }
    }

    let Some(end) = end else {
        bail!("unterminated alternation in pattern \"{source}\"");
    };

    let inner = &chars[1..end];
    let mut alternatives = Vec::new();
    let mut start = 0;
    let mut depth = 0;
    for (idx, &c) in inner.iter().enumerate() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            ',' if depth == 0 => {
                alternatives.push(tokenize(&inner[start..idx], source, false)?);
                start = idx + 1;
            }
            _ => {}
        }
    }
    alternatives.push(tokenize(&inner[start..], source, false)?);

    Ok((alternatives, end + 1))
}

fn contains_globstar(tokens: &[Token]) -> bool {
    tokens.iter().any(|token| match token {
        Token::GlobStar { .. } => true,
        Token::Alternation { alts, .. } => alts.iter().any(|alt| contains_globstar(alt)),
        _ => false,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndRule {
    Exact,
    Boundary,
}

fn match_tokens(tokens: &[Token], text: &[char], captures: &mut [String], end: EndRule) -> bool {
    let Some((first, rest)) = tokens.split_first() else {
        return text.is_empty() || (end == EndRule::Boundary && text[0] == '/');
    };

    match first {
        Token::Literal(lit) => {
            text.len() >= lit.len()
                && text[..lit.len()] == lit[..]
                && match_tokens(rest, &text[lit.len()..], captures, end)
        }
        Token::AnyChar { cap } => {
            if text.is_empty() || text[0] == '/' {
                return false;
            }
            bind(captures, *cap, &text[..1]);
            match_tokens(rest, &text[1..], captures, end)
        }
        Token::Star { min, cap } => {
            let limit = text.iter().take_while(|&&c| c != '/').count();
            if limit < *min {
                return false;
            }
            for take in (*min..=limit).rev() {
                bind(captures, *cap, &text[..take]);
                if match_tokens(rest, &text[take..], captures, end) {
                    return true;
                }
            }
            false
        }
        Token::GlobStar { cap } => {
            for take in (0..=text.len()).rev() {
                bind(captures, *cap, &text[..take]);
                if match_tokens(rest, &text[take..], captures, end) {
                    return true;
                }
            }
            false
        }
        Token::Alternation { alts, cap } => {
            for alt in alts {
                for take in (0..=text.len()).rev() {
                    if match_tokens(alt, &text[..take], captures, EndRule::Exact) {
                        bind(captures, *cap, &text[..take]);
                        if match_tokens(rest, &text[take..], captures, end) {
                            return true;
                        }
                    }
                }
            }
            false
        }
    }
}

fn bind(captures: &mut [String], cap: Option<usize>, text: &[char]) {
    if let Some(idx) = cap {
        captures[idx] = text.iter().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn literal_pattern_matches_itself() {
        let pattern = Pattern::compile("main").unwrap();
        assert_eq!(pattern.matches("main"), Some(vec![]));
        assert_eq!(pattern.matches("main-stale"), None);
    }

    #[test]
    fn unanchored_pattern_matches_any_component() {
        let pattern = Pattern::compile("main").unwrap();
        assert!(pattern.is_match("wip/main"));
        assert!(pattern.is_match("main/frozen"));
        assert!(!pattern.is_match("wip/mainline"));
    }

    #[test]
    fn star_captures_non_slash_run() {
        let pattern = Pattern::compile("hotfix-*").unwrap();
        assert_eq!(pattern.matches("hotfix-abc"), Some(vec!["abc".to_string()]));
        assert_eq!(pattern.matches("hotfix-"), Some(vec![String::new()]));
        assert!(!pattern.is_match("hotfix-a/b"));
    }

    #[test]
    fn question_mark_captures_one_character() {
        let pattern = Pattern::compile("v?").unwrap();
        assert_eq!(pattern.matches("v1"), Some(vec!["1".to_string()]));
        assert!(!pattern.is_match("v"));
        assert!(!pattern.is_match("v12"));
    }

    #[test]
    fn globstar_crosses_slashes() {
        let pattern = Pattern::compile("**").unwrap();
        assert_eq!(
            pattern.matches("feature/deep/branch"),
            Some(vec!["feature/deep/branch".to_string()])
        );
    }

    #[test]
    fn globstar_is_anchored() {
        let pattern = Pattern::compile("wip-**").unwrap();
        assert!(pattern.is_match("wip-a/b"));
        // Anchored: must match from the start of the candidate.
        assert!(!pattern.is_match("x/wip-a"));
    }

    #[test]
    fn star_between_slashes_requires_one_character() {
        let pattern = Pattern::compile("a/*/b").unwrap();
        assert!(pattern.is_match("a/x/b"));
        assert!(!pattern.is_match("a//b"));

        let open = Pattern::compile("a/x*").unwrap();
        assert!(open.is_match("a/x"));
    }

    #[test]
    fn alternation_counts_as_one_capture() {
        let pattern = Pattern::compile("releases/{1.0,2.0}/hotfix-*").unwrap();
        assert_eq!(pattern.capture_count(), 2);
        assert_eq!(
            pattern.matches("releases/2.0/hotfix-abc"),
            Some(vec!["2.0".to_string(), "abc".to_string()])
        );
        assert!(!pattern.is_match("releases/3.0/hotfix-abc"));
    }

    #[test]
    fn alternation_alternatives_may_contain_wildcards() {
        let pattern = Pattern::compile("{rel-*,dev}/x").unwrap();
        assert_eq!(
            pattern.matches("rel-1/x"),
            Some(vec!["rel-1".to_string()])
        );
        assert_eq!(pattern.matches("dev/x"), Some(vec!["dev".to_string()]));
    }

    #[test]
    fn nested_alternation() {
        let pattern = Pattern::compile("{a{1,2},b}").unwrap();
        assert_eq!(pattern.matches("a2"), Some(vec!["a2".to_string()]));
        assert_eq!(pattern.matches("b"), Some(vec!["b".to_string()]));
        assert!(!pattern.is_match("a3"));
    }

    #[test]
    fn trailing_slash_matches_at_component_boundary() {
        let pattern = Pattern::compile("releases/").unwrap();
        assert!(pattern.is_match("releases"));
        assert!(pattern.is_match("releases/2.0"));
        assert!(!pattern.is_match("releases-old"));
    }

    #[test]
    fn character_ranges_are_rejected() {
        let err = Pattern::compile("release-[0-9]").unwrap_err();
        assert!(err.to_string().contains("character ranges"));
    }

    #[test]
    fn unterminated_alternation_is_rejected() {
        let err = Pattern::compile("{a,b").unwrap_err();
        assert!(err.to_string().contains("unterminated alternation"));
    }

    proptest! {
        #[test]
        fn literal_patterns_match_themselves(name in "[a-zA-Z0-9_.-]{1,20}") {
            let pattern = Pattern::compile(&name).unwrap();
            prop_assert!(pattern.is_match(&name));
        }

        #[test]
        fn star_matches_any_component(name in "[a-zA-Z0-9_.-]{0,20}") {
            let pattern = Pattern::compile("*").unwrap();
            prop_assert_eq!(pattern.matches(&name), Some(vec![name]));
        }

        #[test]
        fn prefixed_star_rejects_other_prefixes(suffix in "[a-z]{1,10}") {
            let pattern = Pattern::compile("rel-*").unwrap();
            let rel_name = format!("rel-{}", suffix);
            let dev_name = format!("dev-{}", suffix);
            prop_assert!(pattern.is_match(&rel_name));
            prop_assert!(!pattern.is_match(&dev_name));
        }
    }
}
