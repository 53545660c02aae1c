use anyhow::Context;

// The bracketed part must carry an email indicator; `Name <nonsense>` is
// not this form and falls through to the whitespace fallback.
const NAME_EMAIL_REGEX: &str = r"^\s*([^<>]+?)\s*<\s*([^<>@]+?(?:@| at | AT )[^<>@]+?)\s*>\s*$";
const NAME_PAREN_REGEX: &str = r"^\s*([^()]+?)\s*\(\s*([^()@\s]+@[^()\s]+)\s*\)\s*$";
const BARE_EMAIL_REGEX: &str = r"^\s*([^<>@\s]+)@([^<>@\s]+)\s*$";

/// Git author/committer identity extracted from a Mercurial username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    /// Parse any of the username forms Mercurial repositories contain:
    /// `Name <email>`, `Name (email)`, `"Name" <email>`, a bare email, or a
    /// bare name. When no email can be isolated, `<user>@localhost` is
    /// synthesized.
    pub fn parse(user: &str) -> anyhow::Result<Self> {
        let user = user.trim();
        if user.is_empty() {
            // git commit-tree refuses an empty author
            return Ok(Author {
                name: "(None)".to_string(),
                email: "none@localhost".to_string(),
            });
        }

        let name_email = regex::Regex::new(NAME_EMAIL_REGEX)
            .with_context(|| format!("invalid author regex: {NAME_EMAIL_REGEX}"))?;
        if let Some(caps) = name_email.captures(user) {
            return Ok(Author {
                name: strip_quotes(caps[1].trim()),
                email: deobfuscate_email(caps[2].trim()),
            });
        }

        let name_paren = regex::Regex::new(NAME_PAREN_REGEX)
            .with_context(|| format!("invalid author regex: {NAME_PAREN_REGEX}"))?;
        if let Some(caps) = name_paren.captures(user) {
            return Ok(Author {
                name: strip_quotes(caps[1].trim()),
                email: caps[2].to_string(),
            });
        }

        let bare_email = regex::Regex::new(BARE_EMAIL_REGEX)
            .with_context(|| format!("invalid author regex: {BARE_EMAIL_REGEX}"))?;
        if let Some(caps) = bare_email.captures(user) {
            return Ok(Author {
                name: caps[1].to_string(),
                email: user.to_string(),
            });
        }

        let name = strip_quotes(user);
        let email_stem = name
            .split_whitespace()
            .last()
            .unwrap_or(&name)
            .to_string();
        Ok(Author {
            email: format!("{email_stem}@localhost"),
            name,
        })
    }

    pub fn display(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }
}

fn strip_quotes(name: &str) -> String {
    name.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(name)
        .to_string()
}

/// Spam-shielded addresses spell out the separators; undo the common forms.
fn deobfuscate_email(email: &str) -> String {
    email
        .replace(" at ", "@")
        .replace(" AT ", "@")
        .replace(" dot ", ".")
        .replace(" DOT ", ".")
}
