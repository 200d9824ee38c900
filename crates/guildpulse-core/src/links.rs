use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// How eagerly message text is scanned for links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMatchMode {
    /// Only `http://`, `https://` and `www.` prefixed links.
    #[default]
    Strict,
    /// Also bare domains such as `example.dev/demo`.
    Loose,
}

impl LinkMatchMode {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "loose" => Ok(Self::Loose),
            other => Err(format!("link match must be strict or loose, got {other:?}")),
        }
    }
}

static STRICT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s<>"]+"#).expect("strict link regex")
});

static LOOSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(?:https?://)?(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z]{2,}(?:[/?#][^\s<>"]*)?"#,
    )
    .expect("loose link regex")
});

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '\'', '"', '*', '_', '>'];

/// Drop sentence punctuation glued to the end of a link, and a closing
/// parenthesis that has no opening partner inside the link.
fn trim_link(raw: &str) -> &str {
    let mut link = raw;
    loop {
        let before = link.len();
        link = link.trim_end_matches(TRAILING_PUNCTUATION);
        if link.ends_with(')') && link.matches('(').count() < link.matches(')').count() {
            link = &link[..link.len() - 1];
        }
        if link.len() == before {
            return link;
        }
    }
}

/// Pulls project links out of message text.
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    mode: LinkMatchMode,
    excluded_fragment: String,
}

impl LinkExtractor {
    /// `excluded_fragment` is matched case-insensitively; empty excludes nothing.
    pub fn new(mode: LinkMatchMode, excluded_fragment: &str) -> Self {
        Self {
            mode,
            excluded_fragment: excluded_fragment.trim().to_lowercase(),
        }
    }

    fn is_excluded(&self, link: &str) -> bool {
        !self.excluded_fragment.is_empty() && link.to_lowercase().contains(&self.excluded_fragment)
    }

    /// Links in `text`, in order of appearance, duplicates included.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let re = match self.mode {
            LinkMatchMode::Strict => &*STRICT_RE,
            LinkMatchMode::Loose => &*LOOSE_RE,
        };
        re.find_iter(text)
            .map(|m| trim_link(m.as_str()))
            .filter(|link| !link.is_empty() && !self.is_excluded(link))
            .map(str::to_string)
            .collect()
    }

    /// Exact-string de-duplicated links across `texts`, first occurrence wins.
    pub fn unique_links<'a, I>(&self, texts: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = HashSet::new();
        let mut links = Vec::new();
        for text in texts {
            for link in self.extract(text) {
                if seen.insert(link.clone()) {
                    links.push(link);
                }
            }
        }
        links
    }
}
