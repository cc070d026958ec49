use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// How names are turned into sort keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Naming {
    /// Ignores punctuation and leading articles, compares digit runs numerically.
    #[default]
    Intelligent,
    Simple,
}

impl Naming {
    pub fn known(&self, raw: &str, sort: Option<&str>) -> Name {
        let source = sort.unwrap_or(raw);
        let tokens = match self {
            Naming::Intelligent => intelligent_tokens(source),
            Naming::Simple => vec![SortToken {
                key: strip_punctuation(source).trim().to_lowercase(),
                kind: TokenKind::Lexicographic,
            }],
        };
        Name::Known {
            raw: raw.to_string(),
            sort: sort.map(str::to_string),
            tokens,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Placeholder {
    Artist,
    Genre,
}

impl Placeholder {
    pub fn label(&self) -> &'static str {
        match self {
            Placeholder::Artist => "Unknown Artist",
            Placeholder::Genre => "Unknown Genre",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Numeric,
    Lexicographic,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SortToken {
    key: String,
    kind: TokenKind,
}

impl Ord for SortToken {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.kind, &other.kind) {
            (TokenKind::Numeric, TokenKind::Numeric) => self
                .key
                .len()
                .cmp(&other.key.len())
                .then_with(|| self.key.cmp(&other.key)),
            (TokenKind::Lexicographic, TokenKind::Lexicographic) => self.key.cmp(&other.key),
            (TokenKind::Numeric, TokenKind::Lexicographic) => Ordering::Less,
            (TokenKind::Lexicographic, TokenKind::Numeric) => Ordering::Greater,
        }
    }
}

impl PartialOrd for SortToken {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A display name with its sort key, or a placeholder for missing values.
#[derive(Clone, Debug)]
pub enum Name {
    Known {
        raw: String,
        sort: Option<String>,
        tokens: Vec<SortToken>,
    },
    Unknown(Placeholder),
}

impl Name {
    pub fn raw(&self) -> Option<&str> {
        match self {
            Name::Known { raw, .. } => Some(raw),
            Name::Unknown(_) => None,
        }
    }

    pub fn sort(&self) -> Option<&str> {
        match self {
            Name::Known { sort, .. } => sort.as_deref(),
            Name::Unknown(_) => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Name::Unknown(_))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Name::Known { raw, .. } => write!(f, "{}", raw),
            Name::Unknown(placeholder) => write!(f, "{}", placeholder.label()),
        }
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (
                Name::Known {
                    raw: a_raw,
                    tokens: a_tokens,
                    ..
                },
                Name::Known {
                    raw: b_raw,
                    tokens: b_tokens,
                    ..
                },
            ) => a_tokens.cmp(b_tokens).then_with(|| a_raw.cmp(b_raw)),
            (Name::Unknown(a), Name::Unknown(b)) => a.cmp(b),
            (Name::Unknown(_), Name::Known { .. }) => Ordering::Less,
            (Name::Known { .. }, Name::Unknown(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Name {}

fn strip_punctuation(value: &str) -> String {
    let stripped: String = value.chars().filter(|c| !c.is_ascii_punctuation()).collect();
    if stripped.trim().is_empty() {
        value.to_string()
    } else {
        stripped
    }
}

fn strip_article(value: &str) -> &str {
    for article in ["the ", "an ", "a "] {
        if value.len() > article.len() {
            if let Some(prefix) = value.get(..article.len()) {
                if prefix.eq_ignore_ascii_case(article) {
                    return &value[article.len()..];
                }
            }
        }
    }
    value
}

fn intelligent_tokens(value: &str) -> Vec<SortToken> {
    let stripped = strip_punctuation(value);
    let stripped = strip_article(stripped.trim());

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut current_numeric = false;
    for ch in stripped.chars() {
        let numeric = ch.is_ascii_digit();
        if !current.is_empty() && numeric != current_numeric {
            tokens.push(make_token(&current, current_numeric));
            current.clear();
        }
        current_numeric = numeric;
        current.push(ch);
    }
    if !current.is_empty() {
        tokens.push(make_token(&current, current_numeric));
    }
    tokens
}

fn make_token(text: &str, numeric: bool) -> SortToken {
    let trimmed = text.trim();
    let text = if trimmed.is_empty() { text } else { trimmed };
    if numeric {
        let digits = text.trim_start_matches('0');
        let digits = if digits.is_empty() { text } else { digits };
        SortToken {
            key: digits.to_string(),
            kind: TokenKind::Numeric,
        }
    } else {
        SortToken {
            key: text.to_lowercase(),
            kind: TokenKind::Lexicographic,
        }
    }
}
