//! Paths into JSON state, and patterns over them.
//!
//! Text form is dot-separated keys with bracketed array indices, e.g.
//! `items[2].name`. Patterns additionally accept `*` for any one segment,
//! and a bare numeric segment (`items.2`) matches that array index.

use rewind_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One step into a JSON value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Object field
    Key(String),
    /// Array position
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Render a path in text form; the root renders as the empty string
#[must_use]
pub fn format_path(path: &[PathSegment]) -> String {
    let mut out = String::new();
    for (i, segment) in path.iter().enumerate() {
        if i > 0 && matches!(segment, PathSegment::Key(_)) {
            out.push('.');
        }
        out.push_str(&segment.to_string());
    }
    out
}

/// Parse a path from text form
///
/// # Errors
///
/// Returns `Encoding` for empty segments, unclosed brackets or
/// non-numeric indices
pub fn parse_path(text: &str) -> CoreResult<Vec<PathSegment>> {
    tokenize(text)?
        .into_iter()
        .map(|token| match token {
            Token::Name(name) => Ok(PathSegment::Key(name.to_string())),
            Token::Bracket(index) => parse_index(text, index).map(PathSegment::Index),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PatternSegment {
    Any,
    Key(String),
    Index(usize),
}

impl PatternSegment {
    fn matches(&self, segment: &PathSegment) -> bool {
        match (self, segment) {
            (Self::Any, _) => true,
            (Self::Key(want), PathSegment::Key(key)) => want == key,
            (Self::Key(want), PathSegment::Index(index)) => {
                want.parse::<usize>().is_ok_and(|want| want == *index)
            }
            (Self::Index(want), PathSegment::Index(index)) => want == index,
            (Self::Index(_), PathSegment::Key(_)) => false,
        }
    }
}

/// Pattern matched against whole paths
///
/// A pattern matches a path of exactly the same length whose segments all
/// match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathPattern {
    segments: Vec<PatternSegment>,
}

impl PathPattern {
    /// Pattern matching exactly `path`
    #[must_use]
    pub fn exact(path: &[PathSegment]) -> Self {
        let segments = path
            .iter()
            .map(|segment| match segment {
                PathSegment::Key(key) => PatternSegment::Key(key.clone()),
                PathSegment::Index(index) => PatternSegment::Index(*index),
            })
            .collect();
        Self { segments }
    }

    /// Whether `path` matches
    #[must_use]
    pub fn matches(&self, path: &[PathSegment]) -> bool {
        self.segments.len() == path.len()
            && self
                .segments
                .iter()
                .zip(path)
                .all(|(pattern, segment)| pattern.matches(segment))
    }

    /// Number of segments
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether this is the root pattern
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl FromStr for PathPattern {
    type Err = CoreError;

    fn from_str(text: &str) -> CoreResult<Self> {
        let segments = tokenize(text)?
            .into_iter()
            .map(|token| match token {
                Token::Name("*") | Token::Bracket("*") => Ok(PatternSegment::Any),
                Token::Name(name) => Ok(PatternSegment::Key(name.to_string())),
                Token::Bracket(index) => parse_index(text, index).map(PatternSegment::Index),
            })
            .collect::<CoreResult<_>>()?;
        Ok(Self { segments })
    }
}

impl TryFrom<String> for PathPattern {
    type Error = CoreError;

    fn try_from(text: String) -> CoreResult<Self> {
        text.parse()
    }
}

impl From<PathPattern> for String {
    fn from(pattern: PathPattern) -> Self {
        pattern.to_string()
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PatternSegment::Index(index) => write!(f, "[{index}]")?,
                PatternSegment::Any | PatternSegment::Key(_) if i > 0 => f.write_str(".")?,
                _ => {}
            }
            match segment {
                PatternSegment::Any => f.write_str("*")?,
                PatternSegment::Key(key) => f.write_str(key)?,
                PatternSegment::Index(_) => {}
            }
        }
        Ok(())
    }
}

enum Token<'a> {
    Name(&'a str),
    Bracket(&'a str),
}

fn malformed(text: &str, problem: &str) -> CoreError {
    CoreError::Encoding {
        reason: format!("malformed path '{text}': {problem}"),
    }
}

fn parse_index(text: &str, index: &str) -> CoreResult<usize> {
    index
        .parse()
        .map_err(|_| malformed(text, &format!("'{index}' is not an array index")))
}

fn tokenize(text: &str) -> CoreResult<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        if !rest.starts_with('[') {
            let end = rest.find(['.', '[']).unwrap_or(rest.len());
            if end == 0 {
                return Err(malformed(text, "empty segment"));
            }
            tokens.push(Token::Name(&rest[..end]));
            rest = &rest[end..];
        }
        while let Some(inner) = rest.strip_prefix('[') {
            let close = inner
                .find(']')
                .ok_or_else(|| malformed(text, "unclosed '['"))?;
            tokens.push(Token::Bracket(&inner[..close]));
            rest = &inner[close + 1..];
        }
        if rest.is_empty() {
            break;
        }
        rest = rest
            .strip_prefix('.')
            .ok_or_else(|| malformed(text, "expected '.'"))?;
        if rest.is_empty() {
            return Err(malformed(text, "trailing '.'"));
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: &str) -> PathSegment {
        PathSegment::from(k)
    }

    #[test]
    fn test_parse_and_format_path() {
        let path = parse_path("items[2].name").unwrap();
        assert_eq!(path, vec![key("items"), PathSegment::Index(2), key("name")]);
        assert_eq!(format_path(&path), "items[2].name");
        assert_eq!(format_path(&parse_path("[0][1].a").unwrap()), "[0][1].a");
        assert!(parse_path("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_path_rejects_malformed() {
        for bad in ["a..b", "a.", ".a", "a[", "a[x]", "a[1]b"] {
            assert!(parse_path(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_pattern_wildcard() {
        let pattern: PathPattern = "items.*.updated_at".parse().unwrap();
        assert!(pattern.matches(&[key("items"), PathSegment::Index(4), key("updated_at")]));
        assert!(pattern.matches(&[key("items"), key("x"), key("updated_at")]));
        assert!(!pattern.matches(&[key("items"), PathSegment::Index(4)]));
        assert!(!pattern.matches(&[
            key("items"),
            PathSegment::Index(4),
            key("updated_at"),
            key("nanos")
        ]));
    }

    #[test]
    fn test_pattern_numeric_segment_matches_index() {
        let dotted: PathPattern = "items.2".parse().unwrap();
        let bracketed: PathPattern = "items[2]".parse().unwrap();
        let path = [key("items"), PathSegment::Index(2)];
        assert!(dotted.matches(&path));
        assert!(bracketed.matches(&path));
        assert!(dotted.matches(&[key("items"), key("2")]));
        assert!(!bracketed.matches(&[key("items"), key("2")]));
    }

    #[test]
    fn test_pattern_display_round_trips() {
        for text in ["a.b", "items[3].name", "*.id", "a[*]"] {
            let pattern: PathPattern = text.parse().unwrap();
            let again: PathPattern = pattern.to_string().parse().unwrap();
            assert_eq!(pattern, again);
        }
        assert_eq!("items[3].name".parse::<PathPattern>().unwrap().to_string(), "items[3].name");
    }

    #[test]
    fn test_pattern_serde_from_string() {
        let patterns: Vec<PathPattern> = serde_json::from_str(r#"["meta.*", "b"]"#).unwrap();
        assert!(patterns[1].matches(&[key("b")]));
        assert!(serde_json::from_str::<PathPattern>(r#""a[""#).is_err());
    }

    #[test]
    fn test_exact_pattern() {
        let path = parse_path("a[1].b").unwrap();
        let pattern = PathPattern::exact(&path);
        assert!(pattern.matches(&path));
        assert_eq!(pattern.len(), 3);
    }
}
