//! Topic glob patterns
//!
//! Topics are slash-separated paths ("items/kitchen_light/state").
//! A pattern segment is either a literal, `*` (exactly one segment), or a
//! trailing `**` (zero or more segments).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing a topic pattern
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicPatternError {
    #[error("Topic pattern is empty")]
    Empty,

    #[error("Topic pattern has an empty segment: {0}")]
    EmptySegment(String),

    #[error("'**' is only valid as the last segment: {0}")]
    RestNotLast(String),

    #[error("Wildcards cannot be embedded in a segment: {0}")]
    EmbeddedWildcard(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*` — exactly one segment
    Any,
    /// `**` — the rest of the topic, including nothing
    Rest,
}

/// A parsed topic glob pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TopicPattern {
    segments: Vec<Segment>,
    text: String,
}

impl TopicPattern {
    /// Parse a pattern, validating its wildcard placement
    pub fn parse(pattern: &str) -> Result<Self, TopicPatternError> {
        if pattern.is_empty() {
            return Err(TopicPatternError::Empty);
        }

        let raw: Vec<&str> = pattern.split('/').collect();
        let mut segments = Vec::with_capacity(raw.len());

        for (i, part) in raw.iter().enumerate() {
            let segment = match *part {
                "" => return Err(TopicPatternError::EmptySegment(pattern.to_string())),
                "*" => Segment::Any,
                "**" => {
                    if i != raw.len() - 1 {
                        return Err(TopicPatternError::RestNotLast(pattern.to_string()));
                    }
                    Segment::Rest
                }
                literal => {
                    if literal.contains('*') {
                        return Err(TopicPatternError::EmbeddedWildcard(pattern.to_string()));
                    }
                    Segment::Literal(literal.to_string())
                }
            };
            segments.push(segment);
        }

        Ok(Self {
            segments,
            text: pattern.to_string(),
        })
    }

    /// Check whether a topic matches this pattern
    pub fn matches(&self, topic: &str) -> bool {
        let parts: Vec<&str> = topic.split('/').collect();
        let mut i = 0;

        for segment in &self.segments {
            match segment {
                Segment::Rest => return true,
                Segment::Any => {
                    if i >= parts.len() {
                        return false;
                    }
                    i += 1;
                }
                Segment::Literal(lit) => {
                    if parts.get(i) != Some(&lit.as_str()) {
                        return false;
                    }
                    i += 1;
                }
            }
        }

        i == parts.len()
    }

    /// The original pattern text
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl std::str::FromStr for TopicPattern {
    type Err = TopicPatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TopicPattern {
    type Error = TopicPatternError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<TopicPattern> for String {
    fn from(p: TopicPattern) -> String {
        p.text
    }
}

impl std::fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_match() {
        let p = TopicPattern::parse("items/kitchen_light/state").unwrap();
        assert!(p.matches("items/kitchen_light/state"));
        assert!(!p.matches("items/kitchen_light/command"));
        assert!(!p.matches("items/kitchen_light"));
    }

    #[test]
    fn test_single_wildcard() {
        let p = TopicPattern::parse("items/*/state").unwrap();
        assert!(p.matches("items/kitchen_light/state"));
        assert!(p.matches("items/door/state"));
        assert!(!p.matches("items/state"));
        assert!(!p.matches("items/a/b/state"));
    }

    #[test]
    fn test_rest_wildcard() {
        let p = TopicPattern::parse("items/**").unwrap();
        assert!(p.matches("items/kitchen_light/state"));
        assert!(p.matches("items/x"));

        let p = TopicPattern::parse("**").unwrap();
        assert!(p.matches("anything/at/all"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert_eq!(TopicPattern::parse(""), Err(TopicPatternError::Empty));
        assert!(matches!(
            TopicPattern::parse("items//state"),
            Err(TopicPatternError::EmptySegment(_))
        ));
        assert!(matches!(
            TopicPattern::parse("items/**/state"),
            Err(TopicPatternError::RestNotLast(_))
        ));
        assert!(matches!(
            TopicPattern::parse("items/kitchen*"),
            Err(TopicPatternError::EmbeddedWildcard(_))
        ));
    }

    #[test]
    fn test_serde_as_string() {
        let p: TopicPattern = serde_json::from_str("\"items/*/state\"").unwrap();
        assert!(p.matches("items/door/state"));
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"items/*/state\"");
        assert!(serde_json::from_str::<TopicPattern>("\"a//b\"").is_err());
    }
}
