//! Field paths
//!
//! A field path addresses a value inside a struct: `stats.health`,
//! `inventory.slots[2].count`. The same parser is used by the runtime resolver
//! and by the authoring-time validator.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors produced when parsing a field path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("field path is empty")]
    Empty,

    #[error("field path '{path}' has an empty segment at position {position}")]
    EmptySegment { path: String, position: usize },

    #[error("field path '{path}' contains invalid character {ch:?}")]
    InvalidCharacter { path: String, ch: char },

    #[error("field path '{path}' has a malformed index: {detail}")]
    InvalidIndex { path: String, detail: String },
}

/// One step of a field path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Named struct field
    Field(Arc<str>),
    /// Array element
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => f.write_str(name),
            PathSegment::Index(index) => write!(f, "[{}]", index),
        }
    }
}

/// A parsed field path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

impl FieldPath {
    pub fn parse(text: &str) -> Result<Self, PathError> {
        if text.is_empty() {
            return Err(PathError::Empty);
        }

        let mut segments = Vec::new();
        for (position, part) in text.split('.').enumerate() {
            let name_end = part.find('[').unwrap_or(part.len());
            let name = &part[..name_end];
            if name.is_empty() {
                return Err(PathError::EmptySegment {
                    path: text.to_string(),
                    position,
                });
            }
            if let Some(ch) = name.chars().find(|c| !is_name_char(*c)) {
                return Err(PathError::InvalidCharacter {
                    path: text.to_string(),
                    ch,
                });
            }
            segments.push(PathSegment::Field(Arc::from(name)));

            let mut rest = &part[name_end..];
            while !rest.is_empty() {
                let close = match (rest.strip_prefix('['), rest.find(']')) {
                    (Some(_), Some(close)) => close,
                    _ => {
                        return Err(PathError::InvalidIndex {
                            path: text.to_string(),
                            detail: format!("unbalanced brackets in '{}'", part),
                        })
                    }
                };
                let digits = &rest[1..close];
                let index = digits.parse::<usize>().map_err(|_| PathError::InvalidIndex {
                    path: text.to_string(),
                    detail: format!("'{}' is not an index", digits),
                })?;
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
            }
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 && matches!(segment, PathSegment::Field(_)) {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldPath::parse(s)
    }
}
