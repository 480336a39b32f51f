//! Hierarchical, interned tags
//!
//! A [`Tag`] addresses a data source in the [`Registry`](crate::registry::Registry).
//! Tags are dotted segment sequences (`player.stats.health`) and are interned
//! process-wide, so a `Tag` is a `Copy` pointer and equality is a single pointer
//! comparison.
//!
//! # Syntax
//!
//! - Segments are separated by [`SEPARATOR`]
//! - Segments are non-empty and contain only ASCII alphanumerics, `_` and `-`
//! - Tags are case-sensitive; no normalization is applied
//!
//! # Ordering
//!
//! Tags order lexicographically over their segment sequence. A consequence is that
//! every descendant of `a.b` sorts directly after `a.b` and before any sibling of
//! `a.b`, which is what makes prefix lookups a contiguous range scan.

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;
use thiserror::Error;

/// Segment separator
pub const SEPARATOR: char = '.';

/// Errors produced when parsing a tag string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    #[error("tag is empty")]
    Empty,

    #[error("tag '{tag}' has an empty segment at position {position}")]
    EmptySegment { tag: String, position: usize },

    #[error("tag '{tag}' contains invalid character {ch:?}")]
    InvalidCharacter { tag: String, ch: char },
}

struct TagData {
    text: &'static str,
    segments: Box<[&'static str]>,
    parent: Option<Tag>,
}

/// An interned hierarchical identifier
#[derive(Clone, Copy)]
pub struct Tag(&'static TagData);

fn interner() -> &'static RwLock<HashMap<&'static str, Tag>> {
    static INTERNER: OnceLock<RwLock<HashMap<&'static str, Tag>>> = OnceLock::new();
    INTERNER.get_or_init(|| RwLock::new(HashMap::new()))
}

fn is_segment_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'
}

/// Check tag syntax without interning anything.
pub fn validate(text: &str) -> Result<(), TagError> {
    if text.is_empty() {
        return Err(TagError::Empty);
    }
    for (position, segment) in text.split(SEPARATOR).enumerate() {
        if segment.is_empty() {
            return Err(TagError::EmptySegment {
                tag: text.to_string(),
                position,
            });
        }
        if let Some(ch) = segment.chars().find(|c| !is_segment_char(*c)) {
            return Err(TagError::InvalidCharacter {
                tag: text.to_string(),
                ch,
            });
        }
    }
    Ok(())
}

impl Tag {
    /// Parse and intern a tag.
    pub fn new(text: &str) -> Result<Tag, TagError> {
        if let Some(tag) = interner().read().get(text) {
            return Ok(*tag);
        }
        validate(text)?;
        Ok(Self::intern_validated(text))
    }

    fn intern_validated(text: &str) -> Tag {
        // Ancestors first, outside the write lock, so the parent link is available.
        let parent = text
            .rfind(SEPARATOR)
            .map(|split| Self::intern_validated(&text[..split]));

        let mut table = interner().write();
        if let Some(tag) = table.get(text) {
            return *tag;
        }

        let text: &'static str = Box::leak(text.to_owned().into_boxed_str());
        let segments: Box<[&'static str]> = text.split(SEPARATOR).collect();
        let data: &'static TagData = Box::leak(Box::new(TagData {
            text,
            segments,
            parent,
        }));
        let tag = Tag(data);
        table.insert(text, tag);
        tag
    }

    /// Look up an already-interned tag without creating it.
    pub fn find(text: &str) -> Option<Tag> {
        interner().read().get(text).copied()
    }

    pub fn as_str(&self) -> &'static str {
        self.0.text
    }

    pub fn segments(&self) -> &'static [&'static str] {
        &self.0.segments
    }

    /// Number of segments (1 for a root tag).
    pub fn depth(&self) -> usize {
        self.0.segments.len()
    }

    /// Last segment, e.g. `health` for `player.stats.health`.
    pub fn leaf(&self) -> &'static str {
        self.0.segments[self.0.segments.len() - 1]
    }

    pub fn parent(&self) -> Option<Tag> {
        self.0.parent
    }

    /// Iterate over strict ancestors, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = Tag> {
        std::iter::successors(self.parent(), |t| t.parent())
    }

    /// True if `self` is a strict ancestor of `other` (`a.b` is an ancestor of `a.b.c`).
    pub fn is_ancestor_of(&self, other: &Tag) -> bool {
        if other.depth() <= self.depth() {
            return false;
        }
        other.ancestors().any(|a| a == *self)
    }

    /// True if `other` equals `self` or is one of its descendants.
    pub fn contains(&self, other: &Tag) -> bool {
        self == other || self.is_ancestor_of(other)
    }

    /// Intern `self.child`.
    pub fn child(&self, segment: &str) -> Result<Tag, TagError> {
        Tag::new(&format!("{}{}{}", self.as_str(), SEPARATOR, segment))
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for Tag {}

impl Hash for Tag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.0, state)
    }
}

impl Ord for Tag {
    fn cmp(&self, other: &Self) -> Ordering {
        if self == other {
            return Ordering::Equal;
        }
        self.segments().cmp(other.segments())
    }
}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.as_str())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl TryFrom<&str> for Tag {
    type Error = TagError;

    fn try_from(text: &str) -> Result<Self, Self::Error> {
        Tag::new(text)
    }
}

impl std::str::FromStr for Tag {
    type Err = TagError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Tag::new(text)
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Tag::new(&text).map_err(serde::de::Error::custom)
    }
}
