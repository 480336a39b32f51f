//! Declared tag namespace
//!
//! Authoring happens before any producer runs, so the validator cannot look tags
//! up in a live registry. Instead the project declares which struct types may be
//! registered where:
//!
//! - `types`: candidate types for the tag itself
//! - `children`: candidate types for any tag registered below it at runtime
//!   (e.g. `enemy` with children `EnemyStats` covers `enemy.boss`, `enemy.7`)

use crate::tag::{Tag, TagError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One namespace declaration as written in a project file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceEntry {
    pub tag: String,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub children: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct Declared {
    types: Vec<String>,
    children: Vec<String>,
}

/// Where a binding's candidate types came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidates<'a> {
    /// Declared exactly at the binding's tag
    Exact(&'a [String]),
    /// Inherited from the `children` of the nearest declaring ancestor
    Inherited { from: Tag, types: &'a [String] },
    /// Nothing may ever be registered at the tag
    None,
}

impl<'a> Candidates<'a> {
    pub fn types(&self) -> &'a [String] {
        match self {
            Candidates::Exact(types) | Candidates::Inherited { types, .. } => types,
            Candidates::None => &[],
        }
    }
}

/// The set of tags a project may register, with their candidate types
#[derive(Debug, Clone, Default)]
pub struct DeclaredNamespace {
    entries: BTreeMap<Tag, Declared>,
}

impl DeclaredNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from project-file entries; entries for the same tag are merged.
    pub fn from_entries(entries: &[NamespaceEntry]) -> Result<Self, TagError> {
        let mut namespace = Self::new();
        for entry in entries {
            let tag = Tag::new(&entry.tag)?;
            namespace.declare(tag, entry.types.iter().cloned());
            namespace.declare_children(tag, entry.children.iter().cloned());
        }
        Ok(namespace)
    }

    /// Allow `types` to be registered exactly at `tag`
    pub fn declare(&mut self, tag: Tag, types: impl IntoIterator<Item = String>) {
        let declared = self.entries.entry(tag).or_default();
        for ty in types {
            if !declared.types.contains(&ty) {
                declared.types.push(ty);
            }
        }
    }

    /// Allow `types` to be registered at any descendant of `tag`
    pub fn declare_children(&mut self, tag: Tag, types: impl IntoIterator<Item = String>) {
        let declared = self.entries.entry(tag).or_default();
        for ty in types {
            if !declared.children.contains(&ty) {
                declared.children.push(ty);
            }
        }
    }

    pub fn candidates(&self, tag: Tag) -> Candidates<'_> {
        if let Some(declared) = self.entries.get(&tag) {
            if !declared.types.is_empty() {
                return Candidates::Exact(&declared.types);
            }
        }
        for ancestor in tag.ancestors() {
            if let Some(declared) = self.entries.get(&ancestor) {
                if !declared.children.is_empty() {
                    return Candidates::Inherited {
                        from: ancestor,
                        types: &declared.children,
                    };
                }
            }
        }
        Candidates::None
    }

    /// Tags with an exact type declaration, in ascending order
    pub fn exact_tags(&self) -> impl Iterator<Item = (Tag, &[String])> {
        self.entries
            .iter()
            .filter(|(_, d)| !d.types.is_empty())
            .map(|(tag, d)| (*tag, d.types.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(text: &str) -> Tag {
        Tag::new(text).unwrap()
    }

    fn namespace() -> DeclaredNamespace {
        DeclaredNamespace::from_entries(&[
            NamespaceEntry {
                tag: "player.stats".into(),
                types: vec!["PlayerStats".into()],
                children: vec![],
            },
            NamespaceEntry {
                tag: "enemy".into(),
                types: vec![],
                children: vec!["EnemyStats".into(), "BossStats".into()],
            },
            NamespaceEntry {
                tag: "enemy.boss".into(),
                types: vec!["BossStats".into()],
                children: vec![],
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_exact_candidates() {
        let ns = namespace();
        assert_eq!(
            ns.candidates(tag("player.stats")).types(),
            &["PlayerStats".to_string()]
        );
        assert!(matches!(
            ns.candidates(tag("enemy.boss")),
            Candidates::Exact(_)
        ));
    }

    #[test]
    fn test_inherited_candidates() {
        let ns = namespace();
        match ns.candidates(tag("enemy.grunt.7")) {
            Candidates::Inherited { from, types } => {
                assert_eq!(from, tag("enemy"));
                assert_eq!(types.len(), 2);
            }
            other => panic!("unexpected candidates {:?}", other),
        }
        // A tag with only children declared gets no exact candidates itself.
        assert_eq!(ns.candidates(tag("enemy")), Candidates::None);
    }

    #[test]
    fn test_undeclared() {
        let ns = namespace();
        assert_eq!(ns.candidates(tag("player")), Candidates::None);
        assert_eq!(ns.candidates(tag("player.stats.extra")), Candidates::None);
    }

    #[test]
    fn test_merge_and_bad_tag() {
        let mut ns = namespace();
        ns.declare(tag("player.stats"), ["PlayerStats".to_string(), "Stats2".to_string()]);
        assert_eq!(ns.candidates(tag("player.stats")).types().len(), 2);
        assert_eq!(ns.exact_tags().count(), 2);

        let bad = DeclaredNamespace::from_entries(&[NamespaceEntry {
            tag: "bad tag".into(),
            types: vec![],
            children: vec![],
        }]);
        assert!(bad.is_err());
    }
}
