//! Path resolution
//!
//! [`walk`] turns a parsed [`FieldPath`] into an absolute byte offset and a leaf
//! [`FieldKind`] against a root [`Schema`]. The runtime [`Resolver`] and the
//! authoring-time validator both call it, so they agree on every path.

use super::ResolutionError;
use crate::path::{FieldPath, PathError, PathSegment};
use crate::registry::{DataSource, RegistrationId, RegistrySnapshot};
use crate::schema::{FieldKind, Schema};
use crate::tag::Tag;
use crate::types::{TypeTag, TypedValue};
use crate::view::SharedInstance;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One step of a resolved path
#[derive(Debug, Clone)]
pub enum PathStep {
    /// Field `index` of `schema`
    Field { schema: Arc<Schema>, index: usize },
    /// Element `index` of the preceding array field
    Element { index: usize },
}

/// A field path walked against a schema
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    steps: Vec<PathStep>,
    offset: usize,
    leaf: FieldKind,
    field: Arc<str>,
}

impl ResolvedPath {
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Byte offset of the leaf from the start of the root struct
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn leaf(&self) -> &FieldKind {
        &self.leaf
    }

    pub fn leaf_tag(&self) -> TypeTag {
        self.leaf.tag()
    }

    /// Name of the last field walked
    pub fn field_name(&self) -> &str {
        &self.field
    }

    /// Field indices through each struct, outermost first
    pub fn field_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.steps.iter().filter_map(|step| match step {
            PathStep::Field { index, .. } => Some(*index),
            PathStep::Element { .. } => None,
        })
    }
}

/// Walk `path` against `root`.
pub fn walk(root: &Arc<Schema>, path: &FieldPath) -> Result<ResolvedPath, ResolutionError> {
    let mut steps = Vec::with_capacity(path.len());
    let mut offset = 0;
    let mut kind: Option<&FieldKind> = None;
    let mut field_name: Arc<str> = Arc::from(root.name());

    for segment in path.segments() {
        match segment {
            PathSegment::Field(name) => {
                let schema = match kind {
                    None => root,
                    Some(FieldKind::Struct(nested)) => nested,
                    Some(other) => {
                        return Err(ResolutionError::NotAStruct {
                            field: field_name.to_string(),
                            found: other.tag(),
                        })
                    }
                };
                let index = schema
                    .field_index(name)
                    .ok_or_else(|| ResolutionError::FieldNotFound {
                        schema: schema.name().to_string(),
                        field: name.to_string(),
                    })?;
                let def = &schema.fields()[index];
                offset += def.offset;
                steps.push(PathStep::Field {
                    schema: schema.clone(),
                    index,
                });
                kind = Some(&def.kind);
                field_name = def.name.clone();
            }
            PathSegment::Index(index) => match kind {
                Some(FieldKind::Array {
                    element,
                    count,
                    stride,
                }) => {
                    if index >= count {
                        return Err(ResolutionError::IndexOutOfBounds {
                            field: field_name.to_string(),
                            index: *index,
                            count: *count,
                        });
                    }
                    offset += index * stride;
                    steps.push(PathStep::Element { index: *index });
                    kind = Some(&**element);
                }
                other => {
                    return Err(ResolutionError::NotAnArray {
                        field: field_name.to_string(),
                        found: other.map_or(TypeTag::Struct, FieldKind::tag),
                    })
                }
            },
        }
    }

    let leaf = kind
        .cloned()
        .ok_or(ResolutionError::InvalidPath(PathError::Empty))?;
    Ok(ResolvedPath {
        steps,
        offset,
        leaf,
        field: field_name,
    })
}

/// A binding's cached resolution
///
/// Reading through a `Resolved` touches neither the registry nor the schema
/// tables: it goes straight to the cached offset in the source's bytes.
#[derive(Debug, Clone)]
pub struct Resolved {
    tag: Tag,
    registration: RegistrationId,
    source: DataSource,
    path: Arc<ResolvedPath>,
}

impl Resolved {
    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn registration(&self) -> RegistrationId {
        self.registration
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    pub fn path(&self) -> &Arc<ResolvedPath> {
        &self.path
    }

    pub fn value_tag(&self) -> TypeTag {
        self.path.leaf_tag()
    }

    pub fn read(&self) -> Result<TypedValue, ResolutionError> {
        let instance = self.instance()?;
        let guard = instance.read();
        let view = guard.view();
        view.read_at(&self.path.leaf, self.path.offset, &self.path.field)
    }

    pub fn write(&self, value: &TypedValue) -> Result<(), ResolutionError> {
        let instance = self.instance()?;
        let mut guard = instance.write();
        let mut view = guard.view_mut();
        view.write_at(&self.path.leaf, self.path.offset, &self.path.field, value)
    }

    fn instance(&self) -> Result<SharedInstance, ResolutionError> {
        self.source
            .instance()
            .ok_or_else(|| ResolutionError::SourceExpired {
                tag: self.tag.to_string(),
            })
    }
}

/// Resolves bindings against a registry snapshot
///
/// Counts every path walk it performs.
#[derive(Debug, Default)]
pub struct Resolver {
    walks: AtomicU64,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(
        &self,
        snapshot: &RegistrySnapshot,
        tag: Tag,
        path: &FieldPath,
        expected: Option<TypeTag>,
    ) -> Result<Resolved, ResolutionError> {
        let entry = snapshot
            .get(tag)
            .ok_or_else(|| ResolutionError::TagNotFound {
                tag: tag.to_string(),
            })?;

        self.walks.fetch_add(1, Ordering::Relaxed);
        let resolved = walk(entry.schema(), path)?;

        if let Some(expected) = expected {
            if resolved.leaf_tag() != expected {
                return Err(ResolutionError::TypeMismatch {
                    field: resolved.field.to_string(),
                    expected,
                    found: resolved.leaf_tag(),
                });
            }
        }

        Ok(Resolved {
            tag,
            registration: entry.id(),
            source: entry.source().clone(),
            path: Arc::new(resolved),
        })
    }

    /// Number of path walks performed
    pub fn walk_count(&self) -> u64 {
        self.walks.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, FieldKind};

    fn def(name: &str, kind: FieldKind, offset: usize) -> FieldDef {
        let size = kind.size();
        FieldDef {
            name: Arc::from(name),
            kind,
            offset,
            size,
        }
    }

    fn inventory() -> Arc<Schema> {
        let slot = Arc::new(Schema::from_fields(
            "Slot",
            8,
            vec![
                def(
                    "item",
                    FieldKind::Int {
                        signed: true,
                        width: 4,
                    },
                    0,
                ),
                def(
                    "count",
                    FieldKind::Int {
                        signed: false,
                        width: 2,
                    },
                    4,
                ),
            ],
        ));
        Arc::new(Schema::from_fields(
            "Inventory",
            36,
            vec![
                def("gold", FieldKind::Float { width: 4 }, 0),
                def(
                    "slots",
                    FieldKind::Array {
                        element: Box::new(FieldKind::Struct(slot)),
                        count: 4,
                        stride: 8,
                    },
                    4,
                ),
            ],
        ))
    }

    fn path(text: &str) -> FieldPath {
        FieldPath::parse(text).unwrap()
    }

    #[test]
    fn test_walk_offsets() {
        let schema = inventory();
        let resolved = walk(&schema, &path("slots[2].count")).unwrap();
        assert_eq!(resolved.offset(), 4 + 2 * 8 + 4);
        assert_eq!(resolved.leaf_tag(), TypeTag::Int);
        assert_eq!(resolved.field_name(), "count");
        assert_eq!(resolved.field_indices().collect::<Vec<_>>(), vec![1, 1]);
        assert_eq!(resolved.steps().len(), 3);
    }

    #[test]
    fn test_walk_whole_array_and_element() {
        let schema = inventory();
        assert_eq!(walk(&schema, &path("slots")).unwrap().leaf_tag(), TypeTag::Array);
        assert_eq!(
            walk(&schema, &path("slots[0]")).unwrap().leaf_tag(),
            TypeTag::Struct
        );
    }

    #[test]
    fn test_walk_errors() {
        let schema = inventory();
        assert!(matches!(
            walk(&schema, &path("silver")),
            Err(ResolutionError::FieldNotFound { ref field, .. }) if field == "silver"
        ));
        assert!(matches!(
            walk(&schema, &path("gold.amount")),
            Err(ResolutionError::NotAStruct { found: TypeTag::Float, .. })
        ));
        assert!(matches!(
            walk(&schema, &path("gold[0]")),
            Err(ResolutionError::NotAnArray { found: TypeTag::Float, .. })
        ));
        assert!(matches!(
            walk(&schema, &path("slots[4]")),
            Err(ResolutionError::IndexOutOfBounds { index: 4, count: 4, .. })
        ));
        assert!(matches!(
            walk(&schema, &path("slots.item")),
            Err(ResolutionError::NotAStruct { found: TypeTag::Array, .. })
        ));
        assert!(matches!(
            walk(&schema, &path("slots[1].weight")),
            Err(ResolutionError::FieldNotFound { ref schema, .. }) if schema == "Slot"
        ));
    }
}
