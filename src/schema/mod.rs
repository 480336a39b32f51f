//! Reflected struct schemas
//!
//! A [`Schema`] is the flat, immutable description of one struct type: an ordered
//! list of fields with their kind, byte offset and byte size. Nested structs,
//! enums and arrays are referenced through [`FieldKind`], which holds shared
//! handles (`Arc<Schema>`, `Arc<EnumDef>`) instead of boxed copies, so a whole
//! schema graph is built once and shared by every view and binding.
//!
//! Schemas are produced by the [`SchemaStore`](store::SchemaStore) from the
//! descriptions a [`ReflectionProvider`](reflect::ReflectionProvider) supplies.

pub mod reflect;
pub mod store;

pub use reflect::{
    ArrayType, EnumDescription, FieldDescription, FieldType, ReflectionProvider, StaticReflection,
    StructDescription, TypeDescription,
};
pub use store::{SchemaError, SchemaStore};

use crate::types::TypeTag;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Enumeration definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub name: String,
    pub variants: Vec<EnumVariant>,
}

impl EnumDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variants: Vec::new(),
        }
    }

    /// Find a variant by value
    pub fn find_variant(&self, value: i64) -> Option<&EnumVariant> {
        self.variants.iter().find(|v| v.value == value)
    }

    /// Find a variant by name
    pub fn find_by_name(&self, name: &str) -> Option<&EnumVariant> {
        self.variants.iter().find(|v| v.name == name)
    }

    /// Convert a value to its variant name, falling back to the number
    pub fn value_to_string(&self, value: i64) -> String {
        match self.find_variant(value) {
            Some(variant) => format!("{}::{}", self.name, variant.name),
            None => value.to_string(),
        }
    }
}

/// An enum variant/enumerator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumVariant {
    pub name: String,
    pub value: i64,
}

/// Storage kind of a field
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Integer of `width` bytes (1, 2, 4 or 8)
    Int { signed: bool, width: u8 },
    /// IEEE float of `width` bytes (4 or 8)
    Float { width: u8 },
    Bool,
    /// Inline UTF-8, NUL padded
    String { capacity: usize },
    /// Signed discriminant of `width` bytes (1, 2 or 4)
    Enum { def: Arc<EnumDef>, width: u8 },
    /// Nested struct stored inline
    Struct(Arc<Schema>),
    /// Fixed-size array of `count` elements spaced `stride` bytes apart
    Array {
        element: Box<FieldKind>,
        count: usize,
        stride: usize,
    },
}

impl FieldKind {
    pub fn tag(&self) -> TypeTag {
        match self {
            FieldKind::Int { .. } => TypeTag::Int,
            FieldKind::Float { .. } => TypeTag::Float,
            FieldKind::Bool => TypeTag::Bool,
            FieldKind::String { .. } => TypeTag::String,
            FieldKind::Enum { .. } => TypeTag::Enum,
            FieldKind::Struct(_) => TypeTag::Struct,
            FieldKind::Array { .. } => TypeTag::Array,
        }
    }

    /// Number of bytes a value of this kind occupies
    pub fn size(&self) -> usize {
        match self {
            FieldKind::Int { width, .. }
            | FieldKind::Float { width }
            | FieldKind::Enum { width, .. } => *width as usize,
            FieldKind::Bool => 1,
            FieldKind::String { capacity } => *capacity,
            FieldKind::Struct(schema) => schema.size(),
            FieldKind::Array { count, stride, .. } => count * stride,
        }
    }

    /// Nested schema if this is a struct field
    pub fn as_struct(&self) -> Option<&Arc<Schema>> {
        match self {
            FieldKind::Struct(schema) => Some(schema),
            _ => None,
        }
    }

    /// Human readable type name, e.g. `u16`, `f32`, `PlayerStats`, `Slot[4]`
    pub fn type_name(&self) -> String {
        match self {
            FieldKind::Int { signed, width } => {
                format!("{}{}", if *signed { "i" } else { "u" }, *width as u32 * 8)
            }
            FieldKind::Float { width } => format!("f{}", *width as u32 * 8),
            FieldKind::Bool => "bool".to_string(),
            FieldKind::String { capacity } => format!("str[{}]", capacity),
            FieldKind::Enum { def, .. } => def.name.clone(),
            FieldKind::Struct(schema) => schema.name().to_string(),
            FieldKind::Array { element, count, .. } => {
                format!("{}[{}]", element.type_name(), count)
            }
        }
    }
}

/// A field of a struct schema
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: Arc<str>,
    pub kind: FieldKind,
    pub offset: usize,
    pub size: usize,
}

impl FieldDef {
    pub fn tag(&self) -> TypeTag {
        self.kind.tag()
    }
}

/// Immutable description of a struct type
#[derive(Debug)]
pub struct Schema {
    name: Arc<str>,
    size: usize,
    fields: Vec<FieldDef>,
    by_name: HashMap<Arc<str>, usize>,
}

impl Schema {
    /// Assemble a schema from already-validated fields.
    pub(crate) fn from_fields(name: &str, size: usize, fields: Vec<FieldDef>) -> Self {
        let by_name = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        Self {
            name: Arc::from(name),
            size,
            fields,
            by_name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total struct size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&FieldDef> {
        self.fields.get(index)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDef> {
        self.field_index(name).map(|i| &self.fields[i])
    }

    /// True if both schemas describe the same struct type
    pub fn same_type(&self, other: &Schema) -> bool {
        std::ptr::eq(self, other) || (self.name == other.name && self.size == other.size)
    }

    /// Multi-line layout listing, used by the `schema` command
    pub fn describe(&self) -> String {
        let mut out = format!("{} ({} bytes)\n", self.name, self.size);
        for field in &self.fields {
            out.push_str(&format!(
                "  @{:<4} {:<16} {:<6} {} ({} bytes)\n",
                field.offset,
                field.name,
                field.tag(),
                field.kind.type_name(),
                field.size
            ));
        }
        out
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_schema() -> Schema {
        Schema::from_fields(
            "PlayerStats",
            8,
            vec![
                FieldDef {
                    name: Arc::from("health"),
                    kind: FieldKind::Float { width: 4 },
                    offset: 0,
                    size: 4,
                },
                FieldDef {
                    name: Arc::from("mana"),
                    kind: FieldKind::Float { width: 4 },
                    offset: 4,
                    size: 4,
                },
            ],
        )
    }

    #[test]
    fn test_field_lookup() {
        let schema = stats_schema();
        assert_eq!(schema.field_index("mana"), Some(1));
        assert_eq!(schema.field_by_name("health").unwrap().offset, 0);
        assert!(schema.field_index("stamina").is_none());
        assert_eq!(schema.field(1).unwrap().tag(), TypeTag::Float);
    }

    #[test]
    fn test_kind_names_and_sizes() {
        let int = FieldKind::Int {
            signed: false,
            width: 2,
        };
        assert_eq!(int.type_name(), "u16");
        assert_eq!(int.size(), 2);

        let array = FieldKind::Array {
            element: Box::new(FieldKind::Float { width: 8 }),
            count: 3,
            stride: 8,
        };
        assert_eq!(array.type_name(), "f64[3]");
        assert_eq!(array.size(), 24);
        assert_eq!(array.tag(), TypeTag::Array);
    }

    #[test]
    fn test_enum_def() {
        let mut def = EnumDef::new("Stance");
        def.variants.push(EnumVariant {
            name: "Idle".to_string(),
            value: 0,
        });
        def.variants.push(EnumVariant {
            name: "Running".to_string(),
            value: 2,
        });
        assert_eq!(def.value_to_string(2), "Stance::Running");
        assert_eq!(def.value_to_string(7), "7");
        assert_eq!(def.find_by_name("Idle").unwrap().value, 0);
    }

    #[test]
    fn test_same_type() {
        let a = Arc::new(stats_schema());
        let b = Arc::new(stats_schema());
        assert!(a.same_type(&a));
        assert!(a.same_type(&b));
        let other = Arc::new(Schema::from_fields("Other", 8, Vec::new()));
        assert!(!a.same_type(&other));
    }

    #[test]
    fn test_describe_lists_fields() {
        let text = stats_schema().describe();
        assert!(text.starts_with("PlayerStats (8 bytes)"));
        assert!(text.contains("health"));
        assert!(text.contains("f32"));
    }
}
