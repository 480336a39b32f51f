//! Host reflection capability
//!
//! The schema store never inspects host types itself. It asks a
//! [`ReflectionProvider`] for a [`TypeDescription`]: the field list (name, host
//! type, byte offset, byte size) of a struct, or the variants of an enum.
//!
//! [`StaticReflection`] is a table-backed provider, used by project files and
//! tests. Engines plug in their own provider.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Host-side type of a field, before mapping to a schema kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Signed integer
    Int,
    /// Unsigned integer
    Uint,
    Float,
    Bool,
    /// Fixed-capacity inline string
    String,
    /// Nested struct by type name
    Struct(String),
    /// Enum by type name
    Enum(String),
    /// Fixed-size array
    Array(ArrayType),
    /// Pointer to another type (not supported by schemas)
    Pointer(String),
    /// Any other host type the provider cannot classify
    Opaque(String),
}

impl FieldType {
    /// Array of `count` elements of type `element`
    pub fn array(element: FieldType, count: usize) -> Self {
        FieldType::Array(ArrayType {
            element: Box::new(element),
            count,
        })
    }
}

/// Element type and length of an array field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayType {
    pub element: Box<FieldType>,
    pub count: usize,
}

/// One field of a struct as reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
    pub offset: usize,
    pub size: usize,
}

/// A struct as reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDescription {
    pub name: String,
    pub size: usize,
    #[serde(default)]
    pub fields: Vec<FieldDescription>,
}

impl StructDescription {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            fields: Vec::new(),
        }
    }

    /// Builder-style field append
    pub fn field(mut self, name: impl Into<String>, ty: FieldType, offset: usize, size: usize) -> Self {
        self.fields.push(FieldDescription {
            name: name.into(),
            ty,
            offset,
            size,
        });
        self
    }
}

/// An enumerator as reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumVariantDescription {
    pub name: String,
    pub value: i64,
}

/// An enum as reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDescription {
    pub name: String,
    #[serde(default)]
    pub variants: Vec<EnumVariantDescription>,
}

impl EnumDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variants: Vec::new(),
        }
    }

    pub fn variant(mut self, name: impl Into<String>, value: i64) -> Self {
        self.variants.push(EnumVariantDescription {
            name: name.into(),
            value,
        });
        self
    }
}

/// Description of one host type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDescription {
    Struct(StructDescription),
    Enum(EnumDescription),
}

impl TypeDescription {
    pub fn name(&self) -> &str {
        match self {
            TypeDescription::Struct(s) => &s.name,
            TypeDescription::Enum(e) => &e.name,
        }
    }
}

/// Capability interface onto the host reflection system
#[cfg_attr(test, mockall::automock)]
pub trait ReflectionProvider {
    /// Describe a type by name, or `None` if the host does not know it.
    fn describe(&self, type_name: &str) -> Option<TypeDescription>;

    /// Names of every type this provider can describe.
    fn type_names(&self) -> Vec<String>;
}

impl<T: ReflectionProvider + ?Sized> ReflectionProvider for Arc<T> {
    fn describe(&self, type_name: &str) -> Option<TypeDescription> {
        (**self).describe(type_name)
    }

    fn type_names(&self) -> Vec<String> {
        (**self).type_names()
    }
}

/// Table-backed reflection provider
#[derive(Debug, Clone, Default)]
pub struct StaticReflection {
    types: BTreeMap<String, TypeDescription>,
}

impl StaticReflection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, description: TypeDescription) {
        self.types
            .insert(description.name().to_string(), description);
    }

    pub fn with_struct(mut self, description: StructDescription) -> Self {
        self.insert(TypeDescription::Struct(description));
        self
    }

    pub fn with_enum(mut self, description: EnumDescription) -> Self {
        self.insert(TypeDescription::Enum(description));
        self
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl ReflectionProvider for StaticReflection {
    fn describe(&self, type_name: &str) -> Option<TypeDescription> {
        self.types.get(type_name).cloned()
    }

    fn type_names(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_reflection_lookup() {
        let reflection = StaticReflection::new()
            .with_struct(
                StructDescription::new("PlayerStats", 8)
                    .field("health", FieldType::Float, 0, 4)
                    .field("mana", FieldType::Float, 4, 4),
            )
            .with_enum(EnumDescription::new("Stance").variant("Idle", 0));

        assert_eq!(reflection.len(), 2);
        assert_eq!(reflection.type_names(), vec!["PlayerStats", "Stance"]);
        match reflection.describe("PlayerStats") {
            Some(TypeDescription::Struct(s)) => assert_eq!(s.fields.len(), 2),
            other => panic!("unexpected description: {:?}", other),
        }
        assert!(reflection.describe("Missing").is_none());
    }

    #[test]
    fn test_field_type_toml_forms() {
        #[derive(Deserialize)]
        struct Wrapper {
            fields: Vec<FieldDescription>,
        }

        let text = r#"
            fields = [
                { name = "hp", type = "float", offset = 0, size = 4 },
                { name = "stats", type = { struct = "Stats" }, offset = 4, size = 8 },
                { name = "slots", type = { array = { element = "uint", count = 4 } }, offset = 12, size = 16 },
            ]
        "#;
        let wrapper: Wrapper = toml::from_str(text).unwrap();
        assert_eq!(wrapper.fields[0].ty, FieldType::Float);
        assert_eq!(wrapper.fields[1].ty, FieldType::Struct("Stats".to_string()));
        assert_eq!(
            wrapper.fields[2].ty,
            FieldType::array(FieldType::Uint, 4)
        );
    }
}
