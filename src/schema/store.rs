//! Schema store
//!
//! Builds a [`Schema`] once per type name from the reflection provider and caches
//! it for the lifetime of the store. Failures are cached too, so a broken type is
//! reported (and logged) exactly once however often it is requested.
//!
//! Nested struct fields are built recursively. A visited-type stack detects
//! struct types that contain themselves and fails with
//! [`SchemaError::CyclicSchema`] instead of recursing forever.

use super::reflect::{ArrayType, FieldType, ReflectionProvider, TypeDescription};
use super::{EnumDef, EnumVariant, FieldDef, FieldKind, Schema};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while building a schema
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("unknown type '{name}'")]
    UnknownType { name: String },

    #[error("type '{name}' is not a struct")]
    NotAStructType { name: String },

    #[error("type '{name}' is not an enum")]
    NotAnEnumType { name: String },

    #[error("field '{schema}.{field}' has unsupported type {ty}")]
    UnsupportedFieldType {
        schema: String,
        field: String,
        ty: String,
    },

    #[error("cyclic struct nesting: {}", cycle.join(" -> "))]
    CyclicSchema { cycle: Vec<String> },

    #[error("invalid layout for '{schema}': {reason}")]
    InvalidLayout { schema: String, reason: String },
}

type Cached<T> = Result<Arc<T>, SchemaError>;

/// Lazily built, cached schemas keyed by type name
pub struct SchemaStore {
    provider: Box<dyn ReflectionProvider + Send + Sync>,
    schemas: RwLock<HashMap<String, Cached<Schema>>>,
    enums: RwLock<HashMap<String, Cached<EnumDef>>>,
}

impl SchemaStore {
    pub fn new(provider: impl ReflectionProvider + Send + Sync + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            schemas: RwLock::new(HashMap::new()),
            enums: RwLock::new(HashMap::new()),
        }
    }

    pub fn provider(&self) -> &(dyn ReflectionProvider + Send + Sync) {
        self.provider.as_ref()
    }

    /// Return the cached schema for `type_name`, building it on first use.
    pub fn get_or_build(&self, type_name: &str) -> Result<Arc<Schema>, SchemaError> {
        let mut visiting = Vec::new();
        self.build_struct(type_name, &mut visiting)
    }

    /// Cached schema without triggering a build
    pub fn cached(&self, type_name: &str) -> Option<Arc<Schema>> {
        self.schemas
            .read()
            .get(type_name)
            .and_then(|entry| entry.as_ref().ok().cloned())
    }

    /// Number of cached entries (successful or failed)
    pub fn len(&self) -> usize {
        self.schemas.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.read().is_empty()
    }

    /// Build every struct type the provider knows about.
    pub fn build_all(&self) -> Vec<(String, Result<Arc<Schema>, SchemaError>)> {
        self.provider
            .type_names()
            .into_iter()
            .filter(|name| matches!(self.provider.describe(name), Some(TypeDescription::Struct(_))))
            .map(|name| {
                let result = self.get_or_build(&name);
                (name, result)
            })
            .collect()
    }

    fn build_struct(&self, name: &str, visiting: &mut Vec<String>) -> Cached<Schema> {
        if let Some(entry) = self.schemas.read().get(name) {
            return entry.clone();
        }

        if let Some(pos) = visiting.iter().position(|v| v == name) {
            let mut cycle: Vec<String> = visiting[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(SchemaError::CyclicSchema { cycle });
        }

        visiting.push(name.to_string());
        let result = self.build_struct_uncached(name, visiting);
        visiting.pop();

        let mut schemas = self.schemas.write();
        if let Some(existing) = schemas.get(name) {
            // Another thread finished first; keep its instance.
            return existing.clone();
        }
        match &result {
            Ok(schema) => tracing::debug!(
                "Built schema {} ({} fields, {} bytes)",
                name,
                schema.fields().len(),
                schema.size()
            ),
            Err(e) => tracing::error!("Schema for {} is unusable: {}", name, e),
        }
        schemas.insert(name.to_string(), result.clone());
        result
    }

    fn build_struct_uncached(&self, name: &str, visiting: &mut Vec<String>) -> Cached<Schema> {
        let description = match self.provider.describe(name) {
            Some(TypeDescription::Struct(s)) => s,
            Some(TypeDescription::Enum(_)) => {
                return Err(SchemaError::NotAStructType {
                    name: name.to_string(),
                })
            }
            None => {
                return Err(SchemaError::UnknownType {
                    name: name.to_string(),
                })
            }
        };

        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(description.fields.len());
        for field in &description.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::InvalidLayout {
                    schema: name.to_string(),
                    reason: format!("duplicate field '{}'", field.name),
                });
            }

            let kind = self.map_field_type(name, &field.name, &field.ty, field.size, visiting)?;

            let end = field.offset.checked_add(field.size);
            if end.map_or(true, |end| end > description.size) {
                return Err(SchemaError::InvalidLayout {
                    schema: name.to_string(),
                    reason: format!(
                        "field '{}' at offset {} with size {} exceeds struct size {}",
                        field.name, field.offset, field.size, description.size
                    ),
                });
            }

            fields.push(FieldDef {
                name: Arc::from(field.name.as_str()),
                kind,
                offset: field.offset,
                size: field.size,
            });
        }

        Ok(Arc::new(Schema::from_fields(name, description.size, fields)))
    }

    fn map_field_type(
        &self,
        schema: &str,
        field: &str,
        ty: &FieldType,
        size: usize,
        visiting: &mut Vec<String>,
    ) -> Result<FieldKind, SchemaError> {
        let layout_error = |reason: String| SchemaError::InvalidLayout {
            schema: schema.to_string(),
            reason: format!("field '{}': {}", field, reason),
        };

        let kind = match ty {
            FieldType::Int | FieldType::Uint => {
                if !matches!(size, 1 | 2 | 4 | 8) {
                    return Err(layout_error(format!("integer size {} is not 1, 2, 4 or 8", size)));
                }
                FieldKind::Int {
                    signed: matches!(ty, FieldType::Int),
                    width: size as u8,
                }
            }
            FieldType::Float => {
                if !matches!(size, 4 | 8) {
                    return Err(layout_error(format!("float size {} is not 4 or 8", size)));
                }
                FieldKind::Float { width: size as u8 }
            }
            FieldType::Bool => {
                if size != 1 {
                    return Err(layout_error(format!("bool size {} is not 1", size)));
                }
                FieldKind::Bool
            }
            FieldType::String => {
                if size == 0 {
                    return Err(layout_error("string capacity is zero".to_string()));
                }
                FieldKind::String { capacity: size }
            }
            FieldType::Enum(enum_name) => {
                if !matches!(size, 1 | 2 | 4) {
                    return Err(layout_error(format!("enum size {} is not 1, 2 or 4", size)));
                }
                FieldKind::Enum {
                    def: self.enum_def(enum_name)?,
                    width: size as u8,
                }
            }
            FieldType::Struct(type_name) => {
                let nested = self.build_struct(type_name, visiting)?;
                if nested.size() != size {
                    return Err(layout_error(format!(
                        "nested {} is {} bytes but field size is {}",
                        type_name,
                        nested.size(),
                        size
                    )));
                }
                FieldKind::Struct(nested)
            }
            FieldType::Array(ArrayType { element, count }) => {
                if *count == 0 || size % count != 0 {
                    return Err(layout_error(format!(
                        "array size {} is not a multiple of count {}",
                        size, count
                    )));
                }
                let stride = size / count;
                let element = self.map_field_type(schema, field, element, stride, visiting)?;
                FieldKind::Array {
                    element: Box::new(element),
                    count: *count,
                    stride,
                }
            }
            FieldType::Pointer(target) => {
                return Err(SchemaError::UnsupportedFieldType {
                    schema: schema.to_string(),
                    field: field.to_string(),
                    ty: format!("pointer to {}", target),
                })
            }
            FieldType::Opaque(host) => {
                return Err(SchemaError::UnsupportedFieldType {
                    schema: schema.to_string(),
                    field: field.to_string(),
                    ty: host.clone(),
                })
            }
        };
        Ok(kind)
    }

    fn enum_def(&self, name: &str) -> Cached<EnumDef> {
        if let Some(entry) = self.enums.read().get(name) {
            return entry.clone();
        }

        let result = match self.provider.describe(name) {
            Some(TypeDescription::Enum(description)) => Ok(Arc::new(EnumDef {
                name: description.name,
                variants: description
                    .variants
                    .into_iter()
                    .map(|v| EnumVariant {
                        name: v.name,
                        value: v.value,
                    })
                    .collect(),
            })),
            Some(TypeDescription::Struct(_)) => Err(SchemaError::NotAnEnumType {
                name: name.to_string(),
            }),
            None => Err(SchemaError::UnknownType {
                name: name.to_string(),
            }),
        };

        self.enums
            .write()
            .entry(name.to_string())
            .or_insert(result)
            .clone()
    }
}

impl std::fmt::Debug for SchemaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaStore")
            .field("schemas", &self.schemas.read().len())
            .field("enums", &self.enums.read().len())
            .finish()
    }
}
