//! Core value types
//!
//! This module contains the type tags and the tagged-union value used for every
//! field access in the binding system.
//!
//! # Main Types
//!
//! - [`TypeTag`] - The supported field type kinds (int, float, bool, ...)
//! - [`TypedValue`] - A value of one of those kinds
//! - [`StructValue`] - An owned byte image of a nested struct, tied to its schema
//!
//! # Encoding
//!
//! Values are stored little-endian at the byte offsets described by a
//! [`Schema`]. Integers are carried as `i64` and floats as `f64` regardless of
//! their storage width; narrowing happens when a value is written.

use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The kind of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    Int,
    Float,
    Bool,
    String,
    /// Nested struct stored inline
    Struct,
    Enum,
    Array,
}

impl TypeTag {
    /// Get all type tags
    pub fn all() -> &'static [TypeTag] {
        &[
            TypeTag::Int,
            TypeTag::Float,
            TypeTag::Bool,
            TypeTag::String,
            TypeTag::Struct,
            TypeTag::Enum,
            TypeTag::Array,
        ]
    }

    /// True for kinds that hold a single scalar value
    pub fn is_scalar(&self) -> bool {
        !matches!(self, TypeTag::Struct | TypeTag::Array)
    }

    /// Blank value shown by a widget whose binding cannot be read.
    ///
    /// Structs and arrays have no schema-free default.
    pub fn default_value(&self) -> Option<TypedValue> {
        match self {
            TypeTag::Int => Some(TypedValue::Int(0)),
            TypeTag::Float => Some(TypedValue::Float(0.0)),
            TypeTag::Bool => Some(TypedValue::Bool(false)),
            TypeTag::String => Some(TypedValue::String(String::new())),
            TypeTag::Enum => Some(TypedValue::Enum(0)),
            TypeTag::Struct | TypeTag::Array => None,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Bool => "bool",
            TypeTag::String => "string",
            TypeTag::Struct => "struct",
            TypeTag::Enum => "enum",
            TypeTag::Array => "array",
        };
        f.pad(name)
    }
}

/// An owned copy of a nested struct's bytes
#[derive(Debug, Clone)]
pub struct StructValue {
    schema: Arc<Schema>,
    bytes: Vec<u8>,
}

impl StructValue {
    /// Wrap a byte image. Returns `None` if `bytes` does not match the schema size.
    pub fn new(schema: Arc<Schema>, bytes: Vec<u8>) -> Option<Self> {
        (bytes.len() == schema.size()).then_some(Self { schema, bytes })
    }

    /// A zeroed (default) instance of `schema`
    pub fn zeroed(schema: Arc<Schema>) -> Self {
        let bytes = vec![0; schema.size()];
        Self { schema, bytes }
    }

    /// Copy a byte image of exactly the schema size into this value
    pub(crate) fn with_bytes(mut self, bytes: &[u8]) -> Self {
        self.bytes.copy_from_slice(bytes);
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl PartialEq for StructValue {
    fn eq(&self, other: &Self) -> bool {
        self.schema.same_type(&other.schema) && self.bytes == other.bytes
    }
}

/// A type-tagged value read from or written to a field
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    /// Enum discriminant
    Enum(i64),
    Struct(StructValue),
    Array(Vec<TypedValue>),
}

impl TypedValue {
    pub fn tag(&self) -> TypeTag {
        match self {
            TypedValue::Int(_) => TypeTag::Int,
            TypedValue::Float(_) => TypeTag::Float,
            TypedValue::Bool(_) => TypeTag::Bool,
            TypedValue::String(_) => TypeTag::String,
            TypedValue::Enum(_) => TypeTag::Enum,
            TypedValue::Struct(_) => TypeTag::Struct,
            TypedValue::Array(_) => TypeTag::Array,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            TypedValue::Int(v) | TypedValue::Enum(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            TypedValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            TypedValue::Struct(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[TypedValue]> {
        match self {
            TypedValue::Array(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Int(v) => write!(f, "{}", v),
            TypedValue::Float(v) => write!(f, "{}", v),
            TypedValue::Bool(v) => write!(f, "{}", v),
            TypedValue::String(v) => write!(f, "{:?}", v),
            TypedValue::Enum(v) => write!(f, "#{}", v),
            TypedValue::Struct(v) => write!(f, "<{}>", v.schema().name()),
            TypedValue::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<i64> for TypedValue {
    fn from(v: i64) -> Self {
        TypedValue::Int(v)
    }
}

impl From<i32> for TypedValue {
    fn from(v: i32) -> Self {
        TypedValue::Int(v as i64)
    }
}

impl From<f64> for TypedValue {
    fn from(v: f64) -> Self {
        TypedValue::Float(v)
    }
}

impl From<f32> for TypedValue {
    fn from(v: f32) -> Self {
        TypedValue::Float(v as f64)
    }
}

impl From<bool> for TypedValue {
    fn from(v: bool) -> Self {
        TypedValue::Bool(v)
    }
}

impl From<&str> for TypedValue {
    fn from(v: &str) -> Self {
        TypedValue::String(v.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(v: String) -> Self {
        TypedValue::String(v)
    }
}
