//! Struct views
//!
//! A [`StructView`] pairs a [`Schema`] with the byte image of one struct
//! instance and gives typed field access by index or name. Views borrow the
//! bytes; the instance itself lives in a producer-owned [`StructInstance`].
//!
//! Every access is checked against the schema (field index, value type, value
//! range) before any byte is touched.

use crate::binding::ResolutionError;
use crate::schema::{FieldKind, Schema};
use crate::types::{StructValue, TypeTag, TypedValue};
use parking_lot::RwLock;
use std::sync::Arc;

/// Producer-side storage for one struct instance
#[derive(Debug, Clone)]
pub struct StructInstance {
    schema: Arc<Schema>,
    bytes: Vec<u8>,
}

/// A struct instance shared between its producer and the registry
pub type SharedInstance = Arc<RwLock<StructInstance>>;

impl StructInstance {
    /// A default instance: every field zero, empty string, first-zero enum
    pub fn zeroed(schema: Arc<Schema>) -> Self {
        let bytes = vec![0; schema.size()];
        Self { schema, bytes }
    }

    /// Wrap an existing byte image
    pub fn from_bytes(schema: Arc<Schema>, bytes: Vec<u8>) -> Result<Self, ResolutionError> {
        if bytes.len() != schema.size() {
            return Err(ResolutionError::BufferSize {
                schema: schema.name().to_string(),
                expected: schema.size(),
                actual: bytes.len(),
            });
        }
        Ok(Self { schema, bytes })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn view(&self) -> StructView<'_> {
        StructView {
            schema: &self.schema,
            bytes: &self.bytes,
        }
    }

    pub fn view_mut(&mut self) -> StructViewMut<'_> {
        StructViewMut {
            schema: &self.schema,
            bytes: &mut self.bytes,
        }
    }

    /// Copy the instance into a value suitable for a struct field write
    pub fn to_value(&self) -> StructValue {
        StructValue::zeroed(self.schema.clone()).with_bytes(&self.bytes)
    }

    pub fn into_shared(self) -> SharedInstance {
        Arc::new(RwLock::new(self))
    }
}

/// Read-only typed access to a struct's bytes
#[derive(Debug, Clone, Copy)]
pub struct StructView<'a> {
    schema: &'a Arc<Schema>,
    bytes: &'a [u8],
}

impl<'a> StructView<'a> {
    pub fn new(schema: &'a Arc<Schema>, bytes: &'a [u8]) -> Result<Self, ResolutionError> {
        check_size(schema, bytes.len())?;
        Ok(Self { schema, bytes })
    }

    pub fn schema(&self) -> &'a Arc<Schema> {
        self.schema
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Read the field at `index`
    pub fn read_field(&self, index: usize) -> Result<TypedValue, ResolutionError> {
        let field = self
            .schema
            .field(index)
            .ok_or_else(|| no_such_index(self.schema, index))?;
        decode_value(&field.kind, &field.name, self.slice(field.offset, field.size))
    }

    pub fn read_by_name(&self, name: &str) -> Result<TypedValue, ResolutionError> {
        let index = self
            .schema
            .field_index(name)
            .ok_or_else(|| no_such_field(self.schema, name))?;
        self.read_field(index)
    }

    /// View of the nested struct stored in field `index`
    pub fn nested(&self, index: usize) -> Result<StructView<'a>, ResolutionError> {
        let field = self
            .schema
            .field(index)
            .ok_or_else(|| no_such_index(self.schema, index))?;
        match &field.kind {
            FieldKind::Struct(nested) => Ok(StructView {
                schema: nested,
                bytes: self.slice(field.offset, field.size),
            }),
            other => Err(ResolutionError::NotAStruct {
                field: field.name.to_string(),
                found: other.tag(),
            }),
        }
    }

    /// Decode a value of `kind` at an absolute offset previously computed by a path walk
    pub(crate) fn read_at(
        &self,
        kind: &FieldKind,
        offset: usize,
        field: &str,
    ) -> Result<TypedValue, ResolutionError> {
        let end = offset + kind.size();
        if end > self.bytes.len() {
            return Err(ResolutionError::BufferSize {
                schema: self.schema.name().to_string(),
                expected: end,
                actual: self.bytes.len(),
            });
        }
        decode_value(kind, field, &self.bytes[offset..end])
    }

    fn slice(&self, offset: usize, size: usize) -> &'a [u8] {
        &self.bytes[offset..offset + size]
    }
}

/// Mutable typed access to a struct's bytes
#[derive(Debug)]
pub struct StructViewMut<'a> {
    schema: &'a Arc<Schema>,
    bytes: &'a mut [u8],
}

impl<'a> StructViewMut<'a> {
    pub fn new(schema: &'a Arc<Schema>, bytes: &'a mut [u8]) -> Result<Self, ResolutionError> {
        check_size(schema, bytes.len())?;
        Ok(Self { schema, bytes })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        self.schema
    }

    pub fn as_view(&self) -> StructView<'_> {
        StructView {
            schema: self.schema,
            bytes: &*self.bytes,
        }
    }

    pub fn read_field(&self, index: usize) -> Result<TypedValue, ResolutionError> {
        self.as_view().read_field(index)
    }

    pub fn read_by_name(&self, name: &str) -> Result<TypedValue, ResolutionError> {
        self.as_view().read_by_name(name)
    }

    /// Write `value` into the field at `index`.
    ///
    /// The field is left untouched if the value's type or range does not fit.
    pub fn write_field(&mut self, index: usize, value: &TypedValue) -> Result<(), ResolutionError> {
        let field = self
            .schema
            .field(index)
            .ok_or_else(|| no_such_index(self.schema, index))?;
        let out = &mut self.bytes[field.offset..field.offset + field.size];
        encode_value(&field.kind, &field.name, value, out)
    }

    pub fn write_by_name(&mut self, name: &str, value: &TypedValue) -> Result<(), ResolutionError> {
        let index = self
            .schema
            .field_index(name)
            .ok_or_else(|| no_such_field(self.schema, name))?;
        self.write_field(index, value)
    }

    /// Encode a value of `kind` at an absolute offset previously computed by a path walk
    pub(crate) fn write_at(
        &mut self,
        kind: &FieldKind,
        offset: usize,
        field: &str,
        value: &TypedValue,
    ) -> Result<(), ResolutionError> {
        let end = offset + kind.size();
        if end > self.bytes.len() {
            return Err(ResolutionError::BufferSize {
                schema: self.schema.name().to_string(),
                expected: end,
                actual: self.bytes.len(),
            });
        }
        encode_value(kind, field, value, &mut self.bytes[offset..end])
    }
}

fn check_size(schema: &Schema, actual: usize) -> Result<(), ResolutionError> {
    if actual != schema.size() {
        return Err(ResolutionError::BufferSize {
            schema: schema.name().to_string(),
            expected: schema.size(),
            actual,
        });
    }
    Ok(())
}

fn no_such_index(schema: &Schema, index: usize) -> ResolutionError {
    ResolutionError::FieldNotFound {
        schema: schema.name().to_string(),
        field: format!("#{}", index),
    }
}

fn no_such_field(schema: &Schema, name: &str) -> ResolutionError {
    ResolutionError::FieldNotFound {
        schema: schema.name().to_string(),
        field: name.to_string(),
    }
}

fn out_of_range(field: &str, detail: String) -> ResolutionError {
    ResolutionError::ValueOutOfRange {
        field: field.to_string(),
        detail,
    }
}

fn read_int(bytes: &[u8], signed: bool) -> Option<i64> {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    let negative = signed && bytes.last().is_some_and(|b| b & 0x80 != 0);
    if negative {
        buf[bytes.len()..].fill(0xFF);
    }
    let raw = u64::from_le_bytes(buf);
    if signed {
        Some(raw as i64)
    } else {
        i64::try_from(raw).ok()
    }
}

fn int_fits(value: i64, signed: bool, width: u8) -> bool {
    let bits = width as u32 * 8;
    match (signed, bits) {
        (true, 64) => true,
        (true, _) => {
            let max = (1i64 << (bits - 1)) - 1;
            (-max - 1..=max).contains(&value)
        }
        (false, 64) => value >= 0,
        (false, _) => (0..1i64 << bits).contains(&value),
    }
}

/// Decode one value from exactly `kind.size()` bytes.
pub(crate) fn decode_value(
    kind: &FieldKind,
    field: &str,
    bytes: &[u8],
) -> Result<TypedValue, ResolutionError> {
    let value = match kind {
        FieldKind::Int { signed, .. } => {
            let v = read_int(bytes, *signed)
                .ok_or_else(|| out_of_range(field, "stored value exceeds i64".to_string()))?;
            TypedValue::Int(v)
        }
        FieldKind::Float { width: 4 } => {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(bytes);
            TypedValue::Float(f32::from_le_bytes(buf) as f64)
        }
        FieldKind::Float { .. } => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(bytes);
            TypedValue::Float(f64::from_le_bytes(buf))
        }
        FieldKind::Bool => TypedValue::Bool(bytes[0] != 0),
        FieldKind::String { .. } => {
            let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
            let text = std::str::from_utf8(&bytes[..end])
                .map_err(|e| out_of_range(field, format!("stored string is not UTF-8: {}", e)))?;
            TypedValue::String(text.to_string())
        }
        FieldKind::Enum { .. } => TypedValue::Enum(read_int(bytes, true).unwrap_or_default()),
        FieldKind::Struct(schema) => TypedValue::Struct(
            StructValue::zeroed(schema.clone()).with_bytes(bytes),
        ),
        FieldKind::Array {
            element,
            count,
            stride,
        } => {
            let size = element.size();
            let items = (0..*count)
                .map(|i| decode_value(element, field, &bytes[i * stride..i * stride + size]))
                .collect::<Result<Vec<_>, _>>()?;
            TypedValue::Array(items)
        }
    };
    Ok(value)
}

/// Encode `value` into exactly `kind.size()` bytes.
///
/// Checks everything before writing, so a failed write leaves `out` unchanged.
pub(crate) fn encode_value(
    kind: &FieldKind,
    field: &str,
    value: &TypedValue,
    out: &mut [u8],
) -> Result<(), ResolutionError> {
    check_encodable(kind, field, value)?;
    write_unchecked(kind, value, out);
    Ok(())
}

fn check_encodable(kind: &FieldKind, field: &str, value: &TypedValue) -> Result<(), ResolutionError> {
    let expected: TypeTag = kind.tag();
    if value.tag() != expected {
        return Err(ResolutionError::TypeMismatch {
            field: field.to_string(),
            expected,
            found: value.tag(),
        });
    }

    match (kind, value) {
        (FieldKind::Int { signed, width }, TypedValue::Int(v)) if !int_fits(*v, *signed, *width) => {
            Err(out_of_range(field, format!("{} does not fit {}", v, kind.type_name())))
        }
        (FieldKind::Float { width: 4 }, TypedValue::Float(v))
            if v.is_finite() && !(f32::MIN as f64..=f32::MAX as f64).contains(v) =>
        {
            Err(out_of_range(field, format!("{} does not fit f32", v)))
        }
        (FieldKind::Enum { width, .. }, TypedValue::Enum(v)) if !int_fits(*v, true, *width) => Err(
            out_of_range(field, format!("discriminant {} does not fit {} bytes", v, width)),
        ),
        (FieldKind::String { capacity }, TypedValue::String(s)) => {
            if s.len() > *capacity {
                Err(out_of_range(
                    field,
                    format!("{} bytes exceed capacity {}", s.len(), capacity),
                ))
            } else if s.contains('\0') {
                Err(out_of_range(field, "string contains NUL".to_string()))
            } else {
                Ok(())
            }
        }
        (FieldKind::Struct(schema), TypedValue::Struct(v)) => {
            if v.schema().same_type(schema) {
                Ok(())
            } else {
                Err(ResolutionError::SchemaMismatch {
                    field: field.to_string(),
                    expected: schema.name().to_string(),
                    found: v.schema().name().to_string(),
                })
            }
        }
        (FieldKind::Array { element, count, .. }, TypedValue::Array(items)) => {
            if items.len() != *count {
                return Err(out_of_range(
                    field,
                    format!("{} elements given for an array of {}", items.len(), count),
                ));
            }
            items
                .iter()
                .try_for_each(|item| check_encodable(element, field, item))
        }
        _ => Ok(()),
    }
}

fn write_unchecked(kind: &FieldKind, value: &TypedValue, out: &mut [u8]) {
    match (kind, value) {
        (FieldKind::Int { width, .. }, TypedValue::Int(v))
        | (FieldKind::Enum { width, .. }, TypedValue::Enum(v)) => {
            out.copy_from_slice(&v.to_le_bytes()[..*width as usize]);
        }
        (FieldKind::Float { width: 4 }, TypedValue::Float(v)) => {
            out.copy_from_slice(&(*v as f32).to_le_bytes());
        }
        (FieldKind::Float { .. }, TypedValue::Float(v)) => {
            out.copy_from_slice(&v.to_le_bytes());
        }
        (FieldKind::Bool, TypedValue::Bool(v)) => out[0] = u8::from(*v),
        (FieldKind::String { .. }, TypedValue::String(s)) => {
            out.fill(0);
            out[..s.len()].copy_from_slice(s.as_bytes());
        }
        (FieldKind::Struct(_), TypedValue::Struct(v)) => out.copy_from_slice(v.bytes()),
        (FieldKind::Array { element, stride, .. }, TypedValue::Array(items)) => {
            let size = element.size();
            for (i, item) in items.iter().enumerate() {
                write_unchecked(element, item, &mut out[i * stride..i * stride + size]);
            }
        }
        // Unreachable after check_encodable
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EnumDef, EnumVariant, FieldDef};

    fn field(name: &str, kind: FieldKind, offset: usize) -> FieldDef {
        let size = kind.size();
        FieldDef {
            name: Arc::from(name),
            kind,
            offset,
            size,
        }
    }

    fn stats() -> Arc<Schema> {
        Arc::new(Schema::from_fields(
            "PlayerStats",
            8,
            vec![
                field("health", FieldKind::Float { width: 4 }, 0),
                field("mana", FieldKind::Float { width: 4 }, 4),
            ],
        ))
    }

    fn player() -> Arc<Schema> {
        let stance = Arc::new(EnumDef {
            name: "Stance".to_string(),
            variants: vec![
                EnumVariant {
                    name: "Idle".to_string(),
                    value: 0,
                },
                EnumVariant {
                    name: "Crouch".to_string(),
                    value: -1,
                },
            ],
        });
        Arc::new(Schema::from_fields(
            "Player",
            48,
            vec![
                field("stats", FieldKind::Struct(stats()), 0),
                field(
                    "level",
                    FieldKind::Int {
                        signed: false,
                        width: 2,
                    },
                    8,
                ),
                field(
                    "stance",
                    FieldKind::Enum {
                        def: stance,
                        width: 1,
                    },
                    10,
                ),
                field("alive", FieldKind::Bool, 11),
                field("name", FieldKind::String { capacity: 12 }, 12),
                field(
                    "slots",
                    FieldKind::Array {
                        element: Box::new(FieldKind::Int {
                            signed: true,
                            width: 4,
                        }),
                        count: 4,
                        stride: 4,
                    },
                    24,
                ),
                field("gold", FieldKind::Float { width: 8 }, 40),
            ],
        ))
    }

    #[test]
    fn test_zeroed_defaults() {
        let instance = StructInstance::zeroed(player());
        let view = instance.view();
        assert_eq!(view.read_by_name("level").unwrap(), TypedValue::Int(0));
        assert_eq!(view.read_by_name("alive").unwrap(), TypedValue::Bool(false));
        assert_eq!(
            view.read_by_name("name").unwrap(),
            TypedValue::String(String::new())
        );
        assert_eq!(
            view.read_by_name("slots").unwrap(),
            TypedValue::Array(vec![TypedValue::Int(0); 4])
        );
    }

    #[test]
    fn test_write_then_read_each_kind() {
        let mut instance = StructInstance::zeroed(player());
        let values = [
            ("level", TypedValue::Int(65535)),
            ("stance", TypedValue::Enum(-1)),
            ("alive", TypedValue::Bool(true)),
            ("name", TypedValue::from("Ayla")),
            (
                "slots",
                TypedValue::Array(vec![
                    TypedValue::Int(-5),
                    TypedValue::Int(0),
                    TypedValue::Int(i32::MAX as i64),
                    TypedValue::Int(i32::MIN as i64),
                ]),
            ),
            ("gold", TypedValue::Float(1234.5678)),
        ];
        {
            let mut view = instance.view_mut();
            for (name, value) in &values {
                view.write_by_name(name, value).unwrap();
            }
        }
        let view = instance.view();
        for (name, value) in &values {
            assert_eq!(&view.read_by_name(name).unwrap(), value, "field {}", name);
        }
    }

    #[test]
    fn test_nested_struct_write() {
        let mut instance = StructInstance::zeroed(player());
        let stats_schema = instance.schema().field_by_name("stats").unwrap().kind.as_struct().cloned().unwrap();
        let mut stats = StructInstance::zeroed(stats_schema);
        stats.view_mut().write_by_name("health", &TypedValue::Float(75.0)).unwrap();

        instance
            .view_mut()
            .write_by_name("stats", &TypedValue::Struct(stats.to_value()))
            .unwrap();

        let nested = instance.view().nested(0).unwrap();
        assert_eq!(nested.read_by_name("health").unwrap(), TypedValue::Float(75.0));
        assert_eq!(nested.read_by_name("mana").unwrap(), TypedValue::Float(0.0));
    }

    #[test]
    fn test_float_narrowing() {
        let mut instance = StructInstance::zeroed(stats());
        instance
            .view_mut()
            .write_field(0, &TypedValue::Float(0.1))
            .unwrap();
        assert_eq!(
            instance.view().read_field(0).unwrap(),
            TypedValue::Float(0.1f32 as f64)
        );
    }

    #[test]
    fn test_float_beyond_f32_rejected() {
        let mut instance = StructInstance::zeroed(stats());
        instance.view_mut().write_field(0, &TypedValue::Float(5.0)).unwrap();
        for v in [1.0e300, -1.0e39] {
            assert!(matches!(
                instance.view_mut().write_field(0, &TypedValue::Float(v)),
                Err(ResolutionError::ValueOutOfRange { .. })
            ));
        }
        assert_eq!(instance.view().read_field(0).unwrap(), TypedValue::Float(5.0));

        instance
            .view_mut()
            .write_field(0, &TypedValue::Float(f64::INFINITY))
            .unwrap();
        assert_eq!(
            instance.view().read_field(0).unwrap(),
            TypedValue::Float(f64::INFINITY)
        );
    }

    #[test]
    fn test_invalid_utf8_string_rejected() {
        let schema = Arc::new(Schema::from_fields(
            "Label",
            4,
            vec![field("text", FieldKind::String { capacity: 4 }, 0)],
        ));
        let view_bytes = [0x61u8, 0xff, 0x62, 0];
        let view = StructView::new(&schema, &view_bytes).unwrap();
        assert!(matches!(
            view.read_field(0),
            Err(ResolutionError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn test_type_mismatch_leaves_field_untouched() {
        let mut instance = StructInstance::zeroed(stats());
        instance.view_mut().write_field(0, &TypedValue::Float(5.0)).unwrap();
        let err = instance
            .view_mut()
            .write_field(0, &TypedValue::Int(3))
            .unwrap_err();
        assert_eq!(
            err,
            ResolutionError::TypeMismatch {
                field: "health".to_string(),
                expected: TypeTag::Float,
                found: TypeTag::Int,
            }
        );
        assert_eq!(instance.view().read_field(0).unwrap(), TypedValue::Float(5.0));
    }

    #[test]
    fn test_range_errors() {
        let mut instance = StructInstance::zeroed(player());
        let mut view = instance.view_mut();
        let cases = [
            ("level", TypedValue::Int(65536)),
            ("level", TypedValue::Int(-1)),
            ("stance", TypedValue::Enum(200)),
            ("name", TypedValue::from("a name that is far too long")),
            ("name", TypedValue::from("nul\0inside")),
            ("slots", TypedValue::Array(vec![TypedValue::Int(1)])),
        ];
        for (name, value) in &cases {
            assert!(
                matches!(
                    view.write_by_name(name, value),
                    Err(ResolutionError::ValueOutOfRange { .. })
                ),
                "{} = {} should be out of range",
                name,
                value
            );
        }
    }

    #[test]
    fn test_array_element_type_checked() {
        let mut instance = StructInstance::zeroed(player());
        let bad = TypedValue::Array(vec![
            TypedValue::Int(1),
            TypedValue::Int(2),
            TypedValue::Bool(true),
            TypedValue::Int(4),
        ]);
        assert!(matches!(
            instance.view_mut().write_by_name("slots", &bad),
            Err(ResolutionError::TypeMismatch { .. })
        ));
        // The valid leading elements must not have been written.
        assert_eq!(
            instance.view().read_by_name("slots").unwrap(),
            TypedValue::Array(vec![TypedValue::Int(0); 4])
        );
    }

    #[test]
    fn test_struct_schema_identity() {
        let other = Arc::new(Schema::from_fields("Other", 8, Vec::new()));
        let mut instance = StructInstance::zeroed(player());
        let err = instance
            .view_mut()
            .write_by_name("stats", &TypedValue::Struct(StructValue::zeroed(other)))
            .unwrap_err();
        assert!(matches!(err, ResolutionError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_index_and_name_checks() {
        let instance = StructInstance::zeroed(stats());
        assert!(matches!(
            instance.view().read_field(9),
            Err(ResolutionError::FieldNotFound { .. })
        ));
        assert!(matches!(
            instance.view().read_by_name("stamina"),
            Err(ResolutionError::FieldNotFound { .. })
        ));
        assert!(matches!(
            instance.view().nested(1),
            Err(ResolutionError::NotAStruct { .. })
        ));
    }

    #[test]
    fn test_buffer_size_checked() {
        let schema = stats();
        assert!(StructView::new(&schema, &[0; 4]).is_err());
        assert!(StructInstance::from_bytes(schema.clone(), vec![0; 9]).is_err());
        let bytes = [0u8, 0, 0x80, 0x3f, 0, 0, 0, 0];
        let view = StructView::new(&schema, &bytes).unwrap();
        assert_eq!(view.read_field(0).unwrap(), TypedValue::Float(1.0));
    }

    #[test]
    fn test_unsigned_64_above_i64_max() {
        let schema = Arc::new(Schema::from_fields(
            "Counter",
            8,
            vec![field(
                "ticks",
                FieldKind::Int {
                    signed: false,
                    width: 8,
                },
                0,
            )],
        ));
        let instance = StructInstance::from_bytes(schema, vec![0xFF; 8]).unwrap();
        assert!(matches!(
            instance.view().read_field(0),
            Err(ResolutionError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn test_int_fits_bounds() {
        assert!(int_fits(127, true, 1));
        assert!(int_fits(-128, true, 1));
        assert!(!int_fits(128, true, 1));
        assert!(int_fits(255, false, 1));
        assert!(!int_fits(256, false, 1));
        assert!(int_fits(i64::MIN, true, 8));
        assert!(!int_fits(-1, false, 8));
    }
}
